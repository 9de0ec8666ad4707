// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Thread groups.

use std::fmt;
use std::io;
use std::mem::drop;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use log::error;

/// A group of threads managed together.
///
/// Every thread a role starts (accept loops and connection handlers)
/// lives in one `ThreadGroup`. The group may be shut down through
/// [`ThreadGroup::shut_down`]; afterwards no new threads can be
/// started, and long-running tasks are expected to notice
/// ([`ThreadGroup::is_shutting_down`]) and exit.
/// [`ThreadGroup::await_shutdown`] waits until that has happened for
/// every thread.
pub struct ThreadGroup {
    records: Mutex<GroupRecords>,

    /// Notified (with the `records` mutex) when shutdown is initiated
    /// and when it completes.
    shutdown_wakeup: Condvar,
}

#[derive(Default)]
struct GroupRecords {
    thread_count: usize,
    shutting_down: bool,
}

impl ThreadGroup {
    /// Creates a new thread group.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(GroupRecords::default()),
            shutdown_wakeup: Condvar::new(),
        })
    }

    /// Starts a thread in the `ThreadGroup` that executes `task` once.
    pub fn start<F>(self: &Arc<Self>, name: String, task: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut records = self.records.lock().unwrap();
        if records.shutting_down {
            Err(Error::ShuttingDown)
        } else {
            start_thread(self.clone(), &mut records, name, task).map_err(Into::into)
        }
    }

    /// Initiates shutdown of the `ThreadGroup`. Calling this more than
    /// once has no further effect.
    pub fn shut_down(&self) {
        let mut records = self.records.lock().unwrap();
        records.shutting_down = true;
        self.shutdown_wakeup.notify_all();
    }

    /// Waits for the `ThreadGroup` to shut down: shutdown must have
    /// been initiated and every thread must have exited. Calling this
    /// from a thread within the group deadlocks.
    pub fn await_shutdown(&self) {
        let records = self.records.lock().unwrap();
        let _guard = self
            .shutdown_wakeup
            .wait_while(records, |r| !r.shutting_down || r.thread_count > 0)
            .unwrap();
    }

    /// Returns whether the `ThreadGroup` is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.records.lock().unwrap().shutting_down
    }

    /// Returns the number of running threads.
    pub fn thread_count(&self) -> usize {
        self.records.lock().unwrap().thread_count
    }
}

/// A handle owned by each thread. When dropped (when the thread exits
/// or panics), it updates the group's records.
struct ThreadHandle {
    group: Arc<ThreadGroup>,
    parent: ThreadId,
}

fn start_thread<F>(
    group: Arc<ThreadGroup>,
    records: &mut MutexGuard<GroupRecords>,
    name: String,
    task: F,
) -> io::Result<()>
where
    F: FnOnce() + Send + 'static,
{
    records.thread_count += 1;
    let handle = ThreadHandle {
        group,
        parent: thread::current().id(),
    };
    let result = thread::Builder::new().name(name).spawn(move || {
        task();
        drop(handle);
    });
    if result.is_err() {
        records.thread_count -= 1;
    }
    result.and(Ok(()))
}

impl Drop for ThreadHandle {
    fn drop(&mut self) {
        let current_thread = thread::current();

        // Being dropped in the parent means the thread never started;
        // start_thread has already fixed up the count (and holds the
        // records lock, so we must not take it again).
        if current_thread.id() == self.parent {
            return;
        }

        if thread::panicking() {
            let thread_name = current_thread.name().unwrap_or("anonymous");
            error!("Thread {} panicked", thread_name);
        }

        let mut records = self.group.records.lock().unwrap();
        records.thread_count -= 1;
        if records.shutting_down && records.thread_count == 0 {
            self.group.shutdown_wakeup.notify_all();
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error type for [`ThreadGroup`] operations.
#[derive(Debug)]
pub enum Error {
    /// An OS-level error occurred during the creation of a thread.
    Io(io::Error),

    /// The [`ThreadGroup`] is shutting down.
    ShuttingDown,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => err.fmt(f),
            Self::ShuttingDown => f.write_str("thread group is shutting down"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn await_shutdown_waits_for_threads() {
        let exited = Arc::new(Mutex::new(0));
        let group = ThreadGroup::new();
        const SLEEP_DURATION: Duration = Duration::from_millis(100);
        let start = Instant::now();
        for i in 0..2 {
            let exited_cloned = exited.clone();
            let group_cloned = group.clone();
            group
                .start(format!("sleeper {i}"), move || loop {
                    thread::sleep(SLEEP_DURATION);
                    if group_cloned.is_shutting_down() {
                        *exited_cloned.lock().unwrap() += 1;
                        return;
                    }
                })
                .unwrap();
        }
        group.shut_down();
        group.await_shutdown();
        assert!(Instant::now().duration_since(start) > SLEEP_DURATION);
        assert_eq!(*exited.lock().unwrap(), 2);
        assert_eq!(group.thread_count(), 0);
    }

    #[test]
    fn panicking_threads_are_accounted_for() {
        let group = ThreadGroup::new();
        group.start("doomed".to_owned(), || panic!("boom")).unwrap();
        group.shut_down();
        group.await_shutdown();
        assert_eq!(group.thread_count(), 0);
    }

    #[test]
    fn group_rejects_new_threads_after_shutdown() {
        let group = ThreadGroup::new();
        group.shut_down();
        assert!(matches!(
            group.start("late".to_owned(), || ()),
            Err(Error::ShuttingDown)
        ));
    }
}
