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

//! Coordinated shutdown across roles.
//!
//! When an operator signals one role to terminate, that role (and only
//! that role) broadcasts the shutdown sentinel: first to its connected
//! inbound peers, then to every other role it knows the address of. It
//! then stops its own listener. A role that receives the sentinel
//! treats it as "this peer is gone" and never re-broadcasts, so the
//! broadcast is a single hop from the triggering role.
//!
//! The [`ShutdownCoordinator`] holds the state behind this. Triggering
//! is idempotent: only the first [`ShutdownCoordinator::trigger`]
//! broadcasts. A role that has received the sentinel and served nothing
//! since skips the role-to-role part of its own broadcast, since those
//! roles are already going down. Serving any later request clears this,
//! so a stray sentinel cannot silence the broadcast for good.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::io::{Connection, PeerSet};
use crate::thread::ThreadGroup;
use crate::zone::ZoneTable;

/// The shutdown state of one role.
pub struct ShutdownCoordinator {
    group: Arc<ThreadGroup>,
    peers: Arc<PeerSet>,
    targets: Vec<SocketAddr>,
    triggered: AtomicBool,
    peer_shutdowns: AtomicUsize,
    peer_shutdown_pending: AtomicBool,
    stop_hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl ShutdownCoordinator {
    /// Creates a new `ShutdownCoordinator` for a role whose threads run
    /// in `group`, whose inbound peers are `peers`, and which notifies
    /// the roles at `targets` when triggered.
    pub fn new(group: Arc<ThreadGroup>, peers: Arc<PeerSet>, targets: Vec<SocketAddr>) -> Arc<Self> {
        Arc::new(Self {
            group,
            peers,
            targets,
            triggered: AtomicBool::new(false),
            peer_shutdowns: AtomicUsize::new(0),
            peer_shutdown_pending: AtomicBool::new(false),
            stop_hooks: Mutex::new(Vec::new()),
        })
    }

    /// Returns the thread group of the role.
    pub fn group(&self) -> &Arc<ThreadGroup> {
        &self.group
    }

    /// Registers `hook` to run when the role stops, whether because
    /// shutdown was triggered here or because the role stopped after
    /// receiving the sentinel.
    pub fn on_stop<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.stop_hooks.lock().unwrap().push(Box::new(hook));
    }

    /// Triggers shutdown: notifies and closes inbound peers, notifies
    /// the other roles (unless a peer has announced its shutdown and
    /// nothing has been served since), and stops the role. Returns whether this call
    /// did anything; later calls are ignored.
    pub fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            debug!("Shutdown was already triggered; ignoring.");
            return false;
        }
        info!("Commencing shutdown.");

        let closed = self.peers.close_all();
        if closed > 0 {
            info!("Closed {} inbound connection(s).", closed);
        }

        if self.peer_shutdown_pending.load(Ordering::SeqCst) {
            info!("Other roles have already shut down; not notifying them.");
        } else {
            for target in &self.targets {
                match notify(*target) {
                    Ok(()) => info!("Notified {} of shutdown.", target),
                    Err(e) => warn!("Failed to notify {} of shutdown: {}", target, e),
                }
            }
        }

        self.stop();
        true
    }

    /// Returns whether [`ShutdownCoordinator::trigger`] has been
    /// called.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Records that `peer` sent the shutdown sentinel.
    pub fn observe_peer_shutdown(&self, peer: SocketAddr) {
        let count = self.peer_shutdowns.fetch_add(1, Ordering::SeqCst) + 1;
        self.peer_shutdown_pending.store(true, Ordering::SeqCst);
        info!("{} announced its shutdown ({} so far).", peer, count);
    }

    /// Records that the role served a request. This clears any pending
    /// peer shutdown, so the next trigger notifies the other roles.
    pub fn observe_served_request(&self) {
        if self.peer_shutdown_pending.swap(false, Ordering::SeqCst) {
            debug!("Served a request since the last peer shutdown; other roles will be notified.");
        }
    }

    /// Returns how many shutdown sentinels this role has received.
    pub fn peer_shutdowns_observed(&self) -> usize {
        self.peer_shutdowns.load(Ordering::SeqCst)
    }

    /// Stops the role without broadcasting: shuts down its thread
    /// group (which stops its listener) and runs the stop hooks.
    pub fn stop(&self) {
        self.group.shut_down();
        let hooks: Vec<_> = self.stop_hooks.lock().unwrap().drain(..).collect();
        for hook in hooks {
            hook();
        }
    }
}

/// Sends the shutdown sentinel to the role at `target` on a fresh
/// connection.
fn notify(target: SocketAddr) -> std::io::Result<()> {
    let mut connection = Connection::connect(target)?;
    let result = connection.send_shutdown();
    connection.close();
    result
}

/// Computes the roles a role at `own` must notify on shutdown: the
/// roles in `fixed` plus every server in `zones`, each once, excluding
/// the role itself.
pub fn broadcast_targets(fixed: &[SocketAddr], zones: &ZoneTable, own: SocketAddr) -> Vec<SocketAddr> {
    let mut targets: Vec<SocketAddr> = Vec::new();
    for target in fixed.iter().copied().chain(zones.servers()) {
        let is_self =
            target == own || (own.ip().is_unspecified() && target.port() == own.port());
        if !is_self && !targets.contains(&target) {
            targets.push(target);
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn broadcast_targets_exclude_self_and_duplicates() {
        let zones = ZoneTable::from_reader(
            "com 127.0.0.1 5354\norg 127.0.0.1 5354\ngov 127.0.0.1 5356\n".as_bytes(),
        )
        .unwrap();
        let targets = broadcast_targets(
            &[addr("127.0.0.1:5352"), addr("127.0.0.1:5353")],
            &zones,
            addr("127.0.0.1:5356"),
        );
        assert_eq!(
            targets,
            vec![
                addr("127.0.0.1:5352"),
                addr("127.0.0.1:5353"),
                addr("127.0.0.1:5354"),
            ]
        );
        let targets = broadcast_targets(&[], &zones, addr("0.0.0.0:5354"));
        assert_eq!(targets, vec![addr("127.0.0.1:5356")]);
    }

    #[test]
    fn trigger_broadcasts_exactly_once() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let target = listener.local_addr().unwrap();
        let coordinator = ShutdownCoordinator::new(
            ThreadGroup::new(),
            Arc::new(PeerSet::new(true, None)),
            vec![target],
        );
        let stopped = Arc::new(AtomicUsize::new(0));
        let stopped_cloned = stopped.clone();
        coordinator.on_stop(move || {
            stopped_cloned.fetch_add(1, Ordering::SeqCst);
        });

        let receiver = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = String::new();
            stream.read_to_string(&mut received).unwrap();
            listener.set_nonblocking(true).unwrap();
            (received, listener.accept().is_err())
        });

        assert!(coordinator.trigger());
        assert!(!coordinator.trigger());
        let (received, no_second_connection) = receiver.join().unwrap();
        assert_eq!(received, "shutdown\n");
        assert!(no_second_connection);
        assert!(coordinator.group().is_shutting_down());
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn trigger_skips_roles_after_observing_a_peer_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let coordinator = ShutdownCoordinator::new(
            ThreadGroup::new(),
            Arc::new(PeerSet::new(true, None)),
            vec![listener.local_addr().unwrap()],
        );
        coordinator.observe_peer_shutdown(addr("127.0.0.1:5353"));
        assert!(coordinator.trigger());
        assert!(listener.accept().is_err());
        assert_eq!(coordinator.peer_shutdowns_observed(), 1);
    }

    #[test]
    fn serving_a_request_reenables_the_role_broadcast() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let coordinator = ShutdownCoordinator::new(
            ThreadGroup::new(),
            Arc::new(PeerSet::new(true, None)),
            vec![listener.local_addr().unwrap()],
        );
        coordinator.observe_peer_shutdown(addr("127.0.0.1:40000"));
        coordinator.observe_served_request();

        let receiver = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = String::new();
            stream.read_to_string(&mut received).unwrap();
            received
        });
        assert!(coordinator.trigger());
        assert_eq!(receiver.join().unwrap(), "shutdown\n");
        assert_eq!(coordinator.peer_shutdowns_observed(), 1);
    }

    #[test]
    fn unreachable_targets_do_not_block_shutdown() {
        // Grab a free port, then release it so nothing listens there.
        let target = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let coordinator = ShutdownCoordinator::new(
            ThreadGroup::new(),
            Arc::new(PeerSet::new(false, None)),
            vec![target],
        );
        assert!(coordinator.trigger());
        assert!(coordinator.is_triggered());
    }
}
