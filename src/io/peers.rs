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

//! Implementation of the [`PeerSet`] structure.

use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Mutex;

use log::debug;
use slab::Slab;

use crate::message::SHUTDOWN_SENTINEL;

/// The set of currently connected inbound peers.
///
/// Connection handlers register a clone of their stream on accept and
/// remove it on disconnect. On shutdown, [`PeerSet::close_all`] closes
/// every registered stream, which also wakes handlers blocked reading
/// from them. All access goes through one mutex, held only for the
/// duration of a single operation.
pub struct PeerSet {
    records: Mutex<PeerRecords>,
    notify_on_close: bool,
    capacity: Option<usize>,
}

struct PeerRecords {
    streams: Slab<TcpStream>,
    closed: bool,
}

/// A token identifying a registered peer.
#[derive(Debug)]
pub struct PeerKey(usize);

/// The outcome of [`PeerSet::register`].
#[derive(Debug)]
pub enum Registration {
    Registered(PeerKey),

    /// The set is at capacity.
    Full,

    /// The set has been closed by [`PeerSet::close_all`].
    Closed,
}

impl PeerSet {
    /// Creates a new `PeerSet`. If `notify_on_close` is set, then
    /// [`PeerSet::close_all`] sends each peer the shutdown sentinel
    /// before closing it. If `capacity` is given, registration fails
    /// once that many peers are connected.
    pub fn new(notify_on_close: bool, capacity: Option<usize>) -> Self {
        Self {
            records: Mutex::new(PeerRecords {
                streams: Slab::new(),
                closed: false,
            }),
            notify_on_close,
            capacity,
        }
    }

    /// Registers a connected peer.
    pub fn register(&self, stream: &TcpStream) -> io::Result<Registration> {
        let mut records = self.records.lock().unwrap();
        if records.closed {
            return Ok(Registration::Closed);
        }
        if let Some(capacity) = self.capacity {
            if records.streams.len() >= capacity {
                return Ok(Registration::Full);
            }
        }
        let clone = stream.try_clone()?;
        Ok(Registration::Registered(PeerKey(records.streams.insert(clone))))
    }

    /// Removes a peer that has disconnected.
    pub fn remove(&self, key: PeerKey) {
        self.records.lock().unwrap().streams.try_remove(key.0);
    }

    /// Returns the number of connected peers.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().streams.len()
    }

    /// Returns whether no peers are connected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes every connected peer and refuses later registrations.
    /// Returns the number of peers closed. The streams are taken out
    /// of the set before any is written to, so a slow peer never holds
    /// the lock.
    pub fn close_all(&self) -> usize {
        let streams: Vec<TcpStream> = {
            let mut records = self.records.lock().unwrap();
            records.closed = true;
            records.streams.drain().collect()
        };
        let message = format!("{}\n", SHUTDOWN_SENTINEL);
        for mut stream in &streams {
            if self.notify_on_close {
                if let Err(e) = stream.write_all(message.as_bytes()) {
                    debug!("Failed to notify a peer of shutdown: {}", e);
                }
            }
            let _ = stream.shutdown(Shutdown::Both);
        }
        streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn connected_pair(listener: &TcpListener) -> (TcpStream, TcpStream) {
        let outbound = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (inbound, _) = listener.accept().unwrap();
        (inbound, outbound)
    }

    #[test]
    fn close_all_notifies_and_closes_peers() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let peers = PeerSet::new(true, None);
        let (inbound, mut outbound) = connected_pair(&listener);
        assert!(matches!(
            peers.register(&inbound).unwrap(),
            Registration::Registered(_)
        ));
        assert_eq!(peers.close_all(), 1);
        let mut received = String::new();
        outbound.read_to_string(&mut received).unwrap();
        assert_eq!(received, "shutdown\n");
        assert!(peers.is_empty());
        assert!(matches!(
            peers.register(&inbound).unwrap(),
            Registration::Closed
        ));
    }

    #[test]
    fn stalled_peer_does_not_hold_the_set() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let peers = Arc::new(PeerSet::new(true, None));
        let (mut inbound, mut outbound) = connected_pair(&listener);
        let key = match peers.register(&inbound).unwrap() {
            Registration::Registered(key) => key,
            other => panic!("unexpected registration {:?}", other),
        };

        // Fill the socket buffers so that writing the sentinel blocks.
        inbound.set_nonblocking(true).unwrap();
        let chunk = [b'x'; 4096];
        let mut filled = 0;
        loop {
            match inbound.write(&chunk) {
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        inbound.set_nonblocking(false).unwrap();

        let peers_cloned = peers.clone();
        let closer = thread::spawn(move || peers_cloned.close_all());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !peers.is_empty() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(10));
        }
        peers.remove(key);
        assert!(matches!(
            peers.register(&outbound).unwrap(),
            Registration::Closed
        ));

        let mut received = Vec::new();
        outbound.read_to_end(&mut received).unwrap();
        assert_eq!(closer.join().unwrap(), 1);
        assert!(received.len() >= filled);
    }

    #[test]
    fn silent_close_sends_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let peers = PeerSet::new(false, None);
        let (inbound, mut outbound) = connected_pair(&listener);
        peers.register(&inbound).unwrap();
        peers.close_all();
        let mut received = String::new();
        outbound.read_to_string(&mut received).unwrap();
        assert!(received.is_empty());
    }

    #[test]
    fn capacity_is_enforced_and_freed_on_removal() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let peers = PeerSet::new(false, Some(1));
        let (first, _first_out) = connected_pair(&listener);
        let (second, _second_out) = connected_pair(&listener);
        let key = match peers.register(&first).unwrap() {
            Registration::Registered(key) => key,
            other => panic!("unexpected registration {:?}", other),
        };
        assert!(matches!(
            peers.register(&second).unwrap(),
            Registration::Full
        ));
        peers.remove(key);
        assert!(matches!(
            peers.register(&second).unwrap(),
            Registration::Registered(_)
        ));
        assert_eq!(peers.len(), 1);
    }
}
