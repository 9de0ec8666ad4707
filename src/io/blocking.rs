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

//! Implementation of the blocking I/O provider.

// NOTE: In this provider, I/O error handling is generally to exit the
// task. For the accept loop, this stops the role (the accept thread is
// the role's only long-lived thread). For connection handlers, this
// aborts the connection, as appropriate.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::{Connection, Listener, PeerSet, Registration};
use crate::message::Frame;
use crate::server::{Exchange, Service};
use crate::shutdown::ShutdownCoordinator;
use crate::transcript::Transcript;

/// A blocking I/O provider.
///
/// This provider uses blocking I/O to communicate over the network. Its
/// concurrency strategy is chosen by [`Concurrency`].
///
/// # Target-specific features
///
/// The `BlockingIoProvider` supports graceful shutdown on targets where
/// [`Listener::poll_accept`] works. To initiate a graceful shutdown,
/// shut down the [`ThreadGroup`](crate::thread::ThreadGroup) in which
/// the provider was started, usually through
/// [`ShutdownCoordinator::trigger`]. Graceful shutdown support can be
/// probed by checking
/// [`BlockingIoProvider::SUPPORTS_GRACEFUL_SHUTDOWN`]. This feature is
/// currently available on **Unix** targets.
pub struct BlockingIoProvider {
    listener: Listener,
    concurrency: Concurrency,
    peers: Arc<PeerSet>,
}

/// How a [`BlockingIoProvider`] serves connections.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Concurrency {
    /// Connections are served one at a time on the accept thread. A
    /// peer's shutdown sentinel stops the role.
    Serial,

    /// Each connection gets its own thread. A peer's shutdown sentinel
    /// is recorded, but the role keeps serving. When the role shuts
    /// down, connected peers are sent the sentinel before being closed.
    PerConnection {
        /// The maximum number of simultaneous connections. Connections
        /// beyond it are refused.
        max_connections: Option<usize>,
    },
}

impl BlockingIoProvider {
    /// Whether the `BlockingIoProvider` supports graceful shutdown on
    /// the target system.
    ///
    /// Implementing graceful shutdown requires us to time out if
    /// blocking to accept a connection takes too long. This is not
    /// possible with the Rust standard library and requires
    /// target-specific support (see [`Listener`]).
    pub const SUPPORTS_GRACEFUL_SHUTDOWN: bool = Listener::POLL_ACCEPT_WORKS;

    /// Creates a new `BlockingIoProvider`. This call binds the listening
    /// socket in preparation, but does not start serving.
    pub fn bind(addr: SocketAddr, concurrency: Concurrency) -> io::Result<Self> {
        let listener = Listener::bind(addr)?;
        let peers = match concurrency {
            Concurrency::Serial => PeerSet::new(false, None),
            Concurrency::PerConnection { max_connections } => {
                PeerSet::new(true, max_connections)
            }
        };
        Ok(Self {
            listener,
            concurrency,
            peers: Arc::new(peers),
        })
    }

    /// Returns the address the provider listens on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Returns the set of connected peers. This is what a
    /// [`ShutdownCoordinator`] for the role should close.
    pub fn peers(&self) -> &Arc<PeerSet> {
        &self.peers
    }

    /// Starts serving `service` in the thread group of `shutdown`.
    /// Completed exchanges are handed to `transcript`.
    pub fn start(
        self,
        service: Arc<dyn Service>,
        transcript: Arc<dyn Transcript>,
        shutdown: &Arc<ShutdownCoordinator>,
    ) -> Result<(), crate::thread::Error> {
        let context = Arc::new(Context {
            service,
            transcript,
            peers: self.peers,
            shutdown: shutdown.clone(),
        });
        let name = format!("{} listener", context.service.id());
        let listener = self.listener;
        let concurrency = self.concurrency;
        shutdown.group().start(name, move || {
            log_io_errors(run_listener(&context, &listener, concurrency));
            if !context.shutdown.group().is_shutting_down() {
                // Without its listener the role cannot do anything.
                context.shutdown.stop();
            }
        })
    }
}

/// This defines the timeout on accept operations. The accept loop
/// checks for thread group shutdown between accepts, so this defines
/// the *maximum* interval between such checks. Consequently, it is the
/// maximum amount of time the shutdown procedure will have to wait for
/// the accept loop to finish up.
///
/// Note that for this functionality to work, we must support it on the
/// target platform. See
/// [`BlockingIoProvider::SUPPORTS_GRACEFUL_SHUTDOWN`].
const CHECK_FOR_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything a connection handler needs.
struct Context {
    service: Arc<dyn Service>,
    transcript: Arc<dyn Transcript>,
    peers: Arc<PeerSet>,
    shutdown: Arc<ShutdownCoordinator>,
}

/// How a conversation with a peer ended.
#[derive(Debug, Eq, PartialEq)]
enum Ending {
    /// The peer closed the connection, or it was aborted.
    Closed,

    /// The peer sent the shutdown sentinel.
    PeerShutdown,
}

/// The accept loop.
fn run_listener(
    context: &Arc<Context>,
    listener: &Listener,
    concurrency: Concurrency,
) -> io::Result<()> {
    info!(
        "{} listening on {}.",
        context.service.id(),
        listener.local_addr()?
    );
    loop {
        if context.shutdown.group().is_shutting_down() {
            return Ok(());
        }

        // Note that poll_accept returns false if interrupted. If
        // poll_accept doesn't work on this platform, then this always
        // returns true immediately.
        let ready = listener.poll_accept(CHECK_FOR_SHUTDOWN_TIMEOUT)?;
        if ready {
            // Accept as many new connections as are available. If
            // poll_accept doesn't work on this platform, then the
            // accept call blocks.
            loop {
                let (stream, peer) = match retry_if_interrupted(|| listener.accept()) {
                    Ok(accepted) => accepted,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => return Err(e),
                };
                info!("Accepted a connection from {}.", peer);

                match concurrency {
                    Concurrency::Serial => {
                        if serve_connection(context, stream) == Ending::PeerShutdown {
                            context.shutdown.observe_peer_shutdown(peer);
                            context.shutdown.stop();
                            return Ok(());
                        }
                        if context.shutdown.group().is_shutting_down() {
                            return Ok(());
                        }
                    }
                    Concurrency::PerConnection { .. } => {
                        let context_clone = context.clone();
                        let task = move || {
                            if serve_connection(&context_clone, stream) == Ending::PeerShutdown {
                                context_clone.shutdown.observe_peer_shutdown(peer);
                            }
                        };
                        let name = format!("connection {peer}");
                        match context.shutdown.group().start(name, task) {
                            Ok(()) => (),
                            Err(crate::thread::Error::ShuttingDown) => {
                                // Let the connection close.
                                return Ok(());
                            }
                            Err(crate::thread::Error::Io(e)) => return Err(e),
                        }
                    }
                }
            }
        }
    }
}

/// Registers, serves, and unregisters one connection.
fn serve_connection(context: &Context, stream: TcpStream) -> Ending {
    let mut connection = match Connection::new(stream) {
        Ok(connection) => connection,
        Err(e) => {
            warn!("Failed to set up an accepted connection: {}", e);
            return Ending::Closed;
        }
    };
    let peer = connection.peer_addr();

    let key = match context.peers.register(connection.stream()) {
        Ok(Registration::Registered(key)) => key,
        Ok(Registration::Full) => {
            warn!("Refusing {}: too many connections.", peer);
            connection.close();
            return Ending::Closed;
        }
        Ok(Registration::Closed) => {
            debug!("Refusing {}: shutting down.", peer);
            connection.close();
            return Ending::Closed;
        }
        Err(e) => {
            warn!("Failed to register {}: {}", peer, e);
            connection.close();
            return Ending::Closed;
        }
    };

    let ending = match converse(context, &mut connection) {
        Ok(ending) => ending,
        Err(e) => {
            warn!("Connection with {} aborted: {}", peer, e);
            Ending::Closed
        }
    };
    context.peers.remove(key);
    connection.close();
    info!("Closed the connection with {}.", peer);
    ending
}

/// Exchanges messages with a peer until the connection ends.
fn converse(context: &Context, connection: &mut Connection) -> io::Result<Ending> {
    let peer = connection.peer_addr();
    loop {
        let received = match connection.recv()? {
            Some(received) => received,
            None => return Ok(Ending::Closed),
        };
        debug!("Received {:?} from {}.", received, peer);

        let message = match Frame::classify(&received) {
            Frame::Shutdown => return Ok(Ending::PeerShutdown),
            Frame::Message(message) => message,
        };

        let mut exchange = Exchange::new(message);
        let response = match context.service.handle_message(message, &mut exchange) {
            Ok(response) => response,
            Err(e) => {
                // Nothing sensible can be sent back, so end the
                // conversation.
                error!("Exchange with {} failed: {}", peer, e);
                return Ok(Ending::Closed);
            }
        };

        let response = response.to_string();
        connection.send(&response)?;
        debug!("Sent {:?} to {}.", response, peer);
        context.shutdown.observe_served_request();

        exchange.record(&response);
        context.transcript.record_exchange(exchange.lines());
        if let Some((hostname, address)) = exchange.mapping() {
            context.transcript.record_mapping(hostname, address);
        }

        // We won't continue to serve this connection if the role is
        // shutting down.
        if context.shutdown.group().is_shutting_down() {
            return Ok(Ending::Closed);
        }
    }
}

/// Executes `f`, retrying the operation if it is interrupted.
fn retry_if_interrupted<F, R>(mut f: F) -> io::Result<R>
where
    F: FnMut() -> io::Result<R>,
{
    loop {
        match f() {
            Ok(r) => return Ok(r),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Logs errors if a task exits with an I/O error.
fn log_io_errors<T>(result: io::Result<T>) {
    if let Err(e) = result {
        let current_thread = thread::current();
        let thread_name = current_thread.name().unwrap_or("anonymous thread");
        error!("I/O error in thread {}: {}", thread_name, e);
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SHUTDOWN_SENTINEL;
    use crate::server::{Authoritative, Resolver, RootDelegator, TcpUpstream};
    use crate::shutdown::broadcast_targets;
    use crate::thread::ThreadGroup;
    use crate::transcript::{MemoryTranscript, NoTranscript};
    use crate::zone::{HostTable, ZoneTable};

    /// A role bound to an ephemeral loopback port but not yet started.
    struct Bound {
        provider: BlockingIoProvider,
        addr: SocketAddr,
    }

    fn bind(concurrency: Concurrency) -> Bound {
        let provider = BlockingIoProvider::bind("127.0.0.1:0".parse().unwrap(), concurrency).unwrap();
        let addr = provider.local_addr().unwrap();
        Bound { provider, addr }
    }

    fn start(
        bound: Bound,
        service: Arc<dyn Service>,
        transcript: Arc<dyn Transcript>,
        targets: Vec<SocketAddr>,
    ) -> Arc<ShutdownCoordinator> {
        let coordinator =
            ShutdownCoordinator::new(ThreadGroup::new(), bound.provider.peers().clone(), targets);
        bound
            .provider
            .start(service, transcript, &coordinator)
            .unwrap();
        coordinator
    }

    /// Waits up to five seconds for `condition` to hold.
    fn wait_for(condition: impl Fn() -> bool) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(std::time::Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// A running resolver, root, and `com` zone server.
    struct Hierarchy {
        resolver_addr: SocketAddr,
        resolver: Arc<ShutdownCoordinator>,
        root: Arc<ShutdownCoordinator>,
        com: Arc<ShutdownCoordinator>,
        transcript: Arc<MemoryTranscript>,
    }

    impl Hierarchy {
        fn start() -> Self {
            let resolver = bind(Concurrency::PerConnection {
                max_connections: None,
            });
            let root = bind(Concurrency::Serial);
            let com = bind(Concurrency::Serial);

            let zones_text = format!("com {} {}\n", com.addr.ip(), com.addr.port());
            let resolver_zones = ZoneTable::from_reader(zones_text.as_bytes()).unwrap();
            let root_zones = ZoneTable::from_reader(zones_text.as_bytes()).unwrap();
            let hosts = HostTable::from_reader("example.com 1.2.3.4\n".as_bytes()).unwrap();

            let resolver_addr = resolver.addr;
            let resolver_targets = broadcast_targets(&[root.addr], &resolver_zones, resolver.addr);
            let root_targets = broadcast_targets(&[resolver.addr], &root_zones, root.addr);
            let com_targets =
                broadcast_targets(&[resolver.addr, root.addr], &root_zones, com.addr);
            let root_addr = root.addr;

            let transcript = Arc::new(MemoryTranscript::new());
            let com = start(
                com,
                Arc::new(Authoritative::new("com".parse().unwrap(), hosts)),
                Arc::new(NoTranscript),
                com_targets,
            );
            let root = start(
                root,
                Arc::new(RootDelegator::new(
                    "root".parse().unwrap(),
                    root_zones,
                    TcpUpstream,
                )),
                Arc::new(NoTranscript),
                root_targets,
            );
            let resolver = start(
                resolver,
                Arc::new(Resolver::new(
                    "resolver".parse().unwrap(),
                    root_addr,
                    TcpUpstream,
                )),
                transcript.clone(),
                resolver_targets,
            );

            Self {
                resolver_addr,
                resolver,
                root,
                com,
                transcript,
            }
        }
    }

    #[test]
    fn recursive_resolution_over_sockets() {
        let hierarchy = Hierarchy::start();
        let mut client = Connection::connect(hierarchy.resolver_addr).unwrap();
        client.send("c1, example.com, r").unwrap();
        assert_eq!(
            client.recv().unwrap().as_deref(),
            Some("0x00, resolver, 1.2.3.4")
        );
        client.send("c1,www.example.com,i").unwrap();
        assert_eq!(
            client.recv().unwrap().as_deref(),
            Some("0x00, resolver, 1.2.3.4")
        );
        client.send("c1, example.xyz, r").unwrap();
        assert_eq!(
            client.recv().unwrap().as_deref(),
            Some("0xEE, resolver, Invalid format")
        );
        client.close();

        let exchanges = hierarchy.transcript.exchanges();
        assert_eq!(
            exchanges[0],
            vec![
                "c1, example.com, r",
                "resolver, example.com, r",
                "0x00, root, 1.2.3.4",
                "0x00, resolver, 1.2.3.4",
            ]
        );
        assert_eq!(
            hierarchy.transcript.mappings(),
            vec![
                ("example.com".to_owned(), "1.2.3.4".parse().unwrap()),
                ("www.example.com".to_owned(), "1.2.3.4".parse().unwrap()),
            ]
        );

        for coordinator in [&hierarchy.resolver, &hierarchy.root, &hierarchy.com] {
            coordinator.stop();
            coordinator.group().await_shutdown();
        }
    }

    #[test]
    fn resolver_shutdown_reaches_every_role() {
        let hierarchy = Hierarchy::start();
        let mut client = Connection::connect(hierarchy.resolver_addr).unwrap();
        client.send("c1, example.com, i").unwrap();
        assert_eq!(
            client.recv().unwrap().as_deref(),
            Some("0x00, resolver, 1.2.3.4")
        );

        assert!(hierarchy.resolver.trigger());
        assert_eq!(client.recv().unwrap().as_deref(), Some(SHUTDOWN_SENTINEL));
        assert_eq!(client.recv().unwrap(), None);

        for coordinator in [&hierarchy.root, &hierarchy.com] {
            coordinator.group().await_shutdown();
            assert_eq!(coordinator.peer_shutdowns_observed(), 1);
            assert!(!coordinator.is_triggered());
        }
        hierarchy.resolver.group().await_shutdown();
    }

    #[test]
    fn resolver_keeps_serving_after_a_peer_shutdown() {
        let hierarchy = Hierarchy::start();
        hierarchy.root.trigger();
        hierarchy.root.group().await_shutdown();
        hierarchy.com.group().await_shutdown();

        // The resolver still accepts clients and answers from its
        // cache or with a failed exchange.
        let mut client = Connection::connect(hierarchy.resolver_addr).unwrap();
        client.send("c1, example.xyz, r").unwrap();
        assert_eq!(
            client.recv().unwrap().as_deref(),
            Some("0xEE, resolver, Invalid format")
        );
        client.close();
        wait_for(|| hierarchy.resolver.peer_shutdowns_observed() == 1);

        hierarchy.resolver.stop();
        hierarchy.resolver.group().await_shutdown();
    }

    #[test]
    fn stray_client_sentinel_does_not_silence_the_broadcast() {
        let hierarchy = Hierarchy::start();
        let mut stray = Connection::connect(hierarchy.resolver_addr).unwrap();
        stray.send(SHUTDOWN_SENTINEL).unwrap();
        assert_eq!(stray.recv().unwrap(), None);
        wait_for(|| hierarchy.resolver.peer_shutdowns_observed() == 1);

        let mut client = Connection::connect(hierarchy.resolver_addr).unwrap();
        client.send("c1, example.com, r").unwrap();
        assert_eq!(
            client.recv().unwrap().as_deref(),
            Some("0x00, resolver, 1.2.3.4")
        );

        assert!(hierarchy.resolver.trigger());
        for coordinator in [&hierarchy.root, &hierarchy.com] {
            coordinator.group().await_shutdown();
            assert_eq!(coordinator.peer_shutdowns_observed(), 1);
            assert!(!coordinator.is_triggered());
        }
        hierarchy.resolver.group().await_shutdown();
    }

    #[test]
    fn connections_beyond_the_limit_are_refused() {
        let bound = bind(Concurrency::PerConnection {
            max_connections: Some(1),
        });
        let addr = bound.addr;
        let hosts = HostTable::from_reader("example.com 1.2.3.4\n".as_bytes()).unwrap();
        let coordinator = start(
            bound,
            Arc::new(Authoritative::new("com".parse().unwrap(), hosts)),
            Arc::new(NoTranscript),
            Vec::new(),
        );

        let mut first = Connection::connect(addr).unwrap();
        first.send("c1, example.com, r").unwrap();
        assert!(first.recv().unwrap().is_some());

        let mut second = Connection::connect(addr).unwrap();
        assert!(matches!(second.recv(), Ok(None) | Err(_)));

        first.close();
        coordinator.stop();
        coordinator.group().await_shutdown();
    }
}
