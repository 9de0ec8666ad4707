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

//! The processing logic of the three server roles.
//!
//! Each role is a [`Service`]: given one received message, it produces
//! the response to send back. Services are abstracted from network I/O
//! in both directions. An I/O provider (see [`crate::io`]) feeds them
//! messages from inbound connections, and any upstream hop they make
//! goes through an [`Upstream`], which in production is
//! [`TcpUpstream`].
//!
//! The roles are:
//!
//! * [`Authoritative`]: answers lookups from its own [`HostTable`].
//! * [`RootDelegator`]: finds the authoritative server for a suffix and
//!   either redirects the requester there (iterative mode) or asks it
//!   on the requester's behalf (recursive mode).
//! * [`Resolver`]: the client-facing role. It validates requests,
//!   answers from its [`Cache`] when it can, and otherwise resolves
//!   through the root, following redirects itself.
//!
//! [`HostTable`]: crate::zone::HostTable

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::message::Response;

mod authoritative;
mod cache;
mod resolver;
mod root;
mod upstream;

pub use authoritative::Authoritative;
pub use cache::Cache;
pub use resolver::Resolver;
pub use root::RootDelegator;
pub use upstream::{TcpUpstream, Upstream, UpstreamError};

////////////////////////////////////////////////////////////////////////
// SERVICES                                                           //
////////////////////////////////////////////////////////////////////////

/// The message-processing logic of a role.
pub trait Service: Send + Sync {
    /// Returns the identifier the role stamps on its messages.
    fn id(&self) -> &str;

    /// Handles one message received on an inbound connection and
    /// returns the response. The shutdown sentinel never reaches this
    /// method. An error means the exchange failed and the connection
    /// should be closed without a response.
    fn handle_message(
        &self,
        message: &str,
        exchange: &mut Exchange,
    ) -> Result<Response, ExchangeError>;
}

////////////////////////////////////////////////////////////////////////
// EXCHANGES                                                          //
////////////////////////////////////////////////////////////////////////

/// A record of one request/response exchange, kept for the transcript.
///
/// The I/O provider creates an `Exchange` holding the received message,
/// the [`Service`] adds any upstream messages it sends and receives,
/// and the provider finally adds the response.
#[derive(Debug, Default)]
pub struct Exchange {
    lines: Vec<String>,
    mapping: Option<(String, IpAddr)>,
}

impl Exchange {
    /// Starts an exchange with the message that opened it.
    pub fn new(received: &str) -> Self {
        Self {
            lines: vec![received.to_owned()],
            mapping: None,
        }
    }

    /// Records a message sent or received during the exchange.
    pub fn record(&mut self, message: impl fmt::Display) {
        self.lines.push(message.to_string());
    }

    /// Records that the exchange added a hostname to the cache.
    pub fn record_mapping(&mut self, hostname: &str, address: IpAddr) {
        self.mapping = Some((hostname.to_owned(), address));
    }

    /// Returns the messages recorded so far, in order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns the cache insertion made during the exchange, if any.
    pub fn mapping(&self) -> Option<(&str, IpAddr)> {
        self.mapping.as_ref().map(|(h, a)| (h.as_str(), *a))
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// Errors that abort an exchange.
#[derive(Debug)]
pub enum ExchangeError {
    /// An upstream hop failed.
    Upstream {
        server: SocketAddr,
        error: UpstreamError,
    },

    /// The root has no authoritative server for the suffix. This is a
    /// configuration error: the suffix passed validation upstream.
    UnknownSuffix(String),
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Upstream { server, error } => {
                write!(f, "upstream query to {} failed: {}", server, error)
            }
            Self::UnknownSuffix(suffix) => {
                write!(f, "no authoritative server is configured for {:?}", suffix)
            }
        }
    }
}

impl std::error::Error for ExchangeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Upstream { error, .. } => Some(error),
            Self::UnknownSuffix(_) => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TEST SUPPORT                                                       //
////////////////////////////////////////////////////////////////////////

/// An in-memory network of services for testing upstream hops without
/// sockets.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use super::{Exchange, Service, Upstream, UpstreamError};
    use crate::message::{Request, Response};

    #[derive(Default)]
    pub struct MemoryNetwork {
        services: Mutex<HashMap<SocketAddr, Arc<dyn Service>>>,
        contacts: Mutex<Vec<(SocketAddr, String)>>,
    }

    impl MemoryNetwork {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn attach(&self, addr: SocketAddr, service: Arc<dyn Service>) {
            self.services.lock().unwrap().insert(addr, service);
        }

        /// Returns every query made so far as (server, request) pairs.
        pub fn contacts(&self) -> Vec<(SocketAddr, String)> {
            self.contacts.lock().unwrap().clone()
        }

        pub fn contacts_to(&self, addr: SocketAddr) -> usize {
            self.contacts
                .lock()
                .unwrap()
                .iter()
                .filter(|(a, _)| *a == addr)
                .count()
        }
    }

    impl Upstream for MemoryNetwork {
        fn query(&self, server: SocketAddr, request: &Request) -> Result<Response, UpstreamError> {
            let message = request.to_string();
            self.contacts.lock().unwrap().push((server, message.clone()));
            let service = self.services.lock().unwrap().get(&server).cloned();
            let service = service.ok_or(UpstreamError::Closed)?;
            service
                .handle_message(&message, &mut Exchange::new(&message))
                .map_err(|_| UpstreamError::Closed)
        }
    }
}
