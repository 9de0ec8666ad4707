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

//! Upstream hops: sending a request to another role and awaiting its
//! response.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::debug;

use crate::io::Connection;
use crate::message::{Frame, ParseError, Request, Response};

/// A way of querying other roles.
pub trait Upstream: Send + Sync {
    /// Sends `request` to `server` and returns its response. There is
    /// no timeout and no retry.
    fn query(&self, server: SocketAddr, request: &Request) -> Result<Response, UpstreamError>;
}

impl<U> Upstream for Arc<U>
where
    U: Upstream + ?Sized,
{
    fn query(&self, server: SocketAddr, request: &Request) -> Result<Response, UpstreamError> {
        (**self).query(server, request)
    }
}

/// The [`Upstream`] used in production. Each query opens a new
/// connection, exchanges one request and one response, and closes it.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpUpstream;

impl Upstream for TcpUpstream {
    fn query(&self, server: SocketAddr, request: &Request) -> Result<Response, UpstreamError> {
        let mut connection = Connection::connect(server)?;
        debug!("Connected to {}.", server);
        let message = request.to_string();
        connection.send(&message)?;
        debug!("Sent to {}: {}", server, message);
        let reply = connection.recv()?;
        connection.close();
        debug!("Closed the connection to {}.", server);

        let reply = reply.ok_or(UpstreamError::Closed)?;
        match Frame::classify(&reply) {
            Frame::Shutdown => Err(UpstreamError::Shutdown),
            Frame::Message(message) => {
                debug!("Received from {}: {}", server, message);
                Response::decode(message).map_err(UpstreamError::Malformed)
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// Errors that can occur during an upstream query.
#[derive(Debug)]
pub enum UpstreamError {
    /// Connecting, sending, or receiving failed.
    Io(io::Error),

    /// The server closed the connection without responding.
    Closed,

    /// The server sent the shutdown sentinel instead of a response.
    Shutdown,

    /// The server's response did not parse.
    Malformed(ParseError),
}

impl From<io::Error> for UpstreamError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::Closed => f.write_str("the server closed the connection without responding"),
            Self::Shutdown => f.write_str("the server is shutting down"),
            Self::Malformed(err) => write!(f, "malformed response: {}", err),
        }
    }
}

impl std::error::Error for UpstreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Malformed(err) => Some(err),
            Self::Closed | Self::Shutdown => None,
        }
    }
}
