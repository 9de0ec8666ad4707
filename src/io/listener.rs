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

//! A listening TCP socket with an accept timeout where the target
//! supports one.
//!
//! The standard library cannot wait for an incoming connection with a
//! timeout, which accept loops need in order to notice that their
//! [`ThreadGroup`](crate::thread::ThreadGroup) is shutting down. On
//! Unix targets we put the socket in non-blocking mode and wait with
//! the `poll` system call instead. Elsewhere, accepting simply blocks,
//! and graceful shutdown is unavailable (see
//! [`Listener::POLL_ACCEPT_WORKS`]).

use std::io;
use std::net::{self, SocketAddr, TcpStream};
use std::time::Duration;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::poll::{poll, PollFd, PollFlags};
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// A listening TCP socket.
pub struct Listener(net::TcpListener);

impl Listener {
    /// Whether [`Listener::poll_accept`] actually waits on this target.
    pub const POLL_ACCEPT_WORKS: bool = cfg!(unix);

    /// Creates a new listener bound to `addr`.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = net::TcpListener::bind(addr)?;
        if Self::POLL_ACCEPT_WORKS {
            listener.set_nonblocking(true)?;
        }
        Ok(Self(listener))
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.local_addr()
    }

    /// Blocks until a new connection is available, `timeout` expires,
    /// or the call is interrupted. Returns whether a connection is
    /// available. Where unsupported, this returns `Ok(true)` at once.
    #[cfg(unix)]
    pub fn poll_accept(&self, timeout: Duration) -> io::Result<bool> {
        let millis = timeout.as_millis().try_into().unwrap_or(i32::MAX);
        let mut poll_fds = [PollFd::new(self.0.as_raw_fd(), PollFlags::POLLIN)];
        match poll(&mut poll_fds, millis) {
            Ok(n) => Ok(n > 0),
            Err(Errno::EINTR) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(not(unix))]
    pub fn poll_accept(&self, _timeout: Duration) -> io::Result<bool> {
        Ok(true)
    }

    /// Accepts a new connection. The returned stream is always in
    /// blocking mode.
    pub fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.0.accept()?;
        if Self::POLL_ACCEPT_WORKS {
            // The stream may inherit non-blocking mode from the
            // listener on some systems.
            stream.set_nonblocking(false)?;
        }
        Ok((stream, peer))
    }
}
