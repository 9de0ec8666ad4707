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

//! Network I/O for running [`Service`s](crate::server::Service).
//!
//! A [`Service`](crate::server::Service) implements the processing
//! logic of a role abstracted from network I/O. To actually run one, an
//! I/O provider is needed: the [`BlockingIoProvider`] accepts
//! connections, frames messages, feeds them to the service, and writes
//! back the responses.
//!
//! The building blocks are public too: a [`Listener`] with timed
//! accepts, a line-framed [`Connection`], and the [`PeerSet`] of
//! connected peers that shutdown closes.

mod blocking;
mod connection;
mod listener;
mod peers;

pub use blocking::{BlockingIoProvider, Concurrency};
pub use connection::{Connection, MAX_MESSAGE_LEN};
pub use listener::Listener;
pub use peers::{PeerKey, PeerSet, Registration};
