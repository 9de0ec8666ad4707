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

//! A simulation of hierarchical name resolution.
//!
//! Four roles cooperate over line-oriented TCP connections: a client
//! sends requests to a caching resolver, which resolves them through a
//! root delegator and a set of authoritative zone servers, either
//! iteratively (the root redirects the resolver) or recursively (the
//! root asks on the resolver's behalf). The [`message`] module defines
//! the wire format, [`server`] the roles' processing logic, and [`io`]
//! the network plumbing that runs them. Shutdown of any role is
//! broadcast to the others by [`shutdown`].

pub mod client;
pub mod hostname;
pub mod io;
pub mod message;
pub mod server;
pub mod shutdown;
pub mod thread;
pub mod transcript;
pub mod zone;
