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

//! The interface through which roles report their exchanges.
//!
//! Roles never write transcripts themselves; they hand each completed
//! exchange to a [`Transcript`]. Where the records go (files, memory,
//! nowhere) is up to the implementation.

use std::net::IpAddr;
use std::sync::Mutex;

/// A write-only sink for exchange records.
pub trait Transcript: Send + Sync {
    /// Records one completed exchange: the message that opened it, any
    /// upstream messages, and the response, in order.
    fn record_exchange(&self, lines: &[String]);

    /// Records that `hostname` was added to the resolver's cache.
    fn record_mapping(&self, _hostname: &str, _address: IpAddr) {}
}

/// A [`Transcript`] that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTranscript;

impl Transcript for NoTranscript {
    fn record_exchange(&self, _lines: &[String]) {}
}

/// A [`Transcript`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryTranscript {
    exchanges: Mutex<Vec<Vec<String>>>,
    mappings: Mutex<Vec<(String, IpAddr)>>,
}

impl MemoryTranscript {
    /// Creates a new, empty `MemoryTranscript`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the exchanges recorded so far.
    pub fn exchanges(&self) -> Vec<Vec<String>> {
        self.exchanges.lock().unwrap().clone()
    }

    /// Returns the cache insertions recorded so far.
    pub fn mappings(&self) -> Vec<(String, IpAddr)> {
        self.mappings.lock().unwrap().clone()
    }
}

impl Transcript for MemoryTranscript {
    fn record_exchange(&self, lines: &[String]) {
        self.exchanges.lock().unwrap().push(lines.to_vec());
    }

    fn record_mapping(&self, hostname: &str, address: IpAddr) {
        self.mappings
            .lock()
            .unwrap()
            .push((hostname.to_owned(), address));
    }
}
