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

//! Implementation of the resolver's [`Cache`].

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use crate::message::Response;

/// The resolver's cache of successful resolutions.
///
/// Entries are keyed by the requested hostname, lowercased (but not
/// otherwise normalized). An entry is written at most once: the first
/// successful resolution of a hostname wins, and later inserts for the
/// same hostname are ignored. Entries never expire.
///
/// The cache is shared by every connection handler. Its mutex is held
/// for exactly one lookup or one insert; callers never hold it across
/// network I/O.
#[derive(Debug, Default)]
pub struct Cache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

#[derive(Debug)]
struct CacheEntry {
    address: IpAddr,
    response: Response,
}

impl Cache {
    /// Creates a new, empty `Cache`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached response for `hostname`, if any.
    pub fn get(&self, hostname: &str) -> Option<Response> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(&hostname.to_ascii_lowercase())
            .map(|entry| entry.response.clone())
    }

    /// Returns the cached address for `hostname`, if any.
    pub fn address_for(&self, hostname: &str) -> Option<IpAddr> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(&hostname.to_ascii_lowercase())
            .map(|entry| entry.address)
    }

    /// Caches `response` (which resolved to `address`) for `hostname`
    /// unless an entry already exists. Returns whether this call
    /// inserted the entry.
    pub fn insert(&self, hostname: &str, address: IpAddr, response: Response) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.entry(hostname.to_ascii_lowercase()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(CacheEntry { address, response });
                true
            }
        }
    }

    /// Returns the number of cached hostnames.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
