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

//! Static registries loaded once per role.
//!
//! Two registries exist:
//!
//! * A [`ZoneTable`] maps domain suffixes (`com`, `org`, ...) to the
//!   address of the authoritative server for that suffix. The root
//!   uses it for delegation; every role uses it to find the peers it
//!   must notify on shutdown. Its source format is one record per line:
//!   `<suffix> <address> <port>`.
//!
//! * A [`HostTable`] maps hostnames to addresses for one authoritative
//!   server. Its source format is one record per line:
//!   `<hostname> <address>`.
//!
//! Fields are separated by whitespace. Blank lines are skipped. Later
//! records replace earlier ones with the same key. Both registries are
//! read-only once loaded.

use std::collections::HashMap;
use std::io::BufRead;
use std::net::{IpAddr, SocketAddr};

use crate::hostname::normalize_hostname;

mod error;
pub use error::{Error, ErrorDetails, ErrorKind, Result};

////////////////////////////////////////////////////////////////////////
// ZONE TABLE                                                         //
////////////////////////////////////////////////////////////////////////

/// The mapping from domain suffix to authoritative server.
#[derive(Clone, Debug, Default)]
pub struct ZoneTable {
    servers: HashMap<String, SocketAddr>,
}

impl ZoneTable {
    /// Creates a new, empty `ZoneTable`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `ZoneTable` from its line-oriented source.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut table = Self::new();
        for_each_record(reader, 3, |fields, line| {
            let address = parse_address(fields[1], line)?;
            let port = fields[2]
                .parse()
                .map_err(|_| Error::new(line, ErrorKind::InvalidPort(fields[2].into())))?;
            table.insert(fields[0], SocketAddr::new(address, port));
            Ok(())
        })?;
        Ok(table)
    }

    /// Adds a delegation, replacing any previous one for `suffix`.
    pub fn insert(&mut self, suffix: &str, server: SocketAddr) {
        self.servers.insert(suffix.to_ascii_lowercase(), server);
    }

    /// Returns the server responsible for `suffix`, compared
    /// case-insensitively.
    pub fn address_for(&self, suffix: &str) -> Option<SocketAddr> {
        self.servers.get(&suffix.to_ascii_lowercase()).copied()
    }

    /// Returns the distinct server addresses in the table, in sorted
    /// order. A server delegated more than one suffix appears once.
    pub fn servers(&self) -> Vec<SocketAddr> {
        let mut servers: Vec<SocketAddr> = self.servers.values().copied().collect();
        servers.sort();
        servers.dedup();
        servers
    }

    /// Returns the number of suffixes in the table.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////
// HOST TABLE                                                         //
////////////////////////////////////////////////////////////////////////

/// The mapping from hostname to address held by an authoritative
/// server.
///
/// Keys are normalized with [`normalize_hostname`] both on insertion
/// and on lookup, so `www.Example.com` and `example.com` are the same
/// host.
#[derive(Clone, Debug, Default)]
pub struct HostTable {
    hosts: HashMap<String, IpAddr>,
}

impl HostTable {
    /// Creates a new, empty `HostTable`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `HostTable` from its line-oriented source.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut table = Self::new();
        for_each_record(reader, 2, |fields, line| {
            table.insert(fields[0], parse_address(fields[1], line)?);
            Ok(())
        })?;
        Ok(table)
    }

    /// Adds a host, replacing any previous address.
    pub fn insert(&mut self, hostname: &str, address: IpAddr) {
        self.hosts.insert(normalize_hostname(hostname), address);
    }

    /// Returns the address of `hostname`, if known.
    pub fn address_for(&self, hostname: &str) -> Option<IpAddr> {
        self.hosts.get(&normalize_hostname(hostname)).copied()
    }

    /// Returns the number of hosts in the table.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////
// PARSING HELPERS                                                    //
////////////////////////////////////////////////////////////////////////

/// Splits each non-blank line of `reader` into whitespace-separated
/// fields and passes them to `f` along with the 1-based line number.
fn for_each_record<R, F>(reader: R, fields_per_record: usize, mut f: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(&[&str], usize) -> Result<()>,
{
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let number = i + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        } else if fields.len() != fields_per_record {
            return Err(Error::new(
                number,
                ErrorKind::FieldCount {
                    expected: fields_per_record,
                    found: fields.len(),
                },
            ));
        }
        f(&fields, number)?;
    }
    Ok(())
}

fn parse_address(field: &str, line: usize) -> Result<IpAddr> {
    field
        .parse()
        .map_err(|_| Error::new(line, ErrorKind::InvalidAddress(field.into())))
}
