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

//! Implements registry loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};

use tierdns::hostname::SUPPORTED_SUFFIXES;
use tierdns::zone::{HostTable, ZoneTable};

/// Loads the zones file at `path`.
pub fn load_zones(path: &Path) -> Result<ZoneTable> {
    debug!("Loading zones from {}.", path.display());
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let zones = ZoneTable::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))?;

    for suffix in SUPPORTED_SUFFIXES {
        if zones.address_for(suffix).is_none() {
            warn!(
                "{} has no server for the .{} suffix; requests for it will fail.",
                path.display(),
                suffix,
            );
        }
    }
    debug!("Loaded {} zone(s).", zones.len());
    Ok(zones)
}

/// Loads the hosts file at `path`.
pub fn load_hosts(path: &Path) -> Result<HostTable> {
    debug!("Loading hosts from {}.", path.display());
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let hosts = HostTable::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))?;
    if hosts.is_empty() {
        warn!("{} has no hosts; every lookup will fail.", path.display());
    }
    debug!("Loaded {} host(s).", hosts.len());
    Ok(hosts)
}
