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

//! Implements file-backed transcripts.

use std::fs::File;
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use log::warn;

use tierdns::transcript::Transcript;

/// A [`Transcript`] that writes exchanges and cache insertions to
/// files. Each file is truncated when the transcript is created.
/// Exchanges are written one message per line, with a blank line
/// between exchanges; cache insertions are written as
/// `<hostname> <address>` lines.
pub struct FileTranscript {
    exchanges: Option<Mutex<BlockFile>>,
    mappings: Option<Mutex<File>>,
}

struct BlockFile {
    file: File,
    empty: bool,
}

impl FileTranscript {
    /// Creates a new `FileTranscript`. Either file may be omitted, in
    /// which case those records are discarded.
    pub fn create(exchanges: Option<&Path>, mappings: Option<&Path>) -> Result<Self> {
        let exchanges = match exchanges {
            Some(path) => Some(Mutex::new(BlockFile {
                file: create(path)?,
                empty: true,
            })),
            None => None,
        };
        let mappings = match mappings {
            Some(path) => Some(Mutex::new(create(path)?)),
            None => None,
        };
        Ok(Self {
            exchanges,
            mappings,
        })
    }
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("failed to create {}", path.display()))
}

impl Transcript for FileTranscript {
    fn record_exchange(&self, lines: &[String]) {
        if let Some(ref exchanges) = self.exchanges {
            let mut exchanges = exchanges.lock().unwrap();
            let result = exchanges.write_block(lines);
            log_write_errors(result);
        }
    }

    fn record_mapping(&self, hostname: &str, address: IpAddr) {
        if let Some(ref mappings) = self.mappings {
            let mut file = mappings.lock().unwrap();
            log_write_errors(writeln!(file, "{} {}", hostname, address));
        }
    }
}

impl BlockFile {
    fn write_block(&mut self, lines: &[String]) -> io::Result<()> {
        let mut block = String::new();
        if !self.empty {
            block.push('\n');
        }
        for line in lines {
            block.push_str(line);
            block.push('\n');
        }
        self.file.write_all(block.as_bytes())?;
        self.empty = false;
        Ok(())
    }
}

fn log_write_errors(result: io::Result<()>) {
    if let Err(e) = result {
        warn!("Failed to write to the transcript: {}", e);
    }
}
