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

//! Hostname helpers shared by the roles.
//!
//! Hostnames travel through the protocol as plain text. Roles compare
//! them case-insensitively, and authoritative servers additionally
//! treat `www.example.com` and `example.com` as the same host. The
//! functions here implement those rules in one place.

/// The domain suffixes (top-level labels) that requests may name.
pub const SUPPORTED_SUFFIXES: [&str; 3] = ["com", "org", "gov"];

/// The label stripped from the front of hostnames by
/// [`normalize_hostname`].
const WWW_LABEL: &str = "www";

/// Normalizes a hostname for lookup in a host table.
///
/// Leading `www` labels are stripped (so long as at least one label
/// remains) and the result is lowercased. This is idempotent:
/// normalizing an already-normalized hostname returns it unchanged.
pub fn normalize_hostname(hostname: &str) -> String {
    let mut rest = hostname;
    while let Some((first, tail)) = rest.split_once('.') {
        if first.eq_ignore_ascii_case(WWW_LABEL) && !tail.is_empty() {
            rest = tail;
        } else {
            break;
        }
    }
    rest.to_ascii_lowercase()
}

/// Returns the final dot-separated label of `hostname`, lowercased.
/// A hostname without dots is its own suffix.
pub fn domain_suffix(hostname: &str) -> String {
    hostname
        .rsplit('.')
        .next()
        .unwrap_or(hostname)
        .to_ascii_lowercase()
}

/// Returns whether `hostname` ends in one of the
/// [`SUPPORTED_SUFFIXES`].
pub fn has_supported_suffix(hostname: &str) -> bool {
    let suffix = domain_suffix(hostname);
    SUPPORTED_SUFFIXES.contains(&suffix.as_str())
}
