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

//! Implementation of the [`Status`] type.

use std::fmt;
use std::str::FromStr;

////////////////////////////////////////////////////////////////////////
// STATUS CODES                                                       //
////////////////////////////////////////////////////////////////////////

/// The status code that opens every response.
///
/// On the wire, status codes are written as two-digit hexadecimal
/// literals (`0x00`, `0xFF`, `0xEE`, `0x01`).
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    /// The hostname resolved; the payload is its address.
    Ok,

    /// The hostname has no record; the payload is a diagnostic.
    NotFound,

    /// The request was malformed; the payload is a diagnostic.
    Invalid,

    /// The requester must ask another server; the payload is that
    /// server's address and port.
    Redirect,
}

impl Status {
    /// Returns the wire form of the status code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "0x00",
            Self::NotFound => "0xFF",
            Self::Invalid => "0xEE",
            Self::Redirect => "0x01",
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = IntoStatusError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Ok),
            0xFF => Ok(Self::NotFound),
            0xEE => Ok(Self::Invalid),
            0x01 => Ok(Self::Redirect),
            _ => Err(IntoStatusError),
        }
    }
}

impl From<Status> for u8 {
    fn from(value: Status) -> Self {
        match value {
            Status::Ok => 0x00,
            Status::NotFound => 0xFF,
            Status::Invalid => 0xEE,
            Status::Redirect => 0x01,
        }
    }
}

impl FromStr for Status {
    type Err = IntoStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or(IntoStatusError)?;
        if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(IntoStatusError);
        }
        u8::from_str_radix(digits, 16)
            .map_err(|_| IntoStatusError)
            .and_then(Self::try_from)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that the provided value is not a valid status
/// code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IntoStatusError;

impl fmt::Display for IntoStatusError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("not a valid status code")
    }
}

impl std::error::Error for IntoStatusError {}
