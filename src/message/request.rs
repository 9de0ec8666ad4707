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

//! Implementation of the [`Request`] type.

use std::fmt;

use super::{split_fields, ParseError};
use crate::hostname::has_supported_suffix;

/// How a request should be completed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Mode {
    /// The requester contacts the next hop itself when redirected.
    Iterative,

    /// The contacted role resolves the whole chain.
    Recursive,
}

impl Mode {
    /// Parses a mode field. The field is case-insensitive.
    fn from_field(field: &str) -> Option<Self> {
        if field.eq_ignore_ascii_case("i") {
            Some(Self::Iterative)
        } else if field.eq_ignore_ascii_case("r") {
            Some(Self::Recursive)
        } else {
            None
        }
    }

    /// Returns the wire form of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Iterative => "i",
            Self::Recursive => "r",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to resolve a hostname.
///
/// Each role that forwards a request stamps its own identifier on it
/// first; see [`Request::retagged`]. The hostname is carried exactly
/// as the client wrote it (apart from trimming).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Request {
    requester: String,
    hostname: String,
    mode: Mode,
}

impl Request {
    /// The number of fields in a request.
    pub const FIELDS: usize = 3;

    /// Creates a new `Request`.
    pub fn new(requester: impl Into<String>, hostname: impl Into<String>, mode: Mode) -> Self {
        Self {
            requester: requester.into(),
            hostname: hostname.into(),
            mode,
        }
    }

    /// Decodes the structure of a request: the field count and the
    /// mode. The hostname is not checked; roles downstream of the
    /// resolver use this, since the resolver has already validated the
    /// request in full.
    pub fn decode(message: &str) -> Result<Self, ParseError> {
        let fields = split_fields(message);
        if fields.len() != Self::FIELDS {
            return Err(ParseError::FieldCount {
                expected: Self::FIELDS,
                found: fields.len(),
            });
        }
        let mode = Mode::from_field(fields[2]).ok_or_else(|| ParseError::Mode(fields[2].into()))?;
        Ok(Self::new(fields[0], fields[1], mode))
    }

    /// Decodes and fully validates a request received from a client.
    pub fn parse(message: &str) -> Result<Self, ParseError> {
        let request = Self::decode(message)?;
        request.validate()?;
        Ok(request)
    }

    /// Checks that the hostname ends in a supported suffix.
    pub fn validate(&self) -> Result<(), ParseError> {
        if has_supported_suffix(&self.hostname) {
            Ok(())
        } else {
            Err(ParseError::Suffix(self.hostname.clone()))
        }
    }

    /// Returns the identifier of the role that last sent this request.
    pub fn requester(&self) -> &str {
        &self.requester
    }

    /// Returns the hostname to resolve.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Returns the resolution mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns a copy of this request stamped with `requester`, ready
    /// to be forwarded upstream.
    pub fn retagged(&self, requester: &str) -> Self {
        Self {
            requester: requester.to_owned(),
            hostname: self.hostname.clone(),
            mode: self.mode,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}, {}, {}", self.requester, self.hostname, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_valid_requests() {
        let request = Request::parse(" c1 ,Foo.COM,R").unwrap();
        assert_eq!(request.requester(), "c1");
        assert_eq!(request.hostname(), "Foo.COM");
        assert_eq!(request.mode(), Mode::Recursive);
        assert_eq!(request.to_string(), "c1, Foo.COM, r");
    }

    #[test]
    fn parse_rejects_wrong_field_count() {
        assert_eq!(
            Request::parse("c1, foo.com"),
            Err(ParseError::FieldCount {
                expected: 3,
                found: 2
            })
        );
        assert!(Request::parse("c1, foo.com, r, extra").is_err());
    }

    #[test]
    fn parse_rejects_bad_mode() {
        assert_eq!(
            Request::parse("c1, foo.com, x"),
            Err(ParseError::Mode("x".into()))
        );
    }

    #[test]
    fn parse_rejects_bad_suffix() {
        assert_eq!(
            Request::parse("c1, foo.xyz, r"),
            Err(ParseError::Suffix("foo.xyz".into()))
        );
    }

    #[test]
    fn decode_does_not_check_suffix() {
        let request = Request::decode("c1, foo.xyz, i").unwrap();
        assert_eq!(request.mode(), Mode::Iterative);
    }

    #[test]
    fn retagging_replaces_only_the_requester() {
        let request = Request::new("c1", "www.example.org", Mode::Iterative);
        let forwarded = request.retagged("resolver");
        assert_eq!(forwarded.to_string(), "resolver, www.example.org, i");
        assert_eq!(request.requester(), "c1");
    }
}
