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

//! The textual message grammar shared by all roles.
//!
//! Every message is a single record of comma-separated fields. On the
//! wire, fields may carry surrounding whitespace; the codec trims each
//! field and re-joins them with the canonical `", "` separator when
//! encoding. Requests have the form
//!
//! ```text
//! <requester>, <hostname>, <mode>
//! ```
//!
//! and responses the form
//!
//! ```text
//! <status>, <responder>, <payload>
//! ```
//!
//! where a redirect's payload is two fields (`<address>, <port>`).
//! Independently of the grammar, the literal line
//! [`SHUTDOWN_SENTINEL`] tells the receiver that its peer is
//! terminating. It must be recognized (see [`Frame::classify`]) before
//! any attempt to parse the grammar.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

mod request;
mod response;
mod status;

pub use request::{Mode, Request};
pub use response::{Answer, Response, INVALID_DIAGNOSTIC, NOT_FOUND_DIAGNOSTIC};
pub use status::{IntoStatusError, Status};

/// The out-of-grammar message announcing that a peer is shutting down.
pub const SHUTDOWN_SENTINEL: &str = "shutdown";

/// The canonical field separator used when encoding.
pub const FIELD_SEPARATOR: &str = ", ";

////////////////////////////////////////////////////////////////////////
// FRAMES                                                             //
////////////////////////////////////////////////////////////////////////

/// A message as received from a connection, before grammar parsing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Frame<'a> {
    /// The peer sent the [`SHUTDOWN_SENTINEL`].
    Shutdown,

    /// Anything else. This may or may not be well-formed.
    Message(&'a str),
}

impl<'a> Frame<'a> {
    /// Classifies a received line. Surrounding whitespace is ignored
    /// when checking for the sentinel.
    pub fn classify(line: &'a str) -> Self {
        if line.trim() == SHUTDOWN_SENTINEL {
            Self::Shutdown
        } else {
            Self::Message(line)
        }
    }
}

/// Trims every comma-separated field of `message` and re-joins them
/// with [`FIELD_SEPARATOR`].
pub fn canonicalize(message: &str) -> String {
    split_fields(message).join(FIELD_SEPARATOR)
}

/// Splits a message into trimmed fields.
pub(crate) fn split_fields(message: &str) -> Vec<&str> {
    message.split(',').map(str::trim).collect()
}

////////////////////////////////////////////////////////////////////////
// IDENTIFIERS                                                        //
////////////////////////////////////////////////////////////////////////

/// The identifier a role stamps on the messages it sends.
///
/// Identifiers are embedded in the message grammar, so they must be
/// non-empty and must not contain commas or line breaks. Surrounding
/// whitespace is trimmed on parsing.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Identifier(String);

impl FromStr for Identifier {
    type Err = InvalidIdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Err(InvalidIdentifierError::Empty)
        } else if let Some(c) = trimmed.chars().find(|c| matches!(c, ',' | '\n' | '\r')) {
            Err(InvalidIdentifierError::ForbiddenCharacter(c))
        } else {
            Ok(Self(trimmed.to_owned()))
        }
    }
}

impl Deref for Identifier {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An error signaling that a string is not a valid [`Identifier`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvalidIdentifierError {
    Empty,
    ForbiddenCharacter(char),
}

impl fmt::Display for InvalidIdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("identifier is empty"),
            Self::ForbiddenCharacter(c) => {
                write!(f, "identifier contains forbidden character {:?}", c)
            }
        }
    }
}

impl std::error::Error for InvalidIdentifierError {}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// Errors that can occur while parsing a [`Request`] or [`Response`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseError {
    /// The message has the wrong number of fields.
    FieldCount { expected: usize, found: usize },

    /// The request mode is neither `i` nor `r`.
    Mode(String),

    /// The hostname does not end in a supported suffix.
    Suffix(String),

    /// The response status code is not recognized.
    Status(String),

    /// An address in a response payload failed to parse.
    Address(String),

    /// The port of a redirect failed to parse.
    Port(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::FieldCount { expected, found } => {
                write!(f, "expected {} fields, found {}", expected, found)
            }
            Self::Mode(mode) => write!(f, "invalid request mode {:?}", mode),
            Self::Suffix(hostname) => write!(f, "unsupported domain suffix in {:?}", hostname),
            Self::Status(status) => write!(f, "invalid status code {:?}", status),
            Self::Address(address) => write!(f, "invalid address {:?}", address),
            Self::Port(port) => write!(f, "invalid port {:?}", port),
        }
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_trims_and_rejoins() {
        assert_eq!(canonicalize("c1 ,foo.com,   r "), "c1, foo.com, r");
        assert_eq!(canonicalize("c1, foo.com"), "c1, foo.com");
        assert_eq!(canonicalize(""), "");
    }

    #[test]
    fn sentinel_is_recognized_before_grammar() {
        assert_eq!(Frame::classify("shutdown"), Frame::Shutdown);
        assert_eq!(Frame::classify(" shutdown\r"), Frame::Shutdown);
        assert_eq!(
            Frame::classify("shutdown, foo.com, r"),
            Frame::Message("shutdown, foo.com, r")
        );
    }

    #[test]
    fn identifier_rejects_grammar_characters() {
        assert_eq!("".parse::<Identifier>(), Err(InvalidIdentifierError::Empty));
        assert_eq!(
            "a,b".parse::<Identifier>(),
            Err(InvalidIdentifierError::ForbiddenCharacter(','))
        );
        let id: Identifier = "  resolver ".parse().unwrap();
        assert_eq!(&*id, "resolver");
    }
}
