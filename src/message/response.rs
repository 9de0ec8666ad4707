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

//! Implementation of the [`Response`] type.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use super::{split_fields, ParseError, Status, FIELD_SEPARATOR};

/// The diagnostic sent with [`Status::NotFound`] responses.
pub const NOT_FOUND_DIAGNOSTIC: &str = "Host not found";

/// The diagnostic sent with [`Status::Invalid`] responses.
pub const INVALID_DIAGNOSTIC: &str = "Invalid format";

/// The payload of a [`Response`], which determines its [`Status`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Answer {
    Address(IpAddr),
    NotFound(String),
    Invalid(String),
    Redirect(SocketAddr),
}

impl Answer {
    /// Returns the status code corresponding to this answer.
    pub fn status(&self) -> Status {
        match self {
            Self::Address(_) => Status::Ok,
            Self::NotFound(_) => Status::NotFound,
            Self::Invalid(_) => Status::Invalid,
            Self::Redirect(_) => Status::Redirect,
        }
    }
}

/// A response to a [`Request`](super::Request).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    responder: String,
    answer: Answer,
}

impl Response {
    /// Creates a new `Response`.
    pub fn new(responder: impl Into<String>, answer: Answer) -> Self {
        Self {
            responder: responder.into(),
            answer,
        }
    }

    /// Creates a [`Status::Ok`] response.
    pub fn address(responder: impl Into<String>, address: IpAddr) -> Self {
        Self::new(responder, Answer::Address(address))
    }

    /// Creates a [`Status::NotFound`] response with the standard
    /// diagnostic.
    pub fn not_found(responder: impl Into<String>) -> Self {
        Self::new(responder, Answer::NotFound(NOT_FOUND_DIAGNOSTIC.to_owned()))
    }

    /// Creates a [`Status::Invalid`] response with the standard
    /// diagnostic.
    pub fn invalid(responder: impl Into<String>) -> Self {
        Self::new(responder, Answer::Invalid(INVALID_DIAGNOSTIC.to_owned()))
    }

    /// Creates a [`Status::Redirect`] response pointing at `server`.
    pub fn redirect(responder: impl Into<String>, server: SocketAddr) -> Self {
        Self::new(responder, Answer::Redirect(server))
    }

    /// Decodes a response.
    pub fn decode(message: &str) -> Result<Self, ParseError> {
        let fields = split_fields(message);
        if fields.len() < 3 {
            return Err(ParseError::FieldCount {
                expected: 3,
                found: fields.len(),
            });
        }
        let status: Status = fields[0]
            .parse()
            .map_err(|_| ParseError::Status(fields[0].into()))?;
        let responder = fields[1];
        let payload = &fields[2..];

        let answer = match status {
            Status::Ok => {
                expect_fields(&fields, 3)?;
                Answer::Address(parse_address(payload[0])?)
            }
            Status::Redirect => {
                expect_fields(&fields, 4)?;
                let address = parse_address(payload[0])?;
                let port = payload[1]
                    .parse()
                    .map_err(|_| ParseError::Port(payload[1].into()))?;
                Answer::Redirect(SocketAddr::new(address, port))
            }

            // Diagnostics are free text, so any commas they contained
            // are restored.
            Status::NotFound => Answer::NotFound(payload.join(FIELD_SEPARATOR)),
            Status::Invalid => Answer::Invalid(payload.join(FIELD_SEPARATOR)),
        };
        Ok(Self::new(responder, answer))
    }

    /// Returns the status code of the response.
    pub fn status(&self) -> Status {
        self.answer.status()
    }

    /// Returns the identifier of the role that last sent this response.
    pub fn responder(&self) -> &str {
        &self.responder
    }

    /// Returns the payload.
    pub fn answer(&self) -> &Answer {
        &self.answer
    }

    /// Consumes the response, returning the payload.
    pub fn into_answer(self) -> Answer {
        self.answer
    }

    /// Returns this response stamped with `responder`, ready to be sent
    /// back downstream.
    pub fn retagged(self, responder: &str) -> Self {
        Self {
            responder: responder.to_owned(),
            answer: self.answer,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}, {}, ", self.status(), self.responder)?;
        match &self.answer {
            Answer::Address(address) => write!(f, "{}", address),
            Answer::NotFound(diagnostic) | Answer::Invalid(diagnostic) => f.write_str(diagnostic),
            Answer::Redirect(server) => write!(f, "{}, {}", server.ip(), server.port()),
        }
    }
}

fn expect_fields(fields: &[&str], expected: usize) -> Result<(), ParseError> {
    if fields.len() == expected {
        Ok(())
    } else {
        Err(ParseError::FieldCount {
            expected,
            found: fields.len(),
        })
    }
}

fn parse_address(field: &str) -> Result<IpAddr, ParseError> {
    field.parse().map_err(|_| ParseError::Address(field.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn responses_encode_canonically() {
        let ok = Response::address("resolver", IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)));
        assert_eq!(ok.to_string(), "0x00, resolver, 1.2.3.4");
        assert_eq!(
            Response::not_found("com").to_string(),
            "0xFF, com, Host not found"
        );
        assert_eq!(
            Response::invalid("resolver").to_string(),
            "0xEE, resolver, Invalid format"
        );
        let redirect = Response::redirect("root", "127.0.0.1:5354".parse().unwrap());
        assert_eq!(redirect.to_string(), "0x01, root, 127.0.0.1, 5354");
    }

    #[test]
    fn redirects_decode_from_four_fields() {
        let response = Response::decode("0x01,root,127.0.0.1,5354").unwrap();
        assert_eq!(response.status(), Status::Redirect);
        assert_eq!(response.responder(), "root");
        assert_eq!(
            response.answer(),
            &Answer::Redirect("127.0.0.1:5354".parse().unwrap())
        );
    }

    #[test]
    fn malformed_responses_are_rejected() {
        assert_eq!(
            Response::decode("0x00, com"),
            Err(ParseError::FieldCount {
                expected: 3,
                found: 2
            })
        );
        assert_eq!(
            Response::decode("0x42, com, 1.2.3.4"),
            Err(ParseError::Status("0x42".into()))
        );
        assert_eq!(
            Response::decode("0x00, com, not-an-ip"),
            Err(ParseError::Address("not-an-ip".into()))
        );
        assert_eq!(
            Response::decode("0x01, root, 127.0.0.1, port"),
            Err(ParseError::Port("port".into()))
        );
        assert!(Response::decode("0x01, root, 127.0.0.1").is_err());
    }

    #[test]
    fn retagging_keeps_the_answer() {
        let response = Response::decode("0xFF, com, Host not found")
            .unwrap()
            .retagged("root");
        assert_eq!(response.to_string(), "0xFF, root, Host not found");
    }
}
