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

//! Error types for registry loading.

use std::fmt;
use std::io;

////////////////////////////////////////////////////////////////////////
// ERROR STRUCTURE                                                    //
////////////////////////////////////////////////////////////////////////

/// Represents errors that may occur while loading a registry.
#[derive(Debug)]
pub enum Error {
    /// I/O errors encountered while reading the source.
    Io(io::Error),

    /// Syntax errors.
    Syntax(ErrorDetails),
}

impl Error {
    /// Constructs a new [`Error`] of the [`Syntax`](`Error::Syntax`)
    /// variant.
    pub(super) fn new(line: usize, kind: ErrorKind) -> Self {
        Self::Syntax(ErrorDetails { line, kind })
    }
}

impl From<io::Error> for Error {
    fn from(io_error: io::Error) -> Self {
        Self::Io(io_error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(io_error) => write!(f, "I/O error: {}", io_error),
            Self::Syntax(details) => details.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(io_error) => Some(io_error),
            Self::Syntax(_) => None,
        }
    }
}

/// A result type for registry loading.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// SYNTAX ERROR DETAILS                                               //
////////////////////////////////////////////////////////////////////////

/// Provides information about the position and kind of a syntax error.
#[derive(Debug)]
pub struct ErrorDetails {
    line: usize,
    kind: ErrorKind,
}

impl ErrorDetails {
    /// Returns the line at which the error occurred.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Returns the kind of syntax error that occurred.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at line {}", self.kind, self.line)
    }
}

/// Kinds of registry syntax errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    FieldCount { expected: usize, found: usize },
    InvalidAddress(String),
    InvalidPort(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::FieldCount { expected, found } => {
                write!(f, "expected {} fields but found {}", expected, found)
            }
            Self::InvalidAddress(address) => write!(f, "invalid IP address {:?}", address),
            Self::InvalidPort(port) => write!(f, "invalid port {:?}", port),
        }
    }
}
