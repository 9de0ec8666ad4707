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

//! The interactive client.

use std::io::{self, BufRead, Write};
use std::net::SocketAddr;

use log::{debug, info};

use crate::io::Connection;
use crate::message::{canonicalize, Frame, Identifier};
use crate::transcript::Transcript;

/// The input line that ends an interactive session without sending
/// anything.
pub const QUIT_TOKEN: &str = "q";

const PROMPT: &str = "Enter a message request: ";

/// A client connected to a resolver.
pub struct Client {
    id: Identifier,
    connection: Connection,
}

/// What the resolver sent back for a request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reply {
    Response(String),

    /// The resolver is shutting down. Nothing more can be sent.
    Shutdown,
}

impl Client {
    /// Connects to the resolver at `server`.
    pub fn connect(id: Identifier, server: SocketAddr) -> io::Result<Self> {
        let connection = Connection::connect(server)?;
        info!("Client {} connected to {}.", id, server);
        Ok(Self { id, connection })
    }

    /// Returns the client's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sends a request and waits for the reply. The fields of `input`
    /// are trimmed before sending; the request is otherwise sent as
    /// typed, since the resolver does the validation. An `input` that
    /// reads as the shutdown sentinel is refused with
    /// [`io::ErrorKind::InvalidInput`] and nothing is sent.
    pub fn exchange(&mut self, input: &str) -> io::Result<Reply> {
        let request = canonicalize(input);
        if Frame::classify(&request) == Frame::Shutdown {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "the shutdown sentinel cannot be sent as a request",
            ));
        }
        self.connection.send(&request)?;
        debug!("Sent {:?}.", request);
        let received = self.connection.recv()?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "the resolver closed the connection",
            )
        })?;
        debug!("Received {:?}.", received);
        Ok(match Frame::classify(&received) {
            Frame::Shutdown => Reply::Shutdown,
            Frame::Message(message) => Reply::Response(message.to_owned()),
        })
    }

    /// Closes the connection.
    pub fn close(self) {
        self.connection.close();
        info!("Client {} disconnected.", self.id);
    }
}

/// Runs an interactive session: prompts on `output` for requests read
/// from `input` until the quit token, the end of `input`, or the
/// resolver's shutdown. Each completed exchange is recorded in
/// `transcript` as the typed line followed by the response. The
/// connection is closed when the session ends, even on error.
pub fn run_interactive<R, W>(
    mut client: Client,
    input: R,
    mut output: W,
    transcript: &dyn Transcript,
) -> io::Result<()>
where
    R: BufRead,
    W: Write,
{
    let result = converse(&mut client, input, &mut output, transcript);
    client.close();
    result
}

fn converse<R, W>(
    client: &mut Client,
    mut input: R,
    output: &mut W,
    transcript: &dyn Transcript,
) -> io::Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut line = String::new();
    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let typed = line.trim_end_matches(&['\r', '\n'][..]);
        if typed.trim() == QUIT_TOKEN {
            return Ok(());
        }

        let reply = match client.exchange(typed) {
            Ok(reply) => reply,
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                writeln!(output, "Not sent: {}.\n", e)?;
                continue;
            }
            Err(e) => return Err(e),
        };
        match reply {
            Reply::Shutdown => {
                writeln!(output, "The resolver has shut down.")?;
                return Ok(());
            }
            Reply::Response(response) => {
                writeln!(output, "Response received: {}\n", response)?;
                transcript.record_exchange(&[typed.to_owned(), response]);
            }
        }
    }
}
