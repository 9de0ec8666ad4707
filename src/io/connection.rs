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

//! Line framing over TCP streams.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use crate::message::SHUTDOWN_SENTINEL;

/// The longest message accepted, in bytes, not counting the line
/// terminator.
pub const MAX_MESSAGE_LEN: usize = 1024;

/// A connection carrying newline-terminated messages.
pub struct Connection {
    reader: BufReader<TcpStream>,
    peer: SocketAddr,
}

impl Connection {
    /// Wraps an accepted stream.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self {
            reader: BufReader::new(stream),
            peer,
        })
    }

    /// Opens a connection to `addr`.
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        TcpStream::connect(addr).and_then(Self::new)
    }

    /// Returns the address of the other end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Returns the underlying stream.
    pub fn stream(&self) -> &TcpStream {
        self.reader.get_ref()
    }

    /// Receives the next message, without its line terminator. Returns
    /// [`None`] once the peer has closed its side of the connection.
    /// A final message that the peer did not terminate before closing
    /// is still returned.
    pub fn recv(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let limit = MAX_MESSAGE_LEN as u64 + 1;
        let n = (&mut self.reader).take(limit).read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        } else if line.len() > MAX_MESSAGE_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("message exceeds {} bytes", MAX_MESSAGE_LEN),
            ));
        }
        Ok(Some(line))
    }

    /// Sends one message. `message` must not contain line breaks.
    pub fn send(&mut self, message: &str) -> io::Result<()> {
        let mut framed = String::with_capacity(message.len() + 1);
        framed.push_str(message);
        framed.push('\n');
        let mut stream = self.reader.get_ref();
        stream.write_all(framed.as_bytes())
    }

    /// Sends the shutdown sentinel.
    pub fn send_shutdown(&mut self) -> io::Result<()> {
        self.send(SHUTDOWN_SENTINEL)
    }

    /// Closes both directions of the connection. Errors are ignored,
    /// since the peer may already be gone.
    pub fn close(self) {
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let connector = thread::spawn(move || Connection::connect(addr).unwrap());
        let (accepted, _) = listener.accept().unwrap();
        (connector.join().unwrap(), accepted)
    }

    #[test]
    fn messages_are_split_on_line_breaks() {
        let (mut connection, mut raw) = pair();
        raw.write_all(b"c1, foo.com, r\r\nshutdown\nlast").unwrap();
        raw.shutdown(Shutdown::Write).unwrap();
        assert_eq!(connection.recv().unwrap().as_deref(), Some("c1, foo.com, r"));
        assert_eq!(connection.recv().unwrap().as_deref(), Some("shutdown"));
        assert_eq!(connection.recv().unwrap().as_deref(), Some("last"));
        assert_eq!(connection.recv().unwrap(), None);
    }

    #[test]
    fn overlong_messages_are_rejected() {
        let (mut connection, mut raw) = pair();
        raw.write_all(&[b'a'; MAX_MESSAGE_LEN + 10]).unwrap();
        let error = connection.recv().unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn sent_messages_are_terminated() {
        let (mut connection, raw) = pair();
        connection.send("0x00, resolver, 1.2.3.4").unwrap();
        connection.send_shutdown().unwrap();
        connection.close();
        let mut received = String::new();
        BufReader::new(raw).read_to_string(&mut received).unwrap();
        assert_eq!(received, "0x00, resolver, 1.2.3.4\nshutdown\n");
    }
}
