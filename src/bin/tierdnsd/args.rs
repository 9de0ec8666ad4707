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

//! Implements command-line argument parsing.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};

use tierdns::message::Identifier;

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// The tierdns name-resolution simulation
#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a server role
    Serve(ServeArgs),

    /// Run the interactive client
    Client(ClientArgs),
}

#[derive(Debug, Parser)]
#[command(group(ArgGroup::new("source").required(true).args(["config", "role"])))]
pub struct ServeArgs {
    /// Set the configuration file to use
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = [
            "role", "id", "bind", "ip", "port", "zones", "hosts", "root",
            "resolver", "transcript", "mappings", "max_clients",
        ],
    )]
    pub config: Option<PathBuf>,

    /// Set the role to run
    #[arg(long, value_enum, requires = "id")]
    pub role: Option<RoleKind>,

    /// Set the identifier the role stamps on its messages
    #[arg(long)]
    pub id: Option<Identifier>,

    /// Set the bind IP address and port
    #[arg(long, value_name = "IP:PORT")]
    pub bind: Option<SocketAddr>,

    /// Set the bind IP address
    #[arg(long, conflicts_with = "bind", value_name = "IP")]
    pub ip: Option<IpAddr>,

    /// Set the bind port
    #[arg(long, conflicts_with = "bind", value_name = "PORT")]
    pub port: Option<u16>,

    /// Set the zones file (suffix to authoritative server)
    #[arg(long, value_name = "FILE")]
    pub zones: Option<PathBuf>,

    /// Set the hosts file of an authoritative server
    #[arg(long, value_name = "FILE")]
    pub hosts: Option<PathBuf>,

    /// Set the root server address
    #[arg(long, value_name = "IP:PORT")]
    pub root: Option<SocketAddr>,

    /// Set the resolver address
    #[arg(long, value_name = "IP:PORT")]
    pub resolver: Option<SocketAddr>,

    /// Write a transcript of every exchange to FILE
    #[arg(long, value_name = "FILE")]
    pub transcript: Option<PathBuf>,

    /// Write the resolver's cache insertions to FILE
    #[arg(long, value_name = "FILE")]
    pub mappings: Option<PathBuf>,

    /// Limit the number of simultaneous resolver clients
    #[arg(long, value_name = "COUNT")]
    pub max_clients: Option<usize>,
}

/// The roles a server process can run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum RoleKind {
    Resolver,
    Root,
    Authoritative,
}

#[derive(Debug, Parser)]
pub struct ClientArgs {
    /// Set the client identifier
    pub id: Identifier,

    /// Set the resolver address
    #[arg(long, default_value = "127.0.0.1:5352", value_name = "IP:PORT")]
    pub server: SocketAddr,

    /// Write a transcript of every exchange to FILE
    #[arg(long, value_name = "FILE")]
    pub transcript: Option<PathBuf>,
}
