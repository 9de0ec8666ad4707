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

//! Implements the `client` command.

use std::io;

use anyhow::{Context, Result};

use tierdns::client::{self, Client};

use crate::args::ClientArgs;
use crate::run::{exit_with_failure, init_logging};
use crate::transcript::FileTranscript;

/// Runs the interactive client on standard input and output.
pub fn run(args: ClientArgs) {
    init_logging();

    if let Err(e) = try_running(args) {
        exit_with_failure("run the client", e);
    }
}

fn try_running(args: ClientArgs) -> Result<()> {
    let transcript = FileTranscript::create(args.transcript.as_deref(), None)
        .context("failed to set up the transcript")?;
    let client = Client::connect(args.id, args.server)
        .with_context(|| format!("failed to connect to {}", args.server))?;
    client::run_interactive(client, io::stdin().lock(), io::stdout().lock(), &transcript)
        .context("the session ended abnormally")
}
