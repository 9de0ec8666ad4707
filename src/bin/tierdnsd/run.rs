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

//! Implements the `serve` command (i.e., running a server role).

use std::fmt::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use env_logger::Env;
use log::{error, info};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use tierdns::io::{BlockingIoProvider, Concurrency};
use tierdns::server::{Authoritative, Resolver, RootDelegator, Service, TcpUpstream};
use tierdns::shutdown::{broadcast_targets, ShutdownCoordinator};
use tierdns::thread::ThreadGroup;

use crate::args::ServeArgs;
use crate::config::{self, Config, RoleConfig};
use crate::registries;
use crate::transcript::FileTranscript;

/// Initializes logging. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    env_logger::init_from_env(Env::new().default_filter_or("info"));
}

/// Logs the cause chain of a fatal error and exits with failure.
pub fn exit_with_failure(action: &str, e: anyhow::Error) -> ! {
    let mut message = format!("Failed to {}:", action);
    for (i, cause) in e.chain().enumerate() {
        write!(message, "\n[{}] {}", i + 1, cause).unwrap();
    }
    message.push_str("\nExiting with failure.");
    error!("{}", message);
    process::exit(1);
}

/// Runs a server role.
pub fn run(args: ServeArgs) {
    init_logging();

    if let Err(e) = try_running(args) {
        exit_with_failure("run", e);
    }
    info!("Exiting with success.");
}

fn try_running(serve_args: ServeArgs) -> Result<()> {
    info!(
        "tierdns daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    // Get the configuration, either from the file system or from the
    // command line arguments, as appropriate.
    let config = if let Some(ref config_path) = serve_args.config {
        info!("Loading the configuration from {}.", config_path.display());
        config::load_from_path(config_path).context("failed to load the configuration")?
    } else {
        info!("Loading the configuration from the command line.");
        config::load_from_args(serve_args).context("failed to load the configuration")?
    };

    // Bind before loading the registries, so that we fail fast.
    let bind = config.bind().ok_or_else(|| {
        anyhow!(
            "no bind address is configured for the {} role",
            config.role.name()
        )
    })?;
    let concurrency = match config.role {
        RoleConfig::Resolver(ref resolver) => Concurrency::PerConnection {
            max_connections: resolver.max_clients,
        },
        RoleConfig::Root(_) | RoleConfig::Authoritative(_) => Concurrency::Serial,
    };
    let io_provider = BlockingIoProvider::bind(bind, concurrency)
        .with_context(|| format!("failed to bind {}", bind))?;
    let own_addr = io_provider
        .local_addr()
        .context("failed to get the bound address")?;

    let Config {
        id, transcript, role, ..
    } = config;
    let role = build_role(id.0, role, own_addr)?;
    let transcript = FileTranscript::create(transcript.as_deref(), role.mappings.as_deref())
        .context("failed to set up the transcript")?;

    // Set up signal handling.
    let mut signals = set_up_signal_handling().context("failed to set up signal handling")?;

    // Start the I/O provider. If the role stops on its own (because a
    // peer announced its shutdown), stop waiting for signals.
    info!("Set-up is complete; starting the {} role.", role.name);
    let thread_group = ThreadGroup::new();
    let coordinator = ShutdownCoordinator::new(
        thread_group.clone(),
        io_provider.peers().clone(),
        role.targets,
    );
    let signals_handle = signals.handle();
    coordinator.on_stop(move || signals_handle.close());
    io_provider
        .start(role.service, Arc::new(transcript), &coordinator)
        .context("failed to start the I/O provider")?;

    // Process incoming signals.
    for signal in signals.forever() {
        match signal {
            s @ (SIGINT | SIGTERM) => {
                let name = match s {
                    SIGINT => "SIGINT",
                    SIGTERM => "SIGTERM",
                    _ => unreachable!(),
                };
                info!("Received {}; shutting down.", name);
                coordinator.trigger();
                break;
            }
            _ => unreachable!(),
        }
    }

    // Shut down the role.
    if BlockingIoProvider::SUPPORTS_GRACEFUL_SHUTDOWN {
        thread_group.shut_down();
        thread_group.await_shutdown();
        info!("Shutdown complete.");
    }
    Ok(())
}

/// A role ready to be started.
struct Role {
    name: &'static str,
    service: Arc<dyn Service>,
    targets: Vec<SocketAddr>,
    mappings: Option<PathBuf>,
}

/// Loads the registries of a role and creates its [`Service`].
fn build_role(
    id: tierdns::message::Identifier,
    config: RoleConfig,
    own_addr: SocketAddr,
) -> Result<Role> {
    let name = config.name();
    let role = match config {
        RoleConfig::Resolver(resolver) => {
            let zones = registries::load_zones(&resolver.zones)?;
            Role {
                name,
                targets: broadcast_targets(&[resolver.root], &zones, own_addr),
                service: Arc::new(Resolver::new(id, resolver.root, TcpUpstream)),
                mappings: resolver.mappings,
            }
        }
        RoleConfig::Root(root) => {
            let zones = registries::load_zones(&root.zones)?;
            Role {
                name,
                targets: broadcast_targets(&[root.resolver], &zones, own_addr),
                service: Arc::new(RootDelegator::new(id, zones, TcpUpstream)),
                mappings: None,
            }
        }
        RoleConfig::Authoritative(authoritative) => {
            let zones = registries::load_zones(&authoritative.zones)?;
            let hosts = registries::load_hosts(&authoritative.hosts)?;
            Role {
                name,
                targets: broadcast_targets(
                    &[authoritative.resolver, authoritative.root],
                    &zones,
                    own_addr,
                ),
                service: Arc::new(Authoritative::new(id, hosts)),
                mappings: None,
            }
        }
    };
    info!(
        "The {} role will notify {} peer(s) on shutdown.",
        role.name,
        role.targets.len()
    );
    Ok(role)
}

fn set_up_signal_handling() -> Result<Signals> {
    let term_signals = &[SIGINT, SIGTERM];
    let already_terminating = Arc::new(AtomicBool::new(false));

    // This sets up signal handlers to exit immediately if a second
    // termination signal arrives before the process finishes shutting
    // down gracefully.
    for sig in term_signals {
        signal_hook::flag::register_conditional_shutdown(*sig, 1, already_terminating.clone())?;
        signal_hook::flag::register(*sig, already_terminating.clone())?;
    }

    Signals::new(term_signals).map_err(Into::into)
}
