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

//! Implements the server configuration file.

use std::fmt::{self, Write};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use paste::paste;
use serde::{de, Deserialize};

use tierdns::message::Identifier;

use crate::args::{RoleKind, ServeArgs};

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the server configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let dir = match path.as_ref().parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let raw_config = fs::read(path.as_ref()).context("failed to read the configuration file")?;
    let mut config: Config =
        toml::from_slice(&raw_config).context("failed to parse the configuration file")?;

    // When loading the configuration from a path, all file paths are
    // interpreted relative to the configuration file's directory.
    config.resolve_paths(dir);

    log_config_summary(&config);
    Ok(config)
}

/// Loads the server configuration from the parsed command line
/// arguments given by `args`.
pub fn load_from_args(args: ServeArgs) -> Result<Config> {
    let kind = args
        .role
        .ok_or_else(|| anyhow!("no role was given on the command line"))?;
    let id = args
        .id
        .ok_or_else(|| anyhow!("no identifier was given on the command line"))?;
    let zones = args
        .zones
        .ok_or_else(|| anyhow!("the {:?} role requires --zones", kind))?;
    let root = args.root.unwrap_or_else(default_root);
    let resolver = args.resolver.unwrap_or_else(default_resolver);

    let role = match kind {
        RoleKind::Resolver => RoleConfig::Resolver(ResolverConfig {
            zones,
            root,
            mappings: args.mappings,
            max_clients: args.max_clients,
        }),
        RoleKind::Root => RoleConfig::Root(RootConfig { zones, resolver }),
        RoleKind::Authoritative => RoleConfig::Authoritative(AuthoritativeConfig {
            hosts: args
                .hosts
                .ok_or_else(|| anyhow!("the authoritative role requires --hosts"))?,
            zones,
            root,
            resolver,
        }),
    };

    let bind = args.bind.or_else(|| {
        let ip = args.ip.unwrap_or(DEFAULT_BIND_IP);
        args.port
            .or_else(|| role.default_port())
            .map(|port| SocketAddr::new(ip, port))
    });

    let config = Config {
        id: ConfigIdentifier(id),
        bind,
        transcript: args.transcript,
        role,
    };
    log_config_summary(&config);
    Ok(config)
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    let bind = match config.bind() {
        Some(bind) => bind.to_string(),
        None => "none".to_owned(),
    };
    let transcript = match config.transcript {
        Some(ref path) => path.display().to_string(),
        None => "none".to_owned(),
    };
    let mut message = format!(
        "Configuration loaded:\n\
         Identifier:   {}\n\
         Role:         {}\n\
         Bind address: {}\n\
         Transcript:   {}",
        config.id.0,
        config.role.name(),
        bind,
        transcript,
    );
    match config.role {
        RoleConfig::Resolver(ref resolver) => {
            write!(
                message,
                "\nZones:        {}\nRoot:         {}",
                resolver.zones.display(),
                resolver.root,
            )
            .unwrap();
            if let Some(ref mappings) = resolver.mappings {
                write!(message, "\nMappings:     {}", mappings.display()).unwrap();
            }
            match resolver.max_clients {
                Some(max) => write!(message, "\nMax clients:  {}", max).unwrap(),
                None => message.push_str("\nMax clients:  unlimited"),
            }
        }
        RoleConfig::Root(ref root) => {
            write!(
                message,
                "\nZones:        {}\nResolver:     {}",
                root.zones.display(),
                root.resolver,
            )
            .unwrap();
        }
        RoleConfig::Authoritative(ref authoritative) => {
            write!(
                message,
                "\nHosts:        {}\nZones:        {}\nRoot:         {}\nResolver:     {}",
                authoritative.hosts.display(),
                authoritative.zones.display(),
                authoritative.root,
                authoritative.resolver,
            )
            .unwrap();
        }
    }
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub id: ConfigIdentifier,
    bind: Option<SocketAddr>,
    pub transcript: Option<PathBuf>,
    pub role: RoleConfig,
}

const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const DEFAULT_RESOLVER_PORT: u16 = 5352;
const DEFAULT_ROOT_PORT: u16 = 5353;

fn default_root() -> SocketAddr {
    SocketAddr::new(DEFAULT_BIND_IP, DEFAULT_ROOT_PORT)
}

fn default_resolver() -> SocketAddr {
    SocketAddr::new(DEFAULT_BIND_IP, DEFAULT_RESOLVER_PORT)
}

impl Config {
    /// Returns the address to bind. If none is configured, the resolver
    /// and root fall back to their well-known ports on the loopback
    /// address; authoritative servers have no fallback.
    pub fn bind(&self) -> Option<SocketAddr> {
        self.bind.or_else(|| {
            self.role
                .default_port()
                .map(|port| SocketAddr::new(DEFAULT_BIND_IP, port))
        })
    }

    fn resolve_paths(&mut self, dir: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        };
        if let Some(ref mut transcript) = self.transcript {
            resolve(transcript);
        }
        match self.role {
            RoleConfig::Resolver(ref mut resolver) => {
                resolve(&mut resolver.zones);
                if let Some(ref mut mappings) = resolver.mappings {
                    resolve(mappings);
                }
            }
            RoleConfig::Root(ref mut root) => resolve(&mut root.zones),
            RoleConfig::Authoritative(ref mut authoritative) => {
                resolve(&mut authoritative.hosts);
                resolve(&mut authoritative.zones);
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: ROLES                                       //
////////////////////////////////////////////////////////////////////////

/// The role to run and its configuration.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
pub enum RoleConfig {
    #[serde(rename = "resolver")]
    Resolver(ResolverConfig),
    #[serde(rename = "root")]
    Root(RootConfig),
    #[serde(rename = "authoritative")]
    Authoritative(AuthoritativeConfig),
}

impl RoleConfig {
    /// Returns the name of the role.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Resolver(_) => "resolver",
            Self::Root(_) => "root",
            Self::Authoritative(_) => "authoritative",
        }
    }

    fn default_port(&self) -> Option<u16> {
        match self {
            Self::Resolver(_) => Some(DEFAULT_RESOLVER_PORT),
            Self::Root(_) => Some(DEFAULT_ROOT_PORT),
            Self::Authoritative(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    pub zones: PathBuf,
    #[serde(default = "default_root")]
    pub root: SocketAddr,
    pub mappings: Option<PathBuf>,
    pub max_clients: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootConfig {
    pub zones: PathBuf,
    #[serde(default = "default_resolver")]
    pub resolver: SocketAddr,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthoritativeConfig {
    pub hosts: PathBuf,
    pub zones: PathBuf,
    #[serde(default = "default_root")]
    pub root: SocketAddr,
    #[serde(default = "default_resolver")]
    pub resolver: SocketAddr,
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER TIERDNS TYPES FOR SERDE                              //
////////////////////////////////////////////////////////////////////////

/// Generates a deserializable `ConfigX` structure wrapping an `X` type
/// from [`tierdns`], using its [`FromStr`](std::str::FromStr)
/// implementation.
macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $description:literal) => {
        /// A macro-generated deserializable wrapper over a [`tierdns`]
        /// type.
        #[derive(Clone, Debug)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigIdentifier, Identifier, "identifier");

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Config {
        let mut config: Config = toml::from_str(text).unwrap();
        config.resolve_paths(Path::new("/etc/tierdns"));
        config
    }

    #[test]
    fn resolver_configuration_is_parsed_with_defaults() {
        let config = parse(
            r#"
            id = "resolver"

            [role]
            kind = "resolver"
            zones = "zones.txt"
            max_clients = 8
            "#,
        );
        assert_eq!(&*config.id.0, "resolver");
        assert_eq!(config.bind(), Some("127.0.0.1:5352".parse().unwrap()));
        match config.role {
            RoleConfig::Resolver(resolver) => {
                assert_eq!(resolver.zones, Path::new("/etc/tierdns/zones.txt"));
                assert_eq!(resolver.root, default_root());
                assert_eq!(resolver.max_clients, Some(8));
                assert!(resolver.mappings.is_none());
            }
            other => panic!("parsed the wrong role: {:?}", other),
        }
    }

    #[test]
    fn authoritative_configuration_keeps_absolute_paths() {
        let config = parse(
            r#"
            id = "com"
            bind = "127.0.0.1:5354"
            transcript = "com.log"

            [role]
            kind = "authoritative"
            hosts = "/srv/com.txt"
            zones = "zones.txt"
            "#,
        );
        assert_eq!(config.bind(), Some("127.0.0.1:5354".parse().unwrap()));
        assert_eq!(
            config.transcript.as_deref(),
            Some(Path::new("/etc/tierdns/com.log"))
        );
        match config.role {
            RoleConfig::Authoritative(authoritative) => {
                assert_eq!(authoritative.hosts, Path::new("/srv/com.txt"));
                assert_eq!(authoritative.resolver, default_resolver());
            }
            other => panic!("parsed the wrong role: {:?}", other),
        }
    }

    #[test]
    fn authoritative_servers_have_no_default_bind() {
        let config = parse(
            r#"
            id = "com"

            [role]
            kind = "authoritative"
            hosts = "com.txt"
            zones = "zones.txt"
            "#,
        );
        assert_eq!(config.bind(), None);
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        for text in [
            "id = \"a,b\"\n[role]\nkind = \"root\"\nzones = \"z\"\n",
            "id = \"root\"\n[role]\nkind = \"cache\"\nzones = \"z\"\n",
            "id = \"root\"\nport = 1\n[role]\nkind = \"root\"\nzones = \"z\"\n",
        ] {
            assert!(toml::from_str::<Config>(text).is_err(), "{}", text);
        }
    }
}
