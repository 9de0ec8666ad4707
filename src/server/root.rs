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

//! Implementation of the [`RootDelegator`] role.

use log::debug;

use super::{Exchange, ExchangeError, Service, Upstream};
use crate::hostname::domain_suffix;
use crate::message::{Identifier, Mode, Request, Response};
use crate::zone::ZoneTable;

/// The root of the delegation hierarchy.
///
/// For each request, the root finds the authoritative server for the
/// hostname's suffix in its [`ZoneTable`]. In iterative mode it
/// redirects the requester to that server without contacting it. In
/// recursive mode it forwards the request there and relays the answer.
pub struct RootDelegator<U> {
    id: Identifier,
    zones: ZoneTable,
    upstream: U,
}

impl<U> RootDelegator<U>
where
    U: Upstream,
{
    /// Creates a new `RootDelegator`.
    pub fn new(id: Identifier, zones: ZoneTable, upstream: U) -> Self {
        Self {
            id,
            zones,
            upstream,
        }
    }

    /// Delegates `request` to the authoritative server for its suffix.
    pub fn delegate(
        &self,
        request: &Request,
        exchange: &mut Exchange,
    ) -> Result<Response, ExchangeError> {
        let suffix = domain_suffix(request.hostname());
        let server = self
            .zones
            .address_for(&suffix)
            .ok_or(ExchangeError::UnknownSuffix(suffix))?;

        match request.mode() {
            Mode::Iterative => {
                debug!("Redirecting {} to {}.", request.hostname(), server);
                Ok(Response::redirect(&*self.id, server))
            }
            Mode::Recursive => {
                let outbound = request.retagged(&self.id);
                exchange.record(&outbound);
                let reply = self
                    .upstream
                    .query(server, &outbound)
                    .map_err(|error| ExchangeError::Upstream { server, error })?;
                exchange.record(&reply);
                Ok(reply.retagged(&self.id))
            }
        }
    }
}

impl<U> Service for RootDelegator<U>
where
    U: Upstream,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn handle_message(
        &self,
        message: &str,
        exchange: &mut Exchange,
    ) -> Result<Response, ExchangeError> {
        match Request::decode(message) {
            Ok(request) => self.delegate(&request, exchange),
            Err(e) => {
                debug!("Rejecting malformed request {:?}: {}", message, e);
                Ok(Response::invalid(&*self.id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Answer, Status};
    use crate::server::testing::MemoryNetwork;
    use crate::server::Authoritative;
    use crate::zone::HostTable;
    use std::net::SocketAddr;
    use std::sync::Arc;

    const COM: &str = "127.0.0.1:5354";

    fn setup() -> (Arc<MemoryNetwork>, RootDelegator<Arc<MemoryNetwork>>) {
        let network = MemoryNetwork::new();
        let hosts = HostTable::from_reader("example.com 1.2.3.4\n".as_bytes()).unwrap();
        network.attach(
            COM.parse().unwrap(),
            Arc::new(Authoritative::new("com".parse().unwrap(), hosts)),
        );
        let zones = ZoneTable::from_reader("com 127.0.0.1 5354\n".as_bytes()).unwrap();
        let root = RootDelegator::new("root".parse().unwrap(), zones, network.clone());
        (network, root)
    }

    #[test]
    fn iterative_requests_are_redirected_without_contact() {
        let (network, root) = setup();
        let message = "resolver, example.com, i";
        let response = root
            .handle_message(message, &mut Exchange::new(message))
            .unwrap();
        assert_eq!(response.to_string(), "0x01, root, 127.0.0.1, 5354");
        assert!(network.contacts().is_empty());
    }

    #[test]
    fn recursive_requests_are_proxied_and_retagged() {
        let (network, root) = setup();
        let message = "resolver, example.com, r";
        let mut exchange = Exchange::new(message);
        let response = root.handle_message(message, &mut exchange).unwrap();
        assert_eq!(response.to_string(), "0x00, root, 1.2.3.4");

        let com: SocketAddr = COM.parse().unwrap();
        assert_eq!(
            network.contacts(),
            vec![(com, "root, example.com, r".to_owned())]
        );
        assert_eq!(
            exchange.lines(),
            &[
                "resolver, example.com, r",
                "root, example.com, r",
                "0x00, com, 1.2.3.4",
            ]
        );
    }

    #[test]
    fn recursive_misses_relay_not_found() {
        let (_network, root) = setup();
        let request = Request::decode("resolver, missing.com, r").unwrap();
        let response = root.delegate(&request, &mut Exchange::default()).unwrap();
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(response.responder(), "root");
        assert!(matches!(response.answer(), Answer::NotFound(_)));
    }

    #[test]
    fn unconfigured_suffixes_are_errors() {
        let (_network, root) = setup();
        let request = Request::decode("resolver, example.org, i").unwrap();
        assert!(matches!(
            root.delegate(&request, &mut Exchange::default()),
            Err(ExchangeError::UnknownSuffix(suffix)) if suffix == "org"
        ));
    }
}
