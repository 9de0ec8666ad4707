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

//! Implementation of the [`Authoritative`] role.

use log::debug;

use super::{Exchange, ExchangeError, Service};
use crate::message::{Identifier, Request, Response};
use crate::zone::HostTable;

/// An authoritative server for one zone.
pub struct Authoritative {
    id: Identifier,
    hosts: HostTable,
}

impl Authoritative {
    /// Creates a new `Authoritative` server answering from `hosts`.
    pub fn new(id: Identifier, hosts: HostTable) -> Self {
        Self { id, hosts }
    }

    /// Answers `request` from the host table. The hostname is
    /// normalized (see [`crate::hostname::normalize_hostname`]) before
    /// lookup.
    pub fn answer(&self, request: &Request) -> Response {
        match self.hosts.address_for(request.hostname()) {
            Some(address) => Response::address(&*self.id, address),
            None => Response::not_found(&*self.id),
        }
    }
}

impl Service for Authoritative {
    fn id(&self) -> &str {
        &self.id
    }

    fn handle_message(
        &self,
        message: &str,
        _exchange: &mut Exchange,
    ) -> Result<Response, ExchangeError> {
        let request = match Request::decode(message) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejecting malformed request {:?}: {}", message, e);
                return Ok(Response::invalid(&*self.id));
            }
        };
        Ok(self.answer(&request))
    }
}
