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

//! Implementation of the [`Resolver`] role.

use std::net::SocketAddr;

use log::{debug, info};

use super::{Cache, Exchange, ExchangeError, Service, Upstream};
use crate::message::{Answer, Identifier, Request, Response};

/// The client-facing caching resolver.
///
/// The resolver is the only role that validates requests in full; the
/// roles behind it trust what it forwards. Resolution proceeds as
/// follows:
///
/// 1. A cached response for the hostname is returned as is.
/// 2. Otherwise the request, stamped with the resolver's identifier, is
///    sent to the root.
/// 3. If the root redirects (iterative mode), the resolver sends the
///    same request to the server it was redirected to. Otherwise the
///    root's answer is already final (recursive mode).
/// 4. The final answer is stamped with the resolver's identifier and,
///    if it is an address, cached under the requested hostname.
pub struct Resolver<U> {
    id: Identifier,
    root: SocketAddr,
    cache: Cache,
    upstream: U,
}

impl<U> Resolver<U>
where
    U: Upstream,
{
    /// Creates a new `Resolver` that sends misses to the root server at
    /// `root`.
    pub fn new(id: Identifier, root: SocketAddr, upstream: U) -> Self {
        Self {
            id,
            root,
            cache: Cache::new(),
            upstream,
        }
    }

    /// Returns the resolver's cache.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Resolves a validated request.
    pub fn resolve(
        &self,
        request: &Request,
        exchange: &mut Exchange,
    ) -> Result<Response, ExchangeError> {
        if let Some(cached) = self.cache.get(request.hostname()) {
            debug!("Answering {} from the cache.", request.hostname());
            return Ok(cached);
        }

        let outbound = request.retagged(&self.id);
        let reply = self.query(self.root, &outbound, exchange)?;
        let answer = match reply.into_answer() {
            Answer::Redirect(server) => {
                debug!("Following the redirect to {}.", server);
                self.query(server, &outbound, exchange)?.into_answer()
            }
            answer => answer,
        };

        let response = Response::new(&*self.id, answer);
        if let Answer::Address(address) = response.answer() {
            let hostname = request.hostname().to_ascii_lowercase();
            if self.cache.insert(&hostname, *address, response.clone()) {
                info!("Cached {} -> {}.", hostname, address);
                exchange.record_mapping(&hostname, *address);
            }
        }
        Ok(response)
    }

    fn query(
        &self,
        server: SocketAddr,
        request: &Request,
        exchange: &mut Exchange,
    ) -> Result<Response, ExchangeError> {
        exchange.record(request);
        let reply = self
            .upstream
            .query(server, request)
            .map_err(|error| ExchangeError::Upstream { server, error })?;
        exchange.record(&reply);
        Ok(reply)
    }
}

impl<U> Service for Resolver<U>
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
        match Request::parse(message) {
            Ok(request) => self.resolve(&request, exchange),
            Err(e) => {
                debug!("Rejecting invalid request {:?}: {}", message, e);
                Ok(Response::invalid(&*self.id))
            }
        }
    }
}
