//! Client acquisition with randomized address choice and one retry
//!
//! Every acquisition picks a candidate address uniformly at random. A
//! refused connection is retried exactly once, against a different
//! candidate when there is one; any other failure, or a second refusal, is
//! returned as is. Each opened [`Client`] is registered with the owning test
//! instance before it is handed out.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Client, Connection, Connector, HandleRegistry, RawChannel};
use crate::config::ClientOptions;
use crate::error::{HarnessError, HarnessResult};
use crate::topology::{HostAddress, HostAddresses};

/// One attempt plus one retry
pub const MAX_CONNECT_ATTEMPTS: usize = 2;

/// Opens clients against one topology on behalf of one test instance
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    hosts: Vec<HostAddresses>,
    registry: Arc<HandleRegistry>,
    defaults: ClientOptions,
    rng: Mutex<StdRng>,
}

impl ConnectionManager {
    /// Create a manager over the given live hosts
    pub fn new(
        connector: Arc<dyn Connector>,
        hosts: Vec<HostAddresses>,
        registry: Arc<HandleRegistry>,
        defaults: ClientOptions,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            connector,
            hosts,
            registry,
            defaults,
            rng: Mutex::new(rng),
        }
    }

    pub fn hosts(&self) -> &[HostAddresses] {
        &self.hosts
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    pub fn default_options(&self) -> &ClientOptions {
        &self.defaults
    }

    /// One connection to a random regular listener
    pub async fn client(&self) -> HarnessResult<Client> {
        self.client_with(&self.defaults.clone()).await
    }

    pub async fn client_with(&self, options: &ClientOptions) -> HarnessResult<Client> {
        let candidates = self.listeners();
        let opened = self.connect_one(&candidates, options).await?;
        Ok(self.register(vec![opened], options))
    }

    /// One connection to a random admin listener
    pub async fn admin_client(&self) -> HarnessResult<Client> {
        self.admin_client_with(&self.defaults.clone()).await
    }

    pub async fn admin_client_with(&self, options: &ClientOptions) -> HarnessResult<Client> {
        let candidates: Vec<HostAddress> = self.hosts.iter().map(|h| h.admin.clone()).collect();
        let opened = self.connect_one(&candidates, options).await?;
        Ok(self.register(vec![opened], options))
    }

    /// One connection to a specific logical host
    pub async fn client_to_host(&self, host_id: usize) -> HarnessResult<Client> {
        self.client_to_host_with(host_id, &self.defaults.clone()).await
    }

    pub async fn client_to_host_with(
        &self,
        host_id: usize,
        options: &ClientOptions,
    ) -> HarnessResult<Client> {
        let candidates = vec![self.host(host_id)?.listener.clone()];
        let opened = self.connect_one(&candidates, options).await?;
        Ok(self.register(vec![opened], options))
    }

    /// One connection per listed host, in the listed order
    pub async fn client_to_hosts(&self, host_ids: &[usize]) -> HarnessResult<Client> {
        self.client_to_hosts_with(host_ids, &self.defaults.clone()).await
    }

    pub async fn client_to_hosts_with(
        &self,
        host_ids: &[usize],
        options: &ClientOptions,
    ) -> HarnessResult<Client> {
        let targets = host_ids
            .iter()
            .map(|&id| self.host(id).map(|h| h.listener.clone()))
            .collect::<HarnessResult<Vec<_>>>()?;
        self.connect_each(targets, options).await
    }

    /// One connection per listener across the whole topology
    pub async fn fully_connected_client(&self) -> HarnessResult<Client> {
        self.fully_connected_client_with(&self.defaults.clone()).await
    }

    pub async fn fully_connected_client_with(&self, options: &ClientOptions) -> HarnessResult<Client> {
        self.connect_each(self.listeners(), options).await
    }

    /// A raw TCP stream to one host's listener
    pub async fn raw_channel(&self, host_id: usize) -> HarnessResult<RawChannel> {
        let channel = RawChannel::connect(&self.host(host_id)?.listener).await?;
        self.registry.register_channel(&channel);
        Ok(channel)
    }

    fn listeners(&self) -> Vec<HostAddress> {
        self.hosts.iter().map(|h| h.listener.clone()).collect()
    }

    fn host(&self, host_id: usize) -> HarnessResult<&HostAddresses> {
        self.hosts
            .iter()
            .find(|h| h.host_id == host_id)
            .ok_or(HarnessError::NoSuchHost {
                host: host_id,
                count: self.hosts.len(),
            })
    }

    fn register(&self, connections: Vec<(HostAddress, Box<dyn Connection>)>, options: &ClientOptions) -> Client {
        let client = Client::new(connections, options.clone());
        self.registry.register_client(&client);
        tracing::debug!(client = client.id(), "Registered client");
        client
    }

    /// Connect to every target (each with its own single retry); on failure
    /// close whatever was already opened.
    async fn connect_each(
        &self,
        targets: Vec<HostAddress>,
        options: &ClientOptions,
    ) -> HarnessResult<Client> {
        let mut opened = Vec::with_capacity(targets.len());
        for target in targets {
            match self.connect_one(std::slice::from_ref(&target), options).await {
                Ok(conn) => opened.push(conn),
                Err(e) => {
                    for (_, mut conn) in opened {
                        let _ = conn.close().await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(self.register(opened, options))
    }

    /// Pick a candidate, connect, and retry a refusal exactly once
    async fn connect_one(
        &self,
        candidates: &[HostAddress],
        options: &ClientOptions,
    ) -> HarnessResult<(HostAddress, Box<dyn Connection>)> {
        if candidates.is_empty() {
            return Err(HarnessError::NoSuchHost {
                host: 0,
                count: 0,
            });
        }

        let mut index = self.pick(candidates.len(), None);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let address = &candidates[index];
            match self.connect_once(address, options).await {
                Ok(conn) => return Ok((address.clone(), conn)),
                Err(HarnessError::ConnectionRefused { address })
                    if attempt < MAX_CONNECT_ATTEMPTS =>
                {
                    index = self.pick(candidates.len(), Some(index));
                    tracing::warn!(
                        refused = %address,
                        retry = %candidates[index],
                        "Connection refused, retrying once"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn connect_once(
        &self,
        address: &HostAddress,
        options: &ClientOptions,
    ) -> HarnessResult<Box<dyn Connection>> {
        let timeout = options.connect_timeout;
        match tokio::time::timeout(timeout, self.connector.connect(address, options)).await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::ConnectTimeout {
                address: address.clone(),
                timeout,
            }),
        }
    }

    /// Uniform choice, avoiding `previous` when another candidate exists
    fn pick(&self, len: usize, previous: Option<usize>) -> usize {
        let mut rng = self.rng.lock();
        match previous {
            Some(prev) if len > 1 => {
                let idx = rng.gen_range(0..len - 1);
                if idx >= prev {
                    idx + 1
                } else {
                    idx
                }
            }
            Some(prev) => prev,
            None => rng.gen_range(0..len),
        }
    }
}
