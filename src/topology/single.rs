//! Single native server

use std::sync::Arc;

use super::catalog::CatalogSnapshot;
use super::process::NativeHosts;
use super::{BackendKind, HostAddresses, LifecycleState, Schema};
use crate::client::Connector;
use crate::config::HarnessConfig;
use crate::error::HarnessResult;

/// One native server process
pub struct LocalServer {
    hosts: NativeHosts,
}

impl LocalServer {
    pub fn new(config: HarnessConfig, sites_per_host: usize) -> HarnessResult<Self> {
        let name = format!("localServer-{}-{}", sites_per_host, BackendKind::SingleNodeNative);
        Ok(Self {
            hosts: NativeHosts::new(name, config, 1, sites_per_host)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.hosts.name
    }

    pub fn state(&self) -> LifecycleState {
        self.hosts.state
    }

    pub(crate) fn set_schema(&mut self, schema: Schema) {
        self.hosts.schema = Some(schema);
    }

    pub(crate) async fn start_up(&mut self, reset: bool) -> HarnessResult<()> {
        self.hosts.start_up(reset).await
    }

    pub(crate) async fn shut_down(&mut self) -> HarnessResult<()> {
        self.hosts.shut_down().await
    }

    pub(crate) fn is_debug_build(&self) -> bool {
        self.hosts.config.debug_build
    }

    pub(crate) fn all_hosts(&self) -> &[HostAddresses] {
        self.hosts.all_hosts()
    }

    pub(crate) fn live_hosts(&self) -> Vec<HostAddresses> {
        self.hosts.live_hosts()
    }

    pub(crate) fn logical_partition_count(&self) -> usize {
        self.hosts.sites_per_host
    }

    pub(crate) fn check_alive(&mut self) -> HarnessResult<()> {
        self.hosts.assert_alive()
    }

    pub(crate) fn initial_catalog(&self) -> Option<&CatalogSnapshot> {
        self.hosts.initial_catalog.as_ref()
    }

    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        self.hosts.connector()
    }
}
