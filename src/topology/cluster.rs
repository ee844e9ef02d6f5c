//! Multi-host native cluster on one machine

use std::sync::Arc;

use super::catalog::CatalogSnapshot;
use super::process::NativeHosts;
use super::{BackendKind, FailureState, HostAddresses, LifecycleState, Schema};
use crate::client::Connector;
use crate::config::HarnessConfig;
use crate::error::HarnessResult;

/// A cluster of native server processes.
///
/// With a k-factor above zero every partition has `k + 1` replicas and the
/// cluster can run in a [`FailureState`] other than `AllRunning`: after
/// each launch one host is killed, and for `OneRecovering` restarted.
pub struct LocalCluster {
    hosts: NativeHosts,
    k_factor: usize,
    failure_state: FailureState,
}

impl LocalCluster {
    pub fn new(
        config: HarnessConfig,
        sites_per_host: usize,
        host_count: usize,
        k_factor: usize,
        failure_state: FailureState,
    ) -> HarnessResult<Self> {
        // Without replicas a dead host loses data, so never inject a failure
        let failure_state = if k_factor == 0 {
            FailureState::AllRunning
        } else {
            failure_state
        };
        let name = cluster_name(failure_state, sites_per_host, host_count);
        Ok(Self {
            hosts: NativeHosts::new(name, config, host_count, sites_per_host)?,
            k_factor,
            failure_state,
        })
    }

    pub fn name(&self) -> &str {
        &self.hosts.name
    }

    pub fn state(&self) -> LifecycleState {
        self.hosts.state
    }

    pub fn k_factor(&self) -> usize {
        self.k_factor
    }

    pub fn failure_state(&self) -> FailureState {
        self.failure_state
    }

    pub(crate) fn set_schema(&mut self, schema: Schema) {
        self.hosts.schema = Some(schema);
    }

    pub(crate) async fn start_up(&mut self, reset: bool) -> HarnessResult<()> {
        let was_running = self.hosts.state == LifecycleState::Running;
        self.hosts.start_up(reset).await?;
        if was_running || self.hosts.hosts.len() < 2 {
            return Ok(());
        }

        let victim = self.hosts.hosts.len() - 1;
        match self.failure_state {
            FailureState::AllRunning => {}
            FailureState::OneFailure => self.hosts.kill_host(victim).await?,
            FailureState::OneRecovering => {
                self.hosts.kill_host(victim).await?;
                self.hosts.restart_host(victim).await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn shut_down(&mut self) -> HarnessResult<()> {
        self.hosts.shut_down().await
    }

    pub(crate) async fn shut_down_host(&mut self, host: usize) -> HarnessResult<()> {
        self.hosts.kill_host(host).await
    }

    pub(crate) async fn recover_host(&mut self, host: usize) -> HarnessResult<()> {
        self.hosts.restart_host(host).await
    }

    pub(crate) fn check_alive(&mut self) -> HarnessResult<()> {
        self.hosts.assert_alive()
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

    /// Unique partitions: every site holds one, replicated `k + 1` times
    pub(crate) fn logical_partition_count(&self) -> usize {
        self.hosts.sites_per_host * self.hosts.hosts.len() / (self.k_factor + 1)
    }

    pub(crate) fn initial_catalog(&self) -> Option<&CatalogSnapshot> {
        self.hosts.initial_catalog.as_ref()
    }

    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        self.hosts.connector()
    }
}

fn cluster_name(failure_state: FailureState, sites: usize, hosts: usize) -> String {
    let prefix = match failure_state {
        FailureState::AllRunning => "localCluster",
        FailureState::OneFailure => "localClusterOneFail",
        FailureState::OneRecovering => "localClusterOneRecov",
    };
    format!("{}-{}-{}-{}", prefix, sites, hosts, BackendKind::ClusteredNative)
}
