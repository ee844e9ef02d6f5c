//! The in-process reference interpreter topology

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::catalog::{with_admin_session, CatalogSnapshot};
use super::{BackendKind, HostAddress, HostAddresses, LifecycleState, Schema};
use crate::client::{Connector, EmbeddedConnector};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::types::{ResultTable, Value};

/// An independent SQL engine running inside the harness process.
///
/// It answers the same procedure names a native server does, including
/// `@AdHoc` and `@SystemCatalog`.
#[async_trait]
pub trait ReferenceEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Create the schema's objects in an empty database
    async fn load_schema(&self, schema: &Schema) -> HarnessResult<()>;

    /// Delete all rows, keeping the schema
    async fn reset(&self) -> HarnessResult<()>;

    async fn invoke(&self, procedure: &str, params: &[Value]) -> HarnessResult<Vec<ResultTable>>;

    /// Drop all state
    async fn shutdown(&self) -> HarnessResult<()>;
}

/// Topology backed by a [`ReferenceEngine`]
pub struct ReferenceInterpreter {
    name: String,
    engine: Arc<dyn ReferenceEngine>,
    accepting: Arc<AtomicBool>,
    config: HarnessConfig,
    hosts: Vec<HostAddresses>,
    state: LifecycleState,
    schema: Option<Schema>,
    initial_catalog: Option<CatalogSnapshot>,
}

impl ReferenceInterpreter {
    pub fn new(engine: Arc<dyn ReferenceEngine>, config: HarnessConfig) -> Self {
        let name = format!("{}-{}", engine.name(), BackendKind::ReferenceInterpreter);
        // Nothing listens there; the address only labels the embedded host
        let hosts = vec![HostAddresses {
            host_id: 0,
            listener: HostAddress::new("embedded", config.listener_base_port),
            admin: HostAddress::new("embedded", config.admin_base_port),
            internal: HostAddress::new("embedded", config.internal_base_port),
        }];
        Self {
            name,
            engine,
            accepting: Arc::new(AtomicBool::new(false)),
            config,
            hosts,
            state: LifecycleState::NotStarted,
            schema: None,
            initial_catalog: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn engine(&self) -> &Arc<dyn ReferenceEngine> {
        &self.engine
    }

    pub(crate) fn set_schema(&mut self, schema: Schema) {
        self.schema = Some(schema);
    }

    pub(crate) async fn start_up(&mut self, reset: bool) -> HarnessResult<()> {
        let schema = self.schema.clone().ok_or_else(|| HarnessError::CompileFailed {
            topology: self.name.clone(),
        })?;

        if self.state == LifecycleState::Running {
            if reset {
                self.engine.reset().await?;
                tracing::debug!(topology = %self.name, "Reference engine reset");
            }
            return Ok(());
        }

        self.engine
            .load_schema(&schema)
            .await
            .map_err(|e| HarnessError::Startup {
                topology: self.name.clone(),
                message: e.to_string(),
            })?;
        self.accepting.store(true, Ordering::Release);
        self.state = LifecycleState::Running;

        if self.initial_catalog.is_none() {
            let connector = self.connector();
            let snapshot = with_admin_session(
                connector.as_ref(),
                &self.hosts[0].admin,
                &self.config.client,
                |client| async move { CatalogSnapshot::capture(&client).await },
            )
            .await?;
            self.initial_catalog = Some(snapshot);
        }
        tracing::info!(topology = %self.name, "Reference engine running");
        Ok(())
    }

    pub(crate) async fn shut_down(&mut self) -> HarnessResult<()> {
        self.accepting.store(false, Ordering::Release);
        if self.state == LifecycleState::Running {
            self.engine.shutdown().await?;
            tracing::info!(topology = %self.name, "Reference engine shut down");
        }
        self.state = LifecycleState::ShutDown;
        Ok(())
    }

    pub(crate) fn is_debug_build(&self) -> bool {
        self.config.debug_build
    }

    pub(crate) fn all_hosts(&self) -> &[HostAddresses] {
        &self.hosts
    }

    pub(crate) fn live_hosts(&self) -> Vec<HostAddresses> {
        if self.state == LifecycleState::Running {
            self.hosts.clone()
        } else {
            Vec::new()
        }
    }

    pub(crate) fn logical_partition_count(&self) -> usize {
        1
    }

    pub(crate) fn check_alive(&mut self) -> HarnessResult<()> {
        Ok(())
    }

    pub(crate) fn initial_catalog(&self) -> Option<&CatalogSnapshot> {
        self.initial_catalog.as_ref()
    }

    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(EmbeddedConnector::new(self.engine.clone(), self.accepting.clone()))
    }
}
