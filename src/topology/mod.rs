//! Runnable server configurations
//!
//! A [`Topology`] is one backend the suite runs its tests against: a
//! multi-host native cluster, a single native server, or the in-process
//! reference interpreter. Each variant owns its own processes or engine;
//! callers see one lifecycle (`compile`, `start_up`, `shut_down`) and one
//! set of address queries.

pub mod catalog;
mod cluster;
mod process;
mod reference;
mod single;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::client::Connector;
use crate::error::{HarnessError, HarnessResult};

pub use catalog::{CatalogDiff, CatalogSnapshot, MATERIALIZED_VIEW_REJECTION, SCHEMA_CHANGED_MARKER};
pub use cluster::LocalCluster;
pub use process::HostProcess;
pub use reference::{ReferenceEngine, ReferenceInterpreter};
pub use single::LocalServer;

/// A host and port pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAddress {
    pub host: String,
    pub port: u16,
}

impl HostAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The three addresses of one logical host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddresses {
    pub host_id: usize,
    pub listener: HostAddress,
    pub admin: HostAddress,
    pub internal: HostAddress,
}

impl HostAddresses {
    /// Addresses of host `host_id` on one machine, each port offset from its base.
    ///
    /// A port that would pass 65535 is a [`HarnessError::Config`].
    pub fn local(
        host_id: usize,
        host: &str,
        listener_base: u16,
        admin_base: u16,
        internal_base: u16,
    ) -> HarnessResult<Self> {
        let port = |base: u16, role: &str| -> HarnessResult<u16> {
            u16::try_from(host_id)
                .ok()
                .and_then(|offset| base.checked_add(offset))
                .ok_or_else(|| {
                    HarnessError::Config(format!(
                        "{} port for host {} overflows base {}",
                        role, host_id, base
                    ))
                })
        };
        Ok(Self {
            host_id,
            listener: HostAddress::new(host, port(listener_base, "listener")?),
            admin: HostAddress::new(host, port(admin_base, "admin")?),
            internal: HostAddress::new(host, port(internal_base, "internal")?),
        })
    }
}

/// Which kind of engine a topology runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    ClusteredNative,
    SingleNodeNative,
    ReferenceInterpreter,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::ClusteredNative => "NATIVE",
            BackendKind::SingleNodeNative => "SINGLE",
            BackendKind::ReferenceInterpreter => "REFERENCE",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    Running,
    ShutDown,
}

/// Host failures injected into a clustered topology after startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureState {
    #[default]
    AllRunning,
    /// One host is killed and stays down
    OneFailure,
    /// One host is killed and then rejoins
    OneRecovering,
}

/// The DDL a topology is compiled with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub name: String,
    pub ddl: Vec<String>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ddl: Vec::new(),
        }
    }

    /// Append one DDL statement
    pub fn statement(mut self, ddl: impl Into<String>) -> Self {
        self.ddl.push(ddl.into());
        self
    }

    /// Split a SQL script on `;` into statements, skipping blank ones and
    /// `--` comment lines
    pub fn from_script(name: impl Into<String>, script: &str) -> Self {
        let cleaned: String = script
            .lines()
            .filter(|line| !line.trim_start().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let ddl = cleaned
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            name: name.into(),
            ddl,
        }
    }

    /// Read a schema script from disk
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let script = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "schema".to_string());
        Ok(Self::from_script(name, &script))
    }

    /// Cheap structural check done at compile time
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.ddl.is_empty() {
            return Err(format!("schema '{}' has no statements", self.name));
        }
        for (i, stmt) in self.ddl.iter().enumerate() {
            if stmt.trim().is_empty() {
                return Err(format!("schema '{}' statement {} is empty", self.name, i));
            }
            let open = stmt.matches('(').count();
            let close = stmt.matches(')').count();
            if open != close {
                return Err(format!(
                    "schema '{}' statement {} has unbalanced parentheses",
                    self.name, i
                ));
            }
        }
        Ok(())
    }
}

/// One runnable server configuration
pub enum Topology {
    Cluster(LocalCluster),
    Single(LocalServer),
    Reference(ReferenceInterpreter),
}

macro_rules! dispatch {
    ($self:expr, $t:ident => $body:expr) => {
        match $self {
            Topology::Cluster($t) => $body,
            Topology::Single($t) => $body,
            Topology::Reference($t) => $body,
        }
    };
}

impl Topology {
    pub fn name(&self) -> &str {
        dispatch!(self, t => t.name())
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Topology::Cluster(_) => BackendKind::ClusteredNative,
            Topology::Single(_) => BackendKind::SingleNodeNative,
            Topology::Reference(_) => BackendKind::ReferenceInterpreter,
        }
    }

    pub fn state(&self) -> LifecycleState {
        dispatch!(self, t => t.state())
    }

    /// Check and store the schema; false means every dependent test is void
    pub fn compile(&mut self, schema: &Schema) -> bool {
        match schema.validate() {
            Ok(()) => {
                dispatch!(self, t => t.set_schema(schema.clone()));
                tracing::info!(topology = %self.name(), schema = %schema.name, "Schema compiled");
                true
            }
            Err(message) => {
                tracing::error!(topology = %self.name(), %message, "Schema compile failed");
                false
            }
        }
    }

    /// Start the topology, or with `reset` restore a running one to its
    /// freshly loaded data state in place
    pub async fn start_up(&mut self, reset: bool) -> HarnessResult<()> {
        dispatch!(self, t => t.start_up(reset).await)
    }

    pub async fn shut_down(&mut self) -> HarnessResult<()> {
        dispatch!(self, t => t.shut_down().await)
    }

    pub fn is_reference_interpreter(&self) -> bool {
        matches!(self, Topology::Reference(_))
    }

    pub fn is_debug_build(&self) -> bool {
        dispatch!(self, t => t.is_debug_build())
    }

    /// Every configured host, running or not
    fn all_hosts(&self) -> &[HostAddresses] {
        dispatch!(self, t => t.all_hosts())
    }

    fn host(&self, host: usize) -> HarnessResult<&HostAddresses> {
        let hosts = self.all_hosts();
        hosts.get(host).ok_or(HarnessError::NoSuchHost {
            host,
            count: hosts.len(),
        })
    }

    pub fn listener_address(&self, host: usize) -> HarnessResult<HostAddress> {
        Ok(self.host(host)?.listener.clone())
    }

    pub fn admin_address(&self, host: usize) -> HarnessResult<HostAddress> {
        Ok(self.host(host)?.admin.clone())
    }

    pub fn internal_address(&self, host: usize) -> HarnessResult<HostAddress> {
        Ok(self.host(host)?.internal.clone())
    }

    /// Error if a host that should be up has exited
    pub fn check_alive(&mut self) -> HarnessResult<()> {
        dispatch!(self, t => t.check_alive())
    }

    /// Number of hosts currently accepting clients
    pub fn listener_count(&self) -> usize {
        self.hosts().len()
    }

    /// Number of data partitions across the topology
    pub fn logical_partition_count(&self) -> usize {
        dispatch!(self, t => t.logical_partition_count())
    }

    /// Catalog captured once at first startup
    pub fn initial_catalog(&self) -> Option<&CatalogSnapshot> {
        dispatch!(self, t => t.initial_catalog())
    }

    /// Connector for clients of this topology
    pub fn connector(&self) -> Arc<dyn Connector> {
        dispatch!(self, t => t.connector())
    }

    /// Hosts that are up and accepting clients
    pub fn hosts(&self) -> Vec<HostAddresses> {
        dispatch!(self, t => t.live_hosts())
    }

    /// Kill one host of a clustered topology
    pub async fn shut_down_host(&mut self, host: usize) -> HarnessResult<()> {
        match self {
            Topology::Cluster(c) => c.shut_down_host(host).await,
            other => Err(HarnessError::Startup {
                topology: other.name().to_string(),
                message: "per-host shutdown needs a clustered topology".to_string(),
            }),
        }
    }

    /// Restart a previously killed host of a clustered topology
    pub async fn recover_host(&mut self, host: usize) -> HarnessResult<()> {
        match self {
            Topology::Cluster(c) => c.recover_host(host).await,
            other => Err(HarnessError::Startup {
                topology: other.name().to_string(),
                message: "host recovery needs a clustered topology".to_string(),
            }),
        }
    }
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("state", &self.state())
            .finish()
    }
}

impl From<LocalCluster> for Topology {
    fn from(c: LocalCluster) -> Self {
        Topology::Cluster(c)
    }
}

impl From<LocalServer> for Topology {
    fn from(s: LocalServer) -> Self {
        Topology::Single(s)
    }
}

impl From<ReferenceInterpreter> for Topology {
    fn from(r: ReferenceInterpreter) -> Self {
        Topology::Reference(r)
    }
}
