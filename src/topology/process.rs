//! Native server host processes
//!
//! [`HostProcess`] launches one server binary from an argument template and
//! polls its listener until it accepts connections. Placeholders expanded
//! in every argument:
//!
//! | placeholder       | value                                         |
//! |-------------------|-----------------------------------------------|
//! | `{host_id}`       | logical host index                            |
//! | `{port}`          | regular listener port                         |
//! | `{admin_port}`    | admin listener port                           |
//! | `{internal_port}` | host-to-host port                             |
//! | `{data_dir}`      | the host's data directory                     |
//! | `{peers}`         | comma-separated internal addresses of all hosts |
//! | `{sites}`         | execution sites per host                      |
//!
//! [`NativeHosts`] is the state shared by clustered and single-server
//! topologies: the hosts, which of them are down, the compiled schema and
//! the initial catalog.

use std::collections::BTreeSet;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

use super::catalog::{truncate_user_tables, with_admin_session, CatalogSnapshot};
use super::{HostAddresses, LifecycleState, Schema};
use crate::client::{Connector, MySqlConnector};
use crate::config::{HarnessConfig, ServerCommand};
use crate::error::{HarnessError, HarnessResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Values substituted into a [`ServerCommand`] template
pub(crate) struct LaunchVars<'a> {
    pub peers: &'a str,
    pub sites: usize,
}

/// Expand `{name}` placeholders in a command template
pub(crate) fn expand_args(
    template: &[String],
    addresses: &HostAddresses,
    data_dir: &Path,
    vars: &LaunchVars<'_>,
) -> Vec<String> {
    let data_dir = data_dir.display().to_string();
    template
        .iter()
        .map(|arg| {
            arg.replace("{host_id}", &addresses.host_id.to_string())
                .replace("{port}", &addresses.listener.port.to_string())
                .replace("{admin_port}", &addresses.admin.port.to_string())
                .replace("{internal_port}", &addresses.internal.port.to_string())
                .replace("{data_dir}", &data_dir)
                .replace("{peers}", vars.peers)
                .replace("{sites}", &vars.sites.to_string())
        })
        .collect()
}

/// One native server host
pub struct HostProcess {
    addresses: HostAddresses,
    data_dir: TempDir,
    child: Option<Child>,
}

impl HostProcess {
    pub fn new(addresses: HostAddresses) -> HarnessResult<Self> {
        let data_dir = tempfile::Builder::new()
            .prefix(&format!("regress-host{}-", addresses.host_id))
            .tempdir()?;
        Ok(Self {
            addresses,
            data_dir,
            child: None,
        })
    }

    pub fn addresses(&self) -> &HostAddresses {
        &self.addresses
    }

    pub fn data_dir(&self) -> &Path {
        self.data_dir.path()
    }

    /// Remove everything in the data directory
    fn wipe(&self) -> std::io::Result<()> {
        for entry in std::fs::read_dir(self.data_dir.path())? {
            let path = entry?.path();
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn command(&self, template: &ServerCommand, vars: &LaunchVars<'_>) -> Command {
        let mut cmd = Command::new(&template.program);
        cmd.args(expand_args(&template.args, &self.addresses, self.data_dir(), vars))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Start the server. A `fresh` launch wipes the data directory and runs
    /// the initializer first.
    pub(crate) async fn launch(
        &mut self,
        config: &HarnessConfig,
        vars: &LaunchVars<'_>,
        fresh: bool,
    ) -> HarnessResult<()> {
        if self.child.is_some() {
            return Ok(());
        }
        if fresh {
            self.wipe()?;
            if let Some(init) = &config.init {
                let status = self.command(init, vars).status().await?;
                if !status.success() {
                    return Err(self.startup_error(format!(
                        "{} exited with {}",
                        init.program.display(),
                        status
                    )));
                }
            }
        }

        let child = self
            .command(&config.server, vars)
            .spawn()
            .map_err(|e| self.startup_error(format!("spawn {}: {}", config.server.program.display(), e)))?;
        tracing::debug!(
            host_id = self.addresses.host_id,
            pid = child.id(),
            listener = %self.addresses.listener,
            "Host process spawned"
        );
        self.child = Some(child);
        Ok(())
    }

    /// Poll the listener until it accepts a TCP connection
    pub(crate) async fn wait_ready(&mut self, timeout: Duration) -> HarnessResult<()> {
        let start = Instant::now();
        let target = self.addresses.listener.to_string();
        loop {
            if let Some(status) = self.exited()? {
                return Err(self.startup_error(format!("exited during startup with {}", status)));
            }
            match TcpStream::connect(target.as_str()).await {
                Ok(_) => return Ok(()),
                Err(_) if start.elapsed() < timeout => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => {
                    return Err(self.startup_error(format!(
                        "not accepting connections within {:?}: {}",
                        timeout, e
                    )))
                }
            }
        }
    }

    fn exited(&mut self) -> HarnessResult<Option<ExitStatus>> {
        match &mut self.child {
            Some(child) => Ok(child.try_wait()?),
            None => Ok(None),
        }
    }

    /// Whether the process is still alive
    pub fn is_running(&mut self) -> bool {
        self.child.is_some() && matches!(self.exited(), Ok(None))
    }

    /// Kill the process and reap it
    pub(crate) async fn kill(&mut self) -> HarnessResult<()> {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!(host_id = self.addresses.host_id, error = %e, "Kill failed");
            }
        }
        Ok(())
    }

    fn startup_error(&self, message: String) -> HarnessError {
        HarnessError::Startup {
            topology: format!("host {}", self.addresses.host_id),
            message,
        }
    }
}

/// Hosts, schema and catalog of a native topology
pub(crate) struct NativeHosts {
    pub name: String,
    pub config: HarnessConfig,
    pub sites_per_host: usize,
    pub hosts: Vec<HostProcess>,
    pub down: BTreeSet<usize>,
    pub state: LifecycleState,
    pub schema: Option<Schema>,
    pub initial_catalog: Option<CatalogSnapshot>,
    all: Vec<HostAddresses>,
    connector: Arc<MySqlConnector>,
    launched: bool,
}

impl NativeHosts {
    pub fn new(
        name: String,
        config: HarnessConfig,
        host_count: usize,
        sites_per_host: usize,
    ) -> HarnessResult<Self> {
        // Servers without an admin listener take admin clients on the regular port
        let has_admin = config.server.args.iter().any(|a| a.contains("{admin_port}"));
        let mut hosts = Vec::with_capacity(host_count);
        for host_id in 0..host_count {
            let mut addresses = HostAddresses::local(
                host_id,
                &config.host,
                config.listener_base_port,
                config.admin_base_port,
                config.internal_base_port,
            )?;
            if !has_admin {
                addresses.admin = addresses.listener.clone();
            }
            hosts.push(HostProcess::new(addresses)?);
        }
        let all = hosts.iter().map(|h| h.addresses().clone()).collect();
        let connector = Arc::new(MySqlConnector::new(config.tls, config.database.clone()));
        Ok(Self {
            name,
            config,
            sites_per_host,
            hosts,
            down: BTreeSet::new(),
            state: LifecycleState::NotStarted,
            schema: None,
            initial_catalog: None,
            all,
            connector,
            launched: false,
        })
    }

    pub fn all_hosts(&self) -> &[HostAddresses] {
        &self.all
    }

    pub fn live_hosts(&self) -> Vec<HostAddresses> {
        if self.state != LifecycleState::Running {
            return Vec::new();
        }
        self.all
            .iter()
            .filter(|h| !self.down.contains(&h.host_id))
            .cloned()
            .collect()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        self.connector.clone()
    }

    fn peers(&self) -> String {
        self.all
            .iter()
            .map(|h| h.internal.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn startup_error(&self, e: HarnessError) -> HarnessError {
        match e {
            HarnessError::Startup { message, .. } => HarnessError::Startup {
                topology: self.name.clone(),
                message,
            },
            other => HarnessError::Startup {
                topology: self.name.clone(),
                message: other.to_string(),
            },
        }
    }

    fn first_live_admin(&self) -> HarnessResult<HostAddresses> {
        self.live_hosts()
            .into_iter()
            .next()
            .ok_or_else(|| HarnessError::NotRunning {
                topology: self.name.clone(),
            })
    }

    pub async fn start_up(&mut self, reset: bool) -> HarnessResult<()> {
        if self.schema.is_none() {
            return Err(HarnessError::CompileFailed {
                topology: self.name.clone(),
            });
        }

        if self.state == LifecycleState::Running {
            if reset {
                let admin = self.first_live_admin()?;
                let truncated = with_admin_session(
                    self.connector.as_ref(),
                    &admin.admin,
                    &self.config.client,
                    |client| async move { truncate_user_tables(&client).await },
                )
                .await?;
                tracing::debug!(topology = %self.name, truncated, "Topology reset in place");
            }
            return Ok(());
        }

        let fresh = reset || !self.launched;
        let peers = self.peers();
        let vars = LaunchVars {
            peers: &peers,
            sites: self.sites_per_host,
        };
        tracing::info!(
            topology = %self.name,
            hosts = self.hosts.len(),
            fresh,
            "Launching topology"
        );

        let config = self.config.clone();
        for i in 0..self.hosts.len() {
            if let Err(e) = self.hosts[i].launch(&config, &vars, fresh).await {
                let e = self.startup_error(e);
                self.abort().await;
                return Err(e);
            }
        }
        for i in 0..self.hosts.len() {
            if let Err(e) = self.hosts[i].wait_ready(config.startup_timeout).await {
                let e = self.startup_error(e);
                self.abort().await;
                return Err(e);
            }
        }
        self.launched = true;
        self.down.clear();
        self.state = LifecycleState::Running;

        if let Err(e) = self.after_launch(fresh).await {
            let e = self.startup_error(e);
            self.abort().await;
            return Err(e);
        }
        tracing::info!(topology = %self.name, "Topology running");
        Ok(())
    }

    /// Load the schema into fresh data and capture the initial catalog
    async fn after_launch(&mut self, fresh: bool) -> HarnessResult<()> {
        let admin = self.first_live_admin()?;
        let schema = match (&self.schema, fresh) {
            (Some(schema), true) => Some(schema.clone()),
            _ => None,
        };
        let capture = self.initial_catalog.is_none();
        let snapshot = with_admin_session(
            self.connector.as_ref(),
            &admin.admin,
            &self.config.client,
            |client| async move {
                if let Some(schema) = schema {
                    for ddl in &schema.ddl {
                        client.adhoc(ddl).await?;
                    }
                }
                if capture {
                    Ok(Some(CatalogSnapshot::capture(&client).await?))
                } else {
                    Ok(None)
                }
            },
        )
        .await?;
        if let Some(snapshot) = snapshot {
            self.initial_catalog = Some(snapshot);
        }
        Ok(())
    }

    async fn abort(&mut self) {
        for host in &mut self.hosts {
            let _ = host.kill().await;
        }
        self.state = LifecycleState::ShutDown;
    }

    pub async fn shut_down(&mut self) -> HarnessResult<()> {
        for host in &mut self.hosts {
            host.kill().await?;
        }
        if self.state == LifecycleState::Running {
            tracing::info!(topology = %self.name, "Topology shut down");
        }
        self.state = LifecycleState::ShutDown;
        self.down.clear();
        Ok(())
    }

    fn check_host(&self, host: usize) -> HarnessResult<()> {
        if host >= self.hosts.len() {
            return Err(HarnessError::NoSuchHost {
                host,
                count: self.hosts.len(),
            });
        }
        if self.state != LifecycleState::Running {
            return Err(HarnessError::NotRunning {
                topology: self.name.clone(),
            });
        }
        Ok(())
    }

    pub async fn kill_host(&mut self, host: usize) -> HarnessResult<()> {
        self.check_host(host)?;
        self.hosts[host].kill().await?;
        self.down.insert(host);
        tracing::info!(topology = %self.name, host, "Host shut down");
        Ok(())
    }

    pub async fn restart_host(&mut self, host: usize) -> HarnessResult<()> {
        self.check_host(host)?;
        if !self.down.contains(&host) {
            return Ok(());
        }
        let peers = self.peers();
        let vars = LaunchVars {
            peers: &peers,
            sites: self.sites_per_host,
        };
        let config = self.config.clone();
        let process = &mut self.hosts[host];
        process.launch(&config, &vars, false).await?;
        process.wait_ready(config.startup_timeout).await?;
        self.down.remove(&host);
        tracing::info!(topology = %self.name, host, "Host recovered");
        Ok(())
    }

    /// Whether every host that should be up is alive
    pub fn assert_alive(&mut self) -> HarnessResult<()> {
        for (i, host) in self.hosts.iter_mut().enumerate() {
            if self.state == LifecycleState::Running && !self.down.contains(&i) && !host.is_running() {
                return Err(HarnessError::Startup {
                    topology: self.name.clone(),
                    message: format!("host {} died", i),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_args() {
        let addresses = HostAddresses::local(1, "127.0.0.1", 100, 200, 300).unwrap();
        let template: Vec<String> = [
            "--id={host_id}",
            "--port",
            "{port}",
            "--admin={admin_port}",
            "--internal={internal_port}",
            "--data-dir={data_dir}",
            "--peers={peers}",
            "--sites={sites}",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let vars = LaunchVars {
            peers: "127.0.0.1:300,127.0.0.1:301",
            sites: 4,
        };
        let args = expand_args(&template, &addresses, Path::new("/tmp/d"), &vars);
        assert_eq!(
            args,
            vec![
                "--id=1",
                "--port",
                "101",
                "--admin=201",
                "--internal=301",
                "--data-dir=/tmp/d",
                "--peers=127.0.0.1:300,127.0.0.1:301",
                "--sites=4",
            ]
        );
    }

    #[test]
    fn test_admin_falls_back_to_listener() {
        let hosts = NativeHosts::new("t".into(), HarnessConfig::new(), 2, 1).unwrap();
        assert_eq!(hosts.all_hosts()[1].admin, hosts.all_hosts()[1].listener);
        assert!(hosts.live_hosts().is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_startup_error() {
        let config = HarnessConfig::new()
            .with_server(ServerCommand::new("/nonexistent/regress-server", &[]))
            .with_init(None)
            .with_base_ports(41000, 41100, 41200);
        let mut hosts = NativeHosts::new("t".into(), config, 1, 1).unwrap();
        hosts.schema = Some(Schema::new("s").statement("CREATE TABLE t (a INT)"));
        let err = hosts.start_up(true).await.unwrap_err();
        assert!(matches!(err, HarnessError::Startup { ref topology, .. } if topology == "t"));
        assert_eq!(hosts.state, LifecycleState::ShutDown);
    }
}
