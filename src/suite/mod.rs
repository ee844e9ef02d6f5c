//! Suite isolation controller
//!
//! A [`TestInstance`] binds one test to one topology. `set_up` restores the
//! topology's initial data state (launching it the first time), and
//! `tear_down` takes one of the paths in [`teardown`]. A [`Suite`] runs every
//! test against every topology in order and marks the last instance per
//! topology so that it shuts the topology down.

pub mod teardown;

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::client::{Client, ConnectionManager, HandleRegistry, RawChannel};
use crate::config::{ClientOptions, HarnessConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::topology::{Schema, Topology};

pub use teardown::{process_exit_hook, ExitHook, TeardownPath, FATAL_EXIT_CODE};

/// A topology shared by the instances that run against it
pub type SharedTopology = Arc<tokio::sync::Mutex<Topology>>;

/// One test method bound to one topology
pub struct TestInstance {
    name: String,
    topology: SharedTopology,
    config: HarnessConfig,
    registry: Arc<HandleRegistry>,
    manager: Mutex<Option<Arc<ConnectionManager>>>,
    last_for_topology: bool,
    fatal: AtomicBool,
    exit_hook: ExitHook,
}

impl TestInstance {
    pub fn new(name: impl Into<String>, topology: SharedTopology, config: HarnessConfig) -> Self {
        Self {
            name: name.into(),
            topology,
            config,
            registry: Arc::new(HandleRegistry::new()),
            manager: Mutex::new(None),
            last_for_topology: false,
            fatal: AtomicBool::new(false),
            exit_hook: process_exit_hook(),
        }
    }

    /// Mark this as the last instance scheduled against its topology
    pub fn last_for_topology(mut self, last: bool) -> Self {
        self.last_for_topology = last;
        self
    }

    pub fn with_exit_hook(mut self, hook: ExitHook) -> Self {
        self.exit_hook = hook;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topology(&self) -> &SharedTopology {
        &self.topology
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    pub fn is_last_for_topology(&self) -> bool {
        self.last_for_topology
    }

    /// Make teardown end the process instead of cleaning up
    pub fn set_fatal_failure(&self) {
        tracing::error!(test = %self.name, "Fatal failure flagged");
        self.fatal.store(true, Ordering::Release);
    }

    pub fn has_fatal_failure(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }

    /// Bring the topology to its initial data state
    pub async fn set_up(&self) -> HarnessResult<()> {
        let mut topology = self.topology.lock().await;
        topology.start_up(true).await?;
        self.rebuild_manager(&topology);
        tracing::debug!(test = %self.name, topology = %topology.name(), "Set up");
        Ok(())
    }

    fn rebuild_manager(&self, topology: &Topology) {
        let manager = ConnectionManager::new(
            topology.connector(),
            topology.hosts(),
            self.registry.clone(),
            self.config.client.clone(),
            self.config.seed,
        );
        *self.manager.lock() = Some(Arc::new(manager));
    }

    fn manager(&self) -> HarnessResult<Arc<ConnectionManager>> {
        self.manager.lock().clone().ok_or_else(|| HarnessError::NotRunning {
            topology: format!("(test {} is not set up)", self.name),
        })
    }

    pub async fn client(&self) -> HarnessResult<Client> {
        self.manager()?.client().await
    }

    pub async fn client_with(&self, options: &ClientOptions) -> HarnessResult<Client> {
        self.manager()?.client_with(options).await
    }

    pub async fn admin_client(&self) -> HarnessResult<Client> {
        self.manager()?.admin_client().await
    }

    pub async fn admin_client_with(&self, options: &ClientOptions) -> HarnessResult<Client> {
        self.manager()?.admin_client_with(options).await
    }

    pub async fn client_to_host(&self, host_id: usize) -> HarnessResult<Client> {
        self.manager()?.client_to_host(host_id).await
    }

    pub async fn client_to_host_with(&self, host_id: usize, options: &ClientOptions) -> HarnessResult<Client> {
        self.manager()?.client_to_host_with(host_id, options).await
    }

    pub async fn client_to_hosts(&self, host_ids: &[usize]) -> HarnessResult<Client> {
        self.manager()?.client_to_hosts(host_ids).await
    }

    pub async fn client_to_hosts_with(&self, host_ids: &[usize], options: &ClientOptions) -> HarnessResult<Client> {
        self.manager()?.client_to_hosts_with(host_ids, options).await
    }

    pub async fn fully_connected_client(&self) -> HarnessResult<Client> {
        self.manager()?.fully_connected_client().await
    }

    pub async fn fully_connected_client_with(&self, options: &ClientOptions) -> HarnessResult<Client> {
        self.manager()?.fully_connected_client_with(options).await
    }

    pub async fn raw_channel(&self, host_id: usize) -> HarnessResult<RawChannel> {
        self.manager()?.raw_channel(host_id).await
    }

    pub async fn is_reference_interpreter(&self) -> bool {
        self.topology.lock().await.is_reference_interpreter()
    }

    /// Kill one host; later acquisitions only see the survivors
    pub async fn shut_down_host(&self, host: usize) -> HarnessResult<()> {
        let mut topology = self.topology.lock().await;
        topology.shut_down_host(host).await?;
        self.rebuild_manager(&topology);
        Ok(())
    }

    /// Restart a killed host and make it eligible for new clients again
    pub async fn recover_host(&self, host: usize) -> HarnessResult<()> {
        let mut topology = self.topology.lock().await;
        topology.recover_host(host).await?;
        self.rebuild_manager(&topology);
        Ok(())
    }

    /// Run exactly one teardown path
    pub async fn tear_down(&self) -> HarnessResult<TeardownPath> {
        if self.has_fatal_failure() {
            tracing::error!(test = %self.name, code = FATAL_EXIT_CODE, "Exiting on fatal failure");
            (self.exit_hook)(FATAL_EXIT_CODE);
            return Ok(TeardownPath::Fatal);
        }

        let mut topology = self.topology.lock().await;
        if self.last_for_topology {
            topology.shut_down().await?;
            tracing::debug!(test = %self.name, topology = %topology.name(), "Full shutdown");
            return Ok(TeardownPath::FullShutdown);
        }

        teardown::soft_reset(&self.name, &topology, &self.registry, &self.config.client).await?;
        Ok(TeardownPath::SoftReset)
    }
}

/// A test body
pub type TestFn = Arc<dyn Fn(Arc<TestInstance>) -> BoxFuture<'static, ()> + Send + Sync>;

struct TestCase {
    name: String,
    body: TestFn,
}

/// Assembles a [`Suite`]: one schema, several topologies, several tests
pub struct SuiteBuilder {
    name: String,
    schema: Schema,
    config: HarnessConfig,
    topologies: Vec<Topology>,
    tests: Vec<TestCase>,
    exit_hook: ExitHook,
}

impl SuiteBuilder {
    pub fn new(name: impl Into<String>, schema: Schema, config: HarnessConfig) -> Self {
        Self {
            name: name.into(),
            schema,
            config,
            topologies: Vec::new(),
            tests: Vec::new(),
            exit_hook: process_exit_hook(),
        }
    }

    /// Compile the schema on `topology` and add it; a failed compile
    /// invalidates the whole suite
    pub fn add_topology(mut self, topology: impl Into<Topology>) -> HarnessResult<Self> {
        let mut topology = topology.into();
        if !topology.compile(&self.schema) {
            return Err(HarnessError::CompileFailed {
                topology: topology.name().to_string(),
            });
        }
        self.topologies.push(topology);
        Ok(self)
    }

    pub fn test<F, Fut>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Arc<TestInstance>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let body: TestFn = Arc::new(move |instance| body(instance).boxed());
        self.tests.push(TestCase {
            name: name.into(),
            body,
        });
        self
    }

    pub fn with_exit_hook(mut self, hook: ExitHook) -> Self {
        self.exit_hook = hook;
        self
    }

    pub fn build(self) -> Suite {
        Suite {
            name: self.name,
            config: self.config,
            topologies: self
                .topologies
                .into_iter()
                .map(|t| Arc::new(tokio::sync::Mutex::new(t)))
                .collect(),
            tests: self.tests,
            exit_hook: self.exit_hook,
        }
    }
}

/// Every test against every topology
pub struct Suite {
    name: String,
    config: HarnessConfig,
    topologies: Vec<SharedTopology>,
    tests: Vec<TestCase>,
    exit_hook: ExitHook,
}

impl Suite {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the suite.
    ///
    /// Test failures, including panics, are recorded in the report. A
    /// topology that fails to start aborts the run with that error after
    /// shutting every topology down.
    pub async fn run(self) -> HarnessResult<SuiteReport> {
        let mut report = SuiteReport {
            suite: self.name.clone(),
            outcomes: Vec::new(),
        };
        tracing::info!(
            suite = %self.name,
            topologies = self.topologies.len(),
            tests = self.tests.len(),
            "Running suite"
        );

        for topology in &self.topologies {
            let topology_name = topology.lock().await.name().to_string();
            for (i, test) in self.tests.iter().enumerate() {
                let instance = Arc::new(
                    TestInstance::new(test.name.clone(), topology.clone(), self.config.clone())
                        .last_for_topology(i + 1 == self.tests.len())
                        .with_exit_hook(self.exit_hook.clone()),
                );

                if let Err(e) = instance.set_up().await {
                    tracing::error!(suite = %self.name, topology = %topology_name, error = %e, "Topology failed to start, aborting suite");
                    self.shut_down_all().await;
                    return Err(e);
                }

                let body = AssertUnwindSafe((test.body)(instance.clone())).catch_unwind().await;
                let mut failure = body.err().map(panic_message);

                match instance.tear_down().await {
                    Ok(_) => {}
                    Err(e) => {
                        let message = format!("teardown: {}", e);
                        failure = Some(match failure {
                            Some(f) => format!("{}; {}", f, message),
                            None => message,
                        });
                    }
                }

                match &failure {
                    None => tracing::info!(test = %test.name, topology = %topology_name, "Test passed"),
                    Some(f) => tracing::warn!(test = %test.name, topology = %topology_name, failure = %f, "Test failed"),
                }
                report.outcomes.push(TestOutcome {
                    test: test.name.clone(),
                    topology: topology_name.clone(),
                    failure,
                });
            }
        }
        Ok(report)
    }

    async fn shut_down_all(&self) {
        for topology in &self.topologies {
            let mut topology = topology.lock().await;
            if let Err(e) = topology.shut_down().await {
                tracing::warn!(topology = %topology.name(), error = %e, "Shutdown failed");
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test panicked".to_string()
    }
}

/// Result of one test on one topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub test: String,
    pub topology: String,
    /// `None` when the test passed
    pub failure: Option<String>,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct SuiteReport {
    pub suite: String,
    pub outcomes: Vec<TestOutcome>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &TestOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(TestOutcome::passed)
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} passed, {} failed",
            self.suite,
            self.passed(),
            self.outcomes.len() - self.passed()
        )?;
        for outcome in self.failed() {
            writeln!(
                f,
                "  {} [{}]: {}",
                outcome.test,
                outcome.topology,
                outcome.failure.as_deref().unwrap_or_default()
            )?;
        }
        Ok(())
    }
}
