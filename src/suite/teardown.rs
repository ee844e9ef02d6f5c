//! Per-test teardown
//!
//! Exactly one of three paths runs:
//!
//! 1. **Fatal**: the test flagged an unrecoverable failure. The exit hook
//!    ends the process; nothing else runs.
//! 2. **Full shutdown**: the last test scheduled on a topology shuts it down.
//! 3. **Soft reset**: every client the test opened is drained, so no
//!    in-flight write lands after the reset. The catalog must then match
//!    the one captured at startup and every user table is emptied. Clients
//!    and raw channels are closed last.

use std::sync::Arc;

use crate::client::HandleRegistry;
use crate::config::ClientOptions;
use crate::error::{HarnessError, HarnessResult};
use crate::topology::catalog::{truncate_user_tables, with_admin_session};
use crate::topology::{CatalogSnapshot, Topology};

/// Process exit code used by the fatal path
pub const FATAL_EXIT_CODE: i32 = 1;

/// Called with the exit code when a test flags a fatal failure
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

/// The exit hook used outside tests
pub fn process_exit_hook() -> ExitHook {
    Arc::new(|code| std::process::exit(code))
}

/// Which teardown path ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownPath {
    Fatal,
    FullShutdown,
    SoftReset,
}

/// Drain, catalog check, truncation and close.
///
/// Registered handles are closed on every outcome, including a failed
/// drain, catalog check or truncation.
pub(crate) async fn soft_reset(
    test: &str,
    topology: &Topology,
    registry: &HandleRegistry,
    options: &ClientOptions,
) -> HarnessResult<()> {
    let drained = registry.drain_all().await;
    let result = check_and_truncate(test, topology, options).await;
    registry.close_all().await;
    drained?;
    result
}

async fn check_and_truncate(test: &str, topology: &Topology, options: &ClientOptions) -> HarnessResult<()> {
    let admin = topology
        .hosts()
        .into_iter()
        .next()
        .ok_or_else(|| HarnessError::NotRunning {
            topology: topology.name().to_string(),
        })?;
    let connector = topology.connector();
    let initial = topology.initial_catalog().cloned().unwrap_or_default();

    let truncated = with_admin_session(connector.as_ref(), &admin.admin, options, |client| async move {
        let current = CatalogSnapshot::capture(&client).await?;
        let diff = initial.diff(&current);
        if !diff.is_clean() {
            return Err(HarnessError::CatalogDrift {
                test: test.to_string(),
                diff: diff.to_string(),
            });
        }
        truncate_user_tables(&client).await
    })
    .await?;
    tracing::debug!(test, topology = %topology.name(), truncated, "Soft reset complete");
    Ok(())
}
