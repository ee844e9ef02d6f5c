//! A connector whose connect outcomes are scripted per attempt

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use roodb_regress::client::{Connection, Connector};
use roodb_regress::config::ClientOptions;
use roodb_regress::error::{HarnessError, HarnessResult};
use roodb_regress::topology::HostAddress;
use roodb_regress::types::{ResultTable, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    Refuse,
    /// A non-retryable connect failure
    Fail,
}

/// Counters shared by every connection a [`ScriptedConnector`] opens
#[derive(Default)]
pub struct ConnectionStats {
    pub calls: AtomicUsize,
    pub drains: AtomicUsize,
    pub closes: AtomicUsize,
}

/// Pops one scripted outcome per connect attempt; accepts once the script
/// runs out
#[derive(Default)]
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Outcome>>,
    attempts: Mutex<Vec<HostAddress>>,
    pub stats: Arc<ConnectionStats>,
}

impl ScriptedConnector {
    pub fn new(script: &[Outcome]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            ..Default::default()
        }
    }

    /// Addresses in the order connects were attempted
    pub fn attempts(&self) -> Vec<HostAddress> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, address: &HostAddress, _options: &ClientOptions) -> HarnessResult<Box<dyn Connection>> {
        self.attempts.lock().push(address.clone());
        let outcome = self.script.lock().pop_front().unwrap_or(Outcome::Accept);
        match outcome {
            Outcome::Accept => Ok(Box::new(ScriptedConnection {
                stats: self.stats.clone(),
            })),
            Outcome::Refuse => Err(HarnessError::ConnectionRefused {
                address: address.clone(),
            }),
            Outcome::Fail => Err(HarnessError::Connect {
                address: address.clone(),
                message: "authentication failed".to_string(),
            }),
        }
    }
}

struct ScriptedConnection {
    stats: Arc<ConnectionStats>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn invoke(&mut self, _procedure: &str, params: &[Value]) -> HarnessResult<Vec<ResultTable>> {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![ResultTable::of_longs("ARGS", &[Some(params.len() as i64)])])
    }

    async fn drain(&mut self) -> HarnessResult<()> {
        self.stats.drains.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> HarnessResult<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
