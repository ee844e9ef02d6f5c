//! Connections to the in-process reference engine

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{Connection, Connector};
use crate::config::ClientOptions;
use crate::error::{HarnessError, HarnessResult};
use crate::topology::{HostAddress, ReferenceEngine};
use crate::types::{ResultTable, Value};

/// Connector for a reference interpreter topology.
///
/// Refuses connections while the owning topology is not running, the same
/// way a stopped server's port would.
#[derive(Clone)]
pub struct EmbeddedConnector {
    engine: Option<Arc<dyn ReferenceEngine>>,
    accepting: Arc<AtomicBool>,
}

impl EmbeddedConnector {
    pub fn new(engine: Arc<dyn ReferenceEngine>, accepting: Arc<AtomicBool>) -> Self {
        Self {
            engine: Some(engine),
            accepting,
        }
    }

    /// A connector with no engine behind it; every connect is refused
    pub fn detached() -> Self {
        Self {
            engine: None,
            accepting: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl Connector for EmbeddedConnector {
    async fn connect(
        &self,
        address: &HostAddress,
        options: &ClientOptions,
    ) -> HarnessResult<Box<dyn Connection>> {
        let engine = match &self.engine {
            Some(engine) if self.accepting.load(Ordering::Acquire) => engine.clone(),
            _ => {
                return Err(HarnessError::ConnectionRefused {
                    address: address.clone(),
                })
            }
        };
        tracing::trace!(
            engine = engine.name(),
            user = %options.credentials.user,
            "Embedded connection opened"
        );
        Ok(Box::new(EmbeddedConnection {
            engine,
            accepting: self.accepting.clone(),
            closed: false,
        }))
    }
}

struct EmbeddedConnection {
    engine: Arc<dyn ReferenceEngine>,
    accepting: Arc<AtomicBool>,
    closed: bool,
}

#[async_trait]
impl Connection for EmbeddedConnection {
    async fn invoke(&mut self, procedure: &str, params: &[Value]) -> HarnessResult<Vec<ResultTable>> {
        if self.closed {
            return Err(HarnessError::Closed);
        }
        if !self.accepting.load(Ordering::Acquire) {
            return Err(crate::error::ProcCallFailure::new(
                procedure,
                crate::error::CallStatus::ConnectionLost,
                "reference engine is not running",
            )
            .into());
        }
        self.engine.invoke(procedure, params).await
    }

    async fn drain(&mut self) -> HarnessResult<()> {
        // Calls complete before invoke returns
        Ok(())
    }

    async fn close(&mut self) -> HarnessResult<()> {
        self.closed = true;
        Ok(())
    }
}
