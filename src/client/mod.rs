//! Client handles and the connection seam
//!
//! The wire client itself lives outside this crate. A [`Connector`] opens
//! [`Connection`]s to one address; the MySQL-protocol adapter serves native
//! topologies and the embedded adapter serves the in-process reference
//! engine. A [`Client`] bundles one or more connections with their options
//! and is what test bodies hold.

pub mod channel;
pub mod embedded;
pub mod manager;
pub mod mysql;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::ClientOptions;
use crate::error::{HarnessError, HarnessResult};
use crate::topology::HostAddress;
use crate::types::{ResultTable, Value};

pub use channel::RawChannel;
pub use embedded::EmbeddedConnector;
pub use manager::{ConnectionManager, MAX_CONNECT_ATTEMPTS};
pub use mysql::MySqlConnector;

/// Procedure that runs one ad hoc SQL statement
pub const ADHOC: &str = "@AdHoc";

/// Procedure that answers catalog introspection selectors
pub const SYSTEM_CATALOG: &str = "@SystemCatalog";

/// Opens connections to a single address
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and authenticate.
    ///
    /// A refused connection must be reported as
    /// [`HarnessError::ConnectionRefused`]; that is the only failure the
    /// connection manager retries.
    async fn connect(
        &self,
        address: &HostAddress,
        options: &ClientOptions,
    ) -> HarnessResult<Box<dyn Connection>>;
}

/// One authenticated connection
#[async_trait]
pub trait Connection: Send {
    /// Invoke a procedure and return all of its result tables
    async fn invoke(&mut self, procedure: &str, params: &[Value]) -> HarnessResult<Vec<ResultTable>>;

    /// Wait for any work the connection itself still has in flight
    async fn drain(&mut self) -> HarnessResult<()>;

    /// Close the connection (idempotent)
    async fn close(&mut self) -> HarnessResult<()>;
}

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

type Connections = tokio::sync::Mutex<Vec<(HostAddress, Box<dyn Connection>)>>;

struct ClientInner {
    id: u64,
    options: ClientOptions,
    connections: Connections,
    next: AtomicUsize,
    closed: AtomicBool,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

/// A handle over one or more connections bound to one topology.
///
/// Cloning is cheap; every clone refers to the same connections, so the
/// handle the owning test instance keeps in its registry can close what the
/// test body still holds.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Wrap already-open connections
    pub fn new(connections: Vec<(HostAddress, Box<dyn Connection>)>, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
                options,
                connections: tokio::sync::Mutex::new(connections),
                next: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Process-unique handle id (for logs)
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Addresses of the underlying connections
    pub async fn addresses(&self) -> Vec<HostAddress> {
        let connections = self.inner.connections.lock().await;
        connections.iter().map(|(addr, _)| addr.clone()).collect()
    }

    /// Number of underlying connections
    pub async fn connection_count(&self) -> usize {
        self.inner.connections.lock().await.len()
    }

    /// Invoke a procedure, rotating across connections
    pub async fn call(&self, procedure: &str, params: &[Value]) -> HarnessResult<Vec<ResultTable>> {
        let slot = self.inner.next.fetch_add(1, Ordering::Relaxed);
        self.call_slot(slot, procedure, params).await
    }

    /// Invoke a procedure on the connection to one address
    pub async fn call_on(
        &self,
        address: &HostAddress,
        procedure: &str,
        params: &[Value],
    ) -> HarnessResult<Vec<ResultTable>> {
        let slot = {
            let connections = self.inner.connections.lock().await;
            connections
                .iter()
                .position(|(addr, _)| addr == address)
                .ok_or_else(|| HarnessError::Connect {
                    address: address.clone(),
                    message: format!("client {} holds no connection to it", self.inner.id),
                })?
        };
        self.call_slot(slot, procedure, params).await
    }

    async fn call_slot(
        &self,
        slot: usize,
        procedure: &str,
        params: &[Value],
    ) -> HarnessResult<Vec<ResultTable>> {
        if self.is_closed() {
            return Err(HarnessError::Closed);
        }
        let timeout = self.inner.options.call_timeout;
        let mut connections = self.inner.connections.lock().await;
        if connections.is_empty() {
            return Err(HarnessError::Closed);
        }
        let len = connections.len();
        let (_, conn) = &mut connections[slot % len];
        match tokio::time::timeout(timeout, conn.invoke(procedure, params)).await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::CallTimeout {
                procedure: procedure.to_string(),
                timeout,
            }),
        }
    }

    /// Run one ad hoc SQL statement and return its first table
    pub async fn adhoc(&self, sql: &str) -> HarnessResult<ResultTable> {
        let mut tables = self.call(ADHOC, &[Value::from(sql)]).await?;
        Ok(if tables.is_empty() {
            ResultTable::default()
        } else {
            tables.swap_remove(0)
        })
    }

    /// Dispatch a call without waiting for it.
    ///
    /// The call runs on a spawned task; its result arrives on the returned
    /// receiver. [`Self::drain`] waits for every such call.
    pub fn call_async(
        &self,
        procedure: &str,
        params: Vec<Value>,
    ) -> oneshot::Receiver<HarnessResult<Vec<ResultTable>>> {
        let (tx, rx) = oneshot::channel();
        let client = self.clone();
        let procedure = procedure.to_string();
        let handle = tokio::spawn(async move {
            let result = client.call(&procedure, &params).await;
            let _ = tx.send(result);
        });
        self.inner.pending.lock().push(handle);
        rx
    }

    /// Block until every asynchronous call issued so far has completed
    pub async fn drain(&self) -> HarnessResult<()> {
        loop {
            let pending: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.pending.lock());
            if pending.is_empty() {
                break;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    tracing::warn!(client = self.inner.id, error = %e, "Async call task failed");
                }
            }
        }
        if self.is_closed() {
            return Ok(());
        }
        let mut connections = self.inner.connections.lock().await;
        for (_, conn) in connections.iter_mut() {
            conn.drain().await?;
        }
        Ok(())
    }

    /// Close every connection; later calls fail with [`HarnessError::Closed`]
    pub async fn close(&self) -> HarnessResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut connections = self.inner.connections.lock().await;
        let mut first_error = None;
        for (addr, mut conn) in connections.drain(..) {
            if let Err(e) = conn.close().await {
                tracing::debug!(client = self.inner.id, address = %addr, error = %e, "Close failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Every client and raw channel a test instance opened
#[derive(Default)]
pub struct HandleRegistry {
    clients: Mutex<Vec<Client>>,
    channels: Mutex<Vec<RawChannel>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_client(&self, client: &Client) {
        self.clients.lock().push(client.clone());
    }

    pub fn register_channel(&self, channel: &RawChannel) {
        self.channels.lock().push(channel.clone());
    }

    /// Snapshot of registered clients, in registration order
    pub fn clients(&self) -> Vec<Client> {
        self.clients.lock().clone()
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Drain every registered client
    pub async fn drain_all(&self) -> HarnessResult<()> {
        for client in self.clients() {
            client.drain().await?;
        }
        Ok(())
    }

    /// Close and forget every registered client and channel, even ones the
    /// test already closed. Close failures are logged, not returned.
    pub async fn close_all(&self) {
        let clients = std::mem::take(&mut *self.clients.lock());
        for client in clients {
            if let Err(e) = client.close().await {
                tracing::debug!(client = client.id(), error = %e, "Ignoring close failure");
            }
        }
        let channels = std::mem::take(&mut *self.channels.lock());
        for channel in channels {
            channel.close().await;
        }
    }
}
