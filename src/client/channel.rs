//! Raw TCP channels to a host listener
//!
//! Some tests speak to a listener below the client layer (malformed login
//! packets, half-open sockets). Those streams are registered with the test
//! instance like clients so teardown can force them closed.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::error::{HarnessError, HarnessResult};
use crate::topology::HostAddress;

/// A shareable raw stream; `None` once closed
#[derive(Clone, Debug)]
pub struct RawChannel {
    address: HostAddress,
    stream: Arc<Mutex<Option<TcpStream>>>,
}

impl RawChannel {
    /// Open a stream to the address
    pub async fn connect(address: &HostAddress) -> HarnessResult<Self> {
        let stream = TcpStream::connect((address.host.as_str(), address.port))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::ConnectionRefused => HarnessError::ConnectionRefused {
                    address: address.clone(),
                },
                _ => HarnessError::Connect {
                    address: address.clone(),
                    message: e.to_string(),
                },
            })?;
        Ok(Self {
            address: address.clone(),
            stream: Arc::new(Mutex::new(Some(stream))),
        })
    }

    pub fn address(&self) -> &HostAddress {
        &self.address
    }

    /// Write raw bytes
    pub async fn send(&self, bytes: &[u8]) -> HarnessResult<()> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(HarnessError::Closed)?;
        stream.write_all(bytes).await?;
        Ok(())
    }

    /// Run a closure against the open stream
    pub async fn with_stream<R>(&self, f: impl FnOnce(&mut TcpStream) -> R) -> HarnessResult<R> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(HarnessError::Closed)?;
        Ok(f(stream))
    }

    pub async fn is_closed(&self) -> bool {
        self.stream.lock().await.is_none()
    }

    /// Shut the stream down (idempotent)
    pub async fn close(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
        }
    }
}
