//! Test utilities for connectivity contexts.
//!
//! Recording handlers and a helper that puts a context on a
//! [`MemoryNetwork`]. Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust,ignore
//! use ca_connectivity::test_utils::{memory_node, RecordingHandlers};
//! use ca_connectivity::{ConnectivityConfig, ConnectivityType, MemoryNetwork};
//!
//! let net = MemoryNetwork::new();
//! let node = memory_node(&net, ConnectivityType::Ip, "10.0.0.1", ConnectivityConfig::for_testing())
//!     .unwrap();
//! let recorder = RecordingHandlers::new();
//! recorder.install(&node.context).unwrap();
//! assert_eq!(recorder.response_count(), 0);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::adapters::{MemoryAdapter, MemoryNetwork};
use crate::domain::{
    CaResult, ConnectivityConfig, ConnectivityType, RemoteEndpoint, RequestInfo, ResponseInfo,
};
use crate::ports::{ConnectivityApi, RequestHandler, ResponseHandler};
use crate::service::ConnectivityContext;

/// Handler pair that records every delivered message.
#[derive(Clone, Default)]
pub struct RecordingHandlers {
    requests: Arc<Mutex<Vec<(RemoteEndpoint, RequestInfo)>>>,
    responses: Arc<Mutex<Vec<(RemoteEndpoint, ResponseInfo)>>>,
}

impl RecordingHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn request_handler(&self) -> RequestHandler {
        let sink = Arc::clone(&self.requests);
        Arc::new(move |endpoint, request| sink.lock().push((endpoint.clone(), request.clone())))
    }

    #[must_use]
    pub fn response_handler(&self) -> ResponseHandler {
        let sink = Arc::clone(&self.responses);
        Arc::new(move |endpoint, response| sink.lock().push((endpoint.clone(), response.clone())))
    }

    /// Register both handlers on `api`.
    ///
    /// # Errors
    ///
    /// Whatever `register_handler` returns.
    pub fn install(&self, api: &dyn ConnectivityApi) -> CaResult<()> {
        api.register_handler(self.request_handler(), self.response_handler())
    }

    #[must_use]
    pub fn requests(&self) -> Vec<(RemoteEndpoint, RequestInfo)> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn responses(&self) -> Vec<(RemoteEndpoint, ResponseInfo)> {
        self.responses.lock().clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    #[must_use]
    pub fn response_count(&self) -> usize {
        self.responses.lock().len()
    }

    /// Poll until `requests + responses >= total` or `timeout` passes.
    /// For threaded delivery.
    #[must_use]
    pub fn wait_for(&self, total: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.request_count() + self.response_count() >= total {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

/// A context with one memory adapter attached to `network`.
pub struct MemoryNode {
    pub context: ConnectivityContext,
    pub adapter: Arc<MemoryAdapter>,
}

/// Create a [`MemoryNode`] for `host` on `network`.
///
/// # Errors
///
/// Adapter or context initialization errors.
pub fn memory_node(
    network: &Arc<MemoryNetwork>,
    connectivity_type: ConnectivityType,
    host: &str,
    config: ConnectivityConfig,
) -> CaResult<MemoryNode> {
    let adapter = Arc::new(MemoryAdapter::new(network, connectivity_type, host)?);
    let context = ConnectivityContext::builder()
        .config(config)
        .adapter(adapter.clone())
        .initialize()?;
    Ok(MemoryNode { context, adapter })
}
