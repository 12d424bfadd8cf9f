use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use tracing::{debug, info, trace};

use super::dispatcher::{DispatchStats, Dispatcher};
use super::registry::AdapterRegistry;
use crate::adapters::ThreadSpawner;
use crate::domain::{
    CaError, CaResult, ConnectivityConfig, DeliveryModel, RemoteEndpoint, TokenManager,
};
use crate::ports::{ConfigProvider, TaskSpawner, TransportAdapter};

/// One connectivity runtime: adapter table, selection, handlers and the
/// inbound queue.
///
/// Created by [`ConnectivityContextBuilder::initialize`] and torn down by
/// [`ConnectivityApi::terminate`](crate::ports::ConnectivityApi::terminate)
/// or on drop. Independent contexts may coexist.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use ca_connectivity::{
///     ConnectivityApi, ConnectivityConfig, ConnectivityContext, ConnectivityMask,
///     ConnectivityType, MemoryAdapter, MemoryNetwork,
/// };
///
/// let net = MemoryNetwork::new();
/// let adapter = MemoryAdapter::new(&net, ConnectivityType::Ip, "10.0.0.1").unwrap();
/// let ctx = ConnectivityContext::builder()
///     .config(ConnectivityConfig::for_testing())
///     .adapter(Arc::new(adapter))
///     .initialize()
///     .unwrap();
///
/// ctx.select_network(ConnectivityMask::from(ConnectivityType::Ip)).unwrap();
/// assert_eq!(ctx.get_network_information().unwrap().len(), 1);
/// ctx.terminate();
/// ```
pub struct ConnectivityContext {
    pub(crate) config: ConnectivityConfig,
    pub(crate) registry: Arc<AdapterRegistry>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) tokens: TokenManager,
    message_ids: AtomicU16,
    terminated: AtomicBool,
}

impl ConnectivityContext {
    #[must_use]
    pub fn builder() -> ConnectivityContextBuilder {
        ConnectivityContextBuilder::default()
    }

    /// Fails with `Failed` once the context has been terminated.
    pub(crate) fn ensure_running(&self) -> CaResult<()> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(CaError::failed("connectivity context terminated"));
        }
        Ok(())
    }

    /// Next message id; never 0, which means "assign one".
    pub(crate) fn next_message_id(&self) -> u16 {
        loop {
            let id = self.message_ids.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    /// Unicast `data` to `endpoint` through its selected adapter.
    pub(crate) fn send_to_endpoint(&self, endpoint: &RemoteEndpoint, data: &[u8]) -> CaResult<()> {
        if !endpoint.address.fits(endpoint.connectivity_type) {
            return Err(CaError::invalid(format!(
                "{} is not a {} address",
                endpoint.address, endpoint.connectivity_type
            )));
        }
        let adapter = self.registry.adapter_for_send(endpoint.connectivity_type)?;
        let sent = adapter.send_data(&endpoint.address, data, false)?;
        if sent < data.len() {
            return Err(CaError::failed(format!(
                "short send to {}: {sent} of {} bytes",
                endpoint.address,
                data.len()
            )));
        }
        trace!(destination = %endpoint, len = sent, "unicast sent");
        Ok(())
    }

    /// Stop everything. Returns false if already terminated.
    pub(crate) fn shutdown(&self) -> bool {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.registry.terminate();
        self.dispatcher.shutdown();
        info!(stats = ?self.dispatcher.stats(), "connectivity context terminated");
        true
    }

    #[must_use]
    pub fn config(&self) -> &ConnectivityConfig {
        &self.config
    }

    #[must_use]
    pub fn delivery_model(&self) -> DeliveryModel {
        self.dispatcher.delivery_model()
    }

    /// Snapshot of the inbound delivery counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Adapter table and selection state.
    #[must_use]
    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Tokens issued by this context and not yet released.
    #[must_use]
    pub fn outstanding_tokens(&self) -> usize {
        self.tokens.outstanding_count()
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

impl Drop for ConnectivityContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ConnectivityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityContext")
            .field("delivery_model", &self.config.delivery_model)
            .field("registered", &self.registry.registered())
            .field("selected", &self.registry.selected())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Collects configuration, adapters and the task spawner for a context.
#[derive(Default)]
pub struct ConnectivityContextBuilder {
    config: ConnectivityConfig,
    adapters: Vec<Arc<dyn TransportAdapter>>,
    spawner: Option<Arc<dyn TaskSpawner>>,
}

impl ConnectivityContextBuilder {
    #[must_use]
    pub fn config(mut self, config: ConnectivityConfig) -> Self {
        self.config = config;
        self
    }

    /// Take the configuration from a provider.
    #[must_use]
    pub fn config_provider(self, provider: &dyn ConfigProvider) -> Self {
        self.config(provider.connectivity_config())
    }

    /// Register an adapter. One per connectivity type.
    #[must_use]
    pub fn adapter(mut self, adapter: Arc<dyn TransportAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Work-submission capability handed to adapters and the dispatcher.
    /// Defaults to [`ThreadSpawner`].
    #[must_use]
    pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Build the context: wire adapter callbacks, initialize every adapter
    /// and start delivery.
    ///
    /// # Errors
    ///
    /// `InvalidParam` for bad configuration or duplicate adapters, `Failed`
    /// if an adapter or the dispatch thread cannot start. Adapters already
    /// initialized are terminated again.
    pub fn initialize(self) -> CaResult<ConnectivityContext> {
        self.config.validate()?;
        let tokens = TokenManager::new(self.config.token_length)?;
        let registry = Arc::new(AdapterRegistry::new(self.adapters, self.config.clone())?);
        let dispatcher = Arc::new(Dispatcher::new(
            self.config.delivery_model,
            self.config.event_queue_capacity,
        ));
        let spawner = self
            .spawner
            .unwrap_or_else(|| Arc::new(ThreadSpawner::new()));

        // From here on a failure drops the context, which terminates it.
        let ctx = ConnectivityContext {
            config: self.config,
            registry,
            dispatcher,
            tokens,
            message_ids: AtomicU16::new(rand::random()),
            terminated: AtomicBool::new(false),
        };

        for adapter in ctx.registry.adapters() {
            wire_callbacks(&ctx, adapter.as_ref());
            adapter.initialize_server(Arc::clone(&spawner))?;
        }
        ctx.dispatcher.start(spawner.as_ref())?;

        info!(
            delivery_model = ?ctx.config.delivery_model,
            adapters = %ctx.registry.registered(),
            queue_capacity = ctx.config.event_queue_capacity,
            "connectivity context initialized"
        );
        Ok(ctx)
    }
}

/// Route adapter callbacks into the registry and dispatcher. Callbacks hold
/// weak references so a late packet after teardown is ignored.
fn wire_callbacks(ctx: &ConnectivityContext, adapter: &dyn TransportAdapter) {
    let ty = adapter.connectivity_type();

    let dispatcher = Arc::downgrade(&ctx.dispatcher);
    let registry = Arc::downgrade(&ctx.registry);
    adapter.set_packet_receive_callback(Arc::new(move |packet| {
        let (Some(dispatcher), Some(registry)) = (dispatcher.upgrade(), registry.upgrade()) else {
            return;
        };
        if !registry.is_selected(ty) {
            debug!(transport = %ty, source = %packet.source, "packet on unselected transport ignored");
            return;
        }
        dispatcher.enqueue_packet(packet);
    }));

    let registry = Arc::downgrade(&ctx.registry);
    adapter.set_exception_callback(Arc::new(move |exception| {
        if let Some(registry) = registry.upgrade() {
            registry.on_exception(exception);
        }
    }));

    let registry = Arc::downgrade(&ctx.registry);
    adapter.set_connection_state_change_callback(Arc::new(move |event| {
        if let Some(registry) = registry.upgrade() {
            registry.on_connection_state(event);
        }
    }));
}
