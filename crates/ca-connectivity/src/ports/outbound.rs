//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the connectivity layer **requires** from the host: transport
//! adapters, a way to start background work, and configuration.

use std::fmt;
use std::sync::Arc;

use crate::domain::{CaResult, ConnectivityConfig, ConnectivityType, EndpointAddress};

// =============================================================================
// ADAPTER EVENTS
// =============================================================================

/// Which server of an adapter an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerType {
    Unicast,
    Multicast,
}

/// Link state reported by an adapter's network monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkStatus {
    Up,
    Down,
}

/// A datagram an adapter received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPacket {
    /// Transport the packet actually arrived on.
    pub connectivity_type: ConnectivityType,
    pub source: EndpointAddress,
    pub data: Vec<u8>,
    /// Arrived on the multicast server.
    pub multicast: bool,
}

/// A fault in a server that had already started successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterException {
    pub connectivity_type: ConnectivityType,
    pub server: ServerType,
    pub reason: String,
}

/// A change of link state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStateEvent {
    pub connectivity_type: ConnectivityType,
    pub address: String,
    pub status: NetworkStatus,
}

/// Local interface details of an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub address: String,
}

pub type PacketReceiveCallback = Arc<dyn Fn(ReceivedPacket) + Send + Sync>;
pub type ExceptionCallback = Arc<dyn Fn(AdapterException) + Send + Sync>;
pub type ConnectionStateCallback = Arc<dyn Fn(ConnectionStateEvent) + Send + Sync>;

// =============================================================================
// TASK SPAWNER
// =============================================================================

/// Work submission for long-running adapter and dispatch loops.
pub trait TaskSpawner: Send + Sync {
    /// Run `task` in the background under `name`.
    ///
    /// # Errors
    ///
    /// `Failed` if the task could not be started.
    fn spawn(&self, name: &str, task: Box<dyn FnOnce() + Send + 'static>) -> CaResult<()>;
}

// =============================================================================
// TRANSPORT ADAPTER
// =============================================================================

/// Contract every transport plugin implements.
///
/// Adapters are shared between the registry and their own receive loops,
/// so every method takes `&self`.
///
/// # Server Semantics
///
/// - `start_unicast_server` with `force_start == false` picks another port
///   when the requested one is busy and returns the port actually bound.
///   With `force_start == true` a busy port is an error.
/// - `start_multicast_server` returns `ServerStartedAlready` if called twice
///   without a stop in between.
/// - Both stop operations succeed on a server that is not running.
///
/// # Callbacks
///
/// Each `set_*_callback` replaces the previous one. Callbacks may be invoked
/// from any adapter thread.
pub trait TransportAdapter: Send + Sync {
    /// The transport this adapter serves.
    fn connectivity_type(&self) -> ConnectivityType;

    /// Whether the transport can reach a group of peers with one send.
    fn supports_multicast(&self) -> bool;

    /// Prepare the adapter. Background loops must be started through `spawner`.
    fn initialize_server(&self, spawner: Arc<dyn TaskSpawner>) -> CaResult<()>;

    /// Stop every server and background loop.
    fn terminate_server(&self);

    /// Start the unicast server; returns the bound port.
    fn start_unicast_server(&self, local_address: &str, port: u16, force_start: bool)
        -> CaResult<u16>;

    /// Start the multicast server on `group_address:port`.
    fn start_multicast_server(&self, local_address: &str, group_address: &str, port: u16)
        -> CaResult<()>;

    fn stop_unicast_server(&self) -> CaResult<()>;

    fn stop_multicast_server(&self) -> CaResult<()>;

    /// Send `data` to `remote`. Returns the number of bytes sent.
    fn send_data(&self, remote: &EndpointAddress, data: &[u8], is_multicast: bool)
        -> CaResult<usize>;

    fn set_packet_receive_callback(&self, callback: PacketReceiveCallback);

    fn set_exception_callback(&self, callback: ExceptionCallback);

    fn set_connection_state_change_callback(&self, callback: ConnectionStateCallback);

    /// Name and address of the local interface.
    fn get_interface_info(&self) -> CaResult<InterfaceInfo>;

    /// Whether the underlying medium is up.
    fn is_connected(&self) -> bool;
}

impl fmt::Debug for dyn TransportAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportAdapter")
            .field("connectivity_type", &self.connectivity_type())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Source of the context configuration.
pub trait ConfigProvider: Send + Sync {
    fn connectivity_config(&self) -> ConnectivityConfig;
}
