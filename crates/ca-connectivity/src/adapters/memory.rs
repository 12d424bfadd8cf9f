//! # In-Memory Transport
//!
//! A [`MemoryNetwork`] is a shared in-process medium; each [`MemoryAdapter`]
//! is one node attached to it under a host name (or MAC for link-layer
//! transports). Delivery is synchronous: `send_data` invokes the receiver's
//! packet callback before it returns.
//!
//! - Unicast reaches the node bound at `(type, host, port)`; nothing bound
//!   means the datagram is silently lost.
//! - Multicast reaches every other node of the same type whose multicast
//!   server is running on the destination group and port.
//!
//! The adapter also exposes test hooks: [`MemoryAdapter::inject_packet`],
//! [`MemoryAdapter::raise_exception`], [`MemoryAdapter::set_connected`] and
//! a log of sent datagrams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::callbacks::CallbackSlots;
use crate::domain::{CaError, CaResult, ConnectivityType, EndpointAddress, MacAddress};
use crate::ports::{
    AdapterException, ConnectionStateCallback, ConnectionStateEvent, ExceptionCallback,
    InterfaceInfo, NetworkStatus, PacketReceiveCallback, ReceivedPacket, ServerType, TaskSpawner,
    TransportAdapter,
};

/// First port handed out when a node asks for "any port".
const EPHEMERAL_PORT_START: u16 = 49152;

type RouteKey = (ConnectivityType, String, u16);

#[derive(Default)]
struct NetworkState {
    unicast: HashMap<RouteKey, Weak<Node>>,
    members: Vec<Weak<Node>>,
    next_ephemeral: u16,
}

impl NetworkState {
    fn is_bound(&self, ty: ConnectivityType, host: &str, port: u16) -> bool {
        self.unicast
            .get(&(ty, host.to_string(), port))
            .is_some_and(|w| w.strong_count() > 0)
    }
}

/// Shared in-process medium.
#[derive(Default)]
pub struct MemoryNetwork {
    state: Mutex<NetworkState>,
}

impl MemoryNetwork {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn join(&self, node: &Arc<Node>) {
        let mut state = self.state.lock();
        state.members.retain(|w| w.strong_count() > 0);
        state.members.push(Arc::downgrade(node));
    }

    /// Bind `port` (or an ephemeral one) for `node`. Returns the bound port.
    fn bind(&self, node: &Arc<Node>, port: u16, force_start: bool) -> CaResult<u16> {
        let mut state = self.state.lock();
        let ty = node.connectivity_type;

        if ty.is_link_layer() {
            state
                .unicast
                .insert((ty, node.host.clone(), 0), Arc::downgrade(node));
            return Ok(0);
        }

        let host = node.host.as_str();
        let chosen = if port != 0 && !state.is_bound(ty, host, port) {
            port
        } else if port != 0 && force_start {
            return Err(CaError::failed(format!(
                "port {port} already in use on {}",
                node.host
            )));
        } else {
            if state.next_ephemeral < EPHEMERAL_PORT_START {
                state.next_ephemeral = EPHEMERAL_PORT_START;
            }
            let mut candidate = state.next_ephemeral;
            while state.is_bound(ty, host, candidate) {
                candidate = candidate.checked_add(1).unwrap_or(EPHEMERAL_PORT_START);
            }
            state.next_ephemeral = candidate.checked_add(1).unwrap_or(EPHEMERAL_PORT_START);
            candidate
        };

        state
            .unicast
            .insert((ty, node.host.clone(), chosen), Arc::downgrade(node));
        Ok(chosen)
    }

    fn unbind(&self, ty: ConnectivityType, host: &str, port: u16) {
        self.state.lock().unicast.remove(&(ty, host.to_string(), port));
    }

    fn unicast_target(&self, ty: ConnectivityType, remote: &EndpointAddress) -> Option<Arc<Node>> {
        let key = (ty, remote.host(), remote.port());
        self.state.lock().unicast.get(&key).and_then(Weak::upgrade)
    }

    fn multicast_targets(
        &self,
        sender: &Node,
        remote: &EndpointAddress,
    ) -> Vec<Arc<Node>> {
        let members: Vec<Arc<Node>> = self
            .state
            .lock()
            .members
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        members
            .into_iter()
            .filter(|n| {
                !std::ptr::eq(Arc::as_ptr(n), sender)
                    && n.connectivity_type == sender.connectivity_type
                    && n.joined(remote)
            })
            .collect()
    }
}

// =============================================================================
// NODE
// =============================================================================

#[derive(Default)]
struct Servers {
    unicast_port: Option<u16>,
    /// Group and port of the running multicast server.
    multicast: Option<(String, u16)>,
}

struct Node {
    connectivity_type: ConnectivityType,
    host: String,
    multicast_capable: AtomicBool,
    servers: Mutex<Servers>,
    callbacks: CallbackSlots,
    connected: AtomicBool,
    interface_fails: AtomicBool,
}

impl Node {
    fn joined(&self, remote: &EndpointAddress) -> bool {
        let servers = self.servers.lock();
        match (&servers.multicast, remote) {
            (Some((group, port)), EndpointAddress::Ip { host, port: dst }) => {
                group == host && port == dst
            }
            (Some(_), EndpointAddress::Mac(mac)) => *mac == MacAddress::BROADCAST,
            (None, _) => false,
        }
    }

    fn source_address(&self) -> EndpointAddress {
        if self.connectivity_type.is_link_layer() {
            let mac = self.host.parse().unwrap_or(MacAddress::BROADCAST);
            EndpointAddress::Mac(mac)
        } else {
            EndpointAddress::Ip {
                host: self.host.clone(),
                port: self.servers.lock().unicast_port.unwrap_or(0),
            }
        }
    }
}

/// A datagram recorded by [`MemoryAdapter::sent_packets`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub destination: EndpointAddress,
    pub data: Vec<u8>,
    pub multicast: bool,
}

// =============================================================================
// ADAPTER
// =============================================================================

/// One node on a [`MemoryNetwork`].
pub struct MemoryAdapter {
    network: Arc<MemoryNetwork>,
    node: Arc<Node>,
    sent: Mutex<Vec<SentPacket>>,
}

impl MemoryAdapter {
    /// Attach a node to `network`.
    ///
    /// # Errors
    ///
    /// `InvalidParam` if `host` is empty, or not a MAC address for a
    /// link-layer transport.
    pub fn new(
        network: &Arc<MemoryNetwork>,
        connectivity_type: ConnectivityType,
        host: impl Into<String>,
    ) -> CaResult<Self> {
        let host = host.into();
        if host.is_empty() {
            return Err(CaError::invalid("memory adapter host is empty"));
        }
        let host = if connectivity_type.is_link_layer() {
            host.parse::<MacAddress>()?.to_string()
        } else {
            host
        };
        let node = Arc::new(Node {
            connectivity_type,
            host,
            multicast_capable: AtomicBool::new(true),
            servers: Mutex::new(Servers::default()),
            callbacks: CallbackSlots::default(),
            connected: AtomicBool::new(true),
            interface_fails: AtomicBool::new(false),
        });
        network.join(&node);
        Ok(Self {
            network: Arc::clone(network),
            node,
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Report no multicast support, as a point-to-point transport would.
    #[must_use]
    pub fn without_multicast(self) -> Self {
        self.node.multicast_capable.store(false, Ordering::Release);
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.node.host
    }

    /// Address peers see as the source of this node's datagrams.
    #[must_use]
    pub fn local_endpoint_address(&self) -> EndpointAddress {
        self.node.source_address()
    }

    /// Deliver `data` to this node as if it arrived from `source`.
    pub fn inject_packet(&self, source: EndpointAddress, data: Vec<u8>, multicast: bool) -> bool {
        self.node.callbacks.emit_packet(ReceivedPacket {
            connectivity_type: self.node.connectivity_type,
            source,
            data,
            multicast,
        })
    }

    /// Simulate a server fault: the server stops and the exception callback fires.
    pub fn raise_exception(&self, server: ServerType, reason: impl Into<String>) {
        match server {
            ServerType::Unicast => self.release_unicast(),
            ServerType::Multicast => self.node.servers.lock().multicast = None,
        }
        self.node.callbacks.emit_exception(AdapterException {
            connectivity_type: self.node.connectivity_type,
            server,
            reason: reason.into(),
        });
    }

    /// Flip the medium up or down, notifying on change.
    pub fn set_connected(&self, connected: bool) {
        let previous = self.node.connected.swap(connected, Ordering::AcqRel);
        if previous != connected {
            self.node.callbacks.emit_state(ConnectionStateEvent {
                connectivity_type: self.node.connectivity_type,
                address: self.node.host.clone(),
                status: if connected {
                    NetworkStatus::Up
                } else {
                    NetworkStatus::Down
                },
            });
        }
    }

    /// Make `get_interface_info` fail.
    pub fn fail_interface_queries(&self, fail: bool) {
        self.node.interface_fails.store(fail, Ordering::Release);
    }

    #[must_use]
    pub fn sent_packets(&self) -> Vec<SentPacket> {
        self.sent.lock().clone()
    }

    #[must_use]
    pub fn unicast_port(&self) -> Option<u16> {
        self.node.servers.lock().unicast_port
    }

    #[must_use]
    pub fn multicast_running(&self) -> bool {
        self.node.servers.lock().multicast.is_some()
    }

    fn release_unicast(&self) {
        let port = self.node.servers.lock().unicast_port.take();
        if let Some(port) = port {
            self.network
                .unbind(self.node.connectivity_type, &self.node.host, port);
        }
    }

    fn deliver(&self, target: &Node, data: &[u8], multicast: bool) {
        target.callbacks.emit_packet(ReceivedPacket {
            connectivity_type: target.connectivity_type,
            source: self.node.source_address(),
            data: data.to_vec(),
            multicast,
        });
    }
}

impl TransportAdapter for MemoryAdapter {
    fn connectivity_type(&self) -> ConnectivityType {
        self.node.connectivity_type
    }

    fn supports_multicast(&self) -> bool {
        self.node.multicast_capable.load(Ordering::Acquire)
    }

    fn initialize_server(&self, _spawner: Arc<dyn TaskSpawner>) -> CaResult<()> {
        debug!(transport = %self.node.connectivity_type, host = %self.node.host, "memory adapter initialized");
        Ok(())
    }

    fn terminate_server(&self) {
        self.release_unicast();
        self.node.servers.lock().multicast = None;
    }

    fn start_unicast_server(&self, _local: &str, port: u16, force_start: bool) -> CaResult<u16> {
        if let Some(existing) = self.node.servers.lock().unicast_port {
            return Ok(existing);
        }
        let bound = self.network.bind(&self.node, port, force_start)?;
        self.node.servers.lock().unicast_port = Some(bound);
        Ok(bound)
    }

    fn start_multicast_server(&self, _local: &str, group: &str, port: u16) -> CaResult<()> {
        if !self.supports_multicast() {
            return Err(CaError::failed("transport has no multicast"));
        }
        let mut servers = self.node.servers.lock();
        if servers.multicast.is_some() {
            return Err(CaError::ServerStartedAlready);
        }
        let group = if self.node.connectivity_type.is_link_layer() {
            MacAddress::BROADCAST.to_string()
        } else {
            group.to_string()
        };
        servers.multicast = Some((group, port));
        Ok(())
    }

    fn stop_unicast_server(&self) -> CaResult<()> {
        self.release_unicast();
        Ok(())
    }

    fn stop_multicast_server(&self) -> CaResult<()> {
        self.node.servers.lock().multicast = None;
        Ok(())
    }

    fn send_data(&self, remote: &EndpointAddress, data: &[u8], is_multicast: bool) -> CaResult<usize> {
        if !self.node.connected.load(Ordering::Acquire) {
            return Err(CaError::failed("network is down"));
        }
        if !remote.fits(self.node.connectivity_type) {
            return Err(CaError::invalid(format!(
                "{remote} is not a {} address",
                self.node.connectivity_type
            )));
        }
        self.sent.lock().push(SentPacket {
            destination: remote.clone(),
            data: data.to_vec(),
            multicast: is_multicast,
        });

        if is_multicast {
            let targets = self.network.multicast_targets(&self.node, remote);
            trace!(destination = %remote, receivers = targets.len(), "memory multicast");
            for target in targets {
                self.deliver(&target, data, true);
            }
        } else if let Some(target) = self.network.unicast_target(self.node.connectivity_type, remote) {
            self.deliver(&target, data, false);
        } else {
            trace!(destination = %remote, "no memory node bound, datagram lost");
        }
        Ok(data.len())
    }

    fn set_packet_receive_callback(&self, callback: PacketReceiveCallback) {
        self.node.callbacks.set_packet(callback);
    }

    fn set_exception_callback(&self, callback: ExceptionCallback) {
        self.node.callbacks.set_exception(callback);
    }

    fn set_connection_state_change_callback(&self, callback: ConnectionStateCallback) {
        self.node.callbacks.set_state(callback);
    }

    fn get_interface_info(&self) -> CaResult<InterfaceInfo> {
        if self.node.interface_fails.load(Ordering::Acquire) {
            return Err(CaError::failed("interface unavailable"));
        }
        Ok(InterfaceInfo {
            name: format!("mem-{}", self.node.connectivity_type),
            address: self.node.host.clone(),
        })
    }

    fn is_connected(&self) -> bool {
        self.node.connected.load(Ordering::Acquire)
    }
}
