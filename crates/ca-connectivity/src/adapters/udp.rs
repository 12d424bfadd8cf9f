//! # UDP/IP Transport (requires "network" feature)
//!
//! IP-family adapter on blocking UDP sockets.
//!
//! - The unicast server binds `local:port`; a busy port falls back to an
//!   ephemeral one unless `force_start` is set.
//! - The multicast server binds `0.0.0.0:port` with `SO_REUSEADDR` and joins
//!   the group (`socket2`).
//! - Receive loops and the network monitor run through the `TaskSpawner`.
//!   Loops poll a stop flag between reads, so stopping takes at most one
//!   read timeout.
//! - Multicast sends leave from the unicast socket when it is running, so
//!   replies come back to the unicast server.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use super::callbacks::CallbackSlots;
use crate::domain::{CaError, CaResult, ConnectivityType, EndpointAddress};
use crate::ports::{
    AdapterException, ConnectionStateCallback, ConnectionStateEvent, ExceptionCallback,
    InterfaceInfo, NetworkStatus, PacketReceiveCallback, ReceivedPacket, ServerType, TaskSpawner,
    TransportAdapter,
};

/// Largest datagram the receive loops accept.
const MAX_DATAGRAM: usize = 65_535;

/// Address used to discover the outbound interface. Connecting a UDP
/// socket sends nothing.
const PROBE_TARGET: (Ipv4Addr, u16) = (Ipv4Addr::new(224, 0, 1, 187), 5683);

struct ServerHandle {
    socket: Arc<UdpSocket>,
    stop: Arc<AtomicBool>,
    port: u16,
}

impl ServerHandle {
    fn shutdown(self) {
        self.stop.store(true, Ordering::Release);
    }
}

struct Shared {
    connectivity_type: ConnectivityType,
    callbacks: CallbackSlots,
    connected: AtomicBool,
    local_address: Mutex<String>,
}

/// UDP adapter for one IP-family connectivity type.
pub struct UdpAdapter {
    shared: Arc<Shared>,
    spawner: Mutex<Option<Arc<dyn TaskSpawner>>>,
    unicast: Mutex<Option<ServerHandle>>,
    multicast: Mutex<Option<ServerHandle>>,
    monitor_stop: Mutex<Option<Arc<AtomicBool>>>,
    send_socket: Mutex<Option<Arc<UdpSocket>>>,
    read_timeout: Duration,
    monitor_interval: Duration,
}

impl UdpAdapter {
    /// Create an adapter for `connectivity_type`.
    ///
    /// # Errors
    ///
    /// `InvalidParam` for a link-layer type.
    pub fn new(connectivity_type: ConnectivityType) -> CaResult<Self> {
        if !connectivity_type.is_ip_family() {
            return Err(CaError::invalid(format!(
                "UDP cannot carry {connectivity_type}"
            )));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                connectivity_type,
                callbacks: CallbackSlots::default(),
                connected: AtomicBool::new(false),
                local_address: Mutex::new("0.0.0.0".to_string()),
            }),
            spawner: Mutex::new(None),
            unicast: Mutex::new(None),
            multicast: Mutex::new(None),
            monitor_stop: Mutex::new(None),
            send_socket: Mutex::new(None),
            read_timeout: Duration::from_millis(200),
            monitor_interval: Duration::from_secs(2),
        })
    }

    /// Poll interval of the receive loops.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Interval between connectivity probes.
    #[must_use]
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    fn spawner(&self) -> CaResult<Arc<dyn TaskSpawner>> {
        self.spawner
            .lock()
            .clone()
            .ok_or_else(|| CaError::failed("adapter not initialized"))
    }

    fn spawn_receive_loop(&self, server: ServerType, socket: Arc<UdpSocket>) -> CaResult<Arc<AtomicBool>> {
        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = Arc::clone(&stop);
        let shared = Arc::clone(&self.shared);
        let name = match server {
            ServerType::Unicast => "ca-udp-unicast",
            ServerType::Multicast => "ca-udp-multicast",
        };
        self.spawner()?
            .spawn(name, Box::new(move || receive_loop(&shared, server, &socket, &loop_stop)))?;
        Ok(stop)
    }

    fn bind_unicast(local: &str, port: u16, force_start: bool) -> CaResult<UdpSocket> {
        match UdpSocket::bind((local, port)) {
            Ok(socket) => Ok(socket),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && !force_start && port != 0 => {
                debug!(port, "unicast port busy, using an ephemeral port");
                UdpSocket::bind((local, 0)).map_err(|e| io_failed("bind", &e))
            }
            Err(e) => Err(io_failed("bind", &e)),
        }
    }

    fn bind_multicast(local: &str, group: Ipv4Addr, port: u16) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;
        let interface = local.parse().unwrap_or(Ipv4Addr::UNSPECIFIED);
        socket.join_multicast_v4(&group, &interface)?;
        Ok(socket.into())
    }

    /// Socket for outbound datagrams: the unicast server's, else a lazily
    /// bound ephemeral one.
    fn outbound_socket(&self) -> CaResult<Arc<UdpSocket>> {
        if let Some(handle) = self.unicast.lock().as_ref() {
            return Ok(Arc::clone(&handle.socket));
        }
        let mut slot = self.send_socket.lock();
        if let Some(socket) = slot.as_ref() {
            return Ok(Arc::clone(socket));
        }
        let socket = Arc::new(UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(|e| io_failed("bind", &e))?);
        *slot = Some(Arc::clone(&socket));
        Ok(socket)
    }

    fn start_monitor(&self) -> CaResult<()> {
        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = Arc::clone(&stop);
        let shared = Arc::clone(&self.shared);
        let interval = self.monitor_interval;
        self.spawner()?.spawn(
            "ca-udp-monitor",
            Box::new(move || monitor_loop(&shared, interval, &loop_stop)),
        )?;
        *self.monitor_stop.lock() = Some(stop);
        Ok(())
    }
}

fn io_failed(op: &str, e: &io::Error) -> CaError {
    CaError::failed(format!("{op}: {e}"))
}

fn receive_loop(shared: &Shared, server: ServerType, socket: &UdpSocket, stop: &AtomicBool) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    debug!(transport = %shared.connectivity_type, ?server, "receive loop running");
    while !stop.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                shared.callbacks.emit_packet(ReceivedPacket {
                    connectivity_type: shared.connectivity_type,
                    source: EndpointAddress::Ip {
                        host: from.ip().to_string(),
                        port: from.port(),
                    },
                    data: buf[..len].to_vec(),
                    multicast: server == ServerType::Multicast,
                });
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            // ICMP port unreachable from an earlier send surfaces here on some platforms.
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {}
            Err(e) => {
                if !stop.load(Ordering::Acquire) {
                    warn!(transport = %shared.connectivity_type, ?server, error = %e, "receive loop failed");
                    shared.callbacks.emit_exception(AdapterException {
                        connectivity_type: shared.connectivity_type,
                        server,
                        reason: e.to_string(),
                    });
                }
                break;
            }
        }
    }
    debug!(transport = %shared.connectivity_type, ?server, "receive loop stopped");
}

fn monitor_loop(shared: &Shared, interval: Duration, stop: &AtomicBool) {
    let step = Duration::from_millis(50).min(interval);
    while !stop.load(Ordering::Acquire) {
        let mut waited = Duration::ZERO;
        while waited < interval && !stop.load(Ordering::Acquire) {
            std::thread::sleep(step);
            waited += step;
        }
        if stop.load(Ordering::Acquire) {
            break;
        }
        let local = shared.local_address.lock().clone();
        let up = probe_interface(&local).is_ok();
        if shared.connected.swap(up, Ordering::AcqRel) != up {
            let status = if up { NetworkStatus::Up } else { NetworkStatus::Down };
            info!(transport = %shared.connectivity_type, ?status, "link state changed");
            shared.callbacks.emit_state(ConnectionStateEvent {
                connectivity_type: shared.connectivity_type,
                address: local,
                status,
            });
        }
    }
}

/// Local interface address. A concrete configured address is used as is;
/// otherwise the route towards the discovery group decides.
fn probe_interface(local: &str) -> io::Result<IpAddr> {
    if let Ok(ip) = local.parse::<IpAddr>() {
        if !ip.is_unspecified() {
            return Ok(ip);
        }
    }
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(PROBE_TARGET)?;
    Ok(socket.local_addr()?.ip())
}

impl TransportAdapter for UdpAdapter {
    fn connectivity_type(&self) -> ConnectivityType {
        self.shared.connectivity_type
    }

    fn supports_multicast(&self) -> bool {
        true
    }

    fn initialize_server(&self, spawner: Arc<dyn TaskSpawner>) -> CaResult<()> {
        *self.spawner.lock() = Some(spawner);
        let local = self.shared.local_address.lock().clone();
        self.shared
            .connected
            .store(probe_interface(&local).is_ok(), Ordering::Release);
        self.start_monitor()?;
        debug!(transport = %self.shared.connectivity_type, "udp adapter initialized");
        Ok(())
    }

    fn terminate_server(&self) {
        let _ = self.stop_multicast_server();
        let _ = self.stop_unicast_server();
        if let Some(stop) = self.monitor_stop.lock().take() {
            stop.store(true, Ordering::Release);
        }
        self.send_socket.lock().take();
    }

    fn start_unicast_server(&self, local: &str, port: u16, force_start: bool) -> CaResult<u16> {
        let mut slot = self.unicast.lock();
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.port);
        }
        let socket = Self::bind_unicast(local, port, force_start)?;
        socket
            .set_read_timeout(Some(self.read_timeout))
            .map_err(|e| io_failed("set_read_timeout", &e))?;
        let bound = socket.local_addr().map_err(|e| io_failed("local_addr", &e))?.port();
        let socket = Arc::new(socket);
        let stop = self.spawn_receive_loop(ServerType::Unicast, Arc::clone(&socket))?;
        *self.shared.local_address.lock() = local.to_string();
        info!(transport = %self.shared.connectivity_type, local, port = bound, "udp unicast server started");
        *slot = Some(ServerHandle {
            socket,
            stop,
            port: bound,
        });
        Ok(bound)
    }

    fn start_multicast_server(&self, local: &str, group: &str, port: u16) -> CaResult<()> {
        let mut slot = self.multicast.lock();
        if slot.is_some() {
            return Err(CaError::ServerStartedAlready);
        }
        let group_ip: Ipv4Addr = group
            .parse()
            .map_err(|_| CaError::invalid(format!("bad multicast group {group}")))?;
        if !group_ip.is_multicast() {
            return Err(CaError::invalid(format!("{group} is not a multicast group")));
        }
        let socket = Self::bind_multicast(local, group_ip, port).map_err(|e| io_failed("multicast", &e))?;
        socket
            .set_read_timeout(Some(self.read_timeout))
            .map_err(|e| io_failed("set_read_timeout", &e))?;
        let socket = Arc::new(socket);
        let stop = self.spawn_receive_loop(ServerType::Multicast, Arc::clone(&socket))?;
        info!(transport = %self.shared.connectivity_type, group, port, "udp multicast server started");
        *slot = Some(ServerHandle { socket, stop, port });
        Ok(())
    }

    fn stop_unicast_server(&self) -> CaResult<()> {
        if let Some(handle) = self.unicast.lock().take() {
            debug!(port = handle.port, "stopping udp unicast server");
            handle.shutdown();
        }
        Ok(())
    }

    fn stop_multicast_server(&self) -> CaResult<()> {
        if let Some(handle) = self.multicast.lock().take() {
            debug!(port = handle.port, "stopping udp multicast server");
            handle.shutdown();
        }
        Ok(())
    }

    fn send_data(&self, remote: &EndpointAddress, data: &[u8], is_multicast: bool) -> CaResult<usize> {
        let EndpointAddress::Ip { host, port } = remote else {
            return Err(CaError::invalid(format!("{remote} is not an IP address")));
        };
        let target = (host.as_str(), *port)
            .to_socket_addrs()
            .map_err(|e| io_failed("resolve", &e))?
            .next()
            .ok_or_else(|| CaError::failed(format!("{host} did not resolve")))?;
        let socket = self.outbound_socket()?;
        let sent = socket
            .send_to(data, target)
            .map_err(|e| io_failed("send_to", &e))?;
        debug!(%target, len = sent, multicast = is_multicast, "udp datagram sent");
        Ok(sent)
    }

    fn set_packet_receive_callback(&self, callback: PacketReceiveCallback) {
        self.shared.callbacks.set_packet(callback);
    }

    fn set_exception_callback(&self, callback: ExceptionCallback) {
        self.shared.callbacks.set_exception(callback);
    }

    fn set_connection_state_change_callback(&self, callback: ConnectionStateCallback) {
        self.shared.callbacks.set_state(callback);
    }

    fn get_interface_info(&self) -> CaResult<InterfaceInfo> {
        let local = self.shared.local_address.lock().clone();
        let ip = probe_interface(&local).map_err(|e| io_failed("interface probe", &e))?;
        Ok(InterfaceInfo {
            name: if ip.is_loopback() { "lo".into() } else { "default".into() },
            address: ip.to_string(),
        })
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests;
