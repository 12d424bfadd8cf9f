//! # Adapter Registry & Selector
//!
//! Holds one registration per connectivity type and the selection mask.
//!
//! ## Locking
//!
//! - `table` and `selected` sit behind reader/writer locks; readers never see
//!   a half-updated registration.
//! - `lifecycle` serializes select, unselect and server-role starts so no
//!   adapter is started twice or used after stop.
//! - Adapter methods are never called while `table` is locked.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::domain::{
    CaError, CaResult, ConnectivityConfig, ConnectivityMask, ConnectivityType, EndpointAddress,
    LocalConnectivity, MacAddress,
};
use crate::ports::{
    AdapterException, ConnectionStateEvent, NetworkStatus, ServerType, TransportAdapter,
};

/// Activation state of a registered adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterState {
    Inactive,
    /// Unicast server running.
    Listening,
    /// Unicast and multicast servers running.
    MulticastActive,
    /// Failed to start or faulted while running.
    Error,
}

struct Registration {
    adapter: Arc<dyn TransportAdapter>,
    state: AdapterState,
    unicast_port: Option<u16>,
    multicast_active: bool,
    link_up: bool,
}

impl Registration {
    fn refresh_state(&mut self) {
        self.state = match (self.unicast_port, self.multicast_active) {
            (_, true) => AdapterState::MulticastActive,
            (Some(_), false) => AdapterState::Listening,
            (None, false) => AdapterState::Inactive,
        };
    }
}

/// Server roles requested by the application; adapters selected later
/// honour them too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerRoles {
    pub listening: bool,
    pub discovery: bool,
}

pub struct AdapterRegistry {
    config: ConnectivityConfig,
    table: RwLock<BTreeMap<ConnectivityType, Registration>>,
    selected: RwLock<ConnectivityMask>,
    roles: RwLock<ServerRoles>,
    lifecycle: Mutex<()>,
}

impl AdapterRegistry {
    /// Build a registry from a set of adapters.
    ///
    /// # Errors
    ///
    /// `InvalidParam` if two adapters serve the same connectivity type.
    pub fn new(
        adapters: Vec<Arc<dyn TransportAdapter>>,
        config: ConnectivityConfig,
    ) -> CaResult<Self> {
        let mut table = BTreeMap::new();
        for adapter in adapters {
            let ty = adapter.connectivity_type();
            let registration = Registration {
                link_up: adapter.is_connected(),
                adapter,
                state: AdapterState::Inactive,
                unicast_port: None,
                multicast_active: false,
            };
            if table.insert(ty, registration).is_some() {
                return Err(CaError::invalid(format!("duplicate adapter for {ty}")));
            }
        }
        Ok(Self {
            config,
            table: RwLock::new(table),
            selected: RwLock::new(ConnectivityMask::NONE),
            roles: RwLock::new(ServerRoles::default()),
            lifecycle: Mutex::new(()),
        })
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Every registered adapter, in connectivity-type order.
    #[must_use]
    pub fn adapters(&self) -> Vec<Arc<dyn TransportAdapter>> {
        self.table
            .read()
            .values()
            .map(|r| Arc::clone(&r.adapter))
            .collect()
    }

    #[must_use]
    pub fn registered(&self) -> ConnectivityMask {
        self.table.read().keys().copied().collect()
    }

    #[must_use]
    pub fn selected(&self) -> ConnectivityMask {
        *self.selected.read()
    }

    #[must_use]
    pub fn is_selected(&self, ty: ConnectivityType) -> bool {
        self.selected.read().contains(ty)
    }

    #[must_use]
    pub fn roles(&self) -> ServerRoles {
        *self.roles.read()
    }

    #[must_use]
    pub fn adapter_state(&self, ty: ConnectivityType) -> Option<AdapterState> {
        self.table.read().get(&ty).map(|r| r.state)
    }

    #[must_use]
    pub fn unicast_port(&self, ty: ConnectivityType) -> Option<u16> {
        self.table.read().get(&ty).and_then(|r| r.unicast_port)
    }

    fn adapter(&self, ty: ConnectivityType) -> Option<Arc<dyn TransportAdapter>> {
        self.table.read().get(&ty).map(|r| Arc::clone(&r.adapter))
    }

    fn update(&self, ty: ConnectivityType, f: impl FnOnce(&mut Registration)) {
        if let Some(reg) = self.table.write().get_mut(&ty) {
            f(reg);
        }
    }

    // =========================================================================
    // SELECTION
    // =========================================================================

    /// Start every adapter in `mask` that is not yet selected.
    ///
    /// Failures do not stop the remaining adapters from starting.
    ///
    /// # Errors
    ///
    /// `SelectionFailed` listing what started and what failed.
    pub fn select(&self, mask: ConnectivityMask) -> CaResult<()> {
        let _lifecycle = self.lifecycle.lock();
        let pending = mask.difference(self.selected());
        let roles = self.roles();

        let mut started = ConnectivityMask::NONE;
        let mut failed = Vec::new();
        for ty in pending.iter() {
            let Some(adapter) = self.adapter(ty) else {
                failed.push((ty, "no adapter registered".to_string()));
                continue;
            };
            match self.start_adapter(ty, adapter.as_ref(), roles) {
                Ok(()) => {
                    self.selected.write().insert(ty);
                    started.insert(ty);
                }
                Err(e) => {
                    self.update(ty, |r| r.state = AdapterState::Error);
                    failed.push((ty, e.to_string()));
                }
            }
        }

        info!(
            requested = %mask,
            started = %started,
            failed = failed.len(),
            selected = %self.selected(),
            "network selection updated"
        );
        if failed.is_empty() {
            Ok(())
        } else {
            Err(CaError::SelectionFailed { started, failed })
        }
    }

    fn start_adapter(
        &self,
        ty: ConnectivityType,
        adapter: &dyn TransportAdapter,
        roles: ServerRoles,
    ) -> CaResult<()> {
        let port = adapter.start_unicast_server(
            &self.config.local_address,
            self.config.unicast_port,
            self.config.force_start,
        )?;
        self.update(ty, |r| {
            r.unicast_port = Some(port);
            r.refresh_state();
        });
        debug!(transport = %ty, port, "unicast server started");

        if roles.listening && adapter.supports_multicast() {
            if let Err(e) = self.start_multicast(ty, adapter) {
                if let Err(stop_err) = adapter.stop_unicast_server() {
                    warn!(transport = %ty, error = %stop_err, "unicast rollback failed");
                }
                self.update(ty, |r| {
                    r.unicast_port = None;
                    r.refresh_state();
                });
                return Err(e);
            }
        }
        Ok(())
    }

    fn start_multicast(&self, ty: ConnectivityType, adapter: &dyn TransportAdapter) -> CaResult<()> {
        let group = self.multicast_group(ty);
        match adapter.start_multicast_server(
            &self.config.local_address,
            &group,
            self.config.multicast_port,
        ) {
            Ok(()) | Err(CaError::ServerStartedAlready) => {}
            Err(e) => return Err(e),
        }
        self.update(ty, |r| {
            r.multicast_active = true;
            r.refresh_state();
        });
        debug!(transport = %ty, group = %group, "multicast server started");
        Ok(())
    }

    /// Stop every selected adapter in `mask`. Unselected bits are ignored.
    pub fn unselect(&self, mask: ConnectivityMask) {
        let _lifecycle = self.lifecycle.lock();
        self.stop_selected(mask);
    }

    fn stop_selected(&self, mask: ConnectivityMask) {
        let targets = mask.intersection(self.selected());
        for ty in targets.iter() {
            if let Some(adapter) = self.adapter(ty) {
                if let Err(e) = adapter.stop_multicast_server() {
                    warn!(transport = %ty, error = %e, "multicast stop failed");
                }
                if let Err(e) = adapter.stop_unicast_server() {
                    warn!(transport = %ty, error = %e, "unicast stop failed");
                }
            }
            self.update(ty, |r| {
                r.unicast_port = None;
                r.multicast_active = false;
                r.state = AdapterState::Inactive;
            });
            self.selected.write().remove(ty);
        }
        if !targets.is_empty() {
            info!(stopped = %targets, selected = %self.selected(), "network unselected");
        }
    }

    // =========================================================================
    // SERVER ROLES
    // =========================================================================

    /// Enable the listening (multicast discovery) role.
    ///
    /// # Errors
    ///
    /// `ServerStartedAlready` if already on, `Failed` with nothing selected
    /// or if every multicast-capable adapter failed to start its server.
    pub fn start_listening_server(&self) -> CaResult<()> {
        let _lifecycle = self.lifecycle.lock();
        self.check_role_start(|roles| roles.listening)?;

        let mut attempted = 0;
        let mut errors = Vec::new();
        for ty in self.selected().iter() {
            let Some(adapter) = self.adapter(ty) else { continue };
            if !adapter.supports_multicast() {
                continue;
            }
            attempted += 1;
            if let Err(e) = self.start_multicast(ty, adapter.as_ref()) {
                warn!(transport = %ty, error = %e, "multicast server failed to start");
                self.update(ty, |r| r.state = AdapterState::Error);
                errors.push(format!("{ty}: {e}"));
            }
        }
        if attempted > 0 && errors.len() == attempted {
            return Err(CaError::failed(errors.join(", ")));
        }
        self.roles.write().listening = true;
        info!("listening server started");
        Ok(())
    }

    /// Enable the discovery (reply listener) role, restarting unicast
    /// servers that are down.
    ///
    /// # Errors
    ///
    /// `ServerStartedAlready` if already on, `Failed` with nothing selected
    /// or if no selected adapter has a running unicast server.
    pub fn start_discovery_server(&self) -> CaResult<()> {
        let _lifecycle = self.lifecycle.lock();
        self.check_role_start(|roles| roles.discovery)?;

        let mut running = 0;
        for ty in self.selected().iter() {
            if self.unicast_port(ty).is_some() {
                running += 1;
                continue;
            }
            let Some(adapter) = self.adapter(ty) else { continue };
            match adapter.start_unicast_server(
                &self.config.local_address,
                self.config.unicast_port,
                self.config.force_start,
            ) {
                Ok(port) => {
                    self.update(ty, |r| {
                        r.unicast_port = Some(port);
                        r.refresh_state();
                    });
                    running += 1;
                }
                Err(e) => warn!(transport = %ty, error = %e, "unicast restart failed"),
            }
        }
        if running == 0 {
            return Err(CaError::failed("no unicast server running"));
        }
        self.roles.write().discovery = true;
        info!("discovery server started");
        Ok(())
    }

    fn check_role_start(&self, already: impl Fn(&ServerRoles) -> bool) -> CaResult<()> {
        if already(&self.roles()) {
            return Err(CaError::ServerStartedAlready);
        }
        if self.selected().is_empty() {
            return Err(CaError::failed("no network selected"));
        }
        Ok(())
    }

    // =========================================================================
    // ROUTING
    // =========================================================================

    /// Adapter to send through for `ty`.
    ///
    /// # Errors
    ///
    /// `Failed` if `ty` is not selected or its adapter is in error.
    pub fn adapter_for_send(&self, ty: ConnectivityType) -> CaResult<Arc<dyn TransportAdapter>> {
        if !self.is_selected(ty) {
            return Err(CaError::failed(format!("transport {ty} is not selected")));
        }
        let table = self.table.read();
        let reg = table
            .get(&ty)
            .ok_or_else(|| CaError::failed(format!("no adapter for {ty}")))?;
        if reg.state == AdapterState::Error {
            return Err(CaError::failed(format!("adapter {ty} is in error state")));
        }
        Ok(Arc::clone(&reg.adapter))
    }

    /// Selected, healthy, multicast-capable adapters within `mask`.
    #[must_use]
    pub fn multicast_targets(
        &self,
        mask: ConnectivityMask,
    ) -> Vec<(ConnectivityType, Arc<dyn TransportAdapter>)> {
        let wanted = mask.intersection(self.selected());
        let candidates: Vec<(ConnectivityType, Arc<dyn TransportAdapter>)> = self
            .table
            .read()
            .iter()
            .filter(|(ty, reg)| wanted.contains(**ty) && reg.state != AdapterState::Error)
            .map(|(ty, reg)| (*ty, Arc::clone(&reg.adapter)))
            .collect();
        candidates
            .into_iter()
            .filter(|(_, adapter)| adapter.supports_multicast())
            .collect()
    }

    fn multicast_group(&self, ty: ConnectivityType) -> String {
        if ty.is_ip_family() {
            self.config.ip_multicast_group.clone()
        } else {
            self.config.link_layer_broadcast.clone()
        }
    }

    /// Destination address for a multicast send on `ty`.
    ///
    /// # Errors
    ///
    /// `InvalidParam` if the configured link-layer broadcast is not a MAC.
    pub fn multicast_destination(&self, ty: ConnectivityType) -> CaResult<EndpointAddress> {
        if ty.is_ip_family() {
            Ok(EndpointAddress::Ip {
                host: self.config.ip_multicast_group.clone(),
                port: self.config.multicast_port,
            })
        } else {
            let mac: MacAddress = self.config.link_layer_broadcast.parse()?;
            Ok(EndpointAddress::Mac(mac))
        }
    }

    // =========================================================================
    // NETWORK INFORMATION
    // =========================================================================

    /// Interface details of every selected adapter.
    ///
    /// # Errors
    ///
    /// `Failed` if any selected adapter cannot report its interface.
    pub fn network_information(&self) -> CaResult<Vec<LocalConnectivity>> {
        let mut out = Vec::new();
        for ty in self.selected().iter() {
            let adapter = self
                .adapter(ty)
                .ok_or_else(|| CaError::failed(format!("no adapter for {ty}")))?;
            let info = adapter
                .get_interface_info()
                .map_err(|e| CaError::failed(format!("{ty} interface query failed: {e}")))?;
            out.push(LocalConnectivity {
                connectivity_type: ty,
                interface_name: info.name,
                address: info.address,
                port: self.unicast_port(ty).unwrap_or(0),
                is_connected: adapter.is_connected(),
            });
        }
        Ok(out)
    }

    // =========================================================================
    // ADAPTER CALLBACKS
    // =========================================================================

    /// Record an out-of-band server fault.
    pub fn on_exception(&self, exception: AdapterException) {
        warn!(
            transport = %exception.connectivity_type,
            server = ?exception.server,
            reason = %exception.reason,
            "adapter server faulted"
        );
        self.update(exception.connectivity_type, |r| {
            match exception.server {
                ServerType::Unicast => r.unicast_port = None,
                ServerType::Multicast => r.multicast_active = false,
            }
            r.state = AdapterState::Error;
        });
    }

    /// Record a link state change.
    pub fn on_connection_state(&self, event: ConnectionStateEvent) {
        let up = event.status == NetworkStatus::Up;
        info!(
            transport = %event.connectivity_type,
            address = %event.address,
            up,
            "connection state changed"
        );
        self.update(event.connectivity_type, |r| r.link_up = up);
    }

    #[must_use]
    pub fn link_up(&self, ty: ConnectivityType) -> Option<bool> {
        self.table.read().get(&ty).map(|r| r.link_up)
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    /// Stop and terminate every adapter and clear the table.
    pub fn terminate(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.stop_selected(ConnectivityMask::ALL);
        for adapter in self.adapters() {
            adapter.terminate_server();
        }
        *self.roles.write() = ServerRoles::default();
        self.table.write().clear();
        debug!("adapter registry terminated");
    }
}
