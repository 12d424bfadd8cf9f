//! # Connectivity Abstraction
//!
//! One request/response API over heterogeneous transports (IP, Ethernet,
//! Wi-Fi, Bluetooth EDR/LE). Applications address remote resources with
//! `coap://` URIs, correlate responses by token and never see which
//! transport carried an exchange.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture with:
//! - **Domain Layer:** masks, endpoints, tokens, messages, configuration
//! - **Codec:** the frame format adapters carry as opaque bytes
//! - **Ports Layer:** `ConnectivityApi` (driving), `TransportAdapter`,
//!   `TaskSpawner` and `ConfigProvider` (driven)
//! - **Service Layer:** `ConnectivityContext` with the adapter registry and
//!   dispatcher
//! - **Adapters Layer:** in-memory transport, thread spawner, config
//!   providers and the UDP transport (`network` feature)
//!
//! ## Delivery Models
//!
//! Chosen once per context through [`ConnectivityConfig::delivery_model`]:
//! - `Threaded`: a dispatch thread runs the handlers as packets arrive
//! - `Cooperative`: packets queue until `handle_request_response` drains them
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ca_connectivity::{
//!     ConnectivityApi, ConnectivityConfig, ConnectivityContext, ConnectivityMask,
//!     ConnectivityType, MemoryAdapter, MemoryNetwork, Method, RequestInfo,
//! };
//!
//! let net = MemoryNetwork::new();
//! let ctx = ConnectivityContext::builder()
//!     .config(ConnectivityConfig::for_testing())
//!     .adapter(Arc::new(MemoryAdapter::new(&net, ConnectivityType::Ip, "10.0.0.1").unwrap()))
//!     .initialize()
//!     .unwrap();
//! ctx.select_network(ConnectivityMask::from(ConnectivityType::Ip)).unwrap();
//!
//! let endpoint = ctx.create_remote_endpoint("coap://10.0.0.2:5683/light").unwrap();
//! let token = ctx.generate_token().unwrap();
//! let request = RequestInfo::new(Method::Get, *token);
//! ctx.send_request(&endpoint, &request).unwrap();
//!
//! ctx.destroy_token(token);
//! ctx.destroy_remote_endpoint(endpoint);
//! ctx.terminate();
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod adapters;
pub mod codec;
pub mod domain;
pub mod ports;
pub mod service;

// =============================================================================
// FEATURE-GATED MODULES
// =============================================================================

/// Recording handlers and memory-network helpers.
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// =============================================================================
// CORE RE-EXPORTS
// =============================================================================

// Domain
pub use domain::{
    status_of, CaError, CaResult, CaStatus, ConnectivityConfig, ConnectivityMask,
    ConnectivityType, DeliveryModel, EndpointAddress, EndpointContext, GroupEndpoint,
    HeaderOption, IssuedToken, LocalConnectivity, MacAddress, Message, MessageInfo, MessageType,
    Method, RemoteEndpoint, RequestInfo, ResponseCode, ResponseInfo, Token, TokenManager,
    COAPS_DEFAULT_PORT, COAP_DEFAULT_PORT, MAX_HEADER_OPTIONS, MAX_OPTION_VALUE_LENGTH,
    MAX_TOKEN_LENGTH,
};

// Codec
pub use codec::{DecodeError, Frame};

// Port traits
pub use ports::{
    AdapterException, ConfigProvider, ConnectionStateEvent, ConnectivityApi, InterfaceInfo,
    NetworkStatus, ReceivedPacket, RequestHandler, ResponseHandler, ServerType, TaskSpawner,
    TransportAdapter,
};

// Service
pub use service::{
    AdapterState, ConnectivityContext, ConnectivityContextBuilder, DispatchStats, ServerRoles,
    DISPATCH_TASK_NAME,
};

// =============================================================================
// ADAPTER RE-EXPORTS
// =============================================================================

pub use adapters::{MemoryAdapter, MemoryNetwork, SentPacket, StaticConfigProvider, ThreadSpawner};

// Network adapters (sockets, TOML)
#[cfg(feature = "network")]
pub use adapters::{ConfigError, TomlConfigProvider, UdpAdapter};
