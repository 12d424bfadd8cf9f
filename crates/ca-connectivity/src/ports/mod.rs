//! # Ports Layer
//!
//! - **Inbound:** the API applications drive ([`ConnectivityApi`]).
//! - **Outbound:** what the host supplies ([`TransportAdapter`], [`TaskSpawner`],
//!   [`ConfigProvider`]).

pub mod inbound;
pub mod outbound;

pub use inbound::{ConnectivityApi, RequestHandler, ResponseHandler};
pub use outbound::{
    AdapterException, ConfigProvider, ConnectionStateCallback, ConnectionStateEvent,
    ExceptionCallback, InterfaceInfo, NetworkStatus, PacketReceiveCallback, ReceivedPacket,
    ServerType, TaskSpawner, TransportAdapter,
};
