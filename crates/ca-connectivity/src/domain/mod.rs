//! # Domain Layer
//!
//! Pure value types: connectivity masks, endpoints, tokens, messages,
//! configuration and errors. Nothing here touches the network.

pub mod config;
pub mod connectivity;
pub mod endpoint;
pub mod errors;
pub mod message;
pub mod token;

pub use config::{ConnectivityConfig, DeliveryModel};
pub use connectivity::{ConnectivityMask, ConnectivityType, LocalConnectivity};
pub use endpoint::{
    EndpointAddress, EndpointContext, GroupEndpoint, MacAddress, RemoteEndpoint,
    COAPS_DEFAULT_PORT, COAP_DEFAULT_PORT, ROOT_RESOURCE,
};
pub use errors::{status_of, CaError, CaResult, CaStatus};
pub use message::{
    HeaderOption, Message, MessageInfo, MessageType, Method, RequestInfo, ResponseCode,
    ResponseInfo, MAX_HEADER_OPTIONS, MAX_OPTION_VALUE_LENGTH,
};
pub use token::{IssuedToken, Token, TokenManager, MAX_TOKEN_LENGTH};
