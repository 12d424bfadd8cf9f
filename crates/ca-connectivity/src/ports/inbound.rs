//! # Driving Ports (Inbound API)
//!
//! The API this crate **offers** to applications.

use std::sync::Arc;

use crate::domain::{
    CaResult, ConnectivityMask, GroupEndpoint, HeaderOption, IssuedToken, LocalConnectivity,
    RemoteEndpoint, RequestInfo, ResponseInfo, Token,
};

/// Called for every inbound request. The endpoint is borrowed for the call.
pub type RequestHandler = Arc<dyn Fn(&RemoteEndpoint, &RequestInfo) + Send + Sync>;

/// Called for every inbound response. The endpoint is borrowed for the call.
pub type ResponseHandler = Arc<dyn Fn(&RemoteEndpoint, &ResponseInfo) + Send + Sync>;

/// Primary connectivity API.
///
/// Every operation fails with `Failed` once the context has been terminated.
pub trait ConnectivityApi {
    /// Parse a `coap`/`coaps` URI into an owned endpoint.
    fn create_remote_endpoint(&self, uri: &str) -> CaResult<RemoteEndpoint>;

    /// Release an endpoint. Ownership makes this a plain drop.
    fn destroy_remote_endpoint(&self, endpoint: RemoteEndpoint);

    /// Issue a token unique among those outstanding.
    fn generate_token(&self) -> CaResult<IssuedToken>;

    /// Release a token. Dropping the handle has the same effect.
    fn destroy_token(&self, token: IssuedToken);

    /// Install the request/response sink, replacing any earlier one.
    fn register_handler(&self, request: RequestHandler, response: ResponseHandler) -> CaResult<()>;

    /// Server role: accept multicast discovery on selected adapters.
    fn start_listening_server(&self) -> CaResult<()>;

    /// Client role: listen for replies on selected adapters.
    fn start_discovery_server(&self) -> CaResult<()>;

    /// Activate adapters. Partial failure is reported as `SelectionFailed`.
    fn select_network(&self, mask: ConnectivityMask) -> CaResult<()>;

    /// Deactivate adapters. Unselected bits are ignored.
    fn unselect_network(&self, mask: ConnectivityMask) -> CaResult<()>;

    /// Local interface details of every selected adapter.
    fn get_network_information(&self) -> CaResult<Vec<LocalConnectivity>>;

    /// Multicast a discovery GET; replies arrive as responses carrying `token`.
    fn find_resource(&self, resource_uri: &str, token: &Token) -> CaResult<()>;

    fn send_request(&self, endpoint: &RemoteEndpoint, request: &RequestInfo) -> CaResult<()>;

    /// Send one request to every selected transport in the group.
    fn send_request_to_all(&self, group: &GroupEndpoint, request: &RequestInfo) -> CaResult<()>;

    fn send_response(&self, endpoint: &RemoteEndpoint, response: &ResponseInfo) -> CaResult<()>;

    /// Send an unsolicited response, e.g. to an observer.
    fn send_notification(&self, endpoint: &RemoteEndpoint, response: &ResponseInfo)
        -> CaResult<()>;

    /// Announce a resource by multicasting a 2.05 response under `token`.
    fn advertise_resource(
        &self,
        resource_uri: &str,
        token: &Token,
        options: &[HeaderOption],
    ) -> CaResult<()>;

    /// Deliver queued events (cooperative model). Returns how many were delivered.
    fn handle_request_response(&self) -> CaResult<usize>;

    /// Stop adapters and delivery. Idempotent.
    fn terminate(&self);
}
