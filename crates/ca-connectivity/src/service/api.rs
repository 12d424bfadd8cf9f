use tracing::{debug, info};

use crate::codec;
use crate::domain::{
    CaError, CaResult, ConnectivityMask, GroupEndpoint, HeaderOption, IssuedToken,
    LocalConnectivity, RemoteEndpoint, RequestInfo, ResponseInfo, Token,
};
use crate::ports::{ConnectivityApi, RequestHandler, ResponseHandler};
use crate::service::ConnectivityContext;

impl ConnectivityApi for ConnectivityContext {
    fn create_remote_endpoint(&self, uri: &str) -> CaResult<RemoteEndpoint> {
        self.ensure_running()?;
        RemoteEndpoint::from_uri(uri)
    }

    fn destroy_remote_endpoint(&self, endpoint: RemoteEndpoint) {
        drop(endpoint);
    }

    fn generate_token(&self) -> CaResult<IssuedToken> {
        self.ensure_running()?;
        self.tokens.generate()
    }

    fn destroy_token(&self, token: IssuedToken) {
        self.tokens.destroy(token);
    }

    fn register_handler(&self, request: RequestHandler, response: ResponseHandler) -> CaResult<()> {
        self.ensure_running()?;
        self.dispatcher.set_handlers(request, response);
        Ok(())
    }

    fn start_listening_server(&self) -> CaResult<()> {
        self.ensure_running()?;
        self.registry.start_listening_server()
    }

    fn start_discovery_server(&self) -> CaResult<()> {
        self.ensure_running()?;
        self.registry.start_discovery_server()
    }

    fn select_network(&self, mask: ConnectivityMask) -> CaResult<()> {
        self.ensure_running()?;
        self.registry.select(mask)
    }

    fn unselect_network(&self, mask: ConnectivityMask) -> CaResult<()> {
        self.ensure_running()?;
        self.registry.unselect(mask);
        Ok(())
    }

    fn get_network_information(&self) -> CaResult<Vec<LocalConnectivity>> {
        self.ensure_running()?;
        self.registry.network_information()
    }

    fn find_resource(&self, resource_uri: &str, token: &Token) -> CaResult<()> {
        self.ensure_running()?;
        self.discover(resource_uri, token)
    }

    fn send_request(&self, endpoint: &RemoteEndpoint, request: &RequestInfo) -> CaResult<()> {
        self.ensure_running()?;
        request.info.validate()?;
        let mut request = request.clone();
        if request.info.message_id == 0 {
            request.info.message_id = self.next_message_id();
        }
        let frame = codec::encode_request(&request, &endpoint.resource_uri)?;
        self.send_to_endpoint(endpoint, &frame)?;
        debug!(
            destination = %endpoint,
            method = %request.method,
            token = %request.info.token,
            message_id = request.info.message_id,
            "request sent"
        );
        Ok(())
    }

    fn send_request_to_all(&self, group: &GroupEndpoint, request: &RequestInfo) -> CaResult<()> {
        self.ensure_running()?;
        if group.connectivity.is_empty() {
            return Err(CaError::invalid("group endpoint has an empty connectivity mask"));
        }
        request.info.validate()?;
        let mut request = request.clone();
        if request.info.message_id == 0 {
            request.info.message_id = self.next_message_id();
        }
        let frame = codec::encode_request(&request, &group.resource_uri)?;
        let transports = self.multicast(group.connectivity, &frame)?;
        info!(
            group = %group.connectivity,
            resource = %group.resource_uri,
            method = %request.method,
            transports,
            "group request sent"
        );
        Ok(())
    }

    fn send_response(&self, endpoint: &RemoteEndpoint, response: &ResponseInfo) -> CaResult<()> {
        self.ensure_running()?;
        response.info.validate()?;
        let mut response = response.clone();
        if response.info.message_id == 0 {
            response.info.message_id = self.next_message_id();
        }
        let frame = codec::encode_response(&response, &endpoint.resource_uri)?;
        self.send_to_endpoint(endpoint, &frame)?;
        debug!(
            destination = %endpoint,
            code = %response.result,
            token = %response.info.token,
            "response sent"
        );
        Ok(())
    }

    fn send_notification(
        &self,
        endpoint: &RemoteEndpoint,
        response: &ResponseInfo,
    ) -> CaResult<()> {
        self.send_response(endpoint, response)
    }

    fn advertise_resource(
        &self,
        resource_uri: &str,
        token: &Token,
        options: &[HeaderOption],
    ) -> CaResult<()> {
        self.ensure_running()?;
        self.advertise(resource_uri, token, options)
    }

    fn handle_request_response(&self) -> CaResult<usize> {
        self.ensure_running()?;
        Ok(self.dispatcher.pump())
    }

    fn terminate(&self) {
        if !self.shutdown() {
            debug!("terminate on an already terminated context");
        }
    }
}
