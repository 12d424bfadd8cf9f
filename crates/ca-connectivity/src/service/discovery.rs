//! Multicast send paths: discovery, advertisement and group requests.

use tracing::{info, warn};

use super::core::ConnectivityContext;
use crate::codec;
use crate::domain::endpoint::{normalize_resource, ParsedUri};
use crate::domain::{
    CaError, CaResult, ConnectivityMask, HeaderOption, MessageType, Method, RequestInfo,
    ResponseCode, ResponseInfo, Token,
};

/// Resource path named by a discovery argument: either a bare path
/// (`/oic/res`) or a URI with a wildcard or empty host (`coap://*/oic/res`).
pub(crate) fn discovery_resource(resource_uri: &str) -> CaResult<String> {
    if resource_uri.starts_with('/') {
        return normalize_resource(resource_uri);
    }
    let parsed = ParsedUri::parse(resource_uri)?;
    if let Some(host) = parsed.authority {
        return Err(CaError::invalid(format!(
            "discovery cannot target the concrete host {host}"
        )));
    }
    Ok(parsed.resource)
}

impl ConnectivityContext {
    /// Send an encoded frame to the multicast destination of every selected,
    /// multicast-capable adapter in `mask`. Returns how many adapters took it.
    ///
    /// Succeeds if at least one adapter sent the whole frame.
    pub(crate) fn multicast(&self, mask: ConnectivityMask, data: &[u8]) -> CaResult<usize> {
        let targets = self.registry.multicast_targets(mask);
        if targets.is_empty() {
            return Err(CaError::failed(format!(
                "no selected multicast transport in {mask}"
            )));
        }

        let mut sent = 0;
        let mut errors = Vec::new();
        for (ty, adapter) in targets {
            let destination = self.registry.multicast_destination(ty)?;
            match adapter.send_data(&destination, data, true) {
                Ok(n) if n == data.len() => sent += 1,
                Ok(n) => {
                    warn!(transport = %ty, sent = n, len = data.len(), "short multicast send");
                    errors.push(format!("{ty}: short send"));
                }
                Err(e) => {
                    warn!(transport = %ty, error = %e, "multicast send failed");
                    errors.push(format!("{ty}: {e}"));
                }
            }
        }
        if sent == 0 {
            return Err(CaError::failed(errors.join(", ")));
        }
        Ok(sent)
    }

    pub(crate) fn discover(&self, resource_uri: &str, token: &Token) -> CaResult<()> {
        let resource = discovery_resource(resource_uri)?;
        let mut request =
            RequestInfo::new(Method::Get, *token).with_type(MessageType::NonConfirmable);
        request.info.message_id = self.next_message_id();
        let frame = codec::encode_request(&request, &resource)?;
        let transports = self.multicast(ConnectivityMask::ALL, &frame)?;
        info!(resource = %resource, token = %token, transports, "discovery request sent");
        Ok(())
    }

    pub(crate) fn advertise(
        &self,
        resource_uri: &str,
        token: &Token,
        options: &[HeaderOption],
    ) -> CaResult<()> {
        let resource = discovery_resource(resource_uri)?;
        let mut response = ResponseInfo::new(ResponseCode::CONTENT, *token)
            .with_type(MessageType::NonConfirmable)
            .with_options(options.iter().cloned());
        response.info.validate()?;
        response.info.message_id = self.next_message_id();
        let frame = codec::encode_response(&response, &resource)?;
        let transports = self.multicast(ConnectivityMask::ALL, &frame)?;
        info!(resource = %resource, token = %token, transports, "resource advertised");
        Ok(())
    }
}
