//! Runtime configuration for a connectivity context.

use super::errors::{CaError, CaResult};
use super::token::MAX_TOKEN_LENGTH;

/// How inbound events reach the application callbacks.
///
/// Fixed when the context is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryModel {
    /// A dedicated dispatch thread drains the event queue.
    #[default]
    Threaded,
    /// Events wait in the queue until `handle_request_response` is called.
    Cooperative,
}

/// Configuration for a connectivity context and the adapters it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityConfig {
    pub delivery_model: DeliveryModel,
    /// Bounded inbound queue; events past this are dropped.
    pub event_queue_capacity: usize,
    /// Bytes per generated token (1..=8).
    pub token_length: usize,
    /// Local address unicast and multicast servers bind to.
    pub local_address: String,
    /// Requested unicast port; 0 lets the adapter choose.
    pub unicast_port: u16,
    /// Fail instead of picking another port when `unicast_port` is busy.
    pub force_start: bool,
    /// IPv4 multicast group for discovery.
    pub ip_multicast_group: String,
    pub multicast_port: u16,
    /// Destination used for link-layer multicast.
    pub link_layer_broadcast: String,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            delivery_model: DeliveryModel::Threaded,
            event_queue_capacity: 1024,
            token_length: MAX_TOKEN_LENGTH,
            local_address: "0.0.0.0".to_string(),
            unicast_port: 0,
            force_start: false,
            ip_multicast_group: "224.0.1.187".to_string(),
            multicast_port: 5683,
            link_layer_broadcast: "FF:FF:FF:FF:FF:FF".to_string(),
        }
    }
}

impl ConnectivityConfig {
    /// Small queue and cooperative delivery, so tests control when
    /// callbacks run.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            delivery_model: DeliveryModel::Cooperative,
            event_queue_capacity: 16,
            local_address: "127.0.0.1".to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delivery_model(mut self, model: DeliveryModel) -> Self {
        self.delivery_model = model;
        self
    }

    /// # Errors
    ///
    /// `InvalidParam` for a zero queue or an out-of-range token length.
    pub fn validate(&self) -> CaResult<()> {
        if self.event_queue_capacity == 0 {
            return Err(CaError::invalid("event queue capacity must be positive"));
        }
        if self.token_length == 0 || self.token_length > MAX_TOKEN_LENGTH {
            return Err(CaError::invalid(format!(
                "token length must be 1..={MAX_TOKEN_LENGTH}"
            )));
        }
        if self.local_address.is_empty() {
            return Err(CaError::invalid("local address is empty"));
        }
        Ok(())
    }
}
