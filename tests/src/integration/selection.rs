//! # Network Selection Scenarios
//!
//! Multi-adapter contexts: what selection starts, how partial failures and
//! faults stay confined to one transport, and link state reporting.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ca_connectivity::test_utils::RecordingHandlers;
    use ca_connectivity::{
        status_of, AdapterState, CaError, CaStatus, ConnectivityApi, ConnectivityConfig,
        ConnectivityContext, ConnectivityMask, ConnectivityType, MemoryAdapter, MemoryNetwork,
        Method, RemoteEndpoint, RequestInfo, ServerType, TransportAdapter,
    };

    const BUSY_PORT: u16 = 40001;

    struct MultiNode {
        context: ConnectivityContext,
        ip: Arc<MemoryAdapter>,
        ethernet: Arc<MemoryAdapter>,
        ble: Arc<MemoryAdapter>,
    }

    fn multi_node(net: &Arc<MemoryNetwork>, config: ConnectivityConfig) -> MultiNode {
        let ip = Arc::new(MemoryAdapter::new(net, ConnectivityType::Ip, "10.0.0.1").unwrap());
        let ethernet =
            Arc::new(MemoryAdapter::new(net, ConnectivityType::Ethernet, "10.0.0.1").unwrap());
        let ble =
            Arc::new(MemoryAdapter::new(net, ConnectivityType::BtLe, "02:00:00:00:00:01").unwrap());
        let context = ConnectivityContext::builder()
            .config(config)
            .adapter(ip.clone())
            .adapter(ethernet.clone())
            .adapter(ble.clone())
            .initialize()
            .unwrap();
        MultiNode {
            context,
            ip,
            ethernet,
            ble,
        }
    }

    fn peer_endpoint(adapter: &MemoryAdapter) -> RemoteEndpoint {
        RemoteEndpoint::new(adapter.connectivity_type(), adapter.local_endpoint_address())
            .unwrap()
            .with_resource_uri("/probe")
    }

    fn probe(context: &ConnectivityContext, to: &RemoteEndpoint) -> CaStatus {
        let token = context.generate_token().unwrap();
        let result = context.send_request(to, &RequestInfo::new(Method::Get, *token));
        context.destroy_token(token);
        status_of(&result)
    }

    // =========================================================================
    // SELECTION
    // =========================================================================

    #[test]
    fn test_network_information_lists_selected_adapters() {
        let net = MemoryNetwork::new();
        let node = multi_node(&net, ConnectivityConfig::for_testing());
        assert!(node.context.get_network_information().unwrap().is_empty());

        node.context
            .select_network(ConnectivityType::Ip | ConnectivityType::BtLe)
            .unwrap();
        let mut info = node.context.get_network_information().unwrap();
        info.sort_by_key(|i| i.connectivity_type);
        let types: Vec<ConnectivityType> = info.iter().map(|i| i.connectivity_type).collect();
        assert_eq!(types, vec![ConnectivityType::Ip, ConnectivityType::BtLe]);
        assert_eq!(info[0].address, "10.0.0.1");
        assert_eq!(Some(info[0].port), node.ip.unicast_port());
        assert_eq!(info[1].port, 0);
        assert!(info.iter().all(|i| i.is_connected));
        assert!(node.ethernet.unicast_port().is_none());

        node.context
            .unselect_network(ConnectivityMask::from(ConnectivityType::BtLe))
            .unwrap();
        let info = node.context.get_network_information().unwrap();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].connectivity_type, ConnectivityType::Ip);
    }

    #[test]
    fn test_busy_forced_port_fails_only_that_transport() {
        let net = MemoryNetwork::new();
        let squatter =
            MemoryAdapter::new(&net, ConnectivityType::Ethernet, "10.0.0.1").unwrap();
        squatter
            .start_unicast_server("10.0.0.1", BUSY_PORT, true)
            .unwrap();

        let config = ConnectivityConfig {
            unicast_port: BUSY_PORT,
            force_start: true,
            ..ConnectivityConfig::for_testing()
        };
        let node = multi_node(&net, config);
        let err = node
            .context
            .select_network(ConnectivityType::Ip | ConnectivityType::Ethernet)
            .unwrap_err();

        match err {
            CaError::SelectionFailed { started, failed } => {
                assert_eq!(started, ConnectivityMask::from(ConnectivityType::Ip));
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].0, ConnectivityType::Ethernet);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(node.ip.unicast_port(), Some(BUSY_PORT));
        let registry = node.context.registry();
        assert_eq!(registry.adapter_state(ConnectivityType::Ip), Some(AdapterState::Listening));
        assert_eq!(
            registry.adapter_state(ConnectivityType::Ethernet),
            Some(AdapterState::Error)
        );
        assert_eq!(registry.selected(), ConnectivityMask::from(ConnectivityType::Ip));
    }

    #[test]
    fn test_unselecting_unselected_transports_is_ok() {
        let net = MemoryNetwork::new();
        let node = multi_node(&net, ConnectivityConfig::for_testing());
        node.context
            .select_network(ConnectivityMask::from(ConnectivityType::Ip))
            .unwrap();
        node.context
            .unselect_network(ConnectivityType::Ethernet | ConnectivityType::WiFi)
            .unwrap();
        assert!(node.ip.unicast_port().is_some());
        assert_eq!(
            node.context.registry().selected(),
            ConnectivityMask::from(ConnectivityType::Ip)
        );
    }

    // =========================================================================
    // FAULTS AND LINK STATE
    // =========================================================================

    #[test]
    fn test_exception_isolates_one_transport() {
        let net = MemoryNetwork::new();
        let node = multi_node(&net, ConnectivityConfig::for_testing());
        node.context
            .select_network(ConnectivityType::Ip | ConnectivityType::BtLe)
            .unwrap();

        let ip_peer = MemoryAdapter::new(&net, ConnectivityType::Ip, "10.0.0.2").unwrap();
        ip_peer.start_unicast_server("10.0.0.2", 0, false).unwrap();
        let ble_peer =
            MemoryAdapter::new(&net, ConnectivityType::BtLe, "02:00:00:00:00:02").unwrap();
        ble_peer.start_unicast_server("", 0, false).unwrap();

        node.ip.raise_exception(ServerType::Unicast, "socket closed");

        let registry = node.context.registry();
        assert_eq!(registry.adapter_state(ConnectivityType::Ip), Some(AdapterState::Error));
        assert_eq!(
            registry.adapter_state(ConnectivityType::BtLe),
            Some(AdapterState::Listening)
        );
        assert_eq!(probe(&node.context, &peer_endpoint(&ip_peer)), CaStatus::Failed);
        assert_eq!(probe(&node.context, &peer_endpoint(&ble_peer)), CaStatus::Ok);
        assert_eq!(node.ble.sent_packets().len(), 1);

        // Reselecting restarts the faulted transport.
        node.context
            .unselect_network(ConnectivityMask::from(ConnectivityType::Ip))
            .unwrap();
        node.context
            .select_network(ConnectivityMask::from(ConnectivityType::Ip))
            .unwrap();
        assert_eq!(probe(&node.context, &peer_endpoint(&ip_peer)), CaStatus::Ok);
    }

    #[test]
    fn test_link_down_fails_sends_until_restored() {
        let net = MemoryNetwork::new();
        let node = multi_node(&net, ConnectivityConfig::for_testing());
        node.context
            .select_network(ConnectivityMask::from(ConnectivityType::Ip))
            .unwrap();
        let seen = RecordingHandlers::new();
        seen.install(&node.context).unwrap();

        let peer = MemoryAdapter::new(&net, ConnectivityType::Ip, "10.0.0.2").unwrap();
        peer.start_unicast_server("10.0.0.2", 0, false).unwrap();
        let target = peer_endpoint(&peer);

        node.ip.set_connected(false);
        let registry = node.context.registry();
        assert_eq!(registry.link_up(ConnectivityType::Ip), Some(false));
        assert_eq!(probe(&node.context, &target), CaStatus::Failed);
        let info = node.context.get_network_information().unwrap();
        assert!(!info[0].is_connected);

        node.ip.set_connected(true);
        assert_eq!(registry.link_up(ConnectivityType::Ip), Some(true));
        assert_eq!(probe(&node.context, &target), CaStatus::Ok);
        // Link changes never surface as application messages.
        assert_eq!(node.context.handle_request_response().unwrap(), 0);
        assert_eq!(seen.request_count() + seen.response_count(), 0);
    }
}
