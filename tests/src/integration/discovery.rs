//! # Discovery Scenarios
//!
//! Multicast find-resource and advertisement across nodes, including a
//! client that spans two transports.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ca_connectivity::test_utils::{memory_node, MemoryNode, RecordingHandlers};
    use ca_connectivity::{
        ConnectivityApi, ConnectivityConfig, ConnectivityContext, ConnectivityMask,
        ConnectivityType, HeaderOption, MemoryAdapter, MemoryNetwork, Method, ResponseCode,
        ResponseInfo,
    };

    // =========================================================================
    // FIXTURES
    // =========================================================================

    fn listening_peer(
        net: &Arc<MemoryNetwork>,
        ty: ConnectivityType,
        host: &str,
    ) -> (MemoryNode, RecordingHandlers) {
        let peer = memory_node(net, ty, host, ConnectivityConfig::for_testing()).unwrap();
        peer.context.select_network(ConnectivityMask::from(ty)).unwrap();
        peer.context.start_listening_server().unwrap();
        let seen = RecordingHandlers::new();
        seen.install(&peer.context).unwrap();
        (peer, seen)
    }

    fn ip_node(net: &Arc<MemoryNetwork>, host: &str) -> MemoryNode {
        memory_node(net, ConnectivityType::Ip, host, ConnectivityConfig::for_testing()).unwrap()
    }

    /// Answer every pending discovery request with 2.05 and the peer's host.
    fn answer_discovery(peer: &MemoryNode, seen: &RecordingHandlers) -> usize {
        peer.context.handle_request_response().unwrap();
        let requests = seen.requests();
        for (from, request) in &requests {
            assert_eq!(request.method, Method::Get);
            let reply = ResponseInfo::new(ResponseCode::CONTENT, request.info.token)
                .with_payload(peer.adapter.host().as_bytes().to_vec());
            peer.context.send_response(from, &reply).unwrap();
        }
        requests.len()
    }

    // =========================================================================
    // FIND RESOURCE
    // =========================================================================

    #[test]
    fn test_discovery_spans_transports() {
        let net = MemoryNetwork::new();
        let ip = Arc::new(MemoryAdapter::new(&net, ConnectivityType::Ip, "10.0.0.1").unwrap());
        let ble =
            Arc::new(MemoryAdapter::new(&net, ConnectivityType::BtLe, "02:00:00:00:00:01").unwrap());
        let client = ConnectivityContext::builder()
            .config(ConnectivityConfig::for_testing())
            .adapter(ip)
            .adapter(ble)
            .initialize()
            .unwrap();
        client
            .select_network(ConnectivityType::Ip | ConnectivityType::BtLe)
            .unwrap();
        client.start_discovery_server().unwrap();
        let client_seen = RecordingHandlers::new();
        client_seen.install(&client).unwrap();

        let (ip_peer, ip_seen) = listening_peer(&net, ConnectivityType::Ip, "10.0.0.2");
        let (ble_peer, ble_seen) =
            listening_peer(&net, ConnectivityType::BtLe, "02:00:00:00:00:02");

        let token = client.generate_token().unwrap();
        client.find_resource("coap://*/oic/res", &token).unwrap();

        assert_eq!(answer_discovery(&ip_peer, &ip_seen), 1);
        assert_eq!(answer_discovery(&ble_peer, &ble_seen), 1);

        assert_eq!(client.handle_request_response().unwrap(), 2);
        let responses = client_seen.responses();
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|(_, r)| r.info.token == *token));
        let mut transports: Vec<ConnectivityType> =
            responses.iter().map(|(ep, _)| ep.connectivity_type).collect();
        transports.sort();
        assert_eq!(transports, vec![ConnectivityType::Ip, ConnectivityType::BtLe]);
    }

    #[test]
    fn test_peers_without_listening_role_stay_silent() {
        let net = MemoryNetwork::new();
        let client = ip_node(&net, "10.0.0.1");
        client
            .context
            .select_network(ConnectivityMask::from(ConnectivityType::Ip))
            .unwrap();
        let (listener, listener_seen) = listening_peer(&net, ConnectivityType::Ip, "10.0.0.2");
        let quiet = ip_node(&net, "10.0.0.3");
        quiet
            .context
            .select_network(ConnectivityMask::from(ConnectivityType::Ip))
            .unwrap();
        let quiet_seen = RecordingHandlers::new();
        quiet_seen.install(&quiet.context).unwrap();

        let token = client.context.generate_token().unwrap();
        client.context.find_resource("/oic/res", &token).unwrap();

        assert_eq!(listener.context.handle_request_response().unwrap(), 1);
        assert_eq!(listener_seen.requests()[0].0.resource_uri, "/oic/res");
        assert_eq!(quiet.context.handle_request_response().unwrap(), 0);
        assert_eq!(quiet_seen.request_count(), 0);
    }

    #[test]
    fn test_discovery_tokens_accept_late_replies() {
        let net = MemoryNetwork::new();
        let client = ip_node(&net, "10.0.0.1");
        client
            .context
            .select_network(ConnectivityMask::from(ConnectivityType::Ip))
            .unwrap();
        let client_seen = RecordingHandlers::new();
        client_seen.install(&client.context).unwrap();

        let peers: Vec<(MemoryNode, RecordingHandlers)> = (2..=4)
            .map(|i| listening_peer(&net, ConnectivityType::Ip, &format!("10.0.0.{i}")))
            .collect();

        let token = client.context.generate_token().unwrap();
        client.context.find_resource("/oic/res", &token).unwrap();

        // Replies trickle in across several pumps; all carry the same token.
        let mut delivered = 0;
        for (peer, seen) in &peers {
            answer_discovery(peer, seen);
            delivered += client.context.handle_request_response().unwrap();
        }
        assert_eq!(delivered, 3);
        let mut hosts: Vec<String> = client_seen
            .responses()
            .iter()
            .map(|(_, r)| String::from_utf8(r.info.payload.clone()).unwrap())
            .collect();
        hosts.sort();
        assert_eq!(hosts, vec!["10.0.0.2", "10.0.0.3", "10.0.0.4"]);
    }

    // =========================================================================
    // ADVERTISEMENT
    // =========================================================================

    #[test]
    fn test_advertise_on_discovery_token() {
        let net = MemoryNetwork::new();
        let client = ip_node(&net, "10.0.0.1");
        client
            .context
            .select_network(ConnectivityMask::from(ConnectivityType::Ip))
            .unwrap();
        client.context.start_listening_server().unwrap();
        let client_seen = RecordingHandlers::new();
        client_seen.install(&client.context).unwrap();

        let (server, server_seen) = listening_peer(&net, ConnectivityType::Ip, "10.0.0.2");

        let token = client.context.generate_token().unwrap();
        client.context.find_resource("/oic/res", &token).unwrap();
        server.context.handle_request_response().unwrap();
        let discovered_token = server_seen.requests()[0].1.info.token;

        let options = [
            HeaderOption::new(2049, b"rt=oic.r.light".to_vec()),
            HeaderOption::new(2050, b"if=oic.if.baseline".to_vec()),
        ];
        server
            .context
            .advertise_resource("/a/light", &discovered_token, &options)
            .unwrap();

        assert_eq!(client.context.handle_request_response().unwrap(), 1);
        let (from, advert) = client_seen.responses().remove(0);
        assert_eq!(advert.info.token, *token);
        assert_eq!(advert.result, ResponseCode::CONTENT);
        assert_eq!(advert.info.options, options.to_vec());
        assert_eq!(from.resource_uri, "/a/light");
    }

    #[test]
    fn test_advertise_with_nothing_selected_fails() {
        let net = MemoryNetwork::new();
        let server = ip_node(&net, "10.0.0.1");
        let token = server.context.generate_token().unwrap();
        assert!(server.context.advertise_resource("/a/light", &token, &[]).is_err());
    }
}
