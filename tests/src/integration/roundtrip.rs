//! # Request/Response Roundtrips
//!
//! Full exchanges between two memory nodes: option and payload fidelity,
//! notifications, URI-built endpoints and endpoint retargeting.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ca_connectivity::test_utils::{memory_node, MemoryNode, RecordingHandlers};
    use ca_connectivity::{
        status_of, CaStatus, ConnectivityApi, ConnectivityConfig, ConnectivityMask,
        ConnectivityType, HeaderOption, MemoryNetwork, MessageType, Method, RemoteEndpoint,
        RequestInfo, ResponseCode, ResponseInfo, MAX_HEADER_OPTIONS, MAX_OPTION_VALUE_LENGTH,
    };

    struct Pair {
        client: MemoryNode,
        client_seen: RecordingHandlers,
        server: MemoryNode,
        server_seen: RecordingHandlers,
    }

    fn pair() -> Pair {
        let net = MemoryNetwork::new();
        let ip = ConnectivityMask::from(ConnectivityType::Ip);
        let client =
            memory_node(&net, ConnectivityType::Ip, "10.0.0.1", ConnectivityConfig::for_testing())
                .unwrap();
        let server =
            memory_node(&net, ConnectivityType::Ip, "10.0.0.2", ConnectivityConfig::for_testing())
                .unwrap();
        client.context.select_network(ip).unwrap();
        server.context.select_network(ip).unwrap();
        let client_seen = RecordingHandlers::new();
        let server_seen = RecordingHandlers::new();
        client_seen.install(&client.context).unwrap();
        server_seen.install(&server.context).unwrap();
        Pair {
            client,
            client_seen,
            server,
            server_seen,
        }
    }

    fn server_uri(pair: &Pair, path: &str) -> String {
        let port = pair.server.adapter.unicast_port().unwrap();
        format!("coap://10.0.0.2:{port}{path}")
    }

    // =========================================================================
    // FIDELITY
    // =========================================================================

    #[test]
    fn test_full_option_set_survives_roundtrip() {
        let p = pair();
        let endpoint = p
            .client
            .context
            .create_remote_endpoint(&server_uri(&p, "/a/large"))
            .unwrap();
        assert!(endpoint.resolved_from_uri);

        let mut options: Vec<HeaderOption> = (0..MAX_HEADER_OPTIONS as u16 - 1)
            .map(|i| HeaderOption::new(2048 + i, format!("v{i}").into_bytes()))
            .collect();
        options.push(HeaderOption::new(9000, vec![0x5Au8; MAX_OPTION_VALUE_LENGTH]));

        let token = p.client.context.generate_token().unwrap();
        let request = RequestInfo::new(Method::Put, *token)
            .with_type(MessageType::Confirmable)
            .with_options(options.clone())
            .with_payload(b"on".to_vec());
        p.client.context.send_request(&endpoint, &request).unwrap();

        assert_eq!(p.server.context.handle_request_response().unwrap(), 1);
        let (from, got) = p.server_seen.requests().remove(0);
        assert_eq!(got.method, Method::Put);
        assert_eq!(got.info.message_type, MessageType::Confirmable);
        assert_eq!(got.info.options, options);
        assert_eq!(got.info.payload, b"on");
        assert_eq!(from.resource_uri, "/a/large");

        let reply = ResponseInfo::new(ResponseCode::CHANGED, got.info.token)
            .with_type(MessageType::Acknowledgement)
            .with_message_id(got.info.message_id)
            .with_options(options.clone());
        p.server.context.send_response(&from, &reply).unwrap();

        assert_eq!(p.client.context.handle_request_response().unwrap(), 1);
        let (_, response) = p.client_seen.responses().remove(0);
        assert_eq!(response.result, ResponseCode::CHANGED);
        assert_eq!(response.info.message_id, got.info.message_id);
        assert_eq!(response.info.options, options);
        p.client.context.destroy_token(token);
    }

    #[test]
    fn test_oversized_option_is_rejected_before_sending() {
        let p = pair();
        let endpoint = p
            .client
            .context
            .create_remote_endpoint(&server_uri(&p, "/x"))
            .unwrap();
        let request = RequestInfo::new(Method::Get, *p.client.context.generate_token().unwrap())
            .with_option(HeaderOption::new(1, vec![0u8; MAX_OPTION_VALUE_LENGTH + 1]));

        let result = p.client.context.send_request(&endpoint, &request);
        assert_eq!(status_of(&result), CaStatus::InvalidParam);
        assert!(p.client.adapter.sent_packets().is_empty());
    }

    // =========================================================================
    // NOTIFICATIONS
    // =========================================================================

    #[test]
    fn test_notifications_arrive_as_responses() {
        let p = pair();
        let endpoint = p
            .client
            .context
            .create_remote_endpoint(&server_uri(&p, "/temp"))
            .unwrap();
        let token = p.client.context.generate_token().unwrap();
        let observe = HeaderOption::new(6, Vec::<u8>::new());
        let request = RequestInfo::new(Method::Get, *token).with_option(observe);
        p.client.context.send_request(&endpoint, &request).unwrap();
        p.server.context.handle_request_response().unwrap();
        let (observer, _) = p.server_seen.requests().remove(0);

        for reading in 20..23u8 {
            let notification = ResponseInfo::new(ResponseCode::CONTENT, *token)
                .with_type(MessageType::NonConfirmable)
                .with_payload(vec![reading]);
            p.server
                .context
                .send_notification(&observer, &notification)
                .unwrap();
        }

        assert_eq!(p.client.context.handle_request_response().unwrap(), 3);
        let responses = p.client_seen.responses();
        let readings: Vec<u8> = responses.iter().map(|(_, r)| r.info.payload[0]).collect();
        assert_eq!(readings, vec![20, 21, 22]);
        let ids: Vec<u16> = responses.iter().map(|(_, r)| r.info.message_id).collect();
        assert!(ids.iter().all(|id| *id != 0));
        assert_ne!(ids[0], ids[1]);
    }

    // =========================================================================
    // ENDPOINTS
    // =========================================================================

    #[test]
    fn test_endpoint_context_stays_local() {
        let p = pair();
        let endpoint = p
            .client
            .context
            .create_remote_endpoint(&server_uri(&p, "/ctx"))
            .unwrap()
            .with_context(Arc::new(String::from("session-7")));
        assert_eq!(
            endpoint.context_as::<String>().map(String::as_str),
            Some("session-7")
        );
        assert!(endpoint.context_as::<u32>().is_none());

        let token = p.client.context.generate_token().unwrap();
        p.client
            .context
            .send_request(&endpoint, &RequestInfo::new(Method::Get, *token))
            .unwrap();
        p.server.context.handle_request_response().unwrap();
        let (from, _) = p.server_seen.requests().remove(0);
        assert!(from.context.is_none());
        assert!(!from.resolved_from_uri);
    }

    #[test]
    fn test_uri_without_port_uses_default() {
        let p = pair();
        let endpoint = p
            .client
            .context
            .create_remote_endpoint("coap://10.0.0.2/light")
            .unwrap();
        assert_eq!(endpoint.address.port(), ca_connectivity::COAP_DEFAULT_PORT);

        // Nothing is bound on 5683; the datagram is lost but the send succeeds.
        let token = p.client.context.generate_token().unwrap();
        p.client
            .context
            .send_request(&endpoint, &RequestInfo::new(Method::Get, *token))
            .unwrap();
        assert_eq!(p.server.context.handle_request_response().unwrap(), 0);
    }

    #[test]
    fn test_retarget_to_unselected_transport_fails() {
        let p = pair();
        let endpoint = p
            .client
            .context
            .create_remote_endpoint(&server_uri(&p, "/light"))
            .unwrap();
        let wifi = endpoint.clone().with_connectivity_type(ConnectivityType::WiFi).unwrap();
        let token = p.client.context.generate_token().unwrap();
        let request = RequestInfo::new(Method::Get, *token);

        let result = p.client.context.send_request(&wifi, &request);
        assert_eq!(status_of(&result), CaStatus::Failed);
        assert!(endpoint
            .with_connectivity_type(ConnectivityType::BtLe)
            .is_err());
        assert_eq!(p.server.context.handle_request_response().unwrap(), 0);
    }

    #[test]
    fn test_malformed_uris_produce_no_endpoint() {
        let p = pair();
        for uri in ["", "http://10.0.0.2/x", "coap://", "coap://10.0.0.2:notaport/x"] {
            let result: Result<RemoteEndpoint, _> = p.client.context.create_remote_endpoint(uri);
            assert_eq!(status_of(&result), CaStatus::InvalidParam, "uri {uri:?}");
        }
    }
}
