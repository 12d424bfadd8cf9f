//! # Delivery Pump Scenarios
//!
//! Cooperative draining, queue overflow, re-entrant pumping and the
//! threaded dispatch thread.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use ca_connectivity::codec;
    use ca_connectivity::test_utils::{memory_node, MemoryNode, RecordingHandlers};
    use ca_connectivity::{
        ConnectivityApi, ConnectivityConfig, ConnectivityMask, ConnectivityType, DeliveryModel,
        EndpointAddress, MemoryNetwork, Method, RequestInfo, Token, DISPATCH_TASK_NAME,
    };
    use parking_lot::Mutex;

    fn selected_node(net: &Arc<MemoryNetwork>, config: ConnectivityConfig) -> MemoryNode {
        let node = memory_node(net, ConnectivityType::Ip, "10.0.0.1", config).unwrap();
        node.context
            .select_network(ConnectivityMask::from(ConnectivityType::Ip))
            .unwrap();
        node
    }

    fn peer() -> EndpointAddress {
        EndpointAddress::Ip {
            host: "10.0.0.50".into(),
            port: 5683,
        }
    }

    fn request_frame(tag: u8) -> Vec<u8> {
        let token = Token::from_slice(&[tag; 4]).unwrap();
        let request = RequestInfo::new(Method::Post, token).with_payload(vec![tag]);
        codec::encode_request(&request, "/queue").unwrap()
    }

    // =========================================================================
    // COOPERATIVE
    // =========================================================================

    #[test]
    fn test_nothing_runs_until_pumped() {
        let net = MemoryNetwork::new();
        let node = selected_node(&net, ConnectivityConfig::for_testing());
        let seen = RecordingHandlers::new();
        seen.install(&node.context).unwrap();

        for tag in 1..=3 {
            assert!(node.adapter.inject_packet(peer(), request_frame(tag), false));
        }
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(seen.request_count(), 0);
        assert_eq!(node.context.stats().queued, 3);

        assert_eq!(node.context.handle_request_response().unwrap(), 3);
        let tags: Vec<u8> = seen
            .requests()
            .iter()
            .map(|(_, r)| r.info.payload[0])
            .collect();
        assert_eq!(tags, vec![1, 2, 3]);
        assert!(seen.requests().iter().all(|(ep, _)| ep.address == peer()));
    }

    #[test]
    fn test_overflow_drops_newest_events() {
        let net = MemoryNetwork::new();
        let config = ConnectivityConfig::for_testing();
        assert_eq!(config.event_queue_capacity, 16);
        let node = selected_node(&net, config);
        let seen = RecordingHandlers::new();
        seen.install(&node.context).unwrap();

        for tag in 0..20 {
            node.adapter.inject_packet(peer(), request_frame(tag), false);
        }
        let stats = node.context.stats();
        assert_eq!(stats.queued, 16);
        assert_eq!(stats.dropped_queue_full, 4);

        assert_eq!(node.context.handle_request_response().unwrap(), 16);
        let tags: Vec<u8> = seen
            .requests()
            .iter()
            .map(|(_, r)| r.info.payload[0])
            .collect();
        assert_eq!(tags, (0..16).collect::<Vec<u8>>());

        // Room again after draining.
        assert!(node.adapter.inject_packet(peer(), request_frame(99), false));
        assert_eq!(node.context.handle_request_response().unwrap(), 1);
    }

    #[test]
    fn test_pump_from_inside_a_handler_returns_zero() {
        let net = MemoryNetwork::new();
        let node = Arc::new(selected_node(&net, ConnectivityConfig::for_testing()));
        let nested = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&node);
        let nested_sink = Arc::clone(&nested);
        node.context
            .register_handler(
                Arc::new(move |_, _| {
                    if let Some(node) = weak.upgrade() {
                        let inner = node.context.handle_request_response().unwrap();
                        nested_sink.lock().push(inner);
                    }
                }),
                Arc::new(|_, _| {}),
            )
            .unwrap();

        for tag in 1..=2 {
            node.adapter.inject_packet(peer(), request_frame(tag), false);
        }
        assert_eq!(node.context.handle_request_response().unwrap(), 2);
        assert_eq!(*nested.lock(), vec![0, 0]);
    }

    // =========================================================================
    // THREADED
    // =========================================================================

    #[test]
    fn test_threaded_callbacks_run_on_dispatch_thread() {
        let net = MemoryNetwork::new();
        let config = ConnectivityConfig::for_testing().with_delivery_model(DeliveryModel::Threaded);
        let node = selected_node(&net, config);

        let threads = Arc::new(Mutex::new(Vec::new()));
        let count = Arc::new(AtomicUsize::new(0));
        let (threads_sink, counter) = (Arc::clone(&threads), Arc::clone(&count));
        node.context
            .register_handler(
                Arc::new(move |_, _| {
                    let name = std::thread::current().name().map(str::to_string);
                    threads_sink.lock().push(name);
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                Arc::new(|_, _| {}),
            )
            .unwrap();

        for tag in 1..=3 {
            node.adapter.inject_packet(peer(), request_frame(tag), false);
        }
        for _ in 0..500 {
            if count.load(Ordering::SeqCst) == 3 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(threads
            .lock()
            .iter()
            .all(|name| name.as_deref() == Some(DISPATCH_TASK_NAME)));
        assert_eq!(node.context.handle_request_response().unwrap(), 0);
        node.context.terminate();
    }
}
