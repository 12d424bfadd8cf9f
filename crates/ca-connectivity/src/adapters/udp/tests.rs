//! Tests for the UDP transport (loopback only)

use super::*;
use crate::adapters::ThreadSpawner;
use std::sync::mpsc;

fn adapter() -> UdpAdapter {
    let a = UdpAdapter::new(ConnectivityType::Ip)
        .unwrap()
        .with_read_timeout(Duration::from_millis(20))
        .with_monitor_interval(Duration::from_millis(100));
    a.initialize_server(Arc::new(ThreadSpawner::new())).unwrap();
    a
}

#[test]
fn test_rejects_link_layer_types() {
    assert!(UdpAdapter::new(ConnectivityType::BtLe).is_err());
    assert!(UdpAdapter::new(ConnectivityType::WiFi).is_ok());
}

#[test]
fn test_loopback_unicast_delivery() {
    let receiver = adapter();
    let sender = adapter();
    let (tx, rx) = mpsc::channel();
    let tx = parking_lot::Mutex::new(tx);
    receiver.set_packet_receive_callback(Arc::new(move |p| {
        let _ = tx.lock().send(p);
    }));

    let port = receiver.start_unicast_server("127.0.0.1", 0, false).unwrap();
    assert_ne!(port, 0);
    let sender_port = sender.start_unicast_server("127.0.0.1", 0, false).unwrap();

    let dest = EndpointAddress::Ip {
        host: "127.0.0.1".into(),
        port,
    };
    assert_eq!(sender.send_data(&dest, b"ping", false).unwrap(), 4);

    let packet = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(packet.data, b"ping");
    assert!(!packet.multicast);
    assert_eq!(
        packet.source,
        EndpointAddress::Ip {
            host: "127.0.0.1".into(),
            port: sender_port,
        }
    );

    receiver.terminate_server();
    sender.terminate_server();
}

#[test]
fn test_repeated_unicast_start_keeps_port() {
    let a = adapter();
    let first = a.start_unicast_server("127.0.0.1", 0, false).unwrap();
    assert_eq!(a.start_unicast_server("127.0.0.1", 0, false).unwrap(), first);
    a.terminate_server();
}

#[test]
fn test_busy_port_falls_back_unless_forced() {
    let holder = UdpSocket::bind("127.0.0.1:0").unwrap();
    let busy = holder.local_addr().unwrap().port();

    let forced = adapter();
    assert!(forced.start_unicast_server("127.0.0.1", busy, true).is_err());

    let relaxed = adapter();
    let port = relaxed.start_unicast_server("127.0.0.1", busy, false).unwrap();
    assert_ne!(port, busy);

    forced.terminate_server();
    relaxed.terminate_server();
}

#[test]
fn test_multicast_group_must_be_multicast() {
    let a = adapter();
    assert!(matches!(
        a.start_multicast_server("0.0.0.0", "10.0.0.1", 0),
        Err(CaError::InvalidParam(_))
    ));
    assert!(matches!(
        a.start_multicast_server("0.0.0.0", "not-an-ip", 0),
        Err(CaError::InvalidParam(_))
    ));
    a.terminate_server();
}

#[test]
fn test_send_rejects_mac_destination() {
    let a = adapter();
    let mac = EndpointAddress::Mac("00:11:22:33:44:55".parse().unwrap());
    assert!(a.send_data(&mac, b"x", false).is_err());
    a.terminate_server();
}

#[test]
fn test_server_needs_initialization() {
    let a = UdpAdapter::new(ConnectivityType::Ip).unwrap();
    assert!(a.start_unicast_server("127.0.0.1", 0, false).is_err());
}

#[test]
fn test_loopback_interface_info() {
    let a = adapter();
    a.start_unicast_server("127.0.0.1", 0, false).unwrap();
    let info = a.get_interface_info().unwrap();
    assert_eq!(info.address, "127.0.0.1");
    assert_eq!(info.name, "lo");
    a.terminate_server();
}
