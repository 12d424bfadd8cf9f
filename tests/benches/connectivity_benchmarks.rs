//! # Connectivity Benchmarks
//!
//! Hot paths of the connectivity layer:
//! - frame encode/decode across payload and option sizes
//! - token generation and release
//! - unicast delivery between two memory nodes, pumped cooperatively
//!
//! ## Usage
//!
//! ```bash
//! cargo bench --package ca-tests --bench connectivity_benchmarks
//! cargo bench --package ca-tests --bench connectivity_benchmarks -- ca/codec
//! ```

use std::sync::Arc;
use std::time::Duration;

use ca_connectivity::codec;
use ca_connectivity::test_utils::memory_node;
use ca_connectivity::{
    ConnectivityApi, ConnectivityConfig, ConnectivityMask, ConnectivityType, HeaderOption,
    MemoryNetwork, Method, RemoteEndpoint, RequestInfo, Token, TokenManager, MAX_HEADER_OPTIONS,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;

fn random_request(payload_len: usize, option_count: usize) -> RequestInfo {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 8] = rng.gen();
    let token = Token::from_slice(&token_bytes).unwrap();
    let payload: Vec<u8> = (0..payload_len).map(|_| rng.gen()).collect();
    let options = (0..option_count as u16).map(|i| HeaderOption::new(2048 + i, vec![0x61u8; 16]));
    RequestInfo::new(Method::Post, token)
        .with_options(options)
        .with_payload(payload)
}

// =============================================================================
// CODEC
// =============================================================================

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("ca/codec");

    for payload_len in [0usize, 256, 1024, 8192] {
        let request = random_request(payload_len, 4);
        let frame = codec::encode_request(&request, "/a/light").unwrap();
        group.throughput(Throughput::Bytes(frame.len() as u64));

        group.bench_with_input(
            BenchmarkId::new("encode_request", payload_len),
            &request,
            |b, r| b.iter(|| black_box(codec::encode_request(r, "/a/light").unwrap())),
        );
        group.bench_with_input(
            BenchmarkId::new("decode", payload_len),
            &frame,
            |b, f| b.iter(|| black_box(codec::decode(f).unwrap())),
        );
    }

    let full = random_request(64, MAX_HEADER_OPTIONS);
    let frame = codec::encode_request(&full, "/oic/res").unwrap();
    group.bench_function("decode_max_options", |b| {
        b.iter(|| black_box(codec::decode(&frame).unwrap()))
    });

    group.finish();
}

// =============================================================================
// TOKENS
// =============================================================================

fn bench_tokens(c: &mut Criterion) {
    let mut group = c.benchmark_group("ca/tokens");

    for length in [1usize, 4, 8] {
        let manager = TokenManager::new(length).unwrap();
        group.bench_with_input(
            BenchmarkId::new("generate_destroy", length),
            &manager,
            |b, m| {
                b.iter(|| {
                    let token = m.generate().unwrap();
                    m.destroy(black_box(token));
                })
            },
        );
    }

    group.finish();
}

// =============================================================================
// DELIVERY
// =============================================================================

fn bench_memory_delivery(c: &mut Criterion) {
    let mut group = c.benchmark_group("ca/delivery");
    group.measurement_time(Duration::from_secs(5));

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
    // Discarding handlers; recording would grow without bound.
    server
        .context
        .register_handler(Arc::new(|_, _| {}), Arc::new(|_, _| {}))
        .unwrap();

    let endpoint = RemoteEndpoint::new(ConnectivityType::Ip, server.adapter.local_endpoint_address())
        .unwrap()
        .with_resource_uri("/bench");

    for payload_len in [16usize, 512] {
        let request = random_request(payload_len, 2);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("send_and_pump", payload_len),
            &request,
            |b, r| {
                b.iter(|| {
                    client.context.send_request(&endpoint, r).unwrap();
                    black_box(server.context.handle_request_response().unwrap())
                })
            },
        );
    }

    group.finish();
    client.context.terminate();
    server.context.terminate();
}

criterion_group!(
    name = connectivity_benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(5));
    targets =
        bench_codec,
        bench_tokens,
        bench_memory_delivery,
);

criterion_main!(connectivity_benches);
