//! Micro-benchmarks for the hot paths around a publish: building the
//! configuration objects that back a subscribe/publish call, and parsing
//! the ack the server sends back. Both run off the wire (no live server),
//! since the request/reply round trip itself is dominated by network
//! latency rather than anything this crate controls.
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use jetstream_core::jetstream::consumer::ConsumerConfig;
use jetstream_core::jetstream::options::SubscribeOptions;
use jetstream_core::jetstream::Ack;

fn bench_ack_parse(c: &mut Criterion) {
    let raw = br#"{"stream":"orders","seq":42,"duplicate":false}"#;
    c.bench_function("parse PubAck", |b| {
        b.iter(|| serde_json::from_slice::<Ack>(raw).unwrap());
    });
}

fn bench_consumer_config_round_trip(c: &mut Criterion) {
    let config = ConsumerConfig::builder()
        .durable_name("processor")
        .filter_subject("orders.*")
        .max_ack_pending(1000)
        .build()
        .unwrap();

    c.bench_function("serialize ConsumerConfig", |b| {
        b.iter(|| serde_json::to_vec(&config).unwrap());
    });

    let json = serde_json::to_vec(&config).unwrap();
    c.bench_function("deserialize ConsumerConfig", |b| {
        b.iter(|| serde_json::from_slice::<ConsumerConfig>(&json).unwrap());
    });
}

fn bench_subscribe_options_build(c: &mut Criterion) {
    c.bench_function("SubscribeOptions builder", |b| {
        b.iter(|| {
            SubscribeOptions::builder()
                .configuration("orders", ConsumerConfig::default())
                .durable("processor")
                .pull(10)
                .build()
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_ack_parse,
    bench_consumer_config_round_trip,
    bench_subscribe_options_build,
);
criterion_main!(benches);
