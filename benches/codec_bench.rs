//! Performance benchmarks for the CCID frame codec.
//!
//! Encoding and decoding sit on the path of every APDU exchange, so these
//! benchmarks track per-frame latency across APDU sizes.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench codec_bench
//! ```

use cardlink_protocol::{CommandFrame, VoltageSelect, decode_response};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

const APDU_SIZES: [usize; 4] = [4, 64, 261, 1014];

/// Build a DataBlock response carrying `len` payload bytes.
fn data_block(len: usize) -> Vec<u8> {
    let mut bytes = vec![0x80];
    bytes.extend_from_slice(&(len as u32).to_le_bytes());
    bytes.extend_from_slice(&[0, 1, 0, 0, 0]);
    bytes.extend(std::iter::repeat_n(0xA5, len));
    bytes
}

/// Benchmark encoding the power-on command.
fn bench_encode_power_on(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_power_on");
    group.throughput(Throughput::Elements(1));

    group.bench_function("power_on", |b| {
        b.iter(|| {
            let frame = CommandFrame::power_on(0, black_box(0), VoltageSelect::Automatic);
            black_box(frame.encode());
        });
    });

    group.finish();
}

/// Benchmark encoding XfrBlock commands of increasing APDU size.
fn bench_encode_xfr_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_xfr_block");

    for size in APDU_SIZES {
        let apdu = vec![0x5A; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &apdu, |b, apdu| {
            b.iter(|| {
                let frame = CommandFrame::xfr_block(0, black_box(1), 4, 0, apdu);
                black_box(frame.encode());
            });
        });
    }

    group.finish();
}

/// Benchmark decoding DataBlock responses of increasing payload size.
fn bench_decode_data_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_data_block");

    for size in APDU_SIZES {
        let bytes = data_block(size);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, bytes| {
            b.iter(|| black_box(decode_response(black_box(bytes)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark decoding a response that declares more payload than it holds.
fn bench_decode_truncated(c: &mut Criterion) {
    let mut bytes = data_block(40);
    bytes[1..5].copy_from_slice(&256u32.to_le_bytes());

    c.bench_function("decode_truncated", |b| {
        b.iter(|| black_box(decode_response(black_box(&bytes)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_encode_power_on,
    bench_encode_xfr_block,
    bench_decode_data_block,
    bench_decode_truncated
);
criterion_main!(benches);
