use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use diag_engine::core::codec::{ClientCodec, ServerCodec};
use diag_engine::core::frame::{Request, Response, MAX_PAYLOAD_SIZE};
use tokio_util::codec::{Decoder, Encoder};

#[allow(clippy::unwrap_used)]
fn bench_request_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_frames");
    let payload_sizes = [0usize, 16, 256, 1024, MAX_PAYLOAD_SIZE];

    for &size in &payload_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || Request::new(0x0100, 1, vec![0u8; size]),
                |request| {
                    let mut buf = BytesMut::with_capacity(size + 8);
                    ClientCodec::default().encode(request, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("decode_{size}b"), |b| {
            let mut wire = BytesMut::new();
            ClientCodec::default()
                .encode(Request::new(0x0100, 1, vec![0u8; size]), &mut wire)
                .unwrap();
            b.iter_batched(
                || wire.clone(),
                |mut buf| {
                    let decoded = ServerCodec::default().decode(&mut buf).unwrap();
                    assert!(decoded.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_response_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_frames");

    for &size in &[16usize, MAX_PAYLOAD_SIZE] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_decode_{size}b"), |b| {
            b.iter_batched(
                || Response::success(7, vec![0xA5u8; size]),
                |response| {
                    let mut buf = BytesMut::with_capacity(size + 8);
                    ServerCodec::default().encode(response, &mut buf).unwrap();
                    let decoded = ClientCodec::default().decode(&mut buf).unwrap();
                    assert!(decoded.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_request_frames, bench_response_frames);
criterion_main!(benches);
