//! Criterion benchmarks for outbound payload chunking.
//!
//! Run with:
//! ```bash
//! cargo bench --package audiolink-core --bench chunk_bench
//! ```

use audiolink_core::constants::{MAX_DATAGRAM_SIZE, SEND_CHUNK_SIZE};
use audiolink_core::protocol::chunk::chunks;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunking");

    for size in [SEND_CHUNK_SIZE / 2, MAX_DATAGRAM_SIZE, 2500, 64 * 1024] {
        let payload = vec![0x5Au8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, p| {
            b.iter(|| {
                chunks(black_box(p), SEND_CHUNK_SIZE)
                    .map(<[u8]>::len)
                    .sum::<usize>()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chunking);
criterion_main!(benches);
