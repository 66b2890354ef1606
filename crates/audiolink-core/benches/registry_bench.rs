//! Criterion benchmarks for the shared registries.
//!
//! The receive loop offers every datagram's sender to the target registry, so
//! the duplicate-write path runs once per packet and must stay cheap. Peer
//! association churn covers the host-role table under its lock.
//!
//! Run with:
//! ```bash
//! cargo bench --package audiolink-core --bench registry_bench
//! ```

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use audiolink_core::constants::{DHCP_POOL_START, MAX_PEERS, TRANSPORT_PORT};
use audiolink_core::{MacAddr, PeerRegistry, TargetRegistry};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

// ── Target registry ───────────────────────────────────────────────────────────

fn bench_target_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("target_registry");

    // Per-datagram passive observation of an already-known sender
    group.bench_function("set_unchanged", |b| {
        let reg = TargetRegistry::new(TRANSPORT_PORT);
        let addr = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 1), TRANSPORT_PORT);
        reg.set(addr);
        b.iter(|| reg.set(black_box(addr)))
    });

    group.bench_function("set_unspecified", |b| {
        let reg = TargetRegistry::new(TRANSPORT_PORT);
        b.iter(|| reg.set_ipv4(black_box(Ipv4Addr::UNSPECIFIED)))
    });

    // Full cycle: set, ready, notify, clear
    group.bench_function("notify_cycle", |b| {
        let reg = TargetRegistry::new(TRANSPORT_PORT);
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        reg.set_ready_callback(Arc::new(move |_| {
            f.fetch_add(1, Ordering::Relaxed);
        }));
        b.iter(|| {
            reg.set_ipv4(black_box(Ipv4Addr::new(192, 168, 1, 1)));
            reg.mark_socket_ready();
            reg.clear();
        })
    });

    group.finish();
}

// ── Peer registry ─────────────────────────────────────────────────────────────

fn bench_peer_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("peer_registry");

    group.bench_function("fill_and_drain", |b| {
        let reg = PeerRegistry::new(DHCP_POOL_START);
        let macs: Vec<MacAddr> = (0..MAX_PEERS as u8)
            .map(|n| MacAddr([0x02, 0, 0, 0, 0, n]))
            .collect();
        b.iter(|| {
            for mac in &macs {
                reg.on_associated(black_box(*mac), Duration::ZERO);
            }
            for mac in &macs {
                reg.on_disassociated(black_box(*mac));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_target_set, bench_peer_churn);
criterion_main!(benches);
