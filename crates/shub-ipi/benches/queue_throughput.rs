//! Throughput benchmarks for the IPI message queue.
//!
//! ## Running the benchmarks
//!
//! ```bash
//! cargo bench -p shub-ipi
//! ```
//!
//! ## Benchmarks included
//!
//! - `submit_sync/N_bytes` - Blocking round trip against an echoing remote
//! - `submit_async/N_messages` - Time to queue and complete a burst of N messages

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shub_ipi::sim::SimMailbox;
use shub_ipi::{ChannelId, Message, Transfer, Transport};

const CTRL_OUT: ChannelId = ChannelId(2);
const CTRL_IN: ChannelId = ChannelId(22);

fn bench_submit_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_sync");

    for len in [4usize, 16, 64].iter() {
        let sim = SimMailbox::echo(CTRL_IN, *len);
        let transport = Transport::builder(sim).start().expect("transport should start");
        let tx = vec![0xA5u8; *len];

        group.throughput(Throughput::Bytes(*len as u64));
        group.bench_with_input(BenchmarkId::new("bytes", len), len, |b, &len| {
            let mut rx = vec![0u8; len];
            b.iter(|| {
                transport
                    .submit_sync(CTRL_OUT, black_box(&tx), &mut rx)
                    .expect("round trip should succeed");
                black_box(&rx);
            });
        });
    }

    group.finish();
}

fn bench_submit_async_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_async");
    let sim = SimMailbox::echo(CTRL_IN, 8);
    let transport = Transport::builder(sim).start().expect("transport should start");

    for count in [8usize, 64].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("messages", count), count, |b, &count| {
            b.iter(|| {
                let done = Arc::new(AtomicUsize::new(0));
                for i in 0..count {
                    let done = Arc::clone(&done);
                    let message = Message::single(Transfer::new(CTRL_OUT, vec![i as u8; 8], 8))
                        .on_complete(move |_| {
                            done.fetch_add(1, Ordering::Release);
                        });
                    transport.submit_async(message).expect("enqueue should succeed");
                }
                // The final blocking submission completes after every queued
                // message ahead of it.
                let mut rx = [0u8; 8];
                transport
                    .submit_sync(CTRL_OUT, &[0u8; 8], &mut rx)
                    .expect("round trip should succeed");
                assert_eq!(done.load(Ordering::Acquire), count);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_submit_sync, bench_submit_async_burst);
criterion_main!(benches);
