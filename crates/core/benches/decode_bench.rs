//! Decoder throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use inwatch_core::{decode, EventMask, HEADER_SIZE};

/// Build a batch the way the kernel lays it out
fn batch(count: usize, with_names: bool) -> Vec<u8> {
    let mut buf = Vec::new();
    for i in 0..count {
        let name = format!("file-{}.txt", i);
        let name_len = if with_names {
            (name.len() + 1).div_ceil(HEADER_SIZE) * HEADER_SIZE
        } else {
            0
        };

        buf.extend_from_slice(&(i as i32 % 64).to_ne_bytes());
        buf.extend_from_slice(&EventMask::MODIFY.bits().to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(&(name_len as u32).to_ne_bytes());
        if with_names {
            let start = buf.len();
            buf.extend_from_slice(name.as_bytes());
            buf.resize(start + name_len, 0);
        }
    }
    buf
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for (label, with_names) in [("nameless", false), ("named", true)] {
        let buf = batch(1024, with_names);
        group.throughput(Throughput::Bytes(buf.len() as u64));
        group.bench_function(label, |b| {
            b.iter(|| decode(black_box(&buf)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
