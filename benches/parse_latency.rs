//! Hot-path microbenchmarks for the sched_latency line parser.
//!
//! The parser runs once per drained line every tick; it should stay well
//! under a microsecond per line.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use schedprobe::latency::parse::parse_line;

fn bench_parse_line(c: &mut Criterion) {
    let full = "1700000000,sched_delay,42,1500,10,90000,1200,4000,9000,5100,3100,2000";
    let no_trailer = "1700000000,wakeup,5,2000,1,9999,1500,2500,3500";
    let malformed = "1700000000,wakeup,abc,2000,1,9999,1500,2500,3500";

    c.bench_function("parse_line/full", |b| {
        b.iter(|| parse_line(black_box(full)))
    });

    c.bench_function("parse_line/no_trailer", |b| {
        b.iter(|| parse_line(black_box(no_trailer)))
    });

    c.bench_function("parse_line/malformed", |b| {
        b.iter(|| parse_line(black_box(malformed)))
    });
}

criterion_group!(benches, bench_parse_line);
criterion_main!(benches);
