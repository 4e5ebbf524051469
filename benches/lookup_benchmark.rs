//! Benchmarks for interval building and address lookup.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use geoannotate::ip::parse_ip;
use geoannotate::ranges::{linear_search, search, BuildOptions};
use geoannotate::{Annotations, Annotator, AsNameTable, AsnDataset, AsnFamily};
use std::net::Ipv6Addr;
use std::sync::Arc;

const NAME: &str = "RouteViewIPv4/2019/01/routeviews-rv2-20190101-1200.pfx2as";

/// pfx2as text with `count` /24 prefixes, every tenth one nesting a /26.
fn generate_pfx2as(count: usize) -> String {
    let mut text = String::with_capacity(count * 24);
    for i in 0..count {
        let (a, b) = ((i >> 8) as u8, i as u8);
        text.push_str(&format!("10.{}.{}.0\t24\t{}\n", a, b, 64512 + i % 1000));
        if i % 10 == 0 {
            text.push_str(&format!("10.{}.{}.64\t26\t{}_{}\n", a, b, 65000, i % 7));
        }
    }
    text
}

fn dataset(count: usize) -> AsnDataset {
    AsnDataset::from_bytes(
        NAME,
        AsnFamily::V4,
        generate_pfx2as(count).into_bytes(),
        Arc::new(AsNameTable::new()),
        &BuildOptions::default(),
    )
    .unwrap()
}

/// Addresses spread over the generated prefixes plus some misses.
fn generate_queries(count: usize, prefixes: usize) -> Vec<Ipv6Addr> {
    (0..count)
        .map(|i| {
            let p = (i * 7919) % (prefixes + prefixes / 10);
            parse_ip(&format!("10.{}.{}.{}", (p >> 8) as u8, p as u8, (i * 31) % 256)).unwrap()
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for size in [1_000, 10_000, 60_000].iter() {
        let text = generate_pfx2as(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("pfx2as", size), size, |b, _| {
            b.iter(|| {
                black_box(
                    AsnDataset::from_bytes(
                        NAME,
                        AsnFamily::V4,
                        text.clone().into_bytes(),
                        Arc::new(AsNameTable::new()),
                        &BuildOptions::default(),
                    )
                    .unwrap(),
                )
            })
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let ds = dataset(60_000);
    let queries = generate_queries(1000, 60_000);

    let mut group = c.benchmark_group("search");
    group.throughput(Throughput::Elements(queries.len() as u64));

    group.bench_function("binary", |b| {
        b.iter(|| {
            for ip in &queries {
                let _ = black_box(search(ds.intervals(), *ip));
            }
        })
    });

    group.finish();
}

/// Bisection against the linear scan on small lists.
fn bench_search_vs_linear(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_vs_linear");

    for size in [16, 256, 4_096].iter() {
        let ds = dataset(*size);
        let queries = generate_queries(100, *size);
        group.throughput(Throughput::Elements(queries.len() as u64));

        group.bench_with_input(BenchmarkId::new("binary", size), size, |b, _| {
            b.iter(|| {
                for ip in &queries {
                    let _ = black_box(search(ds.intervals(), *ip));
                }
            })
        });
        group.bench_with_input(BenchmarkId::new("linear", size), size, |b, _| {
            b.iter(|| {
                for ip in &queries {
                    black_box(linear_search(ds.intervals(), *ip));
                }
            })
        });
    }

    group.finish();
}

fn bench_annotate(c: &mut Criterion) {
    let ds = dataset(60_000);
    let queries = generate_queries(1000, 60_000);

    let mut group = c.benchmark_group("annotate");
    group.throughput(Throughput::Elements(queries.len() as u64));

    group.bench_function("asn_v4", |b| {
        b.iter(|| {
            for ip in &queries {
                let mut ann = Annotations::default();
                let _ = black_box(ds.annotate(*ip, &mut ann));
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_build,
    bench_search,
    bench_search_vs_linear,
    bench_annotate
);
criterion_main!(benches);
