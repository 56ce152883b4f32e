//! Benchmarks for column value encoding and decoding.

#![allow(clippy::unwrap_used, missing_docs)]

use bytes::{Bytes, BytesMut};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tds_types::decode::MAX_LENGTH_PLP;
use tds_types::{SqlValue, TypeInfo, decode_utf16_string, decode_value, encode_value};

fn encoded(value: &SqlValue, info: &TypeInfo) -> Bytes {
    let mut buf = BytesMut::new();
    encode_value(value, info, &mut buf).unwrap();
    buf.freeze()
}

fn bench_decode_fixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_fixed");

    let int = TypeInfo::intn(4);
    let bytes = encoded(&SqlValue::Int(1), &int);
    group.bench_function("intn4", |b| {
        b.iter(|| {
            let mut buf = bytes.clone();
            black_box(decode_value(&mut buf, black_box(&int)).unwrap())
        })
    });

    let decimal = TypeInfo::decimal(18, 4);
    let bytes = encoded(&SqlValue::Decimal("12345.6789".parse().unwrap()), &decimal);
    group.bench_function("decimal_18_4", |b| {
        b.iter(|| {
            let mut buf = bytes.clone();
            black_box(decode_value(&mut buf, black_box(&decimal)).unwrap())
        })
    });

    group.finish();
}

fn bench_decode_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_text");
    let text = "This is a typical database column value with some content";

    for (name, info) in [
        ("nvarchar", TypeInfo::nvarchar(4000)),
        ("nvarchar_max", TypeInfo::nvarchar(MAX_LENGTH_PLP)),
    ] {
        let bytes = encoded(&SqlValue::from(text), &info);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut buf = bytes.clone();
                black_box(decode_value(&mut buf, black_box(&info)).unwrap())
            })
        });
    }

    let unicode: Vec<u8> = "日本語テスト文字列 émoji et accénts"
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect();
    group.bench_function("utf16_unicode", |b| {
        b.iter(|| black_box(decode_utf16_string(black_box(&unicode)).unwrap()))
    });

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let info = TypeInfo::nvarchar(4000);
    let value = SqlValue::from("Hello, World!");

    group.bench_function("nvarchar", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(64);
            encode_value(black_box(&value), &info, &mut buf).unwrap();
            black_box(buf)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode_fixed, bench_decode_text, bench_encode);
criterion_main!(benches);
