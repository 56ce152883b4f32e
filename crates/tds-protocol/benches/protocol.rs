//! Benchmarks for TDS message encoding and token decoding.

#![allow(clippy::unwrap_used, missing_docs)]

use bytes::{Bytes, BytesMut};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use tds_protocol::{
    ColMetaData, ColumnData, Done, Login7, PACKET_HEADER_SIZE, PacketHeader, PacketStatus,
    PacketType, SqlBatch, TokenDecoder, TokenRow, TokenType, TypeInfo,
};
use tds_types::SqlValue;

fn bench_packet_header(c: &mut Criterion) {
    let header = PacketHeader::new(PacketType::TabularResult, PacketStatus::END_OF_MESSAGE, 1000);
    let encoded = header.encode_to_bytes();

    c.bench_function("packet_header_encode", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE);
            header.encode(&mut buf);
            black_box(buf)
        })
    });

    c.bench_function("packet_header_decode", |b| {
        b.iter(|| {
            let mut cursor = encoded.clone();
            black_box(PacketHeader::decode(&mut cursor).unwrap())
        })
    });
}

fn bench_login7_encode(c: &mut Criterion) {
    let login = Login7::new()
        .with_hostname("bench-host")
        .with_sql_auth("sa", "Str0ng!Passw0rd")
        .with_app_name("bench")
        .with_server_name("localhost")
        .with_database("master");

    c.bench_function("login7_encode", |b| b.iter(|| black_box(login.encode().unwrap())));
}

fn bench_sql_batch_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_batch_encode");

    let simple = "SELECT 1";
    group.throughput(Throughput::Bytes(simple.len() as u64));
    group.bench_function("simple", |b| {
        b.iter(|| black_box(SqlBatch::new(simple).encode()))
    });

    let large = "SELECT * FROM dbo.events WHERE id > 0 AND kind = 'x' ".repeat(200);
    group.throughput(Throughput::Bytes(large.len() as u64));
    group.bench_function("large_in_transaction", |b| {
        b.iter(|| black_box(SqlBatch::new(large.as_str()).with_transaction(7).encode()))
    });

    group.finish();
}

fn result_set(rows: usize) -> Bytes {
    let meta = ColMetaData::new(vec![
        ColumnData::new("id", TypeInfo::intn(4)).unwrap(),
        ColumnData::new("name", TypeInfo::nvarchar(100)).unwrap(),
    ]);
    let mut buf = BytesMut::new();
    meta.encode(&mut buf).unwrap();
    for i in 0..rows {
        TokenRow {
            values: vec![SqlValue::Int(i as i32), SqlValue::String(format!("row {i}"))],
        }
        .encode(&meta, &mut buf)
        .unwrap();
    }
    Done::final_with_count(Some(rows as u64)).encode(TokenType::Done, &mut buf);
    buf.freeze()
}

fn bench_token_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_decode");
    for rows in [1usize, 100, 1000] {
        let payload = result_set(rows);
        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_function(format!("{rows}_rows"), |b| {
            b.iter(|| {
                let mut decoder = TokenDecoder::from_message(payload.clone());
                let mut count = 0;
                while let Some(token) = decoder.next_token().unwrap() {
                    black_box(&token);
                    count += 1;
                }
                count
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_packet_header,
    bench_login7_encode,
    bench_sql_batch_encode,
    bench_token_decode
);
criterion_main!(benches);
