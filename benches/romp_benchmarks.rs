// ABOUTME: Benchmark suite for the romp value codec and object registry
// ABOUTME: Measures encode/decode round trips, frame header parsing, and registry register/get throughput

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use romp::codec::{decode_value, encode_value, FrameHeader, MessageType};
use romp::{Registry, RemoteObject, Value};

fn sample_array_value() -> Value {
    Value::Array(vec![
        Value::Str("submit".to_string()),
        Value::Int(42),
        Value::Str("12345".to_string()),
        Value::Bytes(bytes::Bytes::from_static(b"Hello World")),
        Value::Map(vec![(Value::Str("k".to_string()), Value::Bool(true))]),
    ])
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_value");
    group.measurement_time(Duration::from_secs(5));

    let scalar = Value::Int(42);
    group.bench_function("scalar", |b| {
        b.iter(|| {
            let mut buf = BytesMut::new();
            encode_value(black_box(&scalar), &mut buf);
            buf
        })
    });

    let array = sample_array_value();
    group.bench_function("nested_array", |b| {
        b.iter(|| {
            let mut buf = BytesMut::new();
            encode_value(black_box(&array), &mut buf);
            buf
        })
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_value");
    group.measurement_time(Duration::from_secs(5));

    let mut scalar_buf = BytesMut::new();
    encode_value(&Value::Int(42), &mut scalar_buf);
    let scalar_bytes = scalar_buf.freeze();

    group.bench_function("scalar", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(&scalar_bytes[..]));
            decode_value(&mut cursor).unwrap()
        })
    });

    let mut array_buf = BytesMut::new();
    encode_value(&sample_array_value(), &mut array_buf);
    let array_bytes = array_buf.freeze();

    group.bench_function("nested_array", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(&array_bytes[..]));
            decode_value(&mut cursor).unwrap()
        })
    });

    group.finish();
}

fn bench_frame_header(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_header");
    group.measurement_time(Duration::from_secs(5));

    let header = FrameHeader::new(MessageType::Request, 7, 128);
    let mut buf = BytesMut::new();
    header.encode(&mut buf);
    let header_bytes = buf.freeze();

    group.bench_function("decode", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(&header_bytes[..]));
            FrameHeader::decode(&mut cursor).unwrap()
        })
    });

    group.bench_function("encode", |b| {
        b.iter(|| {
            let mut buf = BytesMut::new();
            black_box(&header).encode(&mut buf);
            buf
        })
    });

    group.finish();
}

struct Echo;
impl RemoteObject for Echo {
    fn call(&self, _method: &str, mut args: Vec<Value>) -> Result<Value, Value> {
        Ok(args.pop().unwrap_or(Value::Nil))
    }
    fn methods(&self) -> Vec<String> {
        vec!["echo".to_string()]
    }
}

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("register_and_get", |b| {
        b.iter(|| {
            let registry = Registry::new();
            let id = registry.register(Arc::new(Echo)).unwrap();
            black_box(registry.get(black_box(id)))
        })
    });

    let registry = Registry::new();
    let id = registry.register(Arc::new(Echo)).unwrap();
    registry.bind("echo", id);

    group.bench_function("resolve", |b| {
        b.iter(|| black_box(registry.resolve(black_box("echo"))))
    });

    group.finish();
}

fn bench_value_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_value_by_size");

    for len in [8usize, 64, 512, 4096] {
        let value = Value::Str("x".repeat(len));
        group.bench_with_input(BenchmarkId::from_parameter(len), &value, |b, value| {
            b.iter(|| {
                let mut buf = BytesMut::new();
                encode_value(black_box(value), &mut buf);
                buf
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_frame_header,
    bench_registry,
    bench_value_sizes
);
criterion_main!(benches);
