//! Header and codec encoding/decoding benchmarks.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gwire_protocol::{
    classify, negotiate_header, Codecs, Edge, Header, RequestMessage, ResponseMessage, TypedValue,
    Value, Vertex, MIME_GRAPHBINARY_V4, MIME_GRAPHSON_V4,
};

const MIMES: [&str; 2] = [MIME_GRAPHSON_V4, MIME_GRAPHBINARY_V4];

fn create_test_request(bindings: usize) -> RequestMessage {
    let mut request = RequestMessage::eval("g.V(ids).out('knows').values('name')").with_id("bench-1");
    for i in 0..bindings {
        request = request
            .with_binding(format!("b{}", i), Value::Long(i as i64))
            .unwrap();
    }
    request
}

fn create_test_response(results: usize) -> ResponseMessage {
    let values = (0..results)
        .map(|i| {
            let edge = Edge::new(
                i as i64,
                "knows",
                Vertex::new(1, "person"),
                Vertex::new(i as i32 + 2, "person"),
            );
            TypedValue::literal(edge).unwrap()
        })
        .collect();
    ResponseMessage::build_response("bench-1", values)
}

fn bench_header(c: &mut Criterion) {
    let mut group = c.benchmark_group("header");

    group.bench_function("negotiate", |b| {
        b.iter(|| black_box(negotiate_header(black_box(MIME_GRAPHSON_V4)).unwrap()));
    });

    let encoded = Header::new(MIME_GRAPHBINARY_V4).unwrap().encode();
    group.bench_function("decode", |b| {
        b.iter(|| {
            let mut buf = BytesMut::from(&encoded[..]);
            black_box(Header::decode(&mut buf).unwrap())
        });
    });

    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");

    for size in [10, 100, 1000] {
        let value = Value::List((0..size).map(|i| Value::map_of([("id", Value::Integer(i))])).collect());

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &value, |b, value| {
            b.iter(|| black_box(classify(value).unwrap()));
        });
    }

    group.finish();
}

fn bench_request_encode(c: &mut Criterion) {
    let codecs = Codecs::global();

    for mime in MIMES {
        let mut group = c.benchmark_group(format!("request_encode/{}", mime));
        for size in [1, 16, 128] {
            let request = create_test_request(size);

            group.throughput(Throughput::Elements(1));
            group.bench_with_input(BenchmarkId::from_parameter(size), &request, |b, request| {
                b.iter(|| black_box(codecs.encode_request(request, mime).unwrap()));
            });
        }
        group.finish();
    }
}

fn bench_request_decode(c: &mut Criterion) {
    let codecs = Codecs::global();

    for mime in MIMES {
        let mut group = c.benchmark_group(format!("request_decode/{}", mime));
        for size in [1, 16, 128] {
            let encoded = codecs.encode_request(&create_test_request(size), mime).unwrap();

            group.throughput(Throughput::Bytes(encoded.len() as u64));
            group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
                b.iter(|| black_box(codecs.decode_request(encoded, mime).unwrap()));
            });
        }
        group.finish();
    }
}

fn bench_response_encode(c: &mut Criterion) {
    let codecs = Codecs::global();

    for mime in MIMES {
        let mut group = c.benchmark_group(format!("response_encode/{}", mime));
        for size in [10, 100, 1000] {
            let response = create_test_response(size);

            group.throughput(Throughput::Elements(size as u64));
            group.bench_with_input(
                BenchmarkId::from_parameter(size),
                &response,
                |b, response| {
                    b.iter(|| black_box(codecs.encode_response(response, mime).unwrap()));
                },
            );
        }
        group.finish();
    }
}

fn bench_response_decode(c: &mut Criterion) {
    let codecs = Codecs::global();

    for mime in MIMES {
        let mut group = c.benchmark_group(format!("response_decode/{}", mime));
        for size in [10, 100, 1000] {
            let encoded = codecs.encode_response(&create_test_response(size), mime).unwrap();

            group.throughput(Throughput::Elements(size as u64));
            group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
                b.iter(|| black_box(codecs.decode_response(encoded, mime).unwrap()));
            });
        }
        group.finish();
    }
}

criterion_group!(
    benches,
    bench_header,
    bench_classify,
    bench_request_encode,
    bench_request_decode,
    bench_response_encode,
    bench_response_decode,
);

criterion_main!(benches);
