//! End-to-end pipeline benchmarks: decode, validate, execute, stream, encode.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gwire_protocol::tokens::ARGS_BATCH_SIZE;
use gwire_protocol::{
    Codecs, RequestMessage, TypedValue, Value, MIME_GRAPHBINARY_V4, MIME_GRAPHSON_V4,
};
use gwire_server::{Config, ExecutionError, Pipeline, ValidatedRequest};

/// Returns as many integers as binding `n` asks for.
fn range(request: &ValidatedRequest) -> Result<Vec<Value>, ExecutionError> {
    let n = request
        .bindings()
        .first()
        .and_then(|b| b.get().as_i64())
        .unwrap_or(0);
    Ok((0..n).map(Value::Long).collect())
}

fn bench_handle(c: &mut Criterion) {
    let pipeline = Pipeline::new(Config::default(), range).unwrap();
    let codecs = Codecs::global();

    for mime in [MIME_GRAPHSON_V4, MIME_GRAPHBINARY_V4] {
        let mut group = c.benchmark_group(format!("pipeline_handle/{}", mime));
        for results in [1, 64, 1024] {
            let request = RequestMessage::eval("g.V().limit(n)")
                .with_id("bench-1")
                .with_binding("n", Value::Long(results))
                .unwrap()
                .with_arg(ARGS_BATCH_SIZE, TypedValue::integer(64));
            let encoded = codecs.encode_request(&request, mime).unwrap();

            group.throughput(Throughput::Elements(results as u64));
            group.bench_with_input(
                BenchmarkId::from_parameter(results),
                &encoded,
                |b, encoded| {
                    b.iter(|| black_box(pipeline.handle(encoded, mime)));
                },
            );
        }
        group.finish();
    }
}

fn bench_rejection(c: &mut Criterion) {
    let pipeline = Pipeline::new(Config::default(), range).unwrap();
    let request = RequestMessage::eval("g.V()")
        .with_id("bench-1")
        .with_binding("label", "person")
        .unwrap();
    let encoded = Codecs::global()
        .encode_request(&request, MIME_GRAPHBINARY_V4)
        .unwrap();

    let mut group = c.benchmark_group("pipeline_reject");
    group.throughput(Throughput::Elements(1));
    group.bench_function("reserved_binding", |b| {
        b.iter(|| black_box(pipeline.handle(&encoded, MIME_GRAPHBINARY_V4)));
    });
    group.finish();
}

criterion_group!(benches, bench_handle, bench_rejection);

criterion_main!(benches);
