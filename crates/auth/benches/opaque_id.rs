use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use looma_auth::IdCodec;
use looma_core::{CaseId, ModelKey};

fn bench_encode(c: &mut Criterion) {
    let codec = IdCodec::new(1, "bench-secret");
    let mut group = c.benchmark_group("opaque_id_encode");
    group.throughput(Throughput::Elements(1));

    for pk in [1i64, 1_000_000, i64::MAX] {
        group.bench_with_input(BenchmarkId::from_parameter(pk), &pk, |b, &pk| {
            b.iter(|| codec.encode_id(black_box(CaseId::from_raw(pk))))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let codec = IdCodec::new(1, "bench-secret");
    let mut group = c.benchmark_group("opaque_id_decode");
    group.throughput(Throughput::Elements(1));

    let Ok(valid) = codec.encode_id(CaseId::from_raw(4242)) else {
        return;
    };
    group.bench_function("valid", |b| {
        b.iter(|| codec.decode_id::<CaseId>(black_box(&valid)))
    });
    // Rejection path: wrong namespace still pays for decryption.
    group.bench_function("wrong_model", |b| {
        b.iter(|| codec.decode(black_box("person"), black_box(&valid)))
    });
    group.bench_function("malformed", |b| {
        b.iter(|| codec.decode_id::<CaseId>(black_box("999.garbage")))
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
