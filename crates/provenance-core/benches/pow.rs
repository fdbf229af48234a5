use criterion::{black_box, criterion_group, criterion_main, Criterion};
use provenance_core::{BlockHeader, Digest, ParallelPow, PreviousHash, ProofOfWork, ScalarPow};

fn template() -> BlockHeader {
    BlockHeader {
        index: 42,
        timestamp: 1736870400.25,
        previous_hash: PreviousHash::Block(Digest::hash(b"parent")),
        nonce: 0,
        merkle_root: Digest::hash(b"merkle"),
    }
}

fn bench_pow(c: &mut Criterion) {
    let header = template();
    let mut group = c.benchmark_group("find_proof_difficulty_3");
    group.sample_size(20);
    group.bench_function("scalar", |b| {
        b.iter(|| ScalarPow.find_proof(black_box(&header), 3))
    });
    group.bench_function("parallel", |b| {
        b.iter(|| ParallelPow::new().find_proof(black_box(&header), 3))
    });
    group.finish();
}

criterion_group!(benches, bench_pow);
criterion_main!(benches);
