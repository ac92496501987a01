use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use fronctocol::engine::Fronctocol;
use fronctocol::ff::{Field, Fp32BitPrime};
use fronctocol::protocol::batch::Batch;
use fronctocol::protocol::multiply::Multiply;
use fronctocol::randomness::kinds::{BeaverInfo, BeaverTriple, RandomnessInfo};
use fronctocol::test_fixture::TestWorld;
use rand::thread_rng;
use tokio::runtime::Builder;

/// Builds one party's root fronctocol: a batch of independent Beaver
/// multiplications, each of a fixed pair of shares under a freshly dealt
/// triple, one sibling per entry in `triples`.
fn batch_multiply_root(triples: &[BeaverTriple<Fp32BitPrime>]) -> Box<dyn Fronctocol<String>> {
    let siblings: Vec<Multiply<String, Fp32BitPrime>> = triples
        .iter()
        .map(|&triple| {
            Multiply::new(
                Fp32BitPrime::from_u128(3),
                Fp32BitPrime::from_u128(5),
                triple,
                "p0".to_string(),
            )
        })
        .collect();
    Box::new(Batch::of(siblings))
}

async fn run_batch_multiply(count: usize) {
    let mut rng = thread_rng();
    let info = BeaverInfo::<Fp32BitPrime>::new();
    let dealt: Vec<Vec<BeaverTriple<Fp32BitPrime>>> =
        (0..count).map(|_| info.generate(&mut rng, 2)).collect();
    let party0_triples: Vec<_> = dealt.iter().map(|shares| shares[0]).collect();
    let party1_triples: Vec<_> = dealt.iter().map(|shares| shares[1]).collect();

    let roots: Vec<(String, Box<dyn Fronctocol<String>>)> = vec![
        ("p0".to_string(), batch_multiply_root(&party0_triples)),
        ("p1".to_string(), batch_multiply_root(&party1_triples)),
    ];
    for result in TestWorld::run(roots).await {
        result.expect("batch multiply should complete without error");
    }
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let rt = Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("fronctocol-worker")
        .enable_time()
        .build()
        .expect("creating runtime failed");

    let mut group = c.benchmark_group("multiply");
    group.sample_size(10);
    group.sampling_mode(SamplingMode::Flat);

    for count in [1usize, 10, 100, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("batch", count), &count, |b, &count| {
            b.to_async(&rt).iter(|| run_batch_multiply(black_box(count)));
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
