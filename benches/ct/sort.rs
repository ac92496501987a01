use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use fronctocol::engine::Fronctocol;
use fronctocol::ff::{Field, Fp32BitPrime, Gf2};
use fronctocol::protocol::sort::observation::{Observation, ObservationList};
use fronctocol::protocol::sort::waksman::WaksmanShuffle;
use fronctocol::randomness::dispenser::Dispenser;
use fronctocol::randomness::kinds::{BeaverInfo, RandomnessInfo, WaksmanInfo};
use fronctocol::test_fixture::TestWorld;
use rand::thread_rng;
use tokio::runtime::Builder;

const PARTIES: usize = 2;

/// Deals one kind of Beaver triple locally and splits the shares into
/// one pre-filled dispenser per party, sidestepping a networked dealer
/// round so the benchmark times only the shuffle itself.
fn deal_dispensers<F: Field>(count: usize) -> Vec<Dispenser<fronctocol::randomness::kinds::BeaverTriple<F>>> {
    let mut rng = thread_rng();
    let info = BeaverInfo::<F>::new();
    let mut dispensers: Vec<_> = (0..PARTIES).map(|_| Dispenser::new("bench")).collect();
    for _ in 0..count {
        for (dispenser, share) in dispensers.iter_mut().zip(info.generate(&mut rng, PARTIES)) {
            dispenser.insert(share);
        }
    }
    dispensers
}

async fn run_shuffle(rows: usize) {
    let d = rows.next_power_of_two().trailing_zeros().max(1) as usize;
    let info = WaksmanInfo::<Fp32BitPrime>::new(d);
    let switches = info.w_of_n;

    let mut rng = thread_rng();
    let bits = info.generate(&mut rng, PARTIES);
    let mut arith = deal_dispensers::<Fp32BitPrime>(switches).into_iter();
    let mut key = deal_dispensers::<Fp32BitPrime>(switches).into_iter();
    // One control multiply per declared xor column plus the live-row
    // marker the shuffle appends itself.
    let mut xor = deal_dispensers::<Gf2>(2 * switches).into_iter();

    let roots: Vec<(String, Box<dyn Fronctocol<String>>)> = (0..PARTIES)
        .zip(bits)
        .map(|(p, bits)| {
            let elements: Vec<Observation<Fp32BitPrime>> = (0..rows)
                .map(|i| Observation {
                    key_cols: vec![Fp32BitPrime::from_u128(i as u128)],
                    arithmetic_payload_cols: vec![Fp32BitPrime::from_u128(7)],
                    xor_payload_cols: vec![Gf2::ZERO],
                })
                .collect();
            let list = ObservationList::new(1, 1, 1, elements);
            let root: Box<dyn Fronctocol<String>> = Box::new(WaksmanShuffle::new(
                list,
                d,
                bits,
                arith.next().expect("one dispenser per party"),
                key.next().expect("one dispenser per party"),
                xor.next().expect("one dispenser per party"),
                "p0".to_string(),
            ));
            (format!("p{p}"), root)
        })
        .collect();

    for result in TestWorld::run(roots).await {
        result.expect("shuffle should complete without error");
    }
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let rt = Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("fronctocol-worker")
        .enable_time()
        .build()
        .expect("creating runtime failed");

    let mut group = c.benchmark_group("sort");
    group.sample_size(10);
    group.sampling_mode(SamplingMode::Flat);

    for rows in [4usize, 16, 64] {
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("waksman_shuffle", rows), &rows, |b, &rows| {
            b.to_async(&rt).iter(|| run_shuffle(black_box(rows)));
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
