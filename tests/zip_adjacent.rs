//! Neighbour zip: payloads of adjacent rows survive exactly when their
//! keys match, and the local reduction folds each surviving pair.

#![cfg(feature = "test-fixture")]

use fronctocol::engine::Fronctocol;
use fronctocol::ff::{Field, Fp11, Fp97, Gf2};
use fronctocol::protocol::sort::observation::{Observation, ObservationList};
use fronctocol::protocol::sort::zip::{self, zip_reduce, ZipAdjacent, ZipAdjacentInfo, ZipAdjacentRandomness};
use fronctocol::randomness::dispenser::Dispenser;
use fronctocol::randomness::kinds::{BeaverInfo, RandomnessInfo, TypeCastFromBitInfo};
use fronctocol::test_fixture::{local_deal, TestWorld};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

const PARTIES: usize = 3;

fn randomness_bundles(
    rng: &mut StdRng,
    info: &Arc<ZipAdjacentInfo<String, Fp97, Fp11>>,
) -> Vec<ZipAdjacentRandomness<Fp97, Fp11>> {
    let pairs = info.batch_size - 1;
    let mut compares: Vec<Dispenser<_>> = (0..PARTIES).map(|_| Dispenser::new("test")).collect();
    for _ in 0..pairs {
        for (dispenser, bundle) in compares
            .iter_mut()
            .zip(local_deal::compare_randomness(rng, &info.compare, PARTIES))
        {
            dispenser.insert(bundle);
        }
    }
    let mut lift_tcts: Vec<Dispenser<_>> = (0..PARTIES).map(|_| Dispenser::new("test")).collect();
    for _ in 0..pairs {
        for (dispenser, tct) in lift_tcts
            .iter_mut()
            .zip(TypeCastFromBitInfo::<Fp97>::new().generate(rng, PARTIES))
        {
            dispenser.insert(tct);
        }
    }
    let arith = local_deal::dispensers(
        rng,
        &BeaverInfo::<Fp97>::new(),
        2 * pairs * info.num_arithmetic_payload_cols,
        PARTIES,
    );
    let xor = local_deal::dispensers(
        rng,
        &BeaverInfo::<Gf2>::new(),
        2 * pairs * info.num_xor_payload_cols,
        PARTIES,
    );
    compares
        .into_iter()
        .zip(lift_tcts)
        .zip(arith)
        .zip(xor)
        .map(|(((compares, lift_tcts), arithmetic_beavers), xor_beavers)| ZipAdjacentRandomness {
            compares,
            lift_tcts,
            arithmetic_beavers,
            xor_beavers,
        })
        .collect()
}

#[tokio::test]
async fn matching_neighbours_keep_their_payloads_and_reduce() {
    let mut rng = StdRng::seed_from_u64(71);
    let info = Arc::new(ZipAdjacentInfo::<String, Fp97, Fp11>::new(3, 1, 1, "p0".to_string()));
    let bundles = randomness_bundles(&mut rng, &info);

    // Keys [5, 5, 9]: the first pair matches, the second does not.
    let keys = [5_u128, 5, 9];
    let payloads = [20_u128, 30, 40];
    let parities = [false, true, true];
    let mut per_party: Vec<Vec<Observation<Fp97>>> = vec![Vec::new(); PARTIES];
    for i in 0..3 {
        let key_shares = local_deal::additive_shares(&mut rng, Fp97::from_u128(keys[i]), PARTIES);
        let payload_shares =
            local_deal::additive_shares(&mut rng, Fp97::from_u128(payloads[i]), PARTIES);
        let parity_shares =
            local_deal::additive_shares(&mut rng, Gf2::from_bool(parities[i]), PARTIES);
        for party in 0..PARTIES {
            per_party[party].push(Observation {
                key_cols: vec![key_shares[party]],
                arithmetic_payload_cols: vec![payload_shares[party]],
                xor_payload_cols: vec![parity_shares[party]],
            });
        }
    }

    let roots: Vec<(String, Box<dyn Fronctocol<String>>)> = per_party
        .into_iter()
        .zip(bundles)
        .enumerate()
        .map(|(i, (elements, bundle))| {
            let list = ObservationList::new(1, 1, 1, elements);
            let root: Box<dyn Fronctocol<String>> =
                Box::new(ZipAdjacent::new(list, Arc::clone(&info), bundle));
            (format!("p{i}"), root)
        })
        .collect();

    let mut zipped_lists = Vec::new();
    for result in TestWorld::run(roots).await {
        zipped_lists.push(
            result
                .expect("every engine closes cleanly")
                .and_then(zip::downcast::<Fp97>)
                .expect("ZipAdjacent produces the masked pair list"),
        );
    }

    let reconstruct_arith = |row: usize, col: usize| {
        zipped_lists
            .iter()
            .fold(Fp97::ZERO, |acc, list| acc + list.elements[row].arithmetic_payload_cols[col])
            .as_u128()
    };
    let reconstruct_xor = |row: usize, col: usize| {
        zipped_lists
            .iter()
            .fold(Gf2::ZERO, |acc, list| acc + list.elements[row].xor_payload_cols[col])
            .as_bool()
    };

    // Pair 0 (rows 0 and 1, keys 5 = 5): payloads survive the masking.
    assert_eq!(reconstruct_arith(0, 0), 20);
    assert_eq!(reconstruct_arith(1, 0), 30);
    assert!(!reconstruct_xor(0, 0));
    assert!(reconstruct_xor(1, 0));
    // Pair 1 (rows 1 and 2, keys 5 != 9): both halves zeroed.
    assert_eq!(reconstruct_arith(2, 0), 0);
    assert_eq!(reconstruct_arith(3, 0), 0);
    assert!(!reconstruct_xor(2, 0));
    assert!(!reconstruct_xor(3, 0));

    // The local reduction folds each pair by addition / XOR.
    let reduced: Vec<_> = zipped_lists.iter().map(zip_reduce).collect();
    let folded = reduced
        .iter()
        .fold(Fp97::ZERO, |acc, list| acc + list.elements[0].arithmetic_payload_cols[0]);
    assert_eq!(folded.as_u128(), 50, "20 + 30 from the matching pair");
}
