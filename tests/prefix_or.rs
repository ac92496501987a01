//! Three-party prefix-OR over a shared bit vector.

#![cfg(feature = "test-fixture")]

use fronctocol::engine::Fronctocol;
use fronctocol::ff::{Field, Fp97};
use fronctocol::protocol::compare::prefix_or::{self, PrefixOr, PrefixOrInfo};
use fronctocol::test_fixture::{local_deal, TestWorld};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

async fn run_prefix_or(bits: &[u128], seed: u64) -> Vec<u128> {
    let mut rng = StdRng::seed_from_u64(seed);
    let info = Arc::new(PrefixOrInfo::<String, Fp97>::new(bits.len(), "p0".to_string()));
    let randomness = local_deal::prefix_or_randomness(&mut rng, &info, 3);

    let mut per_party_inputs: Vec<Vec<Fp97>> = vec![Vec::new(); 3];
    for &bit in bits {
        for (party, share) in per_party_inputs
            .iter_mut()
            .zip(local_deal::additive_shares(&mut rng, Fp97::from_u128(bit), 3))
        {
            party.push(share);
        }
    }

    let roots: Vec<(String, Box<dyn Fronctocol<String>>)> = randomness
        .into_iter()
        .zip(per_party_inputs)
        .enumerate()
        .map(|(i, (bundle, inputs))| {
            let root: Box<dyn Fronctocol<String>> =
                Box::new(PrefixOr::new(inputs, Arc::clone(&info), bundle));
            (format!("p{i}"), root)
        })
        .collect();

    let mut totals = vec![Fp97::ZERO; bits.len()];
    for result in TestWorld::run(roots).await {
        let shares = result
            .expect("every engine closes cleanly")
            .and_then(prefix_or::downcast::<Fp97>)
            .expect("PrefixOr produces one share per bit");
        for (total, share) in totals.iter_mut().zip(shares) {
            *total += share;
        }
    }
    totals.into_iter().map(Field::as_u128).collect()
}

#[tokio::test]
async fn prefixes_become_sticky_after_the_first_set_bit() {
    let result = run_prefix_or(&[0, 0, 0, 1, 1, 0, 0], 11).await;
    assert_eq!(result, vec![0, 0, 0, 1, 1, 1, 1]);
}

#[tokio::test]
async fn all_zero_input_stays_all_zero() {
    let result = run_prefix_or(&[0, 0, 0, 0, 0, 0, 0], 12).await;
    assert_eq!(result, vec![0; 7]);
}

#[tokio::test]
async fn leading_one_saturates_immediately() {
    let result = run_prefix_or(&[1, 0, 0, 1, 0, 0, 0], 13).await;
    assert_eq!(result, vec![1; 7]);
}
