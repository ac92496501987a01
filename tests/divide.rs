//! Secret-shared restoring division end to end.

#![cfg(feature = "test-fixture")]

use fronctocol::engine::Fronctocol;
use fronctocol::ff::{Field, Fp11, Fp97};
use fronctocol::protocol::compare::CompareInfo;
use fronctocol::protocol::divide::{self, Divide};
use fronctocol::test_fixture::{local_deal, TestWorld};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

async fn run_divide(dividend: u128, divisor: u128, ell: usize, seed: u64) -> u128 {
    let mut rng = StdRng::seed_from_u64(seed);
    let info = Arc::new(CompareInfo::<String, Fp97, Fp11>::new("p0".to_string()));

    let dividend_shares = local_deal::additive_shares(&mut rng, Fp97::from_u128(dividend), 3);
    let divisor_shares = local_deal::additive_shares(&mut rng, Fp97::from_u128(divisor), 3);
    let mut per_party_rounds: Vec<Vec<_>> = vec![Vec::new(), Vec::new(), Vec::new()];
    for _ in 0..ell {
        for (party, bundle) in per_party_rounds
            .iter_mut()
            .zip(local_deal::divide_randomness(&mut rng, &info, 3))
        {
            party.push(bundle);
        }
    }

    let roots: Vec<(String, Box<dyn Fronctocol<String>>)> = per_party_rounds
        .into_iter()
        .enumerate()
        .map(|(i, rounds)| {
            let root: Box<dyn Fronctocol<String>> = Box::new(Divide::new(
                dividend_shares[i],
                divisor_shares[i],
                Arc::clone(&info),
                rounds,
            ));
            (format!("p{i}"), root)
        })
        .collect();

    let mut total = Fp97::ZERO;
    for result in TestWorld::run(roots).await {
        total += result
            .expect("every engine closes cleanly")
            .and_then(divide::downcast::<Fp97>)
            .expect("Divide produces a quotient share");
    }
    total.as_u128()
}

#[tokio::test]
async fn thirteen_over_four_is_three() {
    assert_eq!(run_divide(13, 4, 3, 51).await, 3);
}

#[tokio::test]
async fn exact_division_has_no_remainder_loss() {
    assert_eq!(run_divide(24, 6, 3, 52).await, 4);
}

#[tokio::test]
async fn dividend_smaller_than_divisor_gives_zero() {
    assert_eq!(run_divide(3, 7, 3, 53).await, 0);
}
