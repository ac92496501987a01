//! Three-party comparison truth table: the XOR of every party's two-bit
//! output is 0 for less-than, 1 for greater-than, 2 for equality.

#![cfg(feature = "test-fixture")]

use fronctocol::engine::Fronctocol;
use fronctocol::ff::{Fp11, Fp97};
use fronctocol::protocol::compare::{self, Compare, CompareInfo};
use fronctocol::test_fixture::{local_deal, TestWorld};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

async fn run_compare(x_shares: [u128; 3], y_shares: [u128; 3], seed: u64) -> u8 {
    let mut rng = StdRng::seed_from_u64(seed);
    let info = Arc::new(CompareInfo::<String, Fp97, Fp11>::new("p0".to_string()));
    let randomness = local_deal::compare_randomness(&mut rng, &info, 3);

    let roots: Vec<(String, Box<dyn Fronctocol<String>>)> = randomness
        .into_iter()
        .enumerate()
        .map(|(i, bundle)| {
            let root: Box<dyn Fronctocol<String>> = Box::new(Compare::new(
                Fp97::from_u128(x_shares[i]),
                Fp97::from_u128(y_shares[i]),
                Arc::clone(&info),
                bundle,
            ));
            (format!("p{i}"), root)
        })
        .collect();

    let mut outcome = 0_u8;
    for result in TestWorld::run(roots).await {
        let output = result
            .expect("every engine closes cleanly")
            .and_then(compare::compare::downcast)
            .expect("Compare produces its two-bit outcome");
        outcome ^= output.as_u8();
    }
    outcome
}

use fronctocol::ff::Field;

#[tokio::test]
async fn less_than_reconstructs_to_zero() {
    // 30 + 35 + 40 = 105 = 8 mod 97; 59 + 82 + 66 = 207 = 13 mod 97.
    assert_eq!(run_compare([30, 35, 40], [59, 82, 66], 7).await, 0);
}

#[tokio::test]
async fn greater_than_reconstructs_to_one() {
    // x = 8 as above; 1 + 2 + 4 = 7.
    assert_eq!(run_compare([30, 35, 40], [1, 2, 4], 8).await, 1);
}

#[tokio::test]
async fn equality_reconstructs_to_two() {
    // Both sides share 8.
    assert_eq!(run_compare([30, 35, 40], [30, 35, 40], 9).await, 2);
}

#[tokio::test]
async fn truth_table_holds_over_random_operands() {
    let mut rng = StdRng::seed_from_u64(10);
    for round in 0..6 {
        let x = rand::Rng::gen_range(&mut rng, 0..48_u128);
        let y = rand::Rng::gen_range(&mut rng, 0..48_u128);
        let x_shares = local_deal::additive_shares(&mut rng, Fp97::from_u128(x), 3);
        let y_shares = local_deal::additive_shares(&mut rng, Fp97::from_u128(y), 3);
        let outcome = run_compare(
            [x_shares[0].as_u128(), x_shares[1].as_u128(), x_shares[2].as_u128()],
            [y_shares[0].as_u128(), y_shares[1].as_u128(), y_shares[2].as_u128()],
            100 + round,
        )
        .await;
        let expected = match x.cmp(&y) {
            std::cmp::Ordering::Less => 0,
            std::cmp::Ordering::Greater => 1,
            std::cmp::Ordering::Equal => 2,
        };
        assert_eq!(outcome, expected, "x={x}, y={y}");
    }
}
