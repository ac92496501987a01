//! Three parties multiply two secret-shared values with one Beaver
//! triple, end to end through the engine.

#![cfg(feature = "test-fixture")]

use fronctocol::engine::Fronctocol;
use fronctocol::ff::{Field, Fp31BitMersenne};
use fronctocol::protocol::multiply::{self, Multiply};
use fronctocol::randomness::kinds::{BeaverInfo, RandomnessInfo};
use fronctocol::test_fixture::{local_deal, TestWorld};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[tokio::test]
async fn three_party_multiply_reconstructs_the_product() {
    let mut rng = StdRng::seed_from_u64(42);
    let parties = ["alice", "bob", "chelsea"];
    let revealer = "alice".to_string();

    let x_shares = local_deal::additive_shares(&mut rng, Fp31BitMersenne::from_u128(7), 3);
    let y_shares = local_deal::additive_shares(&mut rng, Fp31BitMersenne::from_u128(11), 3);
    let triples = BeaverInfo::<Fp31BitMersenne>::new().generate(&mut rng, 3);

    let roots: Vec<(String, Box<dyn Fronctocol<String>>)> = parties
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let root: Box<dyn Fronctocol<String>> = Box::new(Multiply::new(
                x_shares[i],
                y_shares[i],
                triples[i],
                revealer.clone(),
            ));
            (name.to_string(), root)
        })
        .collect();

    let mut total = Fp31BitMersenne::ZERO;
    for result in TestWorld::run(roots).await {
        let share = result
            .expect("every engine closes cleanly")
            .and_then(multiply::downcast::<Fp31BitMersenne>)
            .expect("Multiply produces a product share");
        total += share;
    }
    assert_eq!(total, Fp31BitMersenne::from_u128(77));
}

#[tokio::test]
async fn multiply_is_correct_over_many_random_inputs() {
    let mut rng = StdRng::seed_from_u64(43);
    for _ in 0..10 {
        let x = Fp31BitMersenne::random(&mut rng);
        let y = Fp31BitMersenne::random(&mut rng);
        let x_shares = local_deal::additive_shares(&mut rng, x, 3);
        let y_shares = local_deal::additive_shares(&mut rng, y, 3);
        let triples = BeaverInfo::<Fp31BitMersenne>::new().generate(&mut rng, 3);

        let roots: Vec<(String, Box<dyn Fronctocol<String>>)> = (0..3)
            .map(|i| {
                let root: Box<dyn Fronctocol<String>> = Box::new(Multiply::new(
                    x_shares[i],
                    y_shares[i],
                    triples[i],
                    "p0".to_string(),
                ));
                (format!("p{i}"), root)
            })
            .collect();

        let mut total = Fp31BitMersenne::ZERO;
        for result in TestWorld::run(roots).await {
            total += result
                .expect("every engine closes cleanly")
                .and_then(multiply::downcast::<Fp31BitMersenne>)
                .expect("Multiply produces a product share");
        }
        assert_eq!(total, x * y);
    }
}
