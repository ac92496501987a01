//! End-to-end check that a value additively shared across several parties
//! reveals to the correct sum when driven through the real engine, not
//! just through a protocol's handlers called directly.

#![cfg(feature = "test-fixture")]

use fronctocol::engine::Fronctocol;
use fronctocol::ff::{Field, Fp31};
use fronctocol::protocol::reveal::{self, Reveal};
use fronctocol::test_fixture::TestWorld;

fn additive_shares(secret: Fp31, n: usize) -> Vec<Fp31> {
    let mut shares: Vec<Fp31> = (1..n).map(|i| Fp31::from_u128(i as u128 * 7 + 3)).collect();
    let partial: Fp31 = shares.iter().fold(Fp31::ZERO, |acc, &s| acc + s);
    shares.insert(0, secret - partial);
    shares
}

async fn run_and_reveal(secret: Fp31, parties: Vec<String>) {
    let shares = additive_shares(secret, parties.len());
    let revealer = parties[0].clone();
    let roots: Vec<(String, Box<dyn Fronctocol<String>>)> = parties
        .into_iter()
        .zip(shares)
        .map(|(id, share)| {
            let root: Box<dyn Fronctocol<String>> =
                Box::new(Reveal::<String, Fp31>::new(share, revealer.clone()));
            (id, root)
        })
        .collect();

    for result in TestWorld::run(roots).await {
        let revealed = result.expect("every party's engine should close without error");
        let revealed = revealed.expect("Reveal always carries a result once it closes");
        let revealed = reveal::downcast::<Fp31>(revealed).expect("Reveal produces an Fp31");
        assert_eq!(revealed, secret);
    }
}

#[tokio::test]
async fn three_party_sum_reveals_correctly() {
    let parties = vec!["p0".to_string(), "p1".to_string(), "p2".to_string()];
    run_and_reveal(Fp31::from_u128(19), parties).await;
}

#[tokio::test]
async fn five_party_sum_reveals_correctly() {
    let parties: Vec<String> = (0..5).map(|i| format!("party-{i}")).collect();
    run_and_reveal(Fp31::from_u128(4), parties).await;
}
