//! Lifting a share from the medium field into the large field without
//! changing the shared value.

#![cfg(feature = "test-fixture")]

use fronctocol::engine::Fronctocol;
use fronctocol::ff::{Field, Fp11, Fp97};
use fronctocol::protocol::modulus_conversion::{self, ModConvUp, ModConvUpInfo};
use fronctocol::test_fixture::{local_deal, TestWorld};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

async fn convert(shares: [u128; 3], seed: u64) -> u128 {
    let mut rng = StdRng::seed_from_u64(seed);
    let info = Arc::new(ModConvUpInfo::<String, Fp11, Fp11, Fp97>::new("p0".to_string()));
    let randomness = local_deal::mod_conv_up_randomness(&mut rng, &info, 3);

    let roots: Vec<(String, Box<dyn Fronctocol<String>>)> = randomness
        .into_iter()
        .enumerate()
        .map(|(i, bundle)| {
            let root: Box<dyn Fronctocol<String>> = Box::new(ModConvUp::new(
                Fp11::from_u128(shares[i]),
                Arc::clone(&info),
                bundle,
            ));
            (format!("p{i}"), root)
        })
        .collect();

    let mut total = Fp97::ZERO;
    for result in TestWorld::run(roots).await {
        total += result
            .expect("every engine closes cleanly")
            .and_then(modulus_conversion::downcast::<Fp97>)
            .expect("ModConvUp produces a large-field share");
    }
    total.as_u128()
}

#[tokio::test]
async fn converted_shares_keep_the_value() {
    // 4 + 9 + 5 = 18 = 7 mod 11; the lifted shares must sum to 7 mod 97.
    assert_eq!(convert([4, 9, 5], 31).await, 7);
}

#[tokio::test]
async fn conversion_is_correct_for_every_medium_value() {
    let mut rng = StdRng::seed_from_u64(32);
    for value in 0..11_u128 {
        let shares = local_deal::additive_shares(&mut rng, Fp11::from_u128(value), 3);
        let lifted = convert(
            [shares[0].as_u128(), shares[1].as_u128(), shares[2].as_u128()],
            1000 + value as u64,
        )
        .await;
        assert_eq!(lifted, value, "value={value}");
    }
}
