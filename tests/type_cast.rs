//! Casting a shared bit between arithmetic and XOR representations,
//! end to end in both directions.

#![cfg(feature = "test-fixture")]

use fronctocol::engine::Fronctocol;
use fronctocol::ff::{Field, Fp97, Gf2};
use fronctocol::protocol::type_cast::{self, TypeCast, TypeCastFromBit};
use fronctocol::randomness::kinds::{BeaverInfo, RandomnessInfo, TypeCastFromBitInfo, TypeCastInfo};
use fronctocol::test_fixture::{local_deal, TestWorld};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[tokio::test]
async fn arithmetic_bit_casts_to_the_same_xor_bit() {
    let mut rng = StdRng::seed_from_u64(21);
    // 29 + 33 + 36 = 98 = 1 mod 97.
    let shares = [29_u128, 33, 36].map(Fp97::from_u128);
    let beavers = BeaverInfo::<Fp97>::new().generate(&mut rng, 3);
    let tcts = TypeCastInfo::<Fp97>::new().generate(&mut rng, 3);

    let roots: Vec<(String, Box<dyn Fronctocol<String>>)> = (0..3)
        .map(|i| {
            let root: Box<dyn Fronctocol<String>> = Box::new(TypeCast::new(
                shares[i],
                "p0".to_string(),
                beavers[i],
                tcts[i],
            ));
            (format!("p{i}"), root)
        })
        .collect();

    let mut xor = Gf2::ZERO;
    for result in TestWorld::run(roots).await {
        xor += result
            .expect("every engine closes cleanly")
            .and_then(type_cast::downcast::<Gf2>)
            .expect("TypeCast produces an XOR share");
    }
    assert_eq!(xor, Gf2::ONE);
}

#[tokio::test]
async fn xor_bit_casts_to_the_same_arithmetic_bit() {
    let mut rng = StdRng::seed_from_u64(22);
    for bit in [false, true] {
        let bit_shares = local_deal::additive_shares(&mut rng, Gf2::from_bool(bit), 3);
        let tcts = TypeCastFromBitInfo::<Fp97>::new().generate(&mut rng, 3);

        let roots: Vec<(String, Box<dyn Fronctocol<String>>)> = (0..3)
            .map(|i| {
                let root: Box<dyn Fronctocol<String>> = Box::new(TypeCastFromBit::<String, Fp97>::new(
                    bit_shares[i],
                    "p0".to_string(),
                    tcts[i],
                ));
                (format!("p{i}"), root)
            })
            .collect();

        let mut total = Fp97::ZERO;
        for result in TestWorld::run(roots).await {
            total += result
                .expect("every engine closes cleanly")
                .and_then(type_cast::downcast::<Fp97>)
                .expect("TypeCastFromBit produces an arithmetic share");
        }
        assert_eq!(total.as_u128(), u128::from(bit), "bit={bit}");
    }
}
