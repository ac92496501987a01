//! The dealer exchange itself: one dealer party runs a `House`, every
//! other party a `Patron`, and the dispensers the patrons end up with
//! hold shares that reconstruct valid randomness.

#![cfg(feature = "test-fixture")]

use fronctocol::engine::Fronctocol;
use fronctocol::ff::{Field, Fp97, Gf2};
use fronctocol::randomness::dealer::{downcast_dispenser, House, Patron};
use fronctocol::randomness::kinds::{BeaverInfo, BeaverTriple, ExponentSeries, ExponentSeriesInfo};
use fronctocol::test_fixture::TestWorld;

#[tokio::test]
async fn dealt_beaver_triples_reconstruct_to_products() {
    const COUNT: u64 = 40;
    let mut roots: Vec<(String, Box<dyn Fronctocol<String>>)> = vec![(
        "dealer".to_string(),
        Box::new(House::<String, BeaverInfo<Fp97>>::new()),
    )];
    for i in 0..3 {
        roots.push((
            format!("p{i}"),
            Box::new(Patron::new(
                "dealer".to_string(),
                COUNT,
                BeaverInfo::<Fp97>::new(),
            )),
        ));
    }

    let mut dispensers = Vec::new();
    for (party, result) in TestWorld::run(roots).await.into_iter().enumerate() {
        let result = result.expect("every engine closes cleanly");
        if party == 0 {
            assert!(result.is_none(), "the house carries no result");
        } else {
            dispensers.push(
                result
                    .and_then(downcast_dispenser::<BeaverTriple<Fp97>>)
                    .expect("each patron ends with a dispenser"),
            );
        }
    }

    for dispenser in &dispensers {
        assert_eq!(dispenser.len(), COUNT as usize);
    }
    for _ in 0..COUNT {
        let shares: Vec<BeaverTriple<Fp97>> = dispensers
            .iter_mut()
            .map(|d| d.draw().expect("counted above"))
            .collect();
        let a = shares.iter().fold(Fp97::ZERO, |acc, s| acc + s.a);
        let b = shares.iter().fold(Fp97::ZERO, |acc, s| acc + s.b);
        let c = shares.iter().fold(Fp97::ZERO, |acc, s| acc + s.c);
        assert_eq!(a * b, c);
    }
}

#[tokio::test]
async fn patrons_disagreeing_on_count_get_the_maximum() {
    let mut roots: Vec<(String, Box<dyn Fronctocol<String>>)> = vec![(
        "dealer".to_string(),
        Box::new(House::<String, ExponentSeriesInfo<Fp97>>::new()),
    )];
    for (i, count) in [3_u64, 9].into_iter().enumerate() {
        roots.push((
            format!("p{i}"),
            Box::new(Patron::new(
                "dealer".to_string(),
                count,
                ExponentSeriesInfo::<Fp97>::new(4),
            )),
        ));
    }

    for (party, result) in TestWorld::run(roots).await.into_iter().enumerate() {
        let result = result.expect("every engine closes cleanly");
        if party > 0 {
            let dispenser = result
                .and_then(downcast_dispenser::<ExponentSeries<Fp97>>)
                .expect("each patron ends with a dispenser");
            assert_eq!(dispenser.len(), 9, "escalated to the larger request");
        }
    }
}

#[tokio::test]
async fn boolean_triples_flow_through_the_same_exchange() {
    let mut roots: Vec<(String, Box<dyn Fronctocol<String>>)> = vec![(
        "dealer".to_string(),
        Box::new(House::<String, BeaverInfo<Gf2>>::new()),
    )];
    for i in 0..2 {
        roots.push((
            format!("p{i}"),
            Box::new(Patron::new(
                "dealer".to_string(),
                16,
                BeaverInfo::<Gf2>::new(),
            )),
        ));
    }

    let mut dispensers = Vec::new();
    for (party, result) in TestWorld::run(roots).await.into_iter().enumerate() {
        let result = result.expect("every engine closes cleanly");
        if party > 0 {
            dispensers.push(
                result
                    .and_then(downcast_dispenser::<BeaverTriple<Gf2>>)
                    .expect("each patron ends with a dispenser"),
            );
        }
    }
    for _ in 0..16 {
        let shares: Vec<BeaverTriple<Gf2>> = dispensers
            .iter_mut()
            .map(|d| d.draw().expect("dealt exactly sixteen"))
            .collect();
        let a = shares.iter().fold(Gf2::ZERO, |acc, s| acc + s.a);
        let b = shares.iter().fold(Gf2::ZERO, |acc, s| acc + s.b);
        let c = shares.iter().fold(Gf2::ZERO, |acc, s| acc + s.c);
        assert_eq!(a & b, c);
    }
}
