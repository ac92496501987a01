//! The full shuffle-then-sort pipeline across three dataowners and a
//! dealer: the reconstructed output must be the same multiset of rows,
//! reordered so the keys ascend, with every satellite column still
//! riding alongside its key.

#![cfg(feature = "test-fixture")]

use fronctocol::engine::Fronctocol;
use fronctocol::ff::{Field, Fp11, Fp97, Gf2};
use fronctocol::protocol::sort::dealer::SisoSortRandomnessHouse;
use fronctocol::protocol::sort::observation::{Observation, ObservationList};
use fronctocol::protocol::sort::siso_sort::{self, SisoSort};
use fronctocol::test_fixture::{local_deal, TestWorld};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

const ROWS: usize = 25;

fn shared_lists(rng: &mut StdRng, keys: &[u128]) -> Vec<ObservationList<Fp97>> {
    let mut per_party: Vec<Vec<Observation<Fp97>>> = vec![Vec::new(), Vec::new(), Vec::new()];
    for &key in keys {
        let key_shares = local_deal::additive_shares(rng, Fp97::from_u128(key), 3);
        // One arithmetic satellite column derived from the key, and one
        // boolean column carrying its parity, so misrouted payloads are
        // caught.
        let payload_shares = local_deal::additive_shares(rng, Fp97::from_u128(key * 2 + 1), 3);
        let parity_shares = local_deal::additive_shares(rng, Gf2::from_bool(key % 2 == 1), 3);
        for (party, ((key_share, payload_share), parity_share)) in key_shares
            .into_iter()
            .zip(payload_shares)
            .zip(parity_shares)
            .enumerate()
        {
            per_party[party].push(Observation {
                key_cols: vec![key_share],
                arithmetic_payload_cols: vec![payload_share],
                xor_payload_cols: vec![parity_share],
            });
        }
    }
    per_party
        .into_iter()
        .map(|elements| ObservationList::new(1, 1, 1, elements))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn four_party_sort_orders_a_permuted_key_column() {
    let mut rng = StdRng::seed_from_u64(61);
    let mut keys: Vec<u128> = (0..ROWS as u128).collect();
    keys.shuffle(&mut rng);
    let lists = shared_lists(&mut rng, &keys);

    let revealer = "p0".to_string();
    let mut roots: Vec<(String, Box<dyn Fronctocol<String>>)> = lists
        .into_iter()
        .enumerate()
        .map(|(i, list)| {
            let root: Box<dyn Fronctocol<String>> = Box::new(SisoSort::<String, Fp97, Fp11>::new(
                list,
                revealer.clone(),
                "dealer".to_string(),
            ));
            (format!("p{i}"), root)
        })
        .collect();
    roots.push((
        "dealer".to_string(),
        Box::new(SisoSortRandomnessHouse::<String, Fp97, Fp11>::new(revealer)),
    ));

    let mut sorted_lists = Vec::new();
    for (party, result) in TestWorld::run(roots).await.into_iter().enumerate() {
        let result = result.expect("every engine closes cleanly");
        if party < 3 {
            sorted_lists.push(
                result
                    .and_then(siso_sort::downcast::<Fp97>)
                    .expect("each dataowner ends with the sorted list"),
            );
        }
    }

    for list in &sorted_lists {
        assert_eq!(list.elements.len(), ROWS);
    }
    for row in 0..ROWS {
        let key = sorted_lists
            .iter()
            .fold(Fp97::ZERO, |acc, list| acc + list.elements[row].key_cols[0]);
        let payload = sorted_lists.iter().fold(Fp97::ZERO, |acc, list| {
            acc + list.elements[row].arithmetic_payload_cols[0]
        });
        let parity = sorted_lists.iter().fold(Gf2::ZERO, |acc, list| {
            acc + list.elements[row].xor_payload_cols[0]
        });
        assert_eq!(key.as_u128(), row as u128, "keys ascend 0..{ROWS}");
        assert_eq!(payload.as_u128(), row as u128 * 2 + 1, "payload rides its key");
        assert_eq!(parity.as_bool(), row % 2 == 1, "xor column rides its key");
    }
}
