//! Deals composite randomness bundles locally, splitting each freshly
//! sampled secret into one share bundle per party, so a test can hand a
//! protocol its randomness directly instead of standing up a dealer
//! party and its patron chain. The counts and shapes mirror what the
//! real patrons assemble.

use crate::ff::{Field, Gf2};
use crate::peers::Identity;
use crate::protocol::compare::bitwise_compare::BitwiseCompareRandomness;
use crate::protocol::compare::compare::{CompareInfo, CompareRandomness};
use crate::protocol::compare::pos_int_compare::PosIntCompareRandomness;
use crate::protocol::compare::prefix_or::{PrefixOrInfo, PrefixOrRandomness};
use crate::protocol::divide::DivideRandomness;
use crate::protocol::modulus_conversion::{ModConvUpInfo, ModConvUpRandomness};
use crate::randomness::dispenser::Dispenser;
use crate::randomness::kinds::{
    BeaverInfo, BeaverTriple, DecomposedBitSetInfo, ExponentSeriesInfo, ModConvUpAuxInfo,
    RandomnessInfo, TypeCastFromBitInfo, TypeCastInfo, TypeCastTriple,
};
use rand::Rng;

/// One dispenser of `count` freshly dealt units per party.
pub fn dispensers<Info: RandomnessInfo, R: Rng + ?Sized>(
    rng: &mut R,
    info: &Info,
    count: usize,
    n_parties: usize,
) -> Vec<Dispenser<Info::Rand>> {
    let mut out: Vec<Dispenser<Info::Rand>> =
        (0..n_parties).map(|_| Dispenser::new(Info::LABEL)).collect();
    for _ in 0..count {
        for (dispenser, share) in out.iter_mut().zip(info.generate(rng, n_parties)) {
            dispenser.insert(share);
        }
    }
    out
}

fn draws<T>(per_party: &mut [Dispenser<T>]) -> Vec<T> {
    per_party
        .iter_mut()
        .map(|d| d.draw().expect("locally dealt exactly enough"))
        .collect()
}

/// One [`PrefixOrRandomness`] per party.
pub fn prefix_or_randomness<I: Identity, S: Field, R: Rng + ?Sized>(
    rng: &mut R,
    info: &PrefixOrInfo<I, S>,
    n_parties: usize,
) -> Vec<PrefixOrRandomness<S>> {
    let needs = info.fanin_or_needs();
    let beavers_each = 2 * info.ell + needs.len();
    let mut series_per_need: Vec<Vec<_>> = needs
        .iter()
        .map(|&ell| ExponentSeriesInfo::<S>::new(ell).generate(rng, n_parties))
        .collect();
    let mut beaver_pools = dispensers(rng, &BeaverInfo::<S>::new(), beavers_each, n_parties);
    (0..n_parties)
        .map(|party| PrefixOrRandomness {
            exponent_series: series_per_need
                .iter_mut()
                .map(|shares| std::mem::take(&mut shares[party]))
                .collect(),
            multiply: std::mem::replace(&mut beaver_pools[party], Dispenser::new("spent")),
        })
        .collect()
}

/// One [`BitwiseCompareRandomness`] per party.
pub fn bitwise_compare_randomness<I: Identity, S: Field, R: Rng + ?Sized>(
    rng: &mut R,
    info: &PrefixOrInfo<I, S>,
    n_parties: usize,
) -> Vec<BitwiseCompareRandomness<S>> {
    let prefixes = prefix_or_randomness(rng, info, n_parties);
    let beaver_lt = BeaverInfo::<S>::new().generate(rng, n_parties);
    let beaver_eq = BeaverInfo::<S>::new().generate(rng, n_parties);
    let tct_lt = TypeCastInfo::<S>::new().generate(rng, n_parties);
    let tct_eq = TypeCastInfo::<S>::new().generate(rng, n_parties);
    prefixes
        .into_iter()
        .enumerate()
        .map(|(party, prefix)| BitwiseCompareRandomness {
            prefix,
            beaver_lt: beaver_lt[party],
            tct_lt: tct_lt[party],
            beaver_eq: beaver_eq[party],
            tct_eq: tct_eq[party],
        })
        .collect()
}

/// One [`CompareRandomness`] per party.
pub fn compare_randomness<I: Identity, P: Field, S: Field, R: Rng + ?Sized>(
    rng: &mut R,
    info: &CompareInfo<I, P, S>,
    n_parties: usize,
) -> Vec<CompareRandomness<P, S>> {
    let needs = info.fanin_or_needs();
    let mut series_per_need: Vec<Vec<_>> = needs
        .iter()
        .map(|&ell| ExponentSeriesInfo::<S>::new(ell).generate(rng, n_parties))
        .collect();
    let mut beaver_pools = dispensers(
        rng,
        &BeaverInfo::<S>::new(),
        info.beaver_triples_per_compare(),
        n_parties,
    );
    let tct_lt = TypeCastInfo::<S>::new().generate(rng, n_parties);
    let tct_eq = TypeCastInfo::<S>::new().generate(rng, n_parties);
    let dbs = DecomposedBitSetInfo::<P, S>::new(info.ell).generate(rng, n_parties);
    let mut dbs = dbs.into_iter();
    (0..n_parties)
        .map(|party| CompareRandomness {
            exponent_series: series_per_need
                .iter_mut()
                .map(|shares| std::mem::take(&mut shares[party]))
                .collect(),
            multiply: std::mem::replace(&mut beaver_pools[party], Dispenser::new("spent")),
            tct_lt: tct_lt[party],
            tct_eq: tct_eq[party],
            dbs: dbs.next().expect("one per party"),
        })
        .collect()
}

/// One [`PosIntCompareRandomness`] per party.
pub fn pos_int_compare_randomness<I: Identity, P: Field, S: Field, R: Rng + ?Sized>(
    rng: &mut R,
    info: &CompareInfo<I, P, S>,
    n_parties: usize,
) -> Vec<PosIntCompareRandomness<P, S>> {
    let compares = compare_randomness(rng, info, n_parties);
    let booleans = BeaverInfo::<Gf2>::new().generate(rng, n_parties);
    compares
        .into_iter()
        .zip(booleans)
        .map(|(compare, boolean_beaver)| PosIntCompareRandomness {
            compare,
            boolean_beaver,
        })
        .collect()
}

/// One [`ModConvUpRandomness`] per party.
pub fn mod_conv_up_randomness<I: Identity, S: Field, M: Field, P: Field, R: Rng + ?Sized>(
    rng: &mut R,
    info: &ModConvUpInfo<I, S, M, P>,
    n_parties: usize,
) -> Vec<ModConvUpRandomness<S, M, P>> {
    let first = bitwise_compare_randomness(rng, &info.prefix, n_parties);
    let second = bitwise_compare_randomness(rng, &info.prefix, n_parties);
    let tct_medium: Vec<TypeCastTriple<P>> =
        TypeCastFromBitInfo::<P>::new().generate(rng, n_parties);
    let tct_large = TypeCastFromBitInfo::<P>::new().generate(rng, n_parties);
    let tct_and = TypeCastFromBitInfo::<P>::new().generate(rng, n_parties);
    let xor_first = BeaverInfo::<Gf2>::new().generate(rng, n_parties);
    let xor_second = BeaverInfo::<Gf2>::new().generate(rng, n_parties);
    let aux = ModConvUpAuxInfo::<S, M, P>::new().generate(rng, n_parties);
    first
        .into_iter()
        .zip(second)
        .zip(aux)
        .enumerate()
        .map(|(party, ((bitwise_first, bitwise_second), aux))| ModConvUpRandomness {
            bitwise_first,
            bitwise_second,
            tct_medium_carry: tct_medium[party],
            tct_large_carry: tct_large[party],
            tct_and: tct_and[party],
            xor_beaver_first: xor_first[party],
            xor_beaver_second: xor_second[party],
            aux,
        })
        .collect()
}

/// One per-round [`DivideRandomness`] per party.
pub fn divide_randomness<I: Identity, P: Field, S: Field, R: Rng + ?Sized>(
    rng: &mut R,
    info: &CompareInfo<I, P, S>,
    n_parties: usize,
) -> Vec<DivideRandomness<P, S>> {
    let pos_ints = pos_int_compare_randomness(rng, info, n_parties);
    let lifts = TypeCastFromBitInfo::<P>::new().generate(rng, n_parties);
    let beavers: Vec<BeaverTriple<P>> = BeaverInfo::<P>::new().generate(rng, n_parties);
    pos_ints
        .into_iter()
        .enumerate()
        .map(|(party, pos_int)| DivideRandomness {
            pos_int,
            lift_tct: lifts[party],
            beaver: beavers[party],
        })
        .collect()
}

/// Splits `secret` into `n` additive shares.
pub fn additive_shares<F: Field, R: Rng + ?Sized>(rng: &mut R, secret: F, n: usize) -> Vec<F> {
    let mut shares: Vec<F> = (0..n - 1).map(|_| F::random(rng)).collect();
    let partial = shares.iter().fold(F::ZERO, |acc, &s| acc + s);
    shares.push(secret - partial);
    shares
}
