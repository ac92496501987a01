//! Randomness kinds the dealer can produce and a patron can draw.
//!
//! Each kind pairs an *info* (the public shape parameters, which every
//! patron must agree on before dealing starts) with the share a single
//! party holds of one dealt unit. The info knows how to deal one fresh
//! unit and split it into `n_parties` shares whose sum (or XOR, for
//! `Gf2` pieces) reconstructs the plaintext secret.

use crate::codec::{Buffer, Cursor};
use crate::error::{Error, Result};
use crate::ff::{Field, Gf2};
use rand::Rng;
use std::fmt::Debug;
use std::marker::PhantomData;

/// The public parameters of one randomness kind. The dealer compares
/// every patron's info for equality before dealing; a disagreement is a
/// configuration error and aborts the exchange.
pub trait RandomnessInfo: Clone + PartialEq + Eq + Debug + Send + Sync + 'static {
    type Rand: Send + 'static;

    /// Short name for dispenser labels and error messages.
    const LABEL: &'static str;

    fn write(&self, buf: &mut Buffer);
    fn read(cur: &mut Cursor<'_>) -> Result<Self>;

    /// Wire size in bytes of one dealt instance, used to size batches.
    fn instance_size(&self) -> usize;

    /// Deals one fresh secret and splits it into `n_parties` shares.
    fn generate<R: Rng + ?Sized>(&self, rng: &mut R, n_parties: usize) -> Vec<Self::Rand>;

    fn write_rand(rand: &Self::Rand, buf: &mut Buffer);
    fn read_rand(&self, cur: &mut Cursor<'_>) -> Result<Self::Rand>;
}

/// Splits `total` into `n` additive shares over `F`. Works for XOR
/// sharing too, since `Gf2` addition is XOR.
pub(crate) fn split_additive<F: Field, R: Rng + ?Sized>(rng: &mut R, total: F, n: usize) -> Vec<F> {
    let mut shares = Vec::with_capacity(n);
    let mut running = F::ZERO;
    for _ in 0..n - 1 {
        let s = F::random(rng);
        running += s;
        shares.push(s);
    }
    shares.push(total - running);
    shares
}

/// Reads the modulus another party claims for a field-parameterised
/// info and checks it against the compiled-in one.
fn read_modulus_tag<F: Field>(cur: &mut Cursor<'_>) -> Result<()> {
    let claimed = u128::from(cur.read_u64()?);
    if claimed != F::MODULUS {
        return Err(Error::ModulusMismatch {
            expected: F::MODULUS,
            actual: claimed,
        });
    }
    Ok(())
}

fn write_modulus_tag<F: Field>(buf: &mut Buffer) {
    buf.add_u64(u64::try_from(F::MODULUS).expect("modulus fits the wire tag"));
}

// ---- Beaver triples --------------------------------------------------------

/// One multiplicative triple `(a, b, c = a*b)`, additively shared. Over
/// [`Gf2`] this is the boolean triple: `c = a AND b`, XOR-shared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeaverTriple<F: Field> {
    pub a: F,
    pub b: F,
    pub c: F,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BeaverInfo<F: Field> {
    _marker: PhantomData<F>,
}

impl<F: Field> BeaverInfo<F> {
    #[must_use]
    pub fn new() -> Self {
        BeaverInfo { _marker: PhantomData }
    }
}

impl<F: Field> RandomnessInfo for BeaverInfo<F> {
    type Rand = BeaverTriple<F>;
    const LABEL: &'static str = "BeaverTriple";

    fn write(&self, buf: &mut Buffer) {
        write_modulus_tag::<F>(buf);
    }

    fn read(cur: &mut Cursor<'_>) -> Result<Self> {
        read_modulus_tag::<F>(cur)?;
        Ok(BeaverInfo::new())
    }

    fn instance_size(&self) -> usize {
        3 * F::WIRE_BYTES
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R, n_parties: usize) -> Vec<BeaverTriple<F>> {
        let a = F::random(rng);
        let b = F::random(rng);
        let c = a * b;
        let a_shares = split_additive(rng, a, n_parties);
        let b_shares = split_additive(rng, b, n_parties);
        let c_shares = split_additive(rng, c, n_parties);
        (0..n_parties)
            .map(|i| BeaverTriple {
                a: a_shares[i],
                b: b_shares[i],
                c: c_shares[i],
            })
            .collect()
    }

    fn write_rand(rand: &BeaverTriple<F>, buf: &mut Buffer) {
        rand.a.write_share(buf);
        rand.b.write_share(buf);
        rand.c.write_share(buf);
    }

    fn read_rand(&self, cur: &mut Cursor<'_>) -> Result<BeaverTriple<F>> {
        Ok(BeaverTriple {
            a: F::read_share(cur)?,
            b: F::read_share(cur)?,
            c: F::read_share(cur)?,
        })
    }
}

// ---- Type-cast triples -----------------------------------------------------

/// `(r_0, r_1, r_2)` with `r_2` an XOR-shared bit and `r_0`, `r_1`
/// additively shared over `F`. The relation between the three depends on
/// which direction the cast runs — see [`TypeCastInfo`] and
/// [`TypeCastFromBitInfo`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeCastTriple<F: Field> {
    pub r_0: F,
    pub r_1: F,
    pub r_2: Gf2,
}

fn share_type_cast_triple<F: Field, R: Rng + ?Sized>(
    rng: &mut R,
    r_0: F,
    r_1: F,
    r_2: Gf2,
    n_parties: usize,
) -> Vec<TypeCastTriple<F>> {
    let r0_shares = split_additive(rng, r_0, n_parties);
    let r1_shares = split_additive(rng, r_1, n_parties);
    let r2_shares = split_additive(rng, r_2, n_parties);
    (0..n_parties)
        .map(|i| TypeCastTriple {
            r_0: r0_shares[i],
            r_1: r1_shares[i],
            r_2: r2_shares[i],
        })
        .collect()
}

fn type_cast_triple_wire<F: Field>(rand: &TypeCastTriple<F>, buf: &mut Buffer) {
    rand.r_0.write_share(buf);
    rand.r_1.write_share(buf);
    rand.r_2.write_share(buf);
}

fn type_cast_triple_unwire<F: Field>(cur: &mut Cursor<'_>) -> Result<TypeCastTriple<F>> {
    Ok(TypeCastTriple {
        r_0: F::read_share(cur)?,
        r_1: F::read_share(cur)?,
        r_2: Gf2::read_share(cur)?,
    })
}

/// Randomness for casting an arithmetic share of a bit into an XOR
/// share: `(r_0, r_1) = (1, 0)` when `r_2 = 0`, `(p - 1, 1)` when
/// `r_2 = 1`, so `b*r_0 + r_1 = b XOR r_2` for `b` in `{0, 1}`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TypeCastInfo<F: Field> {
    _marker: PhantomData<F>,
}

impl<F: Field> TypeCastInfo<F> {
    #[must_use]
    pub fn new() -> Self {
        TypeCastInfo { _marker: PhantomData }
    }
}

impl<F: Field> RandomnessInfo for TypeCastInfo<F> {
    type Rand = TypeCastTriple<F>;
    const LABEL: &'static str = "TypeCastTriple";

    fn write(&self, buf: &mut Buffer) {
        write_modulus_tag::<F>(buf);
    }

    fn read(cur: &mut Cursor<'_>) -> Result<Self> {
        read_modulus_tag::<F>(cur)?;
        Ok(TypeCastInfo::new())
    }

    fn instance_size(&self) -> usize {
        2 * F::WIRE_BYTES + 1
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R, n_parties: usize) -> Vec<TypeCastTriple<F>> {
        let r_2 = Gf2::from_bool(rng.gen_bool(0.5));
        let (r_0, r_1) = if r_2.as_bool() {
            (F::ZERO - F::ONE, F::ONE)
        } else {
            (F::ONE, F::ZERO)
        };
        share_type_cast_triple(rng, r_0, r_1, r_2, n_parties)
    }

    fn write_rand(rand: &TypeCastTriple<F>, buf: &mut Buffer) {
        type_cast_triple_wire(rand, buf);
    }

    fn read_rand(&self, cur: &mut Cursor<'_>) -> Result<TypeCastTriple<F>> {
        type_cast_triple_unwire(cur)
    }
}

/// Randomness for casting an XOR share of a bit into an arithmetic
/// share: `(r_0, r_1) = (0, 1)` when `r_2 = 0`, `(1, 0)` when `r_2 = 1`,
/// i.e. `r_0` is the arithmetic value of `r_2` and `r_1` of `1 - r_2`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TypeCastFromBitInfo<F: Field> {
    _marker: PhantomData<F>,
}

impl<F: Field> TypeCastFromBitInfo<F> {
    #[must_use]
    pub fn new() -> Self {
        TypeCastFromBitInfo { _marker: PhantomData }
    }
}

impl<F: Field> RandomnessInfo for TypeCastFromBitInfo<F> {
    type Rand = TypeCastTriple<F>;
    const LABEL: &'static str = "TypeCastFromBitTriple";

    fn write(&self, buf: &mut Buffer) {
        write_modulus_tag::<F>(buf);
    }

    fn read(cur: &mut Cursor<'_>) -> Result<Self> {
        read_modulus_tag::<F>(cur)?;
        Ok(TypeCastFromBitInfo::new())
    }

    fn instance_size(&self) -> usize {
        2 * F::WIRE_BYTES + 1
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R, n_parties: usize) -> Vec<TypeCastTriple<F>> {
        let r_2 = Gf2::from_bool(rng.gen_bool(0.5));
        let (r_0, r_1) = if r_2.as_bool() {
            (F::ONE, F::ZERO)
        } else {
            (F::ZERO, F::ONE)
        };
        share_type_cast_triple(rng, r_0, r_1, r_2, n_parties)
    }

    fn write_rand(rand: &TypeCastTriple<F>, buf: &mut Buffer) {
        type_cast_triple_wire(rand, buf);
    }

    fn read_rand(&self, cur: &mut Cursor<'_>) -> Result<TypeCastTriple<F>> {
        type_cast_triple_unwire(cur)
    }
}

// ---- Exponent series -------------------------------------------------------

/// Shares of `(r, r^2, .., r^ell, r^-1)` for a fresh uniform non-zero
/// `r`, consumed by `UnboundedFaninOr`'s masked polynomial evaluation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExponentSeries<F: Field> {
    pub powers: Vec<F>,
    pub inverse: F,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExponentSeriesInfo<F: Field> {
    pub ell: usize,
    _marker: PhantomData<F>,
}

impl<F: Field> ExponentSeriesInfo<F> {
    #[must_use]
    pub fn new(ell: usize) -> Self {
        ExponentSeriesInfo { ell, _marker: PhantomData }
    }
}

impl<F: Field> RandomnessInfo for ExponentSeriesInfo<F> {
    type Rand = ExponentSeries<F>;
    const LABEL: &'static str = "ExponentSeries";

    fn write(&self, buf: &mut Buffer) {
        write_modulus_tag::<F>(buf);
        buf.add_u64(self.ell as u64);
    }

    fn read(cur: &mut Cursor<'_>) -> Result<Self> {
        read_modulus_tag::<F>(cur)?;
        Ok(ExponentSeriesInfo::new(cur.read_u64()? as usize))
    }

    fn instance_size(&self) -> usize {
        4 + (self.ell + 1) * F::WIRE_BYTES
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R, n_parties: usize) -> Vec<ExponentSeries<F>> {
        let r = F::random_nonzero(rng);
        let inverse = r.invert();
        let mut power_shares: Vec<Vec<F>> = Vec::with_capacity(self.ell);
        let mut current = F::ONE;
        for _ in 0..self.ell {
            current *= r;
            power_shares.push(split_additive(rng, current, n_parties));
        }
        let inverse_shares = split_additive(rng, inverse, n_parties);
        (0..n_parties)
            .map(|i| ExponentSeries {
                powers: power_shares.iter().map(|shares| shares[i]).collect(),
                inverse: inverse_shares[i],
            })
            .collect()
    }

    fn write_rand(rand: &ExponentSeries<F>, buf: &mut Buffer) {
        buf.add_u32(u32::try_from(rand.powers.len()).unwrap());
        for p in &rand.powers {
            p.write_share(buf);
        }
        rand.inverse.write_share(buf);
    }

    fn read_rand(&self, cur: &mut Cursor<'_>) -> Result<ExponentSeries<F>> {
        let count = cur.read_u32()? as usize;
        let mut powers = Vec::with_capacity(count);
        for _ in 0..count {
            powers.push(F::read_share(cur)?);
        }
        Ok(ExponentSeries {
            powers,
            inverse: F::read_share(cur)?,
        })
    }
}

// ---- Decomposed bit sets ---------------------------------------------------

/// Shares of a uniform `r` mod `P::MODULUS`, its `ell` bits (MSB first)
/// each shared mod `S::MODULUS`, and its least-significant bit
/// XOR-shared. `Compare` uses `r` to mask a difference before revealing
/// it, then bitwise-compares the revealed value against `r`'s bits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecomposedBitSet<P: Field, S: Field> {
    pub r: P,
    pub r_bits: Vec<S>,
    pub r_lsb: Gf2,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecomposedBitSetInfo<P: Field, S: Field> {
    pub ell: usize,
    _marker: PhantomData<(P, S)>,
}

impl<P: Field, S: Field> DecomposedBitSetInfo<P, S> {
    #[must_use]
    pub fn new(ell: usize) -> Self {
        DecomposedBitSetInfo { ell, _marker: PhantomData }
    }
}

impl<P: Field, S: Field> RandomnessInfo for DecomposedBitSetInfo<P, S> {
    type Rand = DecomposedBitSet<P, S>;
    const LABEL: &'static str = "DecomposedBitSet";

    fn write(&self, buf: &mut Buffer) {
        write_modulus_tag::<P>(buf);
        write_modulus_tag::<S>(buf);
        buf.add_u64(self.ell as u64);
    }

    fn read(cur: &mut Cursor<'_>) -> Result<Self> {
        read_modulus_tag::<P>(cur)?;
        read_modulus_tag::<S>(cur)?;
        Ok(DecomposedBitSetInfo::new(cur.read_u64()? as usize))
    }

    fn instance_size(&self) -> usize {
        P::WIRE_BYTES + 4 + self.ell * S::WIRE_BYTES + 1
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R, n_parties: usize) -> Vec<DecomposedBitSet<P, S>> {
        let r = P::random(rng);
        let r_val = r.as_u128();
        let bits: Vec<S> = (0..self.ell)
            .map(|i| S::from_u128((r_val >> (self.ell - 1 - i)) & 1))
            .collect();
        let r_shares = split_additive(rng, r, n_parties);
        let lsb_shares = split_additive(rng, Gf2::from_bool(r_val & 1 == 1), n_parties);
        let mut bit_shares: Vec<Vec<S>> = vec![Vec::with_capacity(self.ell); n_parties];
        for &bit in &bits {
            for (party, share) in bit_shares.iter_mut().zip(split_additive(rng, bit, n_parties)) {
                party.push(share);
            }
        }
        (0..n_parties)
            .map(|i| DecomposedBitSet {
                r: r_shares[i],
                r_bits: std::mem::take(&mut bit_shares[i]),
                r_lsb: lsb_shares[i],
            })
            .collect()
    }

    fn write_rand(rand: &DecomposedBitSet<P, S>, buf: &mut Buffer) {
        rand.r.write_share(buf);
        buf.add_u32(u32::try_from(rand.r_bits.len()).unwrap());
        for b in &rand.r_bits {
            b.write_share(buf);
        }
        rand.r_lsb.write_share(buf);
    }

    fn read_rand(&self, cur: &mut Cursor<'_>) -> Result<DecomposedBitSet<P, S>> {
        let r = P::read_share(cur)?;
        let count = cur.read_u32()? as usize;
        let mut r_bits = Vec::with_capacity(count);
        for _ in 0..count {
            r_bits.push(S::read_share(cur)?);
        }
        Ok(DecomposedBitSet {
            r,
            r_bits,
            r_lsb: Gf2::read_share(cur)?,
        })
    }
}

// ---- ModConvUp auxiliary randomness ----------------------------------------

/// Auxiliary randomness for one `ModConvUp` from the medium field `M`
/// into the large field `P`: a uniform `r` mod `P::MODULUS` shared over
/// `P`, `x = r mod M::MODULUS` also shared over `P`, `x`'s bits (MSB
/// first) shared over the small field `S`, and `r`'s low bit XOR-shared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModConvUpAux<S: Field, M: Field, P: Field> {
    pub r: P,
    pub x: P,
    pub bits_of_x: Vec<S>,
    pub lsb_of_r: Gf2,
    _marker: PhantomData<M>,
}

impl<S: Field, M: Field, P: Field> ModConvUpAux<S, M, P> {
    #[must_use]
    pub fn new(r: P, x: P, bits_of_x: Vec<S>, lsb_of_r: Gf2) -> Self {
        ModConvUpAux {
            r,
            x,
            bits_of_x,
            lsb_of_r,
            _marker: PhantomData,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModConvUpAuxInfo<S: Field, M: Field, P: Field> {
    /// `floor(log2(M::MODULUS)) + 1`: how many bits of `x` get shared.
    pub x_bit_length: usize,
    _marker: PhantomData<(S, M, P)>,
}

impl<S: Field, M: Field, P: Field> ModConvUpAuxInfo<S, M, P> {
    #[must_use]
    pub fn new() -> Self {
        ModConvUpAuxInfo {
            x_bit_length: M::bits(),
            _marker: PhantomData,
        }
    }
}

impl<S: Field, M: Field, P: Field> Default for ModConvUpAuxInfo<S, M, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Field, M: Field, P: Field> RandomnessInfo for ModConvUpAuxInfo<S, M, P> {
    type Rand = ModConvUpAux<S, M, P>;
    const LABEL: &'static str = "ModConvUpAux";

    fn write(&self, buf: &mut Buffer) {
        write_modulus_tag::<P>(buf);
        write_modulus_tag::<M>(buf);
        write_modulus_tag::<S>(buf);
        buf.add_u64(self.x_bit_length as u64);
    }

    fn read(cur: &mut Cursor<'_>) -> Result<Self> {
        read_modulus_tag::<P>(cur)?;
        read_modulus_tag::<M>(cur)?;
        read_modulus_tag::<S>(cur)?;
        let x_bit_length = cur.read_u64()? as usize;
        let mut info = ModConvUpAuxInfo::<S, M, P>::new();
        info.x_bit_length = x_bit_length;
        Ok(info)
    }

    fn instance_size(&self) -> usize {
        2 * P::WIRE_BYTES + 4 + self.x_bit_length * S::WIRE_BYTES + 1
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R, n_parties: usize) -> Vec<ModConvUpAux<S, M, P>> {
        let r = P::random(rng);
        let x_val = r.as_u128() % M::MODULUS;
        let x = P::from_u128(x_val);
        let bits: Vec<S> = (0..self.x_bit_length)
            .map(|i| S::from_u128((x_val >> (self.x_bit_length - 1 - i)) & 1))
            .collect();
        let r_shares = split_additive(rng, r, n_parties);
        let x_shares = split_additive(rng, x, n_parties);
        let lsb_shares = split_additive(rng, Gf2::from_bool(r.as_u128() & 1 == 1), n_parties);
        let mut bit_shares: Vec<Vec<S>> = vec![Vec::with_capacity(bits.len()); n_parties];
        for &bit in &bits {
            for (party, share) in bit_shares.iter_mut().zip(split_additive(rng, bit, n_parties)) {
                party.push(share);
            }
        }
        (0..n_parties)
            .map(|i| {
                ModConvUpAux::new(
                    r_shares[i],
                    x_shares[i],
                    std::mem::take(&mut bit_shares[i]),
                    lsb_shares[i],
                )
            })
            .collect()
    }

    fn write_rand(rand: &ModConvUpAux<S, M, P>, buf: &mut Buffer) {
        rand.r.write_share(buf);
        rand.x.write_share(buf);
        buf.add_u32(u32::try_from(rand.bits_of_x.len()).unwrap());
        for b in &rand.bits_of_x {
            b.write_share(buf);
        }
        rand.lsb_of_r.write_share(buf);
    }

    fn read_rand(&self, cur: &mut Cursor<'_>) -> Result<ModConvUpAux<S, M, P>> {
        let r = P::read_share(cur)?;
        let x = P::read_share(cur)?;
        let count = cur.read_u32()? as usize;
        let mut bits_of_x = Vec::with_capacity(count);
        for _ in 0..count {
            bits_of_x.push(S::read_share(cur)?);
        }
        Ok(ModConvUpAux::new(r, x, bits_of_x, Gf2::read_share(cur)?))
    }
}

// ---- Waksman control bits --------------------------------------------------

/// One full network's worth of secret-shared switch control bits: the
/// same bit vector shared three ways, once over the payload field, once
/// over the key field, and once as XOR, so a switch can obliviously move
/// all three column kinds of a row with matching control shares.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaksmanBits<P: Field> {
    pub arithmetic: Vec<P>,
    pub key: Vec<P>,
    pub xor: Vec<Gf2>,
}

/// Parameters of a Waksman network over `n = 2^d` wires with
/// `w_of_n = (d - 1) * 2^d + 1` switches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaksmanInfo<P: Field> {
    pub n: usize,
    pub d: usize,
    pub w_of_n: usize,
    _marker: PhantomData<P>,
}

impl<P: Field> WaksmanInfo<P> {
    /// # Panics
    /// Panics if `d` is zero (a 1-wire network has no switches).
    #[must_use]
    pub fn new(d: usize) -> Self {
        assert!(d >= 1, "a Waksman network needs at least two wires");
        let n = 1_usize << d;
        WaksmanInfo {
            n,
            d,
            w_of_n: (d - 1) * n + 1,
            _marker: PhantomData,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Uncolored,
    Red,
    Blue,
}

/// Computes the control bits that make a Waksman network realise
/// `permutation`, in the exact switch order the shuffle consumes them:
/// the `d` front stages first (top to bottom within a stage), then the
/// `d - 1` back stages.
fn waksman_control_bits(permutation: &[usize], d: usize, w_of_n: usize) -> Vec<bool> {
    let n = permutation.len();
    let mut permutation = permutation.to_vec();
    let mut inverse = vec![0_usize; n];
    for (i, &p) in permutation.iter().enumerate() {
        inverse[p] = i;
    }

    let mut bits = vec![false; w_of_n];
    let mut front = 0_usize;
    let mut back = w_of_n - 1;
    let mut coloring = vec![Color::Uncolored; n];

    for i in 0..d {
        let half = 1_usize << i;
        for c in coloring.iter_mut() {
            *c = Color::Uncolored;
        }
        for j in 0..half {
            let mut pos = inverse[j];
            while coloring[pos] == Color::Uncolored {
                coloring[pos] = Color::Red;
                pos ^= half;
                coloring[pos] = Color::Blue;
                pos = inverse[permutation[pos] ^ half];
            }
            let mut k = j;
            while k < n {
                let mut pos = k;
                while coloring[pos] == Color::Uncolored {
                    coloring[pos] = Color::Red;
                    pos ^= half;
                    coloring[pos] = Color::Blue;
                    pos = inverse[permutation[pos] ^ half];
                }
                k += half;
            }
        }

        for j in 0..half {
            let mut k = j;
            while k < n {
                bits[front] = coloring[k] != Color::Red;
                front += 1;
                k += 2 * half;
            }
        }

        for j in 0..half {
            inverse[j] = ((inverse[j] >> (i + 1)) << (i + 1)) + j;
            inverse[j + half] = ((inverse[j + half] >> (i + 1)) << (i + 1)) + j + half;
            let mut k = j + 2 * half;
            while k < n {
                if coloring[inverse[k]] == Color::Red {
                    bits[back] = false;
                } else {
                    inverse.swap(k, k + half);
                    bits[back] = true;
                }
                inverse[k] = ((inverse[k] >> (i + 1)) << (i + 1)) + j;
                inverse[k + half] = ((inverse[k + half] >> (i + 1)) << (i + 1)) + j + half;
                back = back.wrapping_sub(1);
                k += 2 * half;
            }
        }

        for (j, &inv) in inverse.iter().enumerate() {
            permutation[inv] = j;
        }
    }
    debug_assert_eq!(front, back.wrapping_add(1));
    bits
}

impl<P: Field> RandomnessInfo for WaksmanInfo<P> {
    type Rand = WaksmanBits<P>;
    const LABEL: &'static str = "WaksmanBits";

    fn write(&self, buf: &mut Buffer) {
        write_modulus_tag::<P>(buf);
        buf.add_u64(self.n as u64);
        buf.add_u64(self.d as u64);
        buf.add_u64(self.w_of_n as u64);
    }

    fn read(cur: &mut Cursor<'_>) -> Result<Self> {
        read_modulus_tag::<P>(cur)?;
        let n = cur.read_u64()? as usize;
        let d = cur.read_u64()? as usize;
        let w_of_n = cur.read_u64()? as usize;
        let expected = WaksmanInfo::<P>::new(d);
        if expected.n != n || expected.w_of_n != w_of_n {
            return Err(Error::InconsistentRandomnessInfo {
                kind: "WaksmanInfo dimensions disagree with depth",
            });
        }
        Ok(expected)
    }

    fn instance_size(&self) -> usize {
        8 + self.w_of_n * (2 * P::WIRE_BYTES + 1)
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R, n_parties: usize) -> Vec<WaksmanBits<P>> {
        // Fisher-Yates over the wire indices.
        let mut permutation: Vec<usize> = (0..self.n).collect();
        for i in 0..self.n - 1 {
            let j = i + rng.gen_range(0..self.n - i);
            permutation.swap(i, j);
        }
        let bits = waksman_control_bits(&permutation, self.d, self.w_of_n);

        let mut shares: Vec<WaksmanBits<P>> = (0..n_parties)
            .map(|_| WaksmanBits {
                arithmetic: Vec::with_capacity(self.w_of_n),
                key: Vec::with_capacity(self.w_of_n),
                xor: Vec::with_capacity(self.w_of_n),
            })
            .collect();
        for &bit in &bits {
            let arith = split_additive(rng, P::from_u128(u128::from(bit)), n_parties);
            let key = split_additive(rng, P::from_u128(u128::from(bit)), n_parties);
            let xor = split_additive(rng, Gf2::from_bool(bit), n_parties);
            for (i, share) in shares.iter_mut().enumerate() {
                share.arithmetic.push(arith[i]);
                share.key.push(key[i]);
                share.xor.push(xor[i]);
            }
        }
        shares
    }

    fn write_rand(rand: &WaksmanBits<P>, buf: &mut Buffer) {
        buf.add_u64(rand.arithmetic.len() as u64);
        for v in &rand.arithmetic {
            v.write_share(buf);
        }
        for v in &rand.key {
            v.write_share(buf);
        }
        for v in &rand.xor {
            v.write_share(buf);
        }
    }

    fn read_rand(&self, cur: &mut Cursor<'_>) -> Result<WaksmanBits<P>> {
        let w = cur.read_u64()? as usize;
        let mut arithmetic = Vec::with_capacity(w);
        for _ in 0..w {
            arithmetic.push(P::read_share(cur)?);
        }
        let mut key = Vec::with_capacity(w);
        for _ in 0..w {
            key.push(P::read_share(cur)?);
        }
        let mut xor = Vec::with_capacity(w);
        for _ in 0..w {
            xor.push(Gf2::read_share(cur)?);
        }
        Ok(WaksmanBits { arithmetic, key, xor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ff::{Fp11, Fp97};
    use rand::SeedableRng;

    fn reconstruct<F: Field>(shares: impl IntoIterator<Item = F>) -> F {
        shares.into_iter().fold(F::ZERO, |acc, s| acc + s)
    }

    #[test]
    fn beaver_triples_satisfy_the_relation() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let info = BeaverInfo::<Fp97>::new();
        for _ in 0..20 {
            let shares = info.generate(&mut rng, 3);
            let a = reconstruct(shares.iter().map(|s| s.a));
            let b = reconstruct(shares.iter().map(|s| s.b));
            let c = reconstruct(shares.iter().map(|s| s.c));
            assert_eq!(a * b, c);
        }
    }

    #[test]
    fn boolean_beaver_triples_are_and_triples() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(8);
        let info = BeaverInfo::<Gf2>::new();
        for _ in 0..20 {
            let shares = info.generate(&mut rng, 4);
            let a = reconstruct(shares.iter().map(|s| s.a));
            let b = reconstruct(shares.iter().map(|s| s.b));
            let c = reconstruct(shares.iter().map(|s| s.c));
            assert_eq!(a & b, c);
        }
    }

    #[test]
    fn type_cast_triples_mask_a_bit_both_ways() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(9);
        for _ in 0..20 {
            let shares = TypeCastInfo::<Fp97>::new().generate(&mut rng, 3);
            let r_0 = reconstruct(shares.iter().map(|s| s.r_0));
            let r_1 = reconstruct(shares.iter().map(|s| s.r_1));
            let r_2 = reconstruct(shares.iter().map(|s| s.r_2));
            for b in 0_u128..2 {
                let opened = Fp97::from_u128(b) * r_0 + r_1;
                assert_eq!(opened.as_u128(), b ^ r_2.as_u128());
            }

            let shares = TypeCastFromBitInfo::<Fp97>::new().generate(&mut rng, 3);
            let r_0 = reconstruct(shares.iter().map(|s| s.r_0));
            let r_1 = reconstruct(shares.iter().map(|s| s.r_1));
            let r_2 = reconstruct(shares.iter().map(|s| s.r_2));
            assert_eq!(r_0.as_u128(), r_2.as_u128());
            assert_eq!(r_1.as_u128(), 1 - r_2.as_u128());
        }
    }

    #[test]
    fn exponent_series_reconstructs_powers_and_inverse() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(10);
        let info = ExponentSeriesInfo::<Fp97>::new(5);
        let shares = info.generate(&mut rng, 3);
        let r = reconstruct(shares.iter().map(|s| s.powers[0]));
        let mut expected = r;
        for k in 0..5 {
            assert_eq!(reconstruct(shares.iter().map(|s| s.powers[k])), expected);
            expected *= r;
        }
        let inv = reconstruct(shares.iter().map(|s| s.inverse));
        assert_eq!(r * inv, Fp97::ONE);
    }

    #[test]
    fn decomposed_bit_set_bits_match_the_value() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let info = DecomposedBitSetInfo::<Fp97, Fp11>::new(7);
        let shares = info.generate(&mut rng, 3);
        let r = reconstruct(shares.iter().map(|s| s.r)).as_u128();
        for i in 0..7 {
            let bit = reconstruct(shares.iter().map(|s| s.r_bits[i])).as_u128();
            assert_eq!(bit, (r >> (6 - i)) & 1, "bit {i} of r={r}");
        }
        let lsb = reconstruct(shares.iter().map(|s| s.r_lsb));
        assert_eq!(lsb.as_u128(), r & 1);
    }

    #[test]
    fn waksman_bits_realise_the_sampled_permutation() {
        // Reconstruct the control bits and push the identity list
        // through the network in the same switch order the shuffle
        // uses; the result must be a permutation of 0..n (every row
        // present exactly once).
        let mut rng = rand::rngs::StdRng::seed_from_u64(12);
        for d in 1..=4 {
            let info = WaksmanInfo::<Fp97>::new(d);
            let shares = info.generate(&mut rng, 3);
            let bits: Vec<bool> = (0..info.w_of_n)
                .map(|i| reconstruct(shares.iter().map(|s| s.arithmetic[i])).as_u128() == 1)
                .collect();
            // key and xor sharings must encode the same bit vector
            for i in 0..info.w_of_n {
                assert_eq!(
                    reconstruct(shares.iter().map(|s| s.key[i])).as_u128(),
                    u128::from(bits[i])
                );
                assert_eq!(
                    reconstruct(shares.iter().map(|s| s.xor[i])).as_bool(),
                    bits[i]
                );
            }

            let n = info.n;
            let mut rows: Vec<usize> = (0..n).collect();
            let mut counter = 0;
            for depth in 0..d {
                let half = 1 << depth;
                for j in 0..half {
                    let mut k = j;
                    while k < n {
                        if bits[counter] {
                            rows.swap(k, k + half);
                        }
                        counter += 1;
                        k += 2 * half;
                    }
                }
            }
            for depth in (0..d.saturating_sub(1)).rev() {
                let half = 1 << depth;
                for j in 0..half {
                    let j_prime = half - 1 - j;
                    let mut k = j_prime + n - 2 * half;
                    while k != j_prime {
                        if bits[counter] {
                            rows.swap(k, k + half);
                        }
                        counter += 1;
                        k -= 2 * half;
                    }
                }
            }
            assert_eq!(counter, info.w_of_n);
            let mut sorted = rows.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..n).collect::<Vec<_>>(), "d={d}");
        }
    }

    fn apply_network(bits: &[bool], n: usize, d: usize) -> Vec<usize> {
        let mut rows: Vec<usize> = (0..n).collect();
        let mut counter = 0;
        for depth in 0..d {
            let half = 1 << depth;
            for j in 0..half {
                let mut k = j;
                while k < n {
                    if bits[counter] {
                        rows.swap(k, k + half);
                    }
                    counter += 1;
                    k += 2 * half;
                }
            }
        }
        for depth in (0..d.saturating_sub(1)).rev() {
            let half = 1 << depth;
            for j in 0..half {
                let j_prime = half - 1 - j;
                let mut k = j_prime + n - 2 * half;
                while k != j_prime {
                    if bits[counter] {
                        rows.swap(k, k + half);
                    }
                    counter += 1;
                    k -= 2 * half;
                }
            }
        }
        assert_eq!(counter, bits.len());
        rows
    }

    #[test]
    fn control_bits_route_every_row_to_its_permuted_slot() {
        // Pushing the identity list through the network must land row
        // `x` at position `sigma(x)`, i.e. yield the inverse permutation
        // as a list.
        let mut rng = rand::rngs::StdRng::seed_from_u64(13);
        use rand::Rng as _;
        for d in 1..=4_usize {
            let n = 1 << d;
            let w = (d - 1) * n + 1;
            for _ in 0..10 {
                let mut sigma: Vec<usize> = (0..n).collect();
                for i in 0..n - 1 {
                    let j = i + rng.gen_range(0..n - i);
                    sigma.swap(i, j);
                }
                let mut inverse = vec![0_usize; n];
                for (i, &s) in sigma.iter().enumerate() {
                    inverse[s] = i;
                }
                let bits = waksman_control_bits(&sigma, d, w);
                assert_eq!(apply_network(&bits, n, d), inverse, "d={d} sigma={sigma:?}");
            }
        }
    }
}
