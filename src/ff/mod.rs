//! Prime-field arithmetic.
//!
//! The runtime is generic over the modulus used by a given sub-protocol:
//! the comparison stack runs almost entirely over a *small* prime `s`
//! (just big enough to hold a bit-count), while core arithmetic (Beaver
//! multiply, reveal, the sort's payload columns) runs over a *large*
//! prime `p`. Rather than parameterise every type over a
//! `const MODULUS: u128` (which drags const-generic arithmetic through
//! the whole crate), we expose one concrete field per modulus via the
//! `field!` macro.
//!
//! [`Gf2`] is the boolean field: addition is XOR and multiplication is
//! AND, so every generic protocol written over [`Field`] — Beaver
//! multiply in particular — doubles as its own XOR/AND variant without a
//! separate implementation.

mod field_macro;

use crate::codec::{Buffer, Cursor};
use crate::error::Result;
use rand::Rng;
use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// Common behavior of a prime field used inside the engine.
pub trait Field:
    Copy
    + Clone
    + Debug
    + Display
    + Default
    + PartialEq
    + Eq
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + 'static
{
    const MODULUS: u128;
    const ZERO: Self;
    const ONE: Self;

    fn from_u128(v: u128) -> Self;
    fn as_u128(self) -> u128;

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_u128(rng.gen_range(0..Self::MODULUS))
    }

    /// Uniformly random *non-zero* element.
    fn random_nonzero<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_u128(rng.gen_range(1..Self::MODULUS))
    }

    /// How many bytes [`Field::write_share`] emits for one element.
    const WIRE_BYTES: usize = 8;

    /// Fixed-width big-endian wire form of one element.
    fn write_share(self, buf: &mut Buffer) {
        buf.add_u64(u64::try_from(self.as_u128()).expect("field element exceeds u64 wire width"));
    }

    fn read_share(cur: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self::from_u128(u128::from(cur.read_u64()?)))
    }

    /// Multiplicative inverse mod `MODULUS`, via Fermat's little
    /// theorem: `a^(p-2)` inverts any non-zero `a` in a prime field.
    ///
    /// # Panics
    /// Panics if `self` is zero.
    fn invert(self) -> Self {
        assert_ne!(self.as_u128(), 0, "cannot invert zero in a prime field");
        self.pow(Self::MODULUS - 2)
    }

    fn pow(self, mut exp: u128) -> Self {
        let mut base = self;
        let mut acc = Self::ONE;
        while exp > 0 {
            if exp & 1 == 1 {
                acc *= base;
            }
            base *= base;
            exp >>= 1;
        }
        acc
    }

    /// Bit length of the modulus, `floor(log2(MODULUS)) + 1`; the `ell`
    /// of the comparison stack when this field holds the compared keys.
    fn bits() -> usize {
        (128 - Self::MODULUS.leading_zeros()) as usize
    }
}

field_macro::field!(Fp32BitPrime, 4_294_967_291_u128, "Fp32BitPrime");
field_macro::field!(Fp31BitMersenne, 2_147_483_647_u128, "Fp31BitMersenne");
field_macro::field!(FpSmall, 8_191_u128, "FpSmall");

#[cfg(any(test, feature = "weak-field"))]
field_macro::field!(Fp31, 31_u128, "Fp31");
#[cfg(any(test, feature = "weak-field"))]
field_macro::field!(Fp97, 97_u128, "Fp97");
#[cfg(any(test, feature = "weak-field"))]
field_macro::field!(Fp11, 11_u128, "Fp11");

/// The two-element field. Addition is XOR and multiplication is AND, so
/// an XOR secret sharing is just an additive sharing over `Gf2`, and the
/// boolean Beaver multiply is the ordinary generic one. One byte on the
/// wire.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Gf2(u8);

impl Gf2 {
    #[must_use]
    pub fn from_bool(b: bool) -> Self {
        Gf2(u8::from(b))
    }

    #[must_use]
    pub fn as_bool(self) -> bool {
        self.0 != 0
    }
}

impl Debug for Gf2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Gf2({})", self.0)
    }
}

impl Display for Gf2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Field for Gf2 {
    const MODULUS: u128 = 2;
    const ZERO: Self = Gf2(0);
    const ONE: Self = Gf2(1);

    fn from_u128(v: u128) -> Self {
        Gf2((v & 1) as u8)
    }

    fn as_u128(self) -> u128 {
        u128::from(self.0)
    }

    const WIRE_BYTES: usize = 1;

    fn write_share(self, buf: &mut Buffer) {
        buf.add_u8(self.0);
    }

    fn read_share(cur: &mut Cursor<'_>) -> Result<Self> {
        Ok(Gf2(cur.read_u8()? & 1))
    }
}

impl Add for Gf2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Gf2(self.0 ^ rhs.0)
    }
}

impl AddAssign for Gf2 {
    fn add_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

impl Sub for Gf2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Gf2(self.0 ^ rhs.0)
    }
}

impl SubAssign for Gf2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

impl Mul for Gf2 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Gf2(self.0 & rhs.0)
    }
}

impl MulAssign for Gf2 {
    fn mul_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Neg for Gf2 {
    type Output = Self;
    fn neg(self) -> Self {
        self
    }
}

impl std::ops::BitXor for Gf2 {
    type Output = Self;
    fn bitxor(self, rhs: Self) -> Self {
        Gf2(self.0 ^ rhs.0)
    }
}

impl std::ops::BitXorAssign for Gf2 {
    fn bitxor_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

impl std::ops::BitAnd for Gf2 {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Gf2(self.0 & rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gf2_is_xor_and_and() {
        assert_eq!(Gf2::ONE + Gf2::ONE, Gf2::ZERO);
        assert_eq!(Gf2::ONE * Gf2::ZERO, Gf2::ZERO);
        assert_eq!(Gf2::ONE * Gf2::ONE, Gf2::ONE);
        assert_eq!(-Gf2::ONE, Gf2::ONE);
    }

    #[test]
    fn field_bits_counts_the_modulus_width() {
        assert_eq!(Fp31::bits(), 5);
        assert_eq!(Fp97::bits(), 7);
        assert_eq!(Fp31BitMersenne::bits(), 31);
    }

    #[test]
    fn invert_round_trips() {
        for v in [1_u128, 2, 30, 96] {
            let x = Fp97::from_u128(v);
            assert_eq!(x * x.invert(), Fp97::ONE);
        }
    }

    #[test]
    fn gf2_wire_form_is_one_byte() {
        let mut buf = crate::codec::Buffer::new();
        Gf2::ONE.write_share(&mut buf);
        Fp97::from_u128(5).write_share(&mut buf);
        assert_eq!(buf.length(), 1 + 8);
        let mut cur = buf.cursor();
        assert_eq!(Gf2::read_share(&mut cur).unwrap(), Gf2::ONE);
        assert_eq!(Fp97::read_share(&mut cur).unwrap(), Fp97::from_u128(5));
    }
}
