/// Declares a concrete prime-field newtype over `u128`: one hand-rolled
/// struct per field (`Fp31`/`Fp32BitPrime`) rather than carrying the
/// modulus as a const generic through every type signature.
macro_rules! field {
    ($name:ident, $modulus:expr, $display:literal) => {
        #[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
        pub struct $name(u128);

        impl $name {
            pub const MODULUS: u128 = $modulus;
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", $display, self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl crate::ff::Field for $name {
            const MODULUS: u128 = $modulus;
            const ZERO: Self = $name(0);
            const ONE: Self = $name(1);

            fn from_u128(v: u128) -> Self {
                $name(v % Self::MODULUS)
            }

            fn as_u128(self) -> u128 {
                self.0
            }
        }

        impl std::ops::Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                $name((self.0 + rhs.0) % Self::MODULUS)
            }
        }

        impl std::ops::AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                *self = *self + rhs;
            }
        }

        impl std::ops::Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                $name((self.0 + Self::MODULUS - rhs.0) % Self::MODULUS)
            }
        }

        impl std::ops::SubAssign for $name {
            fn sub_assign(&mut self, rhs: Self) {
                *self = *self - rhs;
            }
        }

        impl std::ops::Mul for $name {
            type Output = Self;
            fn mul(self, rhs: Self) -> Self {
                $name((self.0 * rhs.0) % Self::MODULUS)
            }
        }

        impl std::ops::MulAssign for $name {
            fn mul_assign(&mut self, rhs: Self) {
                *self = *self * rhs;
            }
        }

        impl std::ops::Neg for $name {
            type Output = Self;
            fn neg(self) -> Self {
                if self.0 == 0 {
                    self
                } else {
                    $name(Self::MODULUS - self.0)
                }
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                <Self as crate::ff::Field>::from_u128(u128::from(v))
            }
        }

        impl From<u32> for $name {
            fn from(v: u32) -> Self {
                <Self as crate::ff::Field>::from_u128(u128::from(v))
            }
        }
    };
}

pub(crate) use field;
