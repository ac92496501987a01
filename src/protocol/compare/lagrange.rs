//! Lagrange interpolation of the unbounded-fan-in OR truth table,
//! reduced to the monomial basis so `UnboundedFaninOr` can evaluate it
//! as a local linear combination of the revealed sum's pre-shared
//! powers.
//!
//! The evaluation point is `A = 1 + sum(bits)`, never zero, so the
//! multiplicative mask `A * r^-1` reveals nothing about the bit count;
//! the interpolated polynomial therefore runs through `(1, 0)` and
//! `(2, 1), .., (n + 1, 1)`.

use crate::ff::Field;

/// Multiplies the polynomial `coeffs` (index `i` is the coefficient of
/// `x^i`) by `(x - root)`.
fn mul_linear<F: Field>(coeffs: &[F], root: F) -> Vec<F> {
    let mut out = vec![F::ZERO; coeffs.len() + 1];
    for (i, &c) in coeffs.iter().enumerate() {
        out[i + 1] += c;
        out[i] -= c * root;
    }
    out
}

/// Coefficients `c_0..=c_n` of the degree-`n` polynomial that is `0` at
/// `x = 1` and `1` at `x = 2, .., n + 1`, for a fan-in of `n` bits.
#[must_use]
pub fn prefix_or_coefficients<F: Field>(fan_in: usize) -> Vec<F> {
    let n = fan_in;
    let mut total = vec![F::ZERO; n + 1];
    for k in 2..=n + 1 {
        let mut numerator = vec![F::ONE];
        let mut denom = F::ONE;
        for j in 1..=n + 1 {
            if j == k {
                continue;
            }
            numerator = mul_linear(&numerator, F::from_u128(j as u128));
            denom *= F::from_u128(k as u128) - F::from_u128(j as u128);
        }
        let denom_inv = denom.invert();
        for (i, &c) in numerator.iter().enumerate() {
            total[i] += c * denom_inv;
        }
    }
    total
}

/// The fan-in sizes a single `PrefixOr` over `ell` bits with block size
/// `lambda` needs, in consumption order: the cumulative row-OR fan-ins
/// `lambda, 2*lambda, .., ell`, then the column-OR fan-ins
/// `1, .., lambda`. One exponent series (and one Lagrange polynomial) of
/// each size is consumed per comparison.
#[must_use]
pub fn unbounded_fanin_or_needs(ell: usize, lambda: usize) -> Vec<usize> {
    let mut needs = Vec::new();
    let mut block_size = lambda;
    while block_size < ell {
        needs.push(block_size);
        block_size += lambda;
    }
    needs.push(ell);
    block_size = 1;
    while block_size - 1 < lambda {
        needs.push(block_size);
        block_size += 1;
    }
    needs
}

/// One Lagrange polynomial per entry of [`unbounded_fanin_or_needs`],
/// in the same order.
#[must_use]
pub fn generate_lagrange_polynomial_set<F: Field>(ell: usize, lambda: usize) -> Vec<Vec<F>> {
    unbounded_fanin_or_needs(ell, lambda)
        .into_iter()
        .map(prefix_or_coefficients::<F>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ff::Fp97;

    fn eval(coeffs: &[Fp97], x: u128) -> Fp97 {
        let x = Fp97::from_u128(x);
        let mut acc = Fp97::ZERO;
        let mut power = Fp97::ONE;
        for &c in coeffs {
            acc += c * power;
            power *= x;
        }
        acc
    }

    #[test]
    fn matches_the_or_truth_table_at_shifted_points() {
        for n in 1..=6 {
            let coeffs = prefix_or_coefficients::<Fp97>(n);
            assert_eq!(eval(&coeffs, 1), Fp97::ZERO, "n={n}");
            for x in 2..=(n as u128) + 1 {
                assert_eq!(eval(&coeffs, x), Fp97::ONE, "n={n}, x={x}");
            }
        }
    }

    #[test]
    fn needs_cover_rows_then_columns() {
        // ell = 7, lambda = 3: row fan-ins 3, 6, 7 then column fan-ins
        // 1, 2, 3.
        assert_eq!(unbounded_fanin_or_needs(7, 3), vec![3, 6, 7, 1, 2, 3]);
        // ell an exact multiple of lambda still ends the rows at ell.
        assert_eq!(unbounded_fanin_or_needs(6, 3), vec![3, 6, 1, 2, 3]);
    }
}
