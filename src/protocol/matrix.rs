//! Dense matrices over a field, and a secret-shared matrix product
//! built as one [`Batch`] of [`Multiply`]s (one Beaver triple per
//! entry of the `numRows(A) x numColumns(A) x numColumns(B)` dot
//! products), followed by a local per-cell sum.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::Field;
use crate::peers::Identity;
use crate::protocol::batch::{self, Batch};
use crate::protocol::multiply::{self, Multiply};
use crate::randomness::kinds::BeaverTriple;
use async_trait::async_trait;
use std::any::Any;

/// A dense, row-major matrix. Used both as a plain local value (a
/// public matrix of known entries) and to hold one party's shares of a
/// secret-shared matrix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Matrix<F: Field> {
    buffer: Vec<F>,
    num_rows: usize,
    num_columns: usize,
}

impl<F: Field> Matrix<F> {
    /// All-zero matrix of the given shape.
    #[must_use]
    pub fn zero(num_rows: usize, num_columns: usize) -> Self {
        Matrix {
            buffer: vec![F::ZERO; num_rows * num_columns],
            num_rows,
            num_columns,
        }
    }

    /// # Panics
    /// Panics if `buffer.len() != num_rows * num_columns`.
    #[must_use]
    pub fn from_buffer(buffer: Vec<F>, num_rows: usize, num_columns: usize) -> Self {
        assert_eq!(buffer.len(), num_rows * num_columns);
        Matrix {
            buffer,
            num_rows,
            num_columns,
        }
    }

    #[must_use]
    pub fn identity(n: usize) -> Self {
        let mut m = Matrix::zero(n, n);
        for i in 0..n {
            *m.at_mut(i, i) = F::ONE;
        }
        m
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    #[must_use]
    pub fn at(&self, i: usize, j: usize) -> F {
        self.buffer[self.num_columns * i + j]
    }

    pub fn at_mut(&mut self, i: usize, j: usize) -> &mut F {
        &mut self.buffer[self.num_columns * i + j]
    }

    #[must_use]
    pub fn transpose(&self) -> Self {
        let mut out = Matrix::zero(self.num_columns, self.num_rows);
        for i in 0..self.num_rows {
            for j in 0..self.num_columns {
                *out.at_mut(j, i) = self.at(i, j);
            }
        }
        out
    }

    #[must_use]
    pub fn trace(&self) -> F {
        debug_assert_eq!(self.num_rows, self.num_columns);
        (0..self.num_rows).fold(F::ZERO, |acc, i| acc + self.at(i, i))
    }
}

/// Multiplies two matrices of publicly-known entries (no interaction).
///
/// # Panics
/// Panics if `a.num_columns() != b.num_rows()`.
#[must_use]
pub fn plain_matrix_mult<F: Field>(a: &Matrix<F>, b: &Matrix<F>) -> Matrix<F> {
    assert_eq!(a.num_columns(), b.num_rows());
    let mut c = Matrix::zero(a.num_rows(), b.num_columns());
    for i in 0..a.num_rows() {
        for j in 0..b.num_columns() {
            let mut sum = F::ZERO;
            for k in 0..a.num_columns() {
                sum += a.at(i, k) * b.at(k, j);
            }
            *c.at_mut(i, j) = sum;
        }
    }
    c
}

/// Multiplies two secret-shared matrices: `a.num_columns()` must equal
/// `b.num_rows()`, and `triples.len()` must equal
/// `a.num_rows() * a.num_columns() * b.num_columns()`, one per entry
/// product summed into the output.
pub struct MatrixMultiply<I: Identity, F: Field> {
    a: Matrix<F>,
    b: Matrix<F>,
    triples: Vec<BeaverTriple<F>>,
    revealer: I,
}

impl<I: Identity, F: Field> MatrixMultiply<I, F> {
    #[must_use]
    pub fn new(a: Matrix<F>, b: Matrix<F>, triples: Vec<BeaverTriple<F>>, revealer: I) -> Self {
        MatrixMultiply {
            a,
            b,
            triples,
            revealer,
        }
    }
}

#[async_trait]
impl<I: Identity, F: Field> Fronctocol<I> for MatrixMultiply<I, F> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        crate::invariant!(
            self.a.num_columns() == self.b.num_rows(),
            Error::InconsistentRandomnessInfo {
                kind: "MatrixMultiply inner dimension mismatch"
            }
        );
        let expected = self.a.num_rows() * self.a.num_columns() * self.b.num_columns();
        crate::invariant!(
            self.triples.len() == expected,
            Error::InconsistentRandomnessInfo {
                kind: "MatrixMultiply triple count mismatch with output size"
            }
        );
        let mut siblings = Vec::with_capacity(expected);
        let mut triples = std::mem::take(&mut self.triples).into_iter();
        for i in 0..self.a.num_rows() {
            for j in 0..self.b.num_columns() {
                for k in 0..self.a.num_columns() {
                    let triple = triples.next().expect("exact count checked above");
                    siblings.push(Multiply::new(
                        self.a.at(i, k),
                        self.b.at(k, j),
                        triple,
                        self.revealer.clone(),
                    ));
                }
            }
        }
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(Batch::of(siblings)), peers);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("MatrixMultiply"))
    }

    async fn handle_promise(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _promise: FronctocolId,
        _result: Box<dyn Any + Send>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("MatrixMultiply"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        let results = result
            .and_then(batch::downcast_results)
            .ok_or(Error::UnexpectedResultType("MatrixMultiply batch"))?;
        let mut results = results.into_iter();
        let num_rows = self.a.num_rows();
        let num_columns = self.b.num_columns();
        let inner = self.a.num_columns();
        let mut out = Matrix::zero(num_rows, num_columns);
        for i in 0..num_rows {
            for j in 0..num_columns {
                let mut sum = F::ZERO;
                for _ in 0..inner {
                    let r = results.next().expect("one entry per product").ok_or(
                        Error::InconsistentRandomnessInfo {
                            kind: "MatrixMultiply sibling completed with no result",
                        },
                    )?;
                    sum += multiply::downcast::<F>(r).ok_or(Error::InconsistentRandomnessInfo {
                        kind: "Multiply result type mismatch in MatrixMultiply",
                    })?;
                }
                *out.at_mut(i, j) = sum;
            }
        }
        ctx.complete_with_result(Box::new(out));
        Ok(())
    }
}

/// Downcasts a completed `MatrixMultiply`'s promised result.
#[must_use]
pub fn downcast<F: Field>(result: Box<dyn Any + Send>) -> Option<Matrix<F>> {
    result.downcast::<Matrix<F>>().ok().map(|b| *b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ff::Fp31;

    #[test]
    fn plain_mult_matches_hand_computation() {
        let a = Matrix::from_buffer(
            vec![Fp31::from_u128(5), Fp31::from_u128(8), Fp31::from_u128(3), Fp31::from_u128(2)],
            2,
            2,
        );
        let b = Matrix::from_buffer(
            vec![Fp31::from_u128(6), Fp31::from_u128(3), Fp31::from_u128(2), Fp31::from_u128(5)],
            2,
            2,
        );
        let c = plain_matrix_mult(&a, &b);
        // [5 8; 3 2] * [6 3; 2 5] = [5*6+8*2 5*3+8*5; 3*6+2*2 3*3+2*5]
        //            = [46 55; 22 19]
        assert_eq!(c.at(0, 0), Fp31::from_u128(46 % 31));
        assert_eq!(c.at(0, 1), Fp31::from_u128(55 % 31));
        assert_eq!(c.at(1, 0), Fp31::from_u128(22 % 31));
        assert_eq!(c.at(1, 1), Fp31::from_u128(19 % 31));
    }

    #[test]
    fn identity_is_multiplicative_identity() {
        let a = Matrix::from_buffer(
            vec![Fp31::from_u128(5), Fp31::from_u128(8), Fp31::from_u128(3), Fp31::from_u128(2)],
            2,
            2,
        );
        let identity = Matrix::identity(2);
        assert_eq!(plain_matrix_mult(&a, &identity), a);
    }
}
