//! Fully-connected (dense) layer.

use core::marker::PhantomData;

use ndarray::{aview1, Array1, Array2};

use super::{Aligned, Layer, StaticLayer};
use crate::error::{ModelError, Result};
use crate::maths::{MathsProvider, Scalar, StdMaths};

/// Heap-allocated dense layer: `out = W · in + b`.
///
/// Stateless; `reset` is a no-op.
#[derive(Debug, Clone)]
pub struct Dense<T: Scalar, M: MathsProvider<T> = StdMaths> {
    weights: Array2<T>,
    bias: Array1<T>,
    _maths: PhantomData<M>,
}

impl<T: Scalar, M: MathsProvider<T>> Dense<T, M> {
    /// Creates a zero-initialized dense layer for the given sizes.
    pub fn new(in_size: usize, out_size: usize) -> Self {
        Self {
            weights: Array2::zeros((out_size, in_size)),
            bias: Array1::zeros(out_size),
            _maths: PhantomData,
        }
    }

    /// Sets the kernel weights from `rows[out_size][in_size]`.
    pub fn set_weights(&mut self, rows: &[Vec<T>]) -> Result<()> {
        let (out_size, in_size) = self.weights.dim();
        if rows.len() != out_size {
            return Err(ModelError::ShapeMismatch {
                layer: "dense",
                what: "weight rows",
                expected: out_size,
                found: rows.len(),
            });
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != in_size {
                return Err(ModelError::ShapeMismatch {
                    layer: "dense",
                    what: "weight columns",
                    expected: in_size,
                    found: row.len(),
                });
            }
            for (k, &w) in row.iter().enumerate() {
                self.weights[(i, k)] = w;
            }
        }
        Ok(())
    }

    /// Sets the bias from `bias[out_size]`.
    pub fn set_bias(&mut self, bias: &[T]) -> Result<()> {
        if bias.len() != self.bias.len() {
            return Err(ModelError::ShapeMismatch {
                layer: "dense",
                what: "bias",
                expected: self.bias.len(),
                found: bias.len(),
            });
        }
        self.bias.assign(&aview1(bias));
        Ok(())
    }

    /// Returns one kernel weight.
    pub fn weight(&self, out: usize, input: usize) -> T {
        self.weights[(out, input)]
    }

    /// Returns one bias value.
    pub fn bias(&self, out: usize) -> T {
        self.bias[out]
    }
}

impl<T: Scalar, M: MathsProvider<T>> Layer<T> for Dense<T, M> {
    fn in_size(&self) -> usize {
        self.weights.ncols()
    }

    fn out_size(&self) -> usize {
        self.weights.nrows()
    }

    fn name(&self) -> &'static str {
        "dense"
    }

    fn forward(&mut self, input: &[T], out: &mut [T]) {
        let x = aview1(input);
        for (y, (row, &b)) in out
            .iter_mut()
            .zip(self.weights.rows().into_iter().zip(self.bias.iter()))
        {
            *y = M::dot(row, x) + b;
        }
    }
}

/// Compile-time-sized dense layer.
///
/// Weights and output live in fixed arrays, so the whole forward pass
/// monomorphizes to straight-line code.
#[derive(Debug, Clone)]
pub struct DenseT<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T> = StdMaths> {
    weights: Aligned<[[T; IN]; OUT]>,
    bias: [T; OUT],
    outs: Aligned<[T; OUT]>,
    _maths: PhantomData<M>,
}

impl<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T>> DenseT<T, IN, OUT, M> {
    /// Creates a zero-initialized dense layer.
    pub fn new() -> Self {
        Self {
            weights: Aligned([[T::zero(); IN]; OUT]),
            bias: [T::zero(); OUT],
            outs: Aligned([T::zero(); OUT]),
            _maths: PhantomData,
        }
    }

    /// Sets the kernel weights from `rows[OUT][IN]`.
    pub fn set_weights(&mut self, rows: &[Vec<T>]) -> Result<()> {
        if rows.len() != OUT {
            return Err(ModelError::ShapeMismatch {
                layer: "dense",
                what: "weight rows",
                expected: OUT,
                found: rows.len(),
            });
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != IN {
                return Err(ModelError::ShapeMismatch {
                    layer: "dense",
                    what: "weight columns",
                    expected: IN,
                    found: row.len(),
                });
            }
            self.weights.0[i].copy_from_slice(row);
        }
        Ok(())
    }

    /// Sets the bias from `bias[OUT]`.
    pub fn set_bias(&mut self, bias: &[T]) -> Result<()> {
        if bias.len() != OUT {
            return Err(ModelError::ShapeMismatch {
                layer: "dense",
                what: "bias",
                expected: OUT,
                found: bias.len(),
            });
        }
        self.bias.copy_from_slice(bias);
        Ok(())
    }
}

impl<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T>> Default
    for DenseT<T, IN, OUT, M>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T>> StaticLayer<T>
    for DenseT<T, IN, OUT, M>
{
    const IN_SIZE: usize = IN;
    const OUT_SIZE: usize = OUT;

    fn name(&self) -> &'static str {
        "dense"
    }

    fn reset(&mut self) {}

    fn forward(&mut self, input: &[T]) {
        debug_assert_eq!(input.len(), IN);
        let x = aview1(input);
        for i in 0..OUT {
            self.outs.0[i] = M::dot(aview1(&self.weights.0[i]), x) + self.bias[i];
        }
    }

    fn output(&self) -> &[T] {
        &self.outs.0
    }
}

/// Loader-facing surface shared by the dynamic and static dense layers.
pub trait DenseApi<T: Scalar> {
    /// `(in_size, out_size)`.
    fn dims(&self) -> (usize, usize);
    /// Kernel weights, `rows[out_size][in_size]`.
    fn set_weights(&mut self, rows: &[Vec<T>]) -> Result<()>;
    /// Bias, `bias[out_size]`.
    fn set_bias(&mut self, bias: &[T]) -> Result<()>;
}

impl<T: Scalar, M: MathsProvider<T>> DenseApi<T> for Dense<T, M> {
    fn dims(&self) -> (usize, usize) {
        (self.weights.ncols(), self.weights.nrows())
    }

    fn set_weights(&mut self, rows: &[Vec<T>]) -> Result<()> {
        Dense::set_weights(self, rows)
    }

    fn set_bias(&mut self, bias: &[T]) -> Result<()> {
        Dense::set_bias(self, bias)
    }
}

impl<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T>> DenseApi<T>
    for DenseT<T, IN, OUT, M>
{
    fn dims(&self) -> (usize, usize) {
        (IN, OUT)
    }

    fn set_weights(&mut self, rows: &[Vec<T>]) -> Result<()> {
        DenseT::set_weights(self, rows)
    }

    fn set_bias(&mut self, bias: &[T]) -> Result<()> {
        DenseT::set_bias(self, bias)
    }
}
