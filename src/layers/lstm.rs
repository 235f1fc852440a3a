//! Long short-term memory layer.
//!
//! The recurrence, per output unit:
//!
//! ```text
//! i  = sigmoid(W_i·x + U_i·h + b_i)
//! f  = sigmoid(W_f·x + U_f·h + b_f)
//! c~ = tanh(W_c·x + U_c·h + b_c)
//! o  = sigmoid(W_o·x + U_o·h + b_o)
//! c' = f ∘ c + i ∘ c~
//! h' = o ∘ tanh(c')
//! ```
//!
//! Gate blocks are ordered `i, f, c, o` in the loaded weight matrices
//! with a single concatenated bias. `reset()` zeroes both the hidden and
//! the cell state; call it before the first `forward()`.

use core::marker::PhantomData;

use ndarray::{aview1, Array2};

use super::sample_rate::StateDelay;
use super::{Aligned, Layer, StaticLayer};
use crate::error::{ModelError, Result};
use crate::maths::{MathsProvider, Scalar, StdMaths};

fn check_len(layer: &'static str, what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(ModelError::ShapeMismatch {
            layer,
            what,
            expected,
            found,
        });
    }
    Ok(())
}

/// Heap-allocated LSTM layer with tanh activation and sigmoid recurrent
/// activation.
#[derive(Debug, Clone)]
pub struct Lstm<T: Scalar, M: MathsProvider<T> = StdMaths> {
    in_size: usize,
    out_size: usize,

    w_i: Array2<T>,
    w_f: Array2<T>,
    w_c: Array2<T>,
    w_o: Array2<T>,

    u_i: Array2<T>,
    u_f: Array2<T>,
    u_c: Array2<T>,
    u_o: Array2<T>,

    b_i: Vec<T>,
    b_f: Vec<T>,
    b_c: Vec<T>,
    b_o: Vec<T>,

    h: Vec<T>,
    c: Vec<T>,

    it: Vec<T>,
    ft: Vec<T>,
    ot: Vec<T>,
    cand: Vec<T>,

    h_delay: StateDelay<T>,
    c_delay: StateDelay<T>,
    _maths: PhantomData<M>,
}

impl<T: Scalar, M: MathsProvider<T>> Lstm<T, M> {
    /// Creates a zero-initialized LSTM layer.
    pub fn new(in_size: usize, out_size: usize) -> Self {
        Self {
            in_size,
            out_size,
            w_i: Array2::zeros((out_size, in_size)),
            w_f: Array2::zeros((out_size, in_size)),
            w_c: Array2::zeros((out_size, in_size)),
            w_o: Array2::zeros((out_size, in_size)),
            u_i: Array2::zeros((out_size, out_size)),
            u_f: Array2::zeros((out_size, out_size)),
            u_c: Array2::zeros((out_size, out_size)),
            u_o: Array2::zeros((out_size, out_size)),
            b_i: vec![T::zero(); out_size],
            b_f: vec![T::zero(); out_size],
            b_c: vec![T::zero(); out_size],
            b_o: vec![T::zero(); out_size],
            h: vec![T::zero(); out_size],
            c: vec![T::zero(); out_size],
            it: vec![T::zero(); out_size],
            ft: vec![T::zero(); out_size],
            ot: vec![T::zero(); out_size],
            cand: vec![T::zero(); out_size],
            h_delay: StateDelay::bypass(),
            c_delay: StateDelay::bypass(),
            _maths: PhantomData,
        }
    }

    /// Adapts the layer to run at `ratio` times its training sample rate.
    /// Both the hidden and the cell state go through the shadow delay.
    ///
    /// Allocates; call during setup, never from the audio thread.
    pub fn prepare(&mut self, ratio: T) {
        self.h_delay.prepare(ratio, self.out_size);
        self.c_delay.prepare(ratio, self.out_size);
        self.reset();
    }

    /// Sets the kernel weights from `w[in_size][4 * out_size]`, gate
    /// blocks ordered `i, f, c, o`.
    pub fn set_w_vals(&mut self, w: &[Vec<T>]) -> Result<()> {
        check_len("lstm", "kernel weight rows", self.in_size, w.len())?;
        for (i, row) in w.iter().enumerate() {
            check_len("lstm", "kernel weight columns", 4 * self.out_size, row.len())?;
            for k in 0..self.out_size {
                self.w_i[(k, i)] = row[k];
                self.w_f[(k, i)] = row[self.out_size + k];
                self.w_c[(k, i)] = row[2 * self.out_size + k];
                self.w_o[(k, i)] = row[3 * self.out_size + k];
            }
        }
        Ok(())
    }

    /// Sets the recurrent weights from `u[out_size][4 * out_size]`.
    pub fn set_u_vals(&mut self, u: &[Vec<T>]) -> Result<()> {
        check_len("lstm", "recurrent weight rows", self.out_size, u.len())?;
        for (i, row) in u.iter().enumerate() {
            check_len(
                "lstm",
                "recurrent weight columns",
                4 * self.out_size,
                row.len(),
            )?;
            for k in 0..self.out_size {
                self.u_i[(k, i)] = row[k];
                self.u_f[(k, i)] = row[self.out_size + k];
                self.u_c[(k, i)] = row[2 * self.out_size + k];
                self.u_o[(k, i)] = row[3 * self.out_size + k];
            }
        }
        Ok(())
    }

    /// Sets the bias from `b[4 * out_size]`.
    pub fn set_b_vals(&mut self, b: &[T]) -> Result<()> {
        check_len("lstm", "bias", 4 * self.out_size, b.len())?;
        for k in 0..self.out_size {
            self.b_i[k] = b[k];
            self.b_f[k] = b[self.out_size + k];
            self.b_c[k] = b[2 * self.out_size + k];
            self.b_o[k] = b[3 * self.out_size + k];
        }
        Ok(())
    }
}

impl<T: Scalar, M: MathsProvider<T>> Layer<T> for Lstm<T, M> {
    fn in_size(&self) -> usize {
        self.in_size
    }

    fn out_size(&self) -> usize {
        self.out_size
    }

    fn name(&self) -> &'static str {
        "lstm"
    }

    fn reset(&mut self) {
        self.h.fill(T::zero());
        self.c.fill(T::zero());
        self.h_delay.reset();
        self.c_delay.reset();
    }

    fn forward(&mut self, input: &[T], out: &mut [T]) {
        let x = aview1(input);
        let h = aview1(&self.h);

        for i in 0..self.out_size {
            self.it[i] = M::sigmoid(
                M::dot(self.w_i.row(i), x) + M::dot(self.u_i.row(i), h) + self.b_i[i],
            );
            self.ft[i] = M::sigmoid(
                M::dot(self.w_f.row(i), x) + M::dot(self.u_f.row(i), h) + self.b_f[i],
            );
            self.ot[i] = M::sigmoid(
                M::dot(self.w_o.row(i), x) + M::dot(self.u_o.row(i), h) + self.b_o[i],
            );
            self.cand[i] = M::tanh(
                M::dot(self.w_c.row(i), x) + M::dot(self.u_c.row(i), h) + self.b_c[i],
            );
        }

        if self.h_delay.is_active() {
            {
                let c_slot = self.c_delay.write_slot();
                for i in 0..self.c.len() {
                    c_slot[i] = self.ft[i] * self.c[i] + self.it[i] * self.cand[i];
                }
                let h_slot = self.h_delay.write_slot();
                for i in 0..self.h.len() {
                    h_slot[i] = self.ot[i] * M::tanh(
                        self.ft[i] * self.c[i] + self.it[i] * self.cand[i],
                    );
                }
            }
            self.c_delay.advance_into(&mut self.c);
            self.h_delay.advance_into(&mut self.h);
            out.copy_from_slice(&self.h);
        } else {
            for i in 0..self.out_size {
                let c_next = self.ft[i] * self.c[i] + self.it[i] * self.cand[i];
                self.c[i] = c_next;
                let h_next = self.ot[i] * M::tanh(c_next);
                self.h[i] = h_next;
                out[i] = h_next;
            }
        }
    }
}

/// Compile-time-sized LSTM layer.
#[derive(Debug, Clone)]
pub struct LstmT<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T> = StdMaths> {
    w_i: Aligned<[[T; IN]; OUT]>,
    w_f: Aligned<[[T; IN]; OUT]>,
    w_c: Aligned<[[T; IN]; OUT]>,
    w_o: Aligned<[[T; IN]; OUT]>,

    u_i: Aligned<[[T; OUT]; OUT]>,
    u_f: Aligned<[[T; OUT]; OUT]>,
    u_c: Aligned<[[T; OUT]; OUT]>,
    u_o: Aligned<[[T; OUT]; OUT]>,

    b_i: [T; OUT],
    b_f: [T; OUT],
    b_c: [T; OUT],
    b_o: [T; OUT],

    it: [T; OUT],
    ft: [T; OUT],
    ot: [T; OUT],
    cand: [T; OUT],

    c: [T; OUT],
    outs: Aligned<[T; OUT]>,

    h_delay: StateDelay<T>,
    c_delay: StateDelay<T>,
    _maths: PhantomData<M>,
}

impl<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T>> LstmT<T, IN, OUT, M> {
    /// Creates a zero-initialized LSTM layer.
    pub fn new() -> Self {
        Self {
            w_i: Aligned([[T::zero(); IN]; OUT]),
            w_f: Aligned([[T::zero(); IN]; OUT]),
            w_c: Aligned([[T::zero(); IN]; OUT]),
            w_o: Aligned([[T::zero(); IN]; OUT]),
            u_i: Aligned([[T::zero(); OUT]; OUT]),
            u_f: Aligned([[T::zero(); OUT]; OUT]),
            u_c: Aligned([[T::zero(); OUT]; OUT]),
            u_o: Aligned([[T::zero(); OUT]; OUT]),
            b_i: [T::zero(); OUT],
            b_f: [T::zero(); OUT],
            b_c: [T::zero(); OUT],
            b_o: [T::zero(); OUT],
            it: [T::zero(); OUT],
            ft: [T::zero(); OUT],
            ot: [T::zero(); OUT],
            cand: [T::zero(); OUT],
            c: [T::zero(); OUT],
            outs: Aligned([T::zero(); OUT]),
            h_delay: StateDelay::bypass(),
            c_delay: StateDelay::bypass(),
            _maths: PhantomData,
        }
    }

    /// Adapts the layer to run at `ratio` times its training sample rate.
    ///
    /// Allocates; call during setup, never from the audio thread.
    pub fn prepare(&mut self, ratio: T) {
        self.h_delay.prepare(ratio, OUT);
        self.c_delay.prepare(ratio, OUT);
        self.reset();
    }

    /// Sets the kernel weights from `w[IN][4 * OUT]`, gate blocks ordered
    /// `i, f, c, o`.
    pub fn set_w_vals(&mut self, w: &[Vec<T>]) -> Result<()> {
        check_len("lstm", "kernel weight rows", IN, w.len())?;
        for (i, row) in w.iter().enumerate() {
            check_len("lstm", "kernel weight columns", 4 * OUT, row.len())?;
            for k in 0..OUT {
                self.w_i.0[k][i] = row[k];
                self.w_f.0[k][i] = row[OUT + k];
                self.w_c.0[k][i] = row[2 * OUT + k];
                self.w_o.0[k][i] = row[3 * OUT + k];
            }
        }
        Ok(())
    }

    /// Sets the recurrent weights from `u[OUT][4 * OUT]`.
    pub fn set_u_vals(&mut self, u: &[Vec<T>]) -> Result<()> {
        check_len("lstm", "recurrent weight rows", OUT, u.len())?;
        for (i, row) in u.iter().enumerate() {
            check_len("lstm", "recurrent weight columns", 4 * OUT, row.len())?;
            for k in 0..OUT {
                self.u_i.0[k][i] = row[k];
                self.u_f.0[k][i] = row[OUT + k];
                self.u_c.0[k][i] = row[2 * OUT + k];
                self.u_o.0[k][i] = row[3 * OUT + k];
            }
        }
        Ok(())
    }

    /// Sets the bias from `b[4 * OUT]`.
    pub fn set_b_vals(&mut self, b: &[T]) -> Result<()> {
        check_len("lstm", "bias", 4 * OUT, b.len())?;
        for k in 0..OUT {
            self.b_i[k] = b[k];
            self.b_f[k] = b[OUT + k];
            self.b_c[k] = b[2 * OUT + k];
            self.b_o[k] = b[3 * OUT + k];
        }
        Ok(())
    }
}

impl<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T>> Default
    for LstmT<T, IN, OUT, M>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T>> StaticLayer<T>
    for LstmT<T, IN, OUT, M>
{
    const IN_SIZE: usize = IN;
    const OUT_SIZE: usize = OUT;

    fn name(&self) -> &'static str {
        "lstm"
    }

    fn reset(&mut self) {
        self.outs = Aligned([T::zero(); OUT]);
        self.c = [T::zero(); OUT];
        self.h_delay.reset();
        self.c_delay.reset();
    }

    fn forward(&mut self, input: &[T]) {
        debug_assert_eq!(input.len(), IN);
        let x = aview1(input);
        let h = self.outs.0;

        for i in 0..OUT {
            self.it[i] = M::sigmoid(
                M::dot(aview1(&self.w_i.0[i]), x)
                    + M::dot(aview1(&self.u_i.0[i]), aview1(&h))
                    + self.b_i[i],
            );
            self.ft[i] = M::sigmoid(
                M::dot(aview1(&self.w_f.0[i]), x)
                    + M::dot(aview1(&self.u_f.0[i]), aview1(&h))
                    + self.b_f[i],
            );
            self.ot[i] = M::sigmoid(
                M::dot(aview1(&self.w_o.0[i]), x)
                    + M::dot(aview1(&self.u_o.0[i]), aview1(&h))
                    + self.b_o[i],
            );
            self.cand[i] = M::tanh(
                M::dot(aview1(&self.w_c.0[i]), x)
                    + M::dot(aview1(&self.u_c.0[i]), aview1(&h))
                    + self.b_c[i],
            );
        }

        if self.h_delay.is_active() {
            {
                let c_slot = self.c_delay.write_slot();
                for i in 0..OUT {
                    c_slot[i] = self.ft[i] * self.c[i] + self.it[i] * self.cand[i];
                }
            }
            {
                let h_slot = self.h_delay.write_slot();
                for i in 0..OUT {
                    let c_next = self.ft[i] * self.c[i] + self.it[i] * self.cand[i];
                    h_slot[i] = self.ot[i] * M::tanh(c_next);
                }
            }
            self.c_delay.advance_into(&mut self.c);
            self.h_delay.advance_into(&mut self.outs.0);
        } else {
            for i in 0..OUT {
                let c_next = self.ft[i] * self.c[i] + self.it[i] * self.cand[i];
                self.c[i] = c_next;
                self.outs.0[i] = self.ot[i] * M::tanh(c_next);
            }
        }
    }

    fn output(&self) -> &[T] {
        &self.outs.0
    }
}

/// Loader-facing surface shared by the dynamic and static LSTM layers.
pub trait LstmApi<T: Scalar> {
    /// `(in_size, out_size)`.
    fn dims(&self) -> (usize, usize);
    fn set_w_vals(&mut self, w: &[Vec<T>]) -> Result<()>;
    fn set_u_vals(&mut self, u: &[Vec<T>]) -> Result<()>;
    fn set_b_vals(&mut self, b: &[T]) -> Result<()>;
}

impl<T: Scalar, M: MathsProvider<T>> LstmApi<T> for Lstm<T, M> {
    fn dims(&self) -> (usize, usize) {
        (self.in_size, self.out_size)
    }

    fn set_w_vals(&mut self, w: &[Vec<T>]) -> Result<()> {
        Lstm::set_w_vals(self, w)
    }

    fn set_u_vals(&mut self, u: &[Vec<T>]) -> Result<()> {
        Lstm::set_u_vals(self, u)
    }

    fn set_b_vals(&mut self, b: &[T]) -> Result<()> {
        Lstm::set_b_vals(self, b)
    }
}

impl<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T>> LstmApi<T>
    for LstmT<T, IN, OUT, M>
{
    fn dims(&self) -> (usize, usize) {
        (IN, OUT)
    }

    fn set_w_vals(&mut self, w: &[Vec<T>]) -> Result<()> {
        LstmT::set_w_vals(self, w)
    }

    fn set_u_vals(&mut self, u: &[Vec<T>]) -> Result<()> {
        LstmT::set_u_vals(self, u)
    }

    fn set_b_vals(&mut self, b: &[T]) -> Result<()> {
        LstmT::set_b_vals(self, b)
    }
}
