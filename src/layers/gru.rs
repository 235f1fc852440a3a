//! Gated recurrent unit layer.
//!
//! The recurrence, per output unit:
//!
//! ```text
//! z  = sigmoid(W_z·x + U_z·h + b_z)
//! r  = sigmoid(W_r·x + U_r·h + b_r)
//! c  = tanh(W_c·x + b_c0 + r ∘ (U_c·h + b_c1))
//! h' = (1 - z) ∘ c + z ∘ h
//! ```
//!
//! Gate blocks are ordered `z, r, h` in the loaded weight matrices and
//! the bias comes in two additively independent halves (kernel and
//! recurrent); the candidate gate keeps its halves separate, which is why
//! `b_c0`/`b_c1` survive to the recurrence. Exporters using other
//! conventions reorder on the export side.
//!
//! Call `reset()` before the first `forward()` so the recurrent state
//! starts from zero.

use core::marker::PhantomData;

use ndarray::{aview1, Array2};

use super::sample_rate::StateDelay;
use super::{Aligned, Layer, StaticLayer};
use crate::error::{ModelError, Result};
use crate::maths::{MathsProvider, Scalar, StdMaths};

fn check_rows(layer: &'static str, what: &'static str, expected: usize, found: usize) -> Result<()> {
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

/// Heap-allocated GRU layer with tanh activation and sigmoid recurrent
/// activation.
#[derive(Debug, Clone)]
pub struct Gru<T: Scalar, M: MathsProvider<T> = StdMaths> {
    in_size: usize,
    out_size: usize,

    w_z: Array2<T>,
    w_r: Array2<T>,
    w_c: Array2<T>,

    u_z: Array2<T>,
    u_r: Array2<T>,
    u_c: Array2<T>,

    b_z: Vec<T>,
    b_r: Vec<T>,
    b_c0: Vec<T>,
    b_c1: Vec<T>,

    h: Vec<T>,

    zt: Vec<T>,
    rt: Vec<T>,
    ct: Vec<T>,

    delay: StateDelay<T>,
    _maths: PhantomData<M>,
}

impl<T: Scalar, M: MathsProvider<T>> Gru<T, M> {
    /// Creates a zero-initialized GRU layer.
    pub fn new(in_size: usize, out_size: usize) -> Self {
        Self {
            in_size,
            out_size,
            w_z: Array2::zeros((out_size, in_size)),
            w_r: Array2::zeros((out_size, in_size)),
            w_c: Array2::zeros((out_size, in_size)),
            u_z: Array2::zeros((out_size, out_size)),
            u_r: Array2::zeros((out_size, out_size)),
            u_c: Array2::zeros((out_size, out_size)),
            b_z: vec![T::zero(); out_size],
            b_r: vec![T::zero(); out_size],
            b_c0: vec![T::zero(); out_size],
            b_c1: vec![T::zero(); out_size],
            h: vec![T::zero(); out_size],
            zt: vec![T::zero(); out_size],
            rt: vec![T::zero(); out_size],
            ct: vec![T::zero(); out_size],
            delay: StateDelay::bypass(),
            _maths: PhantomData,
        }
    }

    /// Adapts the layer to run at `ratio` times its training sample rate.
    ///
    /// Allocates the shadow delay line and resets the layer; call during
    /// setup, never from the audio thread.
    pub fn prepare(&mut self, ratio: T) {
        self.delay.prepare(ratio, self.out_size);
        self.reset();
    }

    /// Sets the kernel weights from `w[in_size][3 * out_size]`, gate
    /// blocks ordered `z, r, h`.
    pub fn set_w_vals(&mut self, w: &[Vec<T>]) -> Result<()> {
        check_rows("gru", "kernel weight rows", self.in_size, w.len())?;
        for (i, row) in w.iter().enumerate() {
            check_rows("gru", "kernel weight columns", 3 * self.out_size, row.len())?;
            for k in 0..self.out_size {
                self.w_z[(k, i)] = row[k];
                self.w_r[(k, i)] = row[self.out_size + k];
                self.w_c[(k, i)] = row[2 * self.out_size + k];
            }
        }
        Ok(())
    }

    /// Sets the recurrent weights from `u[out_size][3 * out_size]`.
    pub fn set_u_vals(&mut self, u: &[Vec<T>]) -> Result<()> {
        check_rows("gru", "recurrent weight rows", self.out_size, u.len())?;
        for (i, row) in u.iter().enumerate() {
            check_rows("gru", "recurrent weight columns", 3 * self.out_size, row.len())?;
            for k in 0..self.out_size {
                self.u_z[(k, i)] = row[k];
                self.u_r[(k, i)] = row[self.out_size + k];
                self.u_c[(k, i)] = row[2 * self.out_size + k];
            }
        }
        Ok(())
    }

    /// Sets the bias from `b[2][3 * out_size]`: `b[0]` is the kernel
    /// half, `b[1]` the recurrent half.
    pub fn set_b_vals(&mut self, b: &[Vec<T>]) -> Result<()> {
        check_rows("gru", "bias rows", 2, b.len())?;
        for row in b {
            check_rows("gru", "bias columns", 3 * self.out_size, row.len())?;
        }
        for k in 0..self.out_size {
            self.b_z[k] = b[0][k] + b[1][k];
            self.b_r[k] = b[0][self.out_size + k] + b[1][self.out_size + k];
            self.b_c0[k] = b[0][2 * self.out_size + k];
            self.b_c1[k] = b[1][2 * self.out_size + k];
        }
        Ok(())
    }
}

impl<T: Scalar, M: MathsProvider<T>> Layer<T> for Gru<T, M> {
    fn in_size(&self) -> usize {
        self.in_size
    }

    fn out_size(&self) -> usize {
        self.out_size
    }

    fn name(&self) -> &'static str {
        "gru"
    }

    fn reset(&mut self) {
        self.h.fill(T::zero());
        self.delay.reset();
    }

    fn forward(&mut self, input: &[T], out: &mut [T]) {
        let x = aview1(input);
        let h = aview1(&self.h);

        for i in 0..self.out_size {
            self.zt[i] = M::sigmoid(
                M::dot(self.w_z.row(i), x) + M::dot(self.u_z.row(i), h) + self.b_z[i],
            );
            self.rt[i] = M::sigmoid(
                M::dot(self.w_r.row(i), x) + M::dot(self.u_r.row(i), h) + self.b_r[i],
            );
        }
        for i in 0..self.out_size {
            self.ct[i] = M::tanh(
                M::dot(self.w_c.row(i), x)
                    + self.b_c0[i]
                    + self.rt[i] * (M::dot(self.u_c.row(i), h) + self.b_c1[i]),
            );
        }

        if self.delay.is_active() {
            let slot = self.delay.write_slot();
            for i in 0..self.h.len() {
                slot[i] = (T::one() - self.zt[i]) * self.ct[i] + self.zt[i] * self.h[i];
            }
            self.delay.advance_into(&mut self.h);
            out.copy_from_slice(&self.h);
        } else {
            for i in 0..self.out_size {
                let next = (T::one() - self.zt[i]) * self.ct[i] + self.zt[i] * self.h[i];
                self.h[i] = next;
                out[i] = next;
            }
        }
    }
}

/// Compile-time-sized GRU layer.
#[derive(Debug, Clone)]
pub struct GruT<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T> = StdMaths> {
    w_z: Aligned<[[T; IN]; OUT]>,
    w_r: Aligned<[[T; IN]; OUT]>,
    w_c: Aligned<[[T; IN]; OUT]>,

    u_z: Aligned<[[T; OUT]; OUT]>,
    u_r: Aligned<[[T; OUT]; OUT]>,
    u_c: Aligned<[[T; OUT]; OUT]>,

    b_z: [T; OUT],
    b_r: [T; OUT],
    b_c0: [T; OUT],
    b_c1: [T; OUT],

    zt: [T; OUT],
    rt: [T; OUT],
    ct: [T; OUT],

    outs: Aligned<[T; OUT]>,
    delay: StateDelay<T>,
    _maths: PhantomData<M>,
}

impl<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T>> GruT<T, IN, OUT, M> {
    /// Creates a zero-initialized GRU layer.
    pub fn new() -> Self {
        Self {
            w_z: Aligned([[T::zero(); IN]; OUT]),
            w_r: Aligned([[T::zero(); IN]; OUT]),
            w_c: Aligned([[T::zero(); IN]; OUT]),
            u_z: Aligned([[T::zero(); OUT]; OUT]),
            u_r: Aligned([[T::zero(); OUT]; OUT]),
            u_c: Aligned([[T::zero(); OUT]; OUT]),
            b_z: [T::zero(); OUT],
            b_r: [T::zero(); OUT],
            b_c0: [T::zero(); OUT],
            b_c1: [T::zero(); OUT],
            zt: [T::zero(); OUT],
            rt: [T::zero(); OUT],
            ct: [T::zero(); OUT],
            outs: Aligned([T::zero(); OUT]),
            delay: StateDelay::bypass(),
            _maths: PhantomData,
        }
    }

    /// Adapts the layer to run at `ratio` times its training sample rate.
    ///
    /// Allocates the shadow delay line and resets the layer; call during
    /// setup, never from the audio thread.
    pub fn prepare(&mut self, ratio: T) {
        self.delay.prepare(ratio, OUT);
        self.reset();
    }

    /// Sets the kernel weights from `w[IN][3 * OUT]`, gate blocks ordered
    /// `z, r, h`.
    pub fn set_w_vals(&mut self, w: &[Vec<T>]) -> Result<()> {
        check_rows("gru", "kernel weight rows", IN, w.len())?;
        for (i, row) in w.iter().enumerate() {
            check_rows("gru", "kernel weight columns", 3 * OUT, row.len())?;
            for k in 0..OUT {
                self.w_z.0[k][i] = row[k];
                self.w_r.0[k][i] = row[OUT + k];
                self.w_c.0[k][i] = row[2 * OUT + k];
            }
        }
        Ok(())
    }

    /// Sets the recurrent weights from `u[OUT][3 * OUT]`.
    pub fn set_u_vals(&mut self, u: &[Vec<T>]) -> Result<()> {
        check_rows("gru", "recurrent weight rows", OUT, u.len())?;
        for (i, row) in u.iter().enumerate() {
            check_rows("gru", "recurrent weight columns", 3 * OUT, row.len())?;
            for k in 0..OUT {
                self.u_z.0[k][i] = row[k];
                self.u_r.0[k][i] = row[OUT + k];
                self.u_c.0[k][i] = row[2 * OUT + k];
            }
        }
        Ok(())
    }

    /// Sets the bias from `b[2][3 * OUT]`.
    pub fn set_b_vals(&mut self, b: &[Vec<T>]) -> Result<()> {
        check_rows("gru", "bias rows", 2, b.len())?;
        for row in b {
            check_rows("gru", "bias columns", 3 * OUT, row.len())?;
        }
        for k in 0..OUT {
            self.b_z[k] = b[0][k] + b[1][k];
            self.b_r[k] = b[0][OUT + k] + b[1][OUT + k];
            self.b_c0[k] = b[0][2 * OUT + k];
            self.b_c1[k] = b[1][2 * OUT + k];
        }
        Ok(())
    }
}

impl<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T>> Default
    for GruT<T, IN, OUT, M>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T>> StaticLayer<T>
    for GruT<T, IN, OUT, M>
{
    const IN_SIZE: usize = IN;
    const OUT_SIZE: usize = OUT;

    fn name(&self) -> &'static str {
        "gru"
    }

    fn reset(&mut self) {
        self.outs = Aligned([T::zero(); OUT]);
        self.delay.reset();
    }

    fn forward(&mut self, input: &[T]) {
        debug_assert_eq!(input.len(), IN);
        let x = aview1(input);
        let h = self.outs.0;

        for i in 0..OUT {
            self.zt[i] = M::sigmoid(
                M::dot(aview1(&self.w_z.0[i]), x)
                    + M::dot(aview1(&self.u_z.0[i]), aview1(&h))
                    + self.b_z[i],
            );
            self.rt[i] = M::sigmoid(
                M::dot(aview1(&self.w_r.0[i]), x)
                    + M::dot(aview1(&self.u_r.0[i]), aview1(&h))
                    + self.b_r[i],
            );
        }
        for i in 0..OUT {
            self.ct[i] = M::tanh(
                M::dot(aview1(&self.w_c.0[i]), x)
                    + self.b_c0[i]
                    + self.rt[i] * (M::dot(aview1(&self.u_c.0[i]), aview1(&h)) + self.b_c1[i]),
            );
        }

        if self.delay.is_active() {
            let slot = self.delay.write_slot();
            for i in 0..OUT {
                slot[i] = (T::one() - self.zt[i]) * self.ct[i] + self.zt[i] * h[i];
            }
            self.delay.advance_into(&mut self.outs.0);
        } else {
            for i in 0..OUT {
                self.outs.0[i] = (T::one() - self.zt[i]) * self.ct[i] + self.zt[i] * h[i];
            }
        }
    }

    fn output(&self) -> &[T] {
        &self.outs.0
    }
}

/// Loader-facing surface shared by the dynamic and static GRU layers.
pub trait GruApi<T: Scalar> {
    /// `(in_size, out_size)`.
    fn dims(&self) -> (usize, usize);
    fn set_w_vals(&mut self, w: &[Vec<T>]) -> Result<()>;
    fn set_u_vals(&mut self, u: &[Vec<T>]) -> Result<()>;
    fn set_b_vals(&mut self, b: &[Vec<T>]) -> Result<()>;
}

impl<T: Scalar, M: MathsProvider<T>> GruApi<T> for Gru<T, M> {
    fn dims(&self) -> (usize, usize) {
        (self.in_size, self.out_size)
    }

    fn set_w_vals(&mut self, w: &[Vec<T>]) -> Result<()> {
        Gru::set_w_vals(self, w)
    }

    fn set_u_vals(&mut self, u: &[Vec<T>]) -> Result<()> {
        Gru::set_u_vals(self, u)
    }

    fn set_b_vals(&mut self, b: &[Vec<T>]) -> Result<()> {
        Gru::set_b_vals(self, b)
    }
}

impl<T: Scalar, const IN: usize, const OUT: usize, M: MathsProvider<T>> GruApi<T>
    for GruT<T, IN, OUT, M>
{
    fn dims(&self) -> (usize, usize) {
        (IN, OUT)
    }

    fn set_w_vals(&mut self, w: &[Vec<T>]) -> Result<()> {
        GruT::set_w_vals(self, w)
    }

    fn set_u_vals(&mut self, u: &[Vec<T>]) -> Result<()> {
        GruT::set_u_vals(self, u)
    }

    fn set_b_vals(&mut self, b: &[Vec<T>]) -> Result<()> {
        GruT::set_b_vals(self, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    // Single-unit GRU checked against the recurrence written out by hand.
    #[test]
    fn forward_matches_the_recurrence() {
        let mut gru = Gru::<f64>::new(1, 1);
        let (wz, wr, wc) = (0.4, -0.3, 0.8);
        let (uz, ur, uc) = (0.2, 0.5, -0.6);
        let (bz0, bz1, br0, br1, bc0, bc1) = (0.01, 0.02, -0.05, 0.03, 0.1, -0.2);
        gru.set_w_vals(&[vec![wz, wr, wc]]).unwrap();
        gru.set_u_vals(&[vec![uz, ur, uc]]).unwrap();
        gru.set_b_vals(&[vec![bz0, br0, bc0], vec![bz1, br1, bc1]])
            .unwrap();
        gru.reset();

        let mut h_ref = 0.0f64;
        let mut out = [0.0f64];
        for n in 0..20 {
            let x = (n as f64 * 0.31).sin();
            gru.forward(&[x], &mut out);

            let z = sigmoid(wz * x + uz * h_ref + bz0 + bz1);
            let r = sigmoid(wr * x + ur * h_ref + br0 + br1);
            let c = (wc * x + bc0 + r * (uc * h_ref + bc1)).tanh();
            h_ref = (1.0 - z) * c + z * h_ref;

            assert!(
                (out[0] - h_ref).abs() < 1.0e-14,
                "diverged at step {n}: {} vs {}",
                out[0],
                h_ref
            );
        }
    }

    #[test]
    fn reset_makes_runs_repeatable() {
        let mut gru = Gru::<f64>::new(2, 3);
        gru.set_w_vals(&[
            vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9],
            vec![-0.1, -0.2, -0.3, -0.4, -0.5, -0.6, -0.7, -0.8, -0.9],
        ])
        .unwrap();

        let inputs: Vec<[f64; 2]> = (0..16)
            .map(|n| [(n as f64 * 0.7).sin(), (n as f64 * 0.4).cos()])
            .collect();

        let mut first = Vec::new();
        let mut out = [0.0f64; 3];
        gru.reset();
        for x in &inputs {
            gru.forward(x, &mut out);
            first.push(out);
        }

        gru.reset();
        for (x, want) in inputs.iter().zip(&first) {
            gru.forward(x, &mut out);
            assert_eq!(&out, want);
        }
    }

    #[test]
    fn static_gru_matches_dynamic_gru() {
        let w = vec![vec![0.3, -0.2, 0.5, 0.1, -0.4, 0.6]];
        let u = vec![
            vec![0.05, 0.1, -0.15, 0.2, 0.25, -0.3],
            vec![-0.05, 0.15, 0.1, -0.2, 0.3, 0.25],
        ];
        let b = vec![
            vec![0.01, -0.02, 0.03, -0.04, 0.05, -0.06],
            vec![0.02, 0.03, -0.01, 0.04, -0.05, 0.06],
        ];

        let mut dynamic = Gru::<f64>::new(1, 2);
        dynamic.set_w_vals(&w).unwrap();
        dynamic.set_u_vals(&u).unwrap();
        dynamic.set_b_vals(&b).unwrap();
        dynamic.reset();

        let mut fixed = GruT::<f64, 1, 2>::new();
        fixed.set_w_vals(&w).unwrap();
        fixed.set_u_vals(&u).unwrap();
        fixed.set_b_vals(&b).unwrap();
        StaticLayer::reset(&mut fixed);

        let mut out = [0.0f64; 2];
        for n in 0..32 {
            let x = [(n as f64 * 0.13).sin()];
            dynamic.forward(&x, &mut out);
            StaticLayer::forward(&mut fixed, &x);
            for (a, b) in out.iter().zip(fixed.output()) {
                assert!((a - b).abs() < 1.0e-14);
            }
        }
    }

    #[test]
    fn unit_ratio_correction_is_transparent() {
        let w = vec![vec![0.5, 0.4, -0.3]];
        let u = vec![vec![0.2, -0.1, 0.6]];
        let b = vec![vec![0.0, 0.1, 0.2], vec![0.05, -0.05, 0.0]];

        let mut plain = Gru::<f64>::new(1, 1);
        plain.set_w_vals(&w).unwrap();
        plain.set_u_vals(&u).unwrap();
        plain.set_b_vals(&b).unwrap();
        plain.reset();

        let mut corrected = Gru::<f64>::new(1, 1);
        corrected.set_w_vals(&w).unwrap();
        corrected.set_u_vals(&u).unwrap();
        corrected.set_b_vals(&b).unwrap();
        corrected.prepare(1.0);

        let mut a = [0.0f64];
        let mut b_out = [0.0f64];
        for n in 0..24 {
            let x = [(n as f64 * 0.19).cos()];
            plain.forward(&x, &mut a);
            corrected.forward(&x, &mut b_out);
            assert_eq!(a, b_out);
        }
    }
}
