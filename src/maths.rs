//! Numeric backend adapter.
//!
//! Every layer in this crate is generic over a [`MathsProvider`]: a small
//! capability surface of transcendental functions, elementwise buffer
//! arithmetic, and dot products over contiguous buffers. The recurrence and
//! convolution logic is written once; only the provider varies.
//!
//! Two providers ship with the crate:
//!
//! - [`StdMaths`] evaluates everything with the standard library's exact
//!   transcendentals.
//! - [`FastMaths`] substitutes clamped rational approximations for `tanh`
//!   and `sigmoid`, trading a bounded error (at most `5.1e-5` absolute over
//!   the clamped domain) for a large speedup on saturating workloads.
//!
//! Providers are stateless zero-sized types, so swapping one in is purely a
//! type-level choice with no runtime cost.

use ndarray::{ArrayView1, NdFloat};

/// Floating-point scalar usable by every layer and maths provider.
///
/// Covers `f32` and `f64`.
pub trait Scalar: NdFloat + Send + Sync {}
impl<T: NdFloat + Send + Sync> Scalar for T {}

/// Converts an `f64` constant into the active scalar type.
///
/// Infallible for the types [`Scalar`] admits (`f32`/`f64`); the `expect`
/// can only trip for a scalar type outside that set.
#[inline]
pub fn cast<T: Scalar>(x: f64) -> T {
    num_traits::cast(x).expect("f64 converts to any supported scalar type")
}

/// Capability surface backing all layer arithmetic.
///
/// The scalar transcendentals are required; the buffer operations have
/// portable default implementations that a vectorized provider may
/// override without touching any layer code.
pub trait MathsProvider<T: Scalar>: Send + Sync + 'static {
    /// Hyperbolic tangent of a single value.
    fn tanh(x: T) -> T;

    /// Logistic sigmoid `1 / (1 + e^-x)` of a single value.
    fn sigmoid(x: T) -> T;

    /// Exponential of a single value.
    fn exp(x: T) -> T;

    /// Elementwise `tanh` over a buffer.
    fn tanh_slice(input: &[T], out: &mut [T]) {
        for (y, &x) in out.iter_mut().zip(input) {
            *y = Self::tanh(x);
        }
    }

    /// Elementwise sigmoid over a buffer.
    fn sigmoid_slice(input: &[T], out: &mut [T]) {
        for (y, &x) in out.iter_mut().zip(input) {
            *y = Self::sigmoid(x);
        }
    }

    /// Elementwise exponential over a buffer.
    fn exp_slice(input: &[T], out: &mut [T]) {
        for (y, &x) in out.iter_mut().zip(input) {
            *y = Self::exp(x);
        }
    }

    /// Softmax over a buffer: `exp(x_i) / sum_j exp(x_j)`.
    fn softmax(input: &[T], out: &mut [T]) {
        let mut sum = T::zero();
        for (y, &x) in out.iter_mut().zip(input) {
            *y = Self::exp(x);
            sum = sum + *y;
        }
        let recip = T::one() / sum;
        for y in out.iter_mut() {
            *y = *y * recip;
        }
    }

    /// Dot product of two equal-length buffers.
    fn dot(a: ArrayView1<'_, T>, b: ArrayView1<'_, T>) -> T {
        a.dot(&b)
    }

    /// Elementwise `out = a + b`.
    fn vadd(a: &[T], b: &[T], out: &mut [T]) {
        for ((y, &xa), &xb) in out.iter_mut().zip(a).zip(b) {
            *y = xa + xb;
        }
    }

    /// Elementwise `out = a - b`.
    fn vsub(a: &[T], b: &[T], out: &mut [T]) {
        for ((y, &xa), &xb) in out.iter_mut().zip(a).zip(b) {
            *y = xa - xb;
        }
    }

    /// Elementwise `out = a * b`.
    fn vprod(a: &[T], b: &[T], out: &mut [T]) {
        for ((y, &xa), &xb) in out.iter_mut().zip(a).zip(b) {
            *y = xa * xb;
        }
    }
}

/// Exact maths provider backed by the standard library.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdMaths;

impl<T: Scalar> MathsProvider<T> for StdMaths {
    #[inline]
    fn tanh(x: T) -> T {
        x.tanh()
    }

    #[inline]
    fn sigmoid(x: T) -> T {
        T::one() / (T::one() + (-x).exp())
    }

    #[inline]
    fn exp(x: T) -> T {
        x.exp()
    }
}

/// Input clamp applied before the rational `tanh` approximation.
const TANH_CLAMP: f64 = 5.7;

/// Input clamp applied before the rational sigmoid approximation.
const SIGMOID_CLAMP: f64 = 7.0;

/// Continued-fraction rational approximation of `tanh`.
///
/// Numerator and denominator are degree-4 polynomials in `x²`. Only valid
/// on the clamped domain; callers clamp first.
#[inline]
fn tanh_rational<T: Scalar>(x: T) -> T {
    let x2 = x * x;
    let numerator = x
        * (cast::<T>(2_027_025.0)
            + x2 * (cast::<T>(270_270.0) + x2 * (cast::<T>(6_930.0) + x2 * cast::<T>(36.0))));
    let denominator = cast::<T>(2_027_025.0)
        + x2 * (cast::<T>(945_945.0)
            + x2 * (cast::<T>(51_975.0) + x2 * (cast::<T>(630.0) + x2)));
    numerator / denominator
}

/// Approximate maths provider.
///
/// `tanh` clamps its input to `[-5.7, 5.7]` and `sigmoid` to `[-7, 7]`
/// before evaluating a rational approximation; the absolute error against
/// the exact function stays below `5.1e-5` over those domains, and the
/// output is finite for any finite input. `exp` (and therefore softmax)
/// remains exact.
#[derive(Debug, Clone, Copy, Default)]
pub struct FastMaths;

impl<T: Scalar> MathsProvider<T> for FastMaths {
    #[inline]
    fn tanh(x: T) -> T {
        let clamp = cast::<T>(TANH_CLAMP);
        tanh_rational(x.max(-clamp).min(clamp))
    }

    #[inline]
    fn sigmoid(x: T) -> T {
        let clamp = cast::<T>(SIGMOID_CLAMP);
        let x = x.max(-clamp).min(clamp);
        let half = cast::<T>(0.5);
        half + half * tanh_rational(x * half)
    }

    #[inline]
    fn exp(x: T) -> T {
        x.exp()
    }
}
