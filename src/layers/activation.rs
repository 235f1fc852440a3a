//! Elementwise activation layers.
//!
//! Every activation preserves its width (`in_size == out_size`). The
//! dynamic side is a single [`Activation`] layer dispatching on
//! [`ActivationKind`]; the static side has one type per nonlinearity so
//! the compile-time pipeline monomorphizes the exact function it needs.
//!
//! "Fast" approximate variants are not separate layers: instantiate any
//! of these with [`FastMaths`](crate::maths::FastMaths) instead of the
//! default provider.
//!
//! PReLU carries a learned per-channel slope, so despite being an
//! activation it is a weighted layer and the loader treats it as one.

use core::marker::PhantomData;

use ndarray::Array1;

use super::{Aligned, Layer, StaticLayer};
use crate::error::{ModelError, Result};
use crate::maths::{cast, MathsProvider, Scalar, StdMaths};

/// `sqrt(2 / pi)`, the tanh-form GELU constant.
const GELU_COEF: f64 = 0.797_884_560_802_865_4;
const GELU_CUBIC: f64 = 0.044_715;

const SELU_LAMBDA: f64 = 1.050_700_987_355_480_5;
const SELU_ALPHA: f64 = 1.673_263_242_354_377_2;

/// The supported elementwise nonlinearities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    Tanh,
    ReLu,
    Sigmoid,
    Softmax,
    Elu,
    Gelu,
    Swish,
    Softplus,
    Mish,
    Selu,
    Celu,
}

impl ActivationKind {
    /// The stable tag used in model documents.
    pub fn name(self) -> &'static str {
        match self {
            ActivationKind::Tanh => "tanh",
            ActivationKind::ReLu => "relu",
            ActivationKind::Sigmoid => "sigmoid",
            ActivationKind::Softmax => "softmax",
            ActivationKind::Elu => "elu",
            ActivationKind::Gelu => "gelu",
            ActivationKind::Swish => "swish",
            ActivationKind::Softplus => "softplus",
            ActivationKind::Mish => "mish",
            ActivationKind::Selu => "selu",
            ActivationKind::Celu => "celu",
        }
    }

    /// Parses an activation tag as found in model documents.
    pub fn from_name(tag: &str) -> Result<Self> {
        Ok(match tag {
            "tanh" => ActivationKind::Tanh,
            "relu" => ActivationKind::ReLu,
            "sigmoid" => ActivationKind::Sigmoid,
            "softmax" => ActivationKind::Softmax,
            "elu" => ActivationKind::Elu,
            "gelu" => ActivationKind::Gelu,
            "swish" | "silu" => ActivationKind::Swish,
            "softplus" => ActivationKind::Softplus,
            "mish" => ActivationKind::Mish,
            "selu" => ActivationKind::Selu,
            "celu" | "cdelu" => ActivationKind::Celu,
            other => return Err(ModelError::UnknownActivation(other.to_string())),
        })
    }
}

#[inline]
pub(crate) fn tanh_f<T: Scalar, M: MathsProvider<T>>(x: T) -> T {
    M::tanh(x)
}

#[inline]
pub(crate) fn relu_f<T: Scalar, M: MathsProvider<T>>(x: T) -> T {
    x.max(T::zero())
}

#[inline]
pub(crate) fn sigmoid_f<T: Scalar, M: MathsProvider<T>>(x: T) -> T {
    M::sigmoid(x)
}

#[inline]
pub(crate) fn elu_f<T: Scalar, M: MathsProvider<T>>(x: T, alpha: T) -> T {
    if x > T::zero() {
        x
    } else {
        alpha * (M::exp(x) - T::one())
    }
}

#[inline]
pub(crate) fn gelu_f<T: Scalar, M: MathsProvider<T>>(x: T) -> T {
    let inner = cast::<T>(GELU_COEF) * (x + cast::<T>(GELU_CUBIC) * x * x * x);
    cast::<T>(0.5) * x * (T::one() + M::tanh(inner))
}

#[inline]
pub(crate) fn swish_f<T: Scalar, M: MathsProvider<T>>(x: T) -> T {
    x * M::sigmoid(x)
}

#[inline]
pub(crate) fn softplus_f<T: Scalar, M: MathsProvider<T>>(x: T) -> T {
    (T::one() + M::exp(x)).ln()
}

#[inline]
pub(crate) fn mish_f<T: Scalar, M: MathsProvider<T>>(x: T) -> T {
    x * M::tanh(softplus_f::<T, M>(x))
}

#[inline]
pub(crate) fn selu_f<T: Scalar, M: MathsProvider<T>>(x: T) -> T {
    let lambda = cast::<T>(SELU_LAMBDA);
    if x > T::zero() {
        lambda * x
    } else {
        lambda * cast::<T>(SELU_ALPHA) * (M::exp(x) - T::one())
    }
}

#[inline]
pub(crate) fn celu_f<T: Scalar, M: MathsProvider<T>>(x: T, alpha: T) -> T {
    x.max(T::zero()) + (alpha * (M::exp(x / alpha) - T::one())).min(T::zero())
}

#[inline]
fn apply<T: Scalar, M: MathsProvider<T>>(kind: ActivationKind, alpha: T, x: T) -> T {
    match kind {
        ActivationKind::Tanh => tanh_f::<T, M>(x),
        ActivationKind::ReLu => relu_f::<T, M>(x),
        ActivationKind::Sigmoid => sigmoid_f::<T, M>(x),
        ActivationKind::Elu => elu_f::<T, M>(x, alpha),
        ActivationKind::Gelu => gelu_f::<T, M>(x),
        ActivationKind::Swish => swish_f::<T, M>(x),
        ActivationKind::Softplus => softplus_f::<T, M>(x),
        ActivationKind::Mish => mish_f::<T, M>(x),
        ActivationKind::Selu => selu_f::<T, M>(x),
        ActivationKind::Celu => celu_f::<T, M>(x, alpha),
        // handled at the buffer level in `forward`
        ActivationKind::Softmax => x,
    }
}

/// Heap-allocated activation layer of a given kind and width.
#[derive(Debug, Clone)]
pub struct Activation<T: Scalar, M: MathsProvider<T> = StdMaths> {
    kind: ActivationKind,
    size: usize,
    alpha: T,
    _maths: PhantomData<M>,
}

impl<T: Scalar, M: MathsProvider<T>> Activation<T, M> {
    /// Creates an activation layer. `alpha` defaults to one for the
    /// kinds that use it (ELU, CELU).
    pub fn new(kind: ActivationKind, size: usize) -> Self {
        Self {
            kind,
            size,
            alpha: T::one(),
            _maths: PhantomData,
        }
    }

    /// Overrides the `alpha` parameter used by ELU/CELU.
    pub fn with_alpha(mut self, alpha: T) -> Self {
        self.alpha = alpha;
        self
    }

    /// The nonlinearity this layer applies.
    pub fn kind(&self) -> ActivationKind {
        self.kind
    }
}

impl<T: Scalar, M: MathsProvider<T>> Layer<T> for Activation<T, M> {
    fn in_size(&self) -> usize {
        self.size
    }

    fn out_size(&self) -> usize {
        self.size
    }

    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn forward(&mut self, input: &[T], out: &mut [T]) {
        match self.kind {
            ActivationKind::Softmax => M::softmax(input, out),
            ActivationKind::Tanh => M::tanh_slice(input, out),
            ActivationKind::Sigmoid => M::sigmoid_slice(input, out),
            kind => {
                for (y, &x) in out.iter_mut().zip(input) {
                    *y = apply::<T, M>(kind, self.alpha, x);
                }
            }
        }
    }
}

/// Parametric ReLU with a learned per-channel negative slope.
///
/// Carries weights, so the loader treats it like any other weighted layer
/// rather than a plain activation.
#[derive(Debug, Clone)]
pub struct PRelu<T: Scalar> {
    alpha: Array1<T>,
}

impl<T: Scalar> PRelu<T> {
    /// Creates a PReLU layer with all slopes at zero.
    pub fn new(size: usize) -> Self {
        Self {
            alpha: Array1::zeros(size),
        }
    }

    /// Sets the per-channel slopes. A single value broadcasts to every
    /// channel, matching exporters that train one shared slope.
    pub fn set_alpha_vals(&mut self, alpha: &[T]) -> Result<()> {
        if alpha.len() == 1 {
            self.alpha.fill(alpha[0]);
            return Ok(());
        }
        if alpha.len() != self.alpha.len() {
            return Err(ModelError::ShapeMismatch {
                layer: "prelu",
                what: "alpha",
                expected: self.alpha.len(),
                found: alpha.len(),
            });
        }
        self.alpha.assign(&ndarray::aview1(alpha));
        Ok(())
    }
}

impl<T: Scalar> Layer<T> for PRelu<T> {
    fn in_size(&self) -> usize {
        self.alpha.len()
    }

    fn out_size(&self) -> usize {
        self.alpha.len()
    }

    fn name(&self) -> &'static str {
        "prelu"
    }

    fn forward(&mut self, input: &[T], out: &mut [T]) {
        for ((y, &x), &a) in out.iter_mut().zip(input).zip(self.alpha.iter()) {
            *y = if x >= T::zero() { x } else { x * a };
        }
    }
}

macro_rules! elementwise_activation_t {
    ($(#[$meta:meta])* $name:ident, $tag:literal, $func:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name<T: Scalar, const SIZE: usize, M: MathsProvider<T> = StdMaths> {
            outs: Aligned<[T; SIZE]>,
            _maths: PhantomData<M>,
        }

        impl<T: Scalar, const SIZE: usize, M: MathsProvider<T>> $name<T, SIZE, M> {
            pub fn new() -> Self {
                Self {
                    outs: Aligned([T::zero(); SIZE]),
                    _maths: PhantomData,
                }
            }
        }

        impl<T: Scalar, const SIZE: usize, M: MathsProvider<T>> Default for $name<T, SIZE, M> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<T: Scalar, const SIZE: usize, M: MathsProvider<T>> StaticLayer<T>
            for $name<T, SIZE, M>
        {
            const IN_SIZE: usize = SIZE;
            const OUT_SIZE: usize = SIZE;

            fn name(&self) -> &'static str {
                $tag
            }

            fn reset(&mut self) {}

            fn forward(&mut self, input: &[T]) {
                debug_assert_eq!(input.len(), SIZE);
                for (y, &x) in self.outs.0.iter_mut().zip(input) {
                    *y = $func::<T, M>(x);
                }
            }

            fn output(&self) -> &[T] {
                &self.outs.0
            }
        }
    };
}

elementwise_activation_t! {
    /// Compile-time-sized tanh activation.
    TanhT, "tanh", tanh_f
}

elementwise_activation_t! {
    /// Compile-time-sized ReLU activation.
    ReLuT, "relu", relu_f
}

elementwise_activation_t! {
    /// Compile-time-sized sigmoid activation.
    SigmoidT, "sigmoid", sigmoid_f
}

elementwise_activation_t! {
    /// Compile-time-sized GELU activation (tanh form).
    GeluT, "gelu", gelu_f
}

elementwise_activation_t! {
    /// Compile-time-sized Swish (SiLU) activation.
    SwishT, "swish", swish_f
}

elementwise_activation_t! {
    /// Compile-time-sized softplus activation.
    SoftplusT, "softplus", softplus_f
}

elementwise_activation_t! {
    /// Compile-time-sized Mish activation.
    MishT, "mish", mish_f
}

elementwise_activation_t! {
    /// Compile-time-sized SELU activation.
    SeluT, "selu", selu_f
}

macro_rules! alpha_activation_t {
    ($(#[$meta:meta])* $name:ident, $tag:literal, $func:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name<T: Scalar, const SIZE: usize, M: MathsProvider<T> = StdMaths> {
            alpha: T,
            outs: Aligned<[T; SIZE]>,
            _maths: PhantomData<M>,
        }

        impl<T: Scalar, const SIZE: usize, M: MathsProvider<T>> $name<T, SIZE, M> {
            pub fn new() -> Self {
                Self {
                    alpha: T::one(),
                    outs: Aligned([T::zero(); SIZE]),
                    _maths: PhantomData,
                }
            }

            /// Overrides the `alpha` parameter (default one).
            pub fn with_alpha(mut self, alpha: T) -> Self {
                self.alpha = alpha;
                self
            }
        }

        impl<T: Scalar, const SIZE: usize, M: MathsProvider<T>> Default for $name<T, SIZE, M> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<T: Scalar, const SIZE: usize, M: MathsProvider<T>> StaticLayer<T>
            for $name<T, SIZE, M>
        {
            const IN_SIZE: usize = SIZE;
            const OUT_SIZE: usize = SIZE;

            fn name(&self) -> &'static str {
                $tag
            }

            fn reset(&mut self) {}

            fn forward(&mut self, input: &[T]) {
                debug_assert_eq!(input.len(), SIZE);
                for (y, &x) in self.outs.0.iter_mut().zip(input) {
                    *y = $func::<T, M>(x, self.alpha);
                }
            }

            fn output(&self) -> &[T] {
                &self.outs.0
            }
        }
    };
}

alpha_activation_t! {
    /// Compile-time-sized ELU activation with configurable alpha.
    EluT, "elu", elu_f
}

alpha_activation_t! {
    /// Compile-time-sized CELU activation with configurable alpha.
    CeluT, "celu", celu_f
}

/// Compile-time-sized softmax activation.
#[derive(Debug, Clone)]
pub struct SoftmaxT<T: Scalar, const SIZE: usize, M: MathsProvider<T> = StdMaths> {
    outs: Aligned<[T; SIZE]>,
    _maths: PhantomData<M>,
}

impl<T: Scalar, const SIZE: usize, M: MathsProvider<T>> SoftmaxT<T, SIZE, M> {
    pub fn new() -> Self {
        Self {
            outs: Aligned([T::zero(); SIZE]),
            _maths: PhantomData,
        }
    }
}

impl<T: Scalar, const SIZE: usize, M: MathsProvider<T>> Default for SoftmaxT<T, SIZE, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar, const SIZE: usize, M: MathsProvider<T>> StaticLayer<T> for SoftmaxT<T, SIZE, M> {
    const IN_SIZE: usize = SIZE;
    const OUT_SIZE: usize = SIZE;

    fn name(&self) -> &'static str {
        "softmax"
    }

    fn reset(&mut self) {}

    fn forward(&mut self, input: &[T]) {
        debug_assert_eq!(input.len(), SIZE);
        M::softmax(input, &mut self.outs.0);
    }

    fn output(&self) -> &[T] {
        &self.outs.0
    }
}

/// Compile-time-sized parametric ReLU.
#[derive(Debug, Clone)]
pub struct PReluT<T: Scalar, const SIZE: usize> {
    alpha: [T; SIZE],
    outs: Aligned<[T; SIZE]>,
}

impl<T: Scalar, const SIZE: usize> PReluT<T, SIZE> {
    pub fn new() -> Self {
        Self {
            alpha: [T::zero(); SIZE],
            outs: Aligned([T::zero(); SIZE]),
        }
    }

    /// Sets the per-channel slopes; a single value broadcasts.
    pub fn set_alpha_vals(&mut self, alpha: &[T]) -> Result<()> {
        if alpha.len() == 1 {
            self.alpha = [alpha[0]; SIZE];
            return Ok(());
        }
        if alpha.len() != SIZE {
            return Err(ModelError::ShapeMismatch {
                layer: "prelu",
                what: "alpha",
                expected: SIZE,
                found: alpha.len(),
            });
        }
        self.alpha.copy_from_slice(alpha);
        Ok(())
    }
}

impl<T: Scalar, const SIZE: usize> Default for PReluT<T, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar, const SIZE: usize> StaticLayer<T> for PReluT<T, SIZE> {
    const IN_SIZE: usize = SIZE;
    const OUT_SIZE: usize = SIZE;

    fn name(&self) -> &'static str {
        "prelu"
    }

    fn reset(&mut self) {}

    fn forward(&mut self, input: &[T]) {
        debug_assert_eq!(input.len(), SIZE);
        for ((y, &x), &a) in self.outs.0.iter_mut().zip(input).zip(self.alpha.iter()) {
            *y = if x >= T::zero() { x } else { x * a };
        }
    }

    fn output(&self) -> &[T] {
        &self.outs.0
    }
}

/// Loader-facing surface shared by the dynamic and static PReLU layers.
pub trait PreluApi<T: Scalar> {
    /// Number of channels.
    fn size(&self) -> usize;
    /// Per-channel slopes; a single value broadcasts.
    fn set_alpha_vals(&mut self, alpha: &[T]) -> Result<()>;
}

impl<T: Scalar> PreluApi<T> for PRelu<T> {
    fn size(&self) -> usize {
        self.alpha.len()
    }

    fn set_alpha_vals(&mut self, alpha: &[T]) -> Result<()> {
        PRelu::set_alpha_vals(self, alpha)
    }
}

impl<T: Scalar, const SIZE: usize> PreluApi<T> for PReluT<T, SIZE> {
    fn size(&self) -> usize {
        SIZE
    }

    fn set_alpha_vals(&mut self, alpha: &[T]) -> Result<()> {
        PReluT::set_alpha_vals(self, alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maths::FastMaths;

    fn run<M: MathsProvider<f64>>(kind: ActivationKind, input: &[f64]) -> Vec<f64> {
        let mut layer = Activation::<f64, M>::new(kind, input.len());
        let mut out = vec![0.0; input.len()];
        layer.forward(input, &mut out);
        out
    }

    #[test]
    fn tanh_matches_std() {
        let input = [-2.0, -0.5, 0.0, 0.5, 2.0];
        let out = run::<StdMaths>(ActivationKind::Tanh, &input);
        for (y, x) in out.iter().zip(input) {
            assert!((y - x.tanh()).abs() < 1.0e-15);
        }
    }

    #[test]
    fn relu_clips_negatives() {
        let out = run::<StdMaths>(ActivationKind::ReLu, &[-1.0, 0.0, 2.5]);
        assert_eq!(out, vec![0.0, 0.0, 2.5]);
    }

    #[test]
    fn swish_and_mish_match_their_definitions() {
        for &x in &[-3.0, -0.1, 0.0, 0.7, 4.0] {
            let swish = run::<StdMaths>(ActivationKind::Swish, &[x])[0];
            let sigmoid = 1.0 / (1.0 + (-x).exp());
            assert!((swish - x * sigmoid).abs() < 1.0e-14);

            let mish = run::<StdMaths>(ActivationKind::Mish, &[x])[0];
            assert!((mish - x * x.exp().ln_1p().tanh()).abs() < 1.0e-12);
        }
    }

    #[test]
    fn elu_uses_alpha_below_zero() {
        let mut layer = Activation::<f64>::new(ActivationKind::Elu, 1).with_alpha(0.5);
        let mut out = [0.0];
        layer.forward(&[-1.0], &mut out);
        assert!((out[0] - 0.5 * ((-1.0f64).exp() - 1.0)).abs() < 1.0e-15);
    }

    #[test]
    fn fast_provider_stays_within_its_error_budget() {
        let input: Vec<f64> = (-40..=40).map(|i| i as f64 / 8.0).collect();
        let exact = run::<StdMaths>(ActivationKind::Tanh, &input);
        let fast = run::<FastMaths>(ActivationKind::Tanh, &input);
        for (a, b) in exact.iter().zip(&fast) {
            assert!((a - b).abs() <= 5.1e-5);
        }
    }

    #[test]
    fn prelu_broadcasts_a_single_slope() {
        let mut layer = PRelu::<f64>::new(3);
        layer.set_alpha_vals(&[0.25]).unwrap();
        let mut out = [0.0; 3];
        layer.forward(&[-4.0, 0.0, 4.0], &mut out);
        assert_eq!(out, [-1.0, 0.0, 4.0]);
    }

    #[test]
    fn static_types_match_dynamic_dispatch() {
        let input = [-1.5, -0.25, 0.0, 0.25, 1.5];

        let mut gelu = GeluT::<f64, 5>::new();
        StaticLayer::forward(&mut gelu, &input);
        let dynamic = run::<StdMaths>(ActivationKind::Gelu, &input);
        for (a, b) in gelu.output().iter().zip(&dynamic) {
            assert!((a - b).abs() < 1.0e-15);
        }

        let mut softmax = SoftmaxT::<f64, 5>::new();
        StaticLayer::forward(&mut softmax, &input);
        let sum: f64 = softmax.output().iter().sum();
        assert!((sum - 1.0).abs() < 1.0e-12);
    }
}
