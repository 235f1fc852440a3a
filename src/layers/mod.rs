//! Layer contracts and the concrete layer zoo.
//!
//! Two composition styles share one set of layer semantics:
//!
//! - the *dynamic* contract ([`Layer`]) with runtime sizes and
//!   heap-allocated storage, carried by the tagged [`LayerKind`] sum type
//!   the runtime model is built from;
//! - the *static* contract ([`StaticLayer`]) with compile-time sizes and
//!   fixed, alignment-annotated storage, used by the compile-time model.
//!
//! Both contracts promise the same thing about `forward`: one frame in,
//! one frame out, no allocation, and no side effects beyond the layer's
//! own recurrent state.

pub mod activation;
pub mod batchnorm;
pub mod conv1d;
pub mod conv2d;
pub mod dense;
pub mod gru;
pub mod lstm;
pub(crate) mod sample_rate;

use crate::maths::{MathsProvider, Scalar, StdMaths};

pub use activation::{Activation, ActivationKind, PRelu, PReluT};
pub use activation::{
    CeluT, EluT, GeluT, MishT, ReLuT, SeluT, SigmoidT, SoftmaxT, SoftplusT, SwishT, TanhT,
};
pub use batchnorm::{BatchNorm1d, BatchNorm1dT, BatchNorm2d, BatchNorm2dT};
pub use conv1d::{Conv1d, Conv1dStateless, Conv1dStatelessT, Conv1dT, PaddingMode};
pub use conv2d::{Conv2d, Conv2dT};
pub use dense::{Dense, DenseT};
pub use gru::{Gru, GruT};
pub use lstm::{Lstm, LstmT};

/// Dynamic layer contract.
///
/// Sizes are fixed at construction; `forward` computes one frame and is
/// non-allocating, so it is safe to call from a real-time context once
/// construction and weight loading are done.
pub trait Layer<T: Scalar>: Send {
    /// Width of one input frame.
    fn in_size(&self) -> usize;

    /// Width of one output frame.
    fn out_size(&self) -> usize;

    /// Stable type tag, used by the weight loader to dispatch.
    fn name(&self) -> &'static str;

    /// Zeroes all internal state. A no-op for stateless layers.
    fn reset(&mut self) {}

    /// Computes one frame. `input` must hold `in_size()` values and `out`
    /// must hold `out_size()`.
    fn forward(&mut self, input: &[T], out: &mut [T]);
}

/// Compile-time layer contract.
///
/// Sizes are associated constants and the output lives in a fixed-size
/// buffer owned by the layer, so a chain of static layers runs with no
/// indirection and no heap. Any user type implementing this trait plugs
/// into the compile-time pipeline.
pub trait StaticLayer<T: Scalar>: Send {
    /// Width of one input frame.
    const IN_SIZE: usize;

    /// Width of one output frame.
    const OUT_SIZE: usize;

    /// Stable type tag.
    fn name(&self) -> &'static str;

    /// Zeroes all internal state.
    fn reset(&mut self);

    /// Computes one frame into the layer's own output buffer. `input`
    /// must hold `IN_SIZE` values.
    fn forward(&mut self, input: &[T]);

    /// The last computed frame, `OUT_SIZE` values long.
    fn output(&self) -> &[T];
}

/// Fixed storage wrapper keeping hot buffers on 16-byte boundaries.
#[derive(Debug, Clone, Copy)]
#[repr(C, align(16))]
pub struct Aligned<A>(pub A);

/// Tagged sum over the built-in layer kinds, plus an escape hatch for
/// user-defined dynamic layers.
///
/// The runtime model stores these directly; the weight loader dispatches
/// on the variant rather than on any runtime type inspection.
pub enum LayerKind<T: Scalar, M: MathsProvider<T> = StdMaths> {
    Dense(Dense<T, M>),
    Activation(Activation<T, M>),
    PRelu(PRelu<T>),
    Conv1d(Conv1d<T, M>),
    Conv2d(Conv2d<T, M>),
    BatchNorm1d(BatchNorm1d<T>),
    BatchNorm2d(BatchNorm2d<T>),
    Gru(Gru<T, M>),
    Lstm(Lstm<T, M>),
    Custom(Box<dyn Layer<T>>),
}

macro_rules! dispatch {
    ($self:ident, $layer:ident => $body:expr) => {
        match $self {
            LayerKind::Dense($layer) => $body,
            LayerKind::Activation($layer) => $body,
            LayerKind::PRelu($layer) => $body,
            LayerKind::Conv1d($layer) => $body,
            LayerKind::Conv2d($layer) => $body,
            LayerKind::BatchNorm1d($layer) => $body,
            LayerKind::BatchNorm2d($layer) => $body,
            LayerKind::Gru($layer) => $body,
            LayerKind::Lstm($layer) => $body,
            LayerKind::Custom($layer) => $body,
        }
    };
}

impl<T: Scalar, M: MathsProvider<T>> Layer<T> for LayerKind<T, M> {
    fn in_size(&self) -> usize {
        dispatch!(self, layer => layer.in_size())
    }

    fn out_size(&self) -> usize {
        dispatch!(self, layer => layer.out_size())
    }

    fn name(&self) -> &'static str {
        dispatch!(self, layer => layer.name())
    }

    fn reset(&mut self) {
        dispatch!(self, layer => layer.reset())
    }

    fn forward(&mut self, input: &[T], out: &mut [T]) {
        dispatch!(self, layer => layer.forward(input, out))
    }
}

impl<T: Scalar, M: MathsProvider<T>> core::fmt::Debug for LayerKind<T, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LayerKind")
            .field("name", &self.name())
            .field("in_size", &self.in_size())
            .field("out_size", &self.out_size())
            .finish()
    }
}

macro_rules! layer_kind_from {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        $(impl<T: Scalar, M: MathsProvider<T>> From<$ty> for LayerKind<T, M> {
            fn from(layer: $ty) -> Self {
                LayerKind::$variant(layer)
            }
        })+
    };
}

layer_kind_from! {
    Dense(Dense<T, M>),
    Activation(Activation<T, M>),
    PRelu(PRelu<T>),
    Conv1d(Conv1d<T, M>),
    Conv2d(Conv2d<T, M>),
    BatchNorm1d(BatchNorm1d<T>),
    BatchNorm2d(BatchNorm2d<T>),
    Gru(Gru<T, M>),
    Lstm(Lstm<T, M>),
}

impl<T: Scalar, M: MathsProvider<T>> From<Box<dyn Layer<T>>> for LayerKind<T, M> {
    fn from(layer: Box<dyn Layer<T>>) -> Self {
        LayerKind::Custom(layer)
    }
}
