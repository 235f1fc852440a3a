//! # rtnn — real-time neural network inference
//!
//! A forward-inference engine for running trained models inside
//! real-time audio/DSP callbacks: one frame in, one frame out, with no
//! allocation, locking, or blocking in the hot path.
//!
//! ## Features
//!
//! - **Layer zoo**: dense, a full set of elementwise activations
//!   (tanh/ReLU/sigmoid/softmax/ELU/PReLU/GELU/Swish/Softplus/Mish/SELU/
//!   CELU), streaming 1D convolution (dilated, strided, grouped), causal
//!   2D convolution, batch normalization (1D/2D), GRU and LSTM cells.
//! - **Two pipelines**: a runtime [`Model`](model::Model) assembled from
//!   heap-allocated layers sized at load time, and a compile-time
//!   [`ModelT`](model::ModelT) whose sizes are const generics — fully
//!   monomorphized, no indirection, no heap.
//! - **Swappable maths**: every layer is generic over a
//!   [`MathsProvider`](maths::MathsProvider); the exact
//!   [`StdMaths`](maths::StdMaths) and the clamped-approximation
//!   [`FastMaths`](maths::FastMaths) providers ship with the crate.
//! - **Weight loading**: a JSON model-document loader
//!   ([`model::loader`]) with strict shape validation for both
//!   pipelines.
//! - **Sample-rate correction**: GRU/LSTM layers can be `prepare`d to
//!   run at a multiple of their training sample rate.
//!
//! ## Quick start
//!
//! ```rust
//! use rtnn::prelude::*;
//!
//! let mut model = Model::<f32>::new(1);
//! model.add_layer(Dense::new(1, 8)).unwrap();
//! model.add_layer(Activation::new(ActivationKind::Tanh, 8)).unwrap();
//! model.add_layer(Dense::new(8, 1)).unwrap();
//! model.reset();
//!
//! // ... load weights, then stream frames:
//! let y = model.forward(&[0.5]);
//! assert!(y.is_finite());
//! ```
//!
//! Construction and weight loading may allocate and fail; once a model
//! is built and reset, `forward`/`reset` are the only entry points the
//! real-time thread should touch.

pub mod error;
pub mod layers;
pub mod maths;
pub mod model;

pub use error::ModelError;

pub mod prelude {
    pub use crate::error::ModelError;
    pub use crate::layers::{
        Activation, ActivationKind, BatchNorm1d, BatchNorm2d, Conv1d, Conv2d, Dense, Gru, Layer,
        Lstm, PRelu, PaddingMode, StaticLayer,
    };
    pub use crate::layers::{
        BatchNorm1dT, BatchNorm2dT, Conv1dT, Conv2dT, DenseT, GruT, LstmT, PReluT, ReLuT,
        SigmoidT, SoftmaxT, TanhT,
    };
    pub use crate::maths::{FastMaths, MathsProvider, Scalar, StdMaths};
    pub use crate::model::{loader, Model, ModelT};
}
