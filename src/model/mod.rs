//! Model composition: the runtime (heap) pipeline and its companions.
//!
//! [`Model`] owns a chain of [`LayerKind`] values plus one preallocated
//! output buffer per layer; `forward` threads each layer's buffer into
//! the next layer with no allocation. The compile-time pipeline lives in
//! [`static_model`], the JSON weight loader in [`loader`].

pub mod loader;
pub mod static_model;

pub use static_model::{LayerChain, ModelT};

use crate::error::{ModelError, Result};
use crate::layers::{Layer, LayerKind};
use crate::maths::{MathsProvider, Scalar, StdMaths};

/// Runtime-assembled model: an ordered chain of heap-allocated layers.
///
/// Chain consistency (each layer's input width equals the previous
/// layer's output width) is enforced when layers are added, never at
/// `forward` time.
pub struct Model<T: Scalar, M: MathsProvider<T> = StdMaths> {
    in_size: usize,
    layers: Vec<LayerKind<T, M>>,
    outs: Vec<Vec<T>>,
}

impl<T: Scalar, M: MathsProvider<T>> Model<T, M> {
    /// Creates an empty model taking frames of `in_size` values.
    pub fn new(in_size: usize) -> Self {
        Self {
            in_size,
            layers: Vec::new(),
            outs: Vec::new(),
        }
    }

    /// Input width expected by the next layer to be added.
    pub fn next_in_size(&self) -> usize {
        self.layers
            .last()
            .map_or(self.in_size, |layer| layer.out_size())
    }

    /// Width of the model's input frame.
    pub fn in_size(&self) -> usize {
        self.in_size
    }

    /// Width of the model's output frame.
    pub fn out_size(&self) -> usize {
        self.next_in_size()
    }

    /// Appends a layer, allocating its output buffer.
    ///
    /// Fails if the layer's input width does not continue the chain.
    pub fn add_layer(&mut self, layer: impl Into<LayerKind<T, M>>) -> Result<()> {
        let layer = layer.into();
        let expected = self.next_in_size();
        if layer.in_size() != expected {
            return Err(ModelError::ChainMismatch {
                layer: layer.name(),
                expected,
                found: layer.in_size(),
            });
        }
        self.outs.push(vec![T::zero(); layer.out_size()]);
        self.layers.push(layer);
        Ok(())
    }

    /// The layers, in forward order.
    pub fn layers(&self) -> &[LayerKind<T, M>] {
        &self.layers
    }

    /// Mutable access to one layer, e.g. for weight loading or
    /// `prepare`-style reconfiguration.
    pub fn layer_mut(&mut self, index: usize) -> Option<&mut LayerKind<T, M>> {
        self.layers.get_mut(index)
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the model has no layers yet.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Resets every layer's state, in order.
    pub fn reset(&mut self) {
        for layer in &mut self.layers {
            layer.reset();
        }
    }

    /// Runs one frame through the chain and returns the first element of
    /// the final output buffer. Use [`Model::outputs`] for the full frame.
    ///
    /// The model must contain at least one layer and `input` must hold
    /// exactly `in_size` values.
    pub fn forward(&mut self, input: &[T]) -> T {
        assert!(!self.layers.is_empty(), "forward called on an empty model");
        assert_eq!(input.len(), self.in_size, "input frame has wrong width");

        for (i, layer) in self.layers.iter_mut().enumerate() {
            let (prev, rest) = self.outs.split_at_mut(i);
            let frame = if i == 0 { input } else { &prev[i - 1] };
            layer.forward(frame, &mut rest[0]);
        }

        self.outs[self.layers.len() - 1][0]
    }

    /// The full output frame of the last `forward` call.
    pub fn outputs(&self) -> &[T] {
        self.outs.last().map_or(&[], |frame| frame.as_slice())
    }
}

impl<T: Scalar, M: MathsProvider<T>> core::fmt::Debug for Model<T, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Model")
            .field("in_size", &self.in_size)
            .field("layers", &self.layers)
            .finish()
    }
}
