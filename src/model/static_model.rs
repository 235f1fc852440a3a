//! Compile-time (fixed) pipeline.
//!
//! A [`ModelT`] is built over a tuple of [`StaticLayer`] values. The
//! chain is monomorphized: each layer writes into its own fixed-size
//! aligned buffer and the next layer reads it directly, so `forward`
//! compiles to a straight sequence of layer bodies with no heap
//! allocation and no indirection.
//!
//! Chain consistency is a compile-time property: every adjacent pair of
//! layers is checked with a `const` assertion when the model is
//! instantiated, and a zero-layer model is unrepresentable (there is no
//! chain implementation for the empty tuple).

use core::marker::PhantomData;

use crate::layers::StaticLayer;
use crate::maths::Scalar;

/// A tuple of layers usable as a compile-time pipeline.
///
/// Implemented for tuples of arity 1 through 16. User code normally
/// interacts with [`ModelT`] instead of this trait.
pub trait LayerChain<T: Scalar>: Send {
    /// Input width of the first layer.
    const IN_SIZE: usize;

    /// Output width of the last layer.
    const OUT_SIZE: usize;

    /// Number of layers in the chain.
    const LENGTH: usize;

    /// Evaluates to `()` if every adjacent pair of layers agrees on its
    /// frame width; fails monomorphization otherwise.
    const SIZES_MATCH: ();

    fn forward_chain(&mut self, input: &[T]);
    fn output_chain(&self) -> &[T];
    fn reset_chain(&mut self);
}

macro_rules! chain_assert {
    ($prev:ident) => {};
    ($prev:ident, $next:ident $(, $rest:ident)*) => {
        assert!(
            $prev::OUT_SIZE == $next::IN_SIZE,
            "adjacent layers disagree on their frame width"
        );
        chain_assert!($next $(, $rest)*);
    };
}

macro_rules! impl_layer_chain {
    ($first:ident $(, $mid:ident)* => $last:ident) => {
        #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
        impl<T: Scalar, $first: StaticLayer<T>, $($mid: StaticLayer<T>,)*> LayerChain<T>
            for ($first, $($mid,)*)
        {
            const IN_SIZE: usize = $first::IN_SIZE;
            const OUT_SIZE: usize = $last::OUT_SIZE;
            const LENGTH: usize = 1 $(+ { let _ = stringify!($mid); 1 })*;
            const SIZES_MATCH: () = {
                chain_assert!($first $(, $mid)*);
            };

            fn forward_chain(&mut self, input: &[T]) {
                #[allow(clippy::let_unit_value)]
                let () = Self::SIZES_MATCH;
                let ($first, $($mid,)*) = self;
                $first.forward(input);
                let mut frame: &[T] = $first.output();
                $(
                    $mid.forward(frame);
                    frame = $mid.output();
                )*
            }

            fn output_chain(&self) -> &[T] {
                let ($first, $($mid,)*) = self;
                $last.output()
            }

            fn reset_chain(&mut self) {
                let ($first, $($mid,)*) = self;
                $first.reset();
                $($mid.reset();)*
            }
        }
    };
}

impl_layer_chain!(L0 => L0);
impl_layer_chain!(L0, L1 => L1);
impl_layer_chain!(L0, L1, L2 => L2);
impl_layer_chain!(L0, L1, L2, L3 => L3);
impl_layer_chain!(L0, L1, L2, L3, L4 => L4);
impl_layer_chain!(L0, L1, L2, L3, L4, L5 => L5);
impl_layer_chain!(L0, L1, L2, L3, L4, L5, L6 => L6);
impl_layer_chain!(L0, L1, L2, L3, L4, L5, L6, L7 => L7);
impl_layer_chain!(L0, L1, L2, L3, L4, L5, L6, L7, L8 => L8);
impl_layer_chain!(L0, L1, L2, L3, L4, L5, L6, L7, L8, L9 => L9);
impl_layer_chain!(L0, L1, L2, L3, L4, L5, L6, L7, L8, L9, L10 => L10);
impl_layer_chain!(L0, L1, L2, L3, L4, L5, L6, L7, L8, L9, L10, L11 => L11);
impl_layer_chain!(L0, L1, L2, L3, L4, L5, L6, L7, L8, L9, L10, L11, L12 => L12);
impl_layer_chain!(L0, L1, L2, L3, L4, L5, L6, L7, L8, L9, L10, L11, L12, L13 => L13);
impl_layer_chain!(L0, L1, L2, L3, L4, L5, L6, L7, L8, L9, L10, L11, L12, L13, L14 => L14);
impl_layer_chain!(L0, L1, L2, L3, L4, L5, L6, L7, L8, L9, L10, L11, L12, L13, L14, L15 => L15);

/// Compile-time model over a fixed layer chain.
///
/// `IN` and `OUT` restate the chain's boundary widths; both are checked
/// against the layer tuple at compile time.
#[derive(Debug, Clone)]
pub struct ModelT<T: Scalar, const IN: usize, const OUT: usize, L: LayerChain<T>> {
    layers: L,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Scalar, const IN: usize, const OUT: usize, L: LayerChain<T>> ModelT<T, IN, OUT, L> {
    const IO_MATCH: () = {
        assert!(L::IN_SIZE == IN, "IN does not match the first layer");
        assert!(L::OUT_SIZE == OUT, "OUT does not match the last layer");
    };

    /// Wraps a layer tuple into a model, enforcing the compile-time
    /// shape checks.
    pub fn new(layers: L) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::IO_MATCH;
        #[allow(clippy::let_unit_value)]
        let () = L::SIZES_MATCH;
        Self {
            layers,
            _marker: PhantomData,
        }
    }

    /// Number of layers in the chain.
    pub fn len(&self) -> usize {
        L::LENGTH
    }

    /// Always false; a zero-layer chain does not exist.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Resets every layer's state, in order.
    pub fn reset(&mut self) {
        self.layers.reset_chain();
    }

    /// Runs one frame through the chain and returns the first element of
    /// the final output. Use [`ModelT::outputs`] for the full frame.
    pub fn forward(&mut self, input: &[T; IN]) -> T {
        self.layers.forward_chain(input);
        self.layers.output_chain()[0]
    }

    /// The full output frame of the last `forward` call (`OUT` values).
    pub fn outputs(&self) -> &[T] {
        self.layers.output_chain()
    }

    /// The layer tuple, for per-layer weight loading.
    pub fn layers_mut(&mut self) -> &mut L {
        &mut self.layers
    }

    /// The layer tuple.
    pub fn layers(&self) -> &L {
        &self.layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{DenseT, TanhT};

    #[test]
    fn forward_runs_the_unrolled_chain() {
        let mut expand = DenseT::<f64, 1, 8>::new();
        expand.set_weights(&vec![vec![1.0]; 8]).unwrap();
        expand.set_bias(&[0.0; 8]).unwrap();

        let mut collapse = DenseT::<f64, 8, 1>::new();
        collapse.set_weights(&[vec![1.0; 8]]).unwrap();
        collapse.set_bias(&[0.0]).unwrap();

        let mut model = ModelT::<f64, 1, 1, _>::new((expand, TanhT::<f64, 8>::new(), collapse));
        let y = model.forward(&[5.0]);
        assert!((y - 8.0 * 5.0f64.tanh()).abs() < 1.0e-12);
        assert_eq!(model.len(), 3);
        assert_eq!(model.outputs().len(), 1);
    }

    #[test]
    fn single_layer_chain_works() {
        let mut dense = DenseT::<f64, 2, 2>::new();
        dense
            .set_weights(&[vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap();
        dense.set_bias(&[0.5, -0.5]).unwrap();

        let mut model = ModelT::<f64, 2, 2, _>::new((dense,));
        model.forward(&[1.0, 2.0]);
        assert_eq!(model.outputs(), &[1.5, 1.5]);
    }
}
