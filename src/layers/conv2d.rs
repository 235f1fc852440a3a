//! Streaming 2-dimensional (time × feature) convolution.
//!
//! The 2D kernel is decomposed into `kernel_size_time` stateless
//! feature-axis convolutions. Each `forward` call runs every tap over the
//! current frame and accumulates tap *i* into the state slot
//! `(index + dilation * i) % receptive_field`; the slot at the current
//! index has by then collected every tap of its window, so it is read
//! out (plus bias), cleared, and the index advances one slot. Tap *i*
//! therefore sees the input delayed by `dilation * i` frames — causal
//! dilated 2D convolution without ever materializing the 2D receptive
//! field.

use ndarray::{aview1, Array1, Array2};

use super::conv1d::{stateless_features_out, Conv1dStateless, Conv1dStatelessT, PaddingMode};
use super::{Aligned, Layer, StaticLayer};
use crate::error::{ModelError, Result};
use crate::maths::{MathsProvider, Scalar, StdMaths};

/// Heap-allocated streaming 2D convolution.
///
/// Frames are laid out `[feature][filter]` with the filter index fastest,
/// matching the batch-norm and stateless-convolution layers.
#[derive(Debug, Clone)]
pub struct Conv2d<T: Scalar, M: MathsProvider<T> = StdMaths> {
    filters_in: usize,
    filters_out: usize,
    features_in: usize,
    features_out: usize,
    kernel_size_time: usize,
    kernel_size_feature: usize,
    dilation: usize,
    stride: usize,
    receptive_field: usize,
    /// One stateless convolution per time tap; tap 0 is the newest.
    taps: Vec<Conv1dStateless<T, M>>,
    /// Rotating accumulators, `[receptive_field][filters_out * features_out]`.
    state: Array2<T>,
    state_index: usize,
    scratch: Vec<T>,
    bias: Array1<T>,
}

impl<T: Scalar, M: MathsProvider<T>> Conv2d<T, M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        filters_in: usize,
        filters_out: usize,
        features_in: usize,
        kernel_size_time: usize,
        kernel_size_feature: usize,
        dilation: usize,
        stride: usize,
        padding: PaddingMode,
    ) -> Self {
        let features_out =
            stateless_features_out(features_in, kernel_size_feature, stride, padding);
        let receptive_field = (kernel_size_time - 1) * dilation + 1;
        let taps = (0..kernel_size_time)
            .map(|_| {
                Conv1dStateless::new(
                    filters_in,
                    filters_out,
                    features_in,
                    kernel_size_feature,
                    stride,
                    padding,
                )
            })
            .collect();
        Self {
            filters_in,
            filters_out,
            features_in,
            features_out,
            kernel_size_time,
            kernel_size_feature,
            dilation,
            stride,
            receptive_field,
            taps,
            state: Array2::zeros((receptive_field, filters_out * features_out)),
            state_index: 0,
            scratch: vec![T::zero(); filters_out * features_out],
            bias: Array1::zeros(filters_out),
        }
    }

    pub fn kernel_size_time(&self) -> usize {
        self.kernel_size_time
    }

    pub fn kernel_size_feature(&self) -> usize {
        self.kernel_size_feature
    }

    pub fn dilation(&self) -> usize {
        self.dilation
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn features_out(&self) -> usize {
        self.features_out
    }

    /// Sets the kernel weights from
    /// `w[kernel_size_time][filters_out][filters_in][kernel_size_feature]`,
    /// time tap 0 applying to the newest frame.
    pub fn set_weights(&mut self, w: &[Vec<Vec<Vec<T>>>]) -> Result<()> {
        if w.len() != self.kernel_size_time {
            return Err(ModelError::ShapeMismatch {
                layer: "conv2d",
                what: "time taps",
                expected: self.kernel_size_time,
                found: w.len(),
            });
        }
        for (tap, tap_weights) in self.taps.iter_mut().zip(w) {
            tap.set_weights(tap_weights)?;
        }
        Ok(())
    }

    /// Sets the per-filter bias from `bias[filters_out]`.
    pub fn set_bias(&mut self, bias: &[T]) -> Result<()> {
        if bias.len() != self.filters_out {
            return Err(ModelError::ShapeMismatch {
                layer: "conv2d",
                what: "bias",
                expected: self.filters_out,
                found: bias.len(),
            });
        }
        self.bias.assign(&aview1(bias));
        Ok(())
    }
}

impl<T: Scalar, M: MathsProvider<T>> Layer<T> for Conv2d<T, M> {
    fn in_size(&self) -> usize {
        self.filters_in * self.features_in
    }

    fn out_size(&self) -> usize {
        self.filters_out * self.features_out
    }

    fn name(&self) -> &'static str {
        "conv2d"
    }

    fn reset(&mut self) {
        self.state.fill(T::zero());
        self.state_index = 0;
    }

    fn forward(&mut self, input: &[T], out: &mut [T]) {
        for (i, tap) in self.taps.iter_mut().enumerate() {
            tap.forward(input, &mut self.scratch);
            let slot = (self.state_index + self.dilation * i) % self.receptive_field;
            let mut row = self.state.row_mut(slot);
            row += &aview1(&self.scratch);
        }

        let completed = self.state.row(self.state_index);
        for (j, (y, &acc)) in out.iter_mut().zip(completed.iter()).enumerate() {
            *y = acc + self.bias[j % self.filters_out];
        }

        self.state.row_mut(self.state_index).fill(T::zero());
        self.state_index = if self.state_index == self.receptive_field - 1 {
            0
        } else {
            self.state_index + 1
        };
    }
}

/// Compile-time-sized streaming 2D convolution (valid feature padding).
///
/// `FEATURES_OUT` must equal `(FEATURES_IN - KERNEL_FEATURE) / STRIDE + 1`
/// and `RECEPTIVE_FIELD` must equal `(KERNEL_TIME - 1) * DILATION + 1`;
/// both are checked at compile time.
#[derive(Debug, Clone)]
pub struct Conv2dT<
    T: Scalar,
    const FILTERS_IN: usize,
    const FILTERS_OUT: usize,
    const FEATURES_IN: usize,
    const FEATURES_OUT: usize,
    const KERNEL_TIME: usize,
    const KERNEL_FEATURE: usize,
    const DILATION: usize,
    const STRIDE: usize,
    const RECEPTIVE_FIELD: usize,
    M: MathsProvider<T> = StdMaths,
> {
    taps: [Conv1dStatelessT<
        T,
        FILTERS_IN,
        FILTERS_OUT,
        FEATURES_IN,
        FEATURES_OUT,
        KERNEL_FEATURE,
        STRIDE,
        M,
    >; KERNEL_TIME],
    state: Aligned<[[[T; FILTERS_OUT]; FEATURES_OUT]; RECEPTIVE_FIELD]>,
    bias: [T; FILTERS_OUT],
    outs: Aligned<[[T; FILTERS_OUT]; FEATURES_OUT]>,
    state_index: usize,
}

impl<
        T: Scalar,
        const FILTERS_IN: usize,
        const FILTERS_OUT: usize,
        const FEATURES_IN: usize,
        const FEATURES_OUT: usize,
        const KERNEL_TIME: usize,
        const KERNEL_FEATURE: usize,
        const DILATION: usize,
        const STRIDE: usize,
        const RECEPTIVE_FIELD: usize,
        M: MathsProvider<T>,
    >
    Conv2dT<
        T,
        FILTERS_IN,
        FILTERS_OUT,
        FEATURES_IN,
        FEATURES_OUT,
        KERNEL_TIME,
        KERNEL_FEATURE,
        DILATION,
        STRIDE,
        RECEPTIVE_FIELD,
        M,
    >
{
    const SHAPE_OK: () = assert!(
        RECEPTIVE_FIELD == (KERNEL_TIME - 1) * DILATION + 1,
        "RECEPTIVE_FIELD must equal (KERNEL_TIME - 1) * DILATION + 1"
    );

    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::SHAPE_OK;
        Self {
            taps: core::array::from_fn(|_| Conv1dStatelessT::new()),
            state: Aligned([[[T::zero(); FILTERS_OUT]; FEATURES_OUT]; RECEPTIVE_FIELD]),
            bias: [T::zero(); FILTERS_OUT],
            outs: Aligned([[T::zero(); FILTERS_OUT]; FEATURES_OUT]),
            state_index: 0,
        }
    }

    /// Sets the kernel weights from
    /// `w[KERNEL_TIME][FILTERS_OUT][FILTERS_IN][KERNEL_FEATURE]`, time
    /// tap 0 applying to the newest frame.
    pub fn set_weights(&mut self, w: &[Vec<Vec<Vec<T>>>]) -> Result<()> {
        if w.len() != KERNEL_TIME {
            return Err(ModelError::ShapeMismatch {
                layer: "conv2d",
                what: "time taps",
                expected: KERNEL_TIME,
                found: w.len(),
            });
        }
        for (tap, tap_weights) in self.taps.iter_mut().zip(w) {
            tap.set_weights(tap_weights)?;
        }
        Ok(())
    }

    /// Sets the per-filter bias from `bias[FILTERS_OUT]`.
    pub fn set_bias(&mut self, bias: &[T]) -> Result<()> {
        if bias.len() != FILTERS_OUT {
            return Err(ModelError::ShapeMismatch {
                layer: "conv2d",
                what: "bias",
                expected: FILTERS_OUT,
                found: bias.len(),
            });
        }
        self.bias.copy_from_slice(bias);
        Ok(())
    }
}

impl<
        T: Scalar,
        const FILTERS_IN: usize,
        const FILTERS_OUT: usize,
        const FEATURES_IN: usize,
        const FEATURES_OUT: usize,
        const KERNEL_TIME: usize,
        const KERNEL_FEATURE: usize,
        const DILATION: usize,
        const STRIDE: usize,
        const RECEPTIVE_FIELD: usize,
        M: MathsProvider<T>,
    > Default
    for Conv2dT<
        T,
        FILTERS_IN,
        FILTERS_OUT,
        FEATURES_IN,
        FEATURES_OUT,
        KERNEL_TIME,
        KERNEL_FEATURE,
        DILATION,
        STRIDE,
        RECEPTIVE_FIELD,
        M,
    >
{
    fn default() -> Self {
        Self::new()
    }
}

impl<
        T: Scalar,
        const FILTERS_IN: usize,
        const FILTERS_OUT: usize,
        const FEATURES_IN: usize,
        const FEATURES_OUT: usize,
        const KERNEL_TIME: usize,
        const KERNEL_FEATURE: usize,
        const DILATION: usize,
        const STRIDE: usize,
        const RECEPTIVE_FIELD: usize,
        M: MathsProvider<T>,
    > StaticLayer<T>
    for Conv2dT<
        T,
        FILTERS_IN,
        FILTERS_OUT,
        FEATURES_IN,
        FEATURES_OUT,
        KERNEL_TIME,
        KERNEL_FEATURE,
        DILATION,
        STRIDE,
        RECEPTIVE_FIELD,
        M,
    >
{
    const IN_SIZE: usize = FILTERS_IN * FEATURES_IN;
    const OUT_SIZE: usize = FILTERS_OUT * FEATURES_OUT;

    fn name(&self) -> &'static str {
        "conv2d"
    }

    fn reset(&mut self) {
        self.state = Aligned([[[T::zero(); FILTERS_OUT]; FEATURES_OUT]; RECEPTIVE_FIELD]);
        self.state_index = 0;
    }

    fn forward(&mut self, input: &[T]) {
        debug_assert_eq!(input.len(), Self::IN_SIZE);
        for i in 0..KERNEL_TIME {
            self.taps[i].forward(input);
            let slot = (self.state_index + DILATION * i) % RECEPTIVE_FIELD;
            let acc = self.state.0[slot].as_flattened_mut();
            for (a, &y) in acc.iter_mut().zip(self.taps[i].output()) {
                *a = *a + y;
            }
        }

        for j in 0..FEATURES_OUT {
            for f in 0..FILTERS_OUT {
                self.outs.0[j][f] = self.state.0[self.state_index][j][f] + self.bias[f];
            }
        }

        self.state.0[self.state_index] = [[T::zero(); FILTERS_OUT]; FEATURES_OUT];
        self.state_index = if self.state_index == RECEPTIVE_FIELD - 1 {
            0
        } else {
            self.state_index + 1
        };
    }

    fn output(&self) -> &[T] {
        self.outs.0.as_flattened()
    }
}

/// Loader-facing surface shared by the dynamic and static 2D
/// convolutions.
pub trait Conv2dApi<T: Scalar> {
    fn filters_in(&self) -> usize;
    fn filters_out(&self) -> usize;
    fn kernel_size_time(&self) -> usize;
    fn kernel_size_feature(&self) -> usize;
    /// Kernel weights,
    /// `w[kernel_size_time][filters_out][filters_in][kernel_size_feature]`,
    /// time tap 0 newest.
    fn set_weights(&mut self, w: &[Vec<Vec<Vec<T>>>]) -> Result<()>;
    /// Bias, `bias[filters_out]`.
    fn set_bias(&mut self, bias: &[T]) -> Result<()>;
}

impl<T: Scalar, M: MathsProvider<T>> Conv2dApi<T> for Conv2d<T, M> {
    fn filters_in(&self) -> usize {
        self.filters_in
    }

    fn filters_out(&self) -> usize {
        self.filters_out
    }

    fn kernel_size_time(&self) -> usize {
        self.kernel_size_time
    }

    fn kernel_size_feature(&self) -> usize {
        self.kernel_size_feature
    }

    fn set_weights(&mut self, w: &[Vec<Vec<Vec<T>>>]) -> Result<()> {
        Conv2d::set_weights(self, w)
    }

    fn set_bias(&mut self, bias: &[T]) -> Result<()> {
        Conv2d::set_bias(self, bias)
    }
}

impl<
        T: Scalar,
        const FILTERS_IN: usize,
        const FILTERS_OUT: usize,
        const FEATURES_IN: usize,
        const FEATURES_OUT: usize,
        const KERNEL_TIME: usize,
        const KERNEL_FEATURE: usize,
        const DILATION: usize,
        const STRIDE: usize,
        const RECEPTIVE_FIELD: usize,
        M: MathsProvider<T>,
    > Conv2dApi<T>
    for Conv2dT<
        T,
        FILTERS_IN,
        FILTERS_OUT,
        FEATURES_IN,
        FEATURES_OUT,
        KERNEL_TIME,
        KERNEL_FEATURE,
        DILATION,
        STRIDE,
        RECEPTIVE_FIELD,
        M,
    >
{
    fn filters_in(&self) -> usize {
        FILTERS_IN
    }

    fn filters_out(&self) -> usize {
        FILTERS_OUT
    }

    fn kernel_size_time(&self) -> usize {
        KERNEL_TIME
    }

    fn kernel_size_feature(&self) -> usize {
        KERNEL_FEATURE
    }

    fn set_weights(&mut self, w: &[Vec<Vec<Vec<T>>>]) -> Result<()> {
        Conv2dT::set_weights(self, w)
    }

    fn set_bias(&mut self, bias: &[T]) -> Result<()> {
        Conv2dT::set_bias(self, bias)
    }
}
