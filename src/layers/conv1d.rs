//! 1-dimensional convolution layers.
//!
//! [`Conv1d`]/[`Conv1dT`] are *streaming* temporal convolutions: each
//! `forward` call consumes one frame, keeps a ring buffer of the last
//! `(kernel_size - 1) * dilation + 1` frames, and emits one output frame.
//! The layer is causal by construction; "valid" padding semantics are
//! obtained by discarding the first `receptive_field - 1` outputs, and
//! striding by calling [`Conv1d::skip`] for the frames that should not
//! produce an output.
//!
//! [`Conv1dStateless`]/[`Conv1dStatelessT`] convolve across the *feature*
//! axis of a single frame instead, with stride and padding policies; they
//! are the building blocks of the 2D convolution layer.

use core::marker::PhantomData;

use ndarray::{aview1, s, Array1, Array2, Array3};

use super::{Aligned, Layer, StaticLayer};
use crate::error::{ModelError, Result};
use crate::maths::{MathsProvider, Scalar, StdMaths};

/// Feature-axis padding policy for the stateless convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaddingMode {
    /// No padding; the output is narrower than the input.
    #[default]
    Valid,
    /// Zero padding chosen so the output covers `ceil(in / stride)`
    /// positions, split left/right the way TensorFlow does.
    Same,
}

impl PaddingMode {
    /// Parses the padding tag used in model documents.
    pub fn from_name(tag: &str) -> Result<Self> {
        match tag {
            "valid" => Ok(PaddingMode::Valid),
            "same" => Ok(PaddingMode::Same),
            other => Err(ModelError::BadWeights(format!(
                "unknown padding mode \"{other}\""
            ))),
        }
    }
}

fn checked_groups(groups: usize, in_size: usize, out_size: usize) -> Result<usize> {
    if groups == 0 || in_size % groups != 0 || out_size % groups != 0 {
        return Err(ModelError::BadGrouping {
            groups,
            in_size,
            out_size,
        });
    }
    Ok(groups)
}

/// Heap-allocated streaming temporal convolution with dilation and
/// grouped channels.
#[derive(Debug, Clone)]
pub struct Conv1d<T: Scalar, M: MathsProvider<T> = StdMaths> {
    in_size: usize,
    out_size: usize,
    kernel_size: usize,
    dilation: usize,
    groups: usize,
    state_size: usize,
    /// `[out][kernel][in / groups]`; tap 0 reads the newest frame.
    weights: Array3<T>,
    bias: Array1<T>,
    /// Ring buffer of the last `state_size` input frames.
    state: Array2<T>,
    state_ptr: usize,
    _maths: PhantomData<M>,
}

impl<T: Scalar, M: MathsProvider<T>> Conv1d<T, M> {
    /// Creates an ungrouped convolution layer.
    pub fn new(in_size: usize, out_size: usize, kernel_size: usize, dilation: usize) -> Self {
        Self::grouped(in_size, out_size, kernel_size, dilation, 1)
            .expect("a single group always divides the channel counts")
    }

    /// Creates a grouped convolution layer; `groups` must evenly divide
    /// both channel counts.
    pub fn grouped(
        in_size: usize,
        out_size: usize,
        kernel_size: usize,
        dilation: usize,
        groups: usize,
    ) -> Result<Self> {
        let groups = checked_groups(groups, in_size, out_size)?;
        let state_size = (kernel_size - 1) * dilation + 1;
        Ok(Self {
            in_size,
            out_size,
            kernel_size,
            dilation,
            groups,
            state_size,
            weights: Array3::zeros((out_size, kernel_size, in_size / groups)),
            bias: Array1::zeros(out_size),
            state: Array2::zeros((state_size, in_size)),
            state_ptr: 0,
            _maths: PhantomData,
        })
    }

    /// Size of the convolution kernel.
    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Dilation rate between kernel taps.
    pub fn dilation(&self) -> usize {
        self.dilation
    }

    /// Number of channel groups.
    pub fn groups(&self) -> usize {
        self.groups
    }

    /// Number of past frames the output depends on.
    pub fn receptive_field(&self) -> usize {
        self.state_size
    }

    /// Pushes one frame into the ring buffer without producing output.
    /// Callers implement strided convolution with this.
    pub fn skip(&mut self, input: &[T]) {
        self.push_frame(input);
        self.advance();
    }

    /// Sets the kernel weights from `w[out][in / groups][kernel]`, where
    /// kernel tap 0 applies to the newest frame.
    pub fn set_weights(&mut self, w: &[Vec<Vec<T>>]) -> Result<()> {
        let group_in = self.in_size / self.groups;
        if w.len() != self.out_size {
            return Err(ModelError::ShapeMismatch {
                layer: "conv1d",
                what: "weight channels",
                expected: self.out_size,
                found: w.len(),
            });
        }
        for (i, per_in) in w.iter().enumerate() {
            if per_in.len() != group_in {
                return Err(ModelError::ShapeMismatch {
                    layer: "conv1d",
                    what: "weight input channels",
                    expected: group_in,
                    found: per_in.len(),
                });
            }
            for (c, taps) in per_in.iter().enumerate() {
                if taps.len() != self.kernel_size {
                    return Err(ModelError::ShapeMismatch {
                        layer: "conv1d",
                        what: "kernel taps",
                        expected: self.kernel_size,
                        found: taps.len(),
                    });
                }
                for (k, &value) in taps.iter().enumerate() {
                    self.weights[(i, k, c)] = value;
                }
            }
        }
        Ok(())
    }

    /// Sets the bias from `bias[out]`.
    pub fn set_bias(&mut self, bias: &[T]) -> Result<()> {
        if bias.len() != self.out_size {
            return Err(ModelError::ShapeMismatch {
                layer: "conv1d",
                what: "bias",
                expected: self.out_size,
                found: bias.len(),
            });
        }
        self.bias.assign(&aview1(bias));
        Ok(())
    }

    fn push_frame(&mut self, input: &[T]) {
        self.state.row_mut(self.state_ptr).assign(&aview1(input));
    }

    fn advance(&mut self) {
        self.state_ptr = if self.state_ptr == self.state_size - 1 {
            0
        } else {
            self.state_ptr + 1
        };
    }
}

impl<T: Scalar, M: MathsProvider<T>> Layer<T> for Conv1d<T, M> {
    fn in_size(&self) -> usize {
        self.in_size
    }

    fn out_size(&self) -> usize {
        self.out_size
    }

    fn name(&self) -> &'static str {
        "conv1d"
    }

    fn reset(&mut self) {
        self.state.fill(T::zero());
        self.state_ptr = 0;
    }

    fn forward(&mut self, input: &[T], out: &mut [T]) {
        self.push_frame(input);

        let group_in = self.in_size / self.groups;
        let out_per_group = self.out_size / self.groups;
        for i in 0..self.out_size {
            let in_start = (i / out_per_group) * group_in;
            let mut acc = self.bias[i];
            for k in 0..self.kernel_size {
                let idx =
                    (self.state_ptr + self.state_size - k * self.dilation) % self.state_size;
                let col = self.state.slice(s![idx, in_start..in_start + group_in]);
                acc = acc + M::dot(self.weights.slice(s![i, k, ..]), col);
            }
            out[i] = acc;
        }

        self.advance();
    }
}

/// Compile-time-sized streaming temporal convolution.
///
/// `STATE_SIZE` must equal `(KERNEL - 1) * DILATION + 1`; the constructor
/// checks this at compile time. Grouped weights are stored zero-extended
/// to the full input width, so the inner products stay uniform.
#[derive(Debug, Clone)]
pub struct Conv1dT<
    T: Scalar,
    const IN: usize,
    const OUT: usize,
    const KERNEL: usize,
    const DILATION: usize,
    const STATE_SIZE: usize,
    M: MathsProvider<T> = StdMaths,
> {
    weights: Aligned<[[[T; IN]; KERNEL]; OUT]>,
    bias: [T; OUT],
    state: Aligned<[[T; IN]; STATE_SIZE]>,
    state_ptr: usize,
    groups: usize,
    outs: Aligned<[T; OUT]>,
    _maths: PhantomData<M>,
}

impl<
        T: Scalar,
        const IN: usize,
        const OUT: usize,
        const KERNEL: usize,
        const DILATION: usize,
        const STATE_SIZE: usize,
        M: MathsProvider<T>,
    > Conv1dT<T, IN, OUT, KERNEL, DILATION, STATE_SIZE, M>
{
    const STATE_OK: () = assert!(
        STATE_SIZE == (KERNEL - 1) * DILATION + 1,
        "STATE_SIZE must equal (KERNEL - 1) * DILATION + 1"
    );

    /// Creates an ungrouped convolution layer.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::STATE_OK;
        Self {
            weights: Aligned([[[T::zero(); IN]; KERNEL]; OUT]),
            bias: [T::zero(); OUT],
            state: Aligned([[T::zero(); IN]; STATE_SIZE]),
            state_ptr: 0,
            groups: 1,
            outs: Aligned([T::zero(); OUT]),
            _maths: PhantomData,
        }
    }

    /// Creates a grouped convolution layer; `groups` must evenly divide
    /// both channel counts.
    pub fn grouped(groups: usize) -> Result<Self> {
        let mut layer = Self::new();
        layer.groups = checked_groups(groups, IN, OUT)?;
        Ok(layer)
    }

    /// Number of channel groups.
    pub fn groups(&self) -> usize {
        self.groups
    }

    /// Pushes one frame into the ring buffer without producing output.
    pub fn skip(&mut self, input: &[T]) {
        debug_assert_eq!(input.len(), IN);
        self.state.0[self.state_ptr].copy_from_slice(input);
        self.advance();
    }

    /// Sets the kernel weights from `w[OUT][IN / groups][KERNEL]`, tap 0
    /// applying to the newest frame. For grouped layers the row is placed
    /// at its group's channel offset and the rest stays zero.
    pub fn set_weights(&mut self, w: &[Vec<Vec<T>>]) -> Result<()> {
        let group_in = IN / self.groups;
        let out_per_group = OUT / self.groups;
        if w.len() != OUT {
            return Err(ModelError::ShapeMismatch {
                layer: "conv1d",
                what: "weight channels",
                expected: OUT,
                found: w.len(),
            });
        }
        for (i, per_in) in w.iter().enumerate() {
            if per_in.len() != group_in {
                return Err(ModelError::ShapeMismatch {
                    layer: "conv1d",
                    what: "weight input channels",
                    expected: group_in,
                    found: per_in.len(),
                });
            }
            let in_start = (i / out_per_group) * group_in;
            for (c, taps) in per_in.iter().enumerate() {
                if taps.len() != KERNEL {
                    return Err(ModelError::ShapeMismatch {
                        layer: "conv1d",
                        what: "kernel taps",
                        expected: KERNEL,
                        found: taps.len(),
                    });
                }
                for (k, &value) in taps.iter().enumerate() {
                    self.weights.0[i][k][in_start + c] = value;
                }
            }
        }
        Ok(())
    }

    /// Sets the bias from `bias[OUT]`.
    pub fn set_bias(&mut self, bias: &[T]) -> Result<()> {
        if bias.len() != OUT {
            return Err(ModelError::ShapeMismatch {
                layer: "conv1d",
                what: "bias",
                expected: OUT,
                found: bias.len(),
            });
        }
        self.bias.copy_from_slice(bias);
        Ok(())
    }

    fn advance(&mut self) {
        self.state_ptr = if self.state_ptr == STATE_SIZE - 1 {
            0
        } else {
            self.state_ptr + 1
        };
    }
}

impl<
        T: Scalar,
        const IN: usize,
        const OUT: usize,
        const KERNEL: usize,
        const DILATION: usize,
        const STATE_SIZE: usize,
        M: MathsProvider<T>,
    > Default for Conv1dT<T, IN, OUT, KERNEL, DILATION, STATE_SIZE, M>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<
        T: Scalar,
        const IN: usize,
        const OUT: usize,
        const KERNEL: usize,
        const DILATION: usize,
        const STATE_SIZE: usize,
        M: MathsProvider<T>,
    > StaticLayer<T> for Conv1dT<T, IN, OUT, KERNEL, DILATION, STATE_SIZE, M>
{
    const IN_SIZE: usize = IN;
    const OUT_SIZE: usize = OUT;

    fn name(&self) -> &'static str {
        "conv1d"
    }

    fn reset(&mut self) {
        self.state = Aligned([[T::zero(); IN]; STATE_SIZE]);
        self.state_ptr = 0;
    }

    fn forward(&mut self, input: &[T]) {
        debug_assert_eq!(input.len(), IN);
        self.state.0[self.state_ptr].copy_from_slice(input);

        for i in 0..OUT {
            let mut acc = self.bias[i];
            for k in 0..KERNEL {
                let idx = (self.state_ptr + STATE_SIZE - k * DILATION) % STATE_SIZE;
                acc = acc
                    + M::dot(
                        aview1(&self.weights.0[i][k]),
                        aview1(&self.state.0[idx]),
                    );
            }
            self.outs.0[i] = acc;
        }

        self.advance();
    }

    fn output(&self) -> &[T] {
        &self.outs.0
    }
}

/// Output width of a feature-axis convolution under a padding policy.
pub fn stateless_features_out(
    features_in: usize,
    kernel_size: usize,
    stride: usize,
    padding: PaddingMode,
) -> usize {
    match padding {
        PaddingMode::Valid => (features_in - kernel_size) / stride + 1,
        PaddingMode::Same => (features_in + stride - 1) / stride,
    }
}

fn pad_left(features_in: usize, features_out: usize, kernel_size: usize, stride: usize) -> usize {
    let span = (features_out - 1) * stride + kernel_size;
    span.saturating_sub(features_in) / 2
}

/// Heap-allocated single-frame convolution across the feature axis.
///
/// Input and output frames are laid out `[feature][filter]` with the
/// filter index fastest. No internal state; `reset` is a no-op.
#[derive(Debug, Clone)]
pub struct Conv1dStateless<T: Scalar, M: MathsProvider<T> = StdMaths> {
    filters_in: usize,
    filters_out: usize,
    features_in: usize,
    features_out: usize,
    kernel_size: usize,
    stride: usize,
    pad_left: usize,
    /// `[filters_out][filters_in][kernel]`.
    weights: Array3<T>,
    bias: Array1<T>,
    _maths: PhantomData<M>,
}

impl<T: Scalar, M: MathsProvider<T>> Conv1dStateless<T, M> {
    pub fn new(
        filters_in: usize,
        filters_out: usize,
        features_in: usize,
        kernel_size: usize,
        stride: usize,
        padding: PaddingMode,
    ) -> Self {
        let features_out = stateless_features_out(features_in, kernel_size, stride, padding);
        let pad_left = match padding {
            PaddingMode::Valid => 0,
            PaddingMode::Same => pad_left(features_in, features_out, kernel_size, stride),
        };
        Self {
            filters_in,
            filters_out,
            features_in,
            features_out,
            kernel_size,
            stride,
            pad_left,
            weights: Array3::zeros((filters_out, filters_in, kernel_size)),
            bias: Array1::zeros(filters_out),
            _maths: PhantomData,
        }
    }

    /// Number of output feature positions.
    pub fn features_out(&self) -> usize {
        self.features_out
    }

    /// Size of the convolution kernel.
    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Convolution stride along the feature axis.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Sets the kernel weights from `w[filters_out][filters_in][kernel]`.
    pub fn set_weights(&mut self, w: &[Vec<Vec<T>>]) -> Result<()> {
        if w.len() != self.filters_out {
            return Err(ModelError::ShapeMismatch {
                layer: "conv1d_stateless",
                what: "weight filters",
                expected: self.filters_out,
                found: w.len(),
            });
        }
        for (i, per_in) in w.iter().enumerate() {
            if per_in.len() != self.filters_in {
                return Err(ModelError::ShapeMismatch {
                    layer: "conv1d_stateless",
                    what: "weight input filters",
                    expected: self.filters_in,
                    found: per_in.len(),
                });
            }
            for (c, taps) in per_in.iter().enumerate() {
                if taps.len() != self.kernel_size {
                    return Err(ModelError::ShapeMismatch {
                        layer: "conv1d_stateless",
                        what: "kernel taps",
                        expected: self.kernel_size,
                        found: taps.len(),
                    });
                }
                for (k, &value) in taps.iter().enumerate() {
                    self.weights[(i, c, k)] = value;
                }
            }
        }
        Ok(())
    }

    /// Sets the bias from `bias[filters_out]`.
    pub fn set_bias(&mut self, bias: &[T]) -> Result<()> {
        if bias.len() != self.filters_out {
            return Err(ModelError::ShapeMismatch {
                layer: "conv1d_stateless",
                what: "bias",
                expected: self.filters_out,
                found: bias.len(),
            });
        }
        self.bias.assign(&aview1(bias));
        Ok(())
    }
}

impl<T: Scalar, M: MathsProvider<T>> Layer<T> for Conv1dStateless<T, M> {
    fn in_size(&self) -> usize {
        self.filters_in * self.features_in
    }

    fn out_size(&self) -> usize {
        self.filters_out * self.features_out
    }

    fn name(&self) -> &'static str {
        "conv1d_stateless"
    }

    fn forward(&mut self, input: &[T], out: &mut [T]) {
        for j in 0..self.features_out {
            for i in 0..self.filters_out {
                let mut acc = self.bias[i];
                for k in 0..self.kernel_size {
                    let f = (j * self.stride + k) as isize - self.pad_left as isize;
                    if f < 0 || f as usize >= self.features_in {
                        continue;
                    }
                    let col = &input[f as usize * self.filters_in..][..self.filters_in];
                    acc = acc + M::dot(self.weights.slice(s![i, .., k]), aview1(col));
                }
                out[j * self.filters_out + i] = acc;
            }
        }
    }
}

/// Compile-time-sized single-frame feature-axis convolution with valid
/// padding; `FEATURES_OUT` must equal `(FEATURES_IN - KERNEL) / STRIDE + 1`.
#[derive(Debug, Clone)]
pub struct Conv1dStatelessT<
    T: Scalar,
    const FILTERS_IN: usize,
    const FILTERS_OUT: usize,
    const FEATURES_IN: usize,
    const FEATURES_OUT: usize,
    const KERNEL: usize,
    const STRIDE: usize,
    M: MathsProvider<T> = StdMaths,
> {
    weights: Aligned<[[[T; KERNEL]; FILTERS_IN]; FILTERS_OUT]>,
    bias: [T; FILTERS_OUT],
    outs: Aligned<[[T; FILTERS_OUT]; FEATURES_OUT]>,
    _maths: PhantomData<M>,
}

impl<
        T: Scalar,
        const FILTERS_IN: usize,
        const FILTERS_OUT: usize,
        const FEATURES_IN: usize,
        const FEATURES_OUT: usize,
        const KERNEL: usize,
        const STRIDE: usize,
        M: MathsProvider<T>,
    > Conv1dStatelessT<T, FILTERS_IN, FILTERS_OUT, FEATURES_IN, FEATURES_OUT, KERNEL, STRIDE, M>
{
    const SHAPE_OK: () = assert!(
        FEATURES_OUT == (FEATURES_IN - KERNEL) / STRIDE + 1,
        "FEATURES_OUT must equal (FEATURES_IN - KERNEL) / STRIDE + 1"
    );

    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::SHAPE_OK;
        Self {
            weights: Aligned([[[T::zero(); KERNEL]; FILTERS_IN]; FILTERS_OUT]),
            bias: [T::zero(); FILTERS_OUT],
            outs: Aligned([[T::zero(); FILTERS_OUT]; FEATURES_OUT]),
            _maths: PhantomData,
        }
    }

    /// Sets the kernel weights from `w[FILTERS_OUT][FILTERS_IN][KERNEL]`.
    pub fn set_weights(&mut self, w: &[Vec<Vec<T>>]) -> Result<()> {
        if w.len() != FILTERS_OUT {
            return Err(ModelError::ShapeMismatch {
                layer: "conv1d_stateless",
                what: "weight filters",
                expected: FILTERS_OUT,
                found: w.len(),
            });
        }
        for (i, per_in) in w.iter().enumerate() {
            if per_in.len() != FILTERS_IN {
                return Err(ModelError::ShapeMismatch {
                    layer: "conv1d_stateless",
                    what: "weight input filters",
                    expected: FILTERS_IN,
                    found: per_in.len(),
                });
            }
            for (c, taps) in per_in.iter().enumerate() {
                if taps.len() != KERNEL {
                    return Err(ModelError::ShapeMismatch {
                        layer: "conv1d_stateless",
                        what: "kernel taps",
                        expected: KERNEL,
                        found: taps.len(),
                    });
                }
                self.weights.0[i][c].copy_from_slice(taps);
            }
        }
        Ok(())
    }

    /// Sets the bias from `bias[FILTERS_OUT]`.
    pub fn set_bias(&mut self, bias: &[T]) -> Result<()> {
        if bias.len() != FILTERS_OUT {
            return Err(ModelError::ShapeMismatch {
                layer: "conv1d_stateless",
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
        const KERNEL: usize,
        const STRIDE: usize,
        M: MathsProvider<T>,
    > Default
    for Conv1dStatelessT<T, FILTERS_IN, FILTERS_OUT, FEATURES_IN, FEATURES_OUT, KERNEL, STRIDE, M>
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
        const KERNEL: usize,
        const STRIDE: usize,
        M: MathsProvider<T>,
    > StaticLayer<T>
    for Conv1dStatelessT<T, FILTERS_IN, FILTERS_OUT, FEATURES_IN, FEATURES_OUT, KERNEL, STRIDE, M>
{
    const IN_SIZE: usize = FILTERS_IN * FEATURES_IN;
    const OUT_SIZE: usize = FILTERS_OUT * FEATURES_OUT;

    fn name(&self) -> &'static str {
        "conv1d_stateless"
    }

    fn reset(&mut self) {}

    fn forward(&mut self, input: &[T]) {
        debug_assert_eq!(input.len(), Self::IN_SIZE);
        for j in 0..FEATURES_OUT {
            for i in 0..FILTERS_OUT {
                let mut acc = self.bias[i];
                for k in 0..KERNEL {
                    let col = &input[(j * STRIDE + k) * FILTERS_IN..][..FILTERS_IN];
                    for (c, &x) in col.iter().enumerate() {
                        acc = acc + self.weights.0[i][c][k] * x;
                    }
                }
                self.outs.0[j][i] = acc;
            }
        }
    }

    fn output(&self) -> &[T] {
        self.outs.0.as_flattened()
    }
}

/// Loader-facing surface shared by the dynamic and static streaming
/// convolutions.
pub trait Conv1dApi<T: Scalar> {
    /// `(in_size, out_size)`.
    fn dims(&self) -> (usize, usize);
    fn kernel_size(&self) -> usize;
    fn dilation(&self) -> usize;
    fn groups(&self) -> usize;
    /// Kernel weights, `w[out][in / groups][kernel]`, tap 0 newest.
    fn set_weights(&mut self, w: &[Vec<Vec<T>>]) -> Result<()>;
    /// Bias, `bias[out]`.
    fn set_bias(&mut self, bias: &[T]) -> Result<()>;
}

impl<T: Scalar, M: MathsProvider<T>> Conv1dApi<T> for Conv1d<T, M> {
    fn dims(&self) -> (usize, usize) {
        (self.in_size, self.out_size)
    }

    fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    fn dilation(&self) -> usize {
        self.dilation
    }

    fn groups(&self) -> usize {
        self.groups
    }

    fn set_weights(&mut self, w: &[Vec<Vec<T>>]) -> Result<()> {
        Conv1d::set_weights(self, w)
    }

    fn set_bias(&mut self, bias: &[T]) -> Result<()> {
        Conv1d::set_bias(self, bias)
    }
}

impl<
        T: Scalar,
        const IN: usize,
        const OUT: usize,
        const KERNEL: usize,
        const DILATION: usize,
        const STATE_SIZE: usize,
        M: MathsProvider<T>,
    > Conv1dApi<T> for Conv1dT<T, IN, OUT, KERNEL, DILATION, STATE_SIZE, M>
{
    fn dims(&self) -> (usize, usize) {
        (IN, OUT)
    }

    fn kernel_size(&self) -> usize {
        KERNEL
    }

    fn dilation(&self) -> usize {
        DILATION
    }

    fn groups(&self) -> usize {
        self.groups
    }

    fn set_weights(&mut self, w: &[Vec<Vec<T>>]) -> Result<()> {
        Conv1dT::set_weights(self, w)
    }

    fn set_bias(&mut self, bias: &[T]) -> Result<()> {
        Conv1dT::set_bias(self, bias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_reproduces_kernel_taps_in_time_order() {
        let kernel = 3;
        let dilation = 2;
        let mut conv = Conv1d::<f64>::new(1, 1, kernel, dilation);
        conv.set_weights(&[vec![vec![0.25, 0.5, -1.0]]]).unwrap();
        conv.set_bias(&[0.0]).unwrap();
        conv.reset();

        // Feed a one-hot impulse followed by zeros; the output sequence
        // must replay the taps spaced `dilation` frames apart.
        let receptive = (kernel - 1) * dilation + 1;
        let mut outputs = Vec::new();
        let mut out = [0.0f64];
        for n in 0..receptive + 2 {
            let x = if n == 0 { 1.0 } else { 0.0 };
            conv.forward(&[x], &mut out);
            outputs.push(out[0]);
        }

        assert!((outputs[0] - 0.25).abs() < 1.0e-15);
        assert!((outputs[dilation] - 0.5).abs() < 1.0e-15);
        assert!((outputs[2 * dilation] + 1.0).abs() < 1.0e-15);
        for (n, &y) in outputs.iter().enumerate() {
            if n % dilation != 0 || n > 2 * dilation {
                assert!(y.abs() < 1.0e-15, "unexpected echo at frame {n}");
            }
        }
    }

    #[test]
    fn grouped_channels_see_only_their_own_inputs() {
        // Two groups: out 0 reads in {0, 1}, out 1 reads in {2, 3}.
        let mut conv = Conv1d::<f64>::grouped(4, 2, 1, 1, 2).unwrap();
        conv.set_weights(&[vec![vec![1.0], vec![10.0]], vec![vec![100.0], vec![1000.0]]])
            .unwrap();
        conv.set_bias(&[0.0, 0.0]).unwrap();

        let mut out = [0.0f64; 2];
        conv.forward(&[1.0, 2.0, 3.0, 4.0], &mut out);
        assert!((out[0] - 21.0).abs() < 1.0e-12);
        assert!((out[1] - 4300.0).abs() < 1.0e-12);
    }

    #[test]
    fn grouping_must_divide_channel_counts() {
        assert!(Conv1d::<f64>::grouped(4, 2, 1, 1, 3).is_err());
        assert!(Conv1d::<f64>::grouped(5, 2, 1, 1, 2).is_err());
    }

    #[test]
    fn skip_advances_history_without_output() {
        let mut conv = Conv1d::<f64>::new(1, 1, 2, 1);
        conv.set_weights(&[vec![vec![1.0, 2.0]]]).unwrap();
        conv.set_bias(&[0.0]).unwrap();

        conv.skip(&[5.0]);
        let mut out = [0.0f64];
        conv.forward(&[3.0], &mut out);
        // Tap 0 reads the new frame, tap 1 the skipped one.
        assert!((out[0] - (3.0 + 2.0 * 5.0)).abs() < 1.0e-15);
    }

    #[test]
    fn static_conv_matches_dynamic_conv() {
        let w = vec![vec![vec![0.5, -0.25, 0.125]], vec![vec![1.0, 0.0, -1.0]]];
        let b = [0.1, -0.1];

        let mut dynamic = Conv1d::<f64>::new(1, 2, 3, 2);
        dynamic.set_weights(&w).unwrap();
        dynamic.set_bias(&b).unwrap();

        let mut fixed = Conv1dT::<f64, 1, 2, 3, 2, 5>::new();
        fixed.set_weights(&w).unwrap();
        fixed.set_bias(&b).unwrap();

        let mut out = [0.0f64; 2];
        for n in 0..12 {
            let x = [(n as f64 * 0.37).sin()];
            dynamic.forward(&x, &mut out);
            StaticLayer::forward(&mut fixed, &x);
            for (a, b) in out.iter().zip(fixed.output()) {
                assert!((a - b).abs() < 1.0e-14);
            }
        }
    }

    #[test]
    fn stateless_same_padding_covers_every_position() {
        let mut conv =
            Conv1dStateless::<f64>::new(1, 1, 4, 3, 1, PaddingMode::Same);
        assert_eq!(conv.features_out(), 4);
        conv.set_weights(&[vec![vec![1.0, 1.0, 1.0]]]).unwrap();
        conv.set_bias(&[0.0]).unwrap();

        let mut out = [0.0f64; 4];
        conv.forward(&[1.0, 2.0, 3.0, 4.0], &mut out);
        // Moving sums with one zero pad on each side.
        assert_eq!(out, [3.0, 6.0, 9.0, 7.0]);
    }

    #[test]
    fn stateless_valid_padding_matches_static_variant() {
        let w = vec![vec![vec![0.5, -1.0]], vec![vec![2.0, 0.25]]];
        let b = [0.0, 1.0];

        let mut dynamic = Conv1dStateless::<f64>::new(1, 2, 5, 2, 1, PaddingMode::Valid);
        dynamic.set_weights(&w).unwrap();
        dynamic.set_bias(&b).unwrap();

        let mut fixed = Conv1dStatelessT::<f64, 1, 2, 5, 4, 2, 1>::new();
        fixed.set_weights(&w).unwrap();
        fixed.set_bias(&b).unwrap();

        let input = [1.0, -2.0, 0.5, 3.0, -1.0];
        let mut out = [0.0f64; 8];
        dynamic.forward(&input, &mut out);
        StaticLayer::forward(&mut fixed, &input);
        for (a, b) in out.iter().zip(fixed.output()) {
            assert!((a - b).abs() < 1.0e-14);
        }
    }
}
