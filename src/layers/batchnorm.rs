//! Batch normalization layers (inference form).
//!
//! At inference time batch norm is a fixed per-channel affine transform:
//! `y = (x - running_mean) * multiplier + beta` with
//! `multiplier = gamma / sqrt(running_var + epsilon)`. The multiplier is
//! refreshed whenever gamma, the running variance, or epsilon change, so
//! `forward` never touches a square root. Non-affine layers keep gamma at
//! one and beta at zero.

use ndarray::{aview1, Array1};

use super::{Aligned, Layer, StaticLayer};
use crate::error::{ModelError, Result};
use crate::maths::Scalar;

fn check_len<T>(layer: &'static str, what: &'static str, expected: usize, got: &[T]) -> Result<()> {
    if got.len() != expected {
        return Err(ModelError::ShapeMismatch {
            layer,
            what,
            expected,
            found: got.len(),
        });
    }
    Ok(())
}

/// Heap-allocated batch normalization over a flat frame of channels.
#[derive(Debug, Clone)]
pub struct BatchNorm1d<T: Scalar> {
    affine: bool,
    gamma: Array1<T>,
    beta: Array1<T>,
    running_mean: Array1<T>,
    running_var: Array1<T>,
    multiplier: Array1<T>,
    epsilon: T,
}

impl<T: Scalar> BatchNorm1d<T> {
    /// Creates an affine batch-norm layer of the given width.
    pub fn new(size: usize) -> Self {
        Self {
            affine: true,
            gamma: Array1::ones(size),
            beta: Array1::zeros(size),
            running_mean: Array1::zeros(size),
            running_var: Array1::ones(size),
            multiplier: Array1::ones(size),
            epsilon: T::zero(),
        }
    }

    /// Creates a non-affine layer (no learned gamma/beta).
    pub fn non_affine(size: usize) -> Self {
        let mut layer = Self::new(size);
        layer.affine = false;
        layer
    }

    /// Whether the layer carries learned gamma/beta.
    pub fn is_affine(&self) -> bool {
        self.affine
    }

    /// Sets the learned scale. Ignored by non-affine layers.
    pub fn set_gamma(&mut self, gamma: &[T]) -> Result<()> {
        if !self.affine {
            return Ok(());
        }
        check_len("batchnorm", "gamma", self.gamma.len(), gamma)?;
        self.gamma.assign(&aview1(gamma));
        self.update_multiplier();
        Ok(())
    }

    /// Sets the learned shift. Ignored by non-affine layers.
    pub fn set_beta(&mut self, beta: &[T]) -> Result<()> {
        if !self.affine {
            return Ok(());
        }
        check_len("batchnorm", "beta", self.beta.len(), beta)?;
        self.beta.assign(&aview1(beta));
        Ok(())
    }

    /// Sets the trained running mean.
    pub fn set_running_mean(&mut self, mean: &[T]) -> Result<()> {
        check_len("batchnorm", "running mean", self.running_mean.len(), mean)?;
        self.running_mean.assign(&aview1(mean));
        Ok(())
    }

    /// Sets the trained running variance.
    pub fn set_running_variance(&mut self, var: &[T]) -> Result<()> {
        check_len("batchnorm", "running variance", self.running_var.len(), var)?;
        self.running_var.assign(&aview1(var));
        self.update_multiplier();
        Ok(())
    }

    /// Sets the numerical-stability epsilon.
    pub fn set_epsilon(&mut self, epsilon: T) {
        self.epsilon = epsilon;
        self.update_multiplier();
    }

    fn update_multiplier(&mut self) {
        for ((m, &g), &v) in self
            .multiplier
            .iter_mut()
            .zip(self.gamma.iter())
            .zip(self.running_var.iter())
        {
            *m = g / (v + self.epsilon).sqrt();
        }
    }
}

impl<T: Scalar> Layer<T> for BatchNorm1d<T> {
    fn in_size(&self) -> usize {
        self.gamma.len()
    }

    fn out_size(&self) -> usize {
        self.gamma.len()
    }

    fn name(&self) -> &'static str {
        "batchnorm"
    }

    fn forward(&mut self, input: &[T], out: &mut [T]) {
        for (i, (y, &x)) in out.iter_mut().zip(input).enumerate() {
            *y = (x - self.running_mean[i]) * self.multiplier[i] + self.beta[i];
        }
    }
}

/// Heap-allocated batch normalization over `[feature][filter]` frames,
/// normalizing per filter.
#[derive(Debug, Clone)]
pub struct BatchNorm2d<T: Scalar> {
    num_filters: usize,
    num_features: usize,
    inner: BatchNorm1d<T>,
}

impl<T: Scalar> BatchNorm2d<T> {
    /// Creates an affine layer for `num_filters` channels replicated
    /// across `num_features` positions.
    pub fn new(num_filters: usize, num_features: usize) -> Self {
        Self {
            num_filters,
            num_features,
            inner: BatchNorm1d::new(num_filters),
        }
    }

    /// Creates a non-affine layer.
    pub fn non_affine(num_filters: usize, num_features: usize) -> Self {
        Self {
            num_filters,
            num_features,
            inner: BatchNorm1d::non_affine(num_filters),
        }
    }

    pub fn is_affine(&self) -> bool {
        self.inner.is_affine()
    }

    pub fn set_gamma(&mut self, gamma: &[T]) -> Result<()> {
        self.inner.set_gamma(gamma)
    }

    pub fn set_beta(&mut self, beta: &[T]) -> Result<()> {
        self.inner.set_beta(beta)
    }

    pub fn set_running_mean(&mut self, mean: &[T]) -> Result<()> {
        self.inner.set_running_mean(mean)
    }

    pub fn set_running_variance(&mut self, var: &[T]) -> Result<()> {
        self.inner.set_running_variance(var)
    }

    pub fn set_epsilon(&mut self, epsilon: T) {
        self.inner.set_epsilon(epsilon)
    }
}

impl<T: Scalar> Layer<T> for BatchNorm2d<T> {
    fn in_size(&self) -> usize {
        self.num_filters * self.num_features
    }

    fn out_size(&self) -> usize {
        self.num_filters * self.num_features
    }

    fn name(&self) -> &'static str {
        "batchnorm2d"
    }

    fn forward(&mut self, input: &[T], out: &mut [T]) {
        for feature in 0..self.num_features {
            let base = feature * self.num_filters;
            for c in 0..self.num_filters {
                out[base + c] = (input[base + c] - self.inner.running_mean[c])
                    * self.inner.multiplier[c]
                    + self.inner.beta[c];
            }
        }
    }
}

/// Compile-time-sized batch normalization over a flat frame.
#[derive(Debug, Clone)]
pub struct BatchNorm1dT<T: Scalar, const SIZE: usize, const AFFINE: bool = true> {
    gamma: [T; SIZE],
    beta: [T; SIZE],
    running_mean: [T; SIZE],
    running_var: [T; SIZE],
    multiplier: [T; SIZE],
    epsilon: T,
    outs: Aligned<[T; SIZE]>,
}

impl<T: Scalar, const SIZE: usize, const AFFINE: bool> BatchNorm1dT<T, SIZE, AFFINE> {
    pub fn new() -> Self {
        Self {
            gamma: [T::one(); SIZE],
            beta: [T::zero(); SIZE],
            running_mean: [T::zero(); SIZE],
            running_var: [T::one(); SIZE],
            multiplier: [T::one(); SIZE],
            epsilon: T::zero(),
            outs: Aligned([T::zero(); SIZE]),
        }
    }

    /// Sets the learned scale. Ignored when `AFFINE` is false.
    pub fn set_gamma(&mut self, gamma: &[T]) -> Result<()> {
        if !AFFINE {
            return Ok(());
        }
        check_len("batchnorm", "gamma", SIZE, gamma)?;
        self.gamma.copy_from_slice(gamma);
        self.update_multiplier();
        Ok(())
    }

    /// Sets the learned shift. Ignored when `AFFINE` is false.
    pub fn set_beta(&mut self, beta: &[T]) -> Result<()> {
        if !AFFINE {
            return Ok(());
        }
        check_len("batchnorm", "beta", SIZE, beta)?;
        self.beta.copy_from_slice(beta);
        Ok(())
    }

    /// Sets the trained running mean.
    pub fn set_running_mean(&mut self, mean: &[T]) -> Result<()> {
        check_len("batchnorm", "running mean", SIZE, mean)?;
        self.running_mean.copy_from_slice(mean);
        Ok(())
    }

    /// Sets the trained running variance.
    pub fn set_running_variance(&mut self, var: &[T]) -> Result<()> {
        check_len("batchnorm", "running variance", SIZE, var)?;
        self.running_var.copy_from_slice(var);
        self.update_multiplier();
        Ok(())
    }

    /// Sets the numerical-stability epsilon.
    pub fn set_epsilon(&mut self, epsilon: T) {
        self.epsilon = epsilon;
        self.update_multiplier();
    }

    fn update_multiplier(&mut self) {
        for i in 0..SIZE {
            self.multiplier[i] = self.gamma[i] / (self.running_var[i] + self.epsilon).sqrt();
        }
    }
}

impl<T: Scalar, const SIZE: usize, const AFFINE: bool> Default for BatchNorm1dT<T, SIZE, AFFINE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar, const SIZE: usize, const AFFINE: bool> StaticLayer<T>
    for BatchNorm1dT<T, SIZE, AFFINE>
{
    const IN_SIZE: usize = SIZE;
    const OUT_SIZE: usize = SIZE;

    fn name(&self) -> &'static str {
        "batchnorm"
    }

    fn reset(&mut self) {}

    fn forward(&mut self, input: &[T]) {
        debug_assert_eq!(input.len(), SIZE);
        for (i, (y, &x)) in self.outs.0.iter_mut().zip(input).enumerate() {
            *y = (x - self.running_mean[i]) * self.multiplier[i] + self.beta[i];
        }
    }

    fn output(&self) -> &[T] {
        &self.outs.0
    }
}

/// Compile-time-sized batch normalization over `[feature][filter]`
/// frames, normalizing per filter.
#[derive(Debug, Clone)]
pub struct BatchNorm2dT<
    T: Scalar,
    const FILTERS: usize,
    const FEATURES: usize,
    const AFFINE: bool = true,
> {
    inner: BatchNorm1dT<T, FILTERS, AFFINE>,
    outs: Aligned<[[T; FILTERS]; FEATURES]>,
}

impl<T: Scalar, const FILTERS: usize, const FEATURES: usize, const AFFINE: bool>
    BatchNorm2dT<T, FILTERS, FEATURES, AFFINE>
{
    pub fn new() -> Self {
        Self {
            inner: BatchNorm1dT::new(),
            outs: Aligned([[T::zero(); FILTERS]; FEATURES]),
        }
    }

    pub fn set_gamma(&mut self, gamma: &[T]) -> Result<()> {
        self.inner.set_gamma(gamma)
    }

    pub fn set_beta(&mut self, beta: &[T]) -> Result<()> {
        self.inner.set_beta(beta)
    }

    pub fn set_running_mean(&mut self, mean: &[T]) -> Result<()> {
        self.inner.set_running_mean(mean)
    }

    pub fn set_running_variance(&mut self, var: &[T]) -> Result<()> {
        self.inner.set_running_variance(var)
    }

    pub fn set_epsilon(&mut self, epsilon: T) {
        self.inner.set_epsilon(epsilon)
    }
}

impl<T: Scalar, const FILTERS: usize, const FEATURES: usize, const AFFINE: bool> Default
    for BatchNorm2dT<T, FILTERS, FEATURES, AFFINE>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar, const FILTERS: usize, const FEATURES: usize, const AFFINE: bool> StaticLayer<T>
    for BatchNorm2dT<T, FILTERS, FEATURES, AFFINE>
{
    const IN_SIZE: usize = FILTERS * FEATURES;
    const OUT_SIZE: usize = FILTERS * FEATURES;

    fn name(&self) -> &'static str {
        "batchnorm2d"
    }

    fn reset(&mut self) {}

    fn forward(&mut self, input: &[T]) {
        debug_assert_eq!(input.len(), Self::IN_SIZE);
        for (feature, frame) in self.outs.0.iter_mut().enumerate() {
            let base = feature * FILTERS;
            for c in 0..FILTERS {
                frame[c] = (input[base + c] - self.inner.running_mean[c])
                    * self.inner.multiplier[c]
                    + self.inner.beta[c];
            }
        }
    }

    fn output(&self) -> &[T] {
        self.outs.0.as_flattened()
    }
}

/// Loader-facing surface shared by the batch-norm layers.
pub trait BatchNormApi<T: Scalar> {
    /// Number of normalized channels.
    fn channels(&self) -> usize;
    fn is_affine(&self) -> bool;
    fn set_gamma(&mut self, gamma: &[T]) -> Result<()>;
    fn set_beta(&mut self, beta: &[T]) -> Result<()>;
    fn set_running_mean(&mut self, mean: &[T]) -> Result<()>;
    fn set_running_variance(&mut self, var: &[T]) -> Result<()>;
    fn set_epsilon(&mut self, epsilon: T);
}

macro_rules! delegate_batchnorm_api {
    () => {
        fn set_gamma(&mut self, gamma: &[T]) -> Result<()> {
            Self::set_gamma(self, gamma)
        }
        fn set_beta(&mut self, beta: &[T]) -> Result<()> {
            Self::set_beta(self, beta)
        }
        fn set_running_mean(&mut self, mean: &[T]) -> Result<()> {
            Self::set_running_mean(self, mean)
        }
        fn set_running_variance(&mut self, var: &[T]) -> Result<()> {
            Self::set_running_variance(self, var)
        }
        fn set_epsilon(&mut self, epsilon: T) {
            Self::set_epsilon(self, epsilon)
        }
    };
}

impl<T: Scalar> BatchNormApi<T> for BatchNorm1d<T> {
    fn channels(&self) -> usize {
        self.gamma.len()
    }
    fn is_affine(&self) -> bool {
        self.affine
    }
    delegate_batchnorm_api!();
}

impl<T: Scalar> BatchNormApi<T> for BatchNorm2d<T> {
    fn channels(&self) -> usize {
        self.num_filters
    }
    fn is_affine(&self) -> bool {
        self.inner.affine
    }
    delegate_batchnorm_api!();
}

impl<T: Scalar, const SIZE: usize, const AFFINE: bool> BatchNormApi<T>
    for BatchNorm1dT<T, SIZE, AFFINE>
{
    fn channels(&self) -> usize {
        SIZE
    }
    fn is_affine(&self) -> bool {
        AFFINE
    }
    delegate_batchnorm_api!();
}

impl<T: Scalar, const FILTERS: usize, const FEATURES: usize, const AFFINE: bool> BatchNormApi<T>
    for BatchNorm2dT<T, FILTERS, FEATURES, AFFINE>
{
    fn channels(&self) -> usize {
        FILTERS
    }
    fn is_affine(&self) -> bool {
        AFFINE
    }
    delegate_batchnorm_api!();
}
