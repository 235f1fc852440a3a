//! JSON weight loading.
//!
//! The model document is the format emitted by the usual training-side
//! exporters: an `in_shape` declaration plus an ordered list of layer
//! descriptors, each with a `type` tag, a `shape`, an optional inline
//! `activation` tag, and a nested-array `weights` payload whose layout
//! depends on the type tag.
//!
//! [`parse_json`] builds a complete dynamic [`Model`]. For the
//! compile-time pipeline, the per-layer `load_*` functions do the same
//! shape-checked work against layers the caller already owns; they are
//! generic over small capability traits so both pipelines share one
//! loader.
//!
//! Every mismatch between a payload and the target layer's declared
//! shape is a [`ModelError`]; nothing is truncated or zero-filled.

use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::layers::activation::PreluApi;
use crate::layers::batchnorm::BatchNormApi;
use crate::layers::conv1d::Conv1dApi;
use crate::layers::conv2d::Conv2dApi;
use crate::layers::dense::DenseApi;
use crate::layers::gru::GruApi;
use crate::layers::lstm::LstmApi;
use crate::layers::{
    Activation, ActivationKind, BatchNorm1d, BatchNorm2d, Conv1d, Conv2d, Dense, Gru, Layer,
    Lstm, PRelu, PaddingMode,
};
use crate::maths::{cast, MathsProvider, Scalar};
use crate::model::Model;

/// Top-level structure of a model document.
#[derive(Debug, Deserialize)]
pub struct ModelJson {
    pub in_shape: Value,
    pub layers: Vec<LayerJson>,
}

/// One layer descriptor.
#[derive(Debug, Deserialize)]
pub struct LayerJson {
    #[serde(rename = "type")]
    pub layer_type: String,
    #[serde(default)]
    pub name: Option<String>,
    pub shape: Value,
    #[serde(default)]
    pub activation: Option<String>,
    #[serde(default)]
    pub weights: Value,
    #[serde(default)]
    pub kernel_size: Option<Value>,
    #[serde(default)]
    pub dilation: Option<Value>,
    #[serde(default)]
    pub groups: Option<usize>,
    #[serde(default)]
    pub epsilon: Option<f64>,
    #[serde(default)]
    pub kernel_size_time: Option<usize>,
    #[serde(default)]
    pub kernel_size_feature: Option<usize>,
    #[serde(default)]
    pub strides: Option<usize>,
    #[serde(default)]
    pub num_filters_in: Option<usize>,
    #[serde(default)]
    pub num_features_in: Option<usize>,
    #[serde(default)]
    pub num_filters_out: Option<usize>,
    #[serde(default)]
    pub padding: Option<String>,
}

fn bad(msg: impl Into<String>) -> ModelError {
    ModelError::BadWeights(msg.into())
}

fn number<T: Scalar>(value: &Value) -> Result<T> {
    value
        .as_f64()
        .map(cast)
        .ok_or_else(|| bad("expected a number"))
}

fn array(value: &Value) -> Result<&Vec<Value>> {
    value.as_array().ok_or_else(|| bad("expected an array"))
}

fn vec1<T: Scalar>(value: &Value) -> Result<Vec<T>> {
    array(value)?.iter().map(number).collect()
}

fn vec2<T: Scalar>(value: &Value) -> Result<Vec<Vec<T>>> {
    array(value)?.iter().map(vec1).collect()
}

fn vec3<T: Scalar>(value: &Value) -> Result<Vec<Vec<Vec<T>>>> {
    array(value)?.iter().map(vec2).collect()
}

fn vec4<T: Scalar>(value: &Value) -> Result<Vec<Vec<Vec<Vec<T>>>>> {
    array(value)?.iter().map(vec3).collect()
}

fn payload(weights: &Value, index: usize) -> Result<&Value> {
    array(weights)?
        .get(index)
        .ok_or_else(|| bad(format!("weights payload has no entry {index}")))
}

/// Last concrete (non-null) dimension of a shape declaration.
fn last_dim(shape: &Value) -> Result<usize> {
    array(shape)?
        .iter()
        .rev()
        .find_map(|v| v.as_u64())
        .map(|v| v as usize)
        .ok_or_else(|| bad("shape declares no concrete dimension"))
}

/// A scalar that exporters write either bare (`3`) or wrapped (`[3]`).
fn scalar_or_last(value: &Value) -> Result<usize> {
    if let Some(n) = value.as_u64() {
        return Ok(n as usize);
    }
    array(value)?
        .iter()
        .rev()
        .find_map(|v| v.as_u64())
        .map(|v| v as usize)
        .ok_or_else(|| bad("expected an integer or a list of integers"))
}

fn expect_dim(layer: &'static str, what: &'static str, expected: usize, found: usize) -> Result<()> {
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

/// Loads dense weights: `weights[0] = [in][out]` kernel (transposed into
/// the layer's row-major form), `weights[1] = [out]` bias.
pub fn load_dense<T: Scalar, L: DenseApi<T>>(layer: &mut L, weights: &Value) -> Result<()> {
    let (in_size, out_size) = layer.dims();
    let kernel = vec2::<T>(payload(weights, 0)?)?;
    expect_dim("dense", "kernel rows", in_size, kernel.len())?;

    let mut rows = vec![vec![T::zero(); in_size]; out_size];
    for (i, cols) in kernel.iter().enumerate() {
        expect_dim("dense", "kernel columns", out_size, cols.len())?;
        for (j, &value) in cols.iter().enumerate() {
            rows[j][i] = value;
        }
    }
    layer.set_weights(&rows)?;

    layer.set_bias(&vec1::<T>(payload(weights, 1)?)?)
}

/// Loads streaming-convolution weights:
/// `weights[0] = [kernel][in / groups][out]` with the kernel-time axis
/// reversed on load (tap 0 = newest frame), `weights[1] = [out]` bias.
pub fn load_conv1d<T: Scalar, L: Conv1dApi<T>>(layer: &mut L, weights: &Value) -> Result<()> {
    let (in_size, out_size) = layer.dims();
    let group_in = in_size / layer.groups();
    let kernel_size = layer.kernel_size();

    let kernel = vec3::<T>(payload(weights, 0)?)?;
    expect_dim("conv1d", "kernel taps", kernel_size, kernel.len())?;

    let mut w = vec![vec![vec![T::zero(); kernel_size]; group_in]; out_size];
    for (i, per_in) in kernel.iter().enumerate() {
        expect_dim("conv1d", "kernel input channels", group_in, per_in.len())?;
        for (j, per_out) in per_in.iter().enumerate() {
            expect_dim("conv1d", "kernel output channels", out_size, per_out.len())?;
            for (k, &value) in per_out.iter().enumerate() {
                w[k][j][kernel_size - 1 - i] = value;
            }
        }
    }
    layer.set_weights(&w)?;

    layer.set_bias(&vec1::<T>(payload(weights, 1)?)?)
}

/// Loads GRU weights: `[W [in][3*out], U [out][3*out], b [2][3*out]]`,
/// gate blocks ordered `z, r, h`.
pub fn load_gru<T: Scalar, L: GruApi<T>>(layer: &mut L, weights: &Value) -> Result<()> {
    layer.set_w_vals(&vec2::<T>(payload(weights, 0)?)?)?;
    layer.set_u_vals(&vec2::<T>(payload(weights, 1)?)?)?;
    layer.set_b_vals(&vec2::<T>(payload(weights, 2)?)?)
}

/// Loads LSTM weights: `[W [in][4*out], U [out][4*out], b [4*out]]`,
/// gate blocks ordered `i, f, c, o`.
pub fn load_lstm<T: Scalar, L: LstmApi<T>>(layer: &mut L, weights: &Value) -> Result<()> {
    layer.set_w_vals(&vec2::<T>(payload(weights, 0)?)?)?;
    layer.set_u_vals(&vec2::<T>(payload(weights, 1)?)?)?;
    layer.set_b_vals(&vec1::<T>(payload(weights, 2)?)?)
}

/// Loads PReLU slopes from `weights[0]`; accepts a flat list or one
/// level of nesting, and a single value broadcasts.
pub fn load_prelu<T: Scalar, L: PreluApi<T>>(layer: &mut L, weights: &Value) -> Result<()> {
    let entry = payload(weights, 0)?;
    let alpha = match vec1::<T>(entry) {
        Ok(flat) => flat,
        Err(_) => vec2::<T>(entry)?.into_iter().flatten().collect(),
    };
    layer.set_alpha_vals(&alpha)
}

/// Loads batch-norm statistics: `[gamma, beta, mean, var]` for affine
/// layers, `[mean, var]` for non-affine ones, plus the document's
/// `epsilon` field.
pub fn load_batchnorm<T: Scalar, L: BatchNormApi<T>>(
    layer: &mut L,
    weights: &Value,
    epsilon: Option<f64>,
) -> Result<()> {
    let entries = array(weights)?;
    match entries.len() {
        4 => {
            if !layer.is_affine() {
                return Err(bad("affine batch-norm weights for a non-affine layer"));
            }
            layer.set_gamma(&vec1::<T>(&entries[0])?)?;
            layer.set_beta(&vec1::<T>(&entries[1])?)?;
            layer.set_running_mean(&vec1::<T>(&entries[2])?)?;
            layer.set_running_variance(&vec1::<T>(&entries[3])?)?;
        }
        2 => {
            if layer.is_affine() {
                return Err(bad("non-affine batch-norm weights for an affine layer"));
            }
            layer.set_running_mean(&vec1::<T>(&entries[0])?)?;
            layer.set_running_variance(&vec1::<T>(&entries[1])?)?;
        }
        n => {
            return Err(bad(format!(
                "batch-norm weights must have 2 or 4 entries, found {n}"
            )))
        }
    }
    let epsilon = epsilon.ok_or(ModelError::MissingField("epsilon"))?;
    layer.set_epsilon(cast::<T>(epsilon));
    Ok(())
}

/// Loads 2D-convolution weights:
/// `weights[0] = [kernel_time][kernel_feature][in][out]` with the time
/// axis reversed on load, `weights[1] = [out]` bias.
pub fn load_conv2d<T: Scalar, L: Conv2dApi<T>>(layer: &mut L, weights: &Value) -> Result<()> {
    let kt = layer.kernel_size_time();
    let kf = layer.kernel_size_feature();
    let filters_in = layer.filters_in();
    let filters_out = layer.filters_out();

    let kernel = vec4::<T>(payload(weights, 0)?)?;
    expect_dim("conv2d", "kernel time taps", kt, kernel.len())?;

    let mut w = vec![vec![vec![vec![T::zero(); kf]; filters_in]; filters_out]; kt];
    for (t, per_feature) in kernel.iter().enumerate() {
        expect_dim("conv2d", "kernel feature taps", kf, per_feature.len())?;
        for (f, per_in) in per_feature.iter().enumerate() {
            expect_dim("conv2d", "kernel input filters", filters_in, per_in.len())?;
            for (c, per_out) in per_in.iter().enumerate() {
                expect_dim("conv2d", "kernel output filters", filters_out, per_out.len())?;
                for (o, &value) in per_out.iter().enumerate() {
                    w[kt - 1 - t][o][c][f] = value;
                }
            }
        }
    }
    layer.set_weights(&w)?;

    layer.set_bias(&vec1::<T>(payload(weights, 1)?)?)
}

/// Parses a model document into a dynamic [`Model`].
///
/// Unknown layer-type tags are errors; see [`parse_json_lenient`] to
/// allow-list custom tags handled out of band.
pub fn parse_json<T: Scalar, M: MathsProvider<T>>(document: &str) -> Result<Model<T, M>> {
    let json: ModelJson = serde_json::from_str(document)?;
    parse_model_json(&json)
}

/// [`parse_json`] over an already-deserialized document.
pub fn parse_model_json<T: Scalar, M: MathsProvider<T>>(json: &ModelJson) -> Result<Model<T, M>> {
    build_model(json, &[])
}

/// Parses a model document, skipping layers whose type tag appears in
/// `allowed_custom`. The caller is responsible for wiring those layers
/// up itself; everything else behaves like [`parse_json`].
pub fn parse_json_lenient<T: Scalar, M: MathsProvider<T>>(
    document: &str,
    allowed_custom: &[&str],
) -> Result<Model<T, M>> {
    let json: ModelJson = serde_json::from_str(document)?;
    build_model(&json, allowed_custom)
}

fn attach_activation<T: Scalar, M: MathsProvider<T>>(
    model: &mut Model<T, M>,
    layer_json: &LayerJson,
    size: usize,
) -> Result<()> {
    if let Some(tag) = layer_json.activation.as_deref() {
        if !tag.is_empty() {
            debug!("  activation: {tag}");
            let kind = ActivationKind::from_name(tag)?;
            model.add_layer(Activation::new(kind, size))?;
        }
    }
    Ok(())
}

fn build_model<T: Scalar, M: MathsProvider<T>>(
    json: &ModelJson,
    allowed_custom: &[&str],
) -> Result<Model<T, M>> {
    let in_size = last_dim(&json.in_shape)?;
    debug!("input dimensions: {in_size}");

    if json.layers.is_empty() {
        return Err(ModelError::EmptyModel);
    }

    let mut model = Model::<T, M>::new(in_size);
    for layer_json in &json.layers {
        let tag = layer_json.layer_type.as_str();
        let out_size = last_dim(&layer_json.shape)?;
        let next_in = model.next_in_size();
        debug!(
            "layer: {} ({} -> {}){}",
            tag,
            next_in,
            out_size,
            layer_json
                .name
                .as_deref()
                .map(|n| format!(" \"{n}\""))
                .unwrap_or_default()
        );

        match tag {
            "dense" | "time-distributed-dense" => {
                let mut dense = Dense::<T, M>::new(next_in, out_size);
                load_dense(&mut dense, &layer_json.weights)?;
                model.add_layer(dense)?;
                attach_activation(&mut model, layer_json, out_size)?;
            }
            "conv1d" => {
                let kernel_size = layer_json
                    .kernel_size
                    .as_ref()
                    .ok_or(ModelError::MissingField("kernel_size"))
                    .and_then(scalar_or_last)?;
                let dilation = layer_json
                    .dilation
                    .as_ref()
                    .ok_or(ModelError::MissingField("dilation"))
                    .and_then(scalar_or_last)?;
                let groups = layer_json.groups.unwrap_or(1);
                let mut conv =
                    Conv1d::<T, M>::grouped(next_in, out_size, kernel_size, dilation, groups)?;
                load_conv1d(&mut conv, &layer_json.weights)?;
                model.add_layer(conv)?;
                attach_activation(&mut model, layer_json, out_size)?;
            }
            "conv2d" => {
                let filters_in = layer_json
                    .num_filters_in
                    .ok_or(ModelError::MissingField("num_filters_in"))?;
                let features_in = layer_json
                    .num_features_in
                    .ok_or(ModelError::MissingField("num_features_in"))?;
                let filters_out = layer_json.num_filters_out.unwrap_or(out_size);
                let kernel_size_time = layer_json
                    .kernel_size_time
                    .ok_or(ModelError::MissingField("kernel_size_time"))?;
                let kernel_size_feature = layer_json
                    .kernel_size_feature
                    .ok_or(ModelError::MissingField("kernel_size_feature"))?;
                let dilation = layer_json
                    .dilation
                    .as_ref()
                    .map(scalar_or_last)
                    .transpose()?
                    .unwrap_or(1);
                let stride = layer_json.strides.unwrap_or(1);
                let padding = layer_json
                    .padding
                    .as_deref()
                    .map(PaddingMode::from_name)
                    .transpose()?
                    .unwrap_or(PaddingMode::Valid);

                let mut conv = Conv2d::<T, M>::new(
                    filters_in,
                    filters_out,
                    features_in,
                    kernel_size_time,
                    kernel_size_feature,
                    dilation,
                    stride,
                    padding,
                );
                load_conv2d(&mut conv, &layer_json.weights)?;
                let conv_out = conv.out_size();
                model.add_layer(conv)?;
                attach_activation(&mut model, layer_json, conv_out)?;
            }
            "gru" => {
                let mut gru = Gru::<T, M>::new(next_in, out_size);
                load_gru(&mut gru, &layer_json.weights)?;
                model.add_layer(gru)?;
            }
            "lstm" => {
                let mut lstm = Lstm::<T, M>::new(next_in, out_size);
                load_lstm(&mut lstm, &layer_json.weights)?;
                model.add_layer(lstm)?;
            }
            "prelu" => {
                expect_dim("prelu", "shape", next_in, out_size)?;
                let mut prelu = PRelu::<T>::new(next_in);
                load_prelu(&mut prelu, &layer_json.weights)?;
                model.add_layer(prelu)?;
            }
            "batchnorm" => {
                let affine = array(&layer_json.weights)?.len() == 4;
                let mut bn = if affine {
                    BatchNorm1d::<T>::new(out_size)
                } else {
                    BatchNorm1d::<T>::non_affine(out_size)
                };
                load_batchnorm(&mut bn, &layer_json.weights, layer_json.epsilon)?;
                model.add_layer(bn)?;
                attach_activation(&mut model, layer_json, out_size)?;
            }
            "batchnorm2d" => {
                let filters = layer_json
                    .num_filters_in
                    .ok_or(ModelError::MissingField("num_filters_in"))?;
                let features = layer_json
                    .num_features_in
                    .ok_or(ModelError::MissingField("num_features_in"))?;
                let affine = array(&layer_json.weights)?.len() == 4;
                let mut bn = if affine {
                    BatchNorm2d::<T>::new(filters, features)
                } else {
                    BatchNorm2d::<T>::non_affine(filters, features)
                };
                load_batchnorm(&mut bn, &layer_json.weights, layer_json.epsilon)?;
                let bn_out = filters * features;
                model.add_layer(bn)?;
                attach_activation(&mut model, layer_json, bn_out)?;
            }
            "activation" => {
                let tag = layer_json
                    .activation
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .ok_or(ModelError::MissingField("activation"))?;
                let kind = ActivationKind::from_name(tag)?;
                model.add_layer(Activation::<T, M>::new(kind, next_in))?;
            }
            custom if allowed_custom.contains(&custom) => {
                debug!("skipping allow-listed custom layer: {custom}");
            }
            unknown => return Err(ModelError::UnknownLayerType(unknown.to_string())),
        }
    }

    if model.is_empty() {
        return Err(ModelError::EmptyModel);
    }

    info!(
        "loaded model: {} layers, {} -> {}",
        model.len(),
        model.in_size(),
        model.out_size()
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Layer;
    use crate::maths::StdMaths;

    const DENSE_DOC: &str = r#"{
        "in_shape": [null, null, 2],
        "layers": [
            {
                "type": "dense",
                "shape": [null, null, 2],
                "activation": "tanh",
                "weights": [
                    [[1.0, 0.0], [0.0, 1.0]],
                    [0.5, -0.5]
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_a_dense_model_with_inline_activation() {
        let mut model: Model<f64, StdMaths> = parse_json(DENSE_DOC).unwrap();
        assert_eq!(model.len(), 2);
        assert_eq!(model.layers()[0].name(), "dense");
        assert_eq!(model.layers()[1].name(), "tanh");

        let y = model.forward(&[1.0, 2.0]);
        assert!((y - 1.5f64.tanh()).abs() < 1.0e-12);
        assert!((model.outputs()[1] - 1.5f64.tanh()).abs() < 1.0e-12);
    }

    #[test]
    fn dense_kernel_is_transposed_from_the_document() {
        // Kernel [in][out] with in=1, out=2.
        let doc = r#"{
            "in_shape": [null, 1],
            "layers": [{
                "type": "dense",
                "shape": [null, 2],
                "weights": [[[3.0, 4.0]], [0.0, 0.0]]
            }]
        }"#;
        let mut model: Model<f64, StdMaths> = parse_json(doc).unwrap();
        model.forward(&[1.0]);
        assert_eq!(model.outputs(), &[3.0, 4.0]);
    }

    #[test]
    fn unknown_layer_types_are_reported() {
        let doc = r#"{
            "in_shape": [null, 1],
            "layers": [{"type": "warp-core", "shape": [null, 1], "weights": []}]
        }"#;
        let err = parse_json::<f64, StdMaths>(doc).unwrap_err();
        assert!(matches!(err, ModelError::UnknownLayerType(ref tag) if tag == "warp-core"));

        let model = parse_json_lenient::<f64, StdMaths>(doc, &["warp-core"]);
        assert!(matches!(model.unwrap_err(), ModelError::EmptyModel));
    }

    #[test]
    fn wrong_shaped_weights_are_rejected() {
        // Kernel claims 3 inputs but the model declares 2.
        let doc = r#"{
            "in_shape": [null, 2],
            "layers": [{
                "type": "dense",
                "shape": [null, 1],
                "weights": [[[1.0], [1.0], [1.0]], [0.0]]
            }]
        }"#;
        let err = parse_json::<f64, StdMaths>(doc).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn empty_documents_are_rejected() {
        let doc = r#"{"in_shape": [null, 1], "layers": []}"#;
        assert!(matches!(
            parse_json::<f64, StdMaths>(doc).unwrap_err(),
            ModelError::EmptyModel
        ));
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            parse_json::<f64, StdMaths>("{not json").unwrap_err(),
            ModelError::Json(_)
        ));
    }
}
