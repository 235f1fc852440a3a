//! Load a model document into the runtime pipeline and stream audio
//! frames through it.
//!
//! Run with `RUST_LOG=debug cargo run --example dynamic_model` to watch
//! the loader walk the document.

use rtnn::model::loader;
use rtnn::prelude::*;

const MODEL_DOC: &str = r#"{
    "in_shape": [null, null, 1],
    "layers": [
        {
            "type": "dense",
            "shape": [null, null, 4],
            "activation": "tanh",
            "weights": [[[0.8, -0.6, 0.4, -0.2]], [0.0, 0.1, -0.1, 0.0]]
        },
        {
            "type": "gru",
            "shape": [null, null, 4],
            "weights": [
                [[0.1, 0.0, 0.1, 0.0, 0.2, 0.0, 0.2, 0.0, 0.3, 0.0, 0.3, 0.0],
                 [0.0, 0.1, 0.0, 0.1, 0.0, 0.2, 0.0, 0.2, 0.0, 0.3, 0.0, 0.3],
                 [0.1, 0.1, 0.0, 0.0, 0.2, 0.2, 0.0, 0.0, 0.3, 0.3, 0.0, 0.0],
                 [0.0, 0.0, 0.1, 0.1, 0.0, 0.0, 0.2, 0.2, 0.0, 0.0, 0.3, 0.3]],
                [[0.05, 0.0, 0.0, 0.0, 0.05, 0.0, 0.0, 0.0, 0.05, 0.0, 0.0, 0.0],
                 [0.0, 0.05, 0.0, 0.0, 0.0, 0.05, 0.0, 0.0, 0.0, 0.05, 0.0, 0.0],
                 [0.0, 0.0, 0.05, 0.0, 0.0, 0.0, 0.05, 0.0, 0.0, 0.0, 0.05, 0.0],
                 [0.0, 0.0, 0.0, 0.05, 0.0, 0.0, 0.0, 0.05, 0.0, 0.0, 0.0, 0.05]],
                [[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                 [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]]
            ]
        },
        {
            "type": "dense",
            "shape": [null, null, 1],
            "weights": [[[0.5], [-0.5], [0.25], [-0.25]], [0.0]]
        }
    ]
}"#;

fn main() {
    env_logger::init();

    let mut model: Model<f64> = loader::parse_json(MODEL_DOC).expect("document is well-formed");
    model.reset();

    let sample_rate = 48_000.0;
    let mut peak = 0.0f64;
    for n in 0..480 {
        let x = (2.0 * std::f64::consts::PI * 440.0 * n as f64 / sample_rate).sin();
        let y = model.forward(&[x]);
        peak = peak.max(y.abs());
    }

    println!(
        "processed 480 frames through {} layers; peak output {peak:.6}",
        model.len()
    );
}
