//! Integration tests for model composition: chain validation, the
//! end-to-end smoke scenario, and dynamic/static pipeline equivalence
//! over a full topology.

use rtnn::layers::{
    Activation, ActivationKind, BatchNorm1d, BatchNorm1dT, Conv1d, Conv1dT, Dense, DenseT, Gru,
    GruT, Lstm, LstmT, StaticLayer, TanhT,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rtnn::model::{Model, ModelT};
use rtnn::ModelError;

fn val(seed: usize) -> f64 {
    ((seed as f64 * 0.613 + 0.37).sin()) * 0.4
}

fn matrix(rows: usize, cols: usize, salt: usize) -> Vec<Vec<f64>> {
    (0..rows)
        .map(|r| (0..cols).map(|c| val(salt + r * 37 + c)).collect())
        .collect()
}

#[test]
fn chain_mismatches_fail_at_construction_not_forward() {
    let mut model = Model::<f64>::new(2);
    model.add_layer(Dense::new(2, 6)).unwrap();
    model
        .add_layer(Activation::new(ActivationKind::ReLu, 6))
        .unwrap();

    let err = model
        .add_layer(Activation::new(ActivationKind::Tanh, 4))
        .unwrap_err();
    assert!(matches!(err, ModelError::ChainMismatch { expected: 6, found: 4, .. }));

    // The failed append leaves the model usable.
    assert_eq!(model.len(), 2);
    model.forward(&[0.5, -0.5]);
}

#[test]
fn dense_tanh_dense_smoke_scenario() {
    // Dense(1->8) with unit weights, tanh, Dense(8->1) with unit
    // weights: feeding 5.0 must produce 8 * tanh(5.0).
    let mut expand = Dense::<f64>::new(1, 8);
    expand.set_weights(&vec![vec![1.0]; 8]).unwrap();
    expand.set_bias(&[0.0; 8]).unwrap();

    let mut collapse = Dense::<f64>::new(8, 1);
    collapse.set_weights(&[vec![1.0; 8]]).unwrap();
    collapse.set_bias(&[0.0]).unwrap();

    let mut model = Model::<f64>::new(1);
    model.add_layer(expand).unwrap();
    model
        .add_layer(Activation::new(ActivationKind::Tanh, 8))
        .unwrap();
    model.add_layer(collapse).unwrap();
    model.reset();

    let y = model.forward(&[5.0]);
    assert!((y - 8.0 * 5.0f64.tanh()).abs() < 1.0e-12);
}

#[test]
fn model_reset_gives_identical_output_sequences() {
    let mut model = Model::<f64>::new(1);

    let mut dense = Dense::new(1, 4);
    dense.set_weights(&matrix(4, 1, 5)).unwrap();
    dense.set_bias(&[0.1, 0.2, -0.1, -0.2]).unwrap();
    model.add_layer(dense).unwrap();

    let mut gru = Gru::new(4, 4);
    gru.set_w_vals(&matrix(4, 12, 6)).unwrap();
    gru.set_u_vals(&matrix(4, 12, 7)).unwrap();
    gru.set_b_vals(&matrix(2, 12, 8)).unwrap();
    model.add_layer(gru).unwrap();

    let mut conv = Conv1d::new(4, 2, 3, 1);
    conv.set_weights(
        &(0..2)
            .map(|i| (0..4).map(|c| (0..3).map(|k| val(i * 50 + c * 5 + k)).collect()).collect())
            .collect::<Vec<_>>(),
    )
    .unwrap();
    conv.set_bias(&[0.0, 0.0]).unwrap();
    model.add_layer(conv).unwrap();

    let inputs: Vec<f64> = (0..50).map(|n| (n as f64 * 0.11).sin()).collect();

    let mut collect = |model: &mut Model<f64>| -> Vec<f64> {
        model.reset();
        inputs.iter().map(|&x| model.forward(&[x])).collect()
    };

    let first = collect(&mut model);
    let second = collect(&mut model);
    assert_eq!(first, second);
}

// One topology, both pipelines: Dense -> Tanh -> Conv1d -> BatchNorm ->
// GRU -> LSTM -> Dense, identical weights, identical inputs.
#[test]
fn dynamic_and_static_pipelines_agree() {
    let dense_in_w = matrix(4, 1, 11);
    let dense_in_b: Vec<f64> = (0..4).map(|i| val(100 + i)).collect();
    let conv_w: Vec<Vec<Vec<f64>>> = (0..4)
        .map(|i| {
            (0..4)
                .map(|c| (0..3).map(|k| val(i * 61 + c * 9 + k)).collect())
                .collect()
        })
        .collect();
    let conv_b: Vec<f64> = (0..4).map(|i| val(200 + i)).collect();
    let bn_gamma: Vec<f64> = (0..4).map(|i| 1.0 + 0.1 * val(300 + i)).collect();
    let bn_beta: Vec<f64> = (0..4).map(|i| val(310 + i)).collect();
    let bn_mean: Vec<f64> = (0..4).map(|i| val(320 + i)).collect();
    let bn_var: Vec<f64> = (0..4).map(|i| 1.0 + 0.2 * val(330 + i).abs()).collect();
    let gru_w = matrix(4, 12, 12);
    let gru_u = matrix(4, 12, 13);
    let gru_b = matrix(2, 12, 14);
    let lstm_w = matrix(4, 16, 15);
    let lstm_u = matrix(4, 16, 16);
    let lstm_b: Vec<f64> = (0..16).map(|i| val(400 + i)).collect();
    let dense_out_w = matrix(1, 4, 17);
    let dense_out_b = vec![val(500)];

    // Dynamic pipeline.
    let mut model = Model::<f64>::new(1);
    {
        let mut dense = Dense::new(1, 4);
        dense.set_weights(&dense_in_w).unwrap();
        dense.set_bias(&dense_in_b).unwrap();
        model.add_layer(dense).unwrap();

        model
            .add_layer(Activation::new(ActivationKind::Tanh, 4))
            .unwrap();

        let mut conv = Conv1d::new(4, 4, 3, 2);
        conv.set_weights(&conv_w).unwrap();
        conv.set_bias(&conv_b).unwrap();
        model.add_layer(conv).unwrap();

        let mut bn = BatchNorm1d::new(4);
        bn.set_gamma(&bn_gamma).unwrap();
        bn.set_beta(&bn_beta).unwrap();
        bn.set_running_mean(&bn_mean).unwrap();
        bn.set_running_variance(&bn_var).unwrap();
        bn.set_epsilon(1.0e-5);
        model.add_layer(bn).unwrap();

        let mut gru = Gru::new(4, 4);
        gru.set_w_vals(&gru_w).unwrap();
        gru.set_u_vals(&gru_u).unwrap();
        gru.set_b_vals(&gru_b).unwrap();
        model.add_layer(gru).unwrap();

        let mut lstm = Lstm::new(4, 4);
        lstm.set_w_vals(&lstm_w).unwrap();
        lstm.set_u_vals(&lstm_u).unwrap();
        lstm.set_b_vals(&lstm_b).unwrap();
        model.add_layer(lstm).unwrap();

        let mut dense = Dense::new(4, 1);
        dense.set_weights(&dense_out_w).unwrap();
        dense.set_bias(&dense_out_b).unwrap();
        model.add_layer(dense).unwrap();
    }
    model.reset();

    // Static pipeline with the same weights.
    let mut dense_in = DenseT::<f64, 1, 4>::new();
    dense_in.set_weights(&dense_in_w).unwrap();
    dense_in.set_bias(&dense_in_b).unwrap();
    let mut conv = Conv1dT::<f64, 4, 4, 3, 2, 5>::new();
    conv.set_weights(&conv_w).unwrap();
    conv.set_bias(&conv_b).unwrap();
    let mut bn = BatchNorm1dT::<f64, 4>::new();
    bn.set_gamma(&bn_gamma).unwrap();
    bn.set_beta(&bn_beta).unwrap();
    bn.set_running_mean(&bn_mean).unwrap();
    bn.set_running_variance(&bn_var).unwrap();
    bn.set_epsilon(1.0e-5);
    let mut gru = GruT::<f64, 4, 4>::new();
    gru.set_w_vals(&gru_w).unwrap();
    gru.set_u_vals(&gru_u).unwrap();
    gru.set_b_vals(&gru_b).unwrap();
    let mut lstm = LstmT::<f64, 4, 4>::new();
    lstm.set_w_vals(&lstm_w).unwrap();
    lstm.set_u_vals(&lstm_u).unwrap();
    lstm.set_b_vals(&lstm_b).unwrap();
    let mut dense_out = DenseT::<f64, 4, 1>::new();
    dense_out.set_weights(&dense_out_w).unwrap();
    dense_out.set_bias(&dense_out_b).unwrap();

    let mut model_t = ModelT::<f64, 1, 1, _>::new((
        dense_in,
        TanhT::<f64, 4>::new(),
        conv,
        bn,
        gru,
        lstm,
        dense_out,
    ));
    model_t.reset();

    let mut rng = StdRng::seed_from_u64(0x7477);
    for n in 0..256 {
        let x: f64 = rng.gen_range(-1.0..1.0);
        let a = model.forward(&[x]);
        let b = model_t.forward(&[x]);
        assert!(
            (a - b).abs() < 1.0e-12,
            "pipelines diverged at frame {n}: {a} vs {b}"
        );
    }
}

// A user-defined layer satisfying the structural contract plugs into
// the compile-time pipeline without touching the engine.
#[test]
fn custom_static_layers_integrate_into_the_chain() {
    struct Gain<const N: usize> {
        gain: f64,
        outs: [f64; N],
    }

    impl<const N: usize> StaticLayer<f64> for Gain<N> {
        const IN_SIZE: usize = N;
        const OUT_SIZE: usize = N;

        fn name(&self) -> &'static str {
            "gain"
        }

        fn reset(&mut self) {}

        fn forward(&mut self, input: &[f64]) {
            for (y, &x) in self.outs.iter_mut().zip(input) {
                *y = self.gain * x;
            }
        }

        fn output(&self) -> &[f64] {
            &self.outs
        }
    }

    let mut dense = DenseT::<f64, 2, 2>::new();
    dense
        .set_weights(&[vec![1.0, 0.0], vec![0.0, 1.0]])
        .unwrap();
    dense.set_bias(&[0.0, 0.0]).unwrap();

    let gain = Gain::<2> {
        gain: 3.0,
        outs: [0.0; 2],
    };

    let mut model = ModelT::<f64, 2, 2, _>::new((dense, gain));
    model.forward(&[1.0, -2.0]);
    assert_eq!(model.outputs(), &[3.0, -6.0]);
}
