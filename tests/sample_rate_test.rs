//! Integration tests for sample-rate-corrected recurrent layers: a
//! GRU-based model run at a multiple of its base rate, sampled back
//! down, must track the base-rate run — exactly for whole-number
//! ratios, within 5e-4 for fractional ones.

use rtnn::layers::{Dense, Gru, Layer, Lstm};

const BASE_RATE: f64 = 48_000.0;
const SECONDS: f64 = 0.05;

fn signal(sample_rate: f64) -> Vec<f64> {
    let samples = (SECONDS * sample_rate) as usize;
    (0..samples)
        .map(|n| (600.0 * n as f64 / sample_rate).sin())
        .collect()
}

fn val(seed: usize) -> f64 {
    ((seed as f64 * 0.449 + 0.23).sin()) * 0.15
}

fn matrix(rows: usize, cols: usize, salt: usize) -> Vec<Vec<f64>> {
    (0..rows)
        .map(|r| (0..cols).map(|c| val(salt + r * 19 + c)).collect())
        .collect()
}

struct GruModel {
    gru: Gru<f64>,
    dense: Dense<f64>,
}

impl GruModel {
    fn build() -> Self {
        let mut gru = Gru::new(1, 4);
        gru.set_w_vals(&matrix(1, 12, 1)).unwrap();
        gru.set_u_vals(&matrix(4, 12, 2)).unwrap();
        gru.set_b_vals(&matrix(2, 12, 3)).unwrap();

        let mut dense = Dense::new(4, 1);
        dense.set_weights(&matrix(1, 4, 4)).unwrap();
        dense.set_bias(&[0.1]).unwrap();

        Self { gru, dense }
    }

    fn reset(&mut self) {
        self.gru.reset();
        self.dense.reset();
    }

    fn process(&mut self, input: &[f64]) -> Vec<f64> {
        let mut mid = [0.0f64; 4];
        let mut out = [0.0f64];
        input
            .iter()
            .map(|&x| {
                self.gru.forward(&[x], &mut mid);
                self.dense.forward(&mid, &mut out);
                out[0]
            })
            .collect()
    }
}

/// Runs the base model and the rate-corrected model, then compares the
/// corrected run at the base model's sample positions.
fn max_error_at_ratio(ratio: f64) -> f64 {
    let mut base_model = GruModel::build();
    base_model.reset();
    let base = base_model.process(&signal(BASE_RATE));

    let mut test_model = GruModel::build();
    test_model.gru.prepare(ratio);
    test_model.reset();
    let test = test_model.process(&signal(BASE_RATE * ratio));

    // The corrected run lags by ceil(ratio) - 1 frames; sample both
    // signals on the lattice where their time axes coincide.
    let offset = ratio.ceil() as usize - 1;
    let mut max_err = 0.0f64;
    let mut i = 0usize;
    loop {
        let j = offset + (ratio * i as f64) as usize;
        if i >= base.len() || j >= test.len() {
            break;
        }
        max_err = max_err.max((base[i] - test[j]).abs());
        i += 4;
    }
    assert!(i > 16, "comparison lattice was empty");
    max_err
}

#[test]
fn whole_number_ratios_are_exact() {
    for ratio in [2.0, 3.0] {
        let err = max_error_at_ratio(ratio);
        assert_eq!(err, 0.0, "ratio {ratio} drifted by {err}");
    }
}

#[test]
fn fractional_ratios_stay_within_the_interpolation_bound() {
    for ratio in [1.5, 2.5] {
        let err = max_error_at_ratio(ratio);
        assert!(err <= 5.0e-4, "ratio {ratio} drifted by {err}");
    }
}

#[test]
fn lstm_correction_at_unit_ratio_is_transparent() {
    let w = matrix(1, 16, 31);
    let u = matrix(4, 16, 32);
    let b: Vec<f64> = (0..16).map(|i| val(800 + i)).collect();

    let mut plain = Lstm::<f64>::new(1, 4);
    plain.set_w_vals(&w).unwrap();
    plain.set_u_vals(&u).unwrap();
    plain.set_b_vals(&b).unwrap();
    plain.reset();

    let mut corrected = Lstm::<f64>::new(1, 4);
    corrected.set_w_vals(&w).unwrap();
    corrected.set_u_vals(&u).unwrap();
    corrected.set_b_vals(&b).unwrap();
    corrected.prepare(1.0);

    let mut a = [0.0f64; 4];
    let mut b_out = [0.0f64; 4];
    for n in 0..64 {
        let x = [(n as f64 * 0.07).sin()];
        plain.forward(&x, &mut a);
        corrected.forward(&x, &mut b_out);
        assert_eq!(a, b_out, "diverged at step {n}");
    }
}

#[test]
fn whole_ratio_lstm_tracks_the_base_rate_exactly() {
    let w = matrix(1, 16, 41);
    let u = matrix(4, 16, 42);
    let b: Vec<f64> = (0..16).map(|i| val(850 + i)).collect();

    let build = || {
        let mut lstm = Lstm::<f64>::new(1, 4);
        lstm.set_w_vals(&w).unwrap();
        lstm.set_u_vals(&u).unwrap();
        lstm.set_b_vals(&b).unwrap();
        lstm
    };

    let ratio = 2.0;
    let mut base = build();
    base.reset();
    let mut test = build();
    test.prepare(ratio);

    let base_signal = signal(BASE_RATE);
    let test_signal = signal(BASE_RATE * ratio);

    let mut base_out = Vec::new();
    let mut out = [0.0f64; 4];
    for &x in &base_signal {
        base.forward(&[x], &mut out);
        base_out.push(out[0]);
    }

    let mut test_out = Vec::new();
    for &x in &test_signal {
        test.forward(&[x], &mut out);
        test_out.push(out[0]);
    }

    for i in (0..base_out.len()).step_by(8) {
        let j = 2 * i + 1;
        if j >= test_out.len() {
            break;
        }
        assert_eq!(base_out[i], test_out[j], "drift at base frame {i}");
    }
}
