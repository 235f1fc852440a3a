//! Integration tests for the activation layers and the fast maths
//! provider contract.

use rtnn::layers::{
    Activation, ActivationKind, CeluT, EluT, Layer, MishT, PRelu, SeluT, SoftplusT, StaticLayer,
    SwishT,
};
use rtnn::maths::{FastMaths, MathsProvider};

fn run(kind: ActivationKind, input: &[f64]) -> Vec<f64> {
    let mut layer = Activation::<f64>::new(kind, input.len());
    let mut out = vec![0.0; input.len()];
    layer.forward(input, &mut out);
    out
}

#[test]
fn every_kind_matches_its_reference_formula() {
    let xs: Vec<f64> = (-20..=20).map(|i| i as f64 / 5.0).collect();

    let checks: Vec<(ActivationKind, Box<dyn Fn(f64) -> f64>)> = vec![
        (ActivationKind::Tanh, Box::new(|x: f64| x.tanh())),
        (ActivationKind::ReLu, Box::new(|x: f64| x.max(0.0))),
        (
            ActivationKind::Sigmoid,
            Box::new(|x: f64| 1.0 / (1.0 + (-x).exp())),
        ),
        (
            ActivationKind::Elu,
            Box::new(|x: f64| if x > 0.0 { x } else { x.exp() - 1.0 }),
        ),
        (
            ActivationKind::Gelu,
            Box::new(|x: f64| {
                0.5 * x
                    * (1.0
                        + ((2.0 / core::f64::consts::PI).sqrt() * (x + 0.044_715 * x.powi(3)))
                            .tanh())
            }),
        ),
        (
            ActivationKind::Swish,
            Box::new(|x: f64| x / (1.0 + (-x).exp())),
        ),
        (
            ActivationKind::Softplus,
            Box::new(|x: f64| (1.0 + x.exp()).ln()),
        ),
        (
            ActivationKind::Mish,
            Box::new(|x: f64| x * (1.0 + x.exp()).ln().tanh()),
        ),
        (
            ActivationKind::Selu,
            Box::new(|x: f64| {
                let lambda = 1.050_700_987_355_480_5;
                let alpha = 1.673_263_242_354_377_2;
                if x > 0.0 {
                    lambda * x
                } else {
                    lambda * alpha * (x.exp() - 1.0)
                }
            }),
        ),
        (
            ActivationKind::Celu,
            Box::new(|x: f64| x.max(0.0) + (x.exp() - 1.0).min(0.0)),
        ),
    ];

    for (kind, reference) in checks {
        let out = run(kind, &xs);
        for (&x, y) in xs.iter().zip(out) {
            let want = reference(x);
            assert!(
                (y - want).abs() < 1.0e-12,
                "{:?} mismatch at x = {x}: {y} vs {want}",
                kind
            );
        }
    }
}

#[test]
fn softmax_is_a_distribution() {
    let out = run(ActivationKind::Softmax, &[1.0, 2.0, 3.0, 4.0]);
    let sum: f64 = out.iter().sum();
    assert!((sum - 1.0).abs() < 1.0e-12);
    assert!(out.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn activation_tags_round_trip() {
    for kind in [
        ActivationKind::Tanh,
        ActivationKind::ReLu,
        ActivationKind::Sigmoid,
        ActivationKind::Softmax,
        ActivationKind::Elu,
        ActivationKind::Gelu,
        ActivationKind::Swish,
        ActivationKind::Softplus,
        ActivationKind::Mish,
        ActivationKind::Selu,
        ActivationKind::Celu,
    ] {
        assert_eq!(ActivationKind::from_name(kind.name()).unwrap(), kind);
    }
    assert!(ActivationKind::from_name("sinh").is_err());
}

#[test]
fn fast_tanh_layer_honors_the_approximation_bound() {
    let xs: Vec<f64> = (-5700..=5700).map(|i| i as f64 / 1000.0).collect();
    let mut layer = Activation::<f64, FastMaths>::new(ActivationKind::Tanh, xs.len());
    let mut out = vec![0.0; xs.len()];
    layer.forward(&xs, &mut out);

    for (&x, y) in xs.iter().zip(out) {
        assert!(
            (y - x.tanh()).abs() <= 5.1e-5,
            "fast tanh out of budget at x = {x}"
        );
    }
}

#[test]
fn fast_sigmoid_layer_honors_the_approximation_bound() {
    let xs: Vec<f64> = (-7000..=7000).map(|i| i as f64 / 1000.0).collect();
    let mut layer = Activation::<f64, FastMaths>::new(ActivationKind::Sigmoid, xs.len());
    let mut out = vec![0.0; xs.len()];
    layer.forward(&xs, &mut out);

    for (&x, y) in xs.iter().zip(out) {
        let exact = 1.0 / (1.0 + (-x).exp());
        assert!(
            (y - exact).abs() <= 5.1e-5,
            "fast sigmoid out of budget at x = {x}"
        );
    }
}

#[test]
fn fast_provider_is_finite_for_extreme_inputs() {
    for x in [-1.0e9f64, -1.0e3, 1.0e3, 1.0e9] {
        assert!(<FastMaths as MathsProvider<f64>>::tanh(x).is_finite());
        assert!(<FastMaths as MathsProvider<f64>>::sigmoid(x).is_finite());
    }
}

#[test]
fn prelu_applies_per_channel_slopes() {
    let mut layer = PRelu::<f64>::new(4);
    layer.set_alpha_vals(&[0.1, 0.2, 0.3, 0.4]).unwrap();

    let mut out = [0.0f64; 4];
    layer.forward(&[-1.0, -1.0, 2.0, -2.0], &mut out);
    assert_eq!(out, [-0.1, -0.2, 2.0, -0.8]);

    assert!(layer.set_alpha_vals(&[0.0; 3]).is_err());
}

#[test]
fn static_alpha_layers_accept_custom_alpha() {
    let input = [-2.0, -1.0, 0.0, 1.0];

    let mut elu = EluT::<f64, 4>::new().with_alpha(0.5);
    elu.forward(&input);
    assert!((elu.output()[0] - 0.5 * ((-2.0f64).exp() - 1.0)).abs() < 1.0e-14);
    assert_eq!(elu.output()[3], 1.0);

    let mut celu = CeluT::<f64, 4>::new().with_alpha(2.0);
    celu.forward(&input);
    let want = 2.0 * ((-2.0f64 / 2.0).exp() - 1.0);
    assert!((celu.output()[0] - want).abs() < 1.0e-14);

    // Smooth activations stay close to their dynamic counterparts.
    let mut swish = SwishT::<f64, 4>::new();
    let mut softplus = SoftplusT::<f64, 4>::new();
    let mut mish = MishT::<f64, 4>::new();
    let mut selu = SeluT::<f64, 4>::new();
    swish.forward(&input);
    softplus.forward(&input);
    mish.forward(&input);
    selu.forward(&input);
    for (layer_out, kind) in [
        (swish.output(), ActivationKind::Swish),
        (softplus.output(), ActivationKind::Softplus),
        (mish.output(), ActivationKind::Mish),
        (selu.output(), ActivationKind::Selu),
    ] {
        let dynamic = run(kind, &input);
        for (a, b) in layer_out.iter().zip(dynamic) {
            assert!((a - b).abs() < 1.0e-14);
        }
    }
}
