//! Minimal end-to-end example: build a tiny model by hand, push a
//! sine wave through it, and print the output.
//!
//! Run with `cargo run --example hello_rtnn`.

use rtnn::prelude::*;

fn main() {
    env_logger::init();

    let mut model = Model::<f32>::new(1);

    let mut dense_in = Dense::new(1, 8);
    dense_in
        .set_weights(&(0..8).map(|i| vec![0.1 * (i as f32 + 1.0)]).collect::<Vec<_>>())
        .expect("weights match the declared sizes");
    dense_in.set_bias(&[0.0; 8]).expect("bias matches");
    model.add_layer(dense_in).expect("chain is consistent");

    model
        .add_layer(Activation::new(ActivationKind::Tanh, 8))
        .expect("chain is consistent");

    let mut dense_out = Dense::new(8, 1);
    dense_out
        .set_weights(&[vec![0.125; 8]])
        .expect("weights match the declared sizes");
    dense_out.set_bias(&[0.0]).expect("bias matches");
    model.add_layer(dense_out).expect("chain is consistent");

    model.reset();

    println!("n, input, output");
    for n in 0..16 {
        let x = (n as f32 * 0.25).sin();
        let y = model.forward(&[x]);
        println!("{n:2}, {x:+.4}, {y:+.4}");
    }
}
