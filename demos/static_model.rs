//! The same tiny network as `hello_rtnn`, but on the compile-time
//! pipeline: sizes are const generics, the chain is monomorphized, and
//! the forward pass never touches the heap.
//!
//! Run with `cargo run --example static_model`.

use rtnn::prelude::*;

fn main() {
    env_logger::init();

    let mut dense_in = DenseT::<f32, 1, 8>::new();
    dense_in
        .set_weights(&(0..8).map(|i| vec![0.1 * (i as f32 + 1.0)]).collect::<Vec<_>>())
        .expect("weights match the declared sizes");

    let mut dense_out = DenseT::<f32, 8, 1>::new();
    dense_out
        .set_weights(&[vec![0.125; 8]])
        .expect("weights match the declared sizes");

    let mut model =
        ModelT::<f32, 1, 1, _>::new((dense_in, TanhT::<f32, 8>::new(), dense_out));
    model.reset();

    println!("n, input, output");
    for n in 0..16 {
        let x = (n as f32 * 0.25).sin();
        let y = model.forward(&[x]);
        println!("{n:2}, {x:+.4}, {y:+.4}");
    }
}
