// Benchmark: one forward + backward pass through the discriminator's
// recurrent front end at a reduced width.
//
// Run with: cargo bench -p pianogan_nn

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ndarray::Array3;
use pianogan_nn::Mode;
use pianogan_nn::layer::Layer;
use pianogan_nn::lstm::{Bidirectional, Lstm};
use pianogan_nn::model::Sequential;
use pianogan_prng::Prng;

fn bench_recurrent_stack(c: &mut Criterion) {
    let mut rng = Prng::new(42);
    let steps = 100;
    let units = 64;
    let mut model = Sequential::new("bench", vec![steps, 1])
        .with(Layer::Lstm(Lstm::new(1, units, true, &mut rng)))
        .with(Layer::Bidirectional(Bidirectional::new(units, units, false, &mut rng)));
    let input = Array3::from_shape_fn((16, steps, 1), |_| rng.range_f32(-1.0, 1.0)).into_dyn();
    let grad = ndarray::Array2::<f32>::ones((16, 2 * units)).into_dyn();

    c.bench_function("lstm_bilstm_forward_backward_16x100", |b| {
        b.iter(|| {
            let out = model.forward(black_box(&input), Mode::Train).unwrap();
            let dx = model.backward(&grad).unwrap();
            black_box((out, dx))
        })
    });
}

criterion_group!(benches, bench_recurrent_stack);
criterion_main!(benches);
