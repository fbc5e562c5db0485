// Finite-difference gradient checking shared by the layer tests.
//
// The scalar objective is `sum(output ⊙ R)` for a fixed random `R`, so the
// upstream gradient handed to `backward` is exactly `R`. Every input element
// and every parameter element is perturbed by ±H and the central difference
// is compared with the analytic gradient.

use crate::layer::{Layer, Mode};
use ndarray::ArrayD;
use pianogan_prng::Prng;

const H: f32 = 1e-2;
const ABS_TOL: f32 = 2e-3;
const REL_TOL: f32 = 2e-2;

fn objective(layer: &mut Layer, input: &ArrayD<f32>, mode: Mode, weights: &ArrayD<f32>) -> f32 {
    let out = layer.forward(input, mode).expect("forward");
    (&out * weights).sum()
}

fn assert_close(what: &str, index: usize, analytic: f32, numeric: f32) {
    let tol = ABS_TOL + REL_TOL * analytic.abs().max(numeric.abs());
    assert!(
        (analytic - numeric).abs() <= tol,
        "{what}[{index}]: analytic {analytic} vs numeric {numeric}"
    );
}

pub(crate) fn check_gradients(mut layer: Layer, input: ArrayD<f32>, mode: Mode, rng: &mut Prng) {
    let out = layer.forward(&input, mode).expect("forward");
    let weights = out.mapv(|_| rng.range_f32(-1.0, 1.0));
    let grad_input = layer.backward(&weights).expect("backward");
    let grad_params: Vec<ArrayD<f32>> = layer.params().iter().map(|p| p.grad.to_owned()).collect();

    let mut x = input.clone();
    for j in 0..x.len() {
        let original = x.as_slice().expect("contiguous")[j];
        x.as_slice_mut().expect("contiguous")[j] = original + H;
        let up = objective(&mut layer, &x, mode, &weights);
        x.as_slice_mut().expect("contiguous")[j] = original - H;
        let down = objective(&mut layer, &x, mode, &weights);
        x.as_slice_mut().expect("contiguous")[j] = original;
        let numeric = (up - down) / (2.0 * H);
        let analytic = grad_input.iter().nth(j).copied().expect("input grad");
        assert_close("input", j, analytic, numeric);
    }

    for (k, grads) in grad_params.iter().enumerate() {
        for (j, &analytic) in grads.iter().enumerate() {
            let original = nudge(&mut layer, k, j, None);
            nudge(&mut layer, k, j, Some(original + H));
            let up = objective(&mut layer, &input, mode, &weights);
            nudge(&mut layer, k, j, Some(original - H));
            let down = objective(&mut layer, &input, mode, &weights);
            nudge(&mut layer, k, j, Some(original));
            let numeric = (up - down) / (2.0 * H);
            assert_close(&format!("param{k}"), j, analytic, numeric);
        }
    }
}

/// Read (and optionally overwrite) element `j` of parameter `k`.
fn nudge(layer: &mut Layer, k: usize, j: usize, value: Option<f32>) -> f32 {
    let mut params = layer.params();
    let slot = params[k].value.iter_mut().nth(j).expect("param element");
    let old = *slot;
    if let Some(v) = value {
        *slot = v;
    }
    old
}
