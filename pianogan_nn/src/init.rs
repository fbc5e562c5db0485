// Weight initialization.

use ndarray::Array2;
use pianogan_prng::Prng;

/// Glorot (Xavier) uniform: U(-limit, limit) with
/// `limit = sqrt(6 / (fan_in + fan_out))`.
pub fn glorot_uniform(rng: &mut Prng, fan_in: usize, fan_out: usize) -> Array2<f32> {
    glorot_uniform_shaped(rng, (fan_in, fan_out), fan_in, fan_out)
}

/// Glorot uniform for a matrix whose shape differs from its fans, e.g. an
/// LSTM kernel holding four gates side by side.
pub fn glorot_uniform_shaped(
    rng: &mut Prng,
    shape: (usize, usize),
    fan_in: usize,
    fan_out: usize,
) -> Array2<f32> {
    let limit = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
    Array2::from_shape_simple_fn(shape, || rng.range_f32(-limit, limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glorot_respects_limit() {
        let mut rng = Prng::new(1);
        let w = glorot_uniform(&mut rng, 30, 20);
        let limit = (6.0f32 / 50.0).sqrt();
        assert_eq!(w.dim(), (30, 20));
        assert!(w.iter().all(|v| v.abs() < limit));
        // Not degenerate.
        assert!(w.iter().any(|v| v.abs() > limit / 2.0));
    }
}
