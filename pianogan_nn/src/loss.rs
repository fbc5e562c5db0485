// Binary cross-entropy on probabilities, for a sigmoid-terminated network.
//
// Probabilities are clipped to [EPSILON, 1 - EPSILON] before the log, and
// the clip is part of the function: a prediction outside the bounds gets a
// zero gradient. Inside, after the sigmoid's backward pass (which multiplies
// by p(1 - p)) the gradient reduces to (p - y) / n.

use ndarray::ArrayD;

pub const EPSILON: f32 = 1e-7;

/// Mean loss over the batch and its gradient with respect to the
/// predictions.
#[derive(Debug, Clone)]
pub struct BceLoss {
    pub value: f32,
    pub grad: ArrayD<f32>,
}

/// Binary cross-entropy against a single label shared by the whole batch
/// (1.0 for "real", 0.0 for "fake").
pub fn binary_cross_entropy(predictions: &ArrayD<f32>, label: f32) -> BceLoss {
    let n = predictions.len().max(1) as f32;
    let mut total = 0.0f64;
    let grad = predictions.mapv(|raw| {
        let p = raw.clamp(EPSILON, 1.0 - EPSILON);
        total -= f64::from(label * p.ln() + (1.0 - label) * (1.0 - p).ln());
        if p == raw {
            (p - label) / (p * (1.0 - p)) / n
        } else {
            0.0
        }
    });
    BceLoss {
        value: (total / f64::from(n)) as f32,
        grad,
    }
}

/// Fraction of predictions on the same side of 0.5 as `label`.
pub fn binary_accuracy(predictions: &ArrayD<f32>, label: f32) -> f32 {
    if predictions.is_empty() {
        return 0.0;
    }
    let want = label > 0.5;
    let hits = predictions.iter().filter(|&&p| (p > 0.5) == want).count();
    hits as f32 / predictions.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn loss_of_half_is_ln_two() {
        let p = array![[0.5], [0.5]].into_dyn();
        let real = binary_cross_entropy(&p, 1.0);
        let fake = binary_cross_entropy(&p, 0.0);
        assert!((real.value - std::f32::consts::LN_2).abs() < 1e-6);
        assert!((fake.value - std::f32::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn confident_correct_prediction_has_small_loss() {
        let p = array![[0.999]].into_dyn();
        assert!(binary_cross_entropy(&p, 1.0).value < 0.01);
        assert!(binary_cross_entropy(&p, 0.0).value > 5.0);
    }

    #[test]
    fn saturated_predictions_stay_finite() {
        let p = array![[0.0], [1.0]].into_dyn();
        let loss = binary_cross_entropy(&p, 1.0);
        assert!(loss.value.is_finite());
        assert!(loss.grad.iter().all(|g| g.is_finite()));
    }

    #[test]
    fn clipped_predictions_have_zero_gradient() {
        let p = array![[0.0], [1.0], [0.5]].into_dyn();
        let loss = binary_cross_entropy(&p, 1.0);
        assert_eq!(loss.grad[[0, 0]], 0.0);
        assert_eq!(loss.grad[[1, 0]], 0.0);
        // (0.5 - 1) / (0.5 * 0.5) / 3
        assert!((loss.grad[[2, 0]] + 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let p = array![[0.3], [0.8]].into_dyn();
        let loss = binary_cross_entropy(&p, 1.0);
        let h = 1e-3;
        let mut bumped = p.clone();
        bumped[[0, 0]] += h;
        let up = binary_cross_entropy(&bumped, 1.0).value;
        bumped[[0, 0]] -= 2.0 * h;
        let down = binary_cross_entropy(&bumped, 1.0).value;
        let numeric = (up - down) / (2.0 * h);
        assert!((numeric - loss.grad[[0, 0]]).abs() < 1e-2);
    }

    #[test]
    fn accuracy_counts_correct_side() {
        let p = array![[0.9], [0.2], [0.6], [0.4]].into_dyn();
        assert_eq!(binary_accuracy(&p, 1.0), 0.5);
        assert_eq!(binary_accuracy(&p, 0.0), 0.5);
        let p = array![[0.9], [0.7]].into_dyn();
        assert_eq!(binary_accuracy(&p, 1.0), 1.0);
    }
}
