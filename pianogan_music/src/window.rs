// Sequence windowing: the encoded corpus as fixed-length training examples.
//
// Window `i` is `indices[i..i + L]` and its target is `indices[i + L]`, for
// every `i` in `0..len - L`. Inputs are normalized to `[-1, 1)` by
// `(index - n/2) / (n/2)` for a vocabulary of `n` tokens; targets are kept
// as one-hot rows. Adversarial training only ever consumes the inputs.

use crate::error::PipelineError;
use ndarray::{Array2, Array3, Axis};
use pianogan_prng::Prng;

/// Map a vocabulary index into `[-1, 1)`.
pub fn normalize(index: usize, vocab_len: usize) -> f32 {
    let half = vocab_len as f32 / 2.0;
    (index as f32 - half) / half
}

/// Inverse of `normalize`, truncated toward zero. The result can fall
/// outside `0..vocab_len` for values outside `[-1, 1)`.
pub fn denormalize(value: f32, vocab_len: usize) -> i64 {
    let half = vocab_len as f32 / 2.0;
    (value * half + half).trunc() as i64
}

#[derive(Debug, Clone)]
pub struct TrainingSet {
    /// `(windows, sequence_length, 1)`, normalized.
    inputs: Array3<f32>,
    /// `(windows, vocab_len)`, one-hot.
    targets: Array2<f32>,
}

impl TrainingSet {
    pub fn build(
        indices: &[usize],
        vocab_len: usize,
        sequence_length: usize,
    ) -> Result<Self, PipelineError> {
        let needed = sequence_length + 1;
        if indices.len() < needed {
            return Err(PipelineError::NotEnoughTokens {
                found: indices.len(),
                needed,
            });
        }
        let windows = indices.len() - sequence_length;
        let inputs = Array3::from_shape_fn((windows, sequence_length, 1), |(i, t, _)| {
            normalize(indices[i + t], vocab_len)
        });
        let mut targets = Array2::zeros((windows, vocab_len));
        for (i, mut row) in targets.axis_iter_mut(Axis(0)).enumerate() {
            row[indices[i + sequence_length]] = 1.0;
        }
        Ok(Self { inputs, targets })
    }

    pub fn len(&self) -> usize {
        self.inputs.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sequence_length(&self) -> usize {
        self.inputs.len_of(Axis(1))
    }

    pub fn inputs(&self) -> &Array3<f32> {
        &self.inputs
    }

    pub fn targets(&self) -> &Array2<f32> {
        &self.targets
    }

    /// `batch_size` windows drawn uniformly with replacement.
    pub fn sample_batch(&self, batch_size: usize, rng: &mut Prng) -> Array3<f32> {
        let picks: Vec<usize> = (0..batch_size).map(|_| rng.range_usize(0, self.len())).collect();
        self.inputs.select(Axis(0), &picks)
    }
}
