// Long short-term memory layers over (batch, steps, features) input.
//
// `Lstm` is a single left-to-right recurrent layer. Gates are packed side by
// side in one kernel in the order input, forget, candidate, output:
//   z_t = x_t · W + h_{t-1} · U + b
//   i = σ(z_i)  f = σ(z_f)  g = tanh(z_g)  o = σ(z_o)
//   c_t = f ⊙ c_{t-1} + i ⊙ g
//   h_t = o ⊙ tanh(c_t)
// with h_0 = c_0 = 0. The forget-gate bias starts at 1.
//
// `backward` runs full backpropagation through time over the cached steps.
//
// `Bidirectional` runs one `Lstm` over the sequence and a second over the
// time-reversed sequence, concatenating their outputs on the feature axis
// (forward features first). Without `return_sequences` each direction
// contributes its final hidden state; the reverse direction's final state
// is the one after it has consumed the first input step.

use crate::activation::sigmoid;
use crate::error::NnError;
use crate::init::glorot_uniform_shaped;
use crate::layer::{Param, as_2d, as_3d, check_features};
use ndarray::{
    Array1, Array2, Array3, ArrayD, ArrayView2, ArrayView3, Axis, concatenate, s,
};
use pianogan_prng::Prng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lstm {
    units: usize,
    return_sequences: bool,
    /// (input_dim, 4 * units)
    kernel: Array2<f32>,
    /// (units, 4 * units)
    recurrent: Array2<f32>,
    /// (4 * units)
    bias: Array1<f32>,
    #[serde(skip)]
    kernel_grad: Array2<f32>,
    #[serde(skip)]
    recurrent_grad: Array2<f32>,
    #[serde(skip)]
    bias_grad: Array1<f32>,
    #[serde(skip)]
    cache: Option<LstmCache>,
}

#[derive(Debug, Clone)]
struct LstmCache {
    inputs: Array3<f32>,
    /// Activated gates per step, (batch, 4 * units).
    gates: Vec<Array2<f32>>,
    cells: Vec<Array2<f32>>,
    tanh_cells: Vec<Array2<f32>>,
    hidden: Vec<Array2<f32>>,
}

impl Lstm {
    pub fn new(input_dim: usize, units: usize, return_sequences: bool, rng: &mut Prng) -> Self {
        let gates = 4 * units;
        let kernel = glorot_uniform_shaped(rng, (input_dim, gates), input_dim, gates);
        let recurrent = glorot_uniform_shaped(rng, (units, gates), units, gates);
        let mut bias = Array1::zeros(gates);
        bias.slice_mut(s![units..2 * units]).fill(1.0);
        Self {
            units,
            return_sequences,
            kernel_grad: Array2::zeros(kernel.dim()),
            recurrent_grad: Array2::zeros(recurrent.dim()),
            bias_grad: Array1::zeros(gates),
            kernel,
            recurrent,
            bias,
            cache: None,
        }
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn input_dim(&self) -> usize {
        self.kernel.nrows()
    }

    pub fn num_parameters(&self) -> usize {
        self.kernel.len() + self.recurrent.len() + self.bias.len()
    }

    pub(crate) fn output_shape(&self, input: &[usize]) -> Vec<usize> {
        if self.return_sequences {
            vec![input.first().copied().unwrap_or(0), self.units]
        } else {
            vec![self.units]
        }
    }

    pub(crate) fn forward(&mut self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let x = as_3d(input, "lstm")?;
        let hidden = self.forward_sequence(x)?;
        if self.return_sequences {
            Ok(hidden.into_dyn())
        } else {
            Ok(last_step(&hidden).into_dyn())
        }
    }

    pub(crate) fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let grad_hidden = if self.return_sequences {
            as_3d(grad_output, "lstm")?.to_owned()
        } else {
            let steps = self
                .cache
                .as_ref()
                .ok_or(NnError::NoForwardCache("lstm"))?
                .gates
                .len();
            spread_to_last_step(as_2d(grad_output, "lstm")?, steps)
        };
        Ok(self.backward_sequence(&grad_hidden)?.into_dyn())
    }

    /// Run the recurrence over every step; returns all hidden states,
    /// (batch, steps, units).
    pub(crate) fn forward_sequence(&mut self, x: ArrayView3<f32>) -> Result<Array3<f32>, NnError> {
        check_features("lstm", self.input_dim(), x.shape())?;
        let (batch, steps, _) = x.dim();
        let u = self.units;

        let mut h = Array2::<f32>::zeros((batch, u));
        let mut c = Array2::<f32>::zeros((batch, u));
        let mut out = Array3::<f32>::zeros((batch, steps, u));
        let mut cache = LstmCache {
            inputs: x.to_owned(),
            gates: Vec::with_capacity(steps),
            cells: Vec::with_capacity(steps),
            tanh_cells: Vec::with_capacity(steps),
            hidden: Vec::with_capacity(steps),
        };

        for t in 0..steps {
            let x_t = x.index_axis(Axis(1), t);
            let mut z = x_t.dot(&self.kernel) + h.dot(&self.recurrent) + &self.bias;
            z.slice_mut(s![.., 0..2 * u]).mapv_inplace(sigmoid);
            z.slice_mut(s![.., 2 * u..3 * u]).mapv_inplace(f32::tanh);
            z.slice_mut(s![.., 3 * u..]).mapv_inplace(sigmoid);

            let i = z.slice(s![.., 0..u]);
            let f = z.slice(s![.., u..2 * u]);
            let g = z.slice(s![.., 2 * u..3 * u]);
            let o = z.slice(s![.., 3 * u..]);

            c = &f * &c + &i * &g;
            let tanh_c = c.mapv(f32::tanh);
            h = &o * &tanh_c;

            out.index_axis_mut(Axis(1), t).assign(&h);
            cache.gates.push(z.clone());
            cache.cells.push(c.clone());
            cache.tanh_cells.push(tanh_c);
            cache.hidden.push(h.clone());
        }

        self.cache = Some(cache);
        Ok(out)
    }

    /// Backpropagation through time. `grad_hidden` is dLoss/dh_t for every
    /// step, (batch, steps, units). Returns dLoss/dx, (batch, steps, input).
    pub(crate) fn backward_sequence(
        &mut self,
        grad_hidden: &Array3<f32>,
    ) -> Result<Array3<f32>, NnError> {
        let cache = self.cache.as_ref().ok_or(NnError::NoForwardCache("lstm"))?;
        let (batch, steps, input_dim) = cache.inputs.dim();
        if grad_hidden.dim() != (batch, steps, self.units) {
            return Err(NnError::Shape {
                layer: "lstm",
                expected: format!("gradient of shape [{batch}, {steps}, {}]", self.units),
                found: grad_hidden.shape().to_vec(),
            });
        }
        let u = self.units;

        let mut kernel_grad = Array2::<f32>::zeros(self.kernel.dim());
        let mut recurrent_grad = Array2::<f32>::zeros(self.recurrent.dim());
        let mut bias_grad = Array1::<f32>::zeros(self.bias.len());
        let mut dx = Array3::<f32>::zeros((batch, steps, input_dim));

        let zeros = Array2::<f32>::zeros((batch, u));
        let mut dh_next = zeros.clone();
        let mut dc_next = zeros.clone();

        for t in (0..steps).rev() {
            let gates = &cache.gates[t];
            let i = gates.slice(s![.., 0..u]);
            let f = gates.slice(s![.., u..2 * u]);
            let g = gates.slice(s![.., 2 * u..3 * u]);
            let o = gates.slice(s![.., 3 * u..]);
            let tanh_c = &cache.tanh_cells[t];
            let (c_prev, h_prev) = if t > 0 {
                (cache.cells[t - 1].view(), cache.hidden[t - 1].view())
            } else {
                (zeros.view(), zeros.view())
            };

            let dh = &grad_hidden.index_axis(Axis(1), t) + &dh_next;
            let d_o = &dh * tanh_c;
            let dc = &dh * &o * &tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;
            let d_i = &dc * &g;
            let d_g = &dc * &i;
            let d_f = &dc * &c_prev;
            dc_next = &dc * &f;

            let mut dz = Array2::<f32>::zeros((batch, 4 * u));
            dz.slice_mut(s![.., 0..u])
                .assign(&(&d_i * &i * &i.mapv(|v| 1.0 - v)));
            dz.slice_mut(s![.., u..2 * u])
                .assign(&(&d_f * &f * &f.mapv(|v| 1.0 - v)));
            dz.slice_mut(s![.., 2 * u..3 * u])
                .assign(&(&d_g * &g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![.., 3 * u..])
                .assign(&(&d_o * &o * &o.mapv(|v| 1.0 - v)));

            let x_t = cache.inputs.index_axis(Axis(1), t);
            kernel_grad += &x_t.t().dot(&dz);
            recurrent_grad += &h_prev.t().dot(&dz);
            bias_grad += &dz.sum_axis(Axis(0));

            dx.index_axis_mut(Axis(1), t)
                .assign(&dz.dot(&self.kernel.t()));
            dh_next = dz.dot(&self.recurrent.t());
        }

        self.kernel_grad = kernel_grad;
        self.recurrent_grad = recurrent_grad;
        self.bias_grad = bias_grad;
        Ok(dx)
    }

    pub(crate) fn params(&mut self) -> Vec<Param<'_>> {
        if self.kernel_grad.dim() != self.kernel.dim() {
            self.kernel_grad = Array2::zeros(self.kernel.dim());
            self.recurrent_grad = Array2::zeros(self.recurrent.dim());
            self.bias_grad = Array1::zeros(self.bias.len());
        }
        vec![
            Param {
                value: self.kernel.view_mut().into_dyn(),
                grad: self.kernel_grad.view().into_dyn(),
            },
            Param {
                value: self.recurrent.view_mut().into_dyn(),
                grad: self.recurrent_grad.view().into_dyn(),
            },
            Param {
                value: self.bias.view_mut().into_dyn(),
                grad: self.bias_grad.view().into_dyn(),
            },
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bidirectional {
    forward: Lstm,
    backward: Lstm,
    return_sequences: bool,
}

impl Bidirectional {
    pub fn new(input_dim: usize, units: usize, return_sequences: bool, rng: &mut Prng) -> Self {
        Self {
            forward: Lstm::new(input_dim, units, true, rng),
            backward: Lstm::new(input_dim, units, true, rng),
            return_sequences,
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.forward.num_parameters() + self.backward.num_parameters()
    }

    pub(crate) fn output_shape(&self, input: &[usize]) -> Vec<usize> {
        let features = 2 * self.forward.units();
        if self.return_sequences {
            vec![input.first().copied().unwrap_or(0), features]
        } else {
            vec![features]
        }
    }

    pub(crate) fn forward(&mut self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let x = as_3d(input, "bidirectional")?;
        let fwd = self.forward.forward_sequence(x)?;
        let bwd = self.backward.forward_sequence(reverse_time(x).view())?;

        let out = if self.return_sequences {
            let bwd_aligned = reverse_time(bwd.view());
            concatenate(Axis(2), &[fwd.view(), bwd_aligned.view()]).map(|a| a.into_dyn())
        } else {
            concatenate(Axis(1), &[last_step(&fwd).view(), last_step(&bwd).view()])
                .map(|a| a.into_dyn())
        };
        out.map_err(|_| NnError::Shape {
            layer: "bidirectional",
            expected: "matching forward and backward outputs".into(),
            found: input.shape().to_vec(),
        })
    }

    pub(crate) fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let u = self.forward.units();
        let (grad_fwd, grad_bwd) = if self.return_sequences {
            let g = as_3d(grad_output, "bidirectional")?;
            let grad_fwd = g.slice(s![.., .., 0..u]).to_owned();
            // Undo the re-alignment applied on the way forward.
            let grad_bwd = reverse_time(g.slice(s![.., .., u..]));
            (grad_fwd, grad_bwd)
        } else {
            let g = as_2d(grad_output, "bidirectional")?;
            let steps = self
                .forward
                .cache
                .as_ref()
                .ok_or(NnError::NoForwardCache("bidirectional"))?
                .gates
                .len();
            (
                spread_to_last_step(g.slice(s![.., 0..u]), steps),
                spread_to_last_step(g.slice(s![.., u..]), steps),
            )
        };

        let dx_fwd = self.forward.backward_sequence(&grad_fwd)?;
        let dx_bwd = self.backward.backward_sequence(&grad_bwd)?;
        Ok((dx_fwd + reverse_time(dx_bwd.view())).into_dyn())
    }

    pub(crate) fn params(&mut self) -> Vec<Param<'_>> {
        let mut params = self.forward.params();
        params.extend(self.backward.params());
        params
    }
}

fn reverse_time(x: ArrayView3<f32>) -> Array3<f32> {
    x.slice(s![.., ..;-1, ..]).to_owned()
}

fn last_step(hidden: &Array3<f32>) -> Array2<f32> {
    let steps = hidden.len_of(Axis(1));
    if steps == 0 {
        return Array2::zeros((hidden.len_of(Axis(0)), hidden.len_of(Axis(2))));
    }
    hidden.index_axis(Axis(1), steps - 1).to_owned()
}

/// Gradient for a layer that only exposed its final hidden state: zero at
/// every step except the last.
fn spread_to_last_step(grad: ArrayView2<f32>, steps: usize) -> Array3<f32> {
    let (batch, units) = grad.dim();
    let mut full = Array3::zeros((batch, steps, units));
    if steps > 0 {
        full.index_axis_mut(Axis(1), steps - 1).assign(&grad);
    }
    full
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{Layer, Mode};
    use crate::testutil::check_gradients;

    fn random_input(rng: &mut Prng, shape: (usize, usize, usize)) -> ArrayD<f32> {
        Array3::from_shape_fn(shape, |_| rng.range_f32(-1.0, 1.0)).into_dyn()
    }

    #[test]
    fn output_shapes() {
        let mut rng = Prng::new(1);
        let x = random_input(&mut rng, (2, 5, 3));

        let mut seq = Lstm::new(3, 4, true, &mut rng);
        assert_eq!(seq.forward(&x).unwrap().shape(), &[2, 5, 4]);

        let mut last = Lstm::new(3, 4, false, &mut rng);
        assert_eq!(last.forward(&x).unwrap().shape(), &[2, 4]);

        let mut bi = Bidirectional::new(3, 4, false, &mut rng);
        assert_eq!(bi.forward(&x).unwrap().shape(), &[2, 8]);

        let mut bi_seq = Bidirectional::new(3, 4, true, &mut rng);
        assert_eq!(bi_seq.forward(&x).unwrap().shape(), &[2, 5, 8]);
    }

    #[test]
    fn forget_bias_starts_at_one() {
        let mut rng = Prng::new(2);
        let lstm = Lstm::new(2, 3, false, &mut rng);
        assert_eq!(lstm.bias.slice(s![0..3]).sum(), 0.0);
        assert_eq!(lstm.bias.slice(s![3..6]).sum(), 3.0);
        assert_eq!(lstm.bias.slice(s![6..]).sum(), 0.0);
    }

    #[test]
    fn last_state_equals_final_sequence_step() {
        let mut rng = Prng::new(3);
        let x = random_input(&mut rng, (2, 4, 3));
        let mut seq = Lstm::new(3, 5, true, &mut Prng::new(9));
        let mut last = Lstm::new(3, 5, false, &mut Prng::new(9));
        let all = seq.forward(&x).unwrap();
        let fin = last.forward(&x).unwrap();
        let all = all.into_dimensionality::<ndarray::Ix3>().unwrap();
        assert_eq!(all.index_axis(Axis(1), 3).into_dyn(), fin.view());
    }

    #[test]
    fn hidden_state_is_bounded() {
        let mut rng = Prng::new(4);
        let x = random_input(&mut rng, (3, 6, 2)).mapv(|v| v * 50.0);
        let mut lstm = Lstm::new(2, 4, true, &mut rng);
        let y = lstm.forward(&x).unwrap();
        assert!(y.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn rejects_two_dimensional_input() {
        let mut rng = Prng::new(5);
        let mut lstm = Lstm::new(2, 4, true, &mut rng);
        let x = Array2::<f32>::zeros((3, 2)).into_dyn();
        assert!(matches!(lstm.forward(&x), Err(NnError::Shape { .. })));
    }

    #[test]
    fn lstm_sequence_gradients_match_finite_differences() {
        let mut rng = Prng::new(31);
        let layer = Layer::Lstm(Lstm::new(2, 3, true, &mut rng));
        let input = random_input(&mut rng, (2, 4, 2));
        check_gradients(layer, input, Mode::Train, &mut rng);
    }

    #[test]
    fn lstm_last_state_gradients_match_finite_differences() {
        let mut rng = Prng::new(32);
        let layer = Layer::Lstm(Lstm::new(3, 2, false, &mut rng));
        let input = random_input(&mut rng, (3, 3, 3));
        check_gradients(layer, input, Mode::Train, &mut rng);
    }

    #[test]
    fn bidirectional_gradients_match_finite_differences() {
        let mut rng = Prng::new(33);
        let layer = Layer::Bidirectional(Bidirectional::new(2, 3, false, &mut rng));
        let input = random_input(&mut rng, (2, 4, 2));
        check_gradients(layer, input, Mode::Train, &mut rng);
    }

    #[test]
    fn bidirectional_sequence_gradients_match_finite_differences() {
        let mut rng = Prng::new(34);
        let layer = Layer::Bidirectional(Bidirectional::new(2, 2, true, &mut rng));
        let input = random_input(&mut rng, (2, 3, 2));
        check_gradients(layer, input, Mode::Train, &mut rng);
    }
}
