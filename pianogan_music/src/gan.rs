// Adversarial training of the sequence generator.
//
// The generator maps a standard-normal noise vector to one window of
// normalized token values:
//
//   Dense(w) -> LeakyReLU -> BatchNorm     for each hidden width w
//   Dense(sequence_length) -> tanh -> Reshape(sequence_length, 1)
//
// The discriminator scores a window as real (1) or generated (0):
//
//   LSTM(u, all steps) -> BiLSTM(u, last step) -> [Dense(w) -> LeakyReLU]*
//   -> Dense(1) -> sigmoid
//
// One training step samples real windows with replacement, generates fakes
// with the generator in inference mode, updates the discriminator on the
// reals (label 1) and then the fakes (label 0), and finally updates the
// generator through the discriminator on fresh noise labelled 1. The
// discriminator's parameters receive gradients during the generator update
// but its optimizer is not stepped, which is what freezing it amounts to.
//
// Losses are binary cross-entropy; each network has its own Adam optimizer.
// All randomness (initialization, batch sampling, noise) flows from the
// seed in `GanConfig`, so a run is reproducible.

use crate::config::GanConfig;
use crate::error::PipelineError;
use crate::window::TrainingSet;
use log::{debug, info};
use ndarray::{Array2, ArrayD};
use pianogan_nn::activation::{LeakyRelu, Sigmoid, Tanh};
use pianogan_nn::batch_norm::BatchNorm;
use pianogan_nn::dense::Dense;
use pianogan_nn::layer::Reshape;
use pianogan_nn::loss::{binary_accuracy, binary_cross_entropy};
use pianogan_nn::lstm::{Bidirectional, Lstm};
use pianogan_nn::{Adam, Layer, Mode, Sequential};
use pianogan_prng::Prng;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const GENERATOR_FILE: &str = "generator.bin";
pub const DISCRIMINATOR_FILE: &str = "discriminator.bin";

pub fn build_generator(config: &GanConfig, sequence_length: usize, rng: &mut Prng) -> Sequential {
    let mut model = Sequential::new("generator", vec![config.latent_dim]);
    let mut width = config.latent_dim;
    for &hidden in &config.generator_widths {
        model = model
            .with(Layer::Dense(Dense::new(width, hidden, rng)))
            .with(Layer::LeakyRelu(LeakyRelu::new(config.leaky_alpha)))
            .with(Layer::BatchNorm(BatchNorm::new(
                hidden,
                config.batch_norm_momentum,
                config.batch_norm_epsilon,
            )));
        width = hidden;
    }
    model
        .with(Layer::Dense(Dense::new(width, sequence_length, rng)))
        .with(Layer::Tanh(Tanh::new()))
        .with(Layer::Reshape(Reshape::new(vec![sequence_length, 1])))
}

pub fn build_discriminator(
    config: &GanConfig,
    sequence_length: usize,
    rng: &mut Prng,
) -> Sequential {
    let units = config.lstm_units;
    let mut model = Sequential::new("discriminator", vec![sequence_length, 1])
        .with(Layer::Lstm(Lstm::new(1, units, true, rng)))
        .with(Layer::Bidirectional(Bidirectional::new(units, units, false, rng)));
    let mut width = 2 * units;
    for &hidden in &config.discriminator_widths {
        model = model
            .with(Layer::Dense(Dense::new(width, hidden, rng)))
            .with(Layer::LeakyRelu(LeakyRelu::new(config.leaky_alpha)));
        width = hidden;
    }
    model
        .with(Layer::Dense(Dense::new(width, 1, rng)))
        .with(Layer::Sigmoid(Sigmoid::new()))
}

/// Losses of one training step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepLosses {
    /// 1-based step number.
    pub step: usize,
    /// Mean of the real and fake discriminator losses.
    pub d_loss: f32,
    /// Mean discriminator accuracy over reals and fakes, in `[0, 1]`.
    pub d_accuracy: f32,
    pub g_loss: f32,
}

impl std::fmt::Display for StepLosses {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [D loss: {}, acc.: {:.2}%] [G loss: {}]",
            self.step,
            self.d_loss,
            100.0 * self.d_accuracy,
            self.g_loss
        )
    }
}

/// Losses sampled every `sample_interval` steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossHistory {
    pub samples: Vec<StepLosses>,
}

impl LossHistory {
    pub fn push(&mut self, losses: StepLosses) {
        self.samples.push(losses);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&StepLosses> {
        self.samples.last()
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self).map_err(PipelineError::json(path))?;
        std::fs::write(path, json).map_err(PipelineError::io(path))
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let data = std::fs::read_to_string(path).map_err(PipelineError::io(path))?;
        serde_json::from_str(&data).map_err(PipelineError::json(path))
    }
}

pub struct GanTrainer {
    config: GanConfig,
    sequence_length: usize,
    generator: Sequential,
    discriminator: Sequential,
    generator_opt: Adam,
    discriminator_opt: Adam,
    rng: Prng,
    steps: usize,
    history: LossHistory,
}

impl GanTrainer {
    /// Fresh networks initialized from `config.seed`.
    pub fn new(config: GanConfig, sequence_length: usize) -> Self {
        let mut rng = Prng::new(config.seed);
        let mut init_rng = rng.fork();
        let generator = build_generator(&config, sequence_length, &mut init_rng);
        let discriminator = build_discriminator(&config, sequence_length, &mut init_rng);
        Self::assemble(config, sequence_length, generator, discriminator, rng)
    }

    /// Wrap previously trained networks. They must match `config` and
    /// `sequence_length`; `seed` drives the noise of later calls.
    pub fn from_models(
        config: GanConfig,
        sequence_length: usize,
        generator: Sequential,
        discriminator: Sequential,
        seed: u64,
    ) -> Result<Self, PipelineError> {
        check_shape(&generator, &[config.latent_dim], &[sequence_length, 1])?;
        check_shape(&discriminator, &[sequence_length, 1], &[1])?;
        Ok(Self::assemble(config, sequence_length, generator, discriminator, Prng::new(seed)))
    }

    fn assemble(
        config: GanConfig,
        sequence_length: usize,
        generator: Sequential,
        discriminator: Sequential,
        rng: Prng,
    ) -> Self {
        Self {
            generator_opt: Adam::new(config.adam.clone()),
            discriminator_opt: Adam::new(config.adam.clone()),
            config,
            sequence_length,
            generator,
            discriminator,
            rng,
            steps: 0,
            history: LossHistory::default(),
        }
    }

    /// Load `generator.bin` and `discriminator.bin` from `dir`.
    pub fn load(
        dir: &Path,
        config: GanConfig,
        sequence_length: usize,
        seed: u64,
    ) -> Result<Self, PipelineError> {
        let generator = Sequential::load(&dir.join(GENERATOR_FILE))?;
        let discriminator = Sequential::load(&dir.join(DISCRIMINATOR_FILE))?;
        Self::from_models(config, sequence_length, generator, discriminator, seed)
    }

    /// Write both networks into `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), PipelineError> {
        self.generator.save(&dir.join(GENERATOR_FILE))?;
        self.discriminator.save(&dir.join(DISCRIMINATOR_FILE))?;
        Ok(())
    }

    pub fn generator(&self) -> &Sequential {
        &self.generator
    }

    pub fn discriminator(&self) -> &Sequential {
        &self.discriminator
    }

    pub fn history(&self) -> &LossHistory {
        &self.history
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// `(batch, latent_dim)` standard-normal noise.
    pub fn sample_noise(&mut self, batch: usize) -> ArrayD<f32> {
        let rng = &mut self.rng;
        Array2::from_shape_fn((batch, self.config.latent_dim), |_| {
            rng.next_normal() as f32
        })
        .into_dyn()
    }

    /// One discriminator update followed by one generator update.
    pub fn train_step(&mut self, data: &TrainingSet) -> Result<StepLosses, PipelineError> {
        if data.sequence_length() != self.sequence_length {
            return Err(PipelineError::Config(format!(
                "training windows have length {} but the networks expect {}",
                data.sequence_length(),
                self.sequence_length
            )));
        }
        let batch = self.config.batch_size;

        let real = data.sample_batch(batch, &mut self.rng).into_dyn();
        let noise = self.sample_noise(batch);
        let fake = self.generator.forward(&noise, Mode::Infer)?;

        let (d_loss_real, d_acc_real) = self.update_discriminator(&real, 1.0)?;
        let (d_loss_fake, d_acc_fake) = self.update_discriminator(&fake, 0.0)?;

        let g_loss = self.update_generator(batch)?;

        self.steps += 1;
        Ok(StepLosses {
            step: self.steps,
            d_loss: 0.5 * (d_loss_real + d_loss_fake),
            d_accuracy: 0.5 * (d_acc_real + d_acc_fake),
            g_loss,
        })
    }

    /// Push fresh fakes through the discriminator against the "real" label
    /// and step only the generator. The discriminator computes gradients but
    /// its optimizer is not stepped.
    fn update_generator(&mut self, batch: usize) -> Result<f32, PipelineError> {
        let noise = self.sample_noise(batch);
        let generated = self.generator.forward(&noise, Mode::Train)?;
        let scores = self.discriminator.forward(&generated, Mode::Train)?;
        let loss = binary_cross_entropy(&scores, 1.0);
        let grad_generated = self.discriminator.backward(&loss.grad)?;
        self.generator.backward(&grad_generated)?;
        self.generator_opt.step(self.generator.params())?;
        Ok(loss.value)
    }

    fn update_discriminator(
        &mut self,
        batch: &ArrayD<f32>,
        label: f32,
    ) -> Result<(f32, f32), PipelineError> {
        let scores = self.discriminator.forward(batch, Mode::Train)?;
        let loss = binary_cross_entropy(&scores, label);
        let accuracy = binary_accuracy(&scores, label);
        self.discriminator.backward(&loss.grad)?;
        self.discriminator_opt.step(self.discriminator.params())?;
        Ok((loss.value, accuracy))
    }

    /// Run `config.epochs` steps, recording and logging losses every
    /// `sample_interval` steps.
    pub fn train(&mut self, data: &TrainingSet) -> Result<&LossHistory, PipelineError> {
        info!(
            "training for {} steps, batch {}, {} windows",
            self.config.epochs,
            self.config.batch_size,
            data.len()
        );
        for line in self.generator.summary().iter().chain(&self.discriminator.summary()) {
            debug!("{line}");
        }
        let interval = self.config.sample_interval.max(1);
        for _ in 0..self.config.epochs {
            let losses = self.train_step(data)?;
            if losses.step % interval == 0 {
                info!("{losses}");
                self.history.push(losses);
            }
        }
        Ok(&self.history)
    }

    /// `count` generated sequences of normalized values, `(count,
    /// sequence_length)`, from fresh noise with the generator in inference
    /// mode.
    pub fn generate(&mut self, count: usize) -> Result<Array2<f32>, PipelineError> {
        let noise = self.sample_noise(count);
        let out = self.generator.forward(&noise, Mode::Infer)?;
        if out.shape() != [count, self.sequence_length, 1] {
            return Err(PipelineError::Config(format!(
                "generator produced shape {:?}, expected [{count}, {}, 1]",
                out.shape(),
                self.sequence_length
            )));
        }
        Ok(Array2::from_shape_fn((count, self.sequence_length), |(i, t)| {
            out[[i, t, 0].as_slice()]
        }))
    }
}

fn check_shape(model: &Sequential, input: &[usize], output: &[usize]) -> Result<(), PipelineError> {
    if model.input_shape() != input || model.output_shape() != output {
        return Err(PipelineError::Config(format!(
            "{} maps {:?} to {:?}, expected {:?} to {:?}",
            model.name(),
            model.input_shape(),
            model.output_shape(),
            input,
            output
        )));
    }
    Ok(())
}
