// Pipeline configuration.
//
// Every tunable number of a training or generation run lives in
// `PipelineConfig`, loaded from JSON. Defaults reproduce the reference
// notebook setup (sequence length 100, latent dimension 1000, the
// 256/512/1024 generator and the LSTM(512) + BiLSTM(512) discriminator,
// Adam 0.0002/0.5). Every struct is `#[serde(default)]`, so a config file
// only needs the fields it changes.
//
// The config used for training is saved next to the trained models; the
// `generate` command reads it back to rebuild the decoder and synthesizer
// settings exactly.

use crate::error::PipelineError;
use crate::token::Token;
use pianogan_nn::AdamConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Note extraction
// ---------------------------------------------------------------------------

/// Which instrument parts of a file contribute tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartSelection {
    /// Only the part that starts earliest (ties go to the lowest program).
    First,
    /// Every part, merged by onset.
    All,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Onsets snap to `1 / quantize_divisions` of a quarter note.
    pub quantize_divisions: u32,
    pub parts: PartSelection,
    /// Keep notes on MIDI channel 10 (index 9).
    pub include_percussion: bool,
    /// Log and skip files that fail to parse instead of aborting.
    pub skip_unreadable: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            quantize_divisions: 12,
            parts: PartSelection::First,
            include_percussion: false,
            skip_unreadable: false,
        }
    }
}

// ---------------------------------------------------------------------------
// GAN
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GanConfig {
    /// Length of the generator's noise input.
    pub latent_dim: usize,
    /// Hidden dense widths of the generator, each followed by leaky ReLU
    /// and batch normalization.
    pub generator_widths: Vec<usize>,
    /// Units of the discriminator's LSTM and of each direction of its
    /// bidirectional LSTM.
    pub lstm_units: usize,
    /// Hidden dense widths of the discriminator head.
    pub discriminator_widths: Vec<usize>,
    pub leaky_alpha: f32,
    pub batch_norm_momentum: f32,
    pub batch_norm_epsilon: f32,
    pub batch_size: usize,
    /// Number of training steps (one discriminator and one generator update
    /// each).
    pub epochs: usize,
    /// Record and log losses every this many steps.
    pub sample_interval: usize,
    pub adam: AdamConfig,
    pub seed: u64,
}

impl Default for GanConfig {
    fn default() -> Self {
        Self {
            latent_dim: 1000,
            generator_widths: vec![256, 512, 1024],
            lstm_units: 512,
            discriminator_widths: vec![512, 256],
            leaky_alpha: 0.2,
            batch_norm_momentum: 0.8,
            batch_norm_epsilon: 1e-3,
            batch_size: 128,
            epochs: 100,
            sample_interval: 1,
            adam: AdamConfig::default(),
            seed: 42,
        }
    }
}

// ---------------------------------------------------------------------------
// MIDI output
// ---------------------------------------------------------------------------

/// Slowest tempo whose quarter note (in microseconds) fits the 24-bit MIDI
/// tempo field.
pub const MIN_TEMPO_BPM: u32 = 4;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub tempo_bpm: u32,
    pub ticks_per_quarter: u16,
    /// Distance between consecutive token onsets, in quarter notes.
    pub step_quarters: f64,
    /// Sounding length of every note, in quarter notes.
    pub note_quarters: f64,
    /// General MIDI program (0 = acoustic grand piano).
    pub program: u8,
    pub velocity: u8,
    /// Octave chord pitch classes are voiced in (4 = middle C octave).
    pub chord_octave: u8,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            tempo_bpm: 120,
            ticks_per_quarter: 480,
            step_quarters: 0.5,
            note_quarters: 1.0,
            program: 0,
            velocity: 90,
            chord_octave: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Whole pipeline
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub corpus: ExtractConfig,
    /// Tokens per training window and per generated sequence.
    pub sequence_length: usize,
    pub gan: GanConfig,
    pub synth: SynthConfig,
    /// Token written wherever a generated value maps outside the vocabulary.
    pub default_token: String,
    /// MIDI files written at the end of training.
    pub samples: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            corpus: ExtractConfig::default(),
            sequence_length: 100,
            gan: GanConfig::default(),
            synth: SynthConfig::default(),
            default_token: "C5".into(),
            samples: 1,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let data = std::fs::read_to_string(path).map_err(PipelineError::io(path))?;
        let config: PipelineConfig =
            serde_json::from_str(&data).map_err(PipelineError::json(path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self).map_err(PipelineError::json(path))?;
        std::fs::write(path, json).map_err(PipelineError::io(path))
    }

    /// The parsed default token.
    pub fn default_token(&self) -> Result<Token, PipelineError> {
        Ok(self.default_token.parse()?)
    }

    /// Reject settings that would make training or synthesis meaningless.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |msg: &str| Err(PipelineError::Config(msg.to_string()));
        if self.sequence_length == 0 {
            return fail("sequence_length must be at least 1");
        }
        if self.corpus.quantize_divisions == 0 {
            return fail("corpus.quantize_divisions must be at least 1");
        }
        let gan = &self.gan;
        if gan.latent_dim == 0 {
            return fail("gan.latent_dim must be at least 1");
        }
        if gan.lstm_units == 0
            || gan.generator_widths.contains(&0)
            || gan.discriminator_widths.contains(&0)
        {
            return fail("layer widths must be at least 1");
        }
        if gan.batch_size == 0 {
            return fail("gan.batch_size must be at least 1");
        }
        if gan.epochs == 0 {
            return fail("gan.epochs must be at least 1");
        }
        if gan.sample_interval == 0 {
            return fail("gan.sample_interval must be at least 1");
        }
        if !(0.0..1.0).contains(&gan.batch_norm_momentum) {
            return fail("gan.batch_norm_momentum must be in [0, 1)");
        }
        if gan.adam.learning_rate <= 0.0 {
            return fail("gan.adam.learning_rate must be positive");
        }
        let synth = &self.synth;
        if synth.tempo_bpm < MIN_TEMPO_BPM {
            return fail("synth.tempo_bpm must be at least 4");
        }
        if synth.ticks_per_quarter == 0 || synth.ticks_per_quarter > 0x7fff {
            return fail("synth.ticks_per_quarter must be in 1..=32767");
        }
        if synth.step_quarters < 0.0 || synth.note_quarters <= 0.0 {
            return fail(
                "synth.step_quarters must be non-negative and synth.note_quarters positive",
            );
        }
        if synth.program > 127
            || synth.velocity == 0
            || synth.velocity > 127
            || synth.chord_octave > 9
        {
            return fail("synth.program, synth.velocity or synth.chord_octave out of MIDI range");
        }
        self.default_token()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.default_token().unwrap(), Token::Note(72));
        assert_eq!(config.gan.generator_widths, vec![256, 512, 1024]);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let json = r#"{ "sequence_length": 8, "gan": { "batch_size": 4, "lstm_units": 16 } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.sequence_length, 8);
        assert_eq!(config.gan.batch_size, 4);
        assert_eq!(config.gan.lstm_units, 16);
        assert_eq!(config.gan.latent_dim, 1000);
        assert_eq!(config.synth.tempo_bpm, 120);
        assert_eq!(config.corpus.parts, PartSelection::First);
    }

    #[test]
    fn part_selection_is_snake_case() {
        let json = r#"{ "corpus": { "parts": "all" } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.corpus.parts, PartSelection::All);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = PipelineConfig::default();
        config.gan.epochs = 7;
        config.default_token = "4.7.11".into();
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.sequence_length = 0;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let mut config = PipelineConfig::default();
        config.gan.sample_interval = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.synth.tempo_bpm = 0;
        assert!(config.validate().is_err());

        // A quarter note longer than the 24-bit tempo field can hold.
        let mut config = PipelineConfig::default();
        config.synth.tempo_bpm = 3;
        assert!(config.validate().is_err());
        config.synth.tempo_bpm = MIN_TEMPO_BPM;
        config.validate().unwrap();

        let mut config = PipelineConfig::default();
        config.default_token = "Z9".into();
        assert!(matches!(config.validate(), Err(PipelineError::Token(_))));
    }

    #[test]
    fn load_reports_the_path_on_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = PipelineConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
