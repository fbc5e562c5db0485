// End-to-end training and generation runs.
//
// `run_training` is the whole batch pipeline: find the corpus, extract
// tokens, build the vocabulary, window the encoded corpus, train the GAN,
// then persist everything a later `run_generation` needs (both networks,
// the vocabulary and the config) together with the loss history, the loss
// plot and a few generated MIDI files.
//
// Output directory layout:
//   generator.bin, discriminator.bin   trained networks (bincode)
//   vocabulary.json                    token strings in index order
//   config.json                        the config the run used
//   losses.json                        sampled loss history
//   gan_loss_per_epoch.svg             loss plot
//   generated_<n>.mid                  generated sequences, n from 1

use crate::config::{ExtractConfig, PipelineConfig};
use crate::corpus::find_midi_files;
use crate::error::PipelineError;
use crate::extract::extract_corpus;
use crate::gan::{GanTrainer, StepLosses};
use crate::plot::write_loss_plot;
use crate::synth::{decode_sequence, write_midi};
use crate::token::Token;
use crate::vocab::Vocabulary;
use crate::window::TrainingSet;
use log::info;
use std::path::{Path, PathBuf};

pub const VOCAB_FILE: &str = "vocabulary.json";
pub const CONFIG_FILE: &str = "config.json";
pub const LOSSES_FILE: &str = "losses.json";
pub const PLOT_FILE: &str = "gan_loss_per_epoch.svg";

/// What a training run produced.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub files: usize,
    pub tokens: usize,
    pub vocab_size: usize,
    pub windows: usize,
    pub final_losses: Option<StepLosses>,
    pub generated: Vec<PathBuf>,
}

/// Every MIDI file under `corpus_dir` and the concatenated token stream.
pub fn load_corpus(
    corpus_dir: &Path,
    config: &ExtractConfig,
) -> Result<(Vec<PathBuf>, Vec<Token>), PipelineError> {
    let files = find_midi_files(corpus_dir)?;
    let tokens = extract_corpus(&files, config)?;
    Ok((files, tokens))
}

pub fn run_training(
    corpus_dir: &Path,
    out_dir: &Path,
    config: &PipelineConfig,
) -> Result<TrainingSummary, PipelineError> {
    config.validate()?;
    let default_token = config.default_token()?;
    std::fs::create_dir_all(out_dir).map_err(PipelineError::io(out_dir))?;

    info!("[1/6] Finding MIDI files under {}...", corpus_dir.display());
    let files = find_midi_files(corpus_dir)?;
    info!("  {} files", files.len());

    info!("[2/6] Extracting notes and chords...");
    let tokens = extract_corpus(&files, &config.corpus)?;
    info!("  {} tokens", tokens.len());

    info!("[3/6] Building vocabulary...");
    let vocab = Vocabulary::build(&tokens);
    info!("  {} distinct tokens", vocab.len());

    info!("[4/6] Windowing (sequence length {})...", config.sequence_length);
    let indices = vocab.encode(&tokens)?;
    let data = TrainingSet::build(&indices, vocab.len(), config.sequence_length)?;
    info!("  {} training windows", data.len());

    info!("[5/6] Training GAN...");
    let mut gan = GanTrainer::new(config.gan.clone(), config.sequence_length);
    info!(
        "  generator {} parameters, discriminator {} parameters",
        gan.generator().num_parameters(),
        gan.discriminator().num_parameters()
    );
    gan.train(&data)?;
    let final_losses = gan.history().last().copied();

    info!("[6/6] Saving models and writing {} samples to {}...", config.samples, out_dir.display());
    gan.save(out_dir)?;
    vocab.save(&out_dir.join(VOCAB_FILE))?;
    config.save(&out_dir.join(CONFIG_FILE))?;
    gan.history().save(&out_dir.join(LOSSES_FILE))?;
    write_loss_plot(gan.history(), &out_dir.join(PLOT_FILE))?;
    let generated = write_samples(
        &mut gan,
        &vocab,
        &default_token,
        config,
        out_dir,
        config.samples,
    )?;

    Ok(TrainingSummary {
        files: files.len(),
        tokens: tokens.len(),
        vocab_size: vocab.len(),
        windows: data.len(),
        final_losses,
        generated,
    })
}

/// Write `count` MIDI files from a previous training run in `model_dir`.
/// Without a seed, the noise is seeded from the clock.
pub fn run_generation(
    model_dir: &Path,
    out_dir: &Path,
    count: usize,
    seed: Option<u64>,
) -> Result<Vec<PathBuf>, PipelineError> {
    let config = PipelineConfig::load(&model_dir.join(CONFIG_FILE))?;
    let vocab = Vocabulary::load(&model_dir.join(VOCAB_FILE))?;
    let default_token = config.default_token()?;
    let seed = seed.unwrap_or_else(clock_seed);
    info!("generating {count} sequences with seed {seed}");

    let mut gan = GanTrainer::load(model_dir, config.gan.clone(), config.sequence_length, seed)?;
    std::fs::create_dir_all(out_dir).map_err(PipelineError::io(out_dir))?;
    write_samples(&mut gan, &vocab, &default_token, &config, out_dir, count)
}

fn write_samples(
    gan: &mut GanTrainer,
    vocab: &Vocabulary,
    default_token: &Token,
    config: &PipelineConfig,
    out_dir: &Path,
    count: usize,
) -> Result<Vec<PathBuf>, PipelineError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let values = gan.generate(count)?;
    let mut paths = Vec::with_capacity(count);
    for (i, row) in values.rows().into_iter().enumerate() {
        let tokens = decode_sequence(&row.to_vec(), vocab, default_token);
        let path = out_dir.join(format!("generated_{}.mid", i + 1));
        write_midi(&tokens, &path, &config.synth)?;
        info!("  wrote {}", path.display());
        paths.push(path);
    }
    Ok(paths)
}

fn clock_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}
