// Piano GAN command-line entry point.
//
// Subcommands:
//   train        corpus -> trained networks, vocabulary, losses, plot, samples
//   generate     trained run directory -> new MIDI files
//   vocab        print the token statistics and vocabulary of a corpus
//   init-config  write the default config as JSON for editing
//
// Usage:
//   cargo run -p pianogan_music --release -- train --corpus midi_songs --out run1
//   cargo run -p pianogan_music --release -- generate --model-dir run1 --count 5
//
// Logging goes through env_logger at `info` unless RUST_LOG says otherwise.

use clap::{Parser, Subcommand};
use log::error;
use pianogan_music::PipelineError;
use pianogan_music::config::PipelineConfig;
use pianogan_music::pipeline::{load_corpus, run_generation, run_training};
use pianogan_music::token::Token;
use pianogan_music::vocab::Vocabulary;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "pianogan",
    version,
    about = "Train a GAN on piano MIDI files and generate new sequences"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on a directory of MIDI files.
    Train {
        #[arg(long)]
        corpus: PathBuf,
        /// Directory for models, vocabulary, losses, plot and samples.
        #[arg(long, default_value = "output")]
        out: PathBuf,
        /// JSON config; defaults are used for anything it leaves out.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        epochs: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Generate MIDI files from a trained run.
    Generate {
        #[arg(long)]
        model_dir: PathBuf,
        #[arg(long, default_value = "generated")]
        out: PathBuf,
        #[arg(long, default_value_t = 1)]
        count: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print token counts and the vocabulary of a corpus.
    Vocab {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write the default config to a file.
    InitConfig {
        #[arg(long, default_value = "pianogan.json")]
        out: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), PipelineError> {
    match cli.command {
        Command::Train {
            corpus,
            out,
            config,
            epochs,
            batch_size,
            seed,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(epochs) = epochs {
                config.gan.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.gan.batch_size = batch_size;
            }
            if let Some(seed) = seed {
                config.gan.seed = seed;
            }
            let summary = run_training(&corpus, &out, &config)?;
            println!(
                "Trained on {} files: {} tokens, {} distinct, {} windows.",
                summary.files, summary.tokens, summary.vocab_size, summary.windows
            );
            if let Some(losses) = summary.final_losses {
                println!("Final: {losses}");
            }
            for path in &summary.generated {
                println!("Wrote {}", path.display());
            }
        }
        Command::Generate {
            model_dir,
            out,
            count,
            seed,
        } => {
            for path in run_generation(&model_dir, &out, count, seed)? {
                println!("Wrote {}", path.display());
            }
        }
        Command::Vocab { corpus, config } => {
            let config = load_config(config.as_deref())?;
            let (files, tokens) = load_corpus(&corpus, &config.corpus)?;
            print_vocab(files.len(), &tokens);
        }
        Command::InitConfig { out } => {
            PipelineConfig::default().save(&out)?;
            println!("Wrote default config to {}", out.display());
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, PipelineError> {
    match path {
        Some(path) => PipelineConfig::load(path),
        None => Ok(PipelineConfig::default()),
    }
}

fn print_vocab(files: usize, tokens: &[Token]) {
    let vocab = Vocabulary::build(tokens);
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokens {
        *counts.entry(token.to_string()).or_default() += 1;
    }
    let chords = tokens.iter().filter(|t| t.is_chord()).count();
    println!(
        "{files} files, {} tokens ({} notes, {chords} chords), {} distinct",
        tokens.len(),
        tokens.len() - chords,
        vocab.len()
    );
    for (index, name) in vocab.iter().enumerate() {
        println!("{index:>5}  {name:<12} {:>7}", counts.get(name).copied().unwrap_or(0));
    }
}
