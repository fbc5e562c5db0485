// Piano GAN
//
// Learns short piano note sequences from a corpus of MIDI files with a
// generative adversarial network and writes new sequences back out as MIDI.
// The work is a linear batch pipeline: corpus files become a stream of
// pitch/chord tokens, tokens become vocabulary indices, indices become
// normalized fixed-length windows, and a dense generator is trained against
// a recurrent discriminator on those windows.
//
// Architecture:
// - corpus.rs: MIDI file discovery under a directory tree
// - token.rs: pitch and chord tokens (pitch names, chord normal order)
// - extract.rs: MIDI parsing into token sequences, parallel over files
// - vocab.rs: sorted token vocabulary and index mapping
// - window.rs: training windows, input normalization, batch sampling
// - gan.rs: generator/discriminator construction and adversarial training
// - synth.rs: generated values back to tokens, tokens to MIDI
// - plot.rs: SVG loss curves
// - config.rs: JSON pipeline configuration with defaults
// - pipeline.rs: end-to-end training and generation runs
// - error.rs: pipeline error types
//
// Neural-network layers live in `pianogan_nn`; all randomness comes from a
// seeded `pianogan_prng::Prng`, so a run is reproducible given its seed.

pub mod config;
pub mod corpus;
pub mod error;
pub mod extract;
pub mod gan;
pub mod pipeline;
pub mod plot;
pub mod synth;
pub mod token;
pub mod vocab;
pub mod window;

pub use error::PipelineError;
