// MIDI output from generated token sequences.
//
// Generated values are mapped back to vocabulary indices (the inverse of
// the training normalization) and then to tokens; anything that lands
// outside the vocabulary becomes the configured default token.
//
// Tokens are laid out on a fixed grid: token `i` starts `i * step_quarters`
// quarter notes in and sounds for `note_quarters`. Chords are voiced with
// all pitch classes in one octave. A key struck again while still sounding
// is released at the new onset.
//
// Uses the `midly` crate. Output is SMF Format 1: a tempo track followed by
// a single piano track on channel 1.

use crate::config::{MIN_TEMPO_BPM, SynthConfig};
use crate::error::PipelineError;
use crate::token::Token;
use crate::vocab::Vocabulary;
use crate::window::denormalize;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::collections::HashMap;
use std::path::Path;

const CHANNEL: u8 = 0;

/// Map generator output back to tokens.
pub fn decode_sequence(values: &[f32], vocab: &Vocabulary, default_token: &Token) -> Vec<Token> {
    values
        .iter()
        .map(|&v| vocab.token_or(denormalize(v, vocab.len()), default_token))
        .collect()
}

/// Convert a token sequence to MIDI and write it to `path`.
pub fn write_midi(
    tokens: &[Token],
    path: &Path,
    config: &SynthConfig,
) -> Result<(), PipelineError> {
    tokens_to_smf(tokens, config)
        .save(path)
        .map_err(PipelineError::io(path))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Note {
    start: u32,
    end: u32,
    key: u8,
}

fn quarters_to_ticks(quarters: f64, ticks_per_quarter: u16) -> u32 {
    (quarters * f64::from(ticks_per_quarter)).round().max(0.0) as u32
}

/// Notes of the sequence with overlapping repeats of a key cut short.
fn layout_notes(tokens: &[Token], config: &SynthConfig) -> Vec<Note> {
    let step = quarters_to_ticks(config.step_quarters, config.ticks_per_quarter);
    let length = quarters_to_ticks(config.note_quarters, config.ticks_per_quarter).max(1);

    let mut notes: Vec<Note> = Vec::new();
    let mut sounding: HashMap<u8, usize> = HashMap::new();
    for (i, token) in tokens.iter().enumerate() {
        let start = i as u32 * step;
        for key in token.keys(config.chord_octave) {
            if let Some(&prev) = sounding.get(&key) {
                let prev = &mut notes[prev];
                prev.end = prev.end.min(start);
            }
            sounding.insert(key, notes.len());
            notes.push(Note {
                start,
                end: start + length,
                key,
            });
        }
    }
    notes.retain(|n| n.end > n.start);
    notes
}

/// Build the in-memory SMF for a token sequence.
pub fn tokens_to_smf(tokens: &[Token], config: &SynthConfig) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(config.ticks_per_quarter)),
    ));

    // Track 0: tempo track
    let mut tempo_track: Track<'static> = Vec::new();
    let tempo_microseconds = 60_000_000 / config.tempo_bpm.max(MIN_TEMPO_BPM);
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
    });
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(tempo_track);

    let channel = u4::new(CHANNEL);
    let mut track: Track<'static> = Vec::new();
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(b"Piano")),
    });
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(config.program),
            },
        },
    });

    // (tick, 0 = off / 1 = on, key); releases go first on a shared tick so
    // a restruck key is not cut by its own previous note-off.
    let mut events: Vec<(u32, u8, u8)> = Vec::new();
    for note in layout_notes(tokens, config) {
        events.push((note.start, 1, note.key));
        events.push((note.end, 0, note.key));
    }
    events.sort_unstable();

    let mut last_tick = 0u32;
    for (tick, on, key) in events {
        let message = if on == 1 {
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(config.velocity),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            }
        };
        track.push(TrackEvent {
            delta: u28::new(tick - last_tick),
            kind: TrackEventKind::Midi { channel, message },
        });
        last_tick = tick;
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    smf
}
