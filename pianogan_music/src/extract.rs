// Note extraction: MIDI files to pitch/chord token sequences.
//
// Each file is flattened into one timeline of note onsets. Track events are
// merged by absolute tick (Format 2 files play their tracks back to back),
// and every note-on is tagged with the part it belongs to: the General MIDI
// program active on its channel at that moment, or the percussion part for
// channel 10. Percussion is dropped unless asked for.
//
// Part selection mirrors the usual "first instrument only" treatment of
// piano corpora: by default only the part with the earliest onset is kept.
//
// Onsets are then quantized to a fraction of a quarter note and every group
// of notes sharing a quantized onset becomes one token, a note when it holds
// a single key and a chord otherwise. Durations, velocities and rests are
// not represented.
//
// Whole files are parsed in parallel with rayon; per-file results are
// concatenated in path order so the token stream is deterministic.

use crate::config::{ExtractConfig, PartSelection};
use crate::error::{ExtractError, PipelineError};
use crate::token::Token;
use log::{debug, warn};
use midly::{Format, MidiMessage, Smf, Timing, TrackEventKind};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// MIDI channel index reserved for percussion in General MIDI.
const PERCUSSION_CHANNEL: u8 = 9;

/// Part id used for percussion notes, outside the 0..128 program range.
const PERCUSSION_PART: u16 = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Onset {
    tick: u64,
    key: u8,
    part: u16,
}

/// Parse one MIDI file held in memory into its token sequence.
pub fn extract_tokens(bytes: &[u8], config: &ExtractConfig) -> Result<Vec<Token>, ExtractError> {
    let smf = Smf::parse(bytes)?;
    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) => u64::from(tpq.as_int()).max(1),
        Timing::Timecode(..) => return Err(ExtractError::Timecode),
    };

    let onsets = collect_onsets(&smf, config.include_percussion);
    let onsets = select_parts(onsets, config.parts);
    Ok(group_onsets(&onsets, ticks_per_quarter, config.quantize_divisions))
}

/// Read and parse one file from disk.
pub fn extract_file(path: &Path, config: &ExtractConfig) -> Result<Vec<Token>, PipelineError> {
    let bytes = std::fs::read(path).map_err(PipelineError::io(path))?;
    extract_tokens(&bytes, config).map_err(|source| PipelineError::Extract {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse every file in parallel and concatenate the token sequences in the
/// order of `paths`.
pub fn extract_corpus(
    paths: &[PathBuf],
    config: &ExtractConfig,
) -> Result<Vec<Token>, PipelineError> {
    let results: Vec<Result<Vec<Token>, PipelineError>> = paths
        .par_iter()
        .map(|path| extract_file(path, config))
        .collect();

    let mut tokens = Vec::new();
    let mut skipped = 0usize;
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(file_tokens) => {
                debug!("{}: {} tokens", path.display(), file_tokens.len());
                tokens.extend(file_tokens);
            }
            Err(err) if config.skip_unreadable => {
                warn!("skipping unreadable file: {err}");
                skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }
    if skipped > 0 {
        warn!("{skipped} of {} files skipped", paths.len());
    }
    Ok(tokens)
}

/// All note-on events of the file on one absolute-tick timeline.
fn collect_onsets(smf: &Smf, include_percussion: bool) -> Vec<Onset> {
    // (tick, order, channel, message); program changes sort before notes on
    // the same tick so a note picks up the program set alongside it.
    let mut events: Vec<(u64, u8, u8, MidiMessage)> = Vec::new();
    let mut track_start = 0u64;
    for track in &smf.tracks {
        let mut tick = track_start;
        for event in track {
            tick += u64::from(event.delta.as_int());
            if let TrackEventKind::Midi { channel, message } = event.kind {
                let order = match message {
                    MidiMessage::ProgramChange { .. } => 0,
                    _ => 1,
                };
                events.push((tick, order, channel.as_int(), message));
            }
        }
        if smf.header.format == Format::Sequential {
            track_start = tick;
        }
    }
    events.sort_by_key(|&(tick, order, _, _)| (tick, order));

    let mut programs = [0u8; 16];
    let mut onsets = Vec::new();
    for (tick, _, channel, message) in events {
        match message {
            MidiMessage::ProgramChange { program } => {
                programs[usize::from(channel)] = program.as_int();
            }
            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                let part = if channel == PERCUSSION_CHANNEL {
                    if !include_percussion {
                        continue;
                    }
                    PERCUSSION_PART
                } else {
                    u16::from(programs[usize::from(channel)])
                };
                onsets.push(Onset {
                    tick,
                    key: key.as_int(),
                    part,
                });
            }
            _ => {}
        }
    }
    onsets
}

fn select_parts(onsets: Vec<Onset>, selection: PartSelection) -> Vec<Onset> {
    match selection {
        PartSelection::All => onsets,
        PartSelection::First => {
            let Some(first) = onsets.iter().map(|o| (o.tick, o.part)).min() else {
                return onsets;
            };
            onsets.into_iter().filter(|o| o.part == first.1).collect()
        }
    }
}

/// One token per quantized onset, in time order.
fn group_onsets(onsets: &[Onset], ticks_per_quarter: u64, divisions: u32) -> Vec<Token> {
    let divisions = u64::from(divisions.max(1));
    let mut groups: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
    for onset in onsets {
        let slot = (onset.tick * divisions + ticks_per_quarter / 2) / ticks_per_quarter;
        groups.entry(slot).or_default().push(onset.key);
    }
    groups
        .values()
        .filter_map(|keys| Token::from_keys(keys))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u4, u7, u15, u28};
    use midly::{Header, Track, TrackEvent};

    const TPQ: u16 = 480;

    /// (absolute tick, channel, message) per track.
    type Script = Vec<(u32, u8, MidiMessage)>;

    fn on(key: u8) -> MidiMessage {
        MidiMessage::NoteOn {
            key: u7::new(key),
            vel: u7::new(64),
        }
    }

    fn off(key: u8) -> MidiMessage {
        MidiMessage::NoteOff {
            key: u7::new(key),
            vel: u7::new(0),
        }
    }

    fn program(p: u8) -> MidiMessage {
        MidiMessage::ProgramChange { program: u7::new(p) }
    }

    fn midi_bytes(format: Format, timing: Timing, tracks: Vec<Script>) -> Vec<u8> {
        let mut smf = Smf::new(Header::new(format, timing));
        for script in tracks {
            let mut track: Track<'static> = Vec::new();
            let mut last = 0u32;
            for (tick, channel, message) in script {
                track.push(TrackEvent {
                    delta: u28::new(tick - last),
                    kind: TrackEventKind::Midi {
                        channel: u4::new(channel),
                        message,
                    },
                });
                last = tick;
            }
            track.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
            });
            smf.tracks.push(track);
        }
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();
        buf
    }

    fn metrical() -> Timing {
        Timing::Metrical(u15::new(TPQ))
    }

    fn tokens(bytes: &[u8], config: &ExtractConfig) -> Vec<String> {
        extract_tokens(bytes, config)
            .unwrap()
            .iter()
            .map(Token::to_string)
            .collect()
    }

    #[test]
    fn single_notes_and_chords_in_onset_order() {
        let bytes = midi_bytes(
            Format::SingleTrack,
            metrical(),
            vec![vec![
                (0, 0, on(72)),
                (240, 0, off(72)),
                (240, 0, on(60)),
                (240, 0, on(64)),
                (240, 0, on(67)),
                (720, 0, off(60)),
                (720, 0, off(64)),
                (720, 0, off(67)),
                (720, 0, on(70)),
            ]],
        );
        assert_eq!(
            tokens(&bytes, &ExtractConfig::default()),
            vec!["C5", "0.4.7", "B-4"]
        );
    }

    #[test]
    fn velocity_zero_note_on_is_not_an_onset() {
        let silent = MidiMessage::NoteOn {
            key: u7::new(62),
            vel: u7::new(0),
        };
        let bytes = midi_bytes(
            Format::SingleTrack,
            metrical(),
            vec![vec![(0, 0, on(60)), (480, 0, silent), (480, 0, on(65))]],
        );
        assert_eq!(tokens(&bytes, &ExtractConfig::default()), vec!["C4", "F4"]);
    }

    #[test]
    fn near_simultaneous_notes_quantize_into_a_chord() {
        // 10 ticks apart at 480 tpq is well inside one 1/12-quarter slot.
        let bytes = midi_bytes(
            Format::SingleTrack,
            metrical(),
            vec![vec![(0, 0, on(57)), (10, 0, on(60)), (10, 0, on(64))]],
        );
        assert_eq!(tokens(&bytes, &ExtractConfig::default()), vec!["9.0.4"]);

        let fine = ExtractConfig {
            quantize_divisions: 480,
            ..ExtractConfig::default()
        };
        assert_eq!(tokens(&bytes, &fine), vec!["A3", "0.4"]);
    }

    #[test]
    fn first_part_only_by_default() {
        // Track 1: piano melody from tick 0. Track 2: strings from tick 240.
        let bytes = midi_bytes(
            Format::Parallel,
            metrical(),
            vec![
                vec![(0, 0, program(0)), (0, 0, on(72)), (480, 0, on(74))],
                vec![(0, 1, program(48)), (240, 1, on(48)), (480, 1, on(50))],
            ],
        );
        assert_eq!(tokens(&bytes, &ExtractConfig::default()), vec!["C5", "D5"]);

        let all = ExtractConfig {
            parts: PartSelection::All,
            ..ExtractConfig::default()
        };
        // Tick 480 holds D5 and D3 together: a single-class chord.
        assert_eq!(tokens(&bytes, &all), vec!["C5", "C3", "2"]);
    }

    #[test]
    fn program_change_on_the_same_tick_applies_to_the_note() {
        // The program change lives in a later track than the note.
        let bytes = midi_bytes(
            Format::Parallel,
            metrical(),
            vec![
                vec![(0, 0, on(60)), (480, 3, on(40))],
                vec![(0, 0, program(40)), (0, 3, program(0))],
            ],
        );
        // Channel 0 is program 40 from tick 0; channel 3 is program 0.
        // First part is program 40 (earliest), so only C4 survives.
        assert_eq!(tokens(&bytes, &ExtractConfig::default()), vec!["C4"]);
    }

    #[test]
    fn percussion_is_skipped_unless_requested() {
        let bytes = midi_bytes(
            Format::SingleTrack,
            metrical(),
            vec![vec![(0, 9, on(36)), (480, 0, on(60))]],
        );
        assert_eq!(tokens(&bytes, &ExtractConfig::default()), vec!["C4"]);

        let with_drums = ExtractConfig {
            include_percussion: true,
            parts: PartSelection::All,
            ..ExtractConfig::default()
        };
        assert_eq!(tokens(&bytes, &with_drums), vec!["C2", "C4"]);
    }

    #[test]
    fn sequential_tracks_play_back_to_back() {
        let bytes = midi_bytes(
            Format::Sequential,
            metrical(),
            vec![
                vec![(0, 0, on(60)), (480, 0, off(60))],
                vec![(0, 0, on(62)), (480, 0, off(62))],
            ],
        );
        // Without the offset both onsets would share tick 0 and merge.
        assert_eq!(tokens(&bytes, &ExtractConfig::default()), vec!["C4", "D4"]);
    }

    #[test]
    fn timecode_files_are_rejected() {
        let bytes = midi_bytes(
            Format::SingleTrack,
            Timing::Timecode(midly::Fps::Fps25, 40),
            vec![vec![(0, 0, on(60))]],
        );
        assert!(matches!(
            extract_tokens(&bytes, &ExtractConfig::default()),
            Err(ExtractError::Timecode)
        ));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            extract_tokens(b"definitely not midi", &ExtractConfig::default()),
            Err(ExtractError::Parse(_))
        ));
    }

    #[test]
    fn corpus_concatenates_in_path_order_and_can_skip_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.mid");
        let b = dir.path().join("b.mid");
        let bad = dir.path().join("c.mid");
        std::fs::write(
            &a,
            midi_bytes(
                Format::SingleTrack,
                metrical(),
                vec![vec![(0, 0, on(60)), (480, 0, on(62))]],
            ),
        )
        .unwrap();
        std::fs::write(
            &b,
            midi_bytes(Format::SingleTrack, metrical(), vec![vec![(0, 0, on(64))]]),
        )
        .unwrap();
        std::fs::write(&bad, b"definitely not midi").unwrap();

        let config = ExtractConfig::default();
        let good = extract_corpus(&[a.clone(), b.clone()], &config).unwrap();
        let names: Vec<String> = good.iter().map(Token::to_string).collect();
        assert_eq!(names, vec!["C4", "D4", "E4"]);

        let err = extract_corpus(&[a.clone(), bad.clone(), b.clone()], &config).unwrap_err();
        assert!(err.to_string().contains("c.mid"), "{err}");

        let lenient = ExtractConfig {
            skip_unreadable: true,
            ..config
        };
        assert_eq!(extract_corpus(&[a, bad, b], &lenient).unwrap().len(), 3);
    }
}
