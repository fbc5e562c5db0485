// Pitch and chord tokens: the categorical vocabulary the GAN learns.
//
// A token is either a single pitch in scientific pitch notation ("C5",
// "F#3", "B-4") or a chord written as its pitch classes in normal order,
// joined by dots ("0.4.7"). The string form is the identity of a token:
// the vocabulary sorts and indexes tokens by it.
//
// Spelling: black keys are always written C#, E-, F#, G#, B- ('-' is a
// flat). Parsing also accepts 'b' for a flat after the letter.
//
// Octave -1 shares the '-' with flats. A trailing "-1" is read as octave -1
// except right after a bare E or B, where "E-1" and "B-1" stay E-flat 1 and
// B-flat 1. The two naturals that would collide are spelled enharmonically:
// key 4 is "F--1" and key 11 is "C-0".
//
// Chords lose their octave and voicing; when a chord token is rendered back
// to MIDI its pitch classes are voiced in a single octave (see `keys`).

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Pitch-class names indexed by `key % 12`.
const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "E-", "E", "F", "F#", "G", "G#", "A", "B-", "B",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// A single MIDI key (0..=127).
    Note(u8),
    /// Pitch classes (0..12) in normal order.
    Chord(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid token {token:?}: {reason}")]
pub struct TokenParseError {
    pub token: String,
    pub reason: String,
}

impl TokenParseError {
    fn new(token: &str, reason: impl Into<String>) -> Self {
        Self {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

impl Token {
    /// Build a token for notes struck together. One distinct key gives a
    /// note; anything else gives a chord of normal-ordered pitch classes.
    pub fn from_keys(keys: &[u8]) -> Option<Token> {
        let mut distinct = keys.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        match distinct.len() {
            0 => None,
            1 => Some(Token::Note(distinct[0])),
            _ => Some(Token::Chord(normal_order(&distinct))),
        }
    }

    pub fn is_chord(&self) -> bool {
        matches!(self, Token::Chord(_))
    }

    /// MIDI keys to sound for this token. Chord pitch classes are voiced in
    /// `chord_octave` (octave 4 puts pitch class 0 on middle C, key 60).
    pub fn keys(&self, chord_octave: u8) -> Vec<u8> {
        match self {
            Token::Note(key) => vec![*key],
            Token::Chord(pcs) => {
                let base = (u16::from(chord_octave) + 1) * 12;
                pcs.iter()
                    .map(|&pc| (base + u16::from(pc)).min(127) as u8)
                    .collect()
            }
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Note(key) => f.write_str(&pitch_name(*key)),
            Token::Chord(pcs) => {
                let parts: Vec<String> = pcs.iter().map(|pc| pc.to_string()).collect();
                f.write_str(&parts.join("."))
            }
        }
    }
}

impl FromStr for Token {
    type Err = TokenParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let s = input.trim();
        if s.is_empty() {
            return Err(TokenParseError::new(input, "empty token"));
        }
        if s.contains('.') || s.chars().all(|c| c.is_ascii_digit()) {
            let pcs = s
                .split('.')
                .map(|part| {
                    part.parse::<u8>()
                        .ok()
                        .filter(|pc| *pc < 12)
                        .ok_or_else(|| {
                            TokenParseError::new(input, format!("bad pitch class {part:?}"))
                        })
                })
                .collect::<Result<Vec<u8>, _>>()?;
            return Ok(Token::Chord(pcs));
        }
        parse_pitch_name(s)
            .map(Token::Note)
            .map_err(|reason| TokenParseError::new(input, reason))
    }
}

/// Scientific pitch name for a MIDI key, middle C (60) = "C4".
pub fn pitch_name(key: u8) -> String {
    match key {
        4 => "F--1".to_string(),
        11 => "C-0".to_string(),
        _ => {
            let octave = i16::from(key / 12) - 1;
            format!("{}{}", PITCH_CLASS_NAMES[usize::from(key % 12)], octave)
        }
    }
}

/// Parse a pitch name like "C4", "F#5", "B-3", "Eb2" or "G#-1" into a MIDI
/// key.
pub fn parse_pitch_name(name: &str) -> Result<u8, String> {
    let mut chars = name.chars();
    let letter = chars.next().ok_or_else(|| "empty pitch name".to_string())?;
    let base: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(format!("bad note letter {letter:?}")),
    };

    let rest = chars.as_str();
    let digits_at = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
    let (mut accidentals, octave_str) = rest.split_at(digits_at);
    if octave_str.is_empty() {
        return Err("missing octave".into());
    }

    let flat_e_or_b = accidentals == "-" && matches!(letter.to_ascii_uppercase(), 'E' | 'B');
    let mut octave_sign = 1;
    if octave_str == "1" && accidentals.ends_with('-') && !flat_e_or_b {
        accidentals = &accidentals[..accidentals.len() - 1];
        octave_sign = -1;
    }
    if let Some(bad) = accidentals.chars().find(|c| !matches!(c, '#' | '-' | 'b')) {
        return Err(format!("bad accidental {bad:?}"));
    }
    let alter: i32 = accidentals
        .chars()
        .map(|c| if c == '#' { 1 } else { -1 })
        .sum();

    let octave: i32 = octave_str
        .parse::<i32>()
        .map_err(|_| format!("bad octave {octave_str:?}"))?
        * octave_sign;

    let key = (octave + 1) * 12 + base + alter;
    if !(0..=127).contains(&key) {
        return Err(format!("key {key} outside MIDI range 0..=127"));
    }
    Ok(key as u8)
}

/// Pitch classes of `keys` in normal order: the rotation of the sorted
/// pitch-class set with the smallest span from first to last element. Ties
/// go to the rotation whose intervals from the first element are smallest,
/// comparing from the second-to-last element inward, then to the lowest
/// starting pitch class.
pub fn normal_order(keys: &[u8]) -> Vec<u8> {
    let mut set: Vec<u8> = keys.iter().map(|k| k % 12).collect();
    set.sort_unstable();
    set.dedup();
    let n = set.len();
    if n <= 1 {
        return set;
    }

    let rotations = (0..n).map(|r| {
        let mut rot = set[r..].to_vec();
        rot.extend_from_slice(&set[..r]);
        rot
    });
    let span = |rot: &[u8], k: usize| (rot[k] + 12 - rot[0]) % 12;

    rotations
        .min_by_key(|rot| {
            let spans: Vec<u8> = (1..n).rev().map(|k| span(rot, k)).collect();
            (spans, rot[0])
        })
        .unwrap_or(set)
}
