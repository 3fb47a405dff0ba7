// Static music-theory tables and lookups.
//
// Everything here is pure: key-name parsing, scale modes (the major scale,
// its seven modal rotations, and the harmonic/melodic minors), diatonic triad
// qualities derived by stacking scale thirds, triad/seventh/extension pitch
// class construction, roman-numeral labels, harmonic-function classification,
// and the register helpers every part generator uses to find chord or scale
// tones near a target pitch.
//
// Pitches inside the composer are `i32` MIDI numbers so interval arithmetic
// never underflows; they are clamped to 0..=127 only when a note is emitted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ComposeError;

/// Sharp-spelled pitch-class names, indexed by pitch class.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

const MAJOR_INTERVALS: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];
const HARMONIC_MINOR_INTERVALS: [u8; 7] = [0, 2, 3, 5, 7, 8, 11];
const MELODIC_MINOR_INTERVALS: [u8; 7] = [0, 2, 3, 5, 7, 9, 11];

/// Parse a key name such as `"C"`, `"F#"`, `"Bb"`, or `"e♭"` to a pitch class.
pub fn parse_key(name: &str) -> Result<u8, ComposeError> {
    let trimmed = name.trim();
    let mut chars = trimmed.chars();
    let letter = chars
        .next()
        .ok_or_else(|| ComposeError::UnknownKey(name.to_string()))?;
    let natural: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(ComposeError::UnknownKey(name.to_string())),
    };
    let accidental = match chars.as_str() {
        "" => 0,
        "#" | "♯" => 1,
        "b" | "♭" => -1,
        _ => return Err(ComposeError::UnknownKey(name.to_string())),
    };
    Ok((natural + accidental).rem_euclid(12) as u8)
}

/// Name of a MIDI pitch with octave, middle C = "C4".
pub fn pitch_name(pitch: i32) -> String {
    let pc = pitch.rem_euclid(12) as usize;
    let octave = pitch.div_euclid(12) - 1;
    format!("{}{}", NOTE_NAMES[pc], octave)
}

/// Rotate a seven-note interval set so `start` becomes the new tonic.
pub fn rotate_intervals(intervals: [u8; 7], start: usize) -> [u8; 7] {
    let base = intervals[start % 7];
    let mut out = [0u8; 7];
    for (i, slot) in out.iter_mut().enumerate() {
        let iv = intervals[(start + i) % 7];
        *slot = (iv + 12 - base) % 12;
    }
    out
}

/// Scale modes the composer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    Major,
    Minor,
    HarmonicMinor,
    MelodicMinor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
}

impl ScaleMode {
    pub const ALL: [ScaleMode; 9] = [
        ScaleMode::Major,
        ScaleMode::Minor,
        ScaleMode::HarmonicMinor,
        ScaleMode::MelodicMinor,
        ScaleMode::Dorian,
        ScaleMode::Phrygian,
        ScaleMode::Lydian,
        ScaleMode::Mixolydian,
        ScaleMode::Locrian,
    ];

    /// Semitone offsets of the seven degrees from the tonic.
    pub fn intervals(self) -> [u8; 7] {
        match self {
            ScaleMode::Major => MAJOR_INTERVALS,
            ScaleMode::Dorian => rotate_intervals(MAJOR_INTERVALS, 1),
            ScaleMode::Phrygian => rotate_intervals(MAJOR_INTERVALS, 2),
            ScaleMode::Lydian => rotate_intervals(MAJOR_INTERVALS, 3),
            ScaleMode::Mixolydian => rotate_intervals(MAJOR_INTERVALS, 4),
            ScaleMode::Minor => rotate_intervals(MAJOR_INTERVALS, 5),
            ScaleMode::Locrian => rotate_intervals(MAJOR_INTERVALS, 6),
            ScaleMode::HarmonicMinor => HARMONIC_MINOR_INTERVALS,
            ScaleMode::MelodicMinor => MELODIC_MINOR_INTERVALS,
        }
    }

    /// Major-key behavior (modal mixture, secondary-dominant pushes,
    /// dominant sevenths) applies only to the plain major scale.
    pub fn is_major(self) -> bool {
        self == ScaleMode::Major
    }

    pub fn name(self) -> &'static str {
        match self {
            ScaleMode::Major => "major",
            ScaleMode::Minor => "minor",
            ScaleMode::HarmonicMinor => "harmonic minor",
            ScaleMode::MelodicMinor => "melodic minor",
            ScaleMode::Dorian => "dorian",
            ScaleMode::Phrygian => "phrygian",
            ScaleMode::Lydian => "lydian",
            ScaleMode::Mixolydian => "mixolydian",
            ScaleMode::Locrian => "locrian",
        }
    }
}

impl FromStr for ScaleMode {
    type Err = ComposeError;

    /// Case-insensitive; `_` and `-` act as spaces. `ionian` and `aeolian`
    /// / `natural minor` are aliases of major and minor.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .to_lowercase()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let mode = match normalized.as_str() {
            "major" | "ionian" => ScaleMode::Major,
            "minor" | "natural minor" | "aeolian" => ScaleMode::Minor,
            "harmonic minor" => ScaleMode::HarmonicMinor,
            "melodic minor" => ScaleMode::MelodicMinor,
            "dorian" => ScaleMode::Dorian,
            "phrygian" => ScaleMode::Phrygian,
            "lydian" => ScaleMode::Lydian,
            "mixolydian" => ScaleMode::Mixolydian,
            "locrian" => ScaleMode::Locrian,
            _ => return Err(ComposeError::UnknownMode(s.to_string())),
        };
        Ok(mode)
    }
}

/// Triad quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Major,
    Minor,
    Diminished,
    Augmented,
}

impl Quality {
    pub fn triad_intervals(self) -> [u8; 3] {
        match self {
            Quality::Major => [0, 4, 7],
            Quality::Minor => [0, 3, 7],
            Quality::Diminished => [0, 3, 6],
            Quality::Augmented => [0, 4, 8],
        }
    }

    /// Seventh-chord shape for the quality: maj7, min7, half-diminished, or
    /// augmented-major. `dominant` forces a dominant seventh.
    pub fn seventh_intervals(self, dominant: bool) -> [u8; 4] {
        if dominant {
            return [0, 4, 7, 10];
        }
        match self {
            Quality::Major => [0, 4, 7, 11],
            Quality::Minor => [0, 3, 7, 10],
            Quality::Diminished => [0, 3, 6, 10],
            Quality::Augmented => [0, 4, 8, 11],
        }
    }

    fn from_stack(third: u8, fifth: u8) -> Quality {
        match (third, fifth) {
            (3, 7) => Quality::Minor,
            (3, 6) => Quality::Diminished,
            (4, 8) => Quality::Augmented,
            _ => Quality::Major,
        }
    }
}

/// Chord color added on top of the triad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extension {
    Triad,
    Sus2,
    Sus4,
    Add9,
    Seventh,
    Maj9,
    Min9,
    Dom9,
}

impl Extension {
    pub fn name(self) -> &'static str {
        match self {
            Extension::Triad => "triad",
            Extension::Sus2 => "sus2",
            Extension::Sus4 => "sus4",
            Extension::Add9 => "add9",
            Extension::Seventh => "7",
            Extension::Maj9 => "maj9",
            Extension::Min9 => "min9",
            Extension::Dom9 => "dom9",
        }
    }
}

/// Random choices made while building an extended chord, drawn by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChordColor {
    /// Seventh chords use a dominant seventh regardless of quality.
    pub dominant_seventh: bool,
    /// Ninth chords add the 13th.
    pub thirteenth: bool,
}

/// Pitch classes of a chord, root first, unique, in construction order.
///
/// Ninth chords drop the fifth and add the 9th. `Maj9` keeps a major
/// seventh over major/augmented triads and `Min9` a minor seventh over
/// minor/diminished ones; otherwise each follows the triad's own seventh.
pub fn chord_pcs(root_pc: u8, quality: Quality, extension: Extension, color: ChordColor) -> Vec<u8> {
    let at = |iv: u8| (root_pc + iv) % 12;
    let triad: Vec<u8> = quality.triad_intervals().iter().map(|&iv| at(iv)).collect();
    let ninth_shell = |sevenths: [u8; 4]| {
        let fifth = at(7);
        let mut pcs: Vec<u8> = sevenths
            .iter()
            .map(|&iv| at(iv))
            .filter(|&pc| pc != fifth)
            .collect();
        pcs.push(at(2));
        if color.thirteenth {
            pcs.push(at(9));
        }
        pcs
    };
    let pcs = match extension {
        Extension::Triad => triad,
        Extension::Sus2 | Extension::Sus4 => {
            let mut pcs = triad;
            pcs[1] = at(if extension == Extension::Sus2 { 2 } else { 5 });
            pcs
        }
        Extension::Add9 => {
            let mut pcs = triad;
            pcs.push(at(2));
            pcs
        }
        Extension::Seventh => quality
            .seventh_intervals(color.dominant_seventh)
            .iter()
            .map(|&iv| at(iv))
            .collect(),
        Extension::Maj9 => ninth_shell(match quality {
            Quality::Major | Quality::Augmented => Quality::Major.seventh_intervals(false),
            other => other.seventh_intervals(false),
        }),
        Extension::Min9 => ninth_shell(match quality {
            Quality::Minor | Quality::Diminished => Quality::Minor.seventh_intervals(false),
            other => other.seventh_intervals(false),
        }),
        Extension::Dom9 => ninth_shell(Quality::Major.seventh_intervals(true)),
    };
    unique_pcs(pcs)
}

/// Remove repeated pitch classes, keeping first-seen order.
pub fn unique_pcs(pcs: impl IntoIterator<Item = u8>) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    for pc in pcs {
        let pc = pc % 12;
        if !out.contains(&pc) {
            out.push(pc);
        }
    }
    out
}

/// A tonic plus scale mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub tonic_pc: u8,
    pub mode: ScaleMode,
}

impl Key {
    pub fn new(tonic_pc: u8, mode: ScaleMode) -> Self {
        Key {
            tonic_pc: tonic_pc % 12,
            mode,
        }
    }

    /// Parse `"C#"` + `"dorian"`; either part may fail.
    pub fn parse(key_name: &str, mode_name: &str) -> Result<Self, ComposeError> {
        Ok(Key::new(parse_key(key_name)?, mode_name.parse()?))
    }

    pub fn scale_pcs(&self) -> [u8; 7] {
        self.mode.intervals().map(|iv| (self.tonic_pc + iv) % 12)
    }

    /// Pitch class of a 0-based scale degree (wraps every 7).
    pub fn degree_pc(&self, degree: usize) -> u8 {
        self.scale_pcs()[degree % 7]
    }

    /// Diatonic triad quality of a degree, from the scale's own thirds.
    pub fn degree_quality(&self, degree: usize) -> Quality {
        let iv = self.mode.intervals();
        let d = degree % 7;
        let third = (iv[(d + 2) % 7] + 12 - iv[d]) % 12;
        let fifth = (iv[(d + 4) % 7] + 12 - iv[d]) % 12;
        Quality::from_stack(third, fifth)
    }

    /// Roman label of a diatonic degree: case from quality, `°` for
    /// diminished, `+` for augmented.
    pub fn degree_label(&self, degree: usize) -> String {
        roman_label(degree, self.degree_quality(degree))
    }

    pub fn contains(&self, pc: u8) -> bool {
        self.scale_pcs().contains(&(pc % 12))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", NOTE_NAMES[self.tonic_pc as usize], self.mode.name())
    }
}

const ROMAN_UPPER: [&str; 7] = ["I", "II", "III", "IV", "V", "VI", "VII"];

/// Roman numeral for a 0-based degree with case and suffix from `quality`.
pub fn roman_label(degree: usize, quality: Quality) -> String {
    let base = ROMAN_UPPER[degree % 7];
    match quality {
        Quality::Major => base.to_string(),
        Quality::Minor => base.to_lowercase(),
        Quality::Diminished => format!("{}°", base.to_lowercase()),
        Quality::Augmented => format!("{base}+"),
    }
}

/// Coarse tonal role of a chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarmonicFunction {
    Tonic,
    Subdominant,
    Dominant,
    Other,
}

/// Classify a chord label.
///
/// Applied chords (`V/x`, `subV/x`) are dominant. Plain numerals map by
/// degree: I/III/VI tonic, II/IV subdominant, V/VII dominant. Chromatic
/// numerals (with `♭`/`b`/`#`) count as color, except `♭II` which acts as a
/// predominant. Unparsable labels fall back on quality: diminished chords are
/// dominant, everything else is other.
pub fn harmonic_function(label: &str, quality: Quality) -> HarmonicFunction {
    if label.contains('/') || label.starts_with("subV") {
        return HarmonicFunction::Dominant;
    }
    let accidental = label.starts_with(['♭', 'b', '#', '♯']);
    let numeral: String = label
        .trim_start_matches(['♭', 'b', '#', '♯'])
        .chars()
        .take_while(|c| matches!(c, 'i' | 'v' | 'I' | 'V'))
        .collect::<String>()
        .to_uppercase();
    let degree = ROMAN_UPPER.iter().position(|&r| r == numeral);
    match (accidental, degree) {
        (true, Some(1)) => HarmonicFunction::Subdominant,
        (true, _) => HarmonicFunction::Other,
        (false, Some(0 | 2 | 5)) => HarmonicFunction::Tonic,
        (false, Some(1 | 3)) => HarmonicFunction::Subdominant,
        (false, Some(4 | 6)) => HarmonicFunction::Dominant,
        _ if quality == Quality::Diminished => HarmonicFunction::Dominant,
        _ => HarmonicFunction::Other,
    }
}

/// An inclusive pitch window with a preferred center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    pub low: i32,
    pub high: i32,
    pub center: i32,
}

impl Register {
    pub const fn new(low: i32, high: i32, center: i32) -> Self {
        Register { low, high, center }
    }

    pub fn clamp(&self, pitch: i32) -> i32 {
        pitch.clamp(self.low, self.high)
    }

    pub fn contains(&self, pitch: i32) -> bool {
        (self.low..=self.high).contains(&pitch)
    }

    /// Window of `center ± half_width`, intersected with `self`.
    pub fn window(&self, center: i32, half_width: i32) -> Register {
        let center = self.clamp(center);
        Register {
            low: (center - half_width).max(self.low),
            high: (center + half_width).min(self.high),
            center,
        }
    }
}

/// All pitches in `low..=high` whose pitch class is in `pcs`, ascending.
pub fn tones_in_range(pcs: &[u8], low: i32, high: i32) -> Vec<i32> {
    (low..=high)
        .filter(|p| pcs.contains(&(p.rem_euclid(12) as u8)))
        .collect()
}

/// Scale tones of `key` in `low..=high`.
pub fn scale_tones_in_range(key: &Key, low: i32, high: i32) -> Vec<i32> {
    tones_in_range(&key.scale_pcs(), low, high)
}

/// Closest candidate to `target`; ties go to the earlier candidate. An empty
/// set yields `target` itself.
pub fn nearest_in_set(target: i32, choices: &[i32]) -> i32 {
    let mut best: Option<i32> = None;
    for &c in choices {
        match best {
            Some(b) if (c - target).abs() >= (b - target).abs() => {}
            _ => best = Some(c),
        }
    }
    best.unwrap_or(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_names() {
        assert_eq!(parse_key("C").unwrap(), 0);
        assert_eq!(parse_key("f#").unwrap(), 6);
        assert_eq!(parse_key("Bb").unwrap(), 10);
        assert_eq!(parse_key("E♭").unwrap(), 3);
        assert_eq!(parse_key("Cb").unwrap(), 11);
        assert!(matches!(parse_key("H"), Err(ComposeError::UnknownKey(_))));
        assert!(matches!(parse_key(""), Err(ComposeError::UnknownKey(_))));
        assert!(matches!(parse_key("C##"), Err(ComposeError::UnknownKey(_))));
    }

    #[test]
    fn parses_modes_with_aliases() {
        assert_eq!("Ionian".parse::<ScaleMode>().unwrap(), ScaleMode::Major);
        assert_eq!("natural_minor".parse::<ScaleMode>().unwrap(), ScaleMode::Minor);
        assert_eq!(" Harmonic  Minor ".parse::<ScaleMode>().unwrap(), ScaleMode::HarmonicMinor);
        assert!(matches!(
            "bebop".parse::<ScaleMode>(),
            Err(ComposeError::UnknownMode(_))
        ));
    }

    #[test]
    fn modal_rotations_match_known_scales() {
        assert_eq!(ScaleMode::Dorian.intervals(), [0, 2, 3, 5, 7, 9, 10]);
        assert_eq!(ScaleMode::Minor.intervals(), [0, 2, 3, 5, 7, 8, 10]);
        assert_eq!(ScaleMode::Lydian.intervals(), [0, 2, 4, 6, 7, 9, 11]);
        assert_eq!(ScaleMode::Locrian.intervals(), [0, 1, 3, 5, 6, 8, 10]);
    }

    #[test]
    fn diatonic_qualities_from_thirds() {
        let major = Key::new(0, ScaleMode::Major);
        let labels: Vec<String> = (0..7).map(|d| major.degree_label(d)).collect();
        assert_eq!(labels, ["I", "ii", "iii", "IV", "V", "vi", "vii°"]);

        let minor = Key::new(9, ScaleMode::Minor);
        let q: Vec<Quality> = (0..7).map(|d| minor.degree_quality(d)).collect();
        assert_eq!(
            q,
            [
                Quality::Minor,
                Quality::Diminished,
                Quality::Major,
                Quality::Minor,
                Quality::Minor,
                Quality::Major,
                Quality::Major
            ]
        );

        let harmonic = Key::new(0, ScaleMode::HarmonicMinor);
        assert_eq!(harmonic.degree_quality(2), Quality::Augmented);
        assert_eq!(harmonic.degree_quality(4), Quality::Major);
    }

    #[test]
    fn extension_pitch_classes() {
        let plain = ChordColor::default();
        assert_eq!(chord_pcs(0, Quality::Major, Extension::Triad, plain), vec![0, 4, 7]);
        assert_eq!(chord_pcs(0, Quality::Major, Extension::Sus4, plain), vec![0, 5, 7]);
        assert_eq!(chord_pcs(2, Quality::Minor, Extension::Add9, plain), vec![2, 5, 9, 4]);
        assert_eq!(chord_pcs(11, Quality::Diminished, Extension::Seventh, plain), vec![11, 2, 5, 9]);
        let dom = ChordColor { dominant_seventh: true, thirteenth: false };
        assert_eq!(chord_pcs(7, Quality::Major, Extension::Seventh, dom), vec![7, 11, 2, 5]);
        let lush = ChordColor { dominant_seventh: false, thirteenth: true };
        assert_eq!(chord_pcs(7, Quality::Major, Extension::Dom9, lush), vec![7, 11, 5, 9, 4]);
        assert_eq!(chord_pcs(9, Quality::Minor, Extension::Maj9, plain), vec![9, 0, 7, 11]);
    }

    #[test]
    fn functions_by_label() {
        assert_eq!(harmonic_function("V", Quality::Major), HarmonicFunction::Dominant);
        assert_eq!(harmonic_function("V/V", Quality::Major), HarmonicFunction::Dominant);
        assert_eq!(harmonic_function("subV/V", Quality::Major), HarmonicFunction::Dominant);
        assert_eq!(harmonic_function("vi", Quality::Minor), HarmonicFunction::Tonic);
        assert_eq!(harmonic_function("iv", Quality::Minor), HarmonicFunction::Subdominant);
        assert_eq!(harmonic_function("vii°", Quality::Diminished), HarmonicFunction::Dominant);
        assert_eq!(harmonic_function("♭VII", Quality::Major), HarmonicFunction::Other);
        assert_eq!(harmonic_function("♭II", Quality::Major), HarmonicFunction::Subdominant);
        assert_eq!(harmonic_function("?", Quality::Diminished), HarmonicFunction::Dominant);
    }

    #[test]
    fn nearest_prefers_first_on_tie() {
        assert_eq!(nearest_in_set(60, &[59, 61]), 59);
        assert_eq!(nearest_in_set(60, &[62, 58]), 62);
        assert_eq!(nearest_in_set(60, &[]), 60);
        assert_eq!(tones_in_range(&[0, 7], 55, 67), vec![55, 60, 67]);
    }

    #[test]
    fn register_window_stays_inside() {
        let r = Register::new(55, 96, 72);
        let w = r.window(90, 12);
        assert_eq!((w.low, w.high, w.center), (78, 96, 90));
        let w = r.window(40, 8);
        assert_eq!((w.low, w.high, w.center), (55, 63, 55));
        assert_eq!(r.clamp(120), 96);
    }

    #[test]
    fn pitch_names() {
        assert_eq!(pitch_name(60), "C4");
        assert_eq!(pitch_name(61), "C#4");
        assert_eq!(pitch_name(21), "A0");
    }
}
