// Chord-template libraries and the chord-token grammar.
//
// A template is a short loop of chord tokens (usually four, one per bar of a
// phrase) plus descriptive tags the planner weighs when choosing a template
// for each section. Tokens form a closed set:
//
// - `Degree(n)`: diatonic triad on 0-based scale degree `n`
// - `Borrowed(..)`: fixed modal-mixture chords (♭VII, ♭VI, ♭III, ♭II, iv)
// - `SecondaryDominant(t)`: the major chord a fifth above `t`'s root
// - `TritoneSub(t)`: the major chord a semitone above `t`'s root
// - `Roman { .. }`: free roman numeral with accidental and case
//
// Tokens print to and parse from short strings (`"4"`, `"bVII"`, `"iv"`,
// `"V/V"`, `"subV/ii"`, `"#iv"`, `"vii°"`) so templates can be written in
// JSON. Resolution to actual pitch classes lives in harmony.rs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::controls::Style;
use crate::error::ComposeError;
use crate::theory::ScaleMode;

/// Fixed borrowed chords from the parallel minor (or Phrygian, for ♭II).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BorrowedChord {
    FlatSeven,
    FlatSix,
    FlatThree,
    FlatTwo,
    MinorFour,
}

impl BorrowedChord {
    pub fn name(self) -> &'static str {
        match self {
            BorrowedChord::FlatSeven => "bVII",
            BorrowedChord::FlatSix => "bVI",
            BorrowedChord::FlatThree => "bIII",
            BorrowedChord::FlatTwo => "bII",
            BorrowedChord::MinorFour => "iv",
        }
    }

    fn from_name(s: &str) -> Option<Self> {
        let chord = match s {
            "bVII" | "♭VII" => BorrowedChord::FlatSeven,
            "bVI" | "♭VI" => BorrowedChord::FlatSix,
            "bIII" | "♭III" => BorrowedChord::FlatThree,
            "bII" | "♭II" => BorrowedChord::FlatTwo,
            "iv" => BorrowedChord::MinorFour,
            _ => return None,
        };
        Some(chord)
    }
}

/// A free roman numeral: `accidental` in semitones, `degree` 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RomanNumeral {
    pub accidental: i8,
    pub degree: u8,
    pub uppercase: bool,
    pub diminished: bool,
}

/// One chord slot in a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChordToken {
    Degree(u8),
    Borrowed(BorrowedChord),
    SecondaryDominant(Box<ChordToken>),
    TritoneSub(Box<ChordToken>),
    Roman(RomanNumeral),
}

impl ChordToken {
    pub fn dominant_of(target: ChordToken) -> ChordToken {
        ChordToken::SecondaryDominant(Box::new(target))
    }

    pub fn tritone_sub_of(target: ChordToken) -> ChordToken {
        ChordToken::TritoneSub(Box::new(target))
    }
}

const ROMANS: [&str; 7] = ["I", "II", "III", "IV", "V", "VI", "VII"];

fn parse_roman(s: &str) -> Option<RomanNumeral> {
    let mut accidental: i8 = 0;
    let mut rest = s;
    loop {
        if let Some(r) = rest.strip_prefix(['b', '♭']) {
            accidental -= 1;
            rest = r;
        } else if let Some(r) = rest.strip_prefix(['#', '♯']) {
            accidental += 1;
            rest = r;
        } else {
            break;
        }
    }
    let (body, diminished) = match rest.strip_suffix(['°', 'o']) {
        Some(b) => (b, true),
        None => (rest, false),
    };
    if body.is_empty() || body.len() > 4 || !body.chars().all(|c| matches!(c, 'i' | 'v' | 'I' | 'V')) {
        return None;
    }
    let uppercase = body.chars().all(|c| c.is_ascii_uppercase());
    let lowercase = body.chars().all(|c| c.is_ascii_lowercase());
    if !uppercase && !lowercase {
        return None;
    }
    let upper = body.to_ascii_uppercase();
    let degree = ROMANS.iter().position(|&r| r == upper)? as u8;
    Some(RomanNumeral {
        accidental,
        degree,
        uppercase,
        diminished,
    })
}

impl FromStr for ChordToken {
    type Err = ComposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if let Some(target) = t.strip_prefix("subV/") {
            return Ok(ChordToken::tritone_sub_of(target.parse()?));
        }
        if let Some(target) = t.strip_prefix("V/") {
            return Ok(ChordToken::dominant_of(target.parse()?));
        }
        if let Ok(n) = t.parse::<u8>() {
            return Ok(ChordToken::Degree(n));
        }
        if let Some(b) = BorrowedChord::from_name(t) {
            return Ok(ChordToken::Borrowed(b));
        }
        parse_roman(t)
            .map(ChordToken::Roman)
            .ok_or_else(|| ComposeError::InvalidToken(s.to_string()))
    }
}

impl fmt::Display for ChordToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChordToken::Degree(n) => write!(f, "{n}"),
            ChordToken::Borrowed(b) => f.write_str(b.name()),
            ChordToken::SecondaryDominant(t) => write!(f, "V/{t}"),
            ChordToken::TritoneSub(t) => write!(f, "subV/{t}"),
            ChordToken::Roman(r) => {
                let sign = if r.accidental < 0 { "b" } else { "#" };
                for _ in 0..r.accidental.unsigned_abs() {
                    f.write_str(sign)?;
                }
                let numeral = ROMANS[r.degree as usize % 7];
                if r.uppercase {
                    f.write_str(numeral)?;
                } else {
                    f.write_str(&numeral.to_lowercase())?;
                }
                if r.diminished {
                    f.write_str("°")?;
                }
                Ok(())
            }
        }
    }
}

impl TryFrom<String> for ChordToken {
    type Error = ComposeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ChordToken> for String {
    fn from(t: ChordToken) -> String {
        t.to_string()
    }
}

/// Descriptive tags the planner's section weighting keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateTag {
    Pop,
    Jazz,
    Classical,
    Anthem,
    Classic,
    Uplift,
    Simple,
    Rockish,
    Functional,
    Smooth,
    Forward,
    Mixture,
    Moody,
    Arena,
    Lift,
    Turnaround,
    Cycle,
    Cadence,
    Color,
    Cadential,
    Sequence,
}

/// A named loop of chord tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordTemplate {
    pub name: String,
    pub tokens: Vec<ChordToken>,
    pub tags: Vec<TemplateTag>,
}

impl ChordTemplate {
    pub fn new(name: &str, tokens: Vec<ChordToken>, tags: &[TemplateTag]) -> Self {
        ChordTemplate {
            name: name.to_string(),
            tokens,
            tags: tags.to_vec(),
        }
    }

    pub fn has_tag(&self, tag: TemplateTag) -> bool {
        self.tags.contains(&tag)
    }

    /// Token for a bar at `position` within its phrase (wraps).
    pub fn token_at(&self, position: usize) -> ChordToken {
        if self.tokens.is_empty() {
            return ChordToken::Degree(0);
        }
        self.tokens[position % self.tokens.len()].clone()
    }

    /// The tonic loop used when a library comes back empty.
    pub fn tonic_fallback() -> Self {
        ChordTemplate::new(
            "I-IV-V-I",
            vec![d(0), d(3), d(4), d(0)],
            &[TemplateTag::Simple],
        )
    }
}

fn d(n: u8) -> ChordToken {
    ChordToken::Degree(n)
}

fn borrowed(b: BorrowedChord) -> ChordToken {
    ChordToken::Borrowed(b)
}

fn pop_library() -> Vec<ChordTemplate> {
    use BorrowedChord::*;
    use TemplateTag::*;
    vec![
        ChordTemplate::new("I-V-vi-IV", vec![d(0), d(4), d(5), d(3)], &[Pop, Anthem]),
        ChordTemplate::new("I-vi-IV-V", vec![d(0), d(5), d(3), d(4)], &[Pop, Classic]),
        ChordTemplate::new("vi-IV-I-V", vec![d(5), d(3), d(0), d(4)], &[Pop, Uplift]),
        ChordTemplate::new("IV-V-I-I", vec![d(3), d(4), d(0), d(0)], &[Pop, Simple]),
        ChordTemplate::new("I-IV-V-IV", vec![d(0), d(3), d(4), d(3)], &[Pop, Rockish]),
        ChordTemplate::new("ii-V-I-vi", vec![d(1), d(4), d(0), d(5)], &[Functional, Smooth]),
        ChordTemplate::new("I-iii-IV-V", vec![d(0), d(2), d(3), d(4)], &[Pop, Forward]),
        ChordTemplate::new(
            "I-bVII-IV-I",
            vec![d(0), borrowed(FlatSeven), d(3), d(0)],
            &[Mixture, Rockish],
        ),
        ChordTemplate::new(
            "I-iv-bVII-IV",
            vec![d(0), borrowed(MinorFour), borrowed(FlatSeven), d(3)],
            &[Mixture, Moody],
        ),
        ChordTemplate::new(
            "vi-bVII-I-IV",
            vec![d(5), borrowed(FlatSeven), d(0), d(3)],
            &[Mixture, Arena],
        ),
        ChordTemplate::new(
            "I-IV-V-V/V",
            vec![d(0), d(3), d(4), ChordToken::dominant_of(d(4))],
            &[Functional, Lift],
        ),
    ]
}

fn jazz_library() -> Vec<ChordTemplate> {
    use TemplateTag::*;
    vec![
        ChordTemplate::new("ii-V-I-vi", vec![d(1), d(4), d(0), d(5)], &[Jazz, Functional, Smooth]),
        ChordTemplate::new("I-vi-ii-V", vec![d(0), d(5), d(1), d(4)], &[Jazz, Turnaround, Functional]),
        ChordTemplate::new("iii-vi-ii-V", vec![d(2), d(5), d(1), d(4)], &[Jazz, Cycle, Smooth]),
        ChordTemplate::new("ii-V-I-IV", vec![d(1), d(4), d(0), d(3)], &[Jazz, Cadence]),
        ChordTemplate::new(
            "I-vi-ii-V/V",
            vec![d(0), d(5), d(1), ChordToken::dominant_of(d(4))],
            &[Jazz, Color, Functional],
        ),
    ]
}

fn classical_library() -> Vec<ChordTemplate> {
    use TemplateTag::*;
    vec![
        ChordTemplate::new(
            "I-IV-V-I",
            vec![d(0), d(3), d(4), d(0)],
            &[Classical, Cadential, Classic, Simple],
        ),
        ChordTemplate::new("I-vi-ii-V", vec![d(0), d(5), d(1), d(4)], &[Classical, Functional, Cadential]),
        ChordTemplate::new("I-ii-V-I", vec![d(0), d(1), d(4), d(0)], &[Classical, Cadential, Classic]),
        ChordTemplate::new("I-V-vi-iii", vec![d(0), d(4), d(5), d(2)], &[Classical, Sequence]),
        ChordTemplate::new("vi-ii-V-I", vec![d(5), d(1), d(4), d(0)], &[Classical, Cadential]),
        ChordTemplate::new("I-IV-ii-V", vec![d(0), d(3), d(1), d(4)], &[Classical, Functional]),
    ]
}

/// Template library for a style. Outside plain major, mixture-tagged
/// templates are removed since their borrowed chords are already diatonic
/// or clash with the mode.
pub fn library(style: Style, mode: ScaleMode) -> Vec<ChordTemplate> {
    let all = match style {
        Style::Pop => pop_library(),
        Style::Jazz => jazz_library(),
        Style::Classical => classical_library(),
    };
    if mode.is_major() {
        all
    } else {
        all.into_iter()
            .filter(|t| !t.has_tag(TemplateTag::Mixture))
            .collect()
    }
}
