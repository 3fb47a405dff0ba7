// Chords-first harmonic generation.
//
// Walks the plan bar by bar and turns each section's chord template into
// `ChordSegment`s: half-open step spans inside a bar, each with a resolved
// root, quality, extension, and pitch-class set. Every bar's segments are
// contiguous and cover steps 0..16 exactly, in one of four shapes:
//
// - final cadence (last bar, cadence strength >= 0.45): V-I or IV-I, 8+8
// - turnaround (non-final phrase end): template chord 12 steps, then a
//   dominant push for 4 steps
// - split: template chord 8 steps, then motion toward the next token
// - whole bar: one template chord
//
// Modal mixture may swap a diatonic chord for a borrowed one in major keys.
// Cadence and turnaround pushes are forced and never substituted.
//
// Token resolution (`resolve_token`) is one recursive function over the
// closed `ChordToken` variant. The chord stage draws from its own random
// stream; see `Stage::Chords`.

use moodscore_prng::ScoreRng;
use serde::{Deserialize, Serialize};

use crate::controls::Controls;
use crate::plan::{BarModifier, SectionKind, SongPlan};
use crate::templates::{BorrowedChord, ChordToken, RomanNumeral};
use crate::theory::{
    ChordColor, Extension, HarmonicFunction, Key, Quality, chord_pcs, harmonic_function,
};
use crate::timing::STEPS_PER_BAR;
use crate::util::{clamp01, lerp};

/// Final-bar cadences are forced at or above this cadence strength.
pub const CADENCE_FORCE_THRESHOLD: f64 = 0.45;

/// A chord spanning steps `start_step..end_step` of one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordSegment {
    pub bar: usize,
    pub start_step: u32,
    pub end_step: u32,
    pub label: String,
    pub root_pc: u8,
    pub quality: Quality,
    pub extension: Extension,
    pub pcs: Vec<u8>,
    pub borrowed: bool,
    pub section: SectionKind,
    pub template: String,
    pub function: HarmonicFunction,
}

impl ChordSegment {
    pub fn contains_step(&self, step: u32) -> bool {
        self.start_step <= step && step < self.end_step
    }
}

/// A token resolved against a key, before extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChord {
    pub root_pc: u8,
    pub quality: Quality,
    pub label: String,
    pub borrowed: bool,
}

/// Resolve a chord token in `key`.
///
/// Applied chords resolve their target first: `V/x` sits a fifth above
/// `x`'s root, `subV/x` a semitone above, both major and borrowed. Free
/// roman numerals take quality from case (or `°`), honor a diatonic
/// diminished degree, shift by accidentals, and count as borrowed when the
/// result differs from the diatonic chord.
pub fn resolve_token(key: &Key, token: &ChordToken) -> ResolvedChord {
    let tonic = key.tonic_pc;
    let at = |semis: u8| (tonic + semis) % 12;
    match token {
        ChordToken::Degree(n) => {
            let degree = *n as usize % 7;
            ResolvedChord {
                root_pc: key.degree_pc(degree),
                quality: key.degree_quality(degree),
                label: key.degree_label(degree),
                borrowed: false,
            }
        }
        ChordToken::SecondaryDominant(target) | ChordToken::TritoneSub(target) => {
            let inner = resolve_token(key, target);
            let tritone = matches!(token, ChordToken::TritoneSub(_));
            let (offset, prefix) = if tritone { (1, "subV") } else { (7, "V") };
            ResolvedChord {
                root_pc: (inner.root_pc + offset) % 12,
                quality: Quality::Major,
                label: format!("{prefix}/{}", inner.label),
                borrowed: true,
            }
        }
        ChordToken::Borrowed(b) => {
            let (root_pc, quality, label) = match b {
                BorrowedChord::FlatSeven => (at(10), Quality::Major, "♭VII"),
                BorrowedChord::FlatSix => (at(8), Quality::Major, "♭VI"),
                BorrowedChord::FlatThree => (at(3), Quality::Major, "♭III"),
                BorrowedChord::FlatTwo => (at(1), Quality::Major, "♭II"),
                BorrowedChord::MinorFour => (key.degree_pc(3), Quality::Minor, "iv"),
            };
            ResolvedChord {
                root_pc,
                quality,
                label: label.to_string(),
                borrowed: true,
            }
        }
        ChordToken::Roman(r) => resolve_roman(key, r, &token.to_string()),
    }
}

fn resolve_roman(key: &Key, r: &RomanNumeral, label: &str) -> ResolvedChord {
    let degree = r.degree as usize % 7;
    let root_pc = (i32::from(key.degree_pc(degree)) + i32::from(r.accidental)).rem_euclid(12) as u8;
    let diatonic = key.degree_quality(degree);
    let quality = if r.diminished || diatonic == Quality::Diminished {
        Quality::Diminished
    } else if r.uppercase {
        Quality::Major
    } else {
        Quality::Minor
    };
    ResolvedChord {
        root_pc,
        quality,
        label: label.to_string(),
        borrowed: r.accidental != 0 || quality != diatonic,
    }
}

/// Labels that take dominant extensions (7 / dom9).
fn is_dominant_label(label: &str) -> bool {
    label.starts_with('V') || label.starts_with("subV")
}

fn roman(degree: u8) -> ChordToken {
    ChordToken::Roman(RomanNumeral {
        accidental: 0,
        degree,
        uppercase: true,
        diminished: false,
    })
}

/// The first segment containing `step`, else the bar's first segment.
pub fn segment_for_step(segments: &[ChordSegment], step: u32) -> Option<&ChordSegment> {
    segments
        .iter()
        .find(|s| s.contains_step(step))
        .or_else(|| segments.first())
}

/// Segments belonging to `bar`, assuming `segments` is in bar order.
pub fn segments_in_bar(segments: &[ChordSegment], bar: usize) -> &[ChordSegment] {
    let start = segments.partition_point(|s| s.bar < bar);
    let end = segments.partition_point(|s| s.bar <= bar);
    &segments[start..end]
}

struct ChordBuilder<'a> {
    controls: &'a Controls,
}

/// How a segment came to be, which gates modal mixture.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Origin {
    Template,
    Forced,
}

impl ChordBuilder<'_> {
    #[allow(clippy::too_many_arguments)]
    fn segment(
        &self,
        rng: &mut ScoreRng,
        bar: usize,
        modifier: &BarModifier,
        span: (u32, u32),
        token: &ChordToken,
        origin: Origin,
        template: &str,
    ) -> ChordSegment {
        let d = &self.controls.derived;
        let key = &self.controls.key;
        let complexity = clamp01(d.chord_complexity * modifier.chord_mul);
        let mut chord = resolve_token(key, token);

        if key.mode.is_major() && origin == Origin::Template && !chord.borrowed {
            let mut mixture = clamp01(lerp(0.0, 0.12, complexity) * lerp(0.25, 1.0, d.variation));
            mixture *= match modifier.section {
                SectionKind::Bridge | SectionKind::Chorus => 1.05,
                _ => 0.80,
            };
            if rng.random_bool(mixture) {
                let choice = rng.pick_from(&[
                    (BorrowedChord::FlatSeven, 0.45),
                    (BorrowedChord::MinorFour, 0.26),
                    (BorrowedChord::FlatSix, 0.12),
                    (BorrowedChord::FlatThree, 0.10),
                    (BorrowedChord::FlatTwo, 0.07),
                ]);
                chord = resolve_token(key, &ChordToken::Borrowed(choice));
            }
        }

        let extension = self.choose_extension(rng, complexity, modifier.section, &chord.label);
        let dominant_label = is_dominant_label(&chord.label);
        let color = ChordColor {
            dominant_seventh: extension == Extension::Seventh
                && key.mode.is_major()
                && dominant_label
                && rng.random_bool(0.80),
            thirteenth: match extension {
                Extension::Maj9 => rng.random_bool(0.20),
                Extension::Min9 => rng.random_bool(0.15),
                Extension::Dom9 => rng.random_bool(0.25),
                _ => false,
            },
        };
        let pcs = chord_pcs(chord.root_pc, chord.quality, extension, color);
        let function = harmonic_function(&chord.label, chord.quality);

        ChordSegment {
            bar,
            start_step: span.0,
            end_step: span.1,
            label: chord.label,
            root_pc: chord.root_pc,
            quality: chord.quality,
            extension,
            pcs,
            borrowed: chord.borrowed,
            section: modifier.section,
            template: template.to_string(),
            function,
        }
    }

    fn choose_extension(
        &self,
        rng: &mut ScoreRng,
        complexity: f64,
        section: SectionKind,
        label: &str,
    ) -> Extension {
        let c = if section == SectionKind::Chorus {
            clamp01(complexity * 1.15)
        } else {
            complexity
        };
        if c < 0.25 {
            rng.pick_from(&[
                (Extension::Triad, 0.70),
                (Extension::Sus2, 0.15),
                (Extension::Sus4, 0.15),
            ])
        } else if c < 0.55 {
            rng.pick_from(&[
                (Extension::Triad, 0.30),
                (Extension::Add9, 0.45),
                (Extension::Sus2, 0.10),
                (Extension::Sus4, 0.10),
                (Extension::Seventh, 0.05),
            ])
        } else if c < 0.80 {
            rng.pick_from(&[
                (Extension::Triad, 0.18),
                (Extension::Add9, 0.30),
                (Extension::Seventh, 0.32),
                (Extension::Sus4, 0.10),
                (Extension::Maj9, 0.05),
                (Extension::Min9, 0.05),
            ])
        } else if is_dominant_label(label) {
            rng.pick_from(&[
                (Extension::Seventh, 0.45),
                (Extension::Dom9, 0.40),
                (Extension::Add9, 0.10),
                (Extension::Sus4, 0.05),
            ])
        } else {
            rng.pick_from(&[
                (Extension::Seventh, 0.30),
                (Extension::Maj9, 0.30),
                (Extension::Min9, 0.20),
                (Extension::Add9, 0.15),
                (Extension::Sus2, 0.05),
            ])
        }
    }
}

/// Build every bar's chord segments, in bar order.
pub fn generate_chords(controls: &Controls, plan: &SongPlan, rng: &mut ScoreRng) -> Vec<ChordSegment> {
    let d = &controls.derived;
    let key = &controls.key;
    let builder = ChordBuilder { controls };
    let length = plan.length_bars();
    let half = STEPS_PER_BAR / 2;
    let base_two = clamp01(lerp(0.06, 0.40, d.density * 0.55 + d.variation * 0.45));

    let mut segments = Vec::with_capacity(length * 2);
    for (bar, modifier) in plan.bar_modifiers.iter().enumerate() {
        let template = plan.templates.get(modifier.section);
        let position = bar % plan.phrase_len_bars.max(1);
        let token = template.token_at(position);
        let is_last = plan.is_last_bar(bar);

        let turnaround = modifier.is_phrase_end
            && !is_last
            && rng.random_bool(clamp01(lerp(0.20, 0.75, d.cadence_strength)));

        if is_last && d.cadence_strength >= CADENCE_FORCE_THRESHOLD {
            let approach = if rng.random_bool(0.75) {
                roman(4)
            } else {
                ChordToken::Degree(3)
            };
            for (span, tok) in [((0, half), approach), ((half, STEPS_PER_BAR), ChordToken::Degree(0))] {
                segments.push(builder.segment(rng, bar, modifier, span, &tok, Origin::Forced, &template.name));
            }
            continue;
        }

        let mut two_prob = base_two;
        match modifier.section {
            SectionKind::Chorus => two_prob = clamp01(two_prob * 1.25),
            SectionKind::Intro | SectionKind::Outro => two_prob = clamp01(two_prob * 0.85),
            _ => {}
        }

        if turnaround {
            let push = if key.mode.is_major() {
                rng.pick_from(&[(0u8, 0.26), (1, 0.10), (2, 0.64)])
            } else {
                2
            };
            let push = match push {
                0 => ChordToken::dominant_of(ChordToken::Degree(4)),
                1 => ChordToken::tritone_sub_of(ChordToken::Degree(4)),
                _ => roman(4),
            };
            let tag = format!("{}|turnaround", template.name);
            let push_start = STEPS_PER_BAR - 4;
            segments.push(builder.segment(rng, bar, modifier, (0, push_start), &token, Origin::Template, &tag));
            segments.push(builder.segment(rng, bar, modifier, (push_start, STEPS_PER_BAR), &push, Origin::Forced, &tag));
            continue;
        }

        if rng.random_bool(two_prob) {
            let following = template.token_at(position + 1);
            let next = if rng.random_bool(lerp(0.18, 0.42, d.energy)) {
                ChordToken::Degree(4)
            } else if key.mode.is_major()
                && rng.random_bool(lerp(0.0, 0.35, d.secondary.chromaticism))
            {
                ChordToken::dominant_of(following)
            } else {
                following
            };
            segments.push(builder.segment(rng, bar, modifier, (0, half), &token, Origin::Template, &template.name));
            segments.push(builder.segment(rng, bar, modifier, (half, STEPS_PER_BAR), &next, Origin::Template, &template.name));
        } else {
            segments.push(builder.segment(rng, bar, modifier, (0, STEPS_PER_BAR), &token, Origin::Template, &template.name));
        }
    }

    tracing::debug!(bars = length, segments = segments.len(), "built chord segments");
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{Stage, StyleMoodControls};
    use crate::plan::plan_song;
    use crate::theory::ScaleMode;

    fn c_major() -> Key {
        Key::new(0, ScaleMode::Major)
    }

    #[test]
    fn resolves_degrees_and_borrowed() {
        let key = c_major();
        let v = resolve_token(&key, &ChordToken::Degree(4));
        assert_eq!((v.root_pc, v.quality, v.label.as_str(), v.borrowed), (7, Quality::Major, "V", false));
        let b7 = resolve_token(&key, &"bVII".parse().unwrap());
        assert_eq!((b7.root_pc, b7.label.as_str(), b7.borrowed), (10, "♭VII", true));
        let iv = resolve_token(&key, &"iv".parse().unwrap());
        assert_eq!((iv.root_pc, iv.quality), (5, Quality::Minor));
    }

    #[test]
    fn resolves_applied_chords_recursively() {
        let key = c_major();
        let vv = resolve_token(&key, &"V/V".parse().unwrap());
        assert_eq!((vv.root_pc, vv.label.as_str()), (2, "V/V"));
        let sub = resolve_token(&key, &"subV/V".parse().unwrap());
        assert_eq!((sub.root_pc, sub.label.as_str()), (8, "subV/V"));
        let nested = resolve_token(&key, &"V/V/V".parse().unwrap());
        assert_eq!(nested.root_pc, 9);
        let of_degree = resolve_token(&key, &"V/5".parse().unwrap());
        assert_eq!((of_degree.root_pc, of_degree.label.as_str()), (4, "V/vi"));
    }

    #[test]
    fn resolves_roman_numerals() {
        let key = c_major();
        let sharp_iv = resolve_token(&key, &"#iv".parse().unwrap());
        assert_eq!((sharp_iv.root_pc, sharp_iv.quality, sharp_iv.borrowed), (6, Quality::Minor, true));
        // vii is diminished in major even without the mark.
        let vii = resolve_token(&key, &"vii".parse().unwrap());
        assert_eq!((vii.quality, vii.borrowed), (Quality::Diminished, false));
        let big_ii = resolve_token(&key, &"II".parse().unwrap());
        assert_eq!((big_ii.root_pc, big_ii.quality, big_ii.borrowed), (2, Quality::Major, true));
    }

    fn plan_and_chords(length: i64, seed: u64, mood: &StyleMoodControls, key: Key) -> (Controls, SongPlan, Vec<ChordSegment>) {
        let c = Controls::new(length, 120, key, seed, mood).unwrap();
        let plan = plan_song(&c, &mut c.stage_rng(Stage::Plan));
        let chords = generate_chords(&c, &plan, &mut c.stage_rng(Stage::Chords));
        (c, plan, chords)
    }

    #[test]
    fn bars_are_covered_exactly() {
        for seed in 0..30 {
            let mood = StyleMoodControls {
                intensity: (seed % 5) as f64 / 4.0,
                complexity: (seed % 3) as f64 / 2.0,
                ..StyleMoodControls::default()
            };
            let (_, plan, chords) = plan_and_chords(13, seed, &mood, c_major());
            for bar in 0..plan.length_bars() {
                let segs = segments_in_bar(&chords, bar);
                assert!(!segs.is_empty());
                assert_eq!(segs[0].start_step, 0);
                assert_eq!(segs.last().unwrap().end_step, 16);
                for w in segs.windows(2) {
                    assert_eq!(w[0].end_step, w[1].start_step);
                }
                for s in segs {
                    assert!(s.start_step < s.end_step);
                    let mut seen = s.pcs.clone();
                    seen.sort_unstable();
                    seen.dedup();
                    assert_eq!(seen.len(), s.pcs.len(), "duplicate pcs in {s:?}");
                    assert!(s.pcs.iter().all(|&pc| pc < 12));
                }
            }
        }
    }

    #[test]
    fn final_bar_cadence_is_forced() {
        let mood = StyleMoodControls { intensity: 0.9, ..StyleMoodControls::default() };
        for seed in 0..25 {
            let (c, _, chords) = plan_and_chords(8, seed, &mood, c_major());
            assert!(c.derived.cadence_strength >= CADENCE_FORCE_THRESHOLD);
            let last = segments_in_bar(&chords, 7);
            assert_eq!(last.len(), 2);
            assert_eq!((last[0].start_step, last[0].end_step), (0, 8));
            assert_eq!((last[1].start_step, last[1].end_step), (8, 16));
            assert!(matches!(last[0].label.as_str(), "V" | "IV"), "{}", last[0].label);
            assert_eq!(last[1].label, "I");
            assert_eq!(last[1].root_pc, 0);
            assert!(matches!(last[0].root_pc, 7 | 5));
        }
    }

    #[test]
    fn minor_keys_skip_mixture_and_use_major_dominant() {
        let mood = StyleMoodControls { complexity: 1.0, intensity: 1.0, ..StyleMoodControls::default() };
        for seed in 0..10 {
            let (_, _, chords) = plan_and_chords(16, seed, &mood, Key::new(9, ScaleMode::Minor));
            for s in &chords {
                assert!(!s.label.starts_with('♭'));
                if s.label == "V" {
                    assert_eq!(s.quality, Quality::Major);
                    assert_eq!(s.root_pc, 4);
                }
            }
        }
    }

    #[test]
    fn segment_lookup() {
        let (_, _, chords) = plan_and_chords(4, 3, &StyleMoodControls::default(), c_major());
        let bar0 = segments_in_bar(&chords, 0);
        let s = segment_for_step(bar0, 15).unwrap();
        assert!(s.contains_step(15));
        assert!(segment_for_step(&[], 0).is_none());
        assert!(segments_in_bar(&chords, 99).is_empty());
    }
}
