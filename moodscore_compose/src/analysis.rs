// Post-hoc analysis of a rendered song.
//
// Everything here reads finished output (chord segments and note lists) and
// never feeds back into generation. Used by the JSON report.

use serde::Serialize;

use crate::events::NoteEvent;
use crate::harmony::ChordSegment;
use crate::theory::{Key, Quality, pitch_name, roman_label};
use crate::timing::step_of_tick_in_bar;

/// Nearest scale degree of `root_pc` and its signed offset (-5..=6).
/// A root halfway between two degrees is spelled as the flattened upper one.
fn degree_with_accidental(key: &Key, root_pc: u8) -> (usize, i32) {
    let mut best = (0, 0);
    let mut best_abs = i32::MAX;
    for (degree, pc) in key.scale_pcs().into_iter().enumerate() {
        let mut diff = (i32::from(root_pc) - i32::from(pc)).rem_euclid(12);
        if diff > 6 {
            diff -= 12;
        }
        if diff.abs() < best_abs || (diff.abs() == best_abs && diff < 0) {
            best_abs = diff.abs();
            best = (degree, diff);
        }
    }
    best
}

/// Roman numeral of a chord in `key`, with `b`/`#` for chromatic roots.
pub fn roman_numeral(key: &Key, root_pc: u8, quality: Quality) -> String {
    let (degree, accidental) = degree_with_accidental(key, root_pc);
    let numeral = roman_label(degree, quality);
    let sign = if accidental < 0 { "b" } else { "#" };
    format!("{}{numeral}", sign.repeat(accidental.unsigned_abs() as usize))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    #[serde(rename = "ii-V-I")]
    TwoFiveOne,
    Authentic,
    Plagal,
}

/// Cadence formed by the last chords of `chords`, judged by root degree.
pub fn detect_cadence(key: &Key, chords: &[ChordSegment]) -> Option<Cadence> {
    let degrees: Vec<usize> = chords
        .iter()
        .map(|c| degree_with_accidental(key, c.root_pc).0)
        .collect();
    match degrees.as_slice() {
        [.., 1, 4, 0] => Some(Cadence::TwoFiveOne),
        [.., 4, 0] => Some(Cadence::Authentic),
        [.., 3, 0] => Some(Cadence::Plagal),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrooveType {
    Silence,
    OnBeat,
    Offbeat,
    Straight,
    Syncopated,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RhythmAnalysis {
    pub syncopation: f64,
    /// Onsets per bar.
    pub density: f64,
    pub groove_type: GrooveType,
}

/// Classify onset placement on the 16-step grid.
pub fn analyze_rhythm(onsets: &[u32], total_bars: usize) -> RhythmAnalysis {
    if onsets.is_empty() || total_bars == 0 {
        return RhythmAnalysis {
            syncopation: 0.0,
            density: 0.0,
            groove_type: GrooveType::Silence,
        };
    }
    let steps: Vec<u32> = onsets.iter().map(|&t| step_of_tick_in_bar(t)).collect();
    let total = steps.len() as f64;
    let strong = steps.iter().filter(|&&s| matches!(s, 0 | 4 | 8 | 12)).count();
    let offbeat = steps.iter().filter(|&&s| matches!(s, 2 | 6 | 10 | 14)).count();
    let weak = steps.len() - strong - offbeat;
    let even = steps.iter().filter(|&&s| s % 2 == 0).count();

    let ratio = |n: usize| n as f64 / total;
    let groove_type = if ratio(strong) >= 0.6 {
        GrooveType::OnBeat
    } else if ratio(offbeat) >= 0.6 && strong == 0 {
        GrooveType::Offbeat
    } else if ratio(even) >= 0.85 && strong > 0 && offbeat > 0 {
        GrooveType::Straight
    } else if ratio(weak) >= 0.35 {
        GrooveType::Syncopated
    } else {
        GrooveType::Mixed
    };

    RhythmAnalysis {
        syncopation: ((offbeat as f64 + 1.5 * weak as f64) / total).clamp(0.0, 1.0),
        density: total / total_bars as f64,
        groove_type,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MelodicContour {
    Silence,
    Static,
    Ascending,
    Descending,
    Arch,
    Valley,
    Mixed,
}

fn contour_of(pitches: &[u8]) -> MelodicContour {
    if pitches.len() < 2 {
        return MelodicContour::Static;
    }
    let deltas: Vec<i32> = pitches
        .windows(2)
        .map(|w| i32::from(w[1]) - i32::from(w[0]))
        .collect();
    if deltas.iter().all(|&d| d >= 0) && deltas.iter().any(|&d| d > 0) {
        return MelodicContour::Ascending;
    }
    if deltas.iter().all(|&d| d <= 0) && deltas.iter().any(|&d| d < 0) {
        return MelodicContour::Descending;
    }
    let last = pitches.len() - 1;
    let (first_p, last_p) = (pitches[0], pitches[last]);
    let (max_i, &max_p) = pitches
        .iter()
        .enumerate()
        .fold((0, &pitches[0]), |best, (i, p)| if p > best.1 { (i, p) } else { best });
    let (min_i, &min_p) = pitches
        .iter()
        .enumerate()
        .fold((0, &pitches[0]), |best, (i, p)| if p < best.1 { (i, p) } else { best });
    if max_i != 0 && max_i != last && max_p > first_p && max_p > last_p {
        MelodicContour::Arch
    } else if min_i != 0 && min_i != last && min_p < first_p && min_p < last_p {
        MelodicContour::Valley
    } else {
        MelodicContour::Mixed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedNote {
    pub note: u8,
    pub note_name: String,
}

impl NamedNote {
    pub fn new(note: u8) -> Self {
        NamedNote {
            note,
            note_name: pitch_name(i32::from(note)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MelodyAnalysis {
    pub contour: MelodicContour,
    pub leap_count: usize,
    pub stepwise_ratio: f64,
    pub climax_note: Option<NamedNote>,
}

/// Shape and interval statistics of a melody, in onset order.
pub fn analyze_melody(notes: &[NoteEvent]) -> MelodyAnalysis {
    let mut sorted = notes.to_vec();
    sorted.sort_by_key(|n| n.tick);
    let pitches: Vec<u8> = sorted.iter().map(|n| n.pitch).collect();
    let Some(&climax) = pitches.iter().max() else {
        return MelodyAnalysis {
            contour: MelodicContour::Silence,
            leap_count: 0,
            stepwise_ratio: 0.0,
            climax_note: None,
        };
    };
    let intervals: Vec<i32> = pitches
        .windows(2)
        .map(|w| (i32::from(w[1]) - i32::from(w[0])).abs())
        .collect();
    let stepwise = intervals.iter().filter(|&&d| d <= 2).count();
    MelodyAnalysis {
        contour: contour_of(&pitches),
        leap_count: intervals.iter().filter(|&&d| d >= 3).count(),
        stepwise_ratio: if intervals.is_empty() {
            0.0
        } else {
            stepwise as f64 / intervals.len() as f64
        },
        climax_note: Some(NamedNote::new(climax)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParallelMotion {
    pub start_tick: u32,
    pub end_tick: u32,
    pub melody: [u8; 2],
    pub harmony: [u8; 2],
    pub intervals: [i32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoiceCrossing {
    pub tick: u32,
    pub melody: u8,
    pub harmony: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterpointAnalysis {
    pub parallel_fifths: Vec<ParallelMotion>,
    pub parallel_octaves: Vec<ParallelMotion>,
    pub voice_crossings: Vec<VoiceCrossing>,
}

/// Pair melody and harmony onsets by index and flag parallel perfect
/// intervals and crossings.
pub fn analyze_counterpoint(melody: &[NoteEvent], harmony: &[NoteEvent]) -> CounterpointAnalysis {
    let mut m = melody.to_vec();
    let mut h = harmony.to_vec();
    m.sort_by_key(|n| n.tick);
    h.sort_by_key(|n| n.tick);
    let pairs: Vec<(u32, u8, u8)> = m
        .iter()
        .zip(&h)
        .map(|(a, b)| (a.tick.max(b.tick), a.pitch, b.pitch))
        .collect();

    let mut out = CounterpointAnalysis::default();
    for &(tick, mel, har) in &pairs {
        if mel < har {
            out.voice_crossings.push(VoiceCrossing {
                tick,
                melody: mel,
                harmony: har,
            });
        }
    }
    for w in pairs.windows(2) {
        let (ta, ma, ha) = w[0];
        let (tb, mb, hb) = w[1];
        let ia = (i32::from(ma) - i32::from(ha)).abs();
        let ib = (i32::from(mb) - i32::from(hb)).abs();
        let same_direction = (i32::from(mb) - i32::from(ma)) * (i32::from(hb) - i32::from(ha)) > 0;
        if !same_direction {
            continue;
        }
        let motion = ParallelMotion {
            start_tick: ta,
            end_tick: tb,
            melody: [ma, mb],
            harmony: [ha, hb],
            intervals: [ia, ib],
        };
        if ia % 12 == 7 && ib % 12 == 7 {
            out.parallel_fifths.push(motion);
        } else if ia % 12 == 0 && ib % 12 == 0 {
            out.parallel_octaves.push(motion);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::SectionKind;
    use crate::theory::{Extension, HarmonicFunction, ScaleMode};

    fn note(tick: u32, pitch: u8) -> NoteEvent {
        NoteEvent::spanning(tick, tick + 120, i32::from(pitch), 80)
    }

    fn seg(root_pc: u8) -> ChordSegment {
        ChordSegment {
            bar: 0,
            start_step: 0,
            end_step: 16,
            label: String::new(),
            root_pc,
            quality: Quality::Major,
            extension: Extension::Triad,
            pcs: vec![root_pc],
            borrowed: false,
            section: SectionKind::Verse,
            template: String::new(),
            function: HarmonicFunction::Other,
        }
    }

    #[test]
    fn roman_numerals_with_accidentals() {
        let c = Key::new(0, ScaleMode::Major);
        assert_eq!(roman_numeral(&c, 7, Quality::Major), "V");
        assert_eq!(roman_numeral(&c, 9, Quality::Minor), "vi");
        assert_eq!(roman_numeral(&c, 10, Quality::Major), "bVII");
        assert_eq!(roman_numeral(&c, 11, Quality::Diminished), "vii°");
        assert_eq!(roman_numeral(&c, 6, Quality::Minor), "bv");
        let a_minor = Key::new(9, ScaleMode::HarmonicMinor);
        assert_eq!(roman_numeral(&a_minor, 7, Quality::Major), "bVII");
        assert_eq!(roman_numeral(&c, 8, Quality::Augmented), "bVI+");
    }

    #[test]
    fn cadences() {
        let c = Key::new(0, ScaleMode::Major);
        let chords = |roots: &[u8]| roots.iter().map(|&r| seg(r)).collect::<Vec<_>>();
        assert_eq!(detect_cadence(&c, &chords(&[2, 7, 0])), Some(Cadence::TwoFiveOne));
        assert_eq!(detect_cadence(&c, &chords(&[9, 7, 0])), Some(Cadence::Authentic));
        assert_eq!(detect_cadence(&c, &chords(&[5, 0])), Some(Cadence::Plagal));
        assert_eq!(detect_cadence(&c, &chords(&[0, 7])), None);
        assert_eq!(detect_cadence(&c, &[]), None);
    }

    #[test]
    fn rhythm_classes() {
        let on_beat: Vec<u32> = [0, 4, 8, 12].iter().map(|s| s * 120).collect();
        let r = analyze_rhythm(&on_beat, 1);
        assert_eq!(r.groove_type, GrooveType::OnBeat);
        assert_eq!(r.syncopation, 0.0);
        assert_eq!(r.density, 4.0);

        let off: Vec<u32> = [2, 6, 10, 14].iter().map(|s| s * 120).collect();
        assert_eq!(analyze_rhythm(&off, 1).groove_type, GrooveType::Offbeat);
        let weak: Vec<u32> = [0, 3, 7, 11].iter().map(|s| s * 120).collect();
        assert_eq!(analyze_rhythm(&weak, 1).groove_type, GrooveType::Syncopated);
        assert_eq!(analyze_rhythm(&[], 4).groove_type, GrooveType::Silence);
    }

    #[test]
    fn melody_shapes() {
        let arch = [note(0, 60), note(120, 64), note(240, 67), note(360, 62)];
        let a = analyze_melody(&arch);
        assert_eq!(a.contour, MelodicContour::Arch);
        assert_eq!(a.leap_count, 3);
        assert_eq!(a.climax_note.unwrap().note_name, "G4");

        let up = [note(0, 60), note(120, 62), note(240, 64)];
        let u = analyze_melody(&up);
        assert_eq!(u.contour, MelodicContour::Ascending);
        assert_eq!(u.stepwise_ratio, 1.0);

        assert_eq!(analyze_melody(&[]).contour, MelodicContour::Silence);
        assert_eq!(analyze_melody(&[note(0, 60)]).contour, MelodicContour::Static);
    }

    #[test]
    fn counterpoint_flags() {
        let melody = [note(0, 67), note(480, 69), note(960, 55)];
        let harmony = [note(0, 60), note(480, 62), note(960, 60)];
        let cp = analyze_counterpoint(&melody, &harmony);
        assert_eq!(cp.parallel_fifths.len(), 1);
        assert_eq!(cp.parallel_fifths[0].melody, [67, 69]);
        assert_eq!(cp.voice_crossings.len(), 1);
        assert!(cp.parallel_octaves.is_empty());
    }
}
