// JSON song report.
//
// `build_report` summarizes a rendered `Song`: the plan, every chord with its
// roman numeral and function, per-bar modifiers with phrase-end cadences,
// per-part statistics, and melody/counterpoint analyses. Extra analyses are
// supplied by the caller as `Analyzer` trait objects; their output lands in
// the `analyzers` map under each analyzer's name and nothing else is run.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value, json};

use crate::analysis::{
    Cadence, CounterpointAnalysis, MelodyAnalysis, RhythmAnalysis, analyze_counterpoint,
    analyze_melody, analyze_rhythm, detect_cadence, roman_numeral,
};
use crate::controls::Controls;
use crate::events::{Instrument, NoteEvent};
use crate::harmony::ChordSegment;
use crate::pipeline::Song;
use crate::plan::{BarModifier, ContourProfile, RhythmProfile, Section, SectionTemplates};
use crate::theory::{Extension, HarmonicFunction, NOTE_NAMES, Quality, pitch_name};
use crate::timing::{STEPS_PER_BAR, TICKS_PER_QUARTER, bar_of_tick, step_of_tick_in_bar};

pub const REPORT_VERSION: &str = "moodscore_report_v1";

/// Notes listed per layer in the preview.
const PREVIEW_LEN: usize = 60;

/// A pluggable analysis over a finished song.
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;
    fn analyze(&self, song: &Song) -> Value;
}

#[derive(Debug, Clone, Serialize)]
pub struct BarReport {
    pub bar: usize,
    #[serde(flatten)]
    pub modifier: BarModifier,
    pub cadence: Option<Cadence>,
    pub contour_offset_semitones: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChordReport {
    pub bar: usize,
    pub start_step: u32,
    pub end_step: u32,
    pub section: crate::plan::SectionKind,
    pub label: String,
    pub roman_numeral: String,
    pub root_pc: u8,
    pub root_name: &'static str,
    pub quality: Quality,
    pub extension: Extension,
    pub pcs: Vec<u8>,
    pub pc_names: Vec<&'static str>,
    pub borrowed: bool,
    pub template: String,
    pub function: HarmonicFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewNote {
    pub time_sec: f64,
    pub bar: usize,
    pub step: u32,
    pub note: u8,
    /// Absent for drums, whose note numbers name kit pieces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_name: Option<String>,
    pub velocity: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerReport {
    pub note_on_count: usize,
    pub unique_pitches: Vec<u8>,
    pub pitch_range: Option<[u8; 2]>,
    pub avg_pitch: Option<f64>,
    pub avg_velocity: Option<f64>,
    pub rhythm: RhythmAnalysis,
    pub notes_per_bar: BTreeMap<usize, usize>,
    pub steps_histogram: BTreeMap<u32, usize>,
    pub preview: Vec<PreviewNote>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SongReport {
    pub report_version: &'static str,
    pub controls: Controls,
    pub section_pattern: String,
    pub sections: Vec<Section>,
    pub phrase_len_bars: usize,
    pub rhythm_profile: RhythmProfile,
    pub melody_contour: ContourProfile,
    pub section_templates: SectionTemplates,
    pub bars: Vec<BarReport>,
    pub chords: Vec<ChordReport>,
    pub layers: BTreeMap<Instrument, LayerReport>,
    pub melody: MelodyAnalysis,
    pub counterpoint: CounterpointAnalysis,
    pub analyzers: BTreeMap<String, Value>,
}

impl SongReport {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn ticks_to_seconds(tick: u32, bpm: u16) -> f64 {
    f64::from(tick) / f64::from(TICKS_PER_QUARTER) * 60.0 / f64::from(bpm.max(1))
}

fn layer_report(instrument: Instrument, notes: &[NoteEvent], song: &Song) -> LayerReport {
    let count = notes.len();
    let mut unique: Vec<u8> = notes.iter().map(|n| n.pitch).collect();
    unique.sort_unstable();
    unique.dedup();
    let pitch_range = match (unique.first(), unique.last()) {
        (Some(&lo), Some(&hi)) => Some([lo, hi]),
        _ => None,
    };
    let mean = |f: fn(&NoteEvent) -> u8| {
        (count > 0).then(|| notes.iter().map(|n| f64::from(f(n))).sum::<f64>() / count as f64)
    };

    let mut notes_per_bar = BTreeMap::new();
    let mut steps_histogram = BTreeMap::new();
    for n in notes {
        *notes_per_bar.entry(bar_of_tick(n.tick)).or_insert(0) += 1;
        let step = step_of_tick_in_bar(n.tick).min(STEPS_PER_BAR - 1);
        *steps_histogram.entry(step).or_insert(0) += 1;
    }

    let bpm = song.controls.tempo_bpm;
    let preview = notes
        .iter()
        .take(PREVIEW_LEN)
        .map(|n| PreviewNote {
            time_sec: (ticks_to_seconds(n.tick, bpm) * 10_000.0).round() / 10_000.0,
            bar: bar_of_tick(n.tick),
            step: step_of_tick_in_bar(n.tick),
            note: n.pitch,
            note_name: (instrument != Instrument::Drums).then(|| pitch_name(i32::from(n.pitch))),
            velocity: n.velocity,
        })
        .collect();

    let onsets: Vec<u32> = notes.iter().map(|n| n.tick).collect();
    LayerReport {
        note_on_count: count,
        unique_pitches: unique,
        pitch_range,
        avg_pitch: mean(|n| n.pitch),
        avg_velocity: mean(|n| n.velocity),
        rhythm: analyze_rhythm(&onsets, song.length_bars()),
        notes_per_bar,
        steps_histogram,
        preview,
    }
}

fn chord_report(song: &Song, seg: &ChordSegment) -> ChordReport {
    ChordReport {
        bar: seg.bar,
        start_step: seg.start_step,
        end_step: seg.end_step,
        section: seg.section,
        label: seg.label.clone(),
        roman_numeral: roman_numeral(&song.controls.key, seg.root_pc, seg.quality),
        root_pc: seg.root_pc,
        root_name: NOTE_NAMES[usize::from(seg.root_pc % 12)],
        quality: seg.quality,
        extension: seg.extension,
        pcs: seg.pcs.clone(),
        pc_names: seg.pcs.iter().map(|&p| NOTE_NAMES[usize::from(p % 12)]).collect(),
        borrowed: seg.borrowed,
        template: seg.template.clone(),
        function: seg.function,
    }
}

/// Build the report, running each of `analyzers` once.
pub fn build_report(song: &Song, analyzers: &[&dyn Analyzer]) -> SongReport {
    let plan = &song.plan;
    let key = &song.controls.key;
    let length = song.length_bars();

    let bars = plan
        .bar_modifiers
        .iter()
        .enumerate()
        .map(|(bar, modifier)| {
            let cadence = if modifier.is_phrase_end {
                let phrase_start = (bar + 1).saturating_sub(plan.phrase_len_bars);
                let phrase: Vec<ChordSegment> = song
                    .chords
                    .iter()
                    .filter(|c| (phrase_start..=bar).contains(&c.bar))
                    .cloned()
                    .collect();
                detect_cadence(key, &phrase)
            } else {
                None
            };
            BarReport {
                bar,
                modifier: modifier.clone(),
                cadence,
                contour_offset_semitones: plan.contour.offset(bar, length),
            }
        })
        .collect();

    let layers = song
        .parts
        .iter()
        .map(|p| (p.instrument, layer_report(p.instrument, &p.notes, song)))
        .collect();

    let melody = song.part(Instrument::Melody);
    let harmony = song.part(Instrument::Harmony);

    let analyzers = analyzers
        .iter()
        .map(|a| (a.name().to_string(), a.analyze(song)))
        .collect();

    SongReport {
        report_version: REPORT_VERSION,
        controls: song.controls.clone(),
        section_pattern: plan.pattern(),
        sections: plan.sections.clone(),
        phrase_len_bars: plan.phrase_len_bars,
        rhythm_profile: plan.rhythm.clone(),
        melody_contour: plan.contour,
        section_templates: plan.templates.clone(),
        bars,
        chords: song.chords.iter().map(|c| chord_report(song, c)).collect(),
        layers,
        melody: analyze_melody(melody),
        counterpoint: analyze_counterpoint(melody, harmony),
        analyzers,
    }
}

/// Share of borrowed chords and how often each extension appears.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChordColorAnalyzer;

impl Analyzer for ChordColorAnalyzer {
    fn name(&self) -> &str {
        "chord_color"
    }

    fn analyze(&self, song: &Song) -> Value {
        let total = song.chords.len();
        let borrowed = song.chords.iter().filter(|c| c.borrowed).count();
        let mut extensions: BTreeMap<&str, usize> = BTreeMap::new();
        for c in &song.chords {
            *extensions.entry(c.extension.name()).or_insert(0) += 1;
        }
        json!({
            "segments": total,
            "borrowed": borrowed,
            "borrowed_ratio": if total == 0 { 0.0 } else { borrowed as f64 / total as f64 },
            "extensions": extensions,
        })
    }
}
