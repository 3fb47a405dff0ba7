// Bass line generation.
//
// One sixteenth-step "cell" is drawn per song from a table keyed on style
// (and, for pop, on the drum-pattern family of the groove). For each chord
// segment the cell is fitted to the segment's span, thinned or thickened by
// density, and rendered on the chord root in the octave nearest the bass
// register's center. Individual hits may anticipate by two steps, gain a
// one-step neighbor-tone approach, or jump an octave on chorus bars.

use moodscore_prng::ScoreRng;

use crate::controls::{Controls, GrooveArchetype, Style};
use crate::events::{Instrument, NoteEvent, sort_notes};
use crate::harmony::ChordSegment;
use crate::plan::{SectionKind, SongPlan};
use crate::theory::{nearest_in_set, scale_tones_in_range, tones_in_range};
use crate::timing::{STEPS_PER_BAR, bar_step_to_tick, humanize_ticks, humanize_velocity, offset_tick, swing_offset};
use crate::util::{clamp01, lerp};

type Cell = &'static [u32];

const JAZZ_CELLS: [(Cell, f64); 4] = [
    (&[0, 2, 4, 6, 8, 10, 12, 14], 0.40),
    (&[0, 2, 4, 8, 10, 12, 14], 0.25),
    (&[0, 2, 6, 8, 10, 12, 14], 0.20),
    (&[0, 4, 6, 8, 10, 12, 14], 0.15),
];

const CLASSICAL_CELLS: [(Cell, f64); 4] = [
    (&[0, 4, 8, 12], 0.40),
    (&[0, 2, 4, 6, 8, 10, 12, 14], 0.25),
    (&[0, 4, 6, 8, 10, 12], 0.20),
    (&[0, 2, 6, 8, 12, 14], 0.15),
];

const POP_CELLS: [(Cell, f64); 4] = [
    (&[0, 4, 8, 12], 0.35),
    (&[0, 6, 8, 14], 0.25),
    (&[0, 3, 8, 11, 14], 0.20),
    (&[0, 2, 8, 10, 14], 0.20),
];

const FOUR_ON_FLOOR_CELLS: [(Cell, f64); 4] = [
    (&[0, 4, 8, 12], 0.35),
    (&[0, 6, 8, 14], 0.25),
    (&[0, 8, 10, 12], 0.20),
    (&[0, 2, 8, 10, 12, 14], 0.20),
];

const HALF_TIME_CELLS: [(Cell, f64); 4] = [
    (&[0, 6, 8, 14], 0.35),
    (&[0, 8, 12], 0.25),
    (&[0, 3, 8, 11, 14], 0.20),
    (&[0, 2, 6, 8, 10, 14], 0.20),
];

const BOUNCY_CELLS: [(Cell, f64); 4] = [
    (&[0, 3, 7, 10, 14], 0.35),
    (&[0, 2, 7, 10, 12, 14], 0.25),
    (&[0, 5, 7, 10, 15], 0.20),
    (&[0, 2, 6, 10, 14], 0.20),
];

/// Pick the song's bass cell. Jazz and classical have their own tables;
/// pop defers to the groove's drum family when it is not plain straight pop.
pub fn choose_cell(rng: &mut ScoreRng, style: Style, archetype: GrooveArchetype) -> Cell {
    let table = match (style, archetype.drum_family()) {
        (Style::Jazz, _) => &JAZZ_CELLS,
        (Style::Classical, _) => &CLASSICAL_CELLS,
        (Style::Pop, GrooveArchetype::FourOnFloor) => &FOUR_ON_FLOOR_CELLS,
        (Style::Pop, GrooveArchetype::HalfTime) => &HALF_TIME_CELLS,
        (Style::Pop, GrooveArchetype::Bouncy) => &BOUNCY_CELLS,
        (Style::Pop, _) => &POP_CELLS,
    };
    rng.pick_from(table)
}

/// Fit a full-bar cell to a segment. On segments of half a bar or less the
/// whole cell is compressed into the span; longer segments clip it.
pub fn fit_cell(cell: &[u32], start: u32, end: u32) -> Vec<u32> {
    let span = end.saturating_sub(start).max(1);
    let mut steps: Vec<u32> = if span <= STEPS_PER_BAR / 2 {
        let scale = f64::from(span) / f64::from(STEPS_PER_BAR);
        cell.iter()
            .map(|&s| start + (f64::from(s) * scale).round() as u32)
            .collect()
    } else {
        cell.to_vec()
    };
    steps.retain(|s| (start..end).contains(s));
    steps.sort_unstable();
    steps.dedup();
    steps
}

/// Keep the segment's first step plus one syncopation-favored step.
fn thin(start: u32, end: u32) -> Vec<u32> {
    let mut keep = vec![start];
    if let Some(&s) = [8, 4, 12, 6, 10, 14]
        .iter()
        .find(|&&s| s != start && (start..end).contains(&s))
    {
        keep.push(s);
    }
    keep.sort_unstable();
    keep
}

/// Generate the bass part.
pub fn generate_bass(
    controls: &Controls,
    chords: &[ChordSegment],
    plan: &SongPlan,
    rng: &mut ScoreRng,
) -> Vec<NoteEvent> {
    let d = &controls.derived;
    let register = Instrument::Bass.register();
    let (low, high) = (register.low, register.high);
    let scale_notes = scale_tones_in_range(&controls.key, low, high);

    let global_velocity = lerp(62.0, 98.0, d.energy).round();
    let cell = choose_cell(rng, controls.style(), plan.rhythm.archetype);
    let anticipate_base = clamp01(lerp(0.05, 0.35, d.syncopation));
    let approach_base = clamp01(lerp(0.03, 0.16, d.chord_complexity));

    let mut notes = Vec::new();
    for seg in chords {
        let Some(modifier) = plan.bar(seg.bar) else {
            continue;
        };
        let density = clamp01(d.density * modifier.density_mul);
        let sync = clamp01(d.syncopation * modifier.sync_mul);
        let energy = clamp01(d.energy * modifier.energy_mul);
        let base_velocity = (global_velocity * lerp(0.90, 1.10, energy)).round() as i32;
        let chorus = modifier.section == SectionKind::Chorus;

        let roots = tones_in_range(&[seg.root_pc % 12], low, high);
        let root = nearest_in_set(register.center, &roots);

        let mut steps = fit_cell(cell, seg.start_step, seg.end_step);
        if density < 0.45 && steps.len() > 2 {
            steps = thin(seg.start_step, seg.end_step);
        }
        if density > 0.70 && rng.random_bool(lerp(0.10, 0.55, density)) {
            let extras: Vec<(u32, f64)> = (seg.start_step..seg.end_step)
                .filter(|s| !steps.contains(s))
                .map(|s| {
                    let odd = if s % 2 == 1 { 1.8 } else { 1.0 };
                    (s, odd * lerp(0.8, 1.6, sync))
                })
                .collect();
            if let Some(&extra) = rng.pick_weighted(&extras) {
                steps.push(extra);
                steps.sort_unstable();
            }
        }

        let anticipate = clamp01(anticipate_base * lerp(0.85, 1.25, sync));
        let approach = clamp01(approach_base * lerp(0.85, 1.25, density));
        let chord_notes = tones_in_range(&seg.pcs, low, high);

        for step in steps {
            let mut place = step;
            if rng.random_bool(anticipate) && place >= seg.start_step + 2 {
                place -= 2;
            }
            let mut on = bar_step_to_tick(seg.bar, place) + swing_offset(place, d.swing);
            on = offset_tick(on, humanize_ticks(rng, d.humanize_timing_ms, controls.tempo_bpm));
            let dur = if density > 0.60 || chorus { 2 } else { 4 };
            let off = bar_step_to_tick(seg.bar, seg.end_step.min(place + dur));

            if rng.random_bool(approach) && place + 1 < seg.end_step {
                let pool = if !chord_notes.is_empty() && rng.random_bool(0.55) {
                    &chord_notes
                } else {
                    &scale_notes
                };
                if !pool.is_empty() {
                    let mut neighbor = nearest_in_set(root - 2, pool);
                    if rng.random_bool(0.5) {
                        neighbor = nearest_in_set(root + 2, pool);
                    }
                    let a_on = offset_tick(
                        bar_step_to_tick(seg.bar, place),
                        humanize_ticks(rng, d.humanize_timing_ms, controls.tempo_bpm),
                    );
                    let a_off = bar_step_to_tick(seg.bar, seg.end_step.min(place + 1));
                    let a_vel = humanize_velocity(rng, (f64::from(base_velocity) * 0.78) as i32, d.humanize_velocity);
                    notes.push(NoteEvent::spanning(a_on, a_off, neighbor, i32::from(a_vel)));

                    on = offset_tick(
                        bar_step_to_tick(seg.bar, (seg.end_step - 1).min(place + 1)),
                        humanize_ticks(rng, d.humanize_timing_ms, controls.tempo_bpm),
                    );
                }
            }

            let mut pitch = root;
            if chorus && rng.random_bool(lerp(0.05, 0.18, density)) && root + 12 <= high && rng.random_bool(0.55) {
                pitch = root + 12;
            }
            let velocity = humanize_velocity(rng, base_velocity, d.humanize_velocity);
            notes.push(NoteEvent::spanning(on, off, register.clamp(pitch), i32::from(velocity)));
        }
    }
    sort_notes(&mut notes);
    tracing::debug!(notes = notes.len(), "generated bass");
    notes
}
