// Drum part generation.
//
// Each bar starts from the rhythm profile's kick, snare and hat steps and
// is varied independently:
//
// - hats densify toward straight sixteenths with density
// - kicks gain syncopated hits with the profile's kick bias and syncopation
// - ghost snares land on steps 3 and 11
// - a crash marks every section start after the first bar
// - phrase and section ends (except the last bar) may carry a fill, either a
//   rising snare roll or a tom run into a final snare
//
// All hits are one step long on GM percussion notes.

use moodscore_prng::ScoreRng;

use crate::controls::{Controls, derive_groove_sync};
use crate::events::{NoteEvent, drum_note, sort_notes};
use crate::plan::{FillStyle, SectionKind, SongPlan};
use crate::timing::{STEPS_PER_BAR, bar_step_to_tick, humanize_ticks, humanize_velocity, offset_tick, swing_offset};
use crate::util::{clamp01, lerp};

const DOWNBEATS: [u32; 4] = [0, 4, 8, 12];
const GHOST_STEPS: [u32; 2] = [3, 11];

/// Vary a step set: maybe drop one non-downbeat, maybe add one step with
/// odd and late off-beat positions favored.
pub fn vary_steps(rng: &mut ScoreRng, steps: &[u32], add_prob: f64, remove_prob: f64) -> Vec<u32> {
    let mut out: Vec<u32> = steps.iter().copied().filter(|&s| s < STEPS_PER_BAR).collect();
    out.sort_unstable();
    out.dedup();
    if !out.is_empty() && rng.random_bool(remove_prob) {
        let removable: Vec<u32> = out.iter().copied().filter(|s| !DOWNBEATS.contains(s)).collect();
        if let Some(&gone) = rng.choose(&removable) {
            out.retain(|&s| s != gone);
        }
    }
    if rng.random_bool(add_prob) {
        let candidates: Vec<(u32, f64)> = (0..STEPS_PER_BAR)
            .filter(|s| !out.contains(s))
            .map(|s| {
                let mut w = 1.0;
                if s % 2 == 1 {
                    w *= 1.7;
                }
                if matches!(s, 6 | 10 | 14) {
                    w *= 1.5;
                }
                (s, w)
            })
            .collect();
        if let Some(&s) = rng.pick_weighted(&candidates) {
            out.push(s);
            out.sort_unstable();
        }
    }
    out
}

struct Kit<'a> {
    controls: &'a Controls,
    notes: Vec<NoteEvent>,
}

impl Kit<'_> {
    fn hit(&mut self, rng: &mut ScoreRng, bar: usize, step: u32, note: u8, velocity: i32, swung: bool) {
        let d = &self.controls.derived;
        let mut on = bar_step_to_tick(bar, step);
        if swung {
            on += swing_offset(step, d.swing);
        }
        let on = offset_tick(on, humanize_ticks(rng, d.humanize_timing_ms, self.controls.tempo_bpm));
        let off = bar_step_to_tick(bar, (step + 1).min(STEPS_PER_BAR));
        let velocity = humanize_velocity(rng, velocity, d.humanize_velocity);
        self.notes.push(NoteEvent::spanning(on, off, i32::from(note), i32::from(velocity)));
    }
}

/// Generate the drum part.
pub fn generate_drums(controls: &Controls, plan: &SongPlan, rng: &mut ScoreRng) -> Vec<NoteEvent> {
    let d = &controls.derived;
    let rhythm = &plan.rhythm;
    let (groove, sync_base) = derive_groove_sync(&d.secondary, rhythm.archetype);
    let mut kit = Kit {
        controls,
        notes: Vec::new(),
    };

    for (bar, modifier) in plan.bar_modifiers.iter().enumerate() {
        let density = clamp01(d.density * lerp(0.85, 1.12, groove) * modifier.density_mul);
        let sync = clamp01(sync_base * modifier.sync_mul);
        let energy = clamp01(d.energy * modifier.energy_mul);
        let variation = clamp01(d.variation * modifier.variation_mul);
        let chorus = modifier.section == SectionKind::Chorus;

        let kick_vel = lerp(70.0, 115.0, energy).round() as i32;
        let snare_vel = lerp(72.0, 118.0, energy).round();
        let hat_vel = lerp(38.0, 92.0, energy).round();

        let mut hats = rhythm.hat_steps.clone();
        let mut hat_16th = clamp01(rhythm.hat_16th_bias * lerp(0.55, 1.20, density));
        if chorus {
            hat_16th = clamp01(hat_16th * 1.15);
        }
        if rng.random_bool(hat_16th) {
            for s in (1..STEPS_PER_BAR).step_by(2) {
                if rng.random_bool(clamp01(lerp(0.25, 0.95, density))) {
                    hats.push(s);
                }
            }
        }
        hats.retain(|&s| s < STEPS_PER_BAR);
        hats.sort_unstable();
        hats.dedup();

        let mut extra_kick = clamp01(rhythm.kick_sync_bias * lerp(0.65, 1.35, sync));
        if chorus {
            extra_kick = clamp01(extra_kick * 1.10);
        }
        let mut kicks = rhythm.kick_steps.clone();
        if rng.random_bool(extra_kick) {
            kicks = vary_steps(rng, &kicks, 0.75, 0.0);
        }
        if rng.random_bool(extra_kick * 0.45) {
            kicks = vary_steps(rng, &kicks, 0.55, 0.0);
        }
        kicks.retain(|&s| s < STEPS_PER_BAR);
        kicks.sort_unstable();
        kicks.dedup();

        let mut snares = rhythm.snare_steps.clone();
        let ghost = clamp01(lerp(0.05, 0.40, sync));
        for g in GHOST_STEPS {
            if rng.random_bool(ghost) {
                snares.push(g);
            }
        }
        snares.retain(|&s| s < STEPS_PER_BAR);
        snares.sort_unstable();
        snares.dedup();

        if modifier.is_section_start && bar != 0 {
            let vel = lerp(85.0, 120.0, energy).round() as i32;
            kit.hit(rng, bar, 0, drum_note::CRASH, vel, false);
        }

        let mut fill = false;
        if modifier.is_phrase_end && !plan.is_last_bar(bar) {
            fill = rng.random_bool(clamp01(lerp(0.20, 0.85, variation) * lerp(0.70, 1.25, energy)));
        }
        if modifier.is_section_end && !plan.is_last_bar(bar) && !fill {
            fill = rng.random_bool(clamp01(lerp(0.20, 0.90, variation) * 1.10));
        }

        for s in kicks {
            kit.hit(rng, bar, s, drum_note::KICK, kick_vel, false);
        }
        for s in snares {
            let scale = if GHOST_STEPS.contains(&s) { 0.45 } else { 1.0 };
            kit.hit(rng, bar, s, drum_note::SNARE, (snare_vel * scale).round() as i32, false);
        }
        for s in hats {
            kit.hit(rng, bar, s, drum_note::CLOSED_HAT, hat_vel as i32, true);
        }

        if fill {
            let (run, ramp_from): ([(u32, u8); 4], f64) = match rhythm.fill_style {
                FillStyle::SnareRoll => (
                    [
                        (12, drum_note::SNARE),
                        (13, drum_note::SNARE),
                        (14, drum_note::SNARE),
                        (15, drum_note::SNARE),
                    ],
                    0.65,
                ),
                FillStyle::TomFill => (
                    [
                        (12, drum_note::LOW_TOM),
                        (13, drum_note::MID_TOM),
                        (14, drum_note::HIGH_TOM),
                        (15, drum_note::SNARE),
                    ],
                    0.70,
                ),
            };
            for (i, (s, note)) in run.into_iter().enumerate() {
                let ramp = lerp(ramp_from, 1.10, i as f64 / 3.0);
                kit.hit(rng, bar, s, note, (snare_vel * ramp).round() as i32, false);
            }
            if rhythm.fill_style == FillStyle::SnareRoll && rng.random_bool(0.35) {
                kit.hit(rng, bar, 14, drum_note::OPEN_HAT, (hat_vel * 0.95).round() as i32, true);
            }
        }
    }

    let mut notes = kit.notes;
    sort_notes(&mut notes);
    tracing::debug!(notes = notes.len(), "generated drums");
    notes
}
