// Melody generation.
//
// Works bar by bar on the 16-step grid. The first `MOTIF_LEN_BARS` bars are
// composed fresh and cached as a motif; later bars may replay the cached bar
// at the same motif position (optionally transposed on chorus bars). A fresh
// bar:
//
// - centers its pitch window on the register center plus the bar's melodic
//   shift plus the song contour's offset
// - chooses a note count from density and picks that many distinct steps,
//   weighting downbeats, then eighth off-beats, then syncopated sixteenths
// - picks each pitch from chord or scale tones (chord tones favored on
//   strong steps by the anchoring knob) by nearest-to-target for the first
//   note, then a stepwise move, a leap, or a chromatic neighbor approach
// - nudges away from an immediate repeat when repetition is low
// - may add a pickup on step 14 or 15 at a phrase end that leads into the
//   next bar's first chord
//
// Style colors the probabilities: jazz leans off-beat and chromatic,
// classical leans stepwise and cadential, pop anchors steps 0 and 8.

use moodscore_prng::ScoreRng;

use crate::controls::{Controls, Style, derive_groove_sync};
use crate::events::{Instrument, NoteEvent, sort_notes};
use crate::harmony::{ChordSegment, segment_for_step, segments_in_bar};
use crate::plan::{BarModifier, SectionKind, SongPlan};
use crate::theory::{Register, nearest_in_set, scale_tones_in_range, tones_in_range};
use crate::timing::{
    STEPS_PER_BAR, bar_step_to_tick, humanize_ticks, humanize_velocity, offset_tick, swing_offset,
};
use crate::util::{clamp01, lerp};

/// Bars composed fresh and cached for reuse.
pub const MOTIF_LEN_BARS: usize = 2;

const STRONG_STEPS: [u32; 4] = [0, 4, 8, 12];
const OFFBEAT_STEPS: [u32; 4] = [2, 6, 10, 14];

/// A note placed on the step grid of one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepNote {
    step: u32,
    pitch: i32,
    dur_steps: u32,
    velocity: u8,
}

/// Effective per-bar knobs after the plan's modifiers.
struct BarKnobs<'a> {
    modifier: &'a BarModifier,
    density: f64,
    energy: f64,
    sync: f64,
    variation: f64,
    repetition: f64,
}

struct MelodyWriter<'a> {
    controls: &'a Controls,
    chords: &'a [ChordSegment],
    plan: &'a SongPlan,
    style: Style,
    register: Register,
    groove: f64,
    sync_base: f64,
    anchoring: f64,
    motif: Vec<Vec<StepNote>>,
}

impl<'a> MelodyWriter<'a> {
    fn knobs(&self, modifier: &'a BarModifier) -> BarKnobs<'a> {
        let d = &self.controls.derived;
        BarKnobs {
            modifier,
            density: clamp01(d.density * lerp(0.85, 1.12, self.groove) * modifier.density_mul),
            energy: clamp01(d.energy * modifier.energy_mul),
            sync: clamp01(self.sync_base * modifier.sync_mul),
            variation: clamp01(d.variation * modifier.variation_mul),
            repetition: clamp01(d.repetition * modifier.repetition_mul),
        }
    }

    fn reuse_probability(&self, k: &BarKnobs) -> f64 {
        let r = k.repetition;
        let mut p = match self.style {
            Style::Pop => clamp01(r * 1.20 + 0.05),
            Style::Jazz => clamp01(r * 0.70),
            Style::Classical => clamp01(r * 0.95 + 0.02),
        };
        if k.modifier.section == SectionKind::Chorus {
            p = clamp01(p * 0.85 + 0.05);
        }
        p
    }

    fn bar(&mut self, rng: &mut ScoreRng, bar: usize, modifier: &'a BarModifier) -> Vec<StepNote> {
        let k = self.knobs(modifier);

        if self.motif.len() == MOTIF_LEN_BARS && rng.random_bool(self.reuse_probability(&k)) {
            let cached = self.motif[bar % MOTIF_LEN_BARS].clone();
            if modifier.section == SectionKind::Chorus
                && rng.random_bool(lerp(0.12, 0.35, k.variation))
            {
                let shift = rng.pick_from(&[(0, 0.55), (2, 0.20), (-2, 0.20), (5, 0.05)]);
                return cached
                    .into_iter()
                    .map(|n| StepNote {
                        pitch: self.register.clamp(n.pitch + shift),
                        ..n
                    })
                    .collect();
            }
            return cached;
        }

        let notes = self.fresh_bar(rng, bar, &k);
        if bar < MOTIF_LEN_BARS && self.motif.len() == bar {
            self.motif.push(notes.clone());
        }
        notes
    }

    fn choose_steps(&self, rng: &mut ScoreRng, k: &BarKnobs, count: usize) -> Vec<u32> {
        let mut offbeat = clamp01(lerp(0.15, 0.60, k.sync));
        match self.style {
            Style::Jazz => offbeat = clamp01(offbeat + 0.12),
            Style::Classical => offbeat = clamp01(offbeat - 0.12),
            Style::Pop => {}
        }
        let chorus = k.modifier.section == SectionKind::Chorus;
        let mut weighted: Vec<(u32, f64)> = (0..STEPS_PER_BAR)
            .map(|s| {
                let mut w = if STRONG_STEPS.contains(&s) {
                    2.9
                } else if OFFBEAT_STEPS.contains(&s) {
                    lerp(0.9, 2.3, offbeat)
                } else {
                    lerp(0.55, 1.75, offbeat)
                };
                if chorus && s % 2 == 0 {
                    w *= 1.05;
                }
                (s, w)
            })
            .collect();

        let mut steps = Vec::with_capacity(count);
        while steps.len() < count && !weighted.is_empty() {
            let weights: Vec<f64> = weighted.iter().map(|(_, w)| *w).collect();
            let Some(i) = rng.weighted_index(&weights) else {
                break;
            };
            steps.push(weighted.swap_remove(i).0);
        }
        steps.sort_unstable();
        steps
    }

    fn fresh_bar(&self, rng: &mut ScoreRng, bar: usize, k: &BarKnobs) -> Vec<StepNote> {
        let d = &self.controls.derived;
        let key = &self.controls.key;
        let bar_chords = segments_in_bar(self.chords, bar);
        if bar_chords.is_empty() {
            return Vec::new();
        }
        let scale = key.scale_pcs();
        let is_last = bar + 1 == self.controls.length_bars;

        let contour = self.plan.contour.offset(bar, self.controls.length_bars);
        let center = (f64::from(self.register.center) + f64::from(k.modifier.melody_shift) + contour).round() as i32;
        let span = lerp(8.0, 15.0, k.energy * 0.55 + k.variation * 0.45).round() as i32;
        let window = self.register.window(center, span);
        let (low, high) = (window.low, window.high);

        let count = lerp(2.5, 10.0, k.density).round().clamp(2.0, 12.0) as usize;
        let steps = self.choose_steps(rng, k, count);

        let mut prefer_step = clamp01(lerp(0.82, 0.50, k.variation));
        if k.modifier.section == SectionKind::Chorus {
            prefer_step = clamp01(prefer_step * 1.05);
        }
        if self.style == Style::Classical {
            prefer_step = clamp01(prefer_step + 0.12);
        }

        let contour_intensity = self.plan.contour.intensity;
        let step_target = |step: u32| {
            let t = f64::from(step) / 15.0;
            let wobble = (std::f64::consts::PI * t).sin() * 2.0;
            window.center + (wobble * contour_intensity * 0.55).round() as i32
        };

        let scale_tones = scale_tones_in_range(key, low, high);
        let mut out = Vec::with_capacity(steps.len() + 1);
        let mut last: Option<i32> = None;
        for s in steps {
            let chord_pcs: &[u8] = segment_for_step(bar_chords, s).map_or(&scale[..], |c| c.pcs.as_slice());
            let chord_tones = tones_in_range(chord_pcs, low, high);
            let strong = STRONG_STEPS.contains(&s);
            let offbeat = OFFBEAT_STEPS.contains(&s);

            let mut pool = if scale_tones.is_empty() {
                chord_tones.clone()
            } else {
                scale_tones.clone()
            };
            if !chord_tones.is_empty() {
                if strong && rng.random_bool(lerp(0.35, 0.95, self.anchoring)) {
                    pool = chord_tones.clone();
                } else if !strong && rng.random_bool(lerp(0.10, 0.50, self.anchoring)) {
                    pool = [chord_tones.as_slice(), scale_tones.as_slice()].concat();
                }
                let forced_chord = match self.style {
                    Style::Pop => s == 0 || s == 8,
                    Style::Classical => k.modifier.is_phrase_end,
                    Style::Jazz => false,
                };
                if forced_chord {
                    pool = chord_tones.clone();
                } else if self.style == Style::Jazz && offbeat {
                    pool = [chord_tones.as_slice(), scale_tones.as_slice()].concat();
                }
            }
            if pool.is_empty() {
                pool.push(window.center);
            }

            let target = step_target(s);
            let mut pitch = match last {
                None => nearest_in_set(target, &pool),
                Some(prev) => {
                    let chroma = match self.style {
                        Style::Jazz if offbeat => 0.22,
                        Style::Jazz => 0.0,
                        Style::Pop => 0.05,
                        Style::Classical => 0.02,
                    };
                    let chromatic_from = if chroma > 0.0 && !chord_tones.is_empty() && rng.random_bool(chroma) {
                        rng.choose(&chord_tones).copied()
                    } else {
                        None
                    };
                    if let Some(approach) = chromatic_from {
                        let dir = if rng.random_bool(0.5) { -1 } else { 1 };
                        (approach + dir).clamp(low, high)
                    } else if rng.random_bool(prefer_step) {
                        let aim = if self.style == Style::Classical && k.modifier.is_phrase_end && !chord_tones.is_empty() {
                            nearest_in_set(target, &chord_tones)
                        } else {
                            target
                        };
                        let step_dir = if aim >= prev { 2 } else { -2 };
                        let blended = lerp(f64::from(prev + step_dir), f64::from(target), 0.35).round() as i32;
                        nearest_in_set(blended, &pool)
                    } else {
                        let leap = if self.style == Style::Classical {
                            rng.pick_from(&[(3, 1.0), (4, 1.0), (-3, 1.0), (-4, 1.0), (5, 1.0), (-5, 1.0)])
                        } else {
                            rng.pick_from(&[
                                (4, 1.0), (5, 1.0), (7, 1.0), (-4, 1.0),
                                (-5, 1.0), (-7, 1.0), (9, 1.0), (-9, 1.0),
                            ])
                        };
                        let blended = lerp(f64::from(prev + leap), f64::from(target), 0.50).round() as i32;
                        nearest_in_set(blended, &pool)
                    }
                }
            };

            if last == Some(pitch) && k.repetition < 0.55 {
                let nudge = if rng.random_bool(0.5) { 2 } else { -2 };
                pitch = nearest_in_set(pitch + nudge, &pool);
            }
            let pitch = self.register.clamp(pitch);
            last = Some(pitch);

            let dur_steps = if k.density > 0.62 {
                rng.pick_from(&[(1, 0.38), (2, 0.50), (4, 0.10), (6, 0.02)])
            } else {
                rng.pick_from(&[(2, 0.45), (4, 0.40), (1, 0.10), (6, 0.05)])
            };

            let base = lerp(55.0, 98.0, k.energy).round();
            let accent = if strong {
                lerp(1.05, 1.22, k.energy)
            } else {
                lerp(0.75, 1.00, k.energy)
            };
            let velocity = humanize_velocity(rng, (base * accent).round() as i32, d.humanize_velocity);
            out.push(StepNote {
                step: s,
                pitch,
                dur_steps,
                velocity,
            });
        }

        if k.modifier.is_phrase_end && !is_last {
            let p = clamp01(lerp(0.12, 0.55, k.variation) * lerp(0.65, 1.25, k.sync));
            if rng.random_bool(p) {
                let next_pcs: &[u8] = segments_in_bar(self.chords, bar + 1)
                    .first()
                    .map_or(&scale[..], |c| c.pcs.as_slice());
                let mut choices = tones_in_range(next_pcs, low, high);
                if choices.is_empty() {
                    choices = scale_tones.clone();
                }
                if !choices.is_empty() {
                    let step = if rng.random_bool(0.65) { 14 } else { 15 };
                    let pitch = nearest_in_set(step_target(step) + 2, &choices);
                    let base = lerp(60.0, 105.0, k.energy) as i32;
                    let velocity = humanize_velocity(rng, base, d.humanize_velocity);
                    out.push(StepNote {
                        step,
                        pitch: self.register.clamp(pitch),
                        dur_steps: 1,
                        velocity,
                    });
                    out.sort_by_key(|n| n.step);
                }
            }
        }
        out
    }
}

/// Generate the melody part.
pub fn generate_melody(
    controls: &Controls,
    chords: &[ChordSegment],
    plan: &SongPlan,
    rng: &mut ScoreRng,
) -> Vec<NoteEvent> {
    let d = &controls.derived;
    let (groove, sync_base) = derive_groove_sync(&d.secondary, plan.rhythm.archetype);
    let mut writer = MelodyWriter {
        controls,
        chords,
        plan,
        style: controls.style(),
        register: Instrument::Melody.register(),
        groove,
        sync_base,
        anchoring: clamp01(d.secondary.chord_tone_anchoring),
        motif: Vec::with_capacity(MOTIF_LEN_BARS),
    };

    let mut notes = Vec::new();
    for (bar, modifier) in plan.bar_modifiers.iter().enumerate() {
        for n in writer.bar(rng, bar, modifier) {
            let on = bar_step_to_tick(bar, n.step) + swing_offset(n.step, d.swing);
            let on = offset_tick(on, humanize_ticks(rng, d.humanize_timing_ms, controls.tempo_bpm));
            let off = bar_step_to_tick(bar, (n.step + n.dur_steps).min(STEPS_PER_BAR));
            notes.push(NoteEvent::spanning(on, off, n.pitch, i32::from(n.velocity)));
        }
    }
    sort_notes(&mut notes);
    tracing::debug!(notes = notes.len(), "generated melody");
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{Stage, StyleMoodControls};
    use crate::harmony::generate_chords;
    use crate::plan::plan_song;
    use crate::theory::{Key, ScaleMode};

    fn melody_for(style: Style, seed: u64, intensity: f64) -> (Controls, Vec<NoteEvent>) {
        let mood = StyleMoodControls {
            style,
            intensity,
            ..StyleMoodControls::default()
        };
        let c = Controls::new(12, 110, Key::new(2, ScaleMode::Dorian), seed, &mood).unwrap();
        let plan = plan_song(&c, &mut c.stage_rng(Stage::Plan));
        let chords = generate_chords(&c, &plan, &mut c.stage_rng(Stage::Chords));
        let notes = generate_melody(&c, &chords, &plan, &mut c.stage_rng(Stage::Melody));
        (c, notes)
    }

    #[test]
    fn melody_stays_in_register() {
        let register = Instrument::Melody.register();
        for style in [Style::Pop, Style::Jazz, Style::Classical] {
            for seed in 0..8 {
                let (c, notes) = melody_for(style, seed, (seed % 4) as f64 / 3.0);
                assert!(!notes.is_empty());
                for n in &notes {
                    assert!(register.contains(i32::from(n.pitch)), "{n:?}");
                    assert!(n.duration >= 1);
                    assert!((1..=127).contains(&n.velocity));
                    assert!(n.tick < c.length_bars as u32 * crate::timing::TICKS_PER_BAR + 200);
                }
            }
        }
    }

    #[test]
    fn melody_is_deterministic() {
        let (_, a) = melody_for(Style::Jazz, 99, 0.7);
        let (_, b) = melody_for(Style::Jazz, 99, 0.7);
        assert_eq!(a, b);
    }

    #[test]
    fn step_choice_is_distinct_and_sorted() {
        let (c, _) = melody_for(Style::Pop, 1, 0.5);
        let plan = plan_song(&c, &mut c.stage_rng(Stage::Plan));
        let writer = MelodyWriter {
            controls: &c,
            chords: &[],
            plan: &plan,
            style: Style::Pop,
            register: Instrument::Melody.register(),
            groove: 0.5,
            sync_base: 0.5,
            anchoring: 0.5,
            motif: Vec::new(),
        };
        let k = writer.knobs(&plan.bar_modifiers[0]);
        let mut rng = ScoreRng::new(4);
        for count in [2, 8, 16, 20] {
            let steps = writer.choose_steps(&mut rng, &k, count);
            assert_eq!(steps.len(), count.min(16));
            assert!(steps.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
