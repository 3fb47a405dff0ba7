// Harmony part: voice-led chord comping.
//
// One voicing state is threaded through every chord segment in order. The
// first segment is voiced fresh around the register center; each later
// segment is led from the previous voicing. A segment is either held for its
// full span or pulsed on quarters (eighths at some phrase ends), with the
// choice driven by density.

use moodscore_prng::ScoreRng;

use crate::controls::Controls;
use crate::events::{Instrument, NoteEvent, sort_notes};
use crate::harmony::ChordSegment;
use crate::plan::{SectionKind, SongPlan};
use crate::theory::{scale_tones_in_range, tones_in_range};
use crate::timing::{TICKS_PER_QUARTER, bar_step_to_tick, humanize_ticks, humanize_velocity, offset_tick, swing_offset};
use crate::util::{clamp01, lerp};
use crate::voicing::{initial_voicing, voice_lead};

const EIGHTH_TICKS: u32 = TICKS_PER_QUARTER / 2;

/// Number of simultaneous voices for a chord-complexity level.
fn voice_count(rng: &mut ScoreRng, complexity: f64) -> usize {
    let mut count = 3;
    if complexity >= 0.55 {
        count = 4;
    }
    if complexity >= 0.85 && rng.random_bool(0.35) {
        count = 5;
    }
    count
}

/// The voicing sequence for `chords`, one entry per segment.
pub fn voice_segments(rng: &mut ScoreRng, controls: &Controls, chords: &[ChordSegment]) -> Vec<Vec<i32>> {
    let register = Instrument::Harmony.register();
    let count = voice_count(rng, controls.derived.chord_complexity);
    let mut prev: Vec<i32> = Vec::new();
    let mut out = Vec::with_capacity(chords.len());
    for seg in chords {
        let voicing = if prev.is_empty() {
            let v = initial_voicing(rng, &seg.pcs, register, count);
            if v.is_empty() {
                let mut fallback = tones_in_range(&seg.pcs, register.low, register.high);
                if fallback.is_empty() {
                    fallback = scale_tones_in_range(&controls.key, register.low, register.high);
                }
                if fallback.is_empty() {
                    fallback.push(register.center);
                }
                fallback.truncate(count);
                fallback
            } else {
                v
            }
        } else {
            voice_lead(&prev, &seg.pcs, register.low, register.high)
        };
        prev.clone_from(&voicing);
        out.push(voicing);
    }
    out
}

/// Generate the harmony part.
pub fn generate_harmony(
    controls: &Controls,
    chords: &[ChordSegment],
    plan: &SongPlan,
    rng: &mut ScoreRng,
) -> Vec<NoteEvent> {
    let d = &controls.derived;
    let voicings = voice_segments(rng, controls, chords);
    let mut notes = Vec::new();

    for (seg, voicing) in chords.iter().zip(&voicings) {
        let Some(modifier) = plan.bar(seg.bar) else {
            continue;
        };
        let density = clamp01(d.density * modifier.density_mul);
        let energy = clamp01(d.energy * modifier.energy_mul);
        let start = bar_step_to_tick(seg.bar, seg.start_step);
        let end = bar_step_to_tick(seg.bar, seg.end_step);
        let base_vel = lerp(52.0, 88.0, energy).round() as i32;

        let mut pulse = clamp01(lerp(0.10, 0.68, density));
        if modifier.section == SectionKind::Chorus {
            pulse = clamp01(pulse * 1.15);
        }

        if !rng.random_bool(pulse) {
            let on = start + swing_offset(seg.start_step, d.swing);
            let on = offset_tick(on, humanize_ticks(rng, d.humanize_timing_ms, controls.tempo_bpm));
            for &pitch in voicing {
                let vel = humanize_velocity(rng, base_vel, d.humanize_velocity);
                notes.push(NoteEvent::spanning(on, end, pitch, i32::from(vel)));
            }
            continue;
        }

        let eighths = modifier.is_phrase_end && rng.random_bool(lerp(0.10, 0.45, d.variation));
        let step = if eighths { EIGHTH_TICKS } else { TICKS_PER_QUARTER };
        let mut t = start;
        while t < end {
            let on = offset_tick(t, humanize_ticks(rng, d.humanize_timing_ms, controls.tempo_bpm));
            let off = end.min(on + EIGHTH_TICKS);
            for &pitch in voicing {
                let vel = humanize_velocity(rng, base_vel, d.humanize_velocity);
                notes.push(NoteEvent::spanning(on, off, pitch, i32::from(vel)));
            }
            t += step;
        }
    }
    sort_notes(&mut notes);
    tracing::debug!(notes = notes.len(), segments = chords.len(), "generated harmony");
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{Stage, StyleMoodControls};
    use crate::harmony::generate_chords;
    use crate::plan::plan_song;
    use crate::theory::{Key, ScaleMode};

    fn setup(seed: u64, complexity: f64) -> (Controls, SongPlan, Vec<ChordSegment>) {
        let mood = StyleMoodControls {
            complexity,
            ..StyleMoodControls::default()
        };
        let c = Controls::new(12, 96, Key::new(5, ScaleMode::Major), seed, &mood).unwrap();
        let plan = plan_song(&c, &mut c.stage_rng(Stage::Plan));
        let chords = generate_chords(&c, &plan, &mut c.stage_rng(Stage::Chords));
        (c, plan, chords)
    }

    #[test]
    fn voicings_are_chord_tones_in_register() {
        let register = Instrument::Harmony.register();
        for seed in 0..12 {
            let (c, _, chords) = setup(seed, (seed % 4) as f64 / 3.0);
            let voicings = voice_segments(&mut c.stage_rng(Stage::Harmony), &c, &chords);
            assert_eq!(voicings.len(), chords.len());
            for (seg, v) in chords.iter().zip(&voicings) {
                assert!(!v.is_empty() && v.len() <= 5);
                assert!(v.iter().all(|&p| register.contains(p)), "{v:?}");
                let bass = v[0];
                assert!(seg.pcs.contains(&(bass.rem_euclid(12) as u8)), "{bass} not in {}", seg.label);
            }
        }
    }

    #[test]
    fn notes_stay_inside_segments() {
        let (c, plan, chords) = setup(21, 0.5);
        let notes = generate_harmony(&c, &chords, &plan, &mut c.stage_rng(Stage::Harmony));
        let song_end = bar_step_to_tick(c.length_bars, 0);
        assert!(!notes.is_empty());
        for n in &notes {
            assert!(n.duration >= 1);
            assert!(n.end_tick() <= song_end + 1);
        }
    }

    #[test]
    fn voice_count_follows_complexity() {
        let mut rng = ScoreRng::new(0);
        assert_eq!(voice_count(&mut rng, 0.2), 3);
        assert_eq!(voice_count(&mut rng, 0.6), 4);
        let counts: Vec<usize> = (0..100).map(|_| voice_count(&mut rng, 0.9)).collect();
        assert!(counts.iter().all(|&n| n == 4 || n == 5));
        assert!(counts.contains(&5));
    }
}
