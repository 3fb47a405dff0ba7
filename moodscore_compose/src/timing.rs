// Time base and feel helpers.
//
// The whole composer works on a 16-step bar at 480 ticks per quarter note,
// so one step (a sixteenth) is 120 ticks and a 4/4 bar is 1920 ticks. Parts
// place notes on steps and convert here; swing and humanization are the only
// sources of off-grid ticks.

use moodscore_prng::ScoreRng;

use crate::util::{clamp01, lerp};

/// Ticks per quarter note in all output.
pub const TICKS_PER_QUARTER: u32 = 480;

/// Grid resolution: sixteenth-note steps per 4/4 bar.
pub const STEPS_PER_BAR: u32 = 16;

/// Ticks per sixteenth step.
pub const TICKS_PER_STEP: u32 = TICKS_PER_QUARTER / 4;

/// Ticks per 4/4 bar.
pub const TICKS_PER_BAR: u32 = TICKS_PER_STEP * STEPS_PER_BAR;

/// Off-beat eighth positions in the 16-step grid; the only steps swing moves.
const SWUNG_STEPS: [u32; 4] = [2, 6, 10, 14];

/// Largest swing delay, a bit under half a sixteenth.
const MAX_SWING_TICKS: f64 = 45.0;

pub fn step_to_tick(step: u32) -> u32 {
    step * TICKS_PER_STEP
}

/// Absolute tick of a step inside a bar.
pub fn bar_step_to_tick(bar: usize, step: u32) -> u32 {
    bar as u32 * TICKS_PER_BAR + step_to_tick(step)
}

/// Swing delay for a step, in ticks.
pub fn swing_offset(step: u32, swing: f64) -> u32 {
    if SWUNG_STEPS.contains(&step) {
        (MAX_SWING_TICKS * clamp01(swing)).round() as u32
    } else {
        0
    }
}

/// Random timing jitter of up to `humanize_ms` either way, in ticks at
/// `bpm`. Does not draw when `humanize_ms` is zero.
pub fn humanize_ticks(rng: &mut ScoreRng, humanize_ms: f64, bpm: u16) -> i64 {
    if humanize_ms <= 0.0 {
        return 0;
    }
    let delta_ms = (rng.next_f64() * 2.0 - 1.0) * humanize_ms;
    let ticks_per_second = f64::from(TICKS_PER_QUARTER) * f64::from(bpm) / 60.0;
    (delta_ms / 1000.0 * ticks_per_second).round() as i64
}

/// Velocity jitter: spread up to 18 either way at `amount = 1`, result
/// clamped to 1..=127.
pub fn humanize_velocity(rng: &mut ScoreRng, base: i32, amount: f64) -> u8 {
    let spread = lerp(0.0, 18.0, clamp01(amount)).round() as i32;
    let v = base + rng.range_i32_inclusive(-spread, spread);
    v.clamp(1, 127) as u8
}

/// Apply a signed jitter to a tick without going below zero.
pub fn offset_tick(tick: u32, delta: i64) -> u32 {
    (i64::from(tick) + delta).max(0) as u32
}

/// Bar index containing an absolute tick.
pub fn bar_of_tick(tick: u32) -> usize {
    (tick / TICKS_PER_BAR) as usize
}

/// Nearest grid step of a tick within its bar (0..=16).
pub fn step_of_tick_in_bar(tick: u32) -> u32 {
    let in_bar = tick % TICKS_PER_BAR;
    (f64::from(in_bar) / f64::from(TICKS_PER_STEP)).round() as u32
}
