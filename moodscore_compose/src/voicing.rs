// Chord voicing and parsimonious voice-leading.
//
// A voicing is an ascending list of MIDI pitches. The first voicing of a
// part is stacked upward from the chord tone nearest the register center;
// every later voicing is led from the previous one:
//
// 1. keep a voice that is already a chord tone inside the register
// 2. otherwise move it to the nearest chord tone
// 3. keep voices strictly ascending (no crossings)
// 4. separate duplicates by octave bumps, else the next free chord tone
//
// Results always lie inside the register. Voice count may shrink when the
// register holds too few chord tones.

use moodscore_prng::ScoreRng;

use crate::theory::{Register, nearest_in_set, tones_in_range};

/// Sorted, deduplicated chord tones of `pcs` inside `register`.
fn chord_tones(pcs: &[u8], low: i32, high: i32) -> Vec<i32> {
    let mut notes = tones_in_range(pcs, low, high);
    notes.dedup();
    notes
}

/// Pick a starting voicing of up to `voice_count` notes around the center.
pub fn initial_voicing(
    rng: &mut ScoreRng,
    pcs: &[u8],
    register: Register,
    voice_count: usize,
) -> Vec<i32> {
    let notes = chord_tones(pcs, register.low, register.high);
    if notes.is_empty() || voice_count == 0 {
        return Vec::new();
    }
    let first = nearest_in_set(register.center, &notes);
    let idx = notes.iter().position(|&n| n == first).unwrap_or(0);
    let last_idx = notes.len() - 1;

    let mut voicing = vec![first];
    while voicing.len() < voice_count {
        let step = rng.pick_from(&[(2usize, 0.45), (4, 0.35), (6, 0.15), (7, 0.05)]);
        let ni = (idx + step).min(last_idx);
        if !voicing.contains(&notes[ni]) {
            voicing.push(notes[ni]);
            continue;
        }
        let next = notes[(ni + 1).min(last_idx)];
        if voicing.contains(&next) {
            break;
        }
        voicing.push(next);
    }
    voicing.sort_unstable();
    voicing
}

/// Lead `prev` onto the chord `pcs` within `low..=high`.
///
/// Returns `prev` unchanged when the register holds no chord tones, and an
/// empty voicing when `prev` is empty.
pub fn voice_lead(prev: &[i32], pcs: &[u8], low: i32, high: i32) -> Vec<i32> {
    if prev.is_empty() {
        return Vec::new();
    }
    let targets = chord_tones(pcs, low, high);
    if targets.is_empty() {
        return prev.to_vec();
    }

    let mut sorted_prev = prev.to_vec();
    sorted_prev.sort_unstable();

    let mut led = Vec::with_capacity(prev.len());
    let mut last = low - 1;
    for v in sorted_prev {
        let in_chord = pcs.contains(&(v.rem_euclid(12) as u8));
        let mut chosen = if in_chord && (low..=high).contains(&v) {
            v
        } else {
            nearest_in_set(v, &targets)
        };
        if chosen <= last {
            let higher: Vec<i32> = targets.iter().copied().filter(|&n| n > last).collect();
            chosen = if higher.is_empty() {
                high.min(last + 1)
            } else {
                nearest_in_set(v, &higher)
            };
        }
        led.push(chosen);
        last = chosen;
    }

    let mut fixed: Vec<i32> = Vec::with_capacity(led.len());
    let mut last = low - 1;
    for n in led {
        let mut cand = n.max(last + 1);
        while fixed.contains(&cand) && cand + 12 <= high {
            cand += 12;
        }
        if fixed.contains(&cand) {
            cand = targets.iter().copied().find(|&x| x > last).unwrap_or(cand);
        }
        cand = cand.clamp(low, high);
        fixed.push(cand);
        last = cand;
    }
    fixed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_by_smallest_distance() {
        assert_eq!(voice_lead(&[60, 64, 67], &[7, 11, 2], 55, 76), vec![59, 62, 67]);
    }

    #[test]
    fn keeps_common_tones() {
        assert_eq!(voice_lead(&[60, 67, 72], &[0, 4, 7], 55, 76), vec![60, 67, 72]);
        assert_eq!(voice_lead(&[60, 67, 72], &[0, 4, 7], 52, 76), vec![60, 67, 72]);
    }

    #[test]
    fn empty_and_toneless_inputs() {
        assert!(voice_lead(&[], &[0, 4, 7], 50, 74).is_empty());
        // No pitch class 1 in a one-note register at 60.
        assert_eq!(voice_lead(&[60, 64], &[1], 60, 60), vec![60, 64]);
    }

    #[test]
    fn led_voicings_stay_in_register_and_ascend() {
        let chords: [&[u8]; 6] = [&[0, 4, 7], &[5, 9, 0, 4], &[7, 11, 2, 5], &[9, 0, 4], &[2, 5, 9, 0, 4], &[10, 2, 5]];
        let mut rng = ScoreRng::new(17);
        let register = Register::new(50, 74, 60);
        let mut v = initial_voicing(&mut rng, chords[0], register, 4);
        for _ in 0..5 {
            for pcs in chords {
                v = voice_lead(&v, pcs, register.low, register.high);
                assert!(v.iter().all(|&n| register.contains(n)), "{v:?}");
                assert!(v.windows(2).all(|w| w[0] <= w[1]), "{v:?}");
            }
        }
    }

    #[test]
    fn initial_voicing_is_sorted_chord_tones() {
        let register = Register::new(50, 74, 60);
        for seed in 0..50 {
            let mut rng = ScoreRng::new(seed);
            let v = initial_voicing(&mut rng, &[2, 5, 9, 0], register, 4);
            assert!(!v.is_empty() && v.len() <= 4);
            assert!(v.windows(2).all(|w| w[0] < w[1]));
            assert!(v.iter().all(|&n| [2, 5, 9, 0].contains(&(n % 12)) && register.contains(n)));
            assert_eq!(v[0], 60);
        }
        assert!(initial_voicing(&mut ScoreRng::new(1), &[1], Register::new(60, 60, 60), 3).is_empty());
    }
}
