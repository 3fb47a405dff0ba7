// End-to-end properties of the generation pipeline: determinism, stage
// independence, chord coverage, cadences, registers, section alignment,
// message ordering, report contents, and MIDI layout.

use moodscore_compose::controls::{Controls, Style, StyleMoodControls};
use moodscore_compose::events::{ChannelMessage, Instrument};
use moodscore_compose::harmony::segments_in_bar;
use moodscore_compose::midi::song_to_smf;
use moodscore_compose::pipeline::{build_chords, build_part, build_plan, build_song};
use moodscore_compose::report::{Analyzer, build_report};
use moodscore_compose::theory::{Key, ScaleMode};
use moodscore_compose::timing::STEPS_PER_BAR;
use moodscore_compose::{GenerationRequest, Song};

fn controls(length: i64, seed: u64, style: Style) -> Controls {
    let mood = StyleMoodControls {
        style,
        ..StyleMoodControls::default()
    };
    Controls::new(length, 112, Key::new(0, ScaleMode::Major), seed, &mood).unwrap()
}

#[test]
fn same_seed_same_song() {
    let c = controls(16, 31337, Style::Pop);
    let a = build_song(&c).unwrap();
    let b = build_song(&c).unwrap();
    assert_eq!(a.plan, b.plan);
    assert_eq!(a.chords, b.chords);
    assert_eq!(a.parts, b.parts);
}

#[test]
fn different_seeds_differ() {
    let a = build_song(&controls(16, 1, Style::Pop)).unwrap();
    let b = build_song(&controls(16, 2, Style::Pop)).unwrap();
    assert_ne!(a.parts, b.parts);
}

#[test]
fn parts_render_independently_of_order() {
    let c = controls(12, 77, Style::Jazz);
    let plan = build_plan(&c).unwrap();
    let chords = build_chords(&c, &plan);
    let forward: Vec<_> = Instrument::ALL
        .iter()
        .map(|&i| build_part(i, &c, &chords, &plan))
        .collect();
    let mut backward: Vec<_> = Instrument::ALL
        .iter()
        .rev()
        .map(|&i| build_part(i, &c, &chords, &plan))
        .collect();
    backward.reverse();
    assert_eq!(forward, backward);
}

#[test]
fn every_bar_is_covered_by_chords() {
    for style in [Style::Pop, Style::Jazz, Style::Classical] {
        for seed in 0..6 {
            let song = build_song(&controls(20, seed, style)).unwrap();
            for bar in 0..song.length_bars() {
                let segs = segments_in_bar(&song.chords, bar);
                assert!(!segs.is_empty(), "bar {bar} uncovered");
                assert_eq!(segs[0].start_step, 0);
                assert_eq!(segs[segs.len() - 1].end_step, STEPS_PER_BAR);
                assert!(segs.windows(2).all(|w| w[0].end_step == w[1].start_step));
                for s in segs {
                    let mut pcs = s.pcs.clone();
                    pcs.sort_unstable();
                    pcs.dedup();
                    assert_eq!(pcs.len(), s.pcs.len(), "{} has duplicate pcs", s.label);
                }
            }
        }
    }
}

#[test]
fn strong_cadence_ends_on_tonic() {
    let mood = StyleMoodControls {
        intensity: 0.9,
        ..StyleMoodControls::default()
    };
    for seed in 0..10 {
        let c = Controls::new(8, 120, Key::new(0, ScaleMode::Major), seed, &mood).unwrap();
        let song = build_song(&c).unwrap();
        let last = segments_in_bar(&song.chords, 7);
        let tonic = last.last().unwrap();
        assert_eq!(tonic.label, "I");
        assert_eq!(tonic.root_pc, 0);
    }
}

#[test]
fn pitched_parts_stay_in_register() {
    for style in [Style::Pop, Style::Jazz, Style::Classical] {
        for seed in 0..5 {
            let song = build_song(&controls(16, seed, style)).unwrap();
            for inst in [Instrument::Melody, Instrument::Harmony, Instrument::Bass] {
                let reg = inst.register();
                for n in song.part(inst) {
                    assert!(
                        reg.contains(i32::from(n.pitch)),
                        "{} pitch {} outside {:?}",
                        inst.name(),
                        n.pitch,
                        reg
                    );
                }
            }
        }
    }
}

#[test]
fn sections_align_to_phrases() {
    for length in [4, 8, 13, 24, 32] {
        let song = build_song(&controls(length, 5, Style::Pop)).unwrap();
        let plan = &song.plan;
        assert_eq!(plan.length_bars(), length as usize);
        assert_eq!(plan.sections[0].bar_start, 0);
        assert_eq!(plan.sections.last().unwrap().bar_end, length as usize);
        for s in &plan.sections {
            assert_eq!(s.bar_start % plan.phrase_len_bars, 0);
            assert!(s.bar_end > s.bar_start);
        }
        assert!(plan.sections.windows(2).all(|w| w[0].bar_end == w[1].bar_start));
    }
}

#[test]
fn note_offs_precede_note_ons_at_equal_ticks() {
    let song = build_song(&controls(8, 3, Style::Jazz)).unwrap();
    for part in &song.parts {
        let msgs = part.messages();
        assert!(msgs.windows(2).all(|w| w[0].tick <= w[1].tick));
        for w in msgs.windows(2) {
            if w[0].tick == w[1].tick {
                let on_then_off = matches!(w[0].message, ChannelMessage::NoteOn { .. })
                    && matches!(w[1].message, ChannelMessage::NoteOff { .. });
                assert!(!on_then_off, "note-on before note-off at tick {}", w[0].tick);
            }
        }
    }
}

struct CountingAnalyzer;

impl Analyzer for CountingAnalyzer {
    fn name(&self) -> &str {
        "note_total"
    }

    fn analyze(&self, song: &Song) -> serde_json::Value {
        serde_json::json!(song.parts.iter().map(|p| p.notes.len()).sum::<usize>())
    }
}

#[test]
fn report_holds_only_injected_analyzers() {
    let song = build_song(&controls(8, 11, Style::Classical)).unwrap();
    assert!(build_report(&song, &[]).analyzers.is_empty());

    let report = build_report(&song, &[&CountingAnalyzer]);
    let total: usize = song.parts.iter().map(|p| p.notes.len()).sum();
    assert_eq!(report.analyzers.len(), 1);
    assert_eq!(report.analyzers["note_total"], serde_json::json!(total));
}

#[test]
fn midi_has_tempo_track_and_one_track_per_part() {
    let song = build_song(&controls(4, 9, Style::Pop)).unwrap();
    let smf = song_to_smf(&song);
    assert_eq!(smf.tracks.len(), 1 + Instrument::ALL.len());
}

#[test]
fn request_json_round_trip_to_song() {
    let req = GenerationRequest::from_json(
        r#"{"length_bars": 8, "key": "Eb", "mode": "mixolydian", "style": "jazz", "seed": 4}"#,
    )
    .unwrap();
    let song = build_song(&req.into_controls().unwrap()).unwrap();
    assert_eq!(song.length_bars(), 8);
    assert_eq!(song.controls.key, Key::new(3, ScaleMode::Mixolydian));
}
