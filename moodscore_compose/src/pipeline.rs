// Generation entry points.
//
// `build_plan` and `build_chords` run the shared front half of the pipeline;
// `build_part` renders one instrument from the shared plan and chords. Every
// entry point builds its own stage stream from `seed + offset`, so a part
// renders identically whether it is built alone, in any order, or
// concurrently with the others. `build_song` does the latter with rayon.

use rayon::prelude::*;
use serde::Serialize;

use crate::bass::generate_bass;
use crate::comping::generate_harmony;
use crate::controls::{Controls, Stage};
use crate::drums::generate_drums;
use crate::error::ComposeError;
use crate::events::{Instrument, NoteEvent, TimedMessage, finalize};
use crate::harmony::{ChordSegment, generate_chords};
use crate::melody::generate_melody;
use crate::plan::{SongPlan, plan_song};

/// Validate `controls` and plan the song.
pub fn build_plan(controls: &Controls) -> Result<SongPlan, ComposeError> {
    controls.validate()?;
    let plan = plan_song(controls, &mut controls.stage_rng(Stage::Plan));
    tracing::debug!(
        bars = plan.length_bars(),
        pattern = %plan.pattern(),
        groove = ?plan.rhythm.archetype,
        "planned song"
    );
    Ok(plan)
}

/// Chord segments for every bar of `plan`.
pub fn build_chords(controls: &Controls, plan: &SongPlan) -> Vec<ChordSegment> {
    generate_chords(controls, plan, &mut controls.stage_rng(Stage::Chords))
}

fn stage_for(instrument: Instrument) -> Stage {
    match instrument {
        Instrument::Melody => Stage::Melody,
        Instrument::Harmony => Stage::Harmony,
        Instrument::Bass => Stage::Bass,
        Instrument::Drums => Stage::Drums,
    }
}

/// Render one part. Notes come back sorted by onset.
pub fn build_part(
    instrument: Instrument,
    controls: &Controls,
    chords: &[ChordSegment],
    plan: &SongPlan,
) -> Vec<NoteEvent> {
    let mut rng = controls.stage_rng(stage_for(instrument));
    match instrument {
        Instrument::Melody => generate_melody(controls, chords, plan, &mut rng),
        Instrument::Harmony => generate_harmony(controls, chords, plan, &mut rng),
        Instrument::Bass => generate_bass(controls, chords, plan, &mut rng),
        Instrument::Drums => generate_drums(controls, plan, &mut rng),
    }
}

/// A rendered part.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Part {
    pub instrument: Instrument,
    pub notes: Vec<NoteEvent>,
}

impl Part {
    /// Ordered channel messages for this part.
    pub fn messages(&self) -> Vec<TimedMessage> {
        finalize(self.instrument, &self.notes)
    }
}

/// Everything one generation pass produces.
#[derive(Debug, Clone, Serialize)]
pub struct Song {
    pub controls: Controls,
    pub plan: SongPlan,
    pub chords: Vec<ChordSegment>,
    /// In `Instrument::ALL` order.
    pub parts: Vec<Part>,
}

impl Song {
    pub fn part(&self, instrument: Instrument) -> &[NoteEvent] {
        self.parts
            .iter()
            .find(|p| p.instrument == instrument)
            .map_or(&[], |p| p.notes.as_slice())
    }

    pub fn length_bars(&self) -> usize {
        self.plan.length_bars()
    }
}

/// Plan, chords, then all four parts in parallel.
pub fn build_song(controls: &Controls) -> Result<Song, ComposeError> {
    let plan = build_plan(controls)?;
    let chords = build_chords(controls, &plan);
    let parts: Vec<Part> = Instrument::ALL
        .par_iter()
        .map(|&instrument| Part {
            instrument,
            notes: build_part(instrument, controls, &chords, &plan),
        })
        .collect();
    Ok(Song {
        controls: controls.clone(),
        plan,
        chords,
        parts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::StyleMoodControls;
    use crate::theory::{Key, ScaleMode};

    fn controls(seed: u64) -> Controls {
        Controls::new(8, 120, Key::new(0, ScaleMode::Major), seed, &StyleMoodControls::default()).unwrap()
    }

    #[test]
    fn song_parts_match_standalone_parts() {
        let c = controls(4242);
        let song = build_song(&c).unwrap();
        assert_eq!(song.parts.len(), 4);
        for instrument in Instrument::ALL {
            let alone = build_part(instrument, &c, &song.chords, &song.plan);
            assert_eq!(song.part(instrument), alone.as_slice());
        }
    }

    #[test]
    fn parts_in_instrument_order() {
        let song = build_song(&controls(1)).unwrap();
        let order: Vec<Instrument> = song.parts.iter().map(|p| p.instrument).collect();
        assert_eq!(order, Instrument::ALL.to_vec());
    }

    #[test]
    fn plan_rejects_hand_broken_controls() {
        let mut c = controls(1);
        c.length_bars = 0;
        assert!(matches!(build_plan(&c), Err(ComposeError::InvalidLength(0))));
    }
}
