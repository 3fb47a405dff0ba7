// Cached generation front-end.
//
// `Composer` holds the last song it generated behind an `Arc` so callers can
// keep a handle while the composer moves on. `regenerate` builds the whole new
// song first and only then swaps it in; a failed request leaves the previous
// song and controls in place.

use std::sync::Arc;

use crate::controls::Controls;
use crate::error::ComposeError;
use crate::pipeline::{Song, build_song};

#[derive(Debug, Default)]
pub struct Composer {
    current: Option<Arc<Song>>,
    generations: u64,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent song, if any generation has succeeded.
    pub fn current(&self) -> Option<Arc<Song>> {
        self.current.clone()
    }

    /// Number of successful generations.
    pub fn generations(&self) -> u64 {
        self.generations
    }

    /// Generate a song for `controls` and make it current.
    pub fn regenerate(&mut self, controls: &Controls) -> Result<Arc<Song>, ComposeError> {
        let song = Arc::new(build_song(controls)?);
        self.current = Some(Arc::clone(&song));
        self.generations += 1;
        tracing::debug!(
            generation = self.generations,
            seed = controls.seed,
            bars = song.length_bars(),
            "composer swapped in new song"
        );
        Ok(song)
    }

    /// Regenerate with the current controls but a different seed.
    pub fn reseed(&mut self, seed: u64) -> Option<Result<Arc<Song>, ComposeError>> {
        let song = self.current.as_ref()?;
        let controls = Controls::new(
            song.controls.length_bars as i64,
            u32::from(song.controls.tempo_bpm),
            song.controls.key,
            seed,
            &song.controls.derived.mood,
        );
        Some(controls.and_then(|c| self.regenerate(&c)))
    }
}
