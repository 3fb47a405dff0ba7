// Generation request configuration.
//
// `GenerationRequest` is the serde-facing form of a generation call. Every
// field has a default, so a request file only needs the fields it changes;
// the CLI loads one (or starts from the defaults) and overrides fields from
// flags. `into_controls` is the single validation point: key, mode, length,
// and tempo errors all surface there, before any generation work.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::controls::{Controls, Style, StyleMoodControls};
use crate::error::ComposeError;
use crate::theory::Key;

pub const DEFAULT_SEED: u64 = 123_456_789;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub length_bars: i64,
    pub tempo_bpm: u32,
    pub key: String,
    pub mode: String,
    pub seed: u64,
    pub style: String,
    pub mood_valence: f64,
    pub mood_arousal: f64,
    pub intensity: f64,
    pub complexity: f64,
    pub tightness: f64,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        let mood = StyleMoodControls::default();
        GenerationRequest {
            length_bars: 16,
            tempo_bpm: 110,
            key: "C".to_string(),
            mode: "major".to_string(),
            seed: DEFAULT_SEED,
            style: mood.style.name().to_string(),
            mood_valence: mood.mood_valence,
            mood_arousal: mood.mood_arousal,
            intensity: mood.intensity,
            complexity: mood.complexity,
            tightness: mood.tightness,
        }
    }
}

impl GenerationRequest {
    pub fn from_json(text: &str) -> Result<Self, ComposeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ComposeError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Mood sliders as the mapper sees them. Unknown styles fall back to pop.
    pub fn mood(&self) -> StyleMoodControls {
        StyleMoodControls {
            style: Style::from_name(&self.style),
            mood_valence: self.mood_valence,
            mood_arousal: self.mood_arousal,
            intensity: self.intensity,
            complexity: self.complexity,
            tightness: self.tightness,
        }
    }

    /// Validate and map into `Controls`.
    pub fn into_controls(&self) -> Result<Controls, ComposeError> {
        let key = Key::parse(&self.key, &self.mode)?;
        Controls::new(self.length_bars, self.tempo_bpm, key, self.seed, &self.mood())
    }
}
