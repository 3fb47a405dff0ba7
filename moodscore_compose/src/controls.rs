// Control mapping: human-facing mood knobs to engine parameters.
//
// A request names a style (pop, jazz, classical) and five normalized mood
// knobs: valence, arousal, intensity, complexity, tightness. `map_controls`
// turns them into:
//
// - a secondary knob set (functional clarity, chromaticism, groove archetype,
//   lift profile, motif repetition, ...) computed by fixed blends, and
// - the eight engine scalars every generator reads (density, syncopation,
//   swing, chord complexity, repetition, variation, energy, cadence
//   strength), each a lerp inside the style's min/max range, plus the
//   humanization amounts.
//
// Groove archetype and lift profile are seeded weighted draws over the
// style's pools, so the mapping is deterministic for a given seed.
//
// `Controls` is the validated, immutable request every later stage receives.
// It also hands out the per-stage random streams (`seed + stage offset`).

use moodscore_prng::ScoreRng;
use serde::{Deserialize, Serialize};

use crate::error::ComposeError;
use crate::theory::Key;
use crate::util::{clamp01, lerp, lerp_range};

/// Stylistic family. Unknown names map to `Pop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    Pop,
    Jazz,
    Classical,
}

impl Style {
    /// Case-insensitive lookup; anything unrecognized falls back to pop.
    pub fn from_name(name: &str) -> Style {
        match name.trim().to_lowercase().as_str() {
            "pop" | "" => Style::Pop,
            "jazz" => Style::Jazz,
            "classical" => Style::Classical,
            other => {
                tracing::warn!(style = other, "unknown style, using pop profile");
                Style::Pop
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Style::Pop => "pop",
            Style::Jazz => "jazz",
            Style::Classical => "classical",
        }
    }

    pub fn profile(self) -> &'static StyleProfile {
        match self {
            Style::Pop => &POP_PROFILE,
            Style::Jazz => &JAZZ_PROFILE,
            Style::Classical => &CLASSICAL_PROFILE,
        }
    }
}

/// Rhythmic feel family. The first four double as drum-pattern archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrooveArchetype {
    StraightPop,
    FourOnFloor,
    HalfTime,
    Bouncy,
    Straight,
    Swing,
    LaidBack,
    Latin,
    Waltz,
    March,
}

impl GrooveArchetype {
    /// Baseline groove level used by `derive_groove_sync`.
    pub fn groove_bias(self) -> f64 {
        match self {
            GrooveArchetype::Straight => 0.55,
            GrooveArchetype::StraightPop => 0.58,
            GrooveArchetype::FourOnFloor => 0.62,
            GrooveArchetype::HalfTime => 0.48,
            GrooveArchetype::Bouncy => 0.68,
            GrooveArchetype::Swing => 0.70,
            GrooveArchetype::LaidBack => 0.52,
            GrooveArchetype::Latin => 0.66,
            GrooveArchetype::Waltz => 0.50,
            GrooveArchetype::March => 0.56,
        }
    }

    /// Closest of the four drum-pattern archetypes.
    pub fn drum_family(self) -> GrooveArchetype {
        match self {
            GrooveArchetype::FourOnFloor => GrooveArchetype::FourOnFloor,
            GrooveArchetype::HalfTime | GrooveArchetype::LaidBack => GrooveArchetype::HalfTime,
            GrooveArchetype::Bouncy | GrooveArchetype::Swing | GrooveArchetype::Latin => {
                GrooveArchetype::Bouncy
            }
            GrooveArchetype::StraightPop
            | GrooveArchetype::Straight
            | GrooveArchetype::Waltz
            | GrooveArchetype::March => GrooveArchetype::StraightPop,
        }
    }

    fn is_swing_family(self) -> bool {
        self == GrooveArchetype::Swing
    }
}

/// Energy shape across the song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiftProfile {
    Lift,
    Plateau,
    Drop,
}

/// Per-style parameter ranges and archetype pools.
#[derive(Debug, Clone, Serialize)]
pub struct StyleProfile {
    pub density_range: (f64, f64),
    pub syncopation_range: (f64, f64),
    pub swing_range: (f64, f64),
    pub chord_complexity_range: (f64, f64),
    pub repetition_range: (f64, f64),
    pub variation_range: (f64, f64),
    pub energy_range: (f64, f64),
    pub cadence_strength_range: (f64, f64),
    pub groove_archetypes: &'static [(GrooveArchetype, f64)],
    pub lift_profiles: &'static [(LiftProfile, f64)],
}

static POP_PROFILE: StyleProfile = StyleProfile {
    density_range: (0.45, 0.78),
    syncopation_range: (0.20, 0.62),
    swing_range: (0.0, 0.14),
    chord_complexity_range: (0.20, 0.60),
    repetition_range: (0.55, 0.88),
    variation_range: (0.22, 0.60),
    energy_range: (0.42, 0.82),
    cadence_strength_range: (0.45, 0.82),
    groove_archetypes: &[
        (GrooveArchetype::StraightPop, 0.5),
        (GrooveArchetype::FourOnFloor, 0.3),
        (GrooveArchetype::Bouncy, 0.2),
    ],
    lift_profiles: &[
        (LiftProfile::Lift, 0.5),
        (LiftProfile::Plateau, 0.3),
        (LiftProfile::Drop, 0.2),
    ],
};

static JAZZ_PROFILE: StyleProfile = StyleProfile {
    density_range: (0.40, 0.72),
    syncopation_range: (0.35, 0.85),
    swing_range: (0.08, 0.32),
    chord_complexity_range: (0.55, 0.95),
    repetition_range: (0.35, 0.68),
    variation_range: (0.40, 0.85),
    energy_range: (0.35, 0.80),
    cadence_strength_range: (0.50, 0.90),
    groove_archetypes: &[
        (GrooveArchetype::Swing, 0.55),
        (GrooveArchetype::LaidBack, 0.30),
        (GrooveArchetype::Latin, 0.15),
    ],
    lift_profiles: &[
        (LiftProfile::Lift, 0.35),
        (LiftProfile::Plateau, 0.40),
        (LiftProfile::Drop, 0.25),
    ],
};

static CLASSICAL_PROFILE: StyleProfile = StyleProfile {
    density_range: (0.30, 0.60),
    syncopation_range: (0.10, 0.35),
    swing_range: (0.0, 0.05),
    chord_complexity_range: (0.30, 0.65),
    repetition_range: (0.40, 0.70),
    variation_range: (0.30, 0.70),
    energy_range: (0.30, 0.75),
    cadence_strength_range: (0.55, 0.95),
    groove_archetypes: &[
        (GrooveArchetype::Straight, 0.7),
        (GrooveArchetype::Waltz, 0.2),
        (GrooveArchetype::March, 0.1),
    ],
    lift_profiles: &[
        (LiftProfile::Lift, 0.25),
        (LiftProfile::Plateau, 0.45),
        (LiftProfile::Drop, 0.30),
    ],
};

/// The human-facing knobs, all in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleMoodControls {
    pub style: Style,
    pub mood_valence: f64,
    pub mood_arousal: f64,
    pub intensity: f64,
    pub complexity: f64,
    pub tightness: f64,
}

impl Default for StyleMoodControls {
    fn default() -> Self {
        StyleMoodControls {
            style: Style::Pop,
            mood_valence: 0.6,
            mood_arousal: 0.5,
            intensity: 0.5,
            complexity: 0.4,
            tightness: 0.6,
        }
    }
}

/// Secondary knobs derived from the mood controls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecondaryKnobs {
    pub functional_clarity: f64,
    pub chromaticism: f64,
    pub extension_richness: f64,
    pub turnaround_intensity: f64,
    pub groove_archetype: GrooveArchetype,
    pub swing_amount: f64,
    pub syncopation: f64,
    pub chord_tone_anchoring: f64,
    pub melodic_range: f64,
    pub motif_repetition: f64,
    pub form_strictness: f64,
    pub lift_profile: LiftProfile,
}

/// Everything downstream stages read from the mood mapping.
#[derive(Debug, Clone, Serialize)]
pub struct DerivedControls {
    pub mood: StyleMoodControls,
    pub secondary: SecondaryKnobs,
    pub profile: StyleProfile,
    pub density: f64,
    pub syncopation: f64,
    pub swing: f64,
    pub chord_complexity: f64,
    pub repetition: f64,
    pub variation: f64,
    pub energy: f64,
    pub cadence_strength: f64,
    pub humanize_timing_ms: f64,
    pub humanize_velocity: f64,
}

impl DerivedControls {
    pub fn style(&self) -> Style {
        self.mood.style
    }
}

/// Map mood knobs to engine parameters. Inputs are clamped; never fails.
pub fn map_controls(mood: &StyleMoodControls, rng: &mut ScoreRng) -> DerivedControls {
    let profile = mood.style.profile();

    let valence = clamp01(mood.mood_valence);
    let arousal = clamp01(mood.mood_arousal);
    let intensity = clamp01(mood.intensity);
    let complexity = clamp01(mood.complexity);
    let tightness = clamp01(mood.tightness);

    let groove_weights: Vec<(GrooveArchetype, f64)> = profile
        .groove_archetypes
        .iter()
        .map(|&(g, w)| {
            let adj = if g.is_swing_family() {
                lerp(0.7, 1.3, 1.0 - tightness)
            } else if g == GrooveArchetype::FourOnFloor {
                lerp(1.1, 0.8, 1.0 - tightness)
            } else {
                lerp(0.9, 1.2, intensity)
            };
            (g, w * adj)
        })
        .collect();
    let groove_archetype = rng
        .pick_weighted(&groove_weights)
        .copied()
        .unwrap_or(GrooveArchetype::StraightPop);

    let lift_weights: Vec<(LiftProfile, f64)> = profile
        .lift_profiles
        .iter()
        .map(|&(l, w)| {
            let adj = match l {
                LiftProfile::Lift => lerp(0.8, 1.35, valence),
                LiftProfile::Drop => lerp(1.3, 0.8, valence),
                LiftProfile::Plateau => 1.0,
            };
            (l, w * adj)
        })
        .collect();
    let lift_profile = rng
        .pick_weighted(&lift_weights)
        .copied()
        .unwrap_or(LiftProfile::Plateau);

    let swing_amount = clamp01(lerp_range(
        profile.swing_range,
        (1.0 - tightness) * 0.7 + intensity * 0.3,
    ));
    let syncopation = clamp01(lerp_range(profile.syncopation_range, 1.0 - tightness));

    let secondary = SecondaryKnobs {
        functional_clarity: clamp01(lerp(0.90, 0.35, complexity)),
        chromaticism: clamp01(lerp(0.10, 0.75, complexity)),
        extension_richness: clamp01(lerp(0.20, 0.92, complexity)),
        turnaround_intensity: clamp01(lerp(0.25, 0.90, intensity)),
        groove_archetype,
        swing_amount,
        syncopation,
        chord_tone_anchoring: clamp01(lerp(0.82, 0.28, complexity)),
        melodic_range: clamp01(lerp(0.30, 0.85, intensity)),
        motif_repetition: clamp01(lerp(0.25, 0.86, 1.0 - intensity)),
        form_strictness: clamp01(lerp(0.35, 0.95, tightness)),
        lift_profile,
    };

    let density = clamp01(lerp_range(
        profile.density_range,
        intensity * 0.6 + (1.0 - tightness) * 0.4,
    ));
    let chord_complexity = clamp01(lerp_range(profile.chord_complexity_range, complexity));
    let repetition = clamp01(lerp_range(profile.repetition_range, secondary.motif_repetition));
    let variation = clamp01(lerp_range(
        profile.variation_range,
        intensity * 0.5 + (1.0 - secondary.motif_repetition) * 0.5,
    ));
    let energy = clamp01(lerp_range(
        profile.energy_range,
        intensity * 0.65 + arousal * 0.35,
    ));
    let cadence_strength = clamp01(lerp_range(
        profile.cadence_strength_range,
        secondary.turnaround_intensity,
    ));

    DerivedControls {
        mood: StyleMoodControls {
            style: mood.style,
            mood_valence: valence,
            mood_arousal: arousal,
            intensity,
            complexity,
            tightness,
        },
        profile: profile.clone(),
        density,
        syncopation: secondary.syncopation,
        swing: secondary.swing_amount,
        chord_complexity,
        repetition,
        variation,
        energy,
        cadence_strength,
        humanize_timing_ms: lerp(2.0, 14.0, 1.0 - tightness),
        humanize_velocity: clamp01(lerp(0.04, 0.22, 1.0 - tightness)),
        secondary,
    }
}

/// Groove level and effective syncopation for a rhythm archetype.
///
/// Swing and syncopation pull the archetype's baseline groove toward 1.0;
/// the effective syncopation then leans up by a fraction of the groove.
pub fn derive_groove_sync(secondary: &SecondaryKnobs, archetype: GrooveArchetype) -> (f64, f64) {
    let influence = secondary.swing_amount * 0.6 + secondary.syncopation * 0.4;
    let groove = clamp01(lerp(archetype.groove_bias(), 1.0, influence));
    let sync = secondary.syncopation;
    let syncopation = clamp01(lerp(sync, (sync + groove * 0.18).min(1.0), 0.5));
    (groove, syncopation)
}

/// Pipeline stages that own a random stream. Each stage seeds its stream
/// with `seed + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Plan,
    Chords,
    Harmony,
    Bass,
    Melody,
    Drums,
    Mapping,
}

impl Stage {
    pub fn offset(self) -> u64 {
        match self {
            Stage::Plan => 0,
            Stage::Chords => 55,
            Stage::Harmony => 101,
            Stage::Bass => 202,
            Stage::Melody => 303,
            Stage::Drums => 404,
            Stage::Mapping => 606,
        }
    }
}

/// Validated request: length, tempo, key, seed, and mapped mood.
#[derive(Debug, Clone, Serialize)]
pub struct Controls {
    pub length_bars: usize,
    pub tempo_bpm: u16,
    pub key: Key,
    pub seed: u64,
    pub derived: DerivedControls,
}

impl Controls {
    /// Validate the raw request fields and run the mood mapping.
    pub fn new(
        length_bars: i64,
        tempo_bpm: u32,
        key: Key,
        seed: u64,
        mood: &StyleMoodControls,
    ) -> Result<Self, ComposeError> {
        if length_bars < 1 {
            return Err(ComposeError::InvalidLength(length_bars));
        }
        if tempo_bpm == 0 || tempo_bpm > u32::from(u16::MAX) {
            return Err(ComposeError::InvalidTempo(tempo_bpm));
        }
        let mut rng = ScoreRng::for_stage(seed, Stage::Mapping.offset());
        let derived = map_controls(mood, &mut rng);
        tracing::debug!(
            style = derived.style().name(),
            groove = ?derived.secondary.groove_archetype,
            density = derived.density,
            energy = derived.energy,
            "mapped mood controls"
        );
        Ok(Controls {
            length_bars: length_bars as usize,
            tempo_bpm: tempo_bpm as u16,
            key,
            seed,
            derived,
        })
    }

    /// Re-check the invariants `new` establishes, for hand-built values.
    pub fn validate(&self) -> Result<(), ComposeError> {
        if self.length_bars == 0 {
            return Err(ComposeError::InvalidLength(0));
        }
        if self.tempo_bpm == 0 {
            return Err(ComposeError::InvalidTempo(0));
        }
        Ok(())
    }

    pub fn stage_rng(&self, stage: Stage) -> ScoreRng {
        ScoreRng::for_stage(self.seed, stage.offset())
    }

    pub fn style(&self) -> Style {
        self.derived.style()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::ScaleMode;

    fn example_mood() -> StyleMoodControls {
        StyleMoodControls {
            style: Style::Pop,
            mood_valence: 0.70,
            mood_arousal: 0.55,
            intensity: 0.60,
            complexity: 0.40,
            tightness: 0.65,
        }
    }

    #[test]
    fn pop_blend_values() {
        let derived = map_controls(&example_mood(), &mut ScoreRng::new(17));
        assert!((derived.density - 0.615).abs() < 1e-9);
        assert!((derived.swing - 0.0595).abs() < 1e-9);
        assert!((derived.syncopation - lerp(0.20, 0.62, 0.35)).abs() < 1e-9);
        assert!((derived.humanize_timing_ms - lerp(2.0, 14.0, 0.35)).abs() < 1e-9);
        assert!((derived.secondary.motif_repetition - lerp(0.25, 0.86, 0.4)).abs() < 1e-9);
        assert!(POP_PROFILE
            .groove_archetypes
            .iter()
            .any(|(g, _)| *g == derived.secondary.groove_archetype));
    }

    #[test]
    fn outputs_stay_in_unit_range() {
        for style in [Style::Pop, Style::Jazz, Style::Classical] {
            for v in [-1.0, 0.0, 0.5, 1.0, 2.0] {
                let mood = StyleMoodControls {
                    style,
                    mood_valence: v,
                    mood_arousal: v,
                    intensity: v,
                    complexity: v,
                    tightness: v,
                };
                let d = map_controls(&mood, &mut ScoreRng::new(1));
                for x in [
                    d.density,
                    d.syncopation,
                    d.swing,
                    d.chord_complexity,
                    d.repetition,
                    d.variation,
                    d.energy,
                    d.cadence_strength,
                    d.humanize_velocity,
                ] {
                    assert!((0.0..=1.0).contains(&x), "{style:?} {v} -> {x}");
                }
            }
        }
    }

    #[test]
    fn unknown_style_falls_back_to_pop() {
        assert_eq!(Style::from_name("  Jazz "), Style::Jazz);
        assert_eq!(Style::from_name("polka"), Style::Pop);
    }

    #[test]
    fn groove_sync_leans_up() {
        let d = map_controls(&example_mood(), &mut ScoreRng::new(3));
        let (groove, sync) = derive_groove_sync(&d.secondary, GrooveArchetype::Bouncy);
        assert!(groove >= GrooveArchetype::Bouncy.groove_bias());
        assert!(sync >= d.secondary.syncopation);
        assert!(sync <= 1.0);
    }

    #[test]
    fn rejects_bad_length_and_tempo() {
        let key = Key::new(0, ScaleMode::Major);
        assert!(matches!(
            Controls::new(0, 120, key, 1, &example_mood()),
            Err(ComposeError::InvalidLength(0))
        ));
        assert!(matches!(
            Controls::new(-4, 120, key, 1, &example_mood()),
            Err(ComposeError::InvalidLength(-4))
        ));
        assert!(matches!(
            Controls::new(8, 0, key, 1, &example_mood()),
            Err(ComposeError::InvalidTempo(0))
        ));
        let ok = Controls::new(8, 120, key, 1, &example_mood()).unwrap();
        assert_eq!(ok.length_bars, 8);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn stage_streams_differ() {
        let c = Controls::new(4, 100, Key::new(0, ScaleMode::Major), 9, &example_mood()).unwrap();
        let a = c.stage_rng(Stage::Melody).next_u64();
        let b = c.stage_rng(Stage::Bass).next_u64();
        assert_ne!(a, b);
        assert_eq!(a, c.stage_rng(Stage::Melody).next_u64());
    }
}
