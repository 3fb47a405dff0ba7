// Song-level form planning.
//
// The plan is the shared skeleton every generator consumes, and it is built
// once from the controls with one random stream (the plan stage). In order:
//
// 1. Section pattern: phrases are 4 bars, so `ceil(length / 4)` phrases get
//    a pattern of intro/verse/chorus/bridge/outro from a library keyed by
//    phrase count (long forms are grown procedurally). The last section may
//    be truncated by the song length.
// 2. Per-bar modifiers: six multiplicative factors and a melodic register
//    shift sampled inside section-specific ranges, with boosts at non-final
//    phrase ends, clamped to safety bands.
// 3. Rhythm profile: drum archetype, base kick/snare/hat steps, hat and kick
//    biases, and fill style (forked stream).
// 4. Contour profile: melody shape and intensity (forked stream).
// 5. Section templates: one chord template per section kind from the
//    style's library, weighted by tags.
//
// Section boundaries always fall on multiples of `PHRASE_LEN_BARS`.

use moodscore_prng::ScoreRng;
use serde::{Deserialize, Serialize};

use crate::controls::{Controls, GrooveArchetype, LiftProfile, Style};
use crate::templates::{self, ChordTemplate, TemplateTag};
use crate::util::{clamp01, lerp};

/// Bars per phrase; also the section grid.
pub const PHRASE_LEN_BARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Intro,
    Verse,
    Chorus,
    Bridge,
    Outro,
}

impl SectionKind {
    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Intro => "intro",
            SectionKind::Verse => "verse",
            SectionKind::Chorus => "chorus",
            SectionKind::Bridge => "bridge",
            SectionKind::Outro => "outro",
        }
    }

    /// One-letter code used in pattern summaries.
    pub fn code(self) -> char {
        match self {
            SectionKind::Intro => 'I',
            SectionKind::Verse => 'V',
            SectionKind::Chorus => 'C',
            SectionKind::Bridge => 'B',
            SectionKind::Outro => 'O',
        }
    }

    /// Lerp ranges for (density, energy, sync, chord, variation, repetition)
    /// multipliers and the melodic shift, in that order.
    fn modifier_ranges(self) -> [(f64, f64); 7] {
        match self {
            SectionKind::Intro => [
                (0.65, 0.90),
                (0.65, 0.95),
                (0.75, 1.00),
                (0.85, 1.05),
                (0.85, 1.05),
                (1.00, 1.25),
                (-3.0, 1.0),
            ],
            SectionKind::Verse => [
                (0.75, 0.98),
                (0.78, 0.98),
                (0.85, 1.05),
                (0.90, 1.10),
                (0.85, 1.05),
                (1.05, 1.30),
                (-2.0, 1.0),
            ],
            SectionKind::Chorus => [
                (1.05, 1.25),
                (1.10, 1.40),
                (1.00, 1.25),
                (1.00, 1.20),
                (0.95, 1.20),
                (0.95, 1.15),
                (2.0, 6.0),
            ],
            SectionKind::Bridge => [
                (0.85, 1.10),
                (0.85, 1.20),
                (0.95, 1.20),
                (1.00, 1.30),
                (1.10, 1.45),
                (0.75, 1.00),
                (0.0, 4.0),
            ],
            SectionKind::Outro => [
                (0.70, 0.95),
                (0.70, 0.95),
                (0.80, 1.05),
                (0.90, 1.10),
                (0.85, 1.10),
                (1.05, 1.35),
                (-3.0, 1.0),
            ],
        }
    }
}

/// A section spanning bars `bar_start..bar_end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub bar_start: usize,
    pub bar_end: usize,
}

/// Per-bar shaping factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarModifier {
    pub section: SectionKind,
    pub density_mul: f64,
    pub energy_mul: f64,
    pub sync_mul: f64,
    pub chord_mul: f64,
    pub variation_mul: f64,
    pub repetition_mul: f64,
    pub melody_shift: i32,
    pub is_phrase_end: bool,
    pub is_section_start: bool,
    pub is_section_end: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStyle {
    SnareRoll,
    TomFill,
}

/// Drum groove skeleton shared by the drum and bass generators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmProfile {
    pub archetype: GrooveArchetype,
    pub kick_steps: Vec<u32>,
    pub snare_steps: Vec<u32>,
    pub hat_steps: Vec<u32>,
    pub hat_16th_bias: f64,
    pub kick_sync_bias: f64,
    pub fill_style: FillStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContourKind {
    Arch,
    Descending,
    Ascending,
    Wave,
    Plateau,
}

/// Song-wide melodic shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContourProfile {
    pub kind: ContourKind,
    pub intensity: f64,
}

impl ContourProfile {
    /// Register offset in semitones for a bar, scaled by intensity.
    pub fn offset(&self, bar: usize, length_bars: usize) -> f64 {
        if length_bars <= 1 {
            return 0.0;
        }
        let t = bar as f64 / (length_bars - 1) as f64;
        let raw = match self.kind {
            ContourKind::Arch => lerp(-1.5, 4.0, clamp01(1.0 - (2.0 * (t - 0.5)).powi(2))),
            ContourKind::Descending => lerp(4.0, -2.0, t),
            ContourKind::Ascending => lerp(-2.0, 4.0, t),
            ContourKind::Wave => (2.0 * std::f64::consts::PI * t * 2.0).sin() * 3.0,
            ContourKind::Plateau => lerp(0.0, 2.0, clamp01((t - 0.65) / 0.35)),
        };
        raw * self.intensity
    }
}

/// The chord template chosen for each section kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionTemplates {
    pub intro: ChordTemplate,
    pub verse: ChordTemplate,
    pub chorus: ChordTemplate,
    pub bridge: ChordTemplate,
    pub outro: ChordTemplate,
}

impl SectionTemplates {
    pub fn get(&self, kind: SectionKind) -> &ChordTemplate {
        match kind {
            SectionKind::Intro => &self.intro,
            SectionKind::Verse => &self.verse,
            SectionKind::Chorus => &self.chorus,
            SectionKind::Bridge => &self.bridge,
            SectionKind::Outro => &self.outro,
        }
    }
}

/// The complete structural plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongPlan {
    pub sections: Vec<Section>,
    pub bar_modifiers: Vec<BarModifier>,
    pub rhythm: RhythmProfile,
    pub contour: ContourProfile,
    pub templates: SectionTemplates,
    pub phrase_len_bars: usize,
}

impl SongPlan {
    pub fn length_bars(&self) -> usize {
        self.bar_modifiers.len()
    }

    pub fn bar(&self, bar: usize) -> Option<&BarModifier> {
        self.bar_modifiers.get(bar)
    }

    pub fn is_last_bar(&self, bar: usize) -> bool {
        bar + 1 == self.length_bars()
    }

    /// Section codes in order, e.g. `"IVCVC"`.
    pub fn pattern(&self) -> String {
        self.sections.iter().map(|s| s.kind.code()).collect()
    }
}

/// Build the plan from validated controls, drawing from `rng`.
pub fn plan_song(controls: &Controls, rng: &mut ScoreRng) -> SongPlan {
    let length = controls.length_bars.max(1);
    let phrase_count = length.div_ceil(PHRASE_LEN_BARS);

    let pattern = choose_section_pattern(rng, phrase_count);
    let mut sections = Vec::with_capacity(pattern.len());
    let mut bar = 0;
    for kind in pattern {
        let end = (bar + PHRASE_LEN_BARS).min(length);
        sections.push(Section {
            kind,
            bar_start: bar,
            bar_end: end,
        });
        bar = end;
        if bar >= length {
            break;
        }
    }

    let d = &controls.derived;
    let mut bar_modifiers = Vec::with_capacity(length);
    for b in 0..length {
        let (kind, start, end) = sections
            .iter()
            .find(|s| s.bar_start <= b && b < s.bar_end)
            .or(sections.last())
            .map(|s| (s.kind, s.bar_start, s.bar_end))
            .unwrap_or((SectionKind::Verse, 0, length));

        let is_last = b + 1 == length;
        let is_phrase_end = (b + 1) % PHRASE_LEN_BARS == 0 || is_last;

        let ranges = kind.modifier_ranges();
        let mut draw = |i: usize| lerp(ranges[i].0, ranges[i].1, rng.next_f64());
        let mut density_mul = draw(0);
        let mut energy_mul = draw(1);
        let mut sync_mul = draw(2);
        let mut chord_mul = draw(3);
        let mut variation_mul = draw(4);
        let mut repetition_mul = draw(5);
        let melody_shift = draw(6).round() as i32;

        if is_phrase_end && !is_last {
            energy_mul *= lerp(1.03, 1.10, clamp01(d.cadence_strength));
            sync_mul *= lerp(1.00, 1.10, clamp01(d.syncopation));
            variation_mul *= lerp(1.02, 1.20, clamp01(d.variation));
        }

        density_mul = density_mul.clamp(0.55, 1.35);
        energy_mul = energy_mul.clamp(0.55, 1.55);
        sync_mul = sync_mul.clamp(0.55, 1.55);
        chord_mul = chord_mul.clamp(0.70, 1.60);
        variation_mul = variation_mul.clamp(0.60, 1.70);
        repetition_mul = repetition_mul.clamp(0.60, 1.70);

        bar_modifiers.push(BarModifier {
            section: kind,
            density_mul,
            energy_mul,
            sync_mul,
            chord_mul,
            variation_mul,
            repetition_mul,
            melody_shift,
            is_phrase_end,
            is_section_start: b == start,
            is_section_end: b + 1 == end,
        });
    }

    let rhythm = build_rhythm_profile(controls, &mut rng.fork());
    let contour = build_contour(controls, &mut rng.fork());
    let templates = choose_section_templates(controls, rng);

    SongPlan {
        sections,
        bar_modifiers,
        rhythm,
        contour,
        templates,
        phrase_len_bars: PHRASE_LEN_BARS,
    }
}

fn choose_section_pattern(rng: &mut ScoreRng, phrase_count: usize) -> Vec<SectionKind> {
    use SectionKind::*;
    let library: &[&[SectionKind]] = match phrase_count {
        0 | 1 => &[&[Chorus], &[Verse]],
        2 => &[&[Verse, Chorus], &[Chorus, Chorus], &[Intro, Chorus]],
        3 => &[
            &[Verse, Chorus, Chorus],
            &[Verse, Chorus, Verse],
            &[Intro, Verse, Chorus],
        ],
        4 => &[
            &[Verse, Chorus, Verse, Chorus],
            &[Intro, Verse, Chorus, Chorus],
            &[Verse, Verse, Chorus, Chorus],
        ],
        5 => &[
            &[Verse, Chorus, Verse, Chorus, Outro],
            &[Intro, Verse, Chorus, Verse, Chorus],
            &[Verse, Chorus, Verse, Bridge, Chorus],
        ],
        6 => &[
            &[Verse, Chorus, Verse, Chorus, Bridge, Chorus],
            &[Intro, Verse, Chorus, Verse, Bridge, Chorus],
            &[Verse, Verse, Chorus, Verse, Bridge, Chorus],
        ],
        7 => &[
            &[Verse, Chorus, Verse, Chorus, Bridge, Chorus, Outro],
            &[Intro, Verse, Chorus, Verse, Chorus, Bridge, Chorus],
        ],
        8 => &[
            &[Intro, Verse, Chorus, Verse, Chorus, Bridge, Chorus, Outro],
            &[Verse, Chorus, Verse, Chorus, Bridge, Chorus, Verse, Chorus],
        ],
        _ => &[],
    };
    if let Some(pattern) = rng.choose(library) {
        return pattern.to_vec();
    }

    let mut pattern = vec![Intro, Verse, Chorus, Verse, Chorus];
    while pattern.len() < phrase_count {
        if pattern.len() + 2 == phrase_count {
            pattern.push(Bridge);
        } else if rng.random_bool(0.65) {
            pattern.push(Chorus);
        } else {
            pattern.push(Verse);
        }
    }
    pattern
}

fn build_rhythm_profile(controls: &Controls, rng: &mut ScoreRng) -> RhythmProfile {
    let d = &controls.derived;
    let preferred = d.secondary.groove_archetype.drum_family();
    let swing_pull = lerp(1.0, 1.5, clamp01(d.swing * 3.0));
    let weights: Vec<(GrooveArchetype, f64)> = [
        (GrooveArchetype::StraightPop, 0.40),
        (GrooveArchetype::FourOnFloor, 0.25),
        (GrooveArchetype::HalfTime, 0.18),
        (GrooveArchetype::Bouncy, 0.17),
    ]
    .into_iter()
    .map(|(a, w)| {
        let mut w = w;
        if a == preferred {
            w *= lerp(1.2, 2.0, d.secondary.form_strictness);
        }
        if matches!(a, GrooveArchetype::Bouncy | GrooveArchetype::HalfTime) {
            w *= swing_pull;
        }
        (a, w)
    })
    .collect();
    let archetype = rng
        .pick_weighted(&weights)
        .copied()
        .unwrap_or(GrooveArchetype::StraightPop);

    let (kick_steps, snare_steps, hat_bias, kick_bias) = match archetype {
        GrooveArchetype::FourOnFloor => (
            vec![0, 4, 8, 12],
            vec![4, 12],
            lerp(0.10, 0.65, d.density),
            lerp(0.05, 0.25, d.syncopation),
        ),
        GrooveArchetype::HalfTime => (
            vec![0, 6, 8],
            vec![8],
            lerp(0.08, 0.55, d.density),
            lerp(0.12, 0.55, d.syncopation),
        ),
        GrooveArchetype::Bouncy => (
            vec![0, 7, 10],
            vec![4, 12],
            lerp(0.18, 0.80, d.density),
            lerp(0.15, 0.60, d.syncopation),
        ),
        _ => (
            vec![0, 8],
            vec![4, 12],
            lerp(0.10, 0.55, d.density),
            lerp(0.08, 0.40, d.syncopation),
        ),
    };

    let fill_style = rng.pick_from(&[(FillStyle::SnareRoll, 0.60), (FillStyle::TomFill, 0.40)]);

    RhythmProfile {
        archetype,
        kick_steps,
        snare_steps,
        hat_steps: vec![0, 2, 4, 6, 8, 10, 12, 14],
        hat_16th_bias: clamp01(hat_bias),
        kick_sync_bias: clamp01(kick_bias),
        fill_style,
    }
}

fn build_contour(controls: &Controls, rng: &mut ScoreRng) -> ContourProfile {
    let d = &controls.derived;
    let style_bias = |kind: ContourKind| -> f64 {
        let by_style = match (d.style(), kind) {
            (Style::Classical, ContourKind::Arch) => 1.4,
            (Style::Classical, ContourKind::Descending) => 1.2,
            (Style::Classical, ContourKind::Wave) => 0.8,
            (Style::Jazz, ContourKind::Wave) => 1.4,
            (Style::Jazz, ContourKind::Plateau) => 0.7,
            (Style::Pop, ContourKind::Arch) => 1.1,
            (Style::Pop, ContourKind::Ascending) => 1.15,
            _ => 1.0,
        };
        let by_lift = match (d.secondary.lift_profile, kind) {
            (LiftProfile::Lift, ContourKind::Ascending) => 1.25,
            (LiftProfile::Drop, ContourKind::Descending) => 1.25,
            _ => 1.0,
        };
        by_style * by_lift
    };
    let weights: Vec<(ContourKind, f64)> = [
        (ContourKind::Arch, 0.30),
        (ContourKind::Descending, 0.18),
        (ContourKind::Ascending, 0.18),
        (ContourKind::Wave, 0.24),
        (ContourKind::Plateau, 0.10),
    ]
    .into_iter()
    .map(|(k, w)| (k, w * style_bias(k)))
    .collect();
    let kind = rng
        .pick_weighted(&weights)
        .copied()
        .unwrap_or(ContourKind::Arch);

    let intensity = clamp01(lerp(0.35, 1.0, d.variation * 0.6 + d.energy * 0.4));
    let intensity = clamp01(intensity * lerp(0.85, 1.10, rng.next_f64()));
    ContourProfile { kind, intensity }
}

fn choose_section_templates(controls: &Controls, rng: &mut ScoreRng) -> SectionTemplates {
    let d = &controls.derived;
    let mut all = templates::library(d.style(), controls.key.mode);
    if all.is_empty() {
        all.push(ChordTemplate::tonic_fallback());
    }

    let weigh = |t: &ChordTemplate, kind: SectionKind| -> f64 {
        let mut w = 1.0;
        let has = |tag| t.has_tag(tag);
        match kind {
            SectionKind::Chorus => {
                if has(TemplateTag::Anthem) {
                    w *= 1.8;
                }
                if has(TemplateTag::Classic) {
                    w *= 1.5;
                }
                if has(TemplateTag::Simple) {
                    w *= 1.2;
                }
                if has(TemplateTag::Mixture) {
                    w *= lerp(0.8, 1.35, d.chord_complexity);
                }
            }
            SectionKind::Verse => {
                if has(TemplateTag::Functional) {
                    w *= 1.6;
                }
                if has(TemplateTag::Smooth) {
                    w *= 1.3;
                }
                if has(TemplateTag::Mixture) {
                    w *= lerp(0.7, 1.45, d.variation);
                }
            }
            SectionKind::Bridge => {
                if has(TemplateTag::Mixture) {
                    w *= 1.8;
                }
                if has(TemplateTag::Functional) {
                    w *= 1.4;
                }
                if has(TemplateTag::Smooth) {
                    w *= 1.2;
                }
            }
            SectionKind::Intro | SectionKind::Outro => {
                if has(TemplateTag::Simple) {
                    w *= 1.6;
                }
                if has(TemplateTag::Anthem) {
                    w *= 0.9;
                }
                if kind == SectionKind::Intro && has(TemplateTag::Mixture) {
                    w *= 0.9;
                }
            }
        }
        w
    };

    let pick = |kind: SectionKind, rng: &mut ScoreRng| -> ChordTemplate {
        let pool: Vec<(&ChordTemplate, f64)> = all.iter().map(|t| (t, weigh(t, kind))).collect();
        rng.pick_weighted(&pool)
            .map(|t| (*t).clone())
            .unwrap_or_else(ChordTemplate::tonic_fallback)
    };

    let verse = pick(SectionKind::Verse, rng);
    let mut chorus = pick(SectionKind::Chorus, rng);
    let bridge = pick(SectionKind::Bridge, rng);

    if d.repetition >= 0.70 && rng.random_bool(lerp(0.35, 0.75, d.repetition)) {
        let anthems: Vec<&ChordTemplate> = all.iter().filter(|t| t.has_tag(TemplateTag::Anthem)).collect();
        if let Some(t) = rng.choose(&anthems) {
            chorus = (*t).clone();
        }
    }
    if d.repetition >= 0.80 && rng.random_bool(lerp(0.20, 0.65, d.repetition)) {
        chorus = verse.clone();
    }

    let intro = pick(SectionKind::Intro, rng);
    let outro = pick(SectionKind::Outro, rng);

    SectionTemplates {
        intro,
        verse,
        chorus,
        bridge,
        outro,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::StyleMoodControls;
    use crate::theory::{Key, ScaleMode};

    fn controls(length: i64, seed: u64, mood: StyleMoodControls) -> Controls {
        Controls::new(length, 110, Key::new(0, ScaleMode::Major), seed, &mood).unwrap()
    }

    #[test]
    fn sections_cover_song_on_phrase_grid() {
        for length in [1, 3, 4, 7, 8, 13, 32, 45] {
            for seed in 0..6 {
                let c = controls(length, seed, StyleMoodControls::default());
                let plan = plan_song(&c, &mut ScoreRng::new(seed));
                assert_eq!(plan.length_bars(), length as usize);
                assert_eq!(plan.sections[0].bar_start, 0);
                assert_eq!(plan.sections.last().unwrap().bar_end, length as usize);
                for w in plan.sections.windows(2) {
                    assert_eq!(w[0].bar_end, w[1].bar_start);
                }
                for s in &plan.sections {
                    assert_eq!(s.bar_start % PHRASE_LEN_BARS, 0);
                    assert!(s.bar_end > s.bar_start);
                }
            }
        }
    }

    #[test]
    fn modifiers_respect_bands_and_flags() {
        let c = controls(16, 4, StyleMoodControls::default());
        let plan = plan_song(&c, &mut ScoreRng::new(4));
        for (b, m) in plan.bar_modifiers.iter().enumerate() {
            assert!((0.55..=1.35).contains(&m.density_mul));
            assert!((0.55..=1.55).contains(&m.energy_mul));
            assert!((0.55..=1.55).contains(&m.sync_mul));
            assert!((0.70..=1.60).contains(&m.chord_mul));
            assert!((0.60..=1.70).contains(&m.variation_mul));
            assert!((0.60..=1.70).contains(&m.repetition_mul));
            assert_eq!(m.is_phrase_end, (b + 1) % 4 == 0);
            assert_eq!(m.is_section_start, b % 4 == 0);
        }
    }

    #[test]
    fn long_forms_end_with_bridge_then_one_more() {
        let mut rng = ScoreRng::new(8);
        let pattern = choose_section_pattern(&mut rng, 11);
        assert_eq!(pattern.len(), 11);
        assert_eq!(&pattern[..5], &[
            SectionKind::Intro,
            SectionKind::Verse,
            SectionKind::Chorus,
            SectionKind::Verse,
            SectionKind::Chorus
        ]);
        assert_eq!(pattern[9], SectionKind::Bridge);
    }

    #[test]
    fn contour_offsets() {
        let arch = ContourProfile { kind: ContourKind::Arch, intensity: 1.0 };
        assert!((arch.offset(0, 9) - -1.5).abs() < 1e-9);
        assert!((arch.offset(4, 9) - 4.0).abs() < 1e-9);
        let asc = ContourProfile { kind: ContourKind::Ascending, intensity: 0.5 };
        assert!((asc.offset(8, 9) - 2.0).abs() < 1e-9);
        assert_eq!(asc.offset(0, 1), 0.0);
        let plateau = ContourProfile { kind: ContourKind::Plateau, intensity: 1.0 };
        assert_eq!(plateau.offset(2, 9), 0.0);
    }

    #[test]
    fn rhythm_profile_is_one_of_the_drum_archetypes() {
        for seed in 0..20 {
            let c = controls(8, seed, StyleMoodControls::default());
            let plan = plan_song(&c, &mut ScoreRng::new(seed));
            assert!(matches!(
                plan.rhythm.archetype,
                GrooveArchetype::StraightPop
                    | GrooveArchetype::FourOnFloor
                    | GrooveArchetype::HalfTime
                    | GrooveArchetype::Bouncy
            ));
            assert_eq!(plan.rhythm.kick_steps[0], 0);
            assert!((0.0..=1.0).contains(&plan.contour.intensity));
        }
    }

    #[test]
    fn minor_plans_never_pick_mixture_templates() {
        for seed in 0..20 {
            let mood = StyleMoodControls { complexity: 1.0, ..StyleMoodControls::default() };
            let c = Controls::new(16, 100, Key::new(9, ScaleMode::Minor), seed, &mood).unwrap();
            let plan = plan_song(&c, &mut ScoreRng::new(seed));
            for kind in [
                SectionKind::Intro,
                SectionKind::Verse,
                SectionKind::Chorus,
                SectionKind::Bridge,
                SectionKind::Outro,
            ] {
                assert!(!plan.templates.get(kind).has_tag(TemplateTag::Mixture));
            }
        }
    }

    #[test]
    fn same_seed_same_plan() {
        let c = controls(24, 77, StyleMoodControls::default());
        let a = plan_song(&c, &mut ScoreRng::new(77));
        let b = plan_song(&c, &mut ScoreRng::new(77));
        assert_eq!(a, b);
    }
}
