// Moodscore procedural composer
//
// Turns a handful of style and mood sliders plus a seed into a four-part song
// (melody, harmony comping, bass, drums) and writes it as a Standard MIDI
// File with an optional JSON analysis report. Generation is a one-way
// pipeline: the mood sliders are mapped to engine parameters, a plan lays out
// sections and per-bar modifiers, chords are generated over the plan, and
// each instrument part renders independently from the plan and chords.
//
// Architecture:
// - util.rs: lerp / clamp helpers shared by every stage
// - timing.rs: 480 PPQ tick grid, swing, humanization
// - theory.rs: keys, modes, chord spelling, registers, pitch names
// - templates.rs: chord token grammar and per-style progression templates
// - controls.rs: style profiles, mood-to-engine mapping, validated `Controls`
// - plan.rs: section layout, per-bar modifiers, rhythm and contour profiles
// - harmony.rs: chord token resolution and chord segment generation
// - voicing.rs: chord voicing and voice leading
// - melody.rs / comping.rs / bass.rs / drums.rs: the four part renderers
// - events.rs: note events, instruments, channel message finalization
// - pipeline.rs: stage entry points and whole-song generation
// - composer.rs: cached song holder with atomic regeneration
// - analysis.rs: roman numerals, cadences, rhythm/melody/counterpoint analysis
// - report.rs: JSON report with injected `Analyzer`s
// - midi.rs: SMF output via `midly`
// - config.rs: serde generation request
//
// The generator is deterministic given a seed: every stage draws from its own
// `ScoreRng` stream derived from `seed + stage offset`.

pub mod analysis;
pub mod bass;
pub mod comping;
pub mod composer;
pub mod config;
pub mod controls;
pub mod drums;
pub mod error;
pub mod events;
pub mod harmony;
pub mod melody;
pub mod midi;
pub mod pipeline;
pub mod plan;
pub mod report;
pub mod templates;
pub mod theory;
pub mod timing;
pub mod util;
pub mod voicing;

pub use config::GenerationRequest;
pub use controls::{Controls, Style, StyleMoodControls};
pub use error::ComposeError;
pub use events::{Instrument, NoteEvent};
pub use pipeline::{Part, Song, build_chords, build_part, build_plan, build_song};
pub use report::{Analyzer, SongReport, build_report};
