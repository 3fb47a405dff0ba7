// Moodscore composer: CLI entry point.
//
// Builds a song from a generation request and writes it to MIDI, optionally
// alongside a JSON analysis report.
//
// Usage:
//   cargo run -p moodscore_compose --bin generate -- [output.mid]
//     [--config request.json] [--report report.json] [--seed N] [--bars N]
//     [--tempo BPM] [--key NAME] [--mode MODE] [--style STYLE]
//     [--valence X] [--arousal X] [--intensity X] [--complexity X]
//     [--tightness X]
//
// Flags override fields loaded from --config. Set RUST_LOG=debug for
// per-stage logging.

use std::path::Path;

use moodscore_compose::ComposeError;
use moodscore_compose::config::GenerationRequest;
use moodscore_compose::midi::write_midi;
use moodscore_compose::pipeline::build_song;
use moodscore_compose::report::{ChordColorAnalyzer, build_report};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = run(&args) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<(), ComposeError> {
    let output_path = args
        .get(1)
        .filter(|s| !s.starts_with("--"))
        .map(|s| s.as_str())
        .unwrap_or("output.mid");

    let mut request = match parse_flag::<String>(args, "--config") {
        Some(path) => {
            tracing::info!(path = %path, "loading generation request");
            GenerationRequest::load(Path::new(&path))?
        }
        None => GenerationRequest::default(),
    };
    apply_overrides(&mut request, args);

    let controls = request.into_controls()?;
    tracing::info!(
        key = %controls.key,
        style = controls.style().name(),
        bars = controls.length_bars,
        tempo = controls.tempo_bpm,
        seed = controls.seed,
        "generating song"
    );

    let song = build_song(&controls)?;
    tracing::info!(
        pattern = %song.plan.pattern(),
        chords = song.chords.len(),
        "rendered {} parts",
        song.parts.len()
    );
    for part in &song.parts {
        tracing::info!(part = part.instrument.name(), notes = part.notes.len());
    }

    write_midi(&song, Path::new(output_path))?;

    if let Some(report_path) = parse_flag::<String>(args, "--report") {
        let report = build_report(&song, &[&ChordColorAnalyzer]);
        let json = report.to_json_pretty()?;
        std::fs::write(&report_path, json)?;
        tracing::info!(path = %report_path, "wrote report");
    }

    let seconds = song.length_bars() as f64 * 4.0 * 60.0 / f64::from(controls.tempo_bpm);
    tracing::info!("done: {} bars, {seconds:.0}s", song.length_bars());
    Ok(())
}

fn apply_overrides(request: &mut GenerationRequest, args: &[String]) {
    if let Some(v) = parse_flag(args, "--seed") {
        request.seed = v;
    }
    if let Some(v) = parse_flag(args, "--bars") {
        request.length_bars = v;
    }
    if let Some(v) = parse_flag(args, "--tempo") {
        request.tempo_bpm = v;
    }
    if let Some(v) = parse_flag(args, "--key") {
        request.key = v;
    }
    if let Some(v) = parse_flag(args, "--mode") {
        request.mode = v;
    }
    if let Some(v) = parse_flag(args, "--style") {
        request.style = v;
    }
    if let Some(v) = parse_flag(args, "--valence") {
        request.mood_valence = v;
    }
    if let Some(v) = parse_flag(args, "--arousal") {
        request.mood_arousal = v;
    }
    if let Some(v) = parse_flag(args, "--intensity") {
        request.intensity = v;
    }
    if let Some(v) = parse_flag(args, "--complexity") {
        request.complexity = v;
    }
    if let Some(v) = parse_flag(args, "--tightness") {
        request.tightness = v;
    }
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
