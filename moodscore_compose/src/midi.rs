// Standard MIDI File output.
//
// Converts a rendered `Song` into an SMF Format 1 file: track 0 carries the
// tempo, a 4/4 time signature and the song title; each part gets its own
// track built from its finalized message stream (program change first,
// note-offs before note-ons at equal ticks). Ticks are already at 480 PPQ so
// message ticks are written as-is, converted to deltas.
//
// Uses the `midly` crate for MIDI writing.

use std::path::Path;

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};

use crate::error::ComposeError;
use crate::events::{ChannelMessage, TimedMessage, to_deltas};
use crate::pipeline::Song;
use crate::timing::TICKS_PER_QUARTER;

const SONG_TITLE: &str = "moodscore";

/// Convert a song to MIDI and write it to `path`.
pub fn write_midi(song: &Song, path: &Path) -> Result<(), ComposeError> {
    let buf = midi_bytes(song)?;
    std::fs::write(path, &buf)?;
    tracing::info!(path = %path.display(), bytes = buf.len(), "wrote midi");
    Ok(())
}

/// Encode a song as SMF bytes.
pub fn midi_bytes(song: &Song) -> Result<Vec<u8>, ComposeError> {
    let smf = song_to_smf(song);
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    Ok(buf)
}

fn meta(delta: u32, message: MetaMessage<'static>) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Meta(message),
    }
}

fn channel_event(delta: u32, msg: &TimedMessage) -> TrackEvent<'static> {
    let message = match msg.message {
        ChannelMessage::ProgramChange { program } => MidiMessage::ProgramChange {
            program: u7::new(program.min(127)),
        },
        ChannelMessage::NoteOff { pitch } => MidiMessage::NoteOff {
            key: u7::new(pitch.min(127)),
            vel: u7::new(0),
        },
        ChannelMessage::NoteOn { pitch, velocity } => MidiMessage::NoteOn {
            key: u7::new(pitch.min(127)),
            vel: u7::new(velocity.clamp(1, 127)),
        },
    };
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(msg.channel.min(15)),
            message,
        },
    }
}

/// Convert a song to an in-memory SMF.
pub fn song_to_smf(song: &Song) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER as u16)),
    ));

    // Track 0: tempo and meter
    let tempo_microseconds = 60_000_000 / u32::from(song.controls.tempo_bpm.max(1));
    smf.tracks.push(vec![
        meta(0, MetaMessage::TrackName(SONG_TITLE.as_bytes())),
        meta(0, MetaMessage::Tempo(u24::new(tempo_microseconds))),
        meta(0, MetaMessage::TimeSignature(4, 2, 24, 8)),
        meta(0, MetaMessage::EndOfTrack),
    ]);

    for part in &song.parts {
        let mut track: Track<'static> = Vec::new();
        track.push(meta(0, MetaMessage::TrackName(part.instrument.name().as_bytes())));
        for (delta, msg) in to_deltas(&part.messages()) {
            track.push(channel_event(delta, &msg));
        }
        track.push(meta(0, MetaMessage::EndOfTrack));
        smf.tracks.push(track);
    }

    smf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{Controls, StyleMoodControls};
    use crate::events::Instrument;
    use crate::pipeline::build_song;
    use crate::theory::{Key, ScaleMode};

    fn song() -> Song {
        let c = Controls::new(4, 100, Key::new(2, ScaleMode::Dorian), 99, &StyleMoodControls::default()).unwrap();
        build_song(&c).unwrap()
    }

    #[test]
    fn one_track_per_part_plus_tempo() {
        let smf = song_to_smf(&song());
        // 1 tempo track + 4 part tracks
        assert_eq!(smf.tracks.len(), 5);
        assert!(matches!(smf.header.format, Format::Parallel));
        assert!(smf.tracks[0]
            .iter()
            .any(|e| matches!(e.kind, TrackEventKind::Meta(MetaMessage::Tempo(t)) if t.as_int() == 600_000)));
    }

    #[test]
    fn drums_on_channel_ten_without_program() {
        let s = song();
        let smf = song_to_smf(&s);
        let drum_index = 1 + s.parts.iter().position(|p| p.instrument == Instrument::Drums).unwrap();
        for e in &smf.tracks[drum_index] {
            if let TrackEventKind::Midi { channel, message } = e.kind {
                assert_eq!(channel.as_int(), 9);
                assert!(!matches!(message, MidiMessage::ProgramChange { .. }));
            }
        }
    }

    #[test]
    fn note_ons_balance_note_offs() {
        let smf = song_to_smf(&song());
        for track in &smf.tracks[1..] {
            let ons = track
                .iter()
                .filter(|e| matches!(e.kind, TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. }))
                .count();
            let offs = track
                .iter()
                .filter(|e| matches!(e.kind, TrackEventKind::Midi { message: MidiMessage::NoteOff { .. }, .. }))
                .count();
            assert_eq!(ons, offs);
        }
    }

    #[test]
    fn bytes_parse_back() {
        let bytes = midi_bytes(&song()).unwrap();
        assert_eq!(&bytes[..4], b"MThd");
        let parsed = Smf::parse(&bytes).unwrap();
        assert_eq!(parsed.tracks.len(), 5);
    }
}
