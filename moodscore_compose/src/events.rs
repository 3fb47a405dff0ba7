// Output events and the shared finalizer.
//
// Generators emit `NoteEvent`s (absolute tick, pitch, velocity, duration).
// `finalize` lowers a part's notes into channel messages on an absolute
// tick line, ordered so that at any shared tick program changes come first,
// then note-offs, then note-ons. That order keeps a repeated pitch from
// being cut off by its own previous release. `to_deltas` converts an
// ordered stream into delta times for MIDI tracks, and `merge` interleaves
// several finalized streams with the same tie-break.

use serde::{Deserialize, Serialize};

use crate::theory::Register;

/// The four generated parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instrument {
    Melody,
    Harmony,
    Bass,
    Drums,
}

/// General MIDI percussion note numbers used by the drum part.
pub mod drum_note {
    pub const KICK: u8 = 36;
    pub const SNARE: u8 = 38;
    pub const CLOSED_HAT: u8 = 42;
    pub const OPEN_HAT: u8 = 46;
    pub const CRASH: u8 = 49;
    pub const LOW_TOM: u8 = 45;
    pub const MID_TOM: u8 = 47;
    pub const HIGH_TOM: u8 = 50;
}

impl Instrument {
    pub const ALL: [Instrument; 4] = [
        Instrument::Melody,
        Instrument::Harmony,
        Instrument::Bass,
        Instrument::Drums,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Instrument::Melody => "Melody",
            Instrument::Harmony => "Harmony",
            Instrument::Bass => "Bass",
            Instrument::Drums => "Drums",
        }
    }

    /// MIDI channel, 0-based. Drums sit on the GM percussion channel.
    pub fn channel(self) -> u8 {
        match self {
            Instrument::Melody => 0,
            Instrument::Harmony => 1,
            Instrument::Bass => 2,
            Instrument::Drums => 9,
        }
    }

    /// GM program, or `None` for the percussion channel.
    pub fn program(self) -> Option<u8> {
        match self {
            Instrument::Melody => Some(4),
            Instrument::Harmony => Some(0),
            Instrument::Bass => Some(32),
            Instrument::Drums => None,
        }
    }

    /// Pitch register for pitched parts. Drums use the kit's note range.
    pub fn register(self) -> Register {
        match self {
            Instrument::Melody => Register::new(55, 96, 72),
            Instrument::Harmony => Register::new(50, 74, 60),
            Instrument::Bass => Register::new(34, 50, 36),
            Instrument::Drums => Register::new(35, 81, 38),
        }
    }
}

/// One note of a generated part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteEvent {
    pub tick: u32,
    pub pitch: u8,
    pub velocity: u8,
    pub duration: u32,
}

impl NoteEvent {
    /// Build a note spanning `start..end`, clamping pitch and velocity into
    /// MIDI range and keeping the duration at least one tick.
    pub fn spanning(start: u32, end: u32, pitch: i32, velocity: i32) -> Self {
        NoteEvent {
            tick: start,
            pitch: pitch.clamp(0, 127) as u8,
            velocity: velocity.clamp(1, 127) as u8,
            duration: end.saturating_sub(start).max(1),
        }
    }

    pub fn end_tick(&self) -> u32 {
        self.tick.saturating_add(self.duration)
    }
}

/// Sort a part's notes by onset, then pitch.
pub fn sort_notes(notes: &mut [NoteEvent]) {
    notes.sort_by_key(|n| (n.tick, n.pitch, n.duration));
}

/// A channel message. Variant order is the same-tick priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelMessage {
    ProgramChange { program: u8 },
    NoteOff { pitch: u8 },
    NoteOn { pitch: u8, velocity: u8 },
}

impl ChannelMessage {
    fn priority(&self) -> u8 {
        match self {
            ChannelMessage::ProgramChange { .. } => 0,
            ChannelMessage::NoteOff { .. } => 1,
            ChannelMessage::NoteOn { .. } => 2,
        }
    }

    fn pitch(&self) -> u8 {
        match *self {
            ChannelMessage::ProgramChange { .. } => 0,
            ChannelMessage::NoteOff { pitch } | ChannelMessage::NoteOn { pitch, .. } => pitch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimedMessage {
    pub tick: u32,
    pub channel: u8,
    pub message: ChannelMessage,
}

impl TimedMessage {
    fn order_key(&self) -> (u32, u8, u8, u8) {
        (self.tick, self.message.priority(), self.channel, self.message.pitch())
    }
}

/// Lower a part's notes to an ordered message stream on the part's channel.
pub fn finalize(instrument: Instrument, notes: &[NoteEvent]) -> Vec<TimedMessage> {
    let channel = instrument.channel();
    let mut out = Vec::with_capacity(notes.len() * 2 + 1);
    if let Some(program) = instrument.program() {
        out.push(TimedMessage {
            tick: 0,
            channel,
            message: ChannelMessage::ProgramChange { program },
        });
    }
    for n in notes {
        out.push(TimedMessage {
            tick: n.tick,
            channel,
            message: ChannelMessage::NoteOn {
                pitch: n.pitch,
                velocity: n.velocity,
            },
        });
        out.push(TimedMessage {
            tick: n.end_tick(),
            channel,
            message: ChannelMessage::NoteOff { pitch: n.pitch },
        });
    }
    out.sort_by_key(TimedMessage::order_key);
    out
}

/// Interleave already-finalized streams into one ordered stream.
pub fn merge(streams: &[Vec<TimedMessage>]) -> Vec<TimedMessage> {
    let mut out: Vec<TimedMessage> = streams.iter().flatten().copied().collect();
    out.sort_by_key(TimedMessage::order_key);
    out
}

/// Delta ticks for an ordered stream: each entry is the gap since the
/// previous message.
pub fn to_deltas(stream: &[TimedMessage]) -> Vec<(u32, TimedMessage)> {
    let mut last = 0u32;
    stream
        .iter()
        .map(|m| {
            let delta = m.tick.saturating_sub(last);
            last = last.max(m.tick);
            (delta, *m)
        })
        .collect()
}
