use std::fmt;

use crossterm::event::{Event as TermEvent, KeyEvent, KeyEventKind, MouseEvent};

use crate::producer::ProducerSpec;
use crate::service::StatusSnapshot;

/// Identity of one producer and its mailbox.
///
/// `owner` names the panel that spawned it; `generation` distinguishes
/// successive producers of the same panel (one per poll cycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProducerId {
    pub owner: &'static str,
    pub generation: u64,
}

impl ProducerId {
    pub const fn new(owner: &'static str, generation: u64) -> Self {
        Self { owner, generation }
    }

    pub fn next(self) -> Self {
        Self {
            owner: self.owner,
            generation: self.generation.wrapping_add(1),
        }
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    pub text: String,
}

impl LogChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Why a producer stopped. Always the last event of its mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    Eof,
    ReadFailed(String),
    SpawnFailed(String),
    /// The producer went away without announcing its end.
    Dropped,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Eof => f.write_str("end of stream"),
            EndReason::ReadFailed(err) => write!(f, "read failed: {err}"),
            EndReason::SpawnFailed(err) => write!(f, "could not start: {err}"),
            EndReason::Dropped => f.write_str("producer dropped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerEvent {
    Snapshot(StatusSnapshot),
    Chunk(LogChunk),
    Ended(EndReason),
}

impl ProducerEvent {
    pub fn is_end(&self) -> bool {
        matches!(self, ProducerEvent::Ended(_))
    }
}

/// Everything the render loop can hand to the component tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Resize { width: u16, height: u16 },
    Key(KeyEvent),
    Mouse(MouseEvent),
    Producer { id: ProducerId, event: ProducerEvent },
}

impl Event {
    /// Maps a crossterm terminal event; key releases and focus/paste events
    /// are dropped.
    pub fn from_terminal(event: TermEvent) -> Option<Self> {
        match event {
            TermEvent::Key(key) if key.kind != KeyEventKind::Release => Some(Event::Key(key)),
            TermEvent::Mouse(mouse) => Some(Event::Mouse(mouse)),
            TermEvent::Resize(width, height) => Some(Event::Resize { width, height }),
            _ => None,
        }
    }

    pub fn producer(id: ProducerId, event: ProducerEvent) -> Self {
        Event::Producer { id, event }
    }
}

/// Continuation requests returned by `init`/`handle`; executed by the
/// scheduler after the whole event has been processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Start a producer and open its mailbox.
    Spawn(ProducerSpec),
    /// Deliver the next event of this mailbox once it is available.
    Recv(ProducerId),
    Quit,
}
