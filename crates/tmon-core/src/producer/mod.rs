//! Background producers and the description the scheduler starts them from.
//!
//! A producer owns one external command, turns its output into
//! [`ProducerEvent`]s and publishes them into its mailbox. It never sees
//! panel state. Both variants finish with a well-defined terminal event:
//! the poll producer with its single snapshot, the stream producer with
//! [`ProducerEvent::Ended`].

pub mod poll;
pub mod stream;

use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::CommandSpec;
use crate::event::{ProducerEvent, ProducerId};
use crate::service::Service;

pub type MailboxSender = mpsc::UnboundedSender<ProducerEvent>;
pub type MailboxReceiver = mpsc::UnboundedReceiver<ProducerEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSpec {
    pub id: ProducerId,
    pub kind: ProducerKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerKind {
    /// One status cycle over `services`, after sleeping `delay`.
    Poll {
        services: Vec<Service>,
        check: CommandSpec,
        delay: Duration,
    },
    /// Long-lived command relayed in chunks of at most `chunk_size` bytes.
    Stream {
        command: CommandSpec,
        chunk_size: usize,
    },
}

impl ProducerSpec {
    pub fn poll(id: ProducerId, services: Vec<Service>, check: CommandSpec, delay: Duration) -> Self {
        Self {
            id,
            kind: ProducerKind::Poll {
                services,
                check,
                delay,
            },
        }
    }

    pub fn stream(id: ProducerId, command: CommandSpec, chunk_size: usize) -> Self {
        Self {
            id,
            kind: ProducerKind::Stream {
                command,
                chunk_size,
            },
        }
    }

    /// One-shot producers deliver exactly one event; their mailbox is
    /// retired right after it.
    pub fn is_one_shot(&self) -> bool {
        matches!(self.kind, ProducerKind::Poll { .. })
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            ProducerKind::Poll { .. } => "poll",
            ProducerKind::Stream { .. } => "stream",
        }
    }
}

/// Runs the producer to completion, publishing into `tx`.
pub async fn run(spec: ProducerSpec, tx: MailboxSender) {
    let id = spec.id;
    match spec.kind {
        ProducerKind::Poll {
            services,
            check,
            delay,
        } => poll::run(id, services, check, delay, tx).await,
        ProducerKind::Stream {
            command,
            chunk_size,
        } => stream::run(id, command, chunk_size, tx).await,
    }
}
