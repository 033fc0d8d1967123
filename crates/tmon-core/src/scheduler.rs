use std::collections::HashMap;

use futures_util::{future::BoxFuture, stream::FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event::{EndReason, Event, ProducerEvent, ProducerId, Request};
use crate::producer::{self, MailboxReceiver, ProducerSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

enum MailboxState {
    /// Receiver parked until the owning panel asks for the next event.
    Idle(MailboxReceiver),
    /// A read is in flight; the receiver travels with it.
    Reading,
}

struct Mailbox {
    state: MailboxState,
    one_shot: bool,
}

struct Delivery {
    id: ProducerId,
    rx: MailboxReceiver,
    event: Option<ProducerEvent>,
}

/// Executes continuation requests for one render loop.
///
/// Owns the receiving half of every open mailbox. A mailbox is read only
/// when its owner asks for it, at most one read at a time, so delivery per
/// producer stays FIFO. Mailboxes are retired after their terminal event.
#[derive(Default)]
pub struct Scheduler {
    mailboxes: HashMap<ProducerId, Mailbox>,
    inflight: FuturesUnordered<BoxFuture<'static, Delivery>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes a batch in order. Stops at `Quit` without running the rest.
    pub fn submit(&mut self, requests: Vec<Request>) -> Flow {
        for request in requests {
            match request {
                Request::Spawn(spec) => self.spawn(spec),
                Request::Recv(id) => self.arm(id),
                Request::Quit => return Flow::Quit,
            }
        }
        Flow::Continue
    }

    /// Waits for the next delivery from any armed mailbox. Returns `None`
    /// immediately when nothing is armed.
    ///
    /// Cancel safe: a completed delivery is settled without awaiting again.
    pub async fn next_event(&mut self) -> Option<Event> {
        let delivery = self.inflight.next().await?;
        Some(self.settle(delivery))
    }

    pub fn has_pending(&self) -> bool {
        !self.inflight.is_empty()
    }

    pub fn is_open(&self, id: ProducerId) -> bool {
        self.mailboxes.contains_key(&id)
    }

    pub fn open_mailboxes(&self) -> usize {
        self.mailboxes.len()
    }

    fn spawn(&mut self, spec: ProducerSpec) {
        if self.mailboxes.contains_key(&spec.id) {
            warn!(event = "producer_duplicate", producer = %spec.id);
            return;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.insert(
            spec.id,
            Mailbox {
                state: MailboxState::Idle(rx),
                one_shot: spec.is_one_shot(),
            },
        );
        debug!(event = "producer_spawn", producer = %spec.id, kind = spec.label());
        tokio::spawn(producer::run(spec, tx));
    }

    fn arm(&mut self, id: ProducerId) {
        let Some(mailbox) = self.mailboxes.get_mut(&id) else {
            debug!(event = "recv_unknown_mailbox", producer = %id);
            return;
        };
        let MailboxState::Idle(mut rx) = std::mem::replace(&mut mailbox.state, MailboxState::Reading)
        else {
            debug!(event = "recv_already_armed", producer = %id);
            return;
        };
        self.inflight.push(Box::pin(async move {
            let event = rx.recv().await;
            Delivery { id, rx, event }
        }));
    }

    fn settle(&mut self, delivery: Delivery) -> Event {
        let Delivery { id, rx, event } = delivery;
        let event = event.unwrap_or(ProducerEvent::Ended(EndReason::Dropped));
        let retire = event.is_end()
            || self
                .mailboxes
                .get(&id)
                .map_or(true, |mailbox| mailbox.one_shot);
        if retire {
            self.mailboxes.remove(&id);
            debug!(event = "mailbox_retired", producer = %id);
        } else if let Some(mailbox) = self.mailboxes.get_mut(&id) {
            mailbox.state = MailboxState::Idle(rx);
        }
        Event::producer(id, event)
    }
}
