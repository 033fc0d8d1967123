use std::io::{self, Write};

use russh::{server::Handle, ChannelId, CryptoVec};
use tokio::sync::mpsc;
use tracing::debug;

/// `io::Write` end of an SSH channel for the terminal backend.
///
/// Bytes are buffered until `flush`, then handed as one frame to
/// [`forward`], which owns the async send.
pub struct ChannelWriter {
    pending: Vec<u8>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            pending: Vec::new(),
            tx,
        }
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let frame = std::mem::take(&mut self.pending);
        self.tx
            .send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "ssh channel closed"))
    }
}

/// Sends frames to the client until every writer is gone or the channel
/// refuses data.
pub async fn forward(handle: Handle, channel: ChannelId, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(frame) = rx.recv().await {
        if handle.data(channel, CryptoVec::from_slice(&frame)).await.is_err() {
            debug!(event = "channel_write_failed", channel = ?channel);
            break;
        }
    }
}
