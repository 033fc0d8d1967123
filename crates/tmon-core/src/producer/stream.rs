use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::MailboxSender;
use crate::config::CommandSpec;
use crate::event::{EndReason, LogChunk, ProducerEvent, ProducerId};

const EXIT_WAIT: Duration = Duration::from_secs(1);
const STDERR_LIMIT: usize = 4096;

pub(crate) async fn run(id: ProducerId, command: CommandSpec, chunk_size: usize, tx: MailboxSender) {
    info!(event = "stream_start", producer = %id, command = %command);
    let reason = relay(&command, chunk_size.max(1), &tx).await;
    info!(event = "stream_end", producer = %id, reason = %reason);
    let _ = tx.send(ProducerEvent::Ended(reason));
}

async fn relay(command: &CommandSpec, chunk_size: usize, tx: &MailboxSender) -> EndReason {
    let mut child = match command
        .tokio_command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            warn!(event = "stream_spawn_error", command = %command, error = %err);
            return EndReason::SpawnFailed(format!("{}: {err}", command.program));
        }
    };
    let Some(mut stdout) = child.stdout.take() else {
        return EndReason::SpawnFailed("stdout was not captured".to_string());
    };
    let mut stderr = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(collect_stderr(stderr)));

    if let Some(reason) = pump(&mut stdout, command, chunk_size, tx).await {
        if let Some(task) = stderr.take() {
            task.abort();
        }
        return reason;
    }

    match tokio::time::timeout(EXIT_WAIT, child.wait()).await {
        Ok(Ok(status)) if !status.success() => {
            let detail = match stderr.take() {
                Some(task) => stderr_detail(task).await,
                None => String::new(),
            };
            let detail = detail.trim();
            if detail.is_empty() {
                EndReason::ReadFailed(format!("{} {status}", command.program))
            } else {
                EndReason::ReadFailed(detail.to_string())
            }
        }
        _ => {
            if let Some(task) = stderr.take() {
                task.abort();
            }
            EndReason::Eof
        }
    }
}

/// Relays stdout until EOF. `Some(reason)` when the stream stopped early.
async fn pump<R: AsyncRead + Unpin>(
    stdout: &mut R,
    command: &CommandSpec,
    chunk_size: usize,
    tx: &MailboxSender,
) -> Option<EndReason> {
    let mut buf = vec![0u8; chunk_size];
    let mut carry = Utf8Carry::default();
    loop {
        let read = tokio::select! {
            read = stdout.read(&mut buf) => read,
            _ = tx.closed() => {
                debug!(event = "stream_mailbox_closed", command = %command);
                return Some(EndReason::Dropped);
            }
        };
        match read {
            Ok(0) => break,
            Ok(n) => {
                let text = carry.push(&buf[..n]);
                if text.is_empty() {
                    continue;
                }
                if tx.send(ProducerEvent::Chunk(LogChunk::new(text))).is_err() {
                    return Some(EndReason::Dropped);
                }
            }
            Err(err) => return Some(EndReason::ReadFailed(err.to_string())),
        }
    }

    let rest = carry.finish();
    if !rest.is_empty() {
        let _ = tx.send(ProducerEvent::Chunk(LogChunk::new(rest)));
    }
    None
}

/// Whatever stderr the exited child left. A descendant that still holds
/// the pipe open gets `EXIT_WAIT`, then the collector is dropped.
async fn stderr_detail(mut task: JoinHandle<String>) -> String {
    match tokio::time::timeout(EXIT_WAIT, &mut task).await {
        Ok(Ok(detail)) => detail,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            debug!(event = "stream_stderr_held_open");
            task.abort();
            String::new()
        }
    }
}

async fn collect_stderr<R: AsyncRead + Unpin>(mut stderr: R) -> String {
    let mut kept = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = STDERR_LIMIT.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    String::from_utf8_lossy(&kept).into_owned()
}

/// Decodes a byte stream read in arbitrary pieces, holding back an
/// incomplete UTF-8 sequence at the end of a piece until the next one.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    if let Ok(prefix) = std::str::from_utf8(&self.pending[..valid_up_to]) {
                        out.push_str(prefix);
                    }
                    match err.error_len() {
                        None => {
                            self.pending.drain(..valid_up_to);
                            return out;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + len);
                        }
                    }
                }
            }
        }
    }

    /// Flushes whatever is held back, lossily.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
