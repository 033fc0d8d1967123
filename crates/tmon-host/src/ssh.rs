use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::future::join_all;
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal, TerminalOptions, Viewport};
use russh::server::{self, Auth, Msg, Server as _, Session};
use russh::{Channel, ChannelId, CryptoVec};
use russh_keys::key::{KeyPair, PublicKey};
use tmon_core::{run_dashboard, Dashboard, DashboardConfig, Event, UiReceiver};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::input;
use crate::writer::{self, ChannelWriter};
use crate::HostConfig;

const NO_TERMINAL: &[u8] = b"no active terminal, skipping\r\n";

/// Accepts SSH connections and runs one dashboard per interactive channel
/// until a shutdown signal, then waits out the grace period.
pub async fn serve(host: &HostConfig, dashboard: DashboardConfig) -> anyhow::Result<()> {
    let key = load_host_key(host.host_key.as_deref())?;
    let config = Arc::new(server::Config {
        keys: vec![key],
        inactivity_timeout: None,
        auth_rejection_time: Duration::from_millis(250),
        ..Default::default()
    });
    let sessions = SessionRegistry::default();
    let mut server = DashboardServer {
        dashboard: Arc::new(dashboard),
        sessions: sessions.clone(),
        next_id: 0,
    };

    info!(event = "server_start", addr = %host.addr);
    tokio::select! {
        result = server.run_on_address(config, host.addr.as_str()) => {
            result.with_context(|| format!("ssh server on {}", host.addr))?;
        }
        _ = shutdown_signal() => {
            info!(event = "shutdown_signal", open_sessions = sessions.len().await);
        }
    }
    sessions.drain(host.shutdown_grace).await;
    info!(event = "server_stop");
    Ok(())
}

fn load_host_key(path: Option<&Path>) -> anyhow::Result<KeyPair> {
    match path {
        Some(path) => russh_keys::load_secret_key(path, None)
            .with_context(|| format!("loading host key {}", path.display())),
        None => {
            debug!(event = "host_key_generated", algorithm = "ed25519");
            KeyPair::generate_ed25519().ok_or_else(|| anyhow!("generating ed25519 host key"))
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(err) => {
                    warn!(event = "signal_error", error = %err);
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Running dashboard tasks keyed by session id. A task removes itself when
/// it finishes.
#[derive(Clone, Default)]
struct SessionRegistry {
    tasks: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
}

impl SessionRegistry {
    async fn insert(&self, id: u64, task: JoinHandle<()>) {
        self.tasks.lock().await.insert(id, task);
    }

    async fn remove(&self, id: u64) {
        self.tasks.lock().await.remove(&id);
    }

    async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    async fn drain(&self, grace: Duration) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain().map(|(_, task)| task).collect();
        if tasks.is_empty() {
            return;
        }
        info!(event = "sessions_draining", count = tasks.len(), grace_secs = grace.as_secs());
        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(grace, join_all(tasks)).await.is_err() {
            warn!(event = "sessions_aborted", count = aborts.len());
            for handle in aborts {
                handle.abort();
            }
        }
    }
}

struct DashboardServer {
    dashboard: Arc<DashboardConfig>,
    sessions: SessionRegistry,
    next_id: u64,
}

impl server::Server for DashboardServer {
    type Handler = SessionHandler;

    fn new_client(&mut self, peer: Option<SocketAddr>) -> SessionHandler {
        self.next_id += 1;
        info!(event = "client_connect", session = self.next_id, peer = ?peer);
        SessionHandler {
            id: self.next_id,
            peer,
            dashboard: self.dashboard.clone(),
            sessions: self.sessions.clone(),
            channel: None,
            size: None,
            ui_tx: None,
        }
    }
}

/// Per-connection state. Only the first session channel gets a dashboard.
struct SessionHandler {
    id: u64,
    peer: Option<SocketAddr>,
    dashboard: Arc<DashboardConfig>,
    sessions: SessionRegistry,
    channel: Option<ChannelId>,
    size: Option<(u16, u16)>,
    ui_tx: Option<mpsc::UnboundedSender<Event>>,
}

impl SessionHandler {
    fn owns(&self, channel: ChannelId) -> bool {
        self.channel == Some(channel)
    }

    fn send_ui(&mut self, event: Event) {
        let Some(tx) = self.ui_tx.as_ref() else {
            return;
        };
        if tx.send(event).is_err() {
            debug!(event = "ui_send_after_exit", session = self.id);
            self.ui_tx = None;
        }
    }
}

fn clamp_size(columns: u32, rows: u32) -> (u16, u16) {
    let clamp = |value: u32| u16::try_from(value).unwrap_or(u16::MAX);
    (clamp(columns), clamp(rows))
}

#[async_trait]
impl server::Handler for SessionHandler {
    type Error = anyhow::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        debug!(event = "auth_accept", session = self.id, user, method = "none");
        Ok(Auth::Accept)
    }

    async fn auth_password(&mut self, user: &str, _password: &str) -> Result<Auth, Self::Error> {
        debug!(event = "auth_accept", session = self.id, user, method = "password");
        Ok(Auth::Accept)
    }

    async fn auth_publickey(&mut self, user: &str, _key: &PublicKey) -> Result<Auth, Self::Error> {
        debug!(event = "auth_accept", session = self.id, user, method = "publickey");
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if self.channel.is_some() {
            debug!(event = "extra_channel_rejected", session = self.id);
            return Ok(false);
        }
        self.channel = Some(channel.id());
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if !self.owns(channel) {
            return Ok(());
        }
        let size = clamp_size(col_width, row_height);
        debug!(event = "pty_request", session = self.id, term, width = size.0, height = size.1);
        self.size = Some(size);
        session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(&mut self, channel: ChannelId, session: &mut Session) -> Result<(), Self::Error> {
        if !self.owns(channel) || self.ui_tx.is_some() {
            return Ok(());
        }
        let Some((width, height)) = self.size else {
            info!(event = "session_skipped", session = self.id, reason = "no pty");
            session.data(channel, CryptoVec::from_slice(NO_TERMINAL));
            session.eof(channel);
            session.close(channel);
            return Ok(());
        };
        session.channel_success(channel);

        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let _ = ui_tx.send(Event::Resize { width, height });
        self.ui_tx = Some(ui_tx);

        let id = self.id;
        let handle = session.handle();
        let dashboard = self.dashboard.clone();
        let sessions = self.sessions.clone();
        info!(event = "session_start", session = id, peer = ?self.peer, width, height);
        let task = tokio::spawn(async move {
            run_session(id, handle, channel, (width, height), dashboard, ui_rx).await;
            sessions.remove(id).await;
        });
        self.sessions.insert(id, task).await;
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if !self.owns(channel) {
            return Ok(());
        }
        let (width, height) = clamp_size(col_width, row_height);
        self.size = Some((width, height));
        self.send_ui(Event::Resize { width, height });
        Ok(())
    }

    async fn data(&mut self, channel: ChannelId, data: &[u8], _session: &mut Session) -> Result<(), Self::Error> {
        if !self.owns(channel) {
            return Ok(());
        }
        for event in input::decode(data) {
            self.send_ui(event);
        }
        Ok(())
    }

    async fn channel_eof(&mut self, channel: ChannelId, _session: &mut Session) -> Result<(), Self::Error> {
        if self.owns(channel) {
            debug!(event = "channel_eof", session = self.id);
            self.ui_tx = None;
        }
        Ok(())
    }

    async fn channel_close(&mut self, channel: ChannelId, _session: &mut Session) -> Result<(), Self::Error> {
        if self.owns(channel) {
            debug!(event = "channel_close", session = self.id);
            self.ui_tx = None;
        }
        Ok(())
    }
}

impl Drop for SessionHandler {
    fn drop(&mut self) {
        info!(event = "client_disconnect", session = self.id, peer = ?self.peer);
    }
}

async fn run_session(
    id: u64,
    handle: server::Handle,
    channel: ChannelId,
    size: (u16, u16),
    dashboard: Arc<DashboardConfig>,
    mut ui_rx: UiReceiver,
) {
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let forwarder = tokio::spawn(writer::forward(handle.clone(), channel, frames_rx));

    match drive_terminal(ChannelWriter::new(frames_tx), size, &dashboard, &mut ui_rx).await {
        Ok(()) => info!(event = "session_end", session = id),
        Err(err) => warn!(event = "session_error", session = id, error = %err),
    }

    let _ = forwarder.await;
    let _ = handle.eof(channel).await;
    let _ = handle.close(channel).await;
}

async fn drive_terminal(
    writer: ChannelWriter,
    (width, height): (u16, u16),
    config: &DashboardConfig,
    ui_rx: &mut UiReceiver,
) -> anyhow::Result<()> {
    let options = TerminalOptions {
        viewport: Viewport::Fixed(Rect::new(0, 0, width, height)),
    };
    let mut terminal = Terminal::with_options(CrosstermBackend::new(writer), options)?;
    execute!(terminal.backend_mut(), EnterAlternateScreen, EnableMouseCapture)?;
    terminal.hide_cursor()?;

    let mut dashboard = Dashboard::new(config);
    let outcome = run_dashboard(&mut terminal, &mut dashboard, ui_rx).await;

    execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    outcome.context("dashboard loop")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_pty_dimensions_are_clamped() {
        assert_eq!(clamp_size(80, 24), (80, 24));
        assert_eq!(clamp_size(u32::MAX, 70_000), (u16::MAX, u16::MAX));
    }

    #[tokio::test]
    async fn drain_waits_for_finished_sessions() {
        let registry = SessionRegistry::default();
        registry.insert(1, tokio::spawn(async {})).await;
        registry.drain(Duration::from_secs(1)).await;
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn drain_aborts_sessions_past_the_grace_period() {
        let registry = SessionRegistry::default();
        let (_keep, mut never) = mpsc::unbounded_channel::<()>();
        let task = tokio::spawn(async move {
            never.recv().await;
        });
        let abort = task.abort_handle();
        registry.insert(7, task).await;

        registry.drain(Duration::from_millis(50)).await;
        tokio::time::timeout(Duration::from_secs(1), async {
            while !abort.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("stuck session aborted");
        assert_eq!(registry.len().await, 0);
    }

    #[test]
    fn generated_host_key_is_available() {
        assert!(load_host_key(None).is_ok());
    }
}
