use std::io;

use anyhow::Context;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use tmon_core::{run_dashboard, Dashboard, DashboardConfig, Event};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One dashboard on the controlling terminal. The terminal is restored
/// even when the loop fails.
pub async fn run(config: DashboardConfig) -> anyhow::Result<()> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    info!(event = "local_session_start");

    let outcome = drive(&mut terminal, &config).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    info!(event = "local_session_end");
    outcome
}

async fn drive(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    config: &DashboardConfig,
) -> anyhow::Result<()> {
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let size = terminal.size()?;
    let _ = ui_tx.send(Event::Resize {
        width: size.width,
        height: size.height,
    });
    let forwarder = tokio::spawn(forward_terminal_events(ui_tx));

    let mut dashboard = Dashboard::new(config);
    let outcome = run_dashboard(terminal, &mut dashboard, &mut ui_rx).await;
    forwarder.abort();
    outcome.context("dashboard loop")
}

async fn forward_terminal_events(ui_tx: mpsc::UnboundedSender<Event>) {
    let mut events = EventStream::new();
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                let Some(event) = Event::from_terminal(event) else {
                    continue;
                };
                if ui_tx.send(event).is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(event = "terminal_input_error", error = %err);
                break;
            }
        }
    }
}
