use ratatui::{backend::Backend, layout::Rect, Frame, Terminal};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::composite::Composite;
use crate::config::DashboardConfig;
use crate::error::DashboardError;
use crate::event::Event;
use crate::panels;
use crate::scheduler::{Flow, Scheduler};

/// UI events (resize, key, mouse) fed in by the session that owns the
/// terminal.
pub type UiReceiver = mpsc::UnboundedReceiver<Event>;

/// Component tree plus the scheduler that serves its requests.
pub struct Dashboard {
    root: Composite,
    scheduler: Scheduler,
}

impl Dashboard {
    pub fn new(config: &DashboardConfig) -> Self {
        Self::with_root(Composite::new(panels::dashboard_panels(config)))
    }

    pub fn with_root(root: Composite) -> Self {
        Self {
            root,
            scheduler: Scheduler::new(),
        }
    }

    pub fn root(&self) -> &Composite {
        &self.root
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Runs every panel's `init` and submits the requests.
    pub fn start(&mut self) -> Flow {
        let requests = self.root.init();
        self.scheduler.submit(requests)
    }

    /// Next UI input or producer delivery, UI first when both are ready.
    /// `None` once the UI side has hung up.
    pub async fn next_event(&mut self, ui: &mut UiReceiver) -> Option<Event> {
        let producers_pending = self.scheduler.has_pending();
        tokio::select! {
            biased;
            input = ui.recv() => input,
            Some(event) = self.scheduler.next_event(), if producers_pending => Some(event),
        }
    }

    /// Hands `event` to the tree and executes the resulting requests.
    pub fn apply(&mut self, event: &Event) -> Flow {
        let requests = self.root.handle(event);
        self.scheduler.submit(requests)
    }

    pub fn draw(&mut self, frame: &mut Frame) {
        self.root.render(frame);
    }
}

/// Drives one dashboard until a quit key or until `ui` closes.
///
/// Draws, waits for exactly one event, dispatches it, repeats. Resize
/// events also resize `terminal` before the panels see them.
pub async fn run_dashboard<B: Backend>(
    terminal: &mut Terminal<B>,
    dashboard: &mut Dashboard,
    ui: &mut UiReceiver,
) -> Result<(), DashboardError> {
    if dashboard.start() == Flow::Quit {
        return Ok(());
    }
    loop {
        terminal.draw(|frame| dashboard.draw(frame))?;

        let Some(event) = dashboard.next_event(ui).await else {
            info!(event = "ui_closed");
            break;
        };
        if let Event::Resize { width, height } = event {
            debug!(event = "terminal_resize", width, height);
            terminal.resize(Rect::new(0, 0, width, height))?;
        }
        if dashboard.apply(&event) == Flow::Quit {
            info!(event = "dashboard_quit");
            break;
        }
    }
    Ok(())
}
