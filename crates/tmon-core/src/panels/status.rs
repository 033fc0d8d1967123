use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};
use tracing::{debug, warn};

use super::{clip, shrink};
use crate::component::{Component, Share};
use crate::config::{CommandSpec, DashboardConfig};
use crate::event::{Event, ProducerEvent, ProducerId, Request};
use crate::producer::ProducerSpec;
use crate::service::{Service, StatusSnapshot};
use crate::theme::Theme;

pub const STATUS_OWNER: &str = "status";
const HIGHLIGHT_SYMBOL: &str = "> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    /// No terminal size seen yet.
    Uninitialized,
    Ready,
}

/// Service list kept in sync with the latest poll snapshot.
pub struct StatusPanel {
    services: Vec<Service>,
    check: CommandSpec,
    poll_delay: Duration,
    share: Share,
    theme: Theme,
    state: PanelState,
    list_size: (u16, u16),
    producer: ProducerId,
    list_state: ListState,
}

impl StatusPanel {
    pub fn new(config: &DashboardConfig) -> Self {
        let services: Vec<Service> = config.services.iter().map(Service::from).collect();
        let mut list_state = ListState::default();
        if !services.is_empty() {
            list_state.select(Some(0));
        }
        Self {
            services,
            check: config.status_check.clone(),
            poll_delay: config.poll_delay(),
            share: config.status_width,
            theme: config.theme,
            state: PanelState::Uninitialized,
            list_size: (0, 0),
            producer: ProducerId::new(STATUS_OWNER, 0),
            list_state,
        }
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    /// Width and height handed to the list widget after margins and border.
    pub fn list_size(&self) -> (u16, u16) {
        self.list_size
    }

    pub fn current_producer(&self) -> ProducerId {
        self.producer
    }

    pub fn selected(&self) -> Option<usize> {
        self.list_state.selected()
    }

    fn cycle_requests(&self, delay: Duration) -> Vec<Request> {
        let spec = ProducerSpec::poll(self.producer, self.services.clone(), self.check.clone(), delay);
        vec![Request::Spawn(spec), Request::Recv(self.producer)]
    }

    fn rearm(&mut self) -> Vec<Request> {
        self.producer = self.producer.next();
        self.cycle_requests(self.poll_delay)
    }

    fn apply_snapshot(&mut self, snapshot: &StatusSnapshot) {
        self.services = snapshot.services.clone();
        let selected = match (self.list_state.selected(), self.services.len()) {
            (_, 0) => None,
            (Some(index), len) => Some(index.min(len - 1)),
            (None, _) => Some(0),
        };
        self.list_state.select(selected);
    }

    fn resize(&mut self, width: u16, height: u16) {
        let (frame_w, frame_h) = self.theme.frame_size();
        self.list_size = (
            self.share.of(width).saturating_sub(frame_w),
            height.saturating_sub(frame_h),
        );
        if self.state == PanelState::Uninitialized {
            debug!(event = "panel_ready", panel = STATUS_OWNER, width, height);
            self.state = PanelState::Ready;
        }
    }

    fn handle_key(&mut self, key: &KeyEvent) {
        if self.services.is_empty() {
            return;
        }
        let last = self.services.len() - 1;
        let current = self.list_state.selected().unwrap_or(0);
        let next = match key.code {
            KeyCode::Up | KeyCode::Char('k') => current.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => (current + 1).min(last),
            _ => return,
        };
        self.list_state.select(Some(next));
    }

    /// Name and status lines for each service, cut to the list width left
    /// after the highlight symbol.
    fn item_lines(&self) -> Vec<(String, String)> {
        let width = usize::from(self.list_size.0).saturating_sub(HIGHLIGHT_SYMBOL.len());
        self.services
            .iter()
            .map(|service| {
                let summary = format!("  {}", service.status.summary());
                (
                    clip(&service.name, width).to_string(),
                    clip(&summary, width).to_string(),
                )
            })
            .collect()
    }

    fn items(&self) -> Vec<ListItem<'static>> {
        self.services
            .iter()
            .zip(self.item_lines())
            .map(|(service, (name, summary))| {
                let color = self.theme.status_color(&service.status);
                ListItem::new(vec![
                    Line::from(Span::styled(
                        name,
                        Style::new().fg(self.theme.text).add_modifier(Modifier::BOLD),
                    )),
                    Line::from(Span::styled(summary, Style::new().fg(color))),
                ])
            })
            .collect()
    }
}

impl Component for StatusPanel {
    fn name(&self) -> &'static str {
        STATUS_OWNER
    }

    fn share(&self) -> Share {
        self.share
    }

    fn init(&mut self) -> Vec<Request> {
        self.cycle_requests(Duration::ZERO)
    }

    fn handle(&mut self, event: &Event) -> Vec<Request> {
        match event {
            Event::Resize { width, height } => {
                self.resize(*width, *height);
                Vec::new()
            }
            Event::Key(key) => {
                self.handle_key(key);
                Vec::new()
            }
            Event::Producer { id, event } if *id == self.producer => match event {
                ProducerEvent::Snapshot(snapshot) => {
                    self.apply_snapshot(snapshot);
                    self.rearm()
                }
                ProducerEvent::Ended(reason) => {
                    warn!(event = "poll_lost", producer = %id, reason = %reason);
                    self.rearm()
                }
                ProducerEvent::Chunk(_) => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn render(&mut self, frame: &mut Frame, area: Rect) {
        let area = shrink(area, self.theme.margin.0, self.theme.margin.1);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.border_style())
            .title(Span::styled(" services ", self.theme.title_style()));

        if self.state == PanelState::Uninitialized {
            let waiting = Paragraph::new(Span::styled(
                "Initializing...",
                Style::new().fg(self.theme.muted),
            ))
            .block(block);
            frame.render_widget(waiting, area);
            return;
        }

        let list = List::new(self.items())
            .block(block)
            .highlight_style(self.theme.selected_style())
            .highlight_symbol(HIGHLIGHT_SYMBOL);
        frame.render_stateful_widget(list, area, &mut self.list_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceEntry;
    use crate::event::EndReason;
    use crate::service::ServiceStatus;
    use crossterm::event::KeyModifiers;

    fn config() -> DashboardConfig {
        DashboardConfig {
            services: vec![
                ServiceEntry::new("svc-a", "a.service"),
                ServiceEntry::new("svc-b", "b.service"),
            ],
            ..DashboardConfig::default()
        }
    }

    fn snapshot(a: ServiceStatus, b: ServiceStatus) -> StatusSnapshot {
        StatusSnapshot::new(vec![
            Service::new("svc-a", "a.service").with_status(a),
            Service::new("svc-b", "b.service").with_status(b),
        ])
    }

    fn spawned_ids(requests: &[Request]) -> Vec<ProducerId> {
        requests
            .iter()
            .filter_map(|request| match request {
                Request::Spawn(spec) => Some(spec.id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn init_starts_first_cycle_and_waits_for_it() {
        let mut panel = StatusPanel::new(&config());
        let requests = panel.init();
        let first = ProducerId::new(STATUS_OWNER, 0);
        assert_eq!(spawned_ids(&requests), vec![first]);
        assert_eq!(requests.last(), Some(&Request::Recv(first)));
        assert!(panel.services().iter().all(|s| s.status == ServiceStatus::Unknown));
    }

    #[test]
    fn snapshot_replaces_services_and_rearms_next_cycle() {
        let mut panel = StatusPanel::new(&config());
        panel.init();
        let incoming = snapshot(
            ServiceStatus::Ok("active".to_string()),
            ServiceStatus::Error("exit status: 3".to_string()),
        );
        let requests = panel.handle(&Event::producer(
            ProducerId::new(STATUS_OWNER, 0),
            ProducerEvent::Snapshot(incoming.clone()),
        ));

        assert_eq!(panel.services(), incoming.services.as_slice());
        let next = ProducerId::new(STATUS_OWNER, 1);
        assert_eq!(spawned_ids(&requests), vec![next]);
        assert_eq!(requests.last(), Some(&Request::Recv(next)));
        assert_eq!(panel.current_producer(), next);
    }

    #[test]
    fn next_cycle_carries_configured_delay() {
        let mut panel = StatusPanel::new(&DashboardConfig {
            poll_delay_ms: 500,
            ..config()
        });
        panel.init();
        let requests = panel.handle(&Event::producer(
            ProducerId::new(STATUS_OWNER, 0),
            ProducerEvent::Snapshot(snapshot(ServiceStatus::Unknown, ServiceStatus::Unknown)),
        ));
        match &requests[0] {
            Request::Spawn(ProducerSpec {
                kind: crate::producer::ProducerKind::Poll { delay, .. },
                ..
            }) => assert_eq!(*delay, Duration::from_millis(500)),
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn stale_snapshot_is_ignored() {
        let mut panel = StatusPanel::new(&config());
        panel.init();
        let requests = panel.handle(&Event::producer(
            ProducerId::new(STATUS_OWNER, 41),
            ProducerEvent::Snapshot(snapshot(
                ServiceStatus::Error("old".to_string()),
                ServiceStatus::Error("old".to_string()),
            )),
        ));
        assert!(requests.is_empty());
        assert!(panel.services().iter().all(|s| s.status == ServiceStatus::Unknown));
    }

    #[test]
    fn lost_poll_producer_starts_a_new_cycle() {
        let mut panel = StatusPanel::new(&config());
        panel.init();
        let requests = panel.handle(&Event::producer(
            ProducerId::new(STATUS_OWNER, 0),
            ProducerEvent::Ended(EndReason::Dropped),
        ));
        assert_eq!(spawned_ids(&requests), vec![ProducerId::new(STATUS_OWNER, 1)]);
    }

    #[test]
    fn first_resize_makes_panel_ready_and_is_idempotent() {
        let mut panel = StatusPanel::new(&config());
        assert_eq!(panel.state(), PanelState::Uninitialized);

        let resize = Event::Resize {
            width: 90,
            height: 30,
        };
        assert!(panel.handle(&resize).is_empty());
        let first = panel.list_size();
        panel.handle(&resize);

        assert_eq!(panel.state(), PanelState::Ready);
        assert_eq!(panel.list_size(), first);
        let (frame_w, frame_h) = Theme::default().frame_size();
        assert_eq!(first, (30 - frame_w, 30 - frame_h));
    }

    #[test]
    fn long_status_lines_are_cut_to_the_list_width() {
        let mut panel = StatusPanel::new(&config());
        panel.handle(&Event::Resize {
            width: 60,
            height: 20,
        });
        let long = "x".repeat(200);
        panel.apply_snapshot(&snapshot(
            ServiceStatus::Ok(long.clone()),
            ServiceStatus::Error(long),
        ));

        let width = usize::from(panel.list_size().0) - HIGHLIGHT_SYMBOL.len();
        let lines = panel.item_lines();
        assert_eq!(lines.len(), 2);
        for (name, summary) in &lines {
            assert!(name.chars().count() <= width);
            assert_eq!(summary.chars().count(), width);
        }
        assert_eq!(lines[0].0, "svc-a");
    }

    #[test]
    fn arrow_keys_move_selection_within_bounds() {
        let mut panel = StatusPanel::new(&config());
        let down = Event::Key(KeyEvent::new(KeyCode::Down, KeyModifiers::NONE));
        let up = Event::Key(KeyEvent::new(KeyCode::Char('k'), KeyModifiers::NONE));

        panel.handle(&down);
        panel.handle(&down);
        assert_eq!(panel.selected(), Some(1));
        panel.handle(&up);
        panel.handle(&up);
        assert_eq!(panel.selected(), Some(0));
    }
}
