use std::ops::Range;

use crossterm::event::{KeyCode, KeyEvent, MouseEvent, MouseEventKind};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use tracing::{debug, info};

use super::{clip, shrink};
use crate::component::{Component, Share};
use crate::config::{CommandSpec, DashboardConfig};
use crate::event::{EndReason, Event, LogChunk, ProducerEvent, ProducerId, Request};
use crate::producer::ProducerSpec;
use crate::theme::Theme;

pub const LOG_OWNER: &str = "log";
const WHEEL_STEP: usize = 3;

/// Append-only text with an index of line starts.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    text: String,
    line_starts: Vec<usize>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self {
            text: String::new(),
            line_starts: vec![0],
        }
    }
}

impl LogBuffer {
    pub fn append(&mut self, chunk: &str) {
        let base = self.text.len();
        self.text.push_str(chunk);
        self.line_starts.extend(
            chunk
                .bytes()
                .enumerate()
                .filter(|(_, byte)| *byte == b'\n')
                .map(|(index, _)| base + index + 1),
        );
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Complete lines plus a trailing partial line, if any.
    pub fn line_count(&self) -> usize {
        if self.text.is_empty() {
            0
        } else if self.text.ends_with('\n') {
            self.line_starts.len() - 1
        } else {
            self.line_starts.len()
        }
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        if index >= self.line_count() {
            return None;
        }
        let start = self.line_starts[index];
        let end = self
            .line_starts
            .get(index + 1)
            .map_or(self.text.len(), |next| next - 1);
        Some(self.text[start..end].trim_end_matches('\r'))
    }

    pub fn lines(&self, range: Range<usize>) -> impl Iterator<Item = &str> {
        range.filter_map(move |index| self.line(index))
    }
}

/// Visible window over the log buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub offset: usize,
    pub width: u16,
    pub height: u16,
    /// Pinned to the bottom; cleared when the user scrolls up.
    pub follow: bool,
}

impl Viewport {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            offset: 0,
            width,
            height,
            follow: true,
        }
    }

    pub fn max_offset(&self, total: usize) -> usize {
        total.saturating_sub(usize::from(self.height))
    }

    pub fn visible(&self, total: usize) -> Range<usize> {
        let end = (self.offset + usize::from(self.height)).min(total);
        self.offset.min(end)..end
    }

    pub fn resize(&mut self, width: u16, height: u16, total: usize) {
        self.width = width;
        self.height = height;
        if self.follow {
            self.goto_bottom(total);
        } else {
            self.offset = self.offset.min(self.max_offset(total));
        }
    }

    pub fn goto_bottom(&mut self, total: usize) {
        self.offset = self.max_offset(total);
        self.follow = true;
    }

    pub fn goto_top(&mut self) {
        self.offset = 0;
        self.follow = false;
    }

    pub fn scroll_up(&mut self, lines: usize) {
        if lines == 0 {
            return;
        }
        self.offset = self.offset.saturating_sub(lines);
        self.follow = false;
    }

    pub fn scroll_down(&mut self, lines: usize, total: usize) {
        let max = self.max_offset(total);
        self.offset = (self.offset + lines).min(max);
        if self.offset == max {
            self.follow = true;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogState {
    Uninitialized,
    Ready,
    /// Terminal: the stream producer is gone and the buffer is frozen.
    Ended(EndReason),
}

/// Tail of a long-running command, pinned to the newest output.
pub struct LogPanel {
    command: CommandSpec,
    chunk_size: usize,
    share: Share,
    theme: Theme,
    producer: ProducerId,
    state: LogState,
    buffer: LogBuffer,
    viewport: Option<Viewport>,
}

impl LogPanel {
    pub fn new(config: &DashboardConfig) -> Self {
        Self {
            command: config.log_stream.clone(),
            chunk_size: config.chunk_size,
            share: config.log_width,
            theme: config.theme,
            producer: ProducerId::new(LOG_OWNER, 0),
            state: LogState::Uninitialized,
            buffer: LogBuffer::default(),
            viewport: None,
        }
    }

    pub fn content(&self) -> &str {
        self.buffer.as_str()
    }

    pub fn state(&self) -> &LogState {
        &self.state
    }

    pub fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    pub fn producer(&self) -> ProducerId {
        self.producer
    }

    fn resize(&mut self, width: u16, height: u16) -> Vec<Request> {
        let (frame_w, frame_h) = self.theme.frame_size();
        let view_w = self.share.of(width).saturating_sub(frame_w);
        let view_h = height.saturating_sub(frame_h);
        let total = self.buffer.line_count();
        match self.viewport.as_mut() {
            Some(viewport) => {
                viewport.resize(view_w, view_h, total);
                Vec::new()
            }
            None => {
                let mut viewport = Viewport::new(view_w, view_h);
                viewport.goto_bottom(total);
                self.viewport = Some(viewport);
                debug!(event = "panel_ready", panel = LOG_OWNER, width, height);
                if self.state == LogState::Uninitialized {
                    self.state = LogState::Ready;
                    vec![Request::Recv(self.producer)]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn append(&mut self, chunk: &LogChunk) -> Vec<Request> {
        self.buffer.append(&chunk.text);
        let total = self.buffer.line_count();
        if let Some(viewport) = self.viewport.as_mut() {
            if viewport.follow {
                viewport.goto_bottom(total);
            }
        }
        match self.state {
            LogState::Ready => vec![Request::Recv(self.producer)],
            _ => Vec::new(),
        }
    }

    fn handle_key(&mut self, key: &KeyEvent) {
        let total = self.buffer.line_count();
        let Some(viewport) = self.viewport.as_mut() else {
            return;
        };
        let page = usize::from(viewport.height.max(1));
        match key.code {
            KeyCode::PageUp => viewport.scroll_up(page),
            KeyCode::PageDown => viewport.scroll_down(page, total),
            KeyCode::Home => viewport.goto_top(),
            KeyCode::End => viewport.goto_bottom(total),
            _ => {}
        }
    }

    fn handle_mouse(&mut self, mouse: &MouseEvent) {
        let total = self.buffer.line_count();
        let Some(viewport) = self.viewport.as_mut() else {
            return;
        };
        match mouse.kind {
            MouseEventKind::ScrollUp => viewport.scroll_up(WHEEL_STEP),
            MouseEventKind::ScrollDown => viewport.scroll_down(WHEEL_STEP, total),
            _ => {}
        }
    }

    /// Lines inside `viewport`, each cut to its width.
    fn visible_lines<'a>(&'a self, viewport: &Viewport) -> impl Iterator<Item = &'a str> {
        let width = usize::from(viewport.width);
        self.buffer
            .lines(viewport.visible(self.buffer.line_count()))
            .map(move |line| clip(line, width))
    }

    fn title(&self) -> Line<'static> {
        let mut spans = vec![Span::styled(" kernel log ", self.theme.title_style())];
        if let LogState::Ended(reason) = &self.state {
            spans.push(Span::styled(
                format!("[stream ended: {reason}] "),
                Style::new()
                    .fg(self.theme.warn)
                    .add_modifier(Modifier::BOLD),
            ));
        } else if matches!(self.viewport, Some(viewport) if !viewport.follow) {
            spans.push(Span::styled("[paused] ", Style::new().fg(self.theme.muted)));
        }
        Line::from(spans)
    }
}

impl Component for LogPanel {
    fn name(&self) -> &'static str {
        LOG_OWNER
    }

    fn share(&self) -> Share {
        self.share
    }

    fn init(&mut self) -> Vec<Request> {
        vec![Request::Spawn(ProducerSpec::stream(
            self.producer,
            self.command.clone(),
            self.chunk_size,
        ))]
    }

    fn handle(&mut self, event: &Event) -> Vec<Request> {
        match event {
            Event::Resize { width, height } => self.resize(*width, *height),
            Event::Key(key) => {
                self.handle_key(key);
                Vec::new()
            }
            Event::Mouse(mouse) => {
                self.handle_mouse(mouse);
                Vec::new()
            }
            Event::Producer { id, event } if *id == self.producer => {
                if matches!(self.state, LogState::Ended(_)) {
                    debug!(event = "late_event_ignored", producer = %id);
                    return Vec::new();
                }
                match event {
                    ProducerEvent::Chunk(chunk) => self.append(chunk),
                    ProducerEvent::Ended(reason) => {
                        info!(event = "log_stream_ended", producer = %id, reason = %reason);
                        self.state = LogState::Ended(reason.clone());
                        Vec::new()
                    }
                    ProducerEvent::Snapshot(_) => Vec::new(),
                }
            }
            _ => Vec::new(),
        }
    }

    fn render(&mut self, frame: &mut Frame, area: Rect) {
        let area = shrink(area, self.theme.margin.0, self.theme.margin.1);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.border_style())
            .title(self.title());

        let Some(viewport) = self.viewport else {
            let waiting = Paragraph::new(Span::styled(
                "Initializing...",
                Style::new().fg(self.theme.muted),
            ))
            .block(block);
            frame.render_widget(waiting, area);
            return;
        };

        let text_style = Style::new().fg(self.theme.text);
        let lines: Vec<Line> = self
            .visible_lines(&viewport)
            .map(|line| Line::from(Span::styled(line, text_style)))
            .collect();
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyModifiers, MouseEvent};

    fn producer() -> ProducerId {
        ProducerId::new(LOG_OWNER, 0)
    }

    fn chunk(text: &str) -> Event {
        Event::producer(producer(), ProducerEvent::Chunk(LogChunk::new(text)))
    }

    fn ended() -> Event {
        Event::producer(producer(), ProducerEvent::Ended(EndReason::Eof))
    }

    fn ready_panel() -> LogPanel {
        let mut panel = LogPanel::new(&DashboardConfig::default());
        panel.init();
        panel.handle(&Event::Resize {
            width: 120,
            height: 12,
        });
        panel
    }

    #[test]
    fn buffer_counts_partial_last_line() {
        let mut buffer = LogBuffer::default();
        assert_eq!(buffer.line_count(), 0);
        buffer.append("one\ntw");
        assert_eq!(buffer.line_count(), 2);
        buffer.append("o\n");
        assert_eq!(buffer.line_count(), 2);
        assert_eq!(buffer.lines(0..5).collect::<Vec<_>>(), vec!["one", "two"]);
    }

    #[test]
    fn init_spawns_stream_without_reading_yet() {
        let mut panel = LogPanel::new(&DashboardConfig::default());
        let requests = panel.init();
        assert_eq!(requests.len(), 1);
        assert!(matches!(&requests[0], Request::Spawn(spec) if spec.id == producer()));
    }

    #[test]
    fn first_resize_arms_the_mailbox_once() {
        let mut panel = LogPanel::new(&DashboardConfig::default());
        panel.init();
        let resize = Event::Resize {
            width: 120,
            height: 12,
        };
        assert_eq!(panel.handle(&resize), vec![Request::Recv(producer())]);
        assert_eq!(panel.state(), &LogState::Ready);
        assert!(panel.handle(&resize).is_empty());
    }

    #[test]
    fn chunks_append_in_order_and_rearm() {
        let mut panel = ready_panel();
        assert_eq!(panel.handle(&chunk("ab")), vec![Request::Recv(producer())]);
        assert_eq!(panel.handle(&chunk("cd")), vec![Request::Recv(producer())]);
        assert_eq!(panel.content(), "abcd");
    }

    #[test]
    fn ended_stream_ignores_late_chunks() {
        let mut panel = ready_panel();
        panel.handle(&chunk("line1\n"));
        panel.handle(&chunk("line2\n"));
        assert!(panel.handle(&ended()).is_empty());

        assert!(panel.handle(&chunk("late\n")).is_empty());
        assert!(panel.handle(&ended()).is_empty());
        assert_eq!(panel.content(), "line1\nline2\n");
        assert_eq!(panel.state(), &LogState::Ended(EndReason::Eof));
    }

    #[test]
    fn events_from_other_producers_are_ignored() {
        let mut panel = ready_panel();
        let stray = Event::producer(
            ProducerId::new(LOG_OWNER, 9),
            ProducerEvent::Chunk(LogChunk::new("stray")),
        );
        assert!(panel.handle(&stray).is_empty());
        assert_eq!(panel.content(), "");
    }

    #[test]
    fn new_content_pins_to_bottom_unless_scrolled_up() {
        let mut panel = ready_panel();
        let body: String = (0..40).map(|n| format!("line {n}\n")).collect();
        panel.handle(&chunk(&body));
        let height = panel.viewport().map(|v| usize::from(v.height)).unwrap_or(0);
        assert_eq!(panel.viewport().map(|v| v.offset), Some(40 - height));

        panel.handle(&Event::Key(KeyEvent::new(KeyCode::PageUp, KeyModifiers::NONE)));
        let paused = panel.viewport().copied().expect("viewport");
        assert!(!paused.follow);

        panel.handle(&chunk("line 40\n"));
        assert_eq!(panel.viewport().map(|v| v.offset), Some(paused.offset));

        panel.handle(&Event::Key(KeyEvent::new(KeyCode::End, KeyModifiers::NONE)));
        assert_eq!(panel.viewport().map(|v| v.offset), Some(41 - height));
    }

    #[test]
    fn visible_lines_are_cut_to_the_viewport_width() {
        let mut panel = ready_panel();
        panel.handle(&chunk(&format!("{}\nshort\n", "k".repeat(300))));
        let viewport = panel.viewport().copied().expect("viewport");
        let width = usize::from(viewport.width);
        assert!(width > 0);

        let lines: Vec<&str> = panel.visible_lines(&viewport).collect();
        assert_eq!(lines, vec!["k".repeat(width).as_str(), "short"]);
    }

    #[test]
    fn mouse_wheel_scrolls_viewport() {
        let mut panel = ready_panel();
        let body: String = (0..30).map(|n| format!("{n}\n")).collect();
        panel.handle(&chunk(&body));
        let bottom = panel.viewport().map(|v| v.offset).unwrap_or(0);

        panel.handle(&Event::Mouse(MouseEvent {
            kind: MouseEventKind::ScrollUp,
            column: 80,
            row: 3,
            modifiers: KeyModifiers::NONE,
        }));
        assert_eq!(panel.viewport().map(|v| v.offset), Some(bottom - WHEEL_STEP));
    }

    #[test]
    fn resize_is_idempotent() {
        let mut panel = ready_panel();
        panel.handle(&chunk("a\nb\nc\n"));
        let resize = Event::Resize {
            width: 100,
            height: 20,
        };
        panel.handle(&resize);
        let first = panel.viewport().copied();
        panel.handle(&resize);
        assert_eq!(panel.viewport().copied(), first);
    }

    #[test]
    fn chunks_before_first_resize_are_kept() {
        let mut panel = LogPanel::new(&DashboardConfig::default());
        panel.init();
        assert!(panel.handle(&chunk("early\n")).is_empty());
        panel.handle(&Event::Resize {
            width: 120,
            height: 12,
        });
        assert_eq!(panel.content(), "early\n");
    }
}
