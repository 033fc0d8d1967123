use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{layout::Rect, Frame};
use tracing::info;

use crate::component::{Component, Share};
use crate::event::{Event, Request};

/// `q`, `Esc` or `Ctrl+C`. Alt chords never quit.
pub fn is_quit_key(key: &KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::ALT) {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Panel areas for one terminal size, laid out left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutGeometry {
    pub area: Rect,
    pub panels: Vec<Rect>,
}

impl LayoutGeometry {
    /// Each panel gets `share.of(area.width)` columns and the full height.
    /// Columns past the right edge are cut so areas never overlap or spill.
    pub fn split(area: Rect, shares: &[Share]) -> Self {
        let right = area.x.saturating_add(area.width);
        let mut x = area.x;
        let panels = shares
            .iter()
            .map(|share| {
                let width = share.of(area.width).min(right - x);
                let rect = Rect::new(x, area.y, width, area.height);
                x += width;
                rect
            })
            .collect();
        Self { area, panels }
    }
}

/// Root of the component tree. Knows its panels only through
/// [`Component`].
pub struct Composite {
    panels: Vec<Box<dyn Component>>,
}

impl Composite {
    pub fn new(panels: Vec<Box<dyn Component>>) -> Self {
        Self { panels }
    }

    pub fn panel_names(&self) -> Vec<&'static str> {
        self.panels.iter().map(|panel| panel.name()).collect()
    }

    pub fn init(&mut self) -> Vec<Request> {
        self.panels
            .iter_mut()
            .flat_map(|panel| panel.init())
            .collect()
    }

    /// A quit key short-circuits to `[Quit]`. Everything else goes to
    /// every panel in order and the requests are concatenated.
    pub fn handle(&mut self, event: &Event) -> Vec<Request> {
        if let Event::Key(key) = event {
            if is_quit_key(key) {
                info!(event = "quit_requested", key = ?key.code);
                return vec![Request::Quit];
            }
        }
        self.panels
            .iter_mut()
            .flat_map(|panel| panel.handle(event))
            .collect()
    }

    /// Computed fresh for every frame from the panels' shares.
    pub fn layout(&self, area: Rect) -> LayoutGeometry {
        let shares: Vec<Share> = self.panels.iter().map(|panel| panel.share()).collect();
        LayoutGeometry::split(area, &shares)
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let geometry = self.layout(frame.size());
        for (panel, area) in self.panels.iter_mut().zip(geometry.panels) {
            panel.render(frame, area);
        }
    }
}
