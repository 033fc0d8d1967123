pub mod log;
pub mod status;

pub use log::{LogBuffer, LogPanel, LogState, Viewport};
pub use status::{PanelState, StatusPanel};

use ratatui::layout::Rect;

use crate::component::Component;
use crate::config::DashboardConfig;

/// The dashboard's panels, left to right: service status, then the log.
pub fn dashboard_panels(config: &DashboardConfig) -> Vec<Box<dyn Component>> {
    vec![
        Box::new(StatusPanel::new(config)),
        Box::new(LogPanel::new(config)),
    ]
}

/// `area` minus `horizontal` columns on each side and `vertical` rows top
/// and bottom, never underflowing.
pub(crate) fn shrink(area: Rect, horizontal: u16, vertical: u16) -> Rect {
    let x_cut = horizontal.min(area.width / 2);
    let y_cut = vertical.min(area.height / 2);
    Rect {
        x: area.x + x_cut,
        y: area.y + y_cut,
        width: area.width - x_cut * 2,
        height: area.height - y_cut * 2,
    }
}

/// The first `width` characters of `text`.
pub(crate) fn clip(text: &str, width: usize) -> &str {
    match text.char_indices().nth(width) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
