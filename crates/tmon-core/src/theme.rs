use ratatui::style::{Color, Modifier, Style};

use crate::service::ServiceStatus;

/// Look-and-feel constants handed to every panel at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Theme {
    pub border: Color,
    pub title: Color,
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub ok: Color,
    pub warn: Color,
    pub critical: Color,
    /// Horizontal and vertical margin around each panel's frame.
    pub margin: (u16, u16),
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            border: Color::Rgb(71, 85, 105),
            title: Color::Rgb(191, 219, 254),
            text: Color::Rgb(226, 232, 240),
            muted: Color::Rgb(148, 163, 184),
            accent: Color::Rgb(56, 189, 248),
            ok: Color::Rgb(34, 197, 94),
            warn: Color::Rgb(245, 158, 11),
            critical: Color::Rgb(239, 68, 68),
            margin: (2, 1),
        }
    }
}

impl Theme {
    pub fn title_style(&self) -> Style {
        Style::new().fg(self.title).add_modifier(Modifier::BOLD)
    }

    pub fn border_style(&self) -> Style {
        Style::new().fg(self.border)
    }

    pub fn selected_style(&self) -> Style {
        Style::new()
            .fg(Color::Black)
            .bg(self.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn status_color(&self, status: &ServiceStatus) -> Color {
        match status {
            ServiceStatus::Unknown => self.muted,
            ServiceStatus::Ok(_) => self.ok,
            ServiceStatus::Error(_) => self.critical,
        }
    }

    /// Columns and rows eaten by margins plus a bordered block.
    pub fn frame_size(&self) -> (u16, u16) {
        (self.margin.0 * 2 + 2, self.margin.1 * 2 + 2)
    }
}
