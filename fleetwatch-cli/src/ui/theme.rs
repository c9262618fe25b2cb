//! UI Theme Module - color palette and style helpers
//!
//! Severity hues, the in-flight marker, selection and search highlight all
//! come from one palette so every part of the dashboard agrees on them.

use ratatui::style::{Color, Modifier, Style};

use fleetwatch_core::severity::Severity;

/// Color palette tokens for the theme
#[derive(Clone, Debug)]
pub struct Palette {
    /// Primary text color
    pub text: Color,
    /// Dimmed text (secondary info)
    pub text_dim: Color,
    /// Muted text (placeholders, never-fetched hosts)
    pub text_muted: Color,
    /// Accent color (status bar toggles)
    pub accent: Color,
    /// OK severity
    pub success: Color,
    /// Warning severity
    pub warn: Color,
    /// Error severity
    pub error: Color,
    /// Unknown severity (last fetch failed)
    pub unknown: Color,
    /// Row index while a fetch is in flight
    pub in_flight: Color,
    /// Search match background
    pub highlight_bg: Color,
    /// Selection background
    pub selection_bg: Color,
    /// Selection foreground
    pub selection_fg: Color,
    /// Key hint text
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    pub fn dark() -> Self {
        Self {
            text: Color::Rgb(212, 212, 212),
            text_dim: Color::Rgb(150, 150, 150),
            text_muted: Color::Rgb(100, 100, 100),
            accent: Color::Rgb(79, 193, 255),   // Light blue
            success: Color::Rgb(78, 201, 176),  // Teal green
            warn: Color::Rgb(220, 180, 100),    // Amber
            error: Color::Rgb(244, 135, 113),   // Coral red
            unknown: Color::Rgb(197, 134, 192), // Orchid
            in_flight: Color::Rgb(106, 153, 85),
            highlight_bg: Color::Rgb(97, 79, 30),
            selection_bg: Color::Rgb(38, 79, 120), // Dark blue
            selection_fg: Color::White,
            key_hint: Color::Rgb(206, 145, 120), // Soft orange
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    /// Value cell color for a severity; Warning and Error are bold
    pub fn severity_style(&self, severity: Severity) -> Style {
        match severity {
            Severity::Ok => Style::default().fg(self.palette.success),
            Severity::Warning => Style::default()
                .fg(self.palette.warn)
                .add_modifier(Modifier::BOLD),
            Severity::Error => Style::default()
                .fg(self.palette.error)
                .add_modifier(Modifier::BOLD),
            Severity::Unknown => Style::default().fg(self.palette.unknown),
        }
    }

    pub fn in_flight_style(&self) -> Style {
        Style::default()
            .fg(self.palette.in_flight)
            .add_modifier(Modifier::BOLD)
    }

    pub fn highlight_style(&self) -> Style {
        Style::default().bg(self.palette.highlight_bg)
    }

    pub fn selection_style(&self) -> Style {
        Style::default()
            .bg(self.palette.selection_bg)
            .fg(self.palette.selection_fg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn header_style(&self) -> Style {
        Style::default()
            .fg(self.palette.text_dim)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text_style(&self) -> Style {
        Style::default().fg(self.palette.text)
    }

    pub fn text_dim_style(&self) -> Style {
        Style::default().fg(self.palette.text_dim)
    }

    pub fn text_muted_style(&self) -> Style {
        Style::default().fg(self.palette.text_muted)
    }

    pub fn accent_style(&self) -> Style {
        Style::default().fg(self.palette.accent)
    }

    pub fn key_hint_style(&self) -> Style {
        Style::default().fg(self.palette.key_hint)
    }

    /// Very fresh boots are flagged dim red, boots under an hour amber
    pub fn uptime_style(&self, seconds: i64) -> Style {
        if seconds < 60 {
            Style::default()
                .fg(self.palette.error)
                .add_modifier(Modifier::DIM)
        } else if seconds < 3600 {
            Style::default()
                .fg(self.palette.warn)
                .add_modifier(Modifier::BOLD)
        } else {
            self.text_muted_style()
        }
    }
}

static DEFAULT_THEME: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

pub fn theme() -> &'static Theme {
    DEFAULT_THEME.get_or_init(Theme::default)
}

/// Convenience re-exports for common use cases
pub mod styles {
    use super::*;

    pub fn severity(severity: Severity) -> Style {
        theme().severity_style(severity)
    }

    pub fn in_flight() -> Style {
        theme().in_flight_style()
    }

    pub fn highlight() -> Style {
        theme().highlight_style()
    }

    pub fn selection() -> Style {
        theme().selection_style()
    }

    pub fn header() -> Style {
        theme().header_style()
    }

    pub fn text() -> Style {
        theme().text_style()
    }

    pub fn text_dim() -> Style {
        theme().text_dim_style()
    }

    pub fn text_muted() -> Style {
        theme().text_muted_style()
    }

    pub fn accent() -> Style {
        theme().accent_style()
    }

    pub fn key_hint() -> Style {
        theme().key_hint_style()
    }

    pub fn uptime(seconds: i64) -> Style {
        theme().uptime_style(seconds)
    }
}
