//! Render grid
//!
//! Holds one pre-styled cell per host and column, plus the width of every
//! column. Fetch tasks reformat their own host's row from any thread; the
//! redraw consumer only reads. Column widths only ever grow.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ratatui::style::Style;

use fleetwatch_core::fleet::HostSnapshot;
use fleetwatch_core::model::{HostId, MetricValue, Metrics, UNAVAILABLE};
use fleetwatch_core::severity::{MetricKind, Severity};

use super::theme::styles;

/// Stands in for an OK cell in silent mode
pub const PLACEHOLDER: char = '\u{b7}';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Align {
    Left,
    Centre,
    Right,
}

impl Align {
    /// Left padding that places `len` glyphs inside a `width`-wide column
    pub fn offset(self, width: usize, len: usize) -> usize {
        match self {
            Align::Left => 0,
            Align::Centre => width.saturating_sub(len) / 2,
            Align::Right => width.saturating_sub(len),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Column {
    pub title: &'static str,
    pub align: Align,
}

const fn right(title: &'static str) -> Column {
    Column {
        title,
        align: Align::Right,
    }
}

pub const COLUMNS: [Column; 11] = [
    Column {
        title: "host",
        align: Align::Left,
    },
    right("l1"),
    right("l5"),
    right("l15"),
    right("CPU"),
    right("free"),
    right("/"),
    right("inode"),
    right("conns"),
    Column {
        title: "uptime",
        align: Align::Centre,
    },
    right("svc"),
];

/// Index of the identity column
pub const IDENTITY: usize = 0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Glyph {
    pub ch: char,
    pub style: Style,
}

/// A run of individually styled characters
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StyledText(Vec<Glyph>);

impl StyledText {
    fn push_str(&mut self, text: &str, style: Style) {
        self.0.extend(text.chars().map(|ch| Glyph { ch, style }));
    }

    fn styled(text: &str, style: Style) -> Self {
        let mut s = Self::default();
        s.push_str(text, style);
        s
    }

    fn placeholder() -> Self {
        Self::styled(&PLACEHOLDER.to_string(), styles::text_muted())
    }

    fn blank() -> Self {
        Self::styled(" ", Style::default())
    }

    pub fn width(&self) -> usize {
        self.0.len()
    }

    pub fn glyphs(&self) -> &[Glyph] {
        &self.0
    }

    pub fn text(&self) -> String {
        self.0.iter().map(|g| g.ch).collect()
    }
}

/// `HH:MM:SS` with leading zero components dropped
pub fn format_duration(seconds: i64) -> String {
    if seconds < 0 {
        return "-".to_string();
    }
    let (h, m, s) = (seconds / 3600, seconds % 3600 / 60, seconds % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{:02}:", h));
    }
    if h > 0 || m > 0 {
        out.push_str(&format!("{:02}:", m));
    }
    out.push_str(&format!("{:02}", s));
    out
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn severity_cell(text: &str, severity: Severity, silent: bool) -> StyledText {
    if silent && severity == Severity::Ok {
        StyledText::placeholder()
    } else {
        StyledText::styled(text, styles::severity(severity))
    }
}

fn scalar(m: &Metrics, kind: MetricKind) -> f64 {
    kind.measurement(m).value.as_f64().unwrap_or(UNAVAILABLE)
}

fn value_cells(m: &Metrics, silent: bool) -> Vec<StyledText> {
    let fixed = |kind: MetricKind, precision: usize| {
        severity_cell(
            &format!("{:.*}", precision, scalar(m, kind)),
            kind.classify(m),
            silent,
        )
    };
    let device = |kind: MetricKind| {
        severity_cell(
            &format!("{:3}", kind.measurement(m).value.worst_device()),
            kind.classify(m),
            silent,
        )
    };

    let mut cpu = fixed(MetricKind::Cpu, 1);
    if cpu.text() != PLACEHOLDER.to_string() {
        cpu.push_str(&format!(":{}", m.nproc), styles::text_dim());
    }

    vec![
        fixed(MetricKind::Load1, 2),
        fixed(MetricKind::Load5, 2),
        fixed(MetricKind::Load15, 2),
        cpu,
        fixed(MetricKind::Free, 2),
        device(MetricKind::Storage),
        device(MetricKind::Inode),
        fixed(MetricKind::Conns, 0),
        uptime_cell(m, silent),
        services_cell(m, silent),
    ]
}

fn uptime_cell(m: &Metrics, silent: bool) -> StyledText {
    let seconds = scalar(m, MetricKind::Uptime) as i64;
    match MetricKind::Uptime.classify(m) {
        Severity::Ok if silent => StyledText::placeholder(),
        Severity::Ok => StyledText::styled(&format_duration(seconds), styles::uptime(seconds)),
        other => StyledText::styled(&format_duration(seconds), styles::severity(other)),
    }
}

fn services_cell(m: &Metrics, silent: bool) -> StyledText {
    match &m.services.value {
        MetricValue::ServiceTally(t) if t.total() > 0 => severity_cell(
            &format!("{}/{}", t.passing(), t.total()),
            MetricKind::Services.classify(m),
            silent,
        ),
        _ if silent => StyledText::placeholder(),
        _ => StyledText::styled("-", styles::text_muted()),
    }
}

fn identity_cell(host: &HostSnapshot, show_address: bool, silent: bool) -> StyledText {
    let style = match host.state.status.worst() {
        None => styles::text_muted(),
        Some(Severity::Ok) if silent => styles::text_muted(),
        Some(Severity::Ok) => styles::text(),
        Some(level) => styles::severity(level),
    };
    StyledText::styled(host.spec.identity(show_address), style)
}

/// One printable line for the error badge: the last non-empty line of the
/// message (ssh puts the actual failure last) with control characters blanked
pub fn badge_text(message: &str) -> String {
    message
        .split(['\r', '\n'])
        .map(str::trim)
        .rev()
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect()
}

#[derive(Debug)]
pub struct RenderGrid {
    widths: Mutex<Vec<usize>>,
    rows: Mutex<HashMap<HostId, Vec<StyledText>>>,
    errors: Mutex<HashMap<HostId, String>>,
    silent: AtomicBool,
    show_address: AtomicBool,
}

impl RenderGrid {
    /// Columns start as wide as their header label
    pub fn new<'a>(ids: impl IntoIterator<Item = &'a HostId>) -> Self {
        let rows = ids
            .into_iter()
            .map(|id| (id.clone(), vec![StyledText::default(); COLUMNS.len()]))
            .collect();
        Self {
            widths: Mutex::new(COLUMNS.iter().map(|c| c.title.chars().count()).collect()),
            rows: Mutex::new(rows),
            errors: Mutex::new(HashMap::new()),
            silent: AtomicBool::new(false),
            show_address: AtomicBool::new(false),
        }
    }

    /// Recompute every cell of one host. Returns `true` when a column had to
    /// grow, in which case every row moves and a full redraw is due.
    pub fn format_host(&self, host: &HostSnapshot) -> bool {
        let silent = self.is_silent();
        let mut cells = if host.state.got_result() {
            value_cells(&host.state.metrics, silent)
        } else {
            vec![StyledText::blank(); COLUMNS.len() - 1]
        };
        cells.insert(IDENTITY, identity_cell(host, self.shows_address(), silent));

        {
            let mut errors = lock(&self.errors);
            match host.state.last_error() {
                Some(message) => {
                    errors.insert(host.spec.name.clone(), badge_text(message));
                }
                None => {
                    errors.remove(&host.spec.name);
                }
            }
        }

        let grew = self.grow(&cells);
        lock(&self.rows).insert(host.spec.name.clone(), cells);
        grew
    }

    fn grow(&self, cells: &[StyledText]) -> bool {
        let mut widths = lock(&self.widths);
        let mut grew = false;
        for (width, cell) in widths.iter_mut().zip(cells) {
            if cell.width() > *width {
                *width = cell.width();
                grew = true;
            }
        }
        grew
    }

    pub fn widths(&self) -> Vec<usize> {
        lock(&self.widths).clone()
    }

    pub fn row(&self, id: &str) -> Option<Vec<StyledText>> {
        lock(&self.rows).get(id).cloned()
    }

    pub fn error(&self, id: &str) -> Option<String> {
        lock(&self.errors).get(id).cloned()
    }

    pub fn is_silent(&self) -> bool {
        self.silent.load(Ordering::Relaxed)
    }

    /// Flip silent mode, returning the new value
    pub fn toggle_silent(&self) -> bool {
        !self.silent.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn shows_address(&self) -> bool {
        self.show_address.load(Ordering::Relaxed)
    }

    pub fn toggle_show_address(&self) -> bool {
        !self.show_address.fetch_xor(true, Ordering::Relaxed)
    }
}
