//! Full-screen drawing of the host table
//!
//! Layout, top to bottom: the fetch time on row 1, column headers on row 3,
//! one host per row from row 4, and a status bar on the last row. Text is
//! written straight into the frame buffer and clipped at its right edge.

use ratatui::Frame;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;

use fleetwatch_core::search::find_match;
use fleetwatch_core::severity::Severity;

use super::grid::{COLUMNS, IDENTITY};
use super::theme::styles;
use super::view::ViewState;
use crate::dashboard::Dashboard;

pub const DATE_ROW: usize = 1;
pub const HEADER_ROW: usize = 3;
pub const DATA_START_ROW: usize = 4;

const INDEX_WIDTH: usize = 2;
const FIRST_COLUMN_X: usize = 1 + INDEX_WIDTH + 1;

/// RFC 1123 with a numeric zone
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

const KEY_HINTS: &str = "^A all  ^R host  ^F find  ^X reconnect  s silent  i address  Esc quit";

/// Host rows that fit on a screen `height` rows tall
pub fn page_size(height: u16) -> usize {
    usize::from(height).saturating_sub(DATA_START_ROW + 1).max(1)
}

/// Buffer-relative position, or `None` when it falls outside the frame
fn position(buf: &Buffer, x: usize, y: usize) -> Option<(u16, u16)> {
    let x = u16::try_from(x).ok().filter(|x| *x < buf.area.width)?;
    let y = u16::try_from(y).ok().filter(|y| *y < buf.area.height)?;
    Some((buf.area.x + x, buf.area.y + y))
}

/// Write `text` clipped at the right edge. Returns the number of cells the
/// text asked for.
fn put_str(buf: &mut Buffer, x: usize, y: usize, text: &str, style: Style) -> usize {
    if let Some((bx, by)) = position(buf, x, y) {
        let room = usize::from(buf.area.right() - bx);
        buf.set_stringn(bx, by, text, room, style);
    }
    text.chars().count()
}

fn put_char(buf: &mut Buffer, x: usize, y: usize, ch: char, style: Style) {
    if let Some(cell) = position(buf, x, y).and_then(|p| buf.cell_mut(p)) {
        cell.set_char(ch).set_style(style);
    }
}

fn fill_row(buf: &mut Buffer, y: usize, style: Style) {
    if let Some((x, y)) = position(buf, 0, y) {
        buf.set_style(Rect::new(x, y, buf.area.width, 1), style);
    }
}

pub fn render(frame: &mut Frame, dashboard: &Dashboard) {
    let page = page_size(frame.area().height);
    let (view, rows) = dashboard.settle_view(page);
    let widths = dashboard.grid.widths();
    let buf = frame.buffer_mut();

    draw_date(buf, dashboard, &widths);
    draw_header(buf, &widths);
    for (i, id) in rows.iter().enumerate().skip(view.scroll).take(page) {
        let y = DATA_START_ROW + i - view.scroll;
        draw_row(buf, dashboard, &view, &widths, i, id, y);
    }
    draw_status(buf, dashboard, &view);
}

fn draw_date(buf: &mut Buffer, dashboard: &Dashboard, widths: &[usize]) {
    let table_width = FIRST_COLUMN_X + widths.iter().map(|w| w + 1).sum::<usize>();
    let text = match dashboard.fetched_at() {
        Some(at) => at.format(DATE_FORMAT).to_string(),
        None => "waiting for first refresh".to_string(),
    };
    let x = table_width.saturating_sub(text.chars().count()) / 2;
    put_str(buf, x, DATE_ROW, &text, styles::text_dim());
}

fn draw_header(buf: &mut Buffer, widths: &[usize]) {
    let mut x = FIRST_COLUMN_X;
    for (column, width) in COLUMNS.iter().zip(widths) {
        let offset = column.align.offset(*width, column.title.chars().count());
        put_str(buf, x + offset, HEADER_ROW, column.title, styles::header());
        x += width + 1;
    }
}

fn draw_row(
    buf: &mut Buffer,
    dashboard: &Dashboard,
    view: &ViewState,
    widths: &[usize],
    index: usize,
    id: &str,
    y: usize,
) {
    let selected = index == view.selected;
    let selection = styles::selection();
    if selected {
        fill_row(buf, y, selection);
    }

    let fetching = dashboard.fleet.get(id).is_some_and(|e| e.is_fetching());
    let index_style = if selected {
        selection
    } else if fetching {
        styles::in_flight()
    } else {
        styles::text_dim()
    };
    put_str(buf, 1, y, &format!("{:2}", index + 1), index_style);

    let Some(cells) = dashboard.grid.row(id) else {
        return;
    };
    let matched = view
        .search()
        .and_then(|needle| find_match(&cells[IDENTITY].text(), needle));

    let mut x = FIRST_COLUMN_X;
    for (col, (cell, width)) in cells.iter().zip(widths).enumerate() {
        let start = x + COLUMNS[col].align.offset(*width, cell.width());
        for (j, glyph) in cell.glyphs().iter().enumerate() {
            let mut style = if selected { selection } else { glyph.style };
            if col == IDENTITY && matched.as_ref().is_some_and(|r| r.contains(&j)) {
                style = style.patch(styles::highlight());
            }
            put_char(buf, start + j, y, glyph.ch, style);
        }
        x += width + 1;
    }

    if let Some(message) = dashboard.grid.error(id) {
        let badge = if dashboard.grid.is_silent() {
            "E".to_string()
        } else {
            message
        };
        let style = if selected {
            selection
        } else {
            styles::severity(Severity::Error)
        };
        put_str(buf, FIRST_COLUMN_X + widths[IDENTITY] + 1, y, &badge, style);
    }
}

fn draw_status(buf: &mut Buffer, dashboard: &Dashboard, view: &ViewState) {
    let Some(y) = usize::from(buf.area.height).checked_sub(1) else {
        return;
    };
    let width = usize::from(buf.area.width);
    let mut x = 1;
    if let Some(search) = view.search() {
        x += put_str(buf, x, y, &format!("search: {}_", search), styles::accent()) + 2;
    }
    let toggles = [
        (dashboard.grid.shows_address(), "[address]"),
        (dashboard.grid.is_silent(), "[silent]"),
        (view.force_reconnect, "[force reconnect]"),
    ];
    for (_, label) in toggles.iter().filter(|(on, _)| *on) {
        x += put_str(buf, x, y, label, styles::accent()) + 1;
    }
    if let Some(notice) = &view.notice {
        x += put_str(buf, x + 1, y, notice, styles::severity(Severity::Warning)) + 1;
    }

    let hints = KEY_HINTS.chars().count();
    if x + hints + 2 <= width {
        put_str(buf, width - hints - 1, y, KEY_HINTS, styles::key_hint());
    }
}
