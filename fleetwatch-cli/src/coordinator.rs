//! The two coalescing consumers
//!
//! Each waits for its queue, drops whatever else piled up meanwhile and acts
//! once. Resorting always ends with a redraw request, so a redraw never shows
//! an order older than the last completed resort.

use std::sync::Arc;

use ratatui::Terminal;
use ratatui::backend::Backend;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use fleetwatch_core::coalesce::CoalesceReceiver;

use crate::dashboard::Dashboard;
use crate::ui::draw;

pub async fn run_resort(dashboard: Arc<Dashboard>, mut requests: CoalesceReceiver) {
    while requests.wait().await {
        dashboard.resort();
    }
    debug!("resort consumer stopped");
}

/// Owns the terminal until `shutdown` fires, then hands it back
pub async fn run_redraw<B: Backend>(
    dashboard: Arc<Dashboard>,
    mut requests: CoalesceReceiver,
    mut terminal: Terminal<B>,
    mut shutdown: oneshot::Receiver<()>,
) -> Terminal<B> {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            more = requests.wait() => {
                if !more {
                    break;
                }
                if let Err(e) = terminal.draw(|frame| draw::render(frame, &dashboard)) {
                    warn!(error = %e, "redraw failed");
                }
            }
        }
    }
    debug!("redraw consumer stopped");
    terminal
}
