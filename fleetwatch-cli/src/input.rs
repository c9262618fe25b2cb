//! Keyboard command loop

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::{debug, info};

use fleetwatch_core::config::CommandMap;
use fleetwatch_core::executor::RemoteExecutor;
use fleetwatch_core::model::HostId;

use crate::dashboard::Dashboard;
use crate::scheduler::Scheduler;
use crate::shell::ShellLauncher;
use crate::ui::draw::page_size;

const POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Continue,
    Quit,
}

pub struct CommandLoop<E: RemoteExecutor> {
    dashboard: Arc<Dashboard>,
    scheduler: Arc<Scheduler<E>>,
    commands: CommandMap,
    launcher: ShellLauncher,
}

impl<E: RemoteExecutor> CommandLoop<E> {
    pub fn new(
        dashboard: Arc<Dashboard>,
        scheduler: Arc<Scheduler<E>>,
        commands: CommandMap,
        launcher: ShellLauncher,
    ) -> Self {
        Self {
            dashboard,
            scheduler,
            commands,
            launcher,
        }
    }

    /// Read terminal events until the user quits
    pub async fn run(&self) -> io::Result<()> {
        loop {
            if !tokio::task::block_in_place(|| event::poll(POLL))? {
                tokio::task::yield_now().await;
                continue;
            }
            let ev = event::read()?;
            let (_, height) = crossterm::terminal::size()?;
            if self.handle_event(ev, height) == Action::Quit {
                info!("quit requested");
                return Ok(());
            }
        }
    }

    pub fn handle_event(&self, ev: Event, height: u16) -> Action {
        match ev {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key, height),
            Event::Resize(_, _) => {
                self.dashboard.request_redraw();
                Action::Continue
            }
            _ => Action::Continue,
        }
    }

    fn selected_host(&self, page: usize) -> Option<HostId> {
        let (view, rows) = self.dashboard.settle_view(page);
        rows.get(view.selected).cloned()
    }

    fn notice(&self, message: impl Into<String>) {
        self.dashboard.view().notice = Some(message.into());
    }

    fn refresh_fleet(&self) {
        let force = self.dashboard.view().take_force_reconnect();
        if !self.scheduler.request_fleet_refresh(force) {
            self.notice("refresh already running");
        }
    }

    fn refresh_host(&self, page: usize) {
        let Some(id) = self.selected_host(page) else {
            return;
        };
        let force = self.dashboard.view().take_force_reconnect();
        if self.scheduler.fetch_one(&id, force).is_none() {
            self.notice(format!("{} is already being fetched", id));
        }
    }

    fn open_shell(&self, page: usize, remote: Option<&str>) {
        let Some(id) = self.selected_host(page) else {
            return;
        };
        let Some(entry) = self.dashboard.fleet.get(&id) else {
            return;
        };
        if let Err(e) = self.launcher.open(&entry.spec.target(), remote) {
            self.notice(format!("cannot open terminal: {}", e));
        }
    }

    fn run_mapped(&self, n: u8, page: usize) {
        match self.commands.get(n) {
            Some(command) => {
                let command = command.to_string();
                debug!(key = n, %command, "running mapped command");
                self.open_shell(page, Some(&command));
            }
            None => self.notice(format!("F{} is not mapped", n)),
        }
    }

    pub fn handle_key(&self, key: KeyEvent, height: u16) -> Action {
        let page = page_size(height);
        let len = self.dashboard.settle_view(page).1.len();
        let searching = {
            let mut view = self.dashboard.view();
            view.notice = None;
            view.is_searching()
        };

        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => return Action::Quit,
            (KeyCode::Esc, _) => {
                if !searching {
                    return Action::Quit;
                }
                self.dashboard.view().exit_search();
            }
            (KeyCode::Char('a'), KeyModifiers::CONTROL) => self.refresh_fleet(),
            (KeyCode::Char('r'), KeyModifiers::CONTROL) => self.refresh_host(page),
            (KeyCode::Char('f'), KeyModifiers::CONTROL) => self.dashboard.view().start_search(),
            (KeyCode::Char('x'), KeyModifiers::CONTROL) => {
                let mut view = self.dashboard.view();
                view.force_reconnect = !view.force_reconnect;
            }
            (KeyCode::Up, _) => self.dashboard.view().up(),
            (KeyCode::Down, _) => self.dashboard.view().down(len, page),
            (KeyCode::PageUp, _) => self.dashboard.view().page_up(page),
            (KeyCode::PageDown, _) => self.dashboard.view().page_down(len, page),
            (KeyCode::Home, _) => self.dashboard.view().home(),
            (KeyCode::End, _) => self.dashboard.view().end(len, page),
            (KeyCode::Enter, _) => self.open_shell(page, None),
            (KeyCode::F(n), _) => self.run_mapped(n, page),
            (KeyCode::Backspace, _) if searching => self.dashboard.view().pop_search(),
            (KeyCode::Char(ch), m) if searching && !m.contains(KeyModifiers::CONTROL) => {
                self.dashboard.view().push_search(ch);
            }
            (KeyCode::Char('s'), KeyModifiers::NONE) => {
                let silent = self.dashboard.grid.toggle_silent();
                debug!(silent, "silent mode toggled");
                self.dashboard.format_all();
            }
            (KeyCode::Char('i'), KeyModifiers::NONE) => {
                let show_address = self.dashboard.grid.toggle_show_address();
                debug!(show_address, "address display toggled");
                self.dashboard.format_all();
            }
            _ => {}
        }

        self.dashboard.request_redraw();
        Action::Continue
    }
}
