mod dashboard;
mod log_panel;
mod preview;

use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};

use crate::app::{App, SettingsField};
use crate::types::{AppEvent, TrackedFrame};

const POLL_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Default)]
struct UiState {
    quit: bool,
    selected_field: usize,
    editing: Option<String>,
    log_scroll: usize,
    preview: Option<TrackedFrame>,
}

/// Raw-mode/alternate-screen guard. `restore` runs on every exit path,
/// panic included, so the shell never ends up with a broken terminal.
struct TuiTerminal {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    restored: bool,
}

impl TuiTerminal {
    fn new() -> Result<Self> {
        enable_raw_mode().context("enabling raw mode")?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("creating terminal")?;
        terminal.hide_cursor()?;
        Ok(Self {
            terminal,
            restored: false,
        })
    }

    fn restore(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for TuiTerminal {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

/// Dashboard loop: drains app events and tracked frames, redraws, and
/// dispatches key presses until the operator quits.
pub fn run(
    app: &mut App,
    tracked_rx: Receiver<TrackedFrame>,
    events_rx: Receiver<AppEvent>,
) -> Result<()> {
    let mut tui = TuiTerminal::new()?;
    let mut state = UiState::default();

    while !state.quit {
        for event in events_rx.try_iter() {
            app.handle_event(event);
        }
        if let Some(tracked) = tracked_rx.try_iter().last() {
            app.on_tracked_frame(&tracked);
            state.preview = Some(tracked);
        }

        tui.terminal.draw(|f| render(f, app, &state))?;

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, &mut state, key);
                }
            }
        }
    }

    tui.restore()
}

fn handle_key(app: &mut App, state: &mut UiState, key: KeyEvent) {
    if state.editing.is_some() {
        match key.code {
            KeyCode::Esc => state.editing = None,
            KeyCode::Enter => {
                if let Some(text) = state.editing.take() {
                    app.set_field_value(selected_field(state), &text);
                    app.commit_settings();
                }
            }
            KeyCode::Backspace => {
                if let Some(buffer) = &mut state.editing {
                    buffer.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(buffer) = &mut state.editing {
                    buffer.push(c);
                }
            }
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Char('q') => state.quit = true,
        KeyCode::Char('c') => app.connect(),
        KeyCode::Char('d') => app.disconnect(),
        KeyCode::Char('v') => app.toggle_video(),
        KeyCode::Char('h') => app.toggle_hand(),
        KeyCode::Char('b') => app.toggle_base64(),
        KeyCode::Char('-') => app.bump_fps(-1),
        KeyCode::Char('+') | KeyCode::Char('=') => app.bump_fps(1),
        KeyCode::Char('t') => app.toggle_transport(),
        KeyCode::Char('[') => app.cycle_field(selected_field(state), -1),
        KeyCode::Char(']') => app.cycle_field(selected_field(state), 1),
        KeyCode::Tab | KeyCode::Down => {
            state.selected_field = (state.selected_field + 1) % SettingsField::ALL.len();
        }
        KeyCode::BackTab | KeyCode::Up => {
            state.selected_field =
                (state.selected_field + SettingsField::ALL.len() - 1) % SettingsField::ALL.len();
        }
        KeyCode::Enter => state.editing = Some(app.field_value(selected_field(state))),
        KeyCode::Char('x') => app.clear_logs(),
        KeyCode::Char('e') => match app.export_logs(Path::new(".")) {
            Ok(path) => log::info!(target: "success", "Log exported to {}", path.display()),
            Err(err) => log::error!("Log export failed: {err:#}"),
        },
        KeyCode::PageUp => state.log_scroll = state.log_scroll.saturating_add(5),
        KeyCode::PageDown => state.log_scroll = state.log_scroll.saturating_sub(5),
        _ => {}
    }
}

fn selected_field(state: &UiState) -> SettingsField {
    SettingsField::ALL[state.selected_field % SettingsField::ALL.len()]
}

fn render(f: &mut ratatui::Frame, app: &App, state: &UiState) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(f.area());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(58), Constraint::Percentage(42)])
        .split(outer[0]);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(10)])
        .split(columns[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(9), Constraint::Min(4)])
        .split(columns[1]);

    preview::render(f, state.preview.as_ref(), left[0]);
    dashboard::render_status(f, app, left[1]);
    dashboard::render_settings(f, app, state.selected_field, state.editing.as_deref(), right[0]);
    log_panel::render(f, &app.logs, state.log_scroll, right[1]);
    dashboard::render_help(f, outer[1]);
}
