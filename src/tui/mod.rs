//! Terminal User Interface
//!
//! Interactive front end for the identification workflow. The workflow
//! controller does the work; this module only draws its events and forwards
//! key presses.

pub mod app;
pub mod ui;

use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use crate::{Workflow, WorkflowEvent};
use app::{App, Request};

/// How long to wait for a key before redrawing.
const TICK_RATE: Duration = Duration::from_millis(50);

/// Terminal wrapper for setup/teardown
pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Tui {
    pub fn new() -> Result<Self> {
        let backend = CrosstermBackend::new(io::stdout());
        let terminal = Terminal::new(backend).context("failed to open terminal")?;
        Ok(Self { terminal })
    }

    /// Enter TUI mode (raw mode, alternate screen)
    pub fn enter(&mut self) -> Result<()> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        self.terminal.hide_cursor()?;
        self.terminal.clear()?;
        Ok(())
    }

    /// Exit TUI mode (restore terminal state)
    pub fn exit(&mut self) -> Result<()> {
        disable_raw_mode()?;
        execute!(io::stdout(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }

    pub fn draw(&mut self, app: &App) -> Result<()> {
        self.terminal.draw(|frame| ui::render(frame, app))?;
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        // Best effort cleanup
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Run the TUI until the user quits.
pub fn run(workflow: &Workflow, events: &Receiver<WorkflowEvent>) -> Result<()> {
    let mut tui = Tui::new()?;
    tui.enter()?;

    let mut app = App::new();

    while !app.should_quit() {
        for event in events.try_iter() {
            app.apply(event);
        }

        tui.draw(&app)?;

        if !event::poll(TICK_RATE)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            // Ignore key release events on some platforms
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match app.handle_key(key) {
                Some(Request::StartConnected) => workflow.start_connected_flow(),
                Some(Request::StartNotConnected) => workflow.start_not_connected_flow(),
                Some(Request::Reset) => workflow.reset(),
                None => {}
            }
        }
    }

    tui.exit()
}
