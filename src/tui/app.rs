//! TUI application state
//!
//! Folds workflow events into what the screens show and turns key presses
//! into workflow requests.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::workflow::READY_STATUS;
use crate::{DeviceRecord, InspectionReport, Outcome, WorkflowEvent, WorkflowState};

/// Which screen is on display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Startup progress bar
    Loading,
    /// "Is the device already connected?"
    Welcome,
    /// Status line and countdown of a running flow
    Workflow,
    /// Identified device and inspection report
    Results,
}

/// What the key press asks of the workflow controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    StartConnected,
    StartNotConnected,
    Reset,
}

pub struct App {
    screen: Screen,
    progress: u8,
    status: String,
    countdown: Option<u32>,
    state: WorkflowState,
    identified: Option<DeviceRecord>,
    report: Option<InspectionReport>,
    /// Scroll offset of the report view, in lines
    scroll: u16,
    should_quit: bool,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            screen: Screen::Loading,
            progress: 0,
            status: "Loading...".to_string(),
            countdown: None,
            state: WorkflowState::Idle,
            identified: None,
            report: None,
            scroll: 0,
            should_quit: false,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn countdown(&self) -> Option<u32> {
        self.countdown
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn identified(&self) -> Option<&DeviceRecord> {
        self.identified.as_ref()
    }

    pub fn report(&self) -> Option<&InspectionReport> {
        self.report.as_ref()
    }

    pub fn scroll(&self) -> u16 {
        self.scroll
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// True once the run reached a terminal state.
    pub fn finished(&self) -> bool {
        matches!(self.state, WorkflowState::Succeeded(_))
    }

    pub fn apply(&mut self, event: WorkflowEvent) {
        match event {
            WorkflowEvent::Progress(percent) => {
                self.progress = percent;
                if self.screen == Screen::Loading {
                    self.status = format!("Loading... {}%", percent);
                }
            }
            WorkflowEvent::StatusChanged(message) => {
                if self.screen == Screen::Loading {
                    self.screen = Screen::Welcome;
                } else if message == READY_STATUS {
                    // Startup was skipped and is only now catching up
                    return;
                }
                self.status = message;
            }
            WorkflowEvent::CountdownTick(seconds) => self.countdown = Some(seconds),
            WorkflowEvent::StateChanged(state) => {
                self.state = state;
                if !matches!(state, WorkflowState::AwaitingUserAction(_)) {
                    self.countdown = None;
                }
            }
            WorkflowEvent::DeviceIdentified(device) => self.identified = Some(device),
            WorkflowEvent::InspectionComplete(report) => self.report = Some(report),
            WorkflowEvent::ChangeDetected(capture) => {
                log::debug!("change detected, {} devices attached", capture.len());
            }
            WorkflowEvent::NoChangeDetected => {}
        }
    }

    /// Handle a key press. Returns the request to forward to the workflow.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Request> {
        if key.code == KeyCode::Char('q')
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
        {
            self.should_quit = true;
            return None;
        }

        match (self.screen, key.code) {
            (Screen::Loading, KeyCode::Enter) => {
                self.screen = Screen::Welcome;
                None
            }
            (Screen::Welcome, KeyCode::Char('y')) => Some(self.begin(Request::StartConnected)),
            (Screen::Welcome, KeyCode::Char('n')) => Some(self.begin(Request::StartNotConnected)),
            (Screen::Workflow, KeyCode::Enter) if self.finished() => {
                self.screen = Screen::Results;
                self.scroll = 0;
                None
            }
            (Screen::Workflow | Screen::Results, KeyCode::Char('r') | KeyCode::Esc) => {
                Some(self.restart())
            }
            (Screen::Results, KeyCode::Up | KeyCode::Char('k')) => {
                self.scroll = self.scroll.saturating_sub(1);
                None
            }
            (Screen::Results, KeyCode::Down | KeyCode::Char('j')) => {
                self.scroll = self.scroll.saturating_add(1);
                None
            }
            (Screen::Results, KeyCode::PageUp) => {
                self.scroll = self.scroll.saturating_sub(10);
                None
            }
            (Screen::Results, KeyCode::PageDown) => {
                self.scroll = self.scroll.saturating_add(10);
                None
            }
            _ => None,
        }
    }

    fn begin(&mut self, request: Request) -> Request {
        self.screen = Screen::Workflow;
        request
    }

    fn restart(&mut self) -> Request {
        self.screen = Screen::Welcome;
        self.status = String::new();
        self.countdown = None;
        self.identified = None;
        self.report = None;
        self.scroll = 0;
        Request::Reset
    }

    /// Headline shown once the run is over.
    pub fn outcome_message(&self) -> Option<&'static str> {
        match self.state {
            WorkflowState::Succeeded(Outcome::Identified) => Some("Found it!"),
            WorkflowState::Succeeded(Outcome::NoChange) => Some("No device changes detected"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventKind;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn mouse() -> DeviceRecord {
        DeviceRecord::new("001", "002", "abcd", "1234", "Mouse")
    }

    #[test]
    fn loading_ends_on_ready() {
        let mut app = App::new();
        app.apply(WorkflowEvent::Progress(40));
        assert_eq!(app.screen(), Screen::Loading);
        assert_eq!(app.status(), "Loading... 40%");

        app.apply(WorkflowEvent::StatusChanged("Ready!".to_string()));
        assert_eq!(app.screen(), Screen::Welcome);
    }

    #[test]
    fn skipped_startup_leaves_flow_status_alone() {
        let mut app = App::new();
        app.apply(WorkflowEvent::Progress(10));
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.screen(), Screen::Welcome);

        app.handle_key(key(KeyCode::Char('n')));
        let instructions = "Great. When the countdown reaches zero please connect the device you are trying to identify";
        app.apply(WorkflowEvent::StatusChanged(instructions.to_string()));

        // The startup thread keeps running behind the skipped screen.
        app.apply(WorkflowEvent::Progress(60));
        assert_eq!(app.status(), instructions);
        app.apply(WorkflowEvent::StatusChanged(READY_STATUS.to_string()));
        assert_eq!(app.status(), instructions);
        assert_eq!(app.screen(), Screen::Workflow);
        assert_eq!(app.progress(), 60);
    }

    #[test]
    fn welcome_keys_start_flows() {
        let mut app = App::new();
        app.apply(WorkflowEvent::StatusChanged("Ready!".to_string()));

        assert_eq!(app.handle_key(key(KeyCode::Char('x'))), None);
        assert_eq!(
            app.handle_key(key(KeyCode::Char('y'))),
            Some(Request::StartConnected)
        );
        assert_eq!(app.screen(), Screen::Workflow);

        assert_eq!(app.handle_key(key(KeyCode::Char('r'))), Some(Request::Reset));
        assert_eq!(
            app.handle_key(key(KeyCode::Char('n'))),
            Some(Request::StartNotConnected)
        );
    }

    #[test]
    fn results_open_only_after_success() {
        let mut app = App::new();
        app.apply(WorkflowEvent::StatusChanged("Ready!".to_string()));
        app.handle_key(key(KeyCode::Char('y')));

        app.apply(WorkflowEvent::StateChanged(WorkflowState::Monitoring(
            crate::MonitorMode::Disconnect,
        )));
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.screen(), Screen::Workflow);

        app.apply(WorkflowEvent::DeviceIdentified(mouse()));
        app.apply(WorkflowEvent::InspectionComplete(InspectionReport::new(
            &mouse(),
            "report",
        )));
        app.apply(WorkflowEvent::StateChanged(WorkflowState::Succeeded(
            Outcome::Identified,
        )));
        assert_eq!(app.outcome_message(), Some("Found it!"));

        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.screen(), Screen::Results);
        assert_eq!(app.identified(), Some(&mouse()));

        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Up));
        assert_eq!(app.scroll(), 1);

        assert_eq!(app.handle_key(key(KeyCode::Esc)), Some(Request::Reset));
        assert!(app.identified().is_none());
        assert!(app.report().is_none());
    }

    #[test]
    fn countdown_clears_when_monitoring_starts() {
        let mut app = App::new();
        app.apply(WorkflowEvent::StateChanged(WorkflowState::AwaitingUserAction(
            crate::MonitorMode::Connect,
        )));
        app.apply(WorkflowEvent::CountdownTick(2));
        assert_eq!(app.countdown(), Some(2));

        app.apply(WorkflowEvent::StateChanged(WorkflowState::Monitoring(
            crate::MonitorMode::Connect,
        )));
        assert_eq!(app.countdown(), None);
    }

    #[test]
    fn quit_from_any_screen() {
        let mut app = App::new();
        let ctrl_c = KeyEvent {
            kind: KeyEventKind::Press,
            ..KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)
        };
        app.handle_key(ctrl_c);
        assert!(app.should_quit());
    }
}
