//! The identification workflow.
//!
//! A [`Workflow`] owns a controller thread. The view sends it commands
//! (start a flow, reset, shut down) and receives [`WorkflowEvent`]s on the
//! channel returned by [`Workflow::spawn`]. Captures, countdowns, the change
//! monitor and the inspection all run on worker threads that post their
//! results back to the controller's inbox, so the controller never blocks on
//! an external command.
//!
//! Every worker message carries the run number it was started for. A reset
//! bumps the run number, which turns anything still in flight into a stale
//! message that is dropped on arrival.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::config::WorkflowSettings;
use crate::{
    Capture, ChangeMonitor, DeviceInspector, DeviceRecord, DeviceSource, InspectionReport,
    MonitorMode, difference,
};

/// How a finished run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A change fired but no identity differed between the captures.
    NoChange,
    /// A device was identified and inspected.
    Identified,
}

/// Phase of the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    CapturingBaseline,
    /// Waiting for the user to plug or unplug; covers the countdown.
    AwaitingUserAction(MonitorMode),
    Monitoring(MonitorMode),
    Differencing,
    Inspecting,
    /// Terminal until the next reset.
    Succeeded(Outcome),
}

/// Notifications published to the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    /// Startup progress, 0 to 100.
    Progress(u8),
    CountdownTick(u32),
    StatusChanged(String),
    StateChanged(WorkflowState),
    ChangeDetected(Capture),
    DeviceIdentified(DeviceRecord),
    InspectionComplete(InspectionReport),
    NoChangeDetected,
}

#[derive(Debug)]
enum Command {
    Start(MonitorMode),
    Reset,
    Shutdown,
}

/// Controller inbox.
#[derive(Debug)]
enum Message {
    Command(Command),
    BaselineCaptured { run: u64, capture: Capture },
    LeadInElapsed { run: u64 },
    CountdownTick { run: u64, remaining: u32 },
    CountdownFinished { run: u64 },
    ChangeDetected { run: u64, capture: Capture },
    InspectionComplete { run: u64, report: InspectionReport },
}

impl Message {
    fn run(&self) -> Option<u64> {
        match self {
            Message::Command(_) => None,
            Message::BaselineCaptured { run, .. }
            | Message::LeadInElapsed { run }
            | Message::CountdownTick { run, .. }
            | Message::CountdownFinished { run }
            | Message::ChangeDetected { run, .. }
            | Message::InspectionComplete { run, .. } => Some(*run),
        }
    }
}

/// Everything that belongs to one run. A reset replaces it with a fresh
/// instance instead of clearing fields.
#[derive(Debug)]
struct Session {
    run: u64,
    state: WorkflowState,
    mode: Option<MonitorMode>,
    before: Option<Capture>,
    after: Option<Capture>,
    identified: Option<DeviceRecord>,
    report: Option<InspectionReport>,
}

impl Session {
    fn new(run: u64) -> Self {
        Self {
            run,
            state: WorkflowState::Idle,
            mode: None,
            before: None,
            after: None,
            identified: None,
            report: None,
        }
    }
}

#[cfg(test)]
impl Session {
    fn run(&self) -> u64 {
        self.run
    }

    fn state(&self) -> WorkflowState {
        self.state
    }

    fn before(&self) -> Option<&Capture> {
        self.before.as_ref()
    }

    fn after(&self) -> Option<&Capture> {
        self.after.as_ref()
    }

    fn identified(&self) -> Option<&DeviceRecord> {
        self.identified.as_ref()
    }

    fn report(&self) -> Option<&InspectionReport> {
        self.report.as_ref()
    }
}

/// Handle to the controller thread.
pub struct Workflow {
    tx: Sender<Message>,
    handle: Option<JoinHandle<()>>,
}

impl Workflow {
    /// Start the controller. The returned receiver carries every event.
    pub fn spawn(
        source: Arc<dyn DeviceSource>,
        inspector: Arc<dyn DeviceInspector>,
        settings: WorkflowSettings,
    ) -> (Self, Receiver<WorkflowEvent>) {
        let (tx, inbox) = crossbeam_channel::unbounded();
        let (events, events_rx) = crossbeam_channel::unbounded();

        if settings.startup_ms > 0 {
            play_startup(&settings, events.clone());
        }

        let controller = Controller {
            source,
            inspector,
            settings,
            inbox: tx.clone(),
            events,
            monitor: None,
        };
        let handle = thread::spawn(move || controller.run(inbox));

        (
            Self {
                tx,
                handle: Some(handle),
            },
            events_rx,
        )
    }

    /// The device is plugged in and the user is about to unplug it.
    pub fn start_connected_flow(&self) {
        self.send(Command::Start(MonitorMode::Disconnect));
    }

    /// The device is unplugged and the user is about to plug it in.
    pub fn start_not_connected_flow(&self) {
        self.send(Command::Start(MonitorMode::Connect));
    }

    pub fn reset(&self) {
        self.send(Command::Reset);
    }

    /// Stop the controller and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn send(&self, command: Command) {
        if self.tx.send(Message::Command(command)).is_err() {
            log::warn!("workflow controller is no longer running");
        }
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.send(Command::Shutdown);
            if handle.join().is_err() {
                log::error!("workflow controller thread panicked");
            }
        }
    }
}

impl Drop for Workflow {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Status line that closes the startup sequence.
pub const READY_STATUS: &str = "Ready!";

/// Emits the startup progress sequence, then [`READY_STATUS`].
fn play_startup(settings: &WorkflowSettings, events: Sender<WorkflowEvent>) {
    let step = settings.startup() / 100;
    thread::spawn(move || {
        for percent in 0..=100u8 {
            if events.send(WorkflowEvent::Progress(percent)).is_err() {
                return;
            }
            if percent < 100 {
                thread::sleep(step);
            }
        }
        events
            .send(WorkflowEvent::StatusChanged(READY_STATUS.to_string()))
            .ok();
    });
}

struct Controller {
    source: Arc<dyn DeviceSource>,
    inspector: Arc<dyn DeviceInspector>,
    settings: WorkflowSettings,
    inbox: Sender<Message>,
    events: Sender<WorkflowEvent>,
    /// At most one monitor is alive at any time.
    monitor: Option<ChangeMonitor>,
}

impl Controller {
    fn run(mut self, inbox: Receiver<Message>) {
        let mut session = Session::new(0);

        for message in inbox.iter() {
            if let Some(run) = message.run()
                && run != session.run
            {
                log::debug!("dropping message from stale run {}: {:?}", run, message);
                continue;
            }
            if !self.handle(&mut session, message) {
                break;
            }
        }

        self.stop_monitor();
        log::debug!("workflow controller exited");
    }

    /// Apply one message. Returns false once the controller should exit.
    fn handle(&mut self, session: &mut Session, message: Message) -> bool {
        match message {
            Message::Command(Command::Start(mode)) => self.start(session, mode),
            Message::Command(Command::Reset) => self.reset(session),
            Message::Command(Command::Shutdown) => return false,
            Message::BaselineCaptured { capture, .. } => self.on_baseline(session, capture),
            Message::LeadInElapsed { .. } => self.on_lead_in(session),
            Message::CountdownTick { remaining, .. } => {
                self.emit(WorkflowEvent::CountdownTick(remaining))
            }
            Message::CountdownFinished { .. } => self.on_countdown_finished(session),
            Message::ChangeDetected { capture, .. } => self.on_change(session, capture),
            Message::InspectionComplete { report, .. } => self.on_inspection(session, report),
        }
        true
    }

    fn start(&mut self, session: &mut Session, mode: MonitorMode) {
        if session.state != WorkflowState::Idle {
            log::warn!(
                "ignoring start of {} flow while {:?}, reset first",
                mode,
                session.state
            );
            return;
        }

        session.mode = Some(mode);
        self.set_state(session, WorkflowState::CapturingBaseline);
        self.status(match mode {
            MonitorMode::Disconnect => "Great! Keep it there while I grab lsusb",
            MonitorMode::Connect => {
                "Great. When the countdown reaches zero please connect the device you are trying to identify"
            }
        });

        let source = self.source.clone();
        self.spawn_worker(session.run, move |run| Message::BaselineCaptured {
            run,
            capture: source.capture(),
        });
    }

    fn on_baseline(&mut self, session: &mut Session, capture: Capture) {
        let Some(mode) = self.expect_state(session, WorkflowState::CapturingBaseline) else {
            return;
        };

        log::info!("baseline captured with {} devices", capture.len());
        session.before = Some(capture);
        self.set_state(session, WorkflowState::AwaitingUserAction(mode));

        match mode {
            MonitorMode::Disconnect => {
                self.status("Analyzing connected device before disconnection...");
                self.status("Capturing detailed hardware information...");
                let lead_in = self.settings.lead_in();
                self.spawn_worker(session.run, move |run| {
                    thread::sleep(lead_in);
                    Message::LeadInElapsed { run }
                });
            }
            MonitorMode::Connect => self.start_countdown(session),
        }
    }

    fn on_lead_in(&mut self, session: &mut Session) {
        if self
            .expect_state(session, WorkflowState::AwaitingUserAction(MonitorMode::Disconnect))
            .is_none()
        {
            return;
        }
        self.status("Now, when the countdown reaches zero, disconnect the device.");
        self.start_countdown(session);
    }

    fn start_countdown(&self, session: &Session) {
        let seconds = self.settings.countdown_secs;
        let tick = self.settings.countdown_tick();
        let inbox = self.inbox.clone();
        let run = session.run;

        thread::spawn(move || {
            for remaining in (1..=seconds).rev() {
                if inbox.send(Message::CountdownTick { run, remaining }).is_err() {
                    return;
                }
                thread::sleep(tick);
            }
            inbox.send(Message::CountdownFinished { run }).ok();
        });
    }

    fn on_countdown_finished(&mut self, session: &mut Session) {
        let Some(mode) = session.mode else { return };
        if self
            .expect_state(session, WorkflowState::AwaitingUserAction(mode))
            .is_none()
        {
            return;
        }

        self.status(match mode {
            MonitorMode::Disconnect => "Waiting for device disconnection...",
            MonitorMode::Connect => "Waiting for device connection...",
        });
        self.set_state(session, WorkflowState::Monitoring(mode));

        // Never two monitors at once: the previous one is stopped and joined
        // before the next one starts.
        // 同一时刻只允许一个监视器：先停止并回收旧的，再启动新的
        self.stop_monitor();

        let baseline = session.before.clone().unwrap_or_default();
        let inbox = self.inbox.clone();
        let run = session.run;
        self.monitor = Some(ChangeMonitor::start(
            self.source.clone(),
            &baseline,
            mode,
            self.settings.poll_interval(),
            move |capture| {
                inbox.send(Message::ChangeDetected { run, capture }).ok();
            },
        ));
    }

    fn on_change(&mut self, session: &mut Session, capture: Capture) {
        let Some(mode) = session.mode else { return };
        if self
            .expect_state(session, WorkflowState::Monitoring(mode))
            .is_none()
        {
            return;
        }

        // The monitor has already exited after firing; this only reaps it.
        // 监视器触发后已自行退出，这里只负责回收线程
        self.stop_monitor();

        self.emit(WorkflowEvent::ChangeDetected(capture.clone()));
        self.status(match mode {
            MonitorMode::Disconnect => "Device disconnected! Analyzing...",
            MonitorMode::Connect => "Device connected! Analyzing...",
        });
        self.set_state(session, WorkflowState::Differencing);

        let before = session.before.clone().unwrap_or_default();
        let changed = match mode {
            // Records that vanished / 消失的设备
            MonitorMode::Disconnect => difference(&capture, &before),
            // Records that appeared / 新出现的设备
            MonitorMode::Connect => difference(&before, &capture),
        };
        session.after = Some(capture);

        if changed.len() > 1 {
            log::info!(
                "{} devices changed at once, reporting the first",
                changed.len()
            );
        }

        // First in enumeration order wins.
        // 按枚举顺序取第一个
        let Some(device) = changed.into_iter().next() else {
            self.status("No device changes detected");
            self.emit(WorkflowEvent::NoChangeDetected);
            self.set_state(session, WorkflowState::Succeeded(Outcome::NoChange));
            return;
        };

        log::info!("identified {}", device);
        session.identified = Some(device.clone());
        self.emit(WorkflowEvent::DeviceIdentified(device.clone()));

        self.set_state(session, WorkflowState::Inspecting);
        self.status("Performing detailed hardware inspection...");

        let inspector = self.inspector.clone();
        self.spawn_worker(session.run, move |run| Message::InspectionComplete {
            run,
            report: inspector.inspect(&device),
        });
    }

    fn on_inspection(&mut self, session: &mut Session, report: InspectionReport) {
        if self
            .expect_state(session, WorkflowState::Inspecting)
            .is_none()
        {
            return;
        }

        session.report = Some(report.clone());
        self.emit(WorkflowEvent::InspectionComplete(report));
        self.status("Device captured: 1 device identified with detailed analysis");
        self.set_state(session, WorkflowState::Succeeded(Outcome::Identified));
    }

    fn reset(&mut self, session: &mut Session) {
        self.stop_monitor();
        *session = Session::new(session.run + 1);
        log::debug!("workflow reset, run {}", session.run);
        self.emit(WorkflowEvent::StateChanged(WorkflowState::Idle));
    }

    /// Returns the flow's mode when the session is in `expected`.
    fn expect_state(&self, session: &Session, expected: WorkflowState) -> Option<MonitorMode> {
        if session.state != expected {
            log::warn!(
                "unexpected message in state {:?}, expected {:?}",
                session.state,
                expected
            );
            return None;
        }
        session.mode
    }

    fn stop_monitor(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
    }

    /// Run blocking `work` off the controller thread and post its message.
    fn spawn_worker<F>(&self, run: u64, work: F)
    where
        F: FnOnce(u64) -> Message + Send + 'static,
    {
        let inbox = self.inbox.clone();
        thread::spawn(move || {
            inbox.send(work(run)).ok();
        });
    }

    fn set_state(&self, session: &mut Session, state: WorkflowState) {
        session.state = state;
        self.emit(WorkflowEvent::StateChanged(state));
    }

    fn status(&self, message: &str) {
        self.emit(WorkflowEvent::StatusChanged(message.to_string()));
    }

    fn emit(&self, event: WorkflowEvent) {
        // A view that went away is not an error for the core.
        // 界面已关闭不算核心错误
        self.events.send(event).ok();
    }
}
