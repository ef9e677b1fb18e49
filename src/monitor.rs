//! Polling change monitor.
//!
//! The monitor re-enumerates the device table at a fixed interval and fires
//! once when the number of devices moves in the expected direction. Only the
//! count is compared here; working out *which* device changed is left to
//! [`crate::difference`].
//!
//! A table that loses one device and gains another between two polls keeps
//! its count and is never reported. Polling sees samples, not transitions.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::{Capture, DeviceSource};

/// Which direction of change the monitor waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorMode {
    /// Fire when fewer devices are attached than in the baseline.
    Disconnect,
    /// Fire when more devices are attached than in the baseline.
    Connect,
}

impl MonitorMode {
    pub fn is_triggered(self, baseline: usize, observed: usize) -> bool {
        match self {
            MonitorMode::Disconnect => observed < baseline,
            MonitorMode::Connect => observed > baseline,
        }
    }
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorMode::Disconnect => f.write_str("disconnect"),
            MonitorMode::Connect => f.write_str("connect"),
        }
    }
}

/// Handle to a running monitor thread.
///
/// Dropping the handle stops the monitor and waits for it.
pub struct ChangeMonitor {
    // Dropping the sender is the stop signal
    // 丢弃发送端即为停止信号
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ChangeMonitor {
    /// Start polling `source` against `baseline`.
    ///
    /// `on_change` is called at most once, from the monitor thread, with the
    /// capture that satisfied `mode`. The monitor exits right after.
    pub fn start<F>(
        source: Arc<dyn DeviceSource>,
        baseline: &Capture,
        mode: MonitorMode,
        interval: Duration,
        on_change: F,
    ) -> Self
    where
        F: FnOnce(Capture) + Send + 'static,
    {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let baseline_len = baseline.len();

        log::info!(
            "starting {} monitor, baseline has {} devices, polling every {:?}",
            mode,
            baseline_len,
            interval
        );

        let handle = thread::spawn(move || {
            poll_until_change(
                source.as_ref(),
                baseline_len,
                mode,
                interval,
                &stop_rx,
                on_change,
            )
        });

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// True while the polling thread is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the monitor and block until its thread has exited.
    ///
    /// Calling it again, or after the monitor fired, is a no-op. Once this
    /// returns the change callback will not run.
    pub fn stop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("change monitor thread panicked");
            }
            log::debug!("change monitor stopped");
        }
    }
}

impl Drop for ChangeMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_until_change<F>(
    source: &dyn DeviceSource,
    baseline_len: usize,
    mode: MonitorMode,
    interval: Duration,
    stop_rx: &Receiver<()>,
    on_change: F,
) where
    F: FnOnce(Capture),
{
    loop {
        let observed = source.capture();

        // A stop that arrived while the scan was running wins over its result
        // 扫描期间收到的停止请求优先于扫描结果
        if !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty)) {
            return;
        }

        if mode.is_triggered(baseline_len, observed.len()) {
            log::info!(
                "{} detected: {} -> {} devices",
                mode,
                baseline_len,
                observed.len()
            );
            on_change(observed);
            return;
        }

        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceRecord;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed number of identical devices, adjustable at runtime.
    struct CountingSource {
        count: Mutex<usize>,
        polls: AtomicUsize,
    }

    impl CountingSource {
        fn new(count: usize) -> Arc<Self> {
            Arc::new(Self {
                count: Mutex::new(count),
                polls: AtomicUsize::new(0),
            })
        }

        fn set(&self, count: usize) {
            *self.count.lock().unwrap() = count;
        }
    }

    impl DeviceSource for CountingSource {
        fn enumerate(&self) -> Vec<DeviceRecord> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let count = *self.count.lock().unwrap();
            (0..count)
                .map(|i| DeviceRecord::new("001", i.to_string(), "abcd", "1234", "Mouse"))
                .collect()
        }
    }

    fn baseline(count: usize) -> Capture {
        CountingSource::new(count).capture()
    }

    const INTERVAL: Duration = Duration::from_millis(5);

    #[test]
    fn trigger_rules() {
        assert!(MonitorMode::Disconnect.is_triggered(3, 2));
        assert!(!MonitorMode::Disconnect.is_triggered(3, 3));
        assert!(!MonitorMode::Disconnect.is_triggered(3, 4));
        assert!(MonitorMode::Connect.is_triggered(3, 4));
        assert!(!MonitorMode::Connect.is_triggered(3, 3));
        assert!(!MonitorMode::Connect.is_triggered(3, 2));
    }

    #[test]
    fn fires_once_on_disconnect() {
        let source = CountingSource::new(2);
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut monitor = ChangeMonitor::start(
            source.clone(),
            &baseline(2),
            MonitorMode::Disconnect,
            INTERVAL,
            move |capture| tx.send(capture).unwrap(),
        );

        // Growing the table must not trigger a disconnect monitor.
        source.set(3);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        source.set(1);
        let capture = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(capture.len(), 1);

        monitor.stop();
        assert!(!monitor.is_running());
        // The callback was consumed and the sender dropped with it.
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn fires_on_connect() {
        let source = CountingSource::new(0);
        let (tx, rx) = crossbeam_channel::unbounded();
        let _monitor = ChangeMonitor::start(
            source.clone(),
            &baseline(0),
            MonitorMode::Connect,
            INTERVAL,
            move |capture| tx.send(capture).unwrap(),
        );

        thread::sleep(Duration::from_millis(20));
        source.set(1);
        let capture = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(capture.len(), 1);
    }

    #[test]
    fn no_event_after_stop() {
        let source = CountingSource::new(2);
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut monitor = ChangeMonitor::start(
            source.clone(),
            &baseline(2),
            MonitorMode::Disconnect,
            INTERVAL,
            move |capture| tx.send(capture).unwrap(),
        );

        thread::sleep(Duration::from_millis(20));
        monitor.stop();
        let polls = source.polls.load(Ordering::SeqCst);
        assert!(polls > 0);

        source.set(0);
        thread::sleep(Duration::from_millis(30));
        assert!(rx.try_recv().is_err());
        assert_eq!(source.polls.load(Ordering::SeqCst), polls);
    }

    /// Signals when a scan begins, then takes `delay` to report an empty table.
    struct SlowEmptySource {
        entered: Sender<()>,
        delay: Duration,
    }

    impl DeviceSource for SlowEmptySource {
        fn enumerate(&self) -> Vec<DeviceRecord> {
            self.entered.send(()).ok();
            thread::sleep(self.delay);
            Vec::new()
        }
    }

    #[test]
    fn stop_during_scan_discards_its_result() {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let source = Arc::new(SlowEmptySource {
            entered: entered_tx,
            delay: Duration::from_millis(200),
        });
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut monitor = ChangeMonitor::start(
            source,
            &baseline(2),
            MonitorMode::Disconnect,
            INTERVAL,
            move |capture| tx.send(capture).unwrap(),
        );

        // The scan in flight would satisfy the disconnect rule.
        entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        thread::sleep(Duration::from_millis(50));
        monitor.stop();

        assert!(!monitor.is_running());
        assert!(rx.try_recv().is_err());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn stop_is_idempotent_and_interrupts_the_wait() {
        let source = CountingSource::new(1);
        let mut monitor = ChangeMonitor::start(
            source,
            &baseline(1),
            MonitorMode::Connect,
            Duration::from_secs(60),
            |_| {},
        );

        let started = std::time::Instant::now();
        monitor.stop();
        monitor.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!monitor.is_running());
    }
}
