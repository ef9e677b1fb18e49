//! Running the external commands the tool depends on.
//!
//! Every command is reduced to a [`CommandOutcome`]; callers decide how a
//! failure is degraded. Nothing here returns an error.

use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often a bounded command is checked for completion.
const WAIT_STEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The process ran to completion.
    Finished {
        success: bool,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// The process outlived its deadline and was killed.
    TimedOut,
    /// The process could not be started at all.
    LaunchFailed(String),
}

impl CommandOutcome {
    /// Stdout of a successful run, `None` for every other outcome.
    pub fn success_stdout(&self) -> Option<&str> {
        match self {
            CommandOutcome::Finished {
                success: true,
                stdout,
                ..
            } => Some(stdout),
            _ => None,
        }
    }
}

/// Run `program` to completion with no deadline.
pub fn run<I, S>(program: &str, args: I) -> CommandOutcome
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
    {
        Ok(out) => CommandOutcome::Finished {
            success: out.status.success(),
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        },
        Err(e) => CommandOutcome::LaunchFailed(e.to_string()),
    }
}

/// Run `program`, killing it if it has not exited after `timeout`.
pub fn run_with_timeout<I, S>(program: &str, args: I, timeout: Duration) -> CommandOutcome
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return CommandOutcome::LaunchFailed(e.to_string()),
    };

    // Pipes are drained on their own threads so a chatty child cannot fill
    // the pipe buffer and stall before the deadline.
    // 在独立线程中读取管道，防止输出过多的子进程写满缓冲区而卡住
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                kill(&mut child, program);
                return CommandOutcome::TimedOut;
            }
            Ok(None) => thread::sleep(WAIT_STEP),
            Err(e) => {
                kill(&mut child, program);
                return CommandOutcome::LaunchFailed(e.to_string());
            }
        }
    };

    CommandOutcome::Finished {
        success: status.success(),
        code: status.code(),
        stdout: collect(stdout),
        stderr: collect(stderr),
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

fn kill(child: &mut Child, program: &str) {
    if let Err(e) = child.kill() {
        log::debug!("failed to kill {}: {}", program, e);
    }
    // Reap it so no zombie is left behind.
    // 回收子进程，避免留下僵尸进程
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_of_successful_command() {
        let out = run_with_timeout("echo", ["hello"], Duration::from_secs(5));
        assert_eq!(out.success_stdout(), Some("hello\n"));
    }

    #[test]
    fn reports_non_zero_exit() {
        let out = run("sh", ["-c", "echo oops >&2; exit 3"]);
        match out {
            CommandOutcome::Finished {
                success,
                code,
                stderr,
                ..
            } => {
                assert!(!success);
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "oops\n");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_a_launch_failure() {
        let out = run_with_timeout(
            "/nonexistent/which-usb-test-binary",
            Vec::<String>::new(),
            Duration::from_secs(1),
        );
        assert!(matches!(out, CommandOutcome::LaunchFailed(_)));
        assert!(matches!(
            run("/nonexistent/which-usb-test-binary", Vec::<String>::new()),
            CommandOutcome::LaunchFailed(_)
        ));
    }

    #[test]
    fn slow_command_times_out() {
        let started = Instant::now();
        let out = run_with_timeout("sleep", ["5"], Duration::from_millis(100));
        assert_eq!(out, CommandOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
