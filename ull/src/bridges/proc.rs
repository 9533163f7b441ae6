//! Subprocess execution with a hard deadline
//!
//! std::process has no built-in timeout; the child is waited on from a
//! helper thread and killed via signal when the deadline passes.

use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::debug;

use crate::error::UllError;

/// Run a command to completion, killing it if the deadline passes
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<Output, UllError> {
    command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    let child = command.spawn()?;
    let pid = child.id();
    debug!(pid, ?timeout, "run_with_timeout: spawned");

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(child.wait_with_output());
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => Ok(result?),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            debug!(pid, "run_with_timeout: deadline passed, killing");
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            // Let the wait thread reap the child
            let _ = rx.recv_timeout(Duration::from_secs(1));
            Err(UllError::Timeout(timeout))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(UllError::Load(format!("Subprocess wait channel closed unexpectedly (pid {})", pid)))
        }
    }
}

/// Terminate a child: SIGTERM, bounded grace period, then SIGKILL
pub fn terminate_child(child: &mut Child, grace: Duration) {
    let pid = child.id();
    debug!(pid, ?grace, "terminate_child: sending SIGTERM");
    let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);

    let deadline = std::time::Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(pid, ?status, "terminate_child: exited after SIGTERM");
                return;
            }
            Ok(None) => {
                if std::time::Instant::now() >= deadline {
                    break;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(_) => return,
        }
    }

    debug!(pid, "terminate_child: grace period expired, sending SIGKILL");
    let _ = child.kill();
    let _ = child.wait();
}
