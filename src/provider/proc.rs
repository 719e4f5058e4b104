//! Process handle for worker subprocesses.
//!
//! Wraps a child process together with the client endpoint of its channel.

use super::ipc::{LineReader, LineWriter, PipeFd};
use super::protocol::{Request, Response};
use super::signals::{TerminationReason, analyze_wait_status};
use crate::error::{ProviderError, Result};
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::io;
use std::os::unix::io::OwnedFd;
use std::time::{Duration, Instant};

/// Handle to a worker subprocess with its IPC channel.
pub struct Proc {
    pid: Pid,
    /// Writer for sending requests to the worker
    writer: LineWriter,
    /// Reader for receiving responses from the worker
    reader: LineReader,
    /// Exit status, once the process has been reaped
    exit: Option<TerminationReason>,
}

impl Proc {
    pub fn new(pid: Pid, stdin: PipeFd, stdout: PipeFd) -> Self {
        Self {
            pid,
            writer: LineWriter::new(stdin),
            reader: LineReader::new(stdout),
            exit: None,
        }
    }

    /// Create from a spawned `std::process::Child`.
    ///
    /// Takes ownership of the child's stdin and stdout.
    pub fn from_child(mut child: std::process::Child) -> Result<Self> {
        let pid = Pid::from_raw(child.id() as i32);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProviderError::Worker("Child stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::Worker("Child stdout not captured".into()))?;

        Ok(Self::new(
            pid,
            PipeFd::new(OwnedFd::from(stdin)),
            PipeFd::new(OwnedFd::from(stdout)),
        ))
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Send a request to the worker.
    pub fn send(&mut self, request: &Request) -> Result<()> {
        let line = request.to_line()?;
        self.writer
            .write_line(&line)
            .map_err(|e| ProviderError::Worker(format!("Failed to send to worker: {}", e)))
    }

    /// Receive a response from the worker.
    ///
    /// Returns `None` if the worker closed its end of the channel (EOF), and
    /// an `Io` error of kind `TimedOut` if `timeout` passes without data.
    pub fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<Response>> {
        match self.reader.read_line_timeout(timeout) {
            Ok(Some(line)) => {
                let response = Response::from_line(line).map_err(|e| {
                    ProviderError::Protocol(format!("Invalid worker response: {}", e))
                })?;
                Ok(Some(response))
            }
            Ok(None) => Ok(None),
            // Kept as an IO error so callers can tell a hung worker apart.
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(ProviderError::Io(e)),
            Err(e) => Err(ProviderError::Worker(format!(
                "Failed to receive from worker: {}",
                e
            ))),
        }
    }

    /// Check if the process is still running (non-blocking).
    pub fn is_running(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    /// Try to reap the process without blocking.
    ///
    /// Returns `None` while it is still running. Once reaped, the same reason
    /// is returned on every later call.
    pub fn try_wait(&mut self) -> Result<Option<TerminationReason>> {
        if let Some(reason) = &self.exit {
            return Ok(Some(reason.clone()));
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => Ok(None),
            Ok(status) => Ok(Some(self.record_exit(analyze_wait_status(status)))),
            // ECHILD: somebody else reaped it; either way it is gone.
            Err(e) => {
                self.record_exit(TerminationReason::Unknown);
                Err(ProviderError::Worker(format!("waitpid failed: {}", e)))
            }
        }
    }

    /// Wait for the process to exit (blocking).
    pub fn wait(&mut self) -> Result<TerminationReason> {
        if let Some(reason) = &self.exit {
            return Ok(reason.clone());
        }
        match waitpid(self.pid, None) {
            Ok(status) => Ok(self.record_exit(analyze_wait_status(status))),
            Err(e) => {
                self.record_exit(TerminationReason::Unknown);
                Err(ProviderError::Worker(format!("waitpid failed: {}", e)))
            }
        }
    }

    fn record_exit(&mut self, reason: TerminationReason) -> TerminationReason {
        self.exit = Some(reason.clone());
        reason
    }

    /// Send SIGTERM to the process.
    pub fn terminate(&self) -> Result<()> {
        if self.exit.is_some() {
            return Ok(());
        }
        signal::kill(self.pid, Signal::SIGTERM)
            .map_err(|e| ProviderError::Worker(format!("Failed to send SIGTERM: {}", e)))
    }

    /// Send SIGKILL to the process and wait for it to exit.
    pub fn kill(&mut self) -> Result<TerminationReason> {
        if let Some(reason) = &self.exit {
            return Ok(reason.clone());
        }
        signal::kill(self.pid, Signal::SIGKILL)
            .map_err(|e| ProviderError::Worker(format!("Failed to send SIGKILL: {}", e)))?;
        self.wait()
    }

    /// Gracefully stop the worker: send STOP, wait up to `grace`, then escalate
    /// to SIGTERM and finally SIGKILL.
    pub fn stop(&mut self, grace: Duration) -> Result<TerminationReason> {
        if let Some(reason) = &self.exit {
            return Ok(reason.clone());
        }

        // The worker may already be gone; a broken pipe here is expected.
        let _ = self.send(&Request::stop());

        if let Some(reason) = self.poll_exit(grace) {
            return Ok(reason);
        }

        let _ = self.terminate();
        if let Some(reason) = self.poll_exit(Duration::from_millis(100)) {
            return Ok(reason);
        }

        self.kill()
    }

    fn poll_exit(&mut self, within: Duration) -> Option<TerminationReason> {
        let start = Instant::now();
        loop {
            match self.try_wait() {
                Ok(Some(reason)) => return Some(reason),
                Err(_) => return self.exit.clone(),
                Ok(None) if start.elapsed() >= within => return None,
                Ok(None) => std::thread::sleep(Duration::from_millis(10)),
            }
        }
    }
}

impl Drop for Proc {
    fn drop(&mut self) {
        if self.exit.is_none() {
            let _ = signal::kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
        }
    }
}
