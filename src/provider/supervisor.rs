//! Supervisor for the worker process.
//!
//! Owns the current worker generation (process plus client endpoint) and
//! replaces it whenever it dies. All requests go through [`Supervisor::call`],
//! which holds the request lock until the matching
//! [`PendingCall::receive`], so responses can never be attributed to the
//! wrong request or the wrong generation.
//!
//! There is exactly one restart path, `Shared::ensure_live`. It is used by
//! `check`, by `call`, after a failed `receive`, and by the watchdog.

use super::proc::Proc;
use super::protocol::{Opcode, Request, Response};
use super::signals::TerminationReason;
use super::spawn::spawn_worker;
use super::watchdog::Watchdog;
use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{Id, WaitPidFlag, WaitStatus, waitid};
use nix::unistd::Pid;
use serde::Serialize;
use serde_json::Value;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Counters describing a supervisor's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderStats {
    /// Id of the most recently started generation (the first is 0).
    pub generation: u64,
    /// Generations started to replace a dead one.
    pub restarts: u64,
    /// Calls answered with a value or an application error.
    pub calls: u64,
    /// Calls that ended with a fatal error.
    pub fatals: u64,
    /// Pid of the live worker, if any.
    pub pid: Option<i32>,
}

/// One worker lifetime. Never reused once replaced.
struct Generation {
    id: u64,
    proc: Proc,
}

/// Guarded by the request lock.
struct Slot {
    current: Option<Generation>,
}

struct Shared {
    config: ProviderConfig,
    slot: Mutex<Slot>,
    stopped: AtomicBool,
    started: AtomicU64,
    restarts: AtomicU64,
    calls: AtomicU64,
    fatals: AtomicU64,
    /// Pid of the current generation, 0 when there is none. Readable without
    /// the request lock.
    current_pid: AtomicI32,
}

impl Shared {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_lock_slot(&self) -> Option<MutexGuard<'_, Slot>> {
        match self.slot.try_lock() {
            Ok(slot) => Some(slot),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn lock_slot_within(&self, within: Duration) -> Option<MutexGuard<'_, Slot>> {
        let deadline = Instant::now() + within;
        loop {
            if let Some(slot) = self.try_lock_slot() {
                return Some(slot);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Spawn a new generation into an empty slot.
    fn spawn_generation(&self, slot: &mut Slot) -> Result<()> {
        let proc = spawn_worker(&self.config)?;
        let id = self.started.fetch_add(1, Ordering::SeqCst);
        self.current_pid.store(proc.pid().as_raw(), Ordering::SeqCst);
        info!(generation = id, pid = proc.pid().as_raw(), "Worker generation started");
        slot.current = Some(Generation { id, proc });
        Ok(())
    }

    /// Make sure a live generation exists, replacing a dead one.
    ///
    /// Returns whether a live generation is in the slot afterwards. Never
    /// fails: a generation that cannot be started is logged and the slot is
    /// left empty for the next attempt.
    fn ensure_live(&self, slot: &mut Slot, caller: &str) -> bool {
        if self.is_stopped() {
            return false;
        }

        if let Some(current) = slot.current.as_mut() {
            if current.proc.is_running() {
                return true;
            }
            let reason = current
                .proc
                .try_wait()
                .ok()
                .flatten()
                .unwrap_or(TerminationReason::Unknown);
            warn!(
                generation = current.id,
                pid = current.proc.pid().as_raw(),
                reason = %reason,
                crash = reason.is_crash(),
                caller,
                "Worker died unexpectedly, restarting"
            );
        }

        slot.current = None;
        self.current_pid.store(0, Ordering::SeqCst);

        match self.spawn_generation(slot) {
            Ok(()) => {
                self.restarts.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(e) => {
                error!(error = %e, caller, "Failed to start worker generation");
                false
            }
        }
    }

    /// Tear down the current generation after a fatal call outcome and start
    /// its replacement. Returns how the old worker ended.
    fn retire(&self, slot: &mut Slot, context: &str) -> TerminationReason {
        self.fatals.fetch_add(1, Ordering::SeqCst);
        let reason = match slot.current.take() {
            Some(mut old) => {
                let reason = old.proc.kill().unwrap_or(TerminationReason::Unknown);
                debug!(
                    generation = old.id,
                    pid = old.proc.pid().as_raw(),
                    reason = %reason,
                    context,
                    "Worker generation retired"
                );
                reason
            }
            None => TerminationReason::Unknown,
        };
        self.current_pid.store(0, Ordering::SeqCst);
        self.ensure_live(slot, "retire");
        reason
    }

    /// One watchdog pass. Skipped while a call holds the request lock; that
    /// call's own receive notices a dead worker.
    fn watchdog_tick(&self) {
        if self.is_stopped() {
            return;
        }
        if let Some(mut slot) = self.try_lock_slot() {
            self.ensure_live(&mut slot, "watchdog");
        }
    }
}

/// Supervises one worker process at a time.
pub struct Supervisor {
    shared: Arc<Shared>,
    watchdog: Mutex<Option<Watchdog>>,
}

impl Supervisor {
    /// Start generation 0 and the watchdog.
    pub fn start(config: ProviderConfig) -> Result<Self> {
        let interval = config.watchdog_interval;
        let shared = Arc::new(Shared {
            config,
            slot: Mutex::new(Slot { current: None }),
            stopped: AtomicBool::new(false),
            started: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            fatals: AtomicU64::new(0),
            current_pid: AtomicI32::new(0),
        });

        shared.spawn_generation(&mut shared.lock_slot())?;

        let tick_shared = Arc::clone(&shared);
        let watchdog = Watchdog::spawn(interval, move || tick_shared.watchdog_tick())?;

        Ok(Self {
            shared,
            watchdog: Mutex::new(Some(watchdog)),
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.shared.config
    }

    /// Restart the worker if it died. No-op on a live generation and after
    /// [`stop`](Self::stop). Returns whether a live generation exists.
    pub fn check(&self) -> bool {
        self.shared.ensure_live(&mut self.shared.lock_slot(), "check")
    }

    /// Send a request, keeping the request lock until the returned
    /// [`PendingCall`] is received or dropped.
    pub fn call(&self, opcode: Opcode, args: Vec<Value>) -> Result<PendingCall<'_>> {
        if opcode == Opcode::Stop {
            return Err(ProviderError::Protocol(format!(
                "{} is reserved for shutdown",
                opcode
            )));
        }
        if self.shared.is_stopped() {
            return Err(ProviderError::Stopped);
        }

        let mut slot = self.shared.lock_slot();
        if !self.shared.ensure_live(&mut slot, "call") {
            return Err(if self.shared.is_stopped() {
                ProviderError::Stopped
            } else {
                ProviderError::Unavailable("no worker generation could be started".into())
            });
        }

        let request = Request::new(opcode, args);
        let sent = match slot.current.as_mut() {
            Some(current) => current.proc.send(&request).map(|()| current.id),
            None => Err(ProviderError::Unavailable("no worker generation".into())),
        };

        match sent {
            Ok(generation) => {
                trace!(opcode = %opcode, generation, "Request sent");
                Ok(PendingCall {
                    shared: &self.shared,
                    slot: Some(slot),
                    opcode,
                    generation,
                    sent_at: Instant::now(),
                })
            }
            Err(e) => {
                let context = format!("sending {}", opcode);
                let reason = self.shared.retire(&mut slot, &context);
                Err(ProviderError::fatal(context, format!("{} ({})", e, reason)))
            }
        }
    }

    /// Shut down: stop the watchdog, send STOP, terminate the worker if it
    /// does not exit in time and close the channel. Afterwards the
    /// supervisor is inert. Idempotent.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Stopping data provider");

        let watchdog = self
            .watchdog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut watchdog) = watchdog {
            watchdog.stop();
        }

        let grace = self.shared.config.stop_grace;
        let mut slot = match self.shared.lock_slot_within(grace) {
            Some(slot) => slot,
            None => {
                // A call is stuck on a hung worker; killing it makes the
                // caller's receive fail and release the lock.
                let pid = self.shared.current_pid.load(Ordering::SeqCst);
                if pid > 0 {
                    warn!(pid, "Call in flight at shutdown, killing worker");
                    let _ = signal::kill(Pid::from_raw(pid), Signal::SIGKILL);
                }
                self.shared.lock_slot()
            }
        };

        if let Some(mut current) = slot.current.take() {
            match current.proc.stop(grace) {
                Ok(reason) => debug!(generation = current.id, reason = %reason, "Worker stopped"),
                Err(e) => warn!(generation = current.id, error = %e, "Worker did not stop cleanly"),
            }
        }
        self.shared.current_pid.store(0, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Whether the current worker process is alive, computed now.
    pub fn is_alive(&self) -> bool {
        match self.shared.try_lock_slot() {
            Some(mut slot) => slot
                .current
                .as_mut()
                .is_some_and(|current| current.proc.is_running()),
            // A call is in flight; inspect the pid without reaping it, so an
            // exited but unreaped worker counts as dead.
            None => match self.shared.current_pid.load(Ordering::SeqCst) {
                0 => false,
                pid => matches!(
                    waitid(
                        Id::Pid(Pid::from_raw(pid)),
                        WaitPidFlag::WEXITED | WaitPidFlag::WNOHANG | WaitPidFlag::WNOWAIT,
                    ),
                    Ok(WaitStatus::StillAlive)
                ),
            },
        }
    }

    /// Whether the watchdog thread is running.
    pub fn watchdog_alive(&self) -> bool {
        self.watchdog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(Watchdog::is_running)
    }

    /// Pid of the current worker, if there is one.
    pub fn worker_pid(&self) -> Option<i32> {
        match self.shared.current_pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Id of the most recently started generation.
    pub fn generation(&self) -> u64 {
        self.shared.started.load(Ordering::SeqCst).saturating_sub(1)
    }

    pub fn stats(&self) -> ProviderStats {
        ProviderStats {
            generation: self.generation(),
            restarts: self.shared.restarts.load(Ordering::SeqCst),
            calls: self.shared.calls.load(Ordering::SeqCst),
            fatals: self.shared.fatals.load(Ordering::SeqCst),
            pid: self.worker_pid(),
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A request that has been sent and holds the request lock until its
/// response is consumed.
///
/// Dropping it without calling [`receive`](Self::receive) retires the
/// generation, since its unread response would otherwise be handed to the
/// next request.
pub struct PendingCall<'a> {
    shared: &'a Shared,
    slot: Option<MutexGuard<'a, Slot>>,
    opcode: Opcode,
    generation: u64,
    sent_at: Instant,
}

impl PendingCall<'_> {
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Read the response.
    ///
    /// An application error becomes [`ProviderError::Call`]. The fatal
    /// marker, end of stream, a broken channel, an unreadable response or an
    /// expired call timeout become [`ProviderError::Fatal`] carrying
    /// `context`; in those cases the generation has already been replaced
    /// when this returns.
    pub fn receive(mut self, context: &str) -> Result<Value> {
        let Some(mut slot) = self.slot.take() else {
            return Err(ProviderError::Protocol("response already received".into()));
        };

        let timeout = self.shared.config.call_timeout;
        let outcome = match slot.current.as_mut() {
            Some(current) if current.id == self.generation => current.proc.recv(timeout),
            _ => Ok(None),
        };

        trace!(
            opcode = %self.opcode,
            generation = self.generation,
            elapsed_ms = self.sent_at.elapsed().as_millis() as u64,
            "Response received"
        );

        let reason = match outcome {
            Ok(Some(Response::Value { value })) => {
                self.shared.calls.fetch_add(1, Ordering::SeqCst);
                return Ok(value);
            }
            Ok(Some(Response::Error { message })) => {
                self.shared.calls.fetch_add(1, Ordering::SeqCst);
                return Err(ProviderError::Call {
                    context: context.to_string(),
                    message,
                });
            }
            Ok(Some(Response::Fatal { message })) => message,
            Ok(None) => "worker closed the channel".to_string(),
            Err(ProviderError::Io(e)) if e.kind() == io::ErrorKind::TimedOut => match timeout {
                Some(limit) => format!("timed out after {:?}", limit),
                None => "timed out".to_string(),
            },
            Err(e) => e.to_string(),
        };

        let ended = self.shared.retire(&mut slot, context);
        warn!(
            opcode = %self.opcode,
            generation = self.generation,
            reason = %reason,
            worker = %ended,
            context,
            "Call failed fatally"
        );
        Err(ProviderError::fatal(context, format!("{} ({})", reason, ended)))
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if let Some(mut slot) = self.slot.take() {
            debug!(opcode = %self.opcode, "Pending call dropped unanswered");
            self.shared.retire(&mut slot, "abandoned call");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    /// `cat` reflects each request line back, which never parses as a
    /// response; good enough to exercise lifecycle without the real worker.
    fn cat_config() -> ProviderConfig {
        ProviderConfig {
            worker_exe: Some("sh".into()),
            worker_args: vec!["-c".into(), "exec cat".into()],
            watchdog_interval: Duration::from_millis(20),
            stop_grace: Duration::from_millis(200),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn test_start_and_stop() {
        let supervisor = Supervisor::start(cat_config()).unwrap();
        assert!(supervisor.is_alive());
        assert!(supervisor.watchdog_alive());
        assert_eq!(supervisor.generation(), 0);
        assert!(supervisor.worker_pid().is_some());

        supervisor.stop();
        assert!(!supervisor.is_alive());
        assert!(!supervisor.watchdog_alive());
        assert!(supervisor.worker_pid().is_none());
        assert!(!supervisor.check());
        assert!(matches!(
            supervisor.call(Opcode::Echo, vec![]),
            Err(ProviderError::Stopped)
        ));
    }

    #[test]
    fn test_check_keeps_live_generation() {
        let supervisor = Supervisor::start(cat_config()).unwrap();
        let pid = supervisor.worker_pid();
        assert!(supervisor.check());
        assert!(supervisor.check());
        assert_eq!(supervisor.worker_pid(), pid);
        assert_eq!(supervisor.stats().restarts, 0);
    }

    #[test]
    fn test_stop_is_reserved() {
        let supervisor = Supervisor::start(cat_config()).unwrap();
        assert!(matches!(
            supervisor.call(Opcode::Stop, vec![]),
            Err(ProviderError::Protocol(_))
        ));
    }

    #[test]
    fn test_unreadable_response_replaces_generation() {
        let supervisor = Supervisor::start(cat_config()).unwrap();
        let pid = supervisor.worker_pid();

        let err = supervisor
            .call(Opcode::Echo, vec![Value::from(1)])
            .unwrap()
            .receive("echo through cat")
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("echo through cat"));

        assert!(supervisor.is_alive());
        assert_ne!(supervisor.worker_pid(), pid);
        assert_eq!(supervisor.generation(), 1);
        assert_eq!(supervisor.stats().fatals, 1);
    }

    #[test]
    fn test_abandoned_call_replaces_generation() {
        let supervisor = Supervisor::start(cat_config()).unwrap();
        drop(supervisor.call(Opcode::Echo, vec![]).unwrap());
        assert_eq!(supervisor.generation(), 1);
        assert!(supervisor.is_alive());
    }

    #[test]
    fn test_missing_worker_fails_to_start() {
        let config = ProviderConfig::default().with_worker_exe("/nonexistent/geoprov");
        assert!(Supervisor::start(config).is_err());
    }

    fn wait_until(within: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    #[test]
    fn test_failed_respawn_is_not_a_restart() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join("worker.sh");
        let parked = dir.path().join("worker.sh.parked");
        fs::write(&exe, "#!/bin/sh\nexec cat\n").unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();

        let config = ProviderConfig {
            worker_exe: Some(exe.clone()),
            worker_args: vec![],
            watchdog_interval: Duration::from_secs(60),
            stop_grace: Duration::from_millis(200),
            ..ProviderConfig::default()
        };
        let supervisor = Supervisor::start(config).unwrap();
        let pid = supervisor.worker_pid().unwrap();

        fs::rename(&exe, &parked).unwrap();
        signal::kill(Pid::from_raw(pid), Signal::SIGKILL).unwrap();
        assert!(wait_until(Duration::from_secs(5), || !supervisor.check()));
        for _ in 0..5 {
            assert!(!supervisor.check());
        }
        assert_eq!(supervisor.stats().restarts, 0);
        assert_eq!(supervisor.worker_pid(), None);

        fs::rename(&parked, &exe).unwrap();
        assert!(supervisor.check());
        let stats = supervisor.stats();
        assert_eq!(stats.restarts, 1);
        assert_eq!(stats.generation, 1);
        assert!(stats.pid.is_some_and(|new| new != pid));
    }

    #[test]
    fn test_is_alive_during_call_sees_exited_worker() {
        let supervisor = Supervisor::start(cat_config()).unwrap();
        let pid = supervisor.worker_pid().unwrap();

        // Hold the request lock like an in-flight call; nothing reaps the worker.
        let slot = supervisor.shared.lock_slot();
        assert!(supervisor.is_alive());

        signal::kill(Pid::from_raw(pid), Signal::SIGKILL).unwrap();
        assert!(wait_until(Duration::from_secs(5), || !supervisor.is_alive()));
        drop(slot);

        assert!(supervisor.check());
        assert_ne!(supervisor.worker_pid(), Some(pid));
    }
}
