//! Liveness watchdog for the worker generation.
//!
//! A background thread that runs a tick function at a fixed interval until
//! told to stop. The supervisor's tick performs the same liveness check and
//! restart that callers go through, so a worker that dies between calls is
//! replaced before the next call arrives.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Stop flag plus the condition variable the loop sleeps on.
type Control = Arc<(Mutex<bool>, Condvar)>;

/// Periodic tick thread.
pub struct Watchdog {
    control: Control,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Start the thread. `tick` runs once per `interval` until [`stop`](Self::stop).
    pub fn spawn<F>(interval: Duration, tick: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let control: Control = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_control = Arc::clone(&control);

        let thread = thread::Builder::new()
            .name("provider-watchdog".to_string())
            .spawn(move || watchdog_loop(thread_control, interval, tick))?;

        Ok(Self {
            control,
            thread: Some(thread),
        })
    }

    /// Whether the thread is still looping.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the thread and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        let (lock, cvar) = &*self.control;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();

        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!("Watchdog thread panicked");
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watchdog_loop<F: FnMut()>(control: Control, interval: Duration, mut tick: F) {
    tracing::debug!(interval_ms = interval.as_millis() as u64, "Watchdog thread started");
    let (lock, cvar) = &*control;

    loop {
        let stopped = lock.lock().unwrap_or_else(PoisonError::into_inner);
        if *stopped {
            break;
        }
        let (stopped, _) = cvar
            .wait_timeout(stopped, interval)
            .unwrap_or_else(PoisonError::into_inner);
        if *stopped {
            break;
        }
        drop(stopped);

        tick();
    }

    tracing::debug!("Watchdog thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_watchdog_ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut watchdog = Watchdog::spawn(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert!(watchdog.is_running());

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(ticks.load(Ordering::SeqCst) >= 3);

        watchdog.stop();
        assert!(!watchdog.is_running());
        let after_stop = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_stop_does_not_wait_for_interval() {
        let mut watchdog = Watchdog::spawn(Duration::from_secs(60), || {}).unwrap();
        let start = Instant::now();
        watchdog.stop();
        assert!(start.elapsed() < Duration::from_secs(5));
        // Second stop is a no-op.
        watchdog.stop();
    }
}
