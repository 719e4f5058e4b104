//! Crash analysis for worker processes.
//!
//! Turns wait statuses into a termination reason so restarts can be logged
//! with what actually happened to the previous generation.

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;

/// Reason why a worker process terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// SIGABRT, raised by the native fatal error handler.
    NativeAbort,
    /// SIGKILL, either from us, an operator, or the OOM killer.
    Killed,
    /// SIGSEGV or SIGBUS inside native code.
    MemoryFault(Signal),
    /// Any other signal.
    Signaled(Signal),
    /// Process is still running.
    StillAlive,
    /// The status was already collected or could not be read.
    Unknown,
}

impl TerminationReason {
    /// Whether the worker went away because of a crash rather than a clean exit.
    pub fn is_crash(&self) -> bool {
        matches!(
            self,
            Self::NativeAbort | Self::Killed | Self::MemoryFault(_) | Self::Signaled(_)
        ) || matches!(self, Self::Exited(code) if *code != 0)
    }

    pub fn description(&self) -> String {
        match self {
            Self::Exited(code) => format!("exited with code {}", code),
            Self::NativeAbort => "aborted by native fatal error (SIGABRT)".to_string(),
            Self::Killed => "killed (SIGKILL)".to_string(),
            Self::MemoryFault(sig) => format!("memory fault ({:?})", sig),
            Self::Signaled(sig) => format!("killed by signal {:?}", sig),
            Self::StillAlive => "still running".to_string(),
            Self::Unknown => "unknown reason".to_string(),
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Analyze a `WaitStatus` to determine the termination reason.
pub fn analyze_wait_status(status: WaitStatus) -> TerminationReason {
    match status {
        WaitStatus::Exited(_, code) => TerminationReason::Exited(code),
        WaitStatus::Signaled(_, signal, _) => match signal {
            Signal::SIGABRT => TerminationReason::NativeAbort,
            Signal::SIGKILL => TerminationReason::Killed,
            Signal::SIGSEGV | Signal::SIGBUS => TerminationReason::MemoryFault(signal),
            _ => TerminationReason::Signaled(signal),
        },
        WaitStatus::StillAlive => TerminationReason::StillAlive,
        _ => TerminationReason::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Pid;

    #[test]
    fn test_analyze_wait_status() {
        let pid = Pid::from_raw(1);

        let status = WaitStatus::Exited(pid, 0);
        assert_eq!(analyze_wait_status(status), TerminationReason::Exited(0));

        let status = WaitStatus::Signaled(pid, Signal::SIGABRT, true);
        assert_eq!(analyze_wait_status(status), TerminationReason::NativeAbort);

        let status = WaitStatus::Signaled(pid, Signal::SIGKILL, false);
        assert_eq!(analyze_wait_status(status), TerminationReason::Killed);

        let status = WaitStatus::Signaled(pid, Signal::SIGSEGV, true);
        assert_eq!(
            analyze_wait_status(status),
            TerminationReason::MemoryFault(Signal::SIGSEGV)
        );

        assert_eq!(
            analyze_wait_status(WaitStatus::StillAlive),
            TerminationReason::StillAlive
        );
    }

    #[test]
    fn test_is_crash() {
        assert!(TerminationReason::NativeAbort.is_crash());
        assert!(TerminationReason::Killed.is_crash());
        assert!(TerminationReason::Exited(1).is_crash());
        assert!(TerminationReason::Signaled(Signal::SIGTERM).is_crash());

        assert!(!TerminationReason::Exited(0).is_crash());
        assert!(!TerminationReason::StillAlive.is_crash());
        assert!(!TerminationReason::Unknown.is_crash());
    }

    #[test]
    fn test_description() {
        assert!(TerminationReason::NativeAbort.to_string().contains("SIGABRT"));
        assert_eq!(TerminationReason::Exited(3).to_string(), "exited with code 3");
    }
}
