//! Provider configuration.
//!
//! Defaults suit an interactive session; every field can be overridden from
//! the environment (`GEOPROV_*`) or, in the binary, from CLI flags.

use crate::paths;
use std::path::PathBuf;
use std::time::Duration;

/// Default interval between watchdog liveness checks.
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_millis(200);

/// Default time a worker gets to honour STOP before it is signalled.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

/// Configuration for a data provider and the workers it spawns.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Executable started as the worker (None = the current executable).
    pub worker_exe: Option<PathBuf>,
    /// Arguments that put the executable into worker mode.
    pub worker_args: Vec<String>,
    /// Root of the map store served by the worker.
    pub data_dir: PathBuf,
    /// How often the watchdog checks worker liveness.
    pub watchdog_interval: Duration,
    /// Upper bound on waiting for a single response (None = wait for the
    /// worker to answer or die).
    pub call_timeout: Option<Duration>,
    /// Grace period for STOP before escalating to signals.
    pub stop_grace: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            worker_exe: None,
            worker_args: vec!["worker".to_string()],
            data_dir: paths::get_data_dir(),
            watchdog_interval: DEFAULT_WATCHDOG_INTERVAL,
            call_timeout: None,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

impl ProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific worker executable.
    pub fn with_worker_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.worker_exe = Some(exe.into());
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = interval;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Apply environment variable overrides.
    ///
    /// Reads `GEOPROV_WORKER_EXE`, `GEOPROV_DATA_DIR`, `GEOPROV_WATCHDOG_MS`
    /// and `GEOPROV_CALL_TIMEOUT_MS` (0 disables the timeout). Unparseable
    /// values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(exe) = std::env::var("GEOPROV_WORKER_EXE") {
            self.worker_exe = Some(PathBuf::from(exe));
        }

        if let Ok(dir) = std::env::var("GEOPROV_DATA_DIR") {
            self.data_dir = paths::expand_tilde(&dir);
        }

        if let Some(ms) = env_millis("GEOPROV_WATCHDOG_MS")
            && ms > 0
        {
            self.watchdog_interval = Duration::from_millis(ms);
        }

        if let Some(ms) = env_millis("GEOPROV_CALL_TIMEOUT_MS") {
            self.call_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        self
    }

    /// Resolve the worker executable.
    pub fn resolve_worker_exe(&self) -> std::io::Result<PathBuf> {
        match &self.worker_exe {
            Some(exe) => Ok(exe.clone()),
            None => std::env::current_exe(),
        }
    }
}

fn env_millis(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_config_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.watchdog_interval, Duration::from_millis(200));
        assert_eq!(config.worker_args, vec!["worker"]);
        assert!(config.call_timeout.is_none());
        assert!(config.worker_exe.is_none());
    }

    #[test]
    fn test_provider_config_builder() {
        let config = ProviderConfig::new()
            .with_worker_exe("/usr/bin/geoprov")
            .with_data_dir("/tmp/maps")
            .with_watchdog_interval(Duration::from_millis(50))
            .with_call_timeout(Some(Duration::from_secs(3)))
            .with_stop_grace(Duration::from_millis(500));

        assert_eq!(config.worker_exe, Some(PathBuf::from("/usr/bin/geoprov")));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/maps"));
        assert_eq!(config.watchdog_interval, Duration::from_millis(50));
        assert_eq!(config.call_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.stop_grace, Duration::from_millis(500));
    }

    #[test]
    fn test_resolve_worker_exe_defaults_to_current() {
        let config = ProviderConfig::default();
        assert_eq!(
            config.resolve_worker_exe().unwrap(),
            std::env::current_exe().unwrap()
        );
    }
}
