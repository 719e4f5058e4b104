//! Worker process spawning.
//!
//! Uses `posix_spawn` via `std::process::Command`. The worker is the same
//! executable (or a configured one) started in worker mode, with the channel
//! carried on its stdin/stdout.

use super::proc::Proc;
use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use std::process::{Command, Stdio};

/// Spawn a new worker generation.
///
/// Returns a `Proc` holding the child and the client endpoint of a fresh
/// channel. Nothing from previous generations is reused.
pub fn spawn_worker(config: &ProviderConfig) -> Result<Proc> {
    let exe_path = config
        .resolve_worker_exe()
        .map_err(|e| ProviderError::Worker(format!("Failed to get worker executable: {}", e)))?;

    let mut cmd = Command::new(&exe_path);
    cmd.args(&config.worker_args);
    cmd.arg("--data-dir");
    cmd.arg(&config.data_dir);

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit()); // Worker logs go to parent's stderr

    let child = cmd.spawn().map_err(|e| {
        ProviderError::Worker(format!(
            "Failed to spawn worker {}: {}",
            exe_path.display(),
            e
        ))
    })?;

    tracing::debug!(pid = child.id(), exe = %exe_path.display(), "Spawned worker process");

    Proc::from_child(child)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_missing_executable_fails() {
        let config = ProviderConfig::default().with_worker_exe("/nonexistent/geoprov-worker");
        let err = spawn_worker(&config).err().expect("spawn should fail");
        assert!(err.to_string().contains("/nonexistent/geoprov-worker"));
    }

    #[test]
    fn test_spawn_passes_data_dir() {
        // `sh -c 'echo "$2"' sh --data-dir <dir>` prints the data dir back.
        let config = ProviderConfig {
            worker_exe: Some("sh".into()),
            worker_args: vec!["-c".into(), "echo \"$2\"".into(), "sh".into()],
            ..ProviderConfig::default().with_data_dir("/srv/maps")
        };
        let mut proc = spawn_worker(&config).expect("spawn sh");
        // The echoed path is not a protocol message.
        assert!(proc.recv(Some(std::time::Duration::from_secs(5))).is_err());
        let _ = proc.wait();
    }
}
