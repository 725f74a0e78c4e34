use std::time::Duration;
use tokio::process::Child;

/// How a stop request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StopOutcome {
    /// Exited within the timeout after the termination request.
    Graceful,
    /// Did not exit in time and was killed.
    Killed,
    /// The process was already gone when the request arrived.
    AlreadyExited,
    /// Termination or kill failed; the handle is dropped regardless.
    Failed(String),
}

/// Ask the child to exit. SIGTERM on unix; other platforms have no graceful signal.
fn request_exit(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let Some(pid) = child.id() else {
            return Ok(());
        };
        let raw = i32::try_from(pid).map_err(|e| std::io::Error::other(e.to_string()))?;
        signal::kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(std::io::Error::from)
    }
    #[cfg(not(unix))]
    {
        child.start_kill()
    }
}

/// Terminate, wait up to `timeout`, then escalate to a kill.
pub(crate) async fn terminate(child: &mut Child, timeout: Duration) -> StopOutcome {
    if let Ok(Some(_)) = child.try_wait() {
        return StopOutcome::AlreadyExited;
    }

    if let Err(e) = request_exit(child) {
        tracing::warn!(pid = ?child.id(), "termination request failed: {e}");
    }

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(_)) => StopOutcome::Graceful,
        Ok(Err(e)) => match child.kill().await {
            Ok(()) => StopOutcome::Killed,
            Err(kill_err) => StopOutcome::Failed(format!("{e}; kill: {kill_err}")),
        },
        Err(_) => match child.kill().await {
            Ok(()) => StopOutcome::Killed,
            Err(e) => StopOutcome::Failed(e.to_string()),
        },
    }
}
