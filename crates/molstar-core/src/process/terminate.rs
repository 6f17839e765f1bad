//! Stopping a spawned server process.

use crate::error::Result;
use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, warn};

/// Stop `child`, first politely and then by force.
///
/// On Unix the process gets SIGTERM and `grace` to exit before SIGKILL.
/// Elsewhere it is killed straight away. Returns once the child is reaped.
pub async fn terminate_child(child: &mut Child, grace: Duration) -> Result<()> {
    if child.try_wait()?.is_some() {
        debug!("Process already exited");
        return Ok(());
    }

    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            if send_sigterm(pid) {
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(status) => {
                        debug!("Process {} terminated gracefully: {:?}", pid, status?);
                        return Ok(());
                    }
                    Err(_) => debug!("Process {} still running, sending SIGKILL", pid),
                }
            }
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill().await {
        // Exited between the checks above and the kill.
        if child.try_wait()?.is_none() {
            return Err(e.into());
        }
        warn!("Kill failed after process exited: {}", e);
    }
    Ok(())
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    debug!("Sending SIGTERM to process {}", pid);
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(e) => {
            warn!("Failed to send SIGTERM to {}: {}", pid, e);
            false
        }
    }
}
