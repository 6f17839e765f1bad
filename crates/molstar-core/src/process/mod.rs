//! Viewer server process management.
//!
//! The viewer page is served by a local HTTP process. This module starts it,
//! waits until it answers the readiness probe and stops it again.

mod launcher;
mod port;
mod terminate;

pub use launcher::{LaunchConfig, ViewerServer};
pub use port::{find_free_port, is_port_free};
pub use terminate::terminate_child;

use crate::error::Result;
use async_trait::async_trait;
use url::Url;

/// Lifecycle of a local server the client talks to.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Spawn the process. Does nothing if it is already running.
    async fn start(&self) -> Result<()>;

    /// Terminate the process. Does nothing if it is not running.
    async fn stop(&self) -> Result<()>;

    /// URL the server answers on once ready.
    fn base_url(&self) -> &Url;

    async fn is_running(&self) -> bool;

    /// Poll the readiness probe until it answers or the configured timeout
    /// elapses.
    async fn wait_until_ready(&self) -> Result<()>;

    /// Start and wait for readiness.
    async fn start_and_wait(&self) -> Result<()> {
        self.start().await?;
        self.wait_until_ready().await
    }
}
