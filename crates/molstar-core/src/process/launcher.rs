//! Launching and supervising the local viewer server.

use super::port::{find_free_port, is_port_free};
use super::terminate::terminate_child;
use super::Supervisor;
use crate::client::{probe_url, ViewerClient};
use crate::config::ServerConfig;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Span};
use url::Url;

/// Configuration for launching the viewer server.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments placed before the `--port` flag.
    pub args: Vec<String>,
    pub host: String,
    /// Preferred port, passed to the process as `--port N`.
    pub port: u16,
    /// Use any free port if the preferred one is taken.
    pub allow_port_change: bool,
    pub env_vars: HashMap<String, String>,
    pub current_dir: Option<PathBuf>,
    /// Where stdout and stderr go. Discarded when unset.
    pub log_file: Option<PathBuf>,
    pub ready_timeout: Duration,
    pub ready_interval: Duration,
    /// Grace period between terminate and kill.
    pub stop_timeout: Duration,
}

impl LaunchConfig {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            host: ServerConfig::DEFAULT_HOST.to_string(),
            port: ServerConfig::DEFAULT_PORT,
            allow_port_change: false,
            env_vars: HashMap::new(),
            current_dir: None,
            log_file: None,
            ready_timeout: ServerConfig::READY_TIMEOUT,
            ready_interval: ServerConfig::READY_POLL_INTERVAL,
            stop_timeout: ServerConfig::STOP_TIMEOUT,
        }
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_port_change(mut self, allow: bool) -> Self {
        self.allow_port_change = allow;
        self
    }

    /// Set an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set the log file path.
    pub fn with_log_file(mut self, path: impl AsRef<Path>) -> Self {
        self.log_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the ready timeout.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_ready_interval(mut self, interval: Duration) -> Self {
        self.ready_interval = interval;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

/// A viewer server process managed by this crate.
///
/// The port is fixed when the server is created, so [`base_url`] is known
/// before the process starts.
///
/// [`base_url`]: Supervisor::base_url
#[derive(Debug)]
pub struct ViewerServer {
    config: LaunchConfig,
    port: u16,
    base_url: Url,
    http: reqwest::Client,
    child: Mutex<Option<Child>>,
    span: Span,
}

impl ViewerServer {
    pub fn new(config: LaunchConfig) -> Result<Self> {
        let port = if config.allow_port_change && !is_port_free(&config.host, config.port) {
            let port = find_free_port()?;
            info!("Port {} is taken, using {}", config.port, port);
            port
        } else {
            config.port
        };

        let base_url = Url::parse(&format!("http://{}:{}/", config.host, port)).map_err(|e| {
            BridgeError::Config {
                message: format!("Invalid server address {}:{}: {}", config.host, port, e),
            }
        })?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BridgeError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        let span = info_span!("viewer_server", url = %base_url);

        Ok(Self {
            config,
            port,
            base_url,
            http,
            child: Mutex::new(None),
            span,
        })
    }

    /// Replace the span the server logs under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Full argument list, including the port flag.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.push("--port".to_string());
        args.push(self.port.to_string());
        args
    }

    /// PID of the running process.
    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(Child::id)
    }

    /// A client for this server, logging under the server's span.
    pub fn client(&self) -> Result<ViewerClient> {
        ViewerClient::builder(self.base_url.as_str())
            .span(self.span.clone())
            .build()
    }

    fn program_name(&self) -> String {
        self.config.program.display().to_string()
    }

    fn build_command(&self) -> Result<Command> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.command_args());
        cmd.envs(&self.config.env_vars);
        if let Some(ref dir) = self.config.current_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);

        if let Some(ref log_file) = self.config.log_file {
            if let Some(parent) = log_file.parent() {
                fs::create_dir_all(parent).map_err(|e| BridgeError::io_with_path(e, parent))?;
            }
            let file =
                fs::File::create(log_file).map_err(|e| BridgeError::io_with_path(e, log_file))?;
            let stdout_file = file
                .try_clone()
                .map_err(|e| BridgeError::io_with_path(e, log_file))?;
            cmd.stdout(Stdio::from(stdout_file));
            cmd.stderr(Stdio::from(file));
        } else {
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }
        Ok(cmd)
    }
}

#[async_trait]
impl Supervisor for ViewerServer {
    async fn start(&self) -> Result<()> {
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            if child.try_wait()?.is_none() {
                info!(parent: &self.span, "Viewer server is already running");
                return Ok(());
            }
        }

        let mut cmd = self.build_command()?;
        info!(
            parent: &self.span,
            "Starting viewer server: {} {}",
            self.program_name(),
            self.command_args().join(" ")
        );
        let child = cmd.spawn().map_err(|e| BridgeError::LaunchFailed {
            program: self.program_name(),
            message: e.to_string(),
        })?;
        info!(parent: &self.span, "Launched process with PID {:?}", child.id());
        *guard = Some(child);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let child = self.child.lock().await.take();
        match child {
            Some(mut child) => {
                info!(parent: &self.span, "Stopping viewer server");
                terminate_child(&mut child, self.config.stop_timeout).await
            }
            None => {
                debug!(parent: &self.span, "Viewer server is not running");
                Ok(())
            }
        }
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn is_running(&self) -> bool {
        match self.child.lock().await.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn wait_until_ready(&self) -> Result<()> {
        let started = Instant::now();
        info!(parent: &self.span, "Waiting for {} to become ready", self.base_url);

        loop {
            if let Some(child) = self.child.lock().await.as_mut() {
                if let Some(status) = child.try_wait()? {
                    return Err(BridgeError::LaunchFailed {
                        program: self.program_name(),
                        message: format!("exited before becoming ready ({})", status),
                    });
                }
            }

            if probe_url(&self.http, &self.base_url).await? {
                info!(parent: &self.span, "Viewer server ready after {:?}", started.elapsed());
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= self.config.ready_timeout {
                warn!(parent: &self.span, "Viewer server not ready after {:?}", waited);
                return Err(BridgeError::ReadinessTimeout {
                    url: self.base_url.to_string(),
                    waited,
                });
            }
            tokio::time::sleep(self.config.ready_interval).await;
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell(script: &str) -> LaunchConfig {
        LaunchConfig::new("sh")
            .with_args(["-c", script])
            .with_host("127.0.0.1")
            .with_port(find_free_port().unwrap())
    }

    async fn wait_for_exit(server: &ViewerServer) {
        for _ in 0..50 {
            if !server.is_running().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("process did not exit");
    }

    #[test]
    fn test_port_flag_is_appended() {
        let server = ViewerServer::new(
            LaunchConfig::new("node")
                .with_arg("server.js")
                .with_host("127.0.0.1")
                .with_port(5123),
        )
        .unwrap();
        assert_eq!(server.command_args(), vec!["server.js", "--port", "5123"]);
        assert_eq!(server.base_url().as_str(), "http://127.0.0.1:5123/");
    }

    #[test]
    fn test_taken_port_changes_only_when_allowed() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let taken = listener.local_addr().unwrap().port();
        let config = LaunchConfig::new("node").with_host("127.0.0.1").with_port(taken);

        let fixed = ViewerServer::new(config.clone()).unwrap();
        assert_eq!(fixed.port(), taken);

        let moved = ViewerServer::new(config.with_port_change(true)).unwrap();
        assert_ne!(moved.port(), taken);
    }

    #[tokio::test]
    async fn test_start_writes_log_and_env() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("logs").join("server.log");
        let server = ViewerServer::new(
            shell("echo \"hello $MOLSTAR_GREETING $1 $2\"")
                .with_env("MOLSTAR_GREETING", "viewer")
                .with_log_file(&log),
        )
        .unwrap();

        server.start().await.unwrap();
        wait_for_exit(&server).await;

        let text = fs::read_to_string(&log).unwrap();
        assert!(text.contains("hello viewer"), "log was: {}", text);
        assert!(text.contains(&server.port().to_string()), "log was: {}", text);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_terminates() {
        let server = ViewerServer::new(shell("sleep 30")).unwrap();
        server.start().await.unwrap();
        let pid = server.pid().await;
        assert!(pid.is_some());

        server.start().await.unwrap();
        assert_eq!(server.pid().await, pid);
        assert!(server.is_running().await);

        server.stop().await.unwrap();
        assert!(!server.is_running().await);
        // Second stop is a no-op.
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_readiness_timeout_names_url_and_wait() {
        let server = ViewerServer::new(
            shell("sleep 30")
                .with_ready_timeout(Duration::from_millis(400))
                .with_ready_interval(Duration::from_millis(100)),
        )
        .unwrap();
        server.start().await.unwrap();

        let err = server.wait_until_ready().await.unwrap_err();
        server.stop().await.unwrap();

        match err {
            BridgeError::ReadinessTimeout { url, waited } => {
                assert_eq!(url, server.base_url().to_string());
                assert!(waited >= Duration::from_millis(400));
            }
            other => panic!("Expected ReadinessTimeout, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_early_exit_fails_fast() {
        let server = ViewerServer::new(
            shell("exit 3").with_ready_timeout(Duration::from_secs(30)),
        )
        .unwrap();
        server.start().await.unwrap();

        let started = Instant::now();
        let err = server.wait_until_ready().await.unwrap_err();
        assert!(matches!(err, BridgeError::LaunchFailed { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_unusable_log_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let server =
            ViewerServer::new(shell("sleep 30").with_log_file(blocker.join("server.log"))).unwrap();

        match server.start().await {
            Err(BridgeError::Io { path, .. }) => assert_eq!(path, Some(blocker)),
            other => panic!("Expected Io error, got: {:?}", other),
        }
        assert!(server.pid().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_failure() {
        let server = ViewerServer::new(LaunchConfig::new("/nonexistent/molstar-server")).unwrap();
        assert!(matches!(
            server.start().await,
            Err(BridgeError::LaunchFailed { .. })
        ));
    }
}
