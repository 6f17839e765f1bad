//! Centralized configuration for the Molstar bridge.
//!
//! Constants for the wire protocol, the client, the viewer server process and
//! the relay.

use std::time::Duration;

/// Wire protocol constants shared by the client and the relay.
pub struct ProtocolConfig;

impl ProtocolConfig {
    /// Protocol version sent with every call. Version 1 reads the viewer reply
    /// from `responses[0].data.output` only.
    pub const VERSION: u32 = 1;
    /// Lowercase so it can be used as a static header name.
    pub const VERSION_HEADER: &'static str = "x-molstar-protocol";
    /// Canonical call endpoint.
    pub const RUN_PATH: &'static str = "/run";
    /// Endpoint name used by older relay builds.
    pub const LEGACY_RUN_PATH: &'static str = "/api-request";
    pub const ACTION_PATH: &'static str = "/action";
    pub const EVENTS_PATH: &'static str = "/events";
    pub const WS_PATH: &'static str = "/ws";
    pub const HEALTH_PATH: &'static str = "/health";
}

/// Client defaults.
pub struct ClientConfig;

impl ClientConfig {
    /// Upper bound for one call round trip, including the viewer's work.
    pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
    pub const USER_AGENT: &'static str = "molstar-core/0.1";
}

/// Viewer server process defaults.
pub struct ServerConfig;

impl ServerConfig {
    pub const DEFAULT_HOST: &'static str = "localhost";
    pub const DEFAULT_PORT: u16 = 5000;
    pub const READY_TIMEOUT: Duration = Duration::from_secs(60);
    pub const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);
    /// Grace period between terminate and kill when stopping.
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);
}

/// Relay server defaults.
pub struct RelayConfig;

impl RelayConfig {
    /// How long the relay waits for all connected viewers to answer.
    pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
    /// Request bodies carry whole PDB files.
    pub const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;
    pub const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);
    pub const BROADCAST_CAPACITY: usize = 64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(ClientConfig::CALL_TIMEOUT > RelayConfig::RESPONSE_TIMEOUT);
        assert!(ServerConfig::READY_TIMEOUT > ServerConfig::READY_POLL_INTERVAL);
        assert!(ClientConfig::CONNECT_TIMEOUT > Duration::ZERO);
    }

    #[test]
    fn test_paths_are_absolute() {
        for path in [
            ProtocolConfig::RUN_PATH,
            ProtocolConfig::LEGACY_RUN_PATH,
            ProtocolConfig::ACTION_PATH,
            ProtocolConfig::EVENTS_PATH,
            ProtocolConfig::WS_PATH,
            ProtocolConfig::HEALTH_PATH,
        ] {
            assert!(path.starts_with('/'));
        }
    }
}
