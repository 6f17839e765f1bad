//! Local port helpers.

use crate::error::{BridgeError, Result};
use std::net::TcpListener;

/// Whether `port` can currently be bound on `host`.
pub fn is_port_free(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}

/// Ask the OS for an unused port.
///
/// The port is released before returning, so another process may still take
/// it before the caller binds.
pub fn find_free_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).map_err(|e| BridgeError::Io {
        message: format!("bind ephemeral port: {}", e),
        path: None,
        source: Some(e),
    })?;
    Ok(listener.local_addr()?.port())
}
