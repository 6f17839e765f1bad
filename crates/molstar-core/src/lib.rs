//! Molstar Core - Typed call protocol for driving a Mol* viewer over HTTP.
//!
//! A client builds typed calls ([`api`]), wraps each in an [`Envelope`] and
//! posts it to a local relay, which hands it to the viewer page and returns
//! the viewer's reply. The crate also starts and stops the local server the
//! viewer is served from ([`process`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use molstar_core::{LaunchConfig, MolstarViewer, Supervisor, ViewerServer};
//!
//! #[tokio::main]
//! async fn main() -> molstar_core::Result<()> {
//!     let server = ViewerServer::new(
//!         LaunchConfig::new("molstar-rpc").with_port_change(true),
//!     )?;
//!     server.start_and_wait().await?;
//!
//!     let viewer = MolstarViewer::new(server.client()?);
//!     let ref_id = viewer.load_model(Some("m1"), std::fs::read_to_string("1yjp.pdb")?).await?;
//!     viewer.select("chain A and resi 1-5", true).await?;
//!     let atoms = viewer.poll_selection().await?;
//!     println!("{} has {} selected atoms", ref_id, atoms.len());
//!
//!     server.stop().await
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod process;
pub mod protocol;
pub mod viewer;

// Re-export commonly used types
pub use api::{ApiCall, Call, CallRegistry};
pub use client::{ViewerClient, ViewerClientBuilder};
pub use envelope::Envelope;
pub use error::{BridgeError, Result, ShapeViolation};
pub use process::{find_free_port, is_port_free, LaunchConfig, Supervisor, ViewerServer};
pub use protocol::{decode_response, unwrap_output, RunResponse, ViewerReply};
pub use viewer::MolstarViewer;
