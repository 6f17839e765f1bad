//! High-level viewer operations.
//!
//! Each method builds one call, sends it through [`ViewerClient`] and pulls
//! the interesting fields out of the reply. Errors from the client are
//! returned as-is.

use crate::api::{
    AddRepresentation, AtomRecord, ClearViewer, Focus, Granularity, LoadModel, MakeSelection,
    MolstarState, RawJs, RawJsAsync, RepresentationKind, ResetView, SelectionPoll, SetColor,
    SetPickingGranularity, ToggleSelectionMode,
};
use crate::client::ViewerClient;
use crate::error::Result;
use std::sync::Arc;

/// Name the viewer page exposes its plugin object under.
const PLUGIN_PREFIX: &str = "viewer";

/// Convenience wrapper over a shared [`ViewerClient`].
#[derive(Debug, Clone)]
pub struct MolstarViewer {
    client: Arc<ViewerClient>,
}

impl MolstarViewer {
    pub fn new(client: ViewerClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn from_shared(client: Arc<ViewerClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ViewerClient {
        &self.client
    }

    /// Run a script in the viewer page and return what it produced.
    pub async fn run_js(&self, js: impl Into<String>) -> Result<Option<String>> {
        Ok(self.client.send(RawJs::new(js)).await?.result)
    }

    /// Like [`run_js`](Self::run_js), awaiting the script.
    pub async fn run_js_async(&self, js: impl Into<String>) -> Result<Option<String>> {
        Ok(self.client.send(RawJsAsync::new(js)).await?.result)
    }

    /// Load PDB text. Without a `ref_id` a fresh UUID is used.
    ///
    /// Returns the reference id the viewer reports back.
    pub async fn load_model(&self, ref_id: Option<&str>, pdb_str: impl Into<String>) -> Result<String> {
        let ref_id = ref_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let reply = self.client.send(LoadModel::new(ref_id, pdb_str)).await?;
        Ok(reply.ref_id)
    }

    pub async fn select(&self, pymol_sel: impl Into<String>, focus: bool) -> Result<()> {
        self.client
            .send(MakeSelection::new(pymol_sel, focus))
            .await
            .map(|_| ())
    }

    pub async fn select_all(&self) -> Result<()> {
        self.run_js(format!("return {}.phenix.selectAll();", PLUGIN_PREFIX))
            .await
            .map(|_| ())
    }

    pub async fn deselect_all(&self) -> Result<()> {
        self.run_js(format!("return {}.phenix.deselectAll();", PLUGIN_PREFIX))
            .await
            .map(|_| ())
    }

    /// Atoms currently selected in the viewer.
    pub async fn poll_selection(&self) -> Result<Vec<AtomRecord>> {
        Ok(self.client.send(SelectionPoll::new()).await?.atom_records)
    }

    pub async fn focus(&self) -> Result<()> {
        self.client.send(Focus::default()).await.map(|_| ())
    }

    pub async fn clear(&self) -> Result<()> {
        self.client.send(ClearViewer::default()).await.map(|_| ())
    }

    pub async fn reset_view(&self) -> Result<()> {
        self.client.send(ResetView::default()).await.map(|_| ())
    }

    pub async fn selection_mode(&self, is_selecting: bool) -> Result<()> {
        self.client
            .send(ToggleSelectionMode::new(is_selecting))
            .await
            .map(|_| ())
    }

    pub async fn set_granularity(&self, granularity: Granularity) -> Result<()> {
        self.client
            .send(SetPickingGranularity::new(granularity))
            .await
            .map(|_| ())
    }

    pub async fn add_representation(&self, kind: RepresentationKind) -> Result<()> {
        self.client
            .send(AddRepresentation::new(kind))
            .await
            .map(|_| ())
    }

    pub async fn set_color(&self, color: SetColor) -> Result<()> {
        self.client.send(color).await.map(|_| ())
    }

    /// Resolve `color` and apply it. Unknown colors fail before sending.
    pub async fn set_color_named(&self, color: &str) -> Result<()> {
        self.set_color(SetColor::new(color)?).await
    }

    /// Fetch the viewer's state, announcing this client's connection id.
    pub async fn sync_state(&self) -> Result<MolstarState> {
        let request = MolstarState::empty(self.client.connection_id());
        self.client.send(request).await
    }
}
