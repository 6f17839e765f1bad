//! Viewer-side state as seen from the client.
//!
//! The viewer tracks what the client loaded as a tree:
//! reference -> structure -> component -> representation. A `MolstarState`
//! call sent with an empty tree comes back with the viewer's copy.

use super::null_as_empty;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Representation {
    #[serde(rename = "phenixKey", default)]
    pub phenix_key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    #[serde(rename = "phenixKey", default)]
    pub phenix_key: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub representations: Vec<Representation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    #[serde(rename = "phenixReferenceKey", default)]
    pub phenix_reference_key: Option<String>,
    #[serde(rename = "phenixKey", default)]
    pub phenix_key: Option<String>,
    #[serde(default)]
    pub data_id: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub components: Vec<Component>,
}

/// A model the client loaded, as the viewer knows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Client-side reference id (`ref_id` of the `LoadModel` call).
    #[serde(default, alias = "phenixKey")]
    pub id_viewer: Option<String>,
    /// Viewer-internal key.
    #[serde(default, alias = "molstarKey")]
    pub id_molstar: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub structures: Vec<Structure>,
}

impl Reference {
    /// Names of every representation under this reference, in tree order.
    pub fn representation_names(&self) -> Vec<&str> {
        self.structures
            .iter()
            .flat_map(|s| &s.components)
            .flat_map(|c| &c.representations)
            .filter_map(|r| r.name.as_deref())
            .collect()
    }
}

/// Query (and seed) the viewer's state.
///
/// The client sends its connection id; the viewer records it and answers
/// with its synchronization flag and reference tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MolstarState {
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub has_synced: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub references: Vec<Reference>,
}

impl MolstarState {
    pub fn empty(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            has_synced: false,
            references: Vec::new(),
        }
    }

    pub fn has_reference(&self, id_viewer: &str) -> bool {
        self.references
            .iter()
            .any(|r| r.id_viewer.as_deref() == Some(id_viewer))
    }

    pub fn reference(&self, id_viewer: &str) -> Option<&Reference> {
        self.references
            .iter()
            .find(|r| r.id_viewer.as_deref() == Some(id_viewer))
    }
}

#[cfg(test)]
impl MolstarState {
    pub(crate) fn sample() -> Self {
        let representation = |key: &str, name: &str| Representation {
            phenix_key: Some(key.into()),
            name: Some(name.into()),
        };
        Self {
            connection_id: "conn-1".into(),
            has_synced: true,
            references: vec![Reference {
                id_viewer: Some("m1".into()),
                id_molstar: Some("ms-1".into()),
                structures: vec![Structure {
                    phenix_reference_key: Some("m1".into()),
                    phenix_key: Some("s1".into()),
                    data_id: Some("d1".into()),
                    key: Some("k1".into()),
                    components: vec![Component {
                        phenix_key: Some("c1".into()),
                        key: Some("ck1".into()),
                        representations: vec![
                            representation("r1", "cartoon"),
                            representation("r2", "ball-and-stick"),
                        ],
                    }],
                }],
            }],
        }
    }
}
