//! Viewer action calls.

use super::color::Rgb;
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Evaluate raw JavaScript in the viewer page.
///
/// The script runs as a function body with `viewer` in scope; whatever it
/// returns comes back in `result` (stringified if it is not a string).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawJs {
    pub js: String,
    #[serde(default)]
    pub result: Option<String>,
}

impl RawJs {
    pub fn new(js: impl Into<String>) -> Self {
        Self {
            js: js.into(),
            result: None,
        }
    }
}

/// Like [`RawJs`], but the script body is awaited inside an async function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawJsAsync {
    pub js: String,
    #[serde(default)]
    pub result: Option<String>,
}

impl RawJsAsync {
    pub fn new(js: impl Into<String>) -> Self {
        Self {
            js: js.into(),
            result: None,
        }
    }
}

/// Load a structure from PDB text under a caller-chosen reference id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadModel {
    pub ref_id: String,
    pub pdb_str: String,
}

impl LoadModel {
    pub fn new(ref_id: impl Into<String>, pdb_str: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            pdb_str: pdb_str.into(),
        }
    }
}

/// Select atoms with a PyMOL-syntax selection string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakeSelection {
    pub pymol_sel: String,
    /// Move the camera onto the selection afterwards.
    #[serde(default = "default_focus")]
    pub focus: bool,
}

fn default_focus() -> bool {
    true
}

impl MakeSelection {
    pub fn new(pymol_sel: impl Into<String>, focus: bool) -> Self {
        Self {
            pymol_sel: pymol_sel.into(),
            focus,
        }
    }
}

/// Remove every loaded object from the viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearViewer {}

/// Reset the camera.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetView {}

/// Focus the camera on the current selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Focus {}

/// Turn the viewer's selection mode on or off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleSelectionMode {
    pub is_selecting: bool,
}

impl ToggleSelectionMode {
    pub fn new(is_selecting: bool) -> Self {
        Self { is_selecting }
    }
}

/// Picking level used when clicking in the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Element,
    Residue,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Element => "element",
            Granularity::Residue => "residue",
        }
    }
}

impl FromStr for Granularity {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "element" => Ok(Granularity::Element),
            "residue" => Ok(Granularity::Residue),
            _ => Err(BridgeError::construction(
                "granularity",
                format!("expected 'element' or 'residue', got '{}'", s),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPickingGranularity {
    pub granularity: Granularity,
}

impl SetPickingGranularity {
    pub fn new(granularity: Granularity) -> Self {
        Self { granularity }
    }
}

/// Representation styles the viewer plugin can add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepresentationKind {
    Cartoon,
    BallAndStick,
}

impl RepresentationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepresentationKind::Cartoon => "cartoon",
            RepresentationKind::BallAndStick => "ball-and-stick",
        }
    }
}

impl FromStr for RepresentationKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cartoon" => Ok(RepresentationKind::Cartoon),
            "ball-and-stick" | "ball_and_stick" => Ok(RepresentationKind::BallAndStick),
            _ => Err(BridgeError::construction(
                "representation",
                format!("expected 'cartoon' or 'ball-and-stick', got '{}'", s),
            )),
        }
    }
}

/// Add a representation to the current selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRepresentation {
    pub representation: RepresentationKind,
}

impl AddRepresentation {
    pub fn new(representation: RepresentationKind) -> Self {
        Self { representation }
    }
}

/// Color the current selection.
///
/// The color is resolved when the call is built, so an unknown name fails
/// before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SetColorWire")]
pub struct SetColor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_string: Option<String>,
    #[serde(rename = "R")]
    pub r: u8,
    #[serde(rename = "G")]
    pub g: u8,
    #[serde(rename = "B")]
    pub b: u8,
}

impl SetColor {
    /// Resolve a CSS4 color name or hex string.
    pub fn new(color: impl Into<String>) -> Result<Self> {
        let color = color.into();
        let rgb = Rgb::parse(&color)?;
        Ok(Self {
            color_string: Some(color),
            r: rgb.r,
            g: rgb.g,
            b: rgb.b,
        })
    }

    /// Build from an explicit triple.
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            color_string: None,
            r,
            g,
            b,
        }
    }

    pub fn color(&self) -> Rgb {
        Rgb::new(self.r, self.g, self.b)
    }
}

impl Default for SetColor {
    fn default() -> Self {
        Self {
            color_string: Some("red".to_string()),
            r: 255,
            g: 0,
            b: 0,
        }
    }
}

#[derive(Deserialize)]
struct SetColorWire {
    #[serde(default)]
    color_string: Option<String>,
    #[serde(rename = "R", default)]
    r: Option<u8>,
    #[serde(rename = "G", default)]
    g: Option<u8>,
    #[serde(rename = "B", default)]
    b: Option<u8>,
}

impl TryFrom<SetColorWire> for SetColor {
    type Error = BridgeError;

    fn try_from(wire: SetColorWire) -> Result<Self> {
        match (wire.color_string, wire.r, wire.g, wire.b) {
            (Some(color), _, _, _) => SetColor::new(color),
            (None, Some(r), Some(g), Some(b)) => Ok(SetColor::rgb(r, g, b)),
            _ => Err(BridgeError::construction(
                "SetColor",
                "either color_string or all of R, G and B must be present",
            )),
        }
    }
}
