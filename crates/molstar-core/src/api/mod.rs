//! Typed API calls exchanged with the viewer.
//!
//! Each call is a plain serde value type. A call carries the inputs the viewer
//! needs to perform an action and, after a round trip, any outputs the viewer
//! filled in. Calls are identified on the wire by a fixed name (their
//! discriminator) and the set of calls is closed: [`define_calls!`] generates
//! the [`Call`] sum type and the static [`CallRegistry`] table from one list.
//!
//! ```text
//! LoadModel { ref_id, pdb_str }
//!   -> Envelope { "name": "LoadModel", "data": { "ref_id": ..., "pdb_str": ... } }
//! ```

mod calls;
mod color;
mod registry;
mod selection;
mod state;

pub use calls::{
    AddRepresentation, ClearViewer, Focus, Granularity, LoadModel, MakeSelection, RawJs,
    RawJsAsync, RepresentationKind, ResetView, SetColor, SetPickingGranularity,
    ToggleSelectionMode,
};
pub use color::Rgb;
pub use registry::{CallEntry, CallRegistry};
pub use selection::{AtomRecord, SelectionPoll};
pub use state::{Component, MolstarState, Reference, Representation, Structure};

use crate::error::{json_kind, BridgeError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Serialization contract shared by every call variant.
///
/// Encoding follows field declaration order, so `to_json` output is stable
/// and can be compared as text.
pub trait ApiCall: Serialize + DeserializeOwned + Clone + std::fmt::Debug {
    /// Discriminator used on the wire.
    const NAME: &'static str;

    /// Convert to a JSON mapping, recursing into nested typed fields.
    fn to_dict(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Encode as indented JSON text.
    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rebuild from a JSON mapping.
    fn from_dict(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(BridgeError::NotAMapping {
                context: Self::NAME,
                found: json_kind(value),
            });
        }
        Self::deserialize(value).map_err(|e| BridgeError::Json {
            message: format!("invalid {} payload: {}", Self::NAME, e),
            source: Some(e),
        })
    }

    /// Parse JSON text and rebuild; the text must hold a mapping.
    fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_dict(&value)
    }

    fn into_call(self) -> Call;

    /// Extract this variant from a [`Call`], if it is one.
    fn from_call(call: Call) -> Option<Self>;
}

/// Decode a mapping as `T` and wrap it. Used for registry entries.
fn decode_as<T: ApiCall>(value: &Value) -> Result<Call> {
    T::from_dict(value).map(ApiCall::into_call)
}

macro_rules! define_calls {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Every call the viewer understands.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Call {
            $($variant($variant),)+
        }

        impl Call {
            /// The wire discriminator of the contained call.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Call::$variant(_) => $name,)+
                }
            }

            pub fn to_dict(&self) -> Result<Value> {
                match self {
                    $(Call::$variant(call) => call.to_dict(),)+
                }
            }
        }

        impl Serialize for Call {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                match self {
                    $(Call::$variant(call) => call.serialize(serializer),)+
                }
            }
        }

        $(
            impl ApiCall for $variant {
                const NAME: &'static str = $name;

                fn into_call(self) -> Call {
                    Call::$variant(self)
                }

                fn from_call(call: Call) -> Option<Self> {
                    match call {
                        Call::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$variant> for Call {
                fn from(call: $variant) -> Self {
                    Call::$variant(call)
                }
            }
        )+

        pub(crate) const CALL_ENTRIES: &[CallEntry] = &[
            $(CallEntry { name: $name, decode: decode_as::<$variant> },)+
        ];
    };
}

define_calls! {
    RawJs => "RawJS",
    RawJsAsync => "RawJSAsync",
    MolstarState => "MolstarState",
    SelectionPoll => "SelectionPoll",
    MakeSelection => "MakeSelection",
    LoadModel => "LoadModel",
    ClearViewer => "ClearViewer",
    ResetView => "ResetView",
    Focus => "Focus",
    ToggleSelectionMode => "ToggleSelectionMode",
    SetPickingGranularity => "SetPickingGranularity",
    AddRepresentation => "AddRepresentation",
    SetColor => "SetColor",
}

/// Deserialize a sequence that the other side may send as `null`.
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
