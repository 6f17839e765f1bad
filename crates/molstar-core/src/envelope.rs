//! The `{"name": ..., "data": ...}` wrapper around exactly one call.
//!
//! The discriminator is never stored separately: it is read off the payload
//! when encoding, so the two cannot disagree.

use crate::api::{ApiCall, Call, CallRegistry};
use crate::error::{json_kind, BridgeError, Result};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    call: Call,
}

#[derive(Serialize)]
struct EnvelopeWire<'a> {
    name: &'static str,
    data: &'a Call,
}

impl Envelope {
    pub fn new(call: impl Into<Call>) -> Self {
        Self { call: call.into() }
    }

    /// Discriminator of the wrapped call.
    pub fn name(&self) -> &'static str {
        self.call.name()
    }

    pub fn call(&self) -> &Call {
        &self.call
    }

    pub fn into_call(self) -> Call {
        self.call
    }

    /// Extract the payload as a concrete variant.
    pub fn into_inner<T: ApiCall>(self) -> Result<T> {
        let found = self.call.name();
        T::from_call(self.call).ok_or_else(|| BridgeError::VariantMismatch {
            expected: T::NAME.to_string(),
            found: found.to_string(),
        })
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Indented JSON; the payload keeps its own field order.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Compact JSON, used where the envelope is embedded as text.
    pub fn to_json_compact(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        Self::from_value_with(&CallRegistry::standard(), value)
    }

    /// Decode against a specific registry.
    pub fn from_value_with(registry: &CallRegistry, value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or(BridgeError::NotAMapping {
            context: "envelope",
            found: json_kind(value),
        })?;
        let name = map
            .get("name")
            .ok_or(BridgeError::MissingField { field: "name" })?;
        let name = name.as_str().ok_or_else(|| BridgeError::UnknownVariant {
            name: name.to_string(),
        })?;
        // Resolve the name before looking at the payload so an unknown
        // variant is reported as such even when `data` is also missing.
        if !registry.contains(name) {
            return Err(BridgeError::UnknownVariant {
                name: name.to_string(),
            });
        }
        let data = map
            .get("data")
            .ok_or(BridgeError::MissingField { field: "data" })?;
        let call = registry.decode(name, data)?;
        Ok(Self { call })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }
}

impl Serialize for Envelope {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        EnvelopeWire {
            name: self.call.name(),
            data: &self.call,
        }
        .serialize(serializer)
    }
}

impl<T: ApiCall> From<T> for Envelope {
    fn from(call: T) -> Self {
        Self::new(call.into_call())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        AddRepresentation, ClearViewer, Focus, Granularity, LoadModel, MakeSelection,
        MolstarState, RawJs, RawJsAsync, RepresentationKind, ResetView, SelectionPoll, SetColor,
        SetPickingGranularity, ToggleSelectionMode,
    };
    use serde_json::json;

    fn every_call() -> Vec<Call> {
        vec![
            RawJs::new("return 1").into(),
            RawJsAsync::new("await 1").into(),
            MolstarState::sample().into(),
            SelectionPoll::new().into(),
            MakeSelection::new("chain A", true).into(),
            LoadModel::new("m1", "END").into(),
            ClearViewer::default().into(),
            ResetView::default().into(),
            Focus::default().into(),
            ToggleSelectionMode::new(false).into(),
            SetPickingGranularity::new(Granularity::Element).into(),
            AddRepresentation::new(RepresentationKind::Cartoon).into(),
            SetColor::new("#123456").unwrap().into(),
        ]
    }

    #[test]
    fn test_request_body_shape() {
        let envelope = Envelope::new(LoadModel::new("m1", "END"));
        assert_eq!(
            envelope.to_value().unwrap(),
            json!({"name": "LoadModel", "data": {"ref_id": "m1", "pdb_str": "END"}})
        );
    }

    #[test]
    fn test_payload_keeps_declaration_order() {
        let text = Envelope::new(LoadModel::new("m1", "END"))
            .to_json_compact()
            .unwrap();
        assert_eq!(
            text,
            r#"{"name":"LoadModel","data":{"ref_id":"m1","pdb_str":"END"}}"#
        );
    }

    #[test]
    fn test_discriminator_integrity_for_every_variant() {
        for call in every_call() {
            let name = call.name();
            let envelope = Envelope::new(call.clone());
            let decoded = Envelope::from_json(&envelope.to_json().unwrap()).unwrap();
            assert_eq!(decoded.name(), name);
            assert_eq!(decoded.call(), &call);
        }
    }

    #[test]
    fn test_unknown_variant_is_rejected() {
        let err = Envelope::from_value(&json!({"name": "FormatDisk", "data": {}})).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownVariant { ref name } if name == "FormatDisk"));

        // The envelope type itself is not a call variant.
        let err = Envelope::from_value(&json!({
            "name": "ApiRequest",
            "data": {"name": "Focus", "data": {}}
        }))
        .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownVariant { .. }));
    }

    #[test]
    fn test_malformed_envelopes() {
        assert!(matches!(
            Envelope::from_value(&json!([1, 2])),
            Err(BridgeError::NotAMapping { .. })
        ));
        assert!(matches!(
            Envelope::from_value(&json!({"data": {}})),
            Err(BridgeError::MissingField { field: "name" })
        ));
        assert!(matches!(
            Envelope::from_value(&json!({"name": "Focus"})),
            Err(BridgeError::MissingField { field: "data" })
        ));
        assert!(matches!(
            Envelope::from_value(&json!({"name": 7, "data": {}})),
            Err(BridgeError::UnknownVariant { .. })
        ));
        assert!(matches!(
            Envelope::from_value(&json!({"name": "Focus", "data": "Focus"})),
            Err(BridgeError::NotAMapping { .. })
        ));
    }

    #[test]
    fn test_into_inner_checks_variant() {
        let envelope = Envelope::new(Focus::default());
        assert!(envelope.clone().into_inner::<Focus>().is_ok());
        match envelope.into_inner::<LoadModel>().unwrap_err() {
            BridgeError::VariantMismatch { expected, found } => {
                assert_eq!(expected, "LoadModel");
                assert_eq!(found, "Focus");
            }
            other => panic!("Expected VariantMismatch, got: {:?}", other),
        }
    }
}
