//! Selection polling.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// One selected atom, keyed by mmCIF atom-site names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomRecord {
    pub id: i64,
    #[serde(default)]
    pub auth_asym_id: String,
    #[serde(default)]
    pub label_asym_id: String,
    #[serde(default)]
    pub auth_comp_id: String,
    #[serde(default)]
    pub label_comp_id: String,
    #[serde(default)]
    pub auth_seq_id: Option<i64>,
    #[serde(default)]
    pub label_seq_id: Option<i64>,
    #[serde(default)]
    pub auth_atom_id: String,
    #[serde(default)]
    pub label_atom_id: String,
    #[serde(default)]
    pub label_alt_id: String,
}

/// Ask the viewer what is currently selected.
///
/// Sent empty; the viewer fills `atom_records`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPoll {
    #[serde(default, deserialize_with = "atom_records_from_wire")]
    pub atom_records: Vec<AtomRecord>,
}

impl SelectionPoll {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(atom_records: Vec<AtomRecord>) -> Self {
        Self { atom_records }
    }

    pub fn is_empty(&self) -> bool {
        self.atom_records.is_empty()
    }
}

/// The viewer reports records either inline, as JSON text, or wrapped in a
/// selection object under `atom_list`.
#[derive(Deserialize)]
#[serde(untagged)]
enum AtomRecordsWire {
    List(Vec<AtomRecord>),
    Selection { atom_list: Vec<AtomRecord> },
    Text(String),
}

fn atom_records_from_wire<'de, D>(deserializer: D) -> std::result::Result<Vec<AtomRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<AtomRecordsWire>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(AtomRecordsWire::List(records)) => Ok(records),
        Some(AtomRecordsWire::Selection { atom_list }) => Ok(atom_list),
        Some(AtomRecordsWire::Text(text)) => {
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            let nested: Option<AtomRecordsWire> =
                serde_json::from_str(&text).map_err(D::Error::custom)?;
            match nested {
                None => Ok(Vec::new()),
                Some(AtomRecordsWire::List(records)) => Ok(records),
                Some(AtomRecordsWire::Selection { atom_list }) => Ok(atom_list),
                Some(AtomRecordsWire::Text(_)) => Err(D::Error::custom(
                    "atom_records text must encode a list or a selection object",
                )),
            }
        }
    }
}

#[cfg(test)]
impl AtomRecord {
    pub(crate) fn sample(id: i64) -> Self {
        Self {
            id,
            auth_asym_id: "A".into(),
            label_asym_id: "A".into(),
            auth_comp_id: "GLY".into(),
            label_comp_id: "GLY".into(),
            auth_seq_id: Some(1),
            label_seq_id: Some(1),
            auth_atom_id: "CA".into(),
            label_atom_id: "CA".into(),
            label_alt_id: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiCall;
    use serde_json::json;

    #[test]
    fn test_empty_poll_encodes_empty_list() {
        assert_eq!(SelectionPoll::new().to_dict().unwrap(), json!({"atom_records": []}));
    }

    #[test]
    fn test_decode_inline_records() {
        let poll = SelectionPoll::from_dict(&json!({
            "atom_records": [{
                "id": 1, "auth_asym_id": "A", "label_asym_id": "A",
                "auth_comp_id": "GLY", "label_comp_id": "GLY",
                "auth_seq_id": 1, "label_seq_id": 1,
                "auth_atom_id": "CA", "label_atom_id": "CA", "label_alt_id": ""
            }]
        }))
        .unwrap();
        assert_eq!(poll.atom_records, vec![AtomRecord::sample(1)]);
    }

    #[test]
    fn test_decode_records_sent_as_text() {
        let records = serde_json::to_string(&vec![AtomRecord::sample(7)]).unwrap();
        let poll = SelectionPoll::from_dict(&json!({
            "className": "SelectionPoll",
            "atom_records": records
        }))
        .unwrap();
        assert_eq!(poll.atom_records, vec![AtomRecord::sample(7)]);
    }

    #[test]
    fn test_decode_selection_object_text() {
        let selection = json!({
            "molstar_syntax": "",
            "phenix_string": "",
            "pandas_string": "",
            "atom_list": [AtomRecord::sample(3)]
        })
        .to_string();
        let poll = SelectionPoll::from_dict(&json!({"atom_records": selection})).unwrap();
        assert_eq!(poll.atom_records, vec![AtomRecord::sample(3)]);
    }

    #[test]
    fn test_decode_null_and_missing_records() {
        assert!(SelectionPoll::from_dict(&json!({"atom_records": null}))
            .unwrap()
            .is_empty());
        assert!(SelectionPoll::from_dict(&json!({})).unwrap().is_empty());
        assert!(SelectionPoll::from_dict(&json!({"atom_records": ""}))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_decode_bad_record_text_fails() {
        assert!(SelectionPoll::from_dict(&json!({"atom_records": "{oops"})).is_err());
        assert!(SelectionPoll::from_dict(&json!({"atom_records": "\"nested\""})).is_err());
    }

    #[test]
    fn test_water_without_label_seq_id() {
        let record: AtomRecord = serde_json::from_value(json!({
            "id": 60, "auth_comp_id": "HOH", "label_seq_id": null, "auth_seq_id": 8
        }))
        .unwrap();
        assert_eq!(record.label_seq_id, None);
        assert_eq!(record.auth_seq_id, Some(8));
    }
}
