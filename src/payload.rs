//! Create-collection request payload
//!
//! Mirrors the JSON body accepted by `POST /api/dataset_collections`.
//! Required fields are checked here; everything that needs the store
//! (decoding ids, resolving datasets) happens in the service.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{CollectionError, Result};
use crate::model::{CollectionType, ParentKind};

/// Where an element identifier's target comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementSource {
    Hda,
    Ldda,
    Hdca,
    NewCollection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementIdentifier {
    pub name: String,
    pub src: ElementSource,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub collection_type: Option<String>,
    #[serde(default)]
    pub element_identifiers: Option<Vec<ElementIdentifier>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPayload {
    collection_type: Option<String>,
    element_identifiers: Option<Vec<ElementIdentifier>>,
    name: Option<String>,
    instance_type: Option<String>,
    history_id: Option<String>,
    folder_id: Option<String>,
    #[serde(default, deserialize_with = "string_as_bool")]
    hide_source_items: bool,
    #[serde(default, deserialize_with = "string_as_bool")]
    copy_elements: bool,
}

/// Validated create parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateParams {
    pub collection_type: CollectionType,
    pub element_identifiers: Vec<ElementIdentifier>,
    pub name: Option<String>,
    pub instance_type: ParentKind,
    pub history_id: Option<String>,
    pub folder_id: Option<String>,
    pub hide_source_items: bool,
    pub copy_elements: bool,
}

impl CreateParams {
    pub fn from_payload(payload: Value) -> Result<Self> {
        if !payload.is_object() {
            return Err(CollectionError::InvalidInput(
                "payload must be a JSON object".to_string(),
            ));
        }
        let raw: RawPayload = serde_json::from_value(payload)?;

        let missing: Vec<&str> = [
            ("collection_type", raw.collection_type.is_none()),
            ("element_identifiers", raw.element_identifiers.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, absent)| absent.then_some(field))
        .collect();
        if !missing.is_empty() {
            return Err(CollectionError::RequestParameterMissing(missing.join(", ")));
        }

        let instance_type = match raw.instance_type.as_deref() {
            Some(kind) => kind.parse()?,
            None => ParentKind::History,
        };

        Ok(Self {
            collection_type: raw.collection_type.unwrap_or_default().parse()?,
            element_identifiers: raw.element_identifiers.unwrap_or_default(),
            name: raw.name,
            instance_type,
            history_id: raw.history_id,
            folder_id: raw.folder_id,
            hide_source_items: raw.hide_source_items,
            copy_elements: raw.copy_elements,
        })
    }
}

/// Accept JSON booleans as well as the usual truthy strings.
fn string_as_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolLike {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<BoolLike>::deserialize(deserializer)? {
        Some(BoolLike::Bool(b)) => b,
        Some(BoolLike::Text(s)) => matches!(
            s.to_ascii_lowercase().as_str(),
            "true" | "yes" | "on" | "1"
        ),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_payload_defaults_to_history() {
        let params = CreateParams::from_payload(json!({
            "collection_type": "list",
            "element_identifiers": [],
            "history_id": "abc",
        }))
        .unwrap();
        assert_eq!(params.instance_type, ParentKind::History);
        assert!(!params.copy_elements);
        assert!(!params.hide_source_items);
        assert_eq!(params.history_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_missing_required_fields_listed() {
        let err = CreateParams::from_payload(json!({ "name": "x" })).unwrap_err();
        match err {
            CollectionError::RequestParameterMissing(fields) => {
                assert_eq!(fields, "collection_type, element_identifiers");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_string_booleans() {
        let params = CreateParams::from_payload(json!({
            "collection_type": "list",
            "element_identifiers": [],
            "hide_source_items": "True",
            "copy_elements": "0",
        }))
        .unwrap();
        assert!(params.hide_source_items);
        assert!(!params.copy_elements);
    }

    #[test]
    fn test_unknown_instance_type_not_implemented() {
        let err = CreateParams::from_payload(json!({
            "collection_type": "list",
            "element_identifiers": [],
            "instance_type": "workflow",
        }))
        .unwrap_err();
        assert_eq!(err.http_status(), 501);
    }

    #[test]
    fn test_nested_identifiers_parse() {
        let params = CreateParams::from_payload(json!({
            "collection_type": "list:paired",
            "element_identifiers": [{
                "name": "sample1",
                "src": "new_collection",
                "collection_type": "paired",
                "element_identifiers": [
                    { "name": "forward", "src": "hda", "id": "aaaaaaaaaaaaaaaa" },
                    { "name": "reverse", "src": "hda", "id": "bbbbbbbbbbbbbbbb" },
                ],
            }],
        }))
        .unwrap();
        let inner = params.element_identifiers[0].element_identifiers.as_ref().unwrap();
        assert_eq!(inner.len(), 2);
        assert_eq!(params.element_identifiers[0].src, ElementSource::NewCollection);
    }

    #[test]
    fn test_bad_src_is_invalid_input() {
        let err = CreateParams::from_payload(json!({
            "collection_type": "list",
            "element_identifiers": [{ "name": "a", "src": "url" }],
        }))
        .unwrap_err();
        assert!(matches!(err, CollectionError::InvalidInput(_)));
    }
}
