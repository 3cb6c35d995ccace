//! Plain JSON views of collections and their elements
//!
//! The functions here only shape data. Identifier encoding happens once on
//! the finished structure, through [`IdentifierCodec::encode_all_ids`].

use std::str::FromStr;

use serde_json::{json, Map, Value};

use crate::codec::IdentifierCodec;
use crate::error::{CollectionError, Result};
use crate::model::*;

/// Which rendering of a collection instance to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstanceView {
    /// Instance fields plus fully expanded elements.
    #[default]
    Element,
    /// Instance fields plus element references.
    ElementReference,
    /// Instance fields only.
    Collection,
}

impl InstanceView {
    pub fn includes_elements(&self) -> bool {
        !matches!(self, Self::Collection)
    }
}

impl FromStr for InstanceView {
    type Err = CollectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "element" => Ok(Self::Element),
            "element-reference" => Ok(Self::ElementReference),
            "collection" => Ok(Self::Collection),
            other => Err(CollectionError::InvalidInput(format!("unknown view '{other}'"))),
        }
    }
}

fn element_fields(element: &DatasetCollectionElement) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("id".into(), json!(element.id));
    map.insert("element_index".into(), json!(element.element_index));
    map.insert(
        "element_identifier".into(),
        json!(element.element_identifier),
    );
    map.insert("element_type".into(), json!(element.element_type()));
    map.insert("model_class".into(), json!("DatasetCollectionElement"));
    map
}

pub fn dataset_to_value(dataset: &Dataset) -> Value {
    let mut map = Map::new();
    map.insert("id".into(), json!(dataset.id));
    map.insert("model_class".into(), json!(dataset.kind.model_class()));
    map.insert("name".into(), json!(dataset.name));
    map.insert("state".into(), json!(dataset.state));
    map.insert("extension".into(), json!(dataset.extension));
    map.insert("visible".into(), json!(dataset.visible));
    map.insert("deleted".into(), json!(dataset.deleted));
    map.insert("uuid".into(), json!(dataset.uuid.to_string()));
    match dataset.kind {
        DatasetKind::Hda => {
            map.insert("history_id".into(), json!(dataset.history_id));
            map.insert("hid".into(), json!(dataset.hid));
            map.insert("tags".into(), json!(dataset.tags));
        }
        DatasetKind::Ldda => {
            map.insert("folder_id".into(), json!(dataset.folder_id));
        }
    }
    Value::Object(map)
}

pub fn collection_to_value(summary: &CollectionSummary) -> Value {
    json!({
        "id": summary.id,
        "model_class": "DatasetCollection",
        "collection_type": summary.collection_type.as_str(),
        "populated": summary.populated,
        "element_count": summary.element_count,
    })
}

/// Reference view of one element.
///
/// A nested collection is described by summary only unless `children` is
/// given, in which case its elements are expanded as references too.
pub fn dictify_element_reference(
    element: &DatasetCollectionElement,
    children: Option<&[ElementTree]>,
) -> Value {
    let mut map = element_fields(element);

    let object = match &element.object {
        None => Value::Null,
        Some(ElementObject::Collection(summary)) => {
            let mut details = Map::new();
            details.insert("id".into(), json!(summary.id));
            details.insert("model_class".into(), json!("DatasetCollection"));
            details.insert("populated".into(), json!(summary.populated));
            if let Some(children) = children {
                let elements: Vec<Value> = children
                    .iter()
                    .map(|child| dictify_element_reference(&child.element, Some(&child.children)))
                    .collect();
                details.insert("elements".into(), Value::Array(elements));
                details.insert("element_count".into(), json!(summary.element_count));
            }
            Value::Object(details)
        }
        Some(ElementObject::Dataset(dataset)) => {
            let mut details = Map::new();
            details.insert("id".into(), json!(dataset.id));
            details.insert("model_class".into(), json!(dataset.kind.model_class()));
            details.insert("state".into(), json!(dataset.state));
            details.insert("hda_ldda".into(), json!(dataset.kind.as_str()));
            if dataset.kind == DatasetKind::Hda {
                details.insert("history_id".into(), json!(dataset.history_id));
                details.insert("tags".into(), json!(dataset.tags));
            }
            Value::Object(details)
        }
    };

    map.insert("object".into(), object);
    Value::Object(map)
}

/// Full view of one element, expanding nested collections to any depth.
pub fn dictify_element(tree: &ElementTree) -> Value {
    let mut map = element_fields(&tree.element);

    let object = match &tree.element.object {
        None => Value::Null,
        Some(ElementObject::Dataset(dataset)) => dataset_to_value(dataset),
        Some(ElementObject::Collection(summary)) => {
            let mut details = collection_to_value(summary);
            details["elements"] = Value::Array(tree.children.iter().map(dictify_element).collect());
            details
        }
    };

    map.insert("object".into(), object);
    Value::Object(map)
}

fn instance_url(
    instance: &CollectionInstance,
    parent: &Parent,
    codec: &dyn IdentifierCodec,
) -> String {
    let encoded_id = codec.encode_id(instance.id);
    match parent {
        Parent::History(history) => format!(
            "/api/histories/{}/contents/dataset_collections/{}",
            codec.encode_id(history.id),
            encoded_id
        ),
        Parent::Library(folder) => format!(
            "/api/libraries/{}/contents/{}?folder_id={}",
            codec.encode_id(folder.library_id),
            encoded_id,
            codec.encode_id(folder.id)
        ),
    }
}

/// Render a collection instance for its parent, with ids encoded.
///
/// `elements` is the instance's loaded element tree; it is ignored for the
/// `collection` view.
pub fn dictify_dataset_collection_instance(
    instance: &CollectionInstance,
    parent: &Parent,
    view: InstanceView,
    elements: &[ElementTree],
    codec: &dyn IdentifierCodec,
) -> Value {
    let mut map = Map::new();
    map.insert("id".into(), json!(instance.id));
    map.insert("model_class".into(), json!(instance.model_class()));
    map.insert("type".into(), json!("collection"));
    map.insert("name".into(), json!(instance.name));
    map.insert("collection_id".into(), json!(instance.collection.id));
    map.insert(
        "collection_type".into(),
        json!(instance.collection.collection_type.as_str()),
    );
    map.insert("element_count".into(), json!(instance.collection.element_count));
    map.insert("deleted".into(), json!(instance.deleted));
    map.insert("create_time".into(), json!(instance.create_time.to_rfc3339()));
    map.insert("update_time".into(), json!(instance.update_time.to_rfc3339()));
    match parent {
        Parent::History(history) => {
            map.insert("history_id".into(), json!(history.id));
            map.insert("hid".into(), json!(instance.hid));
            map.insert("visible".into(), json!(instance.visible));
        }
        Parent::Library(folder) => {
            map.insert("folder_id".into(), json!(folder.id));
        }
    }
    map.insert("url".into(), json!(instance_url(instance, parent, codec)));

    match view {
        InstanceView::Element => {
            map.insert("populated".into(), json!(instance.collection.populated));
            let rendered = elements.iter().map(dictify_element).collect();
            map.insert("elements".into(), Value::Array(rendered));
        }
        InstanceView::ElementReference => {
            let rendered = elements
                .iter()
                .map(|tree| dictify_element_reference(&tree.element, Some(&tree.children)))
                .collect();
            map.insert("elements".into(), Value::Array(rendered));
        }
        InstanceView::Collection => {}
    }

    let mut value = Value::Object(map);
    codec.encode_all_ids(&mut value, true);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::KeyedIdCodec;
    use chrono::Utc;
    use uuid::Uuid;

    fn hda(id: Key) -> Dataset {
        Dataset {
            id,
            kind: DatasetKind::Hda,
            name: format!("dataset {id}"),
            state: "ok".into(),
            extension: "fastq".into(),
            history_id: Some(1),
            folder_id: None,
            hid: Some(3),
            visible: true,
            deleted: false,
            uuid: Uuid::nil(),
            tags: vec!["name:sample".into()],
        }
    }

    fn paired_summary(id: Key) -> CollectionSummary {
        CollectionSummary {
            id,
            collection_type: "paired".parse().unwrap(),
            populated: true,
            element_count: 2,
        }
    }

    fn leaf(id: Key, collection_id: Key, index: i32, name: &str, dataset: Dataset) -> ElementTree {
        ElementTree {
            element: DatasetCollectionElement {
                id,
                collection_id,
                element_index: index,
                element_identifier: name.into(),
                object: Some(ElementObject::Dataset(dataset)),
            },
            children: vec![],
        }
    }

    fn nested_tree() -> ElementTree {
        ElementTree {
            element: DatasetCollectionElement {
                id: 20,
                collection_id: 10,
                element_index: 0,
                element_identifier: "sample1".into(),
                object: Some(ElementObject::Collection(paired_summary(30))),
            },
            children: vec![
                leaf(21, 30, 0, "forward", hda(40)),
                leaf(22, 30, 1, "reverse", hda(41)),
            ],
        }
    }

    #[test]
    fn test_reference_for_dataset() {
        let tree = leaf(5, 1, 0, "a", hda(7));
        let value = dictify_element_reference(&tree.element, None);
        assert_eq!(value["element_type"], "hda");
        assert_eq!(value["object"]["hda_ldda"], "hda");
        assert_eq!(value["object"]["id"], 7);
        assert_eq!(value["object"]["history_id"], 1);
        assert_eq!(value["object"]["tags"], json!(["name:sample"]));
        assert!(value["object"].get("name").is_none());
    }

    #[test]
    fn test_reference_for_nested_collection_is_shallow() {
        let tree = nested_tree();
        let value = dictify_element_reference(&tree.element, None);
        assert_eq!(value["element_type"], "dataset_collection");
        assert_eq!(value["object"]["populated"], true);
        assert!(value["object"].get("elements").is_none());
        assert!(value["object"].get("element_count").is_none());
    }

    #[test]
    fn test_reference_recursive_expands_children() {
        let tree = nested_tree();
        let value = dictify_element_reference(&tree.element, Some(&tree.children));
        let children = value["object"]["elements"].as_array().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1]["element_identifier"], "reverse");
        assert_eq!(value["object"]["element_count"], 2);
    }

    #[test]
    fn test_missing_object_is_null() {
        let element = DatasetCollectionElement {
            id: 1,
            collection_id: 2,
            element_index: 0,
            element_identifier: "gone".into(),
            object: None,
        };
        let value = dictify_element_reference(&element, None);
        assert!(value["object"].is_null());
    }

    #[test]
    fn test_full_element_view() {
        let value = dictify_element(&nested_tree());
        assert_eq!(value["object"]["collection_type"], "paired");
        assert_eq!(value["object"]["elements"][0]["object"]["name"], "dataset 40");
        assert_eq!(value["object"]["elements"][0]["object"]["extension"], "fastq");
    }

    #[test]
    fn test_instance_view_encodes_everything() {
        let codec = KeyedIdCodec::new("dictify-test");
        let now = Utc::now();
        let instance = CollectionInstance {
            id: 50,
            kind: ParentKind::History,
            parent_id: 1,
            name: Some("pairs".into()),
            hid: Some(4),
            visible: true,
            deleted: false,
            collection: CollectionSummary {
                id: 10,
                collection_type: "list:paired".parse().unwrap(),
                populated: true,
                element_count: 1,
            },
            create_time: now,
            update_time: now,
        };
        let parent = Parent::History(History {
            id: 1,
            name: "h".into(),
            deleted: false,
        });

        let value = dictify_dataset_collection_instance(
            &instance,
            &parent,
            InstanceView::Element,
            &[nested_tree()],
            &codec,
        );

        assert_eq!(value["id"], json!(codec.encode_id(50)));
        assert_eq!(value["collection_id"], json!(codec.encode_id(10)));
        assert_eq!(value["history_id"], json!(codec.encode_id(1)));
        assert_eq!(value["hid"], 4);
        assert_eq!(
            value["url"],
            json!(format!(
                "/api/histories/{}/contents/dataset_collections/{}",
                codec.encode_id(1),
                codec.encode_id(50)
            ))
        );
        let inner = &value["elements"][0]["object"]["elements"][1]["object"];
        assert_eq!(inner["id"], json!(codec.encode_id(41)));
        assert_eq!(inner["history_id"], json!(codec.encode_id(1)));
    }

    #[test]
    fn test_collection_view_has_no_elements() {
        let codec = KeyedIdCodec::new("dictify-test");
        let now = Utc::now();
        let instance = CollectionInstance {
            id: 2,
            kind: ParentKind::Library,
            parent_id: 8,
            name: None,
            hid: None,
            visible: true,
            deleted: false,
            collection: paired_summary(3),
            create_time: now,
            update_time: now,
        };
        let parent = Parent::Library(LibraryFolder {
            id: 8,
            library_id: 7,
            name: "folder".into(),
        });
        let value =
            dictify_dataset_collection_instance(&instance, &parent, InstanceView::Collection, &[], &codec);
        assert!(value.get("elements").is_none());
        assert_eq!(value["folder_id"], json!(codec.encode_id(8)));
        assert_eq!(value["model_class"], "LibraryDatasetCollectionAssociation");
    }

    #[test]
    fn test_view_parsing() {
        assert_eq!("element".parse::<InstanceView>().unwrap(), InstanceView::Element);
        assert!("everything".parse::<InstanceView>().is_err());
    }
}
