//! Domain types for dataset collections
//!
//! Collections are trees: a [`DatasetCollection`] holds ordered elements,
//! each pointing at a leaf dataset or at a nested collection. A collection
//! reaches a user through a [`CollectionInstance`], which ties it to a
//! history or a library folder.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CollectionError, Result};

/// Internal numeric key of any stored record.
pub type Key = i64;

// ============================================================================
// Parents
// ============================================================================

/// Which kind of container owns a collection instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentKind {
    History,
    Library,
}

impl ParentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::History => "history",
            Self::Library => "library",
        }
    }
}

impl FromStr for ParentKind {
    type Err = CollectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "history" => Ok(Self::History),
            "library" => Ok(Self::Library),
            other => Err(CollectionError::NotImplemented(format!(
                "instance_type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ParentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    pub id: Key,
    pub name: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryFolder {
    pub id: Key,
    pub library_id: Key,
    pub name: String,
}

/// The resolved owner of a collection instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parent {
    History(History),
    Library(LibraryFolder),
}

impl Parent {
    pub fn kind(&self) -> ParentKind {
        match self {
            Self::History(_) => ParentKind::History,
            Self::Library(_) => ParentKind::Library,
        }
    }

    pub fn id(&self) -> Key {
        match self {
            Self::History(history) => history.id,
            Self::Library(folder) => folder.id,
        }
    }
}

// ============================================================================
// Datasets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Hda,
    Ldda,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hda => "hda",
            Self::Ldda => "ldda",
        }
    }

    pub fn model_class(&self) -> &'static str {
        match self {
            Self::Hda => "HistoryDatasetAssociation",
            Self::Ldda => "LibraryDatasetDatasetAssociation",
        }
    }
}

/// A leaf dataset living in a history (hda) or a library folder (ldda).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Key,
    pub kind: DatasetKind,
    pub name: String,
    pub state: String,
    pub extension: String,
    pub history_id: Option<Key>,
    pub folder_id: Option<Key>,
    pub hid: Option<i32>,
    pub visible: bool,
    pub deleted: bool,
    pub uuid: Uuid,
    pub tags: Vec<String>,
}

// ============================================================================
// Collection types
// ============================================================================

const RANK_TYPES: &[&str] = &["list", "paired"];

pub const PAIRED_IDENTIFIERS: [&str; 2] = ["forward", "reverse"];

/// A possibly nested collection type such as `list`, `paired` or `list:paired`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionType(String);

impl CollectionType {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The outermost rank, e.g. `list` for `list:paired`.
    pub fn rank_type(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    /// The type of each element's collection, if elements are collections.
    pub fn child_type(&self) -> Option<CollectionType> {
        self.0
            .split_once(':')
            .map(|(_, rest)| CollectionType(rest.to_string()))
    }

    pub fn is_paired(&self) -> bool {
        self.rank_type() == "paired"
    }

    pub fn depth(&self) -> usize {
        self.0.split(':').count()
    }
}

impl FromStr for CollectionType {
    type Err = CollectionError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(CollectionError::InvalidInput(
                "collection_type must not be empty".to_string(),
            ));
        }
        for rank in s.split(':') {
            if !RANK_TYPES.contains(&rank) {
                return Err(CollectionError::InvalidInput(format!(
                    "unknown collection type rank '{rank}' in '{s}'"
                )));
            }
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for CollectionType {
    type Error = CollectionError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CollectionType> for String {
    fn from(value: CollectionType) -> Self {
        value.0
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Collections and elements
// ============================================================================

/// Non-recursive description of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub id: Key,
    pub collection_type: CollectionType,
    pub populated: bool,
    pub element_count: i32,
}

/// What an element points at, loaded one level deep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementObject {
    Dataset(Dataset),
    Collection(CollectionSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetCollectionElement {
    pub id: Key,
    pub collection_id: Key,
    pub element_index: i32,
    pub element_identifier: String,
    /// `None` when the referenced record has been purged.
    pub object: Option<ElementObject>,
}

impl DatasetCollectionElement {
    pub fn element_type(&self) -> &'static str {
        match &self.object {
            Some(ElementObject::Dataset(dataset)) => dataset.kind.as_str(),
            Some(ElementObject::Collection(_)) => "dataset_collection",
            None => "unknown",
        }
    }

    pub fn child_collection(&self) -> Option<&CollectionSummary> {
        match &self.object {
            Some(ElementObject::Collection(summary)) => Some(summary),
            _ => None,
        }
    }
}

/// An element together with its fully loaded nested elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementTree {
    pub element: DatasetCollectionElement,
    pub children: Vec<ElementTree>,
}

/// A collection bound to a history or a library folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInstance {
    pub id: Key,
    pub kind: ParentKind,
    pub parent_id: Key,
    pub name: Option<String>,
    pub hid: Option<i32>,
    pub visible: bool,
    pub deleted: bool,
    pub collection: CollectionSummary,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl CollectionInstance {
    pub fn model_class(&self) -> &'static str {
        match self.kind {
            ParentKind::History => "HistoryDatasetCollectionAssociation",
            ParentKind::Library => "LibraryDatasetCollectionAssociation",
        }
    }
}

// ============================================================================
// Creation
// ============================================================================

/// A validated collection tree ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCollection {
    pub collection_type: CollectionType,
    pub elements: Vec<NewElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewElement {
    pub identifier: String,
    pub target: NewElementTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewElementTarget {
    Hda(Key),
    /// Copy of a history dataset made into the new instance's history.
    CopyHda(Key),
    Ldda(Key),
    /// Reuse an already stored collection.
    Collection(Key),
    NewCollection(NewCollection),
}

impl NewCollection {
    /// Ids of the source history datasets referenced anywhere in the tree,
    /// whether used directly or copied.
    pub fn hda_sources(&self) -> Vec<Key> {
        let mut sources = Vec::new();
        self.collect_hda_sources(&mut sources);
        sources.sort_unstable();
        sources.dedup();
        sources
    }

    fn collect_hda_sources(&self, sources: &mut Vec<Key>) {
        for element in &self.elements {
            match &element.target {
                NewElementTarget::Hda(id) | NewElementTarget::CopyHda(id) => sources.push(*id),
                NewElementTarget::NewCollection(child) => child.collect_hda_sources(sources),
                NewElementTarget::Ldda(_) | NewElementTarget::Collection(_) => {}
            }
        }
    }
}
