//! In-memory collection store
//!
//! Backs the server when no database is configured and serves as the test
//! double for the service and the lister. All state sits behind one
//! `tokio::sync::RwLock`, so a listing observes a consistent snapshot.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CollectionError, Result};
use crate::model::*;
use crate::pagination::Window;
use crate::store::{CollectionStore, ElementStore};

/// Element target as stored: a reference, resolved on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementTarget {
    Hda(Key),
    Ldda(Key),
    Collection(Key),
}

#[derive(Debug)]
struct StoredHistory {
    history: History,
    hid_counter: i32,
}

#[derive(Debug)]
struct StoredElement {
    id: Key,
    element_identifier: String,
    target: ElementTarget,
}

/// Element key: children of one collection are contiguous and ordered by
/// `element_index`.
type ElementKey = (Key, i32);

#[derive(Debug, Default)]
struct MemoryState {
    next_id: Key,
    histories: BTreeMap<Key, StoredHistory>,
    folders: BTreeMap<Key, LibraryFolder>,
    hdas: BTreeMap<Key, Dataset>,
    lddas: BTreeMap<Key, Dataset>,
    collections: BTreeMap<Key, CollectionSummary>,
    elements: BTreeMap<ElementKey, StoredElement>,
    history_instances: BTreeMap<Key, CollectionInstance>,
    library_instances: BTreeMap<Key, CollectionInstance>,
}

impl MemoryState {
    fn allocate(&mut self) -> Key {
        self.next_id += 1;
        self.next_id
    }

    fn next_hid(&mut self, history_id: Key) -> Result<i32> {
        let stored = self
            .histories
            .get_mut(&history_id)
            .ok_or_else(|| CollectionError::NotFound(format!("history {history_id}")))?;
        let hid = stored.hid_counter;
        stored.hid_counter += 1;
        Ok(hid)
    }

    fn resolve(&self, target: ElementTarget) -> Option<ElementObject> {
        match target {
            ElementTarget::Hda(id) => self.hdas.get(&id).cloned().map(ElementObject::Dataset),
            ElementTarget::Ldda(id) => self.lddas.get(&id).cloned().map(ElementObject::Dataset),
            ElementTarget::Collection(id) => self
                .collections
                .get(&id)
                .cloned()
                .map(ElementObject::Collection),
        }
    }

    fn insert_element(
        &mut self,
        collection_id: Key,
        element_index: i32,
        identifier: &str,
        target: ElementTarget,
    ) -> Result<Key> {
        let key = (collection_id, element_index);
        if self.elements.contains_key(&key) {
            return Err(CollectionError::InvalidInput(format!(
                "element_index {element_index} already used in collection {collection_id}"
            )));
        }
        let id = self.allocate();
        self.elements.insert(
            key,
            StoredElement {
                id,
                element_identifier: identifier.to_string(),
                target,
            },
        );
        Ok(id)
    }

    fn require_hda(&self, id: Key) -> Result<()> {
        if self.hdas.contains_key(&id) {
            Ok(())
        } else {
            Err(CollectionError::NotFound(format!("hda {id}")))
        }
    }

    /// Check every reference in `node` without writing anything.
    fn check_tree(&self, node: &NewCollection, history_id: Option<Key>) -> Result<()> {
        for element in &node.elements {
            match &element.target {
                NewElementTarget::Hda(id) => self.require_hda(*id)?,
                NewElementTarget::CopyHda(id) => {
                    if history_id.is_none() {
                        return Err(CollectionError::InvalidInput(
                            "datasets can only be copied into a history".to_string(),
                        ));
                    }
                    self.require_hda(*id)?;
                }
                NewElementTarget::Ldda(id) => {
                    if !self.lddas.contains_key(id) {
                        return Err(CollectionError::NotFound(format!("ldda {id}")));
                    }
                }
                NewElementTarget::Collection(id) => {
                    if !self.collections.contains_key(id) {
                        return Err(CollectionError::NotFound(format!("collection {id}")));
                    }
                }
                NewElementTarget::NewCollection(child) => self.check_tree(child, history_id)?,
            }
        }
        Ok(())
    }

    fn copy_hda(&mut self, hda_id: Key, history_id: Key) -> Result<Key> {
        let source = self
            .hdas
            .get(&hda_id)
            .cloned()
            .ok_or_else(|| CollectionError::NotFound(format!("hda {hda_id}")))?;
        let hid = self.next_hid(history_id)?;
        let id = self.allocate();
        self.hdas.insert(
            id,
            Dataset {
                id,
                history_id: Some(history_id),
                hid: Some(hid),
                visible: true,
                ..source
            },
        );
        Ok(id)
    }

    fn insert_tree(&mut self, node: &NewCollection, history_id: Option<Key>) -> Result<Key> {
        let collection_id = self.allocate();
        self.collections.insert(
            collection_id,
            CollectionSummary {
                id: collection_id,
                collection_type: node.collection_type.clone(),
                populated: true,
                element_count: node.elements.len() as i32,
            },
        );
        for (index, element) in node.elements.iter().enumerate() {
            let target = match &element.target {
                NewElementTarget::Hda(id) => ElementTarget::Hda(*id),
                NewElementTarget::CopyHda(id) => {
                    let history_id = history_id.ok_or_else(|| {
                        CollectionError::InvalidInput(
                            "datasets can only be copied into a history".to_string(),
                        )
                    })?;
                    ElementTarget::Hda(self.copy_hda(*id, history_id)?)
                }
                NewElementTarget::Ldda(id) => ElementTarget::Ldda(*id),
                NewElementTarget::Collection(id) => ElementTarget::Collection(*id),
                NewElementTarget::NewCollection(child) => {
                    ElementTarget::Collection(self.insert_tree(child, history_id)?)
                }
            };
            self.insert_element(collection_id, index as i32, &element.identifier, target)?;
        }
        Ok(collection_id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding ──

    pub async fn add_history(&self, name: &str) -> History {
        let mut state = self.state.write().await;
        let id = state.allocate();
        let history = History {
            id,
            name: name.to_string(),
            deleted: false,
        };
        state.histories.insert(
            id,
            StoredHistory {
                history: history.clone(),
                hid_counter: 1,
            },
        );
        history
    }

    pub async fn add_library_folder(&self, library_id: Key, name: &str) -> LibraryFolder {
        let mut state = self.state.write().await;
        let id = state.allocate();
        let folder = LibraryFolder {
            id,
            library_id,
            name: name.to_string(),
        };
        state.folders.insert(id, folder.clone());
        folder
    }

    pub async fn add_hda(&self, history_id: Key, name: &str) -> Result<Dataset> {
        let mut state = self.state.write().await;
        let hid = state.next_hid(history_id)?;
        let id = state.allocate();
        let dataset = Dataset {
            id,
            kind: DatasetKind::Hda,
            name: name.to_string(),
            state: "ok".to_string(),
            extension: "txt".to_string(),
            history_id: Some(history_id),
            folder_id: None,
            hid: Some(hid),
            visible: true,
            deleted: false,
            uuid: Uuid::new_v4(),
            tags: Vec::new(),
        };
        state.hdas.insert(id, dataset.clone());
        Ok(dataset)
    }

    pub async fn add_ldda(&self, folder_id: Key, name: &str) -> Result<Dataset> {
        let mut state = self.state.write().await;
        if !state.folders.contains_key(&folder_id) {
            return Err(CollectionError::NotFound(format!("library folder {folder_id}")));
        }
        let id = state.allocate();
        let dataset = Dataset {
            id,
            kind: DatasetKind::Ldda,
            name: name.to_string(),
            state: "ok".to_string(),
            extension: "txt".to_string(),
            history_id: None,
            folder_id: Some(folder_id),
            hid: None,
            visible: true,
            deleted: false,
            uuid: Uuid::new_v4(),
            tags: Vec::new(),
        };
        state.lddas.insert(id, dataset.clone());
        Ok(dataset)
    }

    /// Register an empty collection; elements are attached with [`Self::add_element`].
    pub async fn add_collection(&self, collection_type: CollectionType) -> CollectionSummary {
        let mut state = self.state.write().await;
        let id = state.allocate();
        let summary = CollectionSummary {
            id,
            collection_type,
            populated: true,
            element_count: 0,
        };
        state.collections.insert(id, summary.clone());
        summary
    }

    /// Attach an element at an explicit index. Indices need not be contiguous.
    pub async fn add_element(
        &self,
        collection_id: Key,
        element_index: i32,
        identifier: &str,
        target: ElementTarget,
    ) -> Result<Key> {
        let mut state = self.state.write().await;
        if !state.collections.contains_key(&collection_id) {
            return Err(CollectionError::NotFound(format!("collection {collection_id}")));
        }
        let id = state.insert_element(collection_id, element_index, identifier, target)?;
        if let Some(summary) = state.collections.get_mut(&collection_id) {
            summary.element_count += 1;
        }
        Ok(id)
    }

    /// Drop a dataset record while leaving elements that point at it.
    pub async fn purge_dataset(&self, kind: DatasetKind, id: Key) {
        let mut state = self.state.write().await;
        match kind {
            DatasetKind::Hda => state.hdas.remove(&id),
            DatasetKind::Ldda => state.lddas.remove(&id),
        };
    }
}

#[async_trait]
impl ElementStore for MemoryStore {
    async fn collection_exists(&self, collection_id: Key) -> Result<bool> {
        Ok(self.state.read().await.collections.contains_key(&collection_id))
    }

    async fn list_elements(
        &self,
        collection_id: Key,
        window: Window,
    ) -> Result<Vec<DatasetCollectionElement>> {
        let state = self.state.read().await;
        let children = state
            .elements
            .range((collection_id, i32::MIN)..=(collection_id, i32::MAX));

        Ok(window
            .apply(children)
            .map(|(&(collection_id, element_index), e)| DatasetCollectionElement {
                id: e.id,
                collection_id,
                element_index,
                element_identifier: e.element_identifier.clone(),
                object: state.resolve(e.target),
            })
            .collect())
    }
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn load_history(&self, id: Key) -> Result<Option<History>> {
        Ok(self
            .state
            .read()
            .await
            .histories
            .get(&id)
            .map(|h| h.history.clone()))
    }

    async fn load_library_folder(&self, id: Key) -> Result<Option<LibraryFolder>> {
        Ok(self.state.read().await.folders.get(&id).cloned())
    }

    async fn load_dataset(&self, kind: DatasetKind, id: Key) -> Result<Option<Dataset>> {
        let state = self.state.read().await;
        Ok(match kind {
            DatasetKind::Hda => state.hdas.get(&id).cloned(),
            DatasetKind::Ldda => state.lddas.get(&id).cloned(),
        })
    }

    async fn load_instance(
        &self,
        kind: ParentKind,
        id: Key,
    ) -> Result<Option<CollectionInstance>> {
        let state = self.state.read().await;
        let stored = match kind {
            ParentKind::History => state.history_instances.get(&id),
            ParentKind::Library => state.library_instances.get(&id),
        };
        Ok(stored.cloned())
    }

    async fn create_instance(
        &self,
        parent: &Parent,
        name: Option<&str>,
        collection: &NewCollection,
        hide: &[Key],
    ) -> Result<CollectionInstance> {
        let mut state = self.state.write().await;

        // Everything that can fail is checked before the first write.
        let history_id = match parent {
            Parent::History(history) => {
                if !state.histories.contains_key(&history.id) {
                    return Err(CollectionError::NotFound(format!("history {}", history.id)));
                }
                Some(history.id)
            }
            Parent::Library(folder) => {
                if !state.folders.contains_key(&folder.id) {
                    return Err(CollectionError::NotFound(format!(
                        "library folder {}",
                        folder.id
                    )));
                }
                None
            }
        };
        state.check_tree(collection, history_id)?;
        for id in hide {
            state.require_hda(*id)?;
        }

        let collection_id = state.insert_tree(collection, history_id)?;
        for id in hide {
            if let Some(hda) = state.hdas.get_mut(id) {
                hda.visible = false;
            }
        }
        let summary = state
            .collections
            .get(&collection_id)
            .cloned()
            .ok_or_else(|| CollectionError::Internal(anyhow::anyhow!("collection vanished")))?;

        let hid = match history_id {
            Some(history_id) => Some(state.next_hid(history_id)?),
            None => None,
        };
        let now = Utc::now();
        let instance = CollectionInstance {
            id: state.allocate(),
            kind: parent.kind(),
            parent_id: parent.id(),
            name: name.map(str::to_string),
            hid,
            visible: true,
            deleted: false,
            collection: summary,
            create_time: now,
            update_time: now,
        };
        match parent.kind() {
            ParentKind::History => state.history_instances.insert(instance.id, instance.clone()),
            ParentKind::Library => state.library_instances.insert(instance.id, instance.clone()),
        };

        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_elements_sorted_by_index() {
        let store = MemoryStore::new();
        let history = store.add_history("h").await;
        let collection = store.add_collection("list".parse().unwrap()).await;
        for index in [2, 0, 5, 1] {
            let hda = store.add_hda(history.id, &format!("d{index}")).await.unwrap();
            store
                .add_element(collection.id, index, &format!("e{index}"), ElementTarget::Hda(hda.id))
                .await
                .unwrap();
        }

        let elements = store.list_elements(collection.id, Window::all()).await.unwrap();
        let indices: Vec<i32> = elements.iter().map(|e| e.element_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 5]);
    }

    #[tokio::test]
    async fn test_duplicate_index_rejected() {
        let store = MemoryStore::new();
        let history = store.add_history("h").await;
        let hda = store.add_hda(history.id, "d").await.unwrap();
        let collection = store.add_collection("list".parse().unwrap()).await;
        store
            .add_element(collection.id, 0, "a", ElementTarget::Hda(hda.id))
            .await
            .unwrap();
        let err = store
            .add_element(collection.id, 0, "b", ElementTarget::Hda(hda.id))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectionError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_create_instance_failure_leaves_no_trace() {
        let store = MemoryStore::new();
        let history = store.add_history("h").await;
        let ghost = History {
            id: 9_999,
            name: "ghost".into(),
            deleted: false,
        };
        let tree = NewCollection {
            collection_type: "list".parse().unwrap(),
            elements: vec![],
        };

        assert!(store
            .create_instance(&Parent::History(ghost), None, &tree, &[])
            .await
            .is_err());

        let created = store
            .create_instance(&Parent::History(history), Some("ok"), &tree, &[])
            .await
            .unwrap();
        assert_eq!(created.hid, Some(1));
        assert_eq!(store.state.read().await.collections.len(), 1);
    }

    #[tokio::test]
    async fn test_listing_stays_within_one_collection() {
        let store = MemoryStore::new();
        let history = store.add_history("h").await;
        let first = store.add_collection("list".parse().unwrap()).await;
        let second = store.add_collection("list".parse().unwrap()).await;
        for (collection, name) in [(&first, "a"), (&second, "b"), (&first, "c")] {
            let hda = store.add_hda(history.id, name).await.unwrap();
            let index = if name == "c" { 0 } else { 1 };
            store
                .add_element(collection.id, index, name, ElementTarget::Hda(hda.id))
                .await
                .unwrap();
        }

        let elements = store.list_elements(first.id, Window::all()).await.unwrap();
        let names: Vec<&str> = elements
            .iter()
            .map(|e| e.element_identifier.as_str())
            .collect();
        assert_eq!(names, vec!["c", "a"]);
        assert!(elements.iter().all(|e| e.collection_id == first.id));
    }

    #[tokio::test]
    async fn test_copy_and_hide_happen_with_the_insert() {
        let store = MemoryStore::new();
        let history = store.add_history("h").await;
        let source = store.add_hda(history.id, "reads").await.unwrap();
        let tree = NewCollection {
            collection_type: "list".parse().unwrap(),
            elements: vec![NewElement {
                identifier: "reads".into(),
                target: NewElementTarget::CopyHda(source.id),
            }],
        };

        let created = store
            .create_instance(&Parent::History(history.clone()), None, &tree, &[source.id])
            .await
            .unwrap();

        let elements = store
            .list_elements(created.collection.id, Window::all())
            .await
            .unwrap();
        let Some(ElementObject::Dataset(copy)) = &elements[0].object else {
            panic!("expected a dataset element");
        };
        assert_ne!(copy.id, source.id);
        assert_eq!(copy.hid, Some(2));
        assert_eq!(created.hid, Some(3));

        let original = store
            .load_dataset(DatasetKind::Hda, source.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!original.visible);
    }

    #[tokio::test]
    async fn test_failed_create_neither_copies_nor_hides() {
        let store = MemoryStore::new();
        let history = store.add_history("h").await;
        let source = store.add_hda(history.id, "reads").await.unwrap();
        let tree = NewCollection {
            collection_type: "list".parse().unwrap(),
            elements: vec![
                NewElement {
                    identifier: "a".into(),
                    target: NewElementTarget::CopyHda(source.id),
                },
                NewElement {
                    identifier: "b".into(),
                    target: NewElementTarget::Hda(4_242),
                },
            ],
        };

        let err = store
            .create_instance(&Parent::History(history.clone()), None, &tree, &[source.id])
            .await
            .unwrap_err();
        assert!(matches!(err, CollectionError::NotFound(_)));

        let original = store
            .load_dataset(DatasetKind::Hda, source.id)
            .await
            .unwrap()
            .unwrap();
        assert!(original.visible);
        let state = store.state.read().await;
        assert_eq!(state.hdas.len(), 1);
        assert!(state.collections.is_empty());
        assert_eq!(state.histories[&history.id].hid_counter, 2);
    }

    #[tokio::test]
    async fn test_purged_dataset_resolves_to_none() {
        let store = MemoryStore::new();
        let history = store.add_history("h").await;
        let hda = store.add_hda(history.id, "d").await.unwrap();
        let collection = store.add_collection("list".parse().unwrap()).await;
        store
            .add_element(collection.id, 0, "a", ElementTarget::Hda(hda.id))
            .await
            .unwrap();
        store.purge_dataset(DatasetKind::Hda, hda.id).await;

        let elements = store.list_elements(collection.id, Window::all()).await.unwrap();
        assert_eq!(elements.len(), 1);
        assert!(elements[0].object.is_none());
    }
}
