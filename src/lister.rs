//! Paginated listing of a collection's direct children
//!
//! `list_contents` decodes the external id, confirms the collection exists,
//! fetches one ordered, windowed page from the [`ElementStore`], renders each
//! element as a shallow reference and encodes every identifier in it.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::codec::IdentifierCodec;
use crate::dictify::dictify_element_reference;
use crate::error::{CollectionError, Result};
use crate::pagination::Window;
use crate::store::ElementStore;

pub struct CollectionContentsLister {
    store: Arc<dyn ElementStore>,
    codec: Arc<dyn IdentifierCodec>,
}

impl CollectionContentsLister {
    pub fn new(store: Arc<dyn ElementStore>, codec: Arc<dyn IdentifierCodec>) -> Self {
        Self { store, codec }
    }

    /// Direct children of the collection `external_id`, ordered by
    /// `element_index`, skipping `window.offset()` and capped at
    /// `window.limit()`.
    ///
    /// An unknown collection is `NotFound`; an existing empty one yields an
    /// empty page.
    pub async fn list_contents(&self, external_id: &str, window: Window) -> Result<Vec<Value>> {
        let collection_id = self.codec.decode_id(external_id)?;

        let exists = self
            .store
            .collection_exists(collection_id)
            .await
            .inspect_err(|e| warn!("collection lookup failed for {}: {}", external_id, e))?;
        if !exists {
            return Err(CollectionError::NotFound(format!(
                "dataset collection {external_id}"
            )));
        }

        let elements = self
            .store
            .list_elements(collection_id, window)
            .await
            .inspect_err(|e| warn!("element query failed for {}: {}", external_id, e))?;

        debug!(
            collection = external_id,
            offset = window.offset(),
            limit = ?window.limit(),
            returned = elements.len(),
            "listed collection contents"
        );

        Ok(elements
            .iter()
            .map(|element| {
                let mut reference = dictify_element_reference(element, None);
                self.codec.encode_all_ids(&mut reference, true);
                reference
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::KeyedIdCodec;
    use crate::memory::{ElementTarget, MemoryStore};
    use async_trait::async_trait;
    use crate::model::{DatasetCollectionElement, Key};

    struct UnavailableStore;

    #[async_trait]
    impl ElementStore for UnavailableStore {
        async fn collection_exists(&self, _collection_id: Key) -> Result<bool> {
            Err(CollectionError::StorageUnavailable("connection refused".into()))
        }

        async fn list_elements(
            &self,
            _collection_id: Key,
            _window: Window,
        ) -> Result<Vec<DatasetCollectionElement>> {
            Err(CollectionError::StorageUnavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_propagates_unchanged() {
        let codec = Arc::new(KeyedIdCodec::new("lister"));
        let lister = CollectionContentsLister::new(Arc::new(UnavailableStore), codec.clone());
        let err = lister
            .list_contents(&codec.encode_id(1), Window::all())
            .await
            .unwrap_err();
        assert!(matches!(err, CollectionError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_nested_collection_listed_by_reference() {
        let store = Arc::new(MemoryStore::new());
        let codec = Arc::new(KeyedIdCodec::new("lister"));
        let history = store.add_history("h").await;
        let outer = store.add_collection("list:paired".parse().unwrap()).await;
        let inner = store.add_collection("paired".parse().unwrap()).await;
        for (index, name) in ["forward", "reverse"].iter().enumerate() {
            let hda = store.add_hda(history.id, name).await.unwrap();
            store
                .add_element(inner.id, index as i32, name, ElementTarget::Hda(hda.id))
                .await
                .unwrap();
        }
        store
            .add_element(outer.id, 0, "sample", ElementTarget::Collection(inner.id))
            .await
            .unwrap();

        let lister = CollectionContentsLister::new(store.clone(), codec.clone());
        let page = lister
            .list_contents(&codec.encode_id(outer.id), Window::all())
            .await
            .unwrap();

        assert_eq!(page.len(), 1);
        let object = &page[0]["object"];
        assert_eq!(object["id"], serde_json::json!(codec.encode_id(inner.id)));
        assert_eq!(object["model_class"], "DatasetCollection");
        assert!(object.get("elements").is_none());
    }
}
