use async_trait::async_trait;

use crate::error::Result;
use crate::model::*;
use crate::pagination::Window;

/// Read port used by the contents lister.
///
/// Implementations must return elements strictly ordered by ascending
/// `element_index`, with the window applied to that single ordered result.
#[async_trait]
pub trait ElementStore: Send + Sync {
    async fn collection_exists(&self, collection_id: Key) -> Result<bool>;

    async fn list_elements(
        &self,
        collection_id: Key,
        window: Window,
    ) -> Result<Vec<DatasetCollectionElement>>;
}

/// Full persistence port for the collections service.
#[async_trait]
pub trait CollectionStore: ElementStore {
    // ── Parents ──

    async fn load_history(&self, id: Key) -> Result<Option<History>>;
    async fn load_library_folder(&self, id: Key) -> Result<Option<LibraryFolder>>;

    // ── Datasets ──

    async fn load_dataset(&self, kind: DatasetKind, id: Key) -> Result<Option<Dataset>>;

    // ── Collections ──

    async fn load_instance(&self, kind: ParentKind, id: Key)
        -> Result<Option<CollectionInstance>>;

    /// Persist the whole tree and its instance atomically.
    ///
    /// `CopyHda` targets are copied into the parent history and every id in
    /// `hide` is marked invisible within the same unit of work. On error no
    /// record is created or changed.
    async fn create_instance(
        &self,
        parent: &Parent,
        name: Option<&str>,
        collection: &NewCollection,
        hide: &[Key],
    ) -> Result<CollectionInstance>;
}
