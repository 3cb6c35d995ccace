//! Postgres implementation of the collection store ports.
//!
//! All SQL is runtime-checked (sqlx::query, not sqlx::query!) to avoid a
//! compile-time database requirement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::storage_error;
use crate::error::{CollectionError, Result};
use crate::model::*;
use crate::pagination::Window;
use crate::store::{CollectionStore, ElementStore};

// ── Row types ─────────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct PgElementRow {
    id: i64,
    dataset_collection_id: i64,
    element_index: i32,
    element_identifier: String,
    hda_id: Option<i64>,
    hda_history_id: Option<i64>,
    hda_hid: Option<i32>,
    hda_name: Option<String>,
    hda_state: Option<String>,
    hda_extension: Option<String>,
    hda_visible: Option<bool>,
    hda_deleted: Option<bool>,
    hda_uuid: Option<Uuid>,
    hda_tags: Option<Vec<String>>,
    ldda_id: Option<i64>,
    ldda_folder_id: Option<i64>,
    ldda_name: Option<String>,
    ldda_state: Option<String>,
    ldda_extension: Option<String>,
    ldda_visible: Option<bool>,
    ldda_deleted: Option<bool>,
    ldda_uuid: Option<Uuid>,
    child_id: Option<i64>,
    child_collection_type: Option<String>,
    child_populated: Option<bool>,
    child_element_count: Option<i32>,
}

impl TryFrom<PgElementRow> for DatasetCollectionElement {
    type Error = CollectionError;

    fn try_from(row: PgElementRow) -> Result<Self> {
        let object = if let (Some(id), Some(history_id)) = (row.hda_id, row.hda_history_id) {
            Some(ElementObject::Dataset(Dataset {
                id,
                kind: DatasetKind::Hda,
                name: row.hda_name.unwrap_or_default(),
                state: row.hda_state.unwrap_or_default(),
                extension: row.hda_extension.unwrap_or_default(),
                history_id: Some(history_id),
                folder_id: None,
                hid: row.hda_hid,
                visible: row.hda_visible.unwrap_or(true),
                deleted: row.hda_deleted.unwrap_or(false),
                uuid: row.hda_uuid.unwrap_or_else(Uuid::nil),
                tags: row.hda_tags.unwrap_or_default(),
            }))
        } else if let (Some(id), Some(folder_id)) = (row.ldda_id, row.ldda_folder_id) {
            Some(ElementObject::Dataset(Dataset {
                id,
                kind: DatasetKind::Ldda,
                name: row.ldda_name.unwrap_or_default(),
                state: row.ldda_state.unwrap_or_default(),
                extension: row.ldda_extension.unwrap_or_default(),
                history_id: None,
                folder_id: Some(folder_id),
                hid: None,
                visible: row.ldda_visible.unwrap_or(true),
                deleted: row.ldda_deleted.unwrap_or(false),
                uuid: row.ldda_uuid.unwrap_or_else(Uuid::nil),
                tags: Vec::new(),
            }))
        } else if let (Some(id), Some(collection_type)) = (row.child_id, row.child_collection_type)
        {
            Some(ElementObject::Collection(CollectionSummary {
                id,
                collection_type: collection_type.parse()?,
                populated: row.child_populated.unwrap_or(true),
                element_count: row.child_element_count.unwrap_or(0),
            }))
        } else {
            None
        };

        Ok(Self {
            id: row.id,
            collection_id: row.dataset_collection_id,
            element_index: row.element_index,
            element_identifier: row.element_identifier,
            object,
        })
    }
}

#[derive(Debug, FromRow)]
struct PgDatasetRow {
    id: i64,
    history_id: Option<i64>,
    folder_id: Option<i64>,
    hid: Option<i32>,
    name: String,
    state: String,
    extension: String,
    visible: bool,
    deleted: bool,
    uuid: Uuid,
    tags: Vec<String>,
}

impl PgDatasetRow {
    fn into_dataset(self, kind: DatasetKind) -> Dataset {
        Dataset {
            id: self.id,
            kind,
            name: self.name,
            state: self.state,
            extension: self.extension,
            history_id: self.history_id,
            folder_id: self.folder_id,
            hid: self.hid,
            visible: self.visible,
            deleted: self.deleted,
            uuid: self.uuid,
            tags: self.tags,
        }
    }
}

#[derive(Debug, FromRow)]
struct PgInstanceRow {
    id: i64,
    parent_id: i64,
    name: Option<String>,
    hid: Option<i32>,
    visible: bool,
    deleted: bool,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
    collection_id: i64,
    collection_type: String,
    populated: bool,
    element_count: i32,
}

impl PgInstanceRow {
    fn into_instance(self, kind: ParentKind) -> Result<CollectionInstance> {
        Ok(CollectionInstance {
            id: self.id,
            kind,
            parent_id: self.parent_id,
            name: self.name,
            hid: self.hid,
            visible: self.visible,
            deleted: self.deleted,
            collection: CollectionSummary {
                id: self.collection_id,
                collection_type: self.collection_type.parse()?,
                populated: self.populated,
                element_count: self.element_count,
            },
            create_time: self.create_time,
            update_time: self.update_time,
        })
    }
}

const ELEMENT_SELECT: &str = r#"
    SELECT e.id, e.dataset_collection_id, e.element_index, e.element_identifier,
           h.id AS hda_id, h.history_id AS hda_history_id, h.hid AS hda_hid,
           h.name AS hda_name, h.state AS hda_state, h.extension AS hda_extension,
           h.visible AS hda_visible, h.deleted AS hda_deleted, h.uuid AS hda_uuid,
           h.tags AS hda_tags,
           l.id AS ldda_id, l.folder_id AS ldda_folder_id, l.name AS ldda_name,
           l.state AS ldda_state, l.extension AS ldda_extension,
           l.visible AS ldda_visible, l.deleted AS ldda_deleted, l.uuid AS ldda_uuid,
           c.id AS child_id, c.collection_type AS child_collection_type,
           c.populated AS child_populated, c.element_count AS child_element_count
    FROM dataset_collection_element e
    LEFT JOIN history_dataset_association h ON h.id = e.hda_id
    LEFT JOIN library_dataset_dataset_association l ON l.id = e.ldda_id
    LEFT JOIN dataset_collection c ON c.id = e.child_collection_id
    WHERE e.dataset_collection_id = $1
    ORDER BY e.element_index
    LIMIT $2 OFFSET $3
"#;

const HISTORY_INSTANCE_SELECT: &str = r#"
    SELECT a.id, a.history_id AS parent_id, a.name, a.hid, a.visible, a.deleted,
           a.create_time, a.update_time,
           c.id AS collection_id, c.collection_type, c.populated, c.element_count
    FROM history_dataset_collection_association a
    JOIN dataset_collection c ON c.id = a.collection_id
    WHERE a.id = $1
"#;

const LIBRARY_INSTANCE_SELECT: &str = r#"
    SELECT a.id, a.folder_id AS parent_id, a.name, NULL::INTEGER AS hid, TRUE AS visible,
           a.deleted, a.create_time, a.update_time,
           c.id AS collection_id, c.collection_type, c.populated, c.element_count
    FROM library_dataset_collection_association a
    JOIN dataset_collection c ON c.id = a.collection_id
    WHERE a.id = $1
"#;

// ── PgCollectionStore ─────────────────────────────────────────

/// Postgres-backed collection store.
#[derive(Clone)]
pub struct PgCollectionStore {
    pool: PgPool,
}

impl PgCollectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Claim the next hid of a history.
async fn next_hid(conn: &mut PgConnection, history_id: Key) -> Result<i32> {
    sqlx::query_scalar::<_, i32>(
        r#"UPDATE history SET hid_counter = hid_counter + 1
           WHERE id = $1
           RETURNING hid_counter - 1"#,
    )
    .bind(history_id)
    .fetch_optional(conn)
    .await
    .map_err(storage_error)?
    .ok_or_else(|| CollectionError::NotFound(format!("history {history_id}")))
}

/// Copy a history dataset into `history_id` under the next hid.
async fn copy_hda(conn: &mut PgConnection, hda_id: Key, history_id: Key) -> Result<Key> {
    let hid = next_hid(&mut *conn, history_id).await?;
    sqlx::query_scalar::<_, i64>(
        r#"INSERT INTO history_dataset_association
               (history_id, hid, name, state, extension, visible, deleted, uuid, tags)
           SELECT $2, $3, name, state, extension, TRUE, deleted, uuid, tags
           FROM history_dataset_association WHERE id = $1
           RETURNING id"#,
    )
    .bind(hda_id)
    .bind(history_id)
    .bind(hid)
    .fetch_optional(conn)
    .await
    .map_err(storage_error)?
    .ok_or_else(|| CollectionError::NotFound(format!("hda {hda_id}")))
}

/// Mark source datasets invisible; every id must exist.
async fn hide_hdas(conn: &mut PgConnection, ids: &[Key]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let hidden: Vec<i64> = sqlx::query_scalar(
        r#"UPDATE history_dataset_association SET visible = FALSE
           WHERE id = ANY($1)
           RETURNING id"#,
    )
    .bind(ids)
    .fetch_all(conn)
    .await
    .map_err(storage_error)?;

    match ids.iter().find(|id| !hidden.contains(id)) {
        Some(missing) => Err(CollectionError::NotFound(format!("hda {missing}"))),
        None => Ok(()),
    }
}

/// Insert a collection and, depth first, every nested new collection.
///
/// `CopyHda` targets are copied into `history_id`; there is no history for a
/// library parent, so a copy there is rejected.
fn insert_collection<'a>(
    conn: &'a mut PgConnection,
    node: &'a NewCollection,
    history_id: Option<Key>,
) -> BoxFuture<'a, Result<Key>> {
    Box::pin(async move {
        let collection_id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO dataset_collection (collection_type, populated, element_count)
               VALUES ($1, TRUE, $2)
               RETURNING id"#,
        )
        .bind(node.collection_type.as_str())
        .bind(node.elements.len() as i32)
        .fetch_one(&mut *conn)
        .await
        .map_err(storage_error)?;

        for (index, element) in node.elements.iter().enumerate() {
            let (hda_id, ldda_id, child_id) = match &element.target {
                NewElementTarget::Hda(id) => (Some(*id), None, None),
                NewElementTarget::CopyHda(id) => {
                    let history_id = history_id.ok_or_else(|| {
                        CollectionError::InvalidInput(
                            "datasets can only be copied into a history".to_string(),
                        )
                    })?;
                    (Some(copy_hda(&mut *conn, *id, history_id).await?), None, None)
                }
                NewElementTarget::Ldda(id) => (None, Some(*id), None),
                NewElementTarget::Collection(id) => (None, None, Some(*id)),
                NewElementTarget::NewCollection(child) => {
                    let child_id = insert_collection(&mut *conn, child, history_id).await?;
                    (None, None, Some(child_id))
                }
            };

            sqlx::query(
                r#"INSERT INTO dataset_collection_element
                       (dataset_collection_id, element_index, element_identifier,
                        hda_id, ldda_id, child_collection_id)
                   VALUES ($1, $2, $3, $4, $5, $6)"#,
            )
            .bind(collection_id)
            .bind(index as i32)
            .bind(&element.identifier)
            .bind(hda_id)
            .bind(ldda_id)
            .bind(child_id)
            .execute(&mut *conn)
            .await
            .map_err(storage_error)?;
        }

        Ok(collection_id)
    })
}

#[async_trait]
impl ElementStore for PgCollectionStore {
    async fn collection_exists(&self, collection_id: Key) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS (SELECT 1 FROM dataset_collection WHERE id = $1)"#,
        )
        .bind(collection_id)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)
    }

    async fn list_elements(
        &self,
        collection_id: Key,
        window: Window,
    ) -> Result<Vec<DatasetCollectionElement>> {
        let rows = sqlx::query_as::<_, PgElementRow>(ELEMENT_SELECT)
            .bind(collection_id)
            .bind(window.sql_limit())
            .bind(window.sql_offset())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.into_iter()
            .map(DatasetCollectionElement::try_from)
            .collect()
    }
}

#[async_trait]
impl CollectionStore for PgCollectionStore {
    async fn load_history(&self, id: Key) -> Result<Option<History>> {
        let row = sqlx::query_as::<_, (i64, String, bool)>(
            r#"SELECT id, name, deleted FROM history WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.map(|(id, name, deleted)| History { id, name, deleted }))
    }

    async fn load_library_folder(&self, id: Key) -> Result<Option<LibraryFolder>> {
        let row = sqlx::query_as::<_, (i64, i64, String)>(
            r#"SELECT id, library_id, name FROM library_folder WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.map(|(id, library_id, name)| LibraryFolder {
            id,
            library_id,
            name,
        }))
    }

    async fn load_dataset(&self, kind: DatasetKind, id: Key) -> Result<Option<Dataset>> {
        let sql = match kind {
            DatasetKind::Hda => {
                r#"SELECT id, history_id, NULL::BIGINT AS folder_id, hid, name, state,
                          extension, visible, deleted, uuid, tags
                   FROM history_dataset_association WHERE id = $1"#
            }
            DatasetKind::Ldda => {
                r#"SELECT id, NULL::BIGINT AS history_id, folder_id, NULL::INTEGER AS hid,
                          name, state, extension, visible, deleted, uuid,
                          ARRAY[]::TEXT[] AS tags
                   FROM library_dataset_dataset_association WHERE id = $1"#
            }
        };

        let row = sqlx::query_as::<_, PgDatasetRow>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.map(|r| r.into_dataset(kind)))
    }

    async fn load_instance(
        &self,
        kind: ParentKind,
        id: Key,
    ) -> Result<Option<CollectionInstance>> {
        let sql = match kind {
            ParentKind::History => HISTORY_INSTANCE_SELECT,
            ParentKind::Library => LIBRARY_INSTANCE_SELECT,
        };
        let row = sqlx::query_as::<_, PgInstanceRow>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.map(|r| r.into_instance(kind)).transpose()
    }

    async fn create_instance(
        &self,
        parent: &Parent,
        name: Option<&str>,
        collection: &NewCollection,
        hide: &[Key],
    ) -> Result<CollectionInstance> {
        let history_id = match parent {
            Parent::History(history) => Some(history.id),
            Parent::Library(_) => None,
        };

        // Dropping `tx` on any early return rolls everything back.
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let collection_id = insert_collection(&mut tx, collection, history_id).await?;
        hide_hdas(&mut tx, hide).await?;

        let instance_id = match parent {
            Parent::History(history) => {
                let hid = next_hid(&mut tx, history.id).await?;
                sqlx::query_scalar::<_, i64>(
                    r#"INSERT INTO history_dataset_collection_association
                           (history_id, collection_id, name, hid)
                       VALUES ($1, $2, $3, $4)
                       RETURNING id"#,
                )
                .bind(history.id)
                .bind(collection_id)
                .bind(name)
                .bind(hid)
                .fetch_one(&mut *tx)
                .await
                .map_err(storage_error)?
            }
            Parent::Library(folder) => sqlx::query_scalar::<_, i64>(
                r#"INSERT INTO library_dataset_collection_association
                       (folder_id, collection_id, name)
                   VALUES ($1, $2, $3)
                   RETURNING id"#,
            )
            .bind(folder.id)
            .bind(collection_id)
            .bind(name)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_error)?,
        };

        let sql = match parent.kind() {
            ParentKind::History => HISTORY_INSTANCE_SELECT,
            ParentKind::Library => LIBRARY_INSTANCE_SELECT,
        };
        let row = sqlx::query_as::<_, PgInstanceRow>(sql)
            .bind(instance_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        row.into_instance(parent.kind())
    }
}
