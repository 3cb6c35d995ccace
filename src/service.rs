//! DatasetCollectionsService: create, show and list dataset collections.
//!
//! The service takes its store and codec explicitly. Parents are resolved
//! through the closed [`ParentKind`] enum; there is no string dispatch past
//! payload parsing.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info};

use crate::codec::IdentifierCodec;
use crate::dictify::{dictify_dataset_collection_instance, InstanceView};
use crate::error::{CollectionError, Result};
use crate::lister::CollectionContentsLister;
use crate::model::*;
use crate::pagination::Window;
use crate::payload::{CreateParams, ElementIdentifier, ElementSource};
use crate::store::CollectionStore;

pub struct DatasetCollectionsService {
    store: Arc<dyn CollectionStore>,
    codec: Arc<dyn IdentifierCodec>,
    lister: CollectionContentsLister,
}

/// Per-request switches applied while resolving element identifiers.
///
/// Resolution only reads; copies and hides are carried out by the store
/// together with the insert.
struct ResolveOptions<'a> {
    parent: &'a Parent,
    copy_elements: bool,
}

impl DatasetCollectionsService {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        lister: CollectionContentsLister,
        codec: Arc<dyn IdentifierCodec>,
    ) -> Self {
        Self {
            store,
            codec,
            lister,
        }
    }

    pub fn codec(&self) -> &Arc<dyn IdentifierCodec> {
        &self.codec
    }

    /// Listing every collection is not offered.
    pub fn index(&self) -> Result<Value> {
        Err(CollectionError::NotImplemented(
            "listing dataset collections".to_string(),
        ))
    }

    /// Create a collection instance from a request payload and return its
    /// `element` view.
    pub async fn create(&self, payload: Value) -> Result<Value> {
        let params = CreateParams::from_payload(payload)?;
        let parent = self.resolve_parent(&params).await?;

        let options = ResolveOptions {
            parent: &parent,
            copy_elements: params.copy_elements,
        };
        let tree = self
            .build_collection(&params.collection_type, &params.element_identifiers, &options)
            .await?;

        let hide = if params.hide_source_items {
            tree.hda_sources()
        } else {
            Vec::new()
        };
        let instance = self
            .store
            .create_instance(&parent, params.name.as_deref(), &tree, &hide)
            .await?;
        info!(
            "Created {} collection {} ({} elements) in {} {}",
            instance.collection.collection_type,
            instance.id,
            instance.collection.element_count,
            parent.kind(),
            parent.id()
        );

        self.render_instance(&instance, &parent, InstanceView::Element)
            .await
    }

    /// Render the collection instance `id` owned by a `kind` parent.
    pub async fn show(&self, kind: ParentKind, id: &str, view: InstanceView) -> Result<Value> {
        let decoded = self.codec.decode_id(id)?;
        let instance = self
            .store
            .load_instance(kind, decoded)
            .await?
            .ok_or_else(|| CollectionError::NotFound(format!("{kind} dataset collection {id}")))?;

        let parent = match kind {
            ParentKind::History => self
                .store
                .load_history(instance.parent_id)
                .await?
                .map(Parent::History),
            ParentKind::Library => self
                .store
                .load_library_folder(instance.parent_id)
                .await?
                .map(Parent::Library),
        }
        .ok_or_else(|| CollectionError::NotFound(format!("parent of dataset collection {id}")))?;

        debug!("Showing {} collection {} as {:?}", kind, id, view);
        self.render_instance(&instance, &parent, view).await
    }

    /// Ordered, windowed direct children of collection `id`.
    pub async fn contents(&self, id: &str, window: Window) -> Result<Vec<Value>> {
        self.lister.list_contents(id, window).await
    }

    // ── Parents ──

    async fn resolve_parent(&self, params: &CreateParams) -> Result<Parent> {
        match params.instance_type {
            ParentKind::History => {
                let encoded = params.history_id.as_deref().ok_or_else(|| {
                    CollectionError::RequestParameterMissing("history_id".to_string())
                })?;
                let history = self
                    .store
                    .load_history(self.codec.decode_id(encoded)?)
                    .await?
                    .ok_or_else(|| CollectionError::NotFound(format!("history {encoded}")))?;
                if history.deleted {
                    return Err(CollectionError::InvalidInput(format!(
                        "history {encoded} is deleted"
                    )));
                }
                Ok(Parent::History(history))
            }
            ParentKind::Library => {
                let encoded = params.folder_id.as_deref().ok_or_else(|| {
                    CollectionError::RequestParameterMissing("folder_id".to_string())
                })?;
                let folder = self
                    .store
                    .load_library_folder(self.codec.decode_id(encoded)?)
                    .await?
                    .ok_or_else(|| {
                        CollectionError::NotFound(format!("library folder {encoded}"))
                    })?;
                Ok(Parent::Library(folder))
            }
        }
    }

    // ── Element resolution ──

    fn build_collection<'a>(
        &'a self,
        collection_type: &'a CollectionType,
        identifiers: &'a [ElementIdentifier],
        options: &'a ResolveOptions<'a>,
    ) -> BoxFuture<'a, Result<NewCollection>> {
        Box::pin(async move {
            let ordered = order_identifiers(collection_type, identifiers)?;
            let child_type = collection_type.child_type();

            let mut elements = Vec::with_capacity(ordered.len());
            for identifier in ordered {
                let target = match &child_type {
                    Some(child_type) => {
                        self.resolve_collection_element(child_type, identifier, options)
                            .await?
                    }
                    None => self.resolve_dataset_element(identifier, options).await?,
                };
                elements.push(NewElement {
                    identifier: identifier.name.clone(),
                    target,
                });
            }

            Ok(NewCollection {
                collection_type: collection_type.clone(),
                elements,
            })
        })
    }

    async fn resolve_dataset_element(
        &self,
        identifier: &ElementIdentifier,
        options: &ResolveOptions<'_>,
    ) -> Result<NewElementTarget> {
        let kind = match identifier.src {
            ElementSource::Hda => DatasetKind::Hda,
            ElementSource::Ldda => DatasetKind::Ldda,
            ElementSource::Hdca | ElementSource::NewCollection => {
                return Err(CollectionError::InvalidInput(format!(
                    "element '{}' must be a dataset, not a collection",
                    identifier.name
                )))
            }
        };
        let encoded = element_id(identifier)?;
        let dataset = self
            .store
            .load_dataset(kind, self.codec.decode_id(encoded)?)
            .await?
            .ok_or_else(|| CollectionError::NotFound(format!("{} {encoded}", kind.as_str())))?;

        if kind == DatasetKind::Ldda {
            return Ok(NewElementTarget::Ldda(dataset.id));
        }
        match (options.copy_elements, options.parent) {
            (true, Parent::History(_)) => Ok(NewElementTarget::CopyHda(dataset.id)),
            _ => Ok(NewElementTarget::Hda(dataset.id)),
        }
    }

    async fn resolve_collection_element(
        &self,
        child_type: &CollectionType,
        identifier: &ElementIdentifier,
        options: &ResolveOptions<'_>,
    ) -> Result<NewElementTarget> {
        match identifier.src {
            ElementSource::NewCollection => {
                let declared = identifier.collection_type.as_deref().ok_or_else(|| {
                    CollectionError::RequestParameterMissing(format!(
                        "collection_type of element '{}'",
                        identifier.name
                    ))
                })?;
                let declared: CollectionType = declared.parse()?;
                if &declared != child_type {
                    return Err(type_mismatch(identifier, child_type, &declared));
                }
                let nested = identifier.element_identifiers.as_deref().ok_or_else(|| {
                    CollectionError::RequestParameterMissing(format!(
                        "element_identifiers of element '{}'",
                        identifier.name
                    ))
                })?;
                let tree = self.build_collection(child_type, nested, options).await?;
                Ok(NewElementTarget::NewCollection(tree))
            }
            ElementSource::Hdca => {
                let encoded = element_id(identifier)?;
                let instance = self
                    .store
                    .load_instance(ParentKind::History, self.codec.decode_id(encoded)?)
                    .await?
                    .ok_or_else(|| {
                        CollectionError::NotFound(format!("dataset collection {encoded}"))
                    })?;
                if &instance.collection.collection_type != child_type {
                    return Err(type_mismatch(
                        identifier,
                        child_type,
                        &instance.collection.collection_type,
                    ));
                }
                Ok(NewElementTarget::Collection(instance.collection.id))
            }
            ElementSource::Hda | ElementSource::Ldda => Err(CollectionError::InvalidInput(format!(
                "element '{}' must be a {} collection, not a dataset",
                identifier.name, child_type
            ))),
        }
    }

    // ── Rendering ──

    async fn render_instance(
        &self,
        instance: &CollectionInstance,
        parent: &Parent,
        view: InstanceView,
    ) -> Result<Value> {
        let elements = if view.includes_elements() {
            self.load_tree(instance.collection.id).await?
        } else {
            Vec::new()
        };
        Ok(dictify_dataset_collection_instance(
            instance,
            parent,
            view,
            &elements,
            self.codec.as_ref(),
        ))
    }

    fn load_tree(&self, collection_id: Key) -> BoxFuture<'_, Result<Vec<ElementTree>>> {
        Box::pin(async move {
            let elements = self.store.list_elements(collection_id, Window::all()).await?;
            let mut trees = Vec::with_capacity(elements.len());
            for element in elements {
                let children = match element.child_collection() {
                    Some(child) => self.load_tree(child.id).await?,
                    None => Vec::new(),
                };
                trees.push(ElementTree { element, children });
            }
            Ok(trees)
        })
    }
}

fn element_id(identifier: &ElementIdentifier) -> Result<&str> {
    identifier.id.as_deref().ok_or_else(|| {
        CollectionError::RequestParameterMissing(format!("id of element '{}'", identifier.name))
    })
}

fn type_mismatch(
    identifier: &ElementIdentifier,
    expected: &CollectionType,
    found: &CollectionType,
) -> CollectionError {
    CollectionError::InvalidInput(format!(
        "element '{}' has collection type '{}', expected '{}'",
        identifier.name, found, expected
    ))
}

/// Check identifier names for one rank and return them in storage order.
///
/// A `paired` rank holds exactly `forward` then `reverse`; a `list` keeps the
/// order given.
fn order_identifiers<'a>(
    collection_type: &CollectionType,
    identifiers: &'a [ElementIdentifier],
) -> Result<Vec<&'a ElementIdentifier>> {
    let mut seen = HashSet::new();
    for identifier in identifiers {
        if identifier.name.trim().is_empty() {
            return Err(CollectionError::InvalidInput(
                "element identifiers must have a non-empty name".to_string(),
            ));
        }
        if !seen.insert(identifier.name.as_str()) {
            return Err(CollectionError::InvalidInput(format!(
                "duplicate element identifier '{}'",
                identifier.name
            )));
        }
    }

    if !collection_type.is_paired() {
        return Ok(identifiers.iter().collect());
    }

    let mut ordered = Vec::with_capacity(PAIRED_IDENTIFIERS.len());
    for name in PAIRED_IDENTIFIERS {
        let identifier = identifiers
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| {
                CollectionError::InvalidInput(format!("paired collection is missing '{name}'"))
            })?;
        ordered.push(identifier);
    }
    if identifiers.len() != PAIRED_IDENTIFIERS.len() {
        return Err(CollectionError::InvalidInput(
            "paired collection must contain exactly 'forward' and 'reverse'".to_string(),
        ));
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> ElementIdentifier {
        ElementIdentifier {
            name: name.to_string(),
            src: ElementSource::Hda,
            id: Some("0000000000000000".into()),
            collection_type: None,
            element_identifiers: None,
        }
    }

    #[test]
    fn test_paired_reordered_forward_first() {
        let paired: CollectionType = "paired".parse().unwrap();
        let given = [ident("reverse"), ident("forward")];
        let ordered = order_identifiers(&paired, &given).unwrap();
        let names: Vec<&str> = ordered.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["forward", "reverse"]);
    }

    #[test]
    fn test_paired_rejects_extras_and_gaps() {
        let paired: CollectionType = "paired".parse().unwrap();
        assert!(order_identifiers(&paired, &[ident("forward")]).is_err());
        assert!(
            order_identifiers(&paired, &[ident("forward"), ident("reverse"), ident("other")])
                .is_err()
        );
    }

    #[test]
    fn test_list_keeps_order_and_rejects_duplicates() {
        let list: CollectionType = "list".parse().unwrap();
        let given = [ident("b"), ident("a")];
        let ordered = order_identifiers(&list, &given).unwrap();
        assert_eq!(ordered[0].name, "b");

        let err = order_identifiers(&list, &[ident("a"), ident("a")]).unwrap_err();
        assert!(matches!(err, CollectionError::InvalidInput(_)));
        assert!(order_identifiers(&list, &[ident("  ")]).is_err());
    }
}
