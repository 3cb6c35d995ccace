//! Dataset collections - create, show and paginated contents listing
//!
//! A dataset collection is an ordered tree of datasets (`list`, `paired`,
//! `list:paired`, ...) owned by a history or a library folder.
//!
//! ## Layout
//! - [`model`] / [`payload`] - domain types and the create request
//! - [`store`] - persistence ports; [`memory`] and `database` implement them
//! - [`lister`] - ordered, windowed listing of a collection's children
//! - [`service`] - create / show / contents / index
//! - [`dictify`] / [`codec`] - JSON views and external id encoding
//! - `api` - axum routes (feature `server`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dataset_collections::{
//!     codec::KeyedIdCodec, lister::CollectionContentsLister, memory::MemoryStore,
//!     pagination::Window,
//! };
//!
//! # async fn demo() -> dataset_collections::error::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let codec = Arc::new(KeyedIdCodec::new("secret"));
//! let lister = CollectionContentsLister::new(store, codec);
//! let page = lister.list_contents("0123456789abcdef", Window::new(Some(0), Some(10))?).await?;
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Domain model
pub mod model;
pub mod payload;

// Identifier encoding and JSON views
pub mod codec;
pub mod dictify;

// Persistence ports and backends
pub mod memory;
pub mod pagination;
pub mod store;

#[cfg(feature = "database")]
pub mod database;

// Services
pub mod config;
pub mod lister;
pub mod service;

// REST API (when enabled)
#[cfg(feature = "server")]
pub mod api;

pub use error::{CollectionError, Result};
pub use lister::CollectionContentsLister;
pub use service::DatasetCollectionsService;
