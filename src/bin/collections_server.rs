//! collections_server - REST server for dataset collections.
//!
//! Configuration is read by [`ServerConfig::load`]; see `config.rs` for the
//! variables. Without `DATABASE_URL` (or without the `database` feature) the
//! server runs on an empty in-memory store.
//!
//! ```bash
//! COLLECTIONS_ID_SECRET=change-me cargo run --bin collections_server
//! curl http://localhost:4200/api/dataset_collections/<id>/contents?limit=10
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use dataset_collections::api::create_collection_router;
use dataset_collections::codec::{IdentifierCodec, KeyedIdCodec};
use dataset_collections::config::ServerConfig;
use dataset_collections::memory::MemoryStore;
use dataset_collections::store::{CollectionStore, ElementStore};
use dataset_collections::{CollectionContentsLister, DatasetCollectionsService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dataset_collections=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::load()?;
    let store = open_store(&config).await?;
    let codec: Arc<dyn IdentifierCodec> =
        Arc::new(KeyedIdCodec::new(&config.id_secret_or_ephemeral()));

    let elements: Arc<dyn ElementStore> = store.clone();
    let lister = CollectionContentsLister::new(elements, Arc::clone(&codec));
    let service = Arc::new(DatasetCollectionsService::new(store, lister, codec));

    let app = create_collection_router(service)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    tracing::info!("collections_server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

#[cfg(feature = "database")]
async fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn CollectionStore>> {
    use dataset_collections::database::{DatabaseConfig, DatabaseManager};

    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set; using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let db = DatabaseManager::new(DatabaseConfig::new(url, config.database_pool_size)).await?;
    db.test_connection().await?;
    db.run_migrations().await?;
    tracing::info!("Connected to database");
    Ok(Arc::new(db.collection_store()))
}

#[cfg(not(feature = "database"))]
async fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn CollectionStore>> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL ignored: built without the `database` feature");
    }
    Ok(Arc::new(MemoryStore::new()))
}
