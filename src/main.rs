use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use mongodb::Client;

use pocketbank::{
    AppState,
    config::{self, StoreBackend},
    routes,
    services::db_init,
    store::{DocumentStore, MemoryStore, MongoStore},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let settings = config::load();

    let store: Arc<dyn DocumentStore> = match settings.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Mongo => {
            let client = Client::with_uri_str(&settings.mongodb_uri).await?;
            let db = client.database(&settings.mongodb_db);
            db_init::ensure_indexes(&db).await?;
            tracing::info!(db = %settings.mongodb_db, "connected to mongodb");
            Arc::new(MongoStore::new(db))
        }
    };

    let addr = SocketAddr::from((settings.host.parse::<IpAddr>()?, settings.port));
    let app = routes::app(AppState::new(store, settings));

    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
