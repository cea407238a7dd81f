use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agora::embed::EmbeddingConfig;
use agora::identity::InMemoryIdentityStore;
use agora::notify::{self, LogNotifier};
use agora::state::AppState;
use agora::{api, embed};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting agora...");

    // Embedding provider for duplicate-comment detection; the service
    // runs without it, comments just skip the similarity check.
    let embed_config = EmbeddingConfig::from_env();
    let embedder: Option<Arc<dyn embed::EmbeddingProvider>> = match embed_config.build_provider() {
        Ok(provider) => {
            tracing::info!("Embedding provider initialized: {}", provider.name());
            Some(Arc::from(provider))
        }
        Err(e) => {
            tracing::warn!(
                "No embedding provider: {}. Duplicate-comment detection disabled.",
                e
            );
            None
        }
    };

    let identity = Arc::new(InMemoryIdentityStore::from_env());
    let state = Arc::new(AppState::with_collaborators(
        identity,
        Arc::new(LogNotifier),
        embedder,
    ));

    // Background task sending one reminder per room when voting opens
    notify::spawn_voting_open_watcher(state.clone());

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(7270u16);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Server error: {}", e);
            }
        }
        Err(e) => tracing::error!("Failed to bind {}: {}", addr, e),
    }
}
