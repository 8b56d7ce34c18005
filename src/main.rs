//! ID intake server.

use anyhow::Context;
use axum::http::HeaderValue;
use id_intake::api::{self, AppState};
use id_intake::config::{CorsOrigins, Settings};
use id_intake::image_store::ImageStore;
use id_intake::processor::LlmAnalyzer;
use id_intake::store::DocumentStore;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "id_intake=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    info!("Starting in {:?} mode", settings.env);

    let documents = match settings.documents_snapshot_path() {
        Some(path) => DocumentStore::open(path.clone())
            .with_context(|| format!("Failed to open document store at {}", path.display()))?,
        None => {
            warn!("PERSIST_DOCUMENTS is off; documents are kept in memory only");
            DocumentStore::new()
        }
    };

    let images = ImageStore::new(settings.images_dir(), settings.public_base_url.clone());
    let analyzer = LlmAnalyzer::new(&settings.llm);
    info!(
        "Vision models: classification={:?} extraction={:?}",
        settings.llm.classification_models, settings.llm.extraction_models
    );

    let state = AppState {
        documents,
        images,
        analyzer: Arc::new(analyzer),
        max_upload_bytes: settings.max_upload_bytes,
    };

    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&settings.cors_origins));

    let listener = settings.listen().await?;
    info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    match origins {
        CorsOrigins::Any => CorsLayer::permissive(),
        CorsOrigins::List(list) => {
            let origins: Vec<HeaderValue> = list
                .iter()
                .filter_map(|o| match HeaderValue::from_str(o) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin: {}", o);
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}
