mod error;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::*;
use crate::state::{create_default_config, load_config, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "docvault.toml")]
    config: PathBuf,
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if !args.config.exists() {
        warn!("config file missing, creating default config");
        let _ = create_default_config(&args.config);
    }

    let (_raw, config) = load_config(&args.config)?;
    let state = Arc::new(AppState::from_config(config)?);

    let protected_routes = Router::new()
        .route("/auth/logout", post(logout))
        .route("/documents", get(list_documents))
        .route("/documents/upload", post(upload_document))
        .route("/documents/:id", delete(delete_document).patch(rename_document))
        .route("/ingestion/trigger", post(trigger_ingestion))
        .route("/ingestion", get(list_ingestions))
        .route("/ingestion/:id", get(get_ingestion).delete(cancel_ingestion))
        .route("/ingestion/:id/status", patch(update_ingestion_status))
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user).patch(update_user))
        .route("/users/:id/role", patch(update_user_role))
        .layer(middleware::from_fn_with_state(state.clone(), bearer_auth));

    let app = Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .nest("/api", protected_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("docvault-server listening on {}", args.listen);
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
