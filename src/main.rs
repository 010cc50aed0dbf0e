use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use tracing::{info, warn};

use kvsession_core::config::{self, StoreConfig};
use kvsession_core::SessionStore;

#[derive(Parser)]
#[command(
    name = "kvsession",
    about = "Session store demo server",
    version = kvsession_core::VERSION,
)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,
    /// HTTP port
    #[arg(short, long, default_value_t = 3000)]
    port: u16,
    /// Config file (defaults to KVSESSION_CONFIG / environment)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Shared state for the demo routes.
pub struct AppState {
    pub store: SessionStore,
    pub session_name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kvsession=info".parse()?)
                .add_directive("kvsession_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::read_config(path)?,
        None => config::load_config_from_env(),
    };
    if cfg.key_pairs.is_empty() {
        bail!("no key pairs configured; set KVSESSION_HASH_KEY or keyPairs in the config file");
    }

    let state = Arc::new(build_state(&cfg).await?);
    let addr = format!("{}:{}", cli.bind, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.store.close().await;
    Ok(())
}

async fn build_state(cfg: &StoreConfig) -> Result<AppState> {
    let store = SessionStore::connect(cfg).await?;
    Ok(AppState {
        store,
        session_name: cfg.session_name.clone(),
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

/// Create the axum Router with the demo routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_visit))
        .route("/logout", post(handle_logout))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// GET / — count visits in the session
async fn handle_visit(State(state): State<Arc<AppState>>, mut request: Request) -> Response {
    let shared = state.store.get(&mut request, &state.session_name).await;
    let mut session = shared.lock().await;

    let visits = session.get_as::<u64>("visits").unwrap_or(0) + 1;
    if let Err(e) = session.insert("visits", visits) {
        return internal_error(e);
    }

    let mut headers = HeaderMap::new();
    match state.store.save(&mut headers, &mut session).await {
        Ok(()) => (
            headers,
            Json(serde_json::json!({
                "visits": visits,
                "new": session.is_new,
            })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /logout — delete the session record and expire the cookie
async fn handle_logout(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let mut session = state
        .store
        .new_session(request.headers(), &state.session_name)
        .await;

    let mut headers = HeaderMap::new();
    match state.store.destroy(&mut headers, &mut session).await {
        Ok(()) => (headers, StatusCode::NO_CONTENT).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /health — Health check
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": kvsession_core::VERSION,
    }))
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    warn!("Session error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::header::{COOKIE, SET_COOKIE};
    use kvsession_core::config::KeyPairConfig;
    use tower::ServiceExt;

    async fn test_state() -> Arc<AppState> {
        let cfg = StoreConfig {
            key_pairs: vec![KeyPairConfig {
                hash_key: "000102030405060708090a0b0c0d0e0f".to_string(),
                block_key: None,
            }],
            ..StoreConfig::default()
        };
        Arc::new(build_state(&cfg).await.unwrap())
    }

    async fn visit(router: Router, cookie: Option<&str>) -> (serde_json::Value, Option<String>) {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        let response = router
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (serde_json::from_slice(&body).unwrap(), set_cookie)
    }

    #[tokio::test]
    async fn test_visits_are_counted() {
        let state = test_state().await;

        let (body, cookie) = visit(create_router(state.clone()), None).await;
        assert_eq!(body["visits"], 1);
        assert_eq!(body["new"], true);
        let cookie = cookie.unwrap();

        let (body, _) = visit(create_router(state.clone()), Some(&cookie)).await;
        assert_eq!(body["visits"], 2);
        assert_eq!(body["new"], false);
    }

    #[tokio::test]
    async fn test_logout_resets_counter() {
        let state = test_state().await;
        let (_, cookie) = visit(create_router(state.clone()), None).await;
        let cookie = cookie.unwrap();

        let response = create_router(state.clone())
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/logout")
                    .header(COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let (body, _) = visit(create_router(state), Some(&cookie)).await;
        assert_eq!(body["visits"], 1);
    }
}
