//! Router setup and the authentication gate.

use crate::cache::AssetCache;
use crate::config::{CorsConfig, SharedConfig};
use crate::credentials::CredentialStore;
use crate::dispatch::Dispatcher;
use crate::error::RelayError;
use crate::handlers;
use crate::notif_log::NotificationLog;
use crate::properties::PropertyStore;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::Engine;
use std::net::SocketAddr;
use std::path::Path;
use tower_http::cors::{self, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Everything the request handlers need, constructed once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub config: SharedConfig,
    pub credentials: CredentialStore,
    pub properties: PropertyStore,
    pub notif_log: NotificationLog,
    pub cache: AssetCache,
    pub dispatcher: Dispatcher,
}

pub fn build_router(state: AppState, www_dir: &Path) -> Router {
    let cors_cfg = state.config.snapshot().server.cors;

    let mut router = Router::new()
        .route("/send", post(handlers::send::send_notification))
        .route(
            "/int/getProperties",
            get(handlers::properties::get_properties),
        )
        .route("/int/setProperty", post(handlers::properties::set_property))
        // the dashboard's static entry page and assets
        .fallback_service(ServeDir::new(www_dir))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    if cors_cfg.enabled {
        router = router.layer(cors_layer(&cors_cfg));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .with_state(state)
}

fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::HEAD])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if cfg.allow_origin == "*" {
        return layer.allow_origin(cors::Any);
    }

    match cfg.allow_origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(
                "Invalid cors.allow_origin '{}', falling back to any origin",
                cfg.allow_origin
            );
            layer.allow_origin(cors::Any)
        }
    }
}

/// Authentication gate applied to every route: whitelisted IPs pass
/// through untouched, everyone else needs valid basic auth or receives
/// a challenge.
async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let server_cfg = state.config.snapshot().server;

    if !server_cfg.require_authentication {
        return next.run(request).await;
    }

    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string());

    if let Some(ip) = &client_ip {
        if server_cfg.ip_whitelist.iter().any(|allowed| allowed == ip) {
            return next.run(request).await;
        }
    }

    if has_valid_basic_auth(&state.credentials, request.headers()) {
        next.run(request).await
    } else {
        RelayError::Unauthorized.into_response()
    }
}

fn has_valid_basic_auth(credentials: &CredentialStore, headers: &HeaderMap) -> bool {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(text) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((username, password)) = text.split_once(':') else {
        return false;
    };

    credentials.verify(username, password)
}
