//! HTTP API application wiring.
//!
//! - `services.rs`: shared handler state (store + id codec)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and opaque-id mapping
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use looma_auth::{Hs256Jwt, IdCodec};
use looma_infra::{AppConfig, Store};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(config: &AppConfig, store: Arc<dyn Store>) -> Router {
    let jwt = Arc::new(Hs256Jwt::new(config.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState {
        jwt,
        store: store.clone(),
    };

    let codec = IdCodec::new(config.id_codec_version, &config.id_secret);
    let services = Arc::new(services::AppServices::new(store, codec));

    // Protected routes: require a valid token for an active user.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
