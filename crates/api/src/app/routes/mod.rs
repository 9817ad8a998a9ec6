use axum::{
    Router,
    routing::{get, post},
};

pub mod admin;
pub mod cases;
pub mod persons;
pub mod system;
pub mod tasks;
pub mod teams;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/permissions/check", post(system::check_permissions))
        .nest("/cases", cases::router().merge(tasks::router()))
        .nest("/teams", teams::router())
        .nest("/persons", persons::router())
        .nest("/admin", admin::router())
}
