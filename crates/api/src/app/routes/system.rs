use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use looma_auth::{Permission, filter_held_permissions};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    let user = principal.user();
    let person = services.store.person_for_user(user.id).await?;

    Ok(Json(serde_json::json!({
        "id": services.encode(user.id)?,
        "first_name": user.first_name,
        "last_name": user.last_name,
        "email": user.email,
        "person_id": person.map(|p| services.encode(p.id)).transpose()?,
    }))
    .into_response())
}

/// The subset of the requested codes the caller holds, in request order.
pub async fn check_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(codes): Json<Vec<Permission>>,
) -> Result<Response, ApiError> {
    let held = filter_held_permissions(&*services.store, principal.user_id(), &codes).await?;
    Ok(Json(held).into_response())
}
