//! User, role, and permission administration.
//!
//! Every route requires `ADMIN`. Role grants take effect on the next request
//! since permissions are evaluated per request against the store.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};

use looma_auth::{RoleCode, codes};
use looma_core::{PermissionId, RoleId, UserId};
use looma_infra::store::{NewRole, NewUser};

use crate::app::dto::{self, optional_text, required_text};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::{decode, require_permission};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id/roles", post(assign_role))
        .route("/users/:id/roles/:role_id", delete(unassign_role))
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:id/permissions", post(grant_permission))
        .route("/roles/:id/permissions/:permission_id", delete(revoke_permission))
        .route("/permissions", get(list_permissions))
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::ADMIN).await?;

    let users = services
        .store
        .list_users()
        .await?
        .into_iter()
        .map(|u| dto::user_to_response(&services, u))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(users).into_response())
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateUserRequest>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::ADMIN).await?;

    let email = required_text("email", &body.email)?;
    if !email.contains('@') {
        return Err(ApiError::bad_request("email must contain '@'"));
    }
    let user = services
        .store
        .create_user(NewUser {
            first_name: required_text("first_name", &body.first_name)?,
            last_name: required_text("last_name", &body.last_name)?,
            email,
            is_active: body.is_active,
        })
        .await?;

    tracing::info!(user_id = %user.id, created_by = %principal.user_id(), "user created");
    Ok((StatusCode::CREATED, Json(dto::user_to_response(&services, user)?)).into_response())
}

pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AssignRoleRequest>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::ADMIN).await?;
    let user_id: UserId = decode(&services, &id)?;
    let role_id: RoleId = decode(&services, &body.role_id)?;

    services.store.assign_role(user_id, role_id).await?;

    tracing::info!(user_id = %user_id, role_id = %role_id, "role assigned");
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn unassign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, role_token)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::ADMIN).await?;
    let user_id: UserId = decode(&services, &id)?;
    let role_id: RoleId = decode(&services, &role_token)?;

    if !services.store.unassign_role(user_id, role_id).await? {
        return Err(ApiError::NotFound);
    }

    tracing::info!(user_id = %user_id, role_id = %role_id, "role unassigned");
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::ADMIN).await?;

    let roles = services
        .store
        .list_roles()
        .await?
        .into_iter()
        .map(|r| dto::role_to_response(&services, r))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(roles).into_response())
}

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateRoleRequest>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::ADMIN).await?;

    let code = RoleCode::parse(&body.code).map_err(ApiError::BadRequest)?;
    let role = services
        .store
        .create_role(NewRole {
            name: required_text("name", &body.name)?,
            code,
            description: optional_text(body.description),
        })
        .await?;

    tracing::info!(role_id = %role.id, code = %role.code, "role created");
    Ok((StatusCode::CREATED, Json(dto::role_to_response(&services, role)?)).into_response())
}

pub async fn grant_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::GrantPermissionRequest>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::ADMIN).await?;
    let role_id: RoleId = decode(&services, &id)?;
    let permission_id: PermissionId = decode(&services, &body.permission_id)?;

    services.store.grant_permission(role_id, permission_id).await?;

    tracing::info!(role_id = %role_id, permission_id = %permission_id, "permission granted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn revoke_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, permission_token)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::ADMIN).await?;
    let role_id: RoleId = decode(&services, &id)?;
    let permission_id: PermissionId = decode(&services, &permission_token)?;

    if !services.store.revoke_permission(role_id, permission_id).await? {
        return Err(ApiError::NotFound);
    }

    tracing::info!(role_id = %role_id, permission_id = %permission_id, "permission revoked");
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::ADMIN).await?;

    let permissions = services
        .store
        .list_permissions()
        .await?
        .into_iter()
        .map(|p| dto::permission_to_response(&services, p))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(permissions).into_response())
}
