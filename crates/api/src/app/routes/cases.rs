use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Utc;

use looma_auth::codes;
use looma_core::{StateCode, UserId};
use looma_infra::store::{CaseUpdate, NewCase, NewSubject};

use crate::app::dto::{self, required_text, optional_text};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::{authorize_case, decode, ensure_case_access, require_permission};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_case))
        .route("/select", get(select_cases))
        .route("/by-number/:number", get(get_case_by_number))
        .route("/:id", get(get_case).patch(update_case))
        .route("/:id/users", get(list_case_users).post(assign_case_user))
        .route("/:id/users/:user_id", delete(unassign_case_user))
}

pub async fn create_case(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateCaseRequest>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::CASES_CREATE).await?;

    let state = StateCode::parse(&body.state_code)?;
    let subject = NewSubject {
        first_name: required_text("subject.first_name", &body.subject.first_name)?,
        last_name: required_text("subject.last_name", &body.subject.last_name)?,
        middle_name: optional_text(body.subject.middle_name),
        nicknames: optional_text(body.subject.nicknames),
    };

    let case = services
        .store
        .create_case(NewCase {
            subject,
            state,
            date_intake: body.date_intake,
            opened_on: body.date_intake.unwrap_or_else(|| Utc::now().date_naive()),
            created_by: principal.user_id(),
        })
        .await?;

    tracing::info!(
        case_id = %case.id,
        case_number = %case.case_number,
        created_by = %principal.user_id(),
        "case created"
    );

    Ok((StatusCode::CREATED, Json(dto::case_to_response(&services, case)?)).into_response())
}

/// Active cases the caller can see, for pickers.
pub async fn select_cases(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    let all_cases = services
        .store
        .user_has_permission(principal.user_id(), &codes::ALL_CASES)
        .await?;
    let cases = services
        .store
        .list_visible_cases(principal.user_id(), all_cases)
        .await?;

    let items = cases
        .into_iter()
        .map(|c| dto::case_to_select_item(&services, c))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items).into_response())
}

pub async fn get_case_by_number(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(number): Path<String>,
) -> Result<Response, ApiError> {
    let case = services
        .store
        .get_case_by_number(number.trim())
        .await?
        .ok_or(ApiError::NotFound)?;
    ensure_case_access(&services, &principal, case.id).await?;

    Ok(Json(dto::case_to_response(&services, case)?).into_response())
}

pub async fn get_case(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let case_id = authorize_case(&services, &principal, &id).await?;
    let case = services
        .store
        .get_case(case_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(dto::case_to_response(&services, case)?).into_response())
}

pub async fn update_case(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateCaseRequest>,
) -> Result<Response, ApiError> {
    let case_id = authorize_case(&services, &principal, &id).await?;
    let case = services
        .store
        .update_case(
            case_id,
            CaseUpdate {
                inactive: body.inactive,
                date_intake: body.date_intake,
            },
        )
        .await?
        .ok_or(ApiError::NotFound)?;

    tracing::info!(case_id = %case.id, inactive = case.inactive, "case updated");
    Ok(Json(dto::case_to_response(&services, case)?).into_response())
}

/// Users who pass the access predicate for the case.
pub async fn list_case_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let case_id = authorize_case(&services, &principal, &id).await?;

    let mut users = Vec::new();
    for user_id in services.store.users_with_case_access(case_id).await? {
        if let Some(user) = services.store.get_user(user_id).await? {
            users.push(dto::user_to_response(&services, user)?);
        }
    }
    Ok(Json(users).into_response())
}

pub async fn assign_case_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AssignUserRequest>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::CASES_ASSIGN).await?;
    let case_id = authorize_case(&services, &principal, &id).await?;

    let user_id: UserId = decode(&services, &body.user_id)?;
    services
        .store
        .get_user(user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    services.store.assign_user_to_case(user_id, case_id).await?;

    tracing::info!(case_id = %case_id, user_id = %user_id, "user assigned to case");
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn unassign_case_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, user_token)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::CASES_ASSIGN).await?;
    let case_id = authorize_case(&services, &principal, &id).await?;

    let user_id: UserId = decode(&services, &user_token)?;
    if !services.store.unassign_user_from_case(user_id, case_id).await? {
        return Err(ApiError::NotFound);
    }

    tracing::info!(case_id = %case_id, user_id = %user_id, "user unassigned from case");
    Ok(StatusCode::NO_CONTENT.into_response())
}
