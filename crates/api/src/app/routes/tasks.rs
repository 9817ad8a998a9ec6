//! Tasks: the case-scoped work items. Every route is gated on case access.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use looma_auth::codes;
use looma_core::{PersonId, TaskId};
use looma_infra::store::{NewTask, TaskFilter, TaskUpdate};

use crate::app::dto::{self, required_text, optional_text};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::{authorize_case, decode, require_permission};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/:id/tasks", get(list_tasks).post(create_task))
        .route("/:id/tasks/:task_id", get(get_task).patch(update_task))
        .route("/:id/tasks/:task_id/complete", post(complete_task))
}

pub async fn list_tasks(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::TaskListQuery>,
) -> Result<Response, ApiError> {
    let case_id = authorize_case(&services, &principal, &id).await?;

    let filter = TaskFilter {
        completed: query.completed,
        q: query.q,
    };
    let tasks = services
        .store
        .list_tasks(case_id, &filter)
        .await?
        .into_iter()
        .map(|t| dto::task_to_response(&services, t))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(tasks).into_response())
}

pub async fn create_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CreateTaskRequest>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::TASKS_CREATE).await?;
    let case_id = authorize_case(&services, &principal, &id).await?;

    let title = required_text("title", &body.title)?;
    let assigned_by = match body.assigned_by_id.as_deref() {
        Some(token) => decode::<PersonId>(&services, token)?,
        None => services
            .store
            .person_for_user(principal.user_id())
            .await?
            .map(|p| p.id)
            .ok_or_else(|| {
                ApiError::bad_request("assigned_by_id is required: caller has no person record")
            })?,
    };

    let task = services
        .store
        .create_task(NewTask {
            case_id,
            assigned_by,
            title,
            description: optional_text(body.description),
        })
        .await?;

    tracing::info!(case_id = %case_id, task_id = %task.id, "task created");
    Ok((StatusCode::CREATED, Json(dto::task_to_response(&services, task)?)).into_response())
}

pub async fn get_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, task_token)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let case_id = authorize_case(&services, &principal, &id).await?;
    let task_id: TaskId = decode(&services, &task_token)?;

    let task = services
        .store
        .get_task(case_id, task_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(dto::task_to_response(&services, task)?).into_response())
}

pub async fn update_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, task_token)): Path<(String, String)>,
    Json(body): Json<dto::UpdateTaskRequest>,
) -> Result<Response, ApiError> {
    let case_id = authorize_case(&services, &principal, &id).await?;
    let task_id: TaskId = decode(&services, &task_token)?;

    let update = TaskUpdate {
        title: body
            .title
            .as_deref()
            .map(|t| required_text("title", t))
            .transpose()?,
        description: body.description.map(|d| optional_text(Some(d))),
        response: body.response.map(|r| optional_text(Some(r))),
        ready_for_review: body.ready_for_review,
    };
    let task = services
        .store
        .update_task(case_id, task_id, update)
        .await?
        .ok_or(ApiError::NotFound)?;

    tracing::info!(case_id = %case_id, task_id = %task.id, "task updated");
    Ok(Json(dto::task_to_response(&services, task)?).into_response())
}

pub async fn complete_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, task_token)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::TASKS_COMPLETE).await?;
    let case_id = authorize_case(&services, &principal, &id).await?;
    let task_id: TaskId = decode(&services, &task_token)?;

    let task = services
        .store
        .complete_task(case_id, task_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    tracing::info!(case_id = %case_id, task_id = %task.id, "task completed");
    Ok(Json(dto::task_to_response(&services, task)?).into_response())
}
