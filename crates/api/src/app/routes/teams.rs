use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};

use looma_auth::codes;
use looma_core::{PersonId, TeamId};
use looma_infra::store::TeamUpdate;

use crate::app::dto::{self, required_text};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::{authorize_case, decode, require_permission};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_teams).post(create_team))
        .route("/:id", put(update_team))
        .route("/:id/members", post(add_member))
        .route("/:id/members/:person_id", delete(remove_member))
        .route("/:id/cases", post(assign_case))
        .route("/:id/cases/:case_id", delete(unassign_case))
}

pub async fn list_teams(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::TEAMS).await?;

    let teams = services
        .store
        .list_teams()
        .await?
        .into_iter()
        .map(|t| dto::team_to_response(&services, t))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(teams).into_response())
}

pub async fn create_team(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateTeamRequest>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::TEAMS_MODIFY).await?;

    let name = required_text("name", &body.name)?;
    let team = services.store.create_team(name).await?;

    tracing::info!(team_id = %team.id, "team created");
    Ok((StatusCode::CREATED, Json(dto::team_to_response(&services, team)?)).into_response())
}

pub async fn update_team(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateTeamRequest>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::TEAMS_MODIFY).await?;
    let team_id: TeamId = decode(&services, &id)?;

    let update = TeamUpdate {
        name: body
            .name
            .as_deref()
            .map(|n| required_text("name", n))
            .transpose()?,
        inactive: body.inactive,
    };
    let team = services
        .store
        .update_team(team_id, update)
        .await?
        .ok_or(ApiError::NotFound)?;

    tracing::info!(team_id = %team.id, inactive = team.inactive, "team updated");
    Ok(Json(dto::team_to_response(&services, team)?).into_response())
}

pub async fn add_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::TeamMemberRequest>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::TEAMS_MODIFY).await?;
    let team_id: TeamId = decode(&services, &id)?;
    let person_id: PersonId = decode(&services, &body.person_id)?;

    services.store.add_team_member(team_id, person_id).await?;

    tracing::info!(team_id = %team_id, person_id = %person_id, "team member added");
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn remove_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, person_token)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::TEAMS_MODIFY).await?;
    let team_id: TeamId = decode(&services, &id)?;
    let person_id: PersonId = decode(&services, &person_token)?;

    if !services.store.remove_team_member(team_id, person_id).await? {
        return Err(ApiError::NotFound);
    }

    tracing::info!(team_id = %team_id, person_id = %person_id, "team member removed");
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Link a case to a team. The caller must also be able to access the case.
pub async fn assign_case(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::TeamCaseRequest>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::TEAMS_MODIFY).await?;
    let team_id: TeamId = decode(&services, &id)?;
    let case_id = authorize_case(&services, &principal, &body.case_id).await?;

    services.store.assign_team_case(team_id, case_id).await?;

    tracing::info!(team_id = %team_id, case_id = %case_id, "case assigned to team");
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn unassign_case(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, case_token)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::TEAMS_MODIFY).await?;
    let team_id: TeamId = decode(&services, &id)?;
    let case_id = authorize_case(&services, &principal, &case_token).await?;

    if !services.store.unassign_team_case(team_id, case_id).await? {
        return Err(ApiError::NotFound);
    }

    tracing::info!(team_id = %team_id, case_id = %case_id, "case unassigned from team");
    Ok(StatusCode::NO_CONTENT.into_response())
}
