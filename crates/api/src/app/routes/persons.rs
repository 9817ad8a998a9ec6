use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use looma_auth::codes;
use looma_core::UserId;
use looma_infra::store::NewPerson;

use crate::app::dto::{self, optional_text, required_text};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::{decode, require_permission};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/", get(list_persons).post(create_person))
}

pub async fn list_persons(
    Extension(services): Extension<Arc<AppServices>>,
) -> Result<Response, ApiError> {
    let persons = services
        .store
        .list_persons()
        .await?
        .into_iter()
        .map(|p| dto::person_to_response(&services, p))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(persons).into_response())
}

pub async fn create_person(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreatePersonRequest>,
) -> Result<Response, ApiError> {
    require_permission(&services, &principal, &codes::PERSONS_MODIFY).await?;

    let app_user_id = match body.app_user_id.as_deref() {
        Some(token) => {
            let user_id: UserId = decode(&services, token)?;
            services
                .store
                .get_user(user_id)
                .await?
                .ok_or(ApiError::NotFound)?;
            Some(user_id)
        }
        None => None,
    };

    let person = services
        .store
        .create_person(NewPerson {
            first_name: required_text("first_name", &body.first_name)?,
            last_name: required_text("last_name", &body.last_name)?,
            phone: optional_text(body.phone),
            email: optional_text(body.email),
            app_user_id,
        })
        .await?;

    tracing::info!(person_id = %person.id, linked = app_user_id.is_some(), "person created");
    Ok((StatusCode::CREATED, Json(dto::person_to_response(&services, person)?)).into_response())
}
