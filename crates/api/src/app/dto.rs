use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use looma_infra::store::{
    CaseRecord, PermissionRecord, PersonRecord, RoleRecord, SubjectRecord, TaskRecord, TeamRecord,
    UserRecord,
};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;

// -------------------------
// Request DTOs
// -------------------------
//
// Every `*_id` field carries an opaque token, never a raw key.

#[derive(Debug, Deserialize)]
pub struct CreateSubjectRequest {
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub nicknames: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCaseRequest {
    /// Two-letter state code the case number is prefixed with.
    pub state_code: String,
    pub date_intake: Option<NaiveDate>,
    pub subject: CreateSubjectRequest,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCaseRequest {
    pub inactive: Option<bool>,
    pub date_intake: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AssignUserRequest {
    pub user_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub completed: Option<bool>,
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub assigned_by_id: Option<String>,
}

/// Blank `description` or `response` clears the field.
#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub response: Option<String>,
    pub ready_for_review: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeamRequest {
    pub name: Option<String>,
    pub inactive: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TeamMemberRequest {
    pub person_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TeamCaseRequest {
    pub case_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePersonRequest {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub app_user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub code: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GrantPermissionRequest {
    pub permission_id: String,
}

/// Trimmed, non-empty text or a 400 naming `field`.
pub fn required_text(field: &str, value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Blank optional text is stored as absent.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub id: String,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub parent: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PersonResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub app_user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub id: String,
    pub name: String,
    pub inactive: bool,
    pub member_ids: Vec<String>,
    pub case_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SubjectResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub nicknames: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CaseResponse {
    pub id: String,
    pub case_number: String,
    pub inactive: bool,
    pub date_intake: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub subject: SubjectResponse,
}

/// Compact row for case pickers.
#[derive(Debug, Serialize)]
pub struct CaseSelectItem {
    pub id: String,
    pub case_number: String,
    pub subject_name: String,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: String,
    pub case_id: String,
    pub assigned_by_id: String,
    pub title: String,
    pub description: Option<String>,
    pub response: Option<String>,
    pub ready_for_review: bool,
    pub completed: bool,
}

pub fn user_to_response(services: &AppServices, user: UserRecord) -> Result<UserResponse, ApiError> {
    Ok(UserResponse {
        id: services.encode(user.id)?,
        first_name: user.first_name,
        last_name: user.last_name,
        email: user.email,
        is_active: user.is_active,
        created_at: user.created_at,
    })
}

pub fn role_to_response(services: &AppServices, role: RoleRecord) -> Result<RoleResponse, ApiError> {
    Ok(RoleResponse {
        id: services.encode(role.id)?,
        name: role.name,
        code: role.code.to_string(),
        description: role.description,
        permissions: role.permissions.iter().map(ToString::to_string).collect(),
    })
}

pub fn permission_to_response(
    services: &AppServices,
    permission: PermissionRecord,
) -> Result<PermissionResponse, ApiError> {
    Ok(PermissionResponse {
        id: services.encode(permission.id)?,
        code: permission.code.to_string(),
        name: permission.name,
        description: permission.description,
        parent: permission.parent.map(|p| p.to_string()),
    })
}

pub fn person_to_response(
    services: &AppServices,
    person: PersonRecord,
) -> Result<PersonResponse, ApiError> {
    Ok(PersonResponse {
        id: services.encode(person.id)?,
        first_name: person.first_name,
        last_name: person.last_name,
        phone: person.phone,
        email: person.email,
        app_user_id: person.app_user_id.map(|u| services.encode(u)).transpose()?,
    })
}

pub fn team_to_response(services: &AppServices, team: TeamRecord) -> Result<TeamResponse, ApiError> {
    Ok(TeamResponse {
        id: services.encode(team.id)?,
        name: team.name,
        inactive: team.inactive,
        member_ids: team
            .members
            .into_iter()
            .map(|p| services.encode(p))
            .collect::<Result<_, _>>()?,
        case_ids: team
            .cases
            .into_iter()
            .map(|c| services.encode(c))
            .collect::<Result<_, _>>()?,
    })
}

fn subject_to_response(
    services: &AppServices,
    subject: SubjectRecord,
) -> Result<SubjectResponse, ApiError> {
    Ok(SubjectResponse {
        id: services.encode(subject.id)?,
        first_name: subject.first_name,
        last_name: subject.last_name,
        middle_name: subject.middle_name,
        nicknames: subject.nicknames,
    })
}

pub fn case_to_response(services: &AppServices, case: CaseRecord) -> Result<CaseResponse, ApiError> {
    Ok(CaseResponse {
        id: services.encode(case.id)?,
        case_number: case.case_number.to_string(),
        inactive: case.inactive,
        date_intake: case.date_intake,
        created_at: case.created_at,
        updated_at: case.updated_at,
        subject: subject_to_response(services, case.subject)?,
    })
}

pub fn case_to_select_item(
    services: &AppServices,
    case: CaseRecord,
) -> Result<CaseSelectItem, ApiError> {
    Ok(CaseSelectItem {
        id: services.encode(case.id)?,
        case_number: case.case_number.to_string(),
        subject_name: format!("{} {}", case.subject.first_name, case.subject.last_name),
    })
}

pub fn task_to_response(services: &AppServices, task: TaskRecord) -> Result<TaskResponse, ApiError> {
    Ok(TaskResponse {
        id: services.encode(task.id)?,
        case_id: services.encode(task.case_id)?,
        assigned_by_id: services.encode(task.assigned_by)?,
        title: task.title,
        description: task.description,
        response: task.response,
        ready_for_review: task.ready_for_review,
        completed: task.completed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_text_trims_and_rejects_blank() {
        assert_eq!(required_text("title", "  Call family ").unwrap(), "Call family");
        assert!(matches!(
            required_text("title", " \t "),
            Err(ApiError::BadRequest(msg)) if msg == "title is required"
        ));
    }

    #[test]
    fn optional_text_drops_blank_values() {
        assert_eq!(optional_text(Some("  ".into())), None);
        assert_eq!(optional_text(Some(" x ".into())), Some("x".into()));
        assert_eq!(optional_text(None), None);
    }
}
