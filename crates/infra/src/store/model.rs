//! Rows exchanged with the store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use looma_auth::{Permission, RoleCode};
use looma_core::{
    CaseId, CaseNumber, PermissionId, PersonId, RoleId, StateCode, SubjectId, TaskId, TeamId, UserId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: String,
    pub code: RoleCode,
    pub description: Option<String>,
    /// Codes carried by the role, sorted.
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub code: RoleCode,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionRecord {
    pub id: PermissionId,
    pub code: Permission,
    pub name: String,
    pub description: Option<String>,
    pub parent: Option<Permission>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonRecord {
    pub id: PersonId,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub app_user_id: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct NewPerson {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub app_user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamRecord {
    pub id: TeamId,
    pub name: String,
    pub inactive: bool,
    pub members: Vec<PersonId>,
    pub cases: Vec<CaseId>,
}

#[derive(Debug, Clone, Default)]
pub struct TeamUpdate {
    pub name: Option<String>,
    pub inactive: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectRecord {
    pub id: SubjectId,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub nicknames: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSubject {
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub nicknames: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseRecord {
    pub id: CaseId,
    pub case_number: CaseNumber,
    pub inactive: bool,
    pub date_intake: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub subject: SubjectRecord,
}

/// Input for opening a case. The store assigns the case number inside the
/// same transaction that inserts the row.
#[derive(Debug, Clone)]
pub struct NewCase {
    pub subject: NewSubject,
    pub state: StateCode,
    pub date_intake: Option<NaiveDate>,
    /// Date the case number is derived from.
    pub opened_on: NaiveDate,
    /// Directly assigned to the new case.
    pub created_by: UserId,
}

#[derive(Debug, Clone, Default)]
pub struct CaseUpdate {
    pub inactive: Option<bool>,
    pub date_intake: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub case_id: CaseId,
    pub assigned_by: PersonId,
    pub title: String,
    pub description: Option<String>,
    pub response: Option<String>,
    pub ready_for_review: bool,
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub case_id: CaseId,
    pub assigned_by: PersonId,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    /// `Some(None)` clears the column.
    pub description: Option<Option<String>>,
    pub response: Option<Option<String>>,
    pub ready_for_review: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub completed: Option<bool>,
    /// Case-insensitive substring over title and description.
    pub q: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &TaskRecord) -> bool {
        if self.completed.is_some_and(|c| c != task.completed) {
            return false;
        }
        match self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            None => true,
            Some(q) => {
                let needle = q.to_lowercase();
                task.title.to_lowercase().contains(&needle)
                    || task
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            }
        }
    }
}
