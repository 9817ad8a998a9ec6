use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use looma_auth::Permission;
use looma_core::{CaseId, PermissionId, PersonId, RoleId, TaskId, TeamId, UserId};

use super::model::*;

/// Storage operation error.
///
/// Infrastructure failures only; authorization outcomes are never encoded here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid data: {0}")]
    Invalid(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Relational storage for the case-management domain.
///
/// Link operations (`add_*`, `assign_*`, `grant_*`) are idempotent. Unlink
/// operations report whether a link was actually removed.
#[async_trait]
pub trait Store: Send + Sync {
    // ── users & RBAC ────────────────────────────────────────────────────────
    async fn create_user(&self, new: NewUser) -> StoreResult<UserRecord>;
    async fn get_user(&self, id: UserId) -> StoreResult<Option<UserRecord>>;
    async fn list_users(&self) -> StoreResult<Vec<UserRecord>>;

    async fn create_role(&self, new: NewRole) -> StoreResult<RoleRecord>;
    async fn list_roles(&self) -> StoreResult<Vec<RoleRecord>>;
    async fn list_permissions(&self) -> StoreResult<Vec<PermissionRecord>>;
    async fn permission_by_code(&self, code: &Permission) -> StoreResult<Option<PermissionRecord>>;

    async fn grant_permission(&self, role: RoleId, permission: PermissionId) -> StoreResult<()>;
    async fn revoke_permission(&self, role: RoleId, permission: PermissionId) -> StoreResult<bool>;
    async fn assign_role(&self, user: UserId, role: RoleId) -> StoreResult<()>;
    async fn unassign_role(&self, user: UserId, role: RoleId) -> StoreResult<bool>;

    // ── access lookups ──────────────────────────────────────────────────────
    async fn user_has_permission(&self, user: UserId, code: &Permission) -> StoreResult<bool>;
    async fn held_permissions(
        &self,
        user: UserId,
        requested: &[Permission],
    ) -> StoreResult<HashSet<Permission>>;
    async fn has_direct_assignment(&self, user: UserId, case: CaseId) -> StoreResult<bool>;
    async fn has_team_path(&self, user: UserId, case: CaseId) -> StoreResult<bool>;

    /// Users passing the access predicate for `case`, ascending and distinct.
    async fn users_with_case_access(&self, case: CaseId) -> StoreResult<Vec<UserId>>;

    /// Active cases `user` may access, sorted by subject last then first name.
    /// `all_cases` short-circuits the assignment and team clauses.
    async fn list_visible_cases(&self, user: UserId, all_cases: bool) -> StoreResult<Vec<CaseRecord>>;

    // ── persons & teams ─────────────────────────────────────────────────────
    async fn create_person(&self, new: NewPerson) -> StoreResult<PersonRecord>;
    async fn get_person(&self, id: PersonId) -> StoreResult<Option<PersonRecord>>;
    async fn list_persons(&self) -> StoreResult<Vec<PersonRecord>>;
    async fn person_for_user(&self, user: UserId) -> StoreResult<Option<PersonRecord>>;

    async fn create_team(&self, name: String) -> StoreResult<TeamRecord>;
    async fn update_team(&self, id: TeamId, update: TeamUpdate) -> StoreResult<Option<TeamRecord>>;
    async fn get_team(&self, id: TeamId) -> StoreResult<Option<TeamRecord>>;
    async fn list_teams(&self) -> StoreResult<Vec<TeamRecord>>;
    async fn add_team_member(&self, team: TeamId, person: PersonId) -> StoreResult<()>;
    async fn remove_team_member(&self, team: TeamId, person: PersonId) -> StoreResult<bool>;
    async fn assign_team_case(&self, team: TeamId, case: CaseId) -> StoreResult<()>;
    async fn unassign_team_case(&self, team: TeamId, case: CaseId) -> StoreResult<bool>;

    // ── cases ───────────────────────────────────────────────────────────────
    async fn create_case(&self, new: NewCase) -> StoreResult<CaseRecord>;
    async fn get_case(&self, id: CaseId) -> StoreResult<Option<CaseRecord>>;
    async fn get_case_by_number(&self, number: &str) -> StoreResult<Option<CaseRecord>>;
    async fn update_case(&self, id: CaseId, update: CaseUpdate) -> StoreResult<Option<CaseRecord>>;
    async fn assign_user_to_case(&self, user: UserId, case: CaseId) -> StoreResult<()>;
    async fn unassign_user_from_case(&self, user: UserId, case: CaseId) -> StoreResult<bool>;

    // ── tasks ───────────────────────────────────────────────────────────────
    async fn create_task(&self, new: NewTask) -> StoreResult<TaskRecord>;
    /// Ordered by completed, ready_for_review, id.
    async fn list_tasks(&self, case: CaseId, filter: &TaskFilter) -> StoreResult<Vec<TaskRecord>>;
    async fn get_task(&self, case: CaseId, task: TaskId) -> StoreResult<Option<TaskRecord>>;
    async fn update_task(
        &self,
        case: CaseId,
        task: TaskId,
        update: TaskUpdate,
    ) -> StoreResult<Option<TaskRecord>>;
    async fn complete_task(&self, case: CaseId, task: TaskId) -> StoreResult<Option<TaskRecord>>;
}
