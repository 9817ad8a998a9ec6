use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use looma_auth::{Permission, RoleCode, codes, permissions};
use looma_core::{
    CaseId, CaseNumber, ModelKey, PermissionId, PersonId, RoleId, SubjectId, TaskId, TeamId, UserId,
};

use super::model::*;
use super::{Store, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct RoleRow {
    name: String,
    code: RoleCode,
    description: Option<String>,
}

#[derive(Debug, Clone)]
struct CaseRow {
    subject_id: SubjectId,
    case_number: CaseNumber,
    inactive: bool,
    date_intake: Option<chrono::NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TeamRow {
    name: String,
    inactive: bool,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,

    users: BTreeMap<UserId, UserRecord>,
    roles: BTreeMap<RoleId, RoleRow>,
    permissions: BTreeMap<PermissionId, PermissionRecord>,
    user_roles: BTreeSet<(UserId, RoleId)>,
    role_permissions: BTreeSet<(RoleId, PermissionId)>,

    subjects: BTreeMap<SubjectId, SubjectRecord>,
    cases: BTreeMap<CaseId, CaseRow>,
    persons: BTreeMap<PersonId, PersonRecord>,
    teams: BTreeMap<TeamId, TeamRow>,
    person_teams: BTreeSet<(PersonId, TeamId)>,
    team_cases: BTreeSet<(TeamId, CaseId)>,
    user_cases: BTreeSet<(UserId, CaseId)>,
    tasks: BTreeMap<TaskId, TaskRecord>,
}

impl State {
    /// Keys are unique across tables, which makes cross-model mixups visible in tests.
    fn next<K: ModelKey>(&mut self) -> K {
        self.next_id += 1;
        K::from_raw(self.next_id)
    }

    fn codes_held(&self, user: UserId) -> BTreeSet<&Permission> {
        let roles: BTreeSet<RoleId> = self
            .user_roles
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, r)| *r)
            .collect();
        self.role_permissions
            .iter()
            .filter(|(r, _)| roles.contains(r))
            .filter_map(|(_, p)| self.permissions.get(p).map(|rec| &rec.code))
            .collect()
    }

    fn team_path(&self, user: UserId, case: CaseId) -> bool {
        self.persons
            .values()
            .filter(|p| p.app_user_id == Some(user))
            .any(|p| {
                self.person_teams
                    .iter()
                    .filter(|(person, _)| *person == p.id)
                    .any(|(_, team)| self.team_cases.contains(&(*team, case)))
            })
    }

    fn role(&self, id: RoleId) -> Option<RoleRecord> {
        let row = self.roles.get(&id)?;
        let mut permissions: Vec<Permission> = self
            .role_permissions
            .iter()
            .filter(|(r, _)| *r == id)
            .filter_map(|(_, p)| self.permissions.get(p).map(|rec| rec.code.clone()))
            .collect();
        permissions.sort();
        Some(RoleRecord {
            id,
            name: row.name.clone(),
            code: row.code.clone(),
            description: row.description.clone(),
            permissions,
        })
    }

    fn team(&self, id: TeamId) -> Option<TeamRecord> {
        let row = self.teams.get(&id)?;
        Some(TeamRecord {
            id,
            name: row.name.clone(),
            inactive: row.inactive,
            members: self
                .person_teams
                .iter()
                .filter(|(_, t)| *t == id)
                .map(|(p, _)| *p)
                .collect(),
            cases: self
                .team_cases
                .iter()
                .filter(|(t, _)| *t == id)
                .map(|(_, c)| *c)
                .collect(),
        })
    }

    fn case(&self, id: CaseId) -> Option<CaseRecord> {
        let row = self.cases.get(&id)?;
        let subject = self.subjects.get(&row.subject_id)?.clone();
        Some(CaseRecord {
            id,
            case_number: row.case_number.clone(),
            inactive: row.inactive,
            date_intake: row.date_intake,
            created_at: row.created_at,
            updated_at: row.updated_at,
            subject,
        })
    }

    fn require_user(&self, id: UserId) -> StoreResult<()> {
        self.users
            .contains_key(&id)
            .then_some(())
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    fn require_case(&self, id: CaseId) -> StoreResult<()> {
        self.cases
            .contains_key(&id)
            .then_some(())
            .ok_or_else(|| StoreError::NotFound(format!("case {id}")))
    }

    fn require_team(&self, id: TeamId) -> StoreResult<()> {
        self.teams
            .contains_key(&id)
            .then_some(())
            .ok_or_else(|| StoreError::NotFound(format!("team {id}")))
    }
}

/// In-memory store for tests and local development.
///
/// Seeded with the permission catalog on construction.
#[derive(Debug)]
pub struct InMemoryStore {
    inner: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let mut state = State::default();
        let mut by_code: BTreeMap<Permission, PermissionId> = BTreeMap::new();
        for def in permissions::catalog() {
            let id: PermissionId = state.next();
            let parent = def.parent.filter(|p| by_code.contains_key(p));
            by_code.insert(def.code.clone(), id);
            state.permissions.insert(
                id,
                PermissionRecord {
                    id,
                    code: def.code,
                    name: def.name.to_string(),
                    description: Some(def.description.to_string()),
                    parent,
                },
            );
        }
        Self {
            inner: RwLock::new(state),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_user(&self, new: NewUser) -> StoreResult<UserRecord> {
        let mut s = self.write()?;
        let email = new.email.trim().to_lowercase();
        if s.users.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict(format!("email '{email}' already registered")));
        }
        let id = s.next();
        let user = UserRecord {
            id,
            first_name: new.first_name,
            last_name: new.last_name,
            email,
            is_active: new.is_active,
            created_at: Utc::now(),
        };
        s.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        Ok(self.read()?.users.values().cloned().collect())
    }

    async fn create_role(&self, new: NewRole) -> StoreResult<RoleRecord> {
        let mut s = self.write()?;
        if s.roles.values().any(|r| r.code == new.code || r.name == new.name) {
            return Err(StoreError::Conflict(format!("role '{}' already exists", new.code)));
        }
        let id = s.next();
        s.roles.insert(
            id,
            RoleRow {
                name: new.name,
                code: new.code,
                description: new.description,
            },
        );
        s.role(id)
            .ok_or_else(|| StoreError::Backend("role vanished after insert".to_string()))
    }

    async fn list_roles(&self) -> StoreResult<Vec<RoleRecord>> {
        let s = self.read()?;
        Ok(s.roles.keys().filter_map(|id| s.role(*id)).collect())
    }

    async fn list_permissions(&self) -> StoreResult<Vec<PermissionRecord>> {
        Ok(self.read()?.permissions.values().cloned().collect())
    }

    async fn permission_by_code(&self, code: &Permission) -> StoreResult<Option<PermissionRecord>> {
        Ok(self
            .read()?
            .permissions
            .values()
            .find(|p| &p.code == code)
            .cloned())
    }

    async fn grant_permission(&self, role: RoleId, permission: PermissionId) -> StoreResult<()> {
        let mut s = self.write()?;
        if !s.roles.contains_key(&role) {
            return Err(StoreError::NotFound(format!("role {role}")));
        }
        if !s.permissions.contains_key(&permission) {
            return Err(StoreError::NotFound(format!("permission {permission}")));
        }
        s.role_permissions.insert((role, permission));
        Ok(())
    }

    async fn revoke_permission(&self, role: RoleId, permission: PermissionId) -> StoreResult<bool> {
        Ok(self.write()?.role_permissions.remove(&(role, permission)))
    }

    async fn assign_role(&self, user: UserId, role: RoleId) -> StoreResult<()> {
        let mut s = self.write()?;
        s.require_user(user)?;
        if !s.roles.contains_key(&role) {
            return Err(StoreError::NotFound(format!("role {role}")));
        }
        s.user_roles.insert((user, role));
        Ok(())
    }

    async fn unassign_role(&self, user: UserId, role: RoleId) -> StoreResult<bool> {
        Ok(self.write()?.user_roles.remove(&(user, role)))
    }

    async fn user_has_permission(&self, user: UserId, code: &Permission) -> StoreResult<bool> {
        Ok(self.read()?.codes_held(user).contains(code))
    }

    async fn held_permissions(
        &self,
        user: UserId,
        requested: &[Permission],
    ) -> StoreResult<HashSet<Permission>> {
        let s = self.read()?;
        let held = s.codes_held(user);
        Ok(requested
            .iter()
            .filter(|p| held.contains(p))
            .cloned()
            .collect())
    }

    async fn has_direct_assignment(&self, user: UserId, case: CaseId) -> StoreResult<bool> {
        Ok(self.read()?.user_cases.contains(&(user, case)))
    }

    async fn has_team_path(&self, user: UserId, case: CaseId) -> StoreResult<bool> {
        Ok(self.read()?.team_path(user, case))
    }

    async fn users_with_case_access(&self, case: CaseId) -> StoreResult<Vec<UserId>> {
        let s = self.read()?;
        let mut ids: BTreeSet<UserId> = s
            .user_cases
            .iter()
            .filter(|(_, c)| *c == case)
            .map(|(u, _)| *u)
            .collect();

        let teams: BTreeSet<TeamId> = s
            .team_cases
            .iter()
            .filter(|(_, c)| *c == case)
            .map(|(t, _)| *t)
            .collect();
        ids.extend(
            s.person_teams
                .iter()
                .filter(|(_, t)| teams.contains(t))
                .filter_map(|(p, _)| s.persons.get(p).and_then(|p| p.app_user_id)),
        );

        ids.extend(
            s.user_roles
                .iter()
                .map(|(u, _)| *u)
                .filter(|u| s.codes_held(*u).contains(&codes::ALL_CASES)),
        );
        Ok(ids.into_iter().collect())
    }

    async fn list_visible_cases(&self, user: UserId, all_cases: bool) -> StoreResult<Vec<CaseRecord>> {
        let s = self.read()?;
        let mut out: Vec<CaseRecord> = s
            .cases
            .iter()
            .filter(|(_, row)| !row.inactive)
            .filter(|(id, _)| {
                all_cases || s.user_cases.contains(&(user, **id)) || s.team_path(user, **id)
            })
            .filter_map(|(id, _)| s.case(*id))
            .collect();
        out.sort_by(|a, b| {
            (&a.subject.last_name, &a.subject.first_name, a.id)
                .cmp(&(&b.subject.last_name, &b.subject.first_name, b.id))
        });
        Ok(out)
    }

    async fn create_person(&self, new: NewPerson) -> StoreResult<PersonRecord> {
        let mut s = self.write()?;
        if let Some(user) = new.app_user_id {
            s.require_user(user)?;
            if s.persons.values().any(|p| p.app_user_id == Some(user)) {
                return Err(StoreError::Conflict(format!("user {user} already has a person")));
            }
        }
        let id = s.next();
        let person = PersonRecord {
            id,
            first_name: new.first_name,
            last_name: new.last_name,
            phone: new.phone,
            email: new.email,
            app_user_id: new.app_user_id,
        };
        s.persons.insert(id, person.clone());
        Ok(person)
    }

    async fn get_person(&self, id: PersonId) -> StoreResult<Option<PersonRecord>> {
        Ok(self.read()?.persons.get(&id).cloned())
    }

    async fn list_persons(&self) -> StoreResult<Vec<PersonRecord>> {
        let mut out: Vec<PersonRecord> = self.read()?.persons.values().cloned().collect();
        out.sort_by(|a, b| (&a.last_name, &a.first_name, a.id).cmp(&(&b.last_name, &b.first_name, b.id)));
        Ok(out)
    }

    async fn person_for_user(&self, user: UserId) -> StoreResult<Option<PersonRecord>> {
        Ok(self
            .read()?
            .persons
            .values()
            .find(|p| p.app_user_id == Some(user))
            .cloned())
    }

    async fn create_team(&self, name: String) -> StoreResult<TeamRecord> {
        let mut s = self.write()?;
        if s.teams.values().any(|t| t.name == name) {
            return Err(StoreError::Conflict(format!("team '{name}' already exists")));
        }
        let id = s.next();
        s.teams.insert(id, TeamRow { name, inactive: false });
        s.team(id)
            .ok_or_else(|| StoreError::Backend("team vanished after insert".to_string()))
    }

    async fn update_team(&self, id: TeamId, update: TeamUpdate) -> StoreResult<Option<TeamRecord>> {
        let mut s = self.write()?;
        if let Some(name) = &update.name {
            if s.teams.iter().any(|(other, t)| *other != id && &t.name == name) {
                return Err(StoreError::Conflict(format!("team '{name}' already exists")));
            }
        }
        let Some(row) = s.teams.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            row.name = name;
        }
        if let Some(inactive) = update.inactive {
            row.inactive = inactive;
        }
        Ok(s.team(id))
    }

    async fn get_team(&self, id: TeamId) -> StoreResult<Option<TeamRecord>> {
        Ok(self.read()?.team(id))
    }

    async fn list_teams(&self) -> StoreResult<Vec<TeamRecord>> {
        let s = self.read()?;
        let mut out: Vec<TeamRecord> = s.teams.keys().filter_map(|id| s.team(*id)).collect();
        out.sort_by(|a, b| (&a.name, a.id).cmp(&(&b.name, b.id)));
        Ok(out)
    }

    async fn add_team_member(&self, team: TeamId, person: PersonId) -> StoreResult<()> {
        let mut s = self.write()?;
        s.require_team(team)?;
        if !s.persons.contains_key(&person) {
            return Err(StoreError::NotFound(format!("person {person}")));
        }
        s.person_teams.insert((person, team));
        Ok(())
    }

    async fn remove_team_member(&self, team: TeamId, person: PersonId) -> StoreResult<bool> {
        Ok(self.write()?.person_teams.remove(&(person, team)))
    }

    async fn assign_team_case(&self, team: TeamId, case: CaseId) -> StoreResult<()> {
        let mut s = self.write()?;
        s.require_team(team)?;
        s.require_case(case)?;
        s.team_cases.insert((team, case));
        Ok(())
    }

    async fn unassign_team_case(&self, team: TeamId, case: CaseId) -> StoreResult<bool> {
        Ok(self.write()?.team_cases.remove(&(team, case)))
    }

    async fn create_case(&self, new: NewCase) -> StoreResult<CaseRecord> {
        let mut s = self.write()?;
        s.require_user(new.created_by)?;

        let prefix = CaseNumber::year_prefix(new.opened_on);
        let existing = s
            .cases
            .values()
            .filter(|c| c.case_number.as_str().starts_with(&prefix))
            .count() as i64;
        let case_number = CaseNumber::next(&new.state, new.opened_on, existing);
        if s.cases.values().any(|c| c.case_number == case_number) {
            return Err(StoreError::Conflict(format!("case number {case_number} already taken")));
        }

        let subject_id = s.next();
        s.subjects.insert(
            subject_id,
            SubjectRecord {
                id: subject_id,
                first_name: new.subject.first_name,
                last_name: new.subject.last_name,
                middle_name: new.subject.middle_name,
                nicknames: new.subject.nicknames,
            },
        );

        let id = s.next();
        let now = Utc::now();
        s.cases.insert(
            id,
            CaseRow {
                subject_id,
                case_number,
                inactive: false,
                date_intake: new.date_intake,
                created_at: now,
                updated_at: now,
            },
        );
        s.user_cases.insert((new.created_by, id));
        s.case(id)
            .ok_or_else(|| StoreError::Backend("case vanished after insert".to_string()))
    }

    async fn get_case(&self, id: CaseId) -> StoreResult<Option<CaseRecord>> {
        Ok(self.read()?.case(id))
    }

    async fn get_case_by_number(&self, number: &str) -> StoreResult<Option<CaseRecord>> {
        let s = self.read()?;
        Ok(s.cases
            .iter()
            .find(|(_, row)| row.case_number.as_str() == number)
            .and_then(|(id, _)| s.case(*id)))
    }

    async fn update_case(&self, id: CaseId, update: CaseUpdate) -> StoreResult<Option<CaseRecord>> {
        let mut s = self.write()?;
        let Some(row) = s.cases.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(inactive) = update.inactive {
            row.inactive = inactive;
        }
        if let Some(date) = update.date_intake {
            row.date_intake = Some(date);
        }
        row.updated_at = Utc::now();
        Ok(s.case(id))
    }

    async fn assign_user_to_case(&self, user: UserId, case: CaseId) -> StoreResult<()> {
        let mut s = self.write()?;
        s.require_user(user)?;
        s.require_case(case)?;
        s.user_cases.insert((user, case));
        Ok(())
    }

    async fn unassign_user_from_case(&self, user: UserId, case: CaseId) -> StoreResult<bool> {
        Ok(self.write()?.user_cases.remove(&(user, case)))
    }

    async fn create_task(&self, new: NewTask) -> StoreResult<TaskRecord> {
        let mut s = self.write()?;
        s.require_case(new.case_id)?;
        if !s.persons.contains_key(&new.assigned_by) {
            return Err(StoreError::NotFound(format!("person {}", new.assigned_by)));
        }
        let id = s.next();
        let task = TaskRecord {
            id,
            case_id: new.case_id,
            assigned_by: new.assigned_by,
            title: new.title,
            description: new.description,
            response: None,
            ready_for_review: false,
            completed: false,
        };
        s.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn list_tasks(&self, case: CaseId, filter: &TaskFilter) -> StoreResult<Vec<TaskRecord>> {
        let mut out: Vec<TaskRecord> = self
            .read()?
            .tasks
            .values()
            .filter(|t| t.case_id == case && filter.matches(t))
            .cloned()
            .collect();
        out.sort_by_key(|t| (t.completed, t.ready_for_review, t.id));
        Ok(out)
    }

    async fn get_task(&self, case: CaseId, task: TaskId) -> StoreResult<Option<TaskRecord>> {
        Ok(self
            .read()?
            .tasks
            .get(&task)
            .filter(|t| t.case_id == case)
            .cloned())
    }

    async fn update_task(
        &self,
        case: CaseId,
        task: TaskId,
        update: TaskUpdate,
    ) -> StoreResult<Option<TaskRecord>> {
        let mut s = self.write()?;
        let Some(row) = s.tasks.get_mut(&task).filter(|t| t.case_id == case) else {
            return Ok(None);
        };
        if let Some(title) = update.title {
            row.title = title;
        }
        if let Some(description) = update.description {
            row.description = description;
        }
        if let Some(response) = update.response {
            row.response = response;
        }
        if let Some(flag) = update.ready_for_review {
            row.ready_for_review = flag;
        }
        Ok(Some(row.clone()))
    }

    async fn complete_task(&self, case: CaseId, task: TaskId) -> StoreResult<Option<TaskRecord>> {
        let mut s = self.write()?;
        let Some(row) = s.tasks.get_mut(&task).filter(|t| t.case_id == case) else {
            return Ok(None);
        };
        row.completed = true;
        Ok(Some(row.clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use looma_auth::{AccessGrant, can_access_case, case_access_grant};
    use looma_core::StateCode;

    use super::*;

    async fn user(store: &InMemoryStore, email: &str) -> UserId {
        store
            .create_user(NewUser {
                first_name: "Test".into(),
                last_name: "User".into(),
                email: email.into(),
                is_active: true,
            })
            .await
            .unwrap()
            .id
    }

    async fn open_case(store: &InMemoryStore, creator: UserId, last: &str, on: NaiveDate) -> CaseRecord {
        store
            .create_case(NewCase {
                subject: NewSubject {
                    first_name: "Jane".into(),
                    last_name: last.into(),
                    middle_name: None,
                    nicknames: None,
                },
                state: StateCode::parse("ca").unwrap(),
                date_intake: Some(on),
                opened_on: on,
                created_by: creator,
            })
            .await
            .unwrap()
    }

    async fn role_with(store: &InMemoryStore, code: &str, perms: &[Permission]) -> RoleId {
        let role = store
            .create_role(NewRole {
                name: code.into(),
                code: RoleCode::parse(code).unwrap(),
                description: None,
            })
            .await
            .unwrap();
        for p in perms {
            let rec = store.permission_by_code(p).await.unwrap().unwrap();
            store.grant_permission(role.id, rec.id).await.unwrap();
        }
        role.id
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn catalog_is_seeded_with_parents() {
        let store = InMemoryStore::new();
        let all = store.permission_by_code(&codes::ALL_CASES).await.unwrap().unwrap();
        assert_eq!(all.parent, Some(codes::CASES));
        assert_eq!(store.list_permissions().await.unwrap().len(), permissions::catalog().len());
    }

    #[tokio::test]
    async fn case_numbers_count_per_year() {
        let store = InMemoryStore::new();
        let u = user(&store, "a@example.org").await;

        let a = open_case(&store, u, "A", day(2025, 3, 1)).await;
        let b = open_case(&store, u, "B", day(2025, 7, 9)).await;
        let c = open_case(&store, u, "C", day(2026, 1, 2)).await;

        assert_eq!(a.case_number.as_str(), "25-CA-03001");
        assert_eq!(b.case_number.as_str(), "25-CA-07002");
        assert_eq!(c.case_number.as_str(), "26-CA-01001");
        assert!(store.has_direct_assignment(u, a.id).await.unwrap());
    }

    #[tokio::test]
    async fn all_cases_permission_grants_every_case() {
        let store = InMemoryStore::new();
        let owner = user(&store, "owner@example.org").await;
        let viewer = user(&store, "viewer@example.org").await;
        let case = open_case(&store, owner, "Doe", day(2025, 1, 1)).await;
        let src: &dyn Store = &store;

        assert!(!can_access_case(src, viewer, case.id).await.unwrap());

        let role = role_with(&store, "supervisor", &[codes::ALL_CASES]).await;
        store.assign_role(viewer, role).await.unwrap();
        assert_eq!(
            case_access_grant(src, viewer, case.id).await.unwrap(),
            Some(AccessGrant::GlobalPermission)
        );

        // still granted no matter what else changes
        store.assign_user_to_case(viewer, case.id).await.unwrap();
        store.unassign_user_from_case(viewer, case.id).await.unwrap();
        assert!(can_access_case(src, viewer, case.id).await.unwrap());

        store.unassign_role(viewer, role).await.unwrap();
        assert!(!can_access_case(src, viewer, case.id).await.unwrap());
    }

    #[tokio::test]
    async fn parent_permission_is_not_enough() {
        let store = InMemoryStore::new();
        let owner = user(&store, "owner@example.org").await;
        let viewer = user(&store, "viewer@example.org").await;
        let case = open_case(&store, owner, "Doe", day(2025, 1, 1)).await;

        let role = role_with(&store, "case_reader", &[codes::CASES]).await;
        store.assign_role(viewer, role).await.unwrap();
        assert!(!can_access_case(&store as &dyn Store, viewer, case.id).await.unwrap());
    }

    #[tokio::test]
    async fn direct_assignment_flips() {
        let store = InMemoryStore::new();
        let owner = user(&store, "owner@example.org").await;
        let other = user(&store, "other@example.org").await;
        let case = open_case(&store, owner, "Doe", day(2025, 1, 1)).await;
        let src: &dyn Store = &store;

        assert!(!can_access_case(src, other, case.id).await.unwrap());
        store.assign_user_to_case(other, case.id).await.unwrap();
        assert_eq!(
            case_access_grant(src, other, case.id).await.unwrap(),
            Some(AccessGrant::DirectAssignment)
        );
        assert!(store.unassign_user_from_case(other, case.id).await.unwrap());
        assert!(!can_access_case(src, other, case.id).await.unwrap());
    }

    #[tokio::test]
    async fn team_path_requires_both_links() {
        let store = InMemoryStore::new();
        let owner = user(&store, "owner@example.org").await;
        let member = user(&store, "member@example.org").await;
        let case = open_case(&store, owner, "Doe", day(2025, 1, 1)).await;
        let person = store
            .create_person(NewPerson {
                first_name: "M".into(),
                last_name: "Ember".into(),
                phone: None,
                email: None,
                app_user_id: Some(member),
            })
            .await
            .unwrap();
        let team = store.create_team("Search".into()).await.unwrap();
        let src: &dyn Store = &store;

        store.add_team_member(team.id, person.id).await.unwrap();
        assert!(!can_access_case(src, member, case.id).await.unwrap());

        store.assign_team_case(team.id, case.id).await.unwrap();
        assert_eq!(
            case_access_grant(src, member, case.id).await.unwrap(),
            Some(AccessGrant::TeamMembership)
        );

        store.remove_team_member(team.id, person.id).await.unwrap();
        assert!(!can_access_case(src, member, case.id).await.unwrap());

        store.add_team_member(team.id, person.id).await.unwrap();
        store.unassign_team_case(team.id, case.id).await.unwrap();
        assert!(!can_access_case(src, member, case.id).await.unwrap());
    }

    #[tokio::test]
    async fn user_without_person_has_no_team_path() {
        let store = InMemoryStore::new();
        let owner = user(&store, "owner@example.org").await;
        let loner = user(&store, "loner@example.org").await;
        let case = open_case(&store, owner, "Doe", day(2025, 1, 1)).await;
        let team = store.create_team("Ops".into()).await.unwrap();
        store.assign_team_case(team.id, case.id).await.unwrap();

        assert_eq!(store.has_team_path(loner, case.id).await, Ok(false));
    }

    #[tokio::test]
    async fn users_with_access_is_sorted_union() {
        let store = InMemoryStore::new();
        let owner = user(&store, "owner@example.org").await;
        let boss = user(&store, "boss@example.org").await;
        let member = user(&store, "member@example.org").await;
        let _stranger = user(&store, "stranger@example.org").await;
        let case = open_case(&store, owner, "Doe", day(2025, 1, 1)).await;

        let role = role_with(&store, "supervisor", &[codes::ALL_CASES]).await;
        store.assign_role(boss, role).await.unwrap();
        store.assign_user_to_case(boss, case.id).await.unwrap();

        let person = store
            .create_person(NewPerson {
                first_name: "M".into(),
                last_name: "Ember".into(),
                phone: None,
                email: None,
                app_user_id: Some(member),
            })
            .await
            .unwrap();
        let team = store.create_team("Search".into()).await.unwrap();
        store.add_team_member(team.id, person.id).await.unwrap();
        store.assign_team_case(team.id, case.id).await.unwrap();

        let mut expected = vec![owner, boss, member];
        expected.sort();
        assert_eq!(store.users_with_case_access(case.id).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn visible_cases_are_active_and_sorted() {
        let store = InMemoryStore::new();
        let u = user(&store, "u@example.org").await;
        let other = user(&store, "o@example.org").await;
        let zed = open_case(&store, u, "Zed", day(2025, 1, 1)).await;
        let abe = open_case(&store, u, "Abe", day(2025, 1, 2)).await;
        let hidden = open_case(&store, other, "Mid", day(2025, 1, 3)).await;
        let closed = open_case(&store, u, "Bo", day(2025, 1, 4)).await;
        store
            .update_case(closed.id, CaseUpdate { inactive: Some(true), ..Default::default() })
            .await
            .unwrap();

        let mine: Vec<CaseId> = store
            .list_visible_cases(u, false)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(mine, vec![abe.id, zed.id]);

        let all: Vec<CaseId> = store
            .list_visible_cases(u, true)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(all, vec![abe.id, hidden.id, zed.id]);
    }

    #[tokio::test]
    async fn tasks_filter_and_order() {
        let store = InMemoryStore::new();
        let u = user(&store, "u@example.org").await;
        let case = open_case(&store, u, "Doe", day(2025, 1, 1)).await;
        let person = store
            .create_person(NewPerson {
                first_name: "U".into(),
                last_name: "Ser".into(),
                phone: None,
                email: None,
                app_user_id: Some(u),
            })
            .await
            .unwrap();

        let mut ids = Vec::new();
        for (title, description) in [
            ("Call hospital", Some("ER intake")),
            ("Check shelters", None),
            ("Canvass", Some("Near the hospital")),
        ] {
            let t = store
                .create_task(NewTask {
                    case_id: case.id,
                    assigned_by: person.id,
                    title: title.into(),
                    description: description.map(str::to_string),
                })
                .await
                .unwrap();
            ids.push(t.id);
        }
        store.complete_task(case.id, ids[0]).await.unwrap();
        store
            .update_task(
                case.id,
                ids[1],
                TaskUpdate { ready_for_review: Some(true), ..Default::default() },
            )
            .await
            .unwrap();

        let order: Vec<TaskId> = store
            .list_tasks(case.id, &TaskFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(order, vec![ids[2], ids[1], ids[0]]);

        let hospital = store
            .list_tasks(case.id, &TaskFilter { completed: Some(false), q: Some("HOSPITAL".into()) })
            .await
            .unwrap();
        assert_eq!(hospital.len(), 1);
        assert_eq!(hospital[0].id, ids[2]);

        let other_case = open_case(&store, u, "Roe", day(2025, 2, 1)).await;
        assert_eq!(store.get_task(other_case.id, ids[0]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn task_update_distinguishes_unchanged_from_cleared() {
        let store = InMemoryStore::new();
        let u = user(&store, "u@example.org").await;
        let case = open_case(&store, u, "Doe", day(2025, 1, 1)).await;
        let person = store
            .create_person(NewPerson {
                first_name: "U".into(),
                last_name: "Ser".into(),
                phone: None,
                email: None,
                app_user_id: Some(u),
            })
            .await
            .unwrap();
        let task = store
            .create_task(NewTask {
                case_id: case.id,
                assigned_by: person.id,
                title: "Call hospital".into(),
                description: Some("ER intake".into()),
            })
            .await
            .unwrap();

        let kept = store
            .update_task(
                case.id,
                task.id,
                TaskUpdate { response: Some(Some("No record".into())), ..Default::default() },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.description.as_deref(), Some("ER intake"));
        assert_eq!(kept.response.as_deref(), Some("No record"));

        let cleared = store
            .update_task(
                case.id,
                task.id,
                TaskUpdate { description: Some(None), ..Default::default() },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cleared.description, None);
        assert_eq!(cleared.response.as_deref(), Some("No record"));
    }

    #[tokio::test]
    async fn uniqueness_conflicts() {
        let store = InMemoryStore::new();
        let u = user(&store, "dup@example.org").await;
        let err = store
            .create_user(NewUser {
                first_name: "x".into(),
                last_name: "y".into(),
                email: "DUP@example.org".into(),
                is_active: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let new_person = || NewPerson {
            first_name: "p".into(),
            last_name: "q".into(),
            phone: None,
            email: None,
            app_user_id: Some(u),
        };
        store.create_person(new_person()).await.unwrap();
        assert!(matches!(store.create_person(new_person()).await, Err(StoreError::Conflict(_))));
    }
}
