//! Postgres-backed store.
//!
//! All statements are parameterized and run through the `sqlx` pool. Multi-row
//! writes (opening a case) run in a single transaction.
//!
//! ## Error mapping
//!
//! | SQLx error | Postgres code | `StoreError` |
//! |---|---|---|
//! | unique violation | `23505` | `Conflict` |
//! | foreign key violation | `23503` | `NotFound` |
//! | check / not-null violation | `23514`, `23502` | `Invalid` |
//! | `RowNotFound` | n/a | `NotFound` |
//! | row that fails to decode | n/a | `Backend` |
//! | anything else | n/a | `Backend` |
//!
//! Server text from Postgres is logged, never carried in `Conflict` or
//! `Invalid`, since those messages reach API clients.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::instrument;

use looma_auth::{Permission, RoleCode, codes, permissions};
use looma_core::{
    CaseId, CaseNumber, ModelKey, PermissionId, PersonId, RoleId, TaskId, TeamId, UserId,
};

use crate::config::DatabaseConfig;

use super::model::*;
use super::{Store, StoreError, StoreResult};

const USER_COLUMNS: &str = "id, first_name, last_name, email, is_active, created_at";

const PERSON_COLUMNS: &str = "id, first_name, last_name, phone, email, app_user_id";

const TASK_COLUMNS: &str =
    "id, case_id, assigned_by_id, title, description, response, ready_for_review, completed";

const PERMISSION_SELECT: &str = r#"
    SELECT p.id, p.code, p.name, p.description, parent.code AS parent_code
    FROM permission p
    LEFT JOIN permission parent ON parent.id = p.parent_id
"#;

const ROLE_SELECT: &str = r#"
    SELECT r.id, r.name, r.code, r.description,
           COALESCE(
               (SELECT array_agg(p.code ORDER BY p.code)
                FROM role_permission rp
                JOIN permission p ON p.id = rp.permission_id
                WHERE rp.role_id = r.id),
               '{}'
           ) AS permissions
    FROM role r
"#;

const TEAM_SELECT: &str = r#"
    SELECT t.id, t.name, t.inactive,
           COALESCE(
               (SELECT array_agg(pt.person_id ORDER BY pt.person_id)
                FROM person_team pt WHERE pt.team_id = t.id),
               '{}'
           ) AS members,
           COALESCE(
               (SELECT array_agg(tc.case_id ORDER BY tc.case_id)
                FROM team_case tc WHERE tc.team_id = t.id),
               '{}'
           ) AS cases
    FROM team t
"#;

const CASE_SELECT: &str = r#"
    SELECT c.id, c.case_number, c.inactive, c.date_intake, c.created_at, c.updated_at,
           s.id AS subject_id, s.first_name, s.last_name, s.middle_name, s.nicknames
    FROM "case" c
    JOIN subject s ON s.id = c.subject_id
"#;

/// Direct assignment clause, `$1` = user, bound against `c.id`.
const DIRECT_CLAUSE: &str =
    "EXISTS (SELECT 1 FROM app_user_case uc WHERE uc.app_user_id = $1 AND uc.case_id = c.id)";

/// Team clause, `$1` = user, bound against `c.id`.
const TEAM_CLAUSE: &str = r#"EXISTS (
    SELECT 1 FROM person p
    JOIN person_team pt ON pt.person_id = p.id
    JOIN team_case tc ON tc.team_id = pt.team_id
    WHERE p.app_user_id = $1 AND tc.case_id = c.id)"#;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, apply migrations and make sure the permission catalog exists.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;

        let store = Self::new(pool);
        store.seed_permissions().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Upsert the permission catalog. Existing rows keep their ids.
    #[instrument(skip(self), err)]
    pub async fn seed_permissions(&self) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("seed_permissions", e))?;

        for def in permissions::catalog() {
            sqlx::query(
                r#"
                INSERT INTO permission (code, name, description, parent_id)
                VALUES ($1, $2, $3, (SELECT id FROM permission WHERE code = $4))
                ON CONFLICT (code) DO UPDATE
                    SET name = EXCLUDED.name,
                        description = EXCLUDED.description,
                        parent_id = EXCLUDED.parent_id
                "#,
            )
            .bind(def.code.as_str())
            .bind(def.name)
            .bind(def.description)
            .bind(def.parent.as_ref().map(Permission::as_str))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("seed_permissions", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("seed_permissions", e))
    }

    async fn exists(&self, op: &str, sql: &str, a: i64, b: i64) -> StoreResult<bool> {
        let row = sqlx::query(sql)
            .bind(a)
            .bind(b)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        get(&row, 0, op)
    }

    async fn link(&self, op: &str, sql: &str, a: i64, b: i64) -> StoreResult<()> {
        sqlx::query(sql)
            .bind(a)
            .bind(b)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        Ok(())
    }

    async fn unlink(&self, op: &str, sql: &str, a: i64, b: i64) -> StoreResult<bool> {
        let done = sqlx::query(sql)
            .bind(a)
            .bind(b)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        Ok(done.rows_affected() > 0)
    }
}

#[async_trait]
impl Store for PostgresStore {
    #[instrument(skip(self, new), err)]
    async fn create_user(&self, new: NewUser) -> StoreResult<UserRecord> {
        let sql = format!(
            "INSERT INTO app_user (first_name, last_name, email, is_active) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(new.email.trim().to_lowercase())
            .bind(new.is_active)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_user", e))?;
        user_from_row(&row)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM app_user WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM app_user ORDER BY id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
        rows.iter().map(user_from_row).collect()
    }

    #[instrument(skip(self, new), fields(code = %new.code), err)]
    async fn create_role(&self, new: NewRole) -> StoreResult<RoleRecord> {
        let row = sqlx::query(
            "INSERT INTO role (name, code, description) VALUES ($1, $2, $3) \
             RETURNING id, name, code, description, '{}'::text[] AS permissions",
        )
        .bind(&new.name)
        .bind(new.code.as_str())
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_role", e))?;
        role_from_row(&row)
    }

    async fn list_roles(&self) -> StoreResult<Vec<RoleRecord>> {
        let sql = format!("{ROLE_SELECT} ORDER BY r.name");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;
        rows.iter().map(role_from_row).collect()
    }

    async fn list_permissions(&self) -> StoreResult<Vec<PermissionRecord>> {
        let sql = format!("{PERMISSION_SELECT} ORDER BY p.id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_permissions", e))?;
        rows.iter().map(permission_from_row).collect()
    }

    async fn permission_by_code(&self, code: &Permission) -> StoreResult<Option<PermissionRecord>> {
        let sql = format!("{PERMISSION_SELECT} WHERE p.code = $1");
        sqlx::query(&sql)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("permission_by_code", e))?
            .map(|row| permission_from_row(&row))
            .transpose()
    }

    async fn grant_permission(&self, role: RoleId, permission: PermissionId) -> StoreResult<()> {
        self.link(
            "grant_permission",
            "INSERT INTO role_permission (role_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            role.get(),
            permission.get(),
        )
        .await
    }

    async fn revoke_permission(&self, role: RoleId, permission: PermissionId) -> StoreResult<bool> {
        self.unlink(
            "revoke_permission",
            "DELETE FROM role_permission WHERE role_id = $1 AND permission_id = $2",
            role.get(),
            permission.get(),
        )
        .await
    }

    async fn assign_role(&self, user: UserId, role: RoleId) -> StoreResult<()> {
        self.link(
            "assign_role",
            "INSERT INTO app_user_role (app_user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            user.get(),
            role.get(),
        )
        .await
    }

    async fn unassign_role(&self, user: UserId, role: RoleId) -> StoreResult<bool> {
        self.unlink(
            "unassign_role",
            "DELETE FROM app_user_role WHERE app_user_id = $1 AND role_id = $2",
            user.get(),
            role.get(),
        )
        .await
    }

    async fn user_has_permission(&self, user: UserId, code: &Permission) -> StoreResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM app_user_role ur
                JOIN role_permission rp ON rp.role_id = ur.role_id
                JOIN permission p ON p.id = rp.permission_id
                WHERE ur.app_user_id = $1 AND p.code = $2
            )
            "#,
        )
        .bind(user.get())
        .bind(code.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("user_has_permission", e))?;
        get(&row, 0, "user_has_permission")
    }

    async fn held_permissions(
        &self,
        user: UserId,
        requested: &[Permission],
    ) -> StoreResult<HashSet<Permission>> {
        let wanted: Vec<String> = requested.iter().map(|p| p.as_str().to_string()).collect();
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT p.code
            FROM app_user_role ur
            JOIN role_permission rp ON rp.role_id = ur.role_id
            JOIN permission p ON p.id = rp.permission_id
            WHERE ur.app_user_id = $1 AND p.code = ANY($2)
            "#,
        )
        .bind(user.get())
        .bind(wanted)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("held_permissions", e))?;

        rows.iter()
            .map(|row| get::<String>(row, 0, "held_permissions").map(Permission::new))
            .collect()
    }

    async fn has_direct_assignment(&self, user: UserId, case: CaseId) -> StoreResult<bool> {
        self.exists(
            "has_direct_assignment",
            "SELECT EXISTS (SELECT 1 FROM app_user_case WHERE app_user_id = $1 AND case_id = $2)",
            user.get(),
            case.get(),
        )
        .await
    }

    async fn has_team_path(&self, user: UserId, case: CaseId) -> StoreResult<bool> {
        self.exists(
            "has_team_path",
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM person p
                JOIN person_team pt ON pt.person_id = p.id
                JOIN team_case tc ON tc.team_id = pt.team_id
                WHERE p.app_user_id = $1 AND tc.case_id = $2
            )
            "#,
            user.get(),
            case.get(),
        )
        .await
    }

    async fn users_with_case_access(&self, case: CaseId) -> StoreResult<Vec<UserId>> {
        let rows = sqlx::query(
            r#"
            SELECT uc.app_user_id FROM app_user_case uc WHERE uc.case_id = $1
            UNION
            SELECT p.app_user_id
            FROM person p
            JOIN person_team pt ON pt.person_id = p.id
            JOIN team_case tc ON tc.team_id = pt.team_id
            WHERE tc.case_id = $1 AND p.app_user_id IS NOT NULL
            UNION
            SELECT ur.app_user_id
            FROM app_user_role ur
            JOIN role_permission rp ON rp.role_id = ur.role_id
            JOIN permission perm ON perm.id = rp.permission_id
            WHERE perm.code = $2
            ORDER BY 1
            "#,
        )
        .bind(case.get())
        .bind(codes::ALL_CASES.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("users_with_case_access", e))?;

        rows.iter().map(|row| key(row, 0, "users_with_case_access")).collect()
    }

    async fn list_visible_cases(&self, user: UserId, all_cases: bool) -> StoreResult<Vec<CaseRecord>> {
        let sql = format!(
            "{CASE_SELECT} WHERE NOT c.inactive AND ($2 OR {DIRECT_CLAUSE} OR {TEAM_CLAUSE}) \
             ORDER BY s.last_name, s.first_name, c.id"
        );
        let rows = sqlx::query(&sql)
            .bind(user.get())
            .bind(all_cases)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_visible_cases", e))?;
        rows.iter().map(case_from_row).collect()
    }

    #[instrument(skip(self, new), err)]
    async fn create_person(&self, new: NewPerson) -> StoreResult<PersonRecord> {
        let sql = format!(
            "INSERT INTO person (first_name, last_name, phone, email, app_user_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PERSON_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.phone)
            .bind(&new.email)
            .bind(new.app_user_id.map(|u| u.get()))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_person", e))?;
        person_from_row(&row)
    }

    async fn get_person(&self, id: PersonId) -> StoreResult<Option<PersonRecord>> {
        let sql = format!("SELECT {PERSON_COLUMNS} FROM person WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_person", e))?
            .map(|row| person_from_row(&row))
            .transpose()
    }

    async fn list_persons(&self) -> StoreResult<Vec<PersonRecord>> {
        let sql = format!("SELECT {PERSON_COLUMNS} FROM person ORDER BY last_name, first_name, id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_persons", e))?;
        rows.iter().map(person_from_row).collect()
    }

    async fn person_for_user(&self, user: UserId) -> StoreResult<Option<PersonRecord>> {
        let sql = format!("SELECT {PERSON_COLUMNS} FROM person WHERE app_user_id = $1");
        sqlx::query(&sql)
            .bind(user.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("person_for_user", e))?
            .map(|row| person_from_row(&row))
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn create_team(&self, name: String) -> StoreResult<TeamRecord> {
        let row = sqlx::query("INSERT INTO team (name) VALUES ($1) RETURNING id")
            .bind(&name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_team", e))?;
        let id: TeamId = key(&row, 0, "create_team")?;
        Ok(TeamRecord {
            id,
            name,
            inactive: false,
            members: Vec::new(),
            cases: Vec::new(),
        })
    }

    async fn update_team(&self, id: TeamId, update: TeamUpdate) -> StoreResult<Option<TeamRecord>> {
        let updated = sqlx::query(
            "UPDATE team SET name = COALESCE($2, name), inactive = COALESCE($3, inactive) \
             WHERE id = $1 RETURNING id",
        )
        .bind(id.get())
        .bind(&update.name)
        .bind(update.inactive)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_team", e))?;

        match updated {
            Some(_) => self.get_team(id).await,
            None => Ok(None),
        }
    }

    async fn get_team(&self, id: TeamId) -> StoreResult<Option<TeamRecord>> {
        let sql = format!("{TEAM_SELECT} WHERE t.id = $1");
        sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_team", e))?
            .map(|row| team_from_row(&row))
            .transpose()
    }

    async fn list_teams(&self) -> StoreResult<Vec<TeamRecord>> {
        let sql = format!("{TEAM_SELECT} ORDER BY t.name, t.id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_teams", e))?;
        rows.iter().map(team_from_row).collect()
    }

    async fn add_team_member(&self, team: TeamId, person: PersonId) -> StoreResult<()> {
        self.link(
            "add_team_member",
            "INSERT INTO person_team (team_id, person_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            team.get(),
            person.get(),
        )
        .await
    }

    async fn remove_team_member(&self, team: TeamId, person: PersonId) -> StoreResult<bool> {
        self.unlink(
            "remove_team_member",
            "DELETE FROM person_team WHERE team_id = $1 AND person_id = $2",
            team.get(),
            person.get(),
        )
        .await
    }

    async fn assign_team_case(&self, team: TeamId, case: CaseId) -> StoreResult<()> {
        self.link(
            "assign_team_case",
            "INSERT INTO team_case (team_id, case_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            team.get(),
            case.get(),
        )
        .await
    }

    async fn unassign_team_case(&self, team: TeamId, case: CaseId) -> StoreResult<bool> {
        self.unlink(
            "unassign_team_case",
            "DELETE FROM team_case WHERE team_id = $1 AND case_id = $2",
            team.get(),
            case.get(),
        )
        .await
    }

    #[instrument(skip(self, new), fields(state = new.state.as_str(), created_by = %new.created_by), err)]
    async fn create_case(&self, new: NewCase) -> StoreResult<CaseRecord> {
        let op = "create_case";
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error(op, e))?;

        // Serializes number allocation between concurrent writers.
        sqlx::query(r#"LOCK TABLE "case" IN SHARE ROW EXCLUSIVE MODE"#)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;

        let prefix = CaseNumber::year_prefix(new.opened_on);
        let row = sqlx::query(r#"SELECT COUNT(*) FROM "case" WHERE case_number LIKE $1"#)
            .bind(format!("{prefix}%"))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        let existing: i64 = get(&row, 0, op)?;
        let case_number = CaseNumber::next(&new.state, new.opened_on, existing);

        let row = sqlx::query(
            "INSERT INTO subject (first_name, last_name, middle_name, nicknames) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&new.subject.first_name)
        .bind(&new.subject.last_name)
        .bind(&new.subject.middle_name)
        .bind(&new.subject.nicknames)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;
        let subject_id: i64 = get(&row, 0, op)?;

        let row = sqlx::query(
            r#"INSERT INTO "case" (subject_id, case_number, date_intake) VALUES ($1, $2, $3) RETURNING id"#,
        )
        .bind(subject_id)
        .bind(case_number.as_str())
        .bind(new.date_intake)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;
        let id: CaseId = key(&row, 0, op)?;

        sqlx::query("INSERT INTO app_user_case (app_user_id, case_id) VALUES ($1, $2)")
            .bind(new.created_by.get())
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;

        tx.commit().await.map_err(|e| map_sqlx_error(op, e))?;

        self.get_case(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("case {id}")))
    }

    async fn get_case(&self, id: CaseId) -> StoreResult<Option<CaseRecord>> {
        let sql = format!("{CASE_SELECT} WHERE c.id = $1");
        sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_case", e))?
            .map(|row| case_from_row(&row))
            .transpose()
    }

    async fn get_case_by_number(&self, number: &str) -> StoreResult<Option<CaseRecord>> {
        let sql = format!("{CASE_SELECT} WHERE c.case_number = $1");
        sqlx::query(&sql)
            .bind(number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_case_by_number", e))?
            .map(|row| case_from_row(&row))
            .transpose()
    }

    async fn update_case(&self, id: CaseId, update: CaseUpdate) -> StoreResult<Option<CaseRecord>> {
        let updated = sqlx::query(
            r#"UPDATE "case"
               SET inactive = COALESCE($2, inactive),
                   date_intake = COALESCE($3, date_intake),
                   updated_at = now()
               WHERE id = $1
               RETURNING id"#,
        )
        .bind(id.get())
        .bind(update.inactive)
        .bind(update.date_intake)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_case", e))?;

        match updated {
            Some(_) => self.get_case(id).await,
            None => Ok(None),
        }
    }

    async fn assign_user_to_case(&self, user: UserId, case: CaseId) -> StoreResult<()> {
        self.link(
            "assign_user_to_case",
            "INSERT INTO app_user_case (app_user_id, case_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            user.get(),
            case.get(),
        )
        .await
    }

    async fn unassign_user_from_case(&self, user: UserId, case: CaseId) -> StoreResult<bool> {
        self.unlink(
            "unassign_user_from_case",
            "DELETE FROM app_user_case WHERE app_user_id = $1 AND case_id = $2",
            user.get(),
            case.get(),
        )
        .await
    }

    #[instrument(skip(self, new), fields(case_id = %new.case_id), err)]
    async fn create_task(&self, new: NewTask) -> StoreResult<TaskRecord> {
        let sql = format!(
            "INSERT INTO task (case_id, assigned_by_id, title, description) \
             VALUES ($1, $2, $3, $4) RETURNING {TASK_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(new.case_id.get())
            .bind(new.assigned_by.get())
            .bind(&new.title)
            .bind(&new.description)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_task", e))?;
        task_from_row(&row)
    }

    async fn list_tasks(&self, case: CaseId, filter: &TaskFilter) -> StoreResult<Vec<TaskRecord>> {
        let pattern = filter
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));

        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM task \
             WHERE case_id = $1 \
               AND ($2::boolean IS NULL OR completed = $2) \
               AND ($3::text IS NULL OR title ILIKE $3 OR description ILIKE $3) \
             ORDER BY completed, ready_for_review, id"
        );
        let rows = sqlx::query(&sql)
            .bind(case.get())
            .bind(filter.completed)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_tasks", e))?;
        rows.iter().map(task_from_row).collect()
    }

    async fn get_task(&self, case: CaseId, task: TaskId) -> StoreResult<Option<TaskRecord>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM task WHERE case_id = $1 AND id = $2");
        sqlx::query(&sql)
            .bind(case.get())
            .bind(task.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_task", e))?
            .map(|row| task_from_row(&row))
            .transpose()
    }

    async fn update_task(
        &self,
        case: CaseId,
        task: TaskId,
        update: TaskUpdate,
    ) -> StoreResult<Option<TaskRecord>> {
        let sql = format!(
            "UPDATE task SET \
                 title = COALESCE($3, title), \
                 description = CASE WHEN $4 THEN $5 ELSE description END, \
                 response = CASE WHEN $6 THEN $7 ELSE response END, \
                 ready_for_review = COALESCE($8, ready_for_review) \
             WHERE case_id = $1 AND id = $2 \
             RETURNING {TASK_COLUMNS}"
        );
        sqlx::query(&sql)
            .bind(case.get())
            .bind(task.get())
            .bind(&update.title)
            .bind(update.description.is_some())
            .bind(update.description.flatten())
            .bind(update.response.is_some())
            .bind(update.response.flatten())
            .bind(update.ready_for_review)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_task", e))?
            .map(|row| task_from_row(&row))
            .transpose()
    }

    async fn complete_task(&self, case: CaseId, task: TaskId) -> StoreResult<Option<TaskRecord>> {
        let sql = format!(
            "UPDATE task SET completed = TRUE WHERE case_id = $1 AND id = $2 RETURNING {TASK_COLUMNS}"
        );
        sqlx::query(&sql)
            .bind(case.get())
            .bind(task.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("complete_task", e))?
            .map(|row| task_from_row(&row))
            .transpose()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row decoding
// ─────────────────────────────────────────────────────────────────────────────

fn get<'r, T>(row: &'r PgRow, col: impl sqlx::ColumnIndex<PgRow>, op: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(col).map_err(|e| decode_error(op, e))
}

/// Stored data that does not fit the model is a server fault.
fn decode_error(op: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Backend(format!("failed to decode row in {op}: {err}"))
}

fn key<K: ModelKey>(row: &PgRow, col: impl sqlx::ColumnIndex<PgRow>, op: &str) -> StoreResult<K> {
    let raw: i64 = get(row, col, op)?;
    if raw < 0 {
        return Err(decode_error(op, format!("negative {} key", K::NAMESPACE)));
    }
    Ok(K::from_raw(raw))
}

fn keys<K: ModelKey>(raw: Vec<i64>) -> Vec<K> {
    raw.into_iter().filter(|k| *k >= 0).map(K::from_raw).collect()
}

fn user_from_row(row: &PgRow) -> StoreResult<UserRecord> {
    let op = "user_from_row";
    Ok(UserRecord {
        id: key(row, "id", op)?,
        first_name: get(row, "first_name", op)?,
        last_name: get(row, "last_name", op)?,
        email: get(row, "email", op)?,
        is_active: get(row, "is_active", op)?,
        created_at: get(row, "created_at", op)?,
    })
}

fn role_from_row(row: &PgRow) -> StoreResult<RoleRecord> {
    let op = "role_from_row";
    let code: String = get(row, "code", op)?;
    let permissions: Vec<String> = get(row, "permissions", op)?;
    Ok(RoleRecord {
        id: key(row, "id", op)?,
        name: get(row, "name", op)?,
        code: RoleCode::parse(&code).map_err(|e| decode_error(op, e))?,
        description: get(row, "description", op)?,
        permissions: permissions.into_iter().map(Permission::new).collect(),
    })
}

fn permission_from_row(row: &PgRow) -> StoreResult<PermissionRecord> {
    let op = "permission_from_row";
    let code: String = get(row, "code", op)?;
    let parent: Option<String> = get(row, "parent_code", op)?;
    Ok(PermissionRecord {
        id: key(row, "id", op)?,
        code: Permission::new(code),
        name: get(row, "name", op)?,
        description: get(row, "description", op)?,
        parent: parent.map(Permission::new),
    })
}

fn person_from_row(row: &PgRow) -> StoreResult<PersonRecord> {
    let op = "person_from_row";
    let app_user_id: Option<i64> = get(row, "app_user_id", op)?;
    Ok(PersonRecord {
        id: key(row, "id", op)?,
        first_name: get(row, "first_name", op)?,
        last_name: get(row, "last_name", op)?,
        phone: get(row, "phone", op)?,
        email: get(row, "email", op)?,
        app_user_id: app_user_id.filter(|k| *k >= 0).map(UserId::from_raw),
    })
}

fn team_from_row(row: &PgRow) -> StoreResult<TeamRecord> {
    let op = "team_from_row";
    Ok(TeamRecord {
        id: key(row, "id", op)?,
        name: get(row, "name", op)?,
        inactive: get(row, "inactive", op)?,
        members: keys(get(row, "members", op)?),
        cases: keys(get(row, "cases", op)?),
    })
}

fn case_from_row(row: &PgRow) -> StoreResult<CaseRecord> {
    let op = "case_from_row";
    let number: String = get(row, "case_number", op)?;
    Ok(CaseRecord {
        id: key(row, "id", op)?,
        case_number: CaseNumber::from_stored(number),
        inactive: get(row, "inactive", op)?,
        date_intake: get(row, "date_intake", op)?,
        created_at: get(row, "created_at", op)?,
        updated_at: get(row, "updated_at", op)?,
        subject: SubjectRecord {
            id: key(row, "subject_id", op)?,
            first_name: get(row, "first_name", op)?,
            last_name: get(row, "last_name", op)?,
            middle_name: get(row, "middle_name", op)?,
            nicknames: get(row, "nicknames", op)?,
        },
    })
}

fn task_from_row(row: &PgRow) -> StoreResult<TaskRecord> {
    let op = "task_from_row";
    Ok(TaskRecord {
        id: key(row, "id", op)?,
        case_id: key(row, "case_id", op)?,
        assigned_by: key(row, "assigned_by_id", op)?,
        title: get(row, "title", op)?,
        description: get(row, "description", op)?,
        response: get(row, "response", op)?,
        ready_for_review: get(row, "ready_for_review", op)?,
        completed: get(row, "completed", op)?,
    })
}

/// Escape `LIKE` metacharacters (Postgres' default escape is backslash).
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned());
            let mapped = match code.as_deref() {
                Some("23505") => StoreError::Conflict(format!("{operation}: record already exists")),
                Some("23503") => StoreError::NotFound(format!("{operation}: referenced record")),
                Some("23514") | Some("23502") => {
                    StoreError::Invalid(format!("{operation}: value violates a data constraint"))
                }
                _ => {
                    return StoreError::Backend(format!(
                        "database error in {operation}: {}",
                        db_err.message()
                    ));
                }
            };
            tracing::debug!(
                operation,
                code = code.as_deref(),
                constraint = db_err.constraint(),
                message = db_err.message(),
                "constraint violation"
            );
            mapped
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("no row in {operation}")),
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[derive(Debug)]
    struct FakeDbError {
        code: &'static str,
        message: &'static str,
    }

    impl core::fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            f.write_str(self.message)
        }
    }

    impl std::error::Error for FakeDbError {}

    impl sqlx::error::DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.code.into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeDbError {
            code,
            message: "duplicate key value violates unique constraint \"app_user_email_key\"",
        }))
    }

    #[test]
    fn constraint_violations_do_not_carry_server_text() {
        for (code, expected) in [
            ("23505", "conflict"),
            ("23503", "not_found"),
            ("23514", "invalid"),
            ("23502", "invalid"),
        ] {
            let err = map_sqlx_error("create_user", db_error(code));
            let kind = match &err {
                StoreError::Conflict(_) => "conflict",
                StoreError::NotFound(_) => "not_found",
                StoreError::Invalid(_) => "invalid",
                StoreError::Backend(_) => "backend",
            };
            assert_eq!(kind, expected, "{code}");
            assert!(!err.to_string().contains("app_user_email_key"), "{code}: {err}");
        }
    }

    #[test]
    fn other_database_errors_are_backend_faults() {
        let err = map_sqlx_error("create_user", db_error("57P01"));
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn undecodable_rows_are_backend_faults() {
        let err = decode_error("role_from_row", "role code must be 1-50 characters");
        assert!(matches!(err, StoreError::Backend(msg) if msg.contains("role_from_row")));
    }

    #[test]
    fn non_database_errors_map_by_kind() {
        let err = map_sqlx_error("op", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Backend(_)));
        let err = map_sqlx_error("op", sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
