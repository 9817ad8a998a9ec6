use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission code.
///
/// Permissions are referenced by their short dotted code (e.g. `CASES.ALL_CASES`),
/// never by their numeric row id. Codes are compared exactly; a parent code
/// such as `CASES` does not imply its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub const fn from_static(code: &'static str) -> Self {
        Self(Cow::Borrowed(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Well-known permission codes checked by the application.
pub mod codes {
    use super::Permission;

    pub const CASES: Permission = Permission::from_static("CASES");
    /// Blanket visibility over every case.
    pub const ALL_CASES: Permission = Permission::from_static("CASES.ALL_CASES");
    pub const CASES_CREATE: Permission = Permission::from_static("CASES.CREATE");
    pub const CASES_ASSIGN: Permission = Permission::from_static("CASES.ASSIGN");

    pub const TASKS: Permission = Permission::from_static("TASKS");
    pub const TASKS_CREATE: Permission = Permission::from_static("TASKS.CREATE");
    pub const TASKS_COMPLETE: Permission = Permission::from_static("TASKS.COMPLETE");

    pub const TEAMS: Permission = Permission::from_static("TEAMS");
    pub const TEAMS_MODIFY: Permission = Permission::from_static("TEAMS.MODIFY");

    pub const PERSONS: Permission = Permission::from_static("PERSONS");
    pub const PERSONS_MODIFY: Permission = Permission::from_static("PERSONS.MODIFY");

    pub const ADMIN: Permission = Permission::from_static("ADMIN");
}

/// Seed definition for a permission row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionDefinition {
    pub code: Permission,
    pub name: &'static str,
    pub description: &'static str,
    pub parent: Option<Permission>,
}

/// The permission catalog every deployment is seeded with.
///
/// Parents always precede their children so rows can be inserted in order.
pub fn catalog() -> Vec<PermissionDefinition> {
    fn def(
        code: Permission,
        name: &'static str,
        description: &'static str,
        parent: Option<Permission>,
    ) -> PermissionDefinition {
        PermissionDefinition {
            code,
            name,
            description,
            parent,
        }
    }

    vec![
        def(codes::CASES, "Cases", "Case management", None),
        def(
            codes::ALL_CASES,
            "All cases",
            "View and act on every case regardless of assignment",
            Some(codes::CASES),
        ),
        def(codes::CASES_CREATE, "Create cases", "Open new cases", Some(codes::CASES)),
        def(
            codes::CASES_ASSIGN,
            "Assign cases",
            "Directly assign users to cases",
            Some(codes::CASES),
        ),
        def(codes::TASKS, "Tasks", "Case tasks", None),
        def(codes::TASKS_CREATE, "Create tasks", "Create tasks on a case", Some(codes::TASKS)),
        def(
            codes::TASKS_COMPLETE,
            "Complete tasks",
            "Mark case tasks completed",
            Some(codes::TASKS),
        ),
        def(codes::TEAMS, "Teams", "View teams", None),
        def(
            codes::TEAMS_MODIFY,
            "Modify teams",
            "Create teams, manage membership and case links",
            Some(codes::TEAMS),
        ),
        def(codes::PERSONS, "Persons", "Person directory", None),
        def(
            codes::PERSONS_MODIFY,
            "Modify persons",
            "Create person records",
            Some(codes::PERSONS),
        ),
        def(codes::ADMIN, "Administration", "Manage users, roles and permissions", None),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_codes_are_unique_and_parents_come_first() {
        let defs = catalog();
        let mut seen = std::collections::HashSet::new();
        for d in &defs {
            if let Some(parent) = &d.parent {
                assert!(seen.contains(parent), "{} listed before its parent", d.code);
            }
            assert!(seen.insert(d.code.clone()), "duplicate code {}", d.code);
        }
        assert!(seen.contains(&codes::ALL_CASES));
    }
}
