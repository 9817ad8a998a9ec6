//! Strongly-typed primary keys used across the domain.
//!
//! Every relational row is keyed by a non-negative integer. The wrappers below
//! keep keys of different tables from being mixed up, and each carries the
//! model namespace that binds its opaque token to one entity type.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A primary key that belongs to exactly one model namespace.
pub trait ModelKey: Copy + Sized {
    /// Namespace string bound into every opaque token for this model.
    const NAMESPACE: &'static str;

    fn from_raw(raw: i64) -> Self;

    fn raw(&self) -> i64;
}

/// Identifier of an application user (login identity).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

/// Identifier of a case.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(i64);

/// Identifier of a case subject (the missing person a case is about).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(i64);

/// Identifier of a person record (team members, agency contacts).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(i64);

/// Identifier of a team.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(i64);

/// Identifier of a case task.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(i64);

/// Identifier of a role.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(i64);

/// Identifier of a permission row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionId(i64);

macro_rules! impl_pk_newtype {
    ($t:ident, $ns:literal) => {
        impl $t {
            /// Wrap a database key, rejecting negative values.
            pub fn new(raw: i64) -> Result<Self, DomainError> {
                if raw < 0 {
                    return Err(DomainError::invalid_id(format!(
                        "{}: negative key {}",
                        stringify!($t),
                        raw
                    )));
                }
                Ok(Self(raw))
            }

            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl ModelKey for $t {
            const NAMESPACE: &'static str = $ns;

            fn from_raw(raw: i64) -> Self {
                Self(raw)
            }

            fn raw(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_pk_newtype!(UserId, "app_user");
impl_pk_newtype!(CaseId, "case");
impl_pk_newtype!(SubjectId, "subject");
impl_pk_newtype!(PersonId, "person");
impl_pk_newtype!(TeamId, "team");
impl_pk_newtype!(TaskId, "task");
impl_pk_newtype!(RoleId, "role");
impl_pk_newtype!(PermissionId, "permission");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_keys_are_rejected() {
        assert!(CaseId::new(-1).is_err());
        assert_eq!(CaseId::new(0).unwrap().get(), 0);
    }

    #[test]
    fn namespaces_are_distinct() {
        let all = [
            UserId::NAMESPACE,
            CaseId::NAMESPACE,
            SubjectId::NAMESPACE,
            PersonId::NAMESPACE,
            TeamId::NAMESPACE,
            TaskId::NAMESPACE,
            RoleId::NAMESPACE,
            PermissionId::NAMESPACE,
        ];
        let unique: std::collections::HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn serializes_as_bare_integer() {
        let id = TeamId::from_raw(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
    }
}
