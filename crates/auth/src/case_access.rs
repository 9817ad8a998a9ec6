//! Case access predicate.
//!
//! A user may act on a case when any of the following holds, checked in this
//! order and short-circuiting on the first match:
//!
//! 1. one of the user's roles carries `CASES.ALL_CASES`;
//! 2. the user is directly assigned to the case;
//! 3. the user's linked person belongs to a team linked to the case.
//!
//! Nothing is cached; each call re-reads storage.

use async_trait::async_trait;
use serde::Serialize;

use looma_core::{CaseId, UserId};

use crate::{PermissionSource, codes};

/// Relationship lookups the predicate needs beyond plain permissions.
#[async_trait]
pub trait CaseAccessSource: PermissionSource {
    async fn has_direct_assignment(&self, user: UserId, case: CaseId) -> Result<bool, Self::Error>;

    /// user -> person -> person_team -> team_case. `false` when the user has
    /// no linked person.
    async fn has_team_path(&self, user: UserId, case: CaseId) -> Result<bool, Self::Error>;
}

/// Which clause granted access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessGrant {
    GlobalPermission,
    DirectAssignment,
    TeamMembership,
}

pub async fn case_access_grant<S>(
    source: &S,
    user: UserId,
    case: CaseId,
) -> Result<Option<AccessGrant>, S::Error>
where
    S: CaseAccessSource + ?Sized,
{
    let grant = if source.user_has_permission(user, &codes::ALL_CASES).await? {
        Some(AccessGrant::GlobalPermission)
    } else if source.has_direct_assignment(user, case).await? {
        Some(AccessGrant::DirectAssignment)
    } else if source.has_team_path(user, case).await? {
        Some(AccessGrant::TeamMembership)
    } else {
        None
    };

    tracing::debug!(user = %user, case = %case, grant = ?grant, "case access evaluated");
    Ok(grant)
}

pub async fn can_access_case<S>(source: &S, user: UserId, case: CaseId) -> Result<bool, S::Error>
where
    S: CaseAccessSource + ?Sized,
{
    Ok(case_access_grant(source, user, case).await?.is_some())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use looma_core::ModelKey;
    use thiserror::Error;

    use super::*;
    use crate::Permission;

    #[derive(Debug, Error)]
    #[error("storage offline")]
    struct Offline;

    #[derive(Default)]
    struct Fake {
        all_cases: bool,
        direct: bool,
        team: bool,
        offline: bool,
        calls: AtomicUsize,
    }

    impl Fake {
        fn hit(&self) -> Result<(), Offline> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline { Err(Offline) } else { Ok(()) }
        }
    }

    #[async_trait]
    impl PermissionSource for Fake {
        type Error = Offline;

        async fn user_has_permission(&self, _: UserId, p: &Permission) -> Result<bool, Offline> {
            self.hit()?;
            Ok(self.all_cases && *p == codes::ALL_CASES)
        }

        async fn held_permissions(
            &self,
            _: UserId,
            _: &[Permission],
        ) -> Result<HashSet<Permission>, Offline> {
            Ok(HashSet::new())
        }
    }

    #[async_trait]
    impl CaseAccessSource for Fake {
        async fn has_direct_assignment(&self, _: UserId, _: CaseId) -> Result<bool, Offline> {
            self.hit()?;
            Ok(self.direct)
        }

        async fn has_team_path(&self, _: UserId, _: CaseId) -> Result<bool, Offline> {
            self.hit()?;
            Ok(self.team)
        }
    }

    fn ids() -> (UserId, CaseId) {
        (UserId::from_raw(1), CaseId::from_raw(10))
    }

    #[tokio::test]
    async fn global_permission_short_circuits() {
        let (u, c) = ids();
        let src = Fake {
            all_cases: true,
            direct: true,
            team: true,
            ..Default::default()
        };
        assert_eq!(case_access_grant(&src, u, c).await.unwrap(), Some(AccessGrant::GlobalPermission));
        assert_eq!(src.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn direct_assignment_before_team() {
        let (u, c) = ids();
        let src = Fake {
            direct: true,
            team: true,
            ..Default::default()
        };
        assert_eq!(case_access_grant(&src, u, c).await.unwrap(), Some(AccessGrant::DirectAssignment));
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn team_path_is_last_resort() {
        let (u, c) = ids();
        let src = Fake {
            team: true,
            ..Default::default()
        };
        assert_eq!(case_access_grant(&src, u, c).await.unwrap(), Some(AccessGrant::TeamMembership));
        assert!(can_access_case(&src, u, c).await.unwrap());
    }

    #[tokio::test]
    async fn nothing_matches() {
        let (u, c) = ids();
        let src = Fake::default();
        assert_eq!(case_access_grant(&src, u, c).await.unwrap(), None);
        assert_eq!(src.calls.load(Ordering::SeqCst), 3);
        assert!(!can_access_case(&src, u, c).await.unwrap());
    }

    #[tokio::test]
    async fn storage_errors_propagate() {
        let (u, c) = ids();
        let src = Fake {
            offline: true,
            ..Default::default()
        };
        assert!(can_access_case(&src, u, c).await.is_err());
    }
}
