use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use looma_core::UserId;

use crate::Permission;

/// Storage-backed view of a user's effective permissions.
///
/// A user's effective permissions are the union of the permissions carried by
/// every role assigned to them. Implemented by the infra layer.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn user_has_permission(
        &self,
        user: UserId,
        permission: &Permission,
    ) -> Result<bool, Self::Error>;

    /// Subset of `requested` the user holds (order unspecified).
    async fn held_permissions(
        &self,
        user: UserId,
        requested: &[Permission],
    ) -> Result<HashSet<Permission>, Self::Error>;
}

#[derive(Debug, Error)]
pub enum AuthzError<E> {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(Permission),

    #[error("permission lookup failed")]
    Source(#[source] E),
}

/// Require `user` to hold `required`.
pub async fn authorize<S>(
    source: &S,
    user: UserId,
    required: &Permission,
) -> Result<(), AuthzError<S::Error>>
where
    S: PermissionSource + ?Sized,
{
    let held = source
        .user_has_permission(user, required)
        .await
        .map_err(AuthzError::Source)?;

    if held {
        Ok(())
    } else {
        tracing::debug!(user = %user, permission = %required, "permission denied");
        Err(AuthzError::Forbidden(required.clone()))
    }
}

/// The requested codes the user holds, in input order, without duplicates.
pub async fn filter_held_permissions<S>(
    source: &S,
    user: UserId,
    requested: &[Permission],
) -> Result<Vec<Permission>, S::Error>
where
    S: PermissionSource + ?Sized,
{
    if requested.is_empty() {
        return Ok(Vec::new());
    }
    let held = source.held_permissions(user, requested).await?;

    let mut seen = HashSet::new();
    Ok(requested
        .iter()
        .filter(|p| held.contains(*p) && seen.insert(*p))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes;
    use looma_core::ModelKey;

    struct Fixed(Vec<Permission>);

    #[derive(Debug, Error)]
    #[error("unreachable")]
    struct Never;

    #[async_trait]
    impl PermissionSource for Fixed {
        type Error = Never;

        async fn user_has_permission(&self, _: UserId, p: &Permission) -> Result<bool, Never> {
            Ok(self.0.contains(p))
        }

        async fn held_permissions(
            &self,
            _: UserId,
            requested: &[Permission],
        ) -> Result<HashSet<Permission>, Never> {
            Ok(requested.iter().filter(|p| self.0.contains(p)).cloned().collect())
        }
    }

    #[tokio::test]
    async fn missing_permission_is_forbidden() {
        let src = Fixed(vec![codes::TEAMS]);
        let user = UserId::from_raw(1);

        assert!(authorize(&src, user, &codes::TEAMS).await.is_ok());
        let err = authorize(&src, user, &codes::TEAMS_MODIFY).await.unwrap_err();
        assert!(matches!(err, AuthzError::Forbidden(p) if p == codes::TEAMS_MODIFY));
    }

    #[tokio::test]
    async fn parent_code_does_not_imply_children() {
        let src = Fixed(vec![codes::CASES]);
        assert!(authorize(&src, UserId::from_raw(1), &codes::ALL_CASES).await.is_err());
    }

    #[tokio::test]
    async fn held_subset_keeps_input_order_and_dedups() {
        let src = Fixed(vec![codes::TASKS_CREATE, codes::ADMIN]);
        let requested = vec![
            codes::ADMIN,
            Permission::new("NOPE"),
            codes::TASKS_CREATE,
            codes::ADMIN,
        ];
        let held = filter_held_permissions(&src, UserId::from_raw(1), &requested)
            .await
            .unwrap();
        assert_eq!(held, vec![codes::ADMIN, codes::TASKS_CREATE]);
    }
}
