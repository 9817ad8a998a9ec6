//! Exposes any [`Store`] to the authorization layer.

use std::collections::HashSet;

use async_trait::async_trait;

use looma_auth::{CaseAccessSource, Permission, PermissionSource};
use looma_core::{CaseId, UserId};

use super::{Store, StoreError};

#[async_trait]
impl<'a> PermissionSource for dyn Store + 'a {
    type Error = StoreError;

    async fn user_has_permission(
        &self,
        user: UserId,
        permission: &Permission,
    ) -> Result<bool, StoreError> {
        Store::user_has_permission(self, user, permission).await
    }

    async fn held_permissions(
        &self,
        user: UserId,
        requested: &[Permission],
    ) -> Result<HashSet<Permission>, StoreError> {
        Store::held_permissions(self, user, requested).await
    }
}

#[async_trait]
impl<'a> CaseAccessSource for dyn Store + 'a {
    async fn has_direct_assignment(&self, user: UserId, case: CaseId) -> Result<bool, StoreError> {
        Store::has_direct_assignment(self, user, case).await
    }

    async fn has_team_path(&self, user: UserId, case: CaseId) -> Result<bool, StoreError> {
        Store::has_team_path(self, user, case).await
    }
}
