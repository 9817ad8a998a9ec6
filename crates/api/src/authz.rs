//! Request-level authorization guards.
//!
//! Permission gates answer 403. Anything case-scoped answers 404 on denial so
//! that a caller cannot probe for the existence of cases they cannot see.

use looma_auth::{Permission, authorize, can_access_case};
use looma_core::{CaseId, ModelKey};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// Fail with 403 unless the caller holds `permission`.
pub async fn require_permission(
    services: &AppServices,
    principal: &PrincipalContext,
    permission: &Permission,
) -> Result<(), ApiError> {
    authorize(&*services.store, principal.user_id(), permission).await?;
    Ok(())
}

/// Decode an inbound opaque id; any codec failure is a 404.
pub fn decode<K: ModelKey>(services: &AppServices, token: &str) -> Result<K, ApiError> {
    Ok(services.codec.decode_id::<K>(token)?)
}

/// Resolve a case token the caller is allowed to act on.
pub async fn authorize_case(
    services: &AppServices,
    principal: &PrincipalContext,
    token: &str,
) -> Result<CaseId, ApiError> {
    let case: CaseId = decode(services, token)?;
    ensure_case_access(services, principal, case).await?;
    Ok(case)
}

/// 404 unless the access predicate holds for `case`.
pub async fn ensure_case_access(
    services: &AppServices,
    principal: &PrincipalContext,
    case: CaseId,
) -> Result<(), ApiError> {
    if can_access_case(&*services.store, principal.user_id(), case).await? {
        Ok(())
    } else {
        Err(ApiError::NotFound)
    }
}
