//! `looma-auth` — authentication and authorization boundary.
//!
//! This crate is decoupled from HTTP and from any particular storage engine:
//! lookups it needs are expressed as traits that the infra layer implements.

pub mod authorize;
pub mod case_access;
pub mod claims;
pub mod opaque_id;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthzError, PermissionSource, authorize, filter_held_permissions};
pub use case_access::{AccessGrant, CaseAccessSource, can_access_case, case_access_grant};
pub use claims::{Hs256Jwt, JwtClaims, JwtValidator, TokenValidationError, validate_claims};
pub use opaque_id::{IdCodec, OpaqueIdError};
pub use permissions::{Permission, PermissionDefinition, codes};
pub use roles::RoleCode;
