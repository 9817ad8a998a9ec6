//! `looma-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod case_number;
pub mod error;
pub mod id;

pub use case_number::{CaseNumber, StateCode};
pub use error::{DomainError, DomainResult};
pub use id::{
    CaseId, ModelKey, PermissionId, PersonId, RoleId, SubjectId, TaskId, TeamId, UserId,
};
