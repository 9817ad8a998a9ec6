use looma_core::UserId;
use looma_infra::store::UserRecord;

/// Authenticated caller for a request.
///
/// Inserted by the auth middleware only after the user row was loaded and
/// found active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user: UserRecord,
}

impl PrincipalContext {
    pub fn new(user: UserRecord) -> Self {
        Self { user }
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn user(&self) -> &UserRecord {
        &self.user
    }
}
