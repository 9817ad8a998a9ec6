use serde::{Deserialize, Serialize};

/// Short, stable code identifying a role (e.g. `"case_manager"`).
///
/// Roles are bundles of permissions; the bundle itself lives in storage. The
/// code is restricted to lowercase ASCII letters, digits and underscores so it
/// is safe to use in URLs and logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleCode(String);

impl RoleCode {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let code = raw.trim();
        if code.is_empty() || code.len() > 50 {
            return Err("role code must be 1-50 characters".to_string());
        }
        if !code
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err("role code may only contain a-z, 0-9 and '_'".to_string());
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoleCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoleCode> for String {
    fn from(value: RoleCode) -> Self {
        value.0
    }
}

impl core::fmt::Display for RoleCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_snake_case() {
        assert_eq!(RoleCode::parse(" case_manager ").unwrap().as_str(), "case_manager");
    }

    #[test]
    fn rejects_uppercase_and_symbols() {
        assert!(RoleCode::parse("Admin").is_err());
        assert!(RoleCode::parse("ops-lead").is_err());
        assert!(RoleCode::parse("").is_err());
    }
}
