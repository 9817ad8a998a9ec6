use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use looma_core::UserId;

/// JWT claims model.
///
/// `sub` carries the user's primary key as a decimal string, as registered
/// claim names require; `iat`/`exp` are seconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    #[serde(with = "subject")]
    pub sub: UserId,

    /// Unique token identifier.
    pub jti: String,

    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl JwtClaims {
    pub fn issue(sub: UserId, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub,
            jti: uuid::Uuid::now_v7().to_string(),
            issued_at: now,
            expires_at: now + ttl,
        }
    }
}

mod subject {
    use looma_core::{ModelKey, UserId};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(id: &UserId, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&id.get().to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<UserId, D::Error> {
        let raw = String::deserialize(d)?;
        let key: i64 = raw
            .parse()
            .map_err(|_| D::Error::custom("sub must be a numeric user id"))?;
        if key < 0 {
            return Err(D::Error::custom("sub must be non-negative"));
        }
        Ok(UserId::from_raw(key))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Validate the time window of already-decoded claims.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// Verifies a bearer token and yields its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// HMAC-SHA256 signer/validator over a shared secret.
#[derive(Clone)]
pub struct Hs256Jwt {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Hs256Jwt {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn sign(&self, claims: &JwtClaims) -> Result<String, TokenValidationError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenValidationError::Invalid(e.to_string()))
    }
}

impl core::fmt::Debug for Hs256Jwt {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256Jwt").finish_non_exhaustive()
    }
}

impl JwtValidator for Hs256Jwt {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        // Time checks run against the caller's clock in `validate_claims`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &validation)
            .map_err(|e| TokenValidationError::Invalid(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looma_core::ModelKey;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap()
    }

    #[test]
    fn signed_token_validates() {
        let jwt = Hs256Jwt::new(b"secret");
        let claims = JwtClaims::issue(UserId::from_raw(7), now(), Duration::hours(1));
        let token = jwt.sign(&claims).unwrap();

        let decoded = jwt.validate(&token, now() + Duration::minutes(5)).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = JwtClaims::issue(UserId::from_raw(7), now(), Duration::hours(1));
        let token = Hs256Jwt::new(b"one").sign(&claims).unwrap();

        let err = Hs256Jwt::new(b"two").validate(&token, now()).unwrap_err();
        assert!(matches!(err, TokenValidationError::Invalid(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = Hs256Jwt::new(b"secret");
        let claims = JwtClaims::issue(UserId::from_raw(1), now(), Duration::minutes(10));
        let token = jwt.sign(&claims).unwrap();

        let err = jwt.validate(&token, now() + Duration::minutes(10)).unwrap_err();
        assert_eq!(err, TokenValidationError::Expired);
    }

    #[test]
    fn future_token_is_not_yet_valid() {
        let claims = JwtClaims::issue(UserId::from_raw(1), now(), Duration::minutes(10));
        let err = validate_claims(&claims, now() - Duration::seconds(30)).unwrap_err();
        assert_eq!(err, TokenValidationError::NotYetValid);
    }

    #[test]
    fn subject_is_a_decimal_string_on_the_wire() {
        let claims = JwtClaims::issue(UserId::from_raw(42), now(), Duration::hours(1));
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["sub"], "42");
        assert_eq!(json["iat"], 1_760_000_000);
    }
}
