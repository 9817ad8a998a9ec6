//! Opaque, tamper-evident identifiers.
//!
//! Integer primary keys never leave the service in the clear. Each one is
//! serialized together with its model namespace as `{"m": model, "k": pk}`,
//! sealed with ChaCha20-Poly1305 (the namespace doubles as associated data),
//! and emitted as `"{version}.{base64url(nonce || ciphertext || tag)}"`.
//!
//! Every decode failure collapses into [`OpaqueIdError`]; callers cannot tell
//! a malformed token from a forged one or from a token minted for another model.

use std::borrow::Cow;
use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use looma_core::ModelKey;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid opaque id")]
pub struct OpaqueIdError;

#[derive(Serialize, Deserialize)]
struct Sealed<'a> {
    m: Cow<'a, str>,
    k: serde_json::Value,
}

/// Versioned keyring that encodes and decodes opaque ids.
#[derive(Clone)]
pub struct IdCodec {
    current: u32,
    keys: BTreeMap<u32, ChaCha20Poly1305>,
}

impl IdCodec {
    /// Build a codec whose current key is derived from `secret`.
    pub fn new(version: u32, secret: &str) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(version, derive_key(secret));
        Self {
            current: version,
            keys,
        }
    }

    /// Keep tokens minted under an older key version decodable.
    ///
    /// The current version is never replaced.
    pub fn with_legacy_secret(mut self, version: u32, secret: &str) -> Self {
        if version != self.current {
            self.keys.insert(version, derive_key(secret));
        }
        self
    }

    pub fn current_version(&self) -> u32 {
        self.current
    }

    pub fn encode(&self, model: &str, pk: i64) -> Result<String, OpaqueIdError> {
        let model = model.trim();
        if model.is_empty() || pk < 0 {
            return Err(OpaqueIdError);
        }
        let plaintext = serde_json::to_vec(&Sealed {
            m: Cow::Borrowed(model),
            k: pk.into(),
        })
        .map_err(|_| OpaqueIdError)?;
        self.seal(model, &plaintext)
    }

    pub fn decode(&self, model: &str, token: &str) -> Result<i64, OpaqueIdError> {
        let model = model.trim();
        if model.is_empty() {
            return Err(OpaqueIdError);
        }

        let (version, body) = token.split_once('.').ok_or(OpaqueIdError)?;
        if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OpaqueIdError);
        }
        let version: u32 = version.parse().map_err(|_| OpaqueIdError)?;
        let cipher = self.keys.get(&version).ok_or(OpaqueIdError)?;

        let raw = URL_SAFE_NO_PAD.decode(body).map_err(|_| OpaqueIdError)?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(OpaqueIdError);
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: model.as_bytes(),
                },
            )
            .map_err(|_| OpaqueIdError)?;

        let sealed: Sealed<'_> = serde_json::from_slice(&plaintext).map_err(|_| OpaqueIdError)?;
        if sealed.m != model {
            return Err(OpaqueIdError);
        }
        match sealed.k.as_i64() {
            Some(k) if k >= 0 => Ok(k),
            _ => Err(OpaqueIdError),
        }
    }

    pub fn encode_id<K: ModelKey>(&self, id: K) -> Result<String, OpaqueIdError> {
        self.encode(K::NAMESPACE, id.raw())
    }

    pub fn decode_id<K: ModelKey>(&self, token: &str) -> Result<K, OpaqueIdError> {
        self.decode(K::NAMESPACE, token).map(K::from_raw)
    }

    fn seal(&self, model: &str, plaintext: &[u8]) -> Result<String, OpaqueIdError> {
        let cipher = self.keys.get(&self.current).ok_or(OpaqueIdError)?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: model.as_bytes(),
                },
            )
            .map_err(|_| OpaqueIdError)?;

        let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&ciphertext);
        Ok(format!("{}.{}", self.current, URL_SAFE_NO_PAD.encode(raw)))
    }
}

impl core::fmt::Debug for IdCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdCodec")
            .field("current", &self.current)
            .field("versions", &self.keys.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// A base64url encoding of exactly 32 bytes is used as the key itself;
/// anything else is hashed down with SHA-256.
fn derive_key(secret: &str) -> ChaCha20Poly1305 {
    let direct = URL_SAFE
        .decode(secret)
        .or_else(|_| URL_SAFE_NO_PAD.decode(secret))
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes.as_slice()).ok());

    let key: [u8; 32] = match direct {
        Some(bytes) => bytes,
        None => Sha256::digest(secret.as_bytes()).into(),
    };
    ChaCha20Poly1305::new(&key.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use looma_core::{CaseId, PersonId};
    use proptest::prelude::*;

    fn codec() -> IdCodec {
        IdCodec::new(1, "test-secret")
    }

    #[test]
    fn round_trip() {
        let c = codec();
        let token = c.encode("case", 42).unwrap();
        assert!(token.starts_with("1."));
        assert_eq!(c.decode("case", &token).unwrap(), 42);
    }

    #[test]
    fn typed_round_trip() {
        let c = codec();
        let token = c.encode_id(CaseId::from_raw(9)).unwrap();
        assert_eq!(c.decode_id::<CaseId>(&token).unwrap(), CaseId::from_raw(9));
        assert_eq!(c.decode_id::<PersonId>(&token), Err(OpaqueIdError));
    }

    #[test]
    fn encoding_is_randomized() {
        let c = codec();
        assert_ne!(c.encode("case", 1).unwrap(), c.encode("case", 1).unwrap());
    }

    #[test]
    fn model_is_trimmed() {
        let c = codec();
        let token = c.encode(" case ", 3).unwrap();
        assert_eq!(c.decode("case", &token).unwrap(), 3);
    }

    #[test]
    fn bad_inputs_to_encode() {
        let c = codec();
        assert_eq!(c.encode("case", -1), Err(OpaqueIdError));
        assert_eq!(c.encode("   ", 1), Err(OpaqueIdError));
    }

    #[test]
    fn malformed_tokens_fail_identically() {
        let c = codec();
        for token in ["", "not-a-token", "999.garbage", "1.", ".abc", "x1.abc", "1.!!!!"] {
            assert_eq!(c.decode("case", token), Err(OpaqueIdError), "{token:?}");
        }
    }

    #[test]
    fn every_flipped_byte_is_rejected() {
        let c = codec();
        let token = c.encode("case", 1234).unwrap();
        let (version, body) = token.split_once('.').unwrap();
        let raw = URL_SAFE_NO_PAD.decode(body).unwrap();

        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            let forged = format!("{version}.{}", URL_SAFE_NO_PAD.encode(&tampered));
            assert_eq!(c.decode("case", &forged), Err(OpaqueIdError), "byte {i}");
        }
    }

    #[test]
    fn other_secret_cannot_decode() {
        let token = codec().encode("case", 5).unwrap();
        let other = IdCodec::new(1, "another-secret");
        assert_eq!(other.decode("case", &token), Err(OpaqueIdError));
    }

    #[test]
    fn payload_key_must_be_a_non_negative_integer() {
        let c = codec();
        for payload in [
            r#"{"m":"case","k":"5"}"#,
            r#"{"m":"case","k":5.5}"#,
            r#"{"m":"case","k":-3}"#,
            r#"{"m":"case","k":null}"#,
            r#"{"m":"case"}"#,
        ] {
            let token = c.seal("case", payload.as_bytes()).unwrap();
            assert_eq!(c.decode("case", &token), Err(OpaqueIdError), "{payload}");
        }

        let token = c.seal("case", br#"{"m":"case","k":5}"#).unwrap();
        assert_eq!(c.decode("case", &token), Ok(5));
    }

    #[test]
    fn sealed_namespace_must_match() {
        let c = codec();
        // aad says "case" but the payload claims "person"
        let token = c.seal("case", br#"{"m":"person","k":5}"#).unwrap();
        assert_eq!(c.decode("case", &token), Err(OpaqueIdError));
    }

    #[test]
    fn legacy_versions_stay_decodable() {
        let old = IdCodec::new(1, "old-secret");
        let legacy_token = old.encode("team", 77).unwrap();

        let current = IdCodec::new(2, "new-secret").with_legacy_secret(1, "old-secret");
        assert_eq!(current.current_version(), 2);
        assert_eq!(current.decode("team", &legacy_token), Ok(77));
        assert!(current.encode("team", 77).unwrap().starts_with("2."));

        let without_legacy = IdCodec::new(2, "new-secret");
        assert_eq!(without_legacy.decode("team", &legacy_token), Err(OpaqueIdError));
    }

    #[test]
    fn base64_secret_of_32_bytes_is_used_verbatim() {
        let raw = [7u8; 32];
        let padded = URL_SAFE.encode(raw);
        let unpadded = URL_SAFE_NO_PAD.encode(raw);

        let a = IdCodec::new(1, &padded);
        let b = IdCodec::new(1, &unpadded);
        let token = a.encode("case", 10).unwrap();
        assert_eq!(b.decode("case", &token), Ok(10));
    }

    #[test]
    fn debug_hides_key_material() {
        let dbg = format!("{:?}", codec());
        assert!(dbg.contains("current: 1"));
        assert!(!dbg.contains("test-secret"));
    }

    proptest! {
        #[test]
        fn prop_round_trip(model in "[a-z_]{1,24}", pk in 0i64..=i64::MAX) {
            let c = codec();
            let token = c.encode(&model, pk).unwrap();
            prop_assert_eq!(c.decode(&model, &token), Ok(pk));
        }

        #[test]
        fn prop_namespace_binding(
            m1 in "[a-z_]{1,12}",
            m2 in "[a-z_]{1,12}",
            pk in 0i64..1_000_000,
        ) {
            prop_assume!(m1 != m2);
            let c = codec();
            let token = c.encode(&m1, pk).unwrap();
            prop_assert_eq!(c.decode(&m2, &token), Err(OpaqueIdError));
        }
    }
}
