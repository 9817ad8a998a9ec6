use std::sync::Arc;

use looma_auth::IdCodec;
use looma_core::ModelKey;
use looma_infra::Store;

use crate::app::errors::ApiError;

/// Shared handler state: the storage backend and the opaque-id codec.
pub struct AppServices {
    pub store: Arc<dyn Store>,
    pub codec: IdCodec,
}

impl AppServices {
    pub fn new(store: Arc<dyn Store>, codec: IdCodec) -> Self {
        Self { store, codec }
    }

    /// Encode an outbound primary key.
    ///
    /// Keys coming out of the store are never negative, so a failure here is
    /// a server fault rather than a caller error.
    pub fn encode<K: ModelKey>(&self, id: K) -> Result<String, ApiError> {
        self.codec
            .encode_id(id)
            .map_err(|_| ApiError::Internal(format!("failed to encode {} id", K::NAMESPACE)))
    }
}

impl core::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppServices")
            .field("codec_version", &self.codec.current_version())
            .finish_non_exhaustive()
    }
}
