/// Errors from a single attestation layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for LayerError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Errors from [`AttestationVerifier`](crate::AttestationVerifier).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttestationError {
    #[error("attestation layer {version} failed: {source}")]
    Layer {
        version: String,
        #[source]
        source: LayerError,
    },

    #[error("invalid attestation layer config: {0}")]
    InvalidConfig(String),
}
