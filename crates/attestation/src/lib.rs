//! Attestation-layer verification of TEE-attested keys.
//!
//! A key is admitted when any configured attestation layer confirms a
//! liveness proof for it. Layers are consulted in configuration order and
//! the first confirmation wins.

mod error;
mod jsonrpc;
mod verifier;

pub use error::{AttestationError, LayerError};
pub use jsonrpc::{JsonRpcLivenessVerifier, VERIFY_LIVENESS_SIGNATURE};
pub use verifier::AttestationVerifier;

use async_trait::async_trait;
use quorum_types::AttestationProof;

/// One attestation layer able to check a liveness proof.
#[async_trait]
pub trait LivenessVerifier: Send + Sync {
    /// Layer version label, used in logs and errors.
    fn version(&self) -> &str;

    /// `Ok(false)` means the layer answered and rejected the proof.
    async fn verify_liveness_proof(&self, proof: &AttestationProof) -> Result<bool, LayerError>;
}
