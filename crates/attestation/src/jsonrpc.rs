//! Liveness checks through an `eth_call` to an attestation contract.

use crate::{AttestationError, LayerError, LivenessVerifier};
use async_trait::async_trait;
use quorum_types::AttestationProof;
use serde::Deserialize;
use sha3::{Digest, Keccak256};
use std::time::Duration;

/// Solidity signature of the liveness check.
pub const VERIFY_LIVENESS_SIGNATURE: &str = "verifyLivenessProof(bytes32,bytes32)";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A [`LivenessVerifier`] that calls `verifyLivenessProof(x, y)` on a
/// contract through a JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct JsonRpcLivenessVerifier {
    version: String,
    address: String,
    rpc_url: String,
    client: reqwest::Client,
}

impl JsonRpcLivenessVerifier {
    /// `address` is the 20-byte contract address in hex.
    pub fn new(version: &str, address: &str, rpc_url: &str) -> Result<Self, AttestationError> {
        let raw = address.strip_prefix("0x").unwrap_or(address);
        match hex::decode(raw) {
            Ok(bytes) if bytes.len() == 20 => {}
            _ => {
                return Err(AttestationError::InvalidConfig(format!(
                    "layer {version}: invalid contract address {address}"
                )))
            }
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AttestationError::InvalidConfig(format!("layer {version}: {e}")))?;

        Ok(Self {
            version: version.to_string(),
            address: format!("0x{}", raw.to_lowercase()),
            rpc_url: rpc_url.to_string(),
            client,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// ABI call data: 4-byte selector followed by both words.
fn call_data(proof: &AttestationProof) -> String {
    let selector = Keccak256::digest(VERIFY_LIVENESS_SIGNATURE.as_bytes());
    let mut data = Vec::with_capacity(4 + 64);
    data.extend_from_slice(&selector[..4]);
    data.extend_from_slice(proof.x.as_bytes());
    data.extend_from_slice(proof.y.as_bytes());
    format!("0x{}", hex::encode(data))
}

/// Decode an ABI-encoded `bool` return word.
fn decode_bool(result: &str) -> Result<bool, LayerError> {
    let raw = result.strip_prefix("0x").unwrap_or(result);
    let bytes = hex::decode(raw).map_err(|e| LayerError::InvalidResponse(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(LayerError::InvalidResponse(format!(
            "expected 32-byte word, got {} bytes",
            bytes.len()
        )));
    }
    if bytes[..31].iter().any(|&b| b != 0) {
        return Err(LayerError::InvalidResponse("not a bool".to_string()));
    }
    match bytes[31] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(LayerError::InvalidResponse(format!("not a bool: {other}"))),
    }
}

#[async_trait]
impl LivenessVerifier for JsonRpcLivenessVerifier {
    fn version(&self) -> &str {
        &self.version
    }

    async fn verify_liveness_proof(&self, proof: &AttestationProof) -> Result<bool, LayerError> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": self.address, "data": call_data(proof) },
                "latest"
            ],
        });

        let response: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(LayerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        let result = response
            .result
            .ok_or_else(|| LayerError::InvalidResponse("missing result".to_string()))?;
        decode_bool(&result)
    }
}
