//! TEE attestation proof coordinates.

use crate::Hash;
use serde::{Deserialize, Serialize};

/// Coordinates of a TEE-attested signing key, checked against the
/// attestation layers' liveness proofs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttestationProof {
    /// X coordinate (32 bytes, big-endian).
    pub x: Hash,
    /// Y coordinate (32 bytes, big-endian).
    pub y: Hash,
}

impl AttestationProof {
    pub fn new(x: [u8; 32], y: [u8; 32]) -> Self {
        Self {
            x: Hash::from_raw(x),
            y: Hash::from_raw(y),
        }
    }
}
