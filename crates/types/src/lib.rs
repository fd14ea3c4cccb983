//! Core types for the quorum aggregator.
//!
//! This crate provides the foundational types shared by every other crate:
//!
//! - **Primitives**: Hash, BLS keys and signatures
//! - **Identifiers**: OperatorId, QuorumNumber, BlockNumber, TaskIndex
//! - **Tasks**: TaskDescriptor, SignedTaskResponse and the signed digest
//! - **Operator state**: OperatorStateSnapshot and its per-quorum views
//!
//! It does not depend on any other workspace crate.

mod attestation;
mod crypto;
mod hash;
mod identifiers;
mod operator;
mod signing;
mod task;

pub mod serde_hex;

pub use attestation::AttestationProof;
pub use crypto::{
    BlsKeyPair, BlsPublicKey, BlsSignature, CryptoError, PublicKeyAccumulator,
    SignatureAccumulator, BLS_DST,
};
pub use hash::{Hash, HexError};
pub use identifiers::{BlockNumber, OperatorId, QuorumNumber, Stake, TaskIndex, ThresholdPercentage};
pub use operator::{OperatorInfo, OperatorStateSnapshot, QuorumIndices, QuorumState};
pub use signing::{task_response_digest, DOMAIN_TASK_RESPONSE};
pub use task::{
    SignedTaskResponse, TaskClass, TaskDescriptor, TaskError, TaskMetadata,
    EXECUTION_TASK_IDENTIFIER,
};
