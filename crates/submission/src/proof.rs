use quorum_aggregation::AggregateAttestation;
use quorum_types::{BlsPublicKey, BlsSignature};
use serde::Serialize;

/// The proof the verifier contract checks a confirmation against.
///
/// Index arrays let the contract look up historical registry state at the
/// task's reference block instead of trusting the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NonSignerStakesAndSignature {
    pub non_signer_quorum_bitmap_indices: Vec<u32>,
    pub non_signer_pubkeys: Vec<BlsPublicKey>,
    pub quorum_apks: Vec<BlsPublicKey>,
    pub signers_apk: BlsPublicKey,
    pub sigma: BlsSignature,
    pub quorum_apk_indices: Vec<u32>,
    pub total_stake_indices: Vec<u32>,
    pub non_signer_stake_indices: Vec<Vec<u32>>,
}

impl From<&AggregateAttestation> for NonSignerStakesAndSignature {
    fn from(attestation: &AggregateAttestation) -> Self {
        Self {
            non_signer_quorum_bitmap_indices: attestation
                .non_signers
                .iter()
                .map(|n| n.quorum_bitmap_index)
                .collect(),
            non_signer_pubkeys: attestation.non_signers.iter().map(|n| n.public_key).collect(),
            quorum_apks: attestation.quorum_apks.clone(),
            signers_apk: attestation.signers_apk,
            sigma: attestation.signature,
            quorum_apk_indices: attestation.quorum_apk_indices.clone(),
            total_stake_indices: attestation.total_stake_indices.clone(),
            non_signer_stake_indices: attestation.non_signer_stake_indices.clone(),
        }
    }
}
