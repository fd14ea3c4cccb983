//! Domain-separated digests for signed task responses.
//!
//! Operators sign the 32-byte task digest. The digest is built by hashing a
//! domain tag followed by a canonical encoding of the task descriptor, so a
//! signature over one task type can never be replayed as another.
//!
//! | Tag | Purpose |
//! |-----|---------|
//! | `TASK_RESPONSE` | Operator attestation over a task descriptor |

use crate::{BlockNumber, Hash, QuorumNumber};

/// Domain tag for task response digests.
///
/// Format: `TASK_RESPONSE` || identifier || reference_block || quorum_count ||
/// quorums || metadata_len || metadata || state_len || state
pub const DOMAIN_TASK_RESPONSE: &[u8] = b"TASK_RESPONSE";

/// Build the digest operators sign for a task.
///
/// Threshold percentages are deliberately excluded: they are aggregation
/// policy applied by the aggregator, not attested content.
pub fn task_response_digest(
    identifier: u64,
    reference_block: BlockNumber,
    quorum_numbers: &[QuorumNumber],
    metadata: &[u8],
    state: &[u8],
) -> Hash {
    let quorums: Vec<u8> = quorum_numbers.iter().map(|q| q.0).collect();
    Hash::from_parts(&[
        DOMAIN_TASK_RESPONSE,
        &identifier.to_le_bytes(),
        &reference_block.0.to_le_bytes(),
        &(quorums.len() as u32).to_le_bytes(),
        &quorums,
        &(metadata.len() as u64).to_le_bytes(),
        metadata,
        &(state.len() as u64).to_le_bytes(),
        state,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_depends_on_every_field() {
        let base = task_response_digest(1, BlockNumber(10), &[QuorumNumber(0)], b"m", b"s");

        assert_ne!(
            base,
            task_response_digest(2, BlockNumber(10), &[QuorumNumber(0)], b"m", b"s")
        );
        assert_ne!(
            base,
            task_response_digest(1, BlockNumber(11), &[QuorumNumber(0)], b"m", b"s")
        );
        assert_ne!(
            base,
            task_response_digest(1, BlockNumber(10), &[QuorumNumber(1)], b"m", b"s")
        );
        assert_ne!(
            base,
            task_response_digest(1, BlockNumber(10), &[QuorumNumber(0)], b"x", b"s")
        );
        assert_ne!(
            base,
            task_response_digest(1, BlockNumber(10), &[QuorumNumber(0)], b"m", b"x")
        );
    }

    #[test]
    fn test_length_prefix_prevents_field_shifting() {
        let a = task_response_digest(1, BlockNumber(1), &[], b"ab", b"c");
        let b = task_response_digest(1, BlockNumber(1), &[], b"a", b"bc");
        assert_ne!(a, b);
    }
}
