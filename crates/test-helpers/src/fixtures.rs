//! Task and response builders.

use crate::TestOperators;
use quorum_types::{
    BlockNumber, QuorumNumber, SignedTaskResponse, TaskDescriptor, EXECUTION_TASK_IDENTIFIER,
};

/// A task over quorum 0 at `block`, carrying `batch_id` in its metadata.
pub fn task(identifier: u64, batch_id: u64, block: BlockNumber) -> TaskDescriptor {
    TaskDescriptor {
        identifier,
        metadata: serde_json::json!({ "batch_id": batch_id }).to_string(),
        state: format!("state-{batch_id}").into_bytes(),
        quorum_numbers: vec![QuorumNumber(0)],
        quorum_threshold_percentages: vec![67],
        reference_block_number: block,
    }
}

/// An execution-class task.
pub fn execution_task(batch_id: u64, block: BlockNumber) -> TaskDescriptor {
    task(EXECUTION_TASK_IDENTIFIER, batch_id, block)
}

/// Operator `idx`'s signed response to `task`.
pub fn signed_response(ops: &TestOperators, idx: usize, task: &TaskDescriptor) -> SignedTaskResponse {
    SignedTaskResponse {
        task: task.clone(),
        operator_id: ops.id(idx),
        signature: ops.sign(idx, &task.digest()),
    }
}
