//! Operator state from a fixed table.

use crate::{OperatorStateReader, RegistryError};
use async_trait::async_trait;
use quorum_types::{BlockNumber, OperatorInfo, OperatorStateSnapshot, QuorumNumber};
use std::collections::BTreeMap;

/// An [`OperatorStateReader`] serving the same operator table for every block
/// at or after `start_block`.
///
/// History indices are all zero: the table has a single version.
#[derive(Debug, Clone)]
pub struct StaticOperatorRegistry {
    start_block: BlockNumber,
    operators: Vec<OperatorInfo>,
}

impl StaticOperatorRegistry {
    pub fn new(start_block: BlockNumber, operators: Vec<OperatorInfo>) -> Self {
        Self {
            start_block,
            operators,
        }
    }

    pub fn operators(&self) -> &[OperatorInfo] {
        &self.operators
    }
}

#[async_trait]
impl OperatorStateReader for StaticOperatorRegistry {
    async fn operator_state_at(
        &self,
        block: BlockNumber,
        quorum_numbers: &[QuorumNumber],
    ) -> Result<OperatorStateSnapshot, RegistryError> {
        if block < self.start_block {
            return Err(RegistryError::UnknownBlock(block));
        }
        Ok(OperatorStateSnapshot::new(
            block,
            quorum_numbers,
            self.operators.iter().cloned(),
            &BTreeMap::new(),
        )?)
    }
}
