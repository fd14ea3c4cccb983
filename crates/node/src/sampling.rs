//! Batch sampling for inbound task responses.

use crate::config::SamplingConfig;
use quorum_types::{TaskClass, TaskDescriptor, TaskError};

/// Decides which tasks are aggregated.
///
/// A task whose metadata carries `batch_id > 0` is processed only when the
/// batch id is a multiple of its class divisor. Tasks without a batch id
/// are always processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    generation: u64,
    execution: u64,
}

impl SamplingPolicy {
    /// Divisors of zero are treated as one.
    pub fn new(generation: u64, execution: u64) -> Self {
        Self {
            generation: generation.max(1),
            execution: execution.max(1),
        }
    }

    /// Process everything.
    pub fn disabled() -> Self {
        Self::new(1, 1)
    }

    fn divisor(&self, class: TaskClass) -> u64 {
        match class {
            TaskClass::Generation => self.generation,
            TaskClass::Execution => self.execution,
        }
    }

    /// Execution tasks with unreadable metadata are rejected. Generation
    /// tasks with unreadable metadata are processed.
    pub fn should_process(&self, task: &TaskDescriptor) -> Result<bool, TaskError> {
        let class = task.class();
        let batch_id = match (task.parsed_metadata(), class) {
            (Ok(metadata), _) => metadata.batch_id,
            (Err(e), TaskClass::Execution) => return Err(e),
            (Err(_), TaskClass::Generation) => return Ok(true),
        };
        Ok(batch_id == 0 || batch_id % self.divisor(class) == 0)
    }
}

impl From<&SamplingConfig> for SamplingPolicy {
    fn from(config: &SamplingConfig) -> Self {
        Self::new(config.gen_task_sampling, config.exec_task_sampling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_test_helpers::fixtures;
    use quorum_types::BlockNumber;

    #[test]
    fn test_divisor_per_class() {
        let policy = SamplingPolicy::new(10, 4);

        assert!(policy.should_process(&fixtures::task(2, 20, BlockNumber(1))).unwrap());
        assert!(!policy.should_process(&fixtures::task(2, 12, BlockNumber(1))).unwrap());
        assert!(policy.should_process(&fixtures::execution_task(12, BlockNumber(1))).unwrap());
        assert!(!policy.should_process(&fixtures::execution_task(10, BlockNumber(1))).unwrap());
    }

    #[test]
    fn test_missing_batch_id_always_processed() {
        let policy = SamplingPolicy::new(7, 7);
        let mut task = fixtures::task(2, 0, BlockNumber(1));
        assert!(policy.should_process(&task).unwrap());

        task.metadata = String::new();
        assert!(policy.should_process(&task).unwrap());
    }

    #[test]
    fn test_unreadable_metadata() {
        let policy = SamplingPolicy::new(7, 7);

        let mut generation = fixtures::task(2, 3, BlockNumber(1));
        generation.metadata = "{broken".to_string();
        assert!(policy.should_process(&generation).unwrap());

        let mut execution = fixtures::execution_task(3, BlockNumber(1));
        execution.metadata = "{broken".to_string();
        assert!(matches!(
            policy.should_process(&execution),
            Err(TaskError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_from_config_defaults() {
        let mut config = SamplingConfig::default();
        config.init();
        let policy = SamplingPolicy::from(&config);
        assert!(policy.should_process(&fixtures::task(2, 4000, BlockNumber(1))).unwrap());
        assert!(!policy.should_process(&fixtures::task(2, 4001, BlockNumber(1))).unwrap());
        assert_eq!(SamplingPolicy::disabled(), SamplingPolicy::new(0, 0));
    }
}
