//! Digest-to-task index registry.
//!
//! Every task digest maps to exactly one sequential [`TaskIndex`]. Indices
//! are handed out under the same lock that guards the map, so two
//! concurrent first submissions for one digest always agree on the index
//! and no index is ever issued twice.

use parking_lot::Mutex;
use quorum_types::{Hash, TaskDescriptor, TaskIndex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// A registered task.
#[derive(Debug)]
pub struct Task {
    pub index: TaskIndex,
    pub digest: Hash,
    pub descriptor: TaskDescriptor,
    pub created_at: Instant,
}

/// Outcome of [`TaskRegistry::register`].
#[derive(Debug)]
pub enum Registration<R> {
    /// The digest was already registered. The hook did not run.
    Existing(Arc<Task>),
    /// A fresh index was assigned; carries the hook's output.
    New(Arc<Task>, R),
}

/// Why [`TaskRegistry::register`] recorded nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError<E> {
    /// Every `u32` task index has been issued.
    #[error("task index space exhausted")]
    Exhausted,
    /// The reservation hook refused the index.
    #[error(transparent)]
    Reserve(E),
}

impl<R> Registration<R> {
    pub fn task(&self) -> &Arc<Task> {
        match self {
            Self::Existing(task) | Self::New(task, _) => task,
        }
    }
}

struct Inner {
    tasks: HashMap<Hash, Arc<Task>>,
    // Wider than TaskIndex so issuing u32::MAX cannot wrap.
    next_index: u64,
}

/// Active tasks keyed by digest.
pub struct TaskRegistry {
    inner: Mutex<Inner>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    fn starting_at(next_index: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: HashMap::new(),
                next_index,
            }),
        }
    }

    pub fn lookup(&self, digest: &Hash) -> Option<Arc<Task>> {
        self.inner.lock().tasks.get(digest).cloned()
    }

    /// Register `digest` unless already present.
    ///
    /// For a new digest, `reserve` runs inside the critical section with the
    /// index about to be assigned. If it fails nothing is recorded and the
    /// index stays unissued. Once every index has been issued, new digests
    /// fail with [`RegisterError::Exhausted`] without running the hook.
    pub fn register<R, E>(
        &self,
        digest: Hash,
        descriptor: &TaskDescriptor,
        reserve: impl FnOnce(TaskIndex) -> Result<R, E>,
    ) -> Result<Registration<R>, RegisterError<E>> {
        let mut inner = self.inner.lock();
        if let Some(task) = inner.tasks.get(&digest) {
            return Ok(Registration::Existing(task.clone()));
        }

        let index = u32::try_from(inner.next_index)
            .map(TaskIndex)
            .map_err(|_| RegisterError::Exhausted)?;
        let reserved = reserve(index).map_err(RegisterError::Reserve)?;
        inner.next_index += 1;

        let task = Arc::new(Task {
            index,
            digest,
            descriptor: descriptor.clone(),
            created_at: Instant::now(),
        });
        inner.tasks.insert(digest, task.clone());
        Ok(Registration::New(task, reserved))
    }

    /// Remove a task. Returns `None` if it was already removed.
    pub fn remove(&self, digest: &Hash) -> Option<Arc<Task>> {
        self.inner.lock().tasks.remove(digest)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
