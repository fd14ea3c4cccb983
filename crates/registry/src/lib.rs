//! Operator registry access for the aggregator.
//!
//! The aggregator needs, for every task, the operators registered in the
//! task's quorums at the task's reference block: their keys to verify
//! signatures, their stakes to weigh them, and the history indices the
//! on-chain verifier needs to check the final proof.
//!
//! - [`OperatorStateReader`] is the chain-read seam.
//! - [`OperatorRegistryCache`] memoizes snapshots per (block, quorum set).
//! - [`StaticOperatorRegistry`] serves a fixed operator table, for
//!   simulation and for deployments that pin their operator set.

mod cache;
mod reader;
mod static_registry;

pub use cache::{OperatorRegistryCache, DEFAULT_CACHE_CAPACITY};
pub use reader::{OperatorStateReader, RegistryError};
pub use static_registry::StaticOperatorRegistry;
