//! Consensus log abstraction
//!
//! - `ConsensusLog`: the propose/commit seam the controller builds on
//! - `LocalLog`: in-process implementation for single-replica use and tests

pub mod local;
pub mod traits;

pub use traits::{CommittedEntry, ConsensusError, ConsensusLog, Proposal};
