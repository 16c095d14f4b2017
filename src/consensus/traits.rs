//! The consensus log seam.
//!
//! The controller consumes consensus as an abstract propose/commit primitive:
//! `propose` hands an operation to the log, and committed operations arrive
//! on an mpsc stream in strictly increasing index order, exactly once per
//! index. Leader election, replication, and recovery live behind this trait.

use std::fmt;

use async_trait::async_trait;

use crate::controller::op::Request;

/// Outcome of handing an operation to the consensus log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Log index the operation was placed at (0 when not leader).
    pub index: u64,
    /// Term at proposal time.
    pub term: u64,
    /// Whether this replica believed itself leader when proposing. `false`
    /// means the operation was not accepted and the caller should retry
    /// against another replica.
    pub is_leader: bool,
}

/// An operation delivered by the commit stream.
#[derive(Debug, Clone)]
pub struct CommittedEntry {
    pub index: u64,
    pub request: Request,
}

/// Errors from the consensus layer itself (not leadership outcomes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// The log is shut down or unreachable.
    Unavailable,
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::Unavailable => write!(f, "consensus log unavailable"),
        }
    }
}

impl std::error::Error for ConsensusError {}

/// Abstract replicated log.
#[async_trait]
pub trait ConsensusLog: Send + Sync {
    /// Propose an operation for commitment. A `Proposal` with
    /// `is_leader == false` means the operation was not accepted here.
    async fn propose(&self, request: Request) -> Result<Proposal, ConsensusError>;
}
