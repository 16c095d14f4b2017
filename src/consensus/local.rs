//! In-process consensus log.
//!
//! `LocalLog` commits accepted proposals immediately, in order, to a single
//! commit stream. It backs the single-replica server binary and the test
//! harness, which also uses its failure-injection knobs: demoting leadership,
//! swallowing upcoming commits (a lost log slot), and re-committing an
//! already-committed operation (a duplicate after leader changeover).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::traits::{CommittedEntry, ConsensusError, ConsensusLog, Proposal};
use crate::controller::op::Request;

struct LogState {
    term: u64,
    leader: bool,
    /// Committed operations, 1-based by position.
    entries: Vec<Request>,
    /// Number of upcoming proposals to accept but never commit.
    drop_next: usize,
    commit_tx: mpsc::Sender<CommittedEntry>,
}

/// Single-replica consensus log committing in proposal order.
pub struct LocalLog {
    state: Mutex<LogState>,
}

impl LocalLog {
    /// Create a log (initially leader, term 1) and its commit stream.
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<CommittedEntry>) {
        let (commit_tx, commit_rx) = mpsc::channel(capacity);
        let log = LocalLog {
            state: Mutex::new(LogState {
                term: 1,
                leader: true,
                entries: Vec::new(),
                drop_next: 0,
                commit_tx,
            }),
        };
        (Arc::new(log), commit_rx)
    }

    /// Grant or revoke leadership. While demoted, proposals are rejected.
    pub async fn set_leader(&self, leader: bool) {
        let mut state = self.state.lock().await;
        if leader && !state.leader {
            state.term += 1;
        }
        state.leader = leader;
    }

    pub async fn is_leader(&self) -> bool {
        self.state.lock().await.leader
    }

    pub async fn term(&self) -> u64 {
        self.state.lock().await.term
    }

    /// Accept but never commit the next `n` proposals, as if their log slots
    /// were overwritten by a different leader's entries.
    pub async fn drop_next(&self, n: usize) {
        self.state.lock().await.drop_next += n;
    }

    /// Re-deliver the operation committed at `index` (1-based) under a fresh
    /// index, as happens when a retried proposal commits twice.
    pub async fn recommit(&self, index: u64) {
        let mut state = self.state.lock().await;
        let Some(request) = state.entries.get(index as usize - 1).cloned() else {
            return;
        };
        state.entries.push(request.clone());
        let entry = CommittedEntry {
            index: state.entries.len() as u64,
            request,
        };
        let _ = state.commit_tx.send(entry).await;
    }

    /// Number of committed entries.
    pub async fn committed(&self) -> u64 {
        self.state.lock().await.entries.len() as u64
    }
}

#[async_trait]
impl ConsensusLog for LocalLog {
    async fn propose(&self, request: Request) -> Result<Proposal, ConsensusError> {
        let mut state = self.state.lock().await;
        if !state.leader {
            return Ok(Proposal {
                index: 0,
                term: state.term,
                is_leader: false,
            });
        }

        if state.drop_next > 0 {
            // Accepted into a slot that will never commit.
            state.drop_next -= 1;
            return Ok(Proposal {
                index: state.entries.len() as u64 + 1,
                term: state.term,
                is_leader: true,
            });
        }

        state.entries.push(request.clone());
        let index = state.entries.len() as u64;
        let term = state.term;
        state
            .commit_tx
            .send(CommittedEntry { index, request })
            .await
            .map_err(|_| ConsensusError::Unavailable)?;

        Ok(Proposal {
            index,
            term,
            is_leader: true,
        })
    }
}
