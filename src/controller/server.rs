//! ControllerServer - assembles the applier over a consensus log and exposes
//! the four operations to concurrent RPC handlers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;

use super::applier::{Applier, Waiters};
use super::config::{Config, GroupId, ShardId};
use super::op::{ClientId, ControllerError, Op, OpId, OpResult, Request};
use super::settings::ControllerSettings;
use super::store::{ConfigStore, SharedStore};
use crate::consensus::{CommittedEntry, ConsensusLog};

/// One controller replica's state machine, not yet running.
pub struct ControllerServer {
    log: Arc<dyn ConsensusLog>,
    commits: mpsc::Receiver<CommittedEntry>,
    store: SharedStore,
    waiters: Waiters,
    settings: ControllerSettings,
}

/// Handle for submitting operations to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    log: Arc<dyn ConsensusLog>,
    store: SharedStore,
    waiters: Waiters,
    wait_timeout: Duration,
}

impl ControllerServer {
    /// Create a controller over a consensus log and its commit stream.
    pub fn with_settings(
        log: Arc<dyn ConsensusLog>,
        commits: mpsc::Receiver<CommittedEntry>,
        settings: ControllerSettings,
    ) -> Self {
        ControllerServer {
            log,
            commits,
            store: Arc::new(Mutex::new(ConfigStore::new())),
            waiters: Waiters::new(),
            settings,
        }
    }

    /// The shared config store (read-only outside the applier).
    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    /// Spawn the applier loop and return a handle for submitting operations.
    pub fn start(self) -> ControllerHandle {
        let handle = ControllerHandle {
            log: self.log,
            store: self.store.clone(),
            waiters: self.waiters.clone(),
            wait_timeout: self.settings.wait_timeout,
        };

        tokio::spawn(Applier::new(self.commits, self.store, self.waiters).run());

        handle
    }
}

impl ControllerHandle {
    /// Add new replica groups. Returns the applied result or not-leader.
    pub async fn join(
        &self,
        client_id: ClientId,
        op_id: OpId,
        servers: BTreeMap<GroupId, Vec<String>>,
    ) -> Result<OpResult, ControllerError> {
        self.submit(Request {
            client_id,
            op_id,
            last_acked: op_id.saturating_sub(1),
            op: Op::Join { servers },
        })
        .await
    }

    /// Remove replica groups.
    pub async fn leave(
        &self,
        client_id: ClientId,
        op_id: OpId,
        gids: Vec<GroupId>,
    ) -> Result<OpResult, ControllerError> {
        self.submit(Request {
            client_id,
            op_id,
            last_acked: op_id.saturating_sub(1),
            op: Op::Leave { gids },
        })
        .await
    }

    /// Assign one shard to one group directly.
    pub async fn move_shard(
        &self,
        client_id: ClientId,
        op_id: OpId,
        shard: ShardId,
        gid: GroupId,
    ) -> Result<OpResult, ControllerError> {
        self.submit(Request {
            client_id,
            op_id,
            last_acked: op_id.saturating_sub(1),
            op: Op::Move { shard, gid },
        })
        .await
    }

    /// Read a configuration version (`LATEST` / -1 for the newest).
    pub async fn query(
        &self,
        client_id: ClientId,
        op_id: OpId,
        num: i64,
    ) -> Result<OpResult, ControllerError> {
        self.submit(Request {
            client_id,
            op_id,
            last_acked: op_id.saturating_sub(1),
            op: Op::Query { num },
        })
        .await
    }

    /// Propose a fully-formed request and wait for the applier to confirm it.
    ///
    /// The waiter is registered before proposing so the notification can't be
    /// missed. A rejected proposal, a displaced waiter, and a timed-out wait
    /// all surface as `NotLeader`: the caller retries elsewhere and
    /// deduplication absorbs the duplicate.
    pub async fn submit(&self, request: Request) -> Result<OpResult, ControllerError> {
        let key = (request.client_id, request.op_id);
        let rx = self.waiters.register(key);

        let proposal = match self.log.propose(request).await {
            Ok(proposal) => proposal,
            Err(err) => {
                debug!(client = key.0, op = key.1, %err, "proposal failed");
                self.waiters.cancel(key);
                return Err(ControllerError::NotLeader);
            }
        };
        if !proposal.is_leader {
            self.waiters.cancel(key);
            return Err(ControllerError::NotLeader);
        }

        match timeout(self.wait_timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            // Displaced by a newer registration for the same (client, op).
            Ok(Err(_)) => Err(ControllerError::NotLeader),
            Err(_) => {
                debug!(
                    client = key.0,
                    op = key.1,
                    index = proposal.index,
                    "timed out waiting for commit notification"
                );
                self.waiters.cancel(key);
                Err(ControllerError::NotLeader)
            }
        }
    }

    /// Snapshot of the latest configuration, read directly from the store.
    /// For introspection only; consistent reads go through `query`.
    pub fn latest_config(&self) -> Config {
        self.store.lock().unwrap().latest().clone()
    }

    /// Number of stored configuration versions.
    pub fn config_count(&self) -> usize {
        self.store.lock().unwrap().len()
    }
}
