//! The sequential consumer of the consensus log's commit stream.
//!
//! All state mutation (dedup table, config store, rebalancing) happens in
//! this one logical stream, so there are no races by construction. RPC
//! handlers only observe results through the waiter registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::dedup::{DedupCheck, DedupTable};
use super::op::{ClientId, Op, OpId, OpResult, LATEST};
use super::rebalance;
use super::store::SharedStore;
use crate::consensus::CommittedEntry;

/// Registry of RPC handlers waiting for their operation to apply.
///
/// Handlers register *before* proposing so a fast commit can't slip past
/// them. A second registration for the same key (a concurrent retry through
/// this replica) replaces the first; the displaced waiter observes a closed
/// channel and replies not-leader, and the client's retry resolves via dedup.
#[derive(Clone, Default)]
pub struct Waiters {
    inner: Arc<Mutex<HashMap<(ClientId, OpId), oneshot::Sender<OpResult>>>>,
}

impl Waiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `(client_id, op_id)`.
    pub fn register(&self, key: (ClientId, OpId)) -> oneshot::Receiver<OpResult> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().unwrap().insert(key, tx);
        rx
    }

    /// Give up waiting (timeout or rejected proposal).
    pub fn cancel(&self, key: (ClientId, OpId)) {
        self.inner.lock().unwrap().remove(&key);
    }

    /// Wake the handler waiting on `key`, if any.
    fn notify(&self, key: (ClientId, OpId), result: OpResult) {
        if let Some(tx) = self.inner.lock().unwrap().remove(&key) {
            // The handler may have timed out concurrently; that's fine.
            let _ = tx.send(result);
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

/// Applies committed operations in commit order.
pub struct Applier {
    commits: mpsc::Receiver<CommittedEntry>,
    store: SharedStore,
    dedup: DedupTable,
    waiters: Waiters,
}

impl Applier {
    pub fn new(commits: mpsc::Receiver<CommittedEntry>, store: SharedStore, waiters: Waiters) -> Self {
        Applier {
            commits,
            store,
            dedup: DedupTable::new(),
            waiters,
        }
    }

    /// Consume the commit stream until the consensus log shuts down.
    /// Blocks only on the next commit; never performs I/O.
    pub async fn run(mut self) {
        while let Some(entry) = self.commits.recv().await {
            self.apply(entry);
        }
        debug!("commit stream closed, applier stopping");
    }

    fn apply(&mut self, entry: CommittedEntry) {
        let request = entry.request;
        let key = (request.client_id, request.op_id);

        self.dedup.acknowledge(request.client_id, request.last_acked);

        match self.dedup.check(request.client_id, request.op_id) {
            DedupCheck::AlreadyApplied(Some(result)) => {
                debug!(
                    index = entry.index,
                    client = request.client_id,
                    op = request.op_id,
                    "duplicate commit, replying with cached result"
                );
                self.waiters.notify(key, result.clone());
            }
            DedupCheck::AlreadyApplied(None) => {
                // Result already acknowledged and collected; nobody waits.
                warn!(
                    index = entry.index,
                    client = request.client_id,
                    op = request.op_id,
                    "duplicate commit of an acknowledged op, skipping"
                );
            }
            DedupCheck::ShouldApply => {
                let result = self.execute(&request.op);
                debug!(
                    index = entry.index,
                    client = request.client_id,
                    op = request.op_id,
                    err = %result.err_string(),
                    "applied operation"
                );
                self.dedup
                    .record(request.client_id, request.op_id, result.clone());
                self.waiters.notify(key, result);
            }
        }
    }

    /// Execute one not-yet-applied operation against the store.
    ///
    /// Invalid arguments produce an error result but never block progress;
    /// the operation simply appends no new configuration.
    fn execute(&mut self, op: &Op) -> OpResult {
        let mut store = self.store.lock().unwrap();
        match op {
            Op::Join { servers } => match rebalance::join(store.latest(), servers) {
                Ok((shards, groups)) => OpResult::Applied {
                    num: store.append(shards, groups),
                },
                Err(msg) => OpResult::Invalid(msg),
            },
            Op::Leave { gids } => {
                let (shards, groups) = rebalance::leave(store.latest(), gids);
                OpResult::Applied {
                    num: store.append(shards, groups),
                }
            }
            Op::Move { shard, gid } => match rebalance::move_shard(store.latest(), *shard, *gid) {
                Ok((shards, groups)) => OpResult::Applied {
                    num: store.append(shards, groups),
                },
                Err(msg) => OpResult::Invalid(msg),
            },
            Op::Query { num } => {
                if *num == LATEST {
                    return OpResult::Config(store.latest().clone());
                }
                u64::try_from(*num)
                    .ok()
                    .and_then(|n| store.get(n))
                    .map(|config| OpResult::Config(config.clone()))
                    .unwrap_or(OpResult::NotFound { num: *num })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::config::NSHARDS;
    use crate::controller::op::Request;
    use crate::controller::store::ConfigStore;
    use std::collections::BTreeMap;

    fn new_applier() -> (mpsc::Sender<CommittedEntry>, Applier, SharedStore, Waiters) {
        let (tx, rx) = mpsc::channel(16);
        let store: SharedStore = Arc::new(Mutex::new(ConfigStore::new()));
        let waiters = Waiters::new();
        let applier = Applier::new(rx, store.clone(), waiters.clone());
        (tx, applier, store, waiters)
    }

    fn join_request(client: ClientId, op: OpId, gid: u64) -> Request {
        let mut servers = BTreeMap::new();
        servers.insert(gid, vec![format!("server-{}", gid)]);
        Request {
            client_id: client,
            op_id: op,
            last_acked: 0,
            op: Op::Join { servers },
        }
    }

    #[test]
    fn test_apply_join_appends_config() {
        let (_tx, mut applier, store, _) = new_applier();
        applier.apply(CommittedEntry {
            index: 1,
            request: join_request(1, 1, 100),
        });

        let store = store.lock().unwrap();
        assert_eq!(store.latest().num, 1);
        assert_eq!(store.latest().shards, [100; NSHARDS]);
    }

    #[test]
    fn test_duplicate_commit_applies_once() {
        let (_tx, mut applier, store, _) = new_applier();
        let request = join_request(1, 1, 100);

        applier.apply(CommittedEntry {
            index: 1,
            request: request.clone(),
        });
        applier.apply(CommittedEntry { index: 2, request });

        // One state transition despite two commits.
        assert_eq!(store.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_commit_notifies_waiter_with_cached_result() {
        let (_tx, mut applier, _store, waiters) = new_applier();
        let request = join_request(1, 1, 100);

        applier.apply(CommittedEntry {
            index: 1,
            request: request.clone(),
        });

        // A retrying handler registers for the duplicate.
        let mut rx = waiters.register((1, 1));
        applier.apply(CommittedEntry { index: 2, request });
        assert_eq!(rx.try_recv().unwrap(), OpResult::Applied { num: 1 });
    }

    #[test]
    fn test_acknowledged_duplicate_never_reapplies() {
        let (_tx, mut applier, store, _) = new_applier();

        applier.apply(CommittedEntry {
            index: 1,
            request: join_request(1, 1, 100),
        });
        // Next op acknowledges op 1, dropping its cached result.
        let mut second = join_request(1, 2, 101);
        second.last_acked = 1;
        applier.apply(CommittedEntry {
            index: 2,
            request: second,
        });
        // A ghost duplicate of op 1 arrives late.
        applier.apply(CommittedEntry {
            index: 3,
            request: join_request(1, 1, 100),
        });

        // Two joins happened, not three.
        assert_eq!(store.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_op_records_error_and_continues() {
        let (_tx, mut applier, store, waiters) = new_applier();
        applier.apply(CommittedEntry {
            index: 1,
            request: join_request(1, 1, 100),
        });

        let mut rx = waiters.register((2, 1));
        applier.apply(CommittedEntry {
            index: 2,
            request: Request {
                client_id: 2,
                op_id: 1,
                last_acked: 0,
                op: Op::Move {
                    shard: NSHARDS,
                    gid: 100,
                },
            },
        });

        assert!(matches!(rx.try_recv().unwrap(), OpResult::Invalid(_)));
        // No config appended for the invalid move.
        assert_eq!(store.lock().unwrap().len(), 2);

        // The applier keeps making progress afterwards.
        applier.apply(CommittedEntry {
            index: 3,
            request: join_request(3, 1, 101),
        });
        assert_eq!(store.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_query_latest_and_by_version() {
        let (_tx, mut applier, _store, waiters) = new_applier();
        applier.apply(CommittedEntry {
            index: 1,
            request: join_request(1, 1, 100),
        });

        let mut rx = waiters.register((2, 1));
        applier.apply(CommittedEntry {
            index: 2,
            request: Request {
                client_id: 2,
                op_id: 1,
                last_acked: 0,
                op: Op::Query { num: LATEST },
            },
        });
        match rx.try_recv().unwrap() {
            OpResult::Config(config) => assert_eq!(config.num, 1),
            other => panic!("expected config, got {:?}", other),
        }

        let mut rx = waiters.register((2, 2));
        applier.apply(CommittedEntry {
            index: 3,
            request: Request {
                client_id: 2,
                op_id: 2,
                last_acked: 1,
                op: Op::Query { num: 0 },
            },
        });
        match rx.try_recv().unwrap() {
            OpResult::Config(config) => assert_eq!(config.num, 0),
            other => panic!("expected config, got {:?}", other),
        }
    }

    #[test]
    fn test_query_beyond_latest_is_not_found() {
        let (_tx, mut applier, _store, waiters) = new_applier();
        let mut rx = waiters.register((1, 1));
        applier.apply(CommittedEntry {
            index: 1,
            request: Request {
                client_id: 1,
                op_id: 1,
                last_acked: 0,
                op: Op::Query { num: 5 },
            },
        });
        assert_eq!(rx.try_recv().unwrap(), OpResult::NotFound { num: 5 });
    }

    #[test]
    fn test_waiter_registry_replaces_stale_entry() {
        let waiters = Waiters::new();
        let mut first = waiters.register((1, 1));
        let _second = waiters.register((1, 1));

        // The displaced waiter sees a closed channel.
        assert!(first.try_recv().is_err());
        assert_eq!(waiters.pending(), 1);
    }
}
