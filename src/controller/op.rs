//! Operations proposed to the consensus log and their results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::{Config, GroupId, ShardId};

/// Opaque identifier stable for a logical caller across retries.
pub type ClientId = u64;

/// Per-client operation id, monotonically increasing from 1.
pub type OpId = u64;

/// Query version sentinel meaning "the latest configuration".
pub const LATEST: i64 = -1;

/// A client-issued operation as it travels through the consensus log.
///
/// `last_acked` is the highest op id for which this client has observed a
/// reply; the applier uses it to garbage-collect cached results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub client_id: ClientId,
    pub op_id: OpId,
    #[serde(default)]
    pub last_acked: OpId,
    pub op: Op,
}

/// The four controller operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Op {
    /// Add new replica groups and rebalance.
    Join { servers: BTreeMap<GroupId, Vec<String>> },
    /// Remove replica groups and rebalance.
    Leave { gids: Vec<GroupId> },
    /// Force one shard onto one group, bypassing the balancer.
    Move { shard: ShardId, gid: GroupId },
    /// Read one configuration version (`LATEST` for the newest).
    Query { num: i64 },
}

/// Outcome of applying one committed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpResult {
    /// A mutation produced the configuration with this version number.
    Applied { num: u64 },
    /// A query resolved to this configuration.
    Config(Config),
    /// The operation committed but its arguments were invalid; no new
    /// configuration was produced.
    Invalid(String),
    /// The queried version does not exist.
    NotFound { num: i64 },
}

impl OpResult {
    /// Wire-level `err` field: `"OK"` on success, a description otherwise.
    pub fn err_string(&self) -> String {
        match self {
            OpResult::Applied { .. } | OpResult::Config(_) => "OK".to_string(),
            OpResult::Invalid(msg) => msg.clone(),
            OpResult::NotFound { num } => format!("no such config version: {}", num),
        }
    }
}

/// Errors surfaced to RPC callers.
///
/// `NotLeader` covers every case where this replica cannot confirm the
/// operation committed: a rejected proposal, a lost leadership mid-flight,
/// or a timed-out wait for the commit notification. The caller retries
/// against another replica; deduplication makes the retry safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// This replica cannot guarantee the operation committed.
    NotLeader,
    /// The controller is shutting down.
    Shutdown,
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::NotLeader => write!(f, "not the leader"),
            ControllerError::Shutdown => write!(f, "controller shut down"),
        }
    }
}

impl std::error::Error for ControllerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_err_string() {
        assert_eq!(OpResult::Applied { num: 4 }.err_string(), "OK");
        assert_eq!(
            OpResult::Invalid("group 7 already joined".into()).err_string(),
            "group 7 already joined"
        );
        assert!(OpResult::NotFound { num: 12 }.err_string().contains("12"));
    }

    #[test]
    fn test_request_round_trip() {
        let request = Request {
            client_id: 42,
            op_id: 3,
            last_acked: 2,
            op: Op::Move { shard: 1, gid: 100 },
        };
        let bytes = serde_json::to_vec(&request).unwrap();
        let restored: Request = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored.client_id, 42);
        assert_eq!(restored.op_id, 3);
        assert!(matches!(restored.op, Op::Move { shard: 1, gid: 100 }));
    }

    #[test]
    fn test_last_acked_defaults_to_zero() {
        let json = r#"{"client_id":1,"op_id":1,"op":{"Query":{"num":-1}}}"#;
        let request: Request = serde_json::from_str(json).unwrap();
        assert_eq!(request.last_acked, 0);
    }
}
