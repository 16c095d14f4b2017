//! Retrying controller client.
//!
//! Wraps the HTTP API with the retry discipline the controller's dedup layer
//! expects: a stable random client id, per-operation ids that increase only
//! after success, and the same op id reused across retries so a duplicate
//! commit collapses into the cached result. The client remembers the last
//! replica that answered and cycles through the others on `wrong_leader` or
//! transport failure.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::http::{
    JoinRequest, LeaveRequest, MoveRequest, OpReply, QueryRequest, QueryReply,
};
use crate::controller::op::{ClientId, OpId};
use crate::controller::{Config, GroupId, ShardId};

/// Errors surfaced to users of the client. Leadership changes and transport
/// failures are retried internally and never escape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The controller committed the operation but rejected its arguments.
    Rejected(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Rejected(msg) => write!(f, "operation rejected: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

/// A logical caller of the controller service.
pub struct ControllerClient {
    /// Replica addresses, `host:port`.
    servers: Vec<String>,
    http: reqwest::Client,
    client_id: ClientId,
    next_op_id: OpId,
    last_acked: OpId,
    /// Index of the replica that last answered us.
    last_leader: usize,
}

impl ControllerClient {
    /// Create a client for the given replica addresses.
    ///
    /// Panics if `servers` is empty; the retry loop needs at least one
    /// replica to cycle over.
    pub fn new(servers: Vec<String>) -> Self {
        assert!(!servers.is_empty(), "at least one replica address required");
        ControllerClient {
            servers,
            http: reqwest::Client::new(),
            client_id: rand::rng().random(),
            next_op_id: 1,
            last_acked: 0,
            last_leader: 0,
        }
    }

    /// Add replica groups; resolves once some replica confirms the commit.
    pub async fn join(
        &mut self,
        servers: BTreeMap<GroupId, Vec<String>>,
    ) -> Result<(), ClientError> {
        let op_id = self.next_op_id;
        let request = JoinRequest {
            client_id: self.client_id,
            op_id,
            last_acked: self.last_acked,
            servers,
        };
        let reply: OpReply = self.call("join", &request).await;
        self.finish(op_id, reply.err)
    }

    /// Remove replica groups.
    pub async fn leave(&mut self, gids: Vec<GroupId>) -> Result<(), ClientError> {
        let op_id = self.next_op_id;
        let request = LeaveRequest {
            client_id: self.client_id,
            op_id,
            last_acked: self.last_acked,
            gids,
        };
        let reply: OpReply = self.call("leave", &request).await;
        self.finish(op_id, reply.err)
    }

    /// Assign one shard to one group directly.
    pub async fn move_shard(&mut self, shard: ShardId, gid: GroupId) -> Result<(), ClientError> {
        let op_id = self.next_op_id;
        let request = MoveRequest {
            client_id: self.client_id,
            op_id,
            last_acked: self.last_acked,
            shard,
            gid,
        };
        let reply: OpReply = self.call("move", &request).await;
        self.finish(op_id, reply.err)
    }

    /// Fetch a configuration version (-1 for the latest).
    pub async fn query(&mut self, num: i64) -> Result<Config, ClientError> {
        let op_id = self.next_op_id;
        let request = QueryRequest {
            client_id: self.client_id,
            op_id,
            last_acked: self.last_acked,
            num,
        };
        let reply: QueryReply = self.call("query", &request).await;
        self.next_op_id = op_id + 1;
        self.last_acked = op_id;
        match reply.config {
            Some(config) => Ok(config),
            None => Err(ClientError::Rejected(reply.err)),
        }
    }

    /// The id this client identifies itself with.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// POST one operation, retrying across replicas until one that is not
    /// `wrong_leader` answers. The op id stays fixed for the whole loop.
    async fn call<Req, Reply>(&mut self, path: &str, request: &Req) -> Reply
    where
        Req: Serialize,
        Reply: DeserializeOwned + WrongLeader,
    {
        let mut attempt = 0usize;
        loop {
            let index = (self.last_leader + attempt) % self.servers.len();
            let url = format!("http://{}/ctrl/{}", self.servers[index], path);

            let response = self.http.post(&url).json(request).send().await;
            if let Ok(response) = response {
                if let Ok(reply) = response.json::<Reply>().await {
                    if !reply.wrong_leader() {
                        self.last_leader = index;
                        return reply;
                    }
                }
            }

            attempt += 1;
            let backoff = rand::rng().random_range(20..60);
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }
    }

    /// Advance op-id bookkeeping after a committed reply.
    fn finish(&mut self, op_id: OpId, err: String) -> Result<(), ClientError> {
        self.next_op_id = op_id + 1;
        self.last_acked = op_id;
        if err == "OK" {
            Ok(())
        } else {
            Err(ClientError::Rejected(err))
        }
    }
}

/// Replies the retry loop can inspect for leadership.
trait WrongLeader {
    fn wrong_leader(&self) -> bool;
}

impl WrongLeader for OpReply {
    fn wrong_leader(&self) -> bool {
        self.wrong_leader
    }
}

impl WrongLeader for QueryReply {
    fn wrong_leader(&self) -> bool {
        self.wrong_leader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clients_get_distinct_ids() {
        let a = ControllerClient::new(vec!["127.0.0.1:1".to_string()]);
        let b = ControllerClient::new(vec!["127.0.0.1:1".to_string()]);
        // Random 64-bit ids; a collision here would be astonishing.
        assert_ne!(a.client_id(), b.client_id());
    }

    #[test]
    #[should_panic(expected = "at least one replica address")]
    fn test_empty_server_list_is_rejected() {
        let _ = ControllerClient::new(Vec::new());
    }

    #[test]
    fn test_finish_advances_op_id() {
        let mut client = ControllerClient::new(vec!["127.0.0.1:1".to_string()]);
        assert!(client.finish(1, "OK".to_string()).is_ok());
        assert_eq!(client.next_op_id, 2);
        assert_eq!(client.last_acked, 1);

        // A rejected op still consumes its id; retrying it would be a new op.
        let err = client.finish(2, "unknown group 7".to_string()).unwrap_err();
        assert_eq!(err, ClientError::Rejected("unknown group 7".to_string()));
        assert_eq!(client.next_op_id, 3);
    }
}
