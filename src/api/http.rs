//! HTTP API for the shard-assignment controller
//!
//! Exposes the four operations plus an introspection endpoint:
//! - `POST /ctrl/join`   - add replica groups
//! - `POST /ctrl/leave`  - remove replica groups
//! - `POST /ctrl/move`   - force one shard onto one group
//! - `POST /ctrl/query`  - read a configuration version
//! - `GET  /ctrl/status` - latest version and membership summary
//!
//! Replies always carry HTTP 200; the outcome lives in the body's
//! `wrong_leader` and `err` fields so clients can retry other replicas
//! without parsing status codes.

use std::collections::BTreeMap;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::controller::op::{ClientId, ControllerError, Op, OpId, OpResult, Request};
use crate::controller::{Config, ControllerHandle, GroupId, ShardId, NSHARDS};

/// Request body for Join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub client_id: ClientId,
    pub op_id: OpId,
    #[serde(default)]
    pub last_acked: OpId,
    /// New group id -> server endpoints.
    pub servers: BTreeMap<GroupId, Vec<String>>,
}

/// Request body for Leave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub client_id: ClientId,
    pub op_id: OpId,
    #[serde(default)]
    pub last_acked: OpId,
    pub gids: Vec<GroupId>,
}

/// Request body for Move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    pub client_id: ClientId,
    pub op_id: OpId,
    #[serde(default)]
    pub last_acked: OpId,
    pub shard: ShardId,
    pub gid: GroupId,
}

/// Request body for Query. `num == -1` means latest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub client_id: ClientId,
    pub op_id: OpId,
    #[serde(default)]
    pub last_acked: OpId,
    pub num: i64,
}

/// Reply for the three mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpReply {
    pub wrong_leader: bool,
    /// `"OK"` or a descriptive failure.
    pub err: String,
}

/// Reply for Query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReply {
    pub wrong_leader: bool,
    pub err: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,
}

/// Reply for the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    /// Latest configuration version.
    pub latest_num: u64,
    /// Number of stored versions.
    pub versions: u64,
    /// Member group count in the latest configuration.
    pub groups: usize,
    /// Current shard ownership.
    pub shards: [GroupId; NSHARDS],
}

/// Create the controller's HTTP router.
pub fn create_router(handle: ControllerHandle) -> Router {
    Router::new()
        .route("/ctrl/join", post(handle_join))
        .route("/ctrl/leave", post(handle_leave))
        .route("/ctrl/move", post(handle_move))
        .route("/ctrl/query", post(handle_query))
        .route("/ctrl/status", get(handle_status))
        .with_state(handle)
}

fn mutation_reply(outcome: Result<OpResult, ControllerError>) -> OpReply {
    match outcome {
        Ok(result) => OpReply {
            wrong_leader: false,
            err: result.err_string(),
        },
        Err(err) => OpReply {
            wrong_leader: true,
            err: err.to_string(),
        },
    }
}

async fn handle_join(
    State(handle): State<ControllerHandle>,
    Json(req): Json<JoinRequest>,
) -> Json<OpReply> {
    let outcome = handle
        .submit(Request {
            client_id: req.client_id,
            op_id: req.op_id,
            last_acked: req.last_acked,
            op: Op::Join {
                servers: req.servers,
            },
        })
        .await;
    Json(mutation_reply(outcome))
}

async fn handle_leave(
    State(handle): State<ControllerHandle>,
    Json(req): Json<LeaveRequest>,
) -> Json<OpReply> {
    let outcome = handle
        .submit(Request {
            client_id: req.client_id,
            op_id: req.op_id,
            last_acked: req.last_acked,
            op: Op::Leave { gids: req.gids },
        })
        .await;
    Json(mutation_reply(outcome))
}

async fn handle_move(
    State(handle): State<ControllerHandle>,
    Json(req): Json<MoveRequest>,
) -> Json<OpReply> {
    let outcome = handle
        .submit(Request {
            client_id: req.client_id,
            op_id: req.op_id,
            last_acked: req.last_acked,
            op: Op::Move {
                shard: req.shard,
                gid: req.gid,
            },
        })
        .await;
    Json(mutation_reply(outcome))
}

async fn handle_query(
    State(handle): State<ControllerHandle>,
    Json(req): Json<QueryRequest>,
) -> Json<QueryReply> {
    let outcome = handle
        .submit(Request {
            client_id: req.client_id,
            op_id: req.op_id,
            last_acked: req.last_acked,
            op: Op::Query { num: req.num },
        })
        .await;

    let reply = match outcome {
        Ok(OpResult::Config(config)) => QueryReply {
            wrong_leader: false,
            err: "OK".to_string(),
            config: Some(config),
        },
        Ok(result) => QueryReply {
            wrong_leader: false,
            err: result.err_string(),
            config: None,
        },
        Err(err) => QueryReply {
            wrong_leader: true,
            err: err.to_string(),
            config: None,
        },
    };
    Json(reply)
}

async fn handle_status(State(handle): State<ControllerHandle>) -> Json<StatusReply> {
    let latest = handle.latest_config();
    Json(StatusReply {
        latest_num: latest.num,
        versions: handle.config_count() as u64,
        groups: latest.groups.len(),
        shards: latest.shards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::local::LocalLog;
    use crate::controller::{ControllerServer, ControllerSettings};
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn test_router() -> (Router, Arc<LocalLog>) {
        let (log, commits) = LocalLog::new(64);
        let settings = ControllerSettings::default().with_wait_timeout(Duration::from_millis(100));
        let server = ControllerServer::with_settings(log.clone(), commits, settings);
        (create_router(server.start()), log)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        app: Router,
        uri: &str,
        body: serde_json::Value,
    ) -> T {
        let request = HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_join_endpoint() {
        let (app, _log) = test_router();
        let reply: OpReply = post_json(
            app,
            "/ctrl/join",
            serde_json::json!({
                "client_id": 1, "op_id": 1,
                "servers": { "100": ["s1:7000"] }
            }),
        )
        .await;
        assert!(!reply.wrong_leader);
        assert_eq!(reply.err, "OK");
    }

    #[tokio::test]
    async fn test_query_returns_config() {
        let (app, _log) = test_router();
        let _: OpReply = post_json(
            app.clone(),
            "/ctrl/join",
            serde_json::json!({
                "client_id": 1, "op_id": 1,
                "servers": { "100": ["s1:7000"] }
            }),
        )
        .await;

        let reply: QueryReply = post_json(
            app,
            "/ctrl/query",
            serde_json::json!({ "client_id": 1, "op_id": 2, "num": -1 }),
        )
        .await;
        assert!(!reply.wrong_leader);
        let config = reply.config.unwrap();
        assert_eq!(config.num, 1);
        assert_eq!(config.shards, [100; NSHARDS]);
    }

    #[tokio::test]
    async fn test_wrong_leader_reply() {
        let (app, log) = test_router();
        log.set_leader(false).await;

        let reply: OpReply = post_json(
            app,
            "/ctrl/leave",
            serde_json::json!({ "client_id": 1, "op_id": 1, "gids": [100] }),
        )
        .await;
        assert!(reply.wrong_leader);
    }

    #[tokio::test]
    async fn test_invalid_move_reports_error() {
        let (app, _log) = test_router();
        let reply: OpReply = post_json(
            app,
            "/ctrl/move",
            serde_json::json!({ "client_id": 1, "op_id": 1, "shard": 99, "gid": 100 }),
        )
        .await;
        assert!(!reply.wrong_leader);
        assert!(reply.err.contains("out of range"));
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (app, _log) = test_router();
        let request = HttpRequest::builder()
            .method("GET")
            .uri("/ctrl/status")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let status: StatusReply = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(status.latest_num, 0);
        assert_eq!(status.versions, 1);
        assert_eq!(status.groups, 0);
    }
}
