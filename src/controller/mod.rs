//! The replicated configuration state machine.
//!
//! - `config`: versioned shard-to-group snapshots
//! - `op`: operations, results, and errors
//! - `store`: append-only configuration history
//! - `dedup`: at-most-once application per (client, op)
//! - `rebalance`: deterministic shard balancing
//! - `applier`: the sequential consumer of committed operations
//! - `server`: handler front end over a consensus log

pub mod applier;
pub mod config;
pub mod dedup;
pub mod op;
pub mod rebalance;
pub mod server;
pub mod settings;
pub mod store;

pub use config::{Config, GroupId, ShardId, GID_UNASSIGNED, NSHARDS};
pub use op::{ClientId, ControllerError, Op, OpId, OpResult, Request, LATEST};
pub use server::{ControllerHandle, ControllerServer};
pub use settings::ControllerSettings;
