//! Shard-assignment controller
//!
//! Maintains a versioned, replicated mapping from data shards to the replica
//! groups that serve them. Mutations (Join/Leave/Move) and Queries are
//! committed through an abstract consensus log and applied by a single
//! sequential state machine, so every replica derives the identical
//! configuration history.

pub mod api;
pub mod consensus;
pub mod controller;

/// Testing utilities for integration tests.
pub mod testing;
