//! Versioned shard-to-group configuration snapshots.
//!
//! A `Config` is immutable once created: the only way forward is appending a
//! new one with the next version number. Config 0 has every shard unassigned
//! and no member groups.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Number of shards in the keyspace. Fixed system-wide.
pub const NSHARDS: usize = 10;

/// Identifier of a replica group. Group 0 is reserved for "unassigned".
pub type GroupId = u64;

/// Shard identifier in `[0, NSHARDS)`.
pub type ShardId = usize;

/// The reserved group id meaning "no group owns this shard".
pub const GID_UNASSIGNED: GroupId = 0;

/// An assignment of shards to replica groups at one point in history.
///
/// `groups` is a `BTreeMap` so that iteration and serialization order are
/// deterministic on every replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Version number; 0 is the initial configuration.
    pub num: u64,
    /// Owner group for each shard, indexed by shard id.
    pub shards: [GroupId; NSHARDS],
    /// Member groups and their server endpoints.
    pub groups: BTreeMap<GroupId, Vec<String>>,
}

impl Config {
    /// The initial configuration: no groups, all shards unassigned.
    pub fn initial() -> Self {
        Config {
            num: 0,
            shards: [GID_UNASSIGNED; NSHARDS],
            groups: BTreeMap::new(),
        }
    }

    /// Shard count per member group (groups owning nothing are included).
    pub fn shard_counts(&self) -> BTreeMap<GroupId, usize> {
        let mut counts: BTreeMap<GroupId, usize> =
            self.groups.keys().map(|&gid| (gid, 0)).collect();
        for &owner in &self.shards {
            if let Some(count) = counts.get_mut(&owner) {
                *count += 1;
            }
        }
        counts
    }

    /// Whether shard counts across member groups differ by at most one.
    pub fn is_balanced(&self) -> bool {
        let counts = self.shard_counts();
        match (counts.values().min(), counts.values().max()) {
            (Some(min), Some(max)) => max - min <= 1,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_config() {
        let config = Config::initial();
        assert_eq!(config.num, 0);
        assert!(config.groups.is_empty());
        assert!(config.shards.iter().all(|&gid| gid == GID_UNASSIGNED));
    }

    #[test]
    fn test_shard_counts_ignores_unassigned() {
        let mut config = Config::initial();
        config.groups.insert(1, vec!["a".into()]);
        config.shards[0] = 1;
        config.shards[1] = 1;

        let counts = config.shard_counts();
        assert_eq!(counts.get(&1), Some(&2));
        assert_eq!(counts.get(&GID_UNASSIGNED), None);
    }

    #[test]
    fn test_is_balanced() {
        let mut config = Config::initial();
        config.groups.insert(1, vec!["a".into()]);
        config.groups.insert(2, vec!["b".into()]);
        config.shards = [1, 1, 1, 1, 1, 2, 2, 2, 2, 2];
        assert!(config.is_balanced());

        config.shards = [1, 1, 1, 1, 1, 1, 1, 2, 2, 2];
        assert!(!config.is_balanced());
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut config = Config::initial();
        config.num = 3;
        config.groups.insert(100, vec!["s1:7000".into(), "s2:7000".into()]);
        config.shards = [100; NSHARDS];

        let bytes = serde_json::to_vec(&config).unwrap();
        let restored: Config = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored, config);
    }
}
