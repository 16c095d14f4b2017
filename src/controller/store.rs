//! Append-only store of configuration history.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::config::{Config, GroupId, NSHARDS};

/// Ordered sequence of configuration versions.
///
/// Versions are assigned sequentially starting at 0 and never reused or
/// reordered. Entries are immutable once appended. Only the applier writes;
/// concurrent readers go through [`SharedStore`].
#[derive(Debug)]
pub struct ConfigStore {
    history: Vec<Config>,
}

/// Shared store handle: written only by the applier, readable anywhere.
pub type SharedStore = Arc<Mutex<ConfigStore>>;

impl ConfigStore {
    /// Create a store seeded with the initial configuration (version 0).
    pub fn new() -> Self {
        ConfigStore {
            history: vec![Config::initial()],
        }
    }

    /// Append the next configuration, built from the given assignment and
    /// membership. Returns the new version number.
    pub fn append(
        &mut self,
        shards: [GroupId; NSHARDS],
        groups: BTreeMap<GroupId, Vec<String>>,
    ) -> u64 {
        let num = self.history.len() as u64;
        self.history.push(Config { num, shards, groups });
        num
    }

    /// Look up a specific version. Versions beyond the latest don't exist
    /// yet; waiting for them is the applier's job, not the store's.
    pub fn get(&self, num: u64) -> Option<&Config> {
        self.history.get(num as usize)
    }

    /// The most recently appended configuration.
    pub fn latest(&self) -> &Config {
        // The store always holds at least the initial config.
        self.history.last().expect("config history is never empty")
    }

    /// Number of stored versions (latest version number + 1). Never zero;
    /// the store is seeded with version 0.
    pub fn len(&self) -> usize {
        self.history.len()
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}
