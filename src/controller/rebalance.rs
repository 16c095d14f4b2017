//! Deterministic shard rebalancing.
//!
//! Every replica must compute the identical new assignment from the identical
//! committed operation, so nothing here may depend on unordered-map iteration:
//! group ids are always walked in ascending order, shards in ascending order.
//!
//! Balancing policy: each member group's shard count differs from any other's
//! by at most one, and the minimum number of shards moves. When `NSHARDS`
//! doesn't divide evenly, the groups currently holding the most shards keep
//! the extra one, ties going to the lowest gid. When a group is over quota,
//! its highest-numbered shards are the ones that move.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use super::config::{Config, GroupId, ShardId, GID_UNASSIGNED, NSHARDS};

/// The assignment and membership for a new configuration.
pub type NewAssignment = ([GroupId; NSHARDS], BTreeMap<GroupId, Vec<String>>);

/// Compute a balanced assignment from a previous one and the member set.
///
/// Shards keep their owner wherever possible: only shards whose owner left
/// the member set, unassigned shards, and the overflow of over-quota groups
/// are reassigned. With no members at all, every shard becomes unassigned.
pub fn rebalance(prev: &[GroupId; NSHARDS], members: &BTreeSet<GroupId>) -> [GroupId; NSHARDS] {
    if members.is_empty() {
        return [GID_UNASSIGNED; NSHARDS];
    }

    let gids: Vec<GroupId> = members.iter().copied().collect();
    let base = NSHARDS / gids.len();
    let extra = NSHARDS % gids.len();

    // Remaining capacity per group: base, plus one for the `extra` groups
    // currently holding the most shards (ties to the lowest gid). Awarding
    // the extras by current load keeps a balanced incumbent at its count
    // instead of forcing it to shed a shard to a lower-numbered newcomer.
    let mut by_load = gids.clone();
    by_load.sort_by_key(|&gid| {
        let held = prev.iter().filter(|&&owner| owner == gid).count();
        (Reverse(held), gid)
    });

    let mut capacity: BTreeMap<GroupId, usize> =
        gids.iter().map(|&gid| (gid, base)).collect();
    for &gid in by_load.iter().take(extra) {
        if let Some(room) = capacity.get_mut(&gid) {
            *room += 1;
        }
    }

    let mut next = *prev;
    let mut orphans: Vec<ShardId> = Vec::new();

    // Ascending shard scan: a shard stays put while its owner is a member
    // with capacity left, so an over-quota group sheds its highest shards.
    for shard in 0..NSHARDS {
        match capacity.get_mut(&next[shard]) {
            Some(room) if *room > 0 => *room -= 1,
            _ => {
                next[shard] = GID_UNASSIGNED;
                orphans.push(shard);
            }
        }
    }

    // Hand orphans to under-quota groups, lowest gid first, lowest shard first.
    let mut orphans = orphans.into_iter();
    for &gid in &gids {
        for _ in 0..capacity[&gid] {
            if let Some(shard) = orphans.next() {
                next[shard] = gid;
            }
        }
    }

    next
}

/// Apply a Join: add `servers` as new groups and rebalance.
///
/// Re-joining an existing group id is rejected, as is the reserved id 0.
pub fn join(
    prev: &Config,
    servers: &BTreeMap<GroupId, Vec<String>>,
) -> Result<NewAssignment, String> {
    if servers.is_empty() {
        return Err("join with no groups".to_string());
    }
    for &gid in servers.keys() {
        if gid == GID_UNASSIGNED {
            return Err("group id 0 is reserved".to_string());
        }
        if prev.groups.contains_key(&gid) {
            return Err(format!("group {} already joined", gid));
        }
    }

    let mut groups = prev.groups.clone();
    for (&gid, endpoints) in servers {
        groups.insert(gid, endpoints.clone());
    }
    let members: BTreeSet<GroupId> = groups.keys().copied().collect();
    Ok((rebalance(&prev.shards, &members), groups))
}

/// Apply a Leave: remove the named groups and rebalance. Unknown group ids
/// are ignored. With no groups left, all shards become unassigned.
pub fn leave(prev: &Config, gids: &[GroupId]) -> NewAssignment {
    let mut groups = prev.groups.clone();
    for gid in gids {
        groups.remove(gid);
    }
    let members: BTreeSet<GroupId> = groups.keys().copied().collect();
    (rebalance(&prev.shards, &members), groups)
}

/// Apply a Move: assign exactly one shard to the named group, bypassing the
/// balancer. The target must be a member, but may have zero servers; the
/// controller doesn't validate liveness.
pub fn move_shard(prev: &Config, shard: ShardId, gid: GroupId) -> Result<NewAssignment, String> {
    if shard >= NSHARDS {
        return Err(format!("shard {} out of range [0, {})", shard, NSHARDS));
    }
    if !prev.groups.contains_key(&gid) {
        return Err(format!("unknown group {}", gid));
    }

    let mut shards = prev.shards;
    shards[shard] = gid;
    Ok((shards, prev.groups.clone()))
}
