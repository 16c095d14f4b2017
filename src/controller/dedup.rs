//! Per-client deduplication of committed operations.
//!
//! The consensus log can commit the same client operation twice (a retried
//! proposal after leader changeover). The table records, per client, the
//! highest op id already applied and its result, so a duplicate is resolved
//! into the cached result instead of being re-applied.
//!
//! Memory is bounded by the acknowledgement watermark clients piggyback on
//! requests: once a client acknowledges an op id, the cached result is
//! dropped. The watermark itself is kept forever, so a late duplicate commit
//! of an already-acknowledged op can still never re-apply.

use std::collections::HashMap;

use super::op::{ClientId, OpId, OpResult};

/// Verdict for one committed (client, op) pair.
#[derive(Debug)]
pub enum DedupCheck<'a> {
    /// Already applied. The cached result is `None` if the client has since
    /// acknowledged it; no caller can be waiting in that case.
    AlreadyApplied(Option<&'a OpResult>),
    /// Not seen before; the applier must execute and then record the result.
    ShouldApply,
}

#[derive(Debug)]
struct DedupRecord {
    last_op_id: OpId,
    result: Option<OpResult>,
}

/// Tracks the highest applied op id and cached result per client.
///
/// Owned exclusively by the applier; never touched concurrently.
#[derive(Debug, Default)]
pub struct DedupTable {
    records: HashMap<ClientId, DedupRecord>,
}

impl DedupTable {
    pub fn new() -> Self {
        DedupTable {
            records: HashMap::new(),
        }
    }

    /// Check whether `(client_id, op_id)` was already applied.
    pub fn check(&self, client_id: ClientId, op_id: OpId) -> DedupCheck<'_> {
        match self.records.get(&client_id) {
            Some(record) if op_id <= record.last_op_id => {
                DedupCheck::AlreadyApplied(record.result.as_ref())
            }
            _ => DedupCheck::ShouldApply,
        }
    }

    /// Record the result of a freshly applied operation. The per-client op id
    /// never decreases.
    pub fn record(&mut self, client_id: ClientId, op_id: OpId, result: OpResult) {
        let record = self.records.entry(client_id).or_insert(DedupRecord {
            last_op_id: 0,
            result: None,
        });
        debug_assert!(op_id > record.last_op_id);
        record.last_op_id = op_id;
        record.result = Some(result);
    }

    /// Drop the cached result once the client acknowledges having seen it.
    /// The watermark stays so duplicates remain detectable.
    pub fn acknowledge(&mut self, client_id: ClientId, acked: OpId) {
        if let Some(record) = self.records.get_mut(&client_id) {
            if record.last_op_id <= acked {
                record.result = None;
            }
        }
    }

    /// Number of clients with a record.
    pub fn clients(&self) -> usize {
        self.records.len()
    }
}
