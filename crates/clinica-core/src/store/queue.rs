//! Pending-operation queue.
//!
//! Every write accepted while offline becomes one `SyncOperation`, replayed
//! in enqueue order. Operations are never merged; repeated edits of one
//! record replay one after the other.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::Method;
use crate::models::{Collection, RecordId};

/// Dropped operations kept for inspection; older ones are discarded.
pub const MAX_DROPPED: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMethod {
    Create,
    Update,
    Delete,
}

impl SyncMethod {
    pub fn http_method(&self) -> Method {
        match self {
            SyncMethod::Create => Method::Post,
            SyncMethod::Update => Method::Put,
            SyncMethod::Delete => Method::Delete,
        }
    }
}

impl std::fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMethod::Create => write!(f, "create"),
            SyncMethod::Update => write!(f, "update"),
            SyncMethod::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub seq: u64,
    pub collection: Collection,
    pub method: SyncMethod,
    pub record_id: RecordId,
    /// Payload for create/update, `None` for delete
    pub data: Option<Value>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl SyncOperation {
    /// Short description for logs and the status command.
    pub fn describe(&self) -> String {
        format!("#{} {} {} {}", self.seq, self.method.http_method(), self.collection, self.record_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingQueue {
    next_seq: u64,
    operations: VecDeque<SyncOperation>,
    #[serde(default)]
    dropped: Vec<SyncOperation>,
}

impl PendingQueue {
    /// Append an operation and return its sequence number.
    pub fn push(
        &mut self,
        collection: Collection,
        method: SyncMethod,
        record_id: RecordId,
        data: Option<Value>,
    ) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.operations.push_back(SyncOperation {
            seq,
            collection,
            method,
            record_id,
            data,
            attempts: 0,
            last_error: None,
            enqueued_at: Utc::now(),
        });
        seq
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> impl Iterator<Item = &SyncOperation> {
        self.operations.iter()
    }

    pub fn get(&self, seq: u64) -> Option<&SyncOperation> {
        self.operations.iter().find(|op| op.seq == seq)
    }

    /// Sequence numbers in replay order.
    pub fn sequence(&self) -> Vec<u64> {
        self.operations.iter().map(|op| op.seq).collect()
    }

    /// Remove a confirmed operation.
    pub fn confirm(&mut self, seq: u64) -> Option<SyncOperation> {
        let index = self.operations.iter().position(|op| op.seq == seq)?;
        self.operations.remove(index)
    }

    /// Count a failed replay. Returns the new attempt count.
    pub fn record_failure(&mut self, seq: u64, error: &str) -> Option<u32> {
        let op = self.operations.iter_mut().find(|op| op.seq == seq)?;
        op.attempts += 1;
        op.last_error = Some(error.to_string());
        Some(op.attempts)
    }

    /// Note the error of a replay that never reached the server. The attempt
    /// count is left alone.
    pub fn record_unreachable(&mut self, seq: u64, error: &str) -> Option<u32> {
        let op = self.operations.iter_mut().find(|op| op.seq == seq)?;
        op.last_error = Some(error.to_string());
        Some(op.attempts)
    }

    /// Move an operation to the dropped list.
    pub fn drop_operation(&mut self, seq: u64) -> Option<SyncOperation> {
        let op = self.confirm(seq)?;
        self.dropped.push(op.clone());
        if self.dropped.len() > MAX_DROPPED {
            let excess = self.dropped.len() - MAX_DROPPED;
            self.dropped.drain(..excess);
        }
        Some(op)
    }

    pub fn dropped(&self) -> &[SyncOperation] {
        &self.dropped
    }

    /// Forget dropped operations. Returns how many there were.
    pub fn clear_dropped(&mut self) -> usize {
        std::mem::take(&mut self.dropped).len()
    }

    /// Rewrite every queued operation naming `from` to name `to` instead.
    pub fn rekey(&mut self, collection: Collection, from: RecordId, to: RecordId) -> usize {
        let mut rewritten = 0;
        for op in self.operations.iter_mut() {
            if op.collection == collection && op.record_id == from {
                op.record_id = to;
                rewritten += 1;
            }
        }
        rewritten
    }

    /// Records of `collection` whose latest queued operation is a delete.
    pub fn deleted_ids(&self, collection: Collection) -> HashSet<RecordId> {
        let mut deleted = HashSet::new();
        for op in self.operations.iter().filter(|op| op.collection == collection) {
            if op.method == SyncMethod::Delete {
                deleted.insert(op.record_id);
            } else {
                deleted.remove(&op.record_id);
            }
        }
        deleted
    }

    /// Whether any queued operation still names this record.
    pub fn touches(&self, collection: Collection, id: RecordId) -> bool {
        self.operations
            .iter()
            .any(|op| op.collection == collection && op.record_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_keeps_fifo_order_without_merging() {
        let mut queue = PendingQueue::default();
        let a = queue.push(Collection::Pacientes, SyncMethod::Update, RecordId::Confirmed(1), Some(json!({"n": 1})));
        let b = queue.push(Collection::Pacientes, SyncMethod::Update, RecordId::Confirmed(1), Some(json!({"n": 2})));
        let c = queue.push(Collection::Ventas, SyncMethod::Delete, RecordId::Confirmed(4), None);

        assert_eq!(queue.sequence(), vec![a, b, c]);
        assert_eq!(queue.len(), 3);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_confirm_and_failure_bookkeeping() {
        let mut queue = PendingQueue::default();
        let a = queue.push(Collection::Pagos, SyncMethod::Create, RecordId::Pending(1), Some(json!({})));
        let b = queue.push(Collection::Pagos, SyncMethod::Create, RecordId::Pending(2), Some(json!({})));

        assert_eq!(queue.record_failure(a, "HTTP 500"), Some(1));
        assert_eq!(queue.record_failure(a, "HTTP 502"), Some(2));
        assert_eq!(queue.get(a).unwrap().last_error.as_deref(), Some("HTTP 502"));

        assert!(queue.confirm(b).is_some());
        assert!(queue.confirm(b).is_none());
        assert_eq!(queue.sequence(), vec![a]);

        let dropped = queue.drop_operation(a).unwrap();
        assert_eq!(dropped.attempts, 2);
        assert!(queue.is_empty());
        assert_eq!(queue.dropped().len(), 1);
    }

    #[test]
    fn test_unreachable_replay_keeps_attempt_count() {
        let mut queue = PendingQueue::default();
        let a = queue.push(Collection::Boxes, SyncMethod::Create, RecordId::Pending(1), Some(json!({})));

        assert_eq!(queue.record_unreachable(a, "connection refused"), Some(0));
        assert_eq!(queue.get(a).unwrap().attempts, 0);
        assert_eq!(queue.get(a).unwrap().last_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_dropped_list_is_capped_and_clearable() {
        let mut queue = PendingQueue::default();
        for n in 0..(MAX_DROPPED as u64 + 5) {
            let seq = queue.push(Collection::Pagos, SyncMethod::Create, RecordId::Pending(n), Some(json!({})));
            queue.drop_operation(seq);
        }

        assert_eq!(queue.dropped().len(), MAX_DROPPED);
        // Oldest entries go first
        assert_eq!(queue.dropped()[0].seq, 6);

        assert_eq!(queue.clear_dropped(), MAX_DROPPED);
        assert!(queue.dropped().is_empty());
    }

    #[test]
    fn test_rekey_only_touches_matching_collection() {
        let mut queue = PendingQueue::default();
        queue.push(Collection::Pacientes, SyncMethod::Update, RecordId::Pending(3), Some(json!({})));
        queue.push(Collection::Ventas, SyncMethod::Update, RecordId::Pending(3), Some(json!({})));
        queue.push(Collection::Pacientes, SyncMethod::Delete, RecordId::Pending(3), None);

        let rewritten = queue.rekey(Collection::Pacientes, RecordId::Pending(3), RecordId::Confirmed(90));
        assert_eq!(rewritten, 2);
        assert!(queue.touches(Collection::Pacientes, RecordId::Confirmed(90)));
        assert!(queue.touches(Collection::Ventas, RecordId::Pending(3)));
        assert!(!queue.touches(Collection::Pacientes, RecordId::Pending(3)));
    }

    #[test]
    fn test_deleted_ids_follow_last_operation() {
        let mut queue = PendingQueue::default();
        queue.push(Collection::Boxes, SyncMethod::Delete, RecordId::Confirmed(1), None);
        queue.push(Collection::Boxes, SyncMethod::Delete, RecordId::Confirmed(2), None);
        queue.push(Collection::Boxes, SyncMethod::Update, RecordId::Confirmed(2), Some(json!({})));

        let deleted = queue.deleted_ids(Collection::Boxes);
        assert!(deleted.contains(&RecordId::Confirmed(1)));
        assert!(!deleted.contains(&RecordId::Confirmed(2)));
        assert!(queue.deleted_ids(Collection::Pagos).is_empty());
    }

    #[test]
    fn test_queue_serde_round_trip_keeps_counter() {
        let mut queue = PendingQueue::default();
        queue.push(Collection::Sesiones, SyncMethod::Create, RecordId::Pending(1), Some(json!({"box_id": 2})));
        let json = serde_json::to_string(&queue).unwrap();

        let mut restored: PendingQueue = serde_json::from_str(&json).unwrap();
        let next = restored.push(Collection::Sesiones, SyncMethod::Delete, RecordId::Pending(1), None);
        assert_eq!(next, 2);
    }
}
