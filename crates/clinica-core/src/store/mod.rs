//! In-memory collections with optimistic offline writes.
//!
//! `ClinicStore` keeps one id-keyed map per collection, a connectivity flag
//! and the pending-operation queue. Online writes go straight to the API and
//! cache the confirmed record; offline writes are applied locally, marked
//! pending and queued for replay by [`ClinicStore::sync_pending`].
//!
//! Locks are never held across an await. A read-modify-write that spans a
//! network call is therefore not atomic with respect to other callers; the
//! last writer wins, as it does on the server.

pub mod queue;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::cache::SnapshotStore;
use crate::config::AppConfig;
use crate::models::{CachedRecord, Collection, RecordId, RecordStatus, ValidationError};

pub use queue::{PendingQueue, SyncMethod, SyncOperation};

const EVENT_BUFFER_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{} {id} not found", .collection.label())]
    NotFound { collection: Collection, id: RecordId },

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSettings {
    /// Drop an operation after this many failed replays. `None` retries forever.
    pub max_sync_attempts: Option<u32>,
}

impl StoreSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_sync_attempts: config.max_sync_attempts.filter(|n| *n > 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Server,
    Snapshot,
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub online: bool,
    pub source: DataSource,
    pub counts: BTreeMap<Collection, usize>,
    /// Collections that could not be fetched and start out empty
    pub failed: Vec<Collection>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// False when the cycle did not run (offline, or another cycle running)
    pub ran: bool,
    pub confirmed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub dropped: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    ConnectivityChanged { online: bool },
    SyncCompleted(SyncReport),
    OperationDropped(SyncOperation),
}

/// What a delete did beyond the local removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Confirmed by the API
    Deleted,
    /// Queued for the next sync cycle
    Queued,
    /// The record only ever existed locally; nothing to send
    LocalOnly,
}

#[derive(Debug, Clone)]
pub struct StoreStatus {
    pub online: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub pending: usize,
    pub dropped: usize,
    pub counts: BTreeMap<Collection, usize>,
}

#[derive(Debug, Default)]
struct StoreState {
    collections: HashMap<Collection, BTreeMap<RecordId, CachedRecord>>,
    online: bool,
    last_sync: Option<DateTime<Utc>>,
    queue: PendingQueue,
    local_counter: u64,
}

struct Shared {
    api: ApiClient,
    snapshots: Option<SnapshotStore>,
    settings: StoreSettings,
    state: Mutex<StoreState>,
    syncing: AtomicBool,
    events: Mutex<Option<mpsc::Sender<StoreEvent>>>,
}

/// Clears the running flag when a sync cycle ends, however it ends.
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shared handle to the store. Clone is cheap.
#[derive(Clone)]
pub struct ClinicStore {
    shared: Arc<Shared>,
}

impl ClinicStore {
    /// Build a store. A persisted pending queue and local id counter are
    /// restored from `snapshots` so queued work survives restarts.
    pub fn new(api: ApiClient, snapshots: Option<SnapshotStore>, settings: StoreSettings) -> Self {
        let mut state = StoreState::default();

        if let Some(ref snapshots) = snapshots {
            match snapshots.load_queue() {
                Ok(Some(queue)) => {
                    if !queue.is_empty() {
                        info!(pending = queue.len(), "Restored pending operations");
                    }
                    state.queue = queue;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Failed to restore pending queue"),
            }
            match snapshots.load_counter() {
                Ok(counter) => state.local_counter = counter,
                Err(e) => warn!(error = %e, "Failed to restore local id counter"),
            }
        }

        // Never hand out a local id that a queued operation still uses
        let highest_queued = state
            .queue
            .operations()
            .filter_map(|op| match op.record_id {
                RecordId::Pending(n) => Some(n),
                RecordId::Confirmed(_) => None,
            })
            .max()
            .unwrap_or(0);
        state.local_counter = state.local_counter.max(highest_queued);

        if let Some(ref snapshots) = snapshots {
            restore_pending_records(&mut state, snapshots);
        }

        Self {
            shared: Arc::new(Shared {
                api,
                snapshots,
                settings,
                state: Mutex::new(state),
                syncing: AtomicBool::new(false),
                events: Mutex::new(None),
            }),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.shared.api
    }

    /// Receive store events. A new subscription replaces the previous one.
    pub fn subscribe(&self) -> mpsc::Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        *self.shared.events.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }

    // ===== Start-up =====

    /// Probe the API once. When it answers, bulk-load every collection in
    /// parallel; otherwise fall back to the last local snapshots and stay
    /// offline.
    pub async fn initialize(&self) -> InitReport {
        let online = self.probe().await;
        self.set_online(online);

        if online {
            let (counts, failed) = self.load_from_server().await;
            info!(
                loaded = counts.values().sum::<usize>(),
                failed = failed.len(),
                "Collections loaded from server"
            );
            InitReport {
                online,
                source: DataSource::Server,
                counts,
                failed,
            }
        } else {
            warn!("API unreachable, starting from local snapshots");
            InitReport {
                online,
                source: DataSource::Snapshot,
                counts: self.load_from_snapshots(),
                failed: Vec::new(),
            }
        }
    }

    async fn load_from_server(&self) -> (BTreeMap<Collection, usize>, Vec<Collection>) {
        let api = &self.shared.api;
        let fetches = Collection::ALL
            .into_iter()
            .map(|collection| async move { (collection, api.entity(collection).get_all(&[]).await) });
        let results = join_all(fetches).await;

        let mut counts = BTreeMap::new();
        let mut failed = Vec::new();
        for (collection, result) in results {
            match result {
                Ok(items) => {
                    let count = self.merge_fresh(collection, records_from_server(collection, items));
                    self.persist_collection(collection);
                    counts.insert(collection, count);
                }
                Err(e) => {
                    // One failing collection never blocks the others
                    warn!(collection = %collection, error = %e, "Bulk load failed, continuing with an empty list");
                    let count = self.merge_fresh(collection, Vec::new());
                    counts.insert(collection, count);
                    failed.push(collection);
                }
            }
        }
        (counts, failed)
    }

    fn load_from_snapshots(&self) -> BTreeMap<Collection, usize> {
        let mut counts = BTreeMap::new();
        for collection in Collection::ALL {
            let records = match self.shared.snapshots {
                Some(ref snapshots) => match snapshots.load_collection(collection) {
                    Ok(Some(cached)) => {
                        debug!(collection = %collection, age = %cached.age_display(), "Loaded snapshot");
                        cached.data
                    }
                    Ok(None) => Vec::new(),
                    Err(e) => {
                        warn!(collection = %collection, error = %e, "Failed to load snapshot");
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };
            counts.insert(collection, self.merge_fresh(collection, records));
        }
        counts
    }

    // ===== Connectivity =====

    pub fn is_online(&self) -> bool {
        self.state().online
    }

    /// Set the connectivity flag. Returns true when it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = {
            let mut state = self.state();
            let changed = state.online != online;
            state.online = online;
            changed
        };
        if changed {
            info!(online, "Connectivity changed");
            self.emit(StoreEvent::ConnectivityChanged { online });
        }
        changed
    }

    /// Probe `health` and update the connectivity flag accordingly.
    pub async fn check_connectivity(&self) -> bool {
        let online = self.probe().await;
        self.set_online(online);
        online
    }

    async fn probe(&self) -> bool {
        match self.shared.api.health().await {
            Ok(health) => {
                if !health.is_ok() {
                    warn!(status = %health.status, "API answered with a degraded health status");
                }
                true
            }
            Err(e) => {
                debug!(error = %e, "Health probe failed");
                false
            }
        }
    }

    // ===== Reads =====

    /// Current contents of a collection, without touching the network.
    pub fn cached(&self, collection: Collection) -> Vec<CachedRecord> {
        self.state()
            .collections
            .get(&collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn cached_record(&self, collection: Collection, id: RecordId) -> Option<CachedRecord> {
        self.state()
            .collections
            .get(&collection)
            .and_then(|records| records.get(&id))
            .cloned()
    }

    /// Refresh a collection from the API when online, then return it.
    /// API failures fall back to the cached copy.
    pub async fn list(&self, collection: Collection) -> Vec<CachedRecord> {
        if self.is_online() {
            match self.shared.api.entity(collection).get_all(&[]).await {
                Ok(items) => {
                    self.merge_fresh(collection, records_from_server(collection, items));
                    self.persist_collection(collection);
                }
                Err(e) => {
                    warn!(collection = %collection, error = %e, "Refresh failed, serving cached records");
                }
            }
        }
        self.cached(collection)
    }

    /// Fetch one record when online, falling back to the cached copy.
    pub async fn get(&self, collection: Collection, id: RecordId) -> Result<CachedRecord, StoreError> {
        if let (true, RecordId::Confirmed(server_id)) = (self.is_online(), id) {
            match self.shared.api.entity(collection).get_by_id(server_id).await {
                Ok(data) => {
                    let record = confirmed_record(data, &Value::Null, || id);
                    let mut state = self.state();
                    // A queued local change is newer than what the server holds
                    if !state.queue.touches(collection, id) {
                        state
                            .collections
                            .entry(collection)
                            .or_default()
                            .insert(record.id, record.clone());
                        return Ok(record);
                    }
                }
                Err(e) => {
                    warn!(collection = %collection, id = %id, error = %e, "Fetch failed, serving cached record");
                }
            }
        }
        self.cached_record(collection, id)
            .ok_or(StoreError::NotFound { collection, id })
    }

    // ===== Writes =====

    /// Create (`id = None`) or update a record.
    ///
    /// Online, the API is called directly and its failure is returned. Offline,
    /// or when the record has no server id yet, the write is applied locally,
    /// marked pending and queued.
    pub async fn save(
        &self,
        collection: Collection,
        id: Option<RecordId>,
        data: Value,
    ) -> Result<CachedRecord, StoreError> {
        let server_id = match id {
            Some(RecordId::Pending(_)) => return Ok(self.save_offline(collection, id, data)),
            Some(RecordId::Confirmed(server_id)) => Some(server_id),
            None => None,
        };
        if !self.is_online() {
            return Ok(self.save_offline(collection, id, data));
        }

        let api = self.shared.api.entity(collection);
        let record = match server_id {
            Some(server_id) => {
                let response = api.update(server_id, &data).await?;
                confirmed_record(response, &data, || RecordId::Confirmed(server_id))
            }
            None => {
                let response = api.create(&data).await?;
                confirmed_record(response, &data, || self.allocate_local_id())
            }
        };

        info!(collection = %collection, id = %record.id, "Record saved");
        self.state()
            .collections
            .entry(collection)
            .or_default()
            .insert(record.id, record.clone());
        self.persist_collection(collection);
        Ok(record)
    }

    fn save_offline(&self, collection: Collection, id: Option<RecordId>, mut data: Value) -> CachedRecord {
        let (record, created) = {
            let mut state = self.state();
            let (record_id, method) = match id {
                Some(id) => (id, SyncMethod::Update),
                None => {
                    state.local_counter += 1;
                    (RecordId::Pending(state.local_counter), SyncMethod::Create)
                }
            };
            if let (RecordId::Confirmed(server_id), Some(fields)) = (record_id, data.as_object_mut()) {
                fields.insert("id".to_string(), Value::from(server_id));
            }

            let record = CachedRecord::pending(record_id, data.clone());
            state
                .collections
                .entry(collection)
                .or_default()
                .insert(record_id, record.clone());
            let seq = state.queue.push(collection, method, record_id, Some(data));
            debug!(collection = %collection, id = %record_id, seq, "Write queued for sync");
            (record, method == SyncMethod::Create)
        };

        self.persist_collection(collection);
        self.persist_queue();
        if created {
            self.persist_counter();
        }
        record
    }

    /// Remove a record. The local removal is immediate; the remote delete is
    /// sent now when online, queued otherwise.
    pub async fn delete(&self, collection: Collection, id: RecordId) -> Result<DeleteOutcome, StoreError> {
        let removed = self
            .state()
            .collections
            .get_mut(&collection)
            .and_then(|records| records.remove(&id));
        if removed.is_some() {
            self.persist_collection(collection);
        }

        match id {
            RecordId::Confirmed(server_id) if self.is_online() => {
                self.shared.api.entity(collection).delete(server_id).await?;
                info!(collection = %collection, id = %id, "Record deleted");
                Ok(DeleteOutcome::Deleted)
            }
            _ => {
                let seq = {
                    let mut state = self.state();
                    // A local-only record the server never saw needs no request
                    if id.is_pending() && !state.queue.touches(collection, id) {
                        None
                    } else {
                        Some(state.queue.push(collection, SyncMethod::Delete, id, None))
                    }
                };
                match seq {
                    Some(seq) => {
                        debug!(collection = %collection, id = %id, seq, "Delete queued for sync");
                        self.persist_queue();
                        Ok(DeleteOutcome::Queued)
                    }
                    None => {
                        debug!(collection = %collection, id = %id, "Removed local-only record");
                        Ok(DeleteOutcome::LocalOnly)
                    }
                }
            }
        }
    }

    // ===== Sync =====

    pub fn pending_count(&self) -> usize {
        self.state().queue.len()
    }

    pub fn pending_operations(&self) -> Vec<SyncOperation> {
        self.state().queue.operations().cloned().collect()
    }

    pub fn dropped_operations(&self) -> Vec<SyncOperation> {
        self.state().queue.dropped().to_vec()
    }

    /// Forget operations dropped after repeated failures.
    pub fn clear_dropped(&self) -> usize {
        let cleared = self.state().queue.clear_dropped();
        if cleared > 0 {
            info!(cleared, "Cleared dropped operations");
            self.persist_queue();
        }
        cleared
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.state().last_sync
    }

    /// Replay queued operations in enqueue order.
    ///
    /// Confirmed operations leave the queue; failed ones stay for the next
    /// cycle, and later operations on the same record wait with them. A
    /// connectivity failure ends the cycle and marks the store offline.
    /// Only one cycle runs at a time; a concurrent call returns at once.
    pub async fn sync_pending(&self) -> SyncReport {
        let Some(_guard) = self.try_begin_sync() else {
            debug!("Sync already running, skipping");
            return SyncReport::default();
        };
        if !self.is_online() {
            return SyncReport::default();
        }

        let sequence = self.state().queue.sequence();
        let mut report = SyncReport {
            ran: true,
            ..SyncReport::default()
        };
        if !sequence.is_empty() {
            info!(pending = sequence.len(), "Replaying pending operations");
        }

        let mut blocked: HashSet<(Collection, RecordId)> = HashSet::new();
        let mut touched: BTreeSet<Collection> = BTreeSet::new();

        for seq in sequence {
            // Re-read: an earlier confirmation may have rewritten the record id
            let Some(op) = self.state().queue.get(seq).cloned() else {
                continue;
            };
            if blocked.contains(&(op.collection, op.record_id)) {
                report.skipped += 1;
                continue;
            }
            touched.insert(op.collection);

            if op.method == SyncMethod::Update && op.record_id.is_pending() {
                // Its create was dropped or came back without a server id
                self.state()
                    .queue
                    .record_failure(seq, "record was never assigned a server id");
                self.drop_operation(seq);
                report.dropped += 1;
                continue;
            }

            match self.replay(&op).await {
                Ok(response) => {
                    self.apply_confirmed(&op, response);
                    report.confirmed += 1;
                    debug!(operation = %op.describe(), "Operation confirmed");
                }
                Err(e) if e.is_connectivity() => {
                    // An outage says nothing about the operation: no attempt is counted
                    report.failed += 1;
                    self.state().queue.record_unreachable(seq, &e.to_string());
                    warn!(operation = %op.describe(), error = %e, "API unreachable, ending sync cycle");
                    self.set_online(false);
                    break;
                }
                Err(e) => {
                    report.failed += 1;
                    blocked.insert((op.collection, op.record_id));
                    let attempts = self
                        .state()
                        .queue
                        .record_failure(seq, &e.to_string())
                        .unwrap_or_default();
                    warn!(operation = %op.describe(), attempt = attempts, error = %e, "Replay failed, keeping operation queued");

                    if let Some(max) = self.shared.settings.max_sync_attempts {
                        if attempts >= max {
                            self.drop_operation(seq);
                            report.dropped += 1;
                        }
                    }
                }
            }
        }

        report.remaining = {
            let mut state = self.state();
            state.last_sync = Some(Utc::now());
            state.queue.len()
        };
        self.persist_queue();
        for collection in touched {
            self.persist_collection(collection);
        }

        if report.confirmed + report.failed + report.dropped > 0 {
            info!(
                confirmed = report.confirmed,
                failed = report.failed,
                skipped = report.skipped,
                dropped = report.dropped,
                remaining = report.remaining,
                "Sync cycle finished"
            );
        }
        self.emit(StoreEvent::SyncCompleted(report.clone()));
        report
    }

    async fn replay(&self, op: &SyncOperation) -> Result<Option<Value>, ApiError> {
        let api = self.shared.api.entity(op.collection);
        let data = op.data.clone().unwrap_or(Value::Null);
        match (op.method, op.record_id) {
            (SyncMethod::Create, _) => api.create(&data).await.map(Some),
            (SyncMethod::Update, RecordId::Confirmed(id)) => api.update(id, &data).await.map(Some),
            (SyncMethod::Delete, RecordId::Confirmed(id)) => match api.delete(id).await {
                Ok(_) => Ok(None),
                // Already gone on the server
                Err(e) if e.status() == Some(404) => Ok(None),
                Err(e) => Err(e),
            },
            // Delete of a record the server never saw: nothing to send
            (SyncMethod::Delete, RecordId::Pending(_)) => Ok(None),
            (SyncMethod::Update, RecordId::Pending(_)) => Err(ApiError::InvalidResponse(
                "update of a record without a server id".to_string(),
            )),
        }
    }

    /// Dequeue a confirmed operation and reconcile the cached record.
    fn apply_confirmed(&self, op: &SyncOperation, response: Option<Value>) {
        let mut guard = self.state();
        let state = &mut *guard;
        state.queue.confirm(op.seq);

        let response = match (op.method, response) {
            (SyncMethod::Delete, _) | (_, None) => return,
            (_, Some(response)) => response,
        };
        let submitted = op.data.clone().unwrap_or(Value::Null);
        let server_id = response.get("id").and_then(Value::as_i64);

        let final_id = match (op.method, server_id) {
            (SyncMethod::Create, Some(server_id)) => {
                let confirmed = RecordId::Confirmed(server_id);
                let rewritten = state.queue.rekey(op.collection, op.record_id, confirmed);
                if op.record_id != confirmed {
                    info!(collection = %op.collection, local = %op.record_id, server = server_id, rewritten, "Local record confirmed by server");
                }
                confirmed
            }
            _ => op.record_id,
        };

        // Deleted locally meanwhile: the queued delete will follow
        if state.queue.deleted_ids(op.collection).contains(&final_id) {
            if let Some(records) = state.collections.get_mut(&op.collection) {
                records.remove(&op.record_id);
            }
            return;
        }

        let records = state.collections.entry(op.collection).or_default();
        let local = records.remove(&op.record_id);
        let record = if state.queue.touches(op.collection, final_id) {
            // Later local edits are still queued; keep them visible
            let mut data = local.map_or(submitted, |local| local.data);
            if let (RecordId::Confirmed(id), Some(fields)) = (final_id, data.as_object_mut()) {
                fields.insert("id".to_string(), Value::from(id));
            }
            CachedRecord::pending(final_id, data)
        } else {
            confirmed_record(response, &submitted, || final_id)
        };
        records.insert(record.id, record);
    }

    fn drop_operation(&self, seq: u64) {
        let dropped = self.state().queue.drop_operation(seq);
        if let Some(op) = dropped {
            error!(
                operation = %op.describe(),
                attempts = op.attempts,
                error = op.last_error.as_deref().unwrap_or("unknown"),
                "Dropping operation that keeps failing"
            );
            self.emit(StoreEvent::OperationDropped(op));
        }
    }

    fn try_begin_sync(&self) -> Option<SyncGuard<'_>> {
        self.shared
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard(&self.shared.syncing))
    }

    pub fn is_syncing(&self) -> bool {
        self.shared.syncing.load(Ordering::Acquire)
    }

    pub fn status(&self) -> StoreStatus {
        let state = self.state();
        StoreStatus {
            online: state.online,
            last_sync: state.last_sync,
            pending: state.queue.len(),
            dropped: state.queue.dropped().len(),
            counts: Collection::ALL
                .into_iter()
                .map(|c| (c, state.collections.get(&c).map_or(0, BTreeMap::len)))
                .collect(),
        }
    }

    // ===== Internals =====

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace a collection with fresh records, keeping local pending state:
    /// records with queued changes stay as they are locally and records with
    /// a queued delete stay removed.
    fn merge_fresh(&self, collection: Collection, fresh: Vec<CachedRecord>) -> usize {
        let mut guard = self.state();
        let state = &mut *guard;
        let deleted = state.queue.deleted_ids(collection);

        let mut merged: BTreeMap<RecordId, CachedRecord> = fresh
            .into_iter()
            .filter(|record| !deleted.contains(&record.id))
            .map(|record| (record.id, record))
            .collect();

        if let Some(current) = state.collections.get(&collection) {
            for (id, record) in current {
                if record.status == RecordStatus::Pending
                    && !deleted.contains(id)
                    && state.queue.touches(collection, *id)
                {
                    merged.insert(*id, record.clone());
                }
            }
        }

        let count = merged.len();
        state.collections.insert(collection, merged);
        count
    }

    fn allocate_local_id(&self) -> RecordId {
        let id = {
            let mut state = self.state();
            state.local_counter += 1;
            state.local_counter
        };
        self.persist_counter();
        RecordId::Pending(id)
    }

    fn emit(&self, event: StoreEvent) {
        let events = self.shared.events.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ref tx) = *events {
            if let Err(e) = tx.try_send(event) {
                warn!(error = %e, "Failed to publish store event");
            }
        }
    }

    // ===== Snapshot write-through =====

    fn persist_collection(&self, collection: Collection) {
        let Some(ref snapshots) = self.shared.snapshots else {
            return;
        };
        let records = self.cached(collection);
        if let Err(e) = snapshots.save_collection(collection, &records) {
            warn!(collection = %collection, error = %e, "Failed to write snapshot");
        }
    }

    fn persist_queue(&self) {
        let Some(ref snapshots) = self.shared.snapshots else {
            return;
        };
        let queue = self.state().queue.clone();
        if let Err(e) = snapshots.save_queue(&queue) {
            warn!(error = %e, "Failed to write pending queue");
        }
    }

    fn persist_counter(&self) {
        let Some(ref snapshots) = self.shared.snapshots else {
            return;
        };
        let counter = self.state().local_counter;
        if let Err(e) = snapshots.save_counter(counter) {
            warn!(error = %e, "Failed to write local id counter");
        }
    }
}

/// Bring back the cached copies of records that queued operations still
/// name, so a refresh from the server can overlay them.
fn restore_pending_records(state: &mut StoreState, snapshots: &SnapshotStore) {
    let collections: BTreeSet<Collection> = state.queue.operations().map(|op| op.collection).collect();
    for collection in collections {
        let records = match snapshots.load_collection(collection) {
            Ok(Some(cached)) => cached.data,
            Ok(None) => continue,
            Err(e) => {
                warn!(collection = %collection, error = %e, "Failed to restore pending records");
                continue;
            }
        };
        let pending: BTreeMap<RecordId, CachedRecord> = records
            .into_iter()
            .filter(|record| record.is_pending() && state.queue.touches(collection, record.id))
            .map(|record| (record.id, record))
            .collect();
        if !pending.is_empty() {
            debug!(collection = %collection, restored = pending.len(), "Restored pending records");
            state.collections.insert(collection, pending);
        }
    }
}

fn records_from_server(collection: Collection, items: Vec<Value>) -> Vec<CachedRecord> {
    let total = items.len();
    let records: Vec<CachedRecord> = items.into_iter().filter_map(CachedRecord::from_server).collect();
    if records.len() < total {
        warn!(collection = %collection, skipped = total - records.len(), "Ignoring records without a numeric id");
    }
    records
}

/// Build the cached copy of a server-confirmed write. The server's id wins;
/// `fallback` keys a response that carries none. Responses without a body
/// cache the submitted payload.
fn confirmed_record(response: Value, submitted: &Value, fallback: impl FnOnce() -> RecordId) -> CachedRecord {
    let mut data = if response.is_object() {
        response
    } else {
        submitted.clone()
    };
    let id = match data.get("id").and_then(Value::as_i64) {
        Some(server_id) => RecordId::Confirmed(server_id),
        None => {
            let id = fallback();
            if let (RecordId::Confirmed(server_id), Some(fields)) = (id, data.as_object_mut()) {
                fields.insert("id".to_string(), Value::from(server_id));
            }
            id
        }
    };
    CachedRecord {
        id,
        status: RecordStatus::Synced,
        data,
        updated_at: Utc::now(),
    }
}
