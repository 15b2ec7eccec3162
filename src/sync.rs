//! Reconciliation core for the storefront's order set.
//!
//! Maintains one logically consistent order set across the document
//! store, the local key-value store, and the backup slot, tolerating
//! the absence or failure of any single tier. Document-store
//! availability is resolved ONCE at construction into a capability
//! flag so call sites stay uniform; every write reports which tier
//! persisted it. A single advisory mutex serializes the
//! {read-all, merge, write-all} sequence so the periodic background
//! refresh and foreground callers cannot interleave and lose updates.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backup::BackupVault;
use crate::db::DocumentStore;
use crate::models::{BackupInfo, Order};
use crate::storage::{LocalStore, ORDERS_KEY};
use crate::StoreError;

/// Default cadence of the background refresh, matching the admin
/// dashboard's polling interval.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Write outcome
// ---------------------------------------------------------------------------

/// Which storage tier persisted a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteTier {
    /// The document store took the write (and the local store mirrors it).
    Primary,
    /// The document store was absent or failed; only the local store
    /// holds the record until the next reconciliation.
    Fallback,
}

/// Tagged result of a write operation. Degraded writes are still
/// successful from the caller's perspective; the tag exists so tests
/// and diagnostics can assert the persistence path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub tier: WriteTier,
    pub ok: bool,
}

/// Snapshot of engine state for the admin system page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub document_store_supported: bool,
    pub is_running: bool,
    pub last_sync: Option<String>,
    pub backup: BackupInfo,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Reconciles the document store, the local store, and the backup slot
/// into one consistent order set.
pub struct SyncEngine {
    local: Arc<LocalStore>,
    documents: Option<DocumentStore>,
    vault: BackupVault,
    // Advisory lock around {read-all, merge, write-all}. Concurrent
    // save() calls are not serialized against it; the next pass heals
    // whatever they interleave.
    merge_guard: AsyncMutex<()>,
    run_flag: Arc<AtomicBool>,
    last_sync: StdMutex<Option<String>>,
}

impl SyncEngine {
    /// Build an engine over `data_dir`, resolving document-store
    /// availability once. An unsupported or unopenable document store
    /// puts the engine in fallback mode for the whole session.
    pub fn new(data_dir: &Path, local: Arc<LocalStore>) -> Self {
        let documents = if DocumentStore::is_supported(data_dir) {
            match DocumentStore::open(data_dir) {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!(error = %e, "document store open failed; local store only for this session");
                    None
                }
            }
        } else {
            warn!(path = %data_dir.display(), "embedded database unsupported in this runtime; local store only");
            None
        };
        Self::with_documents(local, documents)
    }

    /// Wire an engine from explicit store handles. `None` documents
    /// reproduces the unsupported-runtime fallback mode.
    pub fn with_documents(local: Arc<LocalStore>, documents: Option<DocumentStore>) -> Self {
        let vault = BackupVault::new(Arc::clone(&local));
        Self {
            local,
            documents,
            vault,
            merge_guard: AsyncMutex::new(()),
            run_flag: Arc::new(AtomicBool::new(false)),
            last_sync: StdMutex::new(None),
        }
    }

    /// Whether the document store is available in this session.
    pub fn document_store_supported(&self) -> bool {
        self.documents.is_some()
    }

    /// The backup vault shared with this engine.
    pub fn vault(&self) -> &BackupVault {
        &self.vault
    }

    /// Engine state snapshot.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            document_store_supported: self.documents.is_some(),
            is_running: self.run_flag.load(Ordering::SeqCst),
            last_sync: self.last_sync.lock().ok().and_then(|g| g.clone()),
            backup: self.vault.info(),
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Persist one order: document store first, mirrored into the local
    /// store on success; local store alone when the document store is
    /// absent or fails. Only when every tier fails does the caller see
    /// an error.
    pub async fn save(&self, order: &Order) -> Result<WriteOutcome, StoreError> {
        if let Some(documents) = &self.documents {
            match documents.put(order).await {
                Ok(()) => {
                    if let Err(e) = self.upsert_local(order) {
                        warn!(
                            order_id = %order.id,
                            error = %e,
                            "write-through mirror failed; next reconciliation will heal it"
                        );
                    }
                    return Ok(WriteOutcome {
                        tier: WriteTier::Primary,
                        ok: true,
                    });
                }
                Err(e) => {
                    warn!(
                        order_id = %order.id,
                        error = %e,
                        "document store write failed; degrading to local store"
                    );
                }
            }
        }

        self.upsert_local(order)?;
        Ok(WriteOutcome {
            tier: WriteTier::Fallback,
            ok: true,
        })
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Reconcile the three tiers and return the authoritative order set.
    ///
    /// With no document store there is nothing to reconcile against:
    /// the local set is returned unchanged and no backup is written.
    /// Every failure inside a real pass surfaces as
    /// [`StoreError::SyncFailure`]; manual sync actions need the
    /// outcome, so reconciliation is never silently degraded.
    pub async fn sync(&self) -> Result<Vec<Order>, StoreError> {
        let documents = match &self.documents {
            Some(documents) => documents,
            None => return Ok(self.read_local_orders()),
        };

        let _guard = self.merge_guard.lock().await;
        match self.run_reconciliation(documents).await {
            Ok(merged) => {
                if let Ok(mut guard) = self.last_sync.lock() {
                    *guard = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
                }
                debug!(orders = merged.len(), "reconciliation complete");
                Ok(merged)
            }
            Err(e) => {
                warn!(error = %e, "reconciliation failed");
                Err(StoreError::SyncFailure(e.to_string()))
            }
        }
    }

    async fn run_reconciliation(
        &self,
        documents: &DocumentStore,
    ) -> Result<Vec<Order>, StoreError> {
        // Snapshot all tiers before deriving any write.
        let local_set = self.read_local_orders();
        let document_set = documents.get_all().await?;
        let backup = self.vault.latest();

        let mut merged: BTreeMap<String, Order> = BTreeMap::new();
        match backup {
            // No backup: union of both tiers, strictly-later createdAt
            // wins, ties go to the local copy (the most recently
            // written tier in normal operation).
            None => {
                layer_into(&mut merged, document_set.clone(), true);
                layer_into(&mut merged, local_set, true);
            }
            // Backup present: layer in ascending trust order. Document
            // entries displace backup entries only when strictly newer;
            // the local tier gets the final say on ties.
            Some(backup) => {
                layer_into(&mut merged, backup.orders, true);
                layer_into(&mut merged, document_set.clone(), false);
                layer_into(&mut merged, local_set, true);
            }
        }
        let merged: Vec<Order> = merged.into_values().collect();

        // Push winners into the document store wherever its copy is
        // missing or diverged, then overwrite the local blob with the
        // full set and snapshot it.
        let document_by_id: HashMap<&str, &Order> = document_set
            .iter()
            .map(|order| (order.id.as_str(), order))
            .collect();
        for order in &merged {
            let diverged = document_by_id
                .get(order.id.as_str())
                .map_or(true, |existing| *existing != order);
            if diverged {
                documents.put(order).await?;
            }
        }
        self.write_local_orders(&merged)?;
        self.vault.create(&merged)?;

        Ok(merged)
    }

    /// Signal the background loop to exit after its current tick.
    pub fn stop_background(&self) {
        self.run_flag.store(false, Ordering::SeqCst);
    }

    // -----------------------------------------------------------------------
    // Local-tier helpers
    // -----------------------------------------------------------------------

    fn read_local_orders(&self) -> Vec<Order> {
        self.local
            .read::<Vec<Order>>(ORDERS_KEY)
            .unwrap_or_default()
    }

    fn write_local_orders(&self, orders: &[Order]) -> Result<(), StoreError> {
        self.local.write(ORDERS_KEY, &orders)
    }

    fn upsert_local(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = self.read_local_orders();
        match orders.iter_mut().find(|o| o.id == order.id) {
            Some(existing) => *existing = order.clone(),
            None => orders.push(order.clone()),
        }
        self.write_local_orders(&orders)
    }
}

// ---------------------------------------------------------------------------
// Background refresh loop
// ---------------------------------------------------------------------------

/// Spawn the periodic refresh loop. Each cycle runs one full
/// reconciliation pass; failures are logged and the loop keeps going
/// (the next tick is the retry). Stop with
/// [`SyncEngine::stop_background`].
pub fn start_refresh_loop(engine: Arc<SyncEngine>, interval_secs: u64) -> JoinHandle<()> {
    engine.run_flag.store(true, Ordering::SeqCst);

    tokio::spawn(async move {
        info!("background refresh started (interval: {interval_secs}s)");
        loop {
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
            if !engine.run_flag.load(Ordering::SeqCst) {
                info!("background refresh stopped");
                break;
            }
            match engine.sync().await {
                Ok(orders) => {
                    debug!(orders = orders.len(), "background reconciliation complete")
                }
                Err(e) => warn!(error = %e, "background reconciliation failed"),
            }
        }
    })
}

/// Overlay `incoming` onto `set` by id. A candidate replaces the held
/// record when its `created_at` is strictly later, or on an exact tie
/// when `replace_on_tie` grants the incoming tier the final say.
fn layer_into(set: &mut BTreeMap<String, Order>, incoming: Vec<Order>, replace_on_tie: bool) {
    for order in incoming {
        match set.get(&order.id) {
            None => {
                set.insert(order.id.clone(), order);
            }
            Some(existing) => {
                let held = existing.created_at_utc();
                let candidate = order.created_at_utc();
                if candidate > held || (candidate == held && replace_on_tie) {
                    set.insert(order.id.clone(), order);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;

    fn local_store(dir: &tempfile::TempDir) -> Arc<LocalStore> {
        Arc::new(LocalStore::new(dir.path().join("storage.json")))
    }

    fn engine_with_documents(dir: &tempfile::TempDir) -> SyncEngine {
        SyncEngine::with_documents(
            local_store(dir),
            Some(DocumentStore::open_in_memory().unwrap()),
        )
    }

    fn engine_fallback_only(dir: &tempfile::TempDir) -> SyncEngine {
        SyncEngine::with_documents(local_store(dir), None)
    }

    fn order_at(id: &str, status: OrderStatus, created_at: &str) -> Order {
        Order {
            id: id.into(),
            customer_name: "Sofia".into(),
            customer_phone: "3157778899".into(),
            customer_address: None,
            items: vec![],
            total: 15000.0,
            status,
            created_at: created_at.into(),
        }
    }

    fn ids(orders: &[Order]) -> Vec<&str> {
        orders.iter().map(|o| o.id.as_str()).collect()
    }

    #[tokio::test]
    async fn save_reports_primary_tier_and_mirrors_locally() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_documents(&dir);
        let order = order_at("order-1", OrderStatus::Pending, "2026-08-08T10:00:00.000Z");

        let outcome = engine.save(&order).await.unwrap();
        assert_eq!(outcome.tier, WriteTier::Primary);
        assert!(outcome.ok);

        // Both tiers hold the record immediately.
        assert_eq!(engine.read_local_orders(), vec![order.clone()]);
        let documents = engine.documents.as_ref().unwrap();
        assert_eq!(documents.get_all().await.unwrap(), vec![order]);
    }

    #[tokio::test]
    async fn save_reports_fallback_tier_when_documents_absent() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_fallback_only(&dir);
        let order = order_at("order-2", OrderStatus::Pending, "2026-08-08T10:00:00.000Z");

        let outcome = engine.save(&order).await.unwrap();
        assert_eq!(outcome.tier, WriteTier::Fallback);
        assert_eq!(engine.read_local_orders(), vec![order]);
    }

    #[tokio::test]
    async fn save_upserts_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_documents(&dir);
        let mut order = order_at("order-3", OrderStatus::Pending, "2026-08-08T10:00:00.000Z");
        engine.save(&order).await.unwrap();

        order.status = OrderStatus::Completed;
        engine.save(&order).await.unwrap();

        let local = engine.read_local_orders();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn sync_unions_records_present_in_only_one_tier() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_documents(&dir);

        let local_only = order_at("order-local", OrderStatus::Pending, "2026-08-08T09:00:00.000Z");
        let document_only =
            order_at("order-doc", OrderStatus::Pending, "2026-08-08T09:30:00.000Z");

        engine.upsert_local(&local_only).unwrap();
        engine
            .documents
            .as_ref()
            .unwrap()
            .put(&document_only)
            .await
            .unwrap();

        let merged = engine.sync().await.unwrap();
        assert_eq!(ids(&merged), vec!["order-doc", "order-local"]);

        // Union completeness: every id now lives in both tiers.
        let document_set = engine.documents.as_ref().unwrap().get_all().await.unwrap();
        assert_eq!(document_set.len(), 2);
        assert_eq!(engine.read_local_orders().len(), 2);
    }

    #[tokio::test]
    async fn sync_prefers_the_strictly_newer_record() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_documents(&dir);

        let stale = order_at("order-4", OrderStatus::Pending, "2026-08-08T08:00:00.000Z");
        let fresh = order_at("order-4", OrderStatus::Completed, "2026-08-08T08:45:00.000Z");

        engine.documents.as_ref().unwrap().put(&fresh).await.unwrap();
        engine.upsert_local(&stale).unwrap();

        let merged = engine.sync().await.unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].status, OrderStatus::Completed);

        // The stale local copy was overwritten too.
        assert_eq!(engine.read_local_orders()[0].status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn sync_tie_break_gives_the_local_copy_the_final_say() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_documents(&dir);

        let ts = "2026-08-08T08:00:00.000Z";
        let document_copy = order_at("order-5", OrderStatus::Pending, ts);
        let local_copy = order_at("order-5", OrderStatus::Cancelled, ts);

        engine
            .documents
            .as_ref()
            .unwrap()
            .put(&document_copy)
            .await
            .unwrap();
        engine.upsert_local(&local_copy).unwrap();

        let merged = engine.sync().await.unwrap();
        assert_eq!(merged[0].status, OrderStatus::Cancelled);

        // The divergence was propagated into the document store.
        let document_set = engine.documents.as_ref().unwrap().get_all().await.unwrap();
        assert_eq!(document_set[0].status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn sync_twice_with_no_writes_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_documents(&dir);

        engine
            .save(&order_at("order-6", OrderStatus::Pending, "2026-08-08T08:00:00.000Z"))
            .await
            .unwrap();
        engine
            .save(&order_at("order-7", OrderStatus::Completed, "2026-08-08T08:10:00.000Z"))
            .await
            .unwrap();

        let first = engine.sync().await.unwrap();
        let second = engine.sync().await.unwrap();
        assert_eq!(first, second);

        let document_set = engine.documents.as_ref().unwrap().get_all().await.unwrap();
        let mut document_ids = ids(&document_set);
        document_ids.sort_unstable();
        assert_eq!(document_ids, ids(&second));
        assert_eq!(engine.read_local_orders(), second);
        assert_eq!(engine.vault().restore(), second);
    }

    #[tokio::test]
    async fn sync_writes_a_fresh_backup_from_the_merged_set() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_documents(&dir);
        assert!(!engine.vault().exists());

        engine
            .save(&order_at("order-8", OrderStatus::Pending, "2026-08-08T08:00:00.000Z"))
            .await
            .unwrap();
        let merged = engine.sync().await.unwrap();

        assert!(engine.vault().exists());
        assert_eq!(engine.vault().restore(), merged);
    }

    #[tokio::test]
    async fn sync_resurrects_backup_only_records_into_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_documents(&dir);

        let archived = order_at("order-9", OrderStatus::Completed, "2026-08-07T20:00:00.000Z");
        engine.vault().create(&[archived.clone()]).unwrap();

        let merged = engine.sync().await.unwrap();
        assert_eq!(merged, vec![archived.clone()]);
        assert_eq!(
            engine.documents.as_ref().unwrap().get_all().await.unwrap(),
            vec![archived.clone()]
        );
        assert_eq!(engine.read_local_orders(), vec![archived]);
    }

    #[tokio::test]
    async fn document_entries_displace_backup_entries_only_when_strictly_newer() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_documents(&dir);

        let ts = "2026-08-08T07:00:00.000Z";
        let backed_up = order_at("order-10", OrderStatus::Completed, ts);
        let document_copy = order_at("order-10", OrderStatus::Pending, ts);

        engine.vault().create(&[backed_up.clone()]).unwrap();
        engine
            .documents
            .as_ref()
            .unwrap()
            .put(&document_copy)
            .await
            .unwrap();

        // Equal timestamps: the backup layer survives the document
        // layer, and with no local copy it wins outright.
        let merged = engine.sync().await.unwrap();
        assert_eq!(merged[0].status, OrderStatus::Completed);

        let newer = order_at("order-10", OrderStatus::Cancelled, "2026-08-08T07:30:00.000Z");
        engine.documents.as_ref().unwrap().put(&newer).await.unwrap();
        let merged = engine.sync().await.unwrap();
        assert_eq!(merged[0].status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn sync_without_document_store_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_fallback_only(&dir);

        let order = order_at("order-11", OrderStatus::Pending, "2026-08-08T08:00:00.000Z");
        engine.save(&order).await.unwrap();

        let merged = engine.sync().await.unwrap();
        assert_eq!(merged, vec![order]);
        // Nothing to reconcile against: no backup is written either.
        assert!(!engine.vault().exists());
        assert!(engine.status().last_sync.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn background_refresh_runs_cycles_and_stops_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(engine_with_documents(&dir));
        engine
            .save(&order_at("order-12", OrderStatus::Pending, "2026-08-08T08:00:00.000Z"))
            .await
            .unwrap();

        let handle = start_refresh_loop(Arc::clone(&engine), 5);
        assert!(engine.status().is_running);

        // Let at least one cycle run.
        tokio::time::sleep(Duration::from_secs(6)).await;
        engine.stop_background();
        handle.await.unwrap();

        assert!(!engine.status().is_running);
        assert!(engine.vault().exists());
        assert!(engine.status().last_sync.is_some());
    }

    #[tokio::test]
    async fn status_reflects_capability_and_backup_state() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_documents(&dir);

        let status = engine.status();
        assert!(status.document_store_supported);
        assert!(!status.is_running);
        assert!(!status.backup.exists);

        engine.sync().await.unwrap();
        let status = engine.status();
        assert!(status.backup.exists);
        assert!(status.last_sync.is_some());

        let dir2 = tempfile::tempdir().unwrap();
        let fallback = engine_fallback_only(&dir2);
        assert!(!fallback.status().document_store_supported);
    }
}
