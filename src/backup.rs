//! Single-slot backup management and JSON import/export.
//!
//! The vault keeps exactly one backup record (full order snapshot,
//! epoch-millis timestamp, format version) under a fixed key in the
//! local store. Creating a backup OVERWRITES the previous slot; there
//! is no history, and callers that need the old snapshot must export
//! it first. Restore never fails: an absent or malformed slot restores
//! to an empty order set.

use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{BackupInfo, BackupRecord, ExportFile, Order};
use crate::storage::{LocalStore, BACKUP_KEY};
use crate::sync::SyncEngine;
use crate::StoreError;

/// Backup slot format version.
pub const BACKUP_FORMAT_VERSION: u32 = 1;
/// Export file format version.
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

/// Single-slot snapshot manager over the local store.
pub struct BackupVault {
    local: Arc<LocalStore>,
}

impl BackupVault {
    pub fn new(local: Arc<LocalStore>) -> Self {
        Self { local }
    }

    /// Serialize `{orders, timestamp, version}` into the backup slot,
    /// overwriting any prior backup.
    pub fn create(&self, orders: &[Order]) -> Result<BackupRecord, StoreError> {
        let backup = BackupRecord {
            orders: orders.to_vec(),
            timestamp: Utc::now().timestamp_millis(),
            version: BACKUP_FORMAT_VERSION,
        };
        self.local
            .write(BACKUP_KEY, &backup)
            .map_err(|e| StoreError::BackupWriteFailure(e.to_string()))?;
        info!(orders = backup.orders.len(), "backup slot written");
        Ok(backup)
    }

    /// The current backup record, or `None` when the slot is empty or
    /// no longer deserializes.
    pub fn latest(&self) -> Option<BackupRecord> {
        self.local.read(BACKUP_KEY)
    }

    /// Whether a backup slot is present.
    pub fn exists(&self) -> bool {
        self.latest().is_some()
    }

    /// Slot state for the admin system page.
    pub fn info(&self) -> BackupInfo {
        match self.latest() {
            Some(backup) => BackupInfo {
                exists: true,
                timestamp: Some(backup.timestamp),
                order_count: Some(backup.orders.len()),
            },
            None => BackupInfo {
                exists: false,
                timestamp: None,
                order_count: None,
            },
        }
    }

    /// Orders from the current backup, or an empty set when no backup
    /// exists. Absence is a valid outcome, not an error.
    pub fn restore(&self) -> Vec<Order> {
        match self.latest() {
            Some(backup) => {
                info!(
                    orders = backup.orders.len(),
                    timestamp = backup.timestamp,
                    "restoring order set from backup"
                );
                backup.orders
            }
            None => {
                warn!("no backup slot to restore from");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// JSON import/export
// ---------------------------------------------------------------------------

/// Serialize the order set into the portable export format
/// (pretty-printed, version "1.0").
pub fn export_json(orders: &[Order]) -> Result<String, StoreError> {
    let file = ExportFile {
        orders: orders.to_vec(),
        export_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        version: EXPORT_FORMAT_VERSION.to_string(),
    };
    serde_json::to_string_pretty(&file)
        .map_err(|e| StoreError::WriteFailure(format!("serialize export: {e}")))
}

/// Import an exported document.
///
/// Validates that `orders` is present and is a sequence, writes each
/// record through [`SyncEngine::save`], then creates a fresh backup
/// from the imported set.
pub async fn import_json(engine: &SyncEngine, raw: &str) -> Result<Vec<Order>, StoreError> {
    let document: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| StoreError::InvalidFormat(format!("not valid JSON: {e}")))?;
    let orders_value = document
        .get("orders")
        .ok_or_else(|| StoreError::InvalidFormat("missing `orders` field".into()))?;
    if !orders_value.is_array() {
        return Err(StoreError::InvalidFormat("`orders` is not a sequence".into()));
    }
    let orders: Vec<Order> = serde_json::from_value(orders_value.clone())
        .map_err(|e| StoreError::InvalidFormat(format!("malformed order record: {e}")))?;

    for order in &orders {
        engine.save(order).await?;
    }
    engine.vault().create(&orders)?;

    info!(orders = orders.len(), "order set imported");
    Ok(orders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CartItem, OrderStatus};

    fn vault(dir: &tempfile::TempDir) -> BackupVault {
        BackupVault::new(Arc::new(LocalStore::new(dir.path().join("storage.json"))))
    }

    fn sample_order(id: &str, status: OrderStatus) -> Order {
        Order {
            id: id.into(),
            customer_name: "Andres".into(),
            customer_phone: "3204448899".into(),
            customer_address: None,
            items: vec![CartItem {
                id: "arepa-queso".into(),
                name: "Arepa de queso".into(),
                category: Some("arepa".into()),
                price: 6000.0,
                price_with_drink: None,
                has_drink_option: false,
                quantity: 2,
                with_drink: false,
            }],
            total: 12000.0,
            status,
            created_at: "2026-08-08T11:00:00.000Z".into(),
        }
    }

    #[test]
    fn create_then_restore_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);
        let orders = vec![
            sample_order("order-1", OrderStatus::Pending),
            sample_order("order-2", OrderStatus::Completed),
        ];

        let backup = vault.create(&orders).unwrap();
        assert_eq!(backup.version, BACKUP_FORMAT_VERSION);
        assert!(backup.timestamp > 0);

        assert_eq!(vault.restore(), orders);
    }

    #[test]
    fn create_overwrites_the_previous_slot() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);

        vault
            .create(&[sample_order("order-old", OrderStatus::Pending)])
            .unwrap();
        vault
            .create(&[sample_order("order-new", OrderStatus::Completed)])
            .unwrap();

        let restored = vault.restore();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].id, "order-new");
    }

    #[test]
    fn absent_slot_restores_empty_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);

        assert!(!vault.exists());
        assert!(vault.restore().is_empty());

        let info = vault.info();
        assert!(!info.exists);
        assert!(info.timestamp.is_none());
        assert!(info.order_count.is_none());
    }

    #[test]
    fn malformed_slot_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let local = Arc::new(LocalStore::new(dir.path().join("storage.json")));
        local.write(BACKUP_KEY, &"garbage, not a backup").unwrap();

        let vault = BackupVault::new(local);
        assert!(!vault.exists());
        assert!(vault.restore().is_empty());
    }

    #[test]
    fn info_reports_slot_contents() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);
        vault
            .create(&[
                sample_order("order-1", OrderStatus::Pending),
                sample_order("order-2", OrderStatus::Pending),
                sample_order("order-3", OrderStatus::Cancelled),
            ])
            .unwrap();

        let info = vault.info();
        assert!(info.exists);
        assert_eq!(info.order_count, Some(3));
        assert!(info.timestamp.unwrap() > 0);
    }

    #[test]
    fn export_carries_format_version_and_orders() {
        let orders = vec![sample_order("order-9", OrderStatus::Completed)];
        let raw = export_json(&orders).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["version"], "1.0");
        assert!(parsed["exportDate"].is_string());
        assert_eq!(parsed["orders"][0]["id"], "order-9");
    }
}
