//! Offline-first storefront backend.
//!
//! Orders live in two client-local tiers, an embedded SQLite document
//! store and a whole-blob JSON key-value store, reconciled by a sync
//! engine with a single-slot backup vault behind it. There is no
//! server; the UI layer is an external consumer of [`Storefront`] and
//! the services it exposes.

use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod auth;
pub mod backup;
pub mod db;
pub mod error;
pub mod models;
pub mod orders;
pub mod storage;
pub mod sync;

pub use auth::AdminAuth;
pub use backup::{export_json, import_json, BackupVault};
pub use db::DocumentStore;
pub use error::StoreError;
pub use models::{
    BackupInfo, BackupRecord, CartItem, DailySales, ExportFile, Order, OrderStatus, ProductSales,
    SalesStats,
};
pub use orders::{NewOrder, OrderService};
pub use storage::LocalStore;
pub use sync::{
    start_refresh_loop, SyncEngine, SyncStatus, WriteOutcome, WriteTier,
    DEFAULT_REFRESH_INTERVAL_SECS,
};

/// Backing file for the key-value store inside the data directory.
pub const STORAGE_FILE: &str = "storage.json";

/// Fully wired storefront backend over one data directory.
///
/// All store handles are explicit instances shared through `Arc`; there
/// is no ambient global state. Opening never fails: an unusable
/// document store leaves the engine in local-store-only fallback mode
/// for the session.
pub struct Storefront {
    pub local: Arc<LocalStore>,
    pub engine: Arc<SyncEngine>,
    pub orders: OrderService,
    pub auth: AdminAuth,
}

impl Storefront {
    /// Assemble the stores and services over `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        let local = Arc::new(LocalStore::new(data_dir.join(STORAGE_FILE)));
        let engine = Arc::new(SyncEngine::new(data_dir, Arc::clone(&local)));
        Self {
            orders: OrderService::new(Arc::clone(&engine)),
            auth: AdminAuth::new(Arc::clone(&local)),
            local,
            engine,
        }
    }
}

/// Initialize structured logging for embedding binaries.
///
/// Honors `RUST_LOG`; defaults to `info` with debug detail for this
/// crate. Safe to call more than once (later calls are no-ops).
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,empanadas_storefront=debug"));
    let console_layer = fmt::layer().with_target(true);
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init();
}
