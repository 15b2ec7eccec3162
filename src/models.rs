//! Persisted data model for the storefront.
//!
//! Every struct serializes with camelCase field names; this is the wire
//! format the storefront frontend reads from the local stores and the
//! export files, so renames here are breaking changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle state of an order. Transitions are not restricted; the
/// admin dashboard may move an order between any two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A product snapshot captured at checkout time.
///
/// `price` is the effective unit price (already the with-drink price
/// when `with_drink` is set); totals computed from it are never
/// recomputed against the live catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_with_drink: Option<f64>,
    #[serde(default)]
    pub has_drink_option: bool,
    pub quantity: u32,
    #[serde(default)]
    pub with_drink: bool,
}

impl CartItem {
    /// Line subtotal at the captured unit price.
    pub fn subtotal(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

/// A customer's checkout record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub customer_name: String,
    pub customer_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_address: Option<String>,
    pub items: Vec<CartItem>,
    /// Sum of item subtotals at creation time. Never recomputed after
    /// status changes.
    pub total: f64,
    pub status: OrderStatus,
    /// ISO-8601 creation timestamp (UTC).
    pub created_at: String,
}

impl Order {
    /// Parsed creation timestamp. Unparseable values collapse to the
    /// Unix epoch so they lose any newer-wins comparison and the tier
    /// ordering settles the rest.
    pub(crate) fn created_at_utc(&self) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// UTC calendar date portion of `created_at` (YYYY-MM-DD).
    pub(crate) fn created_at_date(&self) -> &str {
        self.created_at.split('T').next().unwrap_or("")
    }
}

/// The single backup slot: a full order snapshot plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub orders: Vec<Order>,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
    /// Backup format version.
    pub version: u32,
}

/// Snapshot of the backup slot state for the admin system page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_count: Option<usize>,
}

/// On-disk shape of an exported order set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub orders: Vec<Order>,
    /// ISO-8601 export timestamp.
    pub export_date: String,
    /// Export format version, currently "1.0".
    pub version: String,
}

/// Per-product sales aggregate, keyed by product id in [`SalesStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProductSales {
    pub quantity: u64,
    pub revenue: f64,
}

/// One day of the trailing revenue series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySales {
    /// UTC calendar date, YYYY-MM-DD.
    pub date: String,
    pub orders: u64,
    pub revenue: f64,
}

/// Read-only sales aggregate over completed orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesStats {
    pub total_sales: f64,
    pub total_orders: u64,
    pub product_sales: HashMap<String, ProductSales>,
    /// Trailing 7 days, oldest first.
    pub sales_by_day: Vec<DailySales>,
}
