//! Order lifecycle and sales statistics.
//!
//! Thin orchestration over the sync engine: creation validates input
//! and computes the immutable total, reads always reconcile first, and
//! status transitions go back through the engine's write path.

use chrono::{Duration, NaiveDate, SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::models::{CartItem, DailySales, Order, OrderStatus, ProductSales, SalesStats};
use crate::sync::SyncEngine;
use crate::StoreError;

/// Days covered by the trailing sales series.
const SALES_SERIES_DAYS: i64 = 7;

/// Input to order creation; the id, status, total, and timestamp are
/// assigned here, never by the caller.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: Option<String>,
    pub items: Vec<CartItem>,
}

/// Domain-level order API over the sync engine.
pub struct OrderService {
    engine: Arc<SyncEngine>,
}

impl OrderService {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }

    /// Validate and persist a new order.
    ///
    /// Requires a customer name, a phone number, and at least one item;
    /// fails with [`StoreError::ValidationError`] before touching any
    /// store. The total is the sum of line subtotals at the captured
    /// unit prices and is never recomputed afterwards.
    pub async fn create_order(&self, request: NewOrder) -> Result<Order, StoreError> {
        let customer_name = request.customer_name.trim();
        if customer_name.is_empty() {
            return Err(StoreError::ValidationError("customer name is required".into()));
        }
        let customer_phone = request.customer_phone.trim();
        if customer_phone.is_empty() {
            return Err(StoreError::ValidationError("customer phone is required".into()));
        }
        if request.items.is_empty() {
            return Err(StoreError::ValidationError(
                "order must contain at least one item".into(),
            ));
        }

        let total: f64 = request.items.iter().map(CartItem::subtotal).sum();
        let now = Utc::now();
        let order = Order {
            id: format!("order-{}", now.timestamp_millis()),
            customer_name: customer_name.to_string(),
            customer_phone: customer_phone.to_string(),
            customer_address: request
                .customer_address
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            items: request.items,
            total,
            status: OrderStatus::Pending,
            created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let outcome = self.engine.save(&order).await?;
        info!(
            order_id = %order.id,
            total = order.total,
            tier = ?outcome.tier,
            "order created"
        );
        Ok(order)
    }

    /// Reconcile, then return the full order set.
    pub async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        self.engine.sync().await
    }

    /// Apply a status transition and persist the updated order.
    ///
    /// Transitions are unrestricted: any status may move to any other.
    /// Fails with [`StoreError::NotFound`] for an unknown id.
    pub async fn set_status(&self, id: &str, status: OrderStatus) -> Result<Order, StoreError> {
        let orders = self.list_orders().await?;
        let mut order = orders
            .into_iter()
            .find(|o| o.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let previous = order.status;
        order.status = status;
        self.engine.save(&order).await?;
        info!(order_id = %order.id, from = %previous, to = %status, "order status updated");
        Ok(order)
    }

    /// Read-only sales aggregate over completed orders.
    pub async fn sales_statistics(&self) -> Result<SalesStats, StoreError> {
        let orders = self.list_orders().await?;
        Ok(sales_stats_for(&orders, Utc::now().date_naive()))
    }
}

/// Compute the aggregate for a fixed "today"; only `completed` orders
/// contribute to any figure.
fn sales_stats_for(orders: &[Order], today: NaiveDate) -> SalesStats {
    let completed: Vec<&Order> = orders
        .iter()
        .filter(|o| o.status == OrderStatus::Completed)
        .collect();

    let total_sales: f64 = completed.iter().map(|o| o.total).sum();
    let total_orders = completed.len() as u64;

    let mut product_sales: HashMap<String, ProductSales> = HashMap::new();
    for order in &completed {
        for item in &order.items {
            let entry = product_sales.entry(item.id.clone()).or_default();
            entry.quantity += u64::from(item.quantity);
            entry.revenue += item.subtotal();
        }
    }

    let sales_by_day = (0..SALES_SERIES_DAYS)
        .rev()
        .map(|offset| {
            let date = (today - Duration::days(offset)).format("%Y-%m-%d").to_string();
            let day_orders: Vec<&&Order> = completed
                .iter()
                .filter(|o| o.created_at_date() == date)
                .collect();
            DailySales {
                date,
                orders: day_orders.len() as u64,
                revenue: day_orders.iter().map(|o| o.total).sum(),
            }
        })
        .collect();

    SalesStats {
        total_sales,
        total_orders,
        product_sales,
        sales_by_day,
    }
}
