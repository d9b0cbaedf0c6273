//! Order service over the Orders sheet.
//!
//! Mutations follow the store's only available pattern: full-sheet read,
//! in-memory row scan, second call addressed by the computed row number.
//! Stock side effects (filled units move with order quantities) are
//! best-effort: a failed stock write logs and continues, it never rolls
//! back the order mutation.

use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::codec::{
    order_from_row, order_to_row, COL_FDE_STATUS, COL_LAST_UPDATED, COL_ORDER_STATUS,
    COL_PAYMENT_RECEIVED,
};
use crate::models::{Order, OrderStatus};
use crate::reconcile::find_order_row;
use crate::sheets::{Sheet, SheetsClient};
use crate::stock;

/// Generic order updates write columns A through Q; column R (the FDE
/// waybill) belongs exclusively to [`set_fde_waybill`].
const GENERIC_LAST_COLUMN: char = 'Q';
const GENERIC_WIDTH: usize = 17;

fn err_value(error: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

/// Tracking ids are `LK` + creation timestamp in milliseconds.
pub fn generate_tracking_id() -> String {
    format!("LK{}", Utc::now().timestamp_millis())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

pub async fn list(client: &SheetsClient) -> Result<Vec<Order>, String> {
    let rows = client.list(Sheet::Orders).await.map_err(|e| e.to_string())?;
    Ok(rows.iter().map(|row| order_from_row(row)).collect())
}

pub async fn get(client: &SheetsClient, tracking_id: &str) -> Result<Order, String> {
    let rows = client.values(Sheet::Orders).await.map_err(|e| e.to_string())?;
    let located = find_order_row(&rows, tracking_id)
        .ok_or_else(|| format!("Order '{tracking_id}' not found"))?;
    Ok(order_from_row(&rows[located.row_number - 1]))
}

// ---------------------------------------------------------------------------
// Quantity bookkeeping for stock side effects
// ---------------------------------------------------------------------------

/// Total quantity per product name (trimmed, original casing kept from the
/// first occurrence).
fn quantities(order: &Order) -> HashMap<String, i64> {
    let mut by_product: HashMap<String, i64> = HashMap::new();
    for item in &order.items {
        let name = item.product.trim().to_string();
        if name.is_empty() {
            continue;
        }
        *by_product.entry(name).or_insert(0) += i64::from(item.quantity);
    }
    by_product
}

/// Per-product quantity change from `old` to `new` (positive = more units
/// ordered, so more filled stock consumed).
pub fn quantity_deltas(old: &Order, new: &Order) -> Vec<(String, i64)> {
    let old_q = quantities(old);
    let new_q = quantities(new);
    let mut products: Vec<String> = old_q.keys().chain(new_q.keys()).cloned().collect();
    products.sort();
    products.dedup();
    products
        .into_iter()
        .filter_map(|product| {
            let delta = new_q.get(&product).copied().unwrap_or(0)
                - old_q.get(&product).copied().unwrap_or(0);
            (delta != 0).then_some((product, delta))
        })
        .collect()
}

/// Apply filled-stock adjustments, logging failures and moving on.
async fn apply_stock_deltas(client: &SheetsClient, deltas: &[(String, i64)]) {
    for (product, delta) in deltas {
        // Orders consume filled stock, so the stock adjustment is negated.
        let outcome = stock::adjust_filled(client, product, -delta).await;
        if outcome.get("success").and_then(Value::as_bool) != Some(true) {
            warn!(
                product = %product,
                delta = -delta,
                error = ?outcome.get("error"),
                "stock adjustment failed, continuing"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// Create an order: auto-generate the tracking id when absent, append the
/// row, then decrement filled stock per line item.
pub async fn create(client: &SheetsClient, mut order: Order) -> Value {
    if order.tracking_id.trim().is_empty() {
        order.tracking_id = generate_tracking_id();
    }
    if order.order_date.trim().is_empty() {
        order.order_date = Utc::now().format("%Y-%m-%d").to_string();
    }
    if order.total_amount == 0.0 {
        order.total_amount = order
            .items
            .iter()
            .map(|item| f64::from(item.quantity) * item.unit_price)
            .sum();
    }
    order.last_updated = crate::now_iso();

    if let Err(e) = client.append(Sheet::Orders, &order_to_row(&order)).await {
        return err_value(e);
    }
    info!(tracking_id = %order.tracking_id, "order created");

    let consumed: Vec<(String, i64)> = quantities(&order).into_iter().collect();
    apply_stock_deltas(client, &consumed).await;

    json!({ "success": true, "trackingId": order.tracking_id })
}

/// Generic order update. Writes columns A–Q only; the FDE waybill cell is
/// never part of this range.
pub async fn update(client: &SheetsClient, tracking_id: &str, mut updated: Order) -> Value {
    let rows = match client.values(Sheet::Orders).await {
        Ok(rows) => rows,
        Err(e) => return err_value(e),
    };
    let Some(located) = find_order_row(&rows, tracking_id) else {
        return err_value(format!("Order '{tracking_id}' not found"));
    };
    let previous = order_from_row(&rows[located.row_number - 1]);

    updated.tracking_id = tracking_id.trim().to_string();
    updated.last_updated = crate::now_iso();
    let row = order_to_row(&updated);

    if let Err(e) = client
        .update_row(
            Sheet::Orders,
            located.row_number,
            GENERIC_LAST_COLUMN,
            &row[..GENERIC_WIDTH],
        )
        .await
    {
        return err_value(e);
    }
    info!(tracking_id, "order updated");

    apply_stock_deltas(client, &quantity_deltas(&previous, &updated)).await;
    json!({ "success": true })
}

/// Delete the order row and restore its filled stock.
pub async fn delete(client: &SheetsClient, tracking_id: &str) -> Value {
    let rows = match client.values(Sheet::Orders).await {
        Ok(rows) => rows,
        Err(e) => return err_value(e),
    };
    let Some(located) = find_order_row(&rows, tracking_id) else {
        return err_value(format!("Order '{tracking_id}' not found"));
    };
    let removed = order_from_row(&rows[located.row_number - 1]);

    // 1-based row number -> 0-based index for DeleteDimension.
    if let Err(e) = client.delete_row(Sheet::Orders, located.row_number - 1).await {
        return err_value(e);
    }
    info!(tracking_id, "order deleted");

    // Deleting restores stock: the consumed units come back as filled.
    let restored: Vec<(String, i64)> = quantities(&removed)
        .into_iter()
        .map(|(product, qty)| (product, -qty))
        .collect();
    apply_stock_deltas(client, &restored).await;

    json!({ "success": true })
}

/// Record the FDE dispatch waybill in column R. This is the only code path
/// that writes the cell, and it is write-once: a different existing waybill
/// is refused.
pub async fn set_fde_waybill(client: &SheetsClient, tracking_id: &str, waybill: &str) -> Value {
    let waybill = waybill.trim();
    if waybill.is_empty() {
        return err_value("Missing waybill number");
    }
    let rows = match client.values(Sheet::Orders).await {
        Ok(rows) => rows,
        Err(e) => return err_value(e),
    };
    let Some(located) = find_order_row(&rows, tracking_id) else {
        return err_value(format!("Order '{tracking_id}' not found"));
    };

    let existing = rows[located.row_number - 1]
        .get(COL_FDE_STATUS)
        .map(|s| s.trim())
        .unwrap_or("");
    if !existing.is_empty() && existing != waybill {
        return err_value(format!(
            "Order '{tracking_id}' already has FDE waybill '{existing}'"
        ));
    }

    match client
        .update_cell(Sheet::Orders, located.row_number, COL_FDE_STATUS, waybill)
        .await
    {
        Ok(()) => {
            info!(tracking_id, waybill, "FDE waybill recorded");
            json!({ "success": true })
        }
        Err(e) => err_value(e),
    }
}

/// Mark a single order's payment as received (manual operator action; the
/// bulk path is `reconcile::import_csv`).
pub async fn set_payment_received(client: &SheetsClient, tracking_id: &str) -> Value {
    single_cell_update(client, tracking_id, COL_PAYMENT_RECEIVED, "Yes").await
}

/// Update the status column (and the LastUpdated stamp, best-effort).
pub async fn set_status(client: &SheetsClient, tracking_id: &str, status: OrderStatus) -> Value {
    let result = single_cell_update(client, tracking_id, COL_ORDER_STATUS, status.as_str()).await;
    if result.get("success").and_then(Value::as_bool) == Some(true) {
        if let Some(row_number) = result.get("rowNumber").and_then(Value::as_u64) {
            let stamp = crate::now_iso();
            if let Err(e) = client
                .update_cell(Sheet::Orders, row_number as usize, COL_LAST_UPDATED, &stamp)
                .await
            {
                warn!(tracking_id, error = %e, "failed to refresh LastUpdated");
            }
        }
    }
    result
}

async fn single_cell_update(
    client: &SheetsClient,
    tracking_id: &str,
    col_index: usize,
    value: &str,
) -> Value {
    let rows = match client.values(Sheet::Orders).await {
        Ok(rows) => rows,
        Err(e) => return err_value(e),
    };
    let Some(located) = find_order_row(&rows, tracking_id) else {
        return err_value(format!("Order '{tracking_id}' not found"));
    };
    match client
        .update_cell(Sheet::Orders, located.row_number, col_index, value)
        .await
    {
        Ok(()) => json!({ "success": true, "rowNumber": located.row_number }),
        Err(e) => err_value(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderItem;

    fn order_with(items: &[(&str, u32)]) -> Order {
        Order {
            items: items
                .iter()
                .map(|(product, qty)| OrderItem {
                    product: product.to_string(),
                    quantity: *qty,
                    unit_price: 0.0,
                })
                .collect(),
            ..Order::default()
        }
    }

    #[test]
    fn tracking_ids_are_lk_plus_timestamp() {
        let id = generate_tracking_id();
        assert!(id.starts_with("LK"));
        let digits = &id[2..];
        assert!(digits.len() >= 13);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn quantity_deltas_cover_added_removed_and_changed_lines() {
        let old = order_with(&[("Oil", 2), ("Shampoo", 1)]);
        let new = order_with(&[("Oil", 3), ("Serum", 2)]);
        let deltas = quantity_deltas(&old, &new);
        assert_eq!(
            deltas,
            vec![
                ("Oil".to_string(), 1),
                ("Serum".to_string(), 2),
                ("Shampoo".to_string(), -1),
            ]
        );
    }

    #[test]
    fn identical_orders_produce_no_deltas() {
        let order = order_with(&[("Oil", 2)]);
        assert!(quantity_deltas(&order, &order).is_empty());
    }

    #[test]
    fn duplicate_line_items_sum_before_diffing() {
        let old = order_with(&[("Oil", 1), ("Oil", 1)]);
        let new = order_with(&[("Oil", 2)]);
        assert!(quantity_deltas(&old, &new).is_empty());
    }
}
