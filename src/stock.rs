//! Two-stage inventory over the Stock sheet.
//!
//! `empty_stock` counts raw bottles, `filled_stock` counts sellable units.
//! Restocking adds empties, filling moves units from empty to filled, and
//! order mutations adjust filled only. Every mutation is a full-sheet read
//! followed by one bounded row write; two tabs editing concurrently can
//! lose an update, which is all the store offers. What IS enforced is the
//! floor: neither counter is ever written negative, and an overdraw is an
//! explicit error.

use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::codec::{stock_from_row, stock_to_row};
use crate::models::StockItem;
use crate::sheets::{Sheet, SheetsClient};

fn err_value(error: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

pub async fn list(client: &SheetsClient) -> Result<Vec<StockItem>, String> {
    let rows = client.list(Sheet::Stock).await.map_err(|e| e.to_string())?;
    Ok(rows.iter().map(|row| stock_from_row(row)).collect())
}

fn find_item(items: &[StockItem], product: &str) -> Option<usize> {
    let needle = product.trim();
    items
        .iter()
        .position(|item| item.product_name.eq_ignore_ascii_case(needle))
}

// ---------------------------------------------------------------------------
// Pure transition planning (the guards live here, tested without a network)
// ---------------------------------------------------------------------------

/// Move `qty` bottles from empty to filled.
pub fn plan_fill(item: &StockItem, qty: i64, now: &str) -> Result<StockItem, String> {
    if qty <= 0 {
        return Err("Fill quantity must be positive".to_string());
    }
    if qty > item.empty_stock {
        return Err(format!(
            "Cannot fill {qty} bottles of '{}': only {} empty in stock",
            item.product_name, item.empty_stock
        ));
    }
    let mut next = item.clone();
    next.empty_stock -= qty;
    next.filled_stock += qty;
    next.updated_at = now.to_string();
    Ok(next)
}

/// Change filled stock by `delta` (positive restores, negative consumes).
pub fn plan_adjust_filled(item: &StockItem, delta: i64, now: &str) -> Result<StockItem, String> {
    let filled = item.filled_stock + delta;
    if filled < 0 {
        return Err(format!(
            "Insufficient filled stock for '{}': have {}, need {}",
            item.product_name, item.filled_stock, -delta
        ));
    }
    let mut next = item.clone();
    next.filled_stock = filled;
    next.updated_at = now.to_string();
    Ok(next)
}

/// Add `qty` raw bottles and stamp the restock metadata.
pub fn plan_restock(item: &StockItem, qty: i64, now: &str) -> Result<StockItem, String> {
    if qty <= 0 {
        return Err("Restock quantity must be positive".to_string());
    }
    let mut next = item.clone();
    next.empty_stock += qty;
    next.updated_at = now.to_string();
    next.last_restock_at = Some(now.to_string());
    next.last_restock_qty = Some(qty);
    Ok(next)
}

// ---------------------------------------------------------------------------
// Sheet-backed operations
// ---------------------------------------------------------------------------

async fn write_back(client: &SheetsClient, index: usize, item: &StockItem) -> Value {
    match client
        .update_row(
            Sheet::Stock,
            index + 2,
            Sheet::Stock.last_column(),
            &stock_to_row(item),
        )
        .await
    {
        Ok(()) => json!({
            "success": true,
            "emptyStock": item.empty_stock,
            "filledStock": item.filled_stock,
        }),
        Err(e) => err_value(e),
    }
}

async fn mutate<F>(client: &SheetsClient, product: &str, transition: F) -> Value
where
    F: FnOnce(&StockItem, &str) -> Result<StockItem, String>,
{
    let items = match list(client).await {
        Ok(items) => items,
        Err(e) => return err_value(e),
    };
    let Some(index) = find_item(&items, product) else {
        return err_value(format!("Stock item '{product}' not found"));
    };
    let now = crate::now_iso();
    match transition(&items[index], &now) {
        Ok(next) => write_back(client, index, &next).await,
        Err(e) => err_value(e),
    }
}

/// Register a new product in the stock sheet.
pub async fn add_item(client: &SheetsClient, product: &str, empty: i64, filled: i64) -> Value {
    let product = product.trim();
    if product.is_empty() {
        return err_value("Missing product name");
    }
    if empty < 0 || filled < 0 {
        return err_value("Stock counts must not be negative");
    }
    match list(client).await {
        Ok(items) if find_item(&items, product).is_some() => {
            return err_value(format!("Stock item '{product}' already exists"));
        }
        Ok(_) => {}
        Err(e) => return err_value(e),
    }

    let now = crate::now_iso();
    let item = StockItem {
        id: Uuid::new_v4().to_string(),
        product_name: product.to_string(),
        empty_stock: empty,
        filled_stock: filled,
        created_at: now.clone(),
        updated_at: now,
        last_restock_at: None,
        last_restock_qty: None,
    };
    match client.append(Sheet::Stock, &stock_to_row(&item)).await {
        Ok(()) => {
            info!(product, "stock item added");
            json!({ "success": true, "id": item.id })
        }
        Err(e) => err_value(e),
    }
}

/// Add raw bottles to a product's empty stock.
pub async fn restock(client: &SheetsClient, product: &str, qty: i64) -> Value {
    mutate(client, product, |item, now| plan_restock(item, qty, now)).await
}

/// Move bottles from empty to filled. Fails before writing when the empty
/// stock cannot cover the quantity.
pub async fn fill_bottles(client: &SheetsClient, product: &str, qty: i64) -> Value {
    mutate(client, product, |item, now| plan_fill(item, qty, now)).await
}

/// Adjust filled stock by `delta` (order side effects).
pub async fn adjust_filled(client: &SheetsClient, product: &str, delta: i64) -> Value {
    if delta == 0 {
        return json!({ "success": true });
    }
    mutate(client, product, |item, now| {
        plan_adjust_filled(item, delta, now)
    })
    .await
}
