//! Positional row codecs for every logical sheet.
//!
//! The spreadsheet is the database, so these functions ARE the schema: one
//! fixed column order per sheet, documented next to each codec. Decoding is
//! deliberately lenient (short rows are padded, numeric cells fall back to
//! 0, booleans compare case-sensitively against the literal "Yes") because
//! operators edit these sheets by hand and a malformed cell must never take
//! the panel down. Encoders always emit the full column width.

use tracing::warn;

use crate::models::{
    BranchContact, Expense, ExpenseType, FailedTracking, Order, OrderItem, OrderStatus,
    PaymentMethod, Product, StockItem, TrackingStatus,
};

// ---------------------------------------------------------------------------
// Orders sheet layout (columns A–R)
// ---------------------------------------------------------------------------

pub const COL_TRACKING_ID: usize = 0;
pub const COL_CUSTOMER_INFO: usize = 1;
pub const COL_TOTAL_AMOUNT: usize = 5;
pub const COL_ORDER_STATUS: usize = 6;
pub const COL_PAYMENT_METHOD: usize = 7;
pub const COL_PAYMENT_RECEIVED: usize = 8;
pub const COL_FREE_SHIPPING: usize = 9;
pub const COL_ORDER_DATE: usize = 10;
pub const COL_LAST_UPDATED: usize = 11;
pub const COL_MAIN_CITY: usize = 16;
/// Column R. Written only by the dedicated FDE dispatch path; the generic
/// order update bounds its range at column Q and never touches it.
pub const COL_FDE_STATUS: usize = 17;

pub const ORDER_ROW_WIDTH: usize = 18;

/// Quantity columns, keyed by the canonical product name the order form uses.
/// Line items reference products by name, so this mapping is the only join.
pub const PRODUCT_QTY_COLUMNS: &[(&str, usize)] = &[
    ("Oil", 2),
    ("Shampoo", 3),
    ("Conditioner", 4),
    ("Spray", 12),
    ("Serum", 13),
    ("Premium", 14),
    ("Castor", 15),
];

// ---------------------------------------------------------------------------
// Lenient cell readers
// ---------------------------------------------------------------------------

fn cell_str(row: &[String], idx: usize) -> String {
    row.get(idx).map(|s| s.trim().to_string()).unwrap_or_default()
}

fn cell_f64(row: &[String], idx: usize) -> f64 {
    row.get(idx)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn cell_u32(row: &[String], idx: usize) -> u32 {
    row.get(idx)
        .and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(0)
}

fn cell_i64(row: &[String], idx: usize) -> i64 {
    row.get(idx)
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

/// Boolean cells hold the literal "Yes" or anything else; the comparison is
/// case-sensitive on purpose ("yes" and "YES" read as false, matching what
/// the sheets have always done).
fn cell_yes(row: &[String], idx: usize) -> bool {
    row.get(idx).map(|s| s == "Yes").unwrap_or(false)
}

fn yes_no(flag: bool) -> String {
    if flag { "Yes" } else { "No" }.to_string()
}

fn opt_cell(row: &[String], idx: usize) -> Option<String> {
    let v = cell_str(row, idx);
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

// ---------------------------------------------------------------------------
// Order codec
// ---------------------------------------------------------------------------

/// Merge name, address lines, and contact into the single CustomerInfo cell,
/// one part per line. Empty address lines are skipped.
fn merge_customer_info(order: &Order) -> String {
    let mut parts = vec![order.name.trim().to_string()];
    for line in [&order.address_line1, &order.address_line2, &order.address_line3] {
        let line = line.trim();
        if !line.is_empty() {
            parts.push(line.to_string());
        }
    }
    parts.push(order.contact.trim().to_string());
    parts.join("\n")
}

/// De-merge CustomerInfo. Lossy by design: the first line is the name, the
/// last line is the contact, and every middle line collapses into
/// `address_line1`. Address lines 2 and 3 do not survive a round trip.
fn split_customer_info(cell: &str) -> (String, String, String) {
    let lines: Vec<&str> = cell.lines().map(str::trim).collect();
    match lines.len() {
        0 => (String::new(), String::new(), String::new()),
        1 => (lines[0].to_string(), String::new(), String::new()),
        n => (
            lines[0].to_string(),
            lines[1..n - 1].join(", "),
            lines[n - 1].to_string(),
        ),
    }
}

pub fn order_to_row(order: &Order) -> Vec<String> {
    let mut row = vec![String::new(); ORDER_ROW_WIDTH];
    row[COL_TRACKING_ID] = order.tracking_id.trim().to_string();
    row[COL_CUSTOMER_INFO] = merge_customer_info(order);
    for (product, col) in PRODUCT_QTY_COLUMNS {
        let qty: u32 = order
            .items
            .iter()
            .filter(|item| item.product.trim().eq_ignore_ascii_case(product))
            .map(|item| item.quantity)
            .sum();
        row[*col] = qty.to_string();
    }
    row[COL_TOTAL_AMOUNT] = format!("{:.2}", order.total_amount);
    row[COL_ORDER_STATUS] = order.status.as_str().to_string();
    row[COL_PAYMENT_METHOD] = order.payment_method.as_str().to_string();
    row[COL_PAYMENT_RECEIVED] = yes_no(order.payment_received);
    row[COL_FREE_SHIPPING] = yes_no(order.free_shipping);
    row[COL_ORDER_DATE] = order.order_date.trim().to_string();
    row[COL_LAST_UPDATED] = order.last_updated.trim().to_string();
    row[COL_MAIN_CITY] = order.main_city.clone().unwrap_or_default();
    row[COL_FDE_STATUS] = order.fde_waybill.clone().unwrap_or_default();
    row
}

pub fn order_from_row(row: &[String]) -> Order {
    if cfg!(debug_assertions) && !row.is_empty() && row.len() != ORDER_ROW_WIDTH {
        warn!(
            width = row.len(),
            expected = ORDER_ROW_WIDTH,
            tracking_id = %cell_str(row, COL_TRACKING_ID),
            "unexpected Orders row width"
        );
    }

    let (name, address_line1, contact) = split_customer_info(&cell_str(row, COL_CUSTOMER_INFO));

    // Unit prices are not part of the row layout; decoded items carry 0.0.
    let items: Vec<OrderItem> = PRODUCT_QTY_COLUMNS
        .iter()
        .filter_map(|(product, col)| {
            let qty = cell_u32(row, *col);
            (qty > 0).then(|| OrderItem {
                product: (*product).to_string(),
                quantity: qty,
                unit_price: 0.0,
            })
        })
        .collect();

    Order {
        tracking_id: cell_str(row, COL_TRACKING_ID),
        name,
        address_line1,
        address_line2: String::new(),
        address_line3: String::new(),
        contact,
        items,
        total_amount: cell_f64(row, COL_TOTAL_AMOUNT),
        status: OrderStatus::parse(&cell_str(row, COL_ORDER_STATUS)),
        payment_method: PaymentMethod::parse(&cell_str(row, COL_PAYMENT_METHOD)),
        payment_received: cell_yes(row, COL_PAYMENT_RECEIVED),
        free_shipping: cell_yes(row, COL_FREE_SHIPPING),
        order_date: cell_str(row, COL_ORDER_DATE),
        last_updated: cell_str(row, COL_LAST_UPDATED),
        main_city: opt_cell(row, COL_MAIN_CITY),
        fde_waybill: opt_cell(row, COL_FDE_STATUS),
    }
}

// ---------------------------------------------------------------------------
// Products sheet (columns A–E): id, name, cost, price, updated_at
// ---------------------------------------------------------------------------

pub fn product_to_row(product: &Product) -> Vec<String> {
    vec![
        product.id.clone(),
        product.name.trim().to_string(),
        format!("{:.2}", product.cost),
        format!("{:.2}", product.price),
        product.updated_at.clone(),
    ]
}

pub fn product_from_row(row: &[String]) -> Product {
    Product {
        id: cell_str(row, 0),
        name: cell_str(row, 1),
        cost: cell_f64(row, 2),
        price: cell_f64(row, 3),
        updated_at: cell_str(row, 4),
    }
}

// ---------------------------------------------------------------------------
// Stock sheet (columns A–H):
// id, product_name, empty_stock, filled_stock, created_at, updated_at,
// last_restock_at, last_restock_qty
// ---------------------------------------------------------------------------

pub fn stock_to_row(item: &StockItem) -> Vec<String> {
    vec![
        item.id.clone(),
        item.product_name.trim().to_string(),
        item.empty_stock.to_string(),
        item.filled_stock.to_string(),
        item.created_at.clone(),
        item.updated_at.clone(),
        item.last_restock_at.clone().unwrap_or_default(),
        item.last_restock_qty.map(|q| q.to_string()).unwrap_or_default(),
    ]
}

pub fn stock_from_row(row: &[String]) -> StockItem {
    StockItem {
        id: cell_str(row, 0),
        product_name: cell_str(row, 1),
        empty_stock: cell_i64(row, 2),
        filled_stock: cell_i64(row, 3),
        created_at: cell_str(row, 4),
        updated_at: cell_str(row, 5),
        last_restock_at: opt_cell(row, 6),
        last_restock_qty: row.get(7).and_then(|s| s.trim().parse::<i64>().ok()),
    }
}

// ---------------------------------------------------------------------------
// Expenses sheet (columns A–E): id, type, amount, note, date
// ---------------------------------------------------------------------------

pub fn expense_to_row(expense: &Expense) -> Vec<String> {
    vec![
        expense.id.clone(),
        expense.expense_type.as_str().to_string(),
        format!("{:.2}", expense.amount),
        expense.note.trim().to_string(),
        expense.date.trim().to_string(),
    ]
}

pub fn expense_from_row(row: &[String]) -> Expense {
    Expense {
        id: cell_str(row, 0),
        expense_type: ExpenseType::parse(&cell_str(row, 1)),
        amount: cell_f64(row, 2),
        note: cell_str(row, 3),
        date: cell_str(row, 4),
    }
}

// ---------------------------------------------------------------------------
// FailTrackings sheet (columns A–H):
// id, tracking_id, reason, attempt_count, first_failed, last_attempt,
// status, error_details
// ---------------------------------------------------------------------------

pub fn failed_tracking_to_row(rec: &FailedTracking) -> Vec<String> {
    vec![
        rec.id.clone(),
        rec.tracking_id.trim().to_string(),
        rec.reason.trim().to_string(),
        rec.attempt_count.to_string(),
        rec.first_failed.clone(),
        rec.last_attempt.clone(),
        rec.status.as_str().to_string(),
        rec.error_details.clone().unwrap_or_default(),
    ]
}

pub fn failed_tracking_from_row(row: &[String]) -> FailedTracking {
    FailedTracking {
        id: cell_str(row, 0),
        tracking_id: cell_str(row, 1),
        reason: cell_str(row, 2),
        attempt_count: cell_u32(row, 3),
        first_failed: cell_str(row, 4),
        last_attempt: cell_str(row, 5),
        status: TrackingStatus::parse(&cell_str(row, 6)),
        error_details: opt_cell(row, 7),
    }
}

// ---------------------------------------------------------------------------
// BranchNumbers sheet (columns A–F): id, branch, phone1..3, note. Read-only.
// ---------------------------------------------------------------------------

pub fn branch_from_row(row: &[String]) -> BranchContact {
    BranchContact {
        id: cell_str(row, 0),
        branch: cell_str(row, 1),
        phone1: cell_str(row, 2),
        phone2: cell_str(row, 3),
        phone3: cell_str(row, 4),
        note: cell_str(row, 5),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order {
            tracking_id: "LK1700000000000".into(),
            name: "Nimali Perera".into(),
            address_line1: "12 Temple Road".into(),
            address_line2: "Wattala".into(),
            address_line3: "Western".into(),
            contact: "0771234567, 0112233445".into(),
            items: vec![
                OrderItem {
                    product: "Oil".into(),
                    quantity: 2,
                    unit_price: 1450.0,
                },
                OrderItem {
                    product: "Shampoo".into(),
                    quantity: 1,
                    unit_price: 1950.0,
                },
            ],
            total_amount: 4850.0,
            status: OrderStatus::Dispatched,
            payment_method: PaymentMethod::Cod,
            payment_received: false,
            free_shipping: true,
            order_date: "2025-06-14".into(),
            last_updated: "2025-06-15T08:30:00Z".into(),
            main_city: Some("Negombo".into()),
            fde_waybill: Some("FD99887".into()),
        }
    }

    #[test]
    fn order_row_has_fixed_width_and_layout() {
        let row = order_to_row(&sample_order());
        assert_eq!(row.len(), ORDER_ROW_WIDTH);
        assert_eq!(row[COL_TRACKING_ID], "LK1700000000000");
        assert_eq!(row[2], "2"); // Oil qty
        assert_eq!(row[3], "1"); // Shampoo qty
        assert_eq!(row[12], "0"); // Spray qty
        assert_eq!(row[COL_PAYMENT_RECEIVED], "No");
        assert_eq!(row[COL_FREE_SHIPPING], "Yes");
        assert_eq!(row[COL_FDE_STATUS], "FD99887");
    }

    #[test]
    fn order_round_trip_covers_layout_columns() {
        let original = sample_order();
        let decoded = order_from_row(&order_to_row(&original));

        assert_eq!(decoded.tracking_id, original.tracking_id);
        assert_eq!(decoded.name, original.name);
        assert_eq!(decoded.contact, original.contact);
        assert_eq!(decoded.total_amount, original.total_amount);
        assert_eq!(decoded.status, original.status);
        assert_eq!(decoded.payment_method, original.payment_method);
        assert_eq!(decoded.payment_received, original.payment_received);
        assert_eq!(decoded.free_shipping, original.free_shipping);
        assert_eq!(decoded.order_date, original.order_date);
        assert_eq!(decoded.main_city, original.main_city);
        assert_eq!(decoded.fde_waybill, original.fde_waybill);

        // Quantities survive; unit prices are outside the layout.
        assert_eq!(decoded.items.len(), 2);
        assert_eq!(decoded.items[0].product, "Oil");
        assert_eq!(decoded.items[0].quantity, 2);
        assert_eq!(decoded.items[0].unit_price, 0.0);
    }

    #[test]
    fn customer_info_demerge_is_lossy_for_address_lines_2_and_3() {
        // Intended behavior: the three address lines collapse into one on
        // decode. This is a documented property of the format, not a defect.
        let decoded = order_from_row(&order_to_row(&sample_order()));
        assert_eq!(decoded.address_line1, "12 Temple Road, Wattala, Western");
        assert_eq!(decoded.address_line2, "");
        assert_eq!(decoded.address_line3, "");
    }

    #[test]
    fn short_and_malformed_rows_decode_with_defaults() {
        let order = order_from_row(&[]);
        assert_eq!(order.tracking_id, "");
        assert_eq!(order.total_amount, 0.0);
        assert_eq!(order.status, OrderStatus::Preparing);
        assert!(!order.payment_received);

        let row = vec![
            "LK5".to_string(),
            "Amal".to_string(),
            "not-a-number".to_string(),
        ];
        let order = order_from_row(&row);
        assert_eq!(order.tracking_id, "LK5");
        assert!(order.items.is_empty());
    }

    #[test]
    fn payment_received_yes_is_case_sensitive() {
        let mut row = order_to_row(&sample_order());
        row[COL_PAYMENT_RECEIVED] = "YES".into();
        assert!(!order_from_row(&row).payment_received);
        row[COL_PAYMENT_RECEIVED] = "Yes".into();
        assert!(order_from_row(&row).payment_received);
    }

    #[test]
    fn failed_tracking_round_trip() {
        let rec = FailedTracking {
            id: "f-1".into(),
            tracking_id: "LK200".into(),
            reason: "Order not found".into(),
            attempt_count: 3,
            first_failed: "2025-06-01T10:00:00Z".into(),
            last_attempt: "2025-06-02T10:00:00Z".into(),
            status: TrackingStatus::Retry,
            error_details: Some("HTTP 500".into()),
        };
        assert_eq!(failed_tracking_from_row(&failed_tracking_to_row(&rec)), rec);
    }

    #[test]
    fn stock_round_trip_preserves_optional_restock_fields() {
        let item = StockItem {
            id: "s-1".into(),
            product_name: "Oil".into(),
            empty_stock: 40,
            filled_stock: 12,
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-06-01T00:00:00Z".into(),
            last_restock_at: None,
            last_restock_qty: None,
        };
        let decoded = stock_from_row(&stock_to_row(&item));
        assert_eq!(decoded, item);
    }

    #[test]
    fn expense_decode_falls_back_to_other_type() {
        let row = vec![
            "e-1".to_string(),
            "Snacks".to_string(),
            "450".to_string(),
            "team lunch".to_string(),
            "2025-03-02".to_string(),
        ];
        let expense = expense_from_row(&row);
        assert_eq!(expense.expense_type, ExpenseType::Other);
        assert_eq!(expense.amount, 450.0);
    }
}
