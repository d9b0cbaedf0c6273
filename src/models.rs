//! Domain records stored in the spreadsheet.
//!
//! Every entity here is materialized from a full sheet read and written back
//! positionally (see `codec`). Enum variants round-trip through the exact
//! cell literals the sheets have always used, so parsing is lenient and
//! never fails: unknown cells fall back to a default variant.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Preparing,
    Shipped,
    Packed,
    Dispatched,
    Delivered,
    Reschedule,
    Return,
    Transfer,
    Damaged,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Preparing => "Preparing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Packed => "Packed",
            OrderStatus::Dispatched => "Dispatched",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Reschedule => "Reschedule",
            OrderStatus::Return => "Return",
            OrderStatus::Transfer => "Transfer",
            OrderStatus::Damaged => "Damaged",
        }
    }

    /// Lenient parse: unknown literals fall back to `Preparing`.
    pub fn parse(cell: &str) -> Self {
        match cell.trim() {
            "Shipped" => OrderStatus::Shipped,
            "Packed" => OrderStatus::Packed,
            "Dispatched" => OrderStatus::Dispatched,
            "Delivered" => OrderStatus::Delivered,
            "Reschedule" => OrderStatus::Reschedule,
            "Return" => OrderStatus::Return,
            "Transfer" => OrderStatus::Transfer,
            "Damaged" => OrderStatus::Damaged,
            _ => OrderStatus::Preparing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cod,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "COD",
            PaymentMethod::BankTransfer => "Bank Transfer",
        }
    }

    /// Lenient parse: anything that is not "Bank Transfer" is COD.
    pub fn parse(cell: &str) -> Self {
        if cell.trim() == "Bank Transfer" {
            PaymentMethod::BankTransfer
        } else {
            PaymentMethod::Cod
        }
    }
}

/// One order line: product referenced by name (no id, no foreign key).
/// The unit price is captured at order time and is not stored in the sheet
/// row, so it does not survive a decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product: String,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Primary key of the sheet row; auto-generated as `LK<timestamp>` when
    /// absent at creation time.
    pub tracking_id: String,
    pub name: String,
    pub address_line1: String,
    pub address_line2: String,
    pub address_line3: String,
    /// May hold multiple phone numbers separated by whitespace or commas.
    pub contact: String,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_received: bool,
    pub free_shipping: bool,
    /// Date or date-time string, stored verbatim.
    pub order_date: String,
    pub last_updated: String,
    pub main_city: Option<String>,
    /// Delivery-partner waybill number. Written exclusively by
    /// `orders::set_fde_waybill`, never by the generic update path.
    pub fde_waybill: Option<String>,
}

impl Default for Order {
    fn default() -> Self {
        Order {
            tracking_id: String::new(),
            name: String::new(),
            address_line1: String::new(),
            address_line2: String::new(),
            address_line3: String::new(),
            contact: String::new(),
            items: Vec::new(),
            total_amount: 0.0,
            status: OrderStatus::Preparing,
            payment_method: PaymentMethod::Cod,
            payment_received: false,
            free_shipping: false,
            order_date: String::new(),
            last_updated: String::new(),
            main_city: None,
            fde_waybill: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Products & stock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub cost: f64,
    pub price: f64,
    pub updated_at: String,
}

/// Two-stage inventory: `empty_stock` raw bottles, `filled_stock` sellable
/// units. A fill moves units from empty to filled; order mutations touch
/// `filled_stock` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: String,
    pub product_name: String,
    pub empty_stock: i64,
    pub filled_stock: i64,
    pub created_at: String,
    pub updated_at: String,
    pub last_restock_at: Option<String>,
    pub last_restock_qty: Option<i64>,
}

// ---------------------------------------------------------------------------
// Expenses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpenseType {
    Packaging,
    Delivery,
    RawMaterial,
    Marketing,
    Salaries,
    Utilities,
    Other,
}

impl ExpenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseType::Packaging => "Packaging",
            ExpenseType::Delivery => "Delivery",
            ExpenseType::RawMaterial => "Raw Material",
            ExpenseType::Marketing => "Marketing",
            ExpenseType::Salaries => "Salaries",
            ExpenseType::Utilities => "Utilities",
            ExpenseType::Other => "Other",
        }
    }

    pub fn parse(cell: &str) -> Self {
        match cell.trim() {
            "Packaging" => ExpenseType::Packaging,
            "Delivery" => ExpenseType::Delivery,
            "Raw Material" => ExpenseType::RawMaterial,
            "Marketing" => ExpenseType::Marketing,
            "Salaries" => ExpenseType::Salaries,
            "Utilities" => ExpenseType::Utilities,
            _ => ExpenseType::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub expense_type: ExpenseType,
    pub amount: f64,
    pub note: String,
    /// `YYYY-MM-DD`.
    pub date: String,
}

// ---------------------------------------------------------------------------
// Failed-tracking ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingStatus {
    Failed,
    Retry,
    Resolved,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::Failed => "Failed",
            TrackingStatus::Retry => "Retry",
            TrackingStatus::Resolved => "Resolved",
        }
    }

    pub fn parse(cell: &str) -> Self {
        match cell.trim() {
            "Retry" => TrackingStatus::Retry,
            "Resolved" => TrackingStatus::Resolved,
            _ => TrackingStatus::Failed,
        }
    }
}

/// Reconciliation failure record. De-duplicated by (tracking_id, status not
/// Resolved): re-adding an open tracking id bumps `attempt_count` in place
/// instead of appending a second row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTracking {
    pub id: String,
    pub tracking_id: String,
    pub reason: String,
    pub attempt_count: u32,
    pub first_failed: String,
    pub last_attempt: String,
    pub status: TrackingStatus,
    pub error_details: Option<String>,
}

impl FailedTracking {
    /// Open means the record still needs operator attention.
    pub fn is_open(&self) -> bool {
        self.status != TrackingStatus::Resolved
    }
}

// ---------------------------------------------------------------------------
// Branch contacts (read-only lookup table)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchContact {
    pub id: String,
    pub branch: String,
    pub phone1: String,
    pub phone2: String,
    pub phone3: String,
    pub note: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_round_trips_sheet_literals() {
        for status in [
            OrderStatus::Preparing,
            OrderStatus::Shipped,
            OrderStatus::Packed,
            OrderStatus::Dispatched,
            OrderStatus::Delivered,
            OrderStatus::Reschedule,
            OrderStatus::Return,
            OrderStatus::Transfer,
            OrderStatus::Damaged,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn unknown_status_defaults_to_preparing() {
        assert_eq!(OrderStatus::parse("In Flight"), OrderStatus::Preparing);
        assert_eq!(OrderStatus::parse(""), OrderStatus::Preparing);
    }

    #[test]
    fn payment_method_literal_is_exact() {
        assert_eq!(PaymentMethod::parse("Bank Transfer"), PaymentMethod::BankTransfer);
        // "bank transfer" is not the sheet literal, so it reads as COD
        assert_eq!(PaymentMethod::parse("bank transfer"), PaymentMethod::Cod);
        assert_eq!(PaymentMethod::parse("COD"), PaymentMethod::Cod);
    }

    #[test]
    fn resolved_records_are_not_open() {
        let mut rec = FailedTracking {
            id: "f1".into(),
            tracking_id: "LK1".into(),
            reason: "not found".into(),
            attempt_count: 1,
            first_failed: "2025-01-01T00:00:00Z".into(),
            last_attempt: "2025-01-01T00:00:00Z".into(),
            status: TrackingStatus::Failed,
            error_details: None,
        };
        assert!(rec.is_open());
        rec.status = TrackingStatus::Retry;
        assert!(rec.is_open());
        rec.status = TrackingStatus::Resolved;
        assert!(!rec.is_open());
    }
}
