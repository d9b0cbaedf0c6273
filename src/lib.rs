//! sheetops - order management and sales analytics over a Google Sheet.
//!
//! Headless core for a small seller's admin panel. The spreadsheet is the
//! database: every entity lives on its own sheet tab, read and written
//! through the Sheets REST values API. On top of that sit CSV payment
//! reconciliation, a failed-tracking ledger with retries, two-stage stock,
//! expenses, and client-side sales analytics.
//!
//! Callers build a [`sheets::SheetsClient`] from a [`session::Session`] and
//! hand it to the entity modules. Local state (connection settings, the
//! city-lookup cache) lives in a small SQLite store under [`db`].

use chrono::{SecondsFormat, Utc};

pub mod analytics;
pub mod branches;
pub mod codec;
pub mod csv_import;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod expenses;
pub mod ledger;
pub mod models;
pub mod orders;
pub mod products;
pub mod reconcile;
pub mod session;
pub mod sheets;
pub mod stock;
pub mod waybill;

pub use error::ServiceError;
pub use models::{
    BranchContact, Expense, ExpenseType, FailedTracking, Order, OrderItem, OrderStatus,
    PaymentMethod, Product, StockItem, TrackingStatus,
};
pub use session::Session;
pub use sheets::{Sheet, SheetsClient};

/// Timestamp used for every `LastUpdated` style cell (RFC 3339, UTC, seconds).
pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_iso_is_rfc3339_utc() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
