//! Payment reconciliation: match the delivery partner's waybill CSV export
//! against the Orders sheet and mark matched orders as paid.
//!
//! The routine is a sequential loop: one linear scan plus at most one
//! single-cell write per CSV record, with a fixed pause between writes to
//! stay under the Sheets API rate limit. Nothing spans the loop: a failure
//! midway leaves earlier updates committed and is reported per record, never
//! rolled back.
//!
//! The scan and the write go through the [`OrderRows`] seam so the inherent
//! read-then-write race (row numbers shift when another client deletes a
//! row) stays visible at the type level, and so a future store with
//! conditional writes can slot in without touching the loop.

use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::codec::{COL_PAYMENT_RECEIVED, COL_TRACKING_ID};
use crate::csv_import::{self, CsvRecord, HEADER_WAYBILL_ID};
use crate::error::ServiceError;
use crate::ledger;
use crate::sheets::{Sheet, SheetsClient};

/// Pause between network-issuing iterations. A throttle, not a correctness
/// mechanism.
pub const RECONCILE_THROTTLE: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Updated,
    NotFound,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordDetail {
    pub waybill_id: String,
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub processed: usize,
    pub updated: usize,
    pub errors: Vec<String>,
    pub details: Vec<RecordDetail>,
    pub success: bool,
}

impl ReconcileReport {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "success": false }))
    }
}

// ---------------------------------------------------------------------------
// Row locator / writer seam
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedOrder {
    /// 1-based spreadsheet row number, valid only against the snapshot the
    /// locator scanned.
    pub row_number: usize,
    /// True when the PaymentReceived cell already reads exactly "Yes".
    pub payment_received: bool,
}

/// The two operations reconciliation needs from the order store.
#[allow(async_fn_in_trait)]
pub trait OrderRows {
    /// Locate the order whose tracking id (column A) equals `waybill_id`
    /// after trimming. First match wins; duplicate tracking ids are neither
    /// detected nor reported.
    fn find_row(&self, waybill_id: &str) -> Option<LocatedOrder>;

    /// Write "Yes" into the PaymentReceived cell of `row_number`.
    async fn mark_received(&mut self, row_number: usize) -> Result<(), ServiceError>;
}

/// First-match-wins scan over raw sheet rows (header at index 0 is skipped).
pub fn find_order_row(rows: &[Vec<String>], waybill_id: &str) -> Option<LocatedOrder> {
    let needle = waybill_id.trim();
    rows.iter().enumerate().skip(1).find_map(|(idx, row)| {
        let cell = row.get(COL_TRACKING_ID).map(|s| s.trim()).unwrap_or("");
        (cell == needle).then_some(LocatedOrder {
            row_number: idx + 1,
            payment_received: row.get(COL_PAYMENT_RECEIVED).map(String::as_str) == Some("Yes"),
        })
    })
}

/// Live implementation over a fresh Orders snapshot.
pub struct SheetOrderRows<'a> {
    client: &'a SheetsClient,
    rows: Vec<Vec<String>>,
}

impl<'a> SheetOrderRows<'a> {
    pub async fn load(client: &'a SheetsClient) -> Result<Self, ServiceError> {
        let rows = client.values(Sheet::Orders).await?;
        Ok(SheetOrderRows { client, rows })
    }
}

impl OrderRows for SheetOrderRows<'_> {
    fn find_row(&self, waybill_id: &str) -> Option<LocatedOrder> {
        find_order_row(&self.rows, waybill_id)
    }

    async fn mark_received(&mut self, row_number: usize) -> Result<(), ServiceError> {
        self.client
            .update_cell(Sheet::Orders, row_number, COL_PAYMENT_RECEIVED, "Yes")
            .await
    }
}

// ---------------------------------------------------------------------------
// Reconciliation loop
// ---------------------------------------------------------------------------

/// Run the reconciliation over parsed CSV records.
///
/// Per-record outcomes:
/// - no "Waybill ID" field → an `error` detail; the record is listed but
///   counts toward neither `processed` nor `errors`;
/// - no matching order row → `not_found`;
/// - PaymentReceived already "Yes" → reported as `updated` with message
///   "already received", and no write is issued (long-standing reporting
///   behavior, kept as-is);
/// - otherwise one single-cell write; HTTP failure becomes an `error` detail
///   and the loop continues.
pub async fn reconcile<S: OrderRows>(records: &[CsvRecord], store: &mut S) -> ReconcileReport {
    let mut processed = 0usize;
    let mut updated = 0usize;
    let mut errors: Vec<String> = Vec::new();
    let mut details: Vec<RecordDetail> = Vec::new();

    for record in records {
        let waybill_id = match record.get_non_empty(HEADER_WAYBILL_ID) {
            Some(id) => id.to_string(),
            None => {
                details.push(RecordDetail {
                    waybill_id: String::new(),
                    status: RecordStatus::Error,
                    message: Some("Record has no Waybill ID".to_string()),
                });
                continue;
            }
        };
        processed += 1;

        match store.find_row(&waybill_id) {
            None => {
                details.push(RecordDetail {
                    waybill_id,
                    status: RecordStatus::NotFound,
                    message: None,
                });
            }
            Some(located) if located.payment_received => {
                details.push(RecordDetail {
                    waybill_id,
                    status: RecordStatus::Updated,
                    message: Some("already received".to_string()),
                });
            }
            Some(located) => {
                match store.mark_received(located.row_number).await {
                    Ok(()) => {
                        updated += 1;
                        details.push(RecordDetail {
                            waybill_id,
                            status: RecordStatus::Updated,
                            message: None,
                        });
                    }
                    Err(err) => {
                        let message = err.to_string();
                        warn!(waybill_id = %waybill_id, error = %message, "payment update failed");
                        errors.push(format!("{waybill_id}: {message}"));
                        details.push(RecordDetail {
                            waybill_id,
                            status: RecordStatus::Error,
                            message: Some(message),
                        });
                    }
                }
                sleep(RECONCILE_THROTTLE).await;
            }
        }
    }

    // Lenient on purpose: one update is a success, and so is an empty run
    // that produced no errors.
    let success = updated > 0 || (processed == 0 && errors.is_empty());

    info!(processed, updated, errors = errors.len(), "reconciliation finished");
    ReconcileReport {
        processed,
        updated,
        errors,
        details,
        success,
    }
}

/// Details that should land in the failed-tracking ledger: records whose
/// order was missing, plus records whose update failed.
pub fn failed_candidates(report: &ReconcileReport) -> Vec<&RecordDetail> {
    report
        .details
        .iter()
        .filter(|d| {
            !d.waybill_id.is_empty()
                && matches!(d.status, RecordStatus::NotFound | RecordStatus::Error)
        })
        .collect()
}

/// Full CSV import path the panel calls: validate, parse, reconcile against
/// a fresh Orders snapshot, then record every failure in the ledger.
pub async fn import_csv(client: &SheetsClient, text: &str) -> Result<Value, String> {
    if !csv_import::validate_format(text) {
        return Err(
            "CSV header must contain the \"Waybill ID\" and \"Order ID\" columns".to_string(),
        );
    }
    let records = csv_import::parse(text).map_err(|e| e.to_string())?;

    let mut store = SheetOrderRows::load(client).await.map_err(|e| e.to_string())?;
    let report = reconcile(&records, &mut store).await;

    let mut ledgered = 0usize;
    for detail in failed_candidates(&report) {
        let reason = match detail.status {
            RecordStatus::NotFound => "Order not found".to_string(),
            _ => "Payment update failed".to_string(),
        };
        let outcome =
            ledger::add(client, &detail.waybill_id, &reason, detail.message.as_deref()).await;
        if outcome.get("success").and_then(Value::as_bool) == Some(true) {
            ledgered += 1;
        } else {
            // The import result already carries the per-record failure; a
            // ledger write error only gets logged.
            warn!(waybill_id = %detail.waybill_id, "failed to record ledger entry");
        }
    }

    let mut result = report.to_json();
    if let Some(obj) = result.as_object_mut() {
        obj.insert("ledgered".to_string(), json!(ledgered));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MockRows {
        orders: HashMap<String, LocatedOrder>,
        fail_writes: bool,
        writes: Vec<usize>,
    }

    impl MockRows {
        fn new(orders: &[(&str, usize, bool)]) -> Self {
            MockRows {
                orders: orders
                    .iter()
                    .map(|(id, row_number, paid)| {
                        (
                            id.to_string(),
                            LocatedOrder {
                                row_number: *row_number,
                                payment_received: *paid,
                            },
                        )
                    })
                    .collect(),
                fail_writes: false,
                writes: Vec::new(),
            }
        }
    }

    impl OrderRows for MockRows {
        fn find_row(&self, waybill_id: &str) -> Option<LocatedOrder> {
            self.orders.get(waybill_id.trim()).copied()
        }

        async fn mark_received(&mut self, row_number: usize) -> Result<(), ServiceError> {
            if self.fail_writes {
                return Err(ServiceError::Network {
                    status: 500,
                    message: "Google Sheets server error (HTTP 500)".to_string(),
                });
            }
            self.writes.push(row_number);
            Ok(())
        }
    }

    fn record(waybill_id: &str) -> CsvRecord {
        CsvRecord::from_pairs(&[("Waybill ID", waybill_id), ("Order ID", "ignored")])
    }

    #[tokio::test]
    async fn empty_input_is_a_trivial_success() {
        let mut store = MockRows::new(&[]);
        let report = reconcile(&[], &mut store).await;
        assert_eq!(report.processed, 0);
        assert_eq!(report.updated, 0);
        assert!(report.errors.is_empty());
        assert!(report.success);
    }

    #[tokio::test]
    async fn unmatched_waybill_reports_not_found() {
        let mut store = MockRows::new(&[]);
        let report = reconcile(&[record("LK1")], &mut store).await;
        assert_eq!(report.updated, 0);
        assert_eq!(report.details.len(), 1);
        assert_eq!(report.details[0].status, RecordStatus::NotFound);
        assert_eq!(report.details[0].waybill_id, "LK1");
        assert!(store.writes.is_empty());
    }

    #[tokio::test]
    async fn already_received_reports_updated_without_writing() {
        // Long-standing reporting quirk: no write is issued, but the record
        // is still reported as "updated" with an explanatory message.
        let mut store = MockRows::new(&[("LK1", 2, true)]);
        let report = reconcile(&[record("LK1")], &mut store).await;
        assert_eq!(report.updated, 0);
        assert_eq!(report.details[0].status, RecordStatus::Updated);
        assert_eq!(report.details[0].message.as_deref(), Some("already received"));
        assert!(store.writes.is_empty());
    }

    #[tokio::test]
    async fn missing_waybill_id_is_listed_but_not_processed() {
        let mut store = MockRows::new(&[]);
        let records = [CsvRecord::from_pairs(&[("Order ID", "LK9")])];
        let report = reconcile(&records, &mut store).await;
        assert_eq!(report.processed, 0);
        assert_eq!(report.details.len(), 1);
        assert_eq!(report.details[0].status, RecordStatus::Error);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn mixed_batch_matches_and_reports_per_record() {
        // LK100 exists and is unpaid; LK200 does not exist.
        let mut store = MockRows::new(&[("LK100", 2, false)]);
        let report = reconcile(&[record("LK100"), record("LK200")], &mut store).await;

        assert_eq!(report.processed, 2);
        assert_eq!(report.updated, 1);
        assert!(report.success);
        assert_eq!(report.details[0].waybill_id, "LK100");
        assert_eq!(report.details[0].status, RecordStatus::Updated);
        assert_eq!(report.details[1].waybill_id, "LK200");
        assert_eq!(report.details[1].status, RecordStatus::NotFound);
        assert_eq!(store.writes, vec![2]);

        // LK200 is exactly the record the ledger should pick up.
        let candidates = failed_candidates(&report);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].waybill_id, "LK200");
    }

    #[tokio::test]
    async fn write_failure_is_reported_and_the_loop_continues() {
        let mut store = MockRows::new(&[("LK1", 2, false), ("LK2", 3, false)]);
        store.fail_writes = true;
        let report = reconcile(&[record("LK1"), record("LK2")], &mut store).await;

        assert_eq!(report.processed, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(report.errors.len(), 2);
        assert!(!report.success);
        assert!(report
            .details
            .iter()
            .all(|d| d.status == RecordStatus::Error));
    }

    #[test]
    fn scan_skips_header_and_takes_the_first_match() {
        let rows = vec![
            vec!["TrackingID".to_string(), "CustomerInfo".to_string()],
            row_with("LK7", "No"),
            row_with("LK7", "Yes"), // duplicate: never reached
        ];
        let located = find_order_row(&rows, " LK7 ").expect("match");
        assert_eq!(located.row_number, 2);
        assert!(!located.payment_received);
        assert!(find_order_row(&rows, "LK404").is_none());
    }

    fn row_with(tracking: &str, paid: &str) -> Vec<String> {
        let mut row = vec![String::new(); 18];
        row[0] = tracking.to_string();
        row[8] = paid.to_string();
        row
    }
}
