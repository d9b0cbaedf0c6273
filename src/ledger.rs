//! Failed-tracking ledger: the FailTrackings sheet.
//!
//! Every reconciliation failure lands here with an attempt counter and a
//! Failed / Retry / Resolved status, so the operator can re-run single
//! waybills after fixing the underlying order row. Adding an already-open
//! tracking id bumps the existing row instead of appending a duplicate.
//! This is the only de-duplication anywhere in the system, keyed by
//! (tracking_id, status != Resolved).
//!
//! Every operation catches internally and returns a `{success, error?}`
//! envelope; a ledger failure must never take the page down.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::codec::{failed_tracking_from_row, failed_tracking_to_row, COL_PAYMENT_RECEIVED};
use crate::models::{FailedTracking, TrackingStatus};
use crate::reconcile::find_order_row;
use crate::sheets::{Sheet, SheetsClient};

/// Header row written when the FailTrackings tab is created on first use.
const LEDGER_HEADER: &[&str] = &[
    "ID",
    "TrackingID",
    "Reason",
    "AttemptCount",
    "FirstFailed",
    "LastAttempt",
    "Status",
    "ErrorDetails",
];

fn header_row() -> Vec<String> {
    LEDGER_HEADER.iter().map(|s| s.to_string()).collect()
}

fn err_value(error: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

pub async fn list(client: &SheetsClient) -> Result<Vec<FailedTracking>, String> {
    let rows = client
        .list(Sheet::FailTrackings)
        .await
        .map_err(|e| e.to_string())?;
    Ok(rows.iter().map(|row| failed_tracking_from_row(row)).collect())
}

// ---------------------------------------------------------------------------
// Add (with dedup)
// ---------------------------------------------------------------------------

/// What an `add` should do against the current ledger snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum AddPlan {
    /// Bump the open record at data index `index` (0-based within the
    /// decoded snapshot) in place.
    BumpExisting { index: usize, record: FailedTracking },
    /// No open record for this tracking id: append a fresh row.
    AppendNew(FailedTracking),
}

/// Pure dedup decision: an open (non-Resolved) record for the same tracking
/// id is incremented instead of duplicated. Resolved records do not block a
/// new row.
pub fn plan_add(
    existing: &[FailedTracking],
    tracking_id: &str,
    reason: &str,
    error_details: Option<&str>,
    now: &str,
) -> AddPlan {
    let tracking_id = tracking_id.trim();

    if let Some((index, open)) = existing
        .iter()
        .enumerate()
        .find(|(_, rec)| rec.tracking_id == tracking_id && rec.is_open())
    {
        let mut record = open.clone();
        record.attempt_count += 1;
        record.last_attempt = now.to_string();
        record.reason = reason.to_string();
        record.error_details = error_details.map(|s| s.to_string()).or(record.error_details);
        return AddPlan::BumpExisting { index, record };
    }

    AddPlan::AppendNew(FailedTracking {
        id: Uuid::new_v4().to_string(),
        tracking_id: tracking_id.to_string(),
        reason: reason.to_string(),
        attempt_count: 1,
        first_failed: now.to_string(),
        last_attempt: now.to_string(),
        status: TrackingStatus::Failed,
        error_details: error_details.map(|s| s.to_string()),
    })
}

/// Record a reconciliation failure, de-duplicating against open records.
pub async fn add(
    client: &SheetsClient,
    tracking_id: &str,
    reason: &str,
    error_details: Option<&str>,
) -> Value {
    if tracking_id.trim().is_empty() {
        return err_value("Missing trackingId");
    }

    if let Err(e) = client.ensure_sheet(Sheet::FailTrackings, &header_row()).await {
        return err_value(e);
    }
    let existing = match list(client).await {
        Ok(records) => records,
        Err(e) => return err_value(e),
    };

    let now = crate::now_iso();
    match plan_add(&existing, tracking_id, reason, error_details, &now) {
        AddPlan::BumpExisting { index, record } => {
            let row_number = index + 2; // header occupies row 1
            match client
                .update_row(
                    Sheet::FailTrackings,
                    row_number,
                    Sheet::FailTrackings.last_column(),
                    &failed_tracking_to_row(&record),
                )
                .await
            {
                Ok(()) => {
                    info!(
                        tracking_id = %record.tracking_id,
                        attempt_count = record.attempt_count,
                        "ledger: bumped open record"
                    );
                    json!({
                        "success": true,
                        "deduplicated": true,
                        "attemptCount": record.attempt_count,
                    })
                }
                Err(e) => err_value(e),
            }
        }
        AddPlan::AppendNew(record) => {
            match client
                .append(Sheet::FailTrackings, &failed_tracking_to_row(&record))
                .await
            {
                Ok(()) => {
                    info!(tracking_id = %record.tracking_id, "ledger: recorded new failure");
                    json!({
                        "success": true,
                        "deduplicated": false,
                        "attemptCount": 1,
                        "id": record.id,
                    })
                }
                Err(e) => err_value(e),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Update / delete
// ---------------------------------------------------------------------------

fn find_by_id(records: &[FailedTracking], id: &str) -> Option<usize> {
    records.iter().position(|rec| rec.id == id.trim())
}

/// Patch a ledger row by id. Recognized fields: `reason`, `status`,
/// `errorDetails`, `attemptCount`.
pub async fn update(client: &SheetsClient, id: &str, fields: &Value) -> Value {
    let records = match list(client).await {
        Ok(records) => records,
        Err(e) => return err_value(e),
    };
    let Some(index) = find_by_id(&records, id) else {
        return err_value(format!("Failed tracking record '{id}' not found"));
    };

    let mut record = records[index].clone();
    if let Some(reason) = fields.get("reason").and_then(Value::as_str) {
        record.reason = reason.trim().to_string();
    }
    if let Some(status) = fields.get("status").and_then(Value::as_str) {
        record.status = TrackingStatus::parse(status);
    }
    if let Some(details) = fields.get("errorDetails").and_then(Value::as_str) {
        record.error_details = Some(details.to_string());
    }
    if let Some(count) = fields.get("attemptCount").and_then(Value::as_u64) {
        record.attempt_count = count as u32;
    }
    record.last_attempt = crate::now_iso();

    match client
        .update_row(
            Sheet::FailTrackings,
            index + 2,
            Sheet::FailTrackings.last_column(),
            &failed_tracking_to_row(&record),
        )
        .await
    {
        Ok(()) => json!({ "success": true }),
        Err(e) => err_value(e),
    }
}

/// Remove a ledger row entirely. No state check: Resolved and open records
/// delete the same way.
pub async fn delete(client: &SheetsClient, id: &str) -> Value {
    let records = match list(client).await {
        Ok(records) => records,
        Err(e) => return err_value(e),
    };
    let Some(index) = find_by_id(&records, id) else {
        return err_value(format!("Failed tracking record '{id}' not found"));
    };

    // Data index -> 0-based sheet row index (header is row index 0).
    match client.delete_row(Sheet::FailTrackings, index + 1).await {
        Ok(()) => json!({ "success": true }),
        Err(e) => err_value(e),
    }
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Re-run the reconciliation lookup for one tracking id against a fresh
/// Orders snapshot, then write the outcome back to the ledger row:
/// Resolved on success (or when the payment already reads "Yes"), Retry on
/// a transient write failure, Failed when the order still does not exist.
pub async fn retry(client: &SheetsClient, tracking_id: &str) -> Value {
    let records = match list(client).await {
        Ok(records) => records,
        Err(e) => return err_value(e),
    };
    let Some(index) = records
        .iter()
        .position(|rec| rec.tracking_id == tracking_id.trim())
    else {
        return err_value(format!("No ledger record for tracking id '{tracking_id}'"));
    };

    let order_rows = match client.values(Sheet::Orders).await {
        Ok(rows) => rows,
        Err(e) => return err_value(e),
    };

    let (status, detail) = match find_order_row(&order_rows, tracking_id) {
        None => (TrackingStatus::Failed, Some("Order still not found".to_string())),
        Some(located) if located.payment_received => (TrackingStatus::Resolved, None),
        Some(located) => {
            match client
                .update_cell(Sheet::Orders, located.row_number, COL_PAYMENT_RECEIVED, "Yes")
                .await
            {
                Ok(()) => (TrackingStatus::Resolved, None),
                Err(e) => {
                    warn!(tracking_id, error = %e, "retry: payment write failed");
                    (TrackingStatus::Retry, Some(e.to_string()))
                }
            }
        }
    };

    let mut record = records[index].clone();
    record.attempt_count += 1;
    record.last_attempt = crate::now_iso();
    record.status = status;
    if detail.is_some() {
        record.error_details = detail.clone();
    }

    match client
        .update_row(
            Sheet::FailTrackings,
            index + 2,
            Sheet::FailTrackings.last_column(),
            &failed_tracking_to_row(&record),
        )
        .await
    {
        Ok(()) => {
            info!(
                tracking_id,
                status = status.as_str(),
                attempt_count = record.attempt_count,
                "ledger: retry recorded"
            );
            json!({
                "success": true,
                "status": status.as_str(),
                "attemptCount": record.attempt_count,
            })
        }
        Err(e) => err_value(e),
    }
}

// ---------------------------------------------------------------------------
// Background refresh
// ---------------------------------------------------------------------------

/// Advisory 30-second re-fetch of the ledger for the failed-tracking view.
/// Not a consistency mechanism; a fetch failure logs and waits for the next
/// tick.
pub fn start_refresh_loop<F>(
    client: Arc<SheetsClient>,
    interval_secs: u64,
    on_snapshot: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(Vec<FailedTracking>) + Send + Sync + 'static,
{
    info!(interval_secs, "starting ledger refresh loop");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match list(&client).await {
                Ok(snapshot) => on_snapshot(snapshot),
                Err(e) => warn!(error = %e, "ledger refresh failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_record(tracking_id: &str, status: TrackingStatus, attempts: u32) -> FailedTracking {
        FailedTracking {
            id: format!("id-{tracking_id}"),
            tracking_id: tracking_id.to_string(),
            reason: "Order not found".to_string(),
            attempt_count: attempts,
            first_failed: "2025-06-01T00:00:00Z".to_string(),
            last_attempt: "2025-06-01T00:00:00Z".to_string(),
            status,
            error_details: None,
        }
    }

    #[test]
    fn second_add_for_open_tracking_id_bumps_in_place() {
        // First add: nothing exists yet.
        let plan = plan_add(&[], "LK200", "Order not found", None, "2025-06-02T00:00:00Z");
        let first = match plan {
            AddPlan::AppendNew(record) => record,
            other => panic!("expected append, got {other:?}"),
        };
        assert_eq!(first.attempt_count, 1);
        assert_eq!(first.status, TrackingStatus::Failed);
        assert_eq!(first.first_failed, "2025-06-02T00:00:00Z");

        // Second add while the record is still open: one row, count bumped.
        let plan = plan_add(
            std::slice::from_ref(&first),
            "LK200",
            "Order not found",
            Some("still missing"),
            "2025-06-03T00:00:00Z",
        );
        match plan {
            AddPlan::BumpExisting { index, record } => {
                assert_eq!(index, 0);
                assert_eq!(record.attempt_count, 2);
                assert_eq!(record.last_attempt, "2025-06-03T00:00:00Z");
                // First-failed timestamp is never rewritten.
                assert_eq!(record.first_failed, "2025-06-02T00:00:00Z");
                assert_eq!(record.error_details.as_deref(), Some("still missing"));
            }
            other => panic!("expected bump, got {other:?}"),
        }
    }

    #[test]
    fn retry_status_records_still_dedupe() {
        let existing = [open_record("LK7", TrackingStatus::Retry, 4)];
        let plan = plan_add(&existing, "LK7", "Order not found", None, "2025-06-05T00:00:00Z");
        assert!(matches!(
            plan,
            AddPlan::BumpExisting { index: 0, ref record } if record.attempt_count == 5
        ));
    }

    #[test]
    fn resolved_records_do_not_block_a_new_row() {
        let existing = [open_record("LK7", TrackingStatus::Resolved, 3)];
        let plan = plan_add(&existing, "LK7", "Order not found", None, "2025-06-05T00:00:00Z");
        match plan {
            AddPlan::AppendNew(record) => {
                assert_eq!(record.attempt_count, 1);
                assert_eq!(record.status, TrackingStatus::Failed);
            }
            other => panic!("expected append, got {other:?}"),
        }
    }

    #[test]
    fn dedup_matches_only_the_same_tracking_id() {
        let existing = [open_record("LK1", TrackingStatus::Failed, 1)];
        let plan = plan_add(&existing, "LK2", "Order not found", None, "2025-06-05T00:00:00Z");
        assert!(matches!(plan, AddPlan::AppendNew(_)));
    }
}
