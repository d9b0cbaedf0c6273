//! Client for the FDE delivery partner's waybill API.
//!
//! One form-encoded POST endpoint serves both the recipient-city lookup and
//! the dispatch-status check. City lookups sit behind a local 10-minute
//! cache (the partner rate-limits aggressively and the panel re-renders
//! often), with a fixed pause before every uncached call.

use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::db::DbState;
use crate::error::ServiceError;

/// Timeout for delivery-partner requests (15 seconds; their API is slow but
/// not THAT slow).
const FDE_TIMEOUT: Duration = Duration::from_secs(15);

/// City-lookup cache TTL.
const CITY_CACHE_TTL_MINUTES: i64 = 10;

/// Pause before each uncached lookup, to stay under the partner's limit.
const LOOKUP_THROTTLE: Duration = Duration::from_millis(400);

pub struct WaybillClient {
    http: Client,
    endpoint: String,
    client_id: String,
    api_key: String,
}

impl WaybillClient {
    pub fn new(
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, String> {
        let http = Client::builder()
            .timeout(FDE_TIMEOUT)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;
        Ok(WaybillClient {
            http,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            api_key: api_key.into(),
        })
    }

    /// Build a client from the credential store, or `None` when the FDE
    /// credentials were never configured.
    pub fn from_credentials(endpoint: impl Into<String>) -> Option<Result<Self, String>> {
        let (client_id, api_key) = crate::session::fde_credentials()?;
        Some(Self::new(endpoint, client_id, api_key))
    }

    async fn call(&self, waybill_id: &str) -> Result<Value, ServiceError> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("api_key", self.api_key.as_str()),
            ("waybill_id", waybill_id),
        ];
        let resp = self
            .http
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::from_transport(&self.endpoint, &e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::from_status(status));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| ServiceError::Transport(format!("Invalid JSON from delivery API: {e}")))?;
        Ok(body)
    }

    /// Recipient-city lookup with the local TTL cache in front.
    pub async fn lookup_city(&self, db: &DbState, waybill_id: &str) -> Result<Value, String> {
        let waybill_id = waybill_id.trim();
        if waybill_id.is_empty() {
            return Err("Missing waybill id".to_string());
        }

        if let Ok(conn) = db.conn.lock() {
            if let Some(cached) = crate::db::cache_get(&conn, waybill_id, CITY_CACHE_TTL_MINUTES) {
                debug!(waybill_id, "city lookup served from cache");
                return Ok(cached);
            }
        }

        tokio::time::sleep(LOOKUP_THROTTLE).await;
        let body = self.call(waybill_id).await.map_err(|e| e.to_string())?;
        let result = parse_lookup_response(&body);

        if let Ok(conn) = db.conn.lock() {
            if let Err(e) = crate::db::cache_put(&conn, waybill_id, &result) {
                warn!(waybill_id, error = %e, "failed to cache city lookup");
            }
        }
        Ok(result)
    }

    /// Dispatch status for a waybill, uncached (the operator explicitly asks
    /// for the current state).
    pub async fn dispatch_status(&self, waybill_id: &str) -> Result<Value, String> {
        let body = self.call(waybill_id.trim()).await.map_err(|e| e.to_string())?;
        Ok(parse_lookup_response(&body))
    }
}

/// Normalize the partner's response: a numeric `status` plus optional
/// recipient fields under shifting key names.
fn parse_lookup_response(body: &Value) -> Value {
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    json!({
        "status": body.get("status").and_then(Value::as_i64).unwrap_or(0),
        "city": field(&["recipient_city", "city"]),
        "name": field(&["recipient_name", "name"]),
        "address": field(&["recipient_address", "address"]),
        "deliveryStatus": field(&["delivery_status", "waybill_status"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_response_normalizes_key_variants() {
        let body = json!({
            "status": 1,
            "recipient_city": " Negombo ",
            "name": "N. Perera",
            "delivery_status": "Dispatched",
        });
        let parsed = parse_lookup_response(&body);
        assert_eq!(parsed["status"], 1);
        assert_eq!(parsed["city"], "Negombo");
        assert_eq!(parsed["name"], "N. Perera");
        assert_eq!(parsed["deliveryStatus"], "Dispatched");
        assert_eq!(parsed["address"], Value::Null);
    }

    #[test]
    fn missing_status_defaults_to_zero() {
        let parsed = parse_lookup_response(&json!({}));
        assert_eq!(parsed["status"], 0);
    }
}
