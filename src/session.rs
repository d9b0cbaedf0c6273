//! Operator session and credential storage.
//!
//! The Google sign-in flow lives outside this crate; what arrives here is a
//! bearer token plus the spreadsheet id, either pasted as a connection
//! string from the web console or already present in the OS credential
//! store (DPAPI on Windows, Keychain on macOS, Secret Service on Linux).
//! Every client takes an explicit [`Session`]; there is no global mutable
//! token, and a missing token on a write path is a typed precondition
//! failure, not a runtime string check.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use keyring::Entry;
use serde_json::Value;
use tracing::{info, warn};

use crate::db::DbState;
use crate::error::ServiceError;

const SERVICE_NAME: &str = "sheetops";

// Credential keys
const KEY_SPREADSHEET_ID: &str = "spreadsheet_id";
const KEY_BEARER_TOKEN: &str = "bearer_token";
const KEY_API_KEY: &str = "sheets_api_key";
const KEY_FDE_CLIENT_ID: &str = "fde_client_id";
const KEY_FDE_API_KEY: &str = "fde_api_key";

/// All credential keys managed by this module.
const ALL_KEYS: &[&str] = &[
    KEY_SPREADSHEET_ID,
    KEY_BEARER_TOKEN,
    KEY_API_KEY,
    KEY_FDE_CLIENT_ID,
    KEY_FDE_API_KEY,
];

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Connection context passed to every client constructor.
#[derive(Debug, Clone)]
pub struct Session {
    pub spreadsheet_id: String,
    /// Google OAuth bearer token. Required for every write; reads fall back
    /// to `api_key` when absent.
    pub bearer_token: Option<String>,
    /// API key for unauthenticated read-only access (`?key=` query param).
    pub api_key: Option<String>,
}

impl Session {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        bearer_token: Option<String>,
        api_key: Option<String>,
    ) -> Self {
        Session {
            spreadsheet_id: spreadsheet_id.into(),
            bearer_token: bearer_token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            api_key: api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()),
        }
    }

    /// Typed precondition for write paths.
    pub fn require_token(&self) -> Result<&str, ServiceError> {
        self.bearer_token.as_deref().ok_or(ServiceError::Auth)
    }

    /// True when at least one form of read access is available.
    pub fn can_read(&self) -> bool {
        self.bearer_token.is_some() || self.api_key.is_some()
    }
}

// ---------------------------------------------------------------------------
// Connection string decoding
// ---------------------------------------------------------------------------

/// The web console hands the operator either a raw JSON blob or the same
/// blob base64url-encoded. Accept both.
fn decode_connection_string_payload(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str::<Value>(trimmed).ok();
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.starts_with('{') {
        return serde_json::from_str::<Value>(&compact).ok();
    }
    if compact.len() < 20 {
        return None;
    }

    let base64 = compact.replace('-', "+").replace('_', "/");
    let padded = format!(
        "{}{}",
        base64,
        "=".repeat((4usize.wrapping_sub(base64.len() % 4)) % 4)
    );
    let decoded = BASE64_STANDARD.decode(padded).ok()?;
    serde_json::from_slice::<Value>(&decoded).ok()
}

fn extract_field(raw: &str, keys: &[&str]) -> Option<String> {
    decode_connection_string_payload(raw).and_then(|v| {
        keys.iter()
            .find_map(|key| v.get(*key).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

pub fn extract_token_from_connection_string(raw: &str) -> Option<String> {
    extract_field(raw, &["token", "accessToken", "access_token"])
}

pub fn extract_spreadsheet_id_from_connection_string(raw: &str) -> Option<String> {
    extract_field(raw, &["sheet", "spreadsheetId", "spreadsheet_id"])
}

pub fn extract_api_key_from_connection_string(raw: &str) -> Option<String> {
    extract_field(raw, &["key", "apiKey", "api_key"])
}

// ---------------------------------------------------------------------------
// Keyring-backed credential store
// ---------------------------------------------------------------------------

/// Retrieve a single credential from the OS keyring. Returns `None` when the
/// entry does not exist (or the platform returns a "not found" error).
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

/// Store a credential in the OS keyring.
pub fn set_credential(key: &str, value: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    entry.set_password(value).map_err(|e| e.to_string())?;
    Ok(())
}

/// Delete a credential from the OS keyring. Silently succeeds if the entry
/// does not exist.
pub fn delete_credential(key: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

pub fn has_credential(key: &str) -> bool {
    get_credential(key).is_some()
}

/// The panel is considered connected when a spreadsheet id and some form of
/// read access are present.
pub fn is_configured() -> bool {
    has_credential(KEY_SPREADSHEET_ID)
        && (has_credential(KEY_BEARER_TOKEN) || has_credential(KEY_API_KEY))
}

/// Delete every stored credential (disconnect / factory reset).
pub fn factory_reset() -> Result<Value, String> {
    info!("performing factory reset, deleting all credentials");
    for key in ALL_KEYS {
        delete_credential(key)?;
    }
    Ok(serde_json::json!({ "success": true }))
}

// ---------------------------------------------------------------------------
// High-level API
// ---------------------------------------------------------------------------

/// Store the connection config pasted by the operator. Accepts a connection
/// string (JSON or base64url JSON) or an explicit `{spreadsheetId, token,
/// apiKey?}` payload.
pub fn update_connection(payload: &Value) -> Result<Value, String> {
    let raw = payload
        .get("connectionString")
        .or_else(|| payload.get("connection_string"))
        .and_then(Value::as_str);

    let (spreadsheet_id, token, api_key) = if let Some(raw) = raw {
        (
            extract_spreadsheet_id_from_connection_string(raw),
            extract_token_from_connection_string(raw),
            extract_api_key_from_connection_string(raw),
        )
    } else {
        let field = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| payload.get(*key).and_then(Value::as_str))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        (
            field(&["spreadsheetId", "spreadsheet_id"]),
            field(&["token", "accessToken", "access_token"]),
            field(&["apiKey", "api_key", "key"]),
        )
    };

    let spreadsheet_id = spreadsheet_id.ok_or("Missing required field: spreadsheetId")?;
    set_credential(KEY_SPREADSHEET_ID, &spreadsheet_id)?;
    if let Some(token) = token.as_deref() {
        set_credential(KEY_BEARER_TOKEN, token)?;
    }
    if let Some(key) = api_key.as_deref() {
        set_credential(KEY_API_KEY, key)?;
    }

    info!(spreadsheet_id = %spreadsheet_id, "connection credentials updated");
    Ok(serde_json::json!({ "success": true }))
}

/// Replace the stored bearer token (called after every sign-in refresh).
pub fn update_token(token: &str) -> Result<(), String> {
    let token = token.trim();
    if token.is_empty() {
        return Err("Token must not be empty".to_string());
    }
    set_credential(KEY_BEARER_TOKEN, token)
}

/// Build a [`Session`] from the credential store, falling back to
/// `local_settings` for installs that predate keyring storage.
pub fn load_session(db: Option<&DbState>) -> Result<Session, String> {
    let from_local = |key: &str| -> Option<String> {
        db.and_then(|db| {
            let conn = db.conn.lock().ok()?;
            crate::db::get_setting(&conn, "connection", key)
        })
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    };

    let spreadsheet_id = get_credential(KEY_SPREADSHEET_ID)
        .or_else(|| from_local(KEY_SPREADSHEET_ID))
        .ok_or("Not connected: missing spreadsheet id")?;
    let bearer_token = get_credential(KEY_BEARER_TOKEN).or_else(|| from_local(KEY_BEARER_TOKEN));
    let api_key = get_credential(KEY_API_KEY).or_else(|| from_local(KEY_API_KEY));

    let session = Session::new(spreadsheet_id, bearer_token, api_key);
    if !session.can_read() {
        return Err("Not connected: missing bearer token and API key".to_string());
    }
    Ok(session)
}

/// FDE delivery-partner credentials, read together.
pub fn fde_credentials() -> Option<(String, String)> {
    let client_id = get_credential(KEY_FDE_CLIENT_ID)?;
    let api_key = get_credential(KEY_FDE_API_KEY)?;
    Some((client_id, api_key))
}
