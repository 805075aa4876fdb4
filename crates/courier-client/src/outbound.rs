//! Client-originated messages: `{type, payload, timestamp}` sealed under
//! `{from: client_id, ts: timestamp}` and sent once.

use chrono::{SecondsFormat, Utc};
use courier_core::crypto::{self, Aad};
use courier_core::{Credentials, Envelope};
use serde_json::{json, Value};

use crate::relay::{RelayError, RelayTransport};

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub fn compose(kind: &str, payload: Value, timestamp: &str) -> Value {
    json!({
        "type": kind,
        "payload": payload,
        "timestamp": timestamp,
    })
}

/// Operator-typed payload: a JSON object is taken as-is, anything else is
/// wrapped as `{"message": text}`.
pub fn parse_payload(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => Some(json!({ "message": raw })),
    }
}

/// Encrypts `plaintext`, binding it to this client and the plaintext's own
/// `timestamp` field (`null` when absent).
pub fn seal(credentials: &Credentials, plaintext: &Value) -> Result<Envelope, RelayError> {
    let key = credentials.personal_key()?;
    let mut context = Aad::new();
    context.insert("from".into(), Value::String(credentials.client_id.clone()));
    context.insert(
        "ts".into(),
        plaintext.get("timestamp").cloned().unwrap_or(Value::Null),
    );
    Ok(crypto::encrypt(&key, plaintext, &context)?)
}

/// At-most-once: a failed send is reported, never retried.
pub async fn send(
    transport: &dyn RelayTransport,
    credentials: &Credentials,
    plaintext: &Value,
) -> Result<(), RelayError> {
    let envelope = seal(credentials, plaintext)?;
    transport.send(credentials, &envelope).await
}
