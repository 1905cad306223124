//! Snapshot payload decoding.
//!
//! Decoding is per event and never fatal: a bad payload becomes a
//! [`DecodeError`] for the controller to publish, and the session keeps
//! reading.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Message used when a server `error` event carries nothing readable.
pub const FALLBACK_SERVER_ERROR: &str = "Stream error";

/// One fleet-health measurement pushed by the producer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Aggregate health score, nominally 0–100.
    pub fleet_health_score: f64,
    pub total_aircraft: u64,
    pub available_aircraft: u64,
    pub overdue_maintenance_count: u64,
    pub open_work_orders: u64,
    pub urgent_work_orders: u64,
    #[serde(rename = "alertsLast24h")]
    pub alerts_last_24h: u64,
    #[serde(rename = "aiDecisionsLast7d")]
    pub ai_decisions_last_7d: u64,
    /// Producer-assigned ISO-8601 timestamp, passed through unvalidated.
    pub timestamp: String,
}

impl Snapshot {
    /// Cross-field inconsistencies worth logging.
    ///
    /// These are not enforced; the producer owns the numbers.
    pub fn cross_field_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.available_aircraft > self.total_aircraft {
            warnings.push(format!(
                "availableAircraft ({}) exceeds totalAircraft ({})",
                self.available_aircraft, self.total_aircraft
            ));
        }
        if self.urgent_work_orders > self.open_work_orders {
            warnings.push(format!(
                "urgentWorkOrders ({}) exceeds openWorkOrders ({})",
                self.urgent_work_orders, self.open_work_orders
            ));
        }
        warnings
    }
}

/// Why a snapshot payload was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Not JSON, or missing/mistyped fields.
    #[error("Failed to parse fleet health data: {message}")]
    Malformed { message: String },
    /// The producer sent `{"error": ...}` in place of a snapshot.
    #[error("Fleet health unavailable: {reason}")]
    Unavailable { reason: String },
}

#[derive(Deserialize)]
struct UnavailablePayload {
    error: String,
}

/// Decode the payload of one snapshot event.
///
/// # Errors
///
/// Returns [`DecodeError::Unavailable`] when the producer reported that it
/// could not compute a snapshot, and [`DecodeError::Malformed`] for anything
/// else that is not a complete snapshot.
pub fn decode(raw: &str) -> Result<Snapshot, DecodeError> {
    serde_json::from_str::<Snapshot>(raw).map_err(|err| {
        match serde_json::from_str::<UnavailablePayload>(raw) {
            Ok(payload) => DecodeError::Unavailable {
                reason: payload.error,
            },
            Err(_) => DecodeError::Malformed {
                message: err.to_string(),
            },
        }
    })
}

/// Extract the human-readable message from a server `error` event.
pub fn server_error_message(raw: &str) -> String {
    if let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(raw) {
        match payload.get("message") {
            Some(Value::String(message)) => return message.clone(),
            Some(Value::Null) | None => {}
            Some(other) => return other.to_string(),
        }
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('{') {
        FALLBACK_SERVER_ERROR.to_string()
    } else {
        trimmed.to_string()
    }
}
