//! Input checks run before any storage I/O.
//!
//! All functions are synchronous and side-effect free.

use crate::entity::EntityId;
use crate::error::ValidationError;
use crate::kv::{KvValue, RawReading, Reading, TsQuery};

/// Rejects absent (nil) entity identifiers.
pub fn validate_entity(entity_id: &EntityId) -> Result<(), ValidationError> {
    if entity_id.is_empty() {
        return Err(ValidationError::InvalidEntity(entity_id.to_string()));
    }
    Ok(())
}

/// Validates a typed reading.
///
/// Validation rules:
/// - Key: must not be blank
/// - Timestamp: must be non-negative (Unix epoch milliseconds)
/// - Double values: must be finite (NaN and infinities have no column form)
///
/// The single-value rule is enforced by [`KvValue`] itself; see
/// [`validate_raw_reading`] for the column form.
pub fn validate_reading(reading: &Reading) -> Result<(), ValidationError> {
    if is_blank(&reading.key) {
        return Err(ValidationError::InvalidReading(
            "key can't be empty".to_string(),
        ));
    }
    if reading.ts < 0 {
        return Err(ValidationError::InvalidReading(format!(
            "timestamp must be non-negative, got {}",
            reading.ts
        )));
    }
    if let KvValue::Double(v) = reading.value {
        if !v.is_finite() {
            return Err(ValidationError::InvalidReading(format!(
                "key '{}' has non-finite double value {}",
                reading.key, v
            )));
        }
    }
    Ok(())
}

/// Turns a column-form reading into a typed one.
///
/// Exactly one of `bool_v`, `str_v`, `long_v`, `dbl_v` must be set, and the
/// result must pass [`validate_reading`].
pub fn validate_raw_reading(raw: RawReading) -> Result<Reading, ValidationError> {
    let populated = [
        raw.bool_v.is_some(),
        raw.str_v.is_some(),
        raw.long_v.is_some(),
        raw.dbl_v.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();

    if populated != 1 {
        return Err(ValidationError::InvalidReading(format!(
            "key '{}' must carry exactly one value, found {}",
            raw.key, populated
        )));
    }

    let value = match (raw.bool_v, raw.str_v, raw.long_v, raw.dbl_v) {
        (Some(v), _, _, _) => KvValue::Boolean(v),
        (_, Some(v), _, _) => KvValue::String(v),
        (_, _, Some(v), _) => KvValue::Long(v),
        (_, _, _, Some(v)) => KvValue::Double(v),
        (None, None, None, None) => {
            return Err(ValidationError::InvalidReading(format!(
                "key '{}' has no value",
                raw.key
            )))
        }
    };

    let reading = Reading {
        ts: raw.ts,
        key: raw.key,
        value,
    };
    validate_reading(&reading)?;
    Ok(reading)
}

/// Checks key and aggregation. Range ordering is left to the store.
pub fn validate_query(query: &TsQuery) -> Result<(), ValidationError> {
    if is_blank(&query.key) {
        return Err(ValidationError::InvalidQuery(
            "key can't be empty".to_string(),
        ));
    }
    if query.aggregation.is_none() {
        return Err(ValidationError::InvalidQuery(
            "aggregation can't be empty".to_string(),
        ));
    }
    Ok(())
}

/// Checks a key used for latest-value lookups.
pub fn validate_key(key: &str) -> Result<(), ValidationError> {
    if is_blank(key) {
        return Err(ValidationError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}
