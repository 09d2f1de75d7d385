use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;


/// Storage type of a reading value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Boolean,
    String,
    Long,
    Double,
}

/// Typed reading value. Exactly one variant is populated by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum KvValue {
    Boolean(bool),
    String(String),
    Long(i64),
    Double(f64),
}

impl KvValue {
    pub fn data_type(&self) -> DataType {
        match self {
            KvValue::Boolean(_) => DataType::Boolean,
            KvValue::String(_) => DataType::String,
            KvValue::Long(_) => DataType::Long,
            KvValue::Double(_) => DataType::Double,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            KvValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            KvValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            KvValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            KvValue::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for KvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvValue::Boolean(v) => write!(f, "{}", v),
            KvValue::String(v) => write!(f, "{}", v),
            KvValue::Long(v) => write!(f, "{}", v),
            KvValue::Double(v) => write!(f, "{}", v),
        }
    }
}

/// One timestamped, typed telemetry sample for a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawReading", into = "RawReading")]
pub struct Reading {
    /// Unix epoch milliseconds
    pub ts: i64,
    pub key: String,
    pub value: KvValue,
}

impl Reading {
    pub fn new(ts: i64, key: impl Into<String>, value: KvValue) -> Self {
        Self {
            ts,
            key: key.into(),
            value,
        }
    }

    pub fn boolean(ts: i64, key: impl Into<String>, v: bool) -> Self {
        Self::new(ts, key, KvValue::Boolean(v))
    }

    pub fn string(ts: i64, key: impl Into<String>, v: impl Into<String>) -> Self {
        Self::new(ts, key, KvValue::String(v.into()))
    }

    pub fn long(ts: i64, key: impl Into<String>, v: i64) -> Self {
        Self::new(ts, key, KvValue::Long(v))
    }

    pub fn double(ts: i64, key: impl Into<String>, v: f64) -> Self {
        Self::new(ts, key, KvValue::Double(v))
    }

    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }
}

/// Column form of a reading: one optional slot per value type.
///
/// This is the shape readings arrive in from the outside and the shape storage
/// rows are kept in. Converting to [`Reading`] checks that exactly one slot is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub ts: i64,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bool_v: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub str_v: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_v: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbl_v: Option<f64>,
}

impl From<Reading> for RawReading {
    fn from(reading: Reading) -> Self {
        let mut raw = RawReading {
            ts: reading.ts,
            key: reading.key,
            ..Default::default()
        };
        match reading.value {
            KvValue::Boolean(v) => raw.bool_v = Some(v),
            KvValue::String(v) => raw.str_v = Some(v),
            KvValue::Long(v) => raw.long_v = Some(v),
            KvValue::Double(v) => raw.dbl_v = Some(v),
        }
        raw
    }
}

impl TryFrom<RawReading> for Reading {
    type Error = ValidationError;

    fn try_from(raw: RawReading) -> Result<Self, Self::Error> {
        crate::validation::validate_raw_reading(raw)
    }
}

/// Aggregation applied by the store to a range query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Aggregation {
    None,
    Min,
    Max,
    Avg,
    Sum,
    Count,
}

/// Time-range query for a single key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsQuery {
    pub key: String,

    /// Inclusive range start (epoch ms)
    pub start_ts: i64,

    /// Inclusive range end (epoch ms)
    pub end_ts: i64,

    /// Bucket width; absent means no bucketing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Must be set; `Aggregation::None` asks for raw readings
    #[serde(default)]
    pub aggregation: Option<Aggregation>,
}

impl TsQuery {
    /// Raw readings for `key` in `[start_ts, end_ts]`
    pub fn raw(key: impl Into<String>, start_ts: i64, end_ts: i64) -> Self {
        Self {
            key: key.into(),
            start_ts,
            end_ts,
            interval_ms: None,
            limit: None,
            aggregation: Some(Aggregation::None),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation, interval_ms: u64) -> Self {
        self.aggregation = Some(aggregation);
        self.interval_ms = Some(interval_ms);
        self
    }
}

/// Retention period in seconds; zero means the value never expires
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ttl(pub u64);

impl Ttl {
    pub const NONE: Ttl = Ttl(0);

    pub fn from_secs(secs: u64) -> Self {
        Ttl(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Absolute expiry (epoch ms) for a row written at `now_ms`
    pub fn expires_at(&self, now_ms: i64) -> Option<i64> {
        if self.is_none() {
            return None;
        }
        let ttl_ms = i64::try_from(self.0.saturating_mul(1000)).unwrap_or(i64::MAX);
        Some(now_ms.saturating_add(ttl_ms))
    }
}

/// True if a row with the given expiry is still visible at `now_ms`
pub(crate) fn is_live(expires_at: Option<i64>, now_ms: i64) -> bool {
    expires_at.map_or(true, |at| at > now_ms)
}
