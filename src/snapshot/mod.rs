//! Per-entity sensor summary built from an ingested batch.
//!
//! A snapshot holds one entry per distinct key in the batch. It is rebuilt
//! from scratch for every batch and replaces the entity's previous document
//! wholesale; keys missing from the batch are dropped, not merged.

use crate::kv::{KvValue, Reading};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;


/// Summary type of a sensor. Long and double both map to `Numerical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorType {
    Boolean,
    String,
    Numerical,
}

impl SensorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Boolean => "BOOLEAN",
            SensorType::String => "STRING",
            SensorType::Numerical => "NUMERICAL",
        }
    }
}

impl From<&KvValue> for SensorType {
    fn from(value: &KvValue) -> Self {
        match value {
            KvValue::Boolean(_) => SensorType::Boolean,
            KvValue::String(_) => SensorType::String,
            KvValue::Long(_) | KvValue::Double(_) => SensorType::Numerical,
        }
    }
}

/// Latest-known value of one sensor key
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub key: String,
    pub sensor_type: SensorType,
    /// Original value, width preserved
    pub value: KvValue,
}

impl SnapshotEntry {
    pub fn from_reading(reading: &Reading) -> Self {
        Self {
            key: reading.key.clone(),
            sensor_type: SensorType::from(&reading.value),
            value: reading.value.clone(),
        }
    }

    /// `{"sensor_name", "sensor_type", "sensor_value"}` object
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("sensor_name".to_string(), Value::String(self.key.clone()));
        doc.insert(
            "sensor_type".to_string(),
            Value::String(self.sensor_type.as_str().to_string()),
        );
        doc.insert("sensor_value".to_string(), value_to_json(&self.value));
        Value::Object(doc)
    }
}

/// Non-finite doubles have no JSON form and become null.
fn value_to_json(value: &KvValue) -> Value {
    match value {
        KvValue::Boolean(v) => Value::Bool(*v),
        KvValue::String(v) => Value::String(v.clone()),
        KvValue::Long(v) => Value::Number((*v).into()),
        KvValue::Double(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
    }
}

/// Mapping from key to entry for one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entries: BTreeMap<String, SnapshotEntry>,
}

impl Snapshot {
    pub fn get(&self, key: &str) -> Option<&SnapshotEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.values()
    }

    /// JSON document stored on the entity record, keyed by sensor key
    pub fn to_document(&self) -> Value {
        let doc: Map<String, Value> = self
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.to_document()))
            .collect();
        Value::Object(doc)
    }
}

/// Accumulates entries in input order; a repeated key replaces the earlier entry.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    snapshot: Snapshot,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reading: &Reading) {
        self.snapshot
            .entries
            .insert(reading.key.clone(), SnapshotEntry::from_reading(reading));
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn finish(self) -> Snapshot {
        self.snapshot
    }
}

/// Build the snapshot for a batch, last occurrence of each key winning
pub fn build_snapshot<'a>(readings: impl IntoIterator<Item = &'a Reading>) -> Snapshot {
    let mut builder = SnapshotBuilder::new();
    for reading in readings {
        builder.push(reading);
    }
    builder.finish()
}
