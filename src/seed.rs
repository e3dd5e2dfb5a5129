//! Seed data loading and relative-date resolution.
//!
//! Seed files describe dates relative to "now" so the demo always looks
//! current. A placeholder object
//! `{"$relativeDate": {"days": -2, "time": "09:30"}}` anywhere in the tree is
//! replaced with an absolute RFC 3339 string before the store sees it.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use include_dir::{include_dir, Dir};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::{time::to_iso, AppError};

static BUNDLED_SEEDS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/seed");

pub const BUNDLED_SEED_NAME: &str = "demo.json";
const PLACEHOLDER_KEY: &str = "$relativeDate";
const TENANT_KEYS: &[&str] = &["tenant", "config"];

pub type Record = Map<String, Value>;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("seed file {0} is not bundled")]
    MissingBundled(String),
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),
    #[error("seed is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("seed root must be a JSON object")]
    NotAnObject,
    #[error("record {index} in collection {collection} is not an object")]
    InvalidRecord { collection: String, index: usize },
    #[error("invalid relative date placeholder: {0}")]
    InvalidPlaceholder(String),
}

impl From<SeedError> for AppError {
    fn from(error: SeedError) -> Self {
        let code = match &error {
            SeedError::MissingBundled(_) => "SEED/MISSING",
            SeedError::Io(_) => "SEED/IO",
            SeedError::Json(_) => "SEED/JSON",
            SeedError::NotAnObject | SeedError::InvalidRecord { .. } => "SEED/SHAPE",
            SeedError::InvalidPlaceholder(_) => "SEED/PLACEHOLDER",
        };
        AppError::new(code, error.to_string())
    }
}

/// Initial collections plus tenant configuration, with dates already resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedData {
    pub collections: BTreeMap<String, Vec<Record>>,
    pub tenant: Record,
}

impl SeedData {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build seed data from an already date-resolved JSON tree.
    pub fn from_value(value: Value) -> Result<Self, SeedError> {
        let Value::Object(root) = value else {
            return Err(SeedError::NotAnObject);
        };
        let mut seed = SeedData::default();
        for (key, value) in root {
            match value {
                Value::Object(map) if TENANT_KEYS.contains(&key.as_str()) => {
                    seed.tenant.extend(map);
                }
                Value::Array(items) => {
                    let mut records = Vec::with_capacity(items.len());
                    for (index, item) in items.into_iter().enumerate() {
                        match item {
                            Value::Object(record) => records.push(record),
                            _ => {
                                return Err(SeedError::InvalidRecord {
                                    collection: key,
                                    index,
                                })
                            }
                        }
                    }
                    seed.collections.insert(key, records);
                }
                _ => {
                    debug!(target: "boarding_mock", event = "seed_key_ignored", key = %key);
                }
            }
        }
        Ok(seed)
    }

    /// Parse raw seed JSON, resolving relative dates against `reference`.
    pub fn from_json_str(raw: &str, reference: DateTime<Utc>) -> Result<Self, SeedError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(resolve_dates(value, reference)?)
    }

    pub fn from_file(path: &Path, reference: DateTime<Utc>) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw, reference)
    }

    /// The demo dataset compiled into the crate.
    pub fn bundled(reference: DateTime<Utc>) -> Result<Self, SeedError> {
        let file = BUNDLED_SEEDS
            .get_file(BUNDLED_SEED_NAME)
            .ok_or_else(|| SeedError::MissingBundled(BUNDLED_SEED_NAME.to_string()))?;
        let raw = file
            .contents_utf8()
            .ok_or_else(|| SeedError::MissingBundled(BUNDLED_SEED_NAME.to_string()))?;
        Self::from_json_str(raw, reference)
    }

    pub fn collection(&self, name: &str) -> &[Record] {
        self.collections.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RelativeDate {
    days: i64,
    hours: i64,
    minutes: i64,
    time: Option<String>,
    date_only: bool,
}

impl RelativeDate {
    fn resolve(&self, reference: DateTime<Utc>) -> Result<String, SeedError> {
        let mut at = reference
            + Duration::days(self.days)
            + Duration::hours(self.hours)
            + Duration::minutes(self.minutes);
        if let Some(raw) = &self.time {
            let time = NaiveTime::parse_from_str(raw, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
                .map_err(|_| SeedError::InvalidPlaceholder(format!("bad time {raw:?}")))?;
            at = at.date_naive().and_time(time).and_utc();
        }
        if self.date_only {
            Ok(at.date_naive().format("%Y-%m-%d").to_string())
        } else {
            Ok(to_iso(at))
        }
    }
}

/// Replace every relative-date placeholder in `value` with an absolute date.
pub fn resolve_dates(value: Value, reference: DateTime<Utc>) -> Result<Value, SeedError> {
    match value {
        Value::Object(mut map) => {
            if map.len() == 1 {
                if let Some(placeholder) = map.remove(PLACEHOLDER_KEY) {
                    let relative: RelativeDate = serde_json::from_value(placeholder)
                        .map_err(|err| SeedError::InvalidPlaceholder(err.to_string()))?;
                    return relative.resolve(reference).map(Value::String);
                }
            }
            let mut resolved = Map::with_capacity(map.len());
            for (key, child) in map {
                resolved.insert(key, resolve_dates(child, reference)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => items
            .into_iter()
            .map(|item| resolve_dates(item, reference))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other),
    }
}
