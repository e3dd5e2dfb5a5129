//! Runtime configuration for the demo backend.
//!
//! Values resolve in three layers: compiled defaults, an optional JSON file
//! and `BOARDING_MOCK_*` environment overrides. Every field has a default so
//! partial files are accepted.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

/// Bumping this forces every installation to discard persisted state on next load.
pub const SCHEMA_VERSION: &str = "4";
pub const DEFAULT_TENANT_ID: &str = "demo-tenant";

const ENV_PREFIX: &str = "BOARDING_MOCK_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DemoConfig {
    pub schema_version: String,
    pub tenant_id: String,
    /// Durable key holding the serialized collections.
    pub storage_key: String,
    /// Durable key holding the schema version marker.
    pub version_key: String,
    /// Session-scoped key marking that this session already initialized.
    pub session_key: String,
    pub default_limit: usize,
    pub invoice_prefix: String,
    pub sequence_width: usize,
    pub expiring_window_days: i64,
    /// Trailing path segments that are never treated as record identifiers.
    pub reserved_names: Vec<String>,
    /// POST path suffixes mapped onto named handler actions.
    pub action_suffixes: Vec<ActionSuffix>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSuffix {
    pub suffix: String,
    pub action: String,
}

impl ActionSuffix {
    fn new(suffix: &str, action: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
            action: action.to_string(),
        }
    }
}

const RESERVED_NAMES: &[&str] = &[
    // collections
    "bookings",
    "owners",
    "pets",
    "kennels",
    "invoices",
    "payments",
    "incidents",
    "tasks",
    "vaccinations",
    "services",
    "packages",
    "staff",
    "workflows",
    "segments",
    "messages",
    "runs",
    "config",
    "dashboard",
    // sub-resources and keywords
    "export",
    "summary",
    "preview",
    "templates",
    "assignments",
    "stats",
    "today",
    "availability",
    "expiring",
    "members",
    "assign",
    // action suffixes
    "check-in",
    "checkin",
    "check-out",
    "checkout",
    "cancel",
    "send",
    "void",
    "refund",
    "resolve",
    "complete",
    "activate",
    "deactivate",
];

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            storage_key: "boarding_demo_data".to_string(),
            version_key: "boarding_demo_version".to_string(),
            session_key: "boarding_demo_session".to_string(),
            default_limit: 50,
            invoice_prefix: "INV-".to_string(),
            sequence_width: 5,
            expiring_window_days: 30,
            reserved_names: RESERVED_NAMES.iter().map(|name| name.to_string()).collect(),
            action_suffixes: vec![
                ActionSuffix::new("check-in", "checkin"),
                ActionSuffix::new("checkin", "checkin"),
                ActionSuffix::new("check-out", "checkout"),
                ActionSuffix::new("checkout", "checkout"),
                ActionSuffix::new("cancel", "cancel"),
                ActionSuffix::new("send", "send"),
                ActionSuffix::new("void", "void"),
                ActionSuffix::new("refund", "refund"),
                ActionSuffix::new("resolve", "resolve"),
                ActionSuffix::new("complete", "complete"),
                ActionSuffix::new("activate", "activate"),
                ActionSuffix::new("deactivate", "deactivate"),
            ],
        }
    }
}

impl DemoConfig {
    /// Load a config file, keeping defaults for any omitted field.
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::from(err).with_context("path", path.display().to_string())
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "load_config")
                .with_context("path", path.display().to_string())
        })
    }

    /// Apply `BOARDING_MOCK_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> AppResult<Self> {
        self.with_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Apply overrides from an arbitrary lookup; split out so tests avoid
    /// touching process-wide environment.
    pub fn with_overrides<F>(mut self, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SCHEMA_VERSION") {
            self.schema_version = value;
        }
        if let Some(value) = lookup("TENANT_ID") {
            self.tenant_id = value;
        }
        if let Some(value) = lookup("INVOICE_PREFIX") {
            self.invoice_prefix = value;
        }
        if let Some(value) = lookup("DEFAULT_LIMIT") {
            self.default_limit = parse_number("DEFAULT_LIMIT", &value)?;
        }
        if let Some(value) = lookup("EXPIRING_WINDOW_DAYS") {
            self.expiring_window_days = parse_number("EXPIRING_WINDOW_DAYS", &value)?;
        }
        Ok(self)
    }

    pub fn is_reserved(&self, segment: &str) -> bool {
        self.reserved_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(segment))
    }

    /// Named action for a trailing path segment, if it is a configured suffix.
    pub fn action_for_suffix(&self, segment: &str) -> Option<&str> {
        self.action_suffixes
            .iter()
            .find(|entry| entry.suffix.eq_ignore_ascii_case(segment))
            .map(|entry| entry.action.as_str())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> AppResult<T> {
    value.trim().parse().map_err(|_| {
        AppError::new("CONFIG/INVALID_VALUE", "Configuration value is not a number")
            .with_context("key", format!("{ENV_PREFIX}{key}"))
            .with_context("value", value.to_string())
    })
}
