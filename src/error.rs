use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

/// Correlates a logged failure with the 500 response that reported it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrashId(Uuid);

impl CrashId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CrashId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CrashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Failure raised inside the mock backend. Handlers return it; the
/// dispatcher logs it once and turns it into a 500 envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppError {
    /// Namespaced code such as `STORAGE/IO` or `RUNTIME/PANIC`.
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<AppError>>,
    /// Assigned the first time the error is logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash_id: Option<CrashId>,
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub const UNKNOWN_CODE: &'static str = "APP/UNKNOWN";
    pub const GENERIC_CODE: &'static str = "APP/GENERIC";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            cause: None,
            crash_id: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    pub fn crash_id(&self) -> Option<&CrashId> {
        self.crash_id.as_ref()
    }

    pub fn set_crash_id(&mut self, crash_id: CrashId) {
        self.crash_id = Some(crash_id);
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<AppError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }

    /// Log at `error` level under `event`. The crash id is assigned on the
    /// first call and reused afterwards.
    pub fn log_with_event(&mut self, event: &'static str) {
        let crash_id = self.crash_id.get_or_insert_with(CrashId::new).clone();
        error!(
            target: "boarding_mock",
            event,
            code = %self.code,
            crash_id = %crash_id,
            context = ?self.context,
            "{}",
            self.message
        );
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        for (key, value) in &self.context {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

impl StdError for AppError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl From<&str> for AppError {
    fn from(message: &str) -> Self {
        AppError::new(AppError::GENERIC_CODE, message)
    }
}

impl From<String> for AppError {
    fn from(message: String) -> Self {
        AppError::new(AppError::GENERIC_CODE, message)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        fn convert(err: &(dyn StdError + 'static)) -> AppError {
            if let Some(app) = err.downcast_ref::<AppError>() {
                return app.clone();
            }
            let mut root = AppError::new(AppError::UNKNOWN_CODE, err.to_string());
            root.cause = err.source().map(|source| Box::new(convert(source)));
            root
        }

        convert(error.as_ref())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        let app_error = AppError::new(format!("IO/{:?}", error.kind()), error.to_string());
        match error.raw_os_error() {
            Some(os_code) => app_error.with_context("os_code", os_code.to_string()),
            None => app_error,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        use serde_json::error::Category;

        let code = match error.classify() {
            Category::Data => "JSON/DATA",
            Category::Syntax => "JSON/SYNTAX",
            Category::Eof => "JSON/EOF",
            Category::Io => "JSON/IO",
        };
        let app_error = AppError::new(code, error.to_string());
        if error.line() == 0 {
            return app_error;
        }
        app_error
            .with_context("line", error.line().to_string())
            .with_context("column", error.column().to_string())
    }
}

/// Panic message, or a placeholder for payloads that are not strings.
pub fn panic_payload(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn builds_error_with_context_and_cause() {
        let error = AppError::new("TEST/CODE", "Something went wrong")
            .with_context("collection", "bookings")
            .with_context("id", "b-1")
            .with_cause(AppError::from("inner failure"));

        assert_eq!(error.context().get("collection").map(String::as_str), Some("bookings"));
        assert_eq!(
            error.to_string(),
            "[TEST/CODE] Something went wrong collection=bookings id=b-1"
        );
        let cause = error.cause().expect("cause present");
        assert_eq!(cause.code(), AppError::GENERIC_CODE);
        assert_eq!(cause.message(), "inner failure");
    }

    #[test]
    fn anyhow_chains_become_nested_causes() {
        let err = (|| -> anyhow::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
                .context("failed to persist demo state")
        })()
        .unwrap_err();

        let app_error = AppError::from(err);
        assert_eq!(app_error.code(), AppError::UNKNOWN_CODE);
        assert_eq!(app_error.message(), "failed to persist demo state");
        assert!(app_error
            .cause()
            .is_some_and(|cause| cause.message().contains("disk full")));
    }

    #[test]
    fn json_errors_carry_position() {
        let err = serde_json::from_str::<serde_json::Value>("{\"name\": }").expect_err("invalid");
        let app_error = AppError::from(err);
        assert_eq!(app_error.code(), "JSON/SYNTAX");
        assert!(app_error.context().contains_key("line"));
        assert!(app_error.context().contains_key("column"));
    }

    #[test]
    fn crash_id_is_assigned_once() {
        let mut error = AppError::new("TEST/CODE", "boom");
        error.log_with_event("test_failure");
        let first = error.crash_id().cloned().expect("crash id assigned");
        error.log_with_event("test_failure");
        assert_eq!(error.crash_id(), Some(&first));
        let json = serde_json::to_value(&error).expect("serialize");
        assert_eq!(json["crash_id"], first.to_string());
    }

    #[test]
    fn panic_payload_handles_all_shapes() {
        let text: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_payload(text.as_ref()), "boom");
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_payload(owned.as_ref()), "kaboom");
        let other: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_payload(other.as_ref()), "unknown panic payload");
    }
}
