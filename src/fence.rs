//! Panic and error boundary around handler calls.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::{error::panic_payload, AppError, AppResult};

/// Run one handler for `route`. A panic becomes a `RUNTIME/PANIC` error and
/// is logged as `panic_caught`; a returned error is logged as
/// `handler_failed`. Either way the error comes back with a crash id and the
/// route in its context, logged exactly once.
#[allow(clippy::result_large_err)]
pub fn guard_handler<T, F>(route: &str, f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T>,
{
    let (mut error, event) = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(error)) => (error, "handler_failed"),
        Err(payload) => (
            AppError::new("RUNTIME/PANIC", panic_payload(payload.as_ref())),
            "panic_caught",
        ),
    };
    if error.crash_id().is_none() {
        error = error.with_context("route", route.to_string());
        error.log_with_event(event);
    }
    Err(error)
}
