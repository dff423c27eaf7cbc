//! Logging extensions for `Result` and `Option`.
//!
//! Used where a failure is reported but must not change the outcome of the
//! surrounding operation, such as notification delivery.

use std::fmt::Display;
use std::panic::Location;

use tracing::{error, warn};

/// Log the error of a `Result` with context and caller location.
pub trait ResultExt<T, E> {
    /// Log an `Err` at error level and return the result unchanged.
    fn log<S: ToString>(self, context: S) -> Result<T, E>;

    /// Log an `Err` at warn level and return the result unchanged.
    fn log_warn<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller = Location::caller();
            error!(
                target: "taskflow_engine",
                error = %e,
                file = %format!("{}:{}", caller.file(), caller.line()),
                context = %context.to_string(),
                "Operation failed"
            );
        }
        self
    }

    #[track_caller]
    fn log_warn<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller = Location::caller();
            warn!(
                target: "taskflow_engine",
                error = %e,
                file = %format!("{}:{}", caller.file(), caller.line()),
                context = %context.to_string(),
                "Operation failed, continuing"
            );
        }
        self
    }
}

/// Log a missing value with context.
pub trait OptionResultExt<T> {
    fn log_none<S: ToString>(self, context: S) -> Option<T>;
}

impl<T> OptionResultExt<T> for Option<T> {
    #[track_caller]
    fn log_none<S: ToString>(self, context: S) -> Option<T> {
        if self.is_none() {
            let caller = Location::caller();
            tracing::debug!(
                target: "taskflow_engine",
                file = %format!("{}:{}", caller.file(), caller.line()),
                context = %context.to_string(),
                "Expected value was None"
            );
        }
        self
    }
}
