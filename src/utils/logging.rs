//! Logging macros gated by a per-module `ENABLE_LOGS` switch.
//!
//! The scan loop runs on every page change, so chatty modules keep a local
//! flag to silence themselves without touching `RUST_LOG`:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info};
//!
//! log_info!("scan finished with {} flagged", count);
//! ```

/// Info-level log, emitted only when the calling module sets `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Debug-level log, used for per-trigger and per-candidate detail.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Errors are gated too; callers that must always report use `log::error!`.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
