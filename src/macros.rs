// src/macros.rs

//
// Logging macros
//
// logging feature enabled  → tracing
// logging feature disabled → log_error goes to stderr, everything else is dropped
//
// Arguments are not evaluated when the feature is off, so bindings that
// only feed a log line are prefixed with `_`.
//

#![allow(unused_macros)]

macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        tracing::error!($($arg)*);
        #[cfg(not(feature = "logging"))]
        eprintln!($($arg)*);
    }};
}

macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        tracing::warn!($($arg)*);
    }};
}

macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        tracing::info!($($arg)*);
    }};
}

macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        tracing::debug!($($arg)*);
    }};
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
