//! Shared utilities for the Rollcall station.

pub mod logging;

pub use logging::{init_logging, LogFormat, LogFormatParseError};
