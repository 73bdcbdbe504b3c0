//! Process-wide structured logging for larder hosts and tests.

pub mod tracing;

pub use crate::tracing::{DEFAULT_FILTER, LogFormat, init, init_with};
