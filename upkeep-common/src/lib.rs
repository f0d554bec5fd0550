//! # upkeep Common
//!
//! Shared utilities for the upkeep components.
//!
//! ## Logging
//!
//! ```rust,ignore
//! use upkeep_common::{init_logging, LogFormat};
//!
//! // Human-readable output, `RUST_LOG` overrides the level
//! init_logging("info").unwrap();
//!
//! // Or pick the format from configuration
//! upkeep_common::init_logging_with_format("debug", LogFormat::Json).unwrap();
//! ```

pub mod logging;

// Re-export logging functions
pub use logging::{
    init_logging,
    init_logging_json,
    init_logging_with_format,
    LogFormat,
};
