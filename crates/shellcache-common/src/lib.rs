//! # ShellCache Common
//!
//! Logging configuration shared by the shellcache crates and the binaries
//! that embed them.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};
