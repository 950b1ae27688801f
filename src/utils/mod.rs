//! Utility modules: developer logging, log4rs setup, numeric conversions.
pub mod devlog;
pub mod logger;
pub mod num;
