//! CLI command implementations. Each returns the text to print.

pub mod cache;
pub mod common;
pub mod config;
pub mod format;
pub mod key;
