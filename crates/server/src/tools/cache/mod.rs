//! Cache-related MCP tools.
//!
//! This module provides tools for inspecting and clearing the resource cache.

pub mod clear;
pub mod stats;

pub use clear::{CacheClearOutput, clear_impl};
pub use stats::{CacheStatsOutput, stats_impl};
