//! botscan-core — per-host botnet infection scoring over flow records.
//!
//! Provides schema normalization, host filtering, deterministic batching,
//! classifier scoring and per-host aggregation used by the CLI frontend.

pub mod aggregate;
pub mod batch;
pub mod error;
pub mod features;
pub mod filter;
pub mod inference;
pub mod ip;
pub mod model;
pub mod report;
pub mod scan;
pub mod source;

pub use error::{BotscanError, Result};
