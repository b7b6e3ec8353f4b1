//! Deterministic, order-preserving partitioning of a [`FlowFrame`].

use std::fmt;
use std::str::FromStr;

use crate::error::{BotscanError, Result};
use crate::features::FlowFrame;

/// How the amount in a batch request is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchUnit {
    /// Percentage of rows per batch.
    Percent,
    /// Number of batches.
    Batches,
}

impl FromStr for BatchUnit {
    type Err = BotscanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "%" | "percent" => Ok(BatchUnit::Percent),
            "batches" => Ok(BatchUnit::Batches),
            _ => Err(BotscanError::InvalidBatchSpec(format!(
                "invalid batch type: {s} (use '%' or 'batches')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchSpec {
    Percent(f64),
    Batches(usize),
}

impl BatchSpec {
    /// Build a spec from a raw amount. A fractional batch count is truncated.
    ///
    /// Range checks that do not depend on the table happen here; the batch
    /// count is checked against the row count in [`batchify`].
    pub fn new(amount: f64, unit: BatchUnit) -> Result<Self> {
        match unit {
            BatchUnit::Percent => {
                if !(amount > 0.0 && amount < 100.0) {
                    return Err(BotscanError::InvalidBatchSpec(format!(
                        "invalid percentage of rows per batch: {amount}"
                    )));
                }
                Ok(BatchSpec::Percent(amount))
            }
            BatchUnit::Batches => {
                let n = amount.trunc();
                if !(n >= 1.0) || !n.is_finite() {
                    return Err(BotscanError::InvalidBatchSpec(format!(
                        "invalid number of batches ({amount}), must be positive"
                    )));
                }
                Ok(BatchSpec::Batches(n as usize))
            }
        }
    }

    /// Number of batches requested for a table of `total_rows` rows.
    pub fn num_batches(&self, total_rows: usize) -> Result<usize> {
        match *self {
            BatchSpec::Percent(pct) => {
                if !(pct > 0.0 && pct < 100.0) {
                    return Err(BotscanError::InvalidBatchSpec(format!(
                        "invalid percentage of rows per batch: {pct}"
                    )));
                }
                Ok((1.0 / (pct / 100.0)).floor() as usize)
            }
            BatchSpec::Batches(n) => {
                if n == 0 || n >= total_rows {
                    return Err(BotscanError::InvalidBatchSpec(format!(
                        "invalid number of batches ({n}), must be positive \
                         and lower than the number of rows ({total_rows})"
                    )));
                }
                Ok(n)
            }
        }
    }
}

impl fmt::Display for BatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchSpec::Percent(pct) => write!(f, "{pct}% of rows per batch"),
            BatchSpec::Batches(n) => write!(f, "{n} batches"),
        }
    }
}

/// Row ranges for `num_batches` equal batches over `total_rows` rows.
///
/// Boundary `i` sits at `(i + 1) * (total_rows / num_batches)`; any remainder
/// forms one extra trailing batch. Empty ranges are dropped.
pub fn batch_ranges(total_rows: usize, num_batches: usize) -> Vec<std::ops::Range<usize>> {
    let size = if num_batches == 0 { 0 } else { total_rows / num_batches };
    let mut ranges = Vec::with_capacity(num_batches + 1);
    let mut start = 0;
    for i in 0..num_batches {
        let end = (i + 1) * size;
        ranges.push(start..end);
        start = end;
    }
    ranges.push(start..total_rows);
    ranges.retain(|r| !r.is_empty());
    ranges
}

/// Split `frame` into ordered, non-empty batches.
///
/// Concatenating the batches in order reproduces `frame` row for row.
pub fn batchify(frame: &FlowFrame, spec: &BatchSpec) -> Result<Vec<FlowFrame>> {
    let total = frame.len();
    let num_batches = spec.num_batches(total)?;
    let batches: Vec<FlowFrame> = batch_ranges(total, num_batches)
        .into_iter()
        .map(|range| frame.slice(range))
        .collect();

    tracing::debug!(%spec, rows = total, batches = batches.len(), "batchified input");
    Ok(batches)
}
