//! Schema normalization and the row-aligned feature / host tables.
//!
//! Raw input arrives with whatever column names the exporter used. It is
//! reconciled into a fixed canonical schema:
//! - the host address column is located first and split off into a [`HostList`]
//! - seven flow columns are picked by alias, in canonical order
//! - bits per second is derived and appended as the eighth column
//!
//! After that the two tables are only ever narrowed (filtering) or sliced
//! (batching). Both are index views over shared, immutable row storage, and
//! every narrowing goes through [`FlowFrame`] so that the same mask hits both.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use crate::error::{BotscanError, Result};
use crate::source::{RawTable, Value};

/// Canonical name of the extracted host address column.
pub const HOST_KEY: &str = "srcaddr";

/// Host address aliases, in preference order.
pub const HOST_ALIASES: &[&str] = &[
    "srcaddr",
    "srcaddress",
    "sourceaddr",
    "sourceaddress",
    "host",
];

/// Canonical flow columns with their aliases. The first alias is the canonical name.
pub const COLUMN_ALIASES: [&[&str]; NUM_FLOW_COLUMNS] = [
    &["proto", "protocol"],
    &["dport", "destinationport", "dstport"],
    &["sport", "sourceport", "srcport"],
    &["state", "st"],
    &["dur", "duration"],
    &["totbytes", "totalbytes", "tbytes"],
    &["srcbytes", "sourcebytes"],
];

/// Number of flow columns read from input.
pub const NUM_FLOW_COLUMNS: usize = 7;

/// Column names of a [`FeatureTable`], in canonical order.
pub const FEATURE_NAMES: [&str; 8] = [
    "proto", "dport", "sport", "state", "dur", "totbytes", "srcbytes", "bps",
];

/// Positional input carries the host address after the seven flow columns.
const POSITIONAL_HOST_COLUMN: usize = NUM_FLOW_COLUMNS;

/// Lower-case a column label and drop all whitespace.
pub fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// One flow in the canonical seven-column schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalFlow {
    pub proto: String,
    pub dport: String,
    pub sport: String,
    pub state: String,
    pub dur: f64,
    pub totbytes: f64,
    pub srcbytes: f64,
}

/// A canonical flow plus its derived features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub flow: CanonicalFlow,
    pub bps: u64,
}

impl FeatureRow {
    /// Categorical (textual) feature by canonical name.
    pub fn category(&self, name: &str) -> Option<&str> {
        match name {
            "proto" => Some(&self.flow.proto),
            "dport" => Some(&self.flow.dport),
            "sport" => Some(&self.flow.sport),
            "state" => Some(&self.flow.state),
            _ => None,
        }
    }

    /// Numeric feature by canonical name.
    pub fn numeric(&self, name: &str) -> Option<f64> {
        match name {
            "dur" => Some(self.flow.dur),
            "totbytes" => Some(self.flow.totbytes),
            "srcbytes" => Some(self.flow.srcbytes),
            "bps" => Some(self.bps as f64),
            _ => None,
        }
    }
}

/// Ordered index view over shared, immutable rows.
#[derive(Debug, Clone)]
struct RowView<T> {
    backing: Arc<[T]>,
    index: Vec<usize>,
}

impl<T> RowView<T> {
    fn new(rows: Vec<T>) -> Self {
        let index = (0..rows.len()).collect();
        Self {
            backing: rows.into(),
            index,
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn get(&self, i: usize) -> Option<&T> {
        self.index.get(i).map(|&j| &self.backing[j])
    }

    fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.index.iter().map(|&j| &self.backing[j])
    }

    fn select(&self, mask: &[bool]) -> Self {
        Self {
            backing: Arc::clone(&self.backing),
            index: select_by_mask(&self.index, mask),
        }
    }

    fn slice(&self, range: Range<usize>) -> Self {
        Self {
            backing: Arc::clone(&self.backing),
            index: self.index[range].to_vec(),
        }
    }
}

fn select_by_mask<T: Clone>(values: &[T], mask: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(mask)
        .filter(|(_, keep)| **keep)
        .map(|(v, _)| v.clone())
        .collect()
}

/// Feature matrix in canonical column order (see [`FEATURE_NAMES`]).
#[derive(Debug, Clone)]
pub struct FeatureTable {
    rows: RowView<FeatureRow>,
}

impl FeatureTable {
    pub fn new(rows: Vec<FeatureRow>) -> Self {
        Self {
            rows: RowView::new(rows),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<&FeatureRow> {
        self.rows.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureRow> + '_ {
        self.rows.iter()
    }
}

/// Host address per row, plus the per-host row count column.
#[derive(Debug, Clone)]
pub struct HostList {
    addresses: RowView<String>,
    counts: Vec<usize>,
}

impl HostList {
    pub fn new(addresses: Vec<String>) -> Self {
        let mut hosts = Self {
            addresses: RowView::new(addresses),
            counts: Vec::new(),
        };
        hosts.counts = hosts.group_counts();
        hosts
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn address(&self, i: usize) -> Option<&str> {
        self.addresses.get(i).map(String::as_str)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> + '_ {
        self.addresses.iter().map(String::as_str)
    }

    /// Row count of each row's host, as last computed.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Number of rows per host among the rows currently present, aligned to rows.
    pub fn group_counts(&self) -> Vec<usize> {
        let mut per_host: HashMap<&str, usize> = HashMap::new();
        for addr in self.addresses() {
            *per_host.entry(addr).or_default() += 1;
        }
        self.addresses().map(|addr| per_host[addr]).collect()
    }

    /// Recompute the count column from the rows currently present.
    pub fn recount(mut self) -> Self {
        self.counts = self.group_counts();
        self
    }

    fn select(&self, mask: &[bool]) -> Self {
        Self {
            addresses: self.addresses.select(mask),
            counts: select_by_mask(&self.counts, mask),
        }
    }

    fn slice(&self, range: Range<usize>) -> Self {
        Self {
            addresses: self.addresses.slice(range.clone()),
            counts: self.counts[range].to_vec(),
        }
    }
}

/// A [`FeatureTable`] and [`HostList`] kept in row lockstep.
#[derive(Debug, Clone)]
pub struct FlowFrame {
    features: FeatureTable,
    hosts: HostList,
}

impl FlowFrame {
    /// Normalize a raw table: extract hosts, reconcile the schema, derive features.
    pub fn from_raw(raw: &RawTable) -> Result<Self> {
        let (host_column, hosts) = extract_hosts(raw)?;
        let flows = normalize(raw, host_column)?;
        let features = derive_features(flows)?;
        tracing::debug!(rows = features.len(), "normalized input table");
        Self::from_parts(features, hosts)
    }

    pub fn from_parts(features: FeatureTable, hosts: HostList) -> Result<Self> {
        if features.len() != hosts.len() {
            return Err(BotscanError::RowMismatch {
                features: features.len(),
                hosts: hosts.len(),
            });
        }
        Ok(Self { features, hosts })
    }

    pub fn features(&self) -> &FeatureTable {
        &self.features
    }

    pub fn hosts(&self) -> &HostList {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep the rows where `mask` is true, in both tables.
    pub fn retain(&self, mask: &[bool]) -> Self {
        debug_assert_eq!(mask.len(), self.len());
        Self {
            features: FeatureTable {
                rows: self.features.rows.select(mask),
            },
            hosts: self.hosts.select(mask),
        }
    }

    /// Contiguous row range of both tables.
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            features: FeatureTable {
                rows: self.features.rows.slice(range.clone()),
            },
            hosts: self.hosts.slice(range),
        }
    }

    /// Recompute the per-host row counts from the rows currently present.
    pub fn recount(self) -> Self {
        Self {
            hosts: self.hosts.recount(),
            ..self
        }
    }
}

/// Locate the host address column and lift it into a [`HostList`].
///
/// Labeled tables are searched for [`HOST_ALIASES`] in order; positional
/// tables carry the host as the eighth column.
pub fn extract_hosts(raw: &RawTable) -> Result<(usize, HostList)> {
    let column = match &raw.labels {
        Some(labels) => {
            let labels: Vec<String> = labels.iter().map(|l| normalize_label(l)).collect();
            HOST_ALIASES
                .iter()
                .find_map(|alias| labels.iter().position(|l| l == alias))
        }
        None => (raw.num_columns() > POSITIONAL_HOST_COLUMN).then_some(POSITIONAL_HOST_COLUMN),
    }
    .ok_or_else(|| BotscanError::MissingHostColumn {
        tried: HOST_ALIASES.iter().map(|s| s.to_string()).collect(),
    })?;

    let addresses = (0..raw.num_rows())
        .map(|row| raw.cell(row, column).to_text())
        .collect();
    tracing::debug!(column, as_key = HOST_KEY, "extracted host column");
    Ok((column, HostList::new(addresses)))
}

/// Resolve the seven canonical columns and read them out of `raw`.
///
/// `host_column` has already been lifted out by [`extract_hosts`] and is not
/// considered a feature column.
pub fn normalize(raw: &RawTable, host_column: usize) -> Result<Vec<CanonicalFlow>> {
    let positions = resolve_columns(raw, host_column)?;

    (0..raw.num_rows())
        .map(|row| -> Result<CanonicalFlow> {
            let text = |slot: usize| raw.cell(row, positions[slot]).to_text();
            let number = |slot: usize| numeric_cell(raw.cell(row, positions[slot]), slot, row);
            Ok(CanonicalFlow {
                proto: text(0),
                dport: text(1),
                sport: text(2),
                state: text(3),
                dur: number(4)?,
                totbytes: number(5)?,
                srcbytes: number(6)?,
            })
        })
        .collect()
}

fn resolve_columns(raw: &RawTable, host_column: usize) -> Result<[usize; NUM_FLOW_COLUMNS]> {
    let Some(labels) = &raw.labels else {
        let feature_columns: Vec<usize> = (0..raw.num_columns())
            .filter(|&c| c != host_column)
            .collect();
        return feature_columns
            .try_into()
            .map_err(|cols: Vec<usize>| BotscanError::ColumnCount {
                found: cols.len(),
                expected: NUM_FLOW_COLUMNS,
            });
    };

    let labels: Vec<String> = labels.iter().map(|l| normalize_label(l)).collect();
    let mut positions = [0usize; NUM_FLOW_COLUMNS];
    let mut missing = Vec::new();

    for (slot, aliases) in COLUMN_ALIASES.iter().enumerate() {
        let found = aliases
            .iter()
            .find_map(|alias| labels.iter().position(|l| l == alias));
        match found {
            Some(pos) => positions[slot] = pos,
            None => missing.push(aliases[0].to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(BotscanError::MissingColumn { missing });
    }
    Ok(positions)
}

fn numeric_cell(value: &Value, slot: usize, row: usize) -> Result<f64> {
    value.as_f64().ok_or_else(|| BotscanError::InvalidValue {
        column: COLUMN_ALIASES[slot][0].to_string(),
        row,
        value: value.to_text(),
    })
}

/// Append bits per second, `round(totbytes * 8 / dur)`, to every flow.
///
/// Ties round to even.
pub fn derive_features(flows: Vec<CanonicalFlow>) -> Result<FeatureTable> {
    let rows = flows
        .into_iter()
        .enumerate()
        .map(|(row, flow)| -> Result<FeatureRow> {
            let bps = bits_per_second(&flow, row)?;
            Ok(FeatureRow { flow, bps })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(FeatureTable::new(rows))
}

fn bits_per_second(flow: &CanonicalFlow, row: usize) -> Result<u64> {
    if flow.dur == 0.0 {
        return Err(BotscanError::DerivedFeature {
            row,
            reason: "duration is zero".into(),
        });
    }
    let bps = (flow.totbytes * 8.0 / flow.dur).round_ties_even();
    if !bps.is_finite() || bps < 0.0 {
        return Err(BotscanError::DerivedFeature {
            row,
            reason: format!(
                "{bps} is not a valid rate (totbytes {}, dur {})",
                flow.totbytes, flow.dur
            ),
        });
    }
    Ok(bps as u64)
}
