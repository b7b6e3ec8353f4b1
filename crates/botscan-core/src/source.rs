//! In-memory tabular input and the CSV / JSON readers that materialize it.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// A single cell of an input table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Parse a raw text cell the way a CSV reader would infer its type.
    pub fn infer(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.is_empty() {
            Value::Null
        } else if let Ok(i) = cell.parse::<i64>() {
            Value::Int(i)
        } else if let Ok(f) = cell.parse::<f64>() {
            Value::Float(f)
        } else {
            Value::Text(cell.to_string())
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }

    /// Render as text. Integral floats lose their fraction so that a port read
    /// as `80.0` becomes the same category as one read as `80`.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

/// A fully materialized 2-D table, with or without column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// `None` means the table is purely positional.
    pub labels: Option<Vec<String>>,
    pub rows: Vec<Vec<Value>>,
}

impl RawTable {
    pub fn labeled(labels: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            labels: Some(labels),
            rows,
        }
    }

    pub fn positional(rows: Vec<Vec<Value>>) -> Self {
        Self { labels: None, rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        match &self.labels {
            Some(labels) => labels.len(),
            None => self.rows.first().map_or(0, Vec::len),
        }
    }

    /// Cell at (`row`, `col`); short rows read as null.
    pub fn cell(&self, row: usize, col: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&NULL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Json,
}

impl std::str::FromStr for InputFormat {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(InputFormat::Csv),
            "json" => Ok(InputFormat::Json),
            _ => Err(format!("Unknown input type: {s}. Use 'csv' or 'json'.")),
        }
    }
}

/// Load a table from `path`. `has_header` only applies to CSV input.
pub fn load_table(path: &Path, format: InputFormat, has_header: bool) -> Result<RawTable> {
    let table = match format {
        InputFormat::Csv => read_csv(path, has_header),
        InputFormat::Json => read_json(path),
    }
    .with_context(|| format!("failed to read input table {}", path.display()))?;

    tracing::debug!(
        path = %path.display(),
        rows = table.num_rows(),
        columns = table.num_columns(),
        "loaded input table"
    );
    Ok(table)
}

fn read_csv(path: &Path, has_header: bool) -> Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .from_path(path)?;

    let labels = if has_header {
        Some(rdr.headers()?.iter().map(str::to_string).collect())
    } else {
        None
    };

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(record.iter().map(Value::infer).collect());
    }

    Ok(RawTable { labels, rows })
}

/// Accepts an array of objects (labeled) or an array of arrays (positional).
fn read_json(path: &Path) -> Result<RawTable> {
    let data = fs::read_to_string(path)?;
    let records: Vec<serde_json::Value> = serde_json::from_str(&data)?;

    let Some(first) = records.first() else {
        return Ok(RawTable::positional(Vec::new()));
    };

    match first {
        serde_json::Value::Object(obj) => {
            let labels: Vec<String> = obj.keys().cloned().collect();
            let mut rows = Vec::with_capacity(records.len());
            for (i, record) in records.iter().enumerate() {
                let serde_json::Value::Object(obj) = record else {
                    bail!("record {i} is not an object");
                };
                let row = labels
                    .iter()
                    .map(|label| obj.get(label).map_or(Value::Null, json_cell))
                    .collect();
                rows.push(row);
            }
            Ok(RawTable::labeled(labels, rows))
        }
        serde_json::Value::Array(_) => {
            let mut rows = Vec::with_capacity(records.len());
            for (i, record) in records.iter().enumerate() {
                let serde_json::Value::Array(cells) = record else {
                    bail!("record {i} is not an array");
                };
                rows.push(cells.iter().map(json_cell).collect());
            }
            Ok(RawTable::positional(rows))
        }
        other => bail!("unsupported JSON record: {other}"),
    }
}

/// Booleans become 0/1; nested arrays and objects are kept as their JSON text.
fn json_cell(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Int(i64::from(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map_or(Value::Null, Value::Float),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        nested => Value::Text(nested.to_string()),
    }
}
