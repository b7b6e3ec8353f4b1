//! Output formatting for host verdicts.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// Column headers used for text and CSV output.
pub const HEADERS: [&str; 3] = ["Host", "Mean Score", "Flow Count"];

/// A host classified as infected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub host: String,
    pub mean_score: f64,
    pub flow_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {s}. Use 'text', 'json' or 'csv'.")),
        }
    }
}

pub fn print_results(verdicts: &[Verdict], format: OutputFormat) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Text => write_text(&mut out, verdicts)?,
        OutputFormat::Json => write_json(&mut out, verdicts)?,
        OutputFormat::Csv => write_csv(&mut out, verdicts)?,
    }
    Ok(())
}

pub fn write_text<W: Write>(out: &mut W, verdicts: &[Verdict]) -> Result<()> {
    writeln!(out)?;
    if verdicts.is_empty() {
        writeln!(out, "No hosts were found to be infected.")?;
        return Ok(());
    }

    let host_width = verdicts
        .iter()
        .map(|v| v.host.len())
        .chain([HEADERS[0].len()])
        .max()
        .unwrap_or_default();
    let index_width = (verdicts.len() - 1).to_string().len();

    writeln!(
        out,
        "{:>iw$}  {:<hw$}  {:>10}  {:>10}",
        "",
        HEADERS[0],
        HEADERS[1],
        HEADERS[2],
        iw = index_width,
        hw = host_width
    )?;
    for (i, v) in verdicts.iter().enumerate() {
        writeln!(
            out,
            "{:>iw$}  {:<hw$}  {:>10.6}  {:>10}",
            i,
            v.host,
            v.mean_score,
            v.flow_count,
            iw = index_width,
            hw = host_width
        )?;
    }
    Ok(())
}

pub fn write_json<W: Write>(out: &mut W, verdicts: &[Verdict]) -> Result<()> {
    let output = serde_json::json!({
        "infected": verdicts,
        "summary": {
            "infected_hosts": verdicts.len(),
            "flows": verdicts.iter().map(|v| v.flow_count).sum::<usize>(),
        }
    });
    writeln!(out, "{}", serde_json::to_string_pretty(&output)?)?;
    Ok(())
}

pub fn write_csv<W: Write>(out: W, verdicts: &[Verdict]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(HEADERS)?;
    for v in verdicts {
        wtr.write_record([v.host.clone(), v.mean_score.to_string(), v.flow_count.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Save verdicts as CSV at `path`.
pub fn save_csv(path: &Path, verdicts: &[Verdict]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create output file {}", path.display()))?;
    write_csv(file, verdicts)
        .with_context(|| format!("failed to write output file {}", path.display()))
}
