//! botscan CLI - finds botnet-infected hosts in captured flow records.
//!
//! Usage:
//!   botscan flows.csv --model model.json
//!   botscan flows.csv infected.csv --model model.json --min-count 10 --ip 147.32.84.0/24
//!   botscan flows.json --type json --model model.json --batchify 10 % --jobs 4

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use botscan_core::batch::{BatchSpec, BatchUnit};
use botscan_core::features::FlowFrame;
use botscan_core::inference::Jobs;
use botscan_core::ip::IpEntity;
use botscan_core::model::LinearModel;
use botscan_core::report::{print_results, save_csv, OutputFormat, Verdict};
use botscan_core::scan::{run_scan, RunConfig, ScanProgress};
use botscan_core::source::{load_table, InputFormat};

/// Hosts printed to the console before asking for confirmation.
const CONSOLE_LIMIT: usize = 50;

#[derive(Parser)]
#[command(name = "botscan")]
#[command(about = "Find hosts infected with botnet malware from network flow records")]
struct Cli {
    /// Flow records to classify
    input_file: PathBuf,

    /// Save infected hosts to this CSV file instead of printing them
    output_file: Option<PathBuf>,

    /// Path to the JSON model file
    #[arg(short = 'M', long)]
    model: PathBuf,

    /// Input file type
    #[arg(short = 't', long = "type", default_value = "csv")]
    input_type: InputFormat,

    /// Input CSV has no header row; columns are taken by position
    #[arg(long)]
    no_header: bool,

    /// Parallel jobs for scoring. Negative values use every core
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    jobs: i64,

    /// Skip hosts with this many flows or fewer
    #[arg(short = 'c', long, default_value_t = 0)]
    min_count: usize,

    /// Address, network, or file with one of either per line. Repeatable
    #[arg(short = 'r', long = "range", visible_alias = "ip")]
    ranges: Vec<String>,

    /// Treat unparsable host addresses as outside every range
    #[arg(long)]
    ignore_invalid: bool,

    /// Split scoring into batches: AMOUNT followed by '%' or 'batches'
    #[arg(
        short,
        long,
        num_args = 2,
        value_names = ["AMOUNT", "UNIT"],
        allow_negative_numbers = true
    )]
    batchify: Option<Vec<String>>,

    /// Console output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Print every host without asking, however many there are
    #[arg(short = 'y', long, visible_alias = "confirm")]
    yes: bool,

    /// More detailed logging
    #[arg(short, long, conflicts_with = "silent")]
    verbose: bool,

    /// Debug logging
    #[arg(short, long, conflicts_with = "silent")]
    debug: bool,

    /// No console output apart from errors
    #[arg(short, long)]
    silent: bool,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        if self.silent {
            "error"
        } else if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }

    fn run_config(&self) -> Result<RunConfig> {
        let batch = match self.batchify.as_deref() {
            Some([amount, unit]) => {
                let amount: f64 = amount
                    .parse()
                    .with_context(|| format!("invalid batch amount: {amount}"))?;
                Some(BatchSpec::new(amount, unit.parse::<BatchUnit>()?)?)
            }
            Some(other) => bail!("--batchify takes AMOUNT and UNIT, got {other:?}"),
            None => None,
        };

        Ok(RunConfig {
            min_count: self.min_count,
            ranges: parse_ranges(&self.ranges)?,
            ignore_invalid: self.ignore_invalid,
            batch,
            jobs: Jobs::from_count(self.jobs)?,
        })
    }
}

/// Each token is an address or network, or else a readable file listing them.
fn parse_ranges(tokens: &[String]) -> Result<Vec<IpEntity>> {
    let mut ranges = Vec::new();
    for token in tokens {
        match token.parse::<IpEntity>() {
            Ok(entity) => ranges.push(entity),
            Err(err) => {
                let path = Path::new(token);
                if !path.is_file() {
                    bail!("{err} (and is not a readable file)");
                }
                ranges.extend(read_ranges_file(path)?);
            }
        }
    }
    Ok(ranges)
}

fn read_ranges_file(path: &Path) -> Result<Vec<IpEntity>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read address list {}", path.display()))?;
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<IpEntity>()
                .with_context(|| format!("in address list {}", path.display()))
        })
        .collect()
}

/// Ask before flooding the console; on "no", offer to save to a file instead.
fn confirm_console(count: usize) -> Result<Option<PathBuf>> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();

    eprint!(
        "More than {CONSOLE_LIMIT} hosts ({count}) have been identified as malicious. \
         Should they still be printed to the console? [y/N] "
    );
    io::stderr().flush()?;
    input.read_line(&mut line)?;
    if matches!(line.trim().to_lowercase().as_str(), "y" | "yes") {
        return Ok(None);
    }

    line.clear();
    eprint!("Input a path to the desired output location [output.csv]: ");
    io::stderr().flush()?;
    input.read_line(&mut line)?;
    let path = match line.trim() {
        "" => PathBuf::from("output.csv"),
        p => PathBuf::from(p),
    };
    Ok(Some(path))
}

fn emit(cli: &Cli, verdicts: &[Verdict]) -> Result<()> {
    if let Some(path) = &cli.output_file {
        save_csv(path, verdicts)?;
        if !cli.silent {
            eprintln!("[*] Saved {} hosts to {}", verdicts.len(), path.display());
        }
        return Ok(());
    }

    if cli.silent {
        return Ok(());
    }

    if verdicts.len() > CONSOLE_LIMIT && !cli.yes && cli.format == OutputFormat::Text {
        if let Some(path) = confirm_console(verdicts.len())? {
            save_csv(&path, verdicts)?;
            eprintln!("[*] Saved {} hosts to {}", verdicts.len(), path.display());
            return Ok(());
        }
    }

    print_results(verdicts, cli.format)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .with_writer(io::stderr)
        .init();

    let config = cli.run_config()?;
    if !cli.silent && !config.ranges.is_empty() {
        let ranges: Vec<String> = config.ranges.iter().map(ToString::to_string).collect();
        eprintln!("[*] Restricting to {}", ranges.join(", "));
    }

    if !cli.silent {
        eprintln!("[*] Loading model from {}...", cli.model.display());
    }
    let mut model = LinearModel::load(&cli.model)?;

    if !cli.silent {
        eprintln!("[*] Loading flows from {}...", cli.input_file.display());
    }
    let table = load_table(&cli.input_file, cli.input_type, !cli.no_header)?;
    let frame = FlowFrame::from_raw(&table)?;

    let progress = ScanProgress::new();
    if !cli.silent {
        eprintln!("[*] Predicting...");
    }
    let verdicts = run_scan(&frame, &mut model, &config, &progress)?;

    if !cli.silent {
        eprintln!(
            "[*] Scored {} flows in {} batch(es)",
            progress.scored_rows.load(Ordering::Relaxed),
            progress.batches.load(Ordering::Relaxed)
        );
    }

    emit(&cli, &verdicts)
}
