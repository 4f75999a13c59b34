//! Stat Studio CLI Module
//!
//! Command-line interface for serving the API and running analyses locally.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::analysis::{run_analysis, AnalysisFamily};
use crate::preprocessing::{stages, Table};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn line_box_empty() { line_box(""); }

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "stat-studio")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Statistical analysis and model serving API")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Server host
        #[arg(long, env = "API_HOST")]
        host: Option<String>,

        /// Server port
        #[arg(short, long, env = "API_PORT")]
        port: Option<u16>,

        /// Maximum number of stored models (oldest evicted first)
        #[arg(long, env = "REGISTRY_CAPACITY")]
        registry_capacity: Option<usize>,
    },

    /// Run one analysis on a local file and print the result
    Analyze {
        /// Input data file (CSV or JSON)
        #[arg(short, long)]
        data: PathBuf,

        /// Analysis family (regression, classification, discriminant,
        /// symptom-matching, time-series, clustering-advanced, neural-networks)
        #[arg(short, long)]
        family: String,

        /// Analysis config as inline JSON or a path to a JSON file
        #[arg(short, long, default_value = "{}")]
        config: String,
    },

    /// Show version and system information
    Info {
        /// Optional data file to describe
        #[arg(short, long)]
        data: Option<PathBuf>,
    },
}

// ─── Data loading ──────────────────────────────────────────────────────────────

pub fn load_data(path: &Path) -> anyhow::Result<DataFrame> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let df = match ext.as_str() {
        "csv" => CsvReadOptions::default()
            .with_infer_schema_length(Some(1000))
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
        "json" => JsonReader::new(std::fs::File::open(path)?)
            .finish()?,
        _ => anyhow::bail!("Unsupported file format: '{}' (use CSV or JSON)", ext),
    };

    Ok(df)
}

/// Load a data file into the raw row table the analyses run on
pub fn load_table(path: &Path) -> anyhow::Result<Table> {
    let df = load_data(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Table::from_dataframe(&df)?)
}

/// Inline JSON, or the contents of a JSON file when the argument names one
pub fn parse_config_arg(arg: &str) -> anyhow::Result<serde_json::Value> {
    let path = Path::new(arg);
    let text = if !arg.trim_start().starts_with('{') && path.is_file() {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        arg.to_string()
    };
    serde_json::from_str(&text).context("Config is not valid JSON")
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_analyze(data_path: &Path, family: &str, config: &str) -> anyhow::Result<()> {
    let family: AnalysisFamily = family.parse()?;
    let config = parse_config_arg(config)?;

    section(&format!("Analyze · {}", family));

    step_run("Loading data");
    let start = Instant::now();
    let table = load_table(data_path)?;
    step_done(&format!("{} rows × {} cols in {:?}", table.n_rows(), table.n_cols(), start.elapsed()));

    step_run(&format!("Running {}", family.to_string().cyan()));
    let start = Instant::now();
    let outcome = run_analysis(family, &table, &config)?;
    step_done(&format!("{:?}", start.elapsed()));

    if let Some(entry) = &outcome.entry {
        println!("  {:<16} {}", muted("Served model"), entry.method.white().bold());
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&outcome.results)?);
    Ok(())
}

pub fn cmd_info(data_path: Option<&Path>) -> anyhow::Result<()> {
    use sysinfo::System;

    section("Stat Studio");

    let mut sys = System::new_all();
    sys.refresh_all();

    println!("  {:<12} {}", muted("Version"), env!("CARGO_PKG_VERSION"));
    println!("  {:<12} {}", muted("CPUs"), sys.cpus().len());
    println!(
        "  {:<12} {:.1} / {:.1} GB",
        muted("Memory"),
        sys.used_memory() as f64 / 1024.0 / 1024.0 / 1024.0,
        sys.total_memory() as f64 / 1024.0 / 1024.0 / 1024.0
    );
    println!(
        "  {:<12} {}",
        muted("Families"),
        AnalysisFamily::ALL.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(", ")
    );

    if let Some(path) = data_path {
        section("Data Info");
        let table = load_table(path)?;

        println!("  {:<12} {}", muted("File"), path.display());
        println!("  {:<12} {}", muted("Rows"), table.n_rows());
        println!("  {:<12} {}", muted("Columns"), table.n_cols());
        println!();

        println!("  {:<20} {:<12} {:>6}", muted("Column"), muted("Kind"), muted("Nulls"));
        println!("  {}", dim(&"─".repeat(42)));

        for col in table.columns() {
            let nulls = col.values.iter().filter(|v| v.is_null()).count();
            println!(
                "  {:<20} {:<12} {:>6}",
                col.name,
                format!("{:?}", stages::classify(&col.values)).truecolor(140, 140, 140),
                nulls
            );
        }
    }

    println!();
    Ok(())
}

// ─── Serve ─────────────────────────────────────────────────────────────────────

pub async fn cmd_serve(
    host: Option<String>,
    port: Option<u16>,
    registry_capacity: Option<usize>,
) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    let mut config = ServerConfig::from_env();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(capacity) = registry_capacity.filter(|&n| n > 0) {
        config.registry_capacity = Some(capacity);
    }

    let capacity = config
        .registry_capacity
        .map_or_else(|| "unbounded".to_string(), |n| n.to_string());

    println!();
    line_box_top();
    line_box_empty();
    line_box_center(&format!("{}", "Stat Studio".white().bold()));
    line_box_center(&format!("{}", dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box(&kv("API     ", &format!("http://{}:{}/api", config.host, config.port)));
    line_box(&kv("Health  ", &format!("http://{}:{}/api/health", config.host, config.port)));
    line_box(&kv("Registry", &capacity));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box_center(&format!("{}", dim("ctrl+c to stop")));
    line_box_empty();
    line_box_bottom();
    println!();

    run_server(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_inline_config() {
        let config = parse_config_arg(r#"{"target": "y"}"#).unwrap();
        assert_eq!(config["target"], "y");
        assert!(parse_config_arg("{not json").is_err());
    }

    #[test]
    fn test_parse_config_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"methods": ["linear"]}}"#).unwrap();
        let config = parse_config_arg(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config["methods"][0], "linear");
    }

    #[test]
    fn test_load_csv_table() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "size,city,price").unwrap();
        writeln!(file, "10,north,35").unwrap();
        writeln!(file, "20,south,65").unwrap();
        file.flush().unwrap();

        let table = load_table(file.path()).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column_names(), vec!["size", "city", "price"]);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        assert!(load_data(file.path()).is_err());
    }
}
