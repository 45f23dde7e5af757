// ============================================================================
// nhanes-data — CLI for downloading and converting NHANES data files
// ============================================================================
// Usage:
//   nhanes-data download --cycle 2017-2018 --modules DEMO,EXAM,LAB,QUEST
//   nhanes-data convert ./data/DEMO_J.xpt [--out-dir DIR]
//   nhanes-data check [--data-dir ./data]
//   nhanes-data cycles
// ============================================================================

mod download;
mod xpt;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use download::DownloadOutcome;

/// NHANES data download and conversion tool
#[derive(Parser)]
#[command(name = "nhanes-data", version, about = "Download NHANES .XPT files and convert them to CSV")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a cycle's modules and convert them to CSV
    Download {
        /// NHANES cycle, e.g. 2017-2018
        #[arg(long)]
        cycle: String,

        /// Modules to fetch (DEMO, EXAM, LAB, QUEST, DIET)
        #[arg(long, value_delimiter = ',', default_value = "DEMO,EXAM,LAB,QUEST")]
        modules: Vec<String>,

        /// Output directory for .xpt and .csv files
        #[arg(long, default_value = "./data")]
        out: PathBuf,
    },

    /// Convert an already-downloaded .XPT file to CSV
    Convert {
        /// Path to the .XPT file
        file: PathBuf,

        /// Output directory (default: next to the input file)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Sanity-check converted CSV files (row counts, SEQN join key)
    Check {
        /// Directory holding the converted CSVs
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },

    /// List supported cycles and modules
    Cycles,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Download { cycle, modules, out } => cmd_download(&cycle, &modules, &out).await,
        Commands::Convert { file, out_dir } => cmd_convert(&file, out_dir.as_deref()),
        Commands::Check { data_dir } => cmd_check(&data_dir),
        Commands::Cycles => cmd_cycles(),
    }
}

async fn cmd_download(cycle: &str, modules: &[String], out: &std::path::Path) -> Result<()> {
    if download::cycle_letter(cycle).is_none() {
        let valid: Vec<&str> = download::CYCLES.iter().map(|(name, _)| *name).collect();
        bail!("Unknown cycle '{}'. Valid cycles: {}", cycle, valid.join(", "));
    }
    let modules: Vec<String> = modules.iter().map(|m| m.to_uppercase()).collect();
    for module in &modules {
        if !download::is_known_module(module) {
            let valid: Vec<&str> = download::MODULES.iter().map(|(name, _)| *name).collect();
            bail!("Unknown module '{}'. Valid modules: {}", module, valid.join(", "));
        }
    }

    println!("=== NHANES Download: cycle {} ===", cycle);
    println!();

    let client = reqwest::Client::new();
    let mut converted = Vec::new();
    let mut failed = Vec::new();

    for module in &modules {
        let file_name = download::xpt_file_name(module, cycle).expect("cycle validated above");
        let csv_name = file_name.replace(".xpt", ".csv");
        println!("-- {} ({})", module, download::module_name(module));

        if out.join(&csv_name).exists() {
            println!("   {} already exists, skipping", csv_name);
            converted.push(csv_name);
            println!();
            continue;
        }

        let xpt_path = match download::download_module(&client, module, cycle, out).await {
            Ok(DownloadOutcome::AlreadyPresent(path)) => {
                println!("   {} already downloaded", file_name);
                path
            }
            Ok(DownloadOutcome::Downloaded(path)) => {
                let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                println!("   downloaded {} ({:.2} MB)", file_name, size as f64 / (1024.0 * 1024.0));
                path
            }
            Err(e) => {
                println!("   download failed: {}", e);
                println!();
                println!("{}", download::manual_instructions(module, cycle, out));
                println!();
                failed.push(module.clone());
                continue;
            }
        };

        match xpt::convert_file(&xpt_path, None) {
            Ok(report) => {
                println!(
                    "   converted to {} ({} rows, {} columns)",
                    report.csv_path.display(),
                    report.rows,
                    report.columns
                );
                converted.push(csv_name);
            }
            Err(e) => {
                println!("   conversion failed: {}", e);
                failed.push(module.clone());
            }
        }
        println!();
    }

    println!("=== Summary: cycle {} ===", cycle);
    println!("Converted: {}", converted.len());
    for name in &converted {
        println!("  + {}", name);
    }
    if !failed.is_empty() {
        println!("Needs manual download: {}", failed.len());
        for module in &failed {
            println!("  - {}", module);
        }
        bail!("{} module(s) could not be fetched", failed.len());
    }
    Ok(())
}

fn cmd_convert(file: &std::path::Path, out_dir: Option<&std::path::Path>) -> Result<()> {
    if !file.exists() {
        bail!("File not found: {}", file.display());
    }

    let report = xpt::convert_file(file, out_dir)?;
    println!(
        "Converted {} -> {} ({} rows, {} columns)",
        file.display(),
        report.csv_path.display(),
        report.rows,
        report.columns
    );
    Ok(())
}

fn cmd_check(data_dir: &std::path::Path) -> Result<()> {
    let mut csv_files: Vec<PathBuf> = std::fs::read_dir(data_dir)
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", data_dir.display(), e))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();
    csv_files.sort();

    if csv_files.is_empty() {
        println!("No CSV files found in {}", data_dir.display());
        println!();
        println!("Next steps:");
        println!("  1. Download .XPT files:   nhanes-data download --cycle 2017-2018");
        println!("  2. Or convert local ones: nhanes-data convert ./data/DEMO_J.xpt");
        bail!("nothing to check");
    }

    println!("=== Checking {} CSV file(s) in {} ===", csv_files.len(), data_dir.display());
    println!();

    let mut problems = 0;
    for path in &csv_files {
        match check_csv(path) {
            Ok((rows, columns, has_seqn)) => {
                println!("{}", path.file_name().unwrap_or_default().to_string_lossy());
                println!("   rows: {}, columns: {}", rows, columns);
                if has_seqn {
                    println!("   SEQN join key present");
                } else {
                    println!("   WARNING: SEQN column missing (tables cannot be joined)");
                    problems += 1;
                }
            }
            Err(e) => {
                println!("{}: ERROR: {}", path.display(), e);
                problems += 1;
            }
        }
        println!();
    }

    if problems > 0 {
        bail!("{} file(s) reported problems", problems);
    }
    println!("All files look usable.");
    Ok(())
}

fn check_csv(path: &std::path::Path) -> Result<(usize, usize, bool)> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let has_seqn = headers.iter().any(|h| h == "SEQN");

    let mut rows = 0;
    for record in reader.records() {
        record?;
        rows += 1;
    }
    Ok((rows, headers.len(), has_seqn))
}

fn cmd_cycles() -> Result<()> {
    println!("Supported cycles:");
    for (cycle, letter) in download::CYCLES {
        println!("  {}  (file letter {})", cycle, letter);
    }
    println!();
    println!("Modules:");
    for (module, description) in download::MODULES {
        println!("  {:6} {}", module, description);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_csv_with_seqn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DEMO_J.csv");
        std::fs::write(&path, "SEQN,RIDAGEYR\n93703,45\n93704,60\n").unwrap();

        let (rows, columns, has_seqn) = check_csv(&path).unwrap();
        assert_eq!(rows, 2);
        assert_eq!(columns, 2);
        assert!(has_seqn);
    }

    #[test]
    fn test_check_csv_without_seqn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.csv");
        std::fs::write(&path, "A,B\n1,2\n").unwrap();

        let (_, _, has_seqn) = check_csv(&path).unwrap();
        assert!(!has_seqn);
    }
}
