// loglens CLI - local development helpers for the log pipeline

mod simulate;

use clap::{Parser, Subcommand};
use loglens_core::parser::HeaderParser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "loglens")]
#[command(version = "0.1.0")]
#[command(about = "Development helpers for the loglens pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate application_* log directories for the tailer to pick up
    Simulate {
        /// Root directory (the tailer's LOGLENS_LOG_DIR)
        #[arg(short, long, default_value = "./logs")]
        out: PathBuf,

        /// Number of application directories
        #[arg(short, long, default_value = "3")]
        applications: usize,

        /// Log files per application
        #[arg(short, long, default_value = "2")]
        files: usize,

        /// Entries per file
        #[arg(short, long, default_value = "200")]
        entries: usize,

        /// Error rate percentage (0-100)
        #[arg(long, default_value = "10")]
        error_rate: u8,

        /// Append to existing files instead of truncating
        #[arg(long)]
        append: bool,
    },

    /// Parse a log file and report how it stitches into entries
    Check {
        /// Path to a .log file
        file: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            out,
            applications,
            files,
            entries,
            error_rate,
            append,
        } => {
            simulate::run(&out, applications, files, entries, error_rate, append)?;
        }
        Commands::Check { file } => {
            check(&file)?;
        }
    }

    Ok(())
}

fn check(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let parser = HeaderParser::new();
    let content = fs::read_to_string(path)?;

    let mut headers = 0usize;
    let mut continuations = 0usize;
    let mut orphans = 0usize;
    let mut seen_header = false;

    for line in content.lines() {
        match parser.parse_header(line) {
            Some(_) => {
                headers += 1;
                seen_header = true;
            }
            None if seen_header => continuations += 1,
            None => orphans += 1,
        }
    }

    println!("file: {}", path.display());
    println!("entries (header lines):   {}", headers);
    println!("continuation lines:       {}", continuations);
    println!("orphan leading lines:     {}", orphans);
    Ok(())
}
