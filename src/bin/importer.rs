//! External Statement Importer - CLI tool for running a configured
//! extraction over one settlement file.

use clap::Parser;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

use external_statement::config::BankConfig;
use external_statement::engine::Engine;
use external_statement::{Result, SourceType};

#[derive(Parser)]
#[command(name = "extstmt_import")]
#[command(
    about = "Extract settlements, transactions and tax trailers from a bank statement file",
    long_about = None
)]
struct Cli {
    /// Statement file to import
    #[arg(short, long)]
    input: String,

    /// Bank configuration JSON file
    #[arg(short, long)]
    config: String,

    /// Source type (txt, csv, xls, xlsx); inferred from the input
    /// extension when omitted
    #[arg(long = "source-type")]
    source_type: Option<String>,

    /// Output file path (or stdout if not provided)
    #[arg(short, long)]
    output: Option<String>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_text = fs::read_to_string(&cli.config)?;
    let config: BankConfig = serde_json::from_str(&config_text)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let source_type = match cli.source_type {
        Some(ref s) => SourceType::from_str(s)?,
        None => infer_source_type(&cli.input)?,
    };

    let filename = Path::new(&cli.input)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.input.clone());
    let bytes = fs::read(&cli.input)?;

    let engine = Engine::new(&config);
    let result = engine.import(&bytes, &filename, source_type)?;

    let json = serde_json::to_string_pretty(&result)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    match cli.output {
        Some(ref path) => fs::write(path, json)?,
        None => {
            let mut stdout = io::stdout();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }

    Ok(())
}

fn infer_source_type(input: &str) -> Result<SourceType> {
    let extension = Path::new(input)
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    SourceType::from_str(&extension)
}
