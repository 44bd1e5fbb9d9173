//! External Settlement Statement Extraction Library
//!
//! A library for extracting structured settlement data from bank and
//! card-processor statement files whose physical layout varies per issuing
//! bank. Extraction is driven entirely by a declarative per-field mapping
//! configuration ([`config::BankConfig`]) -- adding support for a new bank
//! format is a configuration change, not a code change.
//!
//! # Supported Source Encodings
//!
//! - **txt**: fixed-width text lines
//! - **csv**: comma-separated values
//! - **xls** / **xlsx**: legacy and modern spreadsheets
//!
//! # Output Hierarchy
//!
//! One import run produces a fixed four-level hierarchy:
//! trade header → settlement headers → transaction details / tax trailers,
//! joined by the settlement (liquidation) number.
//!
//! # Examples
//!
//! ## Running a full import
//!
//! ```no_run
//! use external_statement::config::BankConfig;
//! use external_statement::engine::Engine;
//! use external_statement::SourceType;
//!
//! let config: BankConfig = serde_json::from_str(&std::fs::read_to_string("bank.json")?)?;
//! let bytes = std::fs::read("statement.txt")?;
//!
//! let engine = Engine::new(&config);
//! let result = engine.import(&bytes, "statement.txt", SourceType::Txt)?;
//! for settlement in &result.settlements {
//!     println!("{}: {} transactions", settlement.settlement_number, settlement.transactions.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod assembler;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod locator;
pub mod settlement_header;
pub mod tax_trailer;
pub mod trade_header;
pub mod transaction_detail;
pub mod types;

use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::{Extraction, ImportResult, Record, SettlementGroup, TaxTotal};

/// Supported statement source encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Fixed-width text lines
    Txt,
    /// Comma-separated values
    Csv,
    /// Legacy spreadsheet
    Xls,
    /// Modern spreadsheet
    Xlsx,
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "txt" | "text" => Ok(SourceType::Txt),
            "csv" => Ok(SourceType::Csv),
            "xls" => Ok(SourceType::Xls),
            "xlsx" => Ok(SourceType::Xlsx),
            _ => Err(Error::UnsupportedSource(s.to_string())),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl SourceType {
    /// Get file extension for this source type.
    pub fn extension(&self) -> &'static str {
        match self {
            SourceType::Txt => "txt",
            SourceType::Csv => "csv",
            SourceType::Xls => "xls",
            SourceType::Xlsx => "xlsx",
        }
    }

    /// Whether this source decodes to a tabular grid rather than raw lines.
    pub fn is_tabular(&self) -> bool {
        !matches!(self, SourceType::Txt)
    }
}
