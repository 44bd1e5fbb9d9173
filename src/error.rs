//! Error types for the external-statement extraction library.
//!
//! The engine distinguishes exactly two error families:
//!
//! - **Configuration errors**: the bank configuration is structurally
//!   incomplete or inconsistent for the requested source type. Always fatal,
//!   never retried; the message names the offending configuration object.
//! - **Data errors**: the file content does not satisfy the configuration's
//!   expectations. Fatal for the run; either the full result is produced or
//!   nothing is.

use std::io;
use thiserror::Error;

use crate::SourceType;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during loading, extraction, and assembly.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred during read or write operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error parsing CSV content.
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Error parsing spreadsheet content.
    #[error("spreadsheet parsing error: {0}")]
    Spreadsheet(String),

    /// File content is not valid UTF-8.
    #[error("file content is not valid UTF-8: {0}")]
    Encoding(String),

    /// Unsupported or unrecognized source type.
    #[error("unsupported source type: {0}")]
    UnsupportedSource(String),

    /// No section configuration exists for the requested source type.
    #[error("no {section} configuration found for source type \"{source_type}\"")]
    MissingSectionConfig {
        section: &'static str,
        source_type: SourceType,
    },

    /// A section configuration declares no field rules.
    #[error("no field rules found for {section} configuration \"{config}\"")]
    MissingFieldRules {
        section: &'static str,
        config: String,
    },

    /// A field rule is missing an attribute its locator strategy requires.
    #[error("field rule \"{rule}\" {message}")]
    IncompleteRule { rule: String, message: String },

    /// A search type requiring a liquidation-key rule has none.
    #[error(
        "configuration \"{config}\" requires a field rule flagged as the \
         liquidation number with a valid column"
    )]
    MissingLiquidationRule { config: String },

    /// The section's search type does not match the loaded source shape.
    #[error("search type of configuration \"{config}\" requires a {needs} source")]
    SourceShapeMismatch {
        config: String,
        needs: &'static str,
    },

    /// Empty file content supplied for the run.
    #[error("no file content was provided")]
    EmptyFile,

    /// The trade header extraction produced no fields.
    #[error("the file does not contain a valid trade header")]
    EmptyTradeHeader,

    /// No settlement headers were extracted from the file.
    #[error("no settlements were found in the file")]
    NoSettlements,

    /// A settlement header matched no transaction detail records.
    #[error("settlement \"{0}\" has no matching transactions")]
    SettlementWithoutTransactions(String),

    /// A record is missing its settlement-number join key.
    #[error("a {section} record is missing its settlement number")]
    MissingSettlementNumber { section: &'static str },

    /// A packed-decimal amount did not decode as digits.
    #[error("tax rule \"{rule}\" holds a malformed packed amount: \"{value}\"")]
    MalformedPackedAmount { rule: String, value: String },
}

impl From<calamine::Error> for Error {
    fn from(err: calamine::Error) -> Self {
        Error::Spreadsheet(err.to_string())
    }
}

impl Error {
    /// Whether this error means the bank configuration itself is broken.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedSource(_)
                | Error::MissingSectionConfig { .. }
                | Error::MissingFieldRules { .. }
                | Error::IncompleteRule { .. }
                | Error::MissingLiquidationRule { .. }
                | Error::SourceShapeMismatch { .. }
        )
    }

    /// Whether this error means the file content failed the configuration's
    /// expectations.
    pub fn is_data_error(&self) -> bool {
        !self.is_configuration_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_families() {
        let config_err = Error::MissingSectionConfig {
            section: "trade header",
            source_type: SourceType::Txt,
        };
        assert!(config_err.is_configuration_error());
        assert!(!config_err.is_data_error());

        let data_err = Error::SettlementWithoutTransactions("0001234".into());
        assert!(data_err.is_data_error());
        assert!(!data_err.is_configuration_error());
    }

    #[test]
    fn test_error_messages_name_offender() {
        let err = Error::IncompleteRule {
            rule: "operation_date".into(),
            message: "must declare a line number".into(),
        };
        assert!(err.to_string().contains("operation_date"));

        let err = Error::MissingSectionConfig {
            section: "settlement header",
            source_type: SourceType::Xlsx,
        };
        assert!(err.to_string().contains("xlsx"));
    }
}
