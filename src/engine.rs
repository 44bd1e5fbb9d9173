//! Import run orchestration.
//!
//! One [`Engine`] run processes one file start to finish, single-threaded:
//! load the raw bytes into lines or a grid, run the four section extractors
//! against the bank configuration's rules, and (for [`Engine::import`])
//! group everything by settlement number. The configuration snapshot is
//! read-only for the duration of the run.

use crate::assembler::assemble;
use crate::config::BankConfig;
use crate::error::Result;
use crate::loader::LoadedSource;
use crate::settlement_header::extract_settlement_headers;
use crate::tax_trailer::extract_tax_trailers;
use crate::trade_header::extract_trade_header;
use crate::transaction_detail::extract_transaction_details;
use crate::types::{Extraction, ImportResult};
use crate::SourceType;

/// The extraction engine for one bank configuration.
pub struct Engine<'a> {
    config: &'a BankConfig,
}

impl<'a> Engine<'a> {
    pub fn new(config: &'a BankConfig) -> Self {
        Engine { config }
    }

    /// Run the four section extractors over one file.
    ///
    /// Returns the flat extraction: trade header record, settlement header
    /// records, transaction records and tax trailer totals, all in source
    /// order. Either the full result is produced or nothing is.
    ///
    /// # Arguments
    ///
    /// * `bytes` - The raw file content (already base64-decoded upstream)
    /// * `filename` - Declared filename, injected into the trade header
    /// * `source_type` - Declared source encoding
    pub fn process(
        &self,
        bytes: &[u8],
        filename: &str,
        source_type: SourceType,
    ) -> Result<Extraction> {
        let source = LoadedSource::load(bytes, source_type)?;

        let trade_header = extract_trade_header(
            &source,
            self.config.trade_header_for(source_type)?,
            filename,
        )?;
        let settlements =
            extract_settlement_headers(&source, self.config.settlement_header_for(source_type)?)?;
        let transactions = extract_transaction_details(
            &source,
            self.config.transaction_detail_for(source_type)?,
        )?;
        let trailers =
            extract_tax_trailers(&source, self.config.settlement_tax_for(source_type)?)?;

        Ok(Extraction {
            trade_header,
            settlements,
            transactions,
            trailers,
        })
    }

    /// Run a full import: extraction plus grouping by settlement number.
    pub fn import(
        &self,
        bytes: &[u8],
        filename: &str,
        source_type: SourceType,
    ) -> Result<ImportResult> {
        assemble(self.process(bytes, filename, source_type)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_missing_section_config_is_fatal() {
        let config = BankConfig {
            name: "ACME".into(),
            trade_header: vec![],
            settlement_header: vec![],
            transaction_detail: vec![],
            settlement_tax: vec![],
        };
        let engine = Engine::new(&config);

        let err = engine
            .process(b"1HEADER\n", "stmt.txt", SourceType::Txt)
            .unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("trade header"));
    }

    #[test]
    fn test_empty_content_is_data_error() {
        let config = BankConfig {
            name: "ACME".into(),
            trade_header: vec![],
            settlement_header: vec![],
            transaction_detail: vec![],
            settlement_tax: vec![],
        };
        let engine = Engine::new(&config);

        let err = engine.process(b"", "stmt.txt", SourceType::Txt).unwrap_err();
        assert!(matches!(err, Error::EmptyFile));
        assert!(err.is_data_error());
    }
}
