//! Common result types shared across the extraction pipeline.
//!
//! Destination field names are chosen at configuration time, so extracted
//! records are dynamic string-keyed mappings rather than static structs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One extracted record: destination field name → raw extracted value.
pub type Record = BTreeMap<String, String>;

/// Destination field carrying the settlement (liquidation) join key.
pub const SETTLEMENT_NUMBER_FIELD: &str = "settlement_number";

/// Destination field the original filename is injected under.
pub const FILENAME_FIELD: &str = "filename_external_statement";

/// Destination field holding a transaction's amount, locale-normalized by
/// the transaction extractor.
pub const TOTAL_FIELD: &str = "total";

/// One aggregated tax amount attached to a settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxTotal {
    /// Settlement the tax belongs to.
    pub settlement_number: String,

    /// Name of the tax rule that produced this total.
    pub tax_rule: String,

    /// Sum of the rule's decoded sub-line amounts.
    pub total: Decimal,
}

/// The flat, run-scoped output of the four section extractors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Extraction {
    /// The single trade header record (filename always present).
    pub trade_header: Record,

    /// Settlement header records in source order.
    pub settlements: Vec<Record>,

    /// Transaction detail records in source order, each carrying its
    /// settlement-number key.
    pub transactions: Vec<Record>,

    /// Tax trailer totals in source order.
    pub trailers: Vec<TaxTotal>,
}

/// One settlement with its grouped children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementGroup {
    /// The settlement-number join key.
    pub settlement_number: String,

    /// The settlement header record.
    pub header: Record,

    /// Transaction details grouped under this settlement.
    pub transactions: Vec<Record>,

    /// Tax trailer totals grouped under this settlement.
    pub trailers: Vec<TaxTotal>,
}

/// The assembled import result handed to downstream persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    /// The trade header record.
    pub trade_header: Record,

    /// Settlements in source order, each with its grouped children.
    pub settlements: Vec<SettlementGroup>,

    /// Transactions whose settlement number matched no settlement header.
    /// Downstream must reject the import when any are present.
    pub orphan_transactions: Vec<Record>,

    /// Trailer totals whose settlement number matched no settlement header.
    pub orphan_trailers: Vec<TaxTotal>,
}

impl ImportResult {
    /// Whether any transaction or trailer failed to match a settlement.
    pub fn has_orphans(&self) -> bool {
        !self.orphan_transactions.is_empty() || !self.orphan_trailers.is_empty()
    }
}
