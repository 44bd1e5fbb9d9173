//! Bank configuration object graph.
//!
//! A [`BankConfig`] describes the physical layout of one external bank's
//! settlement files. It owns four ordered collections of section
//! configurations (trade header, settlement header, transaction detail,
//! settlement tax), one per source type in use. Each section configuration
//! owns the ordered field rules that drive extraction.
//!
//! Configurations are created and edited by administrators ahead of any
//! import (typically as JSON, hence the serde derives) and are read-only
//! inputs to the engine: nothing here is mutated during a run.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::SourceType;

/// Root configuration for one external bank's file layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankConfig {
    /// Bank name, used in diagnostics.
    pub name: String,

    /// Trade header section configurations, one per source type.
    #[serde(default)]
    pub trade_header: Vec<TradeHeaderConfig>,

    /// Settlement header section configurations.
    #[serde(default)]
    pub settlement_header: Vec<SettlementHeaderConfig>,

    /// Transaction detail section configurations.
    #[serde(default)]
    pub transaction_detail: Vec<TransactionDetailConfig>,

    /// Settlement tax (trailer) section configurations.
    #[serde(default)]
    pub settlement_tax: Vec<SettlementTaxConfig>,
}

impl BankConfig {
    /// Resolve the trade header configuration for a source type.
    ///
    /// Absence is a fatal configuration error, never a skip.
    pub fn trade_header_for(&self, source_type: SourceType) -> Result<&TradeHeaderConfig> {
        self.trade_header
            .iter()
            .find(|c| c.source_type == source_type)
            .ok_or(Error::MissingSectionConfig {
                section: "trade header",
                source_type,
            })
    }

    /// Resolve the settlement header configuration for a source type.
    pub fn settlement_header_for(
        &self,
        source_type: SourceType,
    ) -> Result<&SettlementHeaderConfig> {
        self.settlement_header
            .iter()
            .find(|c| c.source_type == source_type)
            .ok_or(Error::MissingSectionConfig {
                section: "settlement header",
                source_type,
            })
    }

    /// Resolve the transaction detail configuration for a source type.
    pub fn transaction_detail_for(
        &self,
        source_type: SourceType,
    ) -> Result<&TransactionDetailConfig> {
        self.transaction_detail
            .iter()
            .find(|c| c.source_type == source_type)
            .ok_or(Error::MissingSectionConfig {
                section: "transaction detail",
                source_type,
            })
    }

    /// Resolve the settlement tax configuration for a source type.
    pub fn settlement_tax_for(&self, source_type: SourceType) -> Result<&SettlementTaxConfig> {
        self.settlement_tax
            .iter()
            .find(|c| c.source_type == source_type)
            .ok_or(Error::MissingSectionConfig {
                section: "settlement tax",
                source_type,
            })
    }
}

/// Trade header section configuration.
///
/// The trade header has no search type of its own: each rule is resolved
/// from the attributes it declares (text prefix / line number vs row /
/// column).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeHeaderConfig {
    /// Display name used in diagnostics.
    #[serde(default)]
    pub name: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub rules: Vec<FieldRule>,
}

/// Settlement header section configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementHeaderConfig {
    #[serde(default)]
    pub name: String,
    pub source_type: SourceType,
    pub search_type: SettlementSearch,
    #[serde(default)]
    pub rules: Vec<FieldRule>,
}

/// Transaction detail section configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetailConfig {
    #[serde(default)]
    pub name: String,
    pub source_type: SourceType,
    pub search_type: TransactionSearch,
    #[serde(default)]
    pub rules: Vec<FieldRule>,
}

/// Settlement tax (trailer) section configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementTaxConfig {
    #[serde(default)]
    pub name: String,
    pub source_type: SourceType,
    pub search_type: TaxSearch,
    #[serde(default)]
    pub rules: Vec<TaxRule>,
}

/// Locator strategy for the settlement header section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementSearch {
    /// Text: one record per line matching a literal prefix.
    #[serde(rename = "txt_sw")]
    TxtStartWith,
    /// Text: one record assembled from absolute line numbers.
    #[serde(rename = "txt_ln")]
    TxtLineNumber,
    /// Tabular: one record from exact (row, column) lookups.
    #[serde(rename = "excel_rc")]
    ExcelRowCol,
    /// Tabular: keep rows whose liquidation column starts with a prefix.
    #[serde(rename = "excel_init_with")]
    ExcelInitWith,
    /// Tabular: keep rows whose liquidation column parses as a date.
    #[serde(rename = "excel_init_with_date")]
    ExcelInitWithDate,
}

/// Locator strategy for the transaction detail section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionSearch {
    /// Text: one record per line matching a literal prefix.
    #[serde(rename = "txt_sw")]
    TxtStartWith,
    /// Tabular: anchor liquidation value in a fixed cell, match rows on it.
    #[serde(rename = "excel_fixed_liquidation")]
    ExcelFixedLiquidation,
    /// Tabular: keep rows whose liquidation column parses as a date.
    #[serde(rename = "excel_init_with_date")]
    ExcelInitWithDate,
}

/// Locator strategy for the settlement tax section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxSearch {
    /// Text: per matching line, decode packed sub-line amounts.
    #[serde(rename = "txt_sw")]
    TxtStartWith,
    /// Tabular: read sub-line amounts from exact (row, column) cells.
    #[serde(rename = "excel_rc")]
    ExcelRowCol,
    /// Tabular: locate a label cell, read the amount offset from it.
    #[serde(rename = "excel_tax_name")]
    ExcelTaxName,
    /// Tabular: group rows by a base column and sum sub-line columns.
    #[serde(rename = "sum_col_row")]
    SumColRow,
}

/// The atomic extraction instruction: how to locate one destination field.
///
/// Which attributes are required depends on the owning section's search
/// type; the extractors raise a configuration error naming the rule when a
/// structurally required attribute is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Destination field name in the produced record.
    pub field: String,

    /// Literal line prefix to match (text sources).
    #[serde(default)]
    pub start_with: Option<String>,

    /// Absolute 1-based line number (text sources).
    #[serde(default)]
    pub line_number: Option<usize>,

    /// 0-based character slice start within the matched line.
    #[serde(default)]
    pub starting_position: usize,

    /// End-exclusive character slice end within the matched line.
    #[serde(default)]
    pub end_position: usize,

    /// 1-based row (tabular sources).
    #[serde(default)]
    pub row: Option<usize>,

    /// 1-based column (tabular sources).
    #[serde(default)]
    pub col: Option<usize>,

    /// Marks the field holding the settlement-number join key.
    #[serde(default)]
    pub is_liquidation_number: bool,

    /// How the liquidation key is matched (transaction detail only).
    #[serde(default)]
    pub liquidation_kind: Option<LiquidationKind>,

    /// Marks a field used to deduplicate repeated matched rows.
    #[serde(default)]
    pub group_by: bool,

    /// strftime-style format the source value is expected in.
    #[serde(default)]
    pub origin_date_format: Option<String>,

    /// strftime-style format the value is rewritten to.
    #[serde(default)]
    pub dest_date_format: Option<String>,
}

impl FieldRule {
    /// Both date formats declared, i.e. the field is date-reformatted.
    pub fn has_date_formats(&self) -> bool {
        self.origin_date_format.is_some() && self.dest_date_format.is_some()
    }

    pub(crate) fn incomplete(&self, message: &str) -> Error {
        Error::IncompleteRule {
            rule: self.field.clone(),
            message: message.to_string(),
        }
    }

    /// The rule's 1-based column, or a configuration error naming it.
    pub(crate) fn require_col(&self) -> Result<usize> {
        self.col
            .filter(|c| *c >= 1)
            .ok_or_else(|| self.incomplete("must declare a column"))
    }

    /// The rule's (row, column) pair, or a configuration error naming it.
    pub(crate) fn require_row_col(&self) -> Result<(usize, usize)> {
        match (self.row, self.col) {
            (Some(r), Some(c)) if r >= 1 && c >= 1 => Ok((r, c)),
            _ => Err(self.incomplete("must declare a row and a column")),
        }
    }

    /// The rule's line prefix, or a configuration error naming it.
    pub(crate) fn require_start_with(&self) -> Result<&str> {
        self.start_with
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| self.incomplete("must declare a line-start prefix"))
    }

    /// Both date formats, or a configuration error naming the rule.
    pub(crate) fn require_date_formats(&self) -> Result<(&str, &str)> {
        match (
            self.origin_date_format.as_deref(),
            self.dest_date_format.as_deref(),
        ) {
            (Some(o), Some(d)) => Ok((o, d)),
            _ => Err(self.incomplete("must declare origin and destination date formats")),
        }
    }
}

/// How a transaction-detail liquidation rule matches its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidationKind {
    /// The key repeats on every data row.
    Row,
    /// The key lives in one fixed anchor cell for the whole sheet.
    Fixed,
}

/// Whether a tax rule carries base record fields or a summable tax amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxRuleKind {
    /// Contributes plain fields (settlement number, dates) to the record.
    Base,
    /// Owns sub-lines whose decoded amounts are summed into one total.
    Tax,
}

/// One tax or base rule within a settlement tax configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRule {
    /// Tax identifier, carried on the emitted trailer triples.
    pub name: String,

    pub kind: TaxRuleKind,

    /// Destination field name (base rules).
    #[serde(default)]
    pub field: Option<String>,

    #[serde(default)]
    pub start_with: Option<String>,

    #[serde(default)]
    pub starting_position: usize,

    #[serde(default)]
    pub end_position: usize,

    #[serde(default)]
    pub row: Option<usize>,

    #[serde(default)]
    pub col: Option<usize>,

    #[serde(default)]
    pub origin_date_format: Option<String>,

    #[serde(default)]
    pub dest_date_format: Option<String>,

    /// Amounts to decode and sum (tax rules).
    #[serde(default)]
    pub lines: Vec<TaxSubLine>,
}

impl TaxRule {
    pub(crate) fn incomplete(&self, message: &str) -> Error {
        Error::IncompleteRule {
            rule: self.name.clone(),
            message: message.to_string(),
        }
    }

    /// Destination field name, or a configuration error naming the rule.
    pub(crate) fn require_field(&self) -> Result<&str> {
        self.field
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| self.incomplete("must declare a destination field"))
    }

    /// Validate the packed-decimal invariants of every owned sub-line.
    ///
    /// Called before any line is scanned so that a broken configuration
    /// fails up front rather than mid-file.
    pub fn validate_packed_lines(&self) -> Result<()> {
        for sub in &self.lines {
            if sub.starting_position == 0 {
                return Err(self.incomplete("has a sub-line with a zero starting position"));
            }
            if sub.long == 0 {
                return Err(self.incomplete("has a sub-line with zero length"));
            }
            if sub.long <= sub.decimals_amount {
                return Err(
                    self.incomplete("has a sub-line whose length leaves no amount digits")
                );
            }
            // rust_decimal amounts carry at most 28 fractional digits
            if sub.decimals_amount > 28 {
                return Err(
                    self.incomplete("has a sub-line with an unrepresentable decimal scale")
                );
            }
        }
        Ok(())
    }
}

/// One packed amount within a tax rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxSubLine {
    /// 0-based character offset of the packed amount (text sources).
    #[serde(default)]
    pub starting_position: usize,

    /// Total character length including the trailing sign digit.
    #[serde(default)]
    pub long: usize,

    /// How many of the rightmost amount digits are fractional.
    #[serde(default)]
    pub decimals_amount: usize,

    /// 1-based row of the amount cell (tabular sources).
    #[serde(default)]
    pub row: Option<usize>,

    /// 1-based column of the amount cell (tabular sources).
    #[serde(default)]
    pub col: Option<usize>,

    /// Label cell content to search for (tax-name lookup).
    #[serde(default)]
    pub tax_name: Option<String>,

    /// Direction to step from the located label cell.
    #[serde(default)]
    pub direction: Option<Direction>,

    /// How many cells to step from the label.
    #[serde(default)]
    pub positions_amount: usize,
}

/// Direction of a relative-offset cell lookup.
///
/// Parsing is case-insensitive: configurations written as `"Up"` or `"UP"`
/// select the same direction as `"up"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "Up", alias = "UP")]
    Up,
    #[serde(alias = "Down", alias = "DOWN")]
    Down,
    #[serde(alias = "Left", alias = "LEFT")]
    Left,
    #[serde(alias = "Right", alias = "RIGHT")]
    Right,
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            _ => Err(Error::IncompleteRule {
                rule: s.to_string(),
                message: "is not a valid offset direction".to_string(),
            }),
        }
    }
}
