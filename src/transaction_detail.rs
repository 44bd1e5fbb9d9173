//! Transaction Detail Extractor.
//!
//! Produces one record per matched line/row. Every record must resolve to
//! a settlement-number key, either extracted directly (text prefix scan) or
//! derived from the matched liquidation anchor (tabular strategies).
//!
//! Before records are handed to the assembler, the `total` field is
//! locale-normalized to a canonical decimal string so downstream sees
//! `1234.56` regardless of how the bank formatted the amount.

use crate::config::{
    FieldRule, LiquidationKind, TransactionDetailConfig, TransactionSearch,
};
use crate::error::{Error, Result};
use crate::loader::{Grid, LoadedSource};
use crate::locator::{parse_localized_number, reformat_date, slice_chars};
use crate::types::{Record, TOTAL_FIELD};

/// Anchor cell holding the liquidation value for a whole fixed-liquidation
/// sheet.
const FIXED_ANCHOR: (usize, usize) = (2, 2);

/// Extract the transaction detail records in source order.
pub fn extract_transaction_details(
    source: &LoadedSource,
    config: &TransactionDetailConfig,
) -> Result<Vec<Record>> {
    if config.rules.is_empty() {
        return Err(Error::MissingFieldRules {
            section: "transaction detail",
            config: config.name.clone(),
        });
    }

    let mut records = match config.search_type {
        TransactionSearch::TxtStartWith => {
            let lines = source.lines().ok_or_else(|| Error::SourceShapeMismatch {
                config: config.name.clone(),
                needs: "line-based",
            })?;
            scan_start_with(lines, config)?
        }
        TransactionSearch::ExcelInitWithDate | TransactionSearch::ExcelFixedLiquidation => {
            let grid = source.grid().ok_or_else(|| Error::SourceShapeMismatch {
                config: config.name.clone(),
                needs: "tabular",
            })?;
            match config.search_type {
                TransactionSearch::ExcelInitWithDate => init_with_date(grid, config)?,
                _ => fixed_liquidation(grid, config)?,
            }
        }
    };

    for record in &mut records {
        normalize_total(record);
    }
    Ok(records)
}

/// One record per line matching any rule's prefix.
fn scan_start_with(lines: &[String], config: &TransactionDetailConfig) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for line in lines {
        let mut record = Record::new();
        for rule in &config.rules {
            let prefix = rule.require_start_with()?;
            if line.starts_with(prefix) {
                record.insert(
                    rule.field.clone(),
                    slice_chars(line, rule.starting_position, rule.end_position),
                );
            }
        }
        if !record.is_empty() {
            records.push(record);
        }
    }
    Ok(records)
}

/// Keep rows whose liquidation column parses under the origin date format,
/// rewriting the key in place to the destination format.
fn init_with_date(grid: &Grid, config: &TransactionDetailConfig) -> Result<Vec<Record>> {
    let liquidation = config
        .rules
        .iter()
        .find(|r| r.is_liquidation_number)
        .ok_or_else(|| Error::MissingLiquidationRule {
            config: config.name.clone(),
        })?;
    let key_col = liquidation.require_col()?;
    let (origin, dest) = liquidation.require_date_formats()?;

    let mut records = Vec::new();
    for row in grid.rows() {
        let raw = Grid::row_cell(row, key_col).unwrap_or("");
        // Rows whose key is not a valid date are silently excluded.
        let Some(key) = reformat_date(raw, origin, dest) else {
            continue;
        };
        records.push(build_row_record(row, key, liquidation, config));
    }
    Ok(records)
}

/// Read the anchor cell once, then keep every row whose designated key
/// column equals the anchor value.
fn fixed_liquidation(grid: &Grid, config: &TransactionDetailConfig) -> Result<Vec<Record>> {
    let anchor = grid.cell(FIXED_ANCHOR.0, FIXED_ANCHOR.1).unwrap_or("");

    let liquidation = config
        .rules
        .iter()
        .find(|r| r.is_liquidation_number && r.liquidation_kind == Some(LiquidationKind::Row))
        .ok_or_else(|| Error::MissingLiquidationRule {
            config: config.name.clone(),
        })?;
    let key_col = liquidation.require_col()?;

    let mut records = Vec::new();
    for row in grid.rows() {
        let value = Grid::row_cell(row, key_col).unwrap_or("");
        if value == anchor {
            records.push(build_row_record(row, value.to_string(), liquidation, config));
        }
    }
    Ok(records)
}

/// Assemble one record from a matched row: the liquidation key plus every
/// other rule's column value. Empty cells yield absent fields.
fn build_row_record(
    row: &[String],
    key: String,
    liquidation: &FieldRule,
    config: &TransactionDetailConfig,
) -> Record {
    let mut record = Record::new();
    record.insert(liquidation.field.clone(), key);

    for rule in &config.rules {
        if std::ptr::eq(rule, liquidation) {
            continue;
        }
        let Some(value) = rule.col.and_then(|c| Grid::row_cell(row, c)) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        record.insert(rule.field.clone(), value.to_string());
    }
    record
}

/// Rewrite the `total` field to a canonical decimal string.
fn normalize_total(record: &mut Record) {
    if let Some(total) = record.get(TOTAL_FIELD) {
        if !total.trim().is_empty() {
            let normalized = parse_localized_number(total).to_string();
            record.insert(TOTAL_FIELD.to_string(), normalized);
        }
    }
}
