//! Settlement Header Extractor.
//!
//! A settlement header is one batch of transactions sharing a settlement
//! (liquidation) number and a payment product code. Depending on the
//! configured search type this section yields one record (line-number or
//! exact-cell strategies) or many (prefix scan, init-with strategies).
//!
//! For the `excel_init_with`/`excel_init_with_date` strategies, rows kept
//! by the liquidation-column filter can be deduplicated by the tuple of
//! `group_by` field values. The merge is first-wins: later rows with the
//! same group key are discarded even when other columns differ. That is a
//! policy decision carried over from the configuration's semantics, not an
//! aggregation.

use std::collections::HashSet;

use crate::config::{SettlementHeaderConfig, SettlementSearch};
use crate::error::{Error, Result};
use crate::loader::{Grid, LoadedSource};
use crate::locator::{line_at, reformat_date, slice_chars};
use crate::types::Record;

/// Extract the settlement header records in source order.
pub fn extract_settlement_headers(
    source: &LoadedSource,
    config: &SettlementHeaderConfig,
) -> Result<Vec<Record>> {
    if config.rules.is_empty() {
        return Err(Error::MissingFieldRules {
            section: "settlement header",
            config: config.name.clone(),
        });
    }

    match config.search_type {
        SettlementSearch::TxtStartWith => scan_start_with(require_lines(source, config)?, config),
        SettlementSearch::TxtLineNumber => by_line_number(require_lines(source, config)?, config),
        SettlementSearch::ExcelRowCol => by_row_col(require_grid(source, config)?, config),
        SettlementSearch::ExcelInitWith | SettlementSearch::ExcelInitWithDate => {
            init_with(require_grid(source, config)?, config)
        }
    }
}

fn require_lines<'a>(
    source: &'a LoadedSource,
    config: &SettlementHeaderConfig,
) -> Result<&'a [String]> {
    source.lines().ok_or_else(|| Error::SourceShapeMismatch {
        config: config.name.clone(),
        needs: "line-based",
    })
}

fn require_grid<'a>(source: &'a LoadedSource, config: &SettlementHeaderConfig) -> Result<&'a Grid> {
    source.grid().ok_or_else(|| Error::SourceShapeMismatch {
        config: config.name.clone(),
        needs: "tabular",
    })
}

/// One record per line matching any rule's prefix; rules hit independently
/// and accumulate into the line's record.
fn scan_start_with(lines: &[String], config: &SettlementHeaderConfig) -> Result<Vec<Record>> {
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

/// One record assembled from absolute line numbers; out-of-range lines
/// yield no value for that field.
fn by_line_number(lines: &[String], config: &SettlementHeaderConfig) -> Result<Vec<Record>> {
    let mut record = Record::new();
    for rule in &config.rules {
        let number = rule
            .line_number
            .filter(|n| *n >= 1)
            .ok_or_else(|| rule.incomplete("must declare a line number"))?;
        if let Some(line) = line_at(lines, number) {
            record.insert(
                rule.field.clone(),
                slice_chars(line, rule.starting_position, rule.end_position),
            );
        }
    }
    Ok(vec![record])
}

/// One record from exact 1-based cell lookups.
fn by_row_col(grid: &Grid, config: &SettlementHeaderConfig) -> Result<Vec<Record>> {
    let mut record = Record::new();
    for rule in &config.rules {
        let (row, col) = rule.require_row_col()?;
        if let Some(value) = grid.cell(row, col).filter(|v| !v.is_empty()) {
            record.insert(rule.field.clone(), value.to_string());
        }
    }
    Ok(vec![record])
}

/// Filter rows through the liquidation column, assemble records from every
/// rule's column, then apply first-wins `group_by` deduplication.
fn init_with(grid: &Grid, config: &SettlementHeaderConfig) -> Result<Vec<Record>> {
    let by_date = config.search_type == SettlementSearch::ExcelInitWithDate;

    let liquidation = config
        .rules
        .iter()
        .find(|r| r.is_liquidation_number && r.col.is_some())
        .ok_or_else(|| Error::MissingLiquidationRule {
            config: config.name.clone(),
        })?;
    let key_col = liquidation.require_col()?;

    // Structural requirements are checked before any row is scanned.
    let (prefix, key_formats) = if by_date {
        (None, Some(liquidation.require_date_formats()?))
    } else {
        (Some(liquidation.require_start_with()?), None)
    };

    let mut matched: Vec<(String, &[String])> = Vec::new();
    for row in grid.rows() {
        let raw = Grid::row_cell(row, key_col).unwrap_or("");
        if let Some(prefix) = prefix {
            if raw.starts_with(prefix) {
                matched.push((raw.to_string(), row));
            }
        } else if let Some((origin, dest)) = key_formats {
            // Rows that do not parse as dates are silently dropped; that is
            // the filter, not an error.
            if let Some(normalized) = reformat_date(raw, origin, dest) {
                matched.push((normalized, row));
            }
        }
    }

    let group_fields: Vec<&str> = config
        .rules
        .iter()
        .filter(|r| r.group_by)
        .map(|r| r.field.as_str())
        .collect();

    let mut seen: HashSet<Vec<Option<String>>> = HashSet::new();
    let mut records = Vec::new();

    for (key_value, row) in matched {
        let mut record = Record::new();
        record.insert(liquidation.field.clone(), key_value);

        for rule in &config.rules {
            if std::ptr::eq(rule, liquidation) {
                continue;
            }
            let Some(value) = rule.col.and_then(|c| Grid::row_cell(row, c)) else {
                continue;
            };
            let value = if by_date && rule.has_date_formats() {
                let (origin, dest) = rule.require_date_formats()?;
                // Optional date fields that fail to parse are omitted from
                // the record, not errors.
                match reformat_date(value, origin, dest) {
                    Some(v) => v,
                    None => continue,
                }
            } else {
                value.to_string()
            };
            record.insert(rule.field.clone(), value);
        }

        if group_fields.is_empty() {
            records.push(record);
            continue;
        }
        let key: Vec<Option<String>> = group_fields
            .iter()
            .map(|f| record.get(*f).cloned())
            .collect();
        if seen.insert(key) {
            records.push(record);
        }
    }

    Ok(records)
}
