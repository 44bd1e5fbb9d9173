//! Tax Trailer Extractor.
//!
//! Emits zero or more `(settlement_number, tax_rule, total)` triples, one
//! per tax rule with a non-zero computed total. Base-typed rules locate the
//! settlement key (and any other plain fields) while tax-typed rules own
//! sub-lines whose decoded amounts are summed into the rule's total.
//!
//! Four strategies cover the layouts seen in practice: packed amounts on
//! prefix-matched fixed-width lines, exact-cell amounts, label-relative
//! amounts (find the tax name, step N cells), and per-settlement column
//! sums over date-keyed rows.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::config::{SettlementTaxConfig, TaxRule, TaxRuleKind, TaxSearch};
use crate::error::{Error, Result};
use crate::loader::{Grid, LoadedSource};
use crate::locator::{
    decode_packed_amount, offset_cell, parse_localized_number, reformat_date, slice_chars,
};
use crate::types::{Record, TaxTotal, SETTLEMENT_NUMBER_FIELD};

/// Extract the tax trailer totals in source order.
pub fn extract_tax_trailers(
    source: &LoadedSource,
    config: &SettlementTaxConfig,
) -> Result<Vec<TaxTotal>> {
    if config.rules.is_empty() {
        return Err(Error::MissingFieldRules {
            section: "settlement tax",
            config: config.name.clone(),
        });
    }

    match config.search_type {
        TaxSearch::TxtStartWith => {
            let lines = source.lines().ok_or_else(|| Error::SourceShapeMismatch {
                config: config.name.clone(),
                needs: "line-based",
            })?;
            scan_start_with(lines, config)
        }
        TaxSearch::ExcelRowCol | TaxSearch::ExcelTaxName | TaxSearch::SumColRow => {
            let grid = source.grid().ok_or_else(|| Error::SourceShapeMismatch {
                config: config.name.clone(),
                needs: "tabular",
            })?;
            match config.search_type {
                TaxSearch::ExcelRowCol => by_row_col(grid, config),
                TaxSearch::ExcelTaxName => by_tax_name(grid, config),
                _ => sum_col_row(grid, config),
            }
        }
    }
}

/// Per matching line: base rules slice the settlement key, tax rules sum
/// their packed sub-line amounts.
fn scan_start_with(lines: &[String], config: &SettlementTaxConfig) -> Result<Vec<TaxTotal>> {
    // Fail on broken packed layouts before any line is scanned.
    for rule in tax_rules(config) {
        rule.validate_packed_lines()?;
    }

    let mut trailers = Vec::new();
    for line in lines {
        let mut base = Record::new();
        let mut totals: Vec<(&str, Decimal)> = Vec::new();

        for rule in &config.rules {
            let prefix = rule
                .start_with
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| rule.incomplete("must declare a line-start prefix"))?;
            if !line.starts_with(prefix) {
                continue;
            }

            match rule.kind {
                TaxRuleKind::Base => {
                    base.insert(
                        rule.require_field()?.to_string(),
                        slice_chars(line, rule.starting_position, rule.end_position),
                    );
                }
                TaxRuleKind::Tax => {
                    let mut total = Decimal::ZERO;
                    for sub in &rule.lines {
                        total += decode_packed_amount(line, sub, &rule.name)?;
                    }
                    totals.push((&rule.name, total));
                }
            }
        }

        if totals.is_empty() {
            continue;
        }
        let settlement_number = settlement_key(&base)?;
        for (name, total) in totals {
            if !total.is_zero() {
                trailers.push(TaxTotal {
                    settlement_number: settlement_number.clone(),
                    tax_rule: name.to_string(),
                    total,
                });
            }
        }
    }
    Ok(trailers)
}

/// Base fields and sub-line amounts read from exact 1-based cells.
fn by_row_col(grid: &Grid, config: &SettlementTaxConfig) -> Result<Vec<TaxTotal>> {
    let mut base = Record::new();
    let mut totals: Vec<(&str, Decimal)> = Vec::new();

    for rule in &config.rules {
        match rule.kind {
            TaxRuleKind::Base => read_base_cell(grid, rule, &mut base)?,
            TaxRuleKind::Tax => {
                let mut total = Decimal::ZERO;
                for sub in &rule.lines {
                    let (row, col) = match (sub.row, sub.col) {
                        (Some(r), Some(c)) if r >= 1 && c >= 1 => (r, c),
                        _ => return Err(rule.incomplete("has a sub-line without row and column")),
                    };
                    if let Some(value) = grid.cell(row, col).filter(|v| !v.is_empty()) {
                        total += parse_localized_number(value);
                    }
                }
                totals.push((&rule.name, total));
            }
        }
    }

    emit_single_settlement(&base, totals)
}

/// Sub-line amounts located relative to a label cell: find the cell whose
/// value equals the configured tax name, then step `positions_amount` cells
/// in the configured direction. A missing label or a step off the sheet is
/// an empty result for that sub-line, not an error.
fn by_tax_name(grid: &Grid, config: &SettlementTaxConfig) -> Result<Vec<TaxTotal>> {
    let mut base = Record::new();
    let mut totals: Vec<(&str, Decimal)> = Vec::new();

    for rule in &config.rules {
        match rule.kind {
            TaxRuleKind::Base => read_base_cell(grid, rule, &mut base)?,
            TaxRuleKind::Tax => {
                let mut total = Decimal::ZERO;
                for sub in &rule.lines {
                    let label = sub
                        .tax_name
                        .as_deref()
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| rule.incomplete("has a sub-line without a tax name"))?;
                    let direction = sub
                        .direction
                        .ok_or_else(|| rule.incomplete("has a sub-line without a direction"))?;

                    if let Some(value) = offset_cell(grid, label, direction, sub.positions_amount)
                        .filter(|v| !v.is_empty())
                    {
                        total += parse_localized_number(value);
                    }
                }
                totals.push((&rule.name, total));
            }
        }
    }

    emit_single_settlement(&base, totals)
}

/// Group rows by the normalized base-column value and sum every tax rule's
/// sub-line columns across each group. Emits one triple per
/// (base value, tax rule) pair with a non-zero total.
fn sum_col_row(grid: &Grid, config: &SettlementTaxConfig) -> Result<Vec<TaxTotal>> {
    let base = config
        .rules
        .iter()
        .find(|r| r.kind == TaxRuleKind::Base)
        .ok_or_else(|| Error::MissingLiquidationRule {
            config: config.name.clone(),
        })?;
    let base_col = base
        .col
        .filter(|c| *c >= 1)
        .ok_or_else(|| base.incomplete("must declare a column"))?;

    // key → tax rule name → running total, insertion-ordered by first
    // appearance of the key
    let mut order: Vec<String> = Vec::new();
    let mut sums: BTreeMap<String, BTreeMap<&str, Decimal>> = BTreeMap::new();

    for row in grid.rows() {
        let Some(raw) = Grid::row_cell(row, base_col) else {
            continue;
        };
        let key = normalize_base_value(raw, base);
        if key.is_empty() {
            continue;
        }
        if !sums.contains_key(&key) {
            order.push(key.clone());
        }
        let per_rule = sums.entry(key).or_default();

        for rule in tax_rules(config) {
            let mut amount = Decimal::ZERO;
            for sub in &rule.lines {
                let Some(col) = sub.col.filter(|c| *c >= 1) else {
                    continue;
                };
                if let Some(value) = Grid::row_cell(row, col) {
                    amount += parse_localized_number(value);
                }
            }
            *per_rule.entry(rule.name.as_str()).or_default() += amount;
        }
    }

    let mut trailers = Vec::new();
    for key in order {
        let per_rule = &sums[&key];
        for rule in tax_rules(config) {
            if let Some(total) = per_rule.get(rule.name.as_str()) {
                if !total.is_zero() {
                    trailers.push(TaxTotal {
                        settlement_number: key.clone(),
                        tax_rule: rule.name.clone(),
                        total: *total,
                    });
                }
            }
        }
    }
    Ok(trailers)
}

fn tax_rules(config: &SettlementTaxConfig) -> impl Iterator<Item = &TaxRule> {
    config.rules.iter().filter(|r| r.kind == TaxRuleKind::Tax)
}

fn read_base_cell(grid: &Grid, rule: &TaxRule, base: &mut Record) -> Result<()> {
    let (row, col) = match (rule.row, rule.col) {
        (Some(r), Some(c)) if r >= 1 && c >= 1 => (r, c),
        _ => return Err(rule.incomplete("must declare a row and a column")),
    };
    if let Some(value) = grid.cell(row, col).filter(|v| !v.is_empty()) {
        base.insert(rule.require_field()?.to_string(), value.to_string());
    }
    Ok(())
}

/// Trim the base value and apply the optional date reformat; a value that
/// fails the reformat keeps its raw trimmed form.
fn normalize_base_value(raw: &str, base: &TaxRule) -> String {
    let trimmed = raw.trim();
    if let (Some(origin), Some(dest)) = (
        base.origin_date_format.as_deref(),
        base.dest_date_format.as_deref(),
    ) {
        if let Some(normalized) = reformat_date(trimmed, origin, dest) {
            return normalized;
        }
    }
    trimmed.to_string()
}

fn settlement_key(base: &Record) -> Result<String> {
    base.get(SETTLEMENT_NUMBER_FIELD)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(Error::MissingSettlementNumber {
            section: "tax trailer",
        })
}

fn emit_single_settlement(base: &Record, totals: Vec<(&str, Decimal)>) -> Result<Vec<TaxTotal>> {
    let totals: Vec<_> = totals.into_iter().filter(|(_, t)| !t.is_zero()).collect();
    if totals.is_empty() {
        return Ok(Vec::new());
    }
    let settlement_number = settlement_key(base)?;
    Ok(totals
        .into_iter()
        .map(|(name, total)| TaxTotal {
            settlement_number: settlement_number.clone(),
            tax_rule: name.to_string(),
            total,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Direction, TaxSubLine};
    use crate::SourceType;
    use pretty_assertions::assert_eq;

    fn base_rule(field: &str) -> TaxRule {
        TaxRule {
            name: field.to_string(),
            kind: TaxRuleKind::Base,
            field: Some(field.to_string()),
            start_with: None,
            starting_position: 0,
            end_position: 0,
            row: None,
            col: None,
            origin_date_format: None,
            dest_date_format: None,
            lines: vec![],
        }
    }

    fn tax_rule(name: &str, lines: Vec<TaxSubLine>) -> TaxRule {
        TaxRule {
            name: name.to_string(),
            kind: TaxRuleKind::Tax,
            field: None,
            start_with: None,
            starting_position: 0,
            end_position: 0,
            row: None,
            col: None,
            origin_date_format: None,
            dest_date_format: None,
            lines,
        }
    }

    fn sub() -> TaxSubLine {
        TaxSubLine {
            starting_position: 0,
            long: 0,
            decimals_amount: 0,
            row: None,
            col: None,
            tax_name: None,
            direction: None,
            positions_amount: 0,
        }
    }

    fn config(search_type: TaxSearch, rules: Vec<TaxRule>) -> SettlementTaxConfig {
        SettlementTaxConfig {
            name: "ACME-tax".into(),
            source_type: SourceType::Xlsx,
            search_type,
            rules,
        }
    }

    fn table(rows: Vec<Vec<&str>>) -> LoadedSource {
        LoadedSource::Table {
            grid: Grid::new(
                vec!["c1".into(), "c2".into(), "c3".into(), "c4".into()],
                rows.into_iter()
                    .map(|r| r.into_iter().map(str::to_string).collect())
                    .collect(),
            ),
            lines: None,
        }
    }

    #[test]
    fn test_txt_packed_amounts_per_line() {
        // trailer line: key at 1..8, packed amounts at 8 (len 5, 2 dec)
        // and 13 (len 5, 2 dec)
        let source = LoadedSource::Text {
            lines: vec!["8000123410001 02000".into()],
        };
        let mut key = base_rule(SETTLEMENT_NUMBER_FIELD);
        key.start_with = Some("8".into());
        key.starting_position = 1;
        key.end_position = 8;
        let mut iva = tax_rule("iva", vec![
            TaxSubLine { starting_position: 8, long: 5, decimals_amount: 2, ..sub() },
        ]);
        iva.start_with = Some("8".into());

        let trailers = extract_tax_trailers(
            &source,
            &config(TaxSearch::TxtStartWith, vec![key, iva]),
        )
        .unwrap();

        assert_eq!(trailers.len(), 1);
        assert_eq!(trailers[0].settlement_number, "0001234");
        assert_eq!(trailers[0].tax_rule, "iva");
        // digits "1000", sign '1' positive, two decimals
        assert_eq!(trailers[0].total, Decimal::new(1000, 2));
    }

    #[test]
    fn test_txt_sub_lines_sum_with_independent_signs() {
        // two packed amounts: +10.00 and -2.50
        let source = LoadedSource::Text {
            lines: vec!["8SETT001 10001 02500".into()],
        };
        let mut key = base_rule(SETTLEMENT_NUMBER_FIELD);
        key.start_with = Some("8".into());
        key.starting_position = 1;
        key.end_position = 8;
        let mut iva = tax_rule("iva", vec![
            TaxSubLine { starting_position: 9, long: 5, decimals_amount: 2, ..sub() },
            TaxSubLine { starting_position: 15, long: 5, decimals_amount: 2, ..sub() },
        ]);
        iva.start_with = Some("8".into());

        let trailers = extract_tax_trailers(
            &source,
            &config(TaxSearch::TxtStartWith, vec![key, iva]),
        )
        .unwrap();

        assert_eq!(trailers.len(), 1);
        assert_eq!(trailers[0].total, Decimal::new(750, 2)); // 10.00 - 2.50
    }

    #[test]
    fn test_txt_invalid_packed_layout_fails_before_scanning() {
        let source = LoadedSource::Text {
            lines: vec!["8X".into()],
        };
        let mut broken = tax_rule("iva", vec![
            TaxSubLine { starting_position: 1, long: 2, decimals_amount: 5, ..sub() },
        ]);
        broken.start_with = Some("8".into());

        let err = extract_tax_trailers(
            &source,
            &config(TaxSearch::TxtStartWith, vec![broken]),
        )
        .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_excel_rc_sums_cells() {
        let source = table(vec![
            vec!["0001234", "100,50", "24,50", ""],
        ]);
        let mut key = base_rule(SETTLEMENT_NUMBER_FIELD);
        key.row = Some(1);
        key.col = Some(1);
        let iva = tax_rule("iva", vec![
            TaxSubLine { row: Some(1), col: Some(2), ..sub() },
            TaxSubLine { row: Some(1), col: Some(3), ..sub() },
        ]);

        let trailers = extract_tax_trailers(
            &source,
            &config(TaxSearch::ExcelRowCol, vec![key, iva]),
        )
        .unwrap();

        assert_eq!(trailers.len(), 1);
        assert_eq!(trailers[0].total, Decimal::new(12500, 2));
    }

    #[test]
    fn test_excel_tax_name_offset_lookup() {
        let source = table(vec![
            vec!["0001234", "", "", ""],
            vec!["", "IVA 21%", "123,45", ""],
        ]);
        let mut key = base_rule(SETTLEMENT_NUMBER_FIELD);
        key.row = Some(1);
        key.col = Some(1);
        let iva = tax_rule("iva", vec![TaxSubLine {
            tax_name: Some("IVA 21%".into()),
            direction: Some(Direction::Right),
            positions_amount: 1,
            ..sub()
        }]);

        let trailers = extract_tax_trailers(
            &source,
            &config(TaxSearch::ExcelTaxName, vec![key, iva]),
        )
        .unwrap();

        assert_eq!(trailers.len(), 1);
        assert_eq!(trailers[0].total, Decimal::new(12345, 2));
    }

    #[test]
    fn test_excel_tax_name_missing_label_is_empty_result() {
        let source = table(vec![vec!["0001234", "", "", ""]]);
        let mut key = base_rule(SETTLEMENT_NUMBER_FIELD);
        key.row = Some(1);
        key.col = Some(1);
        let iva = tax_rule("iva", vec![TaxSubLine {
            tax_name: Some("NOT THERE".into()),
            direction: Some(Direction::Down),
            positions_amount: 1,
            ..sub()
        }]);

        let trailers = extract_tax_trailers(
            &source,
            &config(TaxSearch::ExcelTaxName, vec![key, iva]),
        )
        .unwrap();
        // zero total → no triple emitted
        assert!(trailers.is_empty());
    }

    #[test]
    fn test_sum_col_row_groups_and_coerces() {
        let source = table(vec![
            vec!["05/03/2024", "1.234,56", "10", ""],
            vec!["05/03/2024", "100", "", ""],
            vec!["06/03/2024", "5,50", "0", ""],
            vec!["", "999", "999", ""],
        ]);
        let mut base = base_rule("settlement_number");
        base.col = Some(1);
        base.origin_date_format = Some("%d/%m/%Y".into());
        base.dest_date_format = Some("%Y-%m-%d".into());
        let iva = tax_rule("iva", vec![TaxSubLine { col: Some(2), ..sub() }]);
        let iibb = tax_rule("iibb", vec![TaxSubLine { col: Some(3), ..sub() }]);

        let trailers = extract_tax_trailers(
            &source,
            &config(TaxSearch::SumColRow, vec![base, iva, iibb]),
        )
        .unwrap();

        assert_eq!(trailers.len(), 3);
        assert_eq!(trailers[0].settlement_number, "2024-03-05");
        assert_eq!(trailers[0].tax_rule, "iva");
        assert_eq!(trailers[0].total, Decimal::new(133456, 2)); // 1234.56 + 100
        assert_eq!(trailers[1].tax_rule, "iibb");
        assert_eq!(trailers[1].total, Decimal::from(10));
        // zero iibb total for the second settlement is not emitted
        assert_eq!(trailers[2].settlement_number, "2024-03-06");
        assert_eq!(trailers[2].tax_rule, "iva");
        assert_eq!(trailers[2].total, Decimal::new(550, 2));
    }

    #[test]
    fn test_sum_col_row_requires_base_with_col() {
        let source = table(vec![vec!["a", "b", "c", ""]]);
        let err = extract_tax_trailers(
            &source,
            &config(TaxSearch::SumColRow, vec![tax_rule("iva", vec![])]),
        )
        .unwrap_err();
        assert!(err.is_configuration_error());
    }
}
