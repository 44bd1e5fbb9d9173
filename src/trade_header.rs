//! Trade Header Extractor.
//!
//! The trade header identifies the merchant/file submission and is expected
//! to resolve to exactly one record: every rule's hit is merged into one
//! flat mapping, and the original filename is always injected under
//! [`FILENAME_FIELD`](crate::types::FILENAME_FIELD).
//!
//! Trade header rules carry no section-level search type. A rule declaring
//! a row and column reads the grid; a rule declaring a line prefix or line
//! number reads the text lines (for csv, the synthesized line view).

use crate::config::{FieldRule, TradeHeaderConfig};
use crate::error::{Error, Result};
use crate::loader::{Grid, LoadedSource};
use crate::locator::{line_at, slice_chars};
use crate::types::{Record, FILENAME_FIELD};

/// Extract the single trade header record.
pub fn extract_trade_header(
    source: &LoadedSource,
    config: &TradeHeaderConfig,
    filename: &str,
) -> Result<Record> {
    if config.rules.is_empty() {
        return Err(Error::MissingFieldRules {
            section: "trade header",
            config: config.name.clone(),
        });
    }

    let mut record = Record::new();
    record.insert(FILENAME_FIELD.to_string(), filename.to_string());

    for rule in &config.rules {
        match source {
            LoadedSource::Text { lines } => apply_text_rule(rule, lines, &mut record)?,
            LoadedSource::Table { grid, lines } => {
                if rule.row.is_some() || rule.col.is_some() {
                    apply_cell_rule(rule, grid, &mut record)?;
                } else if let Some(lines) = lines {
                    apply_text_rule(rule, lines, &mut record)?;
                } else {
                    return Err(rule.incomplete("must declare a row and a column"));
                }
            }
        }
    }

    Ok(record)
}

fn apply_text_rule(rule: &FieldRule, lines: &[String], record: &mut Record) -> Result<()> {
    if rule.start_with.is_none() && rule.line_number.is_none() {
        return Err(rule.incomplete("must declare a line number or a line-start prefix"));
    }

    // First matching line wins for prefix rules.
    let line = match rule.start_with.as_deref() {
        Some(prefix) => lines.iter().find(|l| l.starts_with(prefix)).map(|l| l.as_str()),
        None => line_at(lines, rule.line_number.unwrap_or(0)),
    };

    if let Some(line) = line {
        record.insert(
            rule.field.clone(),
            slice_chars(line, rule.starting_position, rule.end_position),
        );
    }
    Ok(())
}

fn apply_cell_rule(rule: &FieldRule, grid: &Grid, record: &mut Record) -> Result<()> {
    let (row, col) = rule.require_row_col()?;
    if let Some(value) = grid.cell(row, col).filter(|v| !v.is_empty()) {
        record.insert(rule.field.clone(), value.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceType;
    use pretty_assertions::assert_eq;

    fn rule(field: &str) -> FieldRule {
        FieldRule {
            field: field.to_string(),
            start_with: None,
            line_number: None,
            starting_position: 0,
            end_position: 0,
            row: None,
            col: None,
            is_liquidation_number: false,
            liquidation_kind: None,
            group_by: false,
            origin_date_format: None,
            dest_date_format: None,
        }
    }

    fn text_source(lines: &[&str]) -> LoadedSource {
        LoadedSource::Text {
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn test_start_with_and_line_number_rules() {
        let source = text_source(&["1HEADERSHOP001", "2SETTLE000123"]);
        let mut name = rule("name");
        name.start_with = Some("1".into());
        name.starting_position = 1;
        name.end_position = 7;
        let mut shop = rule("commerce_number");
        shop.line_number = Some(1);
        shop.starting_position = 7;
        shop.end_position = 14;

        let config = TradeHeaderConfig {
            name: "ACME-txt".into(),
            source_type: SourceType::Txt,
            rules: vec![name, shop],
        };

        let record = extract_trade_header(&source, &config, "file.txt").unwrap();
        assert_eq!(record["name"], "HEADER");
        assert_eq!(record["commerce_number"], "SHOP001");
        assert_eq!(record[FILENAME_FIELD], "file.txt");
    }

    #[test]
    fn test_out_of_range_line_yields_no_value() {
        let source = text_source(&["only line"]);
        let mut r = rule("missing");
        r.line_number = Some(9);
        let config = TradeHeaderConfig {
            name: String::new(),
            source_type: SourceType::Txt,
            rules: vec![r],
        };

        let record = extract_trade_header(&source, &config, "f.txt").unwrap();
        assert!(!record.contains_key("missing"));
    }

    #[test]
    fn test_rule_without_strategy_is_configuration_error() {
        let source = text_source(&["line"]);
        let config = TradeHeaderConfig {
            name: String::new(),
            source_type: SourceType::Txt,
            rules: vec![rule("broken")],
        };

        let err = extract_trade_header(&source, &config, "f.txt").unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_no_rules_is_configuration_error() {
        let source = text_source(&["line"]);
        let config = TradeHeaderConfig {
            name: "ACME-txt".into(),
            source_type: SourceType::Txt,
            rules: vec![],
        };

        let err = extract_trade_header(&source, &config, "f.txt").unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("ACME-txt"));
    }

    #[test]
    fn test_grid_rules() {
        let source = LoadedSource::Table {
            grid: Grid::new(
                vec!["a".into(), "b".into()],
                vec![vec!["SHOP001".into(), "".into()]],
            ),
            lines: None,
        };
        let mut r = rule("commerce_number");
        r.row = Some(1);
        r.col = Some(1);
        let mut oob = rule("absent");
        oob.row = Some(5);
        oob.col = Some(5);

        let config = TradeHeaderConfig {
            name: String::new(),
            source_type: SourceType::Xlsx,
            rules: vec![r, oob],
        };

        let record = extract_trade_header(&source, &config, "f.xlsx").unwrap();
        assert_eq!(record["commerce_number"], "SHOP001");
        assert!(!record.contains_key("absent"));
    }

    #[test]
    fn test_grid_rule_missing_col_is_configuration_error() {
        let source = LoadedSource::Table {
            grid: Grid::new(vec!["a".into()], vec![vec!["x".into()]]),
            lines: None,
        };
        let mut r = rule("broken");
        r.row = Some(1); // column missing
        let config = TradeHeaderConfig {
            name: String::new(),
            source_type: SourceType::Xlsx,
            rules: vec![r],
        };

        assert!(extract_trade_header(&source, &config, "f.xlsx")
            .unwrap_err()
            .is_configuration_error());
    }
}
