//! Field-location and value-decoding primitives.
//!
//! These are the building blocks the section extractors share: positional
//! character slicing, 1-based line lookup, configurable date reformatting,
//! locale-aware number coercion, signed packed-decimal decoding, and the
//! relative-offset cell lookup used by the tax-name strategy.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::fmt::Write;
use std::str::FromStr;

use crate::config::{Direction, TaxSubLine};
use crate::error::{Error, Result};
use crate::loader::Grid;

/// Slice a line by character positions, 0-based and end-exclusive.
///
/// Out-of-range bounds clamp to the line instead of failing, so a short
/// line simply yields a shorter (possibly empty) value.
pub fn slice_chars(line: &str, start: usize, end: usize) -> String {
    line.chars()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect()
}

/// 1-based line lookup. Out of range yields `None`, never an error.
pub fn line_at(lines: &[String], number: usize) -> Option<&str> {
    if number == 0 {
        return None;
    }
    lines.get(number - 1).map(|l| l.as_str())
}

/// Reparse `raw` under `origin` and render it under `dest`.
///
/// Tries an offset-aware datetime, a naive datetime, and a plain date in
/// that order, so the same configuration works for values like
/// `2024-03-05T10:15:00.000+0000` and `05/03/2024`. Returns `None` when the
/// value does not match the origin format; callers decide whether that
/// filters the row or just omits the field.
pub fn reformat_date(raw: &str, origin: &str, dest: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_str(raw, origin) {
        return render_format(dt.format(dest));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, origin) {
        return render_format(dt.format(dest));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, origin) {
        // Promote to midnight so destination formats with time directives
        // still render.
        return render_format(date.and_hms_opt(0, 0, 0)?.format(dest));
    }
    None
}

// DelayedFormat reports bad specifiers through fmt::Error; capture that as
// None instead of panicking in to_string().
fn render_format(formatted: impl std::fmt::Display) -> Option<String> {
    let mut out = String::new();
    write!(out, "{}", formatted).ok()?;
    Some(out)
}

/// Coerce a locale-formatted numeric string to a decimal amount.
///
/// Currency symbols and spaces are stripped. When both `.` and `,` are
/// present, `.` is a thousands separator and `,` the decimal mark;
/// otherwise a lone `,` is the decimal mark. Empty or unparsable values
/// coerce to zero — this is the deliberate lenient path used when summing
/// optional cells.
pub fn parse_localized_number(raw: &str) -> Decimal {
    let mut s = raw.trim().to_string();
    for token in ["$", "€", "USD", "ARS", " ", "\u{a0}"] {
        s = s.replace(token, "");
    }
    if s.is_empty() {
        return Decimal::ZERO;
    }

    if s.contains('.') && s.contains(',') {
        s = s.replace('.', "").replace(',', ".");
    } else {
        s = s.replace(',', ".");
    }

    Decimal::from_str(&s).unwrap_or(Decimal::ZERO)
}

/// Decode one signed packed-decimal amount from a fixed-width line.
///
/// Reads `long` characters at `starting_position`: the last character is
/// the sign flag (`'1'` positive, anything else negative); the remaining
/// digits carry the amount with the rightmost `decimals_amount` digits
/// fractional (the decimal point is implied, not present in the source).
pub fn decode_packed_amount(line: &str, sub: &TaxSubLine, rule: &str) -> Result<Decimal> {
    let window: Vec<char> = line
        .chars()
        .skip(sub.starting_position)
        .take(sub.long)
        .collect();
    if window.len() < sub.long {
        return Err(Error::MalformedPackedAmount {
            rule: rule.to_string(),
            value: window.iter().collect(),
        });
    }

    let sign_positive = window[sub.long - 1] == '1';
    let digits: String = window[..sub.long - 1].iter().collect();
    let magnitude = digits
        .parse::<i128>()
        .map_err(|_| Error::MalformedPackedAmount {
            rule: rule.to_string(),
            value: digits.clone(),
        })?;

    let amount = Decimal::from_i128_with_scale(magnitude, sub.decimals_amount as u32);
    Ok(if sign_positive { amount } else { -amount })
}

/// Locate the cell equal to `label` and read the value `positions` cells
/// away in `direction`.
///
/// Label not found and stepping outside the grid are both explicit
/// empty results, never errors: sheet layouts drift.
pub fn offset_cell<'a>(
    grid: &'a Grid,
    label: &str,
    direction: Direction,
    positions: usize,
) -> Option<&'a str> {
    let (row, col) = grid.find_cell(label)?;
    let (target_row, target_col) = match direction {
        Direction::Up => (row.checked_sub(positions)?, col),
        Direction::Down => (row + positions, col),
        Direction::Left => (row, col.checked_sub(positions)?),
        Direction::Right => (row, col + positions),
    };
    grid.cell(target_row, target_col)
}
