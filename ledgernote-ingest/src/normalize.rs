//! Raw row → [`Transaction`] normalization.
//!
//! Problems are local: a bad row is rejected on its own and the rest of the
//! statement still goes through.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use ledgernote_core::{Direction, Transaction};

use crate::profile::{AmountLayout, BankFormatProfile};
use crate::types::{ExtractedStatement, RawPeriod, RawRow};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("row has no column {0}")]
    MissingColumn(usize),

    #[error("unparsable date '{0}'")]
    InvalidDate(String),

    #[error("unparsable {column} '{value}'")]
    InvalidAmount { column: &'static str, value: String },

    #[error("row has no amount")]
    MissingAmount,

    #[error("amount is zero")]
    ZeroAmount,

    #[error("row has both debit '{debit}' and credit '{credit}'")]
    AmbiguousAmount { debit: String, credit: String },

    #[error("{date} is outside the statement period {from} to {to}")]
    OutOfPeriod {
        date: NaiveDate,
        from: NaiveDate,
        to: NaiveDate,
    },
}

/// Inclusive statement period.
pub type Period = (NaiveDate, NaiveDate);

/// Outcome of normalizing one extracted statement.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedStatement {
    pub source: PathBuf,
    /// Accepted transactions in document order, duplicates removed
    pub transactions: Vec<Transaction>,
    /// Rejected rows as `(row_index, reason)`
    pub rejected: Vec<(usize, NormalizeError)>,
    /// Rows dropped as exact duplicates of an earlier row
    pub duplicates: usize,
}

fn cell<'a>(row: &'a RawRow, index: usize) -> Result<&'a str, NormalizeError> {
    row.cell(index).ok_or(NormalizeError::MissingColumn(index))
}

const CURRENCY_SYMBOLS: [char; 4] = ['€', '$', '£', '¥'];
const CURRENCY_CODES: [&str; 3] = ["EUR", "USD", "GBP"];

/// Parse a money cell.
///
/// Whitespace, a currency symbol or code and `,` thousands separators are
/// dropped. A leading or trailing `-` or surrounding parentheses make the
/// value negative. Anything else in the cell (OCR noise such as `1O0.00`)
/// is an error. An empty cell is `Ok(None)`.
pub(crate) fn parse_amount(raw: &str) -> Result<Option<Decimal>, ()> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Ok(None);
    }

    let (mut body, mut negative) = match compact.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner) => (inner, true),
        None => (compact.as_str(), false),
    };
    let mut signed = negative;

    loop {
        if let Some(rest) = strip_currency_prefix(body) {
            body = rest;
        } else if let Some(rest) = body.strip_prefix(['-', '+']).filter(|_| !signed) {
            negative |= body.starts_with('-');
            signed = true;
            body = rest;
        } else {
            break;
        }
    }
    loop {
        if let Some(rest) = strip_currency_suffix(body) {
            body = rest;
        } else if let Some(rest) = body.strip_suffix('-').filter(|_| !signed) {
            negative = true;
            signed = true;
            body = rest;
        } else {
            break;
        }
    }

    let digits = plain_number(body).ok_or(())?;
    let value = Decimal::from_str(&digits).map_err(|_| ())?;
    Ok(Some(if negative { -value } else { value }))
}

fn strip_currency_prefix(s: &str) -> Option<&str> {
    s.strip_prefix(CURRENCY_SYMBOLS).or_else(|| {
        CURRENCY_CODES.iter().find_map(|code| {
            s.get(..code.len())
                .filter(|head| head.eq_ignore_ascii_case(code))
                .map(|_| &s[code.len()..])
        })
    })
}

fn strip_currency_suffix(s: &str) -> Option<&str> {
    s.strip_suffix(CURRENCY_SYMBOLS).or_else(|| {
        CURRENCY_CODES.iter().find_map(|code| {
            let split = s.len().checked_sub(code.len())?;
            s.get(split..)
                .filter(|tail| tail.eq_ignore_ascii_case(code))
                .map(|_| &s[..split])
        })
    })
}

/// `1,234.50` → `1234.50`; `None` unless the text is digits with optional
/// three-digit `,` groups and an optional fraction.
fn plain_number(s: &str) -> Option<String> {
    let (int, frac) = match s.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (s, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());

    if frac.is_some_and(|f| !all_digits(f)) {
        return None;
    }
    if int.is_empty() {
        return frac.map(|f| format!("0.{f}"));
    }

    let mut groups = int.split(',');
    let lead = groups.next()?;
    let grouped = int.contains(',');
    if !all_digits(lead) || (grouped && lead.len() > 3) {
        return None;
    }
    let mut digits = lead.to_string();
    for group in groups {
        if group.len() != 3 || !all_digits(group) {
            return None;
        }
        digits.push_str(group);
    }
    if let Some(f) = frac {
        digits.push('.');
        digits.push_str(f);
    }
    Some(digits)
}

fn amount_cell(row: &RawRow, index: usize, column: &'static str) -> Result<Option<Decimal>, NormalizeError> {
    let raw = cell(row, index)?;
    parse_amount(raw).map_err(|_| NormalizeError::InvalidAmount {
        column,
        value: raw.to_string(),
    })
}

/// Amount rule for separate debit/credit columns.
pub(crate) fn split_amount(
    row: &RawRow,
    profile: &BankFormatProfile,
) -> Result<(Decimal, Direction), NormalizeError> {
    let AmountLayout::Split { debit, credit } = profile.layout() else {
        return Err(NormalizeError::MissingAmount);
    };

    let debit_value = amount_cell(row, debit, "debit")?;
    let credit_value = amount_cell(row, credit, "credit")?;
    let non_zero = |v: Option<Decimal>| v.map(|d| d.abs()).filter(|d| !d.is_zero());

    match (non_zero(debit_value), non_zero(credit_value)) {
        (Some(d), None) => Ok((d, Direction::Debit)),
        (None, Some(c)) => Ok((c, Direction::Credit)),
        (Some(_), Some(_)) => Err(NormalizeError::AmbiguousAmount {
            debit: cell(row, debit)?.to_string(),
            credit: cell(row, credit)?.to_string(),
        }),
        (None, None) if debit_value.is_some() || credit_value.is_some() => {
            Err(NormalizeError::ZeroAmount)
        }
        (None, None) => Err(NormalizeError::MissingAmount),
    }
}

/// Amount rule for a single signed column.
pub(crate) fn signed_amount(
    row: &RawRow,
    profile: &BankFormatProfile,
) -> Result<(Decimal, Direction), NormalizeError> {
    let AmountLayout::Signed {
        amount,
        negative_is_debit,
    } = profile.layout()
    else {
        return Err(NormalizeError::MissingAmount);
    };

    let value = amount_cell(row, amount, "amount")?.ok_or(NormalizeError::MissingAmount)?;
    if value.is_zero() {
        return Err(NormalizeError::ZeroAmount);
    }

    let direction = if value.is_sign_negative() == negative_is_debit {
        Direction::Debit
    } else {
        Direction::Credit
    };
    Ok((value.abs(), direction))
}

/// Parse a printed statement period with the profile's date format.
pub fn parse_period(raw: &RawPeriod, profile: &BankFormatProfile) -> Option<Period> {
    let from = profile.parse_date(&raw.from)?;
    let to = profile.parse_date(&raw.to)?;
    (from <= to).then_some((from, to))
}

/// Normalize one raw row.
pub fn normalize_row(
    row: &RawRow,
    profile: &BankFormatProfile,
    period: Option<Period>,
) -> Result<Transaction, NormalizeError> {
    let date_raw = cell(row, profile.date_column())?;
    let date = profile
        .parse_date(date_raw)
        .ok_or_else(|| NormalizeError::InvalidDate(date_raw.to_string()))?;

    if let Some((from, to)) = period {
        if date < from || date > to {
            return Err(NormalizeError::OutOfPeriod { date, from, to });
        }
    }

    let (amount, direction) = profile.amount(row)?;

    let balance_after = match profile.balance_column() {
        Some(index) => amount_cell(row, index, "balance")?,
        None => None,
    };

    Ok(Transaction {
        date,
        description: cell(row, profile.description_column())?.to_string(),
        amount,
        direction,
        balance_after,
        source_bank_format: profile.id().to_string(),
        source_file: row.source_name(),
        source_row: row.row_index,
    })
}

type DedupKey = (NaiveDate, String, Decimal, Direction, Option<Decimal>);

fn dedup_key(t: &Transaction) -> DedupKey {
    (t.date, t.description.clone(), t.amount, t.direction, t.balance_after)
}

/// Normalize every row of one statement.
///
/// Rejected rows are logged and collected; exact duplicates (same date,
/// description, amount, direction and balance) keep their first occurrence.
pub fn normalize_statement(stmt: &ExtractedStatement, profile: &BankFormatProfile) -> NormalizedStatement {
    let period = stmt.period.as_ref().and_then(|raw| {
        let parsed = parse_period(raw, profile);
        if parsed.is_none() {
            tracing::warn!(
                "{}: ignoring unparsable statement period '{}' to '{}'",
                stmt.source.display(),
                raw.from,
                raw.to
            );
        }
        parsed
    });

    let mut seen: HashSet<DedupKey> = HashSet::new();
    let mut out = NormalizedStatement {
        source: stmt.source.clone(),
        transactions: Vec::new(),
        rejected: Vec::new(),
        duplicates: 0,
    };

    for row in &stmt.rows {
        match normalize_row(row, profile, period) {
            Ok(txn) => {
                if seen.insert(dedup_key(&txn)) {
                    out.transactions.push(txn);
                } else {
                    tracing::debug!(
                        "{} row {}: duplicate of an earlier row, dropped",
                        stmt.source.display(),
                        row.row_index
                    );
                    out.duplicates += 1;
                }
            }
            Err(e) => {
                tracing::warn!("{} row {}: {e}; skipped", stmt.source.display(), row.row_index);
                out.rejected.push((row.row_index, e));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileRegistry;

    fn row(index: usize, cells: &[&str]) -> RawRow {
        RawRow {
            source: PathBuf::from("jan.md"),
            table_index: 0,
            row_index: index,
            cells: cells.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn statement(rows: Vec<RawRow>) -> ExtractedStatement {
        ExtractedStatement {
            source: PathBuf::from("jan.md"),
            period: None,
            rows,
        }
    }

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount("1,234.50"), Ok(Some(Decimal::new(123450, 2))));
        assert_eq!(parse_amount("€ 4.50"), Ok(Some(Decimal::new(450, 2))));
        assert_eq!(parse_amount("- $14.05"), Ok(Some(Decimal::new(-1405, 2))));
        assert_eq!(parse_amount("(20.00)"), Ok(Some(Decimal::new(-2000, 2))));
        assert_eq!(parse_amount("15.00-"), Ok(Some(Decimal::new(-1500, 2))));
        assert_eq!(parse_amount("  "), Ok(None));
        assert_eq!(parse_amount("n/a"), Err(()));
        assert_eq!(parse_amount("1.2.3"), Err(()));
        assert_eq!(parse_amount("EUR 12.00"), Ok(Some(Decimal::new(1200, 2))));
        assert_eq!(parse_amount("12.00 usd"), Ok(Some(Decimal::new(1200, 2))));
        assert_eq!(parse_amount(".50"), Ok(Some(Decimal::new(50, 2))));
    }

    #[test]
    fn test_parse_amount_rejects_ocr_noise() {
        for raw in ["1O0.00", "12a", "1-2", "--5", "(-5)", "1,23.00", "1234,567", "$", "-", "4.", "5 . 0 0x"] {
            assert_eq!(parse_amount(raw), Err(()), "{raw}");
        }
    }

    #[test]
    fn test_garbled_amount_row_is_rejected() {
        let registry = ProfileRegistry::builtin();
        let ptsb = registry.get("ptsb").unwrap();
        let stmt = statement(vec![
            row(1, &["05JAN24", "Coffee Shop", "4.50", "", "1,000.00"]),
            row(2, &["06JAN24", "Smudged", "1O0.00", "", "900.00"]),
        ]);

        let out = normalize_statement(&stmt, ptsb);
        assert_eq!(out.transactions.len(), 1);
        assert!(matches!(
            out.rejected[0],
            (2, NormalizeError::InvalidAmount { column: "debit", .. })
        ));
    }

    #[test]
    fn test_ptsb_split_columns() {
        let registry = ProfileRegistry::builtin();
        let ptsb = registry.get("ptsb").unwrap();

        let coffee = normalize_row(&row(1, &["05JAN24", "Coffee Shop", "4.50", "", "1,000.00"]), ptsb, None).unwrap();
        assert_eq!(coffee.date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(coffee.amount, Decimal::new(450, 2));
        assert_eq!(coffee.direction, Direction::Debit);
        assert_eq!(coffee.balance_after, Some(Decimal::new(100000, 2)));
        assert_eq!(coffee.source_bank_format, "ptsb");

        let salary = normalize_row(&row(2, &["05JAN24", "Salary", "", "2,000.00", "3,000.00"]), ptsb, None).unwrap();
        assert_eq!(salary.direction, Direction::Credit);
        assert_eq!(salary.amount, Decimal::new(200000, 2));
    }

    #[test]
    fn test_split_column_errors() {
        let registry = ProfileRegistry::builtin();
        let ptsb = registry.get("ptsb").unwrap();

        let both = normalize_row(&row(1, &["05JAN24", "x", "1.00", "2.00", ""]), ptsb, None);
        assert!(matches!(both, Err(NormalizeError::AmbiguousAmount { .. })));

        let none = normalize_row(&row(2, &["05JAN24", "BALANCE FORWARD", "", "", "900.00"]), ptsb, None);
        assert_eq!(none, Err(NormalizeError::MissingAmount));

        let zero = normalize_row(&row(3, &["05JAN24", "x", "0.00", "", ""]), ptsb, None);
        assert_eq!(zero, Err(NormalizeError::ZeroAmount));

        let bad_balance = normalize_row(&row(4, &["05JAN24", "x", "1.00", "", "??"]), ptsb, None);
        assert!(matches!(bad_balance, Err(NormalizeError::InvalidAmount { column: "balance", .. })));
    }

    #[test]
    fn test_signed_polarity() {
        let registry = ProfileRegistry::builtin();

        let checking = registry.get("us-checking").unwrap();
        let out = normalize_row(&row(1, &["04/22/2026", "E-Payment", "-15.00", "53.70"]), checking, None).unwrap();
        assert_eq!((out.amount, out.direction), (Decimal::new(1500, 2), Direction::Debit));

        let card = registry.get("card").unwrap();
        let charge = normalize_row(&row(2, &["07/20/2024", "H-E-B #455", "$5.82"]), card, None).unwrap();
        assert_eq!(charge.direction, Direction::Debit);
        let refund = normalize_row(&row(3, &["07/28/2024", "WALMART.COM", "- $14.05"]), card, None).unwrap();
        assert_eq!(refund.direction, Direction::Credit);
        assert_eq!(refund.balance_after, None);
    }

    #[test]
    fn test_out_of_period_rejected() {
        let registry = ProfileRegistry::builtin();
        let ptsb = registry.get("ptsb").unwrap();
        let period = Some((
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        ));

        let inside = normalize_row(&row(1, &["31JAN24", "x", "1.00", "", ""]), ptsb, period);
        assert!(inside.is_ok());
        let outside = normalize_row(&row(2, &["01FEB24", "x", "1.00", "", ""]), ptsb, period);
        assert!(matches!(outside, Err(NormalizeError::OutOfPeriod { .. })));
    }

    #[test]
    fn test_bad_date_skipped_rest_kept() {
        let registry = ProfileRegistry::builtin();
        let ptsb = registry.get("ptsb").unwrap();
        let stmt = statement(vec![
            row(1, &["05JAN24", "Coffee Shop", "4.50", "", "1,000.00"]),
            row(2, &["5?JAN24", "Smudged", "9.99", "", "990.01"]),
            row(3, &["06JAN24", "LIDL", "20.00", "", "970.01"]),
        ]);

        let out = normalize_statement(&stmt, ptsb);
        assert_eq!(out.transactions.len(), 2);
        assert_eq!(out.rejected, [(2, NormalizeError::InvalidDate("5?JAN24".to_string()))]);
        assert!(out.transactions.iter().all(|t| t.description != "Smudged"));
    }

    #[test]
    fn test_duplicate_rows_collapse() {
        let registry = ProfileRegistry::builtin();
        let ptsb = registry.get("ptsb").unwrap();
        let stmt = statement(vec![
            row(1, &["05JAN24", "Coffee Shop", "4.50", "", "1,000.00"]),
            row(2, &["05JAN24", "Coffee Shop", "4.50", "", "1,000.00"]),
            // same purchase, different balance: a genuine second coffee
            row(3, &["05JAN24", "Coffee Shop", "4.50", "", "995.50"]),
        ]);

        let out = normalize_statement(&stmt, ptsb);
        assert_eq!(out.transactions.len(), 2);
        assert_eq!(out.duplicates, 1);
        assert_eq!(out.transactions[0].source_row, 1);
        assert_eq!(out.transactions[1].source_row, 3);
    }

    #[test]
    fn test_statement_period_from_document() {
        let registry = ProfileRegistry::builtin();
        let ptsb = registry.get("ptsb").unwrap();
        let mut stmt = statement(vec![
            row(1, &["30DEC23", "Carried over", "1.00", "", ""]),
            row(2, &["02JAN24", "In range", "1.00", "", ""]),
        ]);
        stmt.period = Some(RawPeriod {
            from: "01JAN24".to_string(),
            to: "31JAN24".to_string(),
        });

        let out = normalize_statement(&stmt, ptsb);
        assert_eq!(out.transactions.len(), 1);
        assert_eq!(out.transactions[0].description, "In range");
        assert_eq!(out.rejected.len(), 1);
    }
}
