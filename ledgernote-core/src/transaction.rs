//! The normalized transaction record shared by every stage of the pipeline.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of the account a transaction hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Money leaving the account (withdrawn / spending).
    Debit,
    /// Money entering the account (paid in / income).
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Debit => "debit",
            Direction::Credit => "credit",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debit" => Ok(Direction::Debit),
            "credit" => Ok(Direction::Credit),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

/// A single statement line after normalization.
///
/// `amount` is always strictly positive; `direction` carries the sign.
/// Records are built once by the normalizer and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub direction: Direction,
    /// Running balance printed on the statement, when the row carries one
    pub balance_after: Option<Decimal>,
    /// Identifier of the bank format profile that produced this record
    pub source_bank_format: String,
    /// File the row was extracted from
    pub source_file: String,
    /// Row ordinal within `source_file` (document order)
    pub source_row: usize,
}

impl Transaction {
    pub fn is_debit(&self) -> bool {
        self.direction == Direction::Debit
    }

    pub fn is_credit(&self) -> bool {
        self.direction == Direction::Credit
    }

    /// Positive for credits, negative for debits.
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(direction: Direction) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            description: "Coffee Shop".to_string(),
            amount: Decimal::new(450, 2),
            direction,
            balance_after: Some(Decimal::new(100000, 2)),
            source_bank_format: "ptsb".to_string(),
            source_file: "jan.md".to_string(),
            source_row: 3,
        }
    }

    #[test]
    fn test_signed_amount_follows_direction() {
        assert_eq!(sample(Direction::Debit).signed_amount(), Decimal::new(-450, 2));
        assert_eq!(sample(Direction::Credit).signed_amount(), Decimal::new(450, 2));
    }

    #[test]
    fn test_direction_parse_is_case_insensitive() {
        assert_eq!("Debit".parse::<Direction>().unwrap(), Direction::Debit);
        assert_eq!(" credit ".parse::<Direction>().unwrap(), Direction::Credit);
        assert!("refund".parse::<Direction>().is_err());
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        let json = serde_json::to_string(&Direction::Credit).unwrap();
        assert_eq!(json, "\"credit\"");
    }
}
