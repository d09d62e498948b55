//! Monthly aggregation: partition a batch of transactions by calendar month
//! and derive the figures every exporter reports.
//!
//! Nothing here is cached. Every metric is recomputed from the bucket's own
//! transactions, so CSV, HTML and charts cannot drift apart and a re-run over
//! the same input always yields the same numbers.

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::category::{Category, categorize};
use crate::transaction::{Direction, Transaction};

/// Calendar month, ordered chronologically, rendered as `YYYY.MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// Every calendar day of the month, in order.
    pub fn days(&self) -> Vec<NaiveDate> {
        let Some(first) = self.first_day() else {
            return Vec::new();
        };
        let Some(next) = first.checked_add_months(Months::new(1)) else {
            return Vec::new();
        };
        first.iter_days().take_while(|d| *d < next).collect()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}.{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .split_once('.')
            .ok_or_else(|| format!("expected YYYY.MM, got '{s}'"))?;
        let year: i32 = y.parse().map_err(|_| format!("bad year in '{s}'"))?;
        let month: u32 = m.parse().map_err(|_| format!("bad month in '{s}'"))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range in '{s}'"));
        }
        Ok(Self { year, month })
    }
}

/// Credit and debit totals for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub credits: Decimal,
    pub debits: Decimal,
}

/// All transactions of one calendar month, sorted ascending by date.
///
/// Same-day transactions keep the order they had in the input batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyBucket {
    key: MonthKey,
    transactions: Vec<Transaction>,
}

impl MonthlyBucket {
    pub fn key(&self) -> MonthKey {
        self.key
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn count(&self) -> usize {
        self.transactions.len()
    }

    /// Total income (credits).
    pub fn total_credits(&self) -> Decimal {
        sum_direction(&self.transactions, Direction::Credit)
    }

    /// Total spending (debits).
    pub fn total_debits(&self) -> Decimal {
        sum_direction(&self.transactions, Direction::Debit)
    }

    /// Credits minus debits.
    pub fn net(&self) -> Decimal {
        self.transactions.iter().map(Transaction::signed_amount).sum()
    }

    /// Largest single transaction by amount; the earliest wins a tie.
    pub fn largest(&self) -> Option<&Transaction> {
        self.transactions
            .iter()
            .reduce(|best, t| if t.amount > best.amount { t } else { best })
    }

    /// One entry per calendar day of the month, zero-filled.
    pub fn daily_totals(&self) -> Vec<DailyTotals> {
        let mut by_day: BTreeMap<NaiveDate, (Decimal, Decimal)> = BTreeMap::new();
        for t in &self.transactions {
            let entry = by_day.entry(t.date).or_default();
            match t.direction {
                Direction::Credit => entry.0 += t.amount,
                Direction::Debit => entry.1 += t.amount,
            }
        }

        self.key
            .days()
            .into_iter()
            .map(|date| {
                let (credits, debits) = by_day.get(&date).copied().unwrap_or_default();
                DailyTotals {
                    date,
                    credits,
                    debits,
                }
            })
            .collect()
    }

    /// Debit totals per category, largest first (ties broken by category order).
    pub fn spending_by_category(&self) -> Vec<(Category, Decimal)> {
        let mut totals: BTreeMap<Category, Decimal> = BTreeMap::new();
        for t in self.transactions.iter().filter(|t| t.is_debit()) {
            *totals.entry(categorize(t)).or_default() += t.amount;
        }
        let mut out: Vec<_> = totals.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1));
        out
    }
}

fn sum_direction(txns: &[Transaction], direction: Direction) -> Decimal {
    txns.iter()
        .filter(|t| t.direction == direction)
        .map(|t| t.amount)
        .sum()
}

/// A full run's worth of buckets, keyed and iterated in calendar order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyReport {
    buckets: BTreeMap<MonthKey, MonthlyBucket>,
}

impl MonthlyReport {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn get(&self, key: MonthKey) -> Option<&MonthlyBucket> {
        self.buckets.get(&key)
    }

    pub fn buckets(&self) -> impl Iterator<Item = &MonthlyBucket> {
        self.buckets.values()
    }

    /// Every transaction across all buckets, sorted by date.
    pub fn all_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.buckets.values().flat_map(|b| b.transactions.iter())
    }

    pub fn transaction_count(&self) -> usize {
        self.buckets.values().map(MonthlyBucket::count).sum()
    }

    pub fn net(&self) -> Decimal {
        self.buckets.values().map(MonthlyBucket::net).sum()
    }
}

/// Partition `transactions` (in extraction order) into monthly buckets.
///
/// The sort is stable, so same-day entries keep their extraction order.
pub fn aggregate(transactions: Vec<Transaction>) -> MonthlyReport {
    let mut buckets: BTreeMap<MonthKey, MonthlyBucket> = BTreeMap::new();

    for txn in transactions {
        let key = MonthKey::of(txn.date);
        buckets
            .entry(key)
            .or_insert_with(|| MonthlyBucket {
                key,
                transactions: Vec::new(),
            })
            .transactions
            .push(txn);
    }

    for bucket in buckets.values_mut() {
        bucket.transactions.sort_by_key(|t| t.date);
    }

    MonthlyReport { buckets }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(
        date: (i32, u32, u32),
        description: &str,
        cents: i64,
        direction: Direction,
        balance_cents: i64,
    ) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            description: description.to_string(),
            amount: Decimal::new(cents, 2),
            direction,
            balance_after: Some(Decimal::new(balance_cents, 2)),
            source_bank_format: "ptsb".to_string(),
            source_file: "stmt.md".to_string(),
            source_row: 0,
        }
    }

    #[test]
    fn test_january_sample_totals() {
        let report = aggregate(vec![
            txn((2024, 1, 5), "Coffee Shop", 450, Direction::Debit, 100000),
            txn((2024, 1, 5), "Salary", 200000, Direction::Credit, 300000),
        ]);

        let jan = report.get(MonthKey { year: 2024, month: 1 }).unwrap();
        assert_eq!(jan.total_debits(), Decimal::new(450, 2));
        assert_eq!(jan.total_credits(), Decimal::new(200000, 2));
        assert_eq!(jan.net(), Decimal::new(199550, 2));
        assert_eq!(jan.count(), 2);
    }

    #[test]
    fn test_no_cross_month_leakage() {
        let report = aggregate(vec![
            txn((2024, 2, 1), "Rent", 120000, Direction::Debit, 0),
            txn((2024, 1, 31), "Salary", 300000, Direction::Credit, 0),
            txn((2024, 1, 12), "TESCO", 5612, Direction::Debit, 0),
        ]);

        assert_eq!(report.len(), 2);
        let jan = report.get("2024.01".parse().unwrap()).unwrap();
        let feb = report.get("2024.02".parse().unwrap()).unwrap();
        assert_eq!(jan.count(), 2);
        assert_eq!(feb.count(), 1);
        assert_eq!(feb.total_credits(), Decimal::ZERO);

        for bucket in report.buckets() {
            assert_eq!(bucket.total_credits() - bucket.total_debits(), bucket.net());
        }
        let all_net: Decimal = report.all_transactions().map(Transaction::signed_amount).sum();
        assert_eq!(report.net(), all_net);
    }

    #[test]
    fn test_same_day_keeps_extraction_order() {
        let report = aggregate(vec![
            txn((2024, 1, 9), "third", 100, Direction::Debit, 0),
            txn((2024, 1, 5), "first", 100, Direction::Debit, 0),
            txn((2024, 1, 9), "fourth", 100, Direction::Debit, 0),
            txn((2024, 1, 5), "second", 100, Direction::Debit, 0),
        ]);

        let names: Vec<_> = report
            .all_transactions()
            .map(|t| t.description.as_str())
            .collect();
        assert_eq!(names, ["first", "second", "third", "fourth"]);
    }

    #[test]
    fn test_aggregate_is_repeatable() {
        let input = vec![
            txn((2024, 1, 5), "Coffee Shop", 450, Direction::Debit, 100000),
            txn((2024, 1, 5), "Salary", 200000, Direction::Credit, 300000),
        ];
        assert_eq!(aggregate(input.clone()), aggregate(input));
    }

    #[test]
    fn test_daily_totals_cover_every_day() {
        let report = aggregate(vec![
            txn((2024, 2, 3), "Coffee", 300, Direction::Debit, 0),
            txn((2024, 2, 3), "Refund", 1000, Direction::Credit, 0),
            txn((2024, 2, 3), "Lunch", 1250, Direction::Debit, 0),
        ]);
        let feb = report.get("2024.02".parse().unwrap()).unwrap();
        let days = feb.daily_totals();

        // 2024 is a leap year
        assert_eq!(days.len(), 29);
        assert_eq!(days[2].debits, Decimal::new(1550, 2));
        assert_eq!(days[2].credits, Decimal::new(1000, 2));
        assert!(days.iter().filter(|d| d.date.day() != 3).all(|d| d.debits.is_zero()));
    }

    #[test]
    fn test_largest_and_breakdown() {
        let report = aggregate(vec![
            txn((2024, 3, 1), "TESCO", 4000, Direction::Debit, 0),
            txn((2024, 3, 2), "LIDL", 2000, Direction::Debit, 0),
            txn((2024, 3, 3), "NETFLIX", 1599, Direction::Debit, 0),
            txn((2024, 3, 4), "Salary", 250000, Direction::Credit, 0),
        ]);
        let mar = report.get("2024.03".parse().unwrap()).unwrap();

        assert_eq!(mar.largest().unwrap().description, "Salary");
        let breakdown = mar.spending_by_category();
        assert_eq!(breakdown[0], (Category::Groceries, Decimal::new(6000, 2)));
        assert_eq!(breakdown[1], (Category::Subscriptions, Decimal::new(1599, 2)));
    }

    #[test]
    fn test_month_key_round_trip_and_order() {
        let key: MonthKey = "2023.12".parse().unwrap();
        assert_eq!(key.to_string(), "2023.12");
        assert!(key < "2024.01".parse::<MonthKey>().unwrap());
        assert!("2024.13".parse::<MonthKey>().is_err());
    }
}
