//! Bank format profiles: how one bank lays out its transaction table.
//!
//! A profile is plain data (header marker, column positions, date format)
//! plus the amount rule picked by its [`AmountLayout`] variant. Built-in
//! profiles ship with the crate; extra ones come from configuration and may
//! shadow a built-in id.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use ledgernote_core::Direction;

use crate::extract::TableMarker;
use crate::normalize::{NormalizeError, split_amount, signed_amount};
use crate::types::RawRow;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("unknown bank format profile '{id}' (known: {known})")]
    Unknown { id: String, known: String },

    #[error("profile '{id}': {reason}")]
    Invalid { id: String, reason: String },
}

/// Where the money columns are and what their sign means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AmountLayout {
    /// Separate withdrawn/paid-in columns; the filled one decides direction.
    Split { debit: usize, credit: usize },
    /// One signed column.
    Signed {
        amount: usize,
        /// `true` for bank accounts (negative = money out), `false` for
        /// card statements where a positive amount is a charge.
        #[serde(default = "default_negative_is_debit")]
        negative_is_debit: bool,
    },
}

fn default_negative_is_debit() -> bool {
    true
}

impl AmountLayout {
    fn columns(&self) -> Vec<usize> {
        match *self {
            AmountLayout::Split { debit, credit } => vec![debit, credit],
            AmountLayout::Signed { amount, .. } => vec![amount],
        }
    }

    fn rule(&self) -> AmountRule {
        match self {
            AmountLayout::Split { .. } => split_amount,
            AmountLayout::Signed { .. } => signed_amount,
        }
    }
}

/// Resolves a row's positive amount and direction.
pub type AmountRule = fn(&RawRow, &BankFormatProfile) -> Result<(Decimal, Direction), NormalizeError>;

/// Profile as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSpec {
    pub id: String,
    /// Header cells marking the transaction table
    pub header: Vec<String>,
    /// chrono format string, e.g. `%d%b%y` for `05JAN24`
    pub date_format: String,
    #[serde(default)]
    pub date_column: usize,
    #[serde(default = "default_description_column")]
    pub description_column: usize,
    #[serde(default)]
    pub balance_column: Option<usize>,
    pub layout: AmountLayout,
}

fn default_description_column() -> usize {
    1
}

/// A validated, immutable profile ready for normalization.
#[derive(Debug, Clone)]
pub struct BankFormatProfile {
    spec: ProfileSpec,
    marker: TableMarker,
    amount_rule: AmountRule,
}

impl BankFormatProfile {
    pub fn new(spec: ProfileSpec) -> Result<Self, ProfileError> {
        let invalid = |reason: String| ProfileError::Invalid {
            id: spec.id.clone(),
            reason,
        };

        if spec.id.trim().is_empty() {
            return Err(invalid("id is empty".to_string()));
        }
        if spec.header.is_empty() {
            return Err(invalid("header is empty".to_string()));
        }
        if spec.date_format.trim().is_empty() {
            return Err(invalid("date_format is empty".to_string()));
        }

        let width = spec.header.len();
        let mut columns = vec![spec.date_column, spec.description_column];
        columns.extend(spec.balance_column);
        columns.extend(spec.layout.columns());
        if let Some(bad) = columns.iter().find(|c| **c >= width) {
            return Err(invalid(format!(
                "column {bad} is outside the {width}-column header"
            )));
        }

        Ok(Self {
            marker: TableMarker::new(&spec.header),
            amount_rule: spec.layout.rule(),
            spec,
        })
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn spec(&self) -> &ProfileSpec {
        &self.spec
    }

    pub fn marker(&self) -> &TableMarker {
        &self.marker
    }

    pub fn layout(&self) -> AmountLayout {
        self.spec.layout
    }

    pub fn date_column(&self) -> usize {
        self.spec.date_column
    }

    pub fn description_column(&self) -> usize {
        self.spec.description_column
    }

    pub fn balance_column(&self) -> Option<usize> {
        self.spec.balance_column
    }

    pub fn amount(&self, row: &RawRow) -> Result<(Decimal, Direction), NormalizeError> {
        (self.amount_rule)(row, self)
    }

    /// Parse a date cell with this profile's format.
    ///
    /// OCR output sometimes splits compact dates (`05 JAN 24`), so formats
    /// without spaces are retried with all whitespace removed.
    pub fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        let fmt = &self.spec.date_format;
        let trimmed = raw.trim();
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(d);
        }
        if fmt.contains(char::is_whitespace) {
            return None;
        }
        let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
        NaiveDate::parse_from_str(&compact, fmt).ok()
    }
}

/// Built-in profiles, keyed by id.
pub fn builtin_specs() -> Vec<ProfileSpec> {
    let header = |cells: &[&str]| cells.iter().map(|c| c.to_string()).collect::<Vec<_>>();

    vec![
        ProfileSpec {
            id: "ptsb".to_string(),
            header: header(&["Date", "Details", "Withdrawn", "Paid In", "Balance"]),
            date_format: "%d%b%y".to_string(),
            date_column: 0,
            description_column: 1,
            balance_column: Some(4),
            layout: AmountLayout::Split { debit: 2, credit: 3 },
        },
        ProfileSpec {
            id: "signed-iso".to_string(),
            header: header(&["Date", "Description", "Amount", "Balance"]),
            date_format: "%Y-%m-%d".to_string(),
            date_column: 0,
            description_column: 1,
            balance_column: Some(3),
            layout: AmountLayout::Signed {
                amount: 2,
                negative_is_debit: true,
            },
        },
        ProfileSpec {
            id: "us-checking".to_string(),
            header: header(&["Date", "Description", "Amount", "Balance"]),
            date_format: "%m/%d/%Y".to_string(),
            date_column: 0,
            description_column: 1,
            balance_column: Some(3),
            layout: AmountLayout::Signed {
                amount: 2,
                negative_is_debit: true,
            },
        },
        ProfileSpec {
            id: "card".to_string(),
            header: header(&["Date", "Description", "Amount"]),
            date_format: "%m/%d/%Y".to_string(),
            date_column: 0,
            description_column: 1,
            balance_column: None,
            layout: AmountLayout::Signed {
                amount: 2,
                negative_is_debit: false,
            },
        },
    ]
}

/// Profiles keyed by id.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, BankFormatProfile>,
}

impl ProfileRegistry {
    pub fn builtin() -> Self {
        let profiles = builtin_specs()
            .into_iter()
            .filter_map(|spec| BankFormatProfile::new(spec).ok())
            .map(|p| (p.id().to_string(), p))
            .collect();
        Self { profiles }
    }

    /// Built-ins plus configured profiles; a configured id replaces a built-in.
    pub fn with_custom(specs: &[ProfileSpec]) -> Result<Self, ProfileError> {
        let mut registry = Self::builtin();
        for spec in specs {
            let profile = BankFormatProfile::new(spec.clone())?;
            registry.profiles.insert(profile.id().to_string(), profile);
        }
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Result<&BankFormatProfile, ProfileError> {
        self.profiles.get(id).ok_or_else(|| ProfileError::Unknown {
            id: id.to_string(),
            known: self.ids().join(", "),
        })
    }

    pub fn ids(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_valid() {
        let registry = ProfileRegistry::builtin();
        assert_eq!(registry.ids(), ["card", "ptsb", "signed-iso", "us-checking"]);
    }

    #[test]
    fn test_ptsb_dates() {
        let registry = ProfileRegistry::builtin();
        let ptsb = registry.get("ptsb").unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5);
        assert_eq!(ptsb.parse_date("05JAN24"), expected);
        assert_eq!(ptsb.parse_date("05Jan24"), expected);
        assert_eq!(ptsb.parse_date(" 05 JAN 24 "), expected);
        assert_eq!(ptsb.parse_date("32JAN24"), None);
        assert_eq!(ptsb.parse_date("BALANCE FORWARD"), None);
    }

    #[test]
    fn test_unknown_profile_lists_known_ids() {
        let err = ProfileRegistry::builtin().get("hsbc").unwrap_err();
        assert!(err.to_string().contains("ptsb"));
    }

    #[test]
    fn test_custom_profile_shadows_builtin() {
        let spec = ProfileSpec {
            id: "card".to_string(),
            header: vec!["Posted".into(), "Merchant".into(), "Debit".into(), "Credit".into()],
            date_format: "%d/%m/%Y".to_string(),
            date_column: 0,
            description_column: 1,
            balance_column: None,
            layout: AmountLayout::Split { debit: 2, credit: 3 },
        };
        let registry = ProfileRegistry::with_custom(&[spec]).unwrap();
        let card = registry.get("card").unwrap();
        assert_eq!(card.layout(), AmountLayout::Split { debit: 2, credit: 3 });
    }

    #[test]
    fn test_column_outside_header_rejected() {
        let spec = ProfileSpec {
            id: "broken".to_string(),
            header: vec!["Date".into(), "Details".into(), "Amount".into()],
            date_format: "%Y-%m-%d".to_string(),
            date_column: 0,
            description_column: 1,
            balance_column: Some(3),
            layout: AmountLayout::Signed {
                amount: 2,
                negative_is_debit: true,
            },
        };
        let err = BankFormatProfile::new(spec).unwrap_err();
        assert!(matches!(err, ProfileError::Invalid { .. }));
    }
}
