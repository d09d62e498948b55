//! Deterministic spending categories assigned from statement descriptions.
//!
//! Bank statements carry no merchant category, so the rules below look at
//! upper-cased description keywords only, matched on word boundaries.
//! First match wins.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transaction::{Direction, Transaction};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Income,
    Groceries,
    Dining,
    Transport,
    Utilities,
    Housing,
    Subscriptions,
    Shopping,
    Transfers,
    Fees,
    Cash,
    Uncategorized,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::Income => "Income",
            Category::Groceries => "Groceries",
            Category::Dining => "Food & dining",
            Category::Transport => "Transport",
            Category::Utilities => "Utilities",
            Category::Housing => "Housing",
            Category::Subscriptions => "Subscriptions",
            Category::Shopping => "Shopping",
            Category::Transfers => "Transfers",
            Category::Fees => "Fees & interest",
            Category::Cash => "Cash",
            Category::Uncategorized => "Uncategorized",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const RULES: &[(Category, &[&str])] = &[
    (Category::Fees, &["FEE", "INTEREST", "CHARGES", "STAMP DUTY"]),
    (Category::Cash, &["ATM", "CASH WITHDRAWAL", "LODGEMENT"]),
    (
        Category::Transfers,
        &["TRANSFER", "TFR", "REVOLUT", "SEPA", "STANDING ORDER", "ZELLE"],
    ),
    (
        Category::Groceries,
        &["TESCO", "LIDL", "ALDI", "DUNNES", "SUPERVALU", "CENTRA", "SPAR", "GROCERY"],
    ),
    (
        Category::Dining,
        &["RESTAURANT", "CAFE", "COFFEE", "DELIVEROO", "JUST EAT", "MCDONALDS", "BAR"],
    ),
    (
        Category::Transport,
        &["LEAP", "IRISH RAIL", "DUBLIN BUS", "UBER", "FREENOW", "FUEL", "CIRCLE K", "PARKING"],
    ),
    (
        Category::Utilities,
        &["ELECTRIC", "ENERGIA", "BORD GAIS", "IRISH WATER", "EIR", "VIRGIN MEDIA", "VODAFONE", "THREE"],
    ),
    (Category::Housing, &["RENT", "MORTGAGE", "LANDLORD", "PROPERTY"]),
    (
        Category::Subscriptions,
        &["NETFLIX", "SPOTIFY", "APPLE.COM", "GOOGLE", "AMAZON PRIME", "DISNEY", "MICROSOFT"],
    ),
    (Category::Shopping, &["AMAZON", "PENNEYS", "PRIMARK", "IKEA", "ARGOS", "EBAY"]),
];

/// Categorize one transaction.
/// Priority: keyword rules > direction (credits fall back to income) > uncategorized.
pub fn categorize(txn: &Transaction) -> Category {
    let desc = txn.description.to_uppercase();

    for (category, keywords) in RULES {
        if keywords.iter().any(|k| contains_word(&desc, k)) {
            return *category;
        }
    }

    match txn.direction {
        Direction::Credit => Category::Income,
        Direction::Debit => Category::Uncategorized,
    }
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + word.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
    })
}
