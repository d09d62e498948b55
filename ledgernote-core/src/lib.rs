//! ledgernote-core: transaction records, monthly buckets and the numbers derived from them

pub mod bucket;
pub mod category;
pub mod money;
pub mod transaction;

pub use bucket::{DailyTotals, MonthKey, MonthlyBucket, MonthlyReport, aggregate};
pub use category::{Category, categorize};
pub use money::{format_amount, format_optional_amount};
pub use transaction::{Direction, Transaction};
