//! ledgernote-ingest: locate transaction tables in MinerU markdown and turn
//! their rows into typed transactions using per-bank format profiles.

pub mod extract;
pub mod normalize;
pub mod profile;
pub mod types;

pub use extract::{ExtractError, StatementFiles, TableMarker, discover_markdowns, extract_file};
pub use normalize::{NormalizeError, NormalizedStatement, normalize_row, normalize_statement};
pub use profile::{AmountLayout, BankFormatProfile, ProfileError, ProfileRegistry, ProfileSpec};
pub use types::{ExtractedStatement, RawPeriod, RawRow};
