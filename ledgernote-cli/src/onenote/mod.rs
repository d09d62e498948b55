//! One-way sync of the rendered report into Microsoft OneNote.
//!
//! Token handling, the Graph REST calls and the upsert logic are split so
//! the upsert can run against an in-memory OneNote in tests.

pub mod auth;
pub mod graph;
pub mod sync;
pub mod token;

use std::path::PathBuf;
use thiserror::Error;

pub use auth::{ConsoleDeviceLogin, Headless, InteractiveAuth, MicrosoftIdentity, TokenProvider};
pub use graph::GraphClient;
pub use sync::sync_report;
pub use token::FileTokenStore;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("graph api returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("sign-in failed: {0}")]
    Auth(String),

    #[error("interactive sign-in required; re-run from a terminal")]
    InteractiveLoginRequired,

    #[error("device code sign-in timed out")]
    LoginTimedOut,

    #[error("token cache {path}: {message}")]
    TokenCache { path: PathBuf, message: String },

    #[error("unexpected graph response: {0}")]
    Decode(String),
}
