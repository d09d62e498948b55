//! Microsoft identity platform: device-code sign-in and token refresh.
//!
//! Order of preference for an access token: a cached one with more than a
//! minute left, then a refresh, then interactive device-code sign-in. The
//! last step is a capability handed in by the caller so headless runs fail
//! with a clear error instead of blocking.

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::thread;
use std::time::{Duration, Instant};

use super::SyncError;
use super::token::{CachedToken, TokenStore};

pub const LOGIN_BASE: &str = "https://login.microsoftonline.com";
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_interval")]
    pub interval: u64,
    pub expires_in: u64,
}

fn default_interval() -> u64 {
    5
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Pending,
    SlowDown,
    Granted(TokenResponse),
}

/// The token endpoints.
pub trait Authority {
    fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, SyncError>;
    fn start_device_code(&self) -> Result<DeviceCode, SyncError>;
    fn poll_device_code(&self, device_code: &str) -> Result<PollOutcome, SyncError>;
}

/// Interactive sign-in, supplied by whoever drives the sync.
pub trait InteractiveAuth {
    fn device_login(&self, authority: &dyn Authority) -> Result<TokenResponse, SyncError>;
}

#[derive(Debug, Deserialize)]
struct TokenReply {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenReply {
    fn into_response(self) -> Result<TokenResponse, SyncError> {
        match self.access_token {
            Some(access_token) => Ok(TokenResponse {
                access_token,
                refresh_token: self.refresh_token,
                expires_in: self.expires_in.unwrap_or(3600),
            }),
            None => Err(SyncError::Auth(self.describe())),
        }
    }

    fn describe(&self) -> String {
        match (&self.error, &self.error_description) {
            (Some(e), Some(d)) => format!("{e}: {d}"),
            (Some(e), None) => e.clone(),
            _ => "token endpoint returned no access token".to_string(),
        }
    }
}

pub struct MicrosoftIdentity {
    http: Client,
    base: String,
    client_id: String,
    scope: String,
}

impl MicrosoftIdentity {
    pub fn new(tenant: &str, client_id: &str, scopes: &[String]) -> Result<Self, SyncError> {
        let tenant = if tenant.trim().is_empty() { "common" } else { tenant.trim() };
        Ok(Self {
            http: Client::builder().timeout(HTTP_TIMEOUT).build()?,
            base: format!("{LOGIN_BASE}/{tenant}/oauth2/v2.0"),
            client_id: client_id.to_string(),
            scope: scopes.join(" "),
        })
    }

    fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenReply, SyncError> {
        let resp = self.http.post(format!("{}/token", self.base)).form(form).send()?;
        Ok(resp.json()?)
    }
}

impl Authority for MicrosoftIdentity {
    fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, SyncError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("scope", self.scope.as_str()),
        ])?
        .into_response()
    }

    fn start_device_code(&self) -> Result<DeviceCode, SyncError> {
        let resp = self
            .http
            .post(format!("{}/devicecode", self.base))
            .form(&[("client_id", self.client_id.as_str()), ("scope", self.scope.as_str())])
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Api {
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }
        Ok(resp.json()?)
    }

    fn poll_device_code(&self, device_code: &str) -> Result<PollOutcome, SyncError> {
        let reply = self.token_request(&[
            ("grant_type", DEVICE_CODE_GRANT),
            ("client_id", self.client_id.as_str()),
            ("device_code", device_code),
        ])?;
        match reply.error.as_deref() {
            Some("authorization_pending") => Ok(PollOutcome::Pending),
            Some("slow_down") => Ok(PollOutcome::SlowDown),
            _ => reply.into_response().map(PollOutcome::Granted),
        }
    }
}

/// Prints the device-code instructions and polls until the user signs in.
pub struct ConsoleDeviceLogin;

impl InteractiveAuth for ConsoleDeviceLogin {
    fn device_login(&self, authority: &dyn Authority) -> Result<TokenResponse, SyncError> {
        let code = authority.start_device_code()?;
        if code.message.is_empty() {
            println!("Open {} and enter the code {}", code.verification_uri, code.user_code);
        } else {
            println!("{}", code.message);
        }

        let deadline = Instant::now() + Duration::from_secs(code.expires_in);
        let mut interval = code.interval.max(1);
        while Instant::now() < deadline {
            thread::sleep(Duration::from_secs(interval));
            match authority.poll_device_code(&code.device_code)? {
                PollOutcome::Granted(token) => return Ok(token),
                PollOutcome::Pending => {}
                PollOutcome::SlowDown => interval += 5,
            }
        }
        Err(SyncError::LoginTimedOut)
    }
}

/// For runs without a terminal.
pub struct Headless;

impl InteractiveAuth for Headless {
    fn device_login(&self, _authority: &dyn Authority) -> Result<TokenResponse, SyncError> {
        Err(SyncError::InteractiveLoginRequired)
    }
}

pub struct TokenProvider<'a> {
    authority: &'a dyn Authority,
    store: &'a dyn TokenStore,
    interactive: &'a dyn InteractiveAuth,
}

impl<'a> TokenProvider<'a> {
    pub fn new(
        authority: &'a dyn Authority,
        store: &'a dyn TokenStore,
        interactive: &'a dyn InteractiveAuth,
    ) -> Self {
        Self {
            authority,
            store,
            interactive,
        }
    }

    pub fn access_token(&self, now: DateTime<Utc>) -> Result<String, SyncError> {
        let cached = self.store.load()?;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            tracing::debug!("using cached access token");
            return Ok(token.access_token.clone());
        }

        if let Some(refresh) = cached.as_ref().and_then(|t| t.refresh_token.as_deref()) {
            match self.authority.refresh(refresh) {
                Ok(resp) => {
                    tracing::debug!("refreshed access token");
                    return self.remember(resp, Some(refresh), now);
                }
                Err(e) => tracing::warn!("token refresh failed: {e}; signing in again"),
            }
        }

        let resp = self.interactive.device_login(self.authority)?;
        self.remember(resp, None, now)
    }

    fn remember(
        &self,
        resp: TokenResponse,
        previous_refresh: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String, SyncError> {
        let refresh_token = resp
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_string));
        let token = CachedToken::new(resp.access_token, refresh_token, resp.expires_in, now);
        self.store.save(&token)?;
        Ok(token.access_token)
    }
}
