//! Outlook authentication via the OAuth 2.0 device authorization grant
//!
//! [`AuthClient`] owns the token lifecycle: it loads a persisted token,
//! refreshes it when it is about to expire and falls back to the interactive
//! device-code flow (RFC 8628) when no usable token remains. Callers go
//! through [`AccessTokenProvider`] before every authorized request.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::error::{AuthError, StoreError};

/// Poll interval used when the server does not specify one
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Added to the poll interval on every `slow_down` response
pub const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Tokens expiring within this many seconds are treated as expired
pub const EXPIRY_MARGIN_SECS: i64 = 10;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_DEVICE_CODE_LIFETIME: u64 = 900;

// ============================================================================
// Tokens
// ============================================================================

/// Persisted OAuth token.
///
/// The JSON layout (`access_token`, `token_type`, `refresh_token`, `expiry`)
/// is shared with other OAuth2 tooling so existing token files keep working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,

    #[serde(default)]
    pub token_type: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    /// Whether the token can be used at `now`, with the safety margin applied
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            // Year 1 is how a zero timestamp round-trips: no expiry.
            Some(expiry) if expiry.year() > 1 => {
                now + chrono::Duration::seconds(EXPIRY_MARGIN_SECS) < expiry
            }
            _ => true,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

/// Reads and writes the token file
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved token. A missing or unparsable file yields `None`.
    pub fn load(&self) -> Result<Option<Token>, StoreError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        match serde_json::from_slice::<Token>(&data) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(
                    "Ignoring corrupt token file {} ({}), a new sign-in is required",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Atomically replace the token file (owner-only permissions)
    pub fn save(&self, token: &Token) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(token).map_err(|source| StoreError::Serialize {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &bytes)
    }
}

// ============================================================================
// Settings and wire types
// ============================================================================

/// Everything the client needs to reach the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub tenant_id: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    /// e.g. `https://login.microsoftonline.com`
    pub authority_url: String,
    pub token_file: PathBuf,
}

impl AuthSettings {
    fn endpoint(&self, name: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/{}",
            self.authority_url.trim_end_matches('/'),
            self.tenant_id,
            name
        )
    }

    pub fn device_authorization_url(&self) -> String {
        self.endpoint("devicecode")
    }

    pub fn token_url(&self) -> String {
        self.endpoint("token")
    }

    fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Response of the device authorization endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    #[serde(alias = "verification_url")]
    pub verification_uri: String,
    #[serde(default = "default_device_code_lifetime")]
    pub expires_in: u64,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_device_code_lifetime() -> u64 {
    DEFAULT_DEVICE_CODE_LIFETIME
}

impl DeviceCode {
    /// Server-requested poll interval, or the default
    pub fn poll_interval(&self) -> Duration {
        match self.interval {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_token(self, previous_refresh: &str, now: DateTime<Utc>) -> Token {
        let refresh_token = match self.refresh_token {
            Some(rt) if !rt.is_empty() => rt,
            _ => previous_refresh.to_string(),
        };
        Token {
            access_token: self.access_token.unwrap_or_default(),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            refresh_token,
            expiry: self
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| now + chrono::Duration::seconds(secs)),
        }
    }
}

/// Result of one exchange at the token endpoint
#[derive(Debug)]
enum Exchange {
    Granted(Token),
    Pending,
    SlowDown,
}

/// Poll interval after a `slow_down` response
pub fn next_interval(current: Duration) -> Duration {
    current + SLOW_DOWN_STEP
}

// ============================================================================
// Operator prompt and cancellation
// ============================================================================

/// Shows the user code and verification page to the operator
pub trait DevicePrompt: Send + Sync {
    fn show(&self, code: &DeviceCode);
}

/// Prints sign-in instructions to stderr
pub struct ConsolePrompt;

impl DevicePrompt for ConsolePrompt {
    fn show(&self, code: &DeviceCode) {
        eprintln!();
        eprintln!("🔐 To sign in, open {} in a browser", code.verification_uri);
        eprintln!("   and enter the code: {}", code.user_code);
        eprintln!();
    }
}

/// Aborts an in-progress device-code wait from another task
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observable state of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoToken,
    AwaitingUserAuthorization,
    Authenticated,
    Failed,
}

// ============================================================================
// Client
// ============================================================================

/// Supplies a bearer token before each authorized request
#[async_trait]
pub trait AccessTokenProvider: Send {
    async fn access_token(&mut self) -> Result<String, AuthError>;
}

pub struct AuthClient {
    settings: AuthSettings,
    http: reqwest::Client,
    store: TokenStore,
    token: Option<Token>,
    loaded: bool,
    state: AuthState,
    prompt: Box<dyn DevicePrompt>,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl AuthClient {
    pub fn new(settings: AuthSettings) -> Self {
        let store = TokenStore::new(settings.token_file.clone());
        let (cancel_tx, _) = watch::channel(false);
        Self {
            settings,
            http: reqwest::Client::new(),
            store,
            token: None,
            loaded: false,
            state: AuthState::NoToken,
            prompt: Box::new(ConsolePrompt),
            cancel_tx: Arc::new(cancel_tx),
        }
    }

    /// Replace the console prompt
    pub fn with_prompt(mut self, prompt: impl DevicePrompt + 'static) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Return a token valid for at least the safety margin.
    ///
    /// Order of preference: the loaded token, a refreshed token, and finally
    /// a fresh device-code sign-in. A failed refresh is logged and falls
    /// through to the device flow.
    pub async fn ensure_token(&mut self) -> Result<Token, AuthError> {
        if !self.loaded {
            self.token = self.store.load()?;
            self.loaded = true;
            if self.token.is_some() {
                debug!("Loaded token from {}", self.store.path().display());
            }
        }

        let now = Utc::now();
        if let Some(token) = &self.token {
            if token.is_valid_at(now) {
                self.state = AuthState::Authenticated;
                return Ok(token.clone());
            }
        }

        if let Some(refresh_token) = self
            .token
            .as_ref()
            .filter(|t| t.has_refresh_token())
            .map(|t| t.refresh_token.clone())
        {
            match self.refresh(&refresh_token).await {
                Ok(token) => {
                    info!("Access token refreshed");
                    return Ok(self.accept(token));
                }
                Err(e) => warn!("Token refresh failed ({}), signing in again", e),
            }
        }

        self.token = None;
        self.state = AuthState::NoToken;
        match self.device_flow().await {
            Ok(token) => Ok(self.accept(token)),
            Err(e) => {
                self.state = AuthState::Failed;
                Err(e)
            }
        }
    }

    fn accept(&mut self, token: Token) -> Token {
        if let Err(e) = self.store.save(&token) {
            warn!("Could not save token: {}", e);
        }
        self.state = AuthState::Authenticated;
        self.token = Some(token.clone());
        token
    }

    async fn device_flow(&mut self) -> Result<Token, AuthError> {
        let code = self.request_device_code().await?;
        self.state = AuthState::AwaitingUserAuthorization;
        info!(
            "Waiting for device sign-in (code expires in {}s)",
            code.expires_in
        );
        self.prompt.show(&code);
        self.poll_for_token(&code).await
    }

    /// Start a device authorization
    pub async fn request_device_code(&self) -> Result<DeviceCode, AuthError> {
        let url = self.settings.device_authorization_url();
        let scope = self.settings.scope();
        let form = [
            ("client_id", self.settings.client_id.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|source| AuthError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| AuthError::Transport {
                url: url.clone(),
                source,
            })?;

        if !status.is_success() {
            return Err(denied_or_endpoint(&url, status.as_u16(), body));
        }
        serde_json::from_str(&body).map_err(|_| AuthError::Endpoint {
            url,
            status: status.as_u16(),
            body,
        })
    }

    /// Poll the token endpoint until the user finishes signing in
    pub async fn poll_for_token(&self, code: &DeviceCode) -> Result<Token, AuthError> {
        let mut interval = code.poll_interval();
        let deadline = Instant::now() + Duration::from_secs(code.expires_in);
        let mut cancelled = self.cancel_tx.subscribe();
        let form = [
            ("grant_type", DEVICE_CODE_GRANT),
            ("device_code", code.device_code.as_str()),
            ("client_id", self.settings.client_id.as_str()),
        ];

        loop {
            if *cancelled.borrow_and_update() {
                return Err(AuthError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(AuthError::DeviceCodeExpired);
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancelled.changed() => {
                    info!("Device sign-in cancelled");
                    return Err(AuthError::Cancelled);
                }
            }

            match self.exchange(&form, "").await? {
                Exchange::Granted(token) => return Ok(token),
                Exchange::Pending => debug!("Authorization pending"),
                Exchange::SlowDown => {
                    interval = next_interval(interval);
                    debug!("Server asked to slow down, polling every {:?}", interval);
                }
            }
        }
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<Token, AuthError> {
        let scope = self.settings.scope();
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.settings.client_id.as_str()),
            ("scope", scope.as_str()),
        ];

        match self.exchange(&form, refresh_token).await? {
            Exchange::Granted(token) => Ok(token),
            Exchange::Pending => Err(AuthError::Denied {
                code: "authorization_pending".to_string(),
                description: None,
            }),
            Exchange::SlowDown => Err(AuthError::Denied {
                code: "slow_down".to_string(),
                description: None,
            }),
        }
    }

    /// POST a grant to the token endpoint.
    ///
    /// Error responses arrive with a 4xx status and a JSON `error` field,
    /// so the body is decoded before the status is looked at.
    async fn exchange(
        &self,
        form: &[(&str, &str)],
        previous_refresh: &str,
    ) -> Result<Exchange, AuthError> {
        let url = self.settings.token_url();
        let response = self
            .http
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|source| AuthError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|source| AuthError::Transport {
                url: url.clone(),
                source,
            })?;

        let parsed: TokenResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) => return Err(AuthError::Endpoint { url, status, body }),
        };

        match parsed.error.as_deref() {
            Some("authorization_pending") => return Ok(Exchange::Pending),
            Some("slow_down") => return Ok(Exchange::SlowDown),
            Some("expired_token") => return Err(AuthError::DeviceCodeExpired),
            Some(code) => {
                return Err(AuthError::Denied {
                    code: code.to_string(),
                    description: parsed.error_description,
                })
            }
            None => {}
        }

        if parsed.access_token.as_deref().map_or(true, str::is_empty) {
            return Err(AuthError::Endpoint { url, status, body });
        }
        Ok(Exchange::Granted(
            parsed.into_token(previous_refresh, Utc::now()),
        ))
    }
}

#[async_trait]
impl AccessTokenProvider for AuthClient {
    async fn access_token(&mut self) -> Result<String, AuthError> {
        Ok(self.ensure_token().await?.access_token)
    }
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn denied_or_endpoint(url: &str, status: u16, body: String) -> AuthError {
    match serde_json::from_str::<OAuthErrorBody>(&body) {
        Ok(err) => AuthError::Denied {
            code: err.error,
            description: err.error_description,
        },
        Err(_) => AuthError::Endpoint {
            url: url.to_string(),
            status,
            body,
        },
    }
}
