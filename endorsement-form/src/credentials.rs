//! Access tokens for the Google Sheets sink.
//!
//! [`CredentialCache`] owns the load-or-acquire-then-persist lifecycle of an
//! authorized-user token file (`token.json`) and is handed to the sink when it
//! is built. Acquisition can run a browser consent round-trip through a
//! loopback listener, a copy-paste console consent, or a service-account JWT
//! exchange. Every failure here surfaces as [`SinkError::AuthenticationFailed`].

use async_trait::async_trait;
use axum::{Router, extract::Query, extract::State, routing::get};
use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, oneshot};
use tracing::{info, warn};

use crate::config::{AcquisitionMode, CredentialsConfig};
use crate::error::SinkError;

pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
pub const DRIVE_METADATA_SCOPE: &str = "https://www.googleapis.com/auth/drive.metadata.readonly";
pub const SCOPES: [&str; 2] = [SPREADSHEETS_SCOPE, DRIVE_METADATA_SCOPE];

/// Console consent redirects here. Nothing listens, so the browser shows an
/// error page whose address carries the code for the user to paste back.
const CONSOLE_REDIRECT_URI: &str = "http://127.0.0.1";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

fn auth_failed(message: impl Into<String>) -> SinkError {
    SinkError::AuthenticationFailed(message.into())
}

/// Supplies bearer tokens to a remote sink.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, SinkError>;
}

/// A fixed, externally issued token.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, SinkError> {
        Ok(self.0.clone())
    }
}

/// Authorized-user credentials as stored in the token cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedUser {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl AuthorizedUser {
    pub async fn load(path: &Path) -> Result<Option<Self>, SinkError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(auth_failed(format!("{}: {e}", path.display()))),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| auth_failed(format!("malformed token cache {}: {e}", path.display())))
    }

    pub async fn persist(&self, path: &Path) -> Result<(), SinkError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| auth_failed(e.to_string()))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| auth_failed(format!("{}: {e}", path.display())))
    }

    pub fn access_token(&self) -> AccessToken {
        AccessToken {
            token: self.token.clone(),
            expiry: self.expiry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expiry: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now + Duration::seconds(EXPIRY_MARGIN_SECS) < expiry,
            None => true,
        }
    }
}

/// OAuth client registration (`client_secret.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub async fn load(path: &Path) -> Result<Self, SinkError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| auth_failed(format!("{}: {e}", path.display())))?;
        let file: ClientSecretsFile = serde_json::from_str(&raw)
            .map_err(|e| auth_failed(format!("malformed client secrets {}: {e}", path.display())))?;
        file.installed
            .or(file.web)
            .ok_or_else(|| auth_failed("client secrets carry neither an installed nor a web client"))
    }

    pub fn consent_url(&self, redirect_uri: &str) -> Result<Url, SinkError> {
        Url::parse_with_params(
            &self.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", SCOPES.join(" ").as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| auth_failed(format!("invalid auth_uri: {e}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

#[derive(Serialize)]
struct ServiceAccountClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + Duration::seconds(secs))
    }
}

/// Process-wide credential cache injected into the Sheets sink.
pub struct CredentialCache {
    client: reqwest::Client,
    config: CredentialsConfig,
    current: Mutex<Option<AccessToken>>,
}

impl CredentialCache {
    pub fn new(client: reqwest::Client, config: CredentialsConfig) -> Self {
        Self {
            client,
            config,
            current: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CredentialsConfig {
        &self.config
    }

    async fn acquire(&self) -> Result<AccessToken, SinkError> {
        match self.config.mode {
            AcquisitionMode::ServiceAccount => self.service_account_token().await,
            AcquisitionMode::Console | AcquisitionMode::LocalServer => {
                Ok(self.authorized_user().await?.access_token())
            }
        }
    }

    /// Cached file → refresh → fresh consent, persisting whatever was obtained.
    async fn authorized_user(&self) -> Result<AuthorizedUser, SinkError> {
        let cache_path = &self.config.token_cache_path;

        if let Some(cached) = AuthorizedUser::load(cache_path).await? {
            if cached.access_token().is_fresh(Utc::now()) {
                info!(path = %cache_path.display(), "Using cached credentials");
                return Ok(cached);
            }
            if cached.refresh_token.is_some() {
                match self.refresh(&cached).await {
                    Ok(refreshed) => {
                        refreshed.persist(cache_path).await?;
                        info!("Refreshed cached credentials");
                        return Ok(refreshed);
                    }
                    Err(e) => warn!(error = %e, "Token refresh failed, requesting new consent"),
                }
            }
        }

        let secrets = ClientSecrets::load(&self.config.client_secret_path).await?;
        let (code, redirect_uri) = match self.config.mode {
            AcquisitionMode::LocalServer => consent_via_loopback(&secrets).await?,
            _ => consent_via_console(&secrets).await?,
        };
        let user = self.exchange_code(&secrets, &code, &redirect_uri).await?;
        user.persist(cache_path).await?;
        info!(path = %cache_path.display(), "Stored new credentials");
        Ok(user)
    }

    async fn refresh(&self, cached: &AuthorizedUser) -> Result<AuthorizedUser, SinkError> {
        let refresh_token = cached
            .refresh_token
            .as_deref()
            .ok_or_else(|| auth_failed("no refresh token"))?;
        let now = Utc::now();
        let response = self
            .token_request(
                &cached.token_uri,
                &[
                    ("client_id", cached.client_id.as_str()),
                    ("client_secret", cached.client_secret.as_str()),
                    ("refresh_token", refresh_token),
                    ("grant_type", "refresh_token"),
                ],
            )
            .await?;

        Ok(AuthorizedUser {
            token: response.access_token.clone(),
            refresh_token: response
                .refresh_token
                .clone()
                .or_else(|| cached.refresh_token.clone()),
            expiry: response.expiry(now),
            ..cached.clone()
        })
    }

    async fn exchange_code(
        &self,
        secrets: &ClientSecrets,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AuthorizedUser, SinkError> {
        let now = Utc::now();
        let response = self
            .token_request(
                &secrets.token_uri,
                &[
                    ("code", code),
                    ("client_id", secrets.client_id.as_str()),
                    ("client_secret", secrets.client_secret.as_str()),
                    ("redirect_uri", redirect_uri),
                    ("grant_type", "authorization_code"),
                ],
            )
            .await?;

        Ok(AuthorizedUser {
            token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
            token_uri: secrets.token_uri.clone(),
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry: response.expiry(now),
        })
    }

    async fn service_account_token(&self) -> Result<AccessToken, SinkError> {
        let path = &self.config.service_account_path;
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| auth_failed(format!("{}: {e}", path.display())))?;
        let key: ServiceAccountKey = serde_json::from_str(&raw)
            .map_err(|e| auth_failed(format!("malformed service account key: {e}")))?;

        let now = Utc::now();
        let claims = ServiceAccountClaims {
            iss: &key.client_email,
            scope: SCOPES.join(" "),
            aud: &key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + 3600,
        };
        let signing_key = jsonwebtoken::EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| auth_failed(format!("invalid service account private key: {e}")))?;
        let assertion = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
            &claims,
            &signing_key,
        )
        .map_err(|e| auth_failed(format!("failed to sign assertion: {e}")))?;

        let response = self
            .token_request(
                &key.token_uri,
                &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
            )
            .await?;
        info!(client_email = %key.client_email, "Obtained service account token");

        Ok(AccessToken {
            expiry: response.expiry(now),
            token: response.access_token,
        })
    }

    async fn token_request(
        &self,
        token_uri: &str,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, SinkError> {
        let response = self
            .client
            .post(token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| auth_failed(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(auth_failed(format!("token endpoint returned {status}: {body}")));
        }
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| auth_failed(format!("malformed token response: {e}")))
    }
}

#[async_trait]
impl TokenSource for CredentialCache {
    async fn access_token(&self) -> Result<String, SinkError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.token.clone());
        }

        let token = self.acquire().await?;
        let value = token.token.clone();
        *current = Some(token);
        Ok(value)
    }
}

/// Print the consent URL and wait for the user to paste back either the
/// redirected address or the bare code.
async fn consent_via_console(secrets: &ClientSecrets) -> Result<(String, String), SinkError> {
    let url = secrets.consent_url(CONSOLE_REDIRECT_URI)?;
    eprintln!("Please visit this URL to authorize this application:\n{url}");
    eprintln!("After approving, the browser is sent to {CONSOLE_REDIRECT_URI}, which will not load.");
    eprint!("Paste the address from the browser's address bar: ");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .map_err(|e| auth_failed(format!("failed to read authorization code: {e}")))?;
    let code = code_from_pasted(line.trim())?;
    Ok((code, CONSOLE_REDIRECT_URI.to_string()))
}

fn code_from_pasted(input: &str) -> Result<String, SinkError> {
    if input.is_empty() {
        return Err(auth_failed("no authorization code entered"));
    }
    if !input.starts_with("http://") && !input.starts_with("https://") {
        return Ok(input.to_string());
    }

    let url = Url::parse(input)
        .map_err(|e| auth_failed(format!("unreadable redirect address: {e}")))?;
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    match (params.get("code"), params.get("error")) {
        (Some(code), _) => Ok(code.clone()),
        (None, Some(error)) => Err(auth_failed(format!("consent denied: {error}"))),
        (None, None) => Err(auth_failed("redirect address carried no code")),
    }
}

type CodeSender = Arc<Mutex<Option<oneshot::Sender<Result<String, String>>>>>;

async fn receive_code(
    State(sender): State<CodeSender>,
    Query(params): Query<HashMap<String, String>>,
) -> &'static str {
    let outcome = match (params.get("code"), params.get("error")) {
        (Some(code), _) => Ok(code.clone()),
        (None, Some(error)) => Err(error.clone()),
        (None, None) => Err("redirect carried no code".to_string()),
    };
    if let Some(tx) = sender.lock().await.take() {
        let _ = tx.send(outcome);
    }
    "Authorization complete. You may close this window."
}

/// Serve one loopback redirect and hand back the code it carries.
async fn consent_via_loopback(secrets: &ClientSecrets) -> Result<(String, String), SinkError> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| auth_failed(format!("cannot bind loopback listener: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| auth_failed(e.to_string()))?
        .port();
    let redirect_uri = format!("http://127.0.0.1:{port}/");

    let (tx, rx) = oneshot::channel();
    let sender: CodeSender = Arc::new(Mutex::new(Some(tx)));
    let app = Router::new()
        .route("/", get(receive_code))
        .with_state(sender);
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let url = secrets.consent_url(&redirect_uri)?;
    info!(redirect_uri = %redirect_uri, "Waiting for browser consent");
    eprintln!("Please visit this URL to authorize this application:\n{url}");

    let outcome = rx.await;
    server.abort();
    match outcome {
        Ok(Ok(code)) => Ok((code, redirect_uri)),
        Ok(Err(error)) => Err(auth_failed(format!("consent denied: {error}"))),
        Err(_) => Err(auth_failed("consent listener closed before a code arrived")),
    }
}
