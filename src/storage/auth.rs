//! Access tokens for the Sheets API
//!
//! [`StaticToken`] hands out a fixed bearer token. [`ServiceAccount`] signs a
//! JWT assertion with a service-account key, exchanges it at the key's token
//! endpoint and caches the access token until shortly before it expires.

use crate::core::{Error, Result, TransportError};
use crate::storage::transport::TransportResult;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// OAuth scope granting read/write access to spreadsheets
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Source of bearer tokens for outgoing API requests
#[async_trait]
pub trait TokenProvider: Send + Sync + fmt::Debug {
    /// A token valid for at least the next request
    async fn token(&self) -> TransportResult<String>;
}

/// A fixed, externally managed bearer token
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap `token`
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> TransportResult<String> {
        Ok(self.0.clone())
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service-account JSON key file this crate uses
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Service account identity, the assertion issuer
    pub client_email: String,
    /// PEM encoded RSA private key
    pub private_key: String,
    /// Key id, sent as the JWT `kid`
    #[serde(default)]
    pub private_key_id: Option<String>,
    /// OAuth token endpoint
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    /// Parse a key from its JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::config(format!("Invalid service account key: {}", e)))
    }

    /// Read a key file as downloaded from the cloud console
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read credentials {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }
}

/// Service-account credentials with cached, self-refreshing access tokens
pub struct ServiceAccount {
    client: Client,
    email: String,
    token_uri: String,
    key_id: Option<String>,
    key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccount {
    /// Credentials for `key`; token requests use `timeout`
    pub fn new(key: ServiceAccountKey, timeout: Duration) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| Error::config(format!("Invalid service account private key: {}", e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            email: key.client_email,
            token_uri: key.token_uri,
            key_id: key.private_key_id,
            key: encoding_key,
            cached: Mutex::new(None),
        })
    }

    /// Service account identity
    pub fn email(&self) -> &str {
        &self.email
    }

    fn assertion(&self) -> TransportResult<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.email,
            scope: SHEETS_SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();
        jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| TransportError::Auth(format!("failed to sign token assertion: {}", e)))
    }

    async fn fetch(&self) -> TransportResult<CachedToken> {
        let assertion = self.assertion()?;
        let response = self
            .client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => TransportError::Quota(body),
                s if s.is_server_error() => TransportError::Unavailable(body),
                _ => TransportError::Auth(format!("token request rejected ({}): {}", status, body)),
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        info!(account = %self.email, expires_in = body.expires_in, "refreshed access token");
        Ok(CachedToken {
            value: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("email", &self.email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenProvider for ServiceAccount {
    async fn token(&self) -> TransportResult<String> {
        // Held across the refresh so concurrent callers share one token request
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }
        debug!(account = %self.email, "access token missing or about to expire");
        let fresh = self.fetch().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use jsonwebtoken::{DecodingKey, Validation};
    use parking_lot::Mutex as SyncMutex;
    use serde_json::{json, Value as JsonValue};
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Endpoint {
        requests: Arc<SyncMutex<Vec<HashMap<String, String>>>>,
        expires_in: u64,
        reject: bool,
    }

    async fn issue(
        State(endpoint): State<Endpoint>,
        Form(form): Form<HashMap<String, String>>,
    ) -> (HttpStatus, Json<JsonValue>) {
        let n = {
            let mut requests = endpoint.requests.lock();
            requests.push(form);
            requests.len()
        };
        if endpoint.reject {
            return (HttpStatus::BAD_REQUEST, Json(json!({ "error": "invalid_grant" })));
        }
        (
            HttpStatus::OK,
            Json(json!({
                "access_token": format!("token-{}", n),
                "expires_in": endpoint.expires_in,
                "token_type": "Bearer"
            })),
        )
    }

    async fn token_endpoint(endpoint: Endpoint) -> String {
        let app = Router::new().route("/token", post(issue)).with_state(endpoint);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/token", addr)
    }

    fn account(token_uri: &str) -> ServiceAccount {
        let key = ServiceAccountKey::from_json(&test_keys::key_json(token_uri)).unwrap();
        ServiceAccount::new(key, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn static_token_is_returned_as_is() {
        let provider = StaticToken::new("abc");
        assert_eq!(provider.token().await.unwrap(), "abc");
        assert_eq!(format!("{:?}", provider), "StaticToken(***)");
    }

    #[tokio::test]
    async fn token_is_fetched_once_and_reused() {
        let endpoint = Endpoint { expires_in: 3600, ..Default::default() };
        let uri = token_endpoint(endpoint.clone()).await;
        let account = account(&uri);

        assert_eq!(account.token().await.unwrap(), "token-1");
        assert_eq!(account.token().await.unwrap(), "token-1");

        let requests = endpoint.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["grant_type"], JWT_BEARER_GRANT);

        let decoding = DecodingKey::from_rsa_pem(test_keys::PUBLIC_PEM.as_bytes()).unwrap();
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[uri.as_str()]);
        let claims = jsonwebtoken::decode::<JsonValue>(&requests[0]["assertion"], &decoding, &validation)
            .unwrap()
            .claims;
        assert_eq!(claims["iss"], "store@project.iam.gserviceaccount.com");
        assert_eq!(claims["scope"], SHEETS_SCOPE);
    }

    #[tokio::test]
    async fn token_near_expiry_is_refreshed() {
        let endpoint = Endpoint { expires_in: 30, ..Default::default() };
        let account = account(&token_endpoint(endpoint.clone()).await);

        assert_eq!(account.token().await.unwrap(), "token-1");
        assert_eq!(account.token().await.unwrap(), "token-2");
        assert_eq!(endpoint.requests.lock().len(), 2);
    }

    #[tokio::test]
    async fn rejected_grant_is_an_auth_error() {
        let endpoint = Endpoint { reject: true, ..Default::default() };
        let account = account(&token_endpoint(endpoint).await);

        assert!(matches!(account.token().await, Err(TransportError::Auth(_))));
    }

    #[test]
    fn key_file_loads_and_bad_keys_are_config_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", test_keys::key_json("http://127.0.0.1:9/token")).unwrap();
        let key = ServiceAccountKey::from_file(file.path()).unwrap();
        assert_eq!(key.private_key_id.as_deref(), Some("key-1"));
        assert!(!format!("{:?}", key).contains("PRIVATE KEY"));

        let mut broken = key.clone();
        broken.private_key = "not a pem".into();
        assert!(ServiceAccount::new(broken, Duration::from_secs(1)).is_err());
        assert!(ServiceAccountKey::from_json(r#"{"client_email": "x"}"#).is_err());
        assert!(ServiceAccountKey::from_file("/nonexistent/key.json").is_err());
    }
}
