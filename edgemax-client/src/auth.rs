//! Appliance login and session keepalive.
//!
//! The web UI hands out a `PHPSESSID` cookie on a successful form login. The
//! cookie value doubles as the `SESSION_ID` of the stream subscription and
//! stays valid as long as the heartbeat endpoint is polled.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ApplianceConfig, TlsConfig};
use crate::error::{ClientError, Result};
use crate::tls;

/// Name of the session cookie set by the appliance.
pub const SESSION_COOKIE: &str = "PHPSESSID";

/// Establishes an authenticated session.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    async fn authenticate(&self) -> Result<AuthSession>;
}

/// An authenticated session.
///
/// Dropping it stops the keepalive task, if any.
pub struct AuthSession {
    session_id: String,
    username: String,
    keepalive: Option<JoinHandle<()>>,
}

impl AuthSession {
    pub fn new(session_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            username: username.into(),
            keepalive: None,
        }
    }

    /// Attach the task that keeps this session alive.
    pub fn with_keepalive(mut self, handle: JoinHandle<()>) -> Self {
        self.keepalive = Some(handle);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("username", &self.username)
            .field("keepalive", &self.keepalive.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        if let Some(handle) = self.keepalive.take() {
            handle.abort();
        }
    }
}

/// Form login against the appliance web UI.
///
/// Every login starts from an empty cookie jar so a stale session cookie can
/// never satisfy a failed login.
pub struct ApplianceAuthenticator {
    config: ApplianceConfig,
    login_url: Url,
    heartbeat_url: Url,
}

impl ApplianceAuthenticator {
    pub fn new(config: &ApplianceConfig) -> Result<Self> {
        // Fail early on unusable TLS settings.
        http_client(&config.tls, Arc::new(Jar::default()))?;

        Ok(Self {
            config: config.clone(),
            login_url: config.base_url()?,
            heartbeat_url: config.heartbeat_url()?,
        })
    }

    fn spawn_keepalive(&self, client: reqwest::Client) -> JoinHandle<()> {
        let url = self.heartbeat_url.clone();
        let interval = self.config.keepalive_interval();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                send_heartbeat(&client, &url).await;
            }
        })
    }
}

fn http_client(tls_config: &TlsConfig, jar: Arc<Jar>) -> Result<reqwest::Client> {
    let builder = reqwest::Client::builder().cookie_provider(jar);
    tls::configure_http(builder, tls_config)?
        .build()
        .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))
}

#[async_trait]
impl Authenticator for ApplianceAuthenticator {
    async fn authenticate(&self) -> Result<AuthSession> {
        let username = &self.config.username;
        debug!(url = %self.login_url, user = %username, "Logging in");

        let jar = Arc::new(Jar::default());
        let client = http_client(&self.config.tls, jar.clone())?;

        let form = [
            ("username", username.as_str()),
            ("password", self.config.password.as_str()),
        ];
        let response = client
            .post(self.login_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| ClientError::transport(format!("login request failed: {}", e)))?;

        let status = response.status();
        let session_id = jar
            .cookies(&self.login_url)
            .and_then(|header| header.to_str().ok().and_then(session_cookie));

        let Some(session_id) = session_id else {
            return Err(ClientError::auth(format!(
                "no {} cookie in login response (status {})",
                SESSION_COOKIE, status
            )));
        };

        if status != reqwest::StatusCode::OK {
            return Err(ClientError::auth(format!(
                "login rejected with status {}",
                status
            )));
        }

        info!(user = %username, "Logged in");
        let keepalive = self.spawn_keepalive(client);
        Ok(AuthSession::new(session_id, username.clone()).with_keepalive(keepalive))
    }
}

async fn send_heartbeat(client: &reqwest::Client, url: &Url) {
    let mut url = url.clone();
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    url.set_query(Some(&format!("_={}", nanos)));

    debug!("Renewing session");
    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => debug!("Session renewed"),
        Ok(response) => warn!(status = %response.status(), "Heartbeat rejected"),
        Err(e) => warn!(error = %e, "Heartbeat failed"),
    }
}

/// Extract the session cookie from a `Cookie` header value.
pub fn session_cookie(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
