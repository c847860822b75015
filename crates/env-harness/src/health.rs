//! Health checks against a deployed environment's control-plane API.
//!
//! An environment is healthy when a session can be established with its
//! credential and an authenticated request to `/api` is not rejected. Other
//! statuses from `/api` still prove the session works, since the endpoint
//! itself is not guaranteed to answer 2xx. A single probe makes
//! no retries; [`crate::readiness::wait_until_healthy`] layers polling on top.

use crate::descriptor::EnvironmentDescriptor;
use crate::error::HarnessError;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Default bound on a single health probe.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Cookie names the service uses for its session id.
const SESSION_COOKIES: &[&str] = &["sid", "_SSID"];

const SID_HEADER: &str = "X-FTL-SID";
const CSRF_HEADER: &str = "X-FTL-CSRF";

#[derive(Serialize)]
struct AuthRequest<'a> {
    password: &'a str,
    totp: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    session: Option<SessionData>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionData {
    #[serde(default)]
    valid: bool,
    sid: Option<String>,
    csrf: Option<String>,
}

/// Authenticated session with one environment.
#[derive(Debug, Clone)]
pub struct ServiceSession {
    client: Client,
    base_url: String,
    sid: Option<SecretString>,
    csrf: Option<SecretString>,
}

impl ServiceSession {
    /// Establish a session with the given credential.
    ///
    /// Succeeds when the service answers 2xx and either sets a session cookie
    /// or reports a valid session in the body.
    #[instrument(skip_all, name = "env_harness.health.authenticate", fields(base_url = %base_url))]
    pub async fn authenticate(
        base_url: &str,
        password: &SecretString,
        timeout: Duration,
    ) -> Result<Self, HarnessError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| HarnessError::Session(format!("failed to build HTTP client: {e}")))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let response = client
            .post(format!("{base_url}/api/auth"))
            .header("X-Requested-With", "XMLHttpRequest")
            .json(&AuthRequest {
                password: password.expose_secret(),
                totp: None,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarnessError::Session(format!(
                "authentication returned status {status}"
            )));
        }

        let cookie_set = response
            .cookies()
            .any(|c| SESSION_COOKIES.contains(&c.name()));
        // A non-JSON body is fine when the cookie already proves the session.
        let body: AuthResponse = response.json().await.unwrap_or_default();
        let session = body.session.unwrap_or_default();

        if !cookie_set && !session.valid {
            return Err(HarnessError::Session(
                "authentication did not establish a session".to_string(),
            ));
        }

        debug!(
            target: "env_harness.health",
            cookie = cookie_set,
            body_session = session.valid,
            "Session established"
        );

        Ok(Self {
            client,
            base_url,
            sid: session.sid.map(SecretString::from),
            csrf: session.csrf.map(SecretString::from),
        })
    }

    fn session_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        for (name, value) in [(SID_HEADER, &self.sid), (CSRF_HEADER, &self.csrf)] {
            if let Some(value) = value {
                if let Ok(mut v) = HeaderValue::from_str(value.expose_secret()) {
                    v.set_sensitive(true);
                    headers.insert(name, v);
                }
            }
        }
        headers
    }

    /// Authenticated GET returning the JSON body.
    pub async fn query(&self, path: &str) -> Result<serde_json::Value, HarnessError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .headers(self.session_headers())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarnessError::Session(format!(
                "GET {path} returned status {status}"
            )));
        }
        Ok(response.json().await?)
    }

    /// Authenticated GET that only checks the status.
    pub async fn check(&self, path: &str) -> Result<(), HarnessError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .headers(self.session_headers())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(HarnessError::Session(format!(
                "GET {path} returned status {status}"
            )))
        }
    }

    /// Authenticated GET `/api` that fails only when the session is rejected.
    pub async fn verify_access(&self) -> Result<(), HarnessError> {
        let response = self
            .client
            .get(format!("{}/api", self.base_url))
            .headers(self.session_headers())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(HarnessError::Session(
                "GET /api returned 401, session rejected".to_string(),
            ));
        }
        debug!(target: "env_harness.health", status = %status, "API access verified");
        Ok(())
    }
}

/// Health probe for a deployed environment.
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync {
    /// One probe, no retries. Any failure reads as unhealthy.
    async fn is_healthy(&self, descriptor: &EnvironmentDescriptor) -> bool;
}

/// Probe that authenticates and performs one API request.
#[derive(Debug, Clone)]
pub struct HttpHealthChecker {
    timeout: Duration,
}

impl Default for HttpHealthChecker {
    fn default() -> Self {
        Self::new(DEFAULT_HEALTH_TIMEOUT)
    }
}

impl HttpHealthChecker {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Probe a base URL directly.
    pub async fn check_url(&self, base_url: &str, credential: &SecretString) -> bool {
        let result = async {
            let session = ServiceSession::authenticate(base_url, credential, self.timeout).await?;
            session.verify_access().await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                debug!(target: "env_harness.health", base_url = %base_url, error = %e, "Health probe failed");
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl HealthProbe for HttpHealthChecker {
    async fn is_healthy(&self, descriptor: &EnvironmentDescriptor) -> bool {
        self.check_url(&descriptor.base_url(), descriptor.credential())
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn password() -> SecretString {
        SecretString::from("test-password-1234")
    }

    async fn mount_api_ok(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_healthy_via_session_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .and(body_json(serde_json::json!({"password": "test-password-1234", "totp": null})))
            .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=abc123; Path=/"))
            .expect(1)
            .mount(&server)
            .await;
        mount_api_ok(&server).await;

        let checker = HttpHealthChecker::new(Duration::from_secs(2));
        assert!(checker.check_url(&server.uri(), &password()).await);
    }

    #[tokio::test]
    async fn test_healthy_via_body_session_sends_session_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "session": {"valid": true, "sid": "s1", "csrf": "c1"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(header("X-FTL-SID", "s1"))
            .and(header("X-FTL-CSRF", "c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let session = ServiceSession::authenticate(&server.uri(), &password(), Duration::from_secs(2))
            .await
            .unwrap();
        let body = session.query("/api").await.unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_rejected_credential_is_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        mount_api_ok(&server).await;

        let checker = HttpHealthChecker::new(Duration::from_secs(2));
        assert!(!checker.check_url(&server.uri(), &password()).await);
    }

    #[tokio::test]
    async fn test_success_without_session_is_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "session": {"valid": false}
            })))
            .mount(&server)
            .await;

        let err = ServiceSession::authenticate(&server.uri(), &password(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Session(_)));
    }

    async fn mount_cookie_auth(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=abc; Path=/"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_rejected_api_request_is_unhealthy() {
        let server = MockServer::start().await;
        mount_cookie_auth(&server).await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let checker = HttpHealthChecker::new(Duration::from_secs(2));
        assert!(!checker.check_url(&server.uri(), &password()).await);
    }

    #[tokio::test]
    async fn test_authenticated_non_2xx_api_is_healthy() {
        let server = MockServer::start().await;
        mount_cookie_auth(&server).await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let checker = HttpHealthChecker::new(Duration::from_secs(2));
        assert!(checker.check_url(&server.uri(), &password()).await);
    }

    #[tokio::test]
    async fn test_check_still_requires_success() {
        let server = MockServer::start().await;
        mount_cookie_auth(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/stats/summary"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let session = ServiceSession::authenticate(&server.uri(), &password(), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(session.check("/api/stats/summary").await.is_err());
    }

    #[tokio::test]
    async fn test_slow_service_is_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let checker = HttpHealthChecker::new(Duration::from_millis(200));
        assert!(!checker.check_url(&server.uri(), &password()).await);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unhealthy() {
        let checker = HttpHealthChecker::new(Duration::from_millis(500));
        assert!(!checker.check_url("http://127.0.0.1:1", &password()).await);
    }
}
