use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::AppConfig;
use crate::infra::http::wire::{self, NO_RESPONSE};
use crate::usecase::ports::table_api::ApiError;

#[derive(Debug, Default)]
struct AuthState {
    access_token: Option<String>,
    generation: u64,
    expired: bool,
}

/// JSON-over-HTTP client with bearer auth and a single-flight token refresh.
///
/// A 401 triggers at most one refresh at a time. Requests that hit 401 while
/// a refresh is running wait for it and retry once with the new token. When
/// the refresh fails, every waiter fails with [`ApiError::SessionExpired`]
/// and so does every later request until [`HttpTransport::restore_session`].
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    refresh_path: String,
    csrf_token: Option<String>,
    auth: AsyncMutex<AuthState>,
}

impl HttpTransport {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let mut base = config.api_base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url =
            Url::parse(&base).with_context(|| format!("invalid api_base_url: {base}"))?;
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            client,
            base_url,
            refresh_path: config.refresh_path.trim_start_matches('/').to_string(),
            csrf_token: config.csrf_token.clone(),
            auth: AsyncMutex::new(AuthState {
                access_token: config.access_token.clone(),
                ..AuthState::default()
            }),
        })
    }

    pub async fn restore_session(&self, access_token: Option<String>) {
        let mut auth = self.auth.lock().await;
        auth.access_token = access_token;
        auth.expired = false;
        auth.generation += 1;
        log::info!("session restored");
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.send_json(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.send_json(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.send_json(Method::PUT, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.send_json(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send_json(Method::DELETE, path, None).await
    }

    async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let (token, generation) = self.current_auth().await?;
        let response = self.execute(&method, path, body, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return read_response(response).await;
        }

        log::info!("{method} {path} returned 401, refreshing access token");
        let token = self.refresh(generation).await?;
        let retried = self.execute(&method, path, body, token.as_deref()).await?;
        read_response(retried).await
    }

    async fn current_auth(&self) -> Result<(Option<String>, u64), ApiError> {
        let auth = self.auth.lock().await;
        if auth.expired {
            return Err(ApiError::SessionExpired);
        }
        Ok((auth.access_token.clone(), auth.generation))
    }

    async fn refresh(&self, seen_generation: u64) -> Result<Option<String>, ApiError> {
        // Held across the refresh request, so concurrent callers queue here.
        let mut auth = self.auth.lock().await;
        if auth.expired {
            return Err(ApiError::SessionExpired);
        }
        if auth.generation != seen_generation {
            return Ok(auth.access_token.clone());
        }

        let current = auth.access_token.clone();
        match self.request_new_token(current.as_deref()).await {
            Ok(token) => {
                if token.is_some() {
                    auth.access_token = token;
                }
                auth.generation += 1;
                log::info!("access token refreshed");
                Ok(auth.access_token.clone())
            }
            Err(err) => {
                log::warn!("token refresh failed: {err}");
                auth.expired = true;
                Err(ApiError::SessionExpired)
            }
        }
    }

    async fn request_new_token(&self, current: Option<&str>) -> Result<Option<String>, ApiError> {
        let response = self
            .execute(&Method::GET, &self.refresh_path, None, current)
            .await?;
        let payload = read_response(response).await?;
        Ok(wire::access_token(&payload))
    }

    async fn execute(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| ApiError::Transport(format!("invalid request path {path}: {err}")))?;
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(ACCEPT, "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if !is_safe_method(method) {
            if let Some(csrf) = &self.csrf_token {
                request = request.header("X-CSRFToken", csrf);
            }
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(|err| {
            log::warn!("{method} {path}: {err}");
            ApiError::Transport(NO_RESPONSE.to_string())
        })
    }
}

async fn read_response(response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(|err| {
        log::warn!("failed to read response body: {err}");
        ApiError::Transport(NO_RESPONSE.to_string())
    })?;
    wire::interpret_response(status, &body)
}

fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    /// Local server that only accepts the bearer token `fresh` and counts
    /// hits on the refresh endpoint.
    async fn token_server(refresh_succeeds: bool) -> (AppConfig, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have an address");
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&refreshes);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(answer(stream, refresh_succeeds, Arc::clone(&counter)));
            }
        });

        let config = AppConfig {
            api_base_url: format!("http://{addr}/api/"),
            refresh_path: "auth/refresh/".to_string(),
            access_token: Some("stale".to_string()),
            ..AppConfig::default()
        };
        (config, refreshes)
    }

    async fn answer(mut stream: TcpStream, refresh_succeeds: bool, refreshes: Arc<AtomicUsize>) {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let request = String::from_utf8_lossy(&request).to_ascii_lowercase();
        let (status, body) = if request.starts_with("get /api/auth/refresh/") {
            refreshes.fetch_add(1, Ordering::SeqCst);
            if refresh_succeeds {
                ("200 OK", r#"{"access_token":"fresh"}"#)
            } else {
                ("401 Unauthorized", r#"{"detail":"Token is invalid or expired"}"#)
            }
        } else if request.contains("authorization: bearer fresh") {
            ("200 OK", "[]")
        } else {
            ("401 Unauthorized", r#"{"detail":"Token is invalid or expired"}"#)
        };
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
    }

    #[tokio::test]
    async fn concurrent_401s_share_one_refresh() {
        let (config, refreshes) = token_server(true).await;
        let transport = HttpTransport::new(&config).expect("transport should build");

        let (first, second) = tokio::join!(
            transport.get("main/table-contents/"),
            transport.get("main/table-contents/"),
        );

        assert_eq!(first, Ok(serde_json::json!([])));
        assert_eq!(second, Ok(serde_json::json!([])));
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_expires_every_waiter() {
        let (config, refreshes) = token_server(false).await;
        let transport = HttpTransport::new(&config).expect("transport should build");

        let (first, second) = tokio::join!(
            transport.get("main/table-contents/"),
            transport.get("main/table-contents/"),
        );

        assert_eq!(first, Err(ApiError::SessionExpired));
        assert_eq!(second, Err(ApiError::SessionExpired));
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);

        assert_eq!(
            transport.get("main/table-contents/").await,
            Err(ApiError::SessionExpired)
        );
        assert_eq!(refreshes.load(Ordering::SeqCst), 1, "no request after expiry");
    }

    #[test]
    fn only_unsafe_methods_carry_csrf() {
        assert!(is_safe_method(&Method::GET));
        assert!(is_safe_method(&Method::OPTIONS));
        assert!(!is_safe_method(&Method::POST));
        assert!(!is_safe_method(&Method::PATCH));
        assert!(!is_safe_method(&Method::DELETE));
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let config = AppConfig {
            api_base_url: "http://localhost:8000/api".to_string(),
            ..AppConfig::default()
        };
        let transport = HttpTransport::new(&config).expect("transport should build");
        assert_eq!(transport.base_url.as_str(), "http://localhost:8000/api/");
        assert_eq!(
            transport
                .base_url
                .join("main/add-row/")
                .expect("join should work")
                .as_str(),
            "http://localhost:8000/api/main/add-row/"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let config = AppConfig {
            api_base_url: "not a url".to_string(),
            ..AppConfig::default()
        };
        assert!(HttpTransport::new(&config).is_err());
    }

    #[tokio::test]
    async fn expired_session_fails_fast_until_restored() {
        let transport = HttpTransport::new(&AppConfig::default()).expect("transport should build");
        transport.auth.lock().await.expired = true;

        assert_eq!(
            transport.get("main/table-contents/").await,
            Err(ApiError::SessionExpired)
        );
        assert_eq!(transport.refresh(0).await, Err(ApiError::SessionExpired));

        transport.restore_session(Some("fresh".to_string())).await;
        let (token, generation) = transport
            .current_auth()
            .await
            .expect("session should be usable again");
        assert_eq!(token.as_deref(), Some("fresh"));
        assert_eq!(generation, 1);

        // A caller that saw an older generation reuses the newer token.
        assert_eq!(transport.refresh(0).await, Ok(Some("fresh".to_string())));
    }
}
