/// API Client — the single point of entry for all backend HTTP calls.
///
/// ARCHITECTURAL RULE: No other module may issue requests directly.
/// All backend interaction MUST go through this module.
use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::ClientError;

const MAX_RETRIES: u32 = 3;

/// HTTP client for the resume backend. Carries the bearer token for the life
/// of the process and injects it into every request.
///
/// GET requests are retried on rate limits, server errors, and connection
/// failures with exponential backoff. Mutating requests (POST/DELETE) run
/// exactly once — a failed job submission must surface to the caller, never
/// be silently replayed.
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    pub fn set_token(&self, token: &str) {
        *write_lock(&self.token) = Some(token.to_string());
    }

    pub fn clear_token(&self) {
        *write_lock(&self.token) = None;
    }

    pub fn token(&self) -> Option<String> {
        read_lock(&self.token).clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Absolute URL for a resource, with the token as a query parameter.
    /// This is the form the backend accepts for artifact links opened
    /// outside the client (PDF viewers, browsers).
    pub fn shareable_url(&self, path: &str) -> String {
        match self.token() {
            Some(token) => format!("{}{}?token={}", self.base_url, path, token),
            None => self.url(path),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self.http.request(method, self.url(path));
        if let Some(token) = self.token() {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// GET returning JSON, with retry on transient failures.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let mut last_error: Option<ClientError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "GET {path} attempt {attempt} failed, retrying after {}ms...",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match self.execute(self.request(Method::GET, path)).await {
                Ok(response) => return parse_json(response).await,
                Err(e) if e.is_transient() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(ClientError::Api {
            status: 0,
            message: format!("GET {path} exhausted {MAX_RETRIES} retries"),
        }))
    }

    /// POST with a JSON body. Single attempt.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self
            .execute(self.request(Method::POST, path).json(body))
            .await?;
        parse_json(response).await
    }

    /// POST a multipart form (file uploads). Single attempt.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
    ) -> Result<T, ClientError> {
        let response = self
            .execute(self.request(Method::POST, path).multipart(form))
            .await?;
        parse_json(response).await
    }

    /// DELETE a resource. Single attempt; the response body is discarded.
    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.execute(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    /// GET raw bytes (artifact downloads).
    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        let response = self.execute(self.request(Method::GET, path)).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Sends the request and maps non-2xx statuses onto `ClientError`.
    async fn execute(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = parse_error_detail(&body);

        match status {
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthenticated),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(message)),
            _ => {
                debug!("API error {status}: {message}");
                Err(ClientError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    Ok(response.json().await?)
}

/// Extracts the `detail` field from a FastAPI error body, falling back to the
/// raw text when the body is not the expected shape.
fn parse_error_detail(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        detail: serde_json::Value,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => match parsed.detail {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        },
        Err(_) => body.to_string(),
    }
}

/// Lock helpers that recover from poisoning instead of panicking; the token
/// is plain data, so a poisoned lock still holds a usable value.
fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_detail_plain_string() {
        let body = r#"{"detail": "Workflow not found"}"#;
        assert_eq!(parse_error_detail(body), "Workflow not found");
    }

    #[test]
    fn test_parse_error_detail_structured() {
        let body = r#"{"detail": {"code": "VALIDATION"}}"#;
        assert_eq!(parse_error_detail(body), r#"{"code":"VALIDATION"}"#);
    }

    #[test]
    fn test_parse_error_detail_falls_back_to_raw_body() {
        assert_eq!(parse_error_detail("Internal Server Error"), "Internal Server Error");
    }

    #[test]
    fn test_shareable_url_appends_token() {
        let client = ApiClient::new("http://localhost:8000/api/v1/", Duration::from_secs(5))
            .expect("client");
        client.set_token("abc123");
        assert_eq!(
            client.shareable_url("/files/workflows/w/v1/resume.pdf"),
            "http://localhost:8000/api/v1/files/workflows/w/v1/resume.pdf?token=abc123"
        );
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client = ApiClient::new("http://localhost:8000/api/v1/", Duration::from_secs(5))
            .expect("client");
        assert_eq!(client.url("/auth/login"), "http://localhost:8000/api/v1/auth/login");
    }
}
