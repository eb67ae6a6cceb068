//! Mock HTTP client for testing.
//!
//! Provides a configurable mock HTTP client that can return predefined
//! responses or errors, or compute them from the incoming request.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::traits::{Headers, HttpClient, HttpError, Method, Response};

/// A recorded HTTP request for verification in tests.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: Method,
    /// Request URL
    pub url: String,
    /// Request headers
    pub headers: Headers,
    /// Request body
    pub body: Option<String>,
}

impl RecordedRequest {
    /// Bearer token sent with the request, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get("Authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

type Handler = Arc<dyn Fn(&RecordedRequest) -> MockResponse + Send + Sync>;

/// Configuration for a mock response.
#[derive(Clone)]
pub enum MockResponse {
    /// Return a response
    Success(Response),
    /// Return a transport error
    Error(HttpError),
    /// Compute the response from the request
    Handler(Handler),
}

impl MockResponse {
    /// JSON response with the given status.
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        MockResponse::Success(Response::json_body(status, &value))
    }

    /// Empty response with the given status.
    pub fn status(status: u16) -> Self {
        MockResponse::Success(Response::new(status, Bytes::new()))
    }

    /// Response computed per request.
    pub fn handler<F>(f: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        MockResponse::Handler(Arc::new(f))
    }
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MockResponse::Success(r) => f.debug_tuple("Success").field(&r.status).finish(),
            MockResponse::Error(e) => f.debug_tuple("Error").field(e).finish(),
            MockResponse::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

/// Mock HTTP client for testing.
///
/// Responses are matched by exact URL first, then by the longest matching
/// URL prefix, then the default. Clones share configuration and recordings.
///
/// # Example
///
/// ```ignore
/// use pocketbank::adapters::mock::{MockHttpClient, MockResponse};
///
/// let client = MockHttpClient::new();
/// client.set_response("https://api.test/accounts", MockResponse::json(200, json!([])));
/// client.get("https://api.test/accounts", &Headers::new()).await?;
/// assert_eq!(client.request_count("https://api.test/accounts"), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    default_response: Arc<Mutex<Option<MockResponse>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a response for a URL (exact or prefix).
    pub fn set_response(&self, url: &str, response: MockResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// Set a default response for URLs without specific matches.
    pub fn set_default_response(&self, response: MockResponse) {
        *self.default_response.lock().unwrap() = Some(response);
    }

    /// Delay responses for a URL prefix, so concurrent callers overlap.
    pub fn set_delay(&self, url: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
    }

    /// Get all recorded requests.
    pub fn get_requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests whose URL starts with `url`.
    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.starts_with(url))
            .count()
    }

    /// Clear all recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    fn lookup<T: Clone>(map: &HashMap<String, T>, url: &str) -> Option<T> {
        if let Some(exact) = map.get(url) {
            return Some(exact.clone());
        }
        map.iter()
            .filter(|(pattern, _)| url.starts_with(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, v)| v.clone())
    }

    fn get_response(&self, url: &str) -> Option<MockResponse> {
        let found = Self::lookup(&self.responses.lock().unwrap(), url);
        found.or_else(|| self.default_response.lock().unwrap().clone())
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
        headers: &Headers,
    ) -> Result<Response, HttpError> {
        let request = RecordedRequest {
            method,
            url: url.to_string(),
            headers: headers.clone(),
            body: body.map(str::to_string),
        };
        self.requests.lock().unwrap().push(request.clone());

        let delay = Self::lookup(&self.delays.lock().unwrap(), url);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut response = self.get_response(url);
        while let Some(MockResponse::Handler(handler)) = &response {
            let next = handler(&request);
            response = Some(next);
        }
        match response {
            Some(MockResponse::Success(response)) => Ok(response),
            Some(MockResponse::Error(err)) => Err(err),
            Some(MockResponse::Handler(_)) => unreachable!("handlers are resolved above"),
            None => Err(HttpError::Other(format!("No mock response for URL: {}", url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_with_response() {
        let client = MockHttpClient::new();
        client.set_response(
            "https://example.com/test",
            MockResponse::Success(Response::new(200, Bytes::from("Hello"))),
        );

        let response = client
            .get("https://example.com/test", &Headers::new())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        let requests = client.get_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Get);
    }

    #[tokio::test]
    async fn test_longest_prefix_wins() {
        let client = MockHttpClient::new();
        client.set_response("https://example.com/api", MockResponse::status(200));
        client.set_response("https://example.com/api/accounts", MockResponse::status(204));

        let response = client
            .get("https://example.com/api/accounts/1", &Headers::new())
            .await
            .unwrap();
        assert_eq!(response.status, 204);

        let response = client
            .get("https://example.com/api/cards", &Headers::new())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_handler_sees_headers() {
        let client = MockHttpClient::new();
        client.set_response(
            "https://example.com/me",
            MockResponse::handler(|req| match req.bearer() {
                Some("good") => MockResponse::status(200),
                _ => MockResponse::status(401),
            }),
        );

        let mut headers = Headers::new();
        headers.insert("Authorization".to_string(), "Bearer bad".to_string());
        let response = client.get("https://example.com/me", &headers).await.unwrap();
        assert_eq!(response.status, 401);

        headers.insert("Authorization".to_string(), "Bearer good".to_string());
        let response = client.get("https://example.com/me", &headers).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_error_response() {
        let client = MockHttpClient::new();
        client.set_response(
            "https://example.com/down",
            MockResponse::Error(HttpError::Timeout("30s".to_string())),
        );
        let result = client.get("https://example.com/down", &Headers::new()).await;
        assert!(matches!(result, Err(HttpError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_no_response_configured() {
        let client = MockHttpClient::new();
        let result = client
            .get("https://example.com/missing", &Headers::new())
            .await;
        assert!(matches!(result, Err(HttpError::Other(_))));
    }

    #[tokio::test]
    async fn test_post_body_recorded_and_counted() {
        let client = MockHttpClient::new();
        client.set_default_response(MockResponse::status(201));
        client
            .post("https://example.com/transfers", r#"{"amount":5}"#, &Headers::new())
            .await
            .unwrap();
        client
            .post("https://example.com/transfers", r#"{"amount":6}"#, &Headers::new())
            .await
            .unwrap();

        assert_eq!(client.request_count("https://example.com/transfers"), 2);
        assert_eq!(
            client.get_requests()[0].body.as_deref(),
            Some(r#"{"amount":5}"#)
        );
        client.clear_requests();
        assert!(client.get_requests().is_empty());
    }
}
