//! Single outbound API call.
//!
//! The dispatcher attaches credentials and client metadata, sends the
//! request once and normalizes the outcome into [`ApiResult`]. It never
//! touches session or cache state.

use std::sync::Arc;
use tracing::debug;

use super::request::{ApiRequest, ApiResponse};
use crate::auth::{CredentialKind, CredentialStore};
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult, TransportKind};
use crate::traits::{Headers, HttpClient, Response};

pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_DEVICE_ID: &str = "X-Device-Id";
pub const HEADER_CLIENT_VERSION: &str = "X-Client-Version";

#[derive(Clone)]
pub struct Dispatcher {
    http: Arc<dyn HttpClient>,
    store: CredentialStore,
    config: Arc<ApiConfig>,
}

impl Dispatcher {
    pub fn new(http: Arc<dyn HttpClient>, store: CredentialStore, config: ApiConfig) -> Self {
        Self {
            http,
            store,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Send with the currently stored access token.
    ///
    /// A missing token is not an error here; the request goes out without
    /// `Authorization` and the server decides.
    pub async fn send(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let token = if request.authenticated {
            self.store.get(CredentialKind::Access).await
        } else {
            None
        };
        self.send_with_token(request, token.as_deref()).await
    }

    /// Send with an explicit access token (ignored for unauthenticated requests).
    pub async fn send_with_token(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> ApiResult<ApiResponse> {
        let device_id = self.store.device_id().await;
        let token = token.filter(|_| request.authenticated);
        let headers = self.headers(token, &device_id);

        let url = self.config.url_for(&request.path_and_query());
        let body = match &request.body {
            Some(value) => Some(
                serde_json::to_string(value)
                    .map_err(|e| ApiError::transport(TransportKind::Other, e.to_string()))?,
            ),
            None => None,
        };

        let result = self
            .http
            .send(request.method, &url, body.as_deref(), &headers)
            .await;

        let outcome = match result {
            Ok(response) => map_response(response),
            Err(e) => Err(ApiError::from(e)),
        };
        match &outcome {
            Ok(response) => debug!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                "Request succeeded"
            ),
            Err(e) => debug!(
                method = %request.method,
                path = %request.path,
                status = ?e.status(),
                code = e.error_code(),
                "Request failed"
            ),
        }
        outcome
    }

    fn headers(&self, token: Option<&str>, device_id: &str) -> Headers {
        let mut headers = Headers::new();
        if let Some(token) = token {
            headers.insert(HEADER_AUTHORIZATION.to_string(), format!("Bearer {}", token));
        }
        headers.insert(HEADER_DEVICE_ID.to_string(), device_id.to_string());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers.insert(
            HEADER_CLIENT_VERSION.to_string(),
            self.config.client_version.clone(),
        );
        headers
    }
}

/// Map an HTTP response onto the normalized result.
pub(crate) fn map_response(response: Response) -> ApiResult<ApiResponse> {
    let status = response.status;
    if response.is_success() {
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ApiResponse {
                status,
                data: serde_json::Value::Null,
            });
        }
        let data = response
            .json()
            .map_err(|e| ApiError::transport(TransportKind::MalformedResponse, e.to_string()))?;
        return Ok(ApiResponse { status, data });
    }

    let body = response.text();
    if status == 401 {
        Err(ApiError::ExpiredSession { body })
    } else {
        Err(ApiError::Rejected { status, body })
    }
}
