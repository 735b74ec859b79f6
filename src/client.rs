//! API Client Module
//!
//! HTTP communication with the TourFleet API. A client is immutable and
//! bound to one token value; the session layer builds a fresh client on
//! every token change so in-flight requests keep the headers they were
//! issued with.

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::profile::UserProfile;

/// Header carrying the session secret. Sent on every request, empty when no
/// token is held, so the server decides whether anonymous access is allowed.
pub const AUTH_HEADER: &str = "authtoken";

/// API client bound to the TourFleet backend and one token value.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    /// Create a client for the given base URL and token.
    ///
    /// `http` is the shared connection pool; rebuilding a client on token
    /// change reuses it.
    pub fn new(base_url: &str, token: Option<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http,
        }
    }

    /// Build the shared HTTP connection pool.
    pub fn build_http() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client")
    }

    /// The token this client was built with.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, payload: Payload) -> Result<ApiResponse, ApiError> {
        self.send(Method::POST, path, Some(payload)).await
    }

    pub async fn patch(&self, path: &str, payload: Payload) -> Result<ApiResponse, ApiError> {
        self.send(Method::PATCH, path, Some(payload)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(Method::DELETE, path, None).await
    }

    /// Authenticate and return the issued token.
    pub async fn login(
        &self,
        identity: LoginIdentity,
        password: &str,
    ) -> Result<String, ApiError> {
        info!("Logging in via {}", identity.kind());

        let request = LoginRequest {
            identity,
            password: password.to_string(),
        };
        let response = self
            .post("/api/user/login", Payload::json(&request)?)
            .await?;
        let data: LoginResponse = response.json()?;

        info!("Login accepted");
        Ok(data.auth_token)
    }

    /// Fetch the profile of the user the current token belongs to.
    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        let response = self.get("/api/user/").await?;
        response.json()
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        payload: Option<Payload>,
    ) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method, url)
            .header(AUTH_HEADER, self.token.as_deref().unwrap_or(""));
        if let Some(payload) = payload {
            request = payload.apply(request)?;
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::read(response).await
    }

    async fn read(response: reqwest::Response) -> Result<ApiResponse, ApiError> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?
            .to_vec();

        if status.is_success() {
            return Ok(ApiResponse {
                status: status.as_u16(),
                body,
            });
        }

        let message = server_message(&body, status);
        match status.as_u16() {
            401 | 403 => Err(ApiError::Auth {
                status: status.as_u16(),
                message,
            }),
            400..=499 => Err(ApiError::Validation {
                status: status.as_u16(),
                message,
            }),
            _ => Err(ApiError::Server {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

/// Pull the server-provided message out of an error body, falling back to
/// the raw text and then the status reason.
fn server_message(body: &[u8], status: StatusCode) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(message) = value.get(key).and_then(|m| m.as_str()) {
                return message.to_string();
            }
        }
    }

    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        text
    }
}

/// Successful response: status plus raw body.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Decode the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::Parse(e.to_string()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// Request body variants. Encoding is exhaustive over this union rather than
/// inferred from field shapes at runtime.
#[derive(Debug, Clone)]
pub enum Payload {
    Json(serde_json::Value),
    Multipart(Vec<MultipartField>),
}

impl Payload {
    /// JSON payload from any serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ApiError> {
        serde_json::to_value(value)
            .map(Payload::Json)
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    fn apply(self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, ApiError> {
        match self {
            Payload::Json(value) => Ok(request.json(&value)),
            Payload::Multipart(fields) => {
                let mut form = reqwest::multipart::Form::new();
                for field in fields {
                    form = match field.value {
                        FieldValue::Text(text) => form.text(field.name, text),
                        FieldValue::File {
                            file_name,
                            mime,
                            bytes,
                        } => {
                            let part = reqwest::multipart::Part::bytes(bytes)
                                .file_name(file_name)
                                .mime_str(&mime)
                                .map_err(|e| ApiError::Parse(e.to_string()))?;
                            form.part(field.name, part)
                        }
                    };
                }
                Ok(request.multipart(form))
            }
        }
    }
}

/// One multipart form field.
#[derive(Debug, Clone)]
pub struct MultipartField {
    pub name: String,
    pub value: FieldValue,
}

impl MultipartField {
    pub fn text(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: FieldValue::Text(value.to_string()),
        }
    }

    pub fn file(name: &str, file_name: &str, mime: &str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            value: FieldValue::File {
                file_name: file_name.to_string(),
                mime: mime.to_string(),
                bytes,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub enum FieldValue {
    Text(String),
    File {
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

/// How the user identifies themselves at login.
#[derive(Debug, Clone, Serialize)]
pub enum LoginIdentity {
    #[serde(rename = "userName")]
    UserName(String),
    #[serde(rename = "mobileNumber")]
    MobileNumber(String),
}

impl LoginIdentity {
    fn kind(&self) -> &'static str {
        match self {
            LoginIdentity::UserName(_) => "userName",
            LoginIdentity::MobileNumber(_) => "mobileNumber",
        }
    }
}

#[derive(Serialize)]
struct LoginRequest {
    #[serde(flatten)]
    identity: LoginIdentity,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    auth_token: String,
}

/// API errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not authorized ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Request rejected ({status}): {message}")]
    Validation { status: u16, message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ApiError {
    /// Whether the caller may simply try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Server { .. })
    }

    /// Auth rejections end the session; see `ScreenContext::handle_api_error`.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth { .. })
    }
}
