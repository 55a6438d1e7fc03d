//! REST client for the membership service.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every endpoint funnels through one request path: snapshot the session
//! token, attach it as a bearer credential, send, then parse the body as
//! JSON whatever the status. Only a success body may be empty (it reads as
//! `null`). A non-success status returns the parsed envelope as
//! [`ApiError::Api`]; when its code says the token is expired or invalid
//! the session is signed out first.
//!
//! IDs interpolated into routes are appended as single percent-encoded
//! path segments, so they cannot leave the route they belong to.
//!
//! The token is read once when a request starts. A sign-out or token change
//! while the request is in flight does not affect it.
//!
//! ERROR HANDLING
//! ==============
//! No retries. Transport errors and malformed bodies propagate unchanged;
//! deciding what to show the member is the caller's job.

use std::time::Duration;

use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderValue};
use reqwest::multipart::Form;
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{ApiError, envelope_code, is_token_invalidation_code};
use super::types::{
    AdminUser, CheckoutSession, ConfirmUserRequest, CreateCheckoutSessionRequest, CreateTokenRequest,
    CreateUserRequest, CurrentUser, DocumentUpload, EmailRequest, ResetUserRequest, TokenResponse,
    UseGiftCodeRequest, UserSummary,
};
use crate::casing::snake_case_keys;
use crate::config::ClientConfig;
use crate::session::Session;

const JSON_CONTENT_TYPE: &str = "application/json";

enum Body {
    Empty,
    Json(String),
    Multipart(Form),
}

/// HTTP client bound to one base URL and one session.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Session,
}

impl ApiClient {
    /// Build a client for `config.base_url` that authenticates with `session`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse or the HTTP client
    /// cannot be built.
    pub fn new(config: &ClientConfig, session: Session) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(&config.base_url).map_err(|e| ApiError::Url(format!("{}: {e}", config.base_url)))?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self { http, base_url, session })
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    // =========================================================================
    // GENERIC CALLS
    // =========================================================================

    /// POST `data` as JSON. Top-level keys are rewritten to snake_case.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, data: &T) -> Result<Value, ApiError> {
        let body = serde_json::to_string(&snake_case_keys(serde_json::to_value(data)?))?;
        self.call(Method::POST, self.url(path)?, Body::Json(body)).await
    }

    /// GET `path`, expecting a JSON response.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.call(Method::GET, self.url(path)?, Body::Empty).await
    }

    /// POST a prebuilt multipart form unchanged.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn upload(&self, path: &str, form: Form) -> Result<Value, ApiError> {
        self.call(Method::POST, self.url(path)?, Body::Multipart(form)).await
    }

    /// `path` resolved against the base URL.
    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Url(format!("{path}: {e}")))
    }

    /// `prefix` resolved against the base URL, then each of `segments`
    /// appended as one percent-encoded path segment.
    fn url_with_segments(&self, prefix: &str, segments: &[&str]) -> Result<Url, ApiError> {
        if let Some(bad) = segments
            .iter()
            .find(|s| matches!(**s, "" | "." | ".."))
        {
            return Err(ApiError::Url(format!("{prefix}: invalid path segment {bad:?}")));
        }
        let mut url = self.url(prefix)?;
        url.path_segments_mut()
            .map_err(|()| ApiError::Url(format!("{prefix}: base URL cannot take path segments")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call(&self, method: Method, url: Url, body: Body) -> Result<Value, ApiError> {
        let bytes = self.send(method, url, body).await?;
        parse_json(&bytes)
    }

    /// Send a request and return the raw success body. Failures are
    /// classified exactly like JSON calls.
    async fn send(&self, method: Method, url: Url, body: Body) -> Result<Vec<u8>, ApiError> {
        let path = url.path().to_owned();
        let token = self.session.token();

        let mut request = self
            .http
            .request(method.clone(), url)
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Some(token) = token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }
        request = match body {
            Body::Empty => request.header(CONTENT_TYPE, JSON_CONTENT_TYPE),
            Body::Json(json) => request.header(CONTENT_TYPE, JSON_CONTENT_TYPE).body(json),
            Body::Multipart(form) => request.multipart(form),
        };

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        tracing::debug!(%method, %path, status = status.as_u16(), "api call");

        if status.is_success() {
            return Ok(bytes.to_vec());
        }
        Err(self.classify_failure(status.as_u16(), &bytes))
    }

    fn classify_failure(&self, status: u16, bytes: &[u8]) -> ApiError {
        let body: Value = match serde_json::from_slice(bytes) {
            Ok(body) => body,
            Err(e) => return e.into(),
        };
        if let Some(code) = envelope_code(&body).filter(|code| is_token_invalidation_code(code)) {
            tracing::warn!(code, status, "session token rejected; signing out");
            self.session.sign_out();
        }
        ApiError::Api { status, body }
    }

    async fn post_as<T, R>(&self, path: &str, data: &T) -> Result<R, ApiError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        Ok(serde_json::from_value(self.post(path, data).await?)?)
    }

    async fn get_as<R: DeserializeOwned>(&self, url: Url) -> Result<R, ApiError> {
        Ok(serde_json::from_value(self.call(Method::GET, url, Body::Empty).await?)?)
    }

    // =========================================================================
    // ACCOUNT
    // =========================================================================

    /// Register a new member. The service emails a confirmation code.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn create_user(&self, user: &CreateUserRequest) -> Result<(), ApiError> {
        self.post("users", user).await.map(drop)
    }

    /// Confirm an account with the emailed code; returns a session token.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn confirm_user(&self, data: &ConfirmUserRequest) -> Result<TokenResponse, ApiError> {
        self.post_as("users/confirm", data).await
    }

    /// Re-send the confirmation email.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn start_confirm_user(&self, data: &EmailRequest) -> Result<(), ApiError> {
        self.post("users/confirm/start", data).await.map(drop)
    }

    /// Email a password reset code.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn start_reset_user(&self, data: &EmailRequest) -> Result<(), ApiError> {
        self.post("users/reset/start", data).await.map(drop)
    }

    /// Set a new password with the emailed code; returns a session token.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn reset_user(&self, data: &ResetUserRequest) -> Result<TokenResponse, ApiError> {
        self.post_as("users/reset", data).await
    }

    /// Log in with email and password.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn create_token(&self, credentials: &CreateTokenRequest) -> Result<TokenResponse, ApiError> {
        self.post_as("tokens", credentials).await
    }

    // =========================================================================
    // MEMBER
    // =========================================================================

    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn get_current_user(&self) -> Result<CurrentUser, ApiError> {
        self.get_as(self.url("users/me")?).await
    }

    /// Start a hosted checkout to buy `quantity` shares.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn create_checkout_session(
        &self,
        data: &CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, ApiError> {
        self.post_as("users/me/checkout/sessions", data).await
    }

    /// Claim the shares attached to a gift code.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn use_gift_code(&self, data: &UseGiftCodeRequest) -> Result<(), ApiError> {
        self.post("users/me/use-gift-code", data).await.map(drop)
    }

    /// Upload identity and address documents.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn upload_documents(&self, documents: DocumentUpload) -> Result<(), ApiError> {
        let form = documents.into_form()?;
        self.upload("users/me/documents", form).await.map(drop)
    }

    /// Download the printable gift card (PNG) for a gifted purchase.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn get_gift_card(&self, gift_id: &str) -> Result<Vec<u8>, ApiError> {
        let url = self.url_with_segments("gifts/", &[gift_id])?;
        self.send(Method::GET, url, Body::Empty).await
    }

    // =========================================================================
    // ADMIN
    // =========================================================================

    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn get_user(&self, user_id: &str) -> Result<AdminUser, ApiError> {
        self.get_as(self.url_with_segments("admin/users/", &[user_id])?).await
    }

    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn get_users(&self) -> Result<Vec<UserSummary>, ApiError> {
        self.get_as(self.url("admin/users")?).await
    }

    /// Export every member as CSV.
    ///
    /// # Errors
    ///
    /// See [`ApiError`]. A body that is not UTF-8 is reported as
    /// [`ApiError::Io`] with kind `InvalidData`.
    pub async fn export_users_csv(&self) -> Result<String, ApiError> {
        let bytes = self.send(Method::GET, self.url("admin/csv/users")?, Body::Empty).await?;
        String::from_utf8(bytes)
            .map_err(|e| ApiError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    /// Download one uploaded member document.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn get_user_document(&self, user_id: &str, document_id: &str) -> Result<Vec<u8>, ApiError> {
        let url = self.url_with_segments("admin/users/", &[user_id, "documents", document_id])?;
        self.send(Method::GET, url, Body::Empty).await
    }
}

/// Parse a success body as JSON. An empty body reads as `null`, since the
/// service answers some successful calls without writing a body. Error
/// bodies get no such leniency.
fn parse_json(bytes: &[u8]) -> Result<Value, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
