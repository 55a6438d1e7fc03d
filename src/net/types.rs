//! Request and response DTOs for the membership service.
//!
//! DESIGN
//! ======
//! Request bodies serialize with snake_case keys, which is what the service
//! binds. Responses come back camelCase and are renamed on the way in.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::categories::Category;

// =============================================================================
// REQUESTS
// =============================================================================

/// Registration form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub phone_number: String,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    pub category: Category,
    pub reason: Option<String>,
}

/// Local validation failures for a registration form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("field `{0}` is required")]
    MissingField(&'static str),
    #[error("a reason is required for category `{0}`")]
    MissingReason(Category),
}

impl CreateUserRequest {
    /// Check required fields before sending; mirrors the service's binding
    /// rules so the form can fail fast.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("email", &self.email),
            ("password", &self.password),
            ("phone_number", &self.phone_number),
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("address", &self.address),
            ("postal_code", &self.postal_code),
            ("city", &self.city),
            ("country", &self.country),
        ];
        if let Some(&(name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ValidationError::MissingField(name));
        }
        let has_reason = self.reason.as_deref().is_some_and(|r| !r.trim().is_empty());
        if self.category.requires_reason() && !has_reason {
            return Err(ValidationError::MissingReason(self.category));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmUserRequest {
    pub email: String,
    pub token: String,
}

/// Body for the "start" endpoints that only need an address
/// (`users/confirm/start`, `users/reset/start`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetUserRequest {
    pub email: String,
    pub password: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTokenRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCheckoutSessionRequest {
    pub quantity: u32,
    /// Buy the shares as a gift; the service then issues a gift code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gift: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseGiftCodeRequest {
    pub gift_code: String,
}

// =============================================================================
// RESPONSES
// =============================================================================

/// Bearer token issued by `tokens`, `users/confirm` and `users/reset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Hosted checkout page to send the member to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub url: String,
}

/// `users/me` view of the signed-in member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub email: String,
    pub must_upload_documents: bool,
    pub shares: u32,
}

/// Row of the admin member listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub accepted: bool,
    pub category: String,
    pub shares: u32,
}

/// Full member record as seen by an admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub id: Uuid,
    pub confirmed: bool,
    pub admin: bool,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub address: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    pub category: String,
    pub reason: Option<String>,
    /// Document IDs, fetchable via `get_user_document`.
    pub identity_front: Option<String>,
    pub identity_back: Option<String>,
    pub address_proof: Option<String>,
    pub shares: u32,
}

// =============================================================================
// DOCUMENT UPLOAD
// =============================================================================

/// One file attached to a document upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Document {
    #[must_use]
    pub fn new(file_name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { file_name: file_name.into(), mime: mime.into(), bytes }
    }

    /// Read a document from disk, guessing its MIME type from the extension.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "document".to_owned(), |n| n.to_string_lossy().into_owned());
        Ok(Self { mime: mime_for(path).to_owned(), file_name, bytes })
    }

    fn into_part(self) -> Result<Part, reqwest::Error> {
        Part::bytes(self.bytes)
            .file_name(self.file_name)
            .mime_str(&self.mime)
    }
}

/// Identity and address documents a member must provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    pub identity_front: Document,
    pub identity_back: Option<Document>,
    pub address_proof: Document,
}

impl DocumentUpload {
    /// Build the multipart form the service expects.
    ///
    /// # Errors
    ///
    /// Returns an error if a document's MIME type is not a valid media type.
    pub fn into_form(self) -> Result<Form, reqwest::Error> {
        let mut form = Form::new()
            .part("identity_front", self.identity_front.into_part()?)
            .part("address_proof", self.address_proof.into_part()?);
        if let Some(back) = self.identity_back {
            form = form.part("identity_back", back.into_part()?);
        }
        Ok(form)
    }
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
