//! Drive API wire types
//!
//! Serde types for the remote service's JSON payloads. The service speaks
//! snake_case throughout, so derive defaults apply; unknown fields are
//! ignored so the client survives additive server changes.

use serde::{Deserialize, Serialize};

/// Signed-in account profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub cellphone: String,
}

/// Response from the sign-in endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: User,
}

/// Response from the token refresh endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Fields for account registration
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password2: String,
    pub first_name: String,
    pub last_name: String,
    pub cellphone: String,
}

/// A folder as returned by the folders endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct FolderEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_folder: Option<String>,
    #[serde(default)]
    pub is_trashed: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A file as returned by the files endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct FileEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_trashed: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Result of a favorite toggle
#[derive(Debug, Clone, Deserialize)]
pub struct FavoriteStatus {
    pub is_favorite: bool,
}

/// Access level on a shared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    View,
    Edit,
    Admin,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::View => "view",
            AccessLevel::Edit => "edit",
            AccessLevel::Admin => "admin",
        }
    }
}

/// A single grant on a shared resource
#[derive(Debug, Clone, Deserialize)]
pub struct FilePermission {
    pub user_id: String,
    pub access_level: AccessLevel,
    #[serde(default)]
    pub granted_at: Option<String>,
    #[serde(default)]
    pub granted_by: Option<String>,
}

/// Metadata accompanying a file upload; the byte payload travels separately
/// through the transport as an opaque multipart body.
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub title: String,
    pub file_name: String,
    pub folder: Option<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
}
