//! Request gateway for the drive API
//!
//! Every outbound call flows through [`ApiGateway::send`], which attaches
//! the current access token and transparently recovers from a single
//! authorization failure: mark the call retried, run the session's
//! single-flight refresh, and reissue the call exactly once with the new
//! credential. Refresh failure propagates the original failure (the session
//! has already forced sign-out by then).

pub mod errors;
pub mod transport;
pub mod types;

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::session::SessionManager;

pub use errors::ApiError;
use transport::{ApiRequest, ApiResponse, Transport};
use types::{
    AccessLevel, FavoriteStatus, FileEntry, FilePermission, FolderEntry, UploadMetadata, User,
};

/// Gateway owning the bearer-attach and 401-replay policy
pub struct ApiGateway {
    transport: Arc<dyn Transport>,
    session: Arc<SessionManager>,
}

impl ApiGateway {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<SessionManager>) -> Self {
        Self { transport, session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Execute a call with the current credential. On a 401 for a call not
    /// yet retried, refresh (single-flight, coalescing with refreshes
    /// triggered by the same stale credential) and replay exactly once.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut retried = false;
        loop {
            // Generation observed before the call; lets the refresh coalesce
            // with one already triggered by a concurrently failing call.
            let observed = self.session.generation();
            let outbound = request.clone().bearer(self.session.access_token());
            let response = self.transport.execute(outbound).await?;

            if response.status == 401 && !retried {
                retried = true;
                debug!(path = %request.path, "Authorization failure, refreshing credentials");
                if self.session.refresh_from(observed).await.is_err() {
                    // Session already forced sign-out; surface the original failure
                    return Err(ApiError::from_status(response.status, &response.body_text()));
                }
                continue;
            }

            if response.is_success() {
                return Ok(response);
            }
            return Err(ApiError::from_status(response.status, &response.body_text()));
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: String) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    // ---- folders -----------------------------------------------------------

    pub async fn list_folders(&self, parent: Option<&str>) -> Result<Vec<FolderEntry>, ApiError> {
        let path = match parent {
            Some(id) => format!("/folders/?parent_folder={}", urlencoding::encode(id)),
            None => "/folders/".to_string(),
        };
        self.get_json(path).await
    }

    pub async fn folder_details(&self, folder_id: &str) -> Result<FolderEntry, ApiError> {
        self.get_json(format!("/folders/{}/", folder_id)).await
    }

    pub async fn create_folder(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<FolderEntry, ApiError> {
        let request = ApiRequest::post("/folders/").json(json!({
            "name": name,
            "parent_folder": parent,
        }));
        self.send(request).await?.json()
    }

    pub async fn delete_folder(&self, folder_id: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!("/folders/{}/", folder_id)))
            .await?;
        Ok(())
    }

    // ---- files -------------------------------------------------------------

    pub async fn list_files(&self, folder: Option<&str>) -> Result<Vec<FileEntry>, ApiError> {
        let path = match folder {
            Some(id) => format!("/files/?folder={}", urlencoding::encode(id)),
            None => "/files/".to_string(),
        };
        self.get_json(path).await
    }

    pub async fn file_details(&self, file_id: &str) -> Result<FileEntry, ApiError> {
        self.get_json(format!("/files/{}/", file_id)).await
    }

    /// Upload a file; bytes travel as an opaque multipart body, metadata as
    /// form fields alongside.
    pub async fn upload_file(
        &self,
        metadata: &UploadMetadata,
        bytes: Vec<u8>,
    ) -> Result<FileEntry, ApiError> {
        let request = ApiRequest::post("/files/")
            .json(json!({
                "title": metadata.title,
                "folder": metadata.folder,
                "tags": metadata.tags,
                "description": metadata.description,
            }))
            .upload(metadata.file_name.clone(), bytes);
        self.send(request).await?.json()
    }

    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ApiError> {
        let response = self
            .send(ApiRequest::get(format!("/files/{}/download/", file_id)))
            .await?;
        Ok(response.body)
    }

    pub async fn preview_file(&self, file_id: &str) -> Result<Vec<u8>, ApiError> {
        let response = self
            .send(ApiRequest::get(format!("/files/{}/preview/", file_id)))
            .await?;
        Ok(response.body)
    }

    pub async fn trash_file(&self, file_id: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::post(format!("/files/{}/trash/", file_id)))
            .await?;
        Ok(())
    }

    pub async fn restore_file(&self, file_id: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::post(format!("/files/{}/restore/", file_id)))
            .await?;
        Ok(())
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!("/files/{}/", file_id)))
            .await?;
        Ok(())
    }

    // ---- favorites ---------------------------------------------------------

    pub async fn add_favorite(&self, file_id: &str) -> Result<FavoriteStatus, ApiError> {
        let request = ApiRequest::post("/favorites/").json(json!({ "file_id": file_id }));
        let response = self.send(request).await?;
        // Some deployments return an empty body here; treat that as success
        response.json().or(Ok(FavoriteStatus { is_favorite: true }))
    }

    pub async fn remove_favorite(&self, file_id: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!("/favorites/{}/", file_id)))
            .await?;
        Ok(())
    }

    pub async fn favorite_files(&self) -> Result<Vec<FileEntry>, ApiError> {
        self.get_json("/favorites/".to_string()).await
    }

    // ---- derived listings --------------------------------------------------

    pub async fn recent_files(&self) -> Result<Vec<FileEntry>, ApiError> {
        self.get_json("/recent/".to_string()).await
    }

    pub async fn shared_files(&self) -> Result<Vec<FileEntry>, ApiError> {
        self.get_json("/shared/".to_string()).await
    }

    pub async fn trashed_files(&self) -> Result<Vec<FileEntry>, ApiError> {
        self.get_json("/trash/".to_string()).await
    }

    pub async fn empty_trash(&self) -> Result<(), ApiError> {
        self.send(ApiRequest::delete("/trash/empty/")).await?;
        Ok(())
    }

    /// Ranked search; ordering is the server's responsibility
    pub async fn search(&self, query: &str) -> Result<Vec<FileEntry>, ApiError> {
        self.get_json(format!("/search/?q={}", urlencoding::encode(query)))
            .await
    }

    // ---- sharing and permissions -------------------------------------------

    pub async fn share_file(
        &self,
        file_id: &str,
        email: &str,
        access_level: AccessLevel,
    ) -> Result<(), ApiError> {
        let request = ApiRequest::post(format!("/files/{}/share/", file_id)).json(json!({
            "email": email,
            "access_level": access_level.as_str(),
        }));
        self.send(request).await?;
        Ok(())
    }

    pub async fn file_permissions(&self, file_id: &str) -> Result<Vec<FilePermission>, ApiError> {
        self.get_json(format!("/files/{}/permissions/", file_id))
            .await
    }

    pub async fn update_permission(
        &self,
        file_id: &str,
        user_id: &str,
        access_level: AccessLevel,
    ) -> Result<Vec<FilePermission>, ApiError> {
        let request = ApiRequest::put(format!("/files/{}/permissions/", file_id)).json(json!({
            "user_id": user_id,
            "access_level": access_level.as_str(),
        }));
        self.send(request).await?.json()
    }

    pub async fn remove_permission(&self, file_id: &str, user_id: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!(
            "/files/{}/permissions/{}/",
            file_id, user_id
        )))
        .await?;
        Ok(())
    }

    // ---- profile -----------------------------------------------------------

    pub async fn profile(&self) -> Result<User, ApiError> {
        let user: User = self.get_json("/auth/profile/".to_string()).await?;
        self.session.set_user(user.clone());
        Ok(user)
    }

    pub async fn update_profile(&self, fields: serde_json::Value) -> Result<User, ApiError> {
        let request = ApiRequest::put("/auth/profile/").json(fields);
        let user: User = self.send(request).await?.json()?;
        self.session.set_user(user.clone());
        Ok(user)
    }
}
