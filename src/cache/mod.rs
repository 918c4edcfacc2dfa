//! Hierarchical resource cache
//!
//! In-memory model of the folder/file tree and its derived views (current
//! folder listing, recent, shared, favorites, trash). Attribute state lives
//! exactly once per id in the canonical store; views hold ids only. Two
//! rules keep the cache honest under partial failure:
//!
//! - listings replace their view wholesale, never merge into it, and a
//!   listing that arrives after the user navigated elsewhere is discarded
//!   (staleness guard against the current navigation target);
//! - mutations are confirm-then-apply: the cache changes strictly after a
//!   successful server response, so a failed call leaves it untouched.
//!
//! The state lock is synchronous and never held across an await; fetches
//! complete first, then the response is applied in one critical section.

pub mod path;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::types::{AccessLevel, FileEntry, FolderEntry, UploadMetadata};
use crate::api::{ApiError, ApiGateway};

use path::{NavigationPath, PathEntry, PathOutcome};

/// What a canonical entry is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Folder,
    File,
}

/// Canonical attribute state for one folder or file
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: String,
    pub parent_id: Option<String>,
    pub kind: ResourceKind,
    pub name: String,
    pub tags: Vec<String>,
    pub size: u64,
    pub is_favorite: bool,
    pub is_trashed: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<FolderEntry> for Resource {
    fn from(entry: FolderEntry) -> Self {
        Self {
            id: entry.id,
            parent_id: entry.parent_folder,
            kind: ResourceKind::Folder,
            name: entry.name,
            tags: Vec::new(),
            size: 0,
            is_favorite: false,
            is_trashed: entry.is_trashed,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

impl From<FileEntry> for Resource {
    fn from(entry: FileEntry) -> Self {
        Self {
            id: entry.id,
            parent_id: entry.folder,
            kind: ResourceKind::File,
            name: entry.title,
            tags: entry.tags,
            size: entry.size,
            is_favorite: entry.is_favorite,
            is_trashed: entry.is_trashed,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

/// Point-in-time copy of the cache for subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    pub revision: u64,
    pub current: Vec<Resource>,
    pub recent: Vec<Resource>,
    pub shared: Vec<Resource>,
    pub favorites: Vec<Resource>,
    pub trashed: Vec<Resource>,
    pub path: Vec<PathEntry>,
}

struct CacheState {
    resources: HashMap<String, Resource>,
    current: Vec<String>,
    recent: Vec<String>,
    shared: Vec<String>,
    favorites: Vec<String>,
    trashed: Vec<String>,
    path: NavigationPath,
    revision: u64,
}

impl CacheState {
    fn new() -> Self {
        Self {
            resources: HashMap::new(),
            current: Vec::new(),
            recent: Vec::new(),
            shared: Vec::new(),
            favorites: Vec::new(),
            trashed: Vec::new(),
            path: NavigationPath::new(),
            revision: 0,
        }
    }

    fn merge(&mut self, resource: Resource) {
        self.resources.insert(resource.id.clone(), resource);
    }

    fn resolve(&self, ids: &[String]) -> Vec<Resource> {
        ids.iter()
            .filter_map(|id| self.resources.get(id).cloned())
            .collect()
    }
}

fn push_unique(view: &mut Vec<String>, id: &str) {
    if !view.iter().any(|existing| existing == id) {
        view.push(id.to_string());
    }
}

fn remove_id(view: &mut Vec<String>, id: &str) {
    view.retain(|existing| existing != id);
}

/// Minimal shape check before handing an address to the server
fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// The cache service: all mutations flow through the gateway first, then
/// update the canonical store and affected views.
pub struct ResourceCache {
    api: Arc<ApiGateway>,
    state: RwLock<CacheState>,
    watch_tx: watch::Sender<u64>,
}

impl ResourceCache {
    pub fn new(api: Arc<ApiGateway>) -> Self {
        let (watch_tx, _) = watch::channel(0);
        Self {
            api,
            state: RwLock::new(CacheState::new()),
            watch_tx,
        }
    }

    /// Subscribe to change notifications; pull [`Self::snapshot`] on wake
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.watch_tx.subscribe()
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let state = self.state.read().unwrap();
        CacheSnapshot {
            revision: state.revision,
            current: state.resolve(&state.current),
            recent: state.resolve(&state.recent),
            shared: state.resolve(&state.shared),
            favorites: state.resolve(&state.favorites),
            trashed: state.resolve(&state.trashed),
            path: state.path.entries().to_vec(),
        }
    }

    pub fn resource(&self, id: &str) -> Option<Resource> {
        self.state.read().unwrap().resources.get(id).cloned()
    }

    /// The folder currently navigated to; None is root
    pub fn current_target(&self) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .path
            .target()
            .map(String::from)
    }

    fn publish(&self, state: &mut CacheState) {
        state.revision += 1;
        self.watch_tx.send_replace(state.revision);
    }

    // ---- navigation --------------------------------------------------------

    /// Fetch the immediate children of `target` and replace the current
    /// folder listing wholesale. A response for a folder the user has since
    /// navigated away from is discarded.
    pub async fn list_folder(&self, target: Option<&str>) -> Result<(), ApiError> {
        let folders = self.api.list_folders(target).await?;
        let files = self.api.list_files(target).await?;

        let mut state = self.state.write().unwrap();
        if state.path.target() != target {
            debug!(
                requested = target.unwrap_or("root"),
                current = state.path.target().unwrap_or("root"),
                "Discarding stale folder listing"
            );
            return Ok(());
        }

        let mut listing = Vec::with_capacity(folders.len() + files.len());
        for folder in folders {
            listing.push(folder.id.clone());
            state.merge(Resource::from(folder));
        }
        for file in files {
            listing.push(file.id.clone());
            state.merge(Resource::from(file));
        }
        debug!(
            target = target.unwrap_or("root"),
            entries = listing.len(),
            "Replaced current folder listing"
        );
        state.current = listing;
        self.publish(&mut state);
        Ok(())
    }

    /// Navigate into a folder (None = root), updating the breadcrumb path
    /// before fetching the listing.
    pub async fn navigate_to(&self, folder_id: Option<&str>) -> Result<(), ApiError> {
        let Some(folder_id) = folder_id else {
            {
                let mut state = self.state.write().unwrap();
                state.path.reset();
                self.publish(&mut state);
            }
            return self.list_folder(None).await;
        };

        let folder = match self.resource(folder_id) {
            Some(resource) => resource,
            None => {
                let entry = self.api.folder_details(folder_id).await?;
                let resource = Resource::from(entry);
                let mut state = self.state.write().unwrap();
                state.merge(resource.clone());
                resource
            }
        };

        if folder.kind != ResourceKind::Folder {
            return Err(ApiError::Validation(format!(
                "'{}' is not a folder",
                folder.name
            )));
        }
        if folder.is_trashed {
            return Err(ApiError::Validation(format!(
                "'{}' is in the trash",
                folder.name
            )));
        }

        let entry = PathEntry {
            id: folder.id.clone(),
            name: folder.name.clone(),
            parent_id: folder.parent_id.clone(),
        };

        let outcome = {
            let mut state = self.state.write().unwrap();
            let outcome = state.path.enter(entry);
            if outcome != PathOutcome::NeedsRebuild {
                self.publish(&mut state);
            }
            outcome
        };

        if outcome == PathOutcome::NeedsRebuild {
            // Declared parent contradicts the path tail: recompute the whole
            // chain instead of appending blindly.
            let chain = self.breadcrumb_chain(&folder).await?;
            let mut state = self.state.write().unwrap();
            state.path.replace(chain);
            self.publish(&mut state);
        }

        self.list_folder(Some(folder_id)).await
    }

    /// One level up, or root when at depth <= 1
    pub async fn navigate_up(&self) -> Result<(), ApiError> {
        let parent = {
            let state = self.state.read().unwrap();
            if state.path.depth() <= 1 {
                None
            } else {
                state.path.parent_target().map(String::from)
            }
        };
        self.navigate_to(parent.as_deref()).await
    }

    /// Walk the parent chain up to the root, fetching ancestors the store
    /// has not seen.
    async fn breadcrumb_chain(&self, folder: &Resource) -> Result<Vec<PathEntry>, ApiError> {
        let mut chain = vec![PathEntry {
            id: folder.id.clone(),
            name: folder.name.clone(),
            parent_id: folder.parent_id.clone(),
        }];
        let mut next = folder.parent_id.clone();
        let mut seen = std::collections::HashSet::from([folder.id.clone()]);

        while let Some(ancestor_id) = next {
            if !seen.insert(ancestor_id.clone()) {
                return Err(ApiError::Request(format!(
                    "folder ancestry loops at '{}'",
                    ancestor_id
                )));
            }
            let ancestor = match self.resource(&ancestor_id) {
                Some(resource) => resource,
                None => {
                    let entry = self.api.folder_details(&ancestor_id).await?;
                    let resource = Resource::from(entry);
                    self.state.write().unwrap().merge(resource.clone());
                    resource
                }
            };
            next = ancestor.parent_id.clone();
            chain.push(PathEntry {
                id: ancestor.id,
                name: ancestor.name,
                parent_id: ancestor.parent_id,
            });
        }

        chain.reverse();
        Ok(chain)
    }

    // ---- creation ----------------------------------------------------------

    pub async fn create_folder(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<Resource, ApiError> {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("folder name cannot be empty".into()));
        }

        let entry = self.api.create_folder(name.trim(), parent).await?;
        let resource = Resource::from(entry);

        let mut state = self.state.write().unwrap();
        state.merge(resource.clone());
        if state.path.target() == parent {
            push_unique(&mut state.current, &resource.id);
        }
        self.publish(&mut state);
        info!(folder = %resource.id, name = %resource.name, "Created folder");
        Ok(resource)
    }

    pub async fn upload_file(
        &self,
        metadata: UploadMetadata,
        bytes: Vec<u8>,
    ) -> Result<Resource, ApiError> {
        if metadata.title.trim().is_empty() {
            return Err(ApiError::Validation("file title cannot be empty".into()));
        }

        let entry = self.api.upload_file(&metadata, bytes).await?;
        let resource = Resource::from(entry);

        let mut state = self.state.write().unwrap();
        state.merge(resource.clone());
        if state.path.target() == metadata.folder.as_deref() {
            push_unique(&mut state.current, &resource.id);
        }
        remove_id(&mut state.recent, &resource.id);
        state.recent.insert(0, resource.id.clone());
        self.publish(&mut state);
        info!(file = %resource.id, size = resource.size, "Uploaded file");
        Ok(resource)
    }

    // ---- mutations (confirm-then-apply) ------------------------------------

    pub async fn set_favorite(&self, id: &str, value: bool) -> Result<(), ApiError> {
        if value {
            self.api.add_favorite(id).await?;
        } else {
            self.api.remove_favorite(id).await?;
        }

        let mut state = self.state.write().unwrap();
        match state.resources.get_mut(id) {
            Some(resource) => resource.is_favorite = value,
            None => {
                warn!(file = id, "Favorite confirmed for a resource the cache has not seen");
                return Ok(());
            }
        }
        if value {
            push_unique(&mut state.favorites, id);
        } else {
            remove_id(&mut state.favorites, id);
        }
        self.publish(&mut state);
        Ok(())
    }

    pub async fn trash(&self, id: &str) -> Result<(), ApiError> {
        self.api.trash_file(id).await?;

        let mut state = self.state.write().unwrap();
        if let Some(resource) = state.resources.get_mut(id) {
            resource.is_trashed = true;
        }
        remove_id(&mut state.current, id);
        remove_id(&mut state.recent, id);
        remove_id(&mut state.shared, id);
        remove_id(&mut state.favorites, id);
        push_unique(&mut state.trashed, id);
        self.publish(&mut state);
        info!(file = id, "Moved to trash");
        Ok(())
    }

    pub async fn restore(&self, id: &str) -> Result<(), ApiError> {
        self.api.restore_file(id).await?;

        let mut state = self.state.write().unwrap();
        let (parent_id, is_favorite) = match state.resources.get_mut(id) {
            Some(resource) => {
                resource.is_trashed = false;
                (resource.parent_id.clone(), resource.is_favorite)
            }
            None => {
                warn!(file = id, "Restore confirmed for a resource the cache has not seen");
                return Ok(());
            }
        };
        remove_id(&mut state.trashed, id);
        // Reappears in the listing only when its parent is the loaded folder
        if state.path.target() == parent_id.as_deref() {
            push_unique(&mut state.current, id);
        }
        if is_favorite {
            push_unique(&mut state.favorites, id);
        }
        self.publish(&mut state);
        info!(file = id, "Restored from trash");
        Ok(())
    }

    /// Irreversible hard delete of a trashed file
    pub async fn purge(&self, id: &str) -> Result<(), ApiError> {
        self.api.delete_file(id).await?;

        let mut state = self.state.write().unwrap();
        remove_id(&mut state.trashed, id);
        remove_id(&mut state.current, id);
        remove_id(&mut state.recent, id);
        remove_id(&mut state.shared, id);
        remove_id(&mut state.favorites, id);
        state.resources.remove(id);
        self.publish(&mut state);
        info!(file = id, "Purged");
        Ok(())
    }

    pub async fn empty_trash(&self) -> Result<(), ApiError> {
        self.api.empty_trash().await?;

        let mut state = self.state.write().unwrap();
        let trashed = std::mem::take(&mut state.trashed);
        for id in &trashed {
            state.resources.remove(id);
        }
        self.publish(&mut state);
        info!(purged = trashed.len(), "Emptied trash");
        Ok(())
    }

    /// Delete a folder. Only the current listing is reconciled; the server
    /// is authoritative for cascading to descendants the cache never loaded.
    pub async fn delete_folder(&self, id: &str) -> Result<(), ApiError> {
        self.api.delete_folder(id).await?;

        let mut state = self.state.write().unwrap();
        remove_id(&mut state.current, id);
        state.resources.remove(id);
        self.publish(&mut state);
        info!(folder = id, "Deleted folder");
        Ok(())
    }

    // ---- derived views -----------------------------------------------------

    pub async fn fetch_recent(&self) -> Result<(), ApiError> {
        let files = self.api.recent_files().await?;
        self.replace_file_view(files, |state| &mut state.recent);
        Ok(())
    }

    pub async fn fetch_shared(&self) -> Result<(), ApiError> {
        let files = self.api.shared_files().await?;
        self.replace_file_view(files, |state| &mut state.shared);
        Ok(())
    }

    pub async fn fetch_favorites(&self) -> Result<(), ApiError> {
        let files = self.api.favorite_files().await?;
        self.replace_file_view(files, |state| &mut state.favorites);
        Ok(())
    }

    pub async fn fetch_trash(&self) -> Result<(), ApiError> {
        let files = self.api.trashed_files().await?;
        self.replace_file_view(files, |state| &mut state.trashed);
        Ok(())
    }

    fn replace_file_view(
        &self,
        files: Vec<FileEntry>,
        view: impl FnOnce(&mut CacheState) -> &mut Vec<String>,
    ) {
        let mut state = self.state.write().unwrap();
        let ids: Vec<String> = files.iter().map(|file| file.id.clone()).collect();
        for file in files {
            state.merge(Resource::from(file));
        }
        *view(&mut state) = ids;
        self.publish(&mut state);
    }

    // ---- pass-through operations -------------------------------------------

    /// Ranked search results, merged into the canonical store; no view changes
    pub async fn search(&self, query: &str) -> Result<Vec<Resource>, ApiError> {
        let files = self.api.search(query).await?;
        let resources: Vec<Resource> = files.into_iter().map(Resource::from).collect();
        let mut state = self.state.write().unwrap();
        for resource in &resources {
            state.merge(resource.clone());
        }
        Ok(resources)
    }

    pub async fn file_details(&self, id: &str) -> Result<Resource, ApiError> {
        let entry = self.api.file_details(id).await?;
        let resource = Resource::from(entry);
        self.state.write().unwrap().merge(resource.clone());
        Ok(resource)
    }

    pub async fn folder_details(&self, id: &str) -> Result<Resource, ApiError> {
        let entry = self.api.folder_details(id).await?;
        let resource = Resource::from(entry);
        self.state.write().unwrap().merge(resource.clone());
        Ok(resource)
    }

    pub async fn share_file(
        &self,
        id: &str,
        email: &str,
        access_level: AccessLevel,
    ) -> Result<(), ApiError> {
        if !valid_email(email) {
            return Err(ApiError::Validation(format!(
                "'{}' is not a valid email address",
                email
            )));
        }
        self.api.share_file(id, email, access_level).await
    }

    /// Opaque byte download; the cache holds no file content
    pub async fn download(&self, id: &str) -> Result<Vec<u8>, ApiError> {
        self.api.download_file(id).await
    }

    pub async fn preview(&self, id: &str) -> Result<Vec<u8>, ApiError> {
        self.api.preview_file(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::testing::ScriptedTransport;
    use crate::api::transport::Transport;
    use crate::session::token::testing::valid_token;
    use crate::session::SessionManager;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn folder_json(id: &str, name: &str, parent: Option<&str>) -> Value {
        json!({"id": id, "name": name, "parent_folder": parent})
    }

    fn file_json(id: &str, title: &str, folder: Option<&str>, favorite: bool) -> Value {
        json!({
            "id": id,
            "title": title,
            "folder": folder,
            "size": 100,
            "is_favorite": favorite,
            "is_trashed": false
        })
    }

    async fn cache_with(transport: &Arc<ScriptedTransport>) -> ResourceCache {
        transport.route(
            "POST",
            "/auth/login/",
            200,
            json!({
                "access": valid_token(),
                "refresh": valid_token(),
                "user": {"id": "u-1", "email": "ada@example.com"}
            }),
        );
        let session = Arc::new(SessionManager::new(
            Arc::clone(transport) as Arc<dyn Transport>,
            None,
        ));
        session.login("ada@example.com", "secret").await.unwrap();
        let gateway = Arc::new(ApiGateway::new(
            Arc::clone(transport) as Arc<dyn Transport>,
            session,
        ));
        ResourceCache::new(gateway)
    }

    fn route_listing(
        transport: &ScriptedTransport,
        target: Option<&str>,
        folders: Value,
        files: Value,
    ) {
        let (folders_path, files_path) = match target {
            Some(id) => (
                format!("/folders/?parent_folder={}", id),
                format!("/files/?folder={}", id),
            ),
            None => ("/folders/".to_string(), "/files/".to_string()),
        };
        transport.route("GET", &folders_path, 200, folders);
        transport.route("GET", &files_path, 200, files);
    }

    fn ids(resources: &[Resource]) -> Vec<&str> {
        resources.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_listing_replaced_wholesale() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        route_listing(
            &transport,
            None,
            json!([folder_json("d-1", "Docs", None)]),
            json!([file_json("f-1", "root.txt", None, false)]),
        );
        route_listing(
            &transport,
            Some("d-1"),
            json!([]),
            json!([file_json("f-2", "inside.txt", Some("d-1"), false)]),
        );

        cache.navigate_to(None).await.unwrap();
        assert_eq!(ids(&cache.snapshot().current), vec!["d-1", "f-1"]);

        cache.navigate_to(Some("d-1")).await.unwrap();
        let snapshot = cache.snapshot();
        // Previous folder's entries are gone, not merged
        assert_eq!(ids(&snapshot.current), vec!["f-2"]);
        assert_eq!(cache.current_target().as_deref(), Some("d-1"));
    }

    #[tokio::test]
    async fn test_stale_listing_discarded() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = Arc::new(cache_with(&transport).await);

        route_listing(
            &transport,
            None,
            json!([
                folder_json("F", "slow", None),
                folder_json("G", "fast", None)
            ]),
            json!([]),
        );
        cache.navigate_to(None).await.unwrap();

        // F's listing is held back; G's resolves immediately
        let gate = transport.push_gated(
            "GET",
            "/folders/?parent_folder=F",
            200,
            json!([folder_json("F-child", "late", Some("F"))]),
        );
        transport.route("GET", "/files/?folder=F", 200, json!([]));
        route_listing(
            &transport,
            Some("G"),
            json!([]),
            json!([file_json("g-1", "winner.txt", Some("G"), false)]),
        );

        let slow = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.navigate_to(Some("F")).await })
        };
        // Let the first navigation set its target and block on the fetch
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.navigate_to(Some("G")).await.unwrap();
        gate.add_permits(1);
        slow.await.unwrap().unwrap();

        // Only G's children are visible once both responses have arrived
        let snapshot = cache.snapshot();
        assert_eq!(cache.current_target().as_deref(), Some("G"));
        assert_eq!(ids(&snapshot.current), vec!["g-1"]);
    }

    #[tokio::test]
    async fn test_trash_restore_round_trip() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        route_listing(
            &transport,
            None,
            json!([]),
            json!([
                file_json("f-1", "keep.txt", None, true),
                file_json("f-2", "other.txt", None, false)
            ]),
        );
        transport.route(
            "GET",
            "/favorites/",
            200,
            json!([file_json("f-1", "keep.txt", None, true)]),
        );
        transport.route("POST", "/files/f-1/trash/", 200, json!({}));
        transport.route("POST", "/files/f-1/restore/", 200, json!({}));

        cache.navigate_to(None).await.unwrap();
        cache.fetch_favorites().await.unwrap();
        let before = cache.snapshot();
        assert_eq!(ids(&before.current), vec!["f-1", "f-2"]);
        assert_eq!(ids(&before.favorites), vec!["f-1"]);

        cache.trash("f-1").await.unwrap();
        let trashed = cache.snapshot();
        assert_eq!(ids(&trashed.current), vec!["f-2"]);
        assert!(trashed.favorites.is_empty());
        assert_eq!(ids(&trashed.trashed), vec!["f-1"]);
        assert!(cache.resource("f-1").unwrap().is_trashed);

        cache.restore("f-1").await.unwrap();
        let after = cache.snapshot();
        // Membership is exactly what it was before the trash
        assert_eq!(
            ids(&after.current).iter().collect::<std::collections::HashSet<_>>(),
            ids(&before.current).iter().collect::<std::collections::HashSet<_>>()
        );
        assert_eq!(ids(&after.favorites), ids(&before.favorites));
        assert!(after.trashed.is_empty());
        assert!(!cache.resource("f-1").unwrap().is_trashed);
    }

    #[tokio::test]
    async fn test_restore_of_unknown_resource_leaves_views_alone() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        route_listing(&transport, None, json!([]), json!([]));
        transport.route("POST", "/files/ghost/restore/", 200, json!({}));

        cache.navigate_to(None).await.unwrap();
        let before = cache.snapshot();

        // Confirmed by the server, but the cache never loaded this id
        cache.restore("ghost").await.unwrap();
        assert_eq!(cache.snapshot(), before);
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_cache_untouched() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        route_listing(
            &transport,
            None,
            json!([]),
            json!([file_json("f-1", "keep.txt", None, false)]),
        );
        transport.route("POST", "/files/f-1/trash/", 500, json!({"detail": "db down"}));

        cache.navigate_to(None).await.unwrap();
        let before = cache.snapshot();

        let err = cache.trash("f-1").await.unwrap_err();
        assert!(matches!(err, ApiError::Server(500, _)));
        assert_eq!(cache.snapshot(), before);
    }

    #[tokio::test]
    async fn test_favorite_flag_single_source_of_truth() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        let listing = json!([file_json("f-1", "doc.pdf", None, false)]);
        route_listing(&transport, None, json!([]), listing.clone());
        transport.route("GET", "/recent/", 200, listing.clone());
        transport.route("GET", "/shared/", 200, listing);
        transport.route("POST", "/favorites/", 200, json!({"is_favorite": true}));
        transport.route("DELETE", "/favorites/f-1/", 200, json!({}));

        cache.navigate_to(None).await.unwrap();
        cache.fetch_recent().await.unwrap();
        cache.fetch_shared().await.unwrap();

        cache.set_favorite("f-1", true).await.unwrap();
        let snapshot = cache.snapshot();
        // One canonical flag, visible through every view at once
        assert!(snapshot.current[0].is_favorite);
        assert!(snapshot.recent[0].is_favorite);
        assert!(snapshot.shared[0].is_favorite);
        assert_eq!(ids(&snapshot.favorites), vec!["f-1"]);

        // Last confirmed write wins
        cache.set_favorite("f-1", true).await.unwrap();
        cache.set_favorite("f-1", false).await.unwrap();
        let snapshot = cache.snapshot();
        assert!(!snapshot.current[0].is_favorite);
        assert!(snapshot.favorites.is_empty());
    }

    #[tokio::test]
    async fn test_create_folder_validation_short_circuits() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        let err = cache.create_folder("   ", None).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(transport.count("POST", "/folders/"), 0);
    }

    #[tokio::test]
    async fn test_create_folder_inserted_only_when_parent_loaded() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        route_listing(&transport, None, json!([]), json!([]));
        cache.navigate_to(None).await.unwrap();

        transport.push("POST", "/folders/", 201, folder_json("d-1", "Reports", None));
        cache.create_folder("Reports", None).await.unwrap();
        assert_eq!(ids(&cache.snapshot().current), vec!["d-1"]);

        // Created under a folder that is not loaded: canonical only
        transport.push(
            "POST",
            "/folders/",
            201,
            folder_json("d-2", "Nested", Some("d-1")),
        );
        cache.create_folder("Nested", Some("d-1")).await.unwrap();
        assert_eq!(ids(&cache.snapshot().current), vec!["d-1"]);
        assert!(cache.resource("d-2").is_some());
    }

    #[tokio::test]
    async fn test_breadcrumbs_follow_nested_navigation() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        route_listing(&transport, None, json!([]), json!([]));
        cache.navigate_to(None).await.unwrap();

        transport.push("POST", "/folders/", 201, folder_json("R", "Reports", None));
        let reports = cache.create_folder("Reports", None).await.unwrap();
        transport.push("POST", "/folders/", 201, folder_json("Y", "2024", Some("R")));
        let year = cache.create_folder("2024", Some("R")).await.unwrap();

        route_listing(
            &transport,
            Some("R"),
            json!([folder_json("Y", "2024", Some("R"))]),
            json!([]),
        );
        route_listing(&transport, Some("Y"), json!([]), json!([]));

        cache.navigate_to(Some(&reports.id)).await.unwrap();
        cache.navigate_to(Some(&year.id)).await.unwrap();

        let path = cache.snapshot().path;
        assert_eq!(
            path.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec!["R", "Y"]
        );

        cache.navigate_up().await.unwrap();
        assert_eq!(cache.current_target().as_deref(), Some("R"));
        cache.navigate_up().await.unwrap();
        assert_eq!(cache.current_target(), None);
    }

    #[tokio::test]
    async fn test_navigate_rebuilds_path_for_unrelated_folder() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        route_listing(&transport, None, json!([folder_json("a", "A", None)]), json!([]));
        cache.navigate_to(None).await.unwrap();
        route_listing(&transport, Some("a"), json!([]), json!([]));
        cache.navigate_to(Some("a")).await.unwrap();

        // Deep-link into a folder whose ancestry the cache has not loaded
        transport.route("GET", "/folders/y/", 200, folder_json("y", "Y", Some("x")));
        transport.route("GET", "/folders/x/", 200, folder_json("x", "X", None));
        route_listing(&transport, Some("y"), json!([]), json!([]));

        cache.navigate_to(Some("y")).await.unwrap();
        let path = cache.snapshot().path;
        assert_eq!(
            path.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec!["x", "y"]
        );
    }

    #[tokio::test]
    async fn test_navigate_to_trashed_folder_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        transport.route(
            "GET",
            "/folders/d-1/",
            200,
            json!({"id": "d-1", "name": "Old", "parent_folder": null, "is_trashed": true}),
        );

        let err = cache.navigate_to(Some("d-1")).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(cache.current_target(), None);
        assert_eq!(transport.count("GET", "/files/?folder=d-1"), 0);
    }

    #[tokio::test]
    async fn test_upload_inserts_into_current_and_recent() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        route_listing(
            &transport,
            None,
            json!([]),
            json!([file_json("f-0", "old.txt", None, false)]),
        );
        transport.route(
            "GET",
            "/recent/",
            200,
            json!([file_json("f-0", "old.txt", None, false)]),
        );
        transport.route("POST", "/files/", 201, file_json("f-9", "new.txt", None, false));

        cache.navigate_to(None).await.unwrap();
        cache.fetch_recent().await.unwrap();

        let metadata = UploadMetadata {
            title: "new.txt".into(),
            file_name: "new.txt".into(),
            folder: None,
            tags: vec![],
            description: None,
        };
        cache.upload_file(metadata, b"hello".to_vec()).await.unwrap();

        let snapshot = cache.snapshot();
        assert_eq!(ids(&snapshot.current), vec!["f-0", "f-9"]);
        assert_eq!(ids(&snapshot.recent), vec!["f-9", "f-0"]);
    }

    #[tokio::test]
    async fn test_purge_and_empty_trash_remove_canonically() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        transport.route(
            "GET",
            "/trash/",
            200,
            json!([
                file_json("f-1", "a.txt", None, false),
                file_json("f-2", "b.txt", None, false)
            ]),
        );
        transport.route("DELETE", "/files/f-1/", 204, json!({}));
        transport.route("DELETE", "/trash/empty/", 204, json!({}));

        cache.fetch_trash().await.unwrap();
        cache.purge("f-1").await.unwrap();
        assert!(cache.resource("f-1").is_none());
        assert_eq!(ids(&cache.snapshot().trashed), vec!["f-2"]);

        cache.empty_trash().await.unwrap();
        assert!(cache.snapshot().trashed.is_empty());
        assert!(cache.resource("f-2").is_none());
    }

    #[tokio::test]
    async fn test_delete_folder_reconciles_listing_only() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        route_listing(
            &transport,
            None,
            json!([folder_json("d-1", "Docs", None)]),
            json!([]),
        );
        transport.route("DELETE", "/folders/d-1/", 204, json!({}));

        cache.navigate_to(None).await.unwrap();
        cache.delete_folder("d-1").await.unwrap();
        assert!(cache.snapshot().current.is_empty());
        assert!(cache.resource("d-1").is_none());
    }

    #[tokio::test]
    async fn test_share_validates_email_before_network() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        let err = cache
            .share_file("f-1", "not-an-email", AccessLevel::View)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(transport.count("POST", "/files/f-1/share/"), 0);

        transport.route("POST", "/files/f-1/share/", 200, json!({}));
        cache
            .share_file("f-1", "bob@example.com", AccessLevel::Edit)
            .await
            .unwrap();
        assert_eq!(transport.count("POST", "/files/f-1/share/"), 1);
    }

    #[tokio::test]
    async fn test_search_merges_without_view_changes() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;

        transport.route(
            "GET",
            "/search/?q=report",
            200,
            json!([file_json("f-7", "report.pdf", Some("d-1"), false)]),
        );

        let results = cache.search("report").await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(cache.resource("f-7").is_some());
        assert!(cache.snapshot().current.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_notified_on_change() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = cache_with(&transport).await;
        let mut rx = cache.subscribe();
        let initial = *rx.borrow_and_update();

        route_listing(&transport, None, json!([]), json!([]));
        cache.navigate_to(None).await.unwrap();

        rx.changed().await.unwrap();
        assert!(*rx.borrow() > initial);
    }

    #[test]
    fn test_valid_email() {
        assert!(valid_email("ada@example.com"));
        assert!(valid_email("a.b+c@sub.domain.org"));
        assert!(!valid_email("ada"));
        assert!(!valid_email("ada@"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("ada@nodot"));
        assert!(!valid_email("ada@.com"));
    }
}
