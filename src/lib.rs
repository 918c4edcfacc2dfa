//! DriveKit - client core for a hierarchical file-storage service
//!
//! Everything a front end needs to drive the service without touching HTTP
//! directly: bearer-credential session lifecycle with single-flight refresh,
//! a request gateway that recovers from one authorization failure per call,
//! and an in-memory resource cache with derived views and breadcrumb
//! navigation. Front ends subscribe to the session and cache watch channels
//! and pull snapshots when notified.

pub mod api;
pub mod cache;
pub mod session;

pub use api::transport::{HttpTransport, Transport};
pub use api::{ApiError, ApiGateway};
pub use cache::{CacheSnapshot, Resource, ResourceCache};
pub use session::store::SessionStore;
pub use session::{SessionManager, SessionSnapshot, SessionState};
