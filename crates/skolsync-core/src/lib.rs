//! skolsync core - an offline-first entity cache for a school platform API.
//!
//! Every fetchable entity (children, schedules, news, ...) is held as a
//! per-key resource with a loading status, the last good data and the last
//! error. Bindings read the persistent cache first, then refresh from the
//! network, and never issue more than one call per key at a time.
//!
//! Start with [`SyncEngine::start`], then bind resources through it:
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use skolsync_core::{FakeApi, MemoryStorage, SyncEngine};
//!
//! let engine = SyncEngine::start(Arc::new(FakeApi::new()), Arc::new(MemoryStorage::new()));
//! engine.login("121212121212").await?;
//! let mut children = engine.children();
//! let state = children.wait_until(|s| s.is_loaded()).await?;
//! println!("{:?}", state.data);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
mod effects;
pub mod engine;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod message;
pub mod models;
pub mod reducers;
pub mod state;
pub mod store;

#[cfg(test)]
mod test_support;

pub use api::{ApiError, FakeApi, SchoolApi, SessionEvent};
pub use cache::{FileStorage, MemoryStorage, Storage};
pub use config::Config;
pub use engine::SyncEngine;
pub use entity::{
    Calendar, Children, Classmates, Entity, EntityKind, Menu, News, Notifications, Schedule,
    ScheduleRange, UserProfile,
};
pub use error::{Result, SyncError};
pub use hooks::Resource;
pub use message::{AnyEntityMessage, EntityEvent, EntityMessage, Message};
pub use state::{ErrorInfo, ResourceState, Session, Status, StoreState};
pub use store::{Store, Subscription};
