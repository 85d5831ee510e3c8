//! Resource state held by the store.
//!
//! Every (entity kind, resource key) pair owns one [`ResourceState`]. The
//! states of one kind live in an [`EntityStateMap`]; all maps plus the
//! [`Session`] make up the [`StoreState`] owned by the store.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::api::ApiError;
use crate::entity::Entity;
use crate::error::SyncError;
use crate::models::{
    CalendarItem, Child, Classmate, MenuItem, NewsItem, Notification, ScheduleItem, User,
};

/// Load status of a single resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Status {
    /// No usable network result yet, or invalidated by a failure.
    #[default]
    Pending,
    /// A network call is outstanding.
    Loading,
    /// The network call succeeded at least once.
    Loaded,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Loading => "loading",
            Status::Loaded => "loaded",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable projection of a failure, detached from the native error type
/// so it can be stored, cloned, and compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ErrorInfo {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorInfo {
    /// Project an error into its serializable form.
    ///
    /// `name` is the [`ApiError`] variant when the error is one, `"Error"`
    /// otherwise. `stack` holds the context chain when there is one.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let name = err
            .downcast_ref::<ApiError>()
            .map(ApiError::name)
            .unwrap_or("Error")
            .to_string();
        let stack = if err.chain().nth(1).is_some() {
            Some(format!("{:#}", err))
        } else {
            None
        };
        Self {
            name,
            message: err.to_string(),
            stack,
        }
    }

    /// Failure recorded when a request reaches a store whose engine has
    /// shut down.
    pub fn engine_closed() -> Self {
        Self {
            name: "EngineClosed".to_string(),
            message: SyncError::EngineClosed.to_string(),
            stack: None,
        }
    }
}

/// State of one resource instance: status, last known data, last error.
///
/// `error` is only ever set while `status` is [`Status::Pending`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ResourceState<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            data: None,
            status: Status::Pending,
            error: None,
        }
    }
}

impl<T> ResourceState<T> {
    pub fn is_loading(&self) -> bool {
        self.status == Status::Loading
    }

    pub fn is_loaded(&self) -> bool {
        self.status == Status::Loaded
    }
}

/// All resource states of one entity kind, keyed by resource key.
pub type EntityStateMap<T> = HashMap<String, ResourceState<T>>;

/// Session flags as last reported by the remote collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Session {
    pub is_logged_in: bool,
    /// Sandbox session; never touches the persistent cache.
    pub is_fake: bool,
}

/// One state map per entity kind.
#[derive(Debug, Clone, Default)]
pub struct Entities {
    pub calendar: EntityStateMap<Vec<CalendarItem>>,
    pub children: EntityStateMap<Vec<Child>>,
    pub classmates: EntityStateMap<Vec<Classmate>>,
    pub menu: EntityStateMap<Vec<MenuItem>>,
    pub news: EntityStateMap<Vec<NewsItem>>,
    pub notifications: EntityStateMap<Vec<Notification>>,
    pub schedule: EntityStateMap<Vec<ScheduleItem>>,
    pub user: EntityStateMap<User>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.calendar.is_empty()
            && self.children.is_empty()
            && self.classmates.is_empty()
            && self.menu.is_empty()
            && self.news.is_empty()
            && self.notifications.is_empty()
            && self.schedule.is_empty()
            && self.user.is_empty()
    }
}

/// Combined state owned by the store.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub session: Session,
    /// Bumped on every session change; results of requests issued under an
    /// older epoch are discarded.
    pub epoch: u64,
    pub entities: Entities,
}

impl StoreState {
    /// State of one resource, `Pending` with no data if never referenced.
    pub fn resource<E: Entity>(&self, key: &str) -> ResourceState<E::Data> {
        E::slot(&self.entities)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn status<E: Entity>(&self, key: &str) -> Status {
        E::slot(&self.entities)
            .get(key)
            .map(|state| state.status)
            .unwrap_or_default()
    }
}
