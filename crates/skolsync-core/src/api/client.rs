//! The `SchoolApi` trait every remote collaborator implements.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::broadcast;

use crate::models::{
    CalendarItem, Child, Classmate, LoginStatus, MenuItem, NewsItem, Notification, ScheduleItem,
    User,
};

/// Session change notification published by a [`SchoolApi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Login { is_fake: bool },
    Logout,
}

/// Per-entity fetch operations plus the session surface of the remote
/// school platform.
///
/// Each fetch takes the same arguments the matching entity derives its
/// resource key from. Implementations must be cheap to share behind an
/// `Arc`; the engine clones the handle into every fetch thunk.
#[async_trait]
pub trait SchoolApi: Send + Sync {
    fn is_logged_in(&self) -> bool;

    fn is_fake(&self) -> bool;

    /// Subscribe to login/logout notifications. Dropping the receiver
    /// unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    async fn login(&self, personal_number: &str) -> Result<LoginStatus>;

    async fn logout(&self) -> Result<()>;

    async fn get_calendar(&self, child: &Child) -> Result<Vec<CalendarItem>>;

    async fn get_children(&self) -> Result<Vec<Child>>;

    async fn get_classmates(&self, child: &Child) -> Result<Vec<Classmate>>;

    async fn get_menu(&self, child: &Child) -> Result<Vec<MenuItem>>;

    async fn get_news(&self, child: &Child) -> Result<Vec<NewsItem>>;

    async fn get_notifications(&self, child: &Child) -> Result<Vec<Notification>>;

    async fn get_schedule(
        &self,
        child: &Child,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleItem>>;

    async fn get_user(&self) -> Result<User>;
}
