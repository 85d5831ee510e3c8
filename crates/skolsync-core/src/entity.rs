//! Entity kinds and the compile-time pairing of each kind with its call
//! arguments, payload type, key derivation, and remote fetch.

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};

use crate::api::SchoolApi;
use crate::message::{AnyEntityMessage, EntityMessage};
use crate::models::{
    CalendarItem, Child, Classmate, MenuItem, NewsItem, Notification, ScheduleItem, User,
};
use crate::state::{Entities, EntityStateMap};

/// Key of the single children-list resource
const CHILDREN_KEY: &str = "all";

/// Key of the single signed-in user resource
const USER_KEY: &str = "me";

/// Date format used in schedule keys
const ISO_DATE: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Calendar,
    Children,
    Classmates,
    Menu,
    News,
    Notifications,
    Schedule,
    User,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Calendar,
        EntityKind::Children,
        EntityKind::Classmates,
        EntityKind::Menu,
        EntityKind::News,
        EntityKind::Notifications,
        EntityKind::Schedule,
        EntityKind::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Calendar => "calendar",
            EntityKind::Children => "children",
            EntityKind::Classmates => "classmates",
            EntityKind::Menu => "menu",
            EntityKind::News => "news",
            EntityKind::Notifications => "notifications",
            EntityKind::Schedule => "schedule",
            EntityKind::User => "user",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent cache key of one resource: `"{entity}_{key}"`.
pub fn cache_key(kind: EntityKind, key: &str) -> String {
    format!("{}_{}", kind, key)
}

/// Binds an entity kind to everything the engine needs to know about it.
///
/// Implemented by zero-sized marker types, one per kind. Keys must be
/// produced only by [`Entity::key`]; two logically distinct resources must
/// never derive the same key.
pub trait Entity: Sized + Send + 'static {
    const KIND: EntityKind;

    /// Arguments a consumer passes to request one resource instance.
    type Args: Clone + Send + Sync + 'static;

    /// Payload stored in resource state and in the persistent cache.
    type Data: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    fn key(args: &Self::Args) -> String;

    fn fetch(api: Arc<dyn SchoolApi>, args: Self::Args) -> BoxFuture<'static, Result<Self::Data>>;

    fn slot(entities: &Entities) -> &EntityStateMap<Self::Data>;

    fn slot_mut(entities: &mut Entities) -> &mut EntityStateMap<Self::Data>;

    fn wrap(message: EntityMessage<Self>) -> AnyEntityMessage;

    fn unwrap(message: &AnyEntityMessage) -> Option<&EntityMessage<Self>>;
}

/// Implements the state-slot and message plumbing shared by every entity.
macro_rules! entity_plumbing {
    ($variant:ident, $field:ident) => {
        fn slot(entities: &Entities) -> &EntityStateMap<Self::Data> {
            &entities.$field
        }

        fn slot_mut(entities: &mut Entities) -> &mut EntityStateMap<Self::Data> {
            &mut entities.$field
        }

        fn wrap(message: EntityMessage<Self>) -> AnyEntityMessage {
            AnyEntityMessage::$variant(message)
        }

        fn unwrap(message: &AnyEntityMessage) -> Option<&EntityMessage<Self>> {
            match message {
                AnyEntityMessage::$variant(inner) => Some(inner),
                _ => None,
            }
        }
    };
}

/// A child's calendar.
pub struct Calendar;

impl Entity for Calendar {
    const KIND: EntityKind = EntityKind::Calendar;
    type Args = Child;
    type Data = Vec<CalendarItem>;

    fn key(child: &Child) -> String {
        child.id.clone()
    }

    fn fetch(api: Arc<dyn SchoolApi>, child: Child) -> BoxFuture<'static, Result<Self::Data>> {
        Box::pin(async move { api.get_calendar(&child).await })
    }

    entity_plumbing!(Calendar, calendar);
}

/// The children visible to the signed-in user. A single resource.
pub struct Children;

impl Entity for Children {
    const KIND: EntityKind = EntityKind::Children;
    type Args = ();
    type Data = Vec<Child>;

    fn key(_: &()) -> String {
        CHILDREN_KEY.to_string()
    }

    fn fetch(api: Arc<dyn SchoolApi>, _: ()) -> BoxFuture<'static, Result<Self::Data>> {
        Box::pin(async move { api.get_children().await })
    }

    entity_plumbing!(Children, children);
}

pub struct Classmates;

impl Entity for Classmates {
    const KIND: EntityKind = EntityKind::Classmates;
    type Args = Child;
    type Data = Vec<Classmate>;

    fn key(child: &Child) -> String {
        child.id.clone()
    }

    fn fetch(api: Arc<dyn SchoolApi>, child: Child) -> BoxFuture<'static, Result<Self::Data>> {
        Box::pin(async move { api.get_classmates(&child).await })
    }

    entity_plumbing!(Classmates, classmates);
}

pub struct Menu;

impl Entity for Menu {
    const KIND: EntityKind = EntityKind::Menu;
    type Args = Child;
    type Data = Vec<MenuItem>;

    fn key(child: &Child) -> String {
        child.id.clone()
    }

    fn fetch(api: Arc<dyn SchoolApi>, child: Child) -> BoxFuture<'static, Result<Self::Data>> {
        Box::pin(async move { api.get_menu(&child).await })
    }

    entity_plumbing!(Menu, menu);
}

pub struct News;

impl Entity for News {
    const KIND: EntityKind = EntityKind::News;
    type Args = Child;
    type Data = Vec<NewsItem>;

    fn key(child: &Child) -> String {
        child.id.clone()
    }

    fn fetch(api: Arc<dyn SchoolApi>, child: Child) -> BoxFuture<'static, Result<Self::Data>> {
        Box::pin(async move { api.get_news(&child).await })
    }

    entity_plumbing!(News, news);
}

pub struct Notifications;

impl Entity for Notifications {
    const KIND: EntityKind = EntityKind::Notifications;
    type Args = Child;
    type Data = Vec<Notification>;

    fn key(child: &Child) -> String {
        child.id.clone()
    }

    fn fetch(api: Arc<dyn SchoolApi>, child: Child) -> BoxFuture<'static, Result<Self::Data>> {
        Box::pin(async move { api.get_notifications(&child).await })
    }

    entity_plumbing!(Notifications, notifications);
}

/// Arguments of a schedule request: one child over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRange {
    pub child: Child,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl ScheduleRange {
    pub fn new(child: Child, from: NaiveDate, to: NaiveDate) -> Self {
        Self { child, from, to }
    }
}

pub struct Schedule;

impl Entity for Schedule {
    const KIND: EntityKind = EntityKind::Schedule;
    type Args = ScheduleRange;
    type Data = Vec<ScheduleItem>;

    fn key(range: &ScheduleRange) -> String {
        format!(
            "{}_{}_{}",
            range.child.id,
            range.from.format(ISO_DATE),
            range.to.format(ISO_DATE)
        )
    }

    fn fetch(
        api: Arc<dyn SchoolApi>,
        range: ScheduleRange,
    ) -> BoxFuture<'static, Result<Self::Data>> {
        Box::pin(async move { api.get_schedule(&range.child, range.from, range.to).await })
    }

    entity_plumbing!(Schedule, schedule);
}

/// Profile of the signed-in user. A single resource.
pub struct UserProfile;

impl Entity for UserProfile {
    const KIND: EntityKind = EntityKind::User;
    type Args = ();
    type Data = User;

    fn key(_: &()) -> String {
        USER_KEY.to_string()
    }

    fn fetch(api: Arc<dyn SchoolApi>, _: ()) -> BoxFuture<'static, Result<Self::Data>> {
        Box::pin(async move { api.get_user().await })
    }

    entity_plumbing!(User, user);
}
