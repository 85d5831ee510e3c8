//! Messages dispatched into the store.
//!
//! Entity messages are typed per entity kind, so a payload can only ever
//! reach the state map of the kind it was fetched for.

use std::fmt;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt};

use crate::entity::{
    cache_key, Calendar, Children, Classmates, Entity, EntityKind, Menu, News, Notifications,
    Schedule, UserProfile,
};
use crate::state::ErrorInfo;

/// Deferred remote call, bound to the arguments of the request that made it.
pub type Fetch<T> = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<T>> + Send>;

/// Box an async closure into a [`Fetch`].
pub fn boxed_fetch<T, F, Fut>(fetch: F) -> Fetch<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Box::new(move || fetch().boxed())
}

/// Lifecycle event of one resource.
pub enum EntityEvent<E: Entity> {
    BeginCacheRead,
    BeginNetworkCall(Fetch<E::Data>),
    CacheReadSucceeded(E::Data),
    NetworkCallSucceeded(E::Data),
    NetworkCallFailed(ErrorInfo),
}

impl<E: Entity> EntityEvent<E> {
    pub fn name(&self) -> &'static str {
        match self {
            EntityEvent::BeginCacheRead => "begin-cache-read",
            EntityEvent::BeginNetworkCall(_) => "begin-network-call",
            EntityEvent::CacheReadSucceeded(_) => "cache-read-succeeded",
            EntityEvent::NetworkCallSucceeded(_) => "network-call-succeeded",
            EntityEvent::NetworkCallFailed(_) => "network-call-failed",
        }
    }
}

/// An event addressed to one resource of entity kind `E`.
pub struct EntityMessage<E: Entity> {
    pub key: String,
    /// Session epoch the originating request was issued under. Stamped by
    /// the store on begin messages and copied onto their results.
    pub epoch: u64,
    pub event: EntityEvent<E>,
}

impl<E: Entity> EntityMessage<E> {
    fn new(key: impl Into<String>, epoch: u64, event: EntityEvent<E>) -> Self {
        Self {
            key: key.into(),
            epoch,
            event,
        }
    }

    pub fn begin_cache_read(key: impl Into<String>) -> Self {
        Self::new(key, 0, EntityEvent::BeginCacheRead)
    }

    pub fn begin_network_call(key: impl Into<String>, fetch: Fetch<E::Data>) -> Self {
        Self::new(key, 0, EntityEvent::BeginNetworkCall(fetch))
    }

    pub fn cache_read_succeeded(key: impl Into<String>, epoch: u64, data: E::Data) -> Self {
        Self::new(key, epoch, EntityEvent::CacheReadSucceeded(data))
    }

    pub fn network_call_succeeded(key: impl Into<String>, epoch: u64, data: E::Data) -> Self {
        Self::new(key, epoch, EntityEvent::NetworkCallSucceeded(data))
    }

    pub fn network_call_failed(key: impl Into<String>, epoch: u64, error: ErrorInfo) -> Self {
        Self::new(key, epoch, EntityEvent::NetworkCallFailed(error))
    }

    /// Whether this message asks for I/O rather than reporting its outcome.
    pub fn is_request(&self) -> bool {
        matches!(
            self.event,
            EntityEvent::BeginCacheRead | EntityEvent::BeginNetworkCall(_)
        )
    }

    pub fn cache_key(&self) -> String {
        cache_key(E::KIND, &self.key)
    }

    /// The failure answering this message if it is a network request.
    pub(crate) fn rejection(&self, error: ErrorInfo) -> Option<Self> {
        match self.event {
            EntityEvent::BeginNetworkCall(_) => Some(Self::network_call_failed(
                self.key.clone(),
                self.epoch,
                error,
            )),
            _ => None,
        }
    }
}

impl<E: Entity> fmt::Debug for EntityMessage<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMessage")
            .field("entity", &E::KIND)
            .field("key", &self.key)
            .field("epoch", &self.epoch)
            .field("event", &self.event.name())
            .finish()
    }
}

/// Closed sum of entity messages over every entity kind.
#[derive(Debug)]
pub enum AnyEntityMessage {
    Calendar(EntityMessage<Calendar>),
    Children(EntityMessage<Children>),
    Classmates(EntityMessage<Classmates>),
    Menu(EntityMessage<Menu>),
    News(EntityMessage<News>),
    Notifications(EntityMessage<Notifications>),
    Schedule(EntityMessage<Schedule>),
    User(EntityMessage<UserProfile>),
}

/// Evaluate `$body` with `$inner` bound to the typed message inside an
/// [`AnyEntityMessage`]. Each arm is type-checked for its own entity kind.
macro_rules! each_entity {
    ($message:expr, $inner:ident => $body:expr) => {
        match $message {
            $crate::message::AnyEntityMessage::Calendar($inner) => $body,
            $crate::message::AnyEntityMessage::Children($inner) => $body,
            $crate::message::AnyEntityMessage::Classmates($inner) => $body,
            $crate::message::AnyEntityMessage::Menu($inner) => $body,
            $crate::message::AnyEntityMessage::News($inner) => $body,
            $crate::message::AnyEntityMessage::Notifications($inner) => $body,
            $crate::message::AnyEntityMessage::Schedule($inner) => $body,
            $crate::message::AnyEntityMessage::User($inner) => $body,
        }
    };
}
pub(crate) use each_entity;

impl AnyEntityMessage {
    pub fn kind(&self) -> EntityKind {
        fn kind_of<E: Entity>(_: &EntityMessage<E>) -> EntityKind {
            E::KIND
        }
        each_entity!(self, m => kind_of(m))
    }

    pub fn key(&self) -> &str {
        each_entity!(self, m => &m.key)
    }

    pub fn epoch(&self) -> u64 {
        each_entity!(self, m => m.epoch)
    }

    pub fn event_name(&self) -> &'static str {
        each_entity!(self, m => m.event.name())
    }

    pub fn is_request(&self) -> bool {
        each_entity!(self, m => m.is_request())
    }

    pub(crate) fn set_epoch(&mut self, epoch: u64) {
        each_entity!(self, m => m.epoch = epoch)
    }

    pub(crate) fn rejection(&self, error: ErrorInfo) -> Option<AnyEntityMessage> {
        fn reject<E: Entity>(m: &EntityMessage<E>, error: ErrorInfo) -> Option<AnyEntityMessage> {
            m.rejection(error).map(E::wrap)
        }
        each_entity!(self, m => reject(m, error))
    }
}

/// Everything that can be dispatched into the store.
#[derive(Debug)]
pub enum Message {
    Entity(AnyEntityMessage),
    /// The collaborator reported a successful login.
    Login { is_fake: bool },
    /// The collaborator reported a logout; also wipes all entity state.
    Logout,
    /// Wipe all entity state and reset the session.
    ClearAll,
}

impl Message {
    pub fn is_session_change(&self) -> bool {
        matches!(
            self,
            Message::Login { .. } | Message::Logout | Message::ClearAll
        )
    }
}

impl<E: Entity> From<EntityMessage<E>> for Message {
    fn from(message: EntityMessage<E>) -> Self {
        Message::Entity(E::wrap(message))
    }
}
