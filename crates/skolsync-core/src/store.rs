//! The state container.
//!
//! `Store` exclusively owns the combined [`StoreState`]. Consumers read
//! snapshots, submit messages, and subscribe to changes; nothing outside
//! holds a mutable reference into the state.
//!
//! Dispatch is synchronous: a message is fully applied and every listener
//! has run by the time `dispatch` returns. Messages asking for I/O are then
//! forwarded to the effect handler, whose results come back later as new
//! messages.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::effects::EffectRequest;
use crate::entity::Entity;
use crate::message::{AnyEntityMessage, Message};
use crate::reducers::root_transition;
use crate::state::{ErrorInfo, ResourceState, Session, Status, StoreState};

/// Stable handle of one registered listener.
pub type SubscriptionId = u64;

type Listener = Box<dyn Fn(&StoreState) + Send>;

struct Inner {
    state: StoreState,
    listeners: BTreeMap<SubscriptionId, Listener>,
    next_id: SubscriptionId,
    /// Set once the effect handler is gone. Requests are rejected from then on.
    closed: bool,
}

impl Inner {
    fn notify(&self) {
        for listener in self.listeners.values() {
            listener(&self.state);
        }
    }

    /// Drop every listener once closed, so bindings see their channels end.
    fn release_if_closed(&mut self) {
        if self.closed && !self.listeners.is_empty() {
            debug!(listeners = self.listeners.len(), "Store closed, releasing listeners");
            self.listeners.clear();
        }
    }
}

/// Shared handle to the state container. Clones refer to the same state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<Inner>>,
    effects: Option<mpsc::UnboundedSender<EffectRequest>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// A store without an effect handler: requests only change state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: StoreState::default(),
                listeners: BTreeMap::new(),
                next_id: 0,
                closed: false,
            })),
            effects: None,
        }
    }

    /// A store forwarding cache and network requests to `effects`.
    pub(crate) fn with_effects(effects: mpsc::UnboundedSender<EffectRequest>) -> Self {
        Self {
            effects: Some(effects),
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one message and notify listeners.
    ///
    /// Listeners run while the store is locked and must not dispatch or
    /// subscribe.
    pub fn dispatch(&self, message: impl Into<Message>) {
        let mut inner = self.lock();
        self.apply(&mut inner, message.into());
        inner.release_if_closed();
    }

    /// Decide and apply messages in one critical section.
    ///
    /// `plan` sees the current state and returns the messages to apply. No
    /// other dispatch can interleave between the decision and its effects,
    /// which is what makes check-then-dispatch sequences race free.
    pub fn dispatch_with<F>(&self, plan: F)
    where
        F: FnOnce(&StoreState) -> Vec<Message>,
    {
        let mut inner = self.lock();
        for message in plan(&inner.state) {
            self.apply(&mut inner, message);
        }
        inner.release_if_closed();
    }

    fn apply(&self, inner: &mut Inner, mut message: Message) {
        let state = &mut inner.state;
        if let Message::Entity(any) = &mut message {
            if any.is_request() {
                any.set_epoch(state.epoch);
            } else if any.epoch() != state.epoch {
                debug!(
                    entity = %any.kind(),
                    key = %any.key(),
                    event = any.event_name(),
                    epoch = any.epoch(),
                    current_epoch = state.epoch,
                    "Discarding result from a previous session"
                );
                return;
            }
        }

        if message.is_session_change() {
            state.epoch += 1;
            info!(message = ?message, epoch = state.epoch, "Session changed");
        }

        let entities = std::mem::take(&mut state.entities);
        let (session, entities) = root_transition(state.session, entities, &message);
        state.session = session;
        state.entities = entities;
        inner.notify();

        if let Message::Entity(any) = message {
            if any.is_request() {
                self.forward(inner, any);
            }
        }
    }

    fn forward(&self, inner: &mut Inner, request: AnyEntityMessage) {
        let Some(effects) = &self.effects else {
            return;
        };
        if inner.closed {
            self.reject(inner, request);
            return;
        }
        let session = inner.state.session;
        if let Err(e) = effects.send(EffectRequest {
            message: request,
            session,
        }) {
            let request = e.0.message;
            warn!(
                entity = %request.kind(),
                key = %request.key(),
                "Effect handler has shut down; request rejected"
            );
            inner.closed = true;
            self.reject(inner, request);
        }
    }

    /// Answer a network request nobody will perform with a failure, so the
    /// resource leaves `Loading`.
    fn reject(&self, inner: &mut Inner, request: AnyEntityMessage) {
        if let Some(failed) = request.rejection(ErrorInfo::engine_closed()) {
            self.apply(inner, Message::Entity(failed));
        }
    }

    /// Stop accepting requests and release every listener.
    pub(crate) fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.release_if_closed();
    }

    /// Whether the effect handler is gone. Requests dispatched now fail
    /// immediately.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Register a listener called after every applied message.
    ///
    /// The listener stays registered until the returned guard is dropped or
    /// the store closes.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StoreState) + Send + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        // A closed store drops the listener right away, ending its channel.
        if !inner.closed {
            inner.listeners.insert(id, Box::new(listener));
            debug!(subscription = id, "Listener subscribed");
        }
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Read the current state without cloning it.
    pub fn with_state<R>(&self, read: impl FnOnce(&StoreState) -> R) -> R {
        read(&self.lock().state)
    }

    pub fn snapshot(&self) -> StoreState {
        self.with_state(StoreState::clone)
    }

    pub fn resource<E: Entity>(&self, key: &str) -> ResourceState<E::Data> {
        self.with_state(|state| state.resource::<E>(key))
    }

    pub fn status<E: Entity>(&self, key: &str) -> Status {
        self.with_state(|state| state.status::<E>(key))
    }

    pub fn session(&self) -> Session {
        self.with_state(|state| state.session)
    }

    pub fn epoch(&self) -> u64 {
        self.with_state(|state| state.epoch)
    }
}

/// Registration guard returned by [`Store::subscribe`].
///
/// Unsubscribes exactly once, when dropped. Must not be dropped from inside
/// a listener.
pub struct Subscription {
    id: SubscriptionId,
    inner: Weak<Mutex<Inner>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.listeners.remove(&self.id);
            debug!(subscription = self.id, "Listener unsubscribed");
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
