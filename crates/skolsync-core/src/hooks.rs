//! Reload coordinator bindings consumed by the UI layer.
//!
//! A [`Resource`] binds one (entity kind, arguments) pair to the store. It
//! subscribes once when attached, unsubscribes once when dropped, and owns
//! the deduplication policy: at most one outstanding network call per
//! resource key, no matter how many bindings share that key.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::api::SchoolApi;
use crate::entity::Entity;
use crate::error::{Result, SyncError};
use crate::message::{EntityMessage, Message};
use crate::state::{ResourceState, Status, StoreState};
use crate::store::{Store, Subscription};

pub struct Resource<E: Entity> {
    store: Store,
    api: Arc<dyn SchoolApi>,
    args: E::Args,
    key: String,
    state: watch::Receiver<ResourceState<E::Data>>,
    _subscription: Subscription,
}

/// Push the binding's slot into its watch channel if it changed.
fn publish<E: Entity>(
    sender: &watch::Sender<ResourceState<E::Data>>,
    state: &StoreState,
    key: &str,
) {
    let pending = ResourceState::default();
    let next = E::slot(&state.entities).get(key).unwrap_or(&pending);
    sender.send_if_modified(|current| {
        if *current == *next {
            false
        } else {
            *current = next.clone();
            true
        }
    });
}

impl<E: Entity> Resource<E> {
    /// Bind to the resource derived from `args` and start its first load.
    pub fn attach(store: Store, api: Arc<dyn SchoolApi>, args: E::Args) -> Self {
        let key = E::key(&args);
        let (sender, receiver) = watch::channel(ResourceState::default());
        let sender = Arc::new(sender);

        let listener_sender = sender.clone();
        let listener_key = key.clone();
        let subscription = store.subscribe(move |state| {
            publish::<E>(&listener_sender, state, &listener_key);
        });
        store.with_state(|state| publish::<E>(&sender, state, &key));

        debug!(entity = %E::KIND, key = %key, subscription = subscription.id(), "Resource attached");
        let resource = Self {
            store,
            api,
            args,
            key,
            state: receiver,
            _subscription: subscription,
        };
        resource.reload(false);
        resource
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn args(&self) -> &E::Args {
        &self.args
    }

    /// Latest state seen by this binding.
    pub fn state(&self) -> ResourceState<E::Data> {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> Status {
        self.state.borrow().status
    }

    pub fn data(&self) -> Option<E::Data> {
        self.state.borrow().data.clone()
    }

    /// Load the resource unless that would duplicate work.
    ///
    /// - `Loading`: no-op, a fetch is already outstanding for this key.
    /// - `Loaded` without `force`: no-op.
    /// - `Pending`: read the persistent cache first, then fetch.
    /// - `Loaded` with `force`: fetch without touching the cache.
    ///
    /// Returns whether a network call was issued. The decision and the
    /// dispatch happen atomically in the store. Once the engine has shut
    /// down nothing is issued.
    pub fn reload(&self, force: bool) -> bool {
        if self.store.is_closed() {
            debug!(entity = %E::KIND, key = %self.key, "Engine closed, reload skipped");
            return false;
        }
        let mut issued = false;
        self.store.dispatch_with(|state| {
            let status = state.status::<E>(&self.key);
            match status {
                Status::Loading => return Vec::new(),
                Status::Loaded if !force => return Vec::new(),
                _ => {}
            }

            let mut messages: Vec<Message> = Vec::with_capacity(2);
            if status == Status::Pending {
                messages.push(EntityMessage::<E>::begin_cache_read(self.key.clone()).into());
            }
            let api = self.api.clone();
            let args = self.args.clone();
            messages.push(
                EntityMessage::<E>::begin_network_call(
                    self.key.clone(),
                    Box::new(move || E::fetch(api, args)),
                )
                .into(),
            );
            issued = true;
            messages
        });

        if !issued {
            debug!(entity = %E::KIND, key = %self.key, force, "Reload skipped");
        }
        // The request was rejected if the effect handler went away meanwhile.
        issued && !self.store.is_closed()
    }

    /// Forced reload, the default for user-triggered refreshes.
    pub fn refresh(&self) -> bool {
        self.reload(true)
    }

    /// Wait for the next change of this resource and return the new state.
    ///
    /// Fails with [`SyncError::EngineClosed`] once the engine has shut down.
    pub async fn changed(&mut self) -> Result<ResourceState<E::Data>> {
        self.state
            .changed()
            .await
            .map_err(|_| SyncError::EngineClosed)?;
        Ok(self.state.borrow_and_update().clone())
    }

    /// Wait until the resource state satisfies `condition`.
    pub async fn wait_until<F>(&mut self, condition: F) -> Result<ResourceState<E::Data>>
    where
        F: Fn(&ResourceState<E::Data>) -> bool,
    {
        loop {
            {
                let current = self.state.borrow_and_update();
                if condition(&current) {
                    return Ok(current.clone());
                }
            }
            self.state
                .changed()
                .await
                .map_err(|_| SyncError::EngineClosed)?;
        }
    }
}

impl<E: Entity> Drop for Resource<E> {
    fn drop(&mut self) {
        debug!(entity = %E::KIND, key = %self.key, "Resource detached");
    }
}
