//! The explicitly constructed sync engine.
//!
//! `SyncEngine` wires a [`Store`] to the effect handler task and keeps the
//! session state in step with the remote collaborator's login/logout
//! events. Create one per signed-in application and hand it to whatever
//! owns the UI bindings.

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{SchoolApi, SessionEvent};
use crate::cache::Storage;
use crate::effects::EffectHandler;
use crate::entity::{
    Calendar, Children, Classmates, Entity, Menu, News, Notifications, Schedule, ScheduleRange,
    UserProfile,
};
use crate::hooks::Resource;
use crate::message::Message;
use crate::models::{Child, LoginStatus};
use crate::state::Session;
use crate::store::{Store, Subscription};

pub struct SyncEngine {
    store: Store,
    api: Arc<dyn SchoolApi>,
    session: Arc<watch::Sender<Session>>,
    _session_subscription: Subscription,
    effects: JoinHandle<()>,
    session_listener: JoinHandle<()>,
}

impl SyncEngine {
    /// Start the engine's background tasks. Must be called from within a
    /// Tokio runtime.
    pub fn start(api: Arc<dyn SchoolApi>, storage: Arc<dyn Storage>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Store::with_effects(tx);
        let effects = tokio::spawn(EffectHandler::new(store.clone(), storage, rx).run());

        let (session, _) = watch::channel(store.session());
        let session = Arc::new(session);
        let publisher = session.clone();
        let session_subscription = store.subscribe(move |state| {
            publisher.send_if_modified(|current| {
                if *current == state.session {
                    false
                } else {
                    *current = state.session;
                    true
                }
            });
        });

        // Subscribe before reading the flags so no event falls in between.
        let events = api.subscribe();
        sync_from_flags(&store, api.as_ref());
        let session_listener = tokio::spawn(follow_session(store.clone(), api.clone(), events));

        info!("Sync engine started");
        Self {
            store,
            api,
            session,
            _session_subscription: session_subscription,
            effects,
            session_listener,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn session(&self) -> Session {
        self.store.session()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session().is_logged_in
    }

    pub fn is_fake(&self) -> bool {
        self.session().is_fake
    }

    /// Follow login/logout as they are applied to the store.
    ///
    /// The receiver sees every session change, including the wipe done by
    /// [`SyncEngine::clear`]. It closes when the engine is dropped.
    pub fn subscribe_session(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    /// Log in through the collaborator. Failures are returned to the caller
    /// and never stored.
    ///
    /// On success the session is updated before returning, so resources bound
    /// right after `login` belong to the new session.
    pub async fn login(&self, personal_number: &str) -> Result<LoginStatus> {
        let status = self.api.login(personal_number).await?;
        sync_from_flags(&self.store, self.api.as_ref());
        Ok(status)
    }

    pub async fn logout(&self) -> Result<()> {
        self.api.logout().await?;
        sync_from_flags(&self.store, self.api.as_ref());
        Ok(())
    }

    /// Wipe all in-memory resource state. Persisted entries are kept.
    pub fn clear(&self) {
        self.store.dispatch(Message::ClearAll);
    }

    /// Bind to any resource; the first load starts immediately.
    pub fn resource<E: Entity>(&self, args: E::Args) -> Resource<E> {
        Resource::attach(self.store.clone(), self.api.clone(), args)
    }

    pub fn calendar(&self, child: &Child) -> Resource<Calendar> {
        self.resource(child.clone())
    }

    pub fn children(&self) -> Resource<Children> {
        self.resource(())
    }

    pub fn classmates(&self, child: &Child) -> Resource<Classmates> {
        self.resource(child.clone())
    }

    pub fn menu(&self, child: &Child) -> Resource<Menu> {
        self.resource(child.clone())
    }

    pub fn news(&self, child: &Child) -> Resource<News> {
        self.resource(child.clone())
    }

    pub fn notifications(&self, child: &Child) -> Resource<Notifications> {
        self.resource(child.clone())
    }

    pub fn schedule(&self, child: &Child, from: NaiveDate, to: NaiveDate) -> Resource<Schedule> {
        self.resource(ScheduleRange::new(child.clone(), from, to))
    }

    pub fn user(&self) -> Resource<UserProfile> {
        self.resource(())
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.store.close();
        self.session_listener.abort();
        self.effects.abort();
        debug!("Sync engine stopped");
    }
}

/// Bring the session state in line with the collaborator's current flags.
fn sync_from_flags(store: &Store, api: &dyn SchoolApi) {
    let event = if api.is_logged_in() {
        SessionEvent::Login {
            is_fake: api.is_fake(),
        }
    } else {
        SessionEvent::Logout
    };
    apply_event(store, event);
}

/// Dispatch a session event unless the store already reflects it.
fn apply_event(store: &Store, event: SessionEvent) {
    let current = store.session();
    match event {
        SessionEvent::Login { is_fake } => {
            if !current.is_logged_in || current.is_fake != is_fake {
                store.dispatch(Message::Login { is_fake });
            }
        }
        SessionEvent::Logout => {
            if current.is_logged_in {
                store.dispatch(Message::Logout);
            }
        }
    }
}

/// Events may trail a `login`/`logout` already synced from the flags.
/// Those that contradict the collaborator's current state are stale.
fn is_current(api: &dyn SchoolApi, event: SessionEvent) -> bool {
    match event {
        SessionEvent::Login { .. } => api.is_logged_in(),
        SessionEvent::Logout => !api.is_logged_in(),
    }
}

async fn follow_session(
    store: Store,
    api: Arc<dyn SchoolApi>,
    mut events: broadcast::Receiver<SessionEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) if is_current(api.as_ref(), event) => apply_event(&store, event),
            Ok(event) => debug!(?event, "Ignoring stale session event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Missed session events, resyncing from API flags");
                sync_from_flags(&store, api.as_ref());
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Session event channel closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::api::FakeApi;
    use crate::cache::MemoryStorage;
    use crate::error::SyncError;
    use crate::state::Status;
    use crate::test_support::{eventually, MockApi};

    fn engine_with(api: Arc<dyn SchoolApi>) -> (SyncEngine, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (SyncEngine::start(api, storage.clone()), storage)
    }

    #[tokio::test]
    async fn test_login_event_updates_session() {
        let (engine, _) = engine_with(Arc::new(MockApi::new()));
        assert_eq!(engine.session(), Session::default());

        engine.login("201212121212").await.unwrap();
        assert!(engine.is_logged_in());
        assert!(!engine.is_fake());
    }

    #[tokio::test]
    async fn test_resource_bound_right_after_login_survives_login_event() {
        let (engine, _) = engine_with(Arc::new(MockApi::new()));
        engine.login("201212121212").await.unwrap();
        let epoch = engine.store().epoch();
        let mut children = engine.children();

        let state = children.wait_until(|s| s.is_loaded()).await.unwrap();
        assert_eq!(state.data, Some(vec![Child::new("2")]));
        assert_eq!(engine.store().epoch(), epoch);
    }

    #[tokio::test]
    async fn test_login_failure_is_returned_not_stored() {
        let (engine, _) = engine_with(Arc::new(MockApi::new()));
        assert!(engine.login("").await.is_err());
        tokio::task::yield_now().await;
        assert!(!engine.is_logged_in());
        assert!(engine.store().snapshot().entities.is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_memory_but_not_storage() {
        let (engine, storage) = engine_with(Arc::new(MockApi::new()));
        engine.login("201212121212").await.unwrap();

        let mut children = engine.children();
        children.wait_until(|s| s.is_loaded()).await.unwrap();
        eventually(|| storage.len() == 1).await;

        engine.logout().await.unwrap();
        assert!(!engine.is_logged_in());

        let state = engine.store().snapshot();
        assert!(state.entities.is_empty());
        assert_eq!(state.session, Session::default());
        assert_eq!(children.status(), Status::Pending);
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_in_flight_across_logout_is_discarded() {
        let api = Arc::new(MockApi::held());
        let (engine, storage) = engine_with(api.clone());
        engine.login("201212121212").await.unwrap();

        let children = engine.children();
        eventually(|| api.calls("get_children") == 1).await;

        engine.logout().await.unwrap();
        assert!(!engine.is_logged_in());
        engine.login("201212121212").await.unwrap();

        api.release(1);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(children.status(), Status::Pending);
        assert!(children.data().is_none());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_sandbox_session_serves_fake_data_without_cache() {
        let (engine, storage) = engine_with(Arc::new(FakeApi::new()));
        let status = engine.login("121212121212").await.unwrap();
        assert_eq!(status.token, "fake");
        assert!(engine.is_fake());

        let mut user = engine.user();
        let user_state = user.wait_until(|s| s.is_loaded()).await.unwrap();
        assert_eq!(
            user_state.data.unwrap().first_name.as_deref(),
            Some("Namn")
        );

        let mut children = engine.children();
        let children_state = children.wait_until(|s| s.is_loaded()).await.unwrap();
        assert_eq!(children_state.data.unwrap().len(), 2);

        tokio::task::yield_now().await;
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_fake_session_ignores_persisted_entries() {
        let api = Arc::new(MockApi::fake());
        let (engine, storage) = engine_with(api.clone());
        storage.set("children_all", r#"[{"id":"1"}]"#).await.unwrap();
        engine.login("201212121212").await.unwrap();
        assert!(engine.is_fake());

        let mut children = engine.children();
        let state = children.wait_until(|s| s.is_loaded()).await.unwrap();
        assert_eq!(state.data, Some(vec![Child::new("2")]));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(
            storage.get("children_all").await.unwrap().as_deref(),
            Some(r#"[{"id":"1"}]"#)
        );
    }

    #[tokio::test]
    async fn test_trailing_logout_event_does_not_end_new_session() {
        let (engine, _) = engine_with(Arc::new(MockApi::new()));
        engine.login("201212121212").await.unwrap();
        engine.logout().await.unwrap();
        engine.login("201212121212").await.unwrap();
        let epoch = engine.store().epoch();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(engine.is_logged_in());
        assert_eq!(engine.store().epoch(), epoch);
    }

    #[tokio::test]
    async fn test_engine_adopts_existing_login() {
        let api = Arc::new(FakeApi::new());
        api.login("121212121212").await.unwrap();
        let (engine, _) = engine_with(api);
        assert!(engine.is_logged_in());
        assert!(engine.is_fake());
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let (engine, _) = engine_with(Arc::new(MockApi::new()));
        engine.login("201212121212").await.unwrap();
        let mut children = engine.children();
        children.wait_until(|s| s.is_loaded()).await.unwrap();

        engine.clear();
        assert!(engine.store().snapshot().entities.is_empty());
        assert!(!engine.is_logged_in());
    }

    #[tokio::test]
    async fn test_session_watch_follows_login_and_logout() {
        let (engine, _) = engine_with(Arc::new(MockApi::new()));
        let mut session = engine.subscribe_session();
        assert_eq!(*session.borrow(), Session::default());

        engine.login("201212121212").await.unwrap();
        session.changed().await.unwrap();
        assert!(session.borrow_and_update().is_logged_in);

        engine.logout().await.unwrap();
        session.changed().await.unwrap();
        assert_eq!(*session.borrow_and_update(), Session::default());

        drop(engine);
        assert!(session.changed().await.is_err());
    }

    #[tokio::test]
    async fn test_bindings_end_when_engine_dropped() {
        let (engine, _) = engine_with(Arc::new(MockApi::new()));
        engine.login("201212121212").await.unwrap();
        let mut children = engine.children();
        children.wait_until(|s| s.is_loaded()).await.unwrap();

        drop(engine);
        assert!(!children.refresh());
        assert_eq!(children.status(), Status::Loaded);

        let waited = tokio::time::timeout(
            Duration::from_secs(1),
            children.wait_until(|s| s.status == Status::Pending),
        )
        .await
        .expect("wait_until returns once the engine is gone");
        assert!(matches!(waited, Err(SyncError::EngineClosed)));
    }

    #[tokio::test]
    async fn test_next_session_starts_from_persisted_result() {
        let storage = Arc::new(MemoryStorage::new());
        let api = Arc::new(MockApi::new());
        api.set_children(vec![
            Child {
                name: Some("Kalle".to_string()),
                school_id: Some("skola".to_string()),
                ..Child::new("2")
            },
            Child::new("3"),
        ]);
        let engine = SyncEngine::start(api, storage.clone());
        engine.login("201212121212").await.unwrap();
        let mut children = engine.children();
        let fetched = children.wait_until(|s| s.is_loaded()).await.unwrap().data;
        eventually(|| storage.len() == 1).await;
        engine.logout().await.unwrap();
        drop(children);
        drop(engine);

        let held = Arc::new(MockApi::held());
        let engine = SyncEngine::start(held.clone(), storage);
        engine.login("201212121212").await.unwrap();
        let mut children = engine.children();

        let cached = children.wait_until(|s| s.data.is_some()).await.unwrap();
        assert_eq!(cached.data, fetched);
        assert_eq!(cached.status, Status::Loading);
        eventually(|| held.calls("get_children") == 1).await;
    }
}
