//! The effect handler: the only place asynchronous I/O happens.
//!
//! It consumes begin-cache-read and begin-network-call requests forwarded by
//! the store, performs the persistent-cache read or the remote call, and
//! dispatches the outcome back into the store as a new message.
//!
//! Cache reads are awaited in the handler loop itself, so a cache result is
//! always dispatched before any network call requested after it has even
//! started. Network calls run as their own tasks.
//!
//! The price is that reads are serialized across all keys: one slow read
//! holds back the requests queued behind it, including those for other
//! resources. Reads are local and small, so the handler keeps one queue
//! rather than ordering per key.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::Storage;
use crate::entity::{cache_key, Entity};
use crate::message::{each_entity, AnyEntityMessage, EntityEvent, EntityMessage, Fetch};
use crate::state::{ErrorInfo, Session};
use crate::store::Store;

/// A request forwarded by the store, with the session it was issued under.
pub(crate) struct EffectRequest {
    pub message: AnyEntityMessage,
    pub session: Session,
}

pub(crate) struct EffectHandler {
    store: Store,
    storage: Arc<dyn Storage>,
    requests: mpsc::UnboundedReceiver<EffectRequest>,
}

impl EffectHandler {
    pub(crate) fn new(
        store: Store,
        storage: Arc<dyn Storage>,
        requests: mpsc::UnboundedReceiver<EffectRequest>,
    ) -> Self {
        Self {
            store,
            storage,
            requests,
        }
    }

    /// Process requests until every store handle holding the sender is gone.
    pub(crate) async fn run(self) {
        let EffectHandler {
            store,
            storage,
            mut requests,
        } = self;

        debug!("Effect handler started");
        while let Some(EffectRequest { message, session }) = requests.recv().await {
            each_entity!(message, m => handle(&store, &storage, m, session).await);
        }
        debug!("Effect handler stopped");
    }
}

async fn handle<E: Entity>(
    store: &Store,
    storage: &Arc<dyn Storage>,
    message: EntityMessage<E>,
    session: Session,
) {
    let EntityMessage { key, epoch, event } = message;
    match event {
        EntityEvent::BeginCacheRead => {
            if session.is_fake {
                debug!(entity = %E::KIND, key = %key, "Fake session, skipping cache read");
                return;
            }
            read_cache::<E>(store, storage.as_ref(), key, epoch).await;
        }
        EntityEvent::BeginNetworkCall(fetch) => {
            let persist = !session.is_fake;
            tokio::spawn(call_network::<E>(
                store.clone(),
                storage.clone(),
                key,
                epoch,
                fetch,
                persist,
            ));
        }
        // Results are never forwarded here.
        _ => {}
    }
}

/// A miss, a failed read, and a malformed entry all leave state untouched.
async fn read_cache<E: Entity>(store: &Store, storage: &dyn Storage, key: String, epoch: u64) {
    let cache_key = cache_key(E::KIND, &key);
    let blob = match storage.get(&cache_key).await {
        Ok(Some(blob)) => blob,
        Ok(None) => {
            debug!(cache_key = %cache_key, "Cache miss");
            return;
        }
        Err(e) => {
            debug!(cache_key = %cache_key, error = %e, "Cache read failed, treating as miss");
            return;
        }
    };

    match serde_json::from_str::<E::Data>(&blob) {
        Ok(data) => {
            debug!(cache_key = %cache_key, "Cache hit");
            store.dispatch(EntityMessage::<E>::cache_read_succeeded(key, epoch, data));
        }
        Err(e) => {
            debug!(cache_key = %cache_key, error = %e, "Malformed cache entry ignored");
        }
    }
}

async fn call_network<E: Entity>(
    store: Store,
    storage: Arc<dyn Storage>,
    key: String,
    epoch: u64,
    fetch: Fetch<E::Data>,
    persist: bool,
) {
    let data = match fetch().await {
        Ok(data) => data,
        Err(e) => {
            warn!(entity = %E::KIND, key = %key, error = %e, "Network call failed");
            let error = ErrorInfo::from_error(&e);
            store.dispatch(EntityMessage::<E>::network_call_failed(key, epoch, error));
            return;
        }
    };

    let cache_key = cache_key(E::KIND, &key);
    let blob = if persist {
        match serde_json::to_string(&data) {
            Ok(blob) => Some(blob),
            Err(e) => {
                warn!(cache_key = %cache_key, error = %e, "Failed to serialize result for cache");
                None
            }
        }
    } else {
        None
    };

    debug!(entity = %E::KIND, key = %key, "Network call succeeded");
    store.dispatch(EntityMessage::<E>::network_call_succeeded(key, epoch, data));

    let Some(blob) = blob else {
        return;
    };
    // A result from a finished session must not outlive it on disk.
    if store.epoch() != epoch {
        debug!(cache_key = %cache_key, "Session changed during fetch, not caching");
        return;
    }
    if let Err(e) = storage.set(&cache_key, &blob).await {
        warn!(cache_key = %cache_key, error = %e, "Failed to write cache entry");
    }
}
