//! Pure transition functions.
//!
//! Each takes the current state by value plus a message and returns the next
//! state. No I/O happens here; the store applies these serially and the
//! effect handler performs whatever the messages ask for.

use crate::entity::{
    Calendar, Children, Classmates, Entity, Menu, News, Notifications, Schedule, UserProfile,
};
use crate::message::{EntityEvent, EntityMessage, Message};
use crate::state::{Entities, EntityStateMap, ResourceState, Session, Status};

/// Transition of one entity kind's state map.
///
/// Messages addressed to another entity kind leave the map untouched.
/// `ClearAll` and `Logout` empty it.
pub fn transition<E: Entity>(
    mut state: EntityStateMap<E::Data>,
    message: &Message,
) -> EntityStateMap<E::Data> {
    match message {
        Message::ClearAll | Message::Logout => EntityStateMap::new(),
        Message::Entity(any) => match E::unwrap(any) {
            Some(message) => {
                let current = state.remove(&message.key).unwrap_or_default();
                state.insert(message.key.clone(), apply::<E>(current, message));
                state
            }
            None => state,
        },
        Message::Login { .. } => state,
    }
}

fn apply<E: Entity>(
    current: ResourceState<E::Data>,
    message: &EntityMessage<E>,
) -> ResourceState<E::Data> {
    match &message.event {
        EntityEvent::BeginCacheRead => current,
        EntityEvent::BeginNetworkCall(_) => ResourceState {
            status: Status::Loading,
            error: None,
            ..current
        },
        // A cache hit never changes status: while loading it stays loading.
        EntityEvent::CacheReadSucceeded(data) => ResourceState {
            data: Some(data.clone()),
            ..current
        },
        EntityEvent::NetworkCallSucceeded(data) => ResourceState {
            data: Some(data.clone()),
            status: Status::Loaded,
            error: None,
        },
        // Stale data stays visible next to the error.
        EntityEvent::NetworkCallFailed(error) => ResourceState {
            status: Status::Pending,
            error: Some(error.clone()),
            ..current
        },
    }
}

/// Transition of the session flags.
pub fn session_transition(state: Session, message: &Message) -> Session {
    match message {
        Message::Login { is_fake } => Session {
            is_logged_in: true,
            is_fake: *is_fake,
        },
        Message::Logout | Message::ClearAll => Session::default(),
        Message::Entity(_) => state,
    }
}

/// Run one message through the session transition and every entity
/// transition.
pub fn root_transition(
    session: Session,
    mut entities: Entities,
    message: &Message,
) -> (Session, Entities) {
    fn step<E: Entity>(entities: &mut Entities, message: &Message) {
        let map = std::mem::take(E::slot_mut(entities));
        *E::slot_mut(entities) = transition::<E>(map, message);
    }

    step::<Calendar>(&mut entities, message);
    step::<Children>(&mut entities, message);
    step::<Classmates>(&mut entities, message);
    step::<Menu>(&mut entities, message);
    step::<News>(&mut entities, message);
    step::<Notifications>(&mut entities, message);
    step::<Schedule>(&mut entities, message);
    step::<UserProfile>(&mut entities, message);

    (session_transition(session, message), entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Children, News, Schedule};
    use crate::message::boxed_fetch;
    use crate::models::{Child, NewsItem};
    use crate::state::ErrorInfo;

    fn children(ids: &[&str]) -> Vec<Child> {
        ids.iter().map(|id| Child::new(*id)).collect()
    }

    fn send(
        state: EntityStateMap<Vec<Child>>,
        message: EntityMessage<Children>,
    ) -> EntityStateMap<Vec<Child>> {
        transition::<Children>(state, &message.into())
    }

    fn begin_network() -> EntityMessage<Children> {
        EntityMessage::begin_network_call(
            "all",
            boxed_fetch(|| async { Ok::<_, anyhow::Error>(Vec::new()) }),
        )
    }

    fn failure(message: &str) -> ErrorInfo {
        ErrorInfo::from_error(&anyhow::anyhow!(message.to_string()))
    }

    #[test]
    fn test_first_message_creates_pending_entry() {
        let state = send(EntityStateMap::new(), EntityMessage::begin_cache_read("all"));
        assert_eq!(state["all"], ResourceState::default());
    }

    #[test]
    fn test_begin_network_call_sets_loading_and_clears_error() {
        let state = send(
            EntityStateMap::new(),
            EntityMessage::network_call_failed("all", 0, failure("boom")),
        );
        assert!(state["all"].error.is_some());

        let state = send(state, begin_network());
        assert_eq!(state["all"].status, Status::Loading);
        assert!(state["all"].error.is_none());
    }

    #[test]
    fn test_cache_hit_keeps_status() {
        let state = send(EntityStateMap::new(), begin_network());
        let state = send(
            state,
            EntityMessage::cache_read_succeeded("all", 0, children(&["1"])),
        );
        assert_eq!(state["all"].status, Status::Loading);
        assert_eq!(state["all"].data, Some(children(&["1"])));

        let pending = send(
            EntityStateMap::new(),
            EntityMessage::cache_read_succeeded("all", 0, children(&["1"])),
        );
        assert_eq!(pending["all"].status, Status::Pending);
    }

    #[test]
    fn test_network_success_replaces_data_and_marks_loaded() {
        let state = send(
            EntityStateMap::new(),
            EntityMessage::cache_read_succeeded("all", 0, children(&["1"])),
        );
        let state = send(state, begin_network());
        let state = send(
            state,
            EntityMessage::network_call_succeeded("all", 0, children(&["2"])),
        );
        assert_eq!(
            state["all"],
            ResourceState {
                data: Some(children(&["2"])),
                status: Status::Loaded,
                error: None,
            }
        );
    }

    #[test]
    fn test_network_failure_reverts_to_pending_and_keeps_data() {
        let state = send(
            EntityStateMap::new(),
            EntityMessage::network_call_succeeded("all", 0, children(&["2"])),
        );
        let state = send(state, begin_network());
        let state = send(
            state,
            EntityMessage::network_call_failed("all", 0, failure("message")),
        );
        let resource = &state["all"];
        assert_eq!(resource.status, Status::Pending);
        assert_eq!(resource.data, Some(children(&["2"])));
        assert_eq!(resource.error.as_ref().unwrap().message, "message");
    }

    #[test]
    fn test_other_entity_messages_are_ignored() {
        let state = send(
            EntityStateMap::new(),
            EntityMessage::network_call_succeeded("all", 0, children(&["2"])),
        );
        let news: Message = EntityMessage::<News>::network_call_succeeded(
            "all",
            0,
            vec![NewsItem::default()],
        )
        .into();
        let after = transition::<Children>(state.clone(), &news);
        assert_eq!(after, state);

        let login = transition::<Children>(after, &Message::Login { is_fake: false });
        assert_eq!(login, state);
    }

    #[test]
    fn test_clear_all_and_logout_empty_every_map() {
        let state = send(
            EntityStateMap::new(),
            EntityMessage::network_call_succeeded("all", 0, children(&["2"])),
        );
        assert!(transition::<Children>(state.clone(), &Message::ClearAll).is_empty());
        assert!(transition::<Children>(state, &Message::Logout).is_empty());
        assert!(transition::<Schedule>(EntityStateMap::new(), &Message::ClearAll).is_empty());
    }

    #[test]
    fn test_root_transition_routes_by_kind() {
        let message: Message =
            EntityMessage::<Children>::network_call_succeeded("all", 0, children(&["2"])).into();
        let (session, entities) =
            root_transition(Session::default(), Entities::default(), &message);
        assert_eq!(session, Session::default());
        assert_eq!(entities.children["all"].status, Status::Loaded);
        assert!(entities.news.is_empty());

        let (session, entities) =
            root_transition(session, entities, &Message::Login { is_fake: false });
        assert!(session.is_logged_in);
        assert!(!entities.is_empty());

        let (session, entities) = root_transition(session, entities, &Message::Logout);
        assert_eq!(session, Session::default());
        assert!(entities.is_empty());
    }

    #[test]
    fn test_session_transitions() {
        let session = session_transition(Session::default(), &Message::Login { is_fake: true });
        assert_eq!(
            session,
            Session {
                is_logged_in: true,
                is_fake: true
            }
        );
        assert_eq!(session_transition(session, &Message::Logout), Session::default());
        assert_eq!(session_transition(session, &Message::ClearAll), Session::default());

        let unchanged = session_transition(
            session,
            &EntityMessage::<Children>::begin_cache_read("all").into(),
        );
        assert_eq!(unchanged, session);
    }
}
