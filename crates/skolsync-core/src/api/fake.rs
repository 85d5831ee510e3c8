//! Sandbox implementation of [`SchoolApi`].
//!
//! Every login succeeds and produces a fake session, so the engine skips the
//! persistent cache for everything served from here.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use tokio::sync::broadcast;
use tracing::info;

use super::{ApiError, SchoolApi, SessionEvent};
use crate::models::{
    CalendarItem, Child, Classmate, Guardian, LoginStatus, MenuItem, NewsItem, Notification,
    ScheduleItem, User,
};

/// Capacity of the session event channel
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Token reported for sandbox logins
const FAKE_TOKEN: &str = "fake";

pub struct FakeApi {
    logged_in: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeApi {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            logged_in: AtomicBool::new(false),
            events,
        }
    }

    fn ensure_logged_in(&self) -> Result<()> {
        if self.logged_in.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ApiError::NotLoggedIn.into())
        }
    }

    fn child(id: &str, sds_id: &str, name: &str, school_id: &str) -> Child {
        Child {
            id: id.to_string(),
            sds_id: Some(sds_id.to_string()),
            name: Some(name.to_string()),
            status: Some("GR".to_string()),
            school_id: Some(school_id.to_string()),
        }
    }
}

#[async_trait]
impl SchoolApi for FakeApi {
    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn is_fake(&self) -> bool {
        true
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn login(&self, personal_number: &str) -> Result<LoginStatus> {
        info!(personal_number = %personal_number, "Sandbox login");
        self.logged_in.store(true, Ordering::SeqCst);
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(SessionEvent::Login { is_fake: true });
        Ok(LoginStatus {
            token: FAKE_TOKEN.to_string(),
            order: None,
        })
    }

    async fn logout(&self) -> Result<()> {
        self.logged_in.store(false, Ordering::SeqCst);
        let _ = self.events.send(SessionEvent::Logout);
        Ok(())
    }

    async fn get_calendar(&self, child: &Child) -> Result<Vec<CalendarItem>> {
        self.ensure_logged_in()?;
        Ok(vec![
            CalendarItem {
                id: 1,
                title: format!("Utvecklingssamtal ({})", child.display_name()),
                location: Some("Klassrummet".to_string()),
                start_date: Some("2021-02-01T08:00:00".to_string()),
                end_date: Some("2021-02-01T08:30:00".to_string()),
                ..Default::default()
            },
            CalendarItem {
                id: 2,
                title: "Sportlov".to_string(),
                start_date: Some("2021-02-22".to_string()),
                end_date: Some("2021-02-26".to_string()),
                all_day: true,
                ..Default::default()
            },
        ])
    }

    async fn get_children(&self) -> Result<Vec<Child>> {
        self.ensure_logged_in()?;
        Ok(vec![
            Self::child(
                "39b59e-bf4b9f-f68ac25321-977d-4b",
                "1",
                "Petronella Testperson (elev)",
                "grundskola",
            ),
            Self::child(
                "6a5b8d-77da5b-e1d2c6fe03-fe11-4f",
                "2",
                "Hans Testperson (elev)",
                "gymnasium",
            ),
        ])
    }

    async fn get_classmates(&self, _child: &Child) -> Result<Vec<Classmate>> {
        self.ensure_logged_in()?;
        Ok(vec![Classmate {
            sis_id: Some("c1".to_string()),
            firstname: Some("Max".to_string()),
            lastname: Some("Svensson".to_string()),
            class_name: Some("2B".to_string()),
            guardians: vec![Guardian {
                firstname: Some("Eva".to_string()),
                lastname: Some("Svensson".to_string()),
                email: Some("eva@example.com".to_string()),
                mobile: None,
            }],
        }])
    }

    async fn get_menu(&self, _child: &Child) -> Result<Vec<MenuItem>> {
        self.ensure_logged_in()?;
        Ok(vec![
            MenuItem {
                title: "Måndag".to_string(),
                description: "Fiskgratäng med kokt potatis".to_string(),
            },
            MenuItem {
                title: "Tisdag".to_string(),
                description: "Köttbullar med makaroner".to_string(),
            },
        ])
    }

    async fn get_news(&self, child: &Child) -> Result<Vec<NewsItem>> {
        self.ensure_logged_in()?;
        Ok(vec![NewsItem {
            id: format!("{}-news-1", child.id),
            header: Some("Välkommen tillbaka".to_string()),
            intro: Some("Terminen börjar på måndag.".to_string()),
            published: Some("2021-01-07T10:00:00".to_string()),
            author: Some("Rektor".to_string()),
            ..Default::default()
        }])
    }

    async fn get_notifications(&self, child: &Child) -> Result<Vec<Notification>> {
        self.ensure_logged_in()?;
        Ok(vec![Notification {
            id: format!("{}-notification-1", child.id),
            sender: Some("Elevhälsan".to_string()),
            date_created: Some("2021-01-11T09:15:00".to_string()),
            message: Some("Nytt meddelande".to_string()),
            category: Some("Frånvaro".to_string()),
            ..Default::default()
        }])
    }

    async fn get_schedule(
        &self,
        _child: &Child,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleItem>> {
        self.ensure_logged_in()?;
        let mut items = Vec::new();
        let mut day = from;
        while day <= to {
            items.push(ScheduleItem {
                title: "Matematik".to_string(),
                location: Some("Sal 12".to_string()),
                start_date: Some(format!("{}T08:15:00", day.format("%Y-%m-%d"))),
                end_date: Some(format!("{}T09:00:00", day.format("%Y-%m-%d"))),
                ..Default::default()
            });
            day += Duration::days(1);
        }
        Ok(items)
    }

    async fn get_user(&self) -> Result<User> {
        self.ensure_logged_in()?;
        Ok(User {
            personal_number: Some("201212121212".to_string()),
            first_name: Some("Namn".to_string()),
            last_name: Some("Namnsson".to_string()),
            is_authenticated: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_login_returns_fake_token_and_emits_event() {
        let api = FakeApi::new();
        let mut events = api.subscribe();
        assert!(!api.is_logged_in());

        let status = api.login("121212121212").await.unwrap();
        assert_eq!(status.token, "fake");
        assert!(api.is_logged_in());
        assert!(api.is_fake());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Login { is_fake: true });

        api.logout().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Logout);
    }

    #[tokio::test]
    async fn test_fetches_require_login() {
        let api = FakeApi::new();
        let err = api.get_children().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::NotLoggedIn)));

        api.login("121212121212").await.unwrap();
        assert_eq!(api.get_children().await.unwrap().len(), 2);
        assert_eq!(api.get_user().await.unwrap().first_name.as_deref(), Some("Namn"));
    }

    #[tokio::test]
    async fn test_schedule_covers_every_day_in_range() {
        let api = FakeApi::new();
        api.login("121212121212").await.unwrap();
        let from = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2021, 1, 8).unwrap();
        let items = api.get_schedule(&Child::new("id"), from, to).await.unwrap();
        assert_eq!(items.len(), 8);
    }
}
