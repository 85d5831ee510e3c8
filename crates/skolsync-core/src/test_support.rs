//! Shared helpers for async tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{broadcast, Semaphore};

use crate::api::{SchoolApi, SessionEvent};
use crate::models::{
    CalendarItem, Child, Classmate, LoginStatus, MenuItem, NewsItem, Notification, ScheduleItem,
    User,
};

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Scriptable `SchoolApi` recording every call.
///
/// When held, each fetch waits for a permit handed out by [`MockApi::release`].
pub struct MockApi {
    calls: Mutex<HashMap<&'static str, usize>>,
    children: Mutex<Vec<Child>>,
    failure: Mutex<Option<String>>,
    gate: Option<Semaphore>,
    fake: bool,
    logged_in: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::build(false, false)
    }

    /// Fetches block until released.
    pub fn held() -> Self {
        Self::build(true, false)
    }

    /// Logins report a fake session.
    pub fn fake() -> Self {
        Self::build(false, true)
    }

    fn build(held: bool, fake: bool) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            calls: Mutex::new(HashMap::new()),
            children: Mutex::new(vec![Child::new("2")]),
            failure: Mutex::new(None),
            gate: held.then(|| Semaphore::new(0)),
            fake,
            logged_in: AtomicBool::new(false),
            events,
        }
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    pub fn set_children(&self, children: Vec<Child>) {
        *self.children.lock().unwrap() = children;
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    async fn enter(&self, method: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SchoolApi for MockApi {
    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn is_fake(&self) -> bool {
        self.fake
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn login(&self, personal_number: &str) -> Result<LoginStatus> {
        *self.calls.lock().unwrap().entry("login").or_default() += 1;
        if personal_number.is_empty() {
            return Err(anyhow!("invalid personal number"));
        }
        self.logged_in.store(true, Ordering::SeqCst);
        let _ = self.events.send(SessionEvent::Login { is_fake: self.fake });
        Ok(LoginStatus {
            token: "token".to_string(),
            order: None,
        })
    }

    async fn logout(&self) -> Result<()> {
        self.logged_in.store(false, Ordering::SeqCst);
        let _ = self.events.send(SessionEvent::Logout);
        Ok(())
    }

    async fn get_calendar(&self, _child: &Child) -> Result<Vec<CalendarItem>> {
        self.enter("get_calendar").await?;
        Ok(Vec::new())
    }

    async fn get_children(&self) -> Result<Vec<Child>> {
        self.enter("get_children").await?;
        Ok(self.children.lock().unwrap().clone())
    }

    async fn get_classmates(&self, _child: &Child) -> Result<Vec<Classmate>> {
        self.enter("get_classmates").await?;
        Ok(Vec::new())
    }

    async fn get_menu(&self, _child: &Child) -> Result<Vec<MenuItem>> {
        self.enter("get_menu").await?;
        Ok(Vec::new())
    }

    async fn get_news(&self, _child: &Child) -> Result<Vec<NewsItem>> {
        self.enter("get_news").await?;
        Ok(Vec::new())
    }

    async fn get_notifications(&self, _child: &Child) -> Result<Vec<Notification>> {
        self.enter("get_notifications").await?;
        Ok(Vec::new())
    }

    async fn get_schedule(
        &self,
        _child: &Child,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Vec<ScheduleItem>> {
        self.enter("get_schedule").await?;
        Ok(vec![ScheduleItem {
            title: "2".to_string(),
            ..Default::default()
        }])
    }

    async fn get_user(&self) -> Result<User> {
        self.enter("get_user").await?;
        Ok(User {
            first_name: Some("Namn".to_string()),
            ..Default::default()
        })
    }
}
