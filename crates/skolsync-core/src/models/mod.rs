//! Data models for school platform entities.
//!
//! These are the payload types carried by resource state and persisted to
//! the local cache as JSON:
//!
//! - `Child`, `Classmate`, `User`: people
//! - `CalendarItem`, `ScheduleItem`: dated entries
//! - `NewsItem`, `Notification`, `MenuItem`: per-child feeds
//! - `LoginStatus`: result of a login attempt

pub mod calendar;
pub mod feed;
pub mod person;

pub use calendar::{CalendarItem, ScheduleItem};
pub use feed::{MenuItem, NewsItem, Notification};
pub use person::{Child, Classmate, Guardian, LoginStatus, User};
