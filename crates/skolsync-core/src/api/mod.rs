//! Remote school platform collaborator.
//!
//! This module defines the `SchoolApi` seam the sync engine fetches through,
//! the `SessionEvent` notifications it reacts to, and `FakeApi`, a sandbox
//! implementation serving canned data without touching the network.
//!
//! The engine never authenticates on its own; it only forwards
//! `login`/`logout` calls and follows the collaborator's session events.

pub mod client;
pub mod error;
pub mod fake;

pub use client::{SchoolApi, SessionEvent};
pub use error::ApiError;
pub use fake::FakeApi;
