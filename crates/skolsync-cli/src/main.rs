//! skolsync - load school data through the sync engine and print it as JSON.
//!
//! Signs in to the sandbox platform, then loads the user profile, the
//! children, and each child's news and current-week schedule. The file cache
//! is wired in as for a real session; sandbox sessions never read or write it.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use skolsync_core::{Config, Entity, FakeApi, FileStorage, Resource, ResourceState, SyncEngine};

/// Environment variable overriding the personal number used to sign in
const PERSONAL_NUMBER_ENV: &str = "SKOLSYNC_PERSONAL_NUMBER";

/// Personal number used when neither the environment nor the config has one
const DEFAULT_PERSONAL_NUMBER: &str = "121212121212";

/// How long to wait for a single resource to settle
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Wait until the resource is loaded or its fetch failed.
async fn settle<E: Entity>(mut resource: Resource<E>) -> Result<ResourceState<E::Data>> {
    let key = resource.key().to_string();
    let state = tokio::time::timeout(
        LOAD_TIMEOUT,
        resource.wait_until(|s| s.is_loaded() || s.error.is_some()),
    )
    .await
    .with_context(|| format!("Timed out loading {} {}", E::KIND, key))??;
    Ok(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    info!("skolsync starting");

    let mut config = Config::load().context("Failed to load config")?;
    let personal_number = std::env::var(PERSONAL_NUMBER_ENV)
        .ok()
        .or_else(|| config.last_personal_number.clone())
        .unwrap_or_else(|| DEFAULT_PERSONAL_NUMBER.to_string());

    let storage = FileStorage::new(config.cache_dir()?)?;
    info!(cache_dir = %storage.cache_dir().display(), "Using file cache");

    let engine = SyncEngine::start(Arc::new(FakeApi::new()), Arc::new(storage));
    engine
        .login(&personal_number)
        .await
        .context("Login failed")?;

    if config.last_personal_number.as_deref() != Some(personal_number.as_str()) {
        config.last_personal_number = Some(personal_number);
        if let Err(e) = config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    let user = settle(engine.user()).await?;
    let children = settle(engine.children()).await?;

    let today = Local::now().date_naive();
    let monday = today - chrono::Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let sunday = monday + chrono::Duration::days(6);

    let mut per_child = Vec::new();
    for child in children.data.iter().flatten() {
        let news = settle(engine.news(child)).await?;
        let schedule = settle(engine.schedule(child, monday, sunday)).await?;
        per_child.push(json!({
            "child": child,
            "news": news,
            "schedule": schedule,
        }));
    }

    let report = json!({
        "session": engine.session(),
        "user": user,
        "children": per_child,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    engine.logout().await?;
    Ok(())
}
