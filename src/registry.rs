//! Process-wide registry of active minigame sessions.
//!
//! The single source of truth for "is there an active session in channel
//! X". The registry observes session lifecycle events: `started` inserts,
//! `ended` removes, `errored` reports the fault, apologises in-channel, and
//! forces the session down. At most one session exists per channel — a
//! channel ID is in the map if and only if its session is running.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::channel::{ChannelId, UserId};
use crate::session::{Session, SessionError, SessionObserver};

/// User-facing text sent when a session dies to an unexpected fault.
/// Diagnostics go to the [`ErrorReporter`], never to the game channel.
const APOLOGY: &str = "An unexpected error has forced the minigame session to stop. \
     I've relayed some details about this to my higher-ups.";

// ---------------------------------------------------------------------------
// Error reporting sink
// ---------------------------------------------------------------------------

/// Diagnostic record handed to the external error sink (e.g. a webhook).
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub session: String,
    pub channel_id: ChannelId,
    pub host: UserId,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
}

/// External sink for session fault diagnostics.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report(&self, report: ErrorReport);
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Tracks the at-most-one active session per channel.
///
/// Constructed once at application startup and shared (`Arc`) with command
/// handlers and with every session as a lifecycle observer. The map is
/// mutex-guarded: lifecycle events may fire from different runtime worker
/// threads.
pub struct SessionRegistry {
    active: Mutex<HashMap<ChannelId, Arc<Session>>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            active: Mutex::new(HashMap::new()),
            reporter: None,
        })
    }

    /// A registry that forwards fault diagnostics to `reporter`.
    pub fn with_reporter(reporter: Arc<dyn ErrorReporter>) -> Arc<Self> {
        Arc::new(Self {
            active: Mutex::new(HashMap::new()),
            reporter: Some(reporter),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ChannelId, Arc<Session>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_active(&self, channel: ChannelId) -> bool {
        self.lock().contains_key(&channel)
    }

    pub fn get(&self, channel: ChannelId) -> Option<Arc<Session>> {
        self.lock().get(&channel).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Force-stops every active session and clears the map. Called when the
    /// hosting process or extension unloads.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = self.lock().drain().map(|(_, s)| s).collect();

        for session in sessions {
            session.stop().await;
            session.join().await;
        }
        info!("all minigame sessions shut down");
    }
}

#[async_trait]
impl SessionObserver for SessionRegistry {
    async fn on_started(&self, session: &Arc<Session>) {
        let previous = self.lock().insert(session.channel_id(), Arc::clone(session));

        // The command layer rejects a second session before constructing
        // it; reaching this with an occupied slot means that check was
        // bypassed, which is a programming error, not a runtime condition.
        assert!(
            previous.is_none(),
            "channel {} already has an active session",
            session.channel_id()
        );

        info!(session = %session, "new session registered");
    }

    async fn on_ended(&self, session: &Arc<Session>) {
        // May already be gone (e.g. shutdown drained the map); removal is
        // idempotent.
        self.lock().remove(&session.channel_id());
        info!(session = %session, "session unregistered");
    }

    async fn on_errored(&self, session: &Arc<Session>, error: &SessionError) {
        error!(session = %session, error = %error, "session raised an unhandled error");

        if let Some(reporter) = &self.reporter {
            reporter
                .report(ErrorReport {
                    session: session.to_string(),
                    channel_id: session.channel_id(),
                    host: session.host(),
                    error: error.to_string(),
                    occurred_at: Utc::now(),
                })
                .await;
        }

        // Best effort: the channel may be the thing that is broken.
        let _ = session.channel().send(APOLOGY).await;

        session.stop().await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
