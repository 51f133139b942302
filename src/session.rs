//! Base game-session machinery shared by every minigame.
//!
//! A [`Session`] owns the lifecycle skeleton — start, cooperative stop,
//! error routing — while the concrete game supplies only the turn logic via
//! the [`Game`] trait. Lifecycle transitions are announced to
//! [`SessionObserver`]s (the registry, logging, telemetry) with typed
//! callbacks; nothing raised inside the game loop ever escapes the driver
//! task.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::{Channel, ChannelError, ChannelId, Participant, PermissionOracle, UserId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures a game loop can end with.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The channel can no longer be written to. A channel we cannot write
    /// to cannot host a game, so the session stops quietly rather than
    /// escalating.
    #[error(transparent)]
    Transport(#[from] ChannelError),

    /// Anything else raised inside the game loop. Routed to the `errored`
    /// lifecycle event and reported externally.
    #[error("game fault: {0}")]
    Fault(String),
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// One participant's standing on the scoreboard.
#[derive(Debug, Clone)]
pub struct ScoreEntry {
    pub player: Participant,
    pub points: u32,
}

/// Insertion-ordered scoreboard keyed by stable participant identity.
///
/// Points only ever go up, in increments of 1. Ranking uses a stable sort,
/// so participants tied on points stay in first-scored-first order.
#[derive(Debug, Default)]
pub struct Scores {
    entries: Mutex<Vec<ScoreEntry>>,
}

impl Scores {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ScoreEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Awards one point, returning the player's new total.
    pub fn award(&self, player: &Participant) -> u32 {
        let mut entries = self.lock();
        match entries.iter_mut().find(|e| e.player.id == player.id) {
            Some(entry) => {
                entry.points += 1;
                entry.points
            }
            None => {
                entries.push(ScoreEntry {
                    player: player.clone(),
                    points: 1,
                });
                1
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// The highest total on the board, or 0 when nobody has scored.
    pub fn highest(&self) -> u32 {
        self.lock().iter().map(|e| e.points).max().unwrap_or(0)
    }

    /// The board in first-scored-first order.
    pub fn snapshot(&self) -> Vec<ScoreEntry> {
        self.lock().clone()
    }

    /// The top `n` entries, highest points first; ties keep
    /// first-scored-first order (stable sort).
    pub fn top(&self, n: usize) -> Vec<ScoreEntry> {
        let mut entries = self.snapshot();
        entries.sort_by(|a, b| b.points.cmp(&a.points));
        entries.truncate(n);
        entries
    }
}

// ---------------------------------------------------------------------------
// The game seam
// ---------------------------------------------------------------------------

/// The turn logic of a concrete minigame.
///
/// Implementations drive their rounds inside [`Game::run`] and decide
/// normal termination by returning. Forced termination arrives through the
/// cancellation token, which must be treated as the only clean early exit:
/// the driver drops the run future at the next suspension point once the
/// token fires.
#[async_trait]
pub trait Game: Send + Sync + 'static {
    /// Short name used in logs ("trivia").
    fn kind(&self) -> &'static str;

    /// The player scoreboard, if this game keeps one.
    fn scores(&self) -> Option<&Scores> {
        None
    }

    /// The game's main body.
    async fn run(&self, cancel: CancellationToken) -> Result<(), SessionError>;

    /// Announces final results to the channel. Invoked on results-bearing
    /// stops; games without a results screen leave the default no-op.
    async fn announce_results(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Lifecycle observers
// ---------------------------------------------------------------------------

/// Typed lifecycle callbacks, dispatched in registration order and awaited
/// before the lifecycle transition is considered complete.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    async fn on_started(&self, session: &Arc<Session>);

    async fn on_ended(&self, session: &Arc<Session>);

    async fn on_errored(&self, session: &Arc<Session>, error: &SessionError);
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// One running instance of an interactive, time-bounded game tied to a
/// single channel.
///
/// State moves `Idle → Running → Stopped`, one-way; a stopped session can
/// never be restarted, a new one must be constructed.
pub struct Session {
    channel_id: ChannelId,
    host: UserId,
    channel: Arc<dyn Channel>,
    game: Arc<dyn Game>,
    perms: Arc<dyn PermissionOracle>,
    observers: Vec<Arc<dyn SessionObserver>>,
    cancel: CancellationToken,
    state: AtomicU8,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("channel_id", &self.channel_id)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} session (channel ID: {}; host ID: {})",
            self.game.kind(),
            self.channel_id,
            self.host
        )
    }
}

impl Session {
    pub fn new(
        channel_id: ChannelId,
        host: UserId,
        channel: Arc<dyn Channel>,
        game: Arc<dyn Game>,
        perms: Arc<dyn PermissionOracle>,
        observers: Vec<Arc<dyn SessionObserver>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            channel_id,
            host,
            channel,
            game,
            perms,
            observers,
            cancel: CancellationToken::new(),
            state: AtomicU8::new(STATE_IDLE),
            task: Mutex::new(None),
        })
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn host(&self) -> UserId {
        self.host
    }

    /// The channel this session runs in.
    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// The scoreboard of the underlying game, if it keeps one.
    pub fn scores(&self) -> Option<&Scores> {
        self.game.scores()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_STOPPED
    }

    /// Whether `user` may manage this session: the host, a configured
    /// operator, or anyone who can moderate messages in the channel.
    pub fn is_manager(&self, user: UserId) -> bool {
        user == self.host
            || self.perms.is_operator(user)
            || self
                .perms
                .permissions_for(user, self.channel_id)
                .can_manage_messages()
    }

    /// Starts the session.
    ///
    /// Observers see `started` before this returns — and before the loop
    /// task runs — so a registry lookup immediately after `start()` already
    /// reports the session as active. Calling `start` a second time is a
    /// contract violation and is ignored with a warning.
    pub async fn start(self: &Arc<Self>) {
        if self
            .state
            .compare_exchange(
                STATE_IDLE,
                STATE_RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            warn!(session = %self, "start() called on a session that already ran");
            return;
        }

        for observer in &self.observers {
            observer.on_started(self).await;
        }
        info!(session = %self, "session started");

        let session = Arc::clone(self);
        let handle = tokio::spawn(async move { session.drive().await });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Runs the game loop and routes its outcome. Nothing escapes this
    /// task: faults become `errored` events, cancellation is swallowed.
    async fn drive(self: Arc<Self>) {
        let outcome = tokio::select! {
            // stop() already fired `ended`; nothing left to do here.
            _ = self.cancel.cancelled() => None,
            result = self.game.run(self.cancel.clone()) => Some(result),
        };

        match outcome {
            None => {}
            Some(Ok(())) => {
                self.finish().await;
            }
            Some(Err(SessionError::Transport(e))) => {
                debug!(session = %self, error = %e, "transport fault, session stops quietly");
                self.finish().await;
            }
            Some(Err(fault)) => {
                error!(session = %self, error = %fault, "unhandled error in session loop");
                for observer in &self.observers {
                    observer.on_errored(&self, &fault).await;
                }
                // No-op if an observer already forced a stop.
                self.finish().await;
            }
        }
    }

    /// Transitions to `Stopped` and fires `ended` exactly once. Returns
    /// whether this call performed the transition.
    async fn finish(self: &Arc<Self>) -> bool {
        if self.state.swap(STATE_STOPPED, Ordering::AcqRel) == STATE_STOPPED {
            return false;
        }
        self.cancel.cancel();

        for observer in &self.observers {
            observer.on_ended(self).await;
        }
        info!(session = %self, "session ended");
        true
    }

    /// Stops the session without sending results. Idempotent; the loop task
    /// observes the cancellation at its next suspension point.
    pub async fn stop(self: &Arc<Self>) {
        self.finish().await;
    }

    /// Stops the session and, if anyone scored, announces final results.
    /// Used by the management `stop` command, which treats an explicit stop
    /// like a natural end for UX purposes.
    pub async fn stop_with_results(self: &Arc<Self>) {
        if !self.finish().await {
            return;
        }

        if self.game.scores().is_some_and(|s| !s.is_empty()) {
            // A send failure here cannot harm an already-stopped session.
            if let Err(e) = self.game.announce_results().await {
                debug!(session = %self, error = %e, "failed to send final results");
            }
        }
    }

    /// Waits for the driver task to wind down. Useful for shutdown paths
    /// and tests that assert on everything the loop sent.
    pub async fn join(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::{FakeChannel, NoPermissions};
    use crate::channel::Permissions;

    use std::sync::atomic::AtomicUsize;

    // -- test doubles ------------------------------------------------------

    /// Game that plays until cancelled.
    struct IdleGame;

    #[async_trait]
    impl Game for IdleGame {
        fn kind(&self) -> &'static str {
            "idle"
        }

        async fn run(&self, cancel: CancellationToken) -> Result<(), SessionError> {
            cancel.cancelled().await;
            Ok(())
        }
    }

    /// Game that immediately fails with the given error.
    struct FailingGame {
        transport: bool,
    }

    #[async_trait]
    impl Game for FailingGame {
        fn kind(&self) -> &'static str {
            "failing"
        }

        async fn run(&self, _cancel: CancellationToken) -> Result<(), SessionError> {
            if self.transport {
                Err(ChannelError::Transport("gone".into()).into())
            } else {
                Err(SessionError::Fault("boom".into()))
            }
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        started: AtomicUsize,
        ended: AtomicUsize,
        errored: AtomicUsize,
    }

    #[async_trait]
    impl SessionObserver for CountingObserver {
        async fn on_started(&self, _session: &Arc<Session>) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_ended(&self, _session: &Arc<Session>) {
            self.ended.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_errored(&self, _session: &Arc<Session>, _error: &SessionError) {
            self.errored.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn make_session(game: Arc<dyn Game>) -> (Arc<Session>, Arc<CountingObserver>) {
        let (channel, _tx) = FakeChannel::new();
        let observer = Arc::new(CountingObserver::default());
        let session = Session::new(
            ChannelId(1),
            UserId(10),
            channel,
            game,
            Arc::new(NoPermissions),
            vec![observer.clone()],
        );
        (session, observer)
    }

    // -- Scores ------------------------------------------------------------

    #[test]
    fn scores_award_increments_by_one() {
        let scores = Scores::new();
        let ann = Participant::new(UserId(1), "ann");
        assert_eq!(scores.award(&ann), 1);
        assert_eq!(scores.award(&ann), 2);
        assert_eq!(scores.award(&ann), 3);
        assert_eq!(scores.highest(), 3);
    }

    #[test]
    fn scores_rank_ties_by_first_score_order() {
        let scores = Scores::new();
        let ann = Participant::new(UserId(1), "ann");
        let ben = Participant::new(UserId(2), "ben");
        let cat = Participant::new(UserId(3), "cat");

        scores.award(&ben);
        scores.award(&ann);
        scores.award(&cat);
        scores.award(&cat);

        let top = scores.top(10);
        assert_eq!(top[0].player.id, cat.id);
        // ben scored before ann; the tie keeps that order.
        assert_eq!(top[1].player.id, ben.id);
        assert_eq!(top[2].player.id, ann.id);
    }

    #[test]
    fn scores_top_truncates() {
        let scores = Scores::new();
        for id in 0..5 {
            scores.award(&Participant::new(UserId(id), format!("p{}", id)));
        }
        assert_eq!(scores.top(3).len(), 3);
    }

    // -- lifecycle ---------------------------------------------------------

    #[tokio::test]
    async fn stop_twice_fires_ended_once() {
        let (session, observer) = make_session(Arc::new(IdleGame));
        session.start().await;
        assert_eq!(observer.started.load(Ordering::SeqCst), 1);

        session.stop().await;
        session.stop().await;
        session.join().await;

        assert_eq!(observer.ended.load(Ordering::SeqCst), 1);
        assert_eq!(observer.errored.load(Ordering::SeqCst), 0);
        assert!(session.is_stopped());
    }

    #[tokio::test]
    async fn started_is_observed_before_start_returns() {
        let (session, observer) = make_session(Arc::new(IdleGame));
        session.start().await;
        assert_eq!(observer.started.load(Ordering::SeqCst), 1);
        session.stop().await;
        session.join().await;
    }

    #[tokio::test]
    async fn second_start_is_ignored() {
        let (session, observer) = make_session(Arc::new(IdleGame));
        session.start().await;
        session.start().await;
        assert_eq!(observer.started.load(Ordering::SeqCst), 1);
        session.stop().await;
        session.join().await;
    }

    #[tokio::test]
    async fn transport_fault_stops_quietly_without_errored() {
        let (session, observer) = make_session(Arc::new(FailingGame { transport: true }));
        session.start().await;
        session.join().await;

        assert_eq!(observer.ended.load(Ordering::SeqCst), 1);
        assert_eq!(observer.errored.load(Ordering::SeqCst), 0);
        assert!(session.is_stopped());
    }

    #[tokio::test]
    async fn unexpected_fault_fires_errored_then_ended() {
        let (session, observer) = make_session(Arc::new(FailingGame { transport: false }));
        session.start().await;
        session.join().await;

        assert_eq!(observer.errored.load(Ordering::SeqCst), 1);
        assert_eq!(observer.ended.load(Ordering::SeqCst), 1);
    }

    // -- is_manager --------------------------------------------------------

    struct ModOracle;

    impl PermissionOracle for ModOracle {
        fn is_operator(&self, user: UserId) -> bool {
            user == UserId(99)
        }

        fn permissions_for(&self, user: UserId, _channel: ChannelId) -> Permissions {
            if user == UserId(42) {
                Permissions::MANAGE_MESSAGES
            } else {
                Permissions::SEND_MESSAGES
            }
        }
    }

    #[test]
    fn is_manager_accepts_host_operator_and_moderator() {
        let (channel, _tx) = FakeChannel::new();
        let session = Session::new(
            ChannelId(1),
            UserId(10),
            channel,
            Arc::new(IdleGame),
            Arc::new(ModOracle),
            Vec::new(),
        );

        assert!(session.is_manager(UserId(10)), "host");
        assert!(session.is_manager(UserId(99)), "operator");
        assert!(session.is_manager(UserId(42)), "moderator");
        assert!(!session.is_manager(UserId(7)), "random player");
    }
}
