//! Minigame command handlers, written against the abstract [`Channel`].
//!
//! The transport-specific layer (prefix parsing, slash commands) validates
//! input and calls in here. Each handler replies in-channel and returns
//! denial conditions as [`CommandError`] values rather than exceptions
//! through the engine.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::channel::{Channel, ChannelError, ChannelId, Participant, PermissionOracle, UserId};
use crate::question::{Category, TriviaQuestion};
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionObserver};
use crate::trivia::{SettingsError, TriviaGame, TriviaSettings};
use crate::util::{human_join, tchart};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Denials surfaced to the invoking user as plain messages.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("This channel already has an active minigame session.")]
    SessionAlreadyActive,

    #[error(transparent)]
    InvalidSettings(#[from] SettingsError),

    #[error("There are no questions to play with.")]
    EmptyDeck,

    #[error(transparent)]
    Transport(#[from] ChannelError),
}

// ---------------------------------------------------------------------------
// minigame trivia
// ---------------------------------------------------------------------------

/// Starts a new trivia session in `channel_id`.
///
/// The active-session guard runs before anything else: loading decks and
/// announcing a session are user-visible work that must not happen when the
/// command is redundant. On success the session is already registered and
/// running.
pub async fn start_trivia(
    registry: &Arc<SessionRegistry>,
    channel: Arc<dyn Channel>,
    channel_id: ChannelId,
    host: Participant,
    perms: Arc<dyn PermissionOracle>,
    house: Participant,
    categories: Vec<Category>,
    settings: TriviaSettings,
) -> Result<Arc<Session>, CommandError> {
    if registry.has_active(channel_id) {
        return Err(CommandError::SessionAlreadyActive);
    }

    settings.validate()?;

    let mut questions: Vec<TriviaQuestion> = Vec::new();
    let mut credits: Vec<String> = Vec::new();
    for category in categories {
        credits.push(category.credit);
        questions.extend(category.questions);
    }

    if questions.is_empty() {
        return Err(CommandError::EmptyDeck);
    }

    let chart = tchart(&[
        ("Maximum Score", settings.maximum_score.to_string()),
        (
            "Question Time Limit",
            settings.question_time_limit.to_string(),
        ),
        ("Bot Plays", settings.bot_plays.to_string()),
        (
            "Reveal Answer After",
            settings.reveal_answer_after.to_string(),
        ),
        ("Show Hints", settings.show_hints.to_string()),
    ]);
    let announcement = format!(
        "A new trivia session is starting!\nStarted by {}\n\nCategories: {}\n\nSettings\n```py\n{}\n```",
        host.name,
        human_join(&credits, "and"),
        chart
    );
    channel.send(&announcement).await?;

    info!(channel = %channel_id, host = %host, "starting trivia session");

    let game = TriviaGame::new(Arc::clone(&channel), questions, settings, house);
    let session = Session::new(
        channel_id,
        host.id,
        channel,
        Arc::new(game),
        perms,
        vec![Arc::clone(registry) as Arc<dyn SessionObserver>],
    );
    session.start().await;

    Ok(session)
}

// ---------------------------------------------------------------------------
// minigame scores
// ---------------------------------------------------------------------------

/// Shows the current session's scores, if applicable.
pub async fn show_scores(
    registry: &SessionRegistry,
    channel: &dyn Channel,
    channel_id: ChannelId,
) -> Result<(), ChannelError> {
    let Some(session) = registry.get(channel_id) else {
        channel
            .send("This channel has no active minigame session.")
            .await?;
        return Ok(());
    };

    match session.scores() {
        Some(scores) if !scores.is_empty() => {
            let top = scores.top(usize::MAX);
            let rows: Vec<(&str, u32)> = top
                .iter()
                .map(|entry| (entry.player.name.as_str(), entry.points))
                .collect();
            channel
                .send(&format!("**Scoreboard**\n```hs\n{}\n```", tchart(&rows)))
                .await?;
        }
        _ => {
            channel.send("There are no player scores to show.").await?;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// minigame stop
// ---------------------------------------------------------------------------

/// Stops the current session, if the invoker may manage it.
///
/// An explicit stop through this command is treated like a natural end for
/// UX purposes: final results are sent when anyone has scored.
pub async fn stop_session(
    registry: &SessionRegistry,
    channel: &dyn Channel,
    channel_id: ChannelId,
    invoker: UserId,
) -> Result<(), ChannelError> {
    let Some(session) = registry.get(channel_id) else {
        channel
            .send("This channel has no active minigame session.")
            .await?;
        return Ok(());
    };

    if !session.is_manager(invoker) {
        channel
            .send("You cannot manage this minigame session.")
            .await?;
        return Ok(());
    }

    session.stop_with_results().await;
    channel.send("Minigame session stopped.").await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
