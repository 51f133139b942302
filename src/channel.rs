//! The messaging-transport capability the session engine runs against.
//!
//! The engine never talks to a concrete gateway or REST API. Everything it
//! needs from the outside world — sending and editing messages, a typing
//! indicator, waiting for an incoming message — goes through the [`Channel`]
//! trait, so swapping transports (or faking one in tests) only requires
//! touching an implementation of this module's traits.

use std::fmt;

use async_trait::async_trait;
use bitflags::bitflags;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Identifies a channel on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifies a user on the transport.
///
/// This is the stable identity scores are keyed by — display names can
/// change mid-session, user IDs cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle to a message previously sent through a [`Channel`], usable for
/// later edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub u64);

// ---------------------------------------------------------------------------
// Participants and incoming messages
// ---------------------------------------------------------------------------

/// A user as seen by the game: stable id, display name, bot flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: UserId,
    pub name: String,
    pub bot: bool,
}

impl Participant {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            bot: false,
        }
    }

    /// A bot-account participant (never matches answers, excluded from
    /// winner announcements).
    pub fn bot(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            bot: true,
        }
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ID: {})", self.name, self.id)
    }
}

/// An incoming chat message delivered by the transport.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub author: Participant,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by the transport.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// The target message no longer exists (deleted out from under us).
    #[error("message not found")]
    MessageNotFound,

    /// Any other transport-level failure (connectivity, permissions, ...).
    #[error("transport error: {0}")]
    Transport(String),
}

// ---------------------------------------------------------------------------
// The channel capability
// ---------------------------------------------------------------------------

/// Predicate deciding whether an incoming message resolves a wait.
pub type MessagePredicate<'a> = &'a (dyn Fn(&ChatMessage) -> bool + Send + Sync);

/// One channel's worth of messaging capability.
///
/// Implementations are expected to be cheap to share (`Arc`) and safe to
/// call from a spawned session task.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Sends a message, returning a handle usable with [`Channel::edit`].
    async fn send(&self, content: &str) -> Result<MessageHandle, ChannelError>;

    /// Edits a previously sent message in place.
    ///
    /// Returns [`ChannelError::MessageNotFound`] if the message was deleted.
    async fn edit(
        &self,
        message: MessageHandle,
        content: &str,
    ) -> Result<MessageHandle, ChannelError>;

    /// Shows a typing indicator in the channel.
    async fn broadcast_typing(&self) -> Result<(), ChannelError>;

    /// Completes with the next incoming message matching `predicate`.
    ///
    /// This has no timeout of its own; callers bound it with
    /// `tokio::time::timeout` or race it against another future.
    async fn wait_for_message(
        &self,
        predicate: MessagePredicate<'_>,
    ) -> Result<ChatMessage, ChannelError>;
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

bitflags! {
    /// Channel-level permission mask, mirroring the transport's bit layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Permissions: u64 {
        const ADMINISTRATOR = 1 << 3;
        const SEND_MESSAGES = 1 << 11;
        const MANAGE_MESSAGES = 1 << 13;
    }
}

impl Permissions {
    /// Whether this mask allows moderating other users' messages.
    pub fn can_manage_messages(self) -> bool {
        self.intersects(Permissions::MANAGE_MESSAGES | Permissions::ADMINISTRATOR)
    }
}

/// Externally supplied authority on who may manage sessions.
pub trait PermissionOracle: Send + Sync {
    /// Whether `user` is a privileged operator (bot owner).
    fn is_operator(&self, user: UserId) -> bool;

    /// The permission mask `user` holds in `channel`.
    fn permissions_for(&self, user: UserId, channel: ChannelId) -> Permissions;
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
