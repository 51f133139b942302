//! Per-channel trivia minigame sessions for chat bots.
//!
//! The engine is transport-agnostic: everything it needs from the outside
//! world goes through the [`channel::Channel`] capability, so any gateway
//! (or a test fake) can host a game. [`session`] provides the lifecycle
//! skeleton shared by all minigames, [`registry`] enforces at most one
//! active session per channel, and [`trivia`] implements the actual
//! question/answer/hint round loop. [`commands`] is the thin handler layer
//! a bot's command router calls into.

pub mod channel;
pub mod commands;
pub mod question;
pub mod registry;
pub mod session;
pub mod trivia;
pub mod util;

pub use channel::{Channel, ChannelError, ChannelId, Participant, UserId};
pub use question::TriviaQuestion;
pub use registry::SessionRegistry;
pub use session::{Game, Session, SessionError, SessionObserver};
pub use trivia::{TriviaGame, TriviaSettings};
