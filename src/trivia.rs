//! The trivia minigame: round loop, hints, scoring, and termination.
//!
//! Each round presents a shuffled question, then waits for a correct guess —
//! either racing the progressive hint sequence (hints enabled) or under a
//! flat per-question timeout. Scores are tracked per stable user identity;
//! the game ends on the winning threshold, deck exhaustion, table-wide
//! inactivity, or an external stop.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::channel::{Channel, ChannelError, ChatMessage, MessageHandle, Participant};
use crate::question::TriviaQuestion;
use crate::session::{Game, Scores, SessionError};
use crate::util::{human_join, tchart};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Pause before each question so chat can settle.
const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// The session abandons itself after this many question-time-limits without
/// a single evaluated guess.
const INACTIVITY_MULTIPLIER: u32 = 4;

/// Lead-in before the hint when the answer is short enough for one stage.
const SINGLE_HINT_DELAY: Duration = Duration::from_secs(5);

/// How many entries the final results chart shows.
const TOP_RESULTS: usize = 10;

const TIMEOUT_REVEAL_MESSAGES: [&str; 6] = [
    "Time's up! The answer is ||{answer}||.",
    "I know this one! It's ||{answer}||.",
    "Easy: ||{answer}||.",
    "I happen to be an expert on this. The answer is ||{answer}||.",
    "I don't know how you missed this one... The answer is ||{answer}||.",
    "What? Nobody got this one? The answer is ||{answer}||.",
];

const TIMEOUT_MESSAGES: [&str; 6] = [
    "Moving on...",
    "Maybe you'll get the next one.",
    "On to the next question!",
    "I'm sure you'll know the answer of the next one.",
    "Time's up! Let's move on to the next question, shall we?",
    "\u{1F614} Let's move on...",
];

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub const MAXIMUM_SCORE_RANGE: std::ops::RangeInclusive<u32> = 5..=30;
pub const QUESTION_TIME_LIMIT_RANGE: std::ops::RangeInclusive<u64> = 15..=50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("maximum-score must be between 5 and 30, inclusive")]
    MaximumScoreOutOfRange,

    #[error("question-time-limit must be between 15 and 50, inclusive")]
    QuestionTimeLimitOutOfRange,
}

/// Game rules, validated before a session is constructed.
#[derive(Debug, Clone)]
pub struct TriviaSettings {
    /// Points required to win.
    pub maximum_score: u32,
    /// Seconds allotted per question.
    pub question_time_limit: u64,
    /// Award the house a point when a question times out.
    pub bot_plays: bool,
    /// Disclose the canonical answer on timeout.
    pub reveal_answer_after: bool,
    /// Progressively reveal the answer while the question is open.
    pub show_hints: bool,
}

impl Default for TriviaSettings {
    fn default() -> Self {
        Self {
            maximum_score: 10,
            question_time_limit: 20,
            bot_plays: true,
            reveal_answer_after: true,
            show_hints: true,
        }
    }
}

impl TriviaSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !MAXIMUM_SCORE_RANGE.contains(&self.maximum_score) {
            return Err(SettingsError::MaximumScoreOutOfRange);
        }
        if !QUESTION_TIME_LIMIT_RANGE.contains(&self.question_time_limit) {
            return Err(SettingsError::QuestionTimeLimitOutOfRange);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Answer matching
// ---------------------------------------------------------------------------

/// Lower-cases and folds typographic quotes to their ASCII forms, so
/// guesses typed on smart-quote keyboards still line up with deck answers.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect()
}

/// Whether `content` counts as a correct guess for any acceptable answer.
///
/// Multi-word answers match as substrings; single-word answers must appear
/// as a whole whitespace-delimited token, so "category" never matches "cat".
fn guess_matches(answers: &[String], content: &str) -> bool {
    let guess = normalize(content);

    answers.iter().any(|answer| {
        let answer = normalize(answer);
        if answer.contains(' ') {
            guess.contains(&answer)
        } else {
            guess.split_whitespace().any(|token| token == answer)
        }
    })
}

// ---------------------------------------------------------------------------
// Hints
// ---------------------------------------------------------------------------

/// Answers longer than five characters get three hint stages; shorter ones
/// would be given away, so they get one.
fn hint_stages(answer: &str) -> usize {
    if answer.chars().count() > 5 {
        3
    } else {
        1
    }
}

/// Stage `n` (1-indexed) reveals characters whose position modulo 5 is
/// below `n`, plus all whitespace; the rest are masked.
fn reveal_hint(answer: &str, stage: usize) -> String {
    answer
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if i % 5 < stage || c.is_whitespace() {
                c
            } else {
                '-'
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Question presentation
// ---------------------------------------------------------------------------

fn format_question(question: &TriviaQuestion, show_hints: bool) -> String {
    let mut text = format!(
        "{}\n\nCategory: {}\nAuthor(s): {}",
        question.text,
        question.category,
        question.author.as_deref().unwrap_or("Unknown")
    );

    if let Some(url) = &question.image_url {
        text.push('\n');
        text.push_str(url);
    }

    text.push_str(if show_hints {
        "\n\nHints will be revealed soon."
    } else {
        "\n\nNo hints! Give it your best shot!"
    });

    text
}

// ---------------------------------------------------------------------------
// The game
// ---------------------------------------------------------------------------

enum RoundOutcome {
    Answered,
    TimedOut,
    /// Nobody has guessed anything for the whole inactivity bound; the
    /// session gives up entirely.
    Abandoned,
}

/// Concrete [`Game`] driving a multi-round trivia session.
pub struct TriviaGame {
    channel: Arc<dyn Channel>,
    questions: Vec<TriviaQuestion>,
    settings: TriviaSettings,
    /// The bot's own identity, awarded timeout points under `bot_plays`.
    house: Participant,
    scores: Scores,
    last_interaction: Mutex<Instant>,
}

impl TriviaGame {
    /// Builds a game over an unbiased shuffle of the full deck. Settings
    /// are assumed validated by the caller.
    pub fn new(
        channel: Arc<dyn Channel>,
        mut questions: Vec<TriviaQuestion>,
        settings: TriviaSettings,
        house: Participant,
    ) -> Self {
        questions.shuffle(&mut rand::thread_rng());

        Self {
            channel,
            questions,
            settings,
            house,
            scores: Scores::new(),
            last_interaction: Mutex::new(Instant::now()),
        }
    }

    pub fn settings(&self) -> &TriviaSettings {
        &self.settings
    }

    fn question_time_limit(&self) -> Duration {
        Duration::from_secs(self.settings.question_time_limit)
    }

    fn inactivity_bound(&self) -> Duration {
        self.question_time_limit() * INACTIVITY_MULTIPLIER
    }

    fn touch(&self) {
        *self
            .last_interaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_interaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Predicate for incoming messages: bots never match, every evaluated
    /// guess refreshes the inactivity clock.
    fn answer_predicate<'a>(
        &'a self,
        question: &'a TriviaQuestion,
    ) -> impl Fn(&ChatMessage) -> bool + Send + Sync + 'a {
        move |message: &ChatMessage| {
            if message.author.bot {
                return false;
            }

            self.touch();
            guess_matches(question.answers(), &message.content)
        }
    }

    async fn play_round(
        &self,
        question: &TriviaQuestion,
        cancel: &CancellationToken,
    ) -> Result<RoundOutcome, SessionError> {
        self.channel.broadcast_typing().await?;
        tokio::time::sleep(GRACE_PERIOD).await;

        let prompt = format_question(question, self.settings.show_hints);
        let prompt_handle = self.channel.send(&prompt).await?;

        let predicate = self.answer_predicate(question);

        let correct: Option<ChatMessage> = if self.settings.show_hints {
            // No explicit timeout on either side: the hint sequence defines
            // the question's lifetime, and whichever side finishes first
            // cancels the other by dropping it.
            tokio::select! {
                result = self.channel.wait_for_message(&predicate) => Some(result?),
                result = self.run_hints(question, prompt_handle, cancel) => {
                    result?;
                    None
                }
            }
        } else {
            match tokio::time::timeout(
                self.question_time_limit(),
                self.channel.wait_for_message(&predicate),
            )
            .await
            {
                Ok(result) => Some(result?),
                Err(_elapsed) => None,
            }
        };

        match correct {
            Some(message) => {
                let total = self.scores.award(&message.author);
                debug!(player = %message.author, total, "correct answer");
                self.channel.send("Correct! **+1 point** for you!").await?;
                Ok(RoundOutcome::Answered)
            }
            None if self.idle_for() >= self.inactivity_bound() => {
                self.channel.send("Alright... I guess I'll stop now.").await?;
                Ok(RoundOutcome::Abandoned)
            }
            None => {
                let mut text = if self.settings.reveal_answer_after {
                    TIMEOUT_REVEAL_MESSAGES
                        .choose(&mut rand::thread_rng())
                        .copied()
                        .unwrap_or(TIMEOUT_REVEAL_MESSAGES[0])
                        .replace("{answer}", question.canonical_answer())
                } else {
                    TIMEOUT_MESSAGES
                        .choose(&mut rand::thread_rng())
                        .copied()
                        .unwrap_or(TIMEOUT_MESSAGES[0])
                        .to_string()
                };

                if self.settings.bot_plays {
                    self.scores.award(&self.house);
                    text.push_str(" **+1 point** for me!");
                }

                self.channel.send(&text).await?;
                Ok(RoundOutcome::TimedOut)
            }
        }
    }

    /// Progressively reveals the canonical answer by editing the question
    /// message in place. If the message was deleted, it is resent. The
    /// sequence stops early when the session is cancelled.
    async fn run_hints(
        &self,
        question: &TriviaQuestion,
        mut message: MessageHandle,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        let answer = question.canonical_answer();
        let stages = hint_stages(answer);
        let delay = Duration::from_secs_f64(
            self.question_time_limit().as_secs_f64() / stages as f64,
        );

        let lead_in = if stages == 1 { SINGLE_HINT_DELAY } else { delay };
        tokio::time::sleep(lead_in).await;

        for stage in 1..=stages {
            if cancel.is_cancelled() {
                break;
            }

            let footer = if stage == stages {
                "No more hints. Give it your best shot!".to_string()
            } else {
                format!("Next hint in {:.2} seconds.", delay.as_secs_f64())
            };
            let content = format!(
                "{}\n```yaml\nHint {}/{}: {}```\n{}",
                question.text,
                stage,
                stages,
                reveal_hint(answer, stage),
                footer
            );

            message = match self.channel.edit(message, &content).await {
                Ok(handle) => handle,
                Err(ChannelError::MessageNotFound) => self.channel.send(&content).await?,
                Err(e) => return Err(e),
            };

            tokio::time::sleep(delay).await;
        }

        Ok(())
    }

    async fn send_results(&self) -> Result<(), ChannelError> {
        let top = self.scores.top(TOP_RESULTS);
        let Some(best) = top.first().map(|entry| entry.points) else {
            return Ok(());
        };

        let winners: Vec<&str> = top
            .iter()
            .filter(|entry| entry.points == best && !entry.player.bot)
            .map(|entry| entry.player.name.as_str())
            .collect();

        let mut message = if winners.is_empty() {
            // The only top scorer is the house; no bragging rights to hand out.
            "Good game everyone! \u{1F60A}".to_string()
        } else {
            format!("\u{1F389} {} won! Congrats!", human_join(&winners, "and"))
        };

        let rows: Vec<(&str, u32)> = top
            .iter()
            .map(|entry| (entry.player.name.as_str(), entry.points))
            .collect();
        message.push_str(&format!(
            "\n\n**Final Results** (Top 10)\n```hs\n{}\n```",
            tchart(&rows)
        ));

        self.channel.send(&message).await?;
        Ok(())
    }
}

#[async_trait]
impl Game for TriviaGame {
    fn kind(&self) -> &'static str {
        "trivia"
    }

    fn scores(&self) -> Option<&Scores> {
        Some(&self.scores)
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), SessionError> {
        let mut deck_exhausted = true;

        for question in &self.questions {
            match self.play_round(question, &cancel).await? {
                RoundOutcome::Abandoned => return Ok(()),
                RoundOutcome::Answered | RoundOutcome::TimedOut => {}
            }

            if self.scores.highest() >= self.settings.maximum_score {
                deck_exhausted = false;
                break;
            }
        }

        if deck_exhausted {
            self.channel.send("I've run out of questions to ask!").await?;
        }

        if !self.scores.is_empty() {
            self.send_results().await?;
        }

        Ok(())
    }

    async fn announce_results(&self) -> Result<(), ChannelError> {
        self.send_results().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
