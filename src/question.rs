//! Trivia question model and category-deck parsing.
//!
//! A category is a JSON document with an optional author credit and a list
//! of questions. The engine itself never touches the filesystem — callers
//! read the bytes and hand the parsed questions in.

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("malformed category data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("category '{category}' contains no questions")]
    NoQuestions { category: String },

    #[error("question '{question}' has no acceptable answers")]
    NoAnswers { question: String },
}

// ---------------------------------------------------------------------------
// TriviaQuestion
// ---------------------------------------------------------------------------

/// One trivia prompt with its acceptable answers.
///
/// `answers` is guaranteed non-empty; the first entry is the canonical
/// answer used for hint generation and answer-reveal text.
#[derive(Debug, Clone)]
pub struct TriviaQuestion {
    pub category: String,
    pub text: String,
    answers: Vec<String>,
    pub image_url: Option<String>,
    pub author: Option<String>,
}

impl TriviaQuestion {
    pub fn new(
        category: impl Into<String>,
        text: impl Into<String>,
        answers: Vec<String>,
        image_url: Option<String>,
        author: Option<String>,
    ) -> Result<Self, DeckError> {
        let text = text.into();
        if answers.is_empty() {
            return Err(DeckError::NoAnswers { question: text });
        }

        Ok(Self {
            category: category.into(),
            text,
            answers,
            image_url,
            author,
        })
    }

    /// All acceptable answers, canonical first.
    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    /// The answer used for hints and timeout reveals.
    pub fn canonical_answer(&self) -> &str {
        &self.answers[0]
    }
}

// ---------------------------------------------------------------------------
// Category files
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CategoryFile {
    #[serde(default)]
    author: Option<String>,
    questions: Vec<RawQuestion>,
}

#[derive(Deserialize)]
struct RawQuestion {
    text: String,
    answers: Vec<String>,
    #[serde(default)]
    image_url: Option<String>,
}

/// A parsed category: its questions plus a credit line for the
/// session-start announcement.
#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub credit: String,
    pub questions: Vec<TriviaQuestion>,
}

/// Parses one category's JSON into questions stamped with the category
/// name and author.
pub fn load_category(name: &str, json: &str) -> Result<Category, DeckError> {
    let file: CategoryFile = serde_json::from_str(json)?;

    if file.questions.is_empty() {
        return Err(DeckError::NoQuestions {
            category: name.to_string(),
        });
    }

    let credit = match &file.author {
        Some(author) => format!("`{} (by {})`", name, author),
        None => format!("`{}`", name),
    };

    let questions = file
        .questions
        .into_iter()
        .map(|raw| {
            TriviaQuestion::new(name, raw.text, raw.answers, raw.image_url, file.author.clone())
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Category {
        name: name.to_string(),
        credit,
        questions,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
