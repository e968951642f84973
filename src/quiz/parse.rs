use std::sync::LazyLock;

use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ReaderError;
use crate::utils::truncate_chars;

/// Characters of chunk context sent with each prompt.
pub const MAX_CONTEXT_CHARS: usize = 2000;
const LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

static JSON_OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());
static LETTER_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-D]\.\s*").unwrap());

/// A validated quiz with its options already shuffled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizResult {
    pub question: String,
    /// Exactly four entries, prefixed `A. ` through `D. `.
    pub options: Vec<String>,
    pub correct: char,
    pub explanation: String,
}

impl QuizResult {
    /// Text of the correct option without its letter prefix.
    pub fn correct_text(&self) -> &str {
        let idx = (self.correct as u8 - b'A') as usize;
        strip_prefix(&self.options[idx])
    }

    pub fn is_correct(&self, letter: char) -> bool {
        letter.to_ascii_uppercase() == self.correct
    }
}

#[derive(Deserialize)]
struct RawQuiz {
    #[serde(default)]
    question: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    correct: String,
    #[serde(default)]
    explanation: Option<String>,
}

pub fn build_prompt(context: &str) -> String {
    format!(
        "Based on the following text, generate a multiple choice question with 4 options \
(A, B, C, D) to test reading comprehension. The question should test understanding of key \
concepts, not trivial details.

Return ONLY a valid JSON object in this exact format (no markdown, no code blocks, just the JSON):
{{\"question\": \"Your question here?\", \"options\": [\"A. First option\", \"B. Second option\", \
\"C. Third option\", \"D. Fourth option\"], \"correct\": \"A\", \"explanation\": \"Brief \
explanation of why this is correct\"}}

Text:
{}",
        truncate_chars(context, MAX_CONTEXT_CHARS)
    )
}

pub fn parse_quiz_response(text: &str) -> Result<QuizResult, ReaderError> {
    parse_quiz_response_with(text, &mut rand::thread_rng())
}

pub fn parse_quiz_response_with<R: Rng + ?Sized>(
    text: &str,
    rng: &mut R,
) -> Result<QuizResult, ReaderError> {
    let json = JSON_OBJECT_RE
        .find(text)
        .ok_or_else(|| ReaderError::QuizParse("no JSON object in response".into()))?;
    let raw: RawQuiz = serde_json::from_str(json.as_str())
        .map_err(|e| ReaderError::QuizParse(e.to_string()))?;

    let question = raw.question.trim().to_string();
    if question.is_empty() {
        return Err(ReaderError::QuizParse("missing question".into()));
    }
    if raw.options.len() != 4 {
        return Err(ReaderError::QuizParse(format!(
            "expected 4 options, got {}",
            raw.options.len()
        )));
    }
    let correct_idx = raw
        .correct
        .trim()
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase())
        .and_then(|c| LETTERS.iter().position(|&l| l == c))
        .ok_or_else(|| ReaderError::QuizParse(format!("invalid correct answer '{}'", raw.correct)))?;

    // Shuffle indices rather than texts so duplicate option texts can't confuse the lookup.
    let mut order: Vec<usize> = (0..4).collect();
    order.shuffle(rng);

    let options = order
        .iter()
        .zip(LETTERS)
        .map(|(&i, letter)| format!("{}. {}", letter, strip_prefix(raw.options[i].trim())))
        .collect();
    let correct = order
        .iter()
        .position(|&i| i == correct_idx)
        .map(|p| LETTERS[p])
        .unwrap_or('A');

    Ok(QuizResult {
        question,
        options,
        correct,
        explanation: raw.explanation.unwrap_or_default().trim().to_string(),
    })
}

fn strip_prefix(option: &str) -> &str {
    match LETTER_PREFIX_RE.find(option) {
        Some(m) => &option[m.end()..],
        None => option,
    }
}
