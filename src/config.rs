use std::time::Duration;

use crate::provider::Provider;

pub const API_KEY_ENV: &str = "READABLE_API_KEY";
pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const DEFAULT_QUESTION_INTERVAL: usize = 3;
/// Pause between background generation requests, keeps us under provider rate limits.
pub const GENERATION_DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
pub struct Settings {
    /// Word budget per chunk.
    pub chunk_size: usize,
    /// Content chunks between quizzes.
    pub question_interval: usize,
    pub provider: Provider,
    pub api_key: String,
    pub throttle: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            question_interval: DEFAULT_QUESTION_INTERVAL,
            provider: Provider::default(),
            api_key: String::new(),
            throttle: GENERATION_DELAY,
        }
    }
}

impl Settings {
    /// Explicit key wins, then the environment.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .unwrap_or_default()
            .trim()
            .to_string();
        self
    }

    pub fn quiz_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.chunk_size, 100);
        assert_eq!(s.question_interval, 3);
        assert_eq!(s.provider, Provider::Gemini);
        assert!(!s.quiz_enabled());
    }

    #[test]
    fn explicit_key_trimmed() {
        let s = Settings::default().with_api_key(Some("  key-123 \n".into()));
        assert_eq!(s.api_key, "key-123");
        assert!(s.quiz_enabled());
    }
}
