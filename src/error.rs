use thiserror::Error;

/// Failures surfaced by the reading pipeline.
///
/// Extraction and segmentation errors end the session. Quiz errors are scoped to a
/// single chunk and end up on an inline error card.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    #[error("could not extract article content from this page")]
    NoArticleFound,

    #[error("no content found to display")]
    EmptyContent,

    #[error("could not parse quiz response: {0}")]
    QuizParse(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("quiz is not enabled, provide an API key")]
    MissingApiKey,
}

/// Classified provider failure, as reported by the LLM client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("invalid API key, check your {0} API key")]
    Auth(String),

    #[error("rate limit exceeded, try again later")]
    RateLimited,

    #[error("model not found, try a different {0} model")]
    NotFound(String),

    #[error("bad request, check your {0} API configuration")]
    BadRequest(String),

    #[error("{provider} API error: {status}")]
    Unknown { provider: String, status: u16 },

    #[error("unexpected {0} response format")]
    InvalidResponse(String),

    #[error("request failed: {0}")]
    Transport(String),
}
