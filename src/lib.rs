//! Turn a web page into word-budgeted reading chunks and interleave comprehension
//! quizzes generated in the background.

pub mod config;
pub mod error;
pub mod fetch;
pub mod parser;
pub mod provider;
pub mod quiz;
pub mod session;
pub mod utils;

pub use error::{ProviderError, ReaderError};
