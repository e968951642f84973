pub mod deck;
pub mod parse;
pub mod scheduler;
pub mod slides;
