use std::sync::Arc;

use serde::Serialize;

use crate::parser::segment::Chunk;
use crate::quiz::parse::QuizResult;

/// One entry in the ordered presentation list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Slide {
    Title {
        title: String,
        excerpt: String,
        sections: usize,
        quiz_interval: Option<usize>,
    },
    Content {
        chunk_index: usize,
        chunk: Chunk,
    },
    Quiz {
        chunk_index: usize,
        result: QuizResult,
    },
    QuizLoading {
        chunk_index: usize,
    },
    QuizError {
        chunk_index: usize,
        message: String,
    },
}

impl Slide {
    /// Chunk a quiz-family slide belongs to.
    pub fn quiz_chunk(&self) -> Option<usize> {
        match self {
            Slide::Quiz { chunk_index, .. }
            | Slide::QuizLoading { chunk_index }
            | Slide::QuizError { chunk_index, .. } => Some(*chunk_index),
            _ => None,
        }
    }

    pub fn is_loading_for(&self, index: usize) -> bool {
        matches!(self, Slide::QuizLoading { chunk_index } if *chunk_index == index)
    }
}

/// The presentation layer the scheduler drives.
pub trait Presenter: Send + Sync + 'static {
    fn set_slides(&self, slides: Vec<Slide>);

    /// Insert at `position`, shifting later slides right. Positions past the end append.
    fn insert_slide(&self, slide: Slide, position: usize);

    /// Swap the loading placeholder for `chunk_index` with `slide`, wherever it now sits.
    fn replace_quiz(&self, chunk_index: usize, slide: Slide);
}

impl<T: Presenter> Presenter for Arc<T> {
    fn set_slides(&self, slides: Vec<Slide>) {
        (**self).set_slides(slides)
    }

    fn insert_slide(&self, slide: Slide, position: usize) {
        (**self).insert_slide(slide, position)
    }

    fn replace_quiz(&self, chunk_index: usize, slide: Slide) {
        (**self).replace_quiz(chunk_index, slide)
    }
}
