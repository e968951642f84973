use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::quiz::slides::{Presenter, Slide};

/// In-memory slide list, the presenter behind the terminal reader.
#[derive(Debug, Default)]
pub struct SlideDeck {
    slides: Mutex<Vec<Slide>>,
}

impl SlideDeck {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slide>> {
        self.slides.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, position: usize) -> Option<Slide> {
        self.lock().get(position).cloned()
    }

    pub fn slides(&self) -> Vec<Slide> {
        self.lock().clone()
    }
}

impl Presenter for SlideDeck {
    fn set_slides(&self, slides: Vec<Slide>) {
        *self.lock() = slides;
    }

    fn insert_slide(&self, slide: Slide, position: usize) {
        let mut slides = self.lock();
        let position = position.min(slides.len());
        debug!("Inserting slide at {}", position);
        slides.insert(position, slide);
    }

    fn replace_quiz(&self, chunk_index: usize, slide: Slide) {
        let mut slides = self.lock();
        if let Some(existing) = slides.iter_mut().find(|s| s.is_loading_for(chunk_index)) {
            *existing = slide;
        }
    }
}
