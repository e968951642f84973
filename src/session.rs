use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Settings;
use crate::error::ReaderError;
use crate::fetch::Page;
use crate::parser::segment::Chunk;
use crate::parser::{process_page, ArticleMeta};
use crate::provider::QuizGenerator;
use crate::quiz::parse::QuizResult;
use crate::quiz::scheduler::{QuizConfig, QuizScheduler};
use crate::quiz::slides::{Presenter, Slide};

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub title: String,
    pub chunks_total: usize,
    pub chunks_read: usize,
    pub words_read: usize,
    pub quizzes_answered: usize,
    pub quizzes_correct: usize,
    pub started_at: DateTime<Local>,
    pub elapsed_secs: i64,
}

/// One reading of one page: its chunks, quiz scheduler and progress.
///
/// Dropping the session stops the quiz worker.
pub struct Session<G: QuizGenerator, P: Presenter> {
    meta: ArticleMeta,
    chunks: Arc<[Chunk]>,
    scheduler: Option<QuizScheduler<G, P>>,
    worker: Option<JoinHandle<()>>,
    started_at: DateTime<Local>,
    read: BTreeSet<usize>,
    answers: HashMap<usize, bool>,
}

impl<G: QuizGenerator, P: Presenter> Session<G, P> {
    /// Parse and chunk `page`, hand the slides to `presenter` and, with an API key,
    /// start pre-generating quizzes. Must run inside a tokio runtime.
    pub fn start(
        page: &Page,
        settings: &Settings,
        generator: G,
        presenter: P,
    ) -> Result<Self, ReaderError> {
        let (meta, chunks) = process_page(&page.html, page.url.as_deref(), settings.chunk_size)?;
        let chunks: Arc<[Chunk]> = chunks.into();
        let quizzes = settings.quiz_enabled();

        let mut slides = Vec::with_capacity(chunks.len() + 1);
        slides.push(Slide::Title {
            title: meta.title.clone(),
            excerpt: meta.excerpt.clone(),
            sections: chunks.len(),
            quiz_interval: quizzes.then_some(settings.question_interval.max(1)),
        });
        slides.extend(chunks.iter().enumerate().map(|(i, chunk)| Slide::Content {
            chunk_index: i,
            chunk: chunk.clone(),
        }));
        presenter.set_slides(slides);

        let (scheduler, worker) = if quizzes {
            let scheduler = QuizScheduler::new(
                Arc::clone(&chunks),
                QuizConfig::from(settings),
                generator,
                presenter,
            );
            let worker = scheduler.spawn_background();
            (Some(scheduler), worker)
        } else {
            info!("No API key, quizzes disabled");
            (None, None)
        };

        info!("Session started: \"{}\", {} chunks", meta.title, chunks.len());
        Ok(Self {
            meta,
            chunks,
            scheduler,
            worker,
            started_at: Local::now(),
            read: BTreeSet::new(),
            answers: HashMap::new(),
        })
    }

    pub fn meta(&self) -> &ArticleMeta {
        &self.meta
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn scheduler(&self) -> Option<&QuizScheduler<G, P>> {
        self.scheduler.as_ref()
    }

    pub fn quiz_enabled(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Background worker handle, for callers that want to wait for pre-generation.
    pub fn take_worker(&mut self) -> Option<JoinHandle<()>> {
        self.worker.take()
    }

    /// The reader landed on `slide` at `position`. Returns the task finishing a quiz
    /// that was inserted as a loading placeholder.
    pub fn navigate(&mut self, position: usize, slide: &Slide) -> Option<JoinHandle<()>> {
        if let Slide::Content { chunk_index, .. } = slide {
            self.read.insert(*chunk_index);
        }
        let pending = self.scheduler.as_ref()?.begin_navigate(position)?;
        Some(tokio::spawn(pending.resolve()))
    }

    /// Score an answer. Only the first answer per quiz counts.
    pub fn record_answer(&mut self, chunk_index: usize, quiz: &QuizResult, letter: char) -> bool {
        let correct = quiz.is_correct(letter);
        self.answers.entry(chunk_index).or_insert(correct);
        correct
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            title: self.meta.title.clone(),
            chunks_total: self.chunks.len(),
            chunks_read: self.read.len(),
            words_read: self
                .read
                .iter()
                .filter_map(|&i| self.chunks.get(i))
                .map(|c| c.word_count)
                .sum(),
            quizzes_answered: self.answers.len(),
            quizzes_correct: self.answers.values().filter(|&&c| c).count(),
            started_at: self.started_at,
            elapsed_secs: (Local::now() - self.started_at).num_seconds(),
        }
    }

    /// Stop quiz generation and report progress.
    pub fn end(&mut self) -> SessionSummary {
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown();
        }
        self.summary()
    }
}

impl<G: QuizGenerator, P: Presenter> Drop for Session<G, P> {
    fn drop(&mut self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::Provider;
    use crate::quiz::deck::SlideDeck;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CannedGenerator {
        calls: AtomicUsize,
    }

    impl QuizGenerator for CannedGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _provider: Provider,
            _api_key: &str,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(r#"{"question":"Q?","options":["A. x","B. y","C. z","D. w"],"correct":"B"}"#.into())
        }
    }

    fn generator() -> Arc<CannedGenerator> {
        Arc::new(CannedGenerator {
            calls: AtomicUsize::new(0),
        })
    }

    /// Eight one-sentence paragraphs, one chunk each at a budget of 6.
    fn page() -> Page {
        let paragraphs: String = (0..8)
            .map(|i| format!("<p>Paragraph number {} says something.</p>", i))
            .collect();
        Page {
            url: None,
            html: format!(
                "<html><head><title>Eight</title></head><body><article>{}</article></body></html>",
                paragraphs
            ),
        }
    }

    fn settings(key: &str) -> Settings {
        Settings {
            chunk_size: 6,
            api_key: key.into(),
            throttle: Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn without_key_only_content() {
        let deck = Arc::new(SlideDeck::new());
        let session = Session::start(&page(), &settings(""), generator(), Arc::clone(&deck)).unwrap();
        assert!(!session.quiz_enabled());
        assert_eq!(session.chunks().len(), 8);
        assert_eq!(deck.len(), 9);
        match deck.get(0) {
            Some(Slide::Title {
                title,
                sections,
                quiz_interval,
                ..
            }) => {
                assert_eq!(title, "Eight");
                assert_eq!(sections, 8);
                assert_eq!(quiz_interval, None);
            }
            other => panic!("unexpected slide {:?}", other),
        }
    }

    #[tokio::test]
    async fn reading_through_with_quizzes() {
        let deck = Arc::new(SlideDeck::new());
        let generator = generator();
        let mut session =
            Session::start(&page(), &settings("key"), Arc::clone(&generator), Arc::clone(&deck))
                .unwrap();
        assert!(session.quiz_enabled());
        session.take_worker().unwrap().await.unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);

        let mut position = 0;
        while let Some(slide) = deck.get(position) {
            if let Some(task) = session.navigate(position, &slide) {
                task.await.unwrap();
            }
            if let Slide::Quiz { chunk_index, result } = &slide {
                let letter = result.correct;
                assert!(session.record_answer(*chunk_index, result, letter));
                // A second try does not change the score.
                session.record_answer(*chunk_index, result, 'Z');
            }
            position += 1;
        }

        assert_eq!(deck.len(), 11);
        let summary = session.end();
        assert_eq!(summary.chunks_read, 8);
        assert_eq!(summary.words_read, 40);
        assert_eq!(summary.quizzes_answered, 2);
        assert_eq!(summary.quizzes_correct, 2);
        assert!(session.scheduler().unwrap().is_aborted());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_page_fails() {
        let page = Page {
            url: None,
            html: "<html><body><ul>stray</ul></body></html>".into(),
        };
        let deck = Arc::new(SlideDeck::new());
        let result = Session::start(&page, &settings("key"), generator(), deck);
        assert!(matches!(result, Err(ReaderError::EmptyContent)));
    }

    #[tokio::test]
    async fn drop_stops_scheduler() {
        let deck = Arc::new(SlideDeck::new());
        let session = Session::start(&page(), &settings("key"), generator(), Arc::clone(&deck)).unwrap();
        let scheduler = session.scheduler().unwrap().clone();
        drop(session);
        assert!(scheduler.is_aborted());
    }
}
