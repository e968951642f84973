//! Background quiz pre-generation.
//!
//! A single worker walks the planned tasks in order and caches each outcome. Navigation
//! consumes the cache: the quiz for a chunk is spliced into the slide list right after
//! the chunk's content slide, either directly (cached), as a placeholder that the worker's
//! in-flight request later fills, or as a placeholder backed by an on-demand request.
//! Every chunk index reaches the provider at most once.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{Settings, GENERATION_DELAY};
use crate::error::ReaderError;
use crate::parser::segment::Chunk;
use crate::provider::{Provider, QuizGenerator};
use crate::quiz::parse::{build_prompt, parse_quiz_response, QuizResult};
use crate::quiz::slides::{Presenter, Slide};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizTask {
    pub chunk_index: usize,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizOutcome {
    /// Queued, not yet claimed.
    Pending,
    /// The worker has a request in flight.
    InProgress,
    Ready(QuizResult),
    Failed(String),
}

impl QuizOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, QuizOutcome::Ready(_) | QuizOutcome::Failed(_))
    }

    fn into_slide(self, chunk_index: usize) -> Option<Slide> {
        match self {
            QuizOutcome::Ready(result) => Some(Slide::Quiz {
                chunk_index,
                result,
            }),
            QuizOutcome::Failed(message) => Some(Slide::QuizError {
                chunk_index,
                message,
            }),
            _ => None,
        }
    }
}

/// Chunk index → slide position where that chunk's quiz will be inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionMap {
    positions: BTreeMap<usize, usize>,
}

impl PositionMap {
    pub fn insert(&mut self, chunk_index: usize, position: usize) {
        self.positions.insert(chunk_index, position);
    }

    pub fn get(&self, chunk_index: usize) -> Option<usize> {
        self.positions.get(&chunk_index).copied()
    }

    pub fn remove(&mut self, chunk_index: usize) -> Option<usize> {
        self.positions.remove(&chunk_index)
    }

    /// Chunk whose pending quiz goes at `position`.
    pub fn chunk_at(&self, position: usize) -> Option<usize> {
        self.positions
            .iter()
            .find(|(_, &p)| p == position)
            .map(|(&chunk, _)| chunk)
    }

    /// A slide was inserted at `position`: everything at or after it moves right.
    pub fn shift_from(&mut self, position: usize) {
        for p in self.positions.values_mut() {
            if *p >= position {
                *p += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn entries(&self) -> Vec<(usize, usize)> {
        self.positions.iter().map(|(&c, &p)| (c, p)).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuizPlan {
    pub tasks: VecDeque<QuizTask>,
    pub positions: PositionMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
}

#[derive(Debug, Clone)]
pub struct QuizConfig {
    pub provider: Provider,
    pub api_key: String,
    pub interval: usize,
    pub throttle: Duration,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_key: String::new(),
            interval: 3,
            throttle: GENERATION_DELAY,
        }
    }
}

impl From<&Settings> for QuizConfig {
    fn from(s: &Settings) -> Self {
        Self {
            provider: s.provider,
            api_key: s.api_key.clone(),
            interval: s.question_interval,
            throttle: s.throttle,
        }
    }
}

/// Chunk indices that get a quiz: after every `interval` content chunks.
pub fn quiz_indices(chunk_count: usize, interval: usize) -> Vec<usize> {
    let interval = interval.max(1);
    match interval.checked_add(1) {
        Some(step) => (interval..chunk_count).step_by(step).collect(),
        None => Vec::new(),
    }
}

/// Text of chunk `index` and up to `interval` chunks before it.
pub fn context_window(chunks: &[Chunk], index: usize, interval: usize) -> String {
    let start = index.saturating_sub(interval.max(1));
    let end = index.min(chunks.len().saturating_sub(1));
    if chunks.is_empty() || start > end {
        return String::new();
    }
    chunks[start..=end]
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Slide 0 is the title, chunk `i` sits at `i + 1`, its quiz goes right after.
pub fn plan_quizzes(chunks: &[Chunk], interval: usize) -> QuizPlan {
    let mut plan = QuizPlan::default();
    for index in quiz_indices(chunks.len(), interval) {
        plan.tasks.push_back(QuizTask {
            chunk_index: index,
            context: context_window(chunks, index, interval),
        });
        plan.positions.insert(index, index + 2);
    }
    plan
}

struct State {
    queue: VecDeque<QuizTask>,
    positions: PositionMap,
    cache: HashMap<usize, QuizOutcome>,
    worker: WorkerState,
    aborted: bool,
}

struct Inner<G, P> {
    state: Mutex<State>,
    notify: Notify,
    generator: G,
    presenter: P,
    chunks: Arc<[Chunk]>,
    config: QuizConfig,
    planned: usize,
}

impl<G: QuizGenerator, P: Presenter> Inner<G, P> {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn generate(&self, task: &QuizTask) -> QuizOutcome {
        if self.config.api_key.is_empty() {
            return QuizOutcome::Failed(ReaderError::MissingApiKey.to_string());
        }
        let prompt = build_prompt(&task.context);
        let response = self
            .generator
            .generate(&prompt, self.config.provider, &self.config.api_key)
            .await;
        match response.map_err(ReaderError::from).and_then(|text| parse_quiz_response(&text)) {
            Ok(result) => QuizOutcome::Ready(result),
            Err(e) => {
                warn!("Quiz for chunk {} failed: {}", task.chunk_index, e);
                QuizOutcome::Failed(e.to_string())
            }
        }
    }

    /// Deliver a finished quiz to its placeholder, unless the session is gone.
    fn deliver(&self, chunk_index: usize, outcome: QuizOutcome) {
        let state = self.lock();
        if state.aborted {
            debug!("Dropping quiz for chunk {} after shutdown", chunk_index);
            return;
        }
        if let Some(slide) = outcome.into_slide(chunk_index) {
            self.presenter.replace_quiz(chunk_index, slide);
        }
    }
}

/// Schedules quiz generation for one reading session.
pub struct QuizScheduler<G, P> {
    inner: Arc<Inner<G, P>>,
}

impl<G, P> Clone for QuizScheduler<G, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G: QuizGenerator, P: Presenter> QuizScheduler<G, P> {
    pub fn new(chunks: Arc<[Chunk]>, config: QuizConfig, generator: G, presenter: P) -> Self {
        let plan = plan_quizzes(&chunks, config.interval);
        let cache = plan
            .tasks
            .iter()
            .map(|t| (t.chunk_index, QuizOutcome::Pending))
            .collect();
        info!(
            "Planned {} quizzes over {} chunks (interval {})",
            plan.tasks.len(),
            chunks.len(),
            config.interval.max(1)
        );
        Self {
            inner: Arc::new(Inner {
                planned: plan.tasks.len(),
                state: Mutex::new(State {
                    queue: plan.tasks,
                    positions: plan.positions,
                    cache,
                    worker: WorkerState::Idle,
                    aborted: false,
                }),
                notify: Notify::new(),
                generator,
                presenter,
                chunks,
                config,
            }),
        }
    }

    fn try_start(&self) -> bool {
        let mut state = self.inner.lock();
        if state.aborted || state.worker == WorkerState::Running {
            return false;
        }
        state.worker = WorkerState::Running;
        true
    }

    /// Run the worker until the queue drains. No-op if it is already running.
    pub async fn run_background(&self) {
        if self.try_start() {
            self.work().await;
        }
    }

    /// Start the worker on the tokio runtime. `None` if it is already running.
    pub fn spawn_background(&self) -> Option<JoinHandle<()>> {
        if !self.try_start() {
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move { this.work().await }))
    }

    async fn work(&self) {
        let inner = &self.inner;
        loop {
            let task = {
                let mut state = inner.lock();
                let next = if state.aborted {
                    None
                } else {
                    state.queue.pop_front()
                };
                match next {
                    Some(task) => {
                        state.cache.insert(task.chunk_index, QuizOutcome::InProgress);
                        task
                    }
                    None => {
                        state.worker = WorkerState::Idle;
                        return;
                    }
                }
            };

            debug!("Generating quiz for chunk {}", task.chunk_index);
            let outcome = inner.generate(&task).await;

            let more = {
                let mut state = inner.lock();
                if state.aborted {
                    state.worker = WorkerState::Idle;
                    return;
                }
                state.cache.insert(task.chunk_index, outcome);
                !state.queue.is_empty()
            };
            inner.notify.notify_waiters();

            if more {
                tokio::time::sleep(inner.config.throttle).await;
            }
        }
    }

    /// Handle the user landing on slide `position`.
    ///
    /// Runs synchronously: the quiz (or a loading placeholder) is inserted before this
    /// returns. The returned handle finishes any generation still outstanding.
    pub fn begin_navigate(&self, position: usize) -> Option<PendingQuiz<G, P>> {
        let inner = &self.inner;
        let mut state = inner.lock();
        if state.aborted {
            return None;
        }
        let insert_at = position + 1;
        let chunk_index = state.positions.chunk_at(insert_at)?;
        state.positions.remove(chunk_index);
        state.positions.shift_from(insert_at);

        let outcome = state.cache.remove(&chunk_index);
        if let Some(slide) = outcome.clone().and_then(|o| o.into_slide(chunk_index)) {
            debug!("Inserting cached quiz for chunk {} at {}", chunk_index, insert_at);
            inner.presenter.insert_slide(slide, insert_at);
            return None;
        }

        inner
            .presenter
            .insert_slide(Slide::QuizLoading { chunk_index }, insert_at);

        let source = match outcome {
            Some(QuizOutcome::InProgress) => {
                state.cache.insert(chunk_index, QuizOutcome::InProgress);
                PendingSource::AwaitWorker
            }
            Some(QuizOutcome::Pending) => {
                match state.queue.iter().position(|t| t.chunk_index == chunk_index) {
                    Some(i) => match state.queue.remove(i) {
                        Some(task) => PendingSource::Generate(task),
                        None => PendingSource::Generate(self.rebuild_task(chunk_index)),
                    },
                    None => PendingSource::Generate(self.rebuild_task(chunk_index)),
                }
            }
            _ => PendingSource::Generate(self.rebuild_task(chunk_index)),
        };
        debug!("Quiz for chunk {} not ready, loading at {}", chunk_index, insert_at);

        Some(PendingQuiz {
            inner: Arc::clone(inner),
            chunk_index,
            source,
        })
    }

    /// Insert the quiz for the slide at `position`, waiting for it if necessary.
    pub async fn on_navigate(&self, position: usize) {
        if let Some(pending) = self.begin_navigate(position) {
            pending.resolve().await;
        }
    }

    fn rebuild_task(&self, chunk_index: usize) -> QuizTask {
        QuizTask {
            chunk_index,
            context: context_window(&self.inner.chunks, chunk_index, self.inner.config.interval),
        }
    }

    /// Stop the worker and forget all pending work. Results still in flight are dropped.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.lock();
            if state.aborted {
                return;
            }
            state.aborted = true;
            state.queue.clear();
            state.positions = PositionMap::default();
            state.cache.clear();
        }
        self.inner.notify.notify_waiters();
        info!("Quiz scheduler stopped");
    }

    pub fn planned(&self) -> usize {
        self.inner.planned
    }

    /// Quizzes generated (or failed) and not yet shown.
    pub fn completed(&self) -> usize {
        self.inner.lock().cache.values().filter(|o| o.is_done()).count()
    }

    pub fn outcome(&self, chunk_index: usize) -> Option<QuizOutcome> {
        self.inner.lock().cache.get(&chunk_index).cloned()
    }

    pub fn queued(&self) -> Vec<usize> {
        self.inner.lock().queue.iter().map(|t| t.chunk_index).collect()
    }

    pub fn positions(&self) -> PositionMap {
        self.inner.lock().positions.clone()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.inner.lock().worker
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.lock().aborted
    }
}

enum PendingSource {
    Generate(QuizTask),
    AwaitWorker,
}

/// A quiz placeholder waiting on generation.
pub struct PendingQuiz<G, P> {
    inner: Arc<Inner<G, P>>,
    chunk_index: usize,
    source: PendingSource,
}

impl<G: QuizGenerator, P: Presenter> PendingQuiz<G, P> {
    pub fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    pub async fn resolve(self) {
        let inner = &self.inner;
        match self.source {
            PendingSource::Generate(task) => {
                debug!("Generating quiz for chunk {} on demand", task.chunk_index);
                let outcome = inner.generate(&task).await;
                inner.deliver(self.chunk_index, outcome);
            }
            PendingSource::AwaitWorker => loop {
                let mut notified = pin!(inner.notify.notified());
                notified.as_mut().enable();
                {
                    let mut state = inner.lock();
                    if state.aborted {
                        return;
                    }
                    let done = match state.cache.get(&self.chunk_index) {
                        Some(outcome) => outcome.is_done(),
                        None => return,
                    };
                    if done {
                        let outcome = state.cache.remove(&self.chunk_index);
                        drop(state);
                        if let Some(outcome) = outcome {
                            inner.deliver(self.chunk_index, outcome);
                        }
                        return;
                    }
                }
                notified.await;
            },
        }
    }
}
