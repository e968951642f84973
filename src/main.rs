use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::warn;

use readable::config::{Settings, DEFAULT_CHUNK_SIZE};
use readable::fetch::{self, Page};
use readable::parser::process_page;
use readable::parser::blocks::Block;
use readable::parser::segment::Chunk;
use readable::provider::{HttpGenerator, Provider};
use readable::quiz::deck::SlideDeck;
use readable::quiz::slides::Slide;
use readable::session::{Session, SessionSummary};
use readable::utils::truncate_chars;
use readable::ReaderError;

#[derive(Parser)]
#[command(name = "readable", about = "Read web articles in chunks, with quizzes along the way")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and chunk one or more pages
    Chunk {
        /// Files or http(s) URLs
        #[arg(required = true)]
        inputs: Vec<String>,
        /// Max words per chunk
        #[arg(short = 'c', long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Page URL to assume for local files (enables thread detection)
        #[arg(long)]
        url: Option<String>,
        /// Print chunks as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pre-generate every quiz for a page and print them
    Quiz(SessionArgs),
    /// Read a page interactively in the terminal
    Read(SessionArgs),
}

#[derive(Args)]
struct SessionArgs {
    /// File or http(s) URL
    input: String,
    /// Max words per chunk
    #[arg(short = 'c', long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    /// Content chunks between quizzes
    #[arg(short = 'i', long, default_value_t = 3)]
    interval: usize,
    /// LLM provider: gemini, openai or claude
    #[arg(short, long, default_value = "gemini")]
    provider: Provider,
    /// API key (default: $READABLE_API_KEY)
    #[arg(long)]
    api_key: Option<String>,
    /// Page URL to assume for local files
    #[arg(long)]
    url: Option<String>,
}

impl SessionArgs {
    fn settings(&self) -> Settings {
        Settings {
            chunk_size: self.chunk_size,
            question_interval: self.interval,
            provider: self.provider,
            ..Default::default()
        }
        .with_api_key(self.api_key.clone())
    }
}

#[derive(Serialize)]
struct ChunkReport<'a> {
    input: &'a str,
    title: &'a str,
    excerpt: &'a str,
    chunks: &'a [Chunk],
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Chunk {
            inputs,
            chunk_size,
            url,
            json,
        } => chunk_pages(&inputs, chunk_size, url.as_deref(), json).await,
        Commands::Quiz(args) => {
            let settings = args.settings();
            if !settings.quiz_enabled() {
                bail!(ReaderError::MissingApiKey);
            }
            let page = fetch::load_page(&args.input, args.url.as_deref()).await?;
            pregenerate(&page, &settings).await
        }
        Commands::Read(args) => {
            let settings = args.settings();
            let page = fetch::load_page(&args.input, args.url.as_deref()).await?;
            read_interactive(&page, &settings).await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn chunk_pages(
    inputs: &[String],
    chunk_size: usize,
    url: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let mut pages = Vec::with_capacity(inputs.len());
    for input in inputs {
        pages.push(fetch::load_page(input, url).await?);
    }

    let results: Vec<_> = pages
        .par_iter()
        .map(|p| process_page(&p.html, p.url.as_deref(), chunk_size))
        .collect();

    let mut failed = 0;
    for (input, result) in inputs.iter().zip(results) {
        let (meta, chunks) = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("{}: {}", input, e);
                failed += 1;
                continue;
            }
        };
        if json {
            let report = ChunkReport {
                input,
                title: &meta.title,
                excerpt: &meta.excerpt,
                chunks: &chunks,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            continue;
        }

        println!("{} | {}", input, meta.title);
        if !meta.excerpt.is_empty() {
            println!("  {}", meta.excerpt);
        }
        println!("{:>4} | {:>5} | {:>6} | {}", "#", "Words", "Blocks", "Starts with");
        println!("{}", "-".repeat(72));
        for (i, c) in chunks.iter().enumerate() {
            let preview = truncate_chars(&c.text, 48);
            let more = if preview.len() < c.text.len() { "..." } else { "" };
            println!(
                "{:>4} | {:>5} | {:>6} | {}{}",
                i + 1,
                c.word_count,
                c.blocks.len(),
                preview,
                more
            );
        }
        let words: usize = chunks.iter().map(|c| c.word_count).sum();
        println!("\n{} chunks, {} words\n", chunks.len(), words);
    }

    if failed == inputs.len() {
        bail!("No input could be chunked");
    }
    Ok(())
}

async fn pregenerate(page: &Page, settings: &Settings) -> anyhow::Result<()> {
    let deck = Arc::new(SlideDeck::new());
    let mut session = Session::start(page, settings, HttpGenerator::default(), Arc::clone(&deck))?;
    let (Some(worker), Some(scheduler)) = (session.take_worker(), session.scheduler().cloned())
    else {
        bail!("Quiz worker did not start");
    };

    let pb = ProgressBar::new(scheduler.planned() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} quizzes")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );
    while !worker.is_finished() {
        pb.set_position(scheduler.completed() as u64);
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    worker.await.context("Quiz worker panicked")?;
    pb.set_position(scheduler.completed() as u64);
    pb.finish_and_clear();

    // Walk the deck so every quiz lands after its chunk.
    let mut position = 0;
    while let Some(slide) = deck.get(position) {
        if let Some(task) = session.navigate(position, &slide) {
            task.await.context("Quiz task panicked")?;
        }
        position += 1;
    }

    println!("{}\n", session.meta().title);
    for slide in deck.slides() {
        match slide {
            Slide::Quiz { chunk_index, result } => {
                println!("After section {}: {}", chunk_index + 1, result.question);
                for option in &result.options {
                    println!("  {}", option);
                }
                println!("  Answer: {}", result.correct);
                if !result.explanation.is_empty() {
                    println!("  {}", result.explanation);
                }
                println!();
            }
            Slide::QuizError {
                chunk_index,
                message,
            } => println!("After section {}: quiz failed ({})\n", chunk_index + 1, message),
            _ => {}
        }
    }

    print_summary(&session.end());
    Ok(())
}

async fn read_interactive(page: &Page, settings: &Settings) -> anyhow::Result<()> {
    let deck = Arc::new(SlideDeck::new());
    let mut session = Session::start(page, settings, HttpGenerator::default(), Arc::clone(&deck))?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = None;
    let mut position = 0;

    while let Some(mut slide) = deck.get(position) {
        if let Slide::QuizLoading { chunk_index } = slide {
            println!("Generating quiz...");
            let finished = match pending.take() {
                Some(task) => await_quiz(task).await,
                None => false,
            };
            slide = match deck.get(position) {
                Some(s) if finished => s,
                Some(_) => Slide::QuizError {
                    chunk_index,
                    message: "quiz generation stopped".into(),
                },
                None => break,
            };
        }
        if let Some(task) = session.navigate(position, &slide) {
            pending = Some(task);
        }

        println!("\n[{}/{}]", position + 1, deck.len());
        render_slide(&slide);

        if let Slide::Quiz { chunk_index, result } = &slide {
            print!("Answer (A-D), Enter to skip, q to quit: ");
            flush_stdout();
            let Some(line) = lines.next_line().await? else { break };
            let line = line.trim();
            if line.eq_ignore_ascii_case("q") {
                break;
            }
            if let Some(letter) = line.chars().next() {
                if session.record_answer(*chunk_index, result, letter) {
                    println!("Correct!");
                } else {
                    println!("Incorrect, the answer was {}.", result.correct);
                }
                if !result.explanation.is_empty() {
                    println!("{}", result.explanation);
                }
            }
            position += 1;
            continue;
        }

        print!("[Enter] next, q quit: ");
        flush_stdout();
        let Some(line) = lines.next_line().await? else { break };
        if line.trim().eq_ignore_ascii_case("q") {
            break;
        }
        position += 1;
    }

    print_summary(&session.end());
    Ok(())
}

/// Wait for a quiz that was inserted as a placeholder. `false` if its task died.
async fn await_quiz(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            warn!("Quiz task failed: {}", e);
            false
        }
    }
}

fn render_slide(slide: &Slide) {
    match slide {
        Slide::Title {
            title,
            excerpt,
            sections,
            quiz_interval,
        } => {
            println!("{}", title);
            if !excerpt.is_empty() {
                println!("{}", excerpt);
            }
            match quiz_interval {
                Some(n) => println!("{} sections, a quiz every {}", sections, n),
                None => println!("{} sections", sections),
            }
        }
        Slide::Content { chunk, .. } => {
            for block in &chunk.blocks {
                render_block(block);
            }
        }
        Slide::Quiz { result, .. } => {
            println!("Quiz: {}", result.question);
            for option in &result.options {
                println!("  {}", option);
            }
        }
        Slide::QuizLoading { .. } => println!("Quiz is still loading."),
        Slide::QuizError { message, .. } => println!("Quiz unavailable: {}", message),
    }
}

fn render_block(block: &Block) {
    match block {
        Block::Heading { level, text } => {
            println!("\n{} {}", "#".repeat(*level as usize), text)
        }
        Block::Paragraph { text, .. } => println!("{}\n", text),
        Block::Quote { text, .. } => println!("> {}\n", text),
        Block::List { ordered, items } => {
            for (i, item) in items.iter().enumerate() {
                if *ordered {
                    println!("{}. {}", i + 1, item.text);
                } else {
                    println!("- {}", item.text);
                }
            }
            println!();
        }
        Block::Code { text } => {
            for line in text.lines() {
                println!("    {}", line);
            }
            println!();
        }
        Block::Image { src, alt, caption } => {
            let label = caption.as_deref().filter(|c| !c.is_empty()).unwrap_or(alt);
            println!("[image: {}] {}\n", label, src);
        }
        Block::Math { text, .. } => println!("  {}\n", text),
    }
}

fn print_summary(s: &SessionSummary) {
    println!("\n--- {} ---", s.title);
    println!("Read:      {}/{} sections", s.chunks_read, s.chunks_total);
    println!("Words:     {}", s.words_read);
    println!("Quizzes:   {}/{} correct", s.quizzes_correct, s.quizzes_answered);
    println!("Started:   {}", s.started_at.format("%Y-%m-%d %H:%M"));
    println!(
        "Time:      {}",
        format_duration(Duration::from_secs(s.elapsed_secs.max(0) as u64))
    );
}

fn flush_stdout() {
    use std::io::Write;
    let _ = std::io::stdout().flush();
}

/// `4.2s`, `3m 7s`, `1h 2m 3s`.
fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    match (secs / 3600, secs % 3600 / 60, secs % 60) {
        (0, 0, _) => format!("{:.1}s", d.as_secs_f64()),
        (0, m, s) => format!("{}m {}s", m, s),
        (h, m, s) => format!("{}h {}m {}s", h, m, s),
    }
}
