#![forbid(unsafe_code)]

//! `genstream`: command-line client for the post generation pipeline.
//!
//! Submits an idea, streams agent progress to stderr, collects answers to
//! the clarifying questions and prints the final post.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use genstream::models::agent::AgentStatus;
use genstream::models::question::{ClarifyingQuestion, QuestionAnswers};
use genstream::models::session::PostFormat;
use genstream::pipeline::merge::FinalPost;
use genstream::pipeline::state::PipelineState;
use genstream::pipeline::summary::group_thousands;
use genstream::{AppError, ClientConfig, GenerationOrchestrator, Result, RunOutcome};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "genstream", about = "Multi-agent post generation client", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a post from a raw idea.
    Generate {
        /// The raw idea.
        #[arg(long)]
        idea: String,

        /// Preferred format: text, carousel, video or auto.
        #[arg(long, default_value = "auto")]
        format: String,

        /// TOML or JSON file mapping question ids to answers. Questions are
        /// asked on stdin when omitted.
        #[arg(long)]
        answers: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = ClientConfig::load_from_path(&args.config)?;
    config.load_credentials().await?;
    let config = Arc::new(config);
    info!(base_url = %config.base_url, "configuration loaded");

    let orchestrator = GenerationOrchestrator::from_config(config)?;
    let progress = tokio::spawn(print_progress(orchestrator.subscribe()));

    let Command::Generate {
        idea,
        format,
        answers,
    } = args.command;
    let format = PostFormat::parse(&format)?;

    let outcome = tokio::select! {
        outcome = generate(&orchestrator, &idea, format, answers.as_deref()) => outcome,
        () = shutdown_signal() => {
            info!("interrupt received, cancelling");
            orchestrator.cancel().await;
            Ok(RunOutcome::Cancelled)
        }
    };
    progress.abort();

    match outcome? {
        RunOutcome::Completed(post) => {
            print_post(&post);
            Ok(())
        }
        RunOutcome::Rejected { message } => {
            println!("{message}");
            Ok(())
        }
        RunOutcome::Failed(message) => Err(AppError::Pipeline(message)),
        RunOutcome::Cancelled => {
            warn!("generation cancelled");
            Ok(())
        }
        RunOutcome::AwaitingAnswers { .. } => Err(AppError::Pipeline(
            "server asked for answers a second time".into(),
        )),
    }
}

/// Run both phases; returns the outcome of the last one run.
async fn generate(
    orchestrator: &GenerationOrchestrator,
    idea: &str,
    format: PostFormat,
    answers_file: Option<&Path>,
) -> Result<RunOutcome> {
    let outcome = orchestrator.start_generation(idea, format).await?.wait().await;
    let RunOutcome::AwaitingAnswers { questions } = outcome else {
        return Ok(outcome);
    };

    let answers = match answers_file {
        Some(path) => load_answers(path)?,
        None => ask(&questions).await?,
    };
    Ok(orchestrator.submit_answers(&answers).await?.wait().await)
}

fn load_answers(path: &Path) -> Result<QuestionAnswers> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| AppError::Config(format!("cannot read answers file: {err}")))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(serde_json::from_str(&raw)?)
    } else {
        toml::from_str(&raw).map_err(|err| AppError::Config(format!("invalid answers file: {err}")))
    }
}

async fn ask(questions: &[ClarifyingQuestion]) -> Result<QuestionAnswers> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut answers = QuestionAnswers::new();

    for question in questions {
        let mut prompt = format!("\n{}\n", question.question);
        if !question.rationale.is_empty() {
            prompt.push_str(&format!("  ({})\n", question.rationale));
        }
        prompt.push_str("> ");
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        answers.insert(question.question_id.clone(), line.trim().to_owned());
    }
    Ok(answers)
}

/// Print agent transitions to stderr as they happen.
async fn print_progress(mut rx: watch::Receiver<PipelineState>) {
    let mut seen = rx.borrow().agents.clone().map(|agent| agent.status);
    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();
        for (agent, last) in state.agents.iter().zip(seen.iter_mut()) {
            if agent.status == *last {
                continue;
            }
            *last = agent.status;
            let detail = agent
                .thoughts
                .last()
                .map(|thought| thought.text.as_str())
                .unwrap_or_default();
            match agent.status {
                AgentStatus::Active => eprintln!("[{}] {detail}", agent.agent),
                AgentStatus::Success => eprintln!(
                    "[{}] done in {}ms: {detail}",
                    agent.agent,
                    agent.duration_ms.unwrap_or_default()
                ),
                AgentStatus::Error => eprintln!("[{}] failed: {detail}", agent.agent),
                AgentStatus::Skipped => eprintln!("[{}] skipped", agent.agent),
                AgentStatus::Pending => {}
            }
        }
    }
}

fn print_post(post: &FinalPost) {
    println!("{}", post.render());
    println!();
    println!("format: {}", post.format.as_str());
    if let Some(score) = post.quality_score {
        println!("quality: {score}/10");
    }
    if let Some((min, max)) = post.predicted_impressions {
        println!(
            "predicted impressions: {}-{}",
            group_thousands(min),
            group_thousands(max)
        );
    }
    if let Some(specs) = &post.visual_specs {
        println!("slides: {}", specs.total_slides);
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "ctrl-c signal handler failed");
        std::future::pending::<()>().await;
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
