//! Tripwright - plan-and-execute travel research
//!
//! CLI entry point: research a trip, inspect and resume sessions, run
//! batches, and build the destination index.

use std::fs;
use std::path::Path;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, info};

use destinationstore::{DestinationStore, IndexOptions, IndexOutcome};
use tripwright::cli::{Cli, Command, OutputFormat, generate_after_help, get_log_path};
use tripwright::config::Config;
use tripwright::domain::{Session, SessionStatus, TripRequest};
use tripwright::llm::create_client;
use tripwright::prompts::PromptLoader;
use tripwright::retrieval::create_retriever;
use tripwright::state::StateManager;
use tripwright::tools::{ToolExecutor, create_search_provider};
use tripwright::workflow::WorkflowEngine;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let defaults = Config::default();
    let llm_key_env = defaults
        .llm
        .resolve()
        .map(|r| r.api_key_env)
        .unwrap_or_else(|_| "OPENAI_API_KEY".to_string());
    let cmd = Cli::command().after_help(generate_after_help(&llm_key_env, &defaults.search.api_key_env));
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;
    info!("Tripwright loaded config: default={}", config.llm.default);

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Plan {
            query,
            origin,
            date,
            days,
            no_prompt,
        } => {
            let request = if no_prompt {
                let query = query.ok_or_else(|| eyre!("A trip query is required with --no-prompt"))?;
                build_request(query, origin, date, days)
            } else {
                prompt_request(query, origin, date, days)?
            };
            cmd_plan(&config, request).await
        }
        Command::Resume { id } => cmd_resume(&config, &id).await,
        Command::Sessions { status, format } => cmd_sessions(&config, status, format).await,
        Command::Show { id, format } => cmd_show(&config, &id, format).await,
        Command::Delete { id } => cmd_delete(&config, &id).await,
        Command::Batch {
            file,
            concurrency,
            output,
        } => cmd_batch(&config, &file, concurrency, output.as_deref()).await,
        Command::Index { docs_dir } => cmd_index(&config, &docs_dir),
    }
}

/// Trip request from flags, treating blank values as missing
fn build_request(query: String, origin: Option<String>, date: Option<String>, days: Option<String>) -> TripRequest {
    let mut request = TripRequest::new(query.trim());
    request.origin_city = origin.filter(|s| !s.trim().is_empty());
    request.travel_date = date.filter(|s| !s.trim().is_empty());
    request.trip_duration = days.filter(|s| !s.trim().is_empty());
    request
}

/// Ask for whatever the flags did not provide
fn prompt_request(
    query: Option<String>,
    origin: Option<String>,
    date: Option<String>,
    days: Option<String>,
) -> Result<TripRequest> {
    debug!("prompt_request: called");
    let mut rl = DefaultEditor::new().map_err(|e| eyre!("Failed to initialize readline: {}", e))?;

    let query = match query {
        Some(q) if !q.trim().is_empty() => q,
        _ => loop {
            let answer = ask(&mut rl, "Where would you like to travel?")?;
            if !answer.is_empty() {
                break answer;
            }
        },
    };
    let origin = match origin {
        Some(o) => Some(o),
        None => Some(ask(&mut rl, "Where are you travelling from? (press Enter to skip)")?),
    };
    let date = match date {
        Some(d) => Some(d),
        None => Some(ask(&mut rl, "When are you planning to travel? (press Enter to skip)")?),
    };
    let days = match days {
        Some(d) => Some(d),
        None => Some(ask(&mut rl, "How many days? (press Enter to skip)")?),
    };

    Ok(build_request(query, origin, date, days))
}

fn ask(rl: &mut DefaultEditor, question: &str) -> Result<String> {
    match rl.readline(&format!("{} ", question.bright_green())) {
        Ok(line) => Ok(line.trim().to_string()),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Err(eyre!("Cancelled")),
        Err(err) => Err(eyre!("Readline error: {}", err)),
    }
}

/// Wire the engine from config: LLM, web search, retrieval, prompts, checkpoints
fn build_engine(config: &Config, state: StateManager) -> Result<WorkflowEngine> {
    debug!("build_engine: called");
    config.validate()?;

    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let search = create_search_provider(&config.search).context("Failed to create search provider")?;
    let tools = ToolExecutor::research(search, config.workflow.search_max_results);
    let retriever = create_retriever(&config.retrieval);
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let prompts = PromptLoader::new(cwd);

    Ok(WorkflowEngine::new(llm, tools, retriever, prompts, config.workflow.clone()).with_state(state))
}

fn open_state(config: &Config) -> Result<StateManager> {
    StateManager::spawn(&config.storage.sessions_db).context(format!(
        "Failed to open session store at {}",
        config.storage.sessions_db.display()
    ))
}

async fn cmd_plan(config: &Config, request: TripRequest) -> Result<()> {
    debug!(?request, "cmd_plan: called");
    let state = open_state(config)?;
    let engine = build_engine(config, state.clone())?;

    eprintln!("\n{}\n", "Researching your trip...".cyan());
    let result = engine.start(request).await;
    state.shutdown().await.ok();

    let session = result.map_err(|e| eyre!("Research failed: {}", e))?;
    print_answer(&session, &config.llm.default);
    Ok(())
}

async fn cmd_resume(config: &Config, id: &str) -> Result<()> {
    debug!(%id, "cmd_resume: called");
    let state = open_state(config)?;
    let full_id = state.resolve_id(id).await?;
    let engine = build_engine(config, state.clone())?;

    eprintln!("\n{} {}\n", "Resuming session".cyan(), full_id);
    let result = engine.resume(&full_id).await;
    state.shutdown().await.ok();

    let session = result.map_err(|e| eyre!("Research failed: {}", e))?;
    print_answer(&session, &config.llm.default);
    Ok(())
}

fn print_answer(session: &Session, model: &str) {
    println!("{}", session.final_answer.as_deref().unwrap_or_default());
    eprintln!(
        "\n{} {} ({})",
        "Session".dimmed(),
        session.id.dimmed(),
        session.usage.report(model)
    );
}

fn status_colored(status: SessionStatus) -> colored::ColoredString {
    match status {
        SessionStatus::Running => status.to_string().yellow(),
        SessionStatus::Complete => status.to_string().green(),
        SessionStatus::Failed => status.to_string().red(),
    }
}

fn format_timestamp(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

async fn cmd_sessions(config: &Config, status: Option<SessionStatus>, format: OutputFormat) -> Result<()> {
    debug!(?status, ?format, "cmd_sessions: called");
    let state = open_state(config)?;
    let sessions = state.list_sessions(status).await?;
    state.shutdown().await.ok();

    if format == OutputFormat::Json {
        let summaries: Vec<serde_json::Value> = sessions
            .iter()
            .map(|s| {
                serde_json::json!({
                    "id": s.id,
                    "status": s.status,
                    "stage": s.stage.to_string(),
                    "query": s.request.user_query,
                    "created_at": s.created_at,
                    "updated_at": s.updated_at,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions");
        return Ok(());
    }
    for s in &sessions {
        println!(
            "{}  {:<8}  {:<16}  {}  {}",
            s.id[..8.min(s.id.len())].yellow(),
            status_colored(s.status),
            s.stage.to_string(),
            format_timestamp(s.created_at).dimmed(),
            s.request.user_query
        );
    }
    Ok(())
}

async fn cmd_show(config: &Config, id: &str, format: OutputFormat) -> Result<()> {
    debug!(%id, ?format, "cmd_show: called");
    let state = open_state(config)?;
    let session = state.find_session(id).await?;
    state.shutdown().await.ok();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    println!("{} {}", "Session:".bold(), session.id);
    println!("{} {}", "Status:".bold(), status_colored(session.status));
    println!("{} {}", "Stage:".bold(), session.stage);
    println!("{} {}", "Query:".bold(), session.request.user_query);
    println!("{} {}", "From:".bold(), session.request.origin_city_or_default());
    println!("{} {}", "Date:".bold(), session.request.travel_date_or_default());
    println!("{} {}", "Days:".bold(), session.request.trip_duration_or_default());
    println!("{} {}", "Created:".bold(), format_timestamp(session.created_at));
    println!("{} {}", "Updated:".bold(), format_timestamp(session.updated_at));
    println!("{} {}", "Usage:".bold(), session.usage.report(&config.llm.default));

    if let Some(plan) = &session.plan {
        println!("\n{} {} - {}", "Plan:".bold(), plan.destination.cyan(), plan.trip_summary);
        for (i, step) in plan.steps.iter().enumerate() {
            let marker = if i < session.current_step { "✓".green() } else { "•".dimmed() };
            println!("  {} {}. [{}] {}", marker, step.step, step.agent, step.query);
        }
    }
    if !session.replan_attempts.is_empty() {
        let attempts: Vec<String> = session
            .replan_attempts
            .iter()
            .map(|(step, n)| format!("step {}: {}", step + 1, n))
            .collect();
        println!("{} {}", "Replans:".bold(), attempts.join(", "));
    }
    if let Some(error) = &session.error {
        println!("\n{} {}", "Error:".red().bold(), error);
    }
    if let Some(answer) = &session.final_answer {
        println!("\n{}", answer);
    }
    Ok(())
}

async fn cmd_delete(config: &Config, id: &str) -> Result<()> {
    debug!(%id, "cmd_delete: called");
    let state = open_state(config)?;
    let full_id = state.resolve_id(id).await?;
    state.delete_session(&full_id).await?;
    state.shutdown().await.ok();
    println!("{} Deleted session {}", "✓".green(), full_id);
    Ok(())
}

async fn cmd_batch(config: &Config, file: &Path, concurrency: Option<usize>, output: Option<&Path>) -> Result<()> {
    debug!(file = %file.display(), ?concurrency, "cmd_batch: called");
    let content = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;
    let requests: Vec<TripRequest> =
        serde_yaml::from_str(&content).context(format!("Failed to parse {}", file.display()))?;
    if requests.is_empty() {
        println!("No requests in {}", file.display());
        return Ok(());
    }
    if let Some(dir) = output {
        fs::create_dir_all(dir).context(format!("Failed to create {}", dir.display()))?;
    }

    let state = open_state(config)?;
    let engine = build_engine(config, state.clone())?;
    let concurrency = concurrency.unwrap_or(config.concurrency.max_sessions);
    eprintln!(
        "{} {} trips, {} at a time\n",
        "Researching".cyan(),
        requests.len(),
        concurrency
    );

    let queries: Vec<String> = requests.iter().map(|r| r.user_query.clone()).collect();
    let results = engine.run_batch(requests, concurrency).await;
    state.shutdown().await.ok();

    let mut failures = 0;
    for (query, result) in queries.iter().zip(results) {
        match result {
            Ok(session) => {
                let target = output.map(|dir| dir.join(format!("{}.md", session.id)));
                if let Some(path) = &target {
                    fs::write(path, session.final_answer.as_deref().unwrap_or_default())
                        .context(format!("Failed to write {}", path.display()))?;
                }
                let location = target
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| session.id.clone());
                println!("{} {} -> {}", "✓".green(), query, location);
            }
            Err(e) => {
                failures += 1;
                println!("{} {}: {}", "✗".red(), query, e);
            }
        }
    }

    if failures > 0 {
        return Err(eyre!("{} of {} sessions failed", failures, queries.len()));
    }
    Ok(())
}

fn cmd_index(config: &Config, docs_dir: &Path) -> Result<()> {
    debug!(docs_dir = %docs_dir.display(), "cmd_index: called");
    let store_path = &config.retrieval.store_path;
    let store = DestinationStore::open(store_path)?;

    match store.index_directory(docs_dir, IndexOptions::default())? {
        IndexOutcome::Indexed { documents, chunks } => {
            println!(
                "{} Indexed {} documents into {} chunks",
                "✓".green(),
                documents.to_string().cyan(),
                chunks.to_string().cyan()
            );
        }
        IndexOutcome::AlreadyIndexed => {
            println!("{} Index already exists at {}", "•".yellow(), store_path.display());
        }
    }
    Ok(())
}
