use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ask_core::{Agent, Provider, ProviderConfig, ReasoningEffort, ReasoningSummary};
use ask_providers::{gemini, openai, GeminiProvider, HttpGeminiTransport, HttpResponsesTransport, OpenAIProvider};

mod config;
mod render;
mod tools;

use config::{BackendConfig, Config, Overrides, ProviderKind};
use render::{render_answer, Renderer};

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: every native stream event
    Trace,
    /// Verbose: rounds, requests, tool execution
    Debug,
    /// Standard: high-level flow
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "ask")]
#[command(author, version, about = "Ask an LLM questions, with tools and streamed reasoning", long_about = None)]
pub struct Cli {
    /// Questions to ask, in order, within one conversation
    pub questions: Vec<String>,

    /// Configuration file (default: ~/.config/ask/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Provider to use (overrides config)
    #[arg(long, value_enum)]
    pub provider: Option<ProviderKind>,

    /// Model to use (overrides config)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Base URL for the API (overrides config)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Reasoning summary detail (auto, concise, detailed, none)
    #[arg(long)]
    pub reasoning_summary: Option<ReasoningSummary>,

    /// Reasoning effort (none, minimal, low, medium, high, xhigh)
    #[arg(long)]
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Return thought summaries (Gemini)
    #[arg(long)]
    pub include_thoughts: bool,

    /// Thinking token budget, -1 for dynamic (Gemini)
    #[arg(long, allow_negative_numbers = true)]
    pub thinking_budget: Option<i32>,

    /// Print complete results instead of streaming deltas
    #[arg(long)]
    pub no_stream: bool,

    /// Do not offer the demo tools to the model
    #[arg(long)]
    pub no_tools: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long)]
    pub debug: bool,

    /// Write logs to file (JSON-lines format)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved configuration
    Config,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            provider: self.provider,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            reasoning_summary: self.reasoning_summary,
            reasoning_effort: self.reasoning_effort,
            include_thoughts: self.include_thoughts,
            thinking_budget: self.thinking_budget,
            no_stream: self.no_stream,
            no_tools: self.no_tools,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // --debug overrides --log-level
    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };

    let filter = EnvFilter::new(log_level.as_filter());

    if let Some(log_path) = &cli.log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::sync::Mutex::new(file))
            )
            .init();
    } else {
        // stdout carries the answer
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply(&cli.overrides());

    match &cli.command {
        Some(Commands::Config) => show_config(&config),
        None => ask_mode(&cli, &config).await,
    }
}

async fn ask_mode(cli: &Cli, config: &Config) -> Result<()> {
    if cli.questions.is_empty() {
        anyhow::bail!("No question given. Usage: ask \"Do I need an umbrella when I go out today?\"");
    }

    let agent = Agent::from_boxed(create_provider(config)?);
    if config.tools {
        agent.set_tools(tools::demo_tools()).await;
    }
    let model = agent.config().await.model;
    info!(provider = %config.provider, model = %model, "Agent ready");

    let color = atty::is(atty::Stream::Stdout);
    let mut renderer = Renderer::new(io::stdout(), config.stream, color);

    for question in &cli.questions {
        // Dropping the answer future drops its subscription, which stops
        // generation at the next result.
        let outcome = tokio::select! {
            outcome = ask_one(&agent, &mut renderer, question) => outcome?,
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                eprintln!("\nCancelled");
                return Ok(());
            }
        };

        if let Some(err) = outcome {
            return Err(anyhow::Error::new(err).context("Question failed"));
        }
    }

    Ok(())
}

/// Ask one question and render its answer.
async fn ask_one<W: Write>(
    agent: &Agent,
    renderer: &mut Renderer<W>,
    question: &str,
) -> Result<Option<ask_core::Error>> {
    renderer.question(question)?;
    let answer = agent.ask(question);
    render_answer(renderer, &answer).await
}

fn create_provider(config: &Config) -> Result<Box<dyn Provider>> {
    let backend = config.backend();
    let api_key = backend.api_key.clone().with_context(|| {
        let variable = match config.provider {
            ProviderKind::OpenAI => "OPENAI_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
        };
        format!(
            "No API key for {}. Set {} or add api_key under [{}] in the config file",
            config.provider, variable, config.provider
        )
    })?;

    let provider: Box<dyn Provider> = match config.provider {
        ProviderKind::OpenAI => {
            let mut transport = HttpResponsesTransport::new(api_key);
            if let Some(base_url) = &backend.base_url {
                transport = transport.with_base_url(base_url.clone());
            }
            Box::new(OpenAIProvider::with_transport(transport).with_config(openai_settings(config, backend)))
        }
        ProviderKind::Gemini => {
            let mut transport = HttpGeminiTransport::new(api_key);
            if let Some(base_url) = &backend.base_url {
                transport = transport.with_base_url(base_url.clone());
            }
            Box::new(GeminiProvider::with_transport(transport).with_config(gemini_settings(config, backend)))
        }
    };

    debug!(provider = provider.name(), "Provider created");
    Ok(provider)
}

fn openai_settings(config: &Config, backend: &BackendConfig) -> ProviderConfig {
    let mut settings = ProviderConfig::new(
        backend.model.clone().unwrap_or_else(|| openai::DEFAULT_MODEL.to_string()),
    );
    settings.reasoning_summary = config.reasoning_summary;
    settings.reasoning_effort = config.reasoning_effort;
    settings
}

/// Summary and effort map onto thinking settings; explicit thinking settings
/// win over both.
fn gemini_settings(config: &Config, backend: &BackendConfig) -> ProviderConfig {
    let mut settings = ProviderConfig::new(
        backend.model.clone().unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string()),
    )
    .with_temperature(backend.temperature.unwrap_or(gemini::DEFAULT_TEMPERATURE));

    if let Some(summary) = config.reasoning_summary {
        settings = settings
            .with_reasoning_summary(summary)
            .with_include_thoughts(summary != ReasoningSummary::None);
    }
    if let Some(effort) = config.reasoning_effort {
        settings = settings
            .with_reasoning_effort(effort)
            .with_thinking_budget(gemini::thinking_budget(effort));
    }
    if let Some(include) = config.include_thoughts {
        settings.include_thoughts = include;
    }
    if let Some(budget) = config.thinking_budget {
        settings.thinking_budget = Some(budget);
    }
    settings
}

fn show_config(config: &Config) -> Result<()> {
    if let Ok(path) = Config::config_path() {
        println!("# {}", path.display());
    }
    print!("{}", config.to_masked_toml()?);
    Ok(())
}
