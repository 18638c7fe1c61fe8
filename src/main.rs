// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

use subtrans::app_config::{self, Config, ProviderConfig, TranslationProvider};
use subtrans::app_controller::Controller;

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Anthropic,
    OpenAI,
    Ollama,
    LMStudio,
    Gemini,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
            CliTranslationProvider::Gemini => TranslationProvider::Gemini,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions for subtrans
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// subtrans - chunked subtitle translation with AI models
///
/// Splits an SRT document into token-budgeted chunks, translates them in
/// parallel and checks every response for lost or invented subtitles.
#[derive(Parser, Debug)]
#[command(name = "subtrans")]
#[command(version)]
#[command(about = "AI-powered SRT subtitle translation")]
#[command(long_about = "subtrans translates SRT subtitle files with AI providers, keeping every timestamp intact.

EXAMPLES:
    subtrans -l French movie.srt                # Translate to French
    subtrans -l de -w 4 /subtitles/             # Translate a directory with 4 workers
    subtrans -p openai -m gpt-4o movie.srt      # Use a specific provider and model
    subtrans -f --retry-on-refusal movie.srt    # Overwrite and retry refused chunks
    subtrans completions bash > subtrans.bash   # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file doesn't exist,
    a default one is created. Command line flags override the file.

SUPPORTED PROVIDERS:
    anthropic - Anthropic Messages API (ANTHROPIC_API_KEY)
    openai    - OpenAI Chat Completions API (OPENAI_API_KEY)
    ollama    - Local Ollama server
    lmstudio  - LM Studio local server (OpenAI-compatible)
    gemini    - Google Gemini API (GEMINI_API_KEY)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input subtitle file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: Option<PathBuf>,

    /// Target language, as a name or an ISO 639 code
    #[arg(short = 'l', long)]
    language: Option<String>,

    /// Number of chunks translated concurrently
    #[arg(short, long)]
    workers: Option<usize>,

    /// Token budget per chunk
    #[arg(short = 's', long)]
    chunk_size: Option<usize>,

    /// Retries per chunk after the first attempt
    #[arg(short, long)]
    retries: Option<usize>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f32>,

    /// Retry chunks the model refused to translate
    #[arg(long)]
    retry_on_refusal: bool,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Prompt template file
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Prefix and ANSI color for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("❌ ", "1;31"),
            Level::Warn => ("🚧 ", "1;33"),
            Level::Info => (" ", "1;32"),
            Level::Debug => ("🔍 ", "1;36"),
            Level::Trace => ("📋 ", "1;35"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (emoji, color) = Self::style_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "\x1B[{}m{} {} {}\x1B[0m", color, now, emoji, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The level is lowered or raised once the config is known
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "subtrans", &mut std::io::stdout());
        return Ok(());
    }

    if let Some(level) = &cli.log_level {
        let level: app_config::LogLevel = level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let input_path = cli
        .input_path
        .clone()
        .ok_or_else(|| anyhow!("INPUT_PATH is required when no subcommand is specified"))?;

    let config = load_config(&cli)?;
    log::set_max_level(config.log_level.to_level_filter());

    let controller = Controller::with_config(config).context("Failed to initialize the translation service")?;
    let summary = controller.run(&input_path, cli.force_overwrite).await?;

    if !summary.is_success() {
        return Err(anyhow!("{} file(s) could not be fully translated", summary.failed));
    }
    Ok(())
}

// @returns: Configuration from file with command line overrides applied
fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let config_path = Path::new(&cli.config_path);
    if !config_path.exists() {
        warn!("Config file not found at '{}', creating default config.", cli.config_path);
    }
    let mut config = Config::load_or_create(config_path)?;

    if let Some(provider) = &cli.provider {
        config.translation.provider = provider.clone().into();
    }

    if let Some(model) = &cli.model {
        let provider = config.translation.provider;
        let provider_str = provider.to_lowercase_string();
        match config
            .translation
            .available_providers
            .iter_mut()
            .find(|p| p.provider_type == provider_str)
        {
            Some(provider_config) => provider_config.model = model.clone(),
            None => {
                let mut provider_config = ProviderConfig::new(provider);
                provider_config.model = model.clone();
                config.translation.available_providers.push(provider_config);
            }
        }
    }

    if let Some(language) = &cli.language {
        config.target_language = language.clone();
    }

    let common = &mut config.translation.common;
    if let Some(workers) = cli.workers {
        common.worker_count = workers;
    }
    if let Some(chunk_size) = cli.chunk_size {
        common.tokens_per_chunk = chunk_size;
    }
    if let Some(retries) = cli.retries {
        common.max_retries = retries;
    }
    if let Some(temperature) = cli.temperature {
        common.temperature = temperature;
    }
    if cli.retry_on_refusal {
        common.retry_on_refusal = true;
    }
    if let Some(prompt_file) = &cli.prompt_file {
        common.prompt_file = Some(prompt_file.clone());
    }

    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone().into();
    }

    config.validate().context("Configuration validation failed")?;
    info!(
        "Target language: {}, provider: {} ({})",
        config.target_language,
        config.translation.provider.display_name(),
        config.translation.get_model()
    );

    Ok(config)
}
