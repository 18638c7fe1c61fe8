use anyhow::{Result, anyhow};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::app_config::Config;
use crate::errors::{ChunkError, TranslationError};
use crate::file_utils::FileManager;
use crate::language_utils;
use crate::translation::TranslationService;

// @module: Application controller for subtitle processing

// @const: Extension of the files we read and write
const SUBTITLE_EXTENSION: &str = "srt";

// @const: Raw model output kept in the error log
const RAW_OUTPUT_EXCERPT_CHARS: usize = 2000;

/// What happened to one input file
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Full translation written
    Translated(PathBuf),

    /// Output already present and overwrite not forced
    Skipped(PathBuf),

    /// A chunk failed; partial output (if any) and an error log were written
    Failed {
        partial_path: Option<PathBuf>,
        log_path: PathBuf,
    },
}

/// Totals over one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub translated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Translated(_) => self.translated += 1,
            FileOutcome::Skipped(_) => self.skipped += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Whether every processed file was translated or skipped
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Main application controller for subtitle translation
pub struct Controller {
    // @field: App configuration
    config: Config,

    // @field: Engine shared by every file of the run
    service: TranslationService,

    // @field: Progress bars of the run
    multi_progress: MultiProgress,
}

impl Controller {
    // @method: Create a controller with the provider named in the configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let service = TranslationService::from_config(&config)?;
        Ok(Self::with_service(config, service))
    }

    // @method: Create a controller around an existing service
    pub fn with_service(config: Config, service: TranslationService) -> Self {
        Self {
            config,
            service,
            multi_progress: MultiProgress::new(),
        }
    }

    /// Short language tag used in output file names
    fn language_slug(&self) -> String {
        language_utils::language_slug(&self.config.target_language)
    }

    /// Run on a single subtitle file or on every subtitle file under a directory
    pub async fn run(&self, input_path: &Path, force_overwrite: bool) -> Result<RunSummary> {
        let start_time = Instant::now();
        let mut summary = RunSummary::default();

        if FileManager::file_exists(input_path) {
            let outcome = self.run_file(input_path, force_overwrite).await?;
            summary.record(&outcome);
        } else if FileManager::dir_exists(input_path) {
            summary = self.run_folder(input_path, force_overwrite).await?;
        } else {
            return Err(anyhow!("Input path does not exist: {:?}", input_path));
        }

        let usage = self.service.model().usage();
        if usage.requests > 0 {
            info!("{}", usage.summary());
        }
        info!(
            "Done in {}: {} translated, {} skipped, {} failed",
            Self::format_duration(start_time.elapsed()),
            summary.translated,
            summary.skipped,
            summary.failed
        );

        Ok(summary)
    }

    /// Translate every subtitle file found under `input_dir`.
    /// A failing file is logged and counted; the remaining files are still processed.
    pub async fn run_folder(&self, input_dir: &Path, force_overwrite: bool) -> Result<RunSummary> {
        let slug = self.language_slug();
        let files: Vec<PathBuf> = FileManager::find_files(input_dir, SUBTITLE_EXTENSION)?
            .into_iter()
            .filter(|path| !FileManager::is_translation_output(path, &slug))
            .collect();

        if files.is_empty() {
            warn!("No subtitle files found in {:?}", input_dir);
            return Ok(RunSummary::default());
        }
        info!("Found {} subtitle file(s) in {:?}", files.len(), input_dir);

        let folder_pb = self.multi_progress.add(ProgressBar::new(files.len() as u64));
        folder_pb.set_style(Self::progress_style("files"));

        let mut summary = RunSummary::default();
        for path in &files {
            folder_pb.set_message(
                path.file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default(),
            );
            match self.run_file(path, force_overwrite).await {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    error!("Failed to process {:?}: {:#}", path, e);
                    summary.failed += 1;
                }
            }
            folder_pb.inc(1);
        }
        folder_pb.finish_and_clear();

        Ok(summary)
    }

    /// Translate one subtitle file next to itself
    pub async fn run_file(&self, input_file: &Path, force_overwrite: bool) -> Result<FileOutcome> {
        let slug = self.language_slug();
        let output_path = FileManager::generate_output_path(input_file, &slug, SUBTITLE_EXTENSION);

        if FileManager::file_exists(&output_path) && !force_overwrite {
            warn!("Skipping {:?}, translation already exists (use -f to force overwrite)", input_file);
            return Ok(FileOutcome::Skipped(output_path));
        }

        let content = FileManager::read_to_string(input_file)?;
        info!(
            "Translating {:?} to {} with {} - {}",
            input_file,
            self.service.options.target_language,
            self.config.translation.provider.display_name(),
            self.config.translation.get_model()
        );

        let progress_bar = self.multi_progress.add(ProgressBar::new(100));
        progress_bar.set_style(Self::progress_style("%"));
        progress_bar.set_message("Translating");

        let pb = progress_bar.clone();
        let start_time = Instant::now();
        let result = self
            .service
            .translate_subtitles(&content, move |fraction| {
                pb.set_position((fraction * 100.0).round() as u64);
            })
            .await;
        progress_bar.finish_and_clear();

        match result {
            Ok(translated) => {
                FileManager::write_to_file(&output_path, &Self::with_trailing_newline(&translated))?;
                info!(
                    "Success: {} ({})",
                    output_path.display(),
                    Self::format_duration(start_time.elapsed())
                );
                Ok(FileOutcome::Translated(output_path))
            }
            Err(TranslationError::Aggregate {
                source,
                partial_translation,
            }) => self.write_failure(input_file, &output_path, &source, &partial_translation),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist what survived a failed translation plus a diagnostic log
    fn write_failure(
        &self,
        input_file: &Path,
        output_path: &Path,
        chunk_error: &ChunkError,
        partial_translation: &str,
    ) -> Result<FileOutcome> {
        error!("{:?}: {}", input_file, chunk_error);

        let partial_path = if partial_translation.trim().is_empty() {
            None
        } else {
            let path =
                FileManager::generate_partial_output_path(input_file, &self.language_slug(), SUBTITLE_EXTENSION);
            FileManager::write_to_file(&path, &Self::with_trailing_newline(partial_translation))?;
            warn!("Partial translation written to {}", path.display());
            Some(path)
        };

        let log_path = output_path.with_extension("errors.log");
        FileManager::write_to_file(&log_path, &self.failure_report(input_file, chunk_error))?;
        info!("Error details written to {}", log_path.display());

        Ok(FileOutcome::Failed { partial_path, log_path })
    }

    // @returns: Human-readable failure report
    fn failure_report(&self, input_file: &Path, chunk_error: &ChunkError) -> String {
        format!(
            "[{}] {} - {}\nFile: {}\nTarget language: {}\nChunk: {}\nKind: {}\nAttempts: {}\nDetail: {}\n\nRaw output:\n{}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.config.translation.provider.display_name(),
            self.config.translation.get_model(),
            input_file.display(),
            self.service.options.target_language,
            chunk_error.chunk_index + 1,
            chunk_error.kind,
            chunk_error.attempts,
            chunk_error.detail,
            chunk_error.raw_output_excerpt(RAW_OUTPUT_EXCERPT_CHARS)
        )
    }

    fn with_trailing_newline(text: &str) -> String {
        let mut text = text.trim_end().to_string();
        text.push('\n');
        text
    }

    fn progress_style(unit: &str) -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} {{msg}} {{eta}}",
                unit
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░")
    }

    // Format duration in a human-readable format
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
