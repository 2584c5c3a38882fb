//! vidscribe command line entry point.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use vidscribe_core::core::ai::{InferenceClient, ProviderKind};
use vidscribe_core::core::analysis::PromptTemplates;
use vidscribe_core::core::events::{EventSink, TracingEventSink};
use vidscribe_core::core::media::{
    CommandTranscriber, DisabledTranscriber, FfmpegFrameExtractor, Transcriber,
};
use vidscribe_core::core::pipeline::{PipelineOptions, PipelineOrchestrator};
use vidscribe_core::core::settings::{SettingsManager, SettingsOverrides};
use vidscribe_core::core::Stage;
use vidscribe_core::CoreError;

#[derive(Parser, Debug)]
#[command(name = "vidscribe", version, about = "Describe a video with a vision model, frame by frame")]
struct Cli {
    /// Path to the video file
    video: PathBuf,

    /// Configuration directory
    #[arg(long, default_value = "config")]
    config: PathBuf,

    /// Output directory for the result and intermediate artifacts
    #[arg(long)]
    output: Option<PathBuf>,

    /// Client to use (ollama, openai_api, google_api, mistral_api)
    #[arg(long)]
    client: Option<String>,

    /// URL of the Ollama service
    #[arg(long)]
    ollama_url: Option<String>,

    /// API key of the selected hosted client
    #[arg(long)]
    api_key: Option<String>,

    /// API URL of the selected client
    #[arg(long)]
    api_url: Option<String>,

    /// Vision model name
    #[arg(long)]
    model: Option<String>,

    /// Seconds of video to process
    #[arg(long)]
    duration: Option<f64>,

    /// Keep extracted frames and per-frame results after the run
    #[arg(long)]
    keep_frames: bool,

    /// Whisper model size or path, or `none` to skip transcription
    #[arg(long)]
    whisper_model: Option<String>,

    /// Stage to start from (1 capture, 2 frame analysis, 3 reconstruction)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=3))]
    start_stage: u8,

    /// Maximum number of frames to analyze
    #[arg(long, value_parser = clap::value_parser!(usize))]
    max_frames: Option<usize>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Question to answer about the video
    #[arg(long)]
    prompt: Option<String>,

    /// Audio language code
    #[arg(long)]
    language: Option<String>,

    /// Device for transcription (cpu, cuda, ...)
    #[arg(long)]
    device: Option<String>,

    /// Stream model responses (disables cost accounting)
    #[arg(long)]
    stream: bool,
}

impl Cli {
    fn overrides(&self) -> anyhow::Result<SettingsOverrides> {
        let client = self
            .client
            .as_deref()
            .map(str::parse::<ProviderKind>)
            .transpose()?;

        Ok(SettingsOverrides {
            client,
            ollama_url: self.ollama_url.clone(),
            api_key: self.api_key.clone(),
            api_url: self.api_url.clone(),
            model: self.model.clone(),
            output_dir: self.output.clone(),
            prompt: self.prompt.clone(),
            duration: self.duration,
            keep_frames: self.keep_frames,
            whisper_model: self.whisper_model.clone(),
            language: self.language.clone(),
            device: self.device.clone(),
            stream: self.stream,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", describe_failure(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = SettingsManager::new(&cli.config).load()?;
    cli.overrides()?.apply(&mut settings);
    if let Some(max) = cli.max_frames {
        settings.frames.max_count = Some(max.max(1));
    }

    std::fs::create_dir_all(&settings.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            settings.output_dir.display()
        )
    })?;
    let _log_guard = init_logging(&settings.output_dir, &cli.log_level)?;

    let start_stage = Stage::try_from(cli.start_stage).map_err(anyhow::Error::msg)?;
    let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let client = InferenceClient::from_config(settings.provider_config()?, events.clone())?
        .with_retry_policy(settings.retry_policy());
    let templates = PromptTemplates::load(settings.prompts.directory.as_deref())?;
    let transcriber: Arc<dyn Transcriber> = if settings.transcription_enabled() {
        Arc::new(CommandTranscriber::from_settings(&settings.audio))
    } else {
        Arc::new(DisabledTranscriber)
    };

    info!(
        video = %cli.video.display(),
        client = %settings.clients.default,
        model = %client.default_model(),
        "Initializing components"
    );

    let options = PipelineOptions::from_settings(&settings, &cli.video).with_start_stage(start_stage);
    let orchestrator = PipelineOrchestrator::new(
        Arc::new(client),
        Arc::new(FfmpegFrameExtractor::default()),
        transcriber,
        events,
    )
    .with_templates(templates);

    let cancel = orchestrator.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping before the next frame");
            cancel.cancel();
        }
    });

    let result = orchestrator.run(&options).await?;

    match &result.transcript {
        Some(transcript) => info!("Transcript:\n{}", transcript.text),
        None => info!("No reliable transcript available"),
    }
    info!(
        total_tokens = result.token_usage.total_tokens,
        total_cost = result.token_usage.total_cost,
        "Analysis complete. Results saved to {}",
        options.output_path.display()
    );
    if let Some(description) = &result.video_description {
        println!("{}", description.response);
    }
    Ok(())
}

/// Stderr plus a daily-rolling file in the output directory.
fn init_logging(log_dir: &Path, level: &str) -> anyhow::Result<WorkerGuard> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level: {}", level))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "vidscribe.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

/// `stage <n> failed (<class>): <message>` for stage failures.
fn describe_failure(err: &anyhow::Error) -> String {
    let Some(core) = err.downcast_ref::<CoreError>() else {
        return format!("error: {:#}", err);
    };
    match core {
        CoreError::Stage { stage, source } => format!(
            "stage {} failed ({}): {}",
            u8::from(*stage),
            source.class_name(),
            source
        ),
        other => format!("run failed ({}): {}", other.class_name(), other),
    }
}
