#![deny(warnings)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use voice_affect_core::audio::{decode_clip, AudioClip};
use voice_affect_core::config::{
    resolve_api_key, resolve_endpoint, resolve_string_with_default, AnalysisConfig, Env, StdEnv,
    DEFAULT_LOCALE, DEFAULT_USER_ID, ENV_SEMANTIC_API_KEY, ENV_SEMANTIC_URL, ENV_STORE_DIR,
};
use voice_affect_core::emotion::Emotion;
use voice_affect_core::pipeline::Analyzer;
use voice_affect_core::semantic::{classifier_from_config, classify_or_empty};
use voice_affect_core::store::{JsonFileStore, TrainingHandle};
use voice_affect_core::training::TrainingManager;

const DEFAULT_STORE_DIR: &str = ".voice-affect";

#[derive(Parser, Debug)]
#[command(name = "voice-affect")]
#[command(about = "Emotion inference from short voice recordings, with per-user training")]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, default_value = DEFAULT_USER_ID)]
    user: String,

    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    semantic_url: Option<String>,

    #[arg(long, global = true)]
    semantic_api_key: Option<String>,

    #[arg(long, global = true)]
    locale: Option<String>,

    /// JSON file with analysis settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a WAV/MP3 file and print the result as JSON.
    Analyze {
        file: PathBuf,
        #[arg(long)]
        transcript: Option<String>,
        /// Span start in seconds.
        #[arg(long, default_value_t = 0.0)]
        start: f32,
        /// Span end in seconds; defaults to the end of the file.
        #[arg(long)]
        end: Option<f32>,
    },
    /// Record a labeled sample for the user.
    Train {
        file: PathBuf,
        #[arg(long)]
        label: Emotion,
        #[arg(long)]
        transcript: Option<String>,
    },
    /// Print per-label training stats for the user.
    Stats,
}

struct CliConfig {
    analysis: AnalysisConfig,
    store_dir: PathBuf,
    user: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let (command, cfg) = build_config(args, &env).await?;

    tracing::info!(
        user = %cfg.user,
        store_dir = %cfg.store_dir.display(),
        semantic_endpoint = cfg.analysis.semantic.endpoint.is_some(),
        "config loaded"
    );

    let training = TrainingHandle::load(
        cfg.user.clone(),
        TrainingManager::from_config(&cfg.analysis),
        Arc::new(JsonFileStore::new(&cfg.store_dir)),
    )
    .await;

    match command {
        Command::Analyze {
            file,
            transcript,
            start,
            end,
        } => {
            let clip = read_clip(&file).await?;
            let end = end.unwrap_or_else(|| clip.duration().as_secs_f32());
            let classifier = classifier_from_config(&cfg.analysis.semantic)?;
            let semantic = classify_or_empty(
                classifier.as_ref(),
                transcript.as_deref().unwrap_or_default(),
                &cfg.analysis.semantic.locale,
            )
            .await;

            let analyzer = Analyzer::new(&cfg.analysis);
            let analysis = analyzer.analyze_clip(
                &clip,
                start,
                end,
                transcript.as_deref(),
                &training.weights().await,
                &semantic,
            );
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Command::Train {
            file,
            label,
            transcript,
        } => {
            let clip = read_clip(&file).await?;
            let end = clip.duration().as_secs_f32();
            let analyzer = Analyzer::new(&cfg.analysis);
            let summary = analyzer.clip_summary(&clip, 0.0, end);
            let features = summary.features.vector.with_pitch(summary.pitch.median);

            let sample = training
                .record_sample(
                    label,
                    features,
                    transcript,
                    Some(file.display().to_string()),
                )
                .await;
            let output = json!({
                "sample": sample,
                "accuracy": training.accuracy(label).await,
                "weights": training.weights().await.get(label),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Stats => {
            let output = json!({
                "user": training.user_id(),
                "session": training.session().await,
                "labels": training.stats().await,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

async fn read_clip(path: &Path) -> anyhow::Result<AudioClip> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let clip = decode_clip(bytes, extension)
        .with_context(|| format!("decoding {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        sample_rate_hz = clip.sample_rate_hz(),
        samples = clip.samples().len(),
        "clip decoded"
    );
    Ok(clip)
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn build_config(args: Args, env: &impl Env) -> anyhow::Result<(Command, CliConfig)> {
    let mut analysis = match &args.config {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config {}", path.display()))?;
            AnalysisConfig::from_json(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => AnalysisConfig::default(),
    };

    if let Some(endpoint) = resolve_endpoint(args.semantic_url, ENV_SEMANTIC_URL, env)? {
        analysis.semantic.endpoint = Some(endpoint);
    }
    if let Some(key) = resolve_api_key(args.semantic_api_key, ENV_SEMANTIC_API_KEY, env)? {
        analysis.semantic.api_key = Some(key);
    }
    if let Some(locale) = args.locale {
        analysis.semantic.locale = locale;
    } else if analysis.semantic.locale.is_empty() {
        analysis.semantic.locale = DEFAULT_LOCALE.to_owned();
    }

    let store_dir = PathBuf::from(resolve_string_with_default(
        args.store_dir.map(|p| p.display().to_string()),
        ENV_STORE_DIR,
        env,
        DEFAULT_STORE_DIR,
    ));

    Ok((
        args.command,
        CliConfig {
            analysis,
            store_dir,
            user: args.user,
        },
    ))
}
