//! triage - probe, classify, and file municipal issue reports from the command line
//!
//! Subcommands:
//! - `probe`: estimate a clip's duration with the strategy cascade
//! - `classify`: count hazards in a still or clip and write an annotated copy
//! - `report`: run the full report intake against the configured SQLite store

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use civic_triage::config::TriageConfig;
use civic_triage::intake::{IntakeOutcome, ReportForm, ReportIntake, Upload};
use civic_triage::{
    BackendKind, DurationProber, ModelHandle, SeverityDetector, SqliteReportStore, UploadedMedia,
};

#[derive(Parser, Debug)]
#[command(
    name = "triage",
    version,
    about = "Severity triage for municipal issue report media"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the duration estimate of a clip as JSON
    Probe {
        file: PathBuf,
        /// Declared content type, e.g. video/mp4
        #[arg(long, value_name = "TYPE")]
        content_type: Option<String>,
    },
    /// Classify a still or clip and print the result as JSON
    Classify {
        file: PathBuf,
        /// Folder for the annotated copy (defaults to the configured media root)
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
        /// Minimum confidence for a detection to count
        #[arg(long)]
        threshold: Option<f32>,
        /// Detector backend (tract|stub)
        #[arg(long, env = "TRIAGE_BACKEND")]
        backend: Option<String>,
    },
    /// File an issue report
    Report {
        #[arg(long)]
        title: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        location: String,
        #[arg(long, value_name = "PATH", conflicts_with = "video")]
        image: Option<PathBuf>,
        #[arg(long, value_name = "PATH")]
        video: Option<PathBuf>,
        /// Declared content type of the attachment (guessed from the extension when omitted)
        #[arg(long, value_name = "TYPE")]
        content_type: Option<String>,
        #[arg(long)]
        reporter: Option<String>,
        /// Detector backend (tract|stub)
        #[arg(long, env = "TRIAGE_BACKEND")]
        backend: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut cfg = TriageConfig::load()?;

    match args.command {
        Command::Probe { file, content_type } => {
            let content_type = content_type.or_else(|| guess_content_type(&file, true));
            let mut media = UploadedMedia::open(&file, content_type.as_deref())?;
            let prober = DurationProber::with_default_strategies(&cfg.probe);
            let estimate = prober.probe_duration(&mut media);
            let verdict = cfg.duration_policy().evaluate(&estimate);
            log::info!("{}: {:?}", file.display(), verdict);
            println!("{}", serde_json::to_string_pretty(&estimate)?);
        }
        Command::Classify {
            file,
            output,
            threshold,
            backend,
        } => {
            apply_backend(&mut cfg, backend.as_deref())?;
            if let Some(threshold) = threshold {
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(anyhow!("threshold must be within [0, 1]"));
                }
                cfg.confidence_threshold = threshold;
            }
            let model = load_model(&cfg)?;
            let detector = SeverityDetector::new(model, cfg.detector_settings());
            let output = output.unwrap_or_else(|| cfg.media_root.clone());
            let result = detector
                .classify(&file, &output)
                .with_context(|| format!("classify {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Report {
            title,
            category,
            description,
            location,
            image,
            video,
            content_type,
            reporter,
            backend,
        } => {
            apply_backend(&mut cfg, backend.as_deref())?;
            let open = |path: &PathBuf, is_video: bool| -> Result<UploadedMedia> {
                let ct = content_type
                    .clone()
                    .or_else(|| guess_content_type(path, is_video));
                UploadedMedia::open(path, ct.as_deref())
            };
            let image = image.as_ref().map(|p| open(p, false)).transpose()?;
            let video = video.as_ref().map(|p| open(p, true)).transpose()?;

            let model = load_model(&cfg)?;
            let store = SqliteReportStore::open(&cfg.db_path)?;
            let mut intake = ReportIntake::from_config(&cfg, model, store);
            let form = ReportForm {
                title,
                category,
                description,
                location,
                reporter,
            };
            match intake.submit(&form, Upload::pick(image, video))? {
                IntakeOutcome::Created(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                IntakeOutcome::Discarded(reason) => {
                    println!("report discarded: {:?}", reason);
                }
                IntakeOutcome::Rejected(rejection) => {
                    return Err(anyhow!("report rejected: {}", rejection));
                }
            }
        }
    }
    Ok(())
}

fn apply_backend(cfg: &mut TriageConfig, backend: Option<&str>) -> Result<()> {
    if let Some(name) = backend {
        cfg.model.backend = name.parse::<BackendKind>()?;
    }
    Ok(())
}

fn load_model(cfg: &TriageConfig) -> Result<ModelHandle> {
    ModelHandle::load(cfg.model.backend, &cfg.model.path, cfg.model.input_size)
        .with_context(|| format!("load {} detector", cfg.model.backend))
}

fn guess_content_type(path: &std::path::Path, is_video: bool) -> Option<String> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    let ct = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "gif" if is_video => "video/gif",
        "gif" => "image/gif",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        _ => return None,
    };
    Some(ct.to_string())
}
