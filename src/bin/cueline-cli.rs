use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use cueline::backends::{WhisperEngine, WhisperVadDetector};
use cueline::opts::Opts;
use cueline::output_type::OutputType;
use cueline::pipeline::{Pipeline, RunStatus, encode_cues};

fn main() -> Result<ExitCode> {
    cueline::logging::init();
    let params = Params::parse();

    let opts = Opts {
        language: params.language.clone(),
        pad_ms: params.pad_ms,
        silence_merge_ms: params.silence_merge_ms,
        workers: params.workers,
        force_redetect: params.force_redetect,
        output_type: params.output_type,
    };

    let detector = WhisperVadDetector::new(&params.vad_model_path)?;
    let mut pipeline = Pipeline::new(detector);
    let prepared = pipeline.prepare(&params.input, &params.work_dir, &opts)?;

    let stats = if opts.workers > 1 {
        let model_path = params.model_path.clone();
        prepared.transcribe_pool(|| WhisperEngine::new(&model_path), &opts)?
    } else {
        let mut engine = WhisperEngine::new(&params.model_path)?;
        prepared.transcribe(&mut engine, &opts)?
    };

    let cues = prepared.merge()?;
    let output_path = params.output_path();
    let out = File::create(&output_path)
        .with_context(|| format!("failed to create '{}'", output_path.display()))?;
    encode_cues(&cues, opts.output_type, out)?;

    let summary = prepared.summarize(stats, cues.len());
    eprintln!(
        "{}: {} slices ({} transcribed, {} reused, {} failed), {} cues -> {}",
        params.input.display(),
        summary.total_slices,
        summary.transcribed,
        summary.reused,
        summary.failed,
        summary.cues,
        output_path.display(),
    );

    match summary.status() {
        RunStatus::Success => Ok(ExitCode::SUCCESS),
        RunStatus::PartialFailure => {
            eprintln!(
                "{} slice(s) failed; re-run the same command to retry only those",
                summary.failed
            );
            Ok(ExitCode::from(2))
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "cueline")]
#[command(about = "Generate time-aligned subtitles from audio or video")]
struct Params {
    /// Input media file (any container/codec the demuxer supports).
    input: PathBuf,

    #[arg(short = 'm', long = "model")]
    model_path: String,

    #[arg(short = 'v', long = "vad-model")]
    vad_model_path: String,

    /// Language hint (e.g. "en", "ja"). Auto-detected when omitted.
    #[arg(short = 'l', long = "language")]
    language: Option<String>,

    /// Padding added around each speech interval, in milliseconds.
    #[arg(long = "pad-ms", default_value_t = 300)]
    pad_ms: u64,

    /// Silences shorter than this are merged into one slice, in milliseconds.
    #[arg(long = "silence-merge-ms", default_value_t = 2_000)]
    silence_merge_ms: u64,

    /// Transcription workers. Above 1, one model instance loads per worker.
    #[arg(long = "workers", default_value_t = 1)]
    workers: usize,

    /// Ignore the cached slice plan and re-run speech detection.
    #[arg(long = "force-redetect", default_value_t = false)]
    force_redetect: bool,

    #[arg(
        short = 'o',
        long = "output-type",
        value_enum,
        default_value_t = OutputType::Srt
    )]
    output_type: OutputType,

    /// Output subtitle path. Defaults to the input name with the format's extension.
    #[arg(long = "output")]
    output: Option<PathBuf>,

    /// Root directory for per-input working state.
    #[arg(long = "work-dir", default_value = "cueline-work")]
    work_dir: PathBuf,
}

impl Params {
    fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.input.with_extension(self.output_type.extension()))
    }
}
