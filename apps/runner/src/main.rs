//! Flowline production runner
//!
//! Assembles the fixed file-to-file chain (read → decode → batch → infer →
//! overlay → convert → encode → parse → container → write), brings it to
//! PLAYING and blocks until the stream ends or a stage fails. All heavy
//! lifting happens inside the stage elements; this binary only wires them.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use elements::StageSpec;
use pipeline_core::{FlowContext, Pipeline, PipelineStats, TerminalOutcome};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use stream_io::{LifecycleState, PixelFormat};
use tracing::info;

mod settings;
use settings::RunnerSettings;

#[derive(Parser, Debug)]
#[command(
    name = "flowline",
    version,
    about = "Process a video file through the decode/inference/encode pipeline"
)]
struct Args {
    /// Path to the input video file.
    #[arg(long)]
    input: PathBuf,

    /// Path to the output video file.
    #[arg(long)]
    output: PathBuf,

    /// Path to the inference engine configuration file (forwarded verbatim).
    #[arg(long)]
    config: PathBuf,

    /// Optional TOML file with pipeline tuning settings.
    #[arg(long)]
    settings: Option<PathBuf>,
}

const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("flowline: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let settings = match &args.settings {
        Some(path) => RunnerSettings::from_file(path)?,
        None => RunnerSettings::default(),
    };

    let ctx = FlowContext::acquire();
    let mut pipeline = Pipeline::new(ctx, "flowline");
    pipeline.set_link_capacity(settings.links.capacity);
    assemble(&mut pipeline, &args, &settings)?;

    let cancel = pipeline.cancel_token();
    ctrlc::set_handler(move || cancel.cancel()).context("failed to install signal handler")?;

    info!(input = %args.input.display(), output = %args.output.display(), "starting pipeline");
    let started = Instant::now();
    pipeline
        .set_state(LifecycleState::Playing)
        .context("pipeline failed to start")?;

    let outcome = pipeline.wait_terminal(None);
    pipeline.teardown();

    if settings.report.enable_summary {
        print_summary(&pipeline.stats(), started.elapsed().as_secs_f64());
    }

    match outcome {
        Some(TerminalOutcome::EndOfStream) => {
            info!(elapsed_s = started.elapsed().as_secs_f64(), "stream complete");
            Ok(ExitCode::SUCCESS)
        }
        Some(TerminalOutcome::Error { stage, detail }) => {
            Err(anyhow!("stage `{stage}` failed: {detail}"))
        }
        None => {
            info!("interrupted, pipeline torn down");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
    }
}

/// Build and wire the eleven-stage chain. Every link is static except
/// decoder → batch muxer, whose upstream pad appears when the decode
/// session comes up, so it goes through the deferred-link path.
fn assemble(pipeline: &mut Pipeline, args: &Args, settings: &RunnerSettings) -> Result<()> {
    let src = pipeline.add_stage(StageSpec::FileSrc {
        name: "file-source".into(),
        location: args.input.clone(),
        chunk_size: settings.io.chunk_size,
    })?;
    let decode = pipeline.add_stage(StageSpec::VideoDecode {
        name: "decoder".into(),
        output_format: PixelFormat::NV12,
    })?;
    let mux = pipeline.add_stage(StageSpec::BatchMux {
        name: "stream-muxer".into(),
        batch_size: settings.batch.size,
    })?;
    let infer = pipeline.add_stage(StageSpec::Infer {
        name: "primary-inference".into(),
        config_path: args.config.clone(),
    })?;
    let conv = pipeline.add_stage(StageSpec::VideoConvert {
        name: "video-converter".into(),
        from: PixelFormat::NV12,
        to: PixelFormat::RGBA8,
    })?;
    let osd = pipeline.add_stage(StageSpec::Osd {
        name: "on-screen-display".into(),
    })?;
    let conv2 = pipeline.add_stage(StageSpec::VideoConvert {
        name: "video-converter2".into(),
        from: PixelFormat::RGBA8,
        to: PixelFormat::NV12,
    })?;
    let encode = pipeline.add_stage(StageSpec::H264Encode {
        name: "h264-encoder".into(),
        bitrate_kbps: settings.encoder.bitrate_kbps,
    })?;
    let parse = pipeline.add_stage(StageSpec::StreamParse {
        name: "h264-parser".into(),
    })?;
    let container = pipeline.add_stage(StageSpec::ContainerMux {
        name: "mpeg-container".into(),
    })?;
    let sink = pipeline.add_stage(StageSpec::FileSink {
        name: "file-sink".into(),
        location: args.output.clone(),
    })?;

    pipeline.link(src, decode)?;
    pipeline.link_explicit(decode, "src", mux, "sink_0")?;
    pipeline.link(mux, infer)?;
    pipeline.link(infer, conv)?;
    pipeline.link(conv, osd)?;
    pipeline.link(osd, conv2)?;
    pipeline.link(conv2, encode)?;
    pipeline.link(encode, parse)?;
    pipeline.link(parse, container)?;
    pipeline.link(container, sink)?;
    Ok(())
}

fn print_summary(stats: &PipelineStats, elapsed_s: f64) {
    println!();
    println!("pipeline summary");
    println!("----------------");
    println!("  elapsed:   {elapsed_s:.2}s");
    println!("  delivered: {} buffers to the sink", stats.buffers_delivered);
    let mut names: Vec<&String> = stats.stages.keys().collect();
    names.sort();
    for name in names {
        let m = &stats.stages[name];
        println!(
            "  {name}: in={} out={} avg={:.2}ms min={:.2}ms max={:.2}ms{}",
            m.items_in,
            m.items_out,
            m.average_latency_ms(),
            m.min_latency_ms(),
            m.max_latency_ms(),
            if m.failures > 0 {
                format!(" failures={}", m.failures)
            } else {
                String::new()
            },
        );
    }
}
