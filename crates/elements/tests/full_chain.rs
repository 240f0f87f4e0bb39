//! End-to-end run of the eleven-stage file-to-file chain.

use elements::StageSpec;
use pipeline_core::{FlowContext, LinkError, Pipeline, StageCreationError, TerminalOutcome};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use stream_io::{LifecycleState, PixelFormat};

fn temp(tag: &str, ext: &str) -> PathBuf {
    static N: AtomicU32 = AtomicU32::new(0);
    let n = N.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("fullchain-{tag}-{}-{n}.{ext}", std::process::id()))
}

struct Chain {
    input: PathBuf,
    output: PathBuf,
    config: PathBuf,
}

impl Chain {
    fn with_input(payload: &[u8]) -> Self {
        let input = temp("in", "mp4");
        let config = temp("cfg", "cfg");
        std::fs::write(&input, payload).unwrap();
        std::fs::write(&config, b"[engine]\nopaque = true\n").unwrap();
        Self {
            input,
            output: temp("out", "mp4"),
            config,
        }
    }

    fn assemble(&self, pipeline: &mut Pipeline) -> Result<(), LinkError> {
        let src = pipeline
            .add_stage(StageSpec::FileSrc {
                name: "file-source".into(),
                location: self.input.clone(),
                chunk_size: 4096,
            })
            .unwrap();
        let decode = pipeline
            .add_stage(StageSpec::VideoDecode {
                name: "decoder".into(),
                output_format: PixelFormat::NV12,
            })
            .unwrap();
        let mux = pipeline
            .add_stage(StageSpec::BatchMux {
                name: "stream-muxer".into(),
                batch_size: 2,
            })
            .unwrap();
        let infer = pipeline
            .add_stage(StageSpec::Infer {
                name: "primary-inference".into(),
                config_path: self.config.clone(),
            })
            .unwrap();
        let conv = pipeline
            .add_stage(StageSpec::VideoConvert {
                name: "video-converter".into(),
                from: PixelFormat::NV12,
                to: PixelFormat::RGBA8,
            })
            .unwrap();
        let osd = pipeline
            .add_stage(StageSpec::Osd {
                name: "on-screen-display".into(),
            })
            .unwrap();
        let conv2 = pipeline
            .add_stage(StageSpec::VideoConvert {
                name: "video-converter2".into(),
                from: PixelFormat::RGBA8,
                to: PixelFormat::NV12,
            })
            .unwrap();
        let encode = pipeline
            .add_stage(StageSpec::H264Encode {
                name: "h264-encoder".into(),
                bitrate_kbps: 4000,
            })
            .unwrap();
        let parse = pipeline
            .add_stage(StageSpec::StreamParse {
                name: "h264-parser".into(),
            })
            .unwrap();
        let container = pipeline
            .add_stage(StageSpec::ContainerMux {
                name: "mpeg-container".into(),
            })
            .unwrap();
        let sink = pipeline
            .add_stage(StageSpec::FileSink {
                name: "file-sink".into(),
                location: self.output.clone(),
            })
            .unwrap();

        pipeline.link(src, decode)?;
        // The decoder's output pad appears once its session is up, so this
        // link completes during the transition to READY.
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

    fn cleanup(&self) {
        std::fs::remove_file(&self.input).ok();
        std::fs::remove_file(&self.output).ok();
        std::fs::remove_file(&self.config).ok();
    }
}

#[test]
fn full_chain_reaches_eos_and_writes_output() {
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    let chain = Chain::with_input(&payload);
    let mut pipeline = Pipeline::new(FlowContext::acquire(), "full-chain");
    chain.assemble(&mut pipeline).unwrap();

    pipeline.set_state(LifecycleState::Playing).unwrap();
    assert_eq!(pipeline.run_until_terminal(), TerminalOutcome::EndOfStream);
    pipeline.teardown();
    assert_eq!(pipeline.current_state(), LifecycleState::Null);

    // Container framing adds an 8-byte header and a 12-byte trailer around
    // the opaque payload, which itself is carried through unchanged.
    let written = std::fs::read(&chain.output).unwrap();
    assert_eq!(written.len(), payload.len() + 20);
    assert_eq!(&written[8..8 + payload.len()], &payload[..]);

    let stats = pipeline.stats();
    assert_eq!(stats.stages["file-source"].items_in, 5);
    assert_eq!(stats.stages["stream-muxer"].items_in, 5);
    assert!(stats.buffers_delivered >= 4);

    chain.cleanup();
}

#[test]
fn plain_link_on_dynamic_pad_is_rejected() {
    let chain = Chain::with_input(b"data");
    let mut pipeline = Pipeline::new(FlowContext::acquire(), "dyn-pad");
    let decode = pipeline
        .add_stage(StageSpec::VideoDecode {
            name: "decoder".into(),
            output_format: PixelFormat::NV12,
        })
        .unwrap();
    let mux = pipeline
        .add_stage(StageSpec::BatchMux {
            name: "stream-muxer".into(),
            batch_size: 2,
        })
        .unwrap();
    match pipeline.link(decode, mux) {
        Err(LinkError::PadNotAvailable { stage, .. }) => assert_eq!(stage, "decoder"),
        other => panic!("expected pad-not-available, got {other:?}"),
    }
    chain.cleanup();
}

#[test]
fn missing_input_fails_before_any_transition() {
    let output = temp("untouched", "mp4");
    let mut pipeline = Pipeline::new(FlowContext::acquire(), "bad-input");
    let err = pipeline
        .add_stage(StageSpec::FileSrc {
            name: "file-source".into(),
            location: PathBuf::from("/no/such/input.mp4"),
            chunk_size: 4096,
        })
        .unwrap_err();
    match err {
        StageCreationError::Property { property, .. } => assert_eq!(property, "location"),
        other => panic!("expected property rejection, got {other:?}"),
    }
    assert_eq!(pipeline.current_state(), LifecycleState::Null);
    assert!(!output.exists());
}

#[test]
fn missing_inference_config_fails_creation() {
    let mut pipeline = Pipeline::new(FlowContext::acquire(), "bad-config");
    let err = pipeline
        .add_stage(StageSpec::Infer {
            name: "primary-inference".into(),
            config_path: PathBuf::from("/no/such/model.cfg"),
        })
        .unwrap_err();
    assert!(err.to_string().contains("config-file-path"));
    pipeline.teardown();
    assert_eq!(pipeline.current_state(), LifecycleState::Null);
}

#[test]
fn interrupted_run_still_tears_down() {
    let payload = vec![7u8; 64 * 1024];
    let chain = Chain::with_input(&payload);
    let mut pipeline = Pipeline::new(FlowContext::acquire(), "interrupted");
    chain.assemble(&mut pipeline).unwrap();

    pipeline.set_state(LifecycleState::Playing).unwrap();
    let token = pipeline.cancel_token();
    token.cancel();
    // Cancellation ends the wait without a terminal event.
    assert_eq!(pipeline.wait_terminal(None), None);
    pipeline.teardown();
    assert_eq!(pipeline.current_state(), LifecycleState::Null);

    chain.cleanup();
}
