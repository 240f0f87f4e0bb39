//! Element library for the file-to-file inference pipeline.
//!
//! Every element models one stage of the chain: correct capability
//! negotiation, batching/framing, resource lifecycle and error reporting.
//! Payloads are carried opaquely; the decode/inference/render/encode
//! algorithms themselves belong to the external engines these elements
//! stand in for.

mod batch;
mod convert;
mod decode;
mod encode;
mod file_sink;
mod file_src;
mod infer;
mod muxer;
mod osd;
mod parse;

pub use batch::BatchMux;
pub use convert::VideoConvert;
pub use decode::VideoDecode;
pub use encode::H264Encode;
pub use file_sink::FileSink;
pub use file_src::FileSrc;
pub use infer::Infer;
pub use muxer::ContainerMux;
pub use osd::Osd;
pub use parse::StreamParse;

use pipeline_core::{ElementSpec, StageCreationError};
use std::path::PathBuf;
use stream_io::{PixelFormat, StageBox};

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_BATCH_SIZE: usize = 4;
pub const DEFAULT_BITRATE_KBPS: u32 = 4000;

/// Typed configuration for every element this library provides.
///
/// The option set per element is closed; an invalid value is rejected at
/// construction time, before the stage joins a pipeline.
#[derive(Debug, Clone)]
pub enum StageSpec {
    FileSrc {
        name: String,
        location: PathBuf,
        chunk_size: usize,
    },
    VideoDecode {
        name: String,
        output_format: PixelFormat,
    },
    BatchMux {
        name: String,
        batch_size: usize,
    },
    Infer {
        name: String,
        config_path: PathBuf,
    },
    Osd {
        name: String,
    },
    VideoConvert {
        name: String,
        from: PixelFormat,
        to: PixelFormat,
    },
    H264Encode {
        name: String,
        bitrate_kbps: u32,
    },
    StreamParse {
        name: String,
    },
    ContainerMux {
        name: String,
    },
    FileSink {
        name: String,
        location: PathBuf,
    },
}

impl ElementSpec for StageSpec {
    fn type_name(&self) -> &'static str {
        match self {
            StageSpec::FileSrc { .. } => "file-src",
            StageSpec::VideoDecode { .. } => "video-decode",
            StageSpec::BatchMux { .. } => "batch-mux",
            StageSpec::Infer { .. } => "infer",
            StageSpec::Osd { .. } => "osd",
            StageSpec::VideoConvert { .. } => "video-convert",
            StageSpec::H264Encode { .. } => "h264-encode",
            StageSpec::StreamParse { .. } => "stream-parse",
            StageSpec::ContainerMux { .. } => "container-mux",
            StageSpec::FileSink { .. } => "file-sink",
        }
    }

    fn instantiate(self) -> Result<StageBox, StageCreationError> {
        match self {
            StageSpec::FileSrc {
                name,
                location,
                chunk_size,
            } => Ok(StageBox::Source(Box::new(FileSrc::new(
                name, location, chunk_size,
            )?))),
            StageSpec::VideoDecode {
                name,
                output_format,
            } => Ok(StageBox::Transform(Box::new(VideoDecode::new(
                name,
                output_format,
            )))),
            StageSpec::BatchMux { name, batch_size } => Ok(StageBox::Transform(Box::new(
                BatchMux::new(name, batch_size)?,
            ))),
            StageSpec::Infer { name, config_path } => {
                Ok(StageBox::Transform(Box::new(Infer::new(name, config_path)?)))
            }
            StageSpec::Osd { name } => Ok(StageBox::Transform(Box::new(Osd::new(name)))),
            StageSpec::VideoConvert { name, from, to } => {
                Ok(StageBox::Transform(Box::new(VideoConvert::new(name, from, to))))
            }
            StageSpec::H264Encode { name, bitrate_kbps } => Ok(StageBox::Transform(Box::new(
                H264Encode::new(name, bitrate_kbps)?,
            ))),
            StageSpec::StreamParse { name } => {
                Ok(StageBox::Transform(Box::new(StreamParse::new(name))))
            }
            StageSpec::ContainerMux { name } => {
                Ok(StageBox::Transform(Box::new(ContainerMux::new(name))))
            }
            StageSpec::FileSink { name, location } => {
                Ok(StageBox::Sink(Box::new(FileSink::new(name, location))))
            }
        }
    }
}
