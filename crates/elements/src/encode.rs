use pipeline_core::StageCreationError;
use stream_io::{Buffer, BufferMeta, Codec, PixelFormat, StageError, StreamCaps, Transform};
use tracing::debug;

const INPUT_FORMAT: PixelFormat = PixelFormat::NV12;

/// Models the hardware H.264 encoder session: raw batches in, one encoded
/// access unit out per batch.
pub struct H264Encode {
    name: String,
    bitrate_kbps: u32,
    session_open: bool,
    seq: u64,
}

impl H264Encode {
    pub fn new(name: String, bitrate_kbps: u32) -> Result<Self, StageCreationError> {
        if bitrate_kbps == 0 {
            return Err(StageCreationError::Property {
                stage: name,
                property: "bitrate",
                reason: "must be non-zero".into(),
            });
        }
        Ok(Self {
            name,
            bitrate_kbps,
            session_open: false,
            seq: 0,
        })
    }
}

impl Transform for H264Encode {
    fn name(&self) -> &str {
        &self.name
    }

    fn sink_caps(&self) -> StreamCaps {
        StreamCaps::raw_batch(INPUT_FORMAT)
    }

    fn src_caps(&self) -> Option<StreamCaps> {
        Some(StreamCaps::encoded(Codec::H264))
    }

    fn prepare(&mut self) -> Result<(), StageError> {
        self.session_open = true;
        self.seq = 0;
        debug!(stage = %self.name, bitrate_kbps = self.bitrate_kbps, "encoder session opened");
        Ok(())
    }

    fn transform(&mut self, input: Buffer) -> Result<Vec<Buffer>, StageError> {
        if !self.session_open {
            return Err(StageError::Resource("encoder session is not open".into()));
        }
        let meta = BufferMeta {
            seq: self.seq,
            pts_ns: input.meta.pts_ns,
            frames: input.meta.frames,
            caps: StreamCaps::encoded(Codec::H264),
        };
        self.seq += 1;
        Ok(vec![Buffer::new(meta, input.data)])
    }

    fn release(&mut self) {
        self.session_open = false;
        self.seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_bitrate_is_rejected() {
        assert!(H264Encode::new("h264-encoder".into(), 0).is_err());
    }

    #[test]
    fn batches_become_access_units() {
        let mut enc = H264Encode::new("h264-encoder".into(), 4000).unwrap();
        enc.prepare().unwrap();
        let input = Buffer::new(
            BufferMeta {
                seq: 3,
                pts_ns: 99,
                frames: 4,
                caps: StreamCaps::raw_batch(INPUT_FORMAT),
            },
            vec![5; 8],
        );
        let outs = enc.transform(input).unwrap();
        assert_eq!(outs[0].meta.caps, StreamCaps::encoded(Codec::H264));
        assert_eq!(outs[0].meta.pts_ns, 99);
        assert_eq!(outs[0].meta.frames, 4);
        assert_eq!(outs[0].meta.seq, 0);
    }

    #[test]
    fn encode_before_prepare_is_an_error() {
        let mut enc = H264Encode::new("h264-encoder".into(), 4000).unwrap();
        let input = Buffer::new(
            BufferMeta {
                seq: 0,
                pts_ns: 0,
                frames: 1,
                caps: StreamCaps::raw_batch(INPUT_FORMAT),
            },
            vec![],
        );
        assert!(enc.transform(input).is_err());
    }
}
