use stream_io::{Buffer, BufferMeta, PixelFormat, StageError, StreamCaps, Transform};
use tracing::debug;

/// Nominal 30 fps timestamping for decoded frames.
const FRAME_INTERVAL_NS: u64 = 33_333_333;

/// Models the hardware decode session: consumes the elementary byte stream
/// and emits raw frames, one per access unit.
///
/// The output pad only exists once the decode session is up, which is what
/// lets a downstream request-pad link complete late (pad-added) instead of
/// at assembly time.
pub struct VideoDecode {
    name: String,
    output_format: PixelFormat,
    session_open: bool,
    seq: u64,
}

impl VideoDecode {
    pub fn new(name: String, output_format: PixelFormat) -> Self {
        Self {
            name,
            output_format,
            session_open: false,
            seq: 0,
        }
    }
}

impl Transform for VideoDecode {
    fn name(&self) -> &str {
        &self.name
    }

    fn sink_caps(&self) -> StreamCaps {
        StreamCaps::bytes()
    }

    fn src_caps(&self) -> Option<StreamCaps> {
        if self.session_open {
            Some(StreamCaps::raw(self.output_format))
        } else {
            None
        }
    }

    fn prepare(&mut self) -> Result<(), StageError> {
        self.session_open = true;
        self.seq = 0;
        debug!(stage = %self.name, format = ?self.output_format, "decode session opened");
        Ok(())
    }

    fn transform(&mut self, input: Buffer) -> Result<Vec<Buffer>, StageError> {
        if !self.session_open {
            return Err(StageError::Resource("decode session is not open".into()));
        }
        let meta = BufferMeta {
            seq: self.seq,
            pts_ns: self.seq * FRAME_INTERVAL_NS,
            frames: 1,
            caps: StreamCaps::raw(self.output_format),
        };
        self.seq += 1;
        Ok(vec![Buffer::new(meta, input.data)])
    }

    fn release(&mut self) {
        self.session_open = false;
        self.seq = 0;
    }
}
