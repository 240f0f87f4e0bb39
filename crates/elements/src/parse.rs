use stream_io::{Buffer, Codec, StageError, StreamCaps, Transform};

/// Re-frames the encoded stream for the container muxer. Alignment happens
/// in the external parser; access units and caps pass through with a
/// renumbered sequence.
pub struct StreamParse {
    name: String,
    units: u64,
}

impl StreamParse {
    pub fn new(name: String) -> Self {
        Self { name, units: 0 }
    }
}

impl Transform for StreamParse {
    fn name(&self) -> &str {
        &self.name
    }

    fn sink_caps(&self) -> StreamCaps {
        StreamCaps::encoded(Codec::H264)
    }

    fn src_caps(&self) -> Option<StreamCaps> {
        Some(StreamCaps::encoded(Codec::H264))
    }

    fn transform(&mut self, mut input: Buffer) -> Result<Vec<Buffer>, StageError> {
        input.meta.seq = self.units;
        self.units += 1;
        Ok(vec![input])
    }

    fn release(&mut self) {
        self.units = 0;
    }
}
