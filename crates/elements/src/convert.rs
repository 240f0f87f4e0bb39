use stream_io::{Buffer, PixelFormat, StageError, StreamCaps, Transform};

/// Pixel format conversion between two raw-batch formats. The conversion
/// itself runs in the external video post-processor; here it is a caps
/// relabel over the opaque payload.
pub struct VideoConvert {
    name: String,
    from: PixelFormat,
    to: PixelFormat,
}

impl VideoConvert {
    pub fn new(name: String, from: PixelFormat, to: PixelFormat) -> Self {
        Self { name, from, to }
    }
}

impl Transform for VideoConvert {
    fn name(&self) -> &str {
        &self.name
    }

    fn sink_caps(&self) -> StreamCaps {
        StreamCaps::raw_batch(self.from)
    }

    fn src_caps(&self) -> Option<StreamCaps> {
        Some(StreamCaps::raw_batch(self.to))
    }

    fn transform(&mut self, mut input: Buffer) -> Result<Vec<Buffer>, StageError> {
        input.meta.caps = StreamCaps::raw_batch(self.to);
        Ok(vec![input])
    }
}
