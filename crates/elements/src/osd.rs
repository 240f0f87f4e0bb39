use stream_io::{Buffer, PixelFormat, StageError, StreamCaps, Transform};

const FORMAT: PixelFormat = PixelFormat::RGBA8;

/// On-screen display stage: composites detection overlays onto RGBA frames.
/// Drawing happens in the external renderer; the frame geometry and caps
/// are unchanged, so this element is a counted passthrough.
pub struct Osd {
    name: String,
    frames_marked: u64,
}

impl Osd {
    pub fn new(name: String) -> Self {
        Self {
            name,
            frames_marked: 0,
        }
    }
}

impl Transform for Osd {
    fn name(&self) -> &str {
        &self.name
    }

    fn sink_caps(&self) -> StreamCaps {
        StreamCaps::raw_batch(FORMAT)
    }

    fn src_caps(&self) -> Option<StreamCaps> {
        Some(StreamCaps::raw_batch(FORMAT))
    }

    fn transform(&mut self, input: Buffer) -> Result<Vec<Buffer>, StageError> {
        self.frames_marked += input.meta.frames as u64;
        Ok(vec![input])
    }

    fn release(&mut self) {
        self.frames_marked = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_io::BufferMeta;

    #[test]
    fn keeps_caps_and_payload() {
        let mut osd = Osd::new("on-screen-display".into());
        let input = Buffer::new(
            BufferMeta {
                seq: 7,
                pts_ns: 42,
                frames: 2,
                caps: StreamCaps::raw_batch(FORMAT),
            },
            vec![9, 9],
        );
        let outs = osd.transform(input).unwrap();
        assert_eq!(outs[0].meta.caps, StreamCaps::raw_batch(FORMAT));
        assert_eq!(outs[0].meta.seq, 7);
        assert_eq!(osd.frames_marked, 2);
    }
}
