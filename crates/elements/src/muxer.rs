use stream_io::{Buffer, BufferMeta, Codec, StageError, StreamCaps, Transform};
use tracing::debug;

/// Container signature written ahead of the first sample.
const HEADER_MAGIC: &[u8; 8] = b"FLCN\x00\x01\x00\x00";
const TRAILER_MAGIC: &[u8; 4] = b"FLTR";

/// Wraps the encoded stream into the output container: header before the
/// first sample, samples relabeled as container data, index trailer on
/// drain. The sample payload itself is opaque.
pub struct ContainerMux {
    name: String,
    wrote_header: bool,
    samples: u64,
    seq: u64,
}

impl ContainerMux {
    pub fn new(name: String) -> Self {
        Self {
            name,
            wrote_header: false,
            samples: 0,
            seq: 0,
        }
    }

    fn container_buffer(&mut self, pts_ns: u64, frames: u32, data: Vec<u8>) -> Buffer {
        let meta = BufferMeta {
            seq: self.seq,
            pts_ns,
            frames,
            caps: StreamCaps::container(),
        };
        self.seq += 1;
        Buffer::new(meta, data)
    }
}

impl Transform for ContainerMux {
    fn name(&self) -> &str {
        &self.name
    }

    fn sink_caps(&self) -> StreamCaps {
        StreamCaps::encoded(Codec::H264)
    }

    fn src_caps(&self) -> Option<StreamCaps> {
        Some(StreamCaps::container())
    }

    fn transform(&mut self, input: Buffer) -> Result<Vec<Buffer>, StageError> {
        let mut outs = Vec::with_capacity(2);
        if !self.wrote_header {
            outs.push(self.container_buffer(input.meta.pts_ns, 0, HEADER_MAGIC.to_vec()));
            self.wrote_header = true;
        }
        self.samples += 1;
        let pts_ns = input.meta.pts_ns;
        let frames = input.meta.frames;
        outs.push(self.container_buffer(pts_ns, frames, input.data));
        Ok(outs)
    }

    fn drain(&mut self) -> Result<Vec<Buffer>, StageError> {
        if !self.wrote_header {
            // Empty stream: no header, no trailer.
            return Ok(Vec::new());
        }
        debug!(stage = %self.name, samples = self.samples, "writing container trailer");
        let mut data = TRAILER_MAGIC.to_vec();
        data.extend_from_slice(&self.samples.to_le_bytes());
        Ok(vec![self.container_buffer(0, 0, data)])
    }

    fn release(&mut self) {
        self.wrote_header = false;
        self.samples = 0;
        self.seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pts_ns: u64, payload: &[u8]) -> Buffer {
        Buffer::new(
            BufferMeta {
                seq: 0,
                pts_ns,
                frames: 1,
                caps: StreamCaps::encoded(Codec::H264),
            },
            payload.to_vec(),
        )
    }

    #[test]
    fn header_precedes_first_sample_only() {
        let mut mux = ContainerMux::new("mpeg-container".into());
        let first = mux.transform(sample(0, b"s0")).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].data, HEADER_MAGIC.to_vec());
        assert_eq!(first[1].data, b"s0");
        assert_eq!(first[1].meta.caps, StreamCaps::container());

        let second = mux.transform(sample(1, b"s1")).unwrap();
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn trailer_records_sample_count() {
        let mut mux = ContainerMux::new("mpeg-container".into());
        mux.transform(sample(0, b"a")).unwrap();
        mux.transform(sample(1, b"b")).unwrap();
        let tail = mux.drain().unwrap();
        assert_eq!(tail.len(), 1);
        assert!(tail[0].data.starts_with(TRAILER_MAGIC));
        assert_eq!(tail[0].data[4..12], 2u64.to_le_bytes());
    }

    #[test]
    fn empty_stream_produces_nothing() {
        let mut mux = ContainerMux::new("mpeg-container".into());
        assert!(mux.drain().unwrap().is_empty());
    }
}
