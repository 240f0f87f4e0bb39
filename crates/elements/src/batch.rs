use pipeline_core::StageCreationError;
use stream_io::{Buffer, BufferMeta, PixelFormat, StageError, StreamCaps, Transform};
use tracing::debug;

const FORMAT: PixelFormat = PixelFormat::NV12;

/// Groups raw frames into batches for the inference stage.
///
/// The sink side is a multiplexed request pad: several producers may feed
/// it, each through its own named pad. Frames are emitted as one
/// concatenated buffer once `batch_size` of them arrived; a partial batch
/// is flushed on end of stream.
pub struct BatchMux {
    name: String,
    batch_size: usize,
    pending: Vec<Buffer>,
    batches: u64,
}

impl BatchMux {
    pub fn new(name: String, batch_size: usize) -> Result<Self, StageCreationError> {
        if batch_size == 0 {
            return Err(StageCreationError::Property {
                stage: name,
                property: "batch-size",
                reason: "must be non-zero".into(),
            });
        }
        Ok(Self {
            name,
            batch_size,
            pending: Vec::new(),
            batches: 0,
        })
    }

    fn flush_batch(&mut self) -> Buffer {
        let frames = self.pending.len() as u32;
        let pts_ns = self.pending.first().map(|b| b.meta.pts_ns).unwrap_or(0);
        let mut data = Vec::new();
        for buf in self.pending.drain(..) {
            data.extend_from_slice(&buf.data);
        }
        let meta = BufferMeta {
            seq: self.batches,
            pts_ns,
            frames,
            caps: StreamCaps::raw_batch(FORMAT),
        };
        self.batches += 1;
        Buffer::new(meta, data)
    }
}

impl Transform for BatchMux {
    fn name(&self) -> &str {
        &self.name
    }

    fn sink_caps(&self) -> StreamCaps {
        StreamCaps::raw(FORMAT)
    }

    fn src_caps(&self) -> Option<StreamCaps> {
        Some(StreamCaps::raw_batch(FORMAT))
    }

    fn multiplexing(&self) -> bool {
        true
    }

    fn transform(&mut self, input: Buffer) -> Result<Vec<Buffer>, StageError> {
        self.pending.push(input);
        if self.pending.len() >= self.batch_size {
            Ok(vec![self.flush_batch()])
        } else {
            Ok(Vec::new())
        }
    }

    fn drain(&mut self) -> Result<Vec<Buffer>, StageError> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        debug!(stage = %self.name, frames = self.pending.len(), "flushing partial batch");
        Ok(vec![self.flush_batch()])
    }

    fn release(&mut self) {
        self.pending.clear();
        self.batches = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testsupport::make_raw_frame;

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(BatchMux::new("stream-muxer".into(), 0).is_err());
    }

    #[test]
    fn groups_frames_and_flushes_remainder() {
        let mut mux = BatchMux::new("stream-muxer".into(), 3).unwrap();
        let mut emitted = Vec::new();
        for seq in 0..7 {
            let outs = mux
                .transform(make_raw_frame(seq, FORMAT, &[seq as u8; 4]))
                .unwrap();
            emitted.extend(outs);
        }
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].meta.frames, 3);
        assert_eq!(emitted[0].meta.caps, StreamCaps::raw_batch(FORMAT));
        assert_eq!(emitted[0].data.len(), 12);

        let tail = mux.drain().unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].meta.frames, 1);

        // Nothing left after the flush.
        assert!(mux.drain().unwrap().is_empty());
    }

    #[test]
    fn batch_keeps_first_frame_timestamp() {
        let mut mux = BatchMux::new("stream-muxer".into(), 2).unwrap();
        assert!(mux.transform(make_raw_frame(4, FORMAT, b"a")).unwrap().is_empty());
        let out = mux.transform(make_raw_frame(5, FORMAT, b"b")).unwrap();
        assert_eq!(out[0].meta.pts_ns, 4 * 33_333_333);
    }
}
