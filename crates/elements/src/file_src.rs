use pipeline_core::StageCreationError;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use stream_io::{Buffer, BufferMeta, Source, StageError, StreamCaps};
use tracing::debug;

/// Reads the input file as an opaque byte stream, one fixed-size chunk per
/// buffer.
#[derive(Debug)]
pub struct FileSrc {
    name: String,
    location: PathBuf,
    chunk_size: usize,
    file: Option<File>,
    seq: u64,
}

impl FileSrc {
    pub fn new(name: String, location: PathBuf, chunk_size: usize) -> Result<Self, StageCreationError> {
        if chunk_size == 0 {
            return Err(StageCreationError::Property {
                stage: name,
                property: "chunk-size",
                reason: "must be non-zero".into(),
            });
        }
        if !location.is_file() {
            return Err(StageCreationError::Property {
                stage: name,
                property: "location",
                reason: format!("`{}` is not a readable file", location.display()),
            });
        }
        Ok(Self {
            name,
            location,
            chunk_size,
            file: None,
            seq: 0,
        })
    }
}

impl Source for FileSrc {
    fn name(&self) -> &str {
        &self.name
    }

    fn src_caps(&self) -> Option<StreamCaps> {
        Some(StreamCaps::bytes())
    }

    fn open(&mut self) -> Result<(), StageError> {
        self.file = Some(File::open(&self.location)?);
        self.seq = 0;
        Ok(())
    }

    fn pull(&mut self) -> Result<Option<Buffer>, StageError> {
        let Some(file) = self.file.as_mut() else {
            return Err(StageError::Resource("pull() before open()".into()));
        };
        let mut data = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < data.len() {
            let n = file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            debug!(stage = %self.name, chunks = self.seq, "input exhausted");
            return Ok(None);
        }
        data.truncate(filled);
        let meta = BufferMeta {
            seq: self.seq,
            pts_ns: 0,
            frames: 1,
            caps: StreamCaps::bytes(),
        };
        self.seq += 1;
        Ok(Some(Buffer::new(meta, data)))
    }

    fn close(&mut self) {
        self.file = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn temp_file(tag: &str, content: &[u8]) -> PathBuf {
        static N: AtomicU32 = AtomicU32::new(0);
        let n = N.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "filesrc-{tag}-{}-{n}.bin",
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn missing_file_is_rejected_at_construction() {
        let err = FileSrc::new(
            "file-source".into(),
            PathBuf::from("/definitely/not/here.mp4"),
            DEFAULT_CHUNK,
        )
        .unwrap_err();
        assert!(err.to_string().contains("location"));
    }

    const DEFAULT_CHUNK: usize = 8;

    #[test]
    fn reads_whole_file_in_chunks() {
        let path = temp_file("chunks", b"0123456789abcdefxyz");
        let mut src = FileSrc::new("file-source".into(), path.clone(), DEFAULT_CHUNK).unwrap();
        src.open().unwrap();

        let mut total = Vec::new();
        let mut chunks = 0;
        while let Some(buf) = src.pull().unwrap() {
            assert_eq!(buf.meta.caps, StreamCaps::bytes());
            assert_eq!(buf.meta.seq, chunks);
            total.extend_from_slice(&buf.data);
            chunks += 1;
        }
        assert_eq!(total, b"0123456789abcdefxyz");
        assert_eq!(chunks, 3);

        src.close();
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn pull_before_open_is_an_error() {
        let path = temp_file("noopen", b"x");
        let mut src = FileSrc::new("file-source".into(), path.clone(), DEFAULT_CHUNK).unwrap();
        assert!(src.pull().is_err());
        std::fs::remove_file(path).ok();
    }
}
