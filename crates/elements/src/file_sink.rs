use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use stream_io::{Buffer, Sink, StageError, StreamCaps};
use tracing::debug;

/// Writes every incoming payload to the output file. The file is created
/// when the stage comes up (the parent directory must exist) and flushed on
/// finalize; an interrupted run leaves a truncated file behind.
pub struct FileSink {
    name: String,
    location: PathBuf,
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
    finalized: bool,
}

impl FileSink {
    pub fn new(name: String, location: PathBuf) -> Self {
        Self {
            name,
            location,
            writer: None,
            bytes_written: 0,
            finalized: false,
        }
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn sink_caps(&self) -> StreamCaps {
        StreamCaps::any()
    }

    fn prepare(&mut self) -> Result<(), StageError> {
        let file = File::create(&self.location).map_err(|e| {
            StageError::Resource(format!("cannot create `{}`: {e}", self.location.display()))
        })?;
        self.writer = Some(BufWriter::new(file));
        self.bytes_written = 0;
        self.finalized = false;
        Ok(())
    }

    fn push(&mut self, input: Buffer) -> Result<(), StageError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(StageError::Resource("push() before prepare()".into()));
        };
        writer.write_all(&input.data)?;
        self.bytes_written += input.data.len() as u64;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), StageError> {
        if self.finalized {
            return Ok(());
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        self.finalized = true;
        debug!(stage = %self.name, bytes = self.bytes_written, "output finalized");
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}
