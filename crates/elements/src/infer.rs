use pipeline_core::StageCreationError;
use std::path::PathBuf;
use stream_io::{Buffer, PixelFormat, StageError, StreamCaps, Transform};
use tracing::debug;

const FORMAT: PixelFormat = PixelFormat::NV12;

/// Runs batches through the external inference engine.
///
/// The engine configuration file is handed over verbatim; this element
/// validates that it exists and never looks inside it.
#[derive(Debug)]
pub struct Infer {
    name: String,
    config_path: PathBuf,
    engine_loaded: bool,
    batches: u64,
}

impl Infer {
    pub fn new(name: String, config_path: PathBuf) -> Result<Self, StageCreationError> {
        if !config_path.is_file() {
            return Err(StageCreationError::Property {
                stage: name,
                property: "config-file-path",
                reason: format!("`{}` does not exist", config_path.display()),
            });
        }
        Ok(Self {
            name,
            config_path,
            engine_loaded: false,
            batches: 0,
        })
    }
}

impl Transform for Infer {
    fn name(&self) -> &str {
        &self.name
    }

    fn sink_caps(&self) -> StreamCaps {
        StreamCaps::raw_batch(FORMAT)
    }

    fn src_caps(&self) -> Option<StreamCaps> {
        Some(StreamCaps::raw_batch(FORMAT))
    }

    fn prepare(&mut self) -> Result<(), StageError> {
        // The file may have vanished between construction and bring-up.
        std::fs::metadata(&self.config_path).map_err(|e| {
            StageError::Resource(format!(
                "engine config `{}`: {e}",
                self.config_path.display()
            ))
        })?;
        self.engine_loaded = true;
        self.batches = 0;
        debug!(stage = %self.name, config = %self.config_path.display(), "engine loaded");
        Ok(())
    }

    fn transform(&mut self, input: Buffer) -> Result<Vec<Buffer>, StageError> {
        if !self.engine_loaded {
            return Err(StageError::Resource("engine is not loaded".into()));
        }
        // Detection metadata stays inside the engine; frames pass through.
        self.batches += 1;
        Ok(vec![input])
    }

    fn release(&mut self) {
        self.engine_loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_io::BufferMeta;

    #[test]
    fn missing_config_is_rejected_at_construction() {
        let err = Infer::new(
            "primary-inference".into(),
            PathBuf::from("/no/such/model.cfg"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("config-file-path"));
    }

    #[test]
    fn batches_pass_through_untouched() {
        let cfg = std::env::temp_dir().join(format!("infer-cfg-{}.cfg", std::process::id()));
        std::fs::write(&cfg, b"opaque").unwrap();

        let mut infer = Infer::new("primary-inference".into(), cfg.clone()).unwrap();
        infer.prepare().unwrap();
        let input = Buffer::new(
            BufferMeta {
                seq: 0,
                pts_ns: 0,
                frames: 4,
                caps: StreamCaps::raw_batch(FORMAT),
            },
            vec![1, 2, 3],
        );
        let outs = infer.transform(input).unwrap();
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0].meta.frames, 4);
        assert_eq!(outs[0].data, vec![1, 2, 3]);

        std::fs::remove_file(cfg).ok();
    }
}
