//! Stub stages and buffer constructors for pipeline tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stream_io::{Buffer, BufferMeta, PixelFormat, Sink, Source, StageError, StreamCaps, Transform};

pub fn make_bytes_buffer(seq: u64, payload: &[u8]) -> Buffer {
    Buffer::new(
        BufferMeta {
            seq,
            pts_ns: 0,
            frames: 1,
            caps: StreamCaps::bytes(),
        },
        payload.to_vec(),
    )
}

pub fn make_raw_frame(seq: u64, fmt: PixelFormat, payload: &[u8]) -> Buffer {
    Buffer::new(
        BufferMeta {
            seq,
            pts_ns: seq * 33_333_333,
            frames: 1,
            caps: StreamCaps::raw(fmt),
        },
        payload.to_vec(),
    )
}

/// Source that yields a fixed list of buffers, then end-of-input.
pub struct ScriptedSource {
    name: String,
    caps: StreamCaps,
    items: VecDeque<Buffer>,
    opened: bool,
    fail_open: Option<String>,
}

impl ScriptedSource {
    pub fn new(name: &str, caps: StreamCaps, items: Vec<Buffer>) -> Self {
        Self {
            name: name.to_string(),
            caps,
            items: items.into(),
            opened: false,
            fail_open: None,
        }
    }

    /// A source whose open() always fails, for transition-error tests.
    pub fn failing_open(name: &str, reason: &str) -> Self {
        let mut src = Self::new(name, StreamCaps::bytes(), Vec::new());
        src.fail_open = Some(reason.to_string());
        src
    }
}

impl Source for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn src_caps(&self) -> Option<StreamCaps> {
        Some(self.caps)
    }

    fn open(&mut self) -> Result<(), StageError> {
        if let Some(reason) = &self.fail_open {
            return Err(StageError::Resource(reason.clone()));
        }
        self.opened = true;
        Ok(())
    }

    fn pull(&mut self) -> Result<Option<Buffer>, StageError> {
        if !self.opened {
            return Err(StageError::Resource("pull() before open()".into()));
        }
        Ok(self.items.pop_front())
    }

    fn close(&mut self) {
        self.opened = false;
    }
}

/// Source that never runs dry, for cancellation and timeout tests.
pub struct TickSource {
    name: String,
    caps: StreamCaps,
    seq: u64,
    interval: Duration,
}

impl TickSource {
    pub fn new(name: &str, interval: Duration) -> Self {
        Self {
            name: name.to_string(),
            caps: StreamCaps::bytes(),
            seq: 0,
            interval,
        }
    }
}

impl Source for TickSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn src_caps(&self) -> Option<StreamCaps> {
        Some(self.caps)
    }

    fn open(&mut self) -> Result<(), StageError> {
        self.seq = 0;
        Ok(())
    }

    fn pull(&mut self) -> Result<Option<Buffer>, StageError> {
        std::thread::sleep(self.interval);
        let buf = make_bytes_buffer(self.seq, &[0u8; 16]);
        self.seq += 1;
        Ok(Some(buf))
    }

    fn close(&mut self) {}
}

/// Shared observation handles for a [`CollectingSink`].
#[derive(Clone)]
pub struct SinkProbe {
    pub received: Arc<Mutex<Vec<Buffer>>>,
    pub finalized: Arc<AtomicBool>,
}

impl SinkProbe {
    pub fn count(&self) -> usize {
        self.received.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }
}

/// Sink that records every payload it receives.
pub struct CollectingSink {
    name: String,
    caps: StreamCaps,
    received: Arc<Mutex<Vec<Buffer>>>,
    finalized: Arc<AtomicBool>,
}

impl CollectingSink {
    pub fn new(name: &str) -> (Self, SinkProbe) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let finalized = Arc::new(AtomicBool::new(false));
        let probe = SinkProbe {
            received: received.clone(),
            finalized: finalized.clone(),
        };
        (
            Self {
                name: name.to_string(),
                caps: StreamCaps::any(),
                received,
                finalized,
            },
            probe,
        )
    }
}

impl Sink for CollectingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn sink_caps(&self) -> StreamCaps {
        self.caps
    }

    fn push(&mut self, input: Buffer) -> Result<(), StageError> {
        if let Ok(mut received) = self.received.lock() {
            received.push(input);
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), StageError> {
        self.finalized.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Transform that relabels caps. Can be configured to expose its output pad
/// only after prepare() (dynamic pad), or to fail on the nth buffer.
pub struct Relabel {
    name: String,
    sink: StreamCaps,
    src: StreamCaps,
    late_pad: bool,
    announced: bool,
    fail_at: Option<u64>,
    seen: u64,
}

impl Relabel {
    pub fn new(name: &str, sink: StreamCaps, src: StreamCaps) -> Self {
        Self {
            name: name.to_string(),
            sink,
            src,
            late_pad: false,
            announced: false,
            fail_at: None,
            seen: 0,
        }
    }

    /// Output pad announced only during prepare().
    pub fn late(name: &str, sink: StreamCaps, src: StreamCaps) -> Self {
        let mut t = Self::new(name, sink, src);
        t.late_pad = true;
        t
    }

    /// Fails when the nth buffer (1-based) arrives.
    pub fn failing_at(name: &str, sink: StreamCaps, src: StreamCaps, n: u64) -> Self {
        let mut t = Self::new(name, sink, src);
        t.fail_at = Some(n);
        t
    }
}

impl Transform for Relabel {
    fn name(&self) -> &str {
        &self.name
    }

    fn sink_caps(&self) -> StreamCaps {
        self.sink
    }

    fn src_caps(&self) -> Option<StreamCaps> {
        if self.late_pad && !self.announced {
            None
        } else {
            Some(self.src)
        }
    }

    fn prepare(&mut self) -> Result<(), StageError> {
        self.announced = true;
        Ok(())
    }

    fn transform(&mut self, mut input: Buffer) -> Result<Vec<Buffer>, StageError> {
        self.seen += 1;
        if self.fail_at == Some(self.seen) {
            return Err(StageError::Failed(format!(
                "scripted failure on buffer {}",
                self.seen
            )));
        }
        input.meta.caps = self.src;
        Ok(vec![input])
    }

    fn release(&mut self) {
        self.announced = false;
        self.seen = 0;
    }
}
