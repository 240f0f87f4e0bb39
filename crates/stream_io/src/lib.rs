use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    NV12,
    I420,
    RGBA8,
    BGRA8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    H264,
    H265,
}

/// Body of a capability descriptor. `Any` is the wildcard and is compatible
/// with every other kind (used by sinks that accept arbitrary byte streams).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Bytes,
    Raw(PixelFormat),
    RawBatch(PixelFormat),
    Encoded(Codec),
    Container,
    Any,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamCaps {
    pub kind: MediaKind,
}

impl StreamCaps {
    pub const fn new(kind: MediaKind) -> Self {
        Self { kind }
    }

    pub const fn bytes() -> Self {
        Self::new(MediaKind::Bytes)
    }

    pub const fn raw(fmt: PixelFormat) -> Self {
        Self::new(MediaKind::Raw(fmt))
    }

    pub const fn raw_batch(fmt: PixelFormat) -> Self {
        Self::new(MediaKind::RawBatch(fmt))
    }

    pub const fn encoded(codec: Codec) -> Self {
        Self::new(MediaKind::Encoded(codec))
    }

    pub const fn container() -> Self {
        Self::new(MediaKind::Container)
    }

    pub const fn any() -> Self {
        Self::new(MediaKind::Any)
    }

    /// A link may only connect ports whose descriptors are compatible.
    pub fn compatible(&self, other: &StreamCaps) -> bool {
        self.kind == MediaKind::Any || other.kind == MediaKind::Any || self.kind == other.kind
    }
}

#[derive(Clone, Debug)]
pub struct BufferMeta {
    pub seq: u64,
    pub pts_ns: u64,
    /// Number of frames carried by this buffer (> 1 only after batching).
    pub frames: u32,
    pub caps: StreamCaps,
}

/// The opaque data unit handed off across links. Ownership moves downstream;
/// no stage keeps a reference after pushing a buffer to its output port.
#[derive(Clone, Debug)]
pub struct Buffer {
    pub meta: BufferMeta,
    pub data: Vec<u8>,
}

impl Buffer {
    pub fn new(meta: BufferMeta, data: Vec<u8>) -> Self {
        Self { meta, data }
    }
}

/// What actually travels on a link. `Eos` is the in-band end marker every
/// stage forwards after draining its own pending output.
#[derive(Clone, Debug)]
pub enum StreamItem {
    Payload(Buffer),
    Eos,
}

/// Collective lifecycle state of a stage or a whole pipeline, ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Null,
    Ready,
    Paused,
    Playing,
}

impl LifecycleState {
    pub fn ascend(self) -> Option<LifecycleState> {
        match self {
            LifecycleState::Null => Some(LifecycleState::Ready),
            LifecycleState::Ready => Some(LifecycleState::Paused),
            LifecycleState::Paused => Some(LifecycleState::Playing),
            LifecycleState::Playing => None,
        }
    }

    pub fn descend(self) -> Option<LifecycleState> {
        match self {
            LifecycleState::Null => None,
            LifecycleState::Ready => Some(LifecycleState::Null),
            LifecycleState::Paused => Some(LifecycleState::Ready),
            LifecycleState::Playing => Some(LifecycleState::Paused),
        }
    }
}

/// Runtime failure inside a stage implementation.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{0}")]
    Failed(String),
    #[error("resource unavailable: {0}")]
    Resource(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A stage that produces buffers from outside the pipeline (file, device).
pub trait Source: Send {
    fn name(&self) -> &str;
    /// Advertised output caps. `None` until the stage has negotiated.
    fn src_caps(&self) -> Option<StreamCaps>;
    fn open(&mut self) -> Result<(), StageError>;
    /// `Ok(None)` signals end of input.
    fn pull(&mut self) -> Result<Option<Buffer>, StageError>;
    fn close(&mut self);
}

/// A stage with one input port and one output port. A single `transform`
/// call may emit zero buffers (batching) or several (header insertion).
pub trait Transform: Send {
    fn name(&self) -> &str;
    fn sink_caps(&self) -> StreamCaps;
    /// `None` while the output pad is not yet available (dynamic pads).
    fn src_caps(&self) -> Option<StreamCaps>;
    /// Whether several upstream links may feed this stage's input.
    fn multiplexing(&self) -> bool {
        false
    }
    fn prepare(&mut self) -> Result<(), StageError> {
        Ok(())
    }
    fn transform(&mut self, input: Buffer) -> Result<Vec<Buffer>, StageError>;
    /// Flush pending output once every input reached end of stream.
    fn drain(&mut self) -> Result<Vec<Buffer>, StageError> {
        Ok(Vec::new())
    }
    fn release(&mut self) {}
}

/// A stage that consumes buffers out of the pipeline (file, display).
pub trait Sink: Send {
    fn name(&self) -> &str;
    fn sink_caps(&self) -> StreamCaps;
    fn prepare(&mut self) -> Result<(), StageError> {
        Ok(())
    }
    fn push(&mut self, input: Buffer) -> Result<(), StageError>;
    /// Invoked once on end of stream, before the bus event is posted.
    fn finalize(&mut self) -> Result<(), StageError> {
        Ok(())
    }
    fn release(&mut self) {}
}

/// Owned, type-erased stage handle as stored by the pipeline controller.
pub enum StageBox {
    Source(Box<dyn Source>),
    Transform(Box<dyn Transform>),
    Sink(Box<dyn Sink>),
}

impl StageBox {
    pub fn name(&self) -> &str {
        match self {
            StageBox::Source(s) => s.name(),
            StageBox::Transform(t) => t.name(),
            StageBox::Sink(s) => s.name(),
        }
    }

    /// Output caps, `None` for sinks and for not-yet-available dynamic pads.
    pub fn src_caps(&self) -> Option<StreamCaps> {
        match self {
            StageBox::Source(s) => s.src_caps(),
            StageBox::Transform(t) => t.src_caps(),
            StageBox::Sink(_) => None,
        }
    }

    /// Input caps, `None` for sources.
    pub fn sink_caps(&self) -> Option<StreamCaps> {
        match self {
            StageBox::Source(_) => None,
            StageBox::Transform(t) => Some(t.sink_caps()),
            StageBox::Sink(s) => Some(s.sink_caps()),
        }
    }

    pub fn multiplexing(&self) -> bool {
        match self {
            StageBox::Transform(t) => t.multiplexing(),
            _ => false,
        }
    }

    pub fn has_src_pad(&self) -> bool {
        !matches!(self, StageBox::Sink(_))
    }

    pub fn has_sink_pad(&self) -> bool {
        !matches!(self, StageBox::Source(_))
    }
}
