use stream_io::{LifecycleState, StreamCaps};
use thiserror::Error;

/// A stage could not be instantiated or rejected a configuration property.
#[derive(Debug, Error)]
pub enum StageCreationError {
    #[error("stage `{stage}`: property `{property}` rejected: {reason}")]
    Property {
        stage: String,
        property: &'static str,
        reason: String,
    },
    #[error("a stage named `{0}` already exists in this pipeline")]
    DuplicateName(String),
    #[error("pipeline `{0}` must be in the NULL state to add stages")]
    PipelineActive(String),
}

/// Connecting two ports failed. Port occupancy is left unchanged.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("cannot link `{up}` ({up_caps:?}) to `{down}` ({down_caps:?}): incompatible caps")]
    Incompatible {
        up: String,
        up_caps: StreamCaps,
        down: String,
        down_caps: StreamCaps,
    },
    #[error("input port `{pad}` of `{stage}` is already linked")]
    SinkBusy { stage: String, pad: String },
    #[error("output port of `{0}` is already linked")]
    SrcBusy(String),
    #[error("stage `{stage}` has no pad `{pad}`")]
    NoSuchPad { stage: String, pad: String },
    #[error("pad `{pad}` of `{stage}` is not available yet; use link_explicit to defer")]
    PadNotAvailable { stage: String, pad: String },
    #[error("stage handle does not belong to this pipeline")]
    UnknownStage,
    #[error("cannot link `{0}` to itself")]
    SelfLink(String),
    #[error("links must be created while the pipeline is in the NULL state")]
    PipelineActive,
}

/// A stage refused or failed to reach the requested lifecycle state.
#[derive(Debug, Error)]
#[error("stage `{stage}` failed to reach {target:?}: {reason}")]
pub struct StateTransitionError {
    pub stage: String,
    pub target: LifecycleState,
    pub reason: String,
}
