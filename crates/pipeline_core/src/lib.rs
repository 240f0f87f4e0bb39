//! Linear pipeline assembly and lifecycle control.
//!
//! A [`Pipeline`] owns an ordered chain of stages, connects adjacent stages'
//! ports, steps the whole chain through NULL → READY → PAUSED → PLAYING and
//! blocks until END_OF_STREAM or ERROR arrives on the shared event bus.
//! Stage implementations live behind the traits in `stream_io`; this crate
//! never looks inside a buffer.

mod bus;
mod error;
mod metrics;
mod pipeline;
mod worker;

pub use bus::{Bus, BusEvent, BusSender, TerminalOutcome};
pub use error::{LinkError, StageCreationError, StateTransitionError};
pub use metrics::{PipelineStats, StageMetrics};
pub use pipeline::{CancelToken, Pipeline, StageHandle};

use std::sync::{Arc, OnceLock};
use stream_io::StageBox;

/// Typed configuration for one stage, instantiable by the controller.
///
/// Element libraries implement this on a closed enum of their stage types;
/// property validation happens inside `instantiate`, so a bad value is a
/// [`StageCreationError`] before the stage ever joins a pipeline.
pub trait ElementSpec {
    fn type_name(&self) -> &'static str;
    fn instantiate(self) -> Result<StageBox, StageCreationError>;
}

/// Process-scoped framework initialization handle.
///
/// Acquired once at startup and passed explicitly into [`Pipeline::new`]
/// instead of relying on hidden global state. `acquire` is idempotent and
/// always returns the same handle.
pub struct FlowContext {
    _priv: (),
}

static CONTEXT: OnceLock<Arc<FlowContext>> = OnceLock::new();

impl FlowContext {
    pub fn acquire() -> Arc<FlowContext> {
        CONTEXT
            .get_or_init(|| {
                telemetry::init();
                Arc::new(FlowContext { _priv: () })
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_process_wide() {
        let a = FlowContext::acquire();
        let b = FlowContext::acquire();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
