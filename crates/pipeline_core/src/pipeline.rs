use crossbeam::channel::{Receiver, Select, Sender, after, bounded, never};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use stream_io::{LifecycleState, StageBox, StageError, StreamItem};
use tracing::debug;

use crate::bus::{Bus, BusEvent, TerminalOutcome};
use crate::error::{LinkError, StageCreationError, StateTransitionError};
use crate::metrics::PipelineStats;
use crate::{ElementSpec, FlowContext, worker};

const DEFAULT_LINK_CAPACITY: usize = 8;

/// Opaque handle to a stage owned by a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageHandle(pub(crate) usize);

/// Requests cancellation of a blocked `wait_terminal` call. Cloneable and
/// safe to fire from a signal handler thread.
#[derive(Clone)]
pub struct CancelToken {
    tx: Sender<()>,
}

impl CancelToken {
    pub fn cancel(&self) {
        let _ = self.tx.try_send(());
    }
}

struct StageEntry {
    name: String,
    slot: Arc<Mutex<Option<StageBox>>>,
    state: LifecycleState,
    /// Receivers of incoming links; moved into the worker at spawn.
    inputs: Vec<Receiver<StreamItem>>,
    /// Sender of the outgoing link; moved into the worker at spawn.
    output: Option<Sender<StreamItem>>,
    /// Occupancy bookkeeping, kept separate from the channels above so a
    /// deferred link can reserve its ports before the channel exists.
    linked_out: bool,
    linked_in: u32,
    sink_pad_names: Vec<String>,
    worker: Option<JoinHandle<()>>,
}

struct PendingLink {
    up: usize,
    up_pad: String,
    down: usize,
    down_pad: String,
}

/// Owns an ordered chain of stages, connects their ports, drives collective
/// lifecycle transitions and blocks until a terminal event.
///
/// The controller itself is single-threaded; each stage runs its own worker
/// thread while the pipeline is PLAYING, and the event bus is the only
/// structure those threads share with the caller.
pub struct Pipeline {
    ctx: Arc<FlowContext>,
    name: String,
    stages: Vec<StageEntry>,
    pending: Vec<PendingLink>,
    /// Directed stage graph, one entry per wired link.
    edges: Vec<(usize, usize)>,
    bus: Bus,
    state: LifecycleState,
    stop: Arc<AtomicBool>,
    stats: Arc<Mutex<PipelineStats>>,
    cancel_tx: Sender<()>,
    cancel_rx: Receiver<()>,
    link_capacity: usize,
}

impl Pipeline {
    pub fn new(ctx: Arc<FlowContext>, name: impl Into<String>) -> Self {
        let (cancel_tx, cancel_rx) = bounded(1);
        Self {
            ctx,
            name: name.into(),
            stages: Vec::new(),
            pending: Vec::new(),
            edges: Vec::new(),
            bus: Bus::new(),
            state: LifecycleState::Null,
            stop: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(PipelineStats::default())),
            cancel_tx,
            cancel_rx,
            link_capacity: DEFAULT_LINK_CAPACITY,
        }
    }

    pub fn context(&self) -> &Arc<FlowContext> {
        &self.ctx
    }

    pub fn current_state(&self) -> LifecycleState {
        self.state
    }

    /// Bounded capacity of every link created after this call.
    pub fn set_link_capacity(&mut self, capacity: usize) {
        self.link_capacity = capacity.max(1);
    }

    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Snapshot of the per-stage counters.
    pub fn stats(&self) -> PipelineStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Instantiate a stage from its typed configuration and take ownership
    /// of it. The stage starts out unlinked and in the NULL state.
    pub fn add_stage<S: ElementSpec>(&mut self, spec: S) -> Result<StageHandle, StageCreationError> {
        if self.state != LifecycleState::Null {
            return Err(StageCreationError::PipelineActive(self.name.clone()));
        }
        debug!(pipeline = %self.name, ty = spec.type_name(), "creating stage");
        let stage = spec.instantiate()?;
        let name = stage.name().to_string();
        if self.stages.iter().any(|s| s.name == name) {
            return Err(StageCreationError::DuplicateName(name));
        }
        self.stages.push(StageEntry {
            name,
            slot: Arc::new(Mutex::new(Some(stage))),
            state: LifecycleState::Null,
            inputs: Vec::new(),
            output: None,
            linked_out: false,
            linked_in: 0,
            sink_pad_names: Vec::new(),
            worker: None,
        });
        Ok(StageHandle(self.stages.len() - 1))
    }

    /// Connect `up`'s "src" port to `down`'s "sink" port.
    pub fn link(&mut self, up: StageHandle, down: StageHandle) -> Result<(), LinkError> {
        self.link_pads(up, "src", down, "sink", false)
    }

    /// Named-pad link. When the upstream pad is not available yet (dynamic
    /// pad), a continuation is registered and resolved once the stage
    /// announces the pad during its transition to READY.
    pub fn link_explicit(
        &mut self,
        up: StageHandle,
        up_pad: &str,
        down: StageHandle,
        down_pad: &str,
    ) -> Result<(), LinkError> {
        self.link_pads(up, up_pad, down, down_pad, true)
    }

    fn link_pads(
        &mut self,
        up: StageHandle,
        up_pad: &str,
        down: StageHandle,
        down_pad: &str,
        defer: bool,
    ) -> Result<(), LinkError> {
        if self.state != LifecycleState::Null {
            return Err(LinkError::PipelineActive);
        }
        let (ui, di) = (up.0, down.0);
        if ui >= self.stages.len() || di >= self.stages.len() {
            return Err(LinkError::UnknownStage);
        }
        if ui == di {
            return Err(LinkError::SelfLink(self.stages[ui].name.clone()));
        }

        let up_name = self.stages[ui].name.clone();
        let down_name = self.stages[di].name.clone();

        // All validation happens before any mutation: a failed link must
        // leave both stages' port occupancy unchanged.
        let up_caps = {
            let guard = lock_slot(&self.stages[ui].slot);
            let Some(stage) = guard.as_ref() else {
                return Err(LinkError::UnknownStage);
            };
            if !stage.has_src_pad() {
                return Err(LinkError::NoSuchPad {
                    stage: up_name,
                    pad: up_pad.to_string(),
                });
            }
            stage.src_caps()
        };
        if up_pad != "src" {
            return Err(LinkError::NoSuchPad {
                stage: up_name,
                pad: up_pad.to_string(),
            });
        }
        if self.stages[ui].linked_out {
            return Err(LinkError::SrcBusy(up_name));
        }

        let (multiplexing, down_caps) = {
            let guard = lock_slot(&self.stages[di].slot);
            let Some(stage) = guard.as_ref() else {
                return Err(LinkError::UnknownStage);
            };
            if !stage.has_sink_pad() {
                return Err(LinkError::NoSuchPad {
                    stage: down_name,
                    pad: down_pad.to_string(),
                });
            }
            (stage.multiplexing(), stage.sink_caps())
        };
        if multiplexing {
            if self.stages[di].sink_pad_names.iter().any(|p| p == down_pad) {
                return Err(LinkError::SinkBusy {
                    stage: down_name,
                    pad: down_pad.to_string(),
                });
            }
        } else {
            if down_pad != "sink" {
                return Err(LinkError::NoSuchPad {
                    stage: down_name,
                    pad: down_pad.to_string(),
                });
            }
            if self.stages[di].linked_in > 0 {
                return Err(LinkError::SinkBusy {
                    stage: down_name,
                    pad: down_pad.to_string(),
                });
            }
        }

        let Some(up_caps) = up_caps else {
            if !defer {
                return Err(LinkError::PadNotAvailable {
                    stage: up_name,
                    pad: up_pad.to_string(),
                });
            }
            debug!(
                up = %up_name,
                pad = up_pad,
                down = %down_name,
                "pad not available yet, deferring link"
            );
            self.reserve_ports(ui, di, down_pad);
            self.pending.push(PendingLink {
                up: ui,
                up_pad: up_pad.to_string(),
                down: di,
                down_pad: down_pad.to_string(),
            });
            return Ok(());
        };

        let down_caps = down_caps.expect("stage with a sink pad advertises sink caps");
        if !up_caps.compatible(&down_caps) {
            return Err(LinkError::Incompatible {
                up: up_name,
                up_caps,
                down: down_name,
                down_caps,
            });
        }

        self.reserve_ports(ui, di, down_pad);
        self.wire(ui, di);
        debug!(up = %self.stages[ui].name, down = %self.stages[di].name, "linked");
        Ok(())
    }

    fn reserve_ports(&mut self, ui: usize, di: usize, down_pad: &str) {
        self.stages[ui].linked_out = true;
        self.stages[di].linked_in += 1;
        self.stages[di].sink_pad_names.push(down_pad.to_string());
    }

    fn wire(&mut self, ui: usize, di: usize) {
        let (tx, rx) = bounded(self.link_capacity);
        self.stages[ui].output = Some(tx);
        self.stages[di].inputs.push(rx);
        self.edges.push((ui, di));
    }

    /// Resolve continuations registered by `link_explicit` now that stages
    /// had a chance to announce their dynamic pads.
    fn resolve_pending(&mut self, target: LifecycleState) -> Result<(), StateTransitionError> {
        let pending = std::mem::take(&mut self.pending);
        for p in pending {
            let up_name = self.stages[p.up].name.clone();
            let up_caps = lock_slot(&self.stages[p.up].slot)
                .as_ref()
                .and_then(|s| s.src_caps());
            let Some(up_caps) = up_caps else {
                // Still not announced; topology validation will reject the
                // pipeline before anything reaches PLAYING.
                self.pending.push(p);
                continue;
            };
            let down_name = self.stages[p.down].name.clone();
            let down_caps = lock_slot(&self.stages[p.down].slot)
                .as_ref()
                .and_then(|s| s.sink_caps());
            let Some(down_caps) = down_caps else {
                self.pending.push(p);
                continue;
            };
            if !up_caps.compatible(&down_caps) {
                return Err(StateTransitionError {
                    stage: up_name,
                    target,
                    reason: format!(
                        "deferred link to `{down_name}` failed: incompatible caps ({up_caps:?} vs {down_caps:?})"
                    ),
                });
            }
            self.wire(p.up, p.down);
            debug!(up = %up_name, pad = %p.up_pad, down = %down_name, down_pad = %p.down_pad, "deferred link completed");
            self.bus.sender().post(BusEvent::PadAdded {
                stage: up_name,
                pad: p.up_pad,
                caps: up_caps,
            });
        }
        Ok(())
    }

    /// Step every stage to `target`, one adjacent state at a time.
    ///
    /// Ascending levels are requested sink-to-source, descending levels
    /// source-to-sink. On any failure the pipeline is torn down before the
    /// error is returned, so no stage is left holding resources.
    pub fn set_state(&mut self, target: LifecycleState) -> Result<(), StateTransitionError> {
        if self.stages.is_empty() {
            return Err(StateTransitionError {
                stage: self.name.clone(),
                target,
                reason: "pipeline has no stages".into(),
            });
        }
        while self.state != target {
            if self.state < target {
                let Some(next) = self.state.ascend() else {
                    break;
                };
                if let Err(e) = self.ascend_to(next) {
                    self.teardown();
                    return Err(e);
                }
            } else {
                let Some(next) = self.state.descend() else {
                    break;
                };
                self.descend_to(next);
            }
        }
        Ok(())
    }

    fn ascend_to(&mut self, next: LifecycleState) -> Result<(), StateTransitionError> {
        match next {
            LifecycleState::Ready => {
                for idx in (0..self.stages.len()).rev() {
                    self.bring_up(idx)?;
                }
                self.resolve_pending(next)?;
            }
            LifecycleState::Paused => {
                for idx in (0..self.stages.len()).rev() {
                    self.mark(idx, LifecycleState::Paused);
                }
            }
            LifecycleState::Playing => {
                // No stage may reach PLAYING with a hole in the chain.
                self.validate_topology(next)?;
                for idx in (0..self.stages.len()).rev() {
                    self.spawn_worker(idx)?;
                }
            }
            LifecycleState::Null => {}
        }
        self.state = next;
        Ok(())
    }

    fn descend_to(&mut self, next: LifecycleState) {
        match next {
            LifecycleState::Paused => {
                self.stop_workers();
                for idx in 0..self.stages.len() {
                    if self.stages[idx].state == LifecycleState::Playing {
                        self.mark(idx, LifecycleState::Paused);
                    }
                }
            }
            LifecycleState::Ready => {
                for idx in 0..self.stages.len() {
                    if self.stages[idx].state == LifecycleState::Paused {
                        self.mark(idx, LifecycleState::Ready);
                    }
                }
            }
            LifecycleState::Null => {
                for idx in 0..self.stages.len() {
                    if self.stages[idx].state != LifecycleState::Null {
                        self.shut_down(idx);
                        self.mark(idx, LifecycleState::Null);
                    }
                }
            }
            LifecycleState::Playing => {}
        }
        self.state = next;
    }

    fn bring_up(&mut self, idx: usize) -> Result<(), StateTransitionError> {
        let result = {
            let mut guard = lock_slot(&self.stages[idx].slot);
            match guard.as_mut() {
                Some(StageBox::Source(el)) => el.open(),
                Some(StageBox::Transform(el)) => el.prepare(),
                Some(StageBox::Sink(el)) => el.prepare(),
                None => Err(StageError::Resource("stage slot is empty".into())),
            }
        };
        match result {
            Ok(()) => {
                self.mark(idx, LifecycleState::Ready);
                Ok(())
            }
            Err(e) => Err(StateTransitionError {
                stage: self.stages[idx].name.clone(),
                target: LifecycleState::Ready,
                reason: e.to_string(),
            }),
        }
    }

    fn shut_down(&mut self, idx: usize) {
        let mut guard = lock_slot(&self.stages[idx].slot);
        match guard.as_mut() {
            Some(StageBox::Source(el)) => el.close(),
            Some(StageBox::Transform(el)) => el.release(),
            Some(StageBox::Sink(el)) => el.release(),
            None => {}
        }
    }

    fn mark(&mut self, idx: usize, to: LifecycleState) {
        let from = self.stages[idx].state;
        if from == to {
            return;
        }
        self.stages[idx].state = to;
        debug!(stage = %self.stages[idx].name, ?from, ?to, "state changed");
        self.bus.sender().post(BusEvent::StateChanged {
            stage: self.stages[idx].name.clone(),
            from,
            to,
        });
    }

    fn validate_topology(&self, target: LifecycleState) -> Result<(), StateTransitionError> {
        let err = |stage: &str, reason: String| StateTransitionError {
            stage: stage.to_string(),
            target,
            reason,
        };

        if let Some(p) = self.pending.first() {
            return Err(err(
                &self.stages[p.up].name,
                format!("deferred link is still waiting on pad `{}`", p.up_pad),
            ));
        }
        for entry in &self.stages {
            let (has_src, has_sink) = {
                let guard = lock_slot(&entry.slot);
                match guard.as_ref() {
                    Some(stage) => (stage.has_src_pad(), stage.has_sink_pad()),
                    None => (false, false),
                }
            };
            if has_sink && entry.inputs.is_empty() {
                return Err(err(&entry.name, "input port is not linked".into()));
            }
            if has_src && entry.output.is_none() {
                return Err(err(&entry.name, "output port is not linked".into()));
            }
        }

        // Every stage must be reachable from the head along wired links.
        let mut visited = vec![false; self.stages.len()];
        let mut queue = vec![0usize];
        visited[0] = true;
        while let Some(at) = queue.pop() {
            for &(from, to) in &self.edges {
                if from == at && !visited[to] {
                    visited[to] = true;
                    queue.push(to);
                }
            }
        }
        if let Some(orphan) = visited.iter().position(|v| !v) {
            return Err(err(
                &self.stages[orphan].name,
                format!("not reachable from `{}`", self.stages[0].name),
            ));
        }
        Ok(())
    }

    fn spawn_worker(&mut self, idx: usize) -> Result<(), StateTransitionError> {
        let (name, slot, inputs, output) = {
            let entry = &mut self.stages[idx];
            (
                entry.name.clone(),
                entry.slot.clone(),
                std::mem::take(&mut entry.inputs),
                entry.output.take(),
            )
        };
        let bus = self.bus.sender();
        let stop = self.stop.clone();
        let stats = self.stats.clone();
        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(format!("stage-{thread_name}"))
            .spawn(move || worker::stage_loop(&thread_name, slot, inputs, output, bus, stop, stats));
        match handle {
            Ok(h) => {
                self.stages[idx].worker = Some(h);
                self.mark(idx, LifecycleState::Playing);
                Ok(())
            }
            Err(e) => Err(StateTransitionError {
                stage: name,
                target: LifecycleState::Playing,
                reason: format!("failed to spawn worker thread: {e}"),
            }),
        }
    }

    fn stop_workers(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for entry in &mut self.stages {
            if let Some(handle) = entry.worker.take() {
                let _ = handle.join();
            }
        }
        self.stop.store(false, Ordering::SeqCst);
    }

    /// Block until END_OF_STREAM or ERROR is observed on the bus.
    ///
    /// Suspends on the channel receive; there is no polling and no timeout.
    pub fn run_until_terminal(&self) -> TerminalOutcome {
        loop {
            match self.bus.receiver().recv() {
                Ok(event) => {
                    if let Some(outcome) = Self::terminal_of(event) {
                        return outcome;
                    }
                }
                Err(_) => {
                    return TerminalOutcome::Error {
                        stage: self.name.clone(),
                        detail: "event bus closed".into(),
                    };
                }
            }
        }
    }

    /// Like `run_until_terminal`, but additionally honors the pipeline's
    /// cancel token and an optional timeout. `None` means the wait ended
    /// without a terminal event.
    pub fn wait_terminal(&self, timeout: Option<Duration>) -> Option<TerminalOutcome> {
        let deadline = match timeout {
            Some(d) => after(d),
            None => never(),
        };
        let bus_rx = self.bus.receiver();
        let mut sel = Select::new();
        let bus_op = sel.recv(bus_rx);
        let cancel_op = sel.recv(&self.cancel_rx);
        let deadline_op = sel.recv(&deadline);
        loop {
            // A cancellation that was requested before we block always wins
            // over a racing terminal event.
            if self.cancel_rx.try_recv().is_ok() {
                debug!(pipeline = %self.name, "wait cancelled");
                return None;
            }
            let oper = sel.select();
            let idx = oper.index();
            if idx == bus_op {
                match oper.recv(bus_rx) {
                    Ok(event) => {
                        if let Some(outcome) = Self::terminal_of(event) {
                            return Some(outcome);
                        }
                    }
                    Err(_) => return None,
                }
            } else if idx == cancel_op {
                let _ = oper.recv(&self.cancel_rx);
                debug!(pipeline = %self.name, "wait cancelled");
                return None;
            } else {
                debug_assert_eq!(idx, deadline_op);
                let _ = oper.recv(&deadline);
                return None;
            }
        }
    }

    fn terminal_of(event: BusEvent) -> Option<TerminalOutcome> {
        match event {
            BusEvent::EndOfStream => Some(TerminalOutcome::EndOfStream),
            BusEvent::Error { stage, detail } => Some(TerminalOutcome::Error { stage, detail }),
            BusEvent::StateChanged { stage, from, to } => {
                debug!(%stage, ?from, ?to, "observed state change");
                None
            }
            BusEvent::PadAdded { stage, pad, .. } => {
                debug!(%stage, %pad, "observed pad added");
                None
            }
        }
    }

    /// Transition every stage to NULL and release all owned resources.
    /// Idempotent; invoked from every exit path and from `Drop`.
    pub fn teardown(&mut self) {
        self.stop_workers();
        for idx in 0..self.stages.len() {
            if self.stages[idx].state != LifecycleState::Null {
                self.shut_down(idx);
                self.mark(idx, LifecycleState::Null);
            }
            self.stages[idx].inputs.clear();
            self.stages[idx].output = None;
        }
        self.state = LifecycleState::Null;
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn lock_slot(slot: &Mutex<Option<StageBox>>) -> std::sync::MutexGuard<'_, Option<StageBox>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
