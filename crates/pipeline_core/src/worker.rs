//! Per-stage worker loops.
//!
//! One thread per stage while the pipeline is PLAYING. Buffers move between
//! workers over bounded channels; every receive and send wakes periodically
//! to honor the shared stop flag, so stopping never deadlocks on a full or
//! empty link.

use crossbeam::channel::{Receiver, RecvTimeoutError, Select, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stream_io::{Sink, Source, StageBox, StreamItem, Transform};
use tracing::debug;

use crate::bus::BusSender;
use crate::metrics::PipelineStats;

const TICK: Duration = Duration::from_millis(50);

/// Worker entry point. Holds the stage slot locked for the whole run; the
/// controller only reclaims the element after joining the thread.
pub(crate) fn stage_loop(
    name: &str,
    slot: Arc<Mutex<Option<StageBox>>>,
    inputs: Vec<Receiver<StreamItem>>,
    output: Option<Sender<StreamItem>>,
    bus: BusSender,
    stop: Arc<AtomicBool>,
    stats: Arc<Mutex<PipelineStats>>,
) {
    let mut guard = slot.lock().unwrap_or_else(|p| p.into_inner());
    let Some(stage) = guard.as_mut() else {
        return;
    };
    match stage {
        StageBox::Source(el) => {
            let Some(tx) = output else {
                bus.error(name, "source has no linked output port");
                return;
            };
            source_loop(name, el.as_mut(), &tx, &bus, &stop, &stats);
        }
        StageBox::Transform(el) => {
            let Some(tx) = output else {
                bus.error(name, "transform has no linked output port");
                return;
            };
            transform_loop(name, el.as_mut(), inputs, &tx, &bus, &stop, &stats);
        }
        StageBox::Sink(el) => {
            let Some(rx) = inputs.first() else {
                bus.error(name, "sink has no linked input port");
                return;
            };
            sink_loop(name, el.as_mut(), rx, &bus, &stop, &stats);
        }
    }
}

fn source_loop(
    name: &str,
    el: &mut dyn Source,
    tx: &Sender<StreamItem>,
    bus: &BusSender,
    stop: &AtomicBool,
    stats: &Mutex<PipelineStats>,
) {
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let t0 = telemetry::now_ns();
        match el.pull() {
            Ok(Some(buf)) => {
                record(stats, name, t0, 1);
                if !forward(tx, StreamItem::Payload(buf), stop) {
                    return;
                }
            }
            Ok(None) => {
                debug!(stage = name, "end of input, forwarding EOS");
                let _ = forward(tx, StreamItem::Eos, stop);
                return;
            }
            Err(e) => {
                fail(stats, name);
                bus.error(name, e.to_string());
                return;
            }
        }
    }
}

fn transform_loop(
    name: &str,
    el: &mut dyn Transform,
    inputs: Vec<Receiver<StreamItem>>,
    tx: &Sender<StreamItem>,
    bus: &BusSender,
    stop: &AtomicBool,
    stats: &Mutex<PipelineStats>,
) {
    // Serve every live input fairly; an input leaves the set on EOS or when
    // its upstream worker is gone. EOS goes downstream only once all inputs
    // have finished and the element has been drained.
    let mut live = inputs;
    while !live.is_empty() {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        // The selector borrows every receiver, so it is scoped to one
        // receive; `live` is free again when an input has to be retired.
        let (idx, received) = {
            let mut sel = Select::new();
            for rx in &live {
                sel.recv(rx);
            }
            let oper = match sel.select_timeout(TICK) {
                Ok(oper) => oper,
                Err(_) => continue,
            };
            let idx = oper.index();
            (idx, oper.recv(&live[idx]))
        };
        match received {
            Ok(StreamItem::Payload(buf)) => {
                let t0 = telemetry::now_ns();
                match el.transform(buf) {
                    Ok(outs) => {
                        record(stats, name, t0, outs.len() as u64);
                        for out in outs {
                            if !forward(tx, StreamItem::Payload(out), stop) {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        fail(stats, name);
                        bus.error(name, e.to_string());
                        return;
                    }
                }
            }
            Ok(StreamItem::Eos) | Err(_) => {
                live.swap_remove(idx);
            }
        }
    }

    match el.drain() {
        Ok(outs) => {
            for out in outs {
                if !forward(tx, StreamItem::Payload(out), stop) {
                    return;
                }
            }
        }
        Err(e) => {
            fail(stats, name);
            bus.error(name, e.to_string());
            return;
        }
    }
    let _ = forward(tx, StreamItem::Eos, stop);
}

fn sink_loop(
    name: &str,
    el: &mut dyn Sink,
    rx: &Receiver<StreamItem>,
    bus: &BusSender,
    stop: &AtomicBool,
    stats: &Mutex<PipelineStats>,
) {
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        match rx.recv_timeout(TICK) {
            Ok(StreamItem::Payload(buf)) => {
                let t0 = telemetry::now_ns();
                if let Err(e) = el.push(buf) {
                    fail(stats, name);
                    bus.error(name, e.to_string());
                    return;
                }
                record(stats, name, t0, 0);
                if let Ok(mut s) = stats.lock() {
                    s.buffers_delivered += 1;
                }
            }
            Ok(StreamItem::Eos) => {
                match el.finalize() {
                    Ok(()) => bus.eos(),
                    Err(e) => bus.error(name, e.to_string()),
                }
                return;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            // Upstream died without EOS; its error event drives termination.
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Push an item downstream, waking periodically to honor the stop flag.
/// Returns false when the worker should exit.
fn forward(tx: &Sender<StreamItem>, mut item: StreamItem, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        match tx.send_timeout(item, TICK) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(it)) => item = it,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

fn record(stats: &Mutex<PipelineStats>, name: &str, t0: u64, produced: u64) {
    let ms = telemetry::record_ms(name, t0);
    if let Ok(mut s) = stats.lock() {
        s.stage(name).record((ms * 1_000_000.0) as u64, produced);
    }
}

fn fail(stats: &Mutex<PipelineStats>, name: &str) {
    if let Ok(mut s) = stats.lock() {
        s.stage(name).record_failure();
    }
}
