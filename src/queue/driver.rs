//! Per-queue NFQUEUE worker.
//!
//! Each started queue runs a dispatch thread owning the kernel handle
//! and, when a tick interval is configured, a tick thread. Errors are
//! surfaced on a bounded channel; producers never block and overflow is
//! dropped (errors are diagnostic).

use super::backend::{NfqBackend, QueueBackend, RawPacket};
use super::errors::{errors_buffer, with_packet_context};
use super::hooks::{HookRunner, Hooks};
use super::packet::Packet;
use super::verdict::Verdict;
use crate::telemetry::{MetricsRegistry, QueueStats};
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Idle delay of the dispatch loop when the kernel has no packet ready.
const POLL_IDLE: Duration = Duration::from_millis(1);

/// Verdict policy and timer settings shared by every queue a processor
/// opens.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    /// Verdict applied when every hook abstains.
    pub policy: Verdict,
    /// Verdict applied when a payload is missing or cannot be decoded.
    pub on_error: Verdict,
    /// Tick interval; zero disables the tick worker.
    pub tick: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            policy: Verdict::Accept,
            on_error: Verdict::Drop,
            tick: Duration::ZERO,
        }
    }
}

/// Attaches hook sets to kernel queues.
pub trait PacketProcessor: Send + Sync {
    /// Opens queue `qid` and processes its packets with `hooks` until
    /// the returned handle is stopped. Fails only if the queue cannot
    /// be opened; asynchronous errors flow on the returned channel,
    /// which closes once the driver has fully stopped.
    fn process(&self, qid: u16, hooks: Hooks) -> Result<(RunningQueue, Receiver<Error>)>;
}

/// Processor over kernel NFQUEUE targets.
pub struct NfqProcessor {
    cfg: ProcessorConfig,
    metrics: Arc<MetricsRegistry>,
}

impl NfqProcessor {
    pub fn new(cfg: ProcessorConfig, metrics: Arc<MetricsRegistry>) -> Self {
        Self { cfg, metrics }
    }
}

impl PacketProcessor for NfqProcessor {
    fn process(&self, qid: u16, hooks: Hooks) -> Result<(RunningQueue, Receiver<Error>)> {
        debug!(qid, "connecting to nfqueue");
        let backend = NfqBackend::open(qid)?;
        Ok(run_queue(qid, backend, hooks, self.cfg, self.metrics.queue(qid)))
    }
}

struct DriverShared {
    qid: u16,
    policy: Verdict,
    on_error: Verdict,
    runner: HookRunner,
    closing: AtomicBool,
    last_packet: Mutex<Option<SystemTime>>,
    stats: Arc<QueueStats>,
}

/// Handle to a started queue driver. Stopping is idempotent.
pub struct RunningQueue {
    shared: Arc<DriverShared>,
    err_tx: Mutex<Option<SyncSender<Error>>>,
    tick_cancel: Mutex<Option<mpsc::Sender<()>>>,
    dispatch: Mutex<Option<thread::JoinHandle<()>>>,
    tick: Mutex<Option<thread::JoinHandle<()>>>,
}

impl RunningQueue {
    pub fn qid(&self) -> u16 {
        self.shared.qid
    }

    /// Stops the driver: cancels dispatch, waits for the workers, runs
    /// the close hooks draining their errors, and closes the error
    /// channel. A second call is a no-op.
    pub fn stop(&self) {
        if self.shared.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(qid = self.shared.qid, "closing nfqueue driver");
        drop(self.tick_cancel.lock().unwrap().take());
        if let Some(handle) = self.dispatch.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.tick.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(err_tx) = self.err_tx.lock().unwrap().take() {
            for error in self.shared.runner.close() {
                let _ = err_tx.try_send(Error::Queue {
                    qid: self.shared.qid,
                    reason: format!("on close: {error}"),
                });
            }
        }
    }
}

/// Drives `backend` with the given hook set until the returned handle
/// is stopped. Exposed so embedders and tests can run the driver over
/// their own [`QueueBackend`].
pub fn run_queue<B: QueueBackend>(
    qid: u16,
    backend: B,
    hooks: Hooks,
    cfg: ProcessorConfig,
    stats: Arc<QueueStats>,
) -> (RunningQueue, Receiver<Error>) {
    let shared = Arc::new(DriverShared {
        qid,
        policy: cfg.policy,
        on_error: cfg.on_error,
        runner: HookRunner::new(hooks),
        closing: AtomicBool::new(false),
        last_packet: Mutex::new(None),
        stats,
    });
    let (err_tx, err_rx) = mpsc::sync_channel(errors_buffer());

    let dispatch = {
        let shared = shared.clone();
        let err_tx = err_tx.clone();
        thread::spawn(move || dispatch_loop(shared, backend, err_tx))
    };

    let (tick_cancel, tick) = if cfg.tick > Duration::ZERO {
        let (cancel_tx, cancel_rx) = mpsc::channel();
        let shared = shared.clone();
        let err_tx = err_tx.clone();
        let handle = thread::spawn(move || tick_loop(shared, cancel_rx, err_tx, cfg.tick));
        (Some(cancel_tx), Some(handle))
    } else {
        (None, None)
    };

    let queue = RunningQueue {
        shared,
        err_tx: Mutex::new(Some(err_tx)),
        tick_cancel: Mutex::new(tick_cancel),
        dispatch: Mutex::new(Some(dispatch)),
        tick: Mutex::new(tick),
    };
    (queue, err_rx)
}

fn dispatch_loop<B: QueueBackend>(
    shared: Arc<DriverShared>,
    mut backend: B,
    err_tx: SyncSender<Error>,
) {
    while !shared.closing.load(Ordering::Acquire) {
        match backend.recv() {
            Ok(Some(raw)) => dispatch(&shared, &mut backend, &err_tx, raw),
            Ok(None) => thread::sleep(POLL_IDLE),
            Err(e) => {
                emit(
                    &err_tx,
                    Error::Queue {
                        qid: shared.qid,
                        reason: format!("receiving from kernel queue: {e}"),
                    },
                );
                thread::sleep(POLL_IDLE);
            }
        }
    }
    // The kernel-side close occasionally blocks; keep it off this
    // thread so shutdown can't deadlock on it.
    thread::spawn(move || drop(backend));
}

fn dispatch<B: QueueBackend>(
    shared: &DriverShared,
    backend: &mut B,
    err_tx: &SyncSender<Error>,
    raw: RawPacket,
) {
    let qid = shared.qid;
    // Late deliveries while closing still get a reply.
    if shared.closing.load(Ordering::Acquire) {
        reply(shared, backend, err_tx, raw.id, shared.policy);
        return;
    }
    shared.stats.received.inc();
    debug!(qid, packet = raw.id, "processing packet");
    if raw.payload.is_empty() {
        emit(
            err_tx,
            Error::Queue {
                qid,
                reason: format!("no payload for packet {}", raw.id),
            },
        );
        reply(shared, backend, err_tx, raw.id, shared.on_error);
        return;
    }
    let packet = match Packet::decode(raw.id, raw.payload) {
        Ok(packet) => packet,
        Err(error) => {
            emit(
                err_tx,
                Error::Queue {
                    qid,
                    reason: format!("decoding packet {}: {error}", raw.id),
                },
            );
            reply(shared, backend, err_tx, raw.id, shared.on_error);
            return;
        }
    };
    let ts = SystemTime::now();
    *shared.last_packet.lock().unwrap() = Some(ts);

    let mut verdict = shared.policy;
    for layer in shared.runner.layers() {
        if !packet.has_layer(*layer) {
            continue;
        }
        let (layer_verdict, errors) = shared.runner.packet(*layer, &packet, ts);
        for error in errors {
            let reason = with_packet_context(&packet, format!("on packet: {error}"));
            emit(err_tx, Error::Queue { qid, reason });
        }
        if layer_verdict != Verdict::Default {
            verdict = layer_verdict;
            break;
        }
    }
    reply(shared, backend, err_tx, packet.id(), verdict);
}

fn reply<B: QueueBackend>(
    shared: &DriverShared,
    backend: &mut B,
    err_tx: &SyncSender<Error>,
    id: u32,
    verdict: Verdict,
) {
    match verdict {
        Verdict::Accept => shared.stats.accepted.inc(),
        _ => shared.stats.dropped.inc(),
    }
    if let Err(e) = backend.verdict(id, verdict) {
        shared.stats.failed.inc();
        emit(
            err_tx,
            Error::Queue {
                qid: shared.qid,
                reason: format!("replying verdict for packet {id}: {e}"),
            },
        );
    }
}

fn tick_loop(
    shared: Arc<DriverShared>,
    cancel: mpsc::Receiver<()>,
    err_tx: SyncSender<Error>,
    tick: Duration,
) {
    debug!(qid = shared.qid, "starting tick worker");
    let mut last_tick = SystemTime::now();
    loop {
        match cancel.recv_timeout(tick) {
            Err(RecvTimeoutError::Timeout) => {
                let last_packet = *shared.last_packet.lock().unwrap();
                for error in shared.runner.tick(last_tick, last_packet) {
                    emit(
                        &err_tx,
                        Error::Queue {
                            qid: shared.qid,
                            reason: format!("on tick: {error}"),
                        },
                    );
                }
                last_tick = SystemTime::now();
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn emit(err_tx: &SyncSender<Error>, error: Error) {
    // Producers never block the packet path; overflow is dropped.
    let _ = err_tx.try_send(error);
}
