//! Multi-queue packet service.
//!
//! Owns one queue driver per registered queue id, builds a fresh hook
//! set per source from the plugin list, and merges the drivers' error
//! streams into one bounded channel drained to the log.

use super::driver::{PacketProcessor, RunningQueue};
use super::errors::errors_buffer;
use super::hooks::Hooks;
use super::plugin::Plugin;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, info, warn};

/// Supervises a set of queue drivers keyed by queue id.
///
/// State transitions are serialized by a service-wide mutex; `started`
/// is authoritative.
pub struct PacketService {
    proc: Arc<dyn PacketProcessor>,
    plugins: Vec<Arc<dyn Plugin>>,
    inner: Mutex<Inner>,
}

struct Inner {
    queues: HashMap<u16, QueueSource>,
    started: bool,
    err_tx: Option<SyncSender<Error>>,
    drains: Vec<thread::JoinHandle<()>>,
    merged: Option<thread::JoinHandle<()>>,
}

struct QueueSource {
    qid: u16,
    started: Arc<AtomicBool>,
    handle: Option<RunningQueue>,
}

impl PacketService {
    pub fn new(proc: Arc<dyn PacketProcessor>, plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self {
            proc,
            plugins,
            inner: Mutex::new(Inner {
                queues: HashMap::new(),
                started: false,
                err_tx: None,
                drains: Vec::new(),
                merged: None,
            }),
        }
    }

    /// Registers a queue id. If the service is already started, the
    /// queue is brought up immediately; a failure to come up leaves it
    /// registered but stopped (visible through `ping`).
    pub fn register(&self, qid: u16) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        debug!(qid, "registering nfqueue");
        if inner.queues.contains_key(&qid) {
            return Err(Error::Service(format!("queue id {qid} exists")));
        }
        let mut source = QueueSource {
            qid,
            started: Arc::new(AtomicBool::new(false)),
            handle: None,
        };
        if inner.started {
            let err_tx = inner.err_tx.clone();
            if let Some(err_tx) = err_tx {
                if let Err(e) = self.start_source(&err_tx, &mut inner.drains, &mut source) {
                    warn!(qid, "starting nfqueue source: {e}");
                }
            }
        }
        inner.queues.insert(qid, source);
        Ok(())
    }

    /// Unregisters a queue id, stopping its driver if running.
    pub fn unregister(&self, qid: u16) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        debug!(qid, "unregistering nfqueue");
        let Some(source) = inner.queues.remove(&qid) else {
            return Err(Error::Service(format!("queue id {qid} doesn't exist")));
        };
        if let Some(handle) = source.handle {
            handle.stop();
        }
        Ok(())
    }

    /// Starts the service and every registered queue. A queue that
    /// fails to come up is logged and left stopped; the others proceed.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.started {
            return Err(Error::Service("service started".into()));
        }
        info!("starting netfilter queue processing service");
        let (err_tx, err_rx) = mpsc::sync_channel(errors_buffer());
        inner.err_tx = Some(err_tx.clone());
        inner.merged = Some(thread::spawn(move || {
            for error in err_rx {
                warn!("{error}");
            }
        }));
        inner.started = true;

        let Inner { queues, drains, .. } = &mut *inner;
        let mut sources: Vec<&mut QueueSource> = queues.values_mut().collect();
        sources.sort_by_key(|source| source.qid);
        for source in sources {
            let qid = source.qid;
            if let Err(e) = self.start_source(&err_tx, drains, source) {
                warn!(qid, "starting nfqueue source: {e}");
            }
        }
        Ok(())
    }

    /// Stops every driver, waits for their error streams to drain,
    /// closes the merged channel and resets `started`. Shutting down a
    /// stopped service is a no-op.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.started {
            return;
        }
        info!("shutting down netfilter queue processing service");
        for source in inner.queues.values_mut() {
            if let Some(handle) = source.handle.take() {
                handle.stop();
            }
        }
        for drain in inner.drains.drain(..) {
            let _ = drain.join();
        }
        inner.err_tx = None;
        if let Some(merged) = inner.merged.take() {
            let _ = merged.join();
        }
        inner.started = false;
    }

    /// Liveness check: an error lists every registered queue whose
    /// driver is not currently running.
    pub fn ping(&self) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        if !inner.started {
            return Err(Error::Service("service not started".into()));
        }
        let mut stopped: Vec<u16> = inner
            .queues
            .values()
            .filter(|source| !source.started.load(Ordering::Acquire))
            .map(|source| source.qid)
            .collect();
        if stopped.is_empty() {
            return Ok(());
        }
        stopped.sort_unstable();
        let stopped: Vec<String> = stopped.iter().map(u16::to_string).collect();
        Err(Error::Service(format!(
            "netfilter queues stopped: {}",
            stopped.join(",")
        )))
    }

    fn start_source(
        &self,
        err_tx: &SyncSender<Error>,
        drains: &mut Vec<thread::JoinHandle<()>>,
        source: &mut QueueSource,
    ) -> Result<()> {
        info!(qid = source.qid, "starting nfqueue source");
        let source_name = format!("nfqueue(#{})", source.qid);
        let mut hooks = Hooks::new();
        for plugin in &self.plugins {
            plugin.register(&source_name, &mut hooks);
        }
        let (handle, errors) = self.proc.process(source.qid, hooks)?;
        source.started.store(true, Ordering::Release);
        source.handle = Some(handle);

        let qid = source.qid;
        let started = source.started.clone();
        let err_tx = err_tx.clone();
        drains.push(thread::spawn(move || {
            for error in errors {
                // Never block a driver; the merged stream is lossy too.
                let _ = err_tx.try_send(error);
            }
            info!(qid, "stopping nfqueue source");
            started.store(false, Ordering::Release);
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::driver::{run_queue, ProcessorConfig};
    use crate::queue::packet::Layer;
    use crate::queue::testutil::{ipv4_packet, wait_for_verdicts, MockBackend};
    use crate::queue::{RawPacket, Verdict};
    use crate::telemetry::QueueStats;
    use std::sync::mpsc::Receiver;

    /// Processor over in-memory queues; packets are injected per qid.
    struct MockProcessor {
        cfg: ProcessorConfig,
        senders: Mutex<HashMap<u16, mpsc::SyncSender<RawPacket>>>,
        verdicts: Arc<Mutex<Vec<(u32, Verdict)>>>,
        registrations: Arc<Mutex<Vec<String>>>,
    }

    impl MockProcessor {
        fn new(cfg: ProcessorConfig) -> Self {
            Self {
                cfg,
                senders: Mutex::new(HashMap::new()),
                verdicts: Arc::new(Mutex::new(Vec::new())),
                registrations: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn inject(&self, qid: u16, packet: RawPacket) {
            self.senders.lock().unwrap()[&qid].send(packet).unwrap();
        }
    }

    impl PacketProcessor for MockProcessor {
        fn process(&self, qid: u16, hooks: Hooks) -> Result<(RunningQueue, Receiver<Error>)> {
            if qid == 666 {
                return Err(Error::Queue {
                    qid,
                    reason: "could not open nfqueue".into(),
                });
            }
            let (tx, rx) = mpsc::sync_channel(64);
            self.senders.lock().unwrap().insert(qid, tx);
            let backend = MockBackend {
                incoming: rx,
                verdicts: self.verdicts.clone(),
            };
            Ok(run_queue(qid, backend, hooks, self.cfg, Arc::new(QueueStats::new())))
        }
    }

    struct RecordingPlugin {
        registrations: Arc<Mutex<Vec<String>>>,
        verdict: Verdict,
    }

    impl Plugin for RecordingPlugin {
        fn name(&self) -> &str {
            "recorder"
        }

        fn class(&self) -> &str {
            "test"
        }

        fn register(&self, source: &str, hooks: &mut Hooks) {
            self.registrations.lock().unwrap().push(source.to_string());
            let verdict = self.verdict;
            hooks.on_packet(Layer::Ipv4, move |_, _| verdict.into());
        }

        fn layers(&self) -> Vec<Layer> {
            vec![Layer::Ipv4]
        }
    }

    fn service_with(
        qids: &[u16],
        verdict: Verdict,
    ) -> (PacketService, Arc<MockProcessor>, Arc<Mutex<Vec<String>>>) {
        let proc = Arc::new(MockProcessor::new(ProcessorConfig::default()));
        let registrations = proc.registrations.clone();
        let plugin = Arc::new(RecordingPlugin {
            registrations: registrations.clone(),
            verdict,
        });
        let service = PacketService::new(proc.clone(), vec![plugin]);
        for qid in qids {
            service.register(*qid).unwrap();
        }
        (service, proc, registrations)
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let (service, _proc, _) = service_with(&[1], Verdict::Accept);
        assert!(service.register(1).is_err());
        assert!(service.register(2).is_ok());
    }

    #[test]
    fn test_unregister_unknown_rejected() {
        let (service, _proc, _) = service_with(&[], Verdict::Accept);
        assert!(service.unregister(5).is_err());
    }

    #[test]
    fn test_register_unregister_is_noop() {
        let (service, _proc, registrations) = service_with(&[], Verdict::Accept);
        service.register(3).unwrap();
        service.unregister(3).unwrap();
        assert!(registrations.lock().unwrap().is_empty());
        // id is reusable afterwards
        service.register(3).unwrap();
    }

    #[test]
    fn test_start_registers_plugins_per_source() {
        let (service, proc, registrations) = service_with(&[1, 2], Verdict::Drop);
        service.start().unwrap();
        {
            let seen = registrations.lock().unwrap();
            assert_eq!(*seen, vec!["nfqueue(#1)", "nfqueue(#2)"]);
        }
        proc.inject(
            1,
            RawPacket {
                id: 1,
                payload: ipv4_packet("192.168.1.1", "10.0.0.1"),
            },
        );
        let seen = wait_for_verdicts(&proc.verdicts, 1);
        assert_eq!(seen, vec![(1, Verdict::Drop)]);
        service.shutdown();
    }

    #[test]
    fn test_start_twice_rejected() {
        let (service, _proc, _) = service_with(&[1], Verdict::Accept);
        service.start().unwrap();
        assert!(service.start().is_err());
        service.shutdown();
        // restart after shutdown is allowed
        service.start().unwrap();
        service.shutdown();
    }

    #[test]
    fn test_shutdown_not_started_tolerated() {
        let (service, _proc, _) = service_with(&[1], Verdict::Accept);
        service.shutdown();
    }

    #[test]
    fn test_register_while_started_brings_queue_up() {
        let (service, proc, registrations) = service_with(&[], Verdict::Accept);
        service.start().unwrap();
        service.register(4).unwrap();
        assert_eq!(*registrations.lock().unwrap(), vec!["nfqueue(#4)"]);
        service.ping().unwrap();
        proc.inject(
            4,
            RawPacket {
                id: 1,
                payload: ipv4_packet("192.168.1.1", "10.0.0.1"),
            },
        );
        wait_for_verdicts(&proc.verdicts, 1);
        service.unregister(4).unwrap();
        service.shutdown();
    }

    #[test]
    fn test_ping_reports_stopped_queues() {
        let (service, _proc, _) = service_with(&[1, 666], Verdict::Accept);
        assert!(service.ping().is_err()); // not started
        service.start().unwrap();
        let err = service.ping().unwrap_err().to_string();
        assert!(err.contains("666"));
        assert!(!err.contains('1'));
        service.shutdown();
    }
}
