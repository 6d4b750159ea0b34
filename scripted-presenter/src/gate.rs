//! Single-flight background operations.
//!
//! At most one operation runs at a time. Starting another while one is in
//! flight is rejected on the spot and nothing is spawned. The job runs on its
//! own thread; its result comes back over a channel and the completion
//! callback runs on whichever thread calls [`Orchestrator::poll`] or
//! [`Orchestrator::wait`], exactly once, after the busy flag is cleared.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Resolve,
    Export,
    RunCode,
    DocCheck,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Resolve => "resolve",
            OperationKind::Export => "export",
            OperationKind::RunCode => "run-code",
            OperationKind::DocCheck => "doc-check",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("busy: {0} is still running")]
    Busy(OperationKind),

    #[error("cannot start worker: {0}")]
    Spawn(String),
}

/// What a job produced, or the message it panicked with.
pub type JobResult<T> = Result<T, String>;

type Callback<C, T> = Box<dyn FnOnce(&mut C, JobResult<T>)>;

struct Completion<T> {
    kind: OperationKind,
    result: JobResult<T>,
}

struct InFlight<C, T> {
    kind: OperationKind,
    callback: Callback<C, T>,
}

/// Busy gate, worker launcher and delivery queue.
///
/// `C` is the state handed to callbacks, `T` what jobs return.
pub struct Orchestrator<C, T> {
    busy: AtomicBool,
    tx: Sender<Completion<T>>,
    rx: Receiver<Completion<T>>,
    in_flight: Option<InFlight<C, T>>,
}

impl<C, T> Default for Orchestrator<C, T> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

impl<C, T> Orchestrator<C, T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            busy: AtomicBool::new(false),
            tx,
            rx,
            in_flight: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// The operation currently running, if any.
    pub fn running(&self) -> Option<OperationKind> {
        self.in_flight.as_ref().map(|f| f.kind)
    }

    fn deliver(&mut self, ctx: &mut C, completion: Completion<T>) {
        let Some(in_flight) = self.in_flight.take() else {
            log::warn!("Dropping {} result with no pending callback", completion.kind);
            return;
        };
        self.busy.store(false, Ordering::SeqCst);
        if let Err(message) = &completion.result {
            log::error!("{} worker failed: {}", completion.kind, message);
        }
        (in_flight.callback)(ctx, completion.result);
    }

    /// Deliver a finished operation, if there is one. Never blocks.
    pub fn poll(&mut self, ctx: &mut C) -> bool {
        match self.rx.try_recv() {
            Ok(completion) => {
                self.deliver(ctx, completion);
                true
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => false,
        }
    }

    /// Block until the running operation is delivered or `timeout` passes.
    /// Returns false right away when nothing is running.
    pub fn wait(&mut self, ctx: &mut C, timeout: Duration) -> bool {
        if self.in_flight.is_none() {
            return false;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(completion) => {
                self.deliver(ctx, completion);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

impl<C, T: Send + 'static> Orchestrator<C, T> {
    /// Start `job` on its own thread unless an operation is already running.
    ///
    /// `on_done` is invoked exactly once from `poll`/`wait` with the job's
    /// value, or with the panic message if the job panicked.
    pub fn start<J, D>(&mut self, kind: OperationKind, job: J, on_done: D) -> Result<(), StartError>
    where
        J: FnOnce() -> T + Send + 'static,
        D: FnOnce(&mut C, JobResult<T>) + 'static,
    {
        if self.busy.swap(true, Ordering::SeqCst) {
            let running = self.running().unwrap_or(kind);
            log::warn!("Refusing {}: {} is still running", kind, running);
            return Err(StartError::Busy(running));
        }

        let tx = self.tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("scripted-{}", kind))
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(job)).map_err(panic_message);
                // The receiver lives as long as the orchestrator.
                let _ = tx.send(Completion { kind, result });
            });

        match spawned {
            Ok(_) => {
                log::debug!("Started {}", kind);
                self.in_flight = Some(InFlight {
                    kind,
                    callback: Box::new(on_done),
                });
                Ok(())
            }
            Err(e) => {
                self.busy.store(false, Ordering::SeqCst);
                Err(StartError::Spawn(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::channel;
    use std::sync::Arc;

    const LONG: Duration = Duration::from_secs(10);

    #[derive(Default)]
    struct Log {
        delivered: Vec<JobResult<u32>>,
    }

    fn record(log: &mut Log, result: JobResult<u32>) {
        log.delivered.push(result);
    }

    #[test]
    fn test_second_start_is_rejected_without_spawning() {
        let mut gate: Orchestrator<Log, u32> = Orchestrator::new();
        let mut log = Log::default();
        let spawned = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = channel::<()>();

        let counter = spawned.clone();
        gate.start(
            OperationKind::RunCode,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = release_rx.recv();
                7
            },
            record,
        )
        .unwrap();
        assert!(gate.is_busy());

        let counter = spawned.clone();
        let second = gate.start(
            OperationKind::Resolve,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                8
            },
            record,
        );
        assert_eq!(second, Err(StartError::Busy(OperationKind::RunCode)));

        release_tx.send(()).unwrap();
        assert!(gate.wait(&mut log, LONG));
        assert!(!gate.is_busy());
        assert_eq!(log.delivered, vec![Ok(7)]);
        assert_eq!(spawned.load(Ordering::SeqCst), 1);

        // Accepted again once the first one has been delivered.
        gate.start(OperationKind::Resolve, || 9, record).unwrap();
        assert!(gate.wait(&mut log, LONG));
        assert_eq!(log.delivered, vec![Ok(7), Ok(9)]);
    }

    #[test]
    fn test_busy_until_delivered() {
        let mut gate: Orchestrator<Log, u32> = Orchestrator::new();
        let mut log = Log::default();
        gate.start(OperationKind::Export, || 1, record).unwrap();

        // Finished or not, the flag stays up until the callback has run.
        thread::sleep(Duration::from_millis(50));
        assert!(gate.is_busy());
        assert!(gate.start(OperationKind::Export, || 2, record).is_err());

        assert!(gate.wait(&mut log, LONG));
        assert!(!gate.is_busy());
        assert!(!gate.poll(&mut log));
        assert!(!gate.wait(&mut log, Duration::from_millis(10)));
        assert_eq!(log.delivered.len(), 1);
    }

    #[test]
    fn test_panic_becomes_failure() {
        let mut gate: Orchestrator<Log, u32> = Orchestrator::new();
        let mut log = Log::default();
        gate.start(OperationKind::DocCheck, || panic!("boom"), record)
            .unwrap();
        assert!(gate.wait(&mut log, LONG));
        assert_eq!(log.delivered, vec![Err("boom".to_string())]);
        assert!(!gate.is_busy());
    }

    #[test]
    fn test_poll_without_work() {
        let mut gate: Orchestrator<Log, u32> = Orchestrator::default();
        let mut log = Log::default();
        assert!(!gate.poll(&mut log));
        assert_eq!(gate.running(), None);
    }
}
