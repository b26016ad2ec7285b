use crate::Errors;
use anyhow::Result;
use crossbeam::channel::{Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{spawn, JoinHandle};

type FrameSenderChannel = Sender<WorkerCommands>;
type FrameReceiverChannel = Receiver<WorkerCommands>;
type WorkerBusyMonitor = Arc<(Mutex<usize>, Condvar)>;

/// The body of the new-data callback: consumes the memory blocks of one frame
///
/// Returns the number of published results.
///
pub trait FrameProcessor: Send + Sync {
    fn process_frame(&self, blocks: &[&[u8]]) -> Result<usize>;
}

/// Owned copy of the memory blocks of one frame
///
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct TensorFrame {
    pub blocks: Vec<Vec<u8>>,
}

impl From<Vec<Vec<u8>>> for TensorFrame {
    fn from(blocks: Vec<Vec<u8>>) -> Self {
        Self { blocks }
    }
}

impl TensorFrame {
    pub fn new(blocks: Vec<Vec<u8>>) -> Self {
        Self { blocks }
    }
}

enum WorkerCommands {
    Frame(TensorFrame),
    Exit,
}

#[derive(Default, Debug)]
struct WorkerCounters {
    processed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct WorkerStats {
    /// frames handled successfully
    pub processed: u64,
    /// frames rejected by the processor or by a full queue
    pub dropped: u64,
}

/// Producer handle of a [FrameWorker]
///
/// Cloneable; hand it to the sink callback. Every push is checked against the acceptance gate
/// under a read lock, so a frame is either queued ahead of the shutdown marker or refused with
/// [PipelineStopped](Errors::PipelineStopped).
///
#[derive(Clone)]
pub struct FrameSender {
    tx: FrameSenderChannel,
    accepting: Arc<RwLock<bool>>,
    monitor: WorkerBusyMonitor,
    counters: Arc<WorkerCounters>,
}

impl FrameSender {
    /// Queues the frame, waiting for room when the queue is bounded
    ///
    pub fn push(&self, frame: TensorFrame) -> Result<()> {
        let accepting = self
            .accepting
            .read()
            .expect("Access to worker gate must always succeed");
        if !*accepting {
            return Err(Errors::PipelineStopped.into());
        }
        self.enter();
        if self.tx.send(WorkerCommands::Frame(frame)).is_err() {
            self.leave();
            return Err(Errors::PipelineStopped.into());
        }
        Ok(())
    }

    /// Queues the frame or drops it at once when the queue is full
    ///
    pub fn try_push(&self, frame: TensorFrame) -> Result<()> {
        let accepting = self
            .accepting
            .read()
            .expect("Access to worker gate must always succeed");
        if !*accepting {
            return Err(Errors::PipelineStopped.into());
        }
        self.enter();
        match self.tx.try_send(WorkerCommands::Frame(frame)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.leave();
                self.counters.dropped.fetch_add(1, Ordering::SeqCst);
                Err(Errors::WorkerBusy.into())
            }
            Err(TrySendError::Disconnected(_)) => {
                self.leave();
                Err(Errors::PipelineStopped.into())
            }
        }
    }

    pub fn is_accepting(&self) -> bool {
        *self
            .accepting
            .read()
            .expect("Access to worker gate must always succeed")
    }

    fn enter(&self) {
        let (lock, _) = &*self.monitor;
        *lock.lock().expect("Access to busy monitor must always succeed") += 1;
    }

    fn leave(&self) {
        leave(&self.monitor);
    }
}

fn leave(monitor: &WorkerBusyMonitor) {
    let (lock, cvar) = &**monitor;
    let mut pending = lock.lock().expect("Access to busy monitor must always succeed");
    *pending -= 1;
    cvar.notify_all();
}

fn worker_thread<P: FrameProcessor>(
    processor: Arc<P>,
    rx: FrameReceiverChannel,
    monitor: WorkerBusyMonitor,
    counters: Arc<WorkerCounters>,
) {
    while let Ok(command) = rx.recv() {
        match command {
            WorkerCommands::Frame(frame) => {
                let blocks = frame.blocks.iter().map(Vec::as_slice).collect::<Vec<_>>();
                // a panicking processor must still release the frame from the busy monitor
                match catch_unwind(AssertUnwindSafe(|| processor.process_frame(&blocks))) {
                    Ok(Ok(published)) => {
                        counters.processed.fetch_add(1, Ordering::SeqCst);
                        debug!("Frame processed, {} results published", published);
                    }
                    Ok(Err(e)) => {
                        counters.dropped.fetch_add(1, Ordering::SeqCst);
                        warn!("Frame dropped: {}", e);
                    }
                    Err(_) => {
                        counters.dropped.fetch_add(1, Ordering::SeqCst);
                        error!("Frame dropped: the processor panicked");
                    }
                }
                leave(&monitor);
            }
            WorkerCommands::Exit => break,
        }
    }
}

/// Runs a [FrameProcessor] on a dedicated thread fed through a channel
///
/// Shutdown is two-phase: the senders stop accepting first, then the exit marker is queued
/// behind the accepted frames and the thread is joined, so every accepted frame is handled
/// before the thread releases the processor. [Drop] runs the same sequence.
///
pub struct FrameWorker<P: FrameProcessor + 'static> {
    processor: Arc<P>,
    sender: FrameSender,
    thread: Option<JoinHandle<()>>,
}

impl<P: FrameProcessor + 'static> FrameWorker<P> {
    /// Worker with an unbounded frame queue
    ///
    pub fn new(processor: Arc<P>) -> Self {
        Self::with_channel(processor, crossbeam::channel::unbounded())
    }

    /// Worker with a frame queue of `capacity` frames
    ///
    pub fn bounded(processor: Arc<P>, capacity: usize) -> Self {
        assert!(capacity > 0, "Queue capacity must be a positive number");
        Self::with_channel(processor, crossbeam::channel::bounded(capacity))
    }

    fn with_channel(
        processor: Arc<P>,
        (tx, rx): (FrameSenderChannel, FrameReceiverChannel),
    ) -> Self {
        let monitor: WorkerBusyMonitor = Arc::new((Mutex::new(0), Condvar::new()));
        let counters = Arc::new(WorkerCounters::default());

        let thread = {
            let processor = processor.clone();
            let monitor = monitor.clone();
            let counters = counters.clone();
            spawn(move || worker_thread(processor, rx, monitor, counters))
        };
        info!("Frame worker started");

        Self {
            processor,
            sender: FrameSender {
                tx,
                accepting: Arc::new(RwLock::new(true)),
                monitor,
                counters,
            },
            thread: Some(thread),
        }
    }

    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    pub fn push(&self, frame: TensorFrame) -> Result<()> {
        self.sender.push(frame)
    }

    pub fn try_push(&self, frame: TensorFrame) -> Result<()> {
        self.sender.try_push(frame)
    }

    pub fn processor(&self) -> Arc<P> {
        self.processor.clone()
    }

    pub fn stats(&self) -> WorkerStats {
        let counters = &self.sender.counters;
        WorkerStats {
            processed: counters.processed.load(Ordering::SeqCst),
            dropped: counters.dropped.load(Ordering::SeqCst),
        }
    }

    /// Blocks until every accepted frame is handled
    ///
    pub fn wait_idle(&self) {
        let (lock, cvar) = &*self.sender.monitor;
        let _guard = cvar
            .wait_while(
                lock.lock().expect("Access to busy monitor must always succeed"),
                |pending| *pending > 0,
            )
            .expect("Access to busy monitor must always succeed");
    }

    /// Stops accepting frames, drains the queue and joins the thread
    ///
    pub fn shutdown(&mut self) -> WorkerStats {
        if let Some(thread) = self.thread.take() {
            *self
                .sender
                .accepting
                .write()
                .expect("Access to worker gate must always succeed") = false;

            if self.sender.tx.send(WorkerCommands::Exit).is_err() {
                warn!("Frame worker thread is already gone");
            }
            if thread.join().is_err() {
                error!("Frame worker thread panicked");
            }
            let stats = self.stats();
            info!(
                "Frame worker stopped: {} frames processed, {} dropped",
                stats.processed, stats.dropped
            );
        }
        self.stats()
    }
}

impl<P: FrameProcessor + 'static> Drop for FrameWorker<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
