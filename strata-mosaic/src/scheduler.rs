//! Concurrent multi-tile fetches delivered through a bounded, cancellable
//! result queue.
//!
//! A request fans its positions out to a pool of named worker threads.
//! Each worker pushes results into one bounded queue; when the queue is
//! full workers block, and when it is empty the consumer blocks. Once every
//! worker has finished, a coordinator thread pushes
//! [`TileResult::EndOfStream`].
//!
//! Results arrive in completion order, **not** in the order positions were
//! requested. Missing tiles are skipped rather than reported, so a request
//! yields one result per non-missing position.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use crossbeam::sync::WaitGroup;
use strata::Hints;
use uuid::Uuid;

use crate::config::MosaicConfig;
use crate::error::{MosaicError, MosaicResult};
use crate::grid::TilePosition;
use crate::tile::{TileFetch, TileSource};

/// How long a blocked producer waits before re-checking cancellation.
const OFFER_RETRY: Duration = Duration::from_millis(50);

/// Raw bytes of one fetched tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePayload {
    pub position: TilePosition,
    pub bytes: Vec<u8>,
}

/// One entry of a [`TileResultQueue`].
#[derive(Debug)]
pub enum TileResult {
    Payload(TilePayload),
    /// Fetching this tile failed; the rest of the request carries on.
    Failure {
        position: TilePosition,
        error: MosaicError,
    },
    /// No further results will follow.
    EndOfStream,
}

impl TileResult {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, TileResult::EndOfStream)
    }

    pub fn position(&self) -> Option<TilePosition> {
        match self {
            TileResult::Payload(payload) => Some(payload.position),
            TileResult::Failure { position, .. } => Some(*position),
            TileResult::EndOfStream => None,
        }
    }
}

/// Cancels a running request from any thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            log::debug!("Tile request cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Consumer side of a tile request.
///
/// Dropping the queue cancels the request.
pub struct TileResultQueue {
    request_id: Uuid,
    receiver: Receiver<TileResult>,
    cancel: CancelHandle,
    finished: bool,
}

impl TileResultQueue {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Blocks for the next result. After the end of the stream, or once the
    /// request is cancelled, this keeps returning
    /// [`TileResult::EndOfStream`].
    pub fn take(&mut self) -> TileResult {
        if self.finished || self.cancel.is_cancelled() {
            self.finished = true;
            return TileResult::EndOfStream;
        }
        match self.receiver.recv() {
            Ok(result) => self.observe(result),
            // every producer is gone without a sentinel (cancelled elsewhere)
            Err(_) => self.observe(TileResult::EndOfStream),
        }
    }

    /// Waits up to `timeout` for the next result, `None` if nothing arrived.
    pub fn poll(&mut self, timeout: Duration) -> Option<TileResult> {
        if self.finished || self.cancel.is_cancelled() {
            self.finished = true;
            return Some(TileResult::EndOfStream);
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(self.observe(result)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.observe(TileResult::EndOfStream)),
        }
    }

    /// Collects every remaining result up to the end of the stream.
    pub fn drain(&mut self) -> Vec<TileResult> {
        self.by_ref().collect()
    }

    /// Stops the request. Workers finish the fetch in hand, then exit
    /// without enqueuing anything further. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
        // free queue slots so no producer stays parked on a full queue
        while self.receiver.try_recv().is_ok() {}
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn observe(&mut self, result: TileResult) -> TileResult {
        if result.is_end_of_stream() {
            self.finished = true;
        }
        result
    }
}

impl Iterator for TileResultQueue {
    type Item = TileResult;

    /// Yields results until the end of the stream; the sentinel itself is
    /// not yielded.
    fn next(&mut self) -> Option<TileResult> {
        match self.take() {
            TileResult::EndOfStream => None,
            result => Some(result),
        }
    }
}

impl Drop for TileResultQueue {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel.cancel();
        }
    }
}

/// Fans tile fetches out to a bounded pool of worker threads.
#[derive(Debug, Clone, Copy)]
pub struct TileRequestScheduler {
    worker_count: usize,
    queue_capacity: usize,
}

impl TileRequestScheduler {
    pub fn new(worker_count: usize, queue_capacity: usize) -> MosaicResult<Self> {
        if worker_count == 0 {
            return Err(MosaicError::InvalidArgument(
                "worker count must be at least 1".into(),
            ));
        }
        if queue_capacity == 0 {
            return Err(MosaicError::InvalidArgument(
                "queue capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            worker_count,
            queue_capacity,
        })
    }

    pub fn from_config(config: &MosaicConfig) -> MosaicResult<Self> {
        Self::new(config.worker_count, config.queue_capacity)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Starts fetching `positions` of `level` from `source`.
    ///
    /// Failing to start a thread is reported here, synchronously; any
    /// threads already started are cancelled. Failures of individual
    /// fetches arrive in the queue as [`TileResult::Failure`].
    pub fn submit(
        &self,
        source: Arc<dyn TileSource>,
        level: &str,
        positions: Vec<TilePosition>,
        hints: Hints,
    ) -> MosaicResult<TileResultQueue> {
        let request_id = Uuid::new_v4();
        let cancel = CancelHandle {
            cancelled: Arc::new(AtomicBool::new(false)),
        };

        let (job_sender, job_receiver) = channel::unbounded();
        let total = positions.len();
        for position in positions {
            // the receiver is alive, so this cannot fail
            let _ = job_sender.send(position);
        }
        drop(job_sender);

        let (result_sender, result_receiver) = channel::bounded(self.queue_capacity);
        let queue = TileResultQueue {
            request_id,
            receiver: result_receiver,
            cancel: cancel.clone(),
            finished: false,
        };

        let level: Arc<str> = Arc::from(level);
        let hints = Arc::new(hints);
        let wait_group = WaitGroup::new();
        let workers = self.worker_count.min(total).max(1);
        let short_id: String = request_id.simple().to_string().chars().take(8).collect();

        for index in 0..workers {
            let worker = Worker {
                source: source.clone(),
                level: level.clone(),
                hints: hints.clone(),
                jobs: job_receiver.clone(),
                results: result_sender.clone(),
                cancel: cancel.clone(),
            };
            let cloned_wait_group = wait_group.clone();
            let spawned = thread::Builder::new()
                .name(format!("strata-tile-{}-{}", short_id, index))
                .spawn(move || {
                    worker.run();
                    drop(cloned_wait_group);
                });
            if let Err(err) = spawned {
                log::error!("Failed to start tile worker {} for request {}: {}", index, request_id, err);
                cancel.cancel();
                return Err(MosaicError::Io(err));
            }
        }

        let coordinator_cancel = cancel.clone();
        let spawned = thread::Builder::new()
            .name(format!("strata-tile-{}-end", short_id))
            .spawn(move || {
                wait_group.wait();
                if offer(&result_sender, TileResult::EndOfStream, &coordinator_cancel) {
                    log::debug!("Tile request {} complete", request_id);
                }
            });
        if let Err(err) = spawned {
            log::error!("Failed to start tile coordinator for request {}: {}", request_id, err);
            cancel.cancel();
            return Err(MosaicError::Io(err));
        }

        log::debug!(
            "Tile request {} started: {} positions on level {} with {} workers",
            request_id,
            total,
            level,
            workers
        );
        Ok(queue)
    }
}

struct Worker {
    source: Arc<dyn TileSource>,
    level: Arc<str>,
    hints: Arc<Hints>,
    jobs: Receiver<TilePosition>,
    results: Sender<TileResult>,
    cancel: CancelHandle,
}

impl Worker {
    fn run(self) {
        for position in self.jobs.iter() {
            if self.cancel.is_cancelled() {
                break;
            }

            let result = match self.source.fetch_tile(&self.level, position, &self.hints) {
                Ok(TileFetch::Missing) => {
                    log::trace!("Tile {} of level {} is missing", position, self.level);
                    continue;
                }
                Ok(TileFetch::Present(handle)) => match handle.read_bytes() {
                    Ok(bytes) => TileResult::Payload(TilePayload { position, bytes }),
                    Err(error) => TileResult::Failure { position, error },
                },
                Err(error) => TileResult::Failure { position, error },
            };

            if let TileResult::Failure { error, .. } = &result {
                log::warn!("Failed to fetch tile {} of level {}: {}", position, self.level, error);
            }
            if !offer(&self.results, result, &self.cancel) {
                break;
            }
        }
    }
}

/// Pushes `result`, waiting while the queue is full. Gives up once the
/// request is cancelled or the consumer is gone.
fn offer(sender: &Sender<TileResult>, result: TileResult, cancel: &CancelHandle) -> bool {
    let mut pending = result;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        match sender.send_timeout(pending, OFFER_RETRY) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) => pending = back,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}
