//! Fixed-size worker pool with per-thread FIFO queues
//!
//! Unlike a work-stealing scheduler, every job is addressed to one specific worker.
//! That is what lets each worker own its command pool outright: a job for thread `t`
//! only ever runs on thread `t`, after every job queued to `t` before it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::render::error::{RenderError, RenderResult};

/// Unit of work executed on a worker thread
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Jobs queued or running, plus the workers whose jobs panicked since the last wait
#[derive(Default)]
struct PendingState {
    outstanding: usize,
    panicked: Vec<usize>,
}

#[derive(Default)]
struct Pending {
    state: Mutex<PendingState>,
    drained: Condvar,
}

impl Pending {
    fn increment(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.outstanding += 1;
    }

    fn complete(&self, worker: usize, panicked: bool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.outstanding = state.outstanding.saturating_sub(1);
        if panicked {
            state.panicked.push(worker);
        }
        if state.outstanding == 0 {
            self.drained.notify_all();
        }
    }
}

struct Worker {
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

/// Pool of worker threads, each draining its own queue in submission order
pub struct WorkerPool {
    workers: Vec<Worker>,
    pending: Arc<Pending>,
}

impl WorkerPool {
    /// Spawn `thread_count` workers (at least one)
    pub fn new(thread_count: usize) -> RenderResult<Self> {
        let pending = Arc::new(Pending::default());
        let mut pool = Self {
            workers: Vec::with_capacity(thread_count.max(1)),
            pending,
        };

        for index in 0..thread_count.max(1) {
            let (sender, receiver) = unbounded::<Job>();
            let pending = Arc::clone(&pool.pending);

            let handle = thread::Builder::new()
                .name(format!("chrome-worker-{index}"))
                .spawn(move || Self::worker_loop(index, &receiver, &pending))
                .map_err(|e| RenderError::WorkerSpawnFailed {
                    worker: index,
                    reason: e.to_string(),
                })?;

            pool.workers.push(Worker {
                sender: Some(sender),
                handle: Some(handle),
            });
        }

        log::debug!("Worker pool started with {} threads", pool.workers.len());
        Ok(pool)
    }

    fn worker_loop(index: usize, receiver: &Receiver<Job>, pending: &Pending) {
        // Ends once the pool drops the sender and the queue is empty
        for job in receiver {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job));
            if outcome.is_err() {
                log::error!("Job panicked on worker {}", index);
            }
            pending.complete(index, outcome.is_err());
        }
        log::trace!("Worker {} exiting", index);
    }

    /// Number of worker threads
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue `job` on worker `thread`; returns without waiting for it to run
    pub fn add_job<F>(&self, thread: usize, job: F) -> RenderResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let worker = self.workers.get(thread).ok_or(RenderError::UnknownWorker {
            index: thread,
            count: self.workers.len(),
        })?;
        let sender = worker.sender.as_ref().ok_or(RenderError::PoolShutDown)?;

        self.pending.increment();
        if sender.send(Box::new(job)).is_err() {
            self.pending.complete(thread, false);
            return Err(RenderError::PoolShutDown);
        }

        Ok(())
    }

    /// Block until every queue is empty and no job is running
    ///
    /// Reports the first worker whose job panicked since the previous call.
    pub fn wait(&self) -> RenderResult<()> {
        let mut state = self.pending.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.outstanding > 0 {
            state = self
                .pending
                .drained
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let panicked = std::mem::take(&mut state.panicked);
        match panicked.first() {
            Some(&worker) => Err(RenderError::WorkerPanicked { worker }),
            None => Ok(()),
        }
    }

    /// Drain every queue and join all workers
    pub fn shutdown(&mut self) {
        for worker in &mut self.workers {
            worker.sender.take();
        }

        for (index, worker) in self.workers.iter_mut().enumerate() {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    log::warn!("Worker {} terminated abnormally", index);
                }
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
