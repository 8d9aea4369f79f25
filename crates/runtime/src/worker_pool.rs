use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::pool::ResourcePool;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
    #[error("worker task panicked")]
    Panicked,
    #[error("worker disconnected before replying")]
    Disconnected,
}

type Handler<T, R> = Arc<dyn Fn(T) -> R + Send + Sync>;
type Reply<R> = oneshot::Sender<Result<R, WorkerError>>;

struct Envelope<K, T> {
    key: K,
    task: T,
}

/// State shared between the pool handle and its threads.
///
/// Holds no channel senders, so dropping the pool disconnects every worker.
struct WorkerContext<K, R, T> {
    slots: ResourcePool,
    handler: Handler<T, R>,
    pending: Mutex<HashMap<K, Vec<Reply<R>>>>,
    idle: Mutex<Vec<usize>>,
}

impl<K, R, T> WorkerContext<K, R, T>
where
    K: Eq + Hash,
    R: Clone,
{
    fn complete(&self, index: usize, key: K, outcome: Result<R, WorkerError>) {
        let waiters = self.pending.lock().remove(&key).unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        // Worker goes back on the idle list before its slot is handed out.
        self.idle.lock().push(index);
        self.slots.release();
    }
}

struct Worker<K, T> {
    sender: Sender<Envelope<K, T>>,
}

/// Fixed-capacity pool of OS threads running a single CPU-bound handler.
///
/// Threads are spawned lazily, up to `capacity`. Each task is tagged with a
/// key and replies are routed back by key, so several callers awaiting the
/// same key all receive the first result computed for it.
pub struct WorkerPool<K, T, R> {
    name: String,
    capacity: usize,
    context: Arc<WorkerContext<K, R, T>>,
    workers: Mutex<Vec<Worker<K, T>>>,
}

impl<K, T, R> WorkerPool<K, T, R>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Send + 'static,
    R: Clone + Send + 'static,
{
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        handler: impl Fn(T) -> R + Send + Sync + 'static,
    ) -> Self {
        let slots = ResourcePool::new(capacity);
        Self {
            name: name.into(),
            capacity: slots.concurrency(),
            context: Arc::new(WorkerContext {
                slots,
                handler: Arc::new(handler),
                pending: Mutex::new(HashMap::new()),
                idle: Mutex::new(Vec::new()),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Threads spawned so far.
    pub fn spawned(&self) -> usize {
        self.workers.lock().len()
    }

    /// Runs `task` on a free worker and waits for the reply tagged `key`.
    pub async fn execute(&self, key: K, task: T) -> Result<R, WorkerError> {
        let (reply, response) = oneshot::channel();
        self.context.slots.acquire().await;

        // Nothing below awaits until the task is queued, so a granted slot is
        // always handed to a worker.
        let sender = match self.claim_worker() {
            Ok(sender) => sender,
            Err(err) => {
                self.context.slots.release();
                return Err(err);
            }
        };

        self.context
            .pending
            .lock()
            .entry(key.clone())
            .or_default()
            .push(reply);

        if sender.send(Envelope { key: key.clone(), task }).is_err() {
            tracing::warn!(pool = %self.name, "worker channel closed");
            self.context.pending.lock().remove(&key);
            self.context.slots.release();
            return Err(WorkerError::Disconnected);
        }

        response.await.map_err(|_| WorkerError::Disconnected)?
    }

    fn claim_worker(&self) -> Result<Sender<Envelope<K, T>>, WorkerError> {
        let mut workers = self.workers.lock();
        if let Some(index) = self.context.idle.lock().pop() {
            return Ok(workers[index].sender.clone());
        }

        let index = workers.len();
        let (sender, receiver) = channel::unbounded();
        let context = self.context.clone();
        thread::Builder::new()
            .name(format!("{}-{index}", self.name))
            .spawn(move || worker_loop(index, context, receiver))
            .map_err(|err| WorkerError::Spawn(err.to_string()))?;

        tracing::debug!(pool = %self.name, index, "spawned worker");
        workers.push(Worker {
            sender: sender.clone(),
        });
        Ok(sender)
    }
}

fn worker_loop<K, T, R>(
    index: usize,
    context: Arc<WorkerContext<K, R, T>>,
    receiver: Receiver<Envelope<K, T>>,
) where
    K: Eq + Hash,
    R: Clone,
{
    for Envelope { key, task } in receiver.iter() {
        let handler = context.handler.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || handler(task)))
            .map_err(|_| WorkerError::Panicked);
        if outcome.is_err() {
            tracing::error!(index, "worker task panicked");
        }
        context.complete(index, key, outcome);
    }
}
