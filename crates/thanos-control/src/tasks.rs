//! Bounded worker pool running identified, individually cancellable jobs.
//!
//! Jobs are drawn FIFO from a bounded queue by a fixed set of workers; each
//! job gets a fresh cancellation token derived from the manager's root
//! token. [`TaskManager::stop_task`] cancels the job currently *running*
//! under an id and is a no-op for queued or unknown ids. Submitting a
//! duplicate id while the first is still running overwrites the older
//! mapping; callers compose ids from the stack id and action name, and the
//! orchestrator's state guards are the real duplicate defence.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type Job = Box<dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

struct Task {
    id: String,
    job: Job,
}

/// Bounded worker pool with per-task cancellation.
pub struct TaskManager {
    worker_count: usize,
    tx: mpsc::Sender<Task>,
    rx: Mutex<Option<mpsc::Receiver<Task>>>,
    running: Arc<DashMap<String, CancellationToken>>,
    root: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskManager {
    /// Create a manager with `worker_count` workers and a queue of
    /// `queue_capacity` pending jobs. Both must be positive.
    #[must_use]
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be positive");
        assert!(queue_capacity > 0, "queue_capacity must be positive");

        let (tx, rx) = mpsc::channel(queue_capacity);
        Self {
            worker_count,
            tx,
            rx: Mutex::new(Some(rx)),
            running: Arc::new(DashMap::new()),
            root: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Launch the worker loops. Idempotent: later calls do nothing.
    pub async fn start(&self) {
        let Some(rx) = self.rx.lock().await.take() else {
            return;
        };
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = self.workers.lock().await;
        for worker_id in 0..self.worker_count {
            let rx = Arc::clone(&rx);
            let running = Arc::clone(&self.running);
            let root = self.root.clone();
            workers.push(tokio::spawn(async move {
                worker_loop(worker_id, rx, running, root).await;
            }));
        }
        info!(workers = self.worker_count, "task manager started");
    }

    /// Enqueue a job under `id`. Blocks while the queue is full.
    pub async fn add_task<F, Fut>(&self, id: impl Into<String>, job: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = id.into();
        debug!(task_id = %id, "queueing task");
        let task = Task {
            id,
            job: Box::new(move |token| Box::pin(job(token))),
        };
        // Send only fails once the manager has been stopped and the
        // receiver dropped; the job is discarded in that case.
        self.tx.send(task).await.ok();
    }

    /// Cancel the job currently running under `id`. No-op if the id is not
    /// running (including while it is still queued).
    pub fn stop_task(&self, id: &str) {
        if let Some(token) = self.running.get(id) {
            info!(task_id = %id, "cancelling running task");
            token.cancel();
        }
    }

    /// Cancel every running job and wait for the workers to finish.
    pub async fn stop(&self) {
        self.root.cancel();
        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            worker.await.ok();
        }
        info!("task manager stopped");
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("worker_count", &self.worker_count)
            .finish_non_exhaustive()
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    running: Arc<DashMap<String, CancellationToken>>,
    root: CancellationToken,
) {
    loop {
        let task = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;

                () = root.cancelled() => {
                    debug!(worker_id, "worker exiting");
                    return;
                }

                task = rx.recv() => match task {
                    Some(task) => task,
                    None => return,
                },
            }
        };

        let token = root.child_token();
        running.insert(task.id.clone(), token.clone());
        debug!(worker_id, task_id = %task.id, "running task");
        (task.job)(token).await;
        running.remove(&task.id);
        debug!(worker_id, task_id = %task.id, "task finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    #[tokio::test]
    async fn runs_queued_tasks() {
        let manager = TaskManager::new(2, 10);
        manager.start().await;

        let counter = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(Notify::new());
        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            let done = Arc::clone(&done);
            manager
                .add_task(uuid::Uuid::new_v4().to_string(), move |_token| async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 4 {
                        done.notify_one();
                    }
                })
                .await;
        }

        timeout(Duration::from_secs(5), done.notified())
            .await
            .expect("all tasks should run");
        assert_eq!(counter.load(Ordering::SeqCst), 5);

        manager.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_task_cancels_the_running_job() {
        let manager = TaskManager::new(1, 10);
        manager.start().await;

        let started = Arc::new(Notify::new());
        let observed = Arc::new(Notify::new());
        {
            let started = Arc::clone(&started);
            let observed = Arc::clone(&observed);
            manager
                .add_task("deploy-thanos-stack-1", move |token| async move {
                    started.notify_one();
                    token.cancelled().await;
                    observed.notify_one();
                })
                .await;
        }

        timeout(Duration::from_secs(5), started.notified())
            .await
            .expect("task should start");

        manager.stop_task("deploy-thanos-stack-1");

        timeout(Duration::from_secs(5), observed.notified())
            .await
            .expect("task should observe cancellation");

        manager.stop().await;
    }

    #[tokio::test]
    async fn stop_task_is_a_noop_for_unknown_ids() {
        let manager = TaskManager::new(1, 4);
        manager.start().await;
        manager.stop_task("never-submitted");
        manager.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallelism_is_bounded_by_worker_count() {
        let manager = TaskManager::new(2, 16);
        manager.start().await;

        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(Notify::new());
        let remaining = Arc::new(AtomicUsize::new(6));

        for i in 0..6 {
            let concurrent = Arc::clone(&concurrent);
            let peak = Arc::clone(&peak);
            let done = Arc::clone(&done);
            let remaining = Arc::clone(&remaining);
            manager
                .add_task(format!("task-{i}"), move |_token| async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                        done.notify_one();
                    }
                })
                .await;
        }

        timeout(Duration::from_secs(5), done.notified())
            .await
            .expect("all tasks should finish");
        assert!(peak.load(Ordering::SeqCst) <= 2);

        manager.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_cancels_running_tasks_and_joins_workers() {
        let manager = TaskManager::new(2, 4);
        manager.start().await;

        let started = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicUsize::new(0));
        {
            let started = Arc::clone(&started);
            let cancelled = Arc::clone(&cancelled);
            manager
                .add_task("long-runner", move |token| async move {
                    started.notify_one();
                    token.cancelled().await;
                    cancelled.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        timeout(Duration::from_secs(5), started.notified())
            .await
            .expect("task should start");

        timeout(Duration::from_secs(5), manager.stop())
            .await
            .expect("stop should drain workers");
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }
}
