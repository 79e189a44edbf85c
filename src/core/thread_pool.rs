//! Shared worker pool for request handling and broadcast fan-out
//!
//! A bounded pool backed by its own runtime. All background execution in
//! the relay goes through here: transport adapters submit request handling,
//! channel workers submit fan-out jobs.

use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::constants::MIN_THREADS;
use crate::error::{ChatRelayError, Result};

/// Bounded pool of worker threads draining submitted tasks.
pub struct ThreadPool {
    /// Taken on shutdown; pending tasks are abandoned.
    runtime: Mutex<Option<Runtime>>,
    worker_count: usize,
    max_queued_tasks: usize,
    active_tasks: Arc<Mutex<usize>>,
}

impl ThreadPool {
    /// Create a pool with the given worker count (floored at the minimum)
    /// and in-flight task bound.
    pub fn new(worker_count: usize, max_queued_tasks: usize) -> Result<Self> {
        let actual_workers = worker_count.max(MIN_THREADS);

        let runtime = Builder::new_multi_thread()
            .worker_threads(actual_workers)
            .enable_io()
            .enable_time()
            .thread_name("chat-relay-worker")
            .build()
            .map_err(|e| {
                ChatRelayError::SystemError(format!("Failed to build thread pool runtime: {}", e))
            })?;

        info!(
            "Created thread pool with {} worker threads and {} max queued tasks",
            actual_workers, max_queued_tasks
        );

        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            worker_count: actual_workers,
            max_queued_tasks,
            active_tasks: Arc::new(Mutex::new(0)),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::new(config.thread_pool_size, config.max_queued_tasks)
    }

    /// Submit a task to the pool.
    ///
    /// Returns None when the pool is saturated or already stopped; the
    /// caller decides whether that is worth a rejection response.
    pub fn execute<F>(&self, future: F) -> Option<JoinHandle<F::Output>>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let mut active_count = match self.active_tasks.lock() {
            Ok(guard) => guard,
            Err(e) => {
                error!("Thread pool mutex poisoned: {}", e);
                return None;
            }
        };

        if *active_count >= self.max_queued_tasks {
            warn!(
                "Thread pool at capacity ({} active tasks), rejecting new task",
                *active_count
            );
            return None;
        }

        let runtime = match self.runtime.lock() {
            Ok(guard) => guard,
            Err(e) => {
                error!("Thread pool runtime mutex poisoned: {}", e);
                return None;
            }
        };
        let runtime = runtime.as_ref()?;

        *active_count += 1;
        let active_tasks = Arc::clone(&self.active_tasks);

        let handle = runtime.spawn(async move {
            let result = future.await;

            if let Ok(mut count) = active_tasks.lock() {
                *count = count.saturating_sub(1);
            }

            result
        });

        Some(handle)
    }

    /// Stop the pool. Running tasks finish on their own time; queued tasks
    /// that never started are abandoned.
    pub fn shutdown(&self) {
        if let Ok(mut runtime) = self.runtime.lock() {
            if let Some(rt) = runtime.take() {
                info!("Shutting down thread pool with {} workers", self.worker_count);
                rt.shutdown_background();
            }
        }
    }

    pub fn active_task_count(&self) -> Result<usize> {
        let count = self.active_tasks.lock().map_err(|e| {
            ChatRelayError::SystemError(format!("Failed to access active tasks counter: {}", e))
        })?;
        Ok(*count)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Shared thread pool handed to every component that runs background work.
pub type SharedThreadPool = Arc<ThreadPool>;

pub fn create_thread_pool(config: &ServerConfig) -> Result<SharedThreadPool> {
    let pool = ThreadPool::from_config(config)?;
    Ok(Arc::new(pool))
}
