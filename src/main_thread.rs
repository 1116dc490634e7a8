//! Work queue for calls that must run on one designated host thread
//!
//! Request tasks enqueue a closure through [`MainThreadDispatcher::run`] and
//! await its result; the host thread owns the [`MainThreadQueue`] and drains
//! it, either once per tick with [`MainThreadQueue::drain`] or as a dedicated
//! loop with [`MainThreadQueue::run_blocking`].

use std::panic::{self, AssertUnwindSafe};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::errors::{panic_message, AppError};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone)]
pub struct MainThreadDispatcher {
    sender: mpsc::UnboundedSender<Job>,
}

pub struct MainThreadQueue {
    receiver: mpsc::UnboundedReceiver<Job>,
}

pub fn channel() -> (MainThreadDispatcher, MainThreadQueue) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        MainThreadDispatcher { sender },
        MainThreadQueue { receiver },
    )
}

impl MainThreadDispatcher {
    /// Schedules `work` on the host thread and resolves once it has run.
    /// The calling task is suspended, never blocked.
    pub async fn run<F, T>(&self, work: F) -> Result<T, AppError>
    where
        F: FnOnce() -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, outcome) = oneshot::channel();
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
                Err(AppError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            });
            if reply.send(result).is_err() {
                debug!("main thread result dropped; caller went away");
            }
        });

        self.sender
            .send(job)
            .map_err(|_| AppError::DispatcherClosed)?;
        outcome.await.map_err(|_| AppError::DispatcherClosed)?
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl MainThreadQueue {
    /// Runs every job queued so far without waiting for more. Returns how
    /// many ran.
    pub fn drain(&mut self) -> usize {
        let mut executed = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            executed += 1;
        }
        executed
    }

    /// Blocks the current thread running jobs until every dispatcher is
    /// dropped. Must not be called from inside an async context.
    pub fn run_blocking(mut self) {
        while let Some(job) = self.receiver.blocking_recv() {
            job();
        }
        warn!("main thread queue closed; no dispatchers remain");
    }
}
