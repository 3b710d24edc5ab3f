use std::sync::Arc;

use crate::queue::BoundedQueue;

/// Where a subscription delivers incoming payloads.
pub(crate) enum DataHandler<T> {
    /// Store for later retrieval
    Queue(Arc<BoundedQueue<T>>),

    /// Process immediately on the connection's task
    Callback(Arc<dyn Fn(T) + Send + Sync>),
}

impl<T> DataHandler<T> {
    /// Returns `true` if the handler had to drop an older item to make room.
    pub(crate) fn handle(&self, data: T) -> bool {
        match self {
            DataHandler::Queue(queue) => queue.push(data),
            DataHandler::Callback(cb) => {
                cb(data);
                false
            }
        }
    }
}

impl<T> Clone for DataHandler<T> {
    fn clone(&self) -> Self {
        match self {
            DataHandler::Queue(queue) => DataHandler::Queue(queue.clone()),
            DataHandler::Callback(cb) => DataHandler::Callback(cb.clone()),
        }
    }
}

/// Run `task` on the current runtime. Used from `Drop` impls, which may run
/// after the runtime is gone; the task is skipped then.
pub(crate) fn spawn_detached<F>(what: &str, task: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => tracing::debug!("No runtime left to {}", what),
    }
}
