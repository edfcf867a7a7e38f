//! Event handler trait and dispatch helper.

use crate::executor::{ExecutorError, KeyedExecutor};
use crate::task::{TaskStats, TaskStatus};
use log::error;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

/// A component that reacts to one kind of event.
///
/// A handler may implement this trait for several event types. Events for
/// which [`EventHandler::key`] returns equal keys are processed strictly one
/// after another; the handler must tolerate concurrent calls for distinct keys.
pub trait EventHandler<E>: Send + Sync + 'static {
    /// Serialisation key type.
    type Key: Hash;
    /// Error returned by [`EventHandler::handle`].
    type Error: Display;

    /// Returns the name of this handler (for logging).
    fn name(&self) -> &str;

    /// Returns the key that orders this event relative to others.
    fn key(&self, event: &E) -> Self::Key;

    /// Processes one event.
    fn handle(&self, event: E) -> Result<(), Self::Error>;
}

/// Queues `event` for `handler` on the executor shard owning its key.
///
/// The outcome is recorded in `stats`; handler errors are logged, not
/// returned, since the caller has moved on by the time the event runs.
pub fn dispatch<E, H>(
    executor: &KeyedExecutor,
    handler: &Arc<H>,
    event: E,
    stats: &Arc<TaskStats>,
) -> Result<(), ExecutorError>
where
    E: Send + 'static,
    H: EventHandler<E>,
{
    let key = handler.key(&event);
    let handler = Arc::clone(handler);
    let job_stats = Arc::clone(stats);

    let queued = executor.execute(&key, move || match handler.handle(event) {
        Ok(()) => job_stats.record(TaskStatus::Success),
        Err(e) => {
            error!("{}: event processing failed: {}", handler.name(), e);
            job_stats.record(TaskStatus::Failed);
        }
    });

    if queued.is_err() {
        stats.record(TaskStatus::Rejected);
    }
    queued
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::KeyedExecutorConfig;
    use crate::task::TaskStatsSnapshot;
    use pretty_assertions::assert_eq;
    use parking_lot::Mutex;

    struct Recorder {
        seen: Mutex<Vec<(String, u32)>>,
    }

    impl EventHandler<(String, u32)> for Recorder {
        type Key = String;
        type Error = String;

        fn name(&self) -> &str {
            "Recorder"
        }

        fn key(&self, event: &(String, u32)) -> String {
            event.0.clone()
        }

        fn handle(&self, event: (String, u32)) -> Result<(), String> {
            if event.1 == 0 {
                return Err("zero".to_string());
            }
            self.seen.lock().push(event);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_records_outcomes() {
        let executor = KeyedExecutor::new(KeyedExecutorConfig::new("dispatch").with_workers(2));
        let handler = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let stats = Arc::new(TaskStats::default());

        for value in [1, 0, 2] {
            dispatch(&executor, &handler, ("a".to_string(), value), &stats).unwrap();
        }
        executor.flush().await;

        assert_eq!(
            handler.seen.lock().clone(),
            vec![("a".to_string(), 1), ("a".to_string(), 2)]
        );
        assert_eq!(
            stats.snapshot(),
            TaskStatsSnapshot {
                success: 2,
                failed: 1,
                rejected: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_is_rejected() {
        let executor = KeyedExecutor::new(KeyedExecutorConfig::default());
        executor.shutdown().await;
        let handler = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let stats = Arc::new(TaskStats::default());

        assert!(dispatch(&executor, &handler, ("a".to_string(), 1), &stats).is_err());
        assert_eq!(stats.snapshot().rejected, 1);
    }
}
