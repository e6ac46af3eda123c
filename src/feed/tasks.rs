//! Background task plumbing shared by the engine's spawn sites.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;

use super::events::{FeedEvent, TaskKind};

/// Wraps a future to catch panics and convert them to errors.
///
/// # Returns
///
/// - `Ok(result)` if the future completes normally
/// - `Err(panic_message)` if the future panics
pub(crate) async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else if let Some(e) = panic.downcast_ref::<Box<dyn std::error::Error + Send>>() {
                e.to_string()
            } else {
                format!("Unknown panic: {:?}", (*panic).type_id())
            }
        })
}

/// Spawn `work` and deliver its event, or `TaskPanicked` if it panics.
pub(crate) fn spawn_reporting<F>(task: TaskKind, tx: mpsc::Sender<FeedEvent>, work: F)
where
    F: std::future::Future<Output = FeedEvent> + Send + 'static,
{
    tokio::spawn(async move {
        let event = match catch_task_panic(work).await {
            Ok(event) => event,
            Err(panic_msg) => {
                tracing::error!(task = task.name(), error = %panic_msg, "Background task panicked");
                FeedEvent::TaskPanicked {
                    task,
                    error: panic_msg,
                }
            }
        };

        if let Err(e) = tx.send(event).await {
            tracing::warn!(task = task.name(), error = %e, "Channel send failed (receiver dropped)");
        }
    });
}
