//! Guarded side-effect tasks.
//!
//! Cache writes, invalidations and lazy session cleanup must never fail or
//! crash the request that triggered them. Each one runs under a timeout with
//! panics caught, and its outcome is only logged.

use futures::FutureExt;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

/// Upper bound for a single side-effect task.
pub const SIDE_EFFECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs `task` to completion on the current task, containing every failure.
///
/// Returns true when the task finished without error.
pub async fn run_guarded<F, E>(label: &'static str, task: F) -> bool
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(SIDE_EFFECT_TIMEOUT, AssertUnwindSafe(task).catch_unwind()).await {
        Ok(Ok(Ok(()))) => {
            tracing::debug!(task = label, "Side effect completed");
            true
        }
        Ok(Ok(Err(e))) => {
            tracing::warn!(task = label, error = %e, "Side effect failed");
            false
        }
        Ok(Err(panic)) => {
            tracing::error!(task = label, panic = panic_message(&*panic), "Panic in side effect");
            false
        }
        Err(_) => {
            tracing::warn!(task = label, timeout = ?SIDE_EFFECT_TIMEOUT, "Side effect timed out");
            false
        }
    }
}

/// Detaches `task` onto the runtime under the same guard as [`run_guarded`].
pub fn spawn_guarded<F, E>(label: &'static str, task: F)
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        run_guarded(label, task).await;
    });
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_success_and_error() {
        assert!(run_guarded("ok", async { Ok::<(), String>(()) }).await);
        assert!(!run_guarded("err", async { Err::<(), _>("boom".to_string()) }).await);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let finished = run_guarded("panics", async {
            if true {
                panic!("cache exploded");
            }
            Ok::<(), String>(())
        })
        .await;

        assert!(!finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let finished = run_guarded("slow", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), String>(())
        })
        .await;

        assert!(!finished);
    }

    #[tokio::test]
    async fn test_spawned_task_runs() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        spawn_guarded("flag", async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<(), String>(())
        });

        for _ in 0..100 {
            if ran.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(ran.load(Ordering::SeqCst));
    }
}
