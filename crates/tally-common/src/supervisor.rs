use std::future::Future;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Owns the long-running background loops of a process.
///
/// Every loop gets its own stop signal. [`Supervisor::shutdown`] raises all
/// of them and returns once every loop has finished its current cycle and
/// exited.
#[derive(Default)]
pub struct Supervisor {
    tracker: TaskTracker,
    signals: Vec<(&'static str, CancellationToken)>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F, Fut>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stop = CancellationToken::new();
        self.signals.push((name, stop.clone()));
        let fut = task(stop);
        self.tracker.spawn(async move {
            fut.await;
            tracing::info!(task = name, "Background task stopped");
        });
        tracing::info!(task = name, "Background task started");
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub async fn shutdown(self) {
        for (name, stop) in &self.signals {
            tracing::debug!(task = name, "Signalling stop");
            stop.cancel();
        }
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_cycles() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::new();

        for name in ["a", "b"] {
            let finished = finished.clone();
            supervisor.spawn(name, move |stop| async move {
                stop.cancelled().await;
                // simulate a cycle that outlives the signal
                tokio::time::sleep(Duration::from_millis(20)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(supervisor.len(), 2);

        supervisor.shutdown().await;
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_supervisor_shuts_down_immediately() {
        let supervisor = Supervisor::new();
        assert!(supervisor.is_empty());
        supervisor.shutdown().await;
    }
}
