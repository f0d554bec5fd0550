//! Background status polling.
//!
//! Polls the controller's `poll_status` on a fixed interval until a poll shows
//! neither a download nor an install in flight, or until cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::controller::UpdateController;

/// Shortest interval the poller accepts.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Why a polling task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// A poll showed the service idle
    Completed { polls: u32 },
    /// [`PollHandle::cancel`] was called
    Cancelled { polls: u32 },
    /// The task panicked or was aborted by the runtime
    Aborted,
}

/// Cancels a polling task; can be cloned and outlive its [`PollHandle`].
#[derive(Clone)]
pub struct PollCanceller(Arc<watch::Sender<bool>>);

impl PollCanceller {
    /// See [`PollHandle::cancel`].
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Handle to a running polling task.
///
/// Dropping the handle detaches the task; it keeps polling until the
/// service goes idle.
pub struct PollHandle {
    cancel_tx: Arc<watch::Sender<bool>>,
    task: JoinHandle<PollExit>,
}

impl PollHandle {
    /// Stop issuing polls. A poll already in flight still completes and is
    /// applied. Safe to call repeatedly and after the task ended on its own.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Cancel from elsewhere while [`wait`](Self::wait) owns the handle.
    pub fn canceller(&self) -> PollCanceller {
        PollCanceller(Arc::clone(&self.cancel_tx))
    }

    /// True once the task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end.
    pub async fn wait(self) -> PollExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                warn!(error = %e, "Status polling task did not finish cleanly");
                PollExit::Aborted
            }
        }
    }
}

/// Spawn a polling task on the current runtime.
pub(crate) fn spawn(controller: Arc<UpdateController>, interval: Duration) -> PollHandle {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let cancel_tx = Arc::new(cancel_tx);
    let task = tokio::spawn(run(controller, interval.max(MIN_INTERVAL), cancel_rx, Arc::clone(&cancel_tx)));
    PollHandle { cancel_tx, task }
}

async fn run(
    controller: Arc<UpdateController>,
    period: Duration,
    mut cancel_rx: watch::Receiver<bool>,
    // Held so `changed()` never reports a closed channel once the handle is dropped.
    _cancel_tx: Arc<watch::Sender<bool>>,
) -> PollExit {
    info!(interval_ms = period.as_millis() as u64, "Starting status polling");

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel_rx.changed() => {
                if *cancel_rx.borrow_and_update() {
                    info!(polls, "Status polling cancelled");
                    return PollExit::Cancelled { polls };
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        polls = polls.saturating_add(1);

        // Decide on the response itself; a failed poll falls back to the
        // shared status.
        let busy = match controller.poll_status().await {
            Some(status) => status.is_busy(),
            None => controller.status().is_busy(),
        };

        if !busy {
            info!(polls, "Update service idle, status polling stopped");
            return PollExit::Completed { polls };
        }
        debug!(polls, "Update still in progress");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpdateConfig;
    use crate::error::ServiceError;
    use crate::mock::MockUpdateService;

    fn polling_controller(mock: &Arc<MockUpdateService>) -> Arc<UpdateController> {
        Arc::new(UpdateController::new(mock.clone(), UpdateConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_idle() {
        let mock = Arc::new(MockUpdateService::new());
        mock.push_statuses([
            Ok(MockUpdateService::busy_status(true, false, 20.0)),
            Ok(MockUpdateService::busy_status(true, false, 80.0)),
            Ok(MockUpdateService::busy_status(false, true, 100.0)),
            Ok(MockUpdateService::busy_status(false, false, 100.0)),
        ]);
        let controller = polling_controller(&mock);

        let exit = controller.start_polling(Duration::from_millis(500)).wait().await;

        assert_eq!(exit, PollExit::Completed { polls: 4 });
        assert_eq!(mock.calls().status, 4);
        assert!(!controller.status().is_busy());
        assert_eq!(controller.status().download_progress, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_waits_one_interval() {
        let mock = Arc::new(MockUpdateService::new());
        mock.set_status(Ok(MockUpdateService::busy_status(true, false, 1.0)));
        let controller = polling_controller(&mock);

        let handle = controller.start_polling(Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(mock.calls().status, 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(mock.calls().status, 1);

        handle.cancel();
        assert_eq!(handle.wait().await, PollExit::Cancelled { polls: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_future_polls() {
        let mock = Arc::new(MockUpdateService::new());
        mock.set_status(Ok(MockUpdateService::busy_status(true, false, 50.0)));
        let controller = polling_controller(&mock);

        let handle = controller.start_polling(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(350)).await;
        handle.cancel();
        handle.cancel();
        let exit = handle.wait().await;

        assert_eq!(exit, PollExit::Cancelled { polls: 3 });
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(mock.calls().status, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_lets_inflight_poll_land() {
        let mock = Arc::new(MockUpdateService::new());
        let gate = mock.hold_status();
        mock.set_status(Ok(MockUpdateService::busy_status(true, false, 30.0)));
        let controller = polling_controller(&mock);

        let handle = controller.start_polling(Duration::from_millis(100));
        gate.entered().await;
        handle.cancel();
        gate.release();

        assert_eq!(handle.wait().await, PollExit::Cancelled { polls: 1 });
        assert!(controller.status().is_downloading);
        assert_eq!(controller.status().download_progress, 30.0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(mock.calls().status, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_completion_is_harmless() {
        let mock = Arc::new(MockUpdateService::new());
        let controller = polling_controller(&mock);

        let handle = controller.start_polling(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());

        handle.cancel();
        assert_eq!(handle.wait().await, PollExit::Completed { polls: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_polls_keep_polling_while_local_work_runs() {
        let mock = Arc::new(MockUpdateService::new());
        let gate = mock.hold_downloads();
        mock.set_status(Err(ServiceError::Transport("connection refused".into())));
        let controller = polling_controller(&mock);

        let download = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.download_update().await }
        });
        gate.entered().await;

        let handle = controller.start_polling(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(!handle.is_finished());
        assert_eq!(mock.calls().status, 3);

        gate.release();
        assert!(download.await.unwrap());
        assert!(matches!(handle.wait().await, PollExit::Completed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_keeps_polling() {
        let mock = Arc::new(MockUpdateService::new());
        mock.push_statuses([
            Ok(MockUpdateService::busy_status(true, false, 10.0)),
            Ok(MockUpdateService::busy_status(true, false, 60.0)),
            Ok(MockUpdateService::busy_status(false, false, 100.0)),
        ]);
        let controller = polling_controller(&mock);

        drop(controller.start_polling(Duration::from_millis(100)));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(mock.calls().status, 3);
        assert!(!controller.status().is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_canceller_stops_waited_task() {
        let mock = Arc::new(MockUpdateService::new());
        mock.set_status(Ok(MockUpdateService::busy_status(false, true, 100.0)));
        let controller = polling_controller(&mock);

        let handle = controller.start_polling(Duration::from_millis(100));
        let canceller = handle.canceller();
        let waiter = tokio::spawn(handle.wait());

        tokio::time::sleep(Duration::from_millis(250)).await;
        canceller.cancel();

        assert_eq!(waiter.await.unwrap(), PollExit::Cancelled { polls: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let mock = Arc::new(MockUpdateService::new());
        let controller = polling_controller(&mock);

        let exit = controller.start_polling(Duration::ZERO).wait().await;
        assert_eq!(exit, PollExit::Completed { polls: 1 });
    }
}
