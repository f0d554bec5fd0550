//! # Update Controller
//!
//! Owns the update lifecycle state and sequences the remote operations.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ─► Checking ─┬─► UpToDate
//!                   └─► UpdateAvailable ─► Downloading ─► ReadyToInstall ─► Installing ─┬─► Installed
//!                                                                                      └─► Failed
//! ```
//!
//! Any active phase can end in `Failed`; the flag it raised is cleared and
//! the error message stays populated.
//!
//! ## Single writer
//!
//! Every mutation (check, download, install, status poll) goes through one
//! write lock, is never held across an `.await`, and publishes an immutable
//! [`ControllerSnapshot`] on a watch channel. Local download/install start
//! and finish bump an operation epoch; a status poll whose request straddled
//! an epoch change is discarded instead of overwriting newer local state.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::UpdateConfig;
use crate::error::UpdateError;
use crate::phase::{CheckOutcome, LastOutcome, Phase, PhaseInputs};
use crate::poller::{self, PollHandle};
use crate::service::UpdateService;
use crate::types::{UpdateInfo, UpdateStatus};
use crate::version::{self, VersionTuple};

/// Shown when a check fails without a usable message.
pub const CHECK_FAILED_FALLBACK: &str = "Network request failed, please check your connection";
/// Shown when a download fails without a usable message.
pub const DOWNLOAD_FAILED_FALLBACK: &str = "Download failed";
/// Shown when an install fails without a usable message.
pub const INSTALL_FAILED_FALLBACK: &str = "Install failed";
/// Recorded when install is requested with nothing staged.
pub const NO_UPDATE_TO_INSTALL: &str = "No update available to install";

/// Outcome flags meant to trigger a user-facing notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Signals {
    /// A newer version exists
    pub has_update: bool,
    /// Already on the newest version (only raised when asked for)
    pub is_latest: bool,
    /// The check itself failed
    pub check_failed: bool,
}

/// Local operations that hold the in-flight slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Download,
    Install,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Operation::Download => "download",
            Operation::Install => "install",
        }
    }

    fn fallback(self) -> &'static str {
        match self {
            Operation::Download => DOWNLOAD_FAILED_FALLBACK,
            Operation::Install => INSTALL_FAILED_FALLBACK,
        }
    }
}

/// A downloaded and unpacked payload, ready for install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedPayload {
    /// Opaque handle returned by the download
    pub extract_dir: String,
    /// `latest_version` known when the download started
    pub version: Option<String>,
}

/// Immutable view of the controller, published after every mutation.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    /// Increments with every published change
    pub revision: u64,
    pub phase: Phase,
    pub current_version: Option<String>,
    pub update_info: Option<UpdateInfo>,
    pub status: UpdateStatus,
    pub signals: Signals,
    /// Message of the last failed check
    pub check_error: Option<String>,
    pub extract_dir: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// State guarded by the controller's lock.
#[derive(Default)]
struct Inner {
    current_version: Option<String>,
    update_info: Option<UpdateInfo>,
    status: UpdateStatus,
    payload: Option<StagedPayload>,
    signals: Signals,
    check_error: Option<String>,
    last_outcome: Option<LastOutcome>,
    last_error: Option<UpdateError>,
    checks_in_flight: u32,
    operation: Option<Operation>,
    epoch: u64,
    revision: u64,
}

impl Inner {
    fn phase(&self) -> Phase {
        PhaseInputs {
            is_installing: self.status.is_installing,
            is_downloading: self.status.is_downloading,
            checking: self.checks_in_flight > 0,
            payload_staged: self.payload.is_some(),
            status_error: self.status.error_message.is_some(),
            last: self.last_outcome,
        }
        .derive()
    }

    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            revision: self.revision,
            phase: self.phase(),
            current_version: self.current_version.clone(),
            update_info: self.update_info.clone(),
            status: self.status.clone(),
            signals: self.signals,
            check_error: self.check_error.clone(),
            extract_dir: self.payload.as_ref().map(|p| p.extract_dir.clone()),
            updated_at: Utc::now(),
        }
    }

    /// Release the in-flight slot and the flag `op` raised.
    fn end_operation(&mut self, op: Operation) {
        self.operation = None;
        self.epoch += 1;
        match op {
            Operation::Download => self.status.is_downloading = false,
            Operation::Install => self.status.is_installing = false,
        }
    }

    fn record_failure(&mut self, op: Operation, err: UpdateError) {
        self.status.error_message = Some(err.user_message(op.fallback()));
        self.last_outcome = Some(match op {
            Operation::Download => LastOutcome::DownloadFailed,
            Operation::Install => LastOutcome::InstallFailed,
        });
        self.last_error = Some(err);
    }
}

/// Clears the in-flight flag if an operation future is dropped mid-call.
struct InFlight<'a> {
    controller: &'a UpdateController,
    op: Operation,
    armed: bool,
}

impl<'a> InFlight<'a> {
    /// Apply the operation's result and release the slot in one mutation.
    fn finish<R>(mut self, f: impl FnOnce(&mut Inner) -> R) -> R {
        self.armed = false;
        let op = self.op;
        self.controller.mutate(|inner| {
            inner.end_operation(op);
            f(inner)
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let op = self.op;
        warn!(operation = op.name(), "Operation dropped before the service answered");
        self.controller.mutate(|inner| {
            inner.end_operation(op);
            inner.record_failure(
                op,
                UpdateError::Transport(format!("{} interrupted", op.name())),
            );
        });
    }
}

/// Releases a check's in-flight count if the check future is dropped.
struct CheckInFlight<'a> {
    controller: &'a UpdateController,
    armed: bool,
}

impl CheckInFlight<'_> {
    /// Apply the check's result and release the count in one mutation.
    fn finish<R>(mut self, f: impl FnOnce(&mut Inner) -> R) -> R {
        self.armed = false;
        self.controller.mutate(|inner| {
            inner.checks_in_flight = inner.checks_in_flight.saturating_sub(1);
            f(inner)
        })
    }
}

impl Drop for CheckInFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Update check dropped before the service answered");
        self.controller.mutate(|inner| {
            inner.checks_in_flight = inner.checks_in_flight.saturating_sub(1);
        });
    }
}

/// Update-lifecycle controller.
///
/// One instance is meant to be shared (`Arc`) by every caller in the
/// process; all of them observe the same status.
pub struct UpdateController {
    service: Arc<dyn UpdateService>,
    config: UpdateConfig,
    inner: RwLock<Inner>,
    snapshot_tx: watch::Sender<ControllerSnapshot>,
}

impl UpdateController {
    /// Create a controller on top of `service`.
    pub fn new(service: Arc<dyn UpdateService>, config: UpdateConfig) -> Self {
        let inner = Inner::default();
        let (snapshot_tx, _) = watch::channel(inner.snapshot());
        Self {
            service,
            config,
            inner: RwLock::new(inner),
            snapshot_tx,
        }
    }

    /// Configuration the controller was built with.
    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    // =========================================================================
    // Remote operations
    // =========================================================================

    /// Ask the service whether a newer version exists.
    ///
    /// Never fails: a failed check raises the `check_failed` signal and
    /// records the message in `check_error`, touching nothing else. A
    /// successful check overwrites `current_version` and `update_info`, then
    /// raises `has_update`, or `is_latest` if `notify_if_latest` is set.
    #[instrument(skip(self))]
    pub async fn check_for_updates(&self, notify_if_latest: bool) -> CheckOutcome {
        self.mutate(|inner| {
            inner.checks_in_flight += 1;
            inner.signals = Signals::default();
            inner.check_error = None;
        });
        let guard = CheckInFlight {
            controller: self,
            armed: true,
        };

        let result = self.service.check().await;

        match result {
            Err(e) => {
                let err = UpdateError::from(e);
                let message = err.user_message(CHECK_FAILED_FALLBACK);
                error!(kind = err.kind(), error = %message, "Update check failed");
                guard.finish(|inner| {
                    inner.check_error = Some(message);
                    inner.signals.check_failed = true;
                    inner.last_outcome = Some(LastOutcome::Checked(CheckOutcome::Failed));
                    inner.last_error = Some(err);
                });
                CheckOutcome::Failed
            }
            Ok(response) => {
                info!(
                    current = %response.current_version,
                    latest = %response.latest_version,
                    has_update = response.has_update,
                    "Update check complete"
                );
                if response.has_update && !version::is_newer(&response.latest_version, &response.current_version) {
                    warn!(
                        current = %response.current_version,
                        latest = %response.latest_version,
                        "Update service reports an update that is not a newer version"
                    );
                }
                let invalidate = self.config.invalidate_stale_payload;
                guard.finish(|inner| {
                    inner.current_version = Some(response.current_version.clone());
                    inner.update_info = Some(response.update_info());

                    if invalidate {
                        let latest = VersionTuple::from(response.latest_version.as_str());
                        let stale = inner.payload.as_ref().is_some_and(|p| match &p.version {
                            Some(v) => VersionTuple::from(v.as_str()) != latest,
                            None => false,
                        });
                        if stale {
                            info!(latest = %response.latest_version, "Dropping payload staged for another version");
                            inner.payload = None;
                        }
                    }

                    let outcome = if response.has_update {
                        inner.signals.has_update = true;
                        CheckOutcome::UpdateAvailable
                    } else {
                        inner.signals.is_latest = notify_if_latest;
                        CheckOutcome::UpToDate
                    };
                    inner.last_outcome = Some(LastOutcome::Checked(outcome));
                    outcome
                })
            }
        }
    }

    /// Have the service fetch and unpack the payload.
    ///
    /// Returns true only when the payload is ready to install; its
    /// `extract_dir` is then staged. False with no error means the service
    /// is still working and progress must be observed by polling.
    /// `status.is_downloading` is false again on every exit path.
    ///
    /// A call while another download or install is in flight is rejected
    /// and leaves the status untouched.
    #[instrument(skip(self))]
    pub async fn download_update(&self) -> bool {
        let begin = self.mutate(|inner| {
            if let Some(op) = inner.operation {
                inner.last_error = Some(UpdateError::Busy(op.name()));
                return Err(op);
            }
            inner.operation = Some(Operation::Download);
            inner.epoch += 1;
            inner.status.is_downloading = true;
            inner.status.download_progress = 0.0;
            inner.status.error_message = None;
            inner.payload = None;
            Ok(inner.update_info.as_ref().map(|info| info.latest_version.clone()))
        });

        let target_version = match begin {
            Ok(version) => version,
            Err(op) => {
                warn!(in_flight = op.name(), "Download rejected, operation already in progress");
                return false;
            }
        };

        let guard = InFlight {
            controller: self,
            op: Operation::Download,
            armed: true,
        };

        info!(version = ?target_version, "Downloading update");
        let result = self.service.download().await;

        guard.finish(|inner| match result {
            Err(e) => {
                let err = UpdateError::from(e);
                error!(kind = err.kind(), error = %err, "Update download failed");
                inner.record_failure(Operation::Download, err);
                false
            }
            Ok(response) if response.ready_to_install => match response.extract_dir {
                Some(dir) if !dir.is_empty() => {
                    info!(extract_dir = %dir, "Update payload ready to install");
                    inner.status.download_progress = 100.0;
                    inner.payload = Some(StagedPayload {
                        extract_dir: dir,
                        version: target_version,
                    });
                    inner.last_outcome = Some(LastOutcome::Downloaded);
                    true
                }
                _ => {
                    let err = UpdateError::Transport(
                        "Update service reported a ready payload without an extract dir".to_string(),
                    );
                    error!(error = %err, "Update download failed");
                    inner.record_failure(Operation::Download, err);
                    false
                }
            },
            Ok(_) => {
                info!("Download continues on the update service");
                inner.last_outcome = Some(LastOutcome::DownloadPending);
                false
            }
        })
    }

    /// Install the staged payload.
    ///
    /// Fails without any remote call if nothing is staged. The staged
    /// payload is left in place whatever the outcome.
    #[instrument(skip(self))]
    pub async fn install_update(&self) -> bool {
        enum Begin {
            Busy(Operation),
            NothingStaged,
            Go(String),
        }

        let begin = self.mutate(|inner| {
            if let Some(op) = inner.operation {
                inner.last_error = Some(UpdateError::Busy(op.name()));
                return Begin::Busy(op);
            }
            let Some(dir) = inner.payload.as_ref().map(|p| p.extract_dir.clone()) else {
                inner.record_failure(
                    Operation::Install,
                    UpdateError::Precondition(NO_UPDATE_TO_INSTALL.to_string()),
                );
                return Begin::NothingStaged;
            };
            inner.operation = Some(Operation::Install);
            inner.epoch += 1;
            inner.status.is_installing = true;
            inner.status.error_message = None;
            Begin::Go(dir)
        });

        let extract_dir = match begin {
            Begin::Go(dir) => dir,
            Begin::Busy(op) => {
                warn!(in_flight = op.name(), "Install rejected, operation already in progress");
                return false;
            }
            Begin::NothingStaged => {
                warn!("Install requested with no downloaded update");
                return false;
            }
        };

        let guard = InFlight {
            controller: self,
            op: Operation::Install,
            armed: true,
        };

        info!(extract_dir = %extract_dir, "Installing update");
        let result = self.service.install(&extract_dir).await;

        guard.finish(|inner| match result {
            Err(e) => {
                let err = UpdateError::from(e);
                error!(kind = err.kind(), error = %err, "Update install failed");
                inner.record_failure(Operation::Install, err);
                false
            }
            Ok(()) => {
                info!("Update installed");
                inner.last_outcome = Some(LastOutcome::Installed);
                true
            }
        })
    }

    /// Fetch the service's status and replace the local one with it.
    ///
    /// The replacement is wholesale, never a merge. Failures are logged and
    /// swallowed. A response is discarded if a local download or install
    /// started or finished while it was in flight.
    ///
    /// Returns the snapshot the service sent, applied or not.
    pub async fn poll_status(&self) -> Option<UpdateStatus> {
        let epoch = self.read_inner().epoch;

        let status = match self.service.status().await {
            Ok(status) => status.normalized(),
            Err(e) => {
                warn!(error = %e, "Failed to poll update status");
                return None;
            }
        };

        let mut inner = self.write_inner();
        if inner.epoch == epoch {
            inner.status = status.clone();
            self.publish(&mut *inner);
            debug!(
                downloading = status.is_downloading,
                installing = status.is_installing,
                progress = status.download_progress,
                "Update status polled"
            );
        } else {
            debug!("Discarding status poll that raced a local operation");
        }
        Some(status)
    }

    /// Poll every `interval` until a poll shows no download or install.
    pub fn start_polling(self: &Arc<Self>, interval: Duration) -> PollHandle {
        poller::spawn(Arc::clone(self), interval)
    }

    /// [`start_polling`](Self::start_polling) with the configured interval.
    pub fn start_polling_default(self: &Arc<Self>) -> PollHandle {
        self.start_polling(self.config.poll_interval_duration())
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Latest published snapshot.
    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.read_inner().phase()
    }

    pub fn status(&self) -> UpdateStatus {
        self.read_inner().status.clone()
    }

    pub fn signals(&self) -> Signals {
        self.read_inner().signals
    }

    pub fn current_version(&self) -> Option<String> {
        self.read_inner().current_version.clone()
    }

    pub fn update_info(&self) -> Option<UpdateInfo> {
        self.read_inner().update_info.clone()
    }

    pub fn extract_dir(&self) -> Option<String> {
        self.read_inner().payload.as_ref().map(|p| p.extract_dir.clone())
    }

    pub fn staged_payload(&self) -> Option<StagedPayload> {
        self.read_inner().payload.clone()
    }

    pub fn check_error(&self) -> Option<String> {
        self.read_inner().check_error.clone()
    }

    /// The most recent failure of any operation, including rejections.
    pub fn last_error(&self) -> Option<UpdateError> {
        self.read_inner().last_error.clone()
    }

    /// Lower all dialog signals, e.g. once the user closed the dialog.
    pub fn dismiss_signals(&self) {
        self.mutate(|inner| inner.signals = Signals::default());
    }

    // =========================================================================
    // State plumbing
    // =========================================================================

    fn read_inner(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &mut Inner) {
        inner.revision += 1;
        self.snapshot_tx.send_replace(inner.snapshot());
    }

    /// Apply `f` under the write lock and publish the result.
    fn mutate<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.write_inner();
        let result = f(&mut *inner);
        self.publish(&mut *inner);
        result
    }
}
