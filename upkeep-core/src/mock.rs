//! In-memory update service for testing and development.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{Result, ServiceError};
use crate::service::UpdateService;
use crate::types::{CheckResponse, DownloadResponse, UpdateStatus};

/// Scripted responses: queued ones first, then the last one forever.
struct Script<T> {
    queue: VecDeque<T>,
    fallback: T,
}

impl<T: Clone> Script<T> {
    fn new(fallback: T) -> Self {
        Self {
            queue: VecDeque::new(),
            fallback,
        }
    }

    fn next(&mut self) -> T {
        match self.queue.pop_front() {
            Some(value) => {
                self.fallback = value.clone();
                value
            }
            None => self.fallback.clone(),
        }
    }
}

/// Holds calls of one operation until released.
///
/// Each held call signals [`Gate::entered`] and then waits for one
/// [`Gate::release`].
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until a call reached the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one held call continue.
    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// Number of calls per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub check: usize,
    pub download: usize,
    pub install: usize,
    pub status: usize,
}

/// Mock update service.
///
/// Defaults: check reports "1.0.0" up to date, download is immediately
/// ready at `/tmp/upkeep/extracted`, install succeeds, status is idle.
/// Useful for:
/// - Unit and integration testing of the controller
/// - Running the agent without a backend (`--mock`)
pub struct MockUpdateService {
    check: Mutex<Script<Result<CheckResponse>>>,
    download: Mutex<Script<Result<DownloadResponse>>>,
    install: Mutex<Script<Result<()>>>,
    status: Mutex<Script<Result<UpdateStatus>>>,
    check_gate: Mutex<Option<Arc<Gate>>>,
    download_gate: Mutex<Option<Arc<Gate>>>,
    status_gate: Mutex<Option<Arc<Gate>>>,
    installed_dirs: Mutex<Vec<String>>,
    check_calls: AtomicUsize,
    download_calls: AtomicUsize,
    install_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl MockUpdateService {
    /// Create a new mock service.
    pub fn new() -> Self {
        debug!("Creating mock update service");
        Self {
            check: Mutex::new(Script::new(Ok(Self::up_to_date("1.0.0")))),
            download: Mutex::new(Script::new(Ok(DownloadResponse::ready("/tmp/upkeep/extracted")))),
            install: Mutex::new(Script::new(Ok(()))),
            status: Mutex::new(Script::new(Ok(UpdateStatus::default()))),
            check_gate: Mutex::new(None),
            download_gate: Mutex::new(None),
            status_gate: Mutex::new(None),
            installed_dirs: Mutex::new(Vec::new()),
            check_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            install_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    /// Check response announcing `latest` over `current`.
    pub fn update_available(current: &str, latest: &str) -> CheckResponse {
        CheckResponse {
            has_update: true,
            current_version: current.to_string(),
            latest_version: latest.to_string(),
            download_url: format!("https://updates.example.com/upkeep-v{}.zip", latest),
            release_notes: None,
        }
    }

    /// Check response for an instance already at the newest version.
    pub fn up_to_date(version: &str) -> CheckResponse {
        CheckResponse {
            has_update: false,
            current_version: version.to_string(),
            latest_version: version.to_string(),
            download_url: String::new(),
            release_notes: None,
        }
    }

    /// Status snapshot with the given flags.
    pub fn busy_status(downloading: bool, installing: bool, progress: f64) -> UpdateStatus {
        UpdateStatus {
            is_downloading: downloading,
            is_installing: installing,
            download_progress: progress,
            error_message: None,
        }
    }

    /// Answer every later check with `response`.
    pub fn set_check(&self, response: Result<CheckResponse>) {
        Self::with_script(&self.check, |s| {
            s.queue.clear();
            s.fallback = response;
        });
    }

    /// Answer the next check with `response`.
    pub fn push_check(&self, response: Result<CheckResponse>) {
        Self::with_script(&self.check, |s| s.queue.push_back(response));
    }

    /// Answer every later download with `response`.
    pub fn set_download(&self, response: Result<DownloadResponse>) {
        Self::with_script(&self.download, |s| {
            s.queue.clear();
            s.fallback = response;
        });
    }

    /// Answer the next download with `response`.
    pub fn push_download(&self, response: Result<DownloadResponse>) {
        Self::with_script(&self.download, |s| s.queue.push_back(response));
    }

    /// Answer every later install with `response`.
    pub fn set_install(&self, response: Result<()>) {
        Self::with_script(&self.install, |s| {
            s.queue.clear();
            s.fallback = response;
        });
    }

    /// Answer every later status poll with `response`.
    pub fn set_status(&self, response: Result<UpdateStatus>) {
        Self::with_script(&self.status, |s| {
            s.queue.clear();
            s.fallback = response;
        });
    }

    /// Answer the next status polls with `responses`, in order. The last
    /// one keeps being returned afterwards.
    pub fn push_statuses<I>(&self, responses: I)
    where
        I: IntoIterator<Item = Result<UpdateStatus>>,
    {
        Self::with_script(&self.status, |s| s.queue.extend(responses));
    }

    /// Hold every later check until the returned gate releases it.
    pub fn hold_checks(&self) -> Arc<Gate> {
        Self::install_gate(&self.check_gate)
    }

    /// Hold every later download until the returned gate releases it.
    pub fn hold_downloads(&self) -> Arc<Gate> {
        Self::install_gate(&self.download_gate)
    }

    /// Hold every later status poll until the returned gate releases it.
    pub fn hold_status(&self) -> Arc<Gate> {
        Self::install_gate(&self.status_gate)
    }

    /// Calls received so far.
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            check: self.check_calls.load(Ordering::SeqCst),
            download: self.download_calls.load(Ordering::SeqCst),
            install: self.install_calls.load(Ordering::SeqCst),
            status: self.status_calls.load(Ordering::SeqCst),
        }
    }

    /// `extract_dir` arguments of every install call, in order.
    pub fn installed_dirs(&self) -> Vec<String> {
        self.installed_dirs
            .lock()
            .map(|dirs| dirs.clone())
            .unwrap_or_default()
    }

    fn with_script<T>(script: &Mutex<Script<T>>, f: impl FnOnce(&mut Script<T>)) {
        let mut guard = script.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard);
    }

    fn next<T: Clone>(script: &Mutex<Script<Result<T>>>) -> Result<T> {
        script
            .lock()
            .map_err(|_| ServiceError::Transport("Lock poisoned".to_string()))?
            .next()
    }

    fn install_gate(slot: &Mutex<Option<Arc<Gate>>>) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(Arc::clone(&gate));
        gate
    }

    fn current_gate(slot: &Mutex<Option<Arc<Gate>>>) -> Option<Arc<Gate>> {
        slot.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Default for MockUpdateService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpdateService for MockUpdateService {
    async fn check(&self) -> Result<CheckResponse> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = Self::current_gate(&self.check_gate) {
            gate.pass().await;
        }
        Self::next(&self.check)
    }

    async fn download(&self) -> Result<DownloadResponse> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = Self::current_gate(&self.download_gate) {
            gate.pass().await;
        }
        Self::next(&self.download)
    }

    async fn install(&self, extract_dir: &str) -> Result<()> {
        self.install_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut dirs) = self.installed_dirs.lock() {
            dirs.push(extract_dir.to_string());
        }
        Self::next(&self.install)
    }

    async fn status(&self) -> Result<UpdateStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = Self::current_gate(&self.status_gate) {
            gate.pass().await;
        }
        Self::next(&self.status)
    }
}
