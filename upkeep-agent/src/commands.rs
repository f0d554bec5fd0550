//! Subcommand implementations.
//!
//! Every command builds on one shared controller. The staged payload only
//! lives inside that controller, so `install` has to check and download in
//! the same process.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use upkeep_core::{CheckOutcome, ControllerSnapshot, PollExit, UpdateController};

use crate::cli::Command;

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::Failure => ExitCode::FAILURE,
        }
    }
}

/// Run `command` against `controller`.
pub async fn dispatch(controller: &Arc<UpdateController>, command: &Command) -> Result<Outcome> {
    match command {
        Command::Check { notify_if_latest } => check(controller, *notify_if_latest).await,
        Command::Download => download(controller).await,
        Command::Install => install(controller).await,
        Command::Status => status(controller).await,
        Command::Watch => watch(controller).await,
        Command::Run => run(controller).await,
    }
}

pub async fn check(controller: &Arc<UpdateController>, notify_if_latest: bool) -> Result<Outcome> {
    let outcome = controller.check_for_updates(notify_if_latest).await;
    report_check(controller, outcome);
    print_snapshot(&controller.snapshot())?;
    Ok(match outcome {
        CheckOutcome::Failed => Outcome::Failure,
        _ => Outcome::Success,
    })
}

pub async fn download(controller: &Arc<UpdateController>) -> Result<Outcome> {
    let outcome = controller.check_for_updates(true).await;
    report_check(controller, outcome);
    if outcome != CheckOutcome::UpdateAvailable {
        return Ok(failure_if(outcome == CheckOutcome::Failed));
    }

    if !download_to_completion(controller).await {
        report_status_error(controller);
        return Ok(Outcome::Failure);
    }

    if let Some(dir) = controller.extract_dir() {
        println!("Update downloaded to {}", dir);
    }
    Ok(Outcome::Success)
}

pub async fn install(controller: &Arc<UpdateController>) -> Result<Outcome> {
    let outcome = controller.check_for_updates(true).await;
    report_check(controller, outcome);
    if outcome != CheckOutcome::UpdateAvailable {
        return Ok(failure_if(outcome == CheckOutcome::Failed));
    }

    if !download_to_completion(controller).await {
        report_status_error(controller);
        return Ok(Outcome::Failure);
    }

    install_staged(controller).await
}

pub async fn status(controller: &Arc<UpdateController>) -> Result<Outcome> {
    match controller.poll_status().await {
        Some(status) => {
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(Outcome::Success)
        }
        None => {
            eprintln!("Could not fetch update status");
            Ok(Outcome::Failure)
        }
    }
}

pub async fn watch(controller: &Arc<UpdateController>) -> Result<Outcome> {
    let mut snapshots = controller.subscribe();
    let handle = controller.start_polling_default();
    let canceller = handle.canceller();
    let finished = handle.wait();
    tokio::pin!(finished);
    let mut interrupted = false;

    let exit = loop {
        tokio::select! {
            exit = &mut finished => break exit,
            Ok(()) = snapshots.changed() => {
                print_progress(&snapshots.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                info!("Interrupted, stopping status polling");
                interrupted = true;
                canceller.cancel();
            }
        }
    };

    let final_snapshot = controller.snapshot();
    print_progress(&final_snapshot);
    info!(?exit, "Watch finished");

    Ok(match exit {
        PollExit::Completed { .. } => failure_if(final_snapshot.status.error_message.is_some()),
        PollExit::Cancelled { .. } => Outcome::Success,
        PollExit::Aborted => Outcome::Failure,
    })
}

/// Check, then download and install as far as configuration allows.
pub async fn run(controller: &Arc<UpdateController>) -> Result<Outcome> {
    let config = controller.config();
    if !config.enabled {
        info!("Update checks are disabled in configuration");
        return Ok(Outcome::Success);
    }

    let outcome = controller.check_for_updates(false).await;
    report_check(controller, outcome);
    match outcome {
        CheckOutcome::Failed => return Ok(Outcome::Failure),
        CheckOutcome::UpToDate => return Ok(Outcome::Success),
        CheckOutcome::UpdateAvailable => {}
    }

    if !config.auto_download {
        println!("Set updates.auto_download to download it automatically, or run `upkeep install`");
        return Ok(Outcome::Success);
    }

    if !download_to_completion(controller).await {
        report_status_error(controller);
        return Ok(Outcome::Failure);
    }

    if !config.auto_install {
        println!("Update downloaded and ready to install");
        return Ok(Outcome::Success);
    }

    install_staged(controller).await
}

/// Download, waiting out a download the service runs in the background.
///
/// The service answers a second download request with the finished
/// payload once polling shows it idle.
pub async fn download_to_completion(controller: &Arc<UpdateController>) -> bool {
    if controller.download_update().await {
        return true;
    }
    if controller.status().error_message.is_some() {
        return false;
    }

    info!("Waiting for the update service to finish downloading");
    let exit = controller.start_polling_default().wait().await;
    if !matches!(exit, PollExit::Completed { .. }) || controller.status().error_message.is_some() {
        return false;
    }

    if controller.download_update().await {
        return true;
    }
    if controller.status().error_message.is_none() {
        warn!("Update service finished downloading but did not hand over a payload");
    }
    false
}

async fn install_staged(controller: &Arc<UpdateController>) -> Result<Outcome> {
    if controller.install_update().await {
        println!("Update installed, restart the application to finish");
        Ok(Outcome::Success)
    } else {
        report_status_error(controller);
        Ok(Outcome::Failure)
    }
}

fn failure_if(failed: bool) -> Outcome {
    if failed {
        Outcome::Failure
    } else {
        Outcome::Success
    }
}

fn report_check(controller: &UpdateController, outcome: CheckOutcome) {
    match outcome {
        CheckOutcome::UpdateAvailable => {
            let current = controller.current_version().unwrap_or_default();
            let latest = controller
                .update_info()
                .map(|info| info.latest_version)
                .unwrap_or_default();
            println!("Update available: {} -> {}", current, latest);
        }
        CheckOutcome::UpToDate => {
            let current = controller.current_version().unwrap_or_default();
            println!("Already on the latest version ({})", current);
        }
        CheckOutcome::Failed => {
            eprintln!(
                "Update check failed: {}",
                controller.check_error().unwrap_or_default()
            );
        }
    }
}

fn report_status_error(controller: &UpdateController) {
    match controller.status().error_message {
        Some(message) => eprintln!("Update failed: {}", message),
        None => eprintln!("Update failed"),
    }
}

fn print_snapshot(snapshot: &ControllerSnapshot) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(snapshot)?);
    Ok(())
}

fn print_progress(snapshot: &ControllerSnapshot) {
    let status = &snapshot.status;
    if let Some(message) = &status.error_message {
        println!("{:<16} error: {}", snapshot.phase, message);
    } else if snapshot.phase.is_active() {
        println!("{:<16} {:>5.1}%", snapshot.phase, status.download_progress);
    } else {
        println!("{}", snapshot.phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upkeep_core::{DownloadResponse, MockUpdateService, Phase, ServiceError, UpdateConfig};

    fn controller(mock: &Arc<MockUpdateService>, config: UpdateConfig) -> Arc<UpdateController> {
        Arc::new(UpdateController::new(mock.clone(), config))
    }

    fn auto_config() -> UpdateConfig {
        UpdateConfig {
            auto_download: true,
            auto_install: true,
            poll_interval: "10ms".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_check_failure_exits_nonzero() {
        let mock = Arc::new(MockUpdateService::new());
        mock.set_check(Err(ServiceError::Transport("connection refused".into())));
        let controller = controller(&mock, UpdateConfig::default());

        assert_eq!(check(&controller, false).await.unwrap(), Outcome::Failure);
    }

    #[tokio::test]
    async fn test_run_without_auto_download_stops_after_check() {
        let mock = Arc::new(MockUpdateService::new());
        mock.set_check(Ok(MockUpdateService::update_available("1.0.0", "1.1.0")));
        let controller = controller(&mock, UpdateConfig::default());

        assert_eq!(run(&controller).await.unwrap(), Outcome::Success);
        assert_eq!(mock.calls().download, 0);
        assert_eq!(controller.phase(), Phase::UpdateAvailable);
    }

    #[tokio::test]
    async fn test_run_installs_when_allowed() {
        let mock = Arc::new(MockUpdateService::new());
        mock.set_check(Ok(MockUpdateService::update_available("1.0.0", "1.1.0")));
        let controller = controller(&mock, auto_config());

        assert_eq!(run(&controller).await.unwrap(), Outcome::Success);
        assert_eq!(mock.installed_dirs(), vec!["/tmp/upkeep/extracted".to_string()]);
        assert_eq!(controller.phase(), Phase::Installed);
    }

    #[tokio::test]
    async fn test_run_when_disabled_does_nothing() {
        let mock = Arc::new(MockUpdateService::new());
        let config = UpdateConfig {
            enabled: false,
            ..Default::default()
        };
        let controller = controller(&mock, config);

        assert_eq!(run(&controller).await.unwrap(), Outcome::Success);
        assert_eq!(mock.calls().check, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_waits_for_background_download() {
        let mock = Arc::new(MockUpdateService::new());
        mock.push_download(Ok(DownloadResponse::pending()));
        mock.push_download(Ok(DownloadResponse::ready("/tmp/upkeep/v1.1.0")));
        mock.push_statuses([
            Ok(MockUpdateService::busy_status(true, false, 40.0)),
            Ok(MockUpdateService::busy_status(false, false, 100.0)),
        ]);
        let controller = controller(&mock, auto_config());

        assert!(download_to_completion(&controller).await);
        assert_eq!(controller.extract_dir().as_deref(), Some("/tmp/upkeep/v1.1.0"));
        assert_eq!(mock.calls().download, 2);
        assert_eq!(mock.calls().status, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_reports_background_failure() {
        let mock = Arc::new(MockUpdateService::new());
        mock.set_download(Ok(DownloadResponse::pending()));
        mock.set_status(Ok(upkeep_core::UpdateStatus {
            error_message: Some("checksum mismatch".to_string()),
            ..Default::default()
        }));
        let controller = controller(&mock, auto_config());

        assert!(!download_to_completion(&controller).await);
        assert_eq!(mock.calls().download, 1);
        assert_eq!(controller.phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn test_install_failure_exits_nonzero() {
        let mock = Arc::new(MockUpdateService::new());
        mock.set_check(Ok(MockUpdateService::update_available("1.0.0", "1.1.0")));
        mock.set_install(Err(ServiceError::Remote("Dev builds cannot self-update".into())));
        let controller = controller(&mock, UpdateConfig::default());

        assert_eq!(install(&controller).await.unwrap(), Outcome::Failure);
        assert_eq!(mock.calls().install, 1);
    }

    #[tokio::test]
    async fn test_status_failure_exits_nonzero() {
        let mock = Arc::new(MockUpdateService::new());
        mock.set_status(Err(ServiceError::Transport("connection refused".into())));
        let controller = controller(&mock, UpdateConfig::default());

        assert_eq!(status(&controller).await.unwrap(), Outcome::Failure);
    }
}
