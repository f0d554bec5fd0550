//! Lifecycle phase of the controller.
//!
//! The phase is never stored. It is derived from the flags the controller
//! already keeps, so it cannot drift out of sync with them.

use serde::{Deserialize, Serialize};

/// Where the update lifecycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing has happened yet
    Idle,
    /// A check is in flight
    Checking,
    /// Last check found no newer version
    UpToDate,
    /// Last check found a newer version, nothing downloaded for it
    UpdateAvailable,
    /// A payload download is running (locally or on the service)
    Downloading,
    /// A payload is staged and can be installed
    ReadyToInstall,
    /// An install is running
    Installing,
    /// The last install succeeded
    Installed,
    /// The last operation failed. A failed check with a payload still
    /// staged reads `ReadyToInstall` instead, since install can proceed.
    Failed,
}

impl Phase {
    /// True for phases with work in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Checking | Phase::Downloading | Phase::Installing)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Checking => "checking",
            Phase::UpToDate => "up to date",
            Phase::UpdateAvailable => "update available",
            Phase::Downloading => "downloading",
            Phase::ReadyToInstall => "ready to install",
            Phase::Installing => "installing",
            Phase::Installed => "installed",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of a completed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    UpdateAvailable,
    UpToDate,
    Failed,
}

/// The most recent operation that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastOutcome {
    Checked(CheckOutcome),
    /// Payload staged locally
    Downloaded,
    /// The service accepted the download but is still working on it
    DownloadPending,
    DownloadFailed,
    Installed,
    InstallFailed,
}

/// Inputs the phase is derived from.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseInputs {
    pub is_installing: bool,
    pub is_downloading: bool,
    pub checking: bool,
    pub payload_staged: bool,
    pub status_error: bool,
    pub last: Option<LastOutcome>,
}

impl PhaseInputs {
    /// In-flight flags win, then the last completed outcome decides.
    pub fn derive(&self) -> Phase {
        if self.is_installing {
            return Phase::Installing;
        }
        if self.is_downloading {
            return Phase::Downloading;
        }
        if self.checking {
            return Phase::Checking;
        }
        match self.last {
            None => Phase::Idle,
            Some(LastOutcome::Checked(CheckOutcome::Failed)) => {
                if self.payload_staged {
                    Phase::ReadyToInstall
                } else {
                    Phase::Failed
                }
            }
            Some(LastOutcome::Checked(CheckOutcome::UpToDate)) => Phase::UpToDate,
            Some(LastOutcome::Checked(CheckOutcome::UpdateAvailable)) | Some(LastOutcome::DownloadPending) => {
                if self.payload_staged {
                    Phase::ReadyToInstall
                } else if self.status_error {
                    Phase::Failed
                } else {
                    Phase::UpdateAvailable
                }
            }
            Some(LastOutcome::Downloaded) => Phase::ReadyToInstall,
            Some(LastOutcome::Installed) => Phase::Installed,
            Some(LastOutcome::DownloadFailed) | Some(LastOutcome::InstallFailed) => Phase::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn after(last: LastOutcome) -> PhaseInputs {
        PhaseInputs {
            last: Some(last),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_is_idle() {
        assert_eq!(PhaseInputs::default().derive(), Phase::Idle);
    }

    #[test]
    fn test_active_flags_take_priority() {
        let inputs = PhaseInputs {
            is_installing: true,
            is_downloading: true,
            last: Some(LastOutcome::InstallFailed),
            ..Default::default()
        };
        assert_eq!(inputs.derive(), Phase::Installing);

        let inputs = PhaseInputs {
            is_downloading: true,
            checking: true,
            ..Default::default()
        };
        assert_eq!(inputs.derive(), Phase::Downloading);

        let inputs = PhaseInputs {
            checking: true,
            ..after(LastOutcome::Installed)
        };
        assert_eq!(inputs.derive(), Phase::Checking);
    }

    #[test]
    fn test_check_outcomes() {
        assert_eq!(after(LastOutcome::Checked(CheckOutcome::UpdateAvailable)).derive(), Phase::UpdateAvailable);
        assert_eq!(after(LastOutcome::Checked(CheckOutcome::UpToDate)).derive(), Phase::UpToDate);
        assert_eq!(after(LastOutcome::Checked(CheckOutcome::Failed)).derive(), Phase::Failed);
    }

    #[test]
    fn test_recheck_keeps_staged_payload_installable() {
        let inputs = PhaseInputs {
            payload_staged: true,
            ..after(LastOutcome::Checked(CheckOutcome::UpdateAvailable))
        };
        assert_eq!(inputs.derive(), Phase::ReadyToInstall);

        let inputs = PhaseInputs {
            payload_staged: true,
            ..after(LastOutcome::Checked(CheckOutcome::Failed))
        };
        assert_eq!(inputs.derive(), Phase::ReadyToInstall);
    }

    #[test]
    fn test_pending_download_reports_polled_error() {
        assert_eq!(after(LastOutcome::DownloadPending).derive(), Phase::UpdateAvailable);
        let inputs = PhaseInputs {
            status_error: true,
            ..after(LastOutcome::DownloadPending)
        };
        assert_eq!(inputs.derive(), Phase::Failed);
    }

    #[test]
    fn test_terminal_outcomes() {
        assert_eq!(after(LastOutcome::Downloaded).derive(), Phase::ReadyToInstall);
        assert_eq!(after(LastOutcome::Installed).derive(), Phase::Installed);
        assert_eq!(after(LastOutcome::DownloadFailed).derive(), Phase::Failed);
        assert_eq!(after(LastOutcome::InstallFailed).derive(), Phase::Failed);
        assert!(Phase::Downloading.is_active());
        assert!(!Phase::UpToDate.is_active());
    }
}
