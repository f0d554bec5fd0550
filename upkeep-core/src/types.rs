//! Data exchanged with the update service and held by the controller.

use serde::{Deserialize, Serialize};

/// Release the last successful check reported.
///
/// Replaced wholesale by the next successful check, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    /// Newest version the service knows about
    pub latest_version: String,

    /// Where the payload for `latest_version` lives
    pub download_url: String,

    /// Free-form release notes, if the service sent any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
}

/// What is happening right now.
///
/// Written only by the controller: by its own download/install operations
/// and by status polls, which replace the whole value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateStatus {
    /// A payload download is in flight
    #[serde(alias = "isDownloading")]
    pub is_downloading: bool,

    /// An install is in flight
    #[serde(alias = "isInstalling")]
    pub is_installing: bool,

    /// Download progress, 0 to 100
    #[serde(alias = "downloadProgress")]
    pub download_progress: f64,

    /// Message of the last download/install failure
    #[serde(alias = "errorMessage")]
    pub error_message: Option<String>,
}

impl UpdateStatus {
    /// True while either a download or an install is running.
    pub fn is_busy(&self) -> bool {
        self.is_downloading || self.is_installing
    }

    /// Clamp progress into `0..=100`; NaN becomes 0.
    pub fn normalized(mut self) -> Self {
        self.download_progress = if self.download_progress.is_nan() {
            0.0
        } else {
            self.download_progress.clamp(0.0, 100.0)
        };
        self
    }
}

/// Successful answer of the check operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    /// Whether `latest_version` is newer than `current_version`
    #[serde(default)]
    pub has_update: bool,

    /// Version the running instance reports
    #[serde(default)]
    pub current_version: String,

    /// Newest version available
    #[serde(default)]
    pub latest_version: String,

    /// Payload location for `latest_version`
    #[serde(default)]
    pub download_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
}

impl CheckResponse {
    /// Split out the release description the controller keeps.
    pub fn update_info(&self) -> UpdateInfo {
        UpdateInfo {
            latest_version: self.latest_version.clone(),
            download_url: self.download_url.clone(),
            release_notes: self.release_notes.clone(),
        }
    }
}

/// Successful answer of the download operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResponse {
    /// The payload is downloaded and unpacked
    #[serde(default)]
    pub ready_to_install: bool,

    /// Opaque handle of the unpacked payload, required by install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_dir: Option<String>,
}

impl DownloadResponse {
    /// A payload that is ready, with the handle to install it.
    pub fn ready(extract_dir: impl Into<String>) -> Self {
        Self {
            ready_to_install: true,
            extract_dir: Some(extract_dir.into()),
        }
    }

    /// The service accepted the request but is still downloading.
    pub fn pending() -> Self {
        Self::default()
    }
}

/// Request body of the install operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRequest {
    pub extract_dir: String,
}
