//! Remote update-service abstraction.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CheckResponse, DownloadResponse, UpdateStatus};

/// The four operations the controller needs from an update service.
///
/// Each call is one request/response exchange. Implementations report an
/// explicit service-side error as [`ServiceError::Remote`] and everything
/// else (connection failure, bad status, malformed body) as
/// [`ServiceError::Transport`]. They must not retry or time out on their own
/// beyond what the transport does.
///
/// [`ServiceError::Remote`]: crate::error::ServiceError::Remote
/// [`ServiceError::Transport`]: crate::error::ServiceError::Transport
#[async_trait]
pub trait UpdateService: Send + Sync {
    /// Look up the newest version.
    async fn check(&self) -> Result<CheckResponse>;

    /// Start or finish fetching the payload for the newest version.
    ///
    /// `ready_to_install == false` means the service is still working;
    /// progress is then observed through [`UpdateService::status`].
    async fn download(&self) -> Result<DownloadResponse>;

    /// Install the payload identified by `extract_dir`.
    async fn install(&self, extract_dir: &str) -> Result<()>;

    /// Full status snapshot.
    async fn status(&self) -> Result<UpdateStatus>;
}
