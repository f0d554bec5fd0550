//! # upkeep Core
//!
//! Update-lifecycle controller for a running application instance.
//!
//! The controller decides whether a newer version exists, has the update
//! service fetch and install it, and keeps one consistent status view while
//! that happens:
//! - **version** - permissive dotted-version comparison
//! - **controller** - lifecycle state, remote operations, snapshots
//! - **poller** - cancellable background status polling
//! - **http** - the update service over HTTP/JSON
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           UpdateController              │
//! │  (check, download, install, poll)       │──► watch::Receiver<ControllerSnapshot>
//! └─────────────────────┬───────────────────┘
//!                       │
//!              UpdateService trait
//!                       │
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │ HttpUpdateService │     │ MockUpdateService │
//! │     (reqwest)     │     │    (in-memory)    │
//! └───────────────────┘     └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use upkeep_core::{HttpUpdateService, UpdateConfig, UpdateController};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = UpdateConfig::default();
//!     let service = Arc::new(HttpUpdateService::new(&config)?);
//!     let controller = Arc::new(UpdateController::new(service, config));
//!
//!     controller.check_for_updates(false).await;
//!     if controller.download_update().await {
//!         controller.install_update().await;
//!     } else {
//!         controller.start_polling_default().wait().await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod mock;
pub mod phase;
pub mod poller;
pub mod service;
pub mod types;
pub mod version;

pub use config::{parse_duration, UpdateConfig, DEFAULT_POLL_INTERVAL};
pub use controller::{ControllerSnapshot, Signals, StagedPayload, UpdateController};
pub use error::{ServiceError, UpdateError};
pub use http::HttpUpdateService;
pub use mock::MockUpdateService;
pub use phase::{CheckOutcome, Phase};
pub use poller::{PollCanceller, PollExit, PollHandle};
pub use service::UpdateService;
pub use types::{CheckResponse, DownloadResponse, InstallRequest, UpdateInfo, UpdateStatus};
pub use version::VersionTuple;
