//! Host-facing service wiring uploads, URL rewriting and diagnostics together.

use crate::ftp::{FtpConnector, TcpFtpConnector};
use crate::media::{JsonMediaStore, MediaStore};
use crate::models::{CdnStatus, Caller, Config, DiagnosticResponse, Environment, UploadOutcome};
use crate::resolver;
use crate::settings::SettingsStore;
use crate::tester;
use crate::uploader::Uploader;
use crate::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub const CONFIGURE_NOTICE: &str = "FTP CDN Uploader: Please configure your FTP settings.";

/// Holds the settings for one process and answers the host's integration
/// calls. Nothing here is global; hosts construct one and pass it around.
pub struct App {
    config: Config,
    connector: Arc<dyn FtpConnector>,
    uploader: Uploader,
    media: Box<dyn MediaStore>,
    in_flight: Mutex<HashSet<u64>>,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub connector: Arc<dyn FtpConnector>,
    pub media: Box<dyn MediaStore>,
}

impl App {
    pub fn with_services(services: AppServices, config: Config, media_root: PathBuf) -> Self {
        Self {
            config,
            uploader: Uploader::new(Arc::clone(&services.connector), media_root),
            connector: services.connector,
            media: services.media,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Construct an app from the process environment (`Environment::from_env`).
    pub async fn new() -> Result<Self> {
        let env = Environment::from_env();
        let config = SettingsStore::new(&env.settings_path).load().await?;

        info!(
            "Loaded settings from {} (media root {})",
            env.settings_path.display(),
            env.media_root.display()
        );

        Ok(Self::with_services(
            AppServices {
                connector: Arc::new(TcpFtpConnector),
                media: Box::new(JsonMediaStore::new(env.media_db_path)),
            },
            config,
            env.media_root,
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Called once a new attachment has been written to `local_path`.
    /// Returns `None` when the file type is not uploaded to the CDN.
    pub async fn handle_attachment_added(
        &self,
        id: u64,
        local_path: &Path,
    ) -> Result<Option<UploadOutcome>> {
        let _claim = InFlight::claim(&self.in_flight, id)?;

        // Read first: an unreadable store must fail before the file moves.
        let mut record = self.media.get(id).await?;

        let Some(outcome) = self.uploader.upload(local_path, &self.config).await else {
            return Ok(None);
        };

        record.apply(&outcome);
        self.media.put(&record).await?;

        match &outcome {
            UploadOutcome::Success { remote_url, .. } => {
                info!("Media {} available at {}", id, remote_url)
            }
            UploadOutcome::Failure { reason } => warn!("Media {} not uploaded: {}", id, reason),
        }
        Ok(Some(outcome))
    }

    /// URL the host should publish for attachment `id`.
    pub async fn resolve_attachment_url(&self, url: &str, id: u64) -> Result<String> {
        let record = self.media.get(id).await?;
        Ok(resolver::resolve(url, &record, &self.config))
    }

    pub async fn run_diagnostic(&self, caller: &Caller) -> DiagnosticResponse {
        if !caller.can_manage_options {
            return DiagnosticResponse {
                success: false,
                message: "Unauthorized access".to_string(),
            };
        }

        match tester::test_connection(self.connector.as_ref(), &self.config).await {
            Ok(()) => DiagnosticResponse {
                success: true,
                message: "Connection successful".to_string(),
            },
            Err(failure) => DiagnosticResponse {
                success: false,
                message: failure.to_string(),
            },
        }
    }

    pub async fn status(&self, id: u64) -> Result<CdnStatus> {
        Ok(self.media.get(id).await?.status())
    }

    /// Warning to show administrators while credentials are incomplete.
    pub fn admin_notice(&self) -> Option<&'static str> {
        (!self.config.has_credentials()).then_some(CONFIGURE_NOTICE)
    }
}

/// Marks a media id as being uploaded until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<u64>>,
    id: u64,
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a Mutex<HashSet<u64>>, id: u64) -> Result<Self> {
        let mut ids = set
            .lock()
            .map_err(|_| Error::Invariant("in-flight set poisoned".to_string()))?;
        if !ids.insert(id) {
            return Err(Error::Busy(id));
        }
        Ok(Self { set, id })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut ids) = self.set.lock() {
            ids.remove(&self.id);
        }
    }
}
