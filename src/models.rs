//! Data models and structures
//!
//! Defines the CDN settings, per-attachment CDN metadata, upload outcomes and
//! the process environment the CLI runs in.

use crate::ftp::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_EXTENSION: &str = "mp4";

/// CDN settings, loaded once and treated as read-only for the duration of an
/// upload, resolve or diagnostic run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub server: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub cdn_base_url: String,
    pub cdn_base_path: String,
    pub cdn_prefix: String,
    pub allowed_extensions: BTreeSet<String>,
    pub delete_local_after_upload: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: DEFAULT_PORT,
            user: String::new(),
            password: String::new(),
            cdn_base_url: String::new(),
            cdn_base_path: String::new(),
            cdn_prefix: String::new(),
            allowed_extensions: default_extensions(),
            delete_local_after_upload: false,
        }
    }
}

pub fn default_extensions() -> BTreeSet<String> {
    BTreeSet::from([DEFAULT_EXTENSION.to_string()])
}

impl Config {
    /// Restores the lowercase, non-empty extension invariant on data read
    /// from disk.
    pub fn normalized(mut self) -> Self {
        self.allowed_extensions = self
            .allowed_extensions
            .into_iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        if self.allowed_extensions.is_empty() {
            self.allowed_extensions = default_extensions();
        }
        self
    }

    /// Case-insensitive membership test against the allow-list.
    pub fn allows_extension(&self, extension: &str) -> bool {
        self.allowed_extensions
            .contains(&extension.to_ascii_lowercase())
    }

    pub fn has_credentials(&self) -> bool {
        !self.server.is_empty() && !self.user.is_empty() && !self.password.is_empty()
    }
}

/// Result of one upload attempt. Only its effect on a [`MediaRecord`] is
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success {
        remote_url: String,
        remote_filename: String,
    },
    Failure {
        reason: String,
    },
}

impl UploadOutcome {
    pub fn failure(reason: &str) -> Self {
        Self::Failure {
            reason: reason.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// CDN metadata attached to one media item.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaRecord {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn_upload_error: Option<String>,
}

impl MediaRecord {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Records an upload attempt. A failure leaves any earlier `cdn_url` in
    /// place alongside the new error.
    pub fn apply(&mut self, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Success {
                remote_url,
                remote_filename,
            } => {
                self.cdn_url = Some(remote_url.clone());
                self.cdn_filename = Some(remote_filename.clone());
                self.cdn_upload_error = None;
            }
            UploadOutcome::Failure { reason } => {
                self.cdn_upload_error = Some(reason.clone());
            }
        }
    }

    /// The stored CDN URL, if one is set and non-empty.
    pub fn cdn_url(&self) -> Option<&str> {
        self.cdn_url.as_deref().filter(|url| !url.is_empty())
    }

    pub fn status(&self) -> CdnStatus {
        if self.cdn_url().is_some() {
            return CdnStatus::OnCdn;
        }
        match self.cdn_upload_error.as_deref() {
            Some(error) if !error.is_empty() => CdnStatus::Failed(error.to_string()),
            _ => CdnStatus::NotUploaded,
        }
    }
}

/// Human-facing CDN state of a media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdnStatus {
    OnCdn,
    Failed(String),
    NotUploaded,
}

impl fmt::Display for CdnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnCdn => write!(f, "✓ On CDN"),
            Self::Failed(reason) => write!(f, "✗ {}", reason),
            Self::NotUploaded => Ok(()),
        }
    }
}

/// Who is asking for a diagnostic run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub can_manage_options: bool,
}

impl Caller {
    pub fn administrator() -> Self {
        Self {
            can_manage_options: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticResponse {
    pub success: bool,
    pub message: String,
}

// Environment
#[derive(Debug, Clone)]
pub struct Environment {
    pub settings_path: PathBuf,
    pub media_db_path: PathBuf,
    pub media_root: PathBuf,
}

impl Environment {
    /// Reads `.env` if present; unset variables fall back to defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            settings_path: std::env::var("FTP_CDN_SETTINGS")
                .unwrap_or_else(|_| "ftp_cdn_settings.json".to_string())
                .into(),
            media_db_path: std::env::var("FTP_CDN_MEDIA_DB")
                .unwrap_or_else(|_| "ftp_cdn_media.json".to_string())
                .into(),
            media_root: std::env::var("FTP_CDN_MEDIA_ROOT")
                .unwrap_or_else(|_| "uploads".to_string())
                .into(),
        }
    }
}
