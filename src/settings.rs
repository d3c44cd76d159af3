//! Settings persistence and sanitization
//!
//! Raw settings arrive as loosely-typed form input (every value a string,
//! checkboxes present or absent). [`sanitize`] turns that into a typed
//! [`Config`] or the full list of problems found.

use crate::ftp::DEFAULT_PORT;
use crate::models::{default_extensions, Config};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Settings as submitted. Absent fields take their default, not the
/// previously saved value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsInput {
    pub server: Option<String>,
    pub port: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub cdn_base_url: Option<String>,
    pub cdn_base_path: Option<String>,
    pub cdn_prefix: Option<String>,
    /// Comma-separated, e.g. `"mp4, webm"`.
    pub allowed_extensions: Option<String>,
    /// Checkbox semantics: any value means enabled.
    pub delete_local_after_upload: Option<String>,
}

impl SettingsInput {
    /// Form input that reproduces `config` when sanitized.
    pub fn from_config(config: &Config) -> Self {
        Self {
            server: Some(config.server.clone()),
            port: Some(config.port.to_string()),
            user: Some(config.user.clone()),
            password: Some(config.password.clone()),
            cdn_base_url: Some(config.cdn_base_url.clone()),
            cdn_base_path: Some(config.cdn_base_path.clone()),
            cdn_prefix: Some(config.cdn_prefix.clone()),
            allowed_extensions: Some(
                config
                    .allowed_extensions
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            delete_local_after_upload: config
                .delete_local_after_upload
                .then(|| "1".to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("port must be a number between 1 and 65535, got {0:?}")]
    InvalidPort(String),

    #[error("CDN URL must start with http:// or https://, got {0:?}")]
    InvalidCdnUrl(String),

    #[error("file type {0:?} must not contain slashes or whitespace")]
    InvalidExtension(String),
}

pub fn sanitize(input: SettingsInput) -> std::result::Result<Config, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let text = |value: Option<String>| value.map(|v| sanitize_text_field(&v)).unwrap_or_default();

    let port = match text(input.port).as_str() {
        "" => DEFAULT_PORT,
        raw => match raw.parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => {
                errors.push(ValidationError::InvalidPort(raw.to_string()));
                DEFAULT_PORT
            }
        },
    };

    let cdn_base_url = text(input.cdn_base_url);
    if !cdn_base_url.is_empty()
        && !cdn_base_url.starts_with("http://")
        && !cdn_base_url.starts_with("https://")
    {
        errors.push(ValidationError::InvalidCdnUrl(cdn_base_url.clone()));
    }

    let allowed_extensions = parse_extensions(
        input.allowed_extensions.as_deref().unwrap_or(""),
        &mut errors,
    );

    let config = Config {
        server: text(input.server),
        port,
        user: text(input.user),
        password: text(input.password),
        cdn_base_url,
        cdn_base_path: text(input.cdn_base_path),
        cdn_prefix: text(input.cdn_prefix),
        allowed_extensions,
        delete_local_after_upload: input.delete_local_after_upload.is_some(),
    };

    if errors.is_empty() {
        Ok(config)
    } else {
        Err(errors)
    }
}

fn parse_extensions(raw: &str, errors: &mut Vec<ValidationError>) -> BTreeSet<String> {
    let mut extensions = BTreeSet::new();

    for entry in raw.split(',') {
        let entry = entry.trim().trim_start_matches('.');
        if entry.is_empty() {
            continue;
        }
        if entry
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_whitespace())
        {
            errors.push(ValidationError::InvalidExtension(entry.to_string()));
            continue;
        }
        extensions.insert(entry.to_ascii_lowercase());
    }

    if extensions.is_empty() {
        default_extensions()
    } else {
        extensions
    }
}

/// Strips markup, folds control whitespace into spaces, collapses runs of
/// whitespace and trims.
pub fn sanitize_text_field(value: &str) -> String {
    let mut stripped = String::with_capacity(value.len());
    let mut in_tag = false;

    for c in value.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            _ => stripped.push(c),
        }
    }

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// JSON file holding the saved [`Config`].
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads saved settings; a missing file yields defaults.
    pub async fn load(&self) -> Result<Config> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => {
                let config: Config = serde_json::from_str(&json)?;
                Ok(config.normalized())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "No settings file at {}, using defaults",
                    self.path.display()
                );
                Ok(Config::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sanitizes and persists `input`, returning what was saved.
    pub async fn save(&self, input: SettingsInput) -> Result<Config> {
        let config = sanitize(input).map_err(Error::InvalidSettings)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&config)?;
        tokio::fs::write(&self.path, json).await?;

        info!("Saved settings to {}", self.path.display());
        Ok(config)
    }
}
