//! Pushes a newly added media file to the CDN origin over FTP.

use crate::ftp::{FtpConnector, CONNECT_TIMEOUT};
use crate::models::{Config, UploadOutcome};
use crate::resolver::{extension_of, stem_of};
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reported for both an unreachable server and rejected credentials.
pub const CONNECTION_FAILED: &str = "FTP connection failed";
pub const UPLOAD_FAILED: &str = "Upload failed";

pub struct Uploader {
    connector: Arc<dyn FtpConnector>,
    media_root: PathBuf,
}

impl Uploader {
    pub fn new(connector: Arc<dyn FtpConnector>, media_root: impl Into<PathBuf>) -> Self {
        Self {
            connector,
            media_root: media_root.into(),
        }
    }

    /// Uploads `local_path` and reports where it landed.
    ///
    /// Returns `None` without touching the network when the file's extension
    /// is not on the allow-list. Every FTP failure is folded into a
    /// [`UploadOutcome::Failure`]; nothing is retried.
    pub async fn upload(&self, local_path: &Path, config: &Config) -> Option<UploadOutcome> {
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = match extension_of(&name) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => {
                debug!("Skipping {}: no extension", local_path.display());
                return None;
            }
        };
        if !config.allows_extension(&extension) {
            debug!(
                "Skipping {}: extension {:?} not allowed",
                local_path.display(),
                extension
            );
            return None;
        }

        let filename = remote_filename(stem_of(&name), &extension, Utc::now().timestamp());
        let remote = remote_path(
            &config.cdn_base_path,
            &self.media_root,
            local_path,
            &filename,
        );

        let outcome = self.transfer(local_path, &remote, config).await;
        let outcome = match outcome {
            Ok(()) => UploadOutcome::Success {
                remote_url: format!("{}{}/{}", config.cdn_base_url, config.cdn_prefix, remote),
                remote_filename: filename,
            },
            Err(reason) => return Some(UploadOutcome::failure(reason)),
        };

        if config.delete_local_after_upload {
            match tokio::fs::remove_file(local_path).await {
                Ok(()) => debug!("Deleted local copy {}", local_path.display()),
                Err(e) => debug!(
                    "Could not delete local copy {}: {}",
                    local_path.display(),
                    e
                ),
            }
        }

        Some(outcome)
    }

    async fn transfer(
        &self,
        local_path: &Path,
        remote_path: &str,
        config: &Config,
    ) -> std::result::Result<(), &'static str> {
        let mut session = self
            .connector
            .connect(&config.server, config.port, CONNECT_TIMEOUT)
            .await
            .map_err(|e| {
                warn!("Could not connect to {}: {}", config.server, e);
                CONNECTION_FAILED
            })?;

        if let Err(e) = session.login(&config.user, &config.password).await {
            warn!("Login to {} failed: {}", config.server, e);
            session.close().await;
            return Err(CONNECTION_FAILED);
        }

        if let Err(e) = session.enter_passive_mode().await {
            debug!("Passive mode not confirmed, continuing: {}", e);
        }

        match session.put_file(remote_path, local_path).await {
            Ok(bytes) => {
                info!(
                    "Uploaded {} to {} ({} bytes)",
                    local_path.display(),
                    remote_path,
                    bytes
                );
                session.close().await;
                Ok(())
            }
            Err(e) => {
                warn!("Upload of {} failed: {}", local_path.display(), e);
                session.close().await;
                Err(UPLOAD_FAILED)
            }
        }
    }
}

/// `{stem}_{timestamp}.{extension}`. Two uploads of the same stem within one
/// second produce the same name.
pub fn remote_filename(stem: &str, extension: &str, timestamp: i64) -> String {
    format!("{}_{}.{}", stem, timestamp, extension)
}

/// Mirrors the file's location under `media_root` beneath `base_path`, with
/// the last segment replaced by `remote_filename`. Files outside the media
/// root keep their full path minus the root and any `..` segments.
pub fn remote_path(
    base_path: &str,
    media_root: &Path,
    local_path: &Path,
    remote_filename: &str,
) -> String {
    let relative = local_path.strip_prefix(media_root).unwrap_or(local_path);

    let mut segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    segments.pop();
    segments.push(remote_filename.to_string());

    format!("{}/{}", base_path, segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftp::MockFtpConnector;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    struct Fixture {
        root: TempDir,
        connector: MockFtpConnector,
        uploader: Uploader,
    }

    impl Fixture {
        fn new(connector: MockFtpConnector) -> Self {
            let root = tempfile::tempdir().unwrap();
            let uploader = Uploader::new(Arc::new(connector.clone()), root.path());
            Self {
                root,
                connector,
                uploader,
            }
        }

        fn media_file(&self, relative: &str) -> PathBuf {
            let path = self.root.path().join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"media").unwrap();
            path
        }
    }

    fn config() -> Config {
        Config {
            server: "ftp.example.com".to_string(),
            user: "uploader".to_string(),
            password: "secret".to_string(),
            cdn_base_url: "https://cdn.example.com".to_string(),
            cdn_base_path: "/public".to_string(),
            cdn_prefix: "/media".to_string(),
            ..Config::default()
        }
    }

    fn assert_timestamped(name: &str, stem: &str, extension: &str) {
        let middle = name
            .strip_prefix(&format!("{}_", stem))
            .and_then(|rest| rest.strip_suffix(&format!(".{}", extension)))
            .unwrap_or_else(|| panic!("unexpected remote filename {}", name));
        assert!(middle.parse::<i64>().is_ok(), "{} is not a timestamp", middle);
    }

    #[test]
    fn test_remote_filename() {
        assert_eq!(
            remote_filename("video", "mp4", 1_700_000_000),
            "video_1700000000.mp4"
        );
    }

    #[test]
    fn test_remote_path_mirrors_media_layout() {
        let path = remote_path(
            "/public",
            Path::new("/srv/uploads"),
            Path::new("/srv/uploads/2024/05/video.mp4"),
            "video_1.mp4",
        );
        assert_eq!(path, "/public/2024/05/video_1.mp4");
    }

    #[test]
    fn test_remote_path_empty_base() {
        let path = remote_path(
            "",
            Path::new("/srv/uploads"),
            Path::new("/srv/uploads/video.mp4"),
            "video_1.mp4",
        );
        assert_eq!(path, "/video_1.mp4");
    }

    #[test]
    fn test_remote_path_outside_media_root() {
        let path = remote_path(
            "/public",
            Path::new("/srv/uploads"),
            Path::new("/tmp/../other/video.mp4"),
            "video_1.mp4",
        );
        assert_eq!(path, "/public/tmp/other/video_1.mp4");
    }

    #[tokio::test]
    async fn test_upload_success() {
        let fixture = Fixture::new(MockFtpConnector::new());
        let local = fixture.media_file("2024/05/video.mp4");

        let outcome = fixture.uploader.upload(&local, &config()).await.unwrap();

        let UploadOutcome::Success {
            remote_url,
            remote_filename,
        } = outcome
        else {
            panic!("expected success");
        };
        assert_timestamped(&remote_filename, "video", "mp4");

        let remote = format!("/public/2024/05/{}", remote_filename);
        assert_eq!(
            remote_url,
            format!("https://cdn.example.com/media/{}", remote)
        );
        assert_eq!(fixture.connector.get_files().get(&remote).unwrap(), b"media");
        assert_eq!(
            fixture.connector.get_commands(),
            vec![
                "CONNECT ftp.example.com:21".to_string(),
                "LOGIN uploader".to_string(),
                "PASV".to_string(),
                format!("STOR {}", remote),
                "QUIT".to_string(),
            ]
        );
        assert!(local.exists());
    }

    #[tokio::test]
    async fn test_upload_uppercase_extension_keeps_lowercase_name() {
        let fixture = Fixture::new(MockFtpConnector::new());
        let local = fixture.media_file("Clip.MP4");

        let outcome = fixture.uploader.upload(&local, &config()).await.unwrap();

        let UploadOutcome::Success {
            remote_filename, ..
        } = outcome
        else {
            panic!("expected success");
        };
        assert_timestamped(&remote_filename, "Clip", "mp4");
    }

    #[tokio::test]
    async fn test_upload_dotfile_keeps_empty_stem() {
        let fixture = Fixture::new(MockFtpConnector::new());
        let local = fixture.media_file("2024/.mp4");

        let outcome = fixture.uploader.upload(&local, &config()).await.unwrap();

        let UploadOutcome::Success {
            remote_filename, ..
        } = outcome
        else {
            panic!("expected success");
        };
        assert_timestamped(&remote_filename, "", "mp4");
        assert!(fixture
            .connector
            .get_files()
            .contains_key(&format!("/public/2024/{}", remote_filename)));
    }

    #[tokio::test]
    async fn test_upload_disallowed_extension_is_noop() {
        let fixture = Fixture::new(MockFtpConnector::new());
        let local = fixture.media_file("photo.jpg");

        assert!(fixture.uploader.upload(&local, &config()).await.is_none());
        assert_eq!(fixture.connector.get_connect_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_honours_custom_extensions() {
        let fixture = Fixture::new(MockFtpConnector::new());
        let local = fixture.media_file("photo.jpg");
        let config = Config {
            allowed_extensions: BTreeSet::from(["jpg".to_string()]),
            ..config()
        };

        let outcome = fixture.uploader.upload(&local, &config).await.unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_upload_connect_failure() {
        let fixture = Fixture::new(MockFtpConnector::new().with_connect_failure());
        let local = fixture.media_file("video.mp4");

        let outcome = fixture.uploader.upload(&local, &config()).await;

        assert_eq!(outcome, Some(UploadOutcome::failure(CONNECTION_FAILED)));
        assert_eq!(fixture.connector.get_close_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_login_failure_reports_connection_failure() {
        let fixture = Fixture::new(MockFtpConnector::new().with_login_failure());
        let local = fixture.media_file("video.mp4");

        let outcome = fixture.uploader.upload(&local, &config()).await;

        assert_eq!(outcome, Some(UploadOutcome::failure(CONNECTION_FAILED)));
        assert_eq!(fixture.connector.get_close_count(), 1);
        assert!(fixture.connector.get_files().is_empty());
    }

    #[tokio::test]
    async fn test_upload_passive_failure_is_not_fatal() {
        let fixture = Fixture::new(MockFtpConnector::new().with_passive_failure());
        let local = fixture.media_file("video.mp4");

        let outcome = fixture.uploader.upload(&local, &config()).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(fixture.connector.get_files().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_transfer_failure_keeps_local_file() {
        let fixture = Fixture::new(MockFtpConnector::new().with_upload_failure());
        let local = fixture.media_file("video.mp4");
        let config = Config {
            delete_local_after_upload: true,
            ..config()
        };

        let outcome = fixture.uploader.upload(&local, &config).await;

        assert_eq!(outcome, Some(UploadOutcome::failure(UPLOAD_FAILED)));
        assert_eq!(fixture.connector.get_close_count(), 1);
        assert!(local.exists());
    }

    #[tokio::test]
    async fn test_upload_deletes_local_when_configured() {
        let fixture = Fixture::new(MockFtpConnector::new());
        let local = fixture.media_file("video.mp4");
        let config = Config {
            delete_local_after_upload: true,
            ..config()
        };

        let outcome = fixture.uploader.upload(&local, &config).await.unwrap();

        assert!(outcome.is_success());
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn test_upload_missing_local_file_is_upload_failure() {
        let fixture = Fixture::new(MockFtpConnector::new());
        let local = fixture.root.path().join("gone.mp4");

        let outcome = fixture.uploader.upload(&local, &config()).await;

        assert_eq!(outcome, Some(UploadOutcome::failure(UPLOAD_FAILED)));
    }
}
