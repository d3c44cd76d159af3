//! Connection diagnostics for the configured FTP origin
//!
//! Walks the same steps an upload depends on (connect, login, passive mode)
//! and then checks that the base directory exists. Nothing is persisted.

use crate::ftp::{FtpConnector, CONNECT_TIMEOUT};
use crate::models::Config;
use thiserror::Error;
use tracing::{info, warn};

/// The first step that failed. `Display` gives the message shown to admins.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionTestFailure {
    #[error("Could not connect to FTP server")]
    Connect,

    #[error("Login failed")]
    Login,

    #[error("Could not set passive mode")]
    PassiveMode,

    #[error("Could not change to base directory")]
    BaseDirectory,
}

pub async fn test_connection(
    connector: &dyn FtpConnector,
    config: &Config,
) -> Result<(), ConnectionTestFailure> {
    let mut session = connector
        .connect(&config.server, config.port, CONNECT_TIMEOUT)
        .await
        .map_err(|e| {
            warn!("Diagnostic connect to {} failed: {}", config.server, e);
            ConnectionTestFailure::Connect
        })?;

    let result = async {
        session.login(&config.user, &config.password).await.map_err(|e| {
            warn!("Diagnostic login failed: {}", e);
            ConnectionTestFailure::Login
        })?;
        session.enter_passive_mode().await.map_err(|e| {
            warn!("Diagnostic passive mode failed: {}", e);
            ConnectionTestFailure::PassiveMode
        })?;
        session
            .change_dir(&config.cdn_base_path)
            .await
            .map_err(|e| {
                warn!("Diagnostic change to {:?} failed: {}", config.cdn_base_path, e);
                ConnectionTestFailure::BaseDirectory
            })
    }
    .await;

    session.close().await;

    if result.is_ok() {
        info!("Diagnostic connection to {} succeeded", config.server);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftp::MockFtpConnector;

    fn config() -> Config {
        Config {
            server: "ftp.example.com".to_string(),
            user: "uploader".to_string(),
            password: "secret".to_string(),
            cdn_base_path: "/public".to_string(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_connection_success() {
        let connector = MockFtpConnector::new();

        assert_eq!(test_connection(&connector, &config()).await, Ok(()));
        assert_eq!(
            connector.get_commands(),
            vec![
                "CONNECT ftp.example.com:21",
                "LOGIN uploader",
                "PASV",
                "CWD /public",
                "QUIT"
            ]
        );
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let connector = MockFtpConnector::new().with_connect_failure();

        let result = test_connection(&connector, &config()).await;

        assert_eq!(result, Err(ConnectionTestFailure::Connect));
        assert_eq!(
            result.unwrap_err().to_string(),
            "Could not connect to FTP server"
        );
        assert_eq!(connector.get_close_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_login_failure_short_circuits() {
        let connector = MockFtpConnector::new()
            .with_login_failure()
            .with_passive_failure();

        let result = test_connection(&connector, &config()).await;

        assert_eq!(result, Err(ConnectionTestFailure::Login));
        assert!(!connector.get_commands().contains(&"PASV".to_string()));
        assert_eq!(connector.get_close_count(), 1);
    }

    #[tokio::test]
    async fn test_connection_passive_failure() {
        let connector = MockFtpConnector::new().with_passive_failure();

        let result = test_connection(&connector, &config()).await;

        assert_eq!(result, Err(ConnectionTestFailure::PassiveMode));
        assert_eq!(connector.get_close_count(), 1);
    }

    #[tokio::test]
    async fn test_connection_missing_base_directory() {
        let connector = MockFtpConnector::new().with_directory_failure();

        let result = test_connection(&connector, &config()).await;

        assert_eq!(result, Err(ConnectionTestFailure::BaseDirectory));
        assert_eq!(
            result.unwrap_err().to_string(),
            "Could not change to base directory"
        );
        assert_eq!(connector.get_close_count(), 1);
    }
}
