//! FTP transport for pushing media to the CDN origin
//!
//! A connector opens one control connection per upload or diagnostic run;
//! the session it returns drives login, passive negotiation, binary transfer
//! and directory changes.

pub mod client;
pub mod mock;

pub use client::{FtpClient, TcpFtpConnector};
pub use mock::MockFtpConnector;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Standard FTP control port.
pub const DEFAULT_PORT: u16 = 21;

/// Applies to opening the control connection only; transfers are unbounded.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FtpError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("passive mode failed: {0}")]
    PassiveMode(String),

    #[error("directory change failed: {0}")]
    Directory(String),

    #[error("transfer failed: {0}")]
    Transfer(String),
}

pub type FtpResult<T> = std::result::Result<T, FtpError>;

#[async_trait]
pub trait FtpConnector: Send + Sync {
    async fn connect(
        &self,
        server: &str,
        port: u16,
        timeout: Duration,
    ) -> FtpResult<Box<dyn FtpSession>>;
}

#[async_trait]
pub trait FtpSession: Send {
    async fn login(&mut self, user: &str, password: &str) -> FtpResult<()>;

    async fn enter_passive_mode(&mut self) -> FtpResult<()>;

    /// Stores `local_path` at `remote_path` in binary mode, returning the
    /// number of bytes sent.
    async fn put_file(&mut self, remote_path: &str, local_path: &Path) -> FtpResult<u64>;

    async fn change_dir(&mut self, path: &str) -> FtpResult<()>;

    /// Best-effort `QUIT`; errors are not reported.
    async fn close(&mut self);
}
