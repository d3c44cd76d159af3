use super::{FtpConnector, FtpError, FtpResult, FtpSession};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    fail_connect: bool,
    fail_login: bool,
    fail_passive: bool,
    fail_put: bool,
    fail_change_dir: bool,
    files: HashMap<String, Vec<u8>>,
    commands: Vec<String>,
    connect_count: usize,
    close_count: usize,
}

/// In-memory FTP server stand-in. Clones share state, so a clone kept by a
/// test can observe what the code under test did.
#[derive(Clone, Default)]
pub struct MockFtpConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockFtpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_failure(self) -> Self {
        self.state.lock().unwrap().fail_connect = true;
        self
    }

    pub fn with_login_failure(self) -> Self {
        self.state.lock().unwrap().fail_login = true;
        self
    }

    pub fn with_passive_failure(self) -> Self {
        self.state.lock().unwrap().fail_passive = true;
        self
    }

    pub fn with_upload_failure(self) -> Self {
        self.state.lock().unwrap().fail_put = true;
        self
    }

    pub fn with_directory_failure(self) -> Self {
        self.state.lock().unwrap().fail_change_dir = true;
        self
    }

    pub fn get_files(&self) -> HashMap<String, Vec<u8>> {
        self.state.lock().unwrap().files.clone()
    }

    /// Commands in the order sessions issued them, e.g. `LOGIN user`, `PASV`.
    pub fn get_commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn get_connect_count(&self) -> usize {
        self.state.lock().unwrap().connect_count
    }

    pub fn get_close_count(&self) -> usize {
        self.state.lock().unwrap().close_count
    }
}

#[async_trait]
impl FtpConnector for MockFtpConnector {
    async fn connect(
        &self,
        server: &str,
        port: u16,
        _timeout: Duration,
    ) -> FtpResult<Box<dyn FtpSession>> {
        let mut state = self.state.lock().unwrap();
        state.connect_count += 1;
        state.commands.push(format!("CONNECT {}:{}", server, port));

        if state.fail_connect {
            return Err(FtpError::Connection("connection refused".to_string()));
        }

        Ok(Box::new(MockFtpSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockFtpSession {
    state: Arc<Mutex<MockState>>,
}

impl MockFtpSession {
    fn record(&self, command: String) -> std::sync::MutexGuard<'_, MockState> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command);
        state
    }
}

#[async_trait]
impl FtpSession for MockFtpSession {
    async fn login(&mut self, user: &str, _password: &str) -> FtpResult<()> {
        if self.record(format!("LOGIN {}", user)).fail_login {
            return Err(FtpError::Authentication("530 Login incorrect".to_string()));
        }
        Ok(())
    }

    async fn enter_passive_mode(&mut self) -> FtpResult<()> {
        if self.record("PASV".to_string()).fail_passive {
            return Err(FtpError::PassiveMode("500 PASV refused".to_string()));
        }
        Ok(())
    }

    async fn put_file(&mut self, remote_path: &str, local_path: &Path) -> FtpResult<u64> {
        let fail_put = self.record(format!("STOR {}", remote_path)).fail_put;
        if fail_put {
            return Err(FtpError::Transfer("553 Could not create file".to_string()));
        }

        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| FtpError::Transfer(format!("{}: {}", local_path.display(), e)))?;
        let len = data.len() as u64;

        self.state
            .lock()
            .unwrap()
            .files
            .insert(remote_path.to_string(), data);
        Ok(len)
    }

    async fn change_dir(&mut self, path: &str) -> FtpResult<()> {
        if self.record(format!("CWD {}", path)).fail_change_dir {
            return Err(FtpError::Directory("550 No such directory".to_string()));
        }
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.record("QUIT".to_string());
        state.close_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftp::CONNECT_TIMEOUT;

    #[tokio::test]
    async fn test_mock_ftp_stores_uploaded_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("clip.mp4");
        std::fs::write(&local, b"video bytes").unwrap();

        let connector = MockFtpConnector::new();
        let mut session = connector
            .connect("ftp.example.com", 21, CONNECT_TIMEOUT)
            .await
            .unwrap();
        session.login("user", "secret").await.unwrap();
        let sent = session.put_file("/media/clip.mp4", &local).await.unwrap();
        session.close().await;

        assert_eq!(sent, 11);
        assert_eq!(
            connector.get_files().get("/media/clip.mp4").unwrap(),
            b"video bytes"
        );
        assert_eq!(connector.get_close_count(), 1);
        assert_eq!(
            connector.get_commands(),
            vec![
                "CONNECT ftp.example.com:21",
                "LOGIN user",
                "STOR /media/clip.mp4",
                "QUIT"
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_ftp_connect_failure() {
        let connector = MockFtpConnector::new().with_connect_failure();
        let result = connector.connect("ftp.example.com", 21, CONNECT_TIMEOUT).await;

        assert!(matches!(result, Err(FtpError::Connection(_))));
        assert_eq!(connector.get_connect_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_ftp_missing_local_file_is_transfer_error() {
        let connector = MockFtpConnector::new();
        let mut session = connector
            .connect("ftp.example.com", 21, CONNECT_TIMEOUT)
            .await
            .unwrap();

        let result = session
            .put_file("/media/x.mp4", Path::new("/nonexistent/x.mp4"))
            .await;
        assert!(matches!(result, Err(FtpError::Transfer(_))));
        assert!(connector.get_files().is_empty());
    }
}
