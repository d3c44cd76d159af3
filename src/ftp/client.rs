use super::{FtpConnector, FtpError, FtpResult, FtpSession};
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

/// Longest control line accepted, terminator included.
pub const MAX_LINE_LENGTH: u64 = 8 * 1024;
/// Most lines accepted in one multi-line reply.
pub const MAX_REPLY_LINES: usize = 512;

/// A complete (possibly multi-line) server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text)
    }
}

/// Opens real control connections over TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpFtpConnector;

#[async_trait]
impl FtpConnector for TcpFtpConnector {
    async fn connect(
        &self,
        server: &str,
        port: u16,
        timeout: Duration,
    ) -> FtpResult<Box<dyn FtpSession>> {
        let client = FtpClient::connect(server, port, timeout).await?;
        Ok(Box::new(client))
    }
}

pub struct FtpClient {
    control: BufReader<TcpStream>,
    peer_ip: IpAddr,
    passive_addr: Option<SocketAddr>,
}

impl FtpClient {
    pub async fn connect(server: &str, port: u16, timeout: Duration) -> FtpResult<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((server, port)))
            .await
            .map_err(|_| {
                FtpError::Connection(format!("timed out connecting to {}:{}", server, port))
            })?
            .map_err(|e| FtpError::Connection(format!("{}:{}: {}", server, port, e)))?;

        let peer_ip = stream
            .peer_addr()
            .map_err(|e| FtpError::Connection(e.to_string()))?
            .ip();

        let mut client = Self {
            control: BufReader::new(stream),
            peer_ip,
            passive_addr: None,
        };

        let greeting = tokio::time::timeout(timeout, client.read_reply())
            .await
            .map_err(|_| FtpError::Connection("timed out waiting for greeting".to_string()))?
            .map_err(|e| FtpError::Connection(e.to_string()))?;

        if greeting.code != 220 {
            return Err(FtpError::Connection(format!(
                "unexpected greeting: {}",
                greeting
            )));
        }

        debug!("Connected to {}:{}: {}", server, port, greeting);
        Ok(client)
    }

    async fn command(&mut self, command: &str) -> io::Result<Reply> {
        if command.starts_with("PASS ") {
            debug!("> PASS ****");
        } else {
            debug!("> {}", command);
        }

        let stream = self.control.get_mut();
        stream.write_all(command.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await?;

        self.read_reply().await
    }

    async fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        let read = (&mut self.control)
            .take(MAX_LINE_LENGTH)
            .read_line(&mut line)
            .await?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "control connection closed",
            ));
        }
        if !line.ends_with('\n') && read as u64 >= MAX_LINE_LENGTH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("reply line longer than {} bytes", MAX_LINE_LENGTH),
            ));
        }
        Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
    }

    async fn read_reply(&mut self) -> io::Result<Reply> {
        let first = self.read_line().await?;
        let code = parse_code(&first)?;
        let mut text = first.get(4..).unwrap_or("").to_string();

        if first.as_bytes().get(3) == Some(&b'-') {
            let terminator = format!("{} ", code);
            for count in 1.. {
                if count > MAX_REPLY_LINES {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("reply longer than {} lines", MAX_REPLY_LINES),
                    ));
                }
                let line = self.read_line().await?;
                text.push('\n');
                match line.strip_prefix(&terminator) {
                    Some(rest) => {
                        text.push_str(rest);
                        break;
                    }
                    None => text.push_str(&line),
                }
            }
        }

        debug!("< {} {}", code, text);
        Ok(Reply { code, text })
    }
}

#[async_trait]
impl FtpSession for FtpClient {
    async fn login(&mut self, user: &str, password: &str) -> FtpResult<()> {
        let auth = |e: io::Error| FtpError::Authentication(e.to_string());

        let reply = self.command(&format!("USER {}", user)).await.map_err(auth)?;
        match reply.code {
            230 => return Ok(()),
            331 | 332 => {}
            _ => return Err(FtpError::Authentication(reply.to_string())),
        }

        let reply = self
            .command(&format!("PASS {}", password))
            .await
            .map_err(auth)?;
        match reply.code {
            202 | 230 => Ok(()),
            _ => Err(FtpError::Authentication(reply.to_string())),
        }
    }

    async fn enter_passive_mode(&mut self) -> FtpResult<()> {
        let reply = self
            .command("PASV")
            .await
            .map_err(|e| FtpError::PassiveMode(e.to_string()))?;

        if reply.code != 227 {
            return Err(FtpError::PassiveMode(reply.to_string()));
        }

        let addr = parse_pasv(&reply.text, self.peer_ip).ok_or_else(|| {
            FtpError::PassiveMode(format!("unparseable PASV reply: {}", reply))
        })?;

        debug!("Passive data address: {}", addr);
        self.passive_addr = Some(addr);
        Ok(())
    }

    async fn put_file(&mut self, remote_path: &str, local_path: &Path) -> FtpResult<u64> {
        let transfer = |e: io::Error| FtpError::Transfer(e.to_string());

        let mut file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| FtpError::Transfer(format!("{}: {}", local_path.display(), e)))?;

        let reply = self.command("TYPE I").await.map_err(transfer)?;
        if reply.code != 200 {
            return Err(FtpError::Transfer(reply.to_string()));
        }

        let data_addr = match self.passive_addr.take() {
            Some(addr) => addr,
            None => {
                self.enter_passive_mode()
                    .await
                    .map_err(|e| FtpError::Transfer(e.to_string()))?;
                self.passive_addr.take().ok_or_else(|| {
                    FtpError::Transfer("no passive data address".to_string())
                })?
            }
        };

        let mut data = TcpStream::connect(data_addr).await.map_err(transfer)?;

        let reply = self
            .command(&format!("STOR {}", remote_path))
            .await
            .map_err(transfer)?;
        if !matches!(reply.code, 125 | 150) {
            return Err(FtpError::Transfer(reply.to_string()));
        }

        let sent = tokio::io::copy(&mut file, &mut data)
            .await
            .map_err(transfer)?;
        data.shutdown().await.map_err(transfer)?;
        drop(data);

        let reply = self.read_reply().await.map_err(transfer)?;
        if !matches!(reply.code, 226 | 250) {
            return Err(FtpError::Transfer(reply.to_string()));
        }

        Ok(sent)
    }

    async fn change_dir(&mut self, path: &str) -> FtpResult<()> {
        let reply = self
            .command(&format!("CWD {}", path))
            .await
            .map_err(|e| FtpError::Directory(e.to_string()))?;

        match reply.code {
            200 | 250 => Ok(()),
            _ => Err(FtpError::Directory(reply.to_string())),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.command("QUIT").await {
            debug!("QUIT failed: {}", e);
        }
        let _ = self.control.get_mut().shutdown().await;
    }
}

fn parse_code(line: &str) -> io::Result<u16> {
    line.get(..3)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed reply: {:?}", line),
            )
        })
}

/// Extracts the data address from a 227 reply such as
/// `Entering Passive Mode (192,168,1,10,195,80)`.
fn parse_pasv(text: &str, peer_ip: IpAddr) -> Option<SocketAddr> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let tuple: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .collect();

    let parts = tuple
        .split(',')
        .map(|p| p.parse::<u8>().ok())
        .collect::<Option<Vec<u8>>>()?;
    if parts.len() != 6 {
        return None;
    }

    let ip = Ipv4Addr::new(parts[0], parts[1], parts[2], parts[3]);
    let port = u16::from(parts[4]) * 256 + u16::from(parts[5]);

    // Servers behind NAT sometimes advertise 0.0.0.0
    let ip = if ip.is_unspecified() {
        peer_ip
    } else {
        IpAddr::V4(ip)
    };

    Some(SocketAddr::new(ip, port))
}
