//! FTP over explicit TLS backend.
//!
//! The control connection is opened lazily and shared behind a mutex; the
//! synchronous client runs on the blocking thread pool. After `AUTH TLS` the
//! data channel is protected as well (`PBSZ 0` / `PROT P`).
//!
//! Every socket, control and data alike, carries connect, read and write
//! timeouts, so a server that accepts and then stalls surfaces as a
//! connection error instead of pinning a blocking thread.

use super::{BackendKind, FileStat, StorageBackend};
use crate::hash::{self, ContentHash};
use crate::{Error, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use suppaftp::list::File as ListEntry;
use suppaftp::native_tls::TlsConnector;
use suppaftp::types::FileType;
use suppaftp::{FtpError, NativeTlsConnector, NativeTlsFtpStream};
use tracing::{debug, warn};

/// Connection settings for an FTPS server
#[derive(Debug, Clone)]
pub struct FtpsSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Applied to connecting and to every read or write on the sockets
    pub timeout: Duration,
}

/// Backend over an FTP server reached with explicit TLS
pub struct FtpsBackend {
    name: String,
    settings: FtpsSettings,
    connection: Arc<Mutex<Option<NativeTlsFtpStream>>>,
}

impl std::fmt::Debug for FtpsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpsBackend")
            .field("name", &self.name)
            .field("host", &self.settings.host)
            .field("port", &self.settings.port)
            .field("user", &self.settings.user)
            .field("timeout", &self.settings.timeout)
            .finish()
    }
}

impl FtpsBackend {
    pub fn new(name: impl Into<String>, settings: FtpsSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            connection: Arc::new(Mutex::new(None)),
        }
    }

    /// Run `op` against the shared connection on the blocking pool.
    ///
    /// A connection that fails mid-operation is dropped so the next call
    /// reconnects.
    async fn with_connection<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut NativeTlsFtpStream) -> Result<T> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        let settings = self.settings.clone();
        let name = self.name.clone();

        tokio::task::spawn_blocking(move || -> Result<T> {
            let mut guard = connection.lock().unwrap_or_else(|e| e.into_inner());
            if guard.is_none() {
                *guard = Some(connect(&settings)?);
                debug!("Connected to FTPS server {}:{}", settings.host, settings.port);
            }

            let stream = guard
                .as_mut()
                .ok_or_else(|| Error::backend(&name, "connection unavailable"))?;
            let result = op(stream);
            if matches!(result, Err(Error::Ftp(FtpError::ConnectionError(_)))) {
                warn!("Dropping broken FTPS connection to {}", settings.host);
                *guard = None;
            }
            result
        })
        .await?
    }
}

fn connect(settings: &FtpsSettings) -> Result<NativeTlsFtpStream> {
    let timeout = settings.timeout;
    let addr = (settings.host.as_str(), settings.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::backend(&settings.host, "host name did not resolve"))?;

    let stream = NativeTlsFtpStream::connect_timeout(addr, timeout)?.passive_stream_builder(move |addr| {
        let data = TcpStream::connect_timeout(&addr, timeout).map_err(FtpError::ConnectionError)?;
        set_socket_timeouts(&data, timeout).map_err(FtpError::ConnectionError)?;
        Ok(data)
    });
    set_socket_timeouts(stream.get_ref(), timeout)?;

    let connector = TlsConnector::new().map_err(|e| Error::Backend {
        backend: settings.host.clone(),
        reason: format!("TLS setup failed: {}", e),
    })?;
    let mut stream = stream.into_secure(NativeTlsConnector::from(connector), &settings.host)?;
    stream.login(settings.user.as_str(), settings.password.as_str())?;
    stream.transfer_type(FileType::Binary)?;
    Ok(stream)
}

fn set_socket_timeouts(socket: &TcpStream, timeout: Duration) -> io::Result<()> {
    socket.set_read_timeout(Some(timeout))?;
    socket.set_write_timeout(Some(timeout))
}

fn join_remote(dir: &str, name: &str) -> String {
    if dir.is_empty() || dir == "." {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

/// Depth-first walk using `LIST`, keeping regular files only
fn walk(stream: &mut NativeTlsFtpStream, root: &str) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_string()];

    while let Some(dir) = pending.pop() {
        let lines = stream.list(Some(dir.as_str()))?;
        for line in lines {
            let entry: ListEntry = match line.parse() {
                Ok(entry) => entry,
                Err(_) => {
                    debug!("Skipping unparseable LIST line: {}", line);
                    continue;
                }
            };

            let name = entry.name();
            if name == "." || name == ".." {
                continue;
            }

            let full = join_remote(&dir, name);
            if entry.is_directory() {
                pending.push(full);
            } else if entry.is_file() {
                files.push(full);
            }
        }
    }

    Ok(files)
}

#[async_trait]
impl StorageBackend for FtpsBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Ftps
    }

    /// FTP paths are relative to the login directory
    fn normalize_root(&self, root: &str) -> String {
        let trimmed = root.trim_matches('/');
        if trimmed.is_empty() {
            ".".to_string()
        } else {
            trimmed.to_string()
        }
    }

    async fn list(&self, root: &str) -> Result<Vec<String>> {
        let root = root.to_string();
        self.with_connection(move |stream| walk(stream, &root)).await
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        let path = path.to_string();
        self.with_connection(move |stream| {
            let size = stream.size(&path).ok().map(|s| s as u64);
            let modified = stream.mdtm(&path).ok().map(|naive| naive.and_utc());
            Ok(FileStat { size, modified })
        })
        .await
    }

    async fn hash(&self, path: &str) -> Result<ContentHash> {
        let path = path.to_string();
        self.with_connection(move |stream| {
            let hash = stream.retr(&path, |reader| {
                hash::hash_reader(reader).map_err(FtpError::ConnectionError)
            })?;
            Ok(hash)
        })
        .await
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let local_path = local_path.to_path_buf();
        let remote_path = remote_path.to_string();
        self.with_connection(move |stream| {
            let mut reader = BufReader::new(File::open(&local_path)?);
            stream.put_file(&remote_path, &mut reader)?;
            Ok(())
        })
        .await
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let local_path: PathBuf = local_path.to_path_buf();
        let remote_path = remote_path.to_string();
        self.with_connection(move |stream| {
            if let Some(parent) = local_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let mut writer = BufWriter::new(File::create(&local_path)?);
            stream.retr(&remote_path, |reader| {
                io::copy(reader, &mut writer)
                    .and_then(|_| io::Write::flush(&mut writer))
                    .map_err(FtpError::ConnectionError)
            })?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, remote_path: &str) -> Result<()> {
        let remote_path = remote_path.to_string();
        self.with_connection(move |stream| {
            stream.rm(&remote_path)?;
            Ok(())
        })
        .await
    }
}

impl Drop for FtpsBackend {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.connection.lock() {
            if let Some(mut stream) = guard.take() {
                let _ = stream.quit();
            }
        }
    }
}
