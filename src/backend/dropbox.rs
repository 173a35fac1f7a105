//! Dropbox backend over the HTTP API v2.
//!
//! Dropbox computes `content_hash` server-side with the same 4 MiB block
//! scheme as [`crate::hash`], so the reported value is used as-is and the
//! file is only downloaded when the server omits it.
//!
//! `list_folder` entries already carry size, modification time and hash.
//! They are kept from the last listing so `stat` and `hash` on a listed
//! path need no further request.

use super::{BackendKind, FileStat, StorageBackend};
use crate::hash::{ContentHash, ContentHasher};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const API_URL: &str = "https://api.dropboxapi.com/2";
const CONTENT_URL: &str = "https://content.dropboxapi.com/2";

/// Cloud drive backend authenticated with a bearer access token
#[derive(Debug, Clone)]
pub struct DropboxBackend {
    name: String,
    access_token: String,
    client: Client,
    api_url: String,
    content_url: String,
    listed: Arc<Mutex<HashMap<String, Metadata>>>,
}

#[derive(Debug, Serialize)]
struct ListFolderArg<'a> {
    path: &'a str,
    recursive: bool,
}

#[derive(Debug, Serialize)]
struct ListFolderContinueArg<'a> {
    cursor: &'a str,
}

#[derive(Debug, Serialize)]
struct PathArg<'a> {
    path: &'a str,
}

#[derive(Debug, Serialize)]
struct UploadArg<'a> {
    path: &'a str,
    mode: &'a str,
    mute: bool,
}

#[derive(Debug, Deserialize)]
struct ListFolderResult {
    entries: Vec<Metadata>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct Metadata {
    #[serde(rename = ".tag")]
    tag: String,
    path_lower: Option<String>,
    size: Option<u64>,
    client_modified: Option<DateTime<Utc>>,
    server_modified: Option<DateTime<Utc>>,
    content_hash: Option<String>,
}

impl DropboxBackend {
    /// `timeout` bounds connecting and each whole request, body included
    pub fn new(name: impl Into<String>, access_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().connect_timeout(timeout).timeout(timeout).build()?;
        Ok(Self {
            name: name.into(),
            access_token: access_token.into(),
            client,
            api_url: API_URL.to_string(),
            content_url: CONTENT_URL.to_string(),
            listed: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Point the backend at a different API host, e.g. a local stand-in
    pub fn with_endpoints(mut self, api_url: impl Into<String>, content_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self.content_url = content_url.into();
        self
    }

    fn rpc<T: Serialize + ?Sized>(&self, endpoint: &str, arg: &T) -> RequestBuilder {
        self.client
            .post(format!("{}/{}", self.api_url, endpoint))
            .bearer_auth(&self.access_token)
            .json(arg)
    }

    fn content<T: Serialize + ?Sized>(&self, endpoint: &str, arg: &T) -> Result<RequestBuilder> {
        let header = api_arg_header(arg)?;
        Ok(self
            .client
            .post(format!("{}/{}", self.content_url, endpoint))
            .bearer_auth(&self.access_token)
            .header("Dropbox-API-Arg", header))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::backend(&self.name, format!("HTTP {}: {}", status, body.trim())))
    }

    /// Metadata from the last listing, else a `get_metadata` call
    async fn metadata(&self, path: &str) -> Result<Metadata> {
        let cached = self
            .listed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned();
        if let Some(metadata) = cached {
            return Ok(metadata);
        }

        let response = self.send(self.rpc("files/get_metadata", &PathArg { path })).await?;
        Ok(response.json().await?)
    }

    async fn hash_by_download(&self, path: &str) -> Result<ContentHash> {
        let request = self.content("files/download", &PathArg { path })?;
        let response = self.send(request).await?;

        let mut hasher = ContentHasher::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            hasher.update(&chunk?);
        }
        Ok(hasher.finalize())
    }
}

#[async_trait]
impl StorageBackend for DropboxBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::CloudDrive
    }

    /// Dropbox paths are absolute; the account root itself is the empty string
    fn normalize_root(&self, root: &str) -> String {
        let trimmed = root.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }

    async fn list(&self, root: &str) -> Result<Vec<String>> {
        debug!("Listing Dropbox folder '{}'", root);
        let response = self
            .send(self.rpc(
                "files/list_folder",
                &ListFolderArg {
                    path: root,
                    recursive: true,
                },
            ))
            .await?;
        let mut page: ListFolderResult = response.json().await?;
        let mut files = Vec::new();
        let mut listed = HashMap::new();

        loop {
            for entry in page.entries {
                if entry.tag != "file" {
                    continue;
                }
                if let Some(path) = entry.path_lower.clone() {
                    files.push(path.clone());
                    listed.insert(path, entry);
                }
            }

            if !page.has_more {
                break;
            }

            let response = self
                .send(self.rpc(
                    "files/list_folder/continue",
                    &ListFolderContinueArg {
                        cursor: &page.cursor,
                    },
                ))
                .await?;
            page = response.json().await?;
        }

        *self.listed.lock().unwrap_or_else(|e| e.into_inner()) = listed;
        Ok(files)
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        let metadata = self.metadata(path).await?;
        Ok(FileStat {
            size: metadata.size,
            modified: metadata.client_modified.or(metadata.server_modified),
        })
    }

    async fn hash(&self, path: &str) -> Result<ContentHash> {
        let metadata = self.metadata(path).await?;
        if metadata.tag != "file" {
            return Err(Error::backend(&self.name, format!("{} is not a file", path)));
        }

        match metadata.content_hash {
            Some(hash) => ContentHash::from_hex(&hash),
            None => {
                warn!("No content_hash reported for {}, downloading to hash", path);
                self.hash_by_download(path).await
            }
        }
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;
        let request = self
            .content(
                "files/upload",
                &UploadArg {
                    path: remote_path,
                    mode: "overwrite",
                    mute: true,
                },
            )?
            .header("Content-Type", "application/octet-stream")
            .body(data);
        self.send(request).await?;
        self.listed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(remote_path);
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let request = self.content("files/download", &PathArg { path: remote_path })?;
        let response = self.send(request).await?;

        if let Some(parent) = local_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::File::create(local_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn delete(&self, remote_path: &str) -> Result<()> {
        self.send(self.rpc("files/delete_v2", &PathArg { path: remote_path }))
            .await?;
        self.listed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(remote_path);
        Ok(())
    }
}

/// JSON for the `Dropbox-API-Arg` header, with non-ASCII escaped since
/// header values must be ASCII.
fn api_arg_header<T: Serialize + ?Sized>(arg: &T) -> Result<String> {
    let json = serde_json::to_string(arg)?;
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            escaped.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    Ok(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EMPTY_HASH: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn backend_at(server: &MockServer) -> DropboxBackend {
        DropboxBackend::new("dropbox", "token", Duration::from_secs(5))
            .unwrap()
            .with_endpoints(server.uri(), server.uri())
    }

    #[test]
    fn test_root_normalization_adds_leading_separator() {
        let backend = DropboxBackend::new("dropbox", "token", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.normalize_root("HCS"), "/HCS");
        assert_eq!(backend.normalize_root("/HCS/"), "/HCS");
        assert_eq!(backend.normalize_root("HCS/sub"), "/HCS/sub");
        assert_eq!(backend.normalize_root(""), "");
    }

    #[test]
    fn test_api_arg_header_escapes_non_ascii() {
        let header = api_arg_header(&PathArg { path: "/HCS/résumé.txt" }).unwrap();
        assert!(header.is_ascii());
        assert_eq!(header, r#"{"path":"/HCS/r\u00e9sum\u00e9.txt"}"#);
        let round_trip: serde_json::Value = serde_json::from_str(&header).unwrap();
        assert_eq!(round_trip["path"], "/HCS/résumé.txt");
    }

    #[tokio::test]
    async fn test_list_follows_cursor_and_keeps_only_files() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/files/list_folder"))
            .and(header("Authorization", "Bearer token"))
            .and(body_partial_json(json!({"path": "/HCS", "recursive": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entries": [
                    {".tag": "folder", "path_lower": "/hcs/docs", "name": "docs"},
                    {".tag": "file", "path_lower": "/hcs/docs/a.txt", "name": "a.txt",
                     "size": 3, "client_modified": "2024-05-01T10:00:00Z",
                     "server_modified": "2024-05-02T10:00:00Z",
                     "content_hash": EMPTY_HASH},
                    {".tag": "deleted", "path_lower": "/hcs/gone.txt", "name": "gone.txt"}
                ],
                "cursor": "page-1",
                "has_more": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/files/list_folder/continue"))
            .and(body_partial_json(json!({"cursor": "page-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entries": [
                    {".tag": "file", "path_lower": "/hcs/b.bin", "name": "b.bin",
                     "size": 7, "server_modified": "2024-06-01T08:30:00Z",
                     "content_hash": EMPTY_HASH}
                ],
                "cursor": "page-2",
                "has_more": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        // Listed paths are answered from the listing without another request.
        Mock::given(method("POST"))
            .and(path("/files/get_metadata"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let backend = backend_at(&server);
        let files = backend.list("/HCS").await.unwrap();
        assert_eq!(files, vec!["/hcs/docs/a.txt".to_string(), "/hcs/b.bin".to_string()]);

        let stat = backend.stat("/hcs/docs/a.txt").await.unwrap();
        assert_eq!(stat.size, Some(3));
        assert_eq!(stat.modified, Some("2024-05-01T10:00:00Z".parse().unwrap()));

        let stat = backend.stat("/hcs/b.bin").await.unwrap();
        assert_eq!(stat.modified, Some("2024-06-01T08:30:00Z".parse().unwrap()));

        assert_eq!(backend.hash("/hcs/b.bin").await.unwrap().as_str(), EMPTY_HASH);
    }

    #[tokio::test]
    async fn test_stat_uses_get_metadata_for_unlisted_paths() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/get_metadata"))
            .and(body_partial_json(json!({"path": "/hcs/x.txt"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                ".tag": "file", "path_lower": "/hcs/x.txt", "name": "x.txt",
                "size": 42, "client_modified": "2023-01-15T12:00:00Z"
            })))
            .mount(&server)
            .await;

        let stat = backend_at(&server).stat("/hcs/x.txt").await.unwrap();
        assert_eq!(stat.size, Some(42));
        assert_eq!(stat.modified, Some("2023-01-15T12:00:00Z".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_hash_downloads_when_server_omits_content_hash() {
        let server = MockServer::start().await;
        let body: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        Mock::given(method("POST"))
            .and(path("/files/get_metadata"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                ".tag": "file", "path_lower": "/hcs/x.bin", "name": "x.bin", "size": 10000
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/files/download"))
            .and(header("Dropbox-API-Arg", r#"{"path":"/hcs/x.bin"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let hash = backend_at(&server).hash("/hcs/x.bin").await.unwrap();
        assert_eq!(hash, hash_bytes(&body));
    }

    #[tokio::test]
    async fn test_error_status_is_a_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/list_folder"))
            .respond_with(ResponseTemplate::new(409).set_body_string("path/not_found/"))
            .mount(&server)
            .await;

        let err = backend_at(&server).list("/HCS").await.unwrap_err();
        assert!(matches!(err, Error::Backend { ref reason, .. } if reason.contains("409")));
    }

    #[tokio::test]
    async fn test_stalled_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/list_folder"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let backend = DropboxBackend::new("dropbox", "token", Duration::from_millis(200))
            .unwrap()
            .with_endpoints(server.uri(), server.uri());
        let outcome = tokio::time::timeout(Duration::from_secs(3), backend.list("/HCS")).await;
        assert!(matches!(outcome, Ok(Err(Error::Http(_)))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_listing() {
        let backend = DropboxBackend::new("dropbox", "token", Duration::from_secs(2))
            .unwrap()
            .with_endpoints("http://127.0.0.1:9", "http://127.0.0.1:9");
        assert!(backend.list("/HCS").await.is_err());
    }
}
