//! Fetching data files: manifests, delta indices, and entity streams.
//!
//! URLs may point at HTTP(S) resources or local files (`file://` or a bare
//! path). Entity and delta streams are newline-delimited JSON and are
//! decoded incrementally so that multi-gigabyte exports never sit in
//! memory as a whole.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use futures::stream::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::error::IngestError;

/// Settings for outgoing data fetches.
#[derive(Debug, Clone, Default)]
pub struct FetchSettings {
    /// Proxy URL for all outgoing requests.
    pub proxy: Option<String>,
    /// Token sent as `Authorization: Token <value>` to the data host.
    pub auth_token: Option<String>,
}

/// Build the HTTP client used for all data fetching.
pub fn build_client(settings: &FetchSettings) -> Result<reqwest::Client, IngestError> {
    let mut headers = HeaderMap::new();
    let agent = format!("sanscreen/{}", env!("CARGO_PKG_VERSION"));
    headers.insert(USER_AGENT, HeaderValue::from_str(&agent).expect("static agent"));
    if let Some(token) = &settings.auth_token {
        let value = HeaderValue::from_str(&format!("Token {token}"))
            .map_err(|err| IngestError::Manifest(format!("invalid auth token: {err}")))?;
        headers.insert(AUTHORIZATION, value);
    }
    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(5));
    if let Some(proxy) = &settings.proxy {
        if !proxy.is_empty() {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|err| IngestError::Manifest(format!("invalid proxy: {err}")))?;
            builder = builder.proxy(proxy);
        }
    }
    builder
        .build()
        .map_err(|err| IngestError::Fetch(err.to_string()))
}

/// Interpret a URL as a local path when it has a `file` scheme or no
/// scheme at all.
pub fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    if !url.contains("://") {
        return Some(PathBuf::from(url));
    }
    None
}

/// Fetch a JSON document from a URL or local path.
pub async fn fetch_json(client: &reqwest::Client, url: &str) -> Result<Value, IngestError> {
    if let Some(path) = local_path(url) {
        let data = tokio::fs::read(&path).await?;
        return Ok(serde_json::from_slice(&data)?);
    }
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.json().await?)
}

/// Fetch and parse a YAML document from a URL or local path.
pub async fn fetch_yaml(client: &reqwest::Client, url: &str) -> Result<serde_yaml::Value, IngestError> {
    let text = if let Some(path) = local_path(url) {
        tokio::fs::read_to_string(&path).await?
    } else {
        client.get(url).send().await?.error_for_status()?.text().await?
    };
    serde_yaml::from_str(&text).map_err(|err| IngestError::Parse(err.to_string()))
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>;

/// A line-by-line reader over a local file or an HTTP body.
pub enum LineSource {
    File(Lines<BufReader<File>>),
    Http { stream: ByteStream, buffer: Vec<u8>, done: bool },
}

impl LineSource {
    /// Open a URL or path for line-wise reading.
    pub async fn open(client: &reqwest::Client, url: &str) -> Result<LineSource, IngestError> {
        if let Some(path) = local_path(url) {
            return LineSource::open_file(&path).await;
        }
        tracing::info!(url, "fetching data stream");
        let response = client.get(url).send().await?.error_for_status()?;
        Ok(LineSource::Http {
            stream: Box::pin(response.bytes_stream()),
            buffer: Vec::new(),
            done: false,
        })
    }

    async fn open_file(path: &Path) -> Result<LineSource, IngestError> {
        let file = File::open(path).await?;
        Ok(LineSource::File(BufReader::new(file).lines()))
    }

    /// The next non-empty line, or `None` at the end of the stream.
    pub async fn next_line(&mut self) -> Result<Option<String>, IngestError> {
        loop {
            let line = match self {
                LineSource::File(lines) => lines.next_line().await?,
                LineSource::Http { stream, buffer, done } => {
                    loop {
                        if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                            let mut line: Vec<u8> = buffer.drain(..=pos).collect();
                            line.pop();
                            break Some(String::from_utf8_lossy(&line).into_owned());
                        }
                        if *done {
                            if buffer.is_empty() {
                                break None;
                            }
                            let line = String::from_utf8_lossy(buffer).into_owned();
                            buffer.clear();
                            break Some(line);
                        }
                        match stream.next().await {
                            Some(chunk) => buffer.extend_from_slice(&chunk?),
                            None => *done = true,
                        }
                    }
                }
            };
            match line {
                Some(line) if line.trim().is_empty() => continue,
                other => return Ok(other),
            }
        }
    }
}
