//! HTTP client for the csvdeck API, including the server-sent event stream.

use std::collections::VecDeque;
use std::path::Path;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use thiserror::Error;

use crate::events::{FileEventKind, FileLifecycleEvent};
use crate::tabular::{Dataset, DecodeError};

/// Errors surfaced by [`ApiClient`].
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    /// Server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Decode(#[from] DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Clone, Debug)]
pub struct ApiClient {
    base: Url,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base: &str) -> ClientResult<Self> {
        let base = Url::parse(base).map_err(|e| ClientError::InvalidUrl(format!("{base}: {e}")))?;
        Ok(Self { base, client: reqwest::Client::new() })
    }

    pub fn base_url(&self) -> &Url { &self.base }

    fn url(&self, path: &str) -> ClientResult<Url> {
        self.base.join(path).map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))
    }

    /// URL for a route taking a stored identity as its last path segment.
    fn identity_url(&self, route: &str, identity: &str) -> ClientResult<Url> {
        self.url(&format!("{}/{}", route, urlencoding::encode(identity)))
    }

    async fn check(resp: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(ClientError::Http { status: status.as_u16(), message })
    }

    pub async fn list_files(&self) -> ClientResult<Vec<String>> {
        let resp = self.client.get(self.url("/api/getFileList")?).send().await?;
        Ok(Self::check(resp).await?.json::<Vec<String>>().await?)
    }

    /// Upload a file from disk under its own file name.
    pub async fn upload_file(&self, path: &Path) -> ClientResult<String> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.csv".to_string());
        self.upload_bytes(&name, bytes).await
    }

    pub async fn upload_bytes(&self, file_name: &str, bytes: Vec<u8>) -> ClientResult<String> {
        let part = Part::bytes(bytes).file_name(file_name.to_string()).mime_str("text/csv")?;
        let form = Form::new().part("file", part);
        let resp = self.client.post(self.url("/api/uploadFile")?).multipart(form).send().await?;
        Ok(Self::check(resp).await?.text().await?)
    }

    /// Raw JSON rows for `identity`.
    pub async fn get_file_rows(&self, identity: &str) -> ClientResult<Vec<serde_json::Value>> {
        let resp = self.client.get(self.identity_url("/api/getFileData", identity)?).send().await?;
        Ok(Self::check(resp).await?.json::<Vec<serde_json::Value>>().await?)
    }

    /// Rows for `identity` as a dataset; an empty file is an error.
    pub async fn fetch_dataset(&self, identity: &str) -> ClientResult<Dataset> {
        let rows = self.get_file_rows(identity).await?;
        Ok(Dataset::from_json_rows(&rows)?)
    }

    pub async fn delete_file(&self, identity: &str) -> ClientResult<String> {
        let resp = self.client.delete(self.identity_url("/api/deleteFile", identity)?).send().await?;
        Ok(Self::check(resp).await?.text().await?)
    }

    /// Open the lifecycle event stream.
    pub async fn subscribe_events(&self) -> ClientResult<EventStream> {
        let resp = self
            .client
            .get(self.url("/api/events")?)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(EventStream {
            body: Box::pin(resp.bytes_stream()),
            parser: SseParser::default(),
            pending: VecDeque::new(),
        })
    }
}

// reqwest yields `bytes::Bytes`, which axum re-exports.
type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<axum::body::Bytes>> + Send>>;

/// Lifecycle events read from `/api/events`. Dropping it closes the
/// connection, which unregisters the listener on the server.
pub struct EventStream {
    body: ByteStream,
    parser: SseParser,
    pending: VecDeque<FileLifecycleEvent>,
}

impl EventStream {
    /// Next event, or `None` when the server closed the stream.
    pub async fn next_event(&mut self) -> Option<ClientResult<FileLifecycleEvent>> {
        loop {
            if let Some(ev) = self.pending.pop_front() {
                return Some(Ok(ev));
            }
            match self.body.next().await? {
                Ok(chunk) => self.pending.extend(self.parser.push(&chunk)),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Incremental text/event-stream parser for lifecycle frames.
///
/// Frames with an unknown `event:` name, comments (keep-alives) and frames
/// whose data is not a JSON string are skipped.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
}

impl SseParser {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<FileLifecycleEvent> {
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
        let mut out = Vec::new();
        while let Some(end) = find_blank_line(&self.buf) {
            let frame: Vec<u8> = self.buf.drain(..end + 2).collect();
            if let Some(ev) = parse_frame(&String::from_utf8_lossy(&frame)) {
                out.push(ev);
            }
        }
        out
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn parse_frame(frame: &str) -> Option<FileLifecycleEvent> {
    let mut event: Option<&str> = None;
    let mut data: Vec<&str> = Vec::new();
    for line in frame.lines() {
        if line.is_empty() || line.starts_with(':') { continue; }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value),
            "data" => data.push(value),
            _ => {}
        }
    }
    let kind = FileEventKind::from_event_name(event?)?;
    let identity: String = serde_json::from_str(&data.join("\n")).ok()?;
    Some(FileLifecycleEvent::new(kind, identity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frames_split_across_chunks() {
        let mut p = SseParser::default();
        assert!(p.push(b"event: fileUpl").is_empty());
        assert!(p.push(b"oaded\ndata: \"1-a.csv\"").is_empty());
        let evs = p.push(b"\n\nevent: fileDeleted\ndata: \"1-a.csv\"\n\n");
        assert_eq!(
            evs,
            vec![
                FileLifecycleEvent::new(FileEventKind::Uploaded, "1-a.csv"),
                FileLifecycleEvent::new(FileEventKind::Deleted, "1-a.csv"),
            ]
        );
    }

    #[test]
    fn skips_keep_alives_and_unknown_events() {
        let mut p = SseParser::default();
        let evs = p.push(b":\n\nevent: other\ndata: \"x\"\n\nevent: fileDeleted\ndata: not-json\n\n");
        assert!(evs.is_empty());
    }

    #[test]
    fn accepts_crlf_line_endings() {
        let mut p = SseParser::default();
        let evs = p.push(b"event: fileUploaded\r\ndata: \"2-b.csv\"\r\n\r\n");
        assert_eq!(evs, vec![FileLifecycleEvent::new(FileEventKind::Uploaded, "2-b.csv")]);
    }

    #[test]
    fn round_trips_server_frames() {
        let ev = FileLifecycleEvent::new(FileEventKind::Uploaded, "3-we\"ird name.csv");
        let mut p = SseParser::default();
        assert_eq!(p.push(ev.to_sse_frame().as_bytes()), vec![ev]);
    }

    #[test]
    fn identity_urls_are_percent_encoded() {
        let api = ApiClient::new("http://127.0.0.1:5173").unwrap();
        let url = api.identity_url("/api/getFileData", "1-my file#1.csv").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5173/api/getFileData/1-my%20file%231.csv");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(ApiClient::new("not a url"), Err(ClientError::InvalidUrl(_))));
    }
}
