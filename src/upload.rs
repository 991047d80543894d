//! Delivery of composites to the remote processing endpoint.

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Multipart field name the endpoint reads the image from.
pub const UPLOAD_FIELD: &str = "file";

/// Outcome of one successful POST.
#[derive(Clone, Debug)]
pub struct UploadRecord {
    pub status: u16,
    pub response: serde_json::Value,
}

/// Sink that accepts a persisted composite.
pub trait UploadSink {
    fn upload(&self, path: &Path) -> Result<UploadRecord>;
}

/// Posts files as `multipart/form-data` to a fixed URL.
pub struct HttpUploader {
    client: Client,
    url: String,
}

impl HttpUploader {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(url, client))
    }

    pub fn with_client(url: impl Into<String>, client: Client) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl UploadSink for HttpUploader {
    fn upload(&self, path: &Path) -> Result<UploadRecord> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "composite.png".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/png")?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .with_context(|| format!("Failed to POST {} to {}", path.display(), self.url))?;

        let status = response.status();
        let text = response
            .text()
            .with_context(|| format!("Failed to read response body from {}", self.url))?;

        if !status.is_success() {
            return Err(anyhow!(
                "Upload to {} rejected with HTTP {}: {}",
                self.url,
                status,
                text
            ));
        }

        let body = match serde_json::from_str(&text) {
            Ok(json) => json,
            Err(e) => {
                warn!("Upload response is not JSON ({}), keeping raw text", e);
                serde_json::Value::String(text)
            }
        };
        debug!("Upload response: {}", body);

        Ok(UploadRecord {
            status: status.as_u16(),
            response: body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};
    use tempfile::tempdir;

    /// Serves exactly one HTTP request and hands back the raw request body.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/uploadfile/", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
            }

            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let response = format!(
                concat!(
                    "{}\r\n",
                    "Content-Type: application/json\r\n",
                    "Content-Length: {}\r\n",
                    "Connection: close\r\n\r\n{}"
                ),
                status_line,
                body.len(),
                body
            );
            let mut stream = stream;
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request_body).to_string()
        });

        (url, handle)
    }

    fn uploader(url: &str) -> HttpUploader {
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();
        HttpUploader::with_client(url, client)
    }

    #[test]
    fn test_upload_sends_file_field_and_parses_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("20240309070500_1.png");
        std::fs::write(&path, b"not-really-a-png").unwrap();

        let (url, server) = serve_once("HTTP/1.1 200 OK", r#"{"filename":"20240309070500_1.png"}"#);
        let record = uploader(&url).upload(&path).unwrap();
        let request_body = server.join().unwrap();

        assert_eq!(record.status, 200);
        assert_eq!(record.response["filename"], "20240309070500_1.png");
        assert!(request_body.contains(r#"name="file""#));
        assert!(request_body.contains(r#"filename="20240309070500_1.png""#));
        assert!(request_body.contains("not-really-a-png"));
    }

    #[test]
    fn test_upload_http_error_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x_1.png");
        std::fs::write(&path, b"data").unwrap();

        let (url, server) =
            serve_once("HTTP/1.1 500 Internal Server Error", r#"{"detail":"boom"}"#);
        let err = uploader(&url).upload(&path).unwrap_err();
        server.join().unwrap();

        let msg = err.to_string();
        assert!(msg.contains("500"), "unexpected error: {}", msg);
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_upload_non_json_body_kept_as_string() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("y_1.png");
        std::fs::write(&path, b"data").unwrap();

        let (url, server) = serve_once("HTTP/1.1 200 OK", "accepted");
        let record = uploader(&url).upload(&path).unwrap();
        server.join().unwrap();

        assert_eq!(record.response, serde_json::Value::String("accepted".to_string()));
    }

    #[test]
    fn test_upload_missing_file_fails_before_network() {
        let err = uploader("http://127.0.0.1:9/")
            .upload(Path::new("/definitely/not/here_1.png"))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
