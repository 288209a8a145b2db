//! Object store client over plain HTTP PUT/GET.
//!
//! Requests are made by spawning `curl`, one process per call. A key maps
//! to `{base_url}/{key}`; 404 on GET means the key is absent.

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::debug;

use super::{ArtifactStore, StoreError, StoreResult, validate_key};

/// Connection timeout passed to curl (seconds)
const CONNECT_TIMEOUT: u64 = 10;

/// Whole-request timeout passed to curl (seconds)
const MAX_TIME: u64 = 120;

#[derive(Debug, Clone)]
pub struct HttpStore {
    base_url: String,
    token: Option<String>,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("curl");
        cmd.args([
            "-s",
            "-S",
            "--connect-timeout",
            &CONNECT_TIMEOUT.to_string(),
            "--max-time",
            &MAX_TIME.to_string(),
        ]);
        if let Some(token) = &self.token {
            cmd.args(["-H", &format!("Authorization: Bearer {}", token)]);
        }
        cmd
    }
}

impl ArtifactStore for HttpStore {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> StoreResult<()> {
        validate_key(key)?;
        let url = self.url_for(key);

        let mut child = self
            .command()
            .args([
                "-X",
                "PUT",
                "-H",
                &format!("Content-Type: {}", content_type),
                "--data-binary",
                "@-",
                "-o",
                "/dev/null",
                "-w",
                "%{http_code}",
                &url,
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| std::io::Error::other("Failed to capture stdin"))?;
            stdin.write_all(bytes)?;
        }

        let output = child.wait_with_output()?;
        let code = parse_status(&output.stdout);
        debug!(url = %url, code, bytes = bytes.len(), "PUT artifact");

        match code {
            200..=299 => Ok(()),
            0 => Err(StoreError::Http {
                key: key.to_string(),
                reason: transport_error(&output.stderr),
            }),
            code => Err(StoreError::Http {
                key: key.to_string(),
                reason: format!("HTTP {}", code),
            }),
        }
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_key(key)?;
        let url = self.url_for(key);

        // Body first, then the three-digit status code appended by -w.
        let output = self.command().args(["-w", "%{http_code}", &url]).output()?;
        let stdout = output.stdout;
        if stdout.len() < 3 {
            return Err(StoreError::Http {
                key: key.to_string(),
                reason: transport_error(&output.stderr),
            });
        }
        let (body, status) = stdout.split_at(stdout.len() - 3);
        let code = parse_status(status);
        debug!(url = %url, code, bytes = body.len(), "GET artifact");

        match code {
            200..=299 => Ok(Some(body.to_vec())),
            404 => Ok(None),
            0 => Err(StoreError::Http {
                key: key.to_string(),
                reason: transport_error(&output.stderr),
            }),
            code => Err(StoreError::Http {
                key: key.to_string(),
                reason: format!("HTTP {}", code),
            }),
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn parse_status(raw: &[u8]) -> u16 {
    String::from_utf8_lossy(raw).trim().parse().unwrap_or(0)
}

fn transport_error(stderr: &[u8]) -> String {
    let msg = String::from_utf8_lossy(stderr).trim().to_string();
    if msg.is_empty() {
        "connection failed".to_string()
    } else {
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_trims_trailing_slash() {
        let store = HttpStore::new("http://localhost:9000/bucket/");
        assert_eq!(
            store.url_for("diffs/1-a-diff.png"),
            "http://localhost:9000/bucket/diffs/1-a-diff.png"
        );
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status(b"200"), 200);
        assert_eq!(parse_status(b"000"), 0);
        assert_eq!(parse_status(b"garbage"), 0);
    }

    #[test]
    fn test_invalid_key_rejected_before_request() {
        let store = HttpStore::new("http://127.0.0.1:9");
        assert!(matches!(
            store.put("../x.png", b"", "image/png"),
            Err(StoreError::InvalidKey(_))
        ));
    }
}
