use crate::error::UploadError;
use crate::upload::credentials::Credential;
use crate::upload::metadata::UploadMetadata;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

const DEFAULT_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/youtube/v3/videos";
const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;
/// Chunk transfers can legitimately take minutes on slow links.
const HTTP_TIMEOUT_SECS: u64 = 300;

/// Intermediate "keep going" status of the resumable protocol.
const STATUS_RESUME_INCOMPLETE: u16 = 308;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

/// Pushes one finished artifact through the platform's resumable upload
/// protocol. No retries live here; a failed chunk aborts the whole attempt
/// and a fresh attempt is the caller's decision.
pub struct UploadClient {
    http: reqwest::blocking::Client,
    upload_base: String,
    chunk_size: usize,
}

impl UploadClient {
    pub fn new() -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            http,
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Point the client at a different upload endpoint.
    pub fn with_upload_base(mut self, base: impl Into<String>) -> Self {
        self.upload_base = base.into();
        self
    }

    /// Upload the artifact and return the platform-assigned video id.
    /// `progress` receives a non-decreasing fraction in [0, 1] after every
    /// confirmed chunk, ending at exactly 1.0 on success.
    pub fn upload(
        &self,
        artifact: &Path,
        metadata: &UploadMetadata,
        credential: &Credential,
        progress: &mut dyn FnMut(f64),
    ) -> Result<String, UploadError> {
        let total = std::fs::metadata(artifact)
            .map_err(|e| UploadError::Artifact {
                path: artifact.to_path_buf(),
                source: e,
            })?
            .len();
        if total == 0 {
            return Err(UploadError::Artifact {
                path: artifact.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, "artifact is empty"),
            });
        }
        let mut file = File::open(artifact).map_err(|e| UploadError::Artifact {
            path: artifact.to_path_buf(),
            source: e,
        })?;

        log::info!(
            "Uploading {} ({:.2} MB) as \"{}\"",
            artifact.display(),
            total as f64 / (1024.0 * 1024.0),
            metadata.title
        );

        let session_url = self.initiate_session(metadata, credential, total)?;
        progress(0.0);

        for (start, end) in chunk_spans(total, self.chunk_size as u64) {
            let len = (end - start + 1) as usize;
            let mut buf = vec![0u8; len];
            file.read_exact(&mut buf).map_err(|e| UploadError::Artifact {
                path: artifact.to_path_buf(),
                source: e,
            })?;

            let response = self
                .http
                .put(&session_url)
                .bearer_auth(&credential.access_token)
                .header(reqwest::header::CONTENT_RANGE, content_range(start, end, total))
                .body(buf)
                .send()?;

            let status = response.status();
            if status.as_u16() == STATUS_RESUME_INCOMPLETE {
                let fraction = (end + 1) as f64 / total as f64;
                progress(fraction);
                log::info!("Upload progress: {}%", (fraction * 100.0) as u32);
                continue;
            }
            if status.is_success() {
                let parsed: UploadResponse = response.json()?;
                progress(1.0);
                log::info!("Upload complete, assigned video id {}", parsed.id);
                return Ok(parsed.id);
            }

            let body = response.text().unwrap_or_default();
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // Every byte was sent but the session never produced a final answer.
        Err(UploadError::Rejected {
            status: STATUS_RESUME_INCOMPLETE,
            body: "upload session ended without a final response".to_string(),
        })
    }

    fn initiate_session(
        &self,
        metadata: &UploadMetadata,
        credential: &Credential,
        total: u64,
    ) -> Result<String, UploadError> {
        let url = format!(
            "{}?uploadType=resumable&part=snippet,status",
            self.upload_base
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&credential.access_token)
            .header("X-Upload-Content-Length", total.to_string())
            .header("X-Upload-Content-Type", "video/mp4")
            .json(&metadata.request_body())
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string())
            .ok_or_else(|| UploadError::Rejected {
                status: status.as_u16(),
                body: "initiation response carried no session location".to_string(),
            })
    }
}

impl Default for UploadClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Inclusive byte spans covering `total` bytes in `chunk_size` steps.
pub(crate) fn chunk_spans(total: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let mut spans = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + chunk_size - 1).min(total - 1);
        spans.push((start, end));
        start = end + 1;
    }
    spans
}

pub(crate) fn content_range(start: u64, end: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", start, end, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_spans_exact_division() {
        assert_eq!(chunk_spans(20, 10), vec![(0, 9), (10, 19)]);
    }

    #[test]
    fn test_chunk_spans_with_remainder() {
        assert_eq!(chunk_spans(25, 10), vec![(0, 9), (10, 19), (20, 24)]);
    }

    #[test]
    fn test_single_chunk_for_small_files() {
        assert_eq!(chunk_spans(3, 10), vec![(0, 2)]);
    }

    #[test]
    fn test_spans_cover_every_byte_once() {
        let total = 1234;
        let spans = chunk_spans(total, 100);
        let mut expected_start = 0;
        for (start, end) in &spans {
            assert_eq!(*start, expected_start);
            assert!(end >= start);
            expected_start = end + 1;
        }
        assert_eq!(expected_start, total);
    }

    #[test]
    fn test_progress_fractions_are_monotone_and_terminal() {
        // The fraction reported after each confirmed chunk, plus the final
        // 1.0 emitted on the success response.
        let total = 250u64;
        let mut fractions: Vec<f64> = chunk_spans(total, 100)
            .iter()
            .map(|(_, end)| (end + 1) as f64 / total as f64)
            .collect();
        fractions.push(1.0);

        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*fractions.last().unwrap(), 1.0);
    }

    #[test]
    fn test_content_range_header_format() {
        assert_eq!(content_range(0, 8388607, 20000000), "bytes 0-8388607/20000000");
        assert_eq!(content_range(10, 19, 25), "bytes 10-19/25");
    }

    #[test]
    fn test_upload_base_can_be_redirected() {
        let client = UploadClient::new().with_upload_base("http://127.0.0.1:9/upload");
        assert_eq!(client.upload_base, "http://127.0.0.1:9/upload");
        assert_eq!(UploadClient::new().upload_base, DEFAULT_UPLOAD_BASE);
    }

    #[test]
    fn test_upload_response_parse() {
        let parsed: UploadResponse = serde_json::from_str(r#"{"id": "vid-123", "kind": "upload"}"#).unwrap();
        assert_eq!(parsed.id, "vid-123");
    }

    #[test]
    fn test_missing_artifact_is_artifact_error() {
        let client = UploadClient::new();
        let credential = Credential {
            access_token: "t".to_string(),
            refresh_token: None,
            expiry: None,
            token_type: "Bearer".to_string(),
            scopes: vec![],
        };
        let metadata = crate::upload::metadata::UploadMetadata {
            title: "t".to_string(),
            description: "d".to_string(),
            tags: vec![],
            category_id: "22".to_string(),
            privacy_status: "public".to_string(),
        };

        let result = client.upload(
            Path::new("/definitely/not/here.mp4"),
            &metadata,
            &credential,
            &mut |_| {},
        );
        assert!(matches!(result, Err(UploadError::Artifact { .. })));
    }
}
