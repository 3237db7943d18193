//! Download request parsing and validation.
//!
//! Requests arrive as JSON, as form-encoded bodies, or as query parameters.
//! Structured encodings are parsed strictly; anything else goes through a
//! bounded best-effort fallback that logs what it drops.

use std::collections::HashMap;
use std::path::{Component, Path};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum number of body bytes echoed into debug logs.
const BODY_LOG_LIMIT: usize = 200;

/// Synchronous intake failures. No record is created for any of them.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Validation: `url`, `folder` or `filename` absent or empty.
    #[error("Missing required parameters")]
    MissingParameters,

    /// Validation: filename would escape the folder's base directory.
    #[error("Invalid filename: {filename}")]
    InvalidFilename {
        /// The rejected filename.
        filename: String,
    },

    /// Resolution: the folder category has no base directory.
    #[error("Invalid folder: {folder}")]
    UnknownFolder {
        /// The unknown folder category.
        folder: String,
    },

    /// Parse: a body declared as JSON is not a JSON object.
    #[error("Invalid JSON")]
    InvalidJson {
        /// The underlying decode error, when there was one.
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Coarse classification of an [`IntakeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeErrorKind {
    /// Request fields absent, empty or unsafe.
    Validation,
    /// Folder category unknown to the path resolver.
    Resolution,
    /// Body could not be decoded.
    Parse,
}

impl IntakeError {
    #[must_use]
    pub fn kind(&self) -> IntakeErrorKind {
        match self {
            Self::MissingParameters | Self::InvalidFilename { .. } => IntakeErrorKind::Validation,
            Self::UnknownFolder { .. } => IntakeErrorKind::Resolution,
            Self::InvalidJson { .. } => IntakeErrorKind::Parse,
        }
    }
}

/// Unvalidated request fields, as decoded from the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DownloadRequest {
    pub url: Option<String>,
    pub folder: Option<String>,
    pub filename: Option<String>,
}

/// A request whose fields are present and safe to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub url: String,
    pub folder: String,
    pub filename: String,
}

impl DownloadRequest {
    /// Convenience constructor with all three fields set.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        folder: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            url: Some(url.into()),
            folder: Some(folder.into()),
            filename: Some(filename.into()),
        }
    }

    /// Checks that every field is present and the filename stays relative.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::MissingParameters`] or [`IntakeError::InvalidFilename`].
    pub fn validate(self) -> Result<ValidatedRequest, IntakeError> {
        let (Some(url), Some(folder), Some(filename)) = (
            non_empty(self.url),
            non_empty(self.folder),
            non_empty(self.filename),
        ) else {
            return Err(IntakeError::MissingParameters);
        };

        if !is_contained_filename(&filename) {
            return Err(IntakeError::InvalidFilename { filename });
        }

        Ok(ValidatedRequest {
            url,
            folder,
            filename,
        })
    }

    fn from_pairs(mut pairs: HashMap<String, String>) -> Self {
        Self {
            url: pairs.remove("url"),
            folder: pairs.remove("folder"),
            filename: pairs.remove("filename"),
        }
    }

    fn from_json_object(object: &serde_json::Map<String, Value>) -> Self {
        let field = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            url: field("url"),
            folder: field("folder"),
            filename: field("filename"),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// True when `filename` is relative and never steps above its base directory.
fn is_contained_filename(filename: &str) -> bool {
    let mut named = false;
    for component in Path::new(filename).components() {
        match component {
            Component::Normal(_) => named = true,
            Component::CurDir => {}
            _ => return false,
        }
    }
    named
}

/// Decodes a request from its content type, raw query string and body.
///
/// Order:
/// 1. `application/json` body (strict)
/// 2. `application/x-www-form-urlencoded` body
/// 3. query parameters, else the body as JSON, else `key=value&...` pairs
///
/// # Errors
///
/// Returns [`IntakeError::InvalidJson`] when a body declared as JSON does not
/// decode to an object.
pub fn parse_request(
    content_type: Option<&str>,
    query: Option<&str>,
    body: &[u8],
) -> Result<DownloadRequest, IntakeError> {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();

    if content_type.contains("application/json") {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| IntakeError::InvalidJson { source: Some(e) })?;
        let Value::Object(object) = value else {
            return Err(IntakeError::InvalidJson { source: None });
        };
        return Ok(DownloadRequest::from_json_object(&object));
    }

    if content_type.contains("application/x-www-form-urlencoded") {
        return Ok(DownloadRequest::from_pairs(decode_form(body)));
    }

    let text = String::from_utf8_lossy(body);
    debug!(
        body = %truncate_for_log(&text, BODY_LOG_LIMIT),
        "decoding request without structured content type"
    );

    let from_query = query.map(|q| decode_form(q.as_bytes())).unwrap_or_default();
    if !from_query.is_empty() {
        return Ok(DownloadRequest::from_pairs(from_query));
    }

    if text.trim().is_empty() {
        return Ok(DownloadRequest::default());
    }

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&text) {
        return Ok(DownloadRequest::from_json_object(&object));
    }

    Ok(DownloadRequest::from_pairs(split_pairs(&text)))
}

fn decode_form(input: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(input).into_owned().collect()
}

/// Naive `key=value&key=value` split without percent-decoding.
///
/// Segments without `=` are dropped and counted in a warning.
fn split_pairs(text: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    let mut dropped = 0usize;
    for segment in text.trim().split('&') {
        match segment.split_once('=') {
            Some((key, value)) => {
                pairs.insert(key.to_string(), value.to_string());
            }
            None if segment.is_empty() => {}
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        warn!(dropped, "fallback body parsing dropped malformed pairs");
    }
    pairs
}

fn truncate_for_log(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected() -> DownloadRequest {
        DownloadRequest::new("http://x/model.bin", "checkpoints", "m.bin")
    }

    #[test]
    fn test_parse_json_body() {
        let body = br#"{"url":"http://x/model.bin","folder":"checkpoints","filename":"m.bin"}"#;
        let parsed = parse_request(Some("application/json; charset=utf-8"), None, body).unwrap();
        assert_eq!(parsed, expected());
    }

    #[test]
    fn test_parse_invalid_json_body_is_parse_error() {
        let result = parse_request(Some("application/json"), None, b"{not json");
        assert!(matches!(result, Err(IntakeError::InvalidJson { source: Some(_) })));
        assert_eq!(result.unwrap_err().to_string(), "Invalid JSON");
    }

    #[test]
    fn test_parse_json_array_is_parse_error() {
        let result = parse_request(Some("application/json"), None, b"[1,2]");
        assert!(matches!(result, Err(IntakeError::InvalidJson { source: None })));
    }

    #[test]
    fn test_parse_json_non_string_field_counts_as_missing() {
        let body = br#"{"url":"http://x/model.bin","folder":7,"filename":"m.bin"}"#;
        let parsed = parse_request(Some("application/json"), None, body).unwrap();
        assert_eq!(parsed.folder, None);
        assert!(matches!(parsed.validate(), Err(IntakeError::MissingParameters)));
    }

    #[test]
    fn test_parse_form_body_percent_decodes() {
        let body = b"url=http%3A%2F%2Fx%2Fmodel.bin&folder=checkpoints&filename=m.bin";
        let parsed =
            parse_request(Some("application/x-www-form-urlencoded"), None, body).unwrap();
        assert_eq!(parsed, expected());
    }

    #[test]
    fn test_parse_query_parameters_take_precedence_over_untyped_body() {
        let query = "url=http%3A%2F%2Fx%2Fmodel.bin&folder=checkpoints&filename=m.bin";
        let parsed = parse_request(None, Some(query), b"ignored=1").unwrap();
        assert_eq!(parsed, expected());
    }

    #[test]
    fn test_parse_untyped_json_body() {
        let body = br#"{"url":"http://x/model.bin","folder":"checkpoints","filename":"m.bin"}"#;
        let parsed = parse_request(Some("text/plain"), None, body).unwrap();
        assert_eq!(parsed, expected());
    }

    #[test]
    fn test_parse_untyped_pairs_fallback_drops_malformed_segments() {
        let body = b"url=http://x/model.bin&garbage&folder=checkpoints&filename=m.bin";
        let parsed = parse_request(None, None, body).unwrap();
        assert_eq!(parsed, expected());
    }

    #[test]
    fn test_parse_empty_body_yields_empty_request() {
        let parsed = parse_request(None, None, b"").unwrap();
        assert_eq!(parsed, DownloadRequest::default());
    }

    #[test]
    fn test_validate_rejects_missing_and_blank_fields() {
        let mut request = expected();
        request.url = None;
        assert!(matches!(request.validate(), Err(IntakeError::MissingParameters)));

        let mut request = expected();
        request.filename = Some("   ".to_string());
        let err = request.validate().unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameters");
    }

    #[test]
    fn test_validate_accepts_nested_relative_filename() {
        let request = DownloadRequest::new("http://x/m", "loras", "styles/anime.safetensors");
        let validated = request.validate().unwrap();
        assert_eq!(validated.filename, "styles/anime.safetensors");
    }

    #[test]
    fn test_validate_rejects_escaping_filenames() {
        for filename in [
            "../evil.bin",
            "/etc/passwd",
            "a/../../b.bin",
            ".",
            "./",
            "././",
        ] {
            let request = DownloadRequest::new("http://x/m", "loras", filename);
            match request.validate() {
                Err(IntakeError::InvalidFilename { filename: rejected }) => {
                    assert_eq!(rejected, filename);
                }
                other => panic!("Expected InvalidFilename for {filename}, got: {other:?}"),
            }
        }
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(IntakeError::MissingParameters.kind(), IntakeErrorKind::Validation);
        let unknown = IntakeError::UnknownFolder {
            folder: "nope".to_string(),
        };
        assert_eq!(unknown.kind(), IntakeErrorKind::Resolution);
        assert_eq!(unknown.to_string(), "Invalid folder: nope");
        assert_eq!(
            IntakeError::InvalidJson { source: None }.kind(),
            IntakeErrorKind::Parse
        );
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("héllo", 2), "hé");
        assert_eq!(truncate_for_log("abc", 10), "abc");
    }
}
