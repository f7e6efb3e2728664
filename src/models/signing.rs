//! Object keys and the request/response shapes of the signing service.

use crate::errors::InvalidKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const MAX_OBJECT_KEY_LEN: usize = 1024;
const MAX_FILENAME_LEN: usize = 200;
const KEY_ROOT: &str = "galleries";

/// Path-like identifier of a stored object. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Validate a caller-supplied key.
    ///
    /// Rejects empty or oversized keys, keys starting with `/`, keys containing
    /// `..`, backslashes, or ASCII control characters. Every `/`-separated
    /// segment must be non-empty and not `.`, so clients cannot normalize the
    /// path away from the one that was signed.
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidKey> {
        let key = raw.into();
        if key.is_empty() {
            return Err(InvalidKey("key is empty".into()));
        }
        if key.len() > MAX_OBJECT_KEY_LEN {
            return Err(InvalidKey(format!(
                "key exceeds {} bytes",
                MAX_OBJECT_KEY_LEN
            )));
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(InvalidKey(format!("`{}` is not a relative key", key)));
        }
        if key
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(InvalidKey(format!(
                "`{}` has an empty or dot path segment",
                key
            )));
        }
        if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
            return Err(InvalidKey("key contains control characters".into()));
        }
        Ok(Self(key))
    }

    /// Build a fresh key for an upload:
    /// `galleries/{gallery}/{millis}_{random}_{sanitized filename}`.
    pub fn for_upload(
        gallery_id: &str,
        filename: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, InvalidKey> {
        validate_gallery_id(gallery_id)?;
        let random = Uuid::new_v4().simple().to_string();
        Self::parse(format!(
            "{}/{}/{}_{}_{}",
            KEY_ROOT,
            gallery_id,
            now.timestamp_millis(),
            &random[..8],
            sanitize_filename(filename)
        ))
    }

    /// Recover the key from a stored public or endpoint URL.
    ///
    /// `https://media.example.com/galleries/g1/1_ab_a.jpg` -> `galleries/g1/1_ab_a.jpg`
    pub fn from_public_url(url: &str) -> Result<Self, InvalidKey> {
        let without_query = url.split(['?', '#']).next().unwrap_or(url);
        let parts: Vec<&str> = without_query.split('/').collect();
        let start = parts
            .iter()
            .position(|p| *p == KEY_ROOT)
            .ok_or_else(|| InvalidKey(format!("`{}` does not contain a gallery key", url)))?;
        Self::parse(parts[start..].join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Gallery ids become a key segment, so they are restricted to a safe alphabet.
pub fn validate_gallery_id(gallery_id: &str) -> Result<(), InvalidKey> {
    if gallery_id.is_empty() {
        return Err(InvalidKey("gallery id is empty".into()));
    }
    if !gallery_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(InvalidKey(format!(
            "gallery id `{}` may only contain letters, digits, `-` and `_`",
            gallery_id
        )));
    }
    Ok(())
}

/// Reduce a user filename to `[A-Za-z0-9._-]`, without leading dots or `..` runs.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        let mapped = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            c
        } else {
            '_'
        };
        if mapped == '.' && out.ends_with('.') {
            continue;
        }
        out.push(mapped);
    }

    let trimmed = out.trim_start_matches('.');
    let mut sanitized: String = trimmed.chars().take(MAX_FILENAME_LEN).collect();
    if sanitized.is_empty() {
        sanitized.push_str("file");
    }
    sanitized
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Put,
    Delete,
}

impl Operation {
    pub fn method(&self) -> &'static str {
        match self {
            Operation::Put => "PUT",
            Operation::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    pub key: ObjectKey,
    pub content_type: String,
    pub operation: Operation,
}

impl SigningRequest {
    /// Upload grant; a missing or blank content type becomes the generic binary type.
    pub fn upload(key: ObjectKey, content_type: Option<&str>) -> Self {
        let content_type = content_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        Self {
            key,
            content_type,
            operation: Operation::Put,
        }
    }

    pub fn delete(key: ObjectKey) -> Self {
        Self {
            key,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            operation: Operation::Delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningResult {
    pub upload_url: String,
    pub public_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Body of `POST /upload-url`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    #[serde(alias = "uploadURL")]
    pub upload_url: String,
    #[serde(alias = "publicURL")]
    pub public_url: String,
    pub key: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Body of `POST /delete`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub key: String,
}

/// Error body returned by the signing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub status: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_rejects_malformed_keys() {
        assert!(ObjectKey::parse("").is_err());
        assert!(ObjectKey::parse("/galleries/g1/a.jpg").is_err());
        assert!(ObjectKey::parse("galleries/../secrets").is_err());
        assert!(ObjectKey::parse("galleries/g1/./a.jpg").is_err());
        assert!(ObjectKey::parse("./galleries/g1/a.jpg").is_err());
        assert!(ObjectKey::parse("galleries//a.jpg").is_err());
        assert!(ObjectKey::parse("galleries/g1/").is_err());
        assert!(ObjectKey::parse("galleries/g1/.").is_err());
        assert!(ObjectKey::parse("galleries/g1/.hidden.jpg").is_ok());
        assert!(ObjectKey::parse("galleries/g1/a\nb.jpg").is_err());
        assert!(ObjectKey::parse("a".repeat(1025)).is_err());
        assert!(ObjectKey::parse("galleries/g1/123_ab_a.jpg").is_ok());
    }

    #[test]
    fn upload_key_has_gallery_prefix_timestamp_and_suffix() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let key = ObjectKey::for_upload("g1", "My Photo (1).JPG", now).unwrap();
        let parts: Vec<&str> = key.as_str().splitn(3, '/').collect();
        assert_eq!(parts[0], "galleries");
        assert_eq!(parts[1], "g1");

        let name: Vec<&str> = parts[2].splitn(3, '_').collect();
        assert_eq!(name[0], now.timestamp_millis().to_string());
        assert_eq!(name[1].len(), 8);
        assert_eq!(name[2], "My_Photo__1_.JPG");
    }

    #[test]
    fn same_file_same_millisecond_gets_distinct_keys() {
        let now = Utc::now();
        let a = ObjectKey::for_upload("g1", "a.jpg", now).unwrap();
        let b = ObjectKey::for_upload("g1", "a.jpg", now).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn gallery_id_cannot_escape_its_prefix() {
        assert!(ObjectKey::for_upload("g1/../g2", "a.jpg", Utc::now()).is_err());
        assert!(ObjectKey::for_upload("", "a.jpg", Utc::now()).is_err());
    }

    #[test]
    fn sanitize_strips_paths_and_dot_runs() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("a..b.jpg"), "a.b.jpg");
        assert_eq!(sanitize_filename("...hidden"), "hidden");
        assert_eq!(sanitize_filename("été.png"), "_t_.png");
        assert_eq!(sanitize_filename(""), "file");
    }

    #[test]
    fn key_is_recovered_from_public_url() {
        let key =
            ObjectKey::from_public_url("https://media.example.com/galleries/123/file.jpg").unwrap();
        assert_eq!(key.as_str(), "galleries/123/file.jpg");

        let key = ObjectKey::from_public_url(
            "https://account.r2.cloudflarestorage.com/bucket/galleries/123/file.jpg?x=1",
        )
        .unwrap();
        assert_eq!(key.as_str(), "galleries/123/file.jpg");

        assert!(ObjectKey::from_public_url("https://media.example.com/other/file.jpg").is_err());
    }

    #[test]
    fn upload_request_defaults_content_type() {
        let key = ObjectKey::parse("galleries/g1/a.bin").unwrap();
        assert_eq!(
            SigningRequest::upload(key.clone(), None).content_type,
            DEFAULT_CONTENT_TYPE
        );
        assert_eq!(
            SigningRequest::upload(key.clone(), Some("  ")).content_type,
            DEFAULT_CONTENT_TYPE
        );
        assert_eq!(
            SigningRequest::upload(key, Some("image/png")).content_type,
            "image/png"
        );
    }

    #[test]
    fn response_accepts_uppercase_url_fields() {
        let body = r#"{"uploadURL":"https://u","publicURL":"https://p","key":"k"}"#;
        let parsed: UploadUrlResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.upload_url, "https://u");
        assert_eq!(parsed.public_url, "https://p");
        assert!(parsed.expires_at.is_none());
    }
}
