//! Presigned URL generation (AWS Signature Version 4, query-string form).
//!
//! The secret key never appears in the output; the URL carries a signature
//! derived from it through a date-scoped HMAC-SHA256 chain.
//! Based on: <https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-query-string-auth.html>

use crate::{
    errors::{ConfigError, SigningError},
    models::{
        credential::Credential,
        signing::{Operation, SigningRequest},
    },
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const REGION: &str = "auto";
pub const SERVICE: &str = "s3";
const TERMINATOR: &str = "aws4_request";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Lifetime of every grant, read or write.
pub const PRESIGN_EXPIRY_SECS: u32 = 3600;

/// Output of [`Signer::sign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Lowercase hex HMAC-SHA256.
    pub signature: String,
    /// Sorted, encoded query string without `X-Amz-Signature`.
    pub canonical_query: String,
    /// Full presigned URL.
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signer {
    expires_secs: u32,
}

impl Default for Signer {
    fn default() -> Self {
        Self {
            expires_secs: PRESIGN_EXPIRY_SECS,
        }
    }
}

impl Signer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different expiry. Zero is rejected.
    pub fn with_expiry(expires_secs: u32) -> Result<Self, ConfigError> {
        if expires_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "expires_secs",
                reason: "must be a positive number of seconds".into(),
            });
        }
        Ok(Self { expires_secs })
    }

    pub fn expires_secs(&self) -> u32 {
        self.expires_secs
    }

    /// Sign `request` as of `timestamp`.
    ///
    /// Deterministic: identical credential, request and timestamp always yield
    /// the same signature and query string.
    pub fn sign(
        &self,
        credential: &Credential,
        request: &SigningRequest,
        timestamp: DateTime<Utc>,
    ) -> Result<Signature, SigningError> {
        credential.validate()?;
        let endpoint = credential.endpoint()?;

        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
        let date = &amz_date[..8];
        let scope = credential_scope(date, REGION, SERVICE);

        let path = format!("{}/{}", endpoint.path_prefix, request.key.as_str());
        let canonical_uri = uri_encode_path(&path);

        // PUT grants bind the content type; the uploader must send it verbatim.
        let mut headers: Vec<(&str, String)> = Vec::with_capacity(2);
        if request.operation == Operation::Put {
            headers.push(("content-type", normalize_header_value(&request.content_type)));
        }
        headers.push(("host", endpoint.host.clone()));
        headers.sort_by(|a, b| a.0.cmp(b.0));
        let signed_headers = headers
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";");

        let canonical_query = canonical_query_string(&[
            ("X-Amz-Algorithm", ALGORITHM.to_string()),
            (
                "X-Amz-Credential",
                format!("{}/{}", credential.access_key_id, scope),
            ),
            ("X-Amz-Date", amz_date.clone()),
            ("X-Amz-Expires", self.expires_secs.to_string()),
            ("X-Amz-SignedHeaders", signed_headers.clone()),
        ]);

        let canonical_request = create_canonical_request(
            request.operation.method(),
            &canonical_uri,
            &canonical_query,
            &headers,
            &signed_headers,
        );
        tracing::debug!("Canonical request:\n{}", canonical_request);

        let string_to_sign = create_string_to_sign(&amz_date, &scope, &canonical_request);
        let signing_key =
            calculate_signing_key(&credential.secret_access_key, date, REGION, SERVICE);
        let signature = calculate_signature(&signing_key, &string_to_sign);

        let url = format!(
            "{}://{}{}?{}&X-Amz-Signature={}",
            endpoint.scheme, endpoint.host, canonical_uri, canonical_query, signature
        );

        Ok(Signature {
            signature,
            canonical_query,
            url,
        })
    }
}

/// `{date}/{region}/{service}/aws4_request`
fn credential_scope(date: &str, region: &str, service: &str) -> String {
    format!("{}/{}/{}/{}", date, region, service, TERMINATOR)
}

/// Creates canonical request string.
///
/// Format:
/// ```text
/// METHOD
/// CANONICAL_URI
/// CANONICAL_QUERY_STRING
/// CANONICAL_HEADERS
///
/// SIGNED_HEADERS
/// UNSIGNED-PAYLOAD
/// ```
fn create_canonical_request(
    method: &str,
    canonical_uri: &str,
    canonical_query: &str,
    headers: &[(&str, String)],
    signed_headers: &str,
) -> String {
    let header_lines = headers
        .iter()
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n{}\n{}\n{}\n\n{}\n{}",
        method, canonical_uri, canonical_query, header_lines, signed_headers, UNSIGNED_PAYLOAD
    )
}

/// Creates string to sign.
///
/// Format:
/// ```text
/// AWS4-HMAC-SHA256
/// TIMESTAMP
/// DATE/REGION/SERVICE/aws4_request
/// HEX(SHA256(CANONICAL_REQUEST))
/// ```
fn create_string_to_sign(timestamp: &str, scope: &str, canonical_request: &str) -> String {
    let hashed_request = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    format!("{}\n{}\n{}\n{}", ALGORITHM, timestamp, scope, hashed_request)
}

/// Calculates signing key using HMAC-SHA256 chain.
///
/// kDate = HMAC-SHA256("AWS4" + secret, date)
/// kRegion = HMAC-SHA256(kDate, region)
/// kService = HMAC-SHA256(kRegion, service)
/// kSigning = HMAC-SHA256(kService, "aws4_request")
fn calculate_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_secret = format!("AWS4{}", secret_key);
    let k_date = hmac_sha256(k_secret.as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, TERMINATOR.as_bytes())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn calculate_signature(signing_key: &[u8], string_to_sign: &str) -> String {
    hex::encode(hmac_sha256(signing_key, string_to_sign.as_bytes()))
}

/// Sorted `name=value` pairs, both percent-encoded (including `/`).
fn canonical_query_string(params: &[(&str, String)]) -> String {
    let mut sorted: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    sorted.sort();
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Path encoding: every segment encoded, `/` separators kept.
fn uri_encode_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    uri_encode(path, false)
}

/// Percent-encodes a string (RFC 3986).
///
/// Only unreserved characters (A-Z, a-z, 0-9, -, _, ., ~) pass through.
/// `/` is kept when `encode_slash` is false (object paths) and encoded
/// otherwise (query values).
fn uri_encode(s: &str, encode_slash: bool) -> String {
    let mut encoded = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            b'/' if !encode_slash => encoded.push('/'),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// Trim and collapse inner whitespace, as stores do before verifying.
fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<&str>>().join(" ")
}
