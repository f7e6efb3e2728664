//! Storage credential for the S3-compatible object store.
//!
//! Built once at startup and handed to the signing service. The secret never
//! leaves this process: `Debug` redacts it and nothing serializes it.

use crate::errors::ConfigError;
use reqwest::Url;
use std::fmt;

/// How the bucket is addressed on the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Addressing {
    /// `https://{bucket}.{endpoint-host}/{key}`
    #[default]
    VirtualHosted,
    /// `https://{endpoint-host}/{bucket}/{key}`, used by local emulators.
    PathStyle,
}

#[derive(Clone)]
pub struct Credential {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Account endpoint, e.g. `https://{account}.r2.cloudflarestorage.com`.
    pub account_endpoint: String,
    pub bucket: String,
    pub addressing: Addressing,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("account_endpoint", &self.account_endpoint)
            .field("bucket", &self.bucket)
            .field("addressing", &self.addressing)
            .finish()
    }
}

/// Scheme, authority and path prefix of the bucket, as seen by the signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEndpoint {
    pub scheme: String,
    /// Host header value, including a non-default port.
    pub host: String,
    /// Path prefix placed before the key: empty, or `/{bucket}` for path style.
    pub path_prefix: String,
}

impl Credential {
    /// Endpoint derived from a Cloudflare R2 account id.
    pub fn r2_endpoint(account_id: &str) -> String {
        format!("https://{}.r2.cloudflarestorage.com", account_id)
    }

    /// Check every field is present and the endpoint is a usable URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_key_id.trim().is_empty() {
            return Err(ConfigError::Missing("access_key_id"));
        }
        if self.secret_access_key.is_empty() {
            return Err(ConfigError::Missing("secret_access_key"));
        }
        if self.account_endpoint.trim().is_empty() {
            return Err(ConfigError::Missing("account_endpoint"));
        }
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::Missing("bucket"));
        }
        if self.bucket.contains('/') {
            return Err(ConfigError::Invalid {
                field: "bucket",
                reason: "must not contain `/`".into(),
            });
        }
        self.endpoint().map(|_| ())
    }

    /// Resolve where requests for this bucket are sent and which host is signed.
    pub fn endpoint(&self) -> Result<BucketEndpoint, ConfigError> {
        let url = Url::parse(self.account_endpoint.trim()).map_err(|e| ConfigError::Invalid {
            field: "account_endpoint",
            reason: e.to_string(),
        })?;

        let scheme = url.scheme();
        if scheme != "https" && scheme != "http" {
            return Err(ConfigError::Invalid {
                field: "account_endpoint",
                reason: format!("unsupported scheme `{}`", scheme),
            });
        }

        let host = url.host_str().ok_or(ConfigError::Invalid {
            field: "account_endpoint",
            reason: "missing host".into(),
        })?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(match self.addressing {
            Addressing::VirtualHosted => BucketEndpoint {
                scheme: scheme.to_string(),
                host: format!("{}.{}", self.bucket, authority),
                path_prefix: String::new(),
            },
            Addressing::PathStyle => BucketEndpoint {
                scheme: scheme.to_string(),
                host: authority,
                path_prefix: format!("/{}", self.bucket),
            },
        })
    }
}
