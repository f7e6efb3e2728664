//! SigningService, the authorization boundary in front of the [`Signer`].
//!
//! Holds the immutable storage credential injected at startup. Upload grants
//! are returned as presigned URLs; deletes are executed here, immediately,
//! with a presigned DELETE so the client never receives a delete grant.

use crate::{
    errors::{ConfigError, SigningError},
    models::{
        credential::Credential,
        signing::{ObjectKey, SigningRequest, SigningResult},
    },
    services::{
        authorizer::{Authorizer, Caller},
        signer::Signer,
    },
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};

/// Everything the signing service reads from configuration.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub credential: Credential,
    /// Base of unsigned read URLs, e.g. `https://media.example.com`.
    pub public_base_url: String,
}

impl StorageSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.credential.validate()?;
        if self.public_base_url.trim().is_empty() {
            return Err(ConfigError::Missing("public_base_url"));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SigningService {
    settings: Arc<StorageSettings>,
    signer: Signer,
    http: reqwest::Client,
    authorizer: Arc<dyn Authorizer>,
}

impl SigningService {
    /// Build the service; incomplete settings are rejected up front.
    pub fn new(
        settings: StorageSettings,
        authorizer: Arc<dyn Authorizer>,
        http: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            settings: Arc::new(settings),
            signer: Signer::new(),
            http,
            authorizer,
        })
    }

    pub fn with_signer(mut self, signer: Signer) -> Self {
        self.signer = signer;
        self
    }

    pub fn authorizer(&self) -> &dyn Authorizer {
        self.authorizer.as_ref()
    }

    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    /// Stable, unsigned URL where the object is readable after upload.
    pub fn public_url(&self, key: &ObjectKey) -> String {
        format!(
            "{}/{}",
            self.settings.public_base_url.trim_end_matches('/'),
            key
        )
    }

    /// Issue a PUT grant for `key`.
    pub fn grant_upload(
        &self,
        caller: &Caller,
        key: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<SigningResult, SigningError> {
        let key = require_key(key)?;
        let request = SigningRequest::upload(key, content_type);
        let result = self.sign_at(&request, Utc::now()).inspect_err(log_failure)?;

        info!(
            caller = %caller,
            key = %request.key,
            content_type = %request.content_type,
            "issued upload grant"
        );
        Ok(result)
    }

    /// Sign a request as of `now`.
    pub fn sign_at(
        &self,
        request: &SigningRequest,
        now: DateTime<Utc>,
    ) -> Result<SigningResult, SigningError> {
        let signature = self.signer.sign(&self.settings.credential, request, now)?;
        Ok(SigningResult {
            upload_url: signature.url,
            public_url: self.public_url(&request.key),
            expires_at: now + Duration::seconds(i64::from(self.signer.expires_secs())),
        })
    }

    /// Remove `key` from the store. Issues exactly one DELETE, never retried.
    pub async fn delete_object(
        &self,
        caller: &Caller,
        key: Option<&str>,
    ) -> Result<ObjectKey, SigningError> {
        let key = require_key(key)?;
        let signed = self
            .sign_at(&SigningRequest::delete(key.clone()), Utc::now())
            .inspect_err(log_failure)?;

        let response = self
            .http
            .delete(&signed.upload_url)
            .send()
            .await
            .map_err(|e| SigningError::Upstream(format!("delete request failed: {e}")))
            .inspect_err(log_failure)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = SigningError::Upstream(format!("HTTP {} - {}", status, body.trim()));
            log_failure(&err);
            return Err(err);
        }

        info!(caller = %caller, key = %key, "deleted object");
        Ok(key)
    }
}

fn require_key(key: Option<&str>) -> Result<ObjectKey, SigningError> {
    let raw = key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| SigningError::Validation("Missing required parameter: key".into()))?;
    Ok(ObjectKey::parse(raw)?)
}

fn log_failure(err: &SigningError) {
    match err {
        SigningError::Configuration(_) | SigningError::Upstream(_) => {
            error!(error = %err, "signing service failure")
        }
        SigningError::Validation(_) | SigningError::Unauthorized(_) => {}
    }
}
