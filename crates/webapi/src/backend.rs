//! Seams between the pool and concrete Gemini clients.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use gemproxy_core::conversation::Attachment;
use gemproxy_core::gemini::{ChatMetadata, ModelOutput};
use gemproxy_core::model::GeminiModel;
use serde::Deserialize;

use crate::error::Result;

/// Google session cookies for one account.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credential {
    pub id: String,
    pub secure_1psid: String,
    #[serde(default)]
    pub secure_1psidts: Option<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secure_1psid", &redact(&self.secure_1psid))
            .field(
                "secure_1psidts",
                &self.secure_1psidts.as_deref().map(redact),
            )
            .finish()
    }
}

/// Shortens a secret to its first 10 characters for logging.
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(10).collect();
    format!("{prefix}...")
}

/// A signed-in Gemini client.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends one prompt, continuing the chat in `metadata` when given.
    async fn generate(
        &self,
        prompt: &str,
        attachments: &[Attachment],
        model: GeminiModel,
        metadata: Option<&ChatMetadata>,
    ) -> Result<ModelOutput>;

    fn is_running(&self) -> bool;

    /// Stops background work. The client is unusable afterwards.
    async fn close(&self);
}

/// Creates signed-in clients for the pool.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn create(&self, credential: &Credential) -> Result<Arc<dyn ChatBackend>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact() {
        assert_eq!(redact("g.a000abcdefghijklmnop"), "g.a000abcd...");
        assert_eq!(redact("short"), "short...");
    }

    #[test]
    fn test_credential_debug_hides_cookies() {
        let credential = Credential {
            id: "main".to_string(),
            secure_1psid: "g.a000secretsecretsecret".to_string(),
            secure_1psidts: Some("sidts-secretsecret".to_string()),
        };

        let debug = format!("{credential:?}");
        assert!(debug.contains("main"));
        assert!(!debug.contains("secretsecretsecret"));
    }
}
