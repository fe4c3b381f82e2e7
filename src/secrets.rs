use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use zeroize::Zeroizing;

use crate::error::GatewayError;

/// A credential scoped to exactly one upstream call. Never store this in
/// any component whose lifetime exceeds one request; the backing string is
/// wrapped in `Zeroizing` so it's overwritten the moment it drops.
pub struct EphemeralCredential {
    api_key: Zeroizing<String>,
    pub fetched_at: DateTime<Utc>,
}

impl EphemeralCredential {
    pub fn as_str(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for EphemeralCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print credential content, even in debug builds.
        f.debug_struct("EphemeralCredential")
            .field("api_key", &"<redacted>")
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, secret_path: &str) -> Result<EphemeralCredential, GatewayError>;
}

#[derive(Deserialize)]
struct ApiKeySecret {
    api_key: String,
}

/// Vault-backed secret store, authenticated once at startup via an
/// app-role identity.
pub struct VaultSecretStore {
    client: VaultClient,
    /// KV-v2 mount the secret paths live under, e.g. "secret".
    mount: String,
}

impl VaultSecretStore {
    pub async fn authenticate(
        addr: &str,
        role_id: &str,
        secret_id: &str,
    ) -> anyhow::Result<Self> {
        let bootstrap_settings = VaultClientSettingsBuilder::default()
            .address(addr)
            .build()?;
        let bootstrap_client = VaultClient::new(bootstrap_settings)?;

        let login = vaultrs::auth::approle::login(&bootstrap_client, "approle", role_id, secret_id)
            .await?;

        let authed_settings = VaultClientSettingsBuilder::default()
            .address(addr)
            .token(login.client_token)
            .build()?;
        let client = VaultClient::new(authed_settings)?;

        Ok(Self {
            client,
            mount: "secret".to_string(),
        })
    }

    /// `secret_path` is the full path as shipped in a [`crate::router::
    /// ProviderDescriptor`], e.g. `secret/infrastructure/openai`. Strip the
    /// mount prefix before handing the remainder to the KV-v2 API.
    fn relative_path<'a>(&self, secret_path: &'a str) -> &'a str {
        secret_path
            .strip_prefix(&format!("{}/", self.mount))
            .unwrap_or(secret_path)
    }
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    async fn get(&self, secret_path: &str) -> Result<EphemeralCredential, GatewayError> {
        let path = self.relative_path(secret_path);
        let secret: ApiKeySecret = vaultrs::kv2::read(&self.client, &self.mount, path)
            .await
            .map_err(|e| {
                tracing::warn!("secret store read failed for path class: {}", e);
                GatewayError::SecretsUnavailable
            })?;

        Ok(EphemeralCredential {
            api_key: Zeroizing::new(secret.api_key),
            fetched_at: Utc::now(),
        })
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;

    /// In-memory secret store used by pipeline tests so they don't need a
    /// real Vault instance.
    pub struct FakeSecretStore {
        secrets: HashMap<&'static str, &'static str>,
    }

    impl FakeSecretStore {
        pub fn new(secrets: &[(&'static str, &'static str)]) -> Self {
            Self {
                secrets: secrets.iter().copied().collect(),
            }
        }
    }

    #[async_trait]
    impl SecretStore for FakeSecretStore {
        async fn get(&self, secret_path: &str) -> Result<EphemeralCredential, GatewayError> {
            self.secrets
                .get(secret_path)
                .map(|key| EphemeralCredential {
                    api_key: Zeroizing::new((*key).to_string()),
                    fetched_at: Utc::now(),
                })
                .ok_or(GatewayError::SecretsUnavailable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeSecretStore;
    use super::*;

    #[tokio::test]
    async fn returns_credential_for_known_path() {
        let store = FakeSecretStore::new(&[("secret/infrastructure/openai", "sk-test")]);
        let cred = store.get("secret/infrastructure/openai").await.unwrap();
        assert_eq!(cred.as_str(), "sk-test");
    }

    #[tokio::test]
    async fn unknown_path_is_secrets_unavailable() {
        let store = FakeSecretStore::new(&[]);
        let result = store.get("secret/infrastructure/unknown").await;
        assert!(matches!(result, Err(GatewayError::SecretsUnavailable)));
    }

    #[test]
    fn debug_never_prints_credential_content() {
        let cred = EphemeralCredential {
            api_key: Zeroizing::new("sk-super-secret".to_string()),
            fetched_at: Utc::now(),
        };
        let debug_str = format!("{cred:?}");
        assert!(!debug_str.contains("sk-super-secret"));
    }
}
