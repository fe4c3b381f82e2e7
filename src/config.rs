use std::env;

use anyhow::{bail, Context};

/// Provider ids that are forbidden to have a static API key in the process
/// environment — credentials must only ever be fetched just-in-time from the
/// secret store.
const KNOWN_PROVIDER_ENV_PREFIXES: &[&str] = &["OPENAI", "ANTHROPIC"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Shared bearer secret every caller must present.
    pub gateway_bearer_token: String,
    /// Shared KV store connection string (budget + usage counters).
    pub redis_url: String,
    /// Secret store (Vault) address, e.g. "https://vault.internal:8200".
    pub vault_addr: String,
    pub vault_role_id: String,
    pub vault_secret_id: String,
    pub listen_addr: String,
    /// Maximum upstream attempts for a single request (including the first).
    pub retry_max_attempts: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        reject_forbidden_env_vars()?;

        Ok(Self {
            gateway_bearer_token: env::var("GATEWAY_BEARER_TOKEN")
                .context("GATEWAY_BEARER_TOKEN is required")?,
            redis_url: env::var("REDIS_URL").context("REDIS_URL is required")?,
            vault_addr: env::var("VAULT_ADDR").context("VAULT_ADDR is required")?,
            vault_role_id: env::var("VAULT_ROLE_ID").context("VAULT_ROLE_ID is required")?,
            vault_secret_id: env::var("VAULT_SECRET_ID")
                .context("VAULT_SECRET_ID is required")?,
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            retry_max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
        })
    }
}

/// Enforce the no-static-secrets invariant: any `*_API_KEY` env var for a
/// known provider is a fatal startup error, since credentials must come
/// exclusively from the secret store at request time.
fn reject_forbidden_env_vars() -> anyhow::Result<()> {
    for prefix in KNOWN_PROVIDER_ENV_PREFIXES {
        let name = format!("{prefix}_API_KEY");
        if env::var_os(&name).is_some() {
            bail!(
                "forbidden environment variable {name} is set; provider credentials must only \
                 come from the secret store"
            );
        }
    }
    Ok(())
}
