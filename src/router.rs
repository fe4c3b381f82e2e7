use std::borrow::Cow;

/// Routing information for a provider, resolved fresh per call so a base
/// URL override (tests pointing at a mock server) never has to live past
/// the request that used it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub provider_id: &'static str,
    pub secret_path: &'static str,
    pub base_url: Cow<'static, str>,
}

/// Per-provider base URL overrides. Empty in production; tests set one to
/// redirect a provider's traffic at a mock server without touching the
/// compiled-in registry.
#[derive(Debug, Clone, Default)]
pub struct BaseUrlOverrides {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
}

fn base_url(default: &'static str, override_url: &Option<String>) -> Cow<'static, str> {
    match override_url {
        Some(url) => Cow::Owned(url.clone()),
        None => Cow::Borrowed(default),
    }
}

/// `(prefix, descriptor)` entries, sorted longer-prefix-first then
/// lexicographically so a future catch-all prefix can never shadow a more
/// specific one.
fn registry(overrides: &BaseUrlOverrides) -> Vec<(&'static str, ProviderDescriptor)> {
    let openai = ProviderDescriptor {
        provider_id: "openai",
        secret_path: "secret/infrastructure/openai",
        base_url: base_url("https://api.openai.com/v1", &overrides.openai),
    };
    let anthropic = ProviderDescriptor {
        provider_id: "anthropic",
        secret_path: "secret/infrastructure/anthropic",
        base_url: base_url("https://api.anthropic.com/v1", &overrides.anthropic),
    };

    let mut entries = vec![
        ("gpt-", openai.clone()),
        ("o1-", openai),
        ("claude-", anthropic),
    ];
    entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
    entries
}

/// Resolve a user-facing model id to its provider descriptor. Returns
/// `None` if no registered prefix matches — the caller maps this to
/// `ModelUnknown`.
pub fn resolve(model: &str, overrides: &BaseUrlOverrides) -> Option<ProviderDescriptor> {
    registry(overrides)
        .into_iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, descriptor)| descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_gpt_prefix_to_openai() {
        let d = resolve("gpt-4o", &BaseUrlOverrides::default()).unwrap();
        assert_eq!(d.provider_id, "openai");
    }

    #[test]
    fn routes_o1_prefix_to_openai_not_shadowed_by_catch_all() {
        let d = resolve("o1-preview", &BaseUrlOverrides::default()).unwrap();
        assert_eq!(d.provider_id, "openai");
    }

    #[test]
    fn routes_claude_prefix_to_anthropic() {
        let d = resolve("claude-3-5-sonnet", &BaseUrlOverrides::default()).unwrap();
        assert_eq!(d.provider_id, "anthropic");
    }

    #[test]
    fn unknown_model_has_no_route() {
        assert!(resolve("foo-7", &BaseUrlOverrides::default()).is_none());
    }

    #[test]
    fn longer_prefix_wins_over_shorter_one() {
        let entries = registry(&BaseUrlOverrides::default());
        for i in 1..entries.len() {
            assert!(entries[i - 1].0.len() >= entries[i].0.len());
        }
    }

    #[test]
    fn override_replaces_compiled_in_base_url() {
        let overrides = BaseUrlOverrides {
            openai: Some("http://127.0.0.1:9999".to_string()),
            anthropic: None,
        };
        let d = resolve("gpt-4o", &overrides).unwrap();
        assert_eq!(d.base_url, "http://127.0.0.1:9999");

        let d = resolve("claude-3-5-sonnet", &overrides).unwrap();
        assert_eq!(d.base_url, "https://api.anthropic.com/v1");
    }
}
