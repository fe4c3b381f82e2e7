use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const CHECK_TIMEOUT: Duration = Duration::from_millis(200);

fn remaining_key(project_id: &str) -> String {
    format!("budget:{project_id}:remaining")
}

fn usage_key(project_id: &str) -> String {
    format!("usage:{project_id}:total")
}

#[async_trait]
pub trait BudgetManager: Send + Sync {
    /// Returns true iff `remaining >= estimate`. Absence of the key is
    /// treated as `remaining = 0` (fail-closed). A timeout is treated as
    /// `false` rather than propagated — admission never blocks the caller
    /// indefinitely.
    async fn check(&self, project_id: &str, estimate: i64) -> bool;

    /// Atomically decrement `remaining` and increment `usage.total` by
    /// `actual_tokens`, issued as a single pipelined batch so a concurrent
    /// reader observes either both updates or neither.
    async fn record(&self, project_id: &str, actual_tokens: i64) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct RedisBudgetManager {
    redis: ConnectionManager,
}

impl RedisBudgetManager {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl BudgetManager for RedisBudgetManager {
    async fn check(&self, project_id: &str, estimate: i64) -> bool {
        let mut redis = self.redis.clone();
        let key = remaining_key(project_id);

        let read = redis.get::<_, Option<i64>>(&key);
        match tokio::time::timeout(CHECK_TIMEOUT, read).await {
            Ok(Ok(Some(remaining))) => remaining >= estimate,
            Ok(Ok(None)) => false,
            Ok(Err(e)) => {
                tracing::warn!("budget check KV read failed for project {}: {}", project_id, e);
                false
            }
            Err(_) => {
                tracing::warn!("budget check timed out for project {}", project_id);
                false
            }
        }
    }

    async fn record(&self, project_id: &str, actual_tokens: i64) -> anyhow::Result<()> {
        let mut redis = self.redis.clone();
        let _: () = redis::pipe()
            .atomic()
            .decr(remaining_key(project_id), actual_tokens)
            .incr(usage_key(project_id), actual_tokens)
            .query_async(&mut redis)
            .await?;
        Ok(())
    }
}

/// The admission token estimate: `ceil(bytes_of_json_serialized(messages) / 4)`.
/// Deliberately cheap and only ever used for admission, never for
/// accounting.
pub fn estimate_tokens(messages: &serde_json::Value) -> i64 {
    let bytes = serde_json::to_vec(messages).map(|v| v.len()).unwrap_or(0);
    (bytes as i64 + 3) / 4
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory KV store standing in for Redis in pipeline/accounting
    /// tests.
    pub struct FakeBudgetManager {
        remaining: Mutex<HashMap<String, i64>>,
        usage: Mutex<HashMap<String, i64>>,
    }

    impl FakeBudgetManager {
        pub fn new(seed_remaining: &[(&str, i64)]) -> Self {
            let remaining = seed_remaining
                .iter()
                .map(|(p, v)| (p.to_string(), *v))
                .collect();
            Self {
                remaining: Mutex::new(remaining),
                usage: Mutex::new(HashMap::new()),
            }
        }

        pub fn remaining_of(&self, project_id: &str) -> i64 {
            *self.remaining.lock().unwrap().get(project_id).unwrap_or(&0)
        }

        pub fn usage_of(&self, project_id: &str) -> i64 {
            *self.usage.lock().unwrap().get(project_id).unwrap_or(&0)
        }
    }

    #[async_trait]
    impl BudgetManager for FakeBudgetManager {
        async fn check(&self, project_id: &str, estimate: i64) -> bool {
            let remaining = self.remaining.lock().unwrap();
            remaining.get(project_id).copied().unwrap_or(0) >= estimate
        }

        async fn record(&self, project_id: &str, actual_tokens: i64) -> anyhow::Result<()> {
            *self
                .remaining
                .lock()
                .unwrap()
                .entry(project_id.to_string())
                .or_insert(0) -= actual_tokens;
            *self
                .usage
                .lock()
                .unwrap()
                .entry(project_id.to_string())
                .or_insert(0) += actual_tokens;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeBudgetManager;
    use super::*;
    use serde_json::json;

    #[test]
    fn estimate_rounds_up() {
        // "a" serialized as `["a"]` is 5 bytes -> ceil(5/4) = 2
        let messages = json!(["a"]);
        assert_eq!(estimate_tokens(&messages), 2);
    }

    #[test]
    fn estimate_of_empty_array_is_zero() {
        let messages = json!([]);
        assert_eq!(estimate_tokens(&messages), 0);
    }

    #[tokio::test]
    async fn absent_budget_is_fail_closed() {
        let budget = FakeBudgetManager::new(&[]);
        assert!(!budget.check("proj_unknown", 1).await);
    }

    #[tokio::test]
    async fn remaining_equal_to_estimate_is_admitted() {
        let budget = FakeBudgetManager::new(&[("proj_A", 1000)]);
        assert!(budget.check("proj_A", 1000).await);
    }

    #[tokio::test]
    async fn remaining_one_below_estimate_is_rejected() {
        let budget = FakeBudgetManager::new(&[("proj_A", 999)]);
        assert!(!budget.check("proj_A", 1000).await);
    }

    #[tokio::test]
    async fn record_decrements_remaining_and_increments_usage() {
        let budget = FakeBudgetManager::new(&[("proj_A", 1000)]);
        budget.record("proj_A", 12).await.unwrap();
        assert_eq!(budget.remaining_of("proj_A"), 988);
        assert_eq!(budget.usage_of("proj_A"), 12);
    }
}
