use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::budget::BudgetManager;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(100);

struct AccountingJob {
    project_id: String,
    actual_tokens: i64,
}

#[derive(Clone)]
pub struct AccountingManager {
    sender: mpsc::Sender<AccountingJob>,
}

impl AccountingManager {
    /// Spawn `worker_count` background consumers reading from a queue of
    /// `queue_capacity` pending jobs.
    pub fn spawn(
        budget: Arc<dyn BudgetManager>,
        worker_count: usize,
        queue_capacity: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        for worker_id in 0..worker_count.max(1) {
            let receiver = receiver.clone();
            let budget = budget.clone();
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut receiver = receiver.lock().await;
                        receiver.recv().await
                    };
                    match job {
                        Some(job) => Self::process(&budget, job).await,
                        None => {
                            tracing::debug!("accounting worker {} shutting down", worker_id);
                            break;
                        }
                    }
                }
            });
        }

        Self { sender }
    }

    /// Fire-and-forget: schedule a usage record. Never blocks and never
    /// surfaces a failure to the caller.
    pub fn schedule(&self, project_id: String, actual_tokens: i64) {
        let job = AccountingJob {
            project_id,
            actual_tokens,
        };
        if self.sender.try_send(job).is_err() {
            tracing::warn!("accounting queue full; dropping usage update (best effort)");
        }
    }

    async fn process(budget: &dyn BudgetManager, job: AccountingJob) {
        for attempt in 1..=RETRY_ATTEMPTS {
            match budget.record(&job.project_id, job.actual_tokens).await {
                Ok(()) => return,
                Err(e) if attempt < RETRY_ATTEMPTS => {
                    tracing::warn!(
                        "accounting record attempt {} failed for project {}: {}",
                        attempt,
                        job.project_id,
                        e
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => {
                    tracing::warn!(
                        "accounting record dropped for project {} after {} attempts: {}",
                        job.project_id,
                        RETRY_ATTEMPTS,
                        e
                    );
                }
            }
        }
    }
}
