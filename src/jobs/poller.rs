//! Fixed-interval polling of remote job status

use crate::core::config::Config;
use crate::core::provider::BedrockError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::info;

/// Status object returned by a job-status API
pub trait JobStatus {
    /// No further transitions will happen
    fn is_terminal(&self) -> bool;

    /// Human-readable status for logging
    fn label(&self) -> String;
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error(transparent)]
    Fetch(#[from] BedrockError),

    #[error("Gave up after {waited:?}; last status was {last_status}")]
    TimedOut { waited: Duration, last_status: String },
}

/// Polls at a fixed interval, optionally giving up after `max_wait`
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    pub interval: Duration,
    pub max_wait: Option<Duration>,
}

impl Poller {
    pub fn new(interval: Duration, max_wait: Option<Duration>) -> Self {
        Self { interval, max_wait }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_secs(config.poll_interval_secs),
            config.poll_max_wait_secs.map(Duration::from_secs),
        )
    }

    /// Fetch until the status is terminal and return the final object
    ///
    /// Status changes are logged at info level; `what` names the job in
    /// those messages.
    pub async fn poll_until<T, F, Fut>(&self, what: &str, mut fetch: F) -> Result<T, PollError>
    where
        T: JobStatus,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BedrockError>>,
    {
        let started = Instant::now();
        let mut last_label: Option<String> = None;

        loop {
            let current = fetch().await?;
            let label = current.label();
            if last_label.as_deref() != Some(label.as_str()) {
                info!("{} status: {}", what, label);
            }

            if current.is_terminal() {
                return Ok(current);
            }

            let waited = started.elapsed();
            if let Some(max_wait) = self.max_wait {
                if waited >= max_wait {
                    return Err(PollError::TimedOut {
                        waited,
                        last_status: label,
                    });
                }
            }

            last_label = Some(label);
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Step(&'static str);

    impl JobStatus for Step {
        fn is_terminal(&self) -> bool {
            self.0 == "Completed"
        }

        fn label(&self) -> String {
            self.0.to_string()
        }
    }

    #[tokio::test]
    async fn test_polls_until_terminal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::new(Duration::from_millis(1), None);

        let counter = calls.clone();
        let result = poller
            .poll_until("job", || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(Step(if n < 2 { "InProgress" } else { "Completed" })) }
            })
            .await
            .unwrap();

        assert_eq!(result.0, "Completed");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_times_out() {
        let poller = Poller::new(Duration::from_millis(5), Some(Duration::from_millis(20)));
        let result = poller
            .poll_until("job", || async { Ok(Step("InProgress")) })
            .await;

        match result {
            Err(PollError::TimedOut { last_status, .. }) => assert_eq!(last_status, "InProgress"),
            other => panic!("expected timeout, got {:?}", other.map(|s| s.0)),
        }
    }

    #[tokio::test]
    async fn test_fetch_error_stops_polling() {
        let poller = Poller::new(Duration::from_millis(1), None);
        let result: Result<Step, _> = poller
            .poll_until("job", || async { Err(BedrockError::NotFound("gone".to_string())) })
            .await;
        assert!(matches!(result, Err(PollError::Fetch(BedrockError::NotFound(_)))));
    }
}
