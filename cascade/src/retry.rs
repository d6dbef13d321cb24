//! Retry Controller
//!
//! Re-issues an oracle call, verbatim, while it keeps answering with nothing:
//!
//! ```text
//! attempt 1 ── non-empty ──► Matched { attempts: 1 }
//!     │ empty
//! attempt 2 ── non-empty ──► Matched { attempts: 2 }
//!     │ empty
//!     └──────────────────────► Exhausted { attempts: 2 }
//! ```
//!
//! Retries are immediate: no backoff, no jitter. Errors are returned on the
//! spot; only empty answers are retried.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::node::Node;

/// Default number of oracle calls per tier.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Result of running the oracle under a retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The oracle returned at least one node.
    Matched { nodes: Vec<Node>, attempts: u32 },
    /// Every attempt came back empty.
    Exhausted { attempts: u32 },
}

impl RetryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Matched { attempts, .. } | Self::Exhausted { attempts } => *attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum oracle calls for one tier of one request.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be >= 1".to_string());
        }
        Ok(())
    }

    /// Call `attempt` until it yields a non-empty list or the budget is spent.
    pub async fn run<F, Fut, E>(&self, mut attempt: F) -> Result<RetryOutcome, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Vec<Node>, E>>,
    {
        let max = self.max_attempts.max(1);
        for n in 1..=max {
            let nodes = attempt(n).await?;
            if !nodes.is_empty() {
                return Ok(RetryOutcome::Matched { nodes, attempts: n });
            }
            tracing::debug!(attempt = n, max_attempts = max, "oracle returned no match");
        }
        Ok(RetryOutcome::Exhausted { attempts: max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn stops_at_first_non_empty_answer() {
        let calls = AtomicU32::new(0);
        let outcome = RetryPolicy::default()
            .run(|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok::<_, String>(if n == 0 {
                        vec![]
                    } else {
                        vec![Node::new("01")]
                    })
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            outcome,
            RetryOutcome::Matched {
                nodes: vec![Node::new("01")],
                attempts: 2
            }
        );
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let outcome = RetryPolicy::new(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<Vec<Node>, String>(vec![]) }
            })
            .await
            .unwrap();

        assert_eq!(outcome, RetryOutcome::Exhausted { attempts: 3 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<Vec<Node>, _>("connection reset".to_string()) }
            })
            .await;

        assert_eq!(result, Err("connection reset".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_attempts_rejected() {
        assert!(RetryPolicy::new(0).validate().is_err());
        assert!(RetryPolicy::default().validate().is_ok());
    }
}
