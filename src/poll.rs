//! Bounded confirmation polling
//!
//! The kernel applies registration, stop, detach and writeback asynchronously,
//! so every post-condition is checked a fixed number of times at a fixed
//! interval. Polls stop early on success or cancellation.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How often, and how many times, to check a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, attempts: u32) -> Self {
        Self { interval, attempts }
    }
}

/// Result of a bounded poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition held on the given check (1-based)
    Satisfied { attempts: u32 },
    /// Every check failed
    Exhausted { attempts: u32 },
    /// Cancelled after the given number of checks
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    pub fn attempts(&self) -> u32 {
        match *self {
            Self::Satisfied { attempts }
            | Self::Exhausted { attempts }
            | Self::Cancelled { attempts } => attempts,
        }
    }
}

/// Check `condition` up to `policy.attempts` times, sleeping between checks
pub async fn poll_until<F, Fut>(
    policy: PollPolicy,
    cancel: &CancellationToken,
    mut condition: F,
) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 1..=policy.attempts {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled {
                attempts: attempt - 1,
            };
        }

        if condition().await {
            return PollOutcome::Satisfied { attempts: attempt };
        }

        if attempt < policy.attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return PollOutcome::Cancelled { attempts: attempt };
                }
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    PollOutcome::Exhausted {
        attempts: policy.attempts,
    }
}
