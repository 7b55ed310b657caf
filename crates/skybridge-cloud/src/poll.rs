//! Bounded polling of asynchronous remote state
//!
//! A [`PendingOperation`] lives for the duration of one lifecycle call: it
//! names the remote resource being watched, the statuses that end the wait,
//! a deadline, and the sleep schedule between status checks. Sleeps go
//! through `tokio::time`, so tests drive the clock with `start_paused`.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::error::{CloudError, Result};

/// Sleep schedule and deadline for a poll loop
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the second status check
    pub interval: Duration,

    /// Upper bound for the delay between checks
    pub max_interval: Duration,

    /// Multiplier applied to the delay after every check (1.0 = fixed)
    pub backoff: f64,

    /// Hard deadline for the whole wait
    pub timeout: Duration,
}

impl PollPolicy {
    /// Fixed interval polling
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            backoff: 1.0,
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay after the given zero-based check
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff.max(1.0).powi(attempt as i32);
        let delay = self.interval.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_interval.as_secs_f64()))
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(10),
            backoff: 1.5,
            timeout: Duration::from_secs(300),
        }
    }
}

/// `start + timeout`, saturating at roughly thirty years out
pub(crate) fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 3600);
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// What a single status check saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Status(String),
    Absent,
}

#[derive(Debug, Clone)]
enum Target {
    Status(Vec<String>),
    Absent,
}

/// In-flight wait on a remote resource
#[derive(Debug, Clone)]
pub struct PendingOperation {
    resource: String,
    target: Target,
    failure: Vec<String>,
    deadline: Instant,
    policy: PollPolicy,
}

impl PendingOperation {
    /// Wait until the resource reports one of `accept`
    pub fn until_status(resource: impl Into<String>, accept: &[&str], policy: PollPolicy) -> Self {
        Self {
            resource: resource.into(),
            target: Target::Status(accept.iter().map(|s| s.to_string()).collect()),
            failure: Vec::new(),
            deadline: deadline_after(Instant::now(), policy.timeout),
            policy,
        }
    }

    /// Wait until the resource disappears
    pub fn until_absent(resource: impl Into<String>, policy: PollPolicy) -> Self {
        Self {
            resource: resource.into(),
            target: Target::Absent,
            failure: Vec::new(),
            deadline: deadline_after(Instant::now(), policy.timeout),
            policy,
        }
    }

    /// Statuses that end the wait with a hard failure
    pub fn failing_on(mut self, states: &[&str]) -> Self {
        self.failure = states.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Follow-up wait on the same resource that keeps this deadline
    pub fn then_status(&self, accept: &[&str]) -> Self {
        Self {
            resource: self.resource.clone(),
            target: Target::Status(accept.iter().map(|s| s.to_string()).collect()),
            failure: self.failure.clone(),
            deadline: self.deadline,
            policy: self.policy.clone(),
        }
    }

    fn expected(&self) -> String {
        match &self.target {
            Target::Status(accept) => accept.join("|"),
            Target::Absent => "absent".to_string(),
        }
    }

    /// Run `observe` until a terminal observation or the deadline
    ///
    /// Errors returned by `observe` end the wait immediately.
    pub async fn wait<F, Fut>(&self, mut observe: F) -> Result<Observation>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation>>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            let observation = observe().await?;

            match (&self.target, &observation) {
                (Target::Absent, Observation::Absent) => return Ok(observation),
                (Target::Status(_), Observation::Absent) => {
                    return Err(CloudError::not_found("resource", self.resource.clone()));
                }
                (Target::Status(accept), Observation::Status(status))
                    if contains_status(accept, status) =>
                {
                    tracing::debug!("{} reached {}", self.resource, status);
                    return Ok(observation);
                }
                (_, Observation::Status(status)) if contains_status(&self.failure, status) => {
                    return Err(CloudError::invalid_state(
                        self.resource.clone(),
                        status.clone(),
                        self.expected(),
                    ));
                }
                (_, Observation::Status(status)) => {
                    tracing::debug!(
                        "{} is {} (waiting for {}, attempt {})",
                        self.resource,
                        status,
                        self.expected(),
                        attempt + 1
                    );
                }
            }

            let now = Instant::now();
            if now >= self.deadline {
                return Err(CloudError::Timeout {
                    operation: format!("{} to become {}", self.resource, self.expected()),
                    waited_secs: now.duration_since(started).as_secs(),
                });
            }

            let delay = self
                .policy
                .delay_for_attempt(attempt)
                .min(self.deadline - now);
            sleep(delay).await;
            attempt += 1;
        }
    }
}

fn contains_status(set: &[String], status: &str) -> bool {
    set.iter().any(|s| s.eq_ignore_ascii_case(status))
}
