//! The post → run → read exchange against one session.
//!
//! Every remote call is guarded on its own. A transient `run_status` error is
//! retried against the same run, and only a run that ended in a
//! non-completed terminal status is replaced by a fresh one.

use std::time::Duration;

use quill_services::SessionService;
use quill_types::{QuillError, Reply, Result, RunOutcome, RunStatus, SessionId};
use tokio::time::Instant;

use crate::retry::{RetryPolicy, Sleeper};

/// One session, the policy guarding its calls, and the budget of each run.
pub struct SessionCall<'a> {
    service: &'a dyn SessionService,
    session: &'a SessionId,
    policy: &'a RetryPolicy,
    sleeper: &'a dyn Sleeper,
    budget: Duration,
}

impl<'a> SessionCall<'a> {
    pub fn new(
        service: &'a dyn SessionService,
        session: &'a SessionId,
        policy: &'a RetryPolicy,
        sleeper: &'a dyn Sleeper,
        budget: Duration,
    ) -> Self {
        Self {
            service,
            session,
            policy,
            sleeper,
            budget,
        }
    }

    /// Post `prompt`, wait for a completed run, and read the latest reply.
    ///
    /// `Ok(None)` when any step gave up under a lenient policy or the
    /// session holds no reply.
    pub async fn ask(&self, label: &str, prompt: &str) -> Result<Option<Reply>> {
        let service = self.service;
        let session = self.session;

        let posted = self
            .policy
            .execute(label, self.sleeper, move || service.post_message(session, prompt))
            .await?;
        if posted.is_none() {
            return Ok(None);
        }

        if self.await_completed(label).await?.is_none() {
            return Ok(None);
        }

        let reply = self
            .policy
            .execute(label, self.sleeper, move || service.latest_reply(session))
            .await?;
        Ok(reply.flatten())
    }

    /// Start runs until one completes. A run ending in any other terminal
    /// status counts as one failed attempt of the policy.
    pub async fn await_completed(&self, label: &str) -> Result<Option<RunOutcome>> {
        let outcome = self
            .policy
            .execute(label, self.sleeper, move || async move {
                match self.run_once(label).await? {
                    Some(outcome) if outcome.status != RunStatus::Completed => {
                        Err(QuillError::RunFailed {
                            status: outcome.status.as_str().to_string(),
                        })
                    }
                    other => Ok(other),
                }
            })
            .await?;
        Ok(outcome.flatten())
    }

    /// Start one run and poll it to a terminal status.
    ///
    /// The budget is fixed when the run starts; retried status checks spend
    /// from it. Retries exhausted on either call propagate unchanged.
    async fn run_once(&self, label: &str) -> Result<Option<RunOutcome>> {
        let service = self.service;
        let session = self.session;

        let Some(run_id) = self
            .policy
            .execute(label, self.sleeper, move || service.start_run(session))
            .await?
        else {
            return Ok(None);
        };
        let deadline = Instant::now() + self.budget;

        loop {
            let run = &run_id;
            let Some(status) = self
                .policy
                .execute(label, self.sleeper, move || service.run_status(session, run))
                .await?
            else {
                return Ok(None);
            };
            if status.is_terminal() {
                return Ok(Some(RunOutcome {
                    run_id: run_id.clone(),
                    status,
                }));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(QuillError::TimeoutExceeded {
                    budget_ms: self.budget.as_millis() as u64,
                });
            }
            tracing::debug!(
                session = %session,
                run = %run_id,
                status = status.as_str(),
                "Run still pending"
            );
            tokio::time::sleep(service.poll_interval().min(deadline - now)).await;
        }
    }
}
