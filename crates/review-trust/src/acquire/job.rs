//! Acquisition job lifecycle.
//!
//! `Queued → Running → {Ok, Failed}`. `Queued → Failed` is allowed for jobs
//! rejected before any work (disabled, unresolvable target).

use crate::error::{TrustError, TrustResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Running,
    Ok,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Ok | JobState::Failed)
    }

    fn can_move_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Running)
                | (JobState::Queued, JobState::Failed)
                | (JobState::Running, JobState::Ok)
                | (JobState::Running, JobState::Failed)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Queued => "QUEUED",
            JobState::Running => "RUNNING",
            JobState::Ok => "OK",
            JobState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Terminal failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Disabled,
    NotFound,
    EmptyOrCaptcha,
    NoReviews,
    /// Unexpected fetch failure; the cause is in the job message.
    ScrapeFailed,
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Disabled => "DISABLED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::EmptyOrCaptcha => "EMPTY_OR_CAPTCHA",
            ErrorCode::NoReviews => "NO_REVIEWS",
            ErrorCode::ScrapeFailed => "SCRAPE_FAILED",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }
}

/// Mutable job record, reported to the listener on every change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionJob {
    pub id: Uuid,
    pub target_id: String,
    pub asin: Option<String>,
    pub state: JobState,
    pub target_count: usize,
    pub collected_count: usize,
    pub upserted_count: usize,
    pub fallback_used: bool,
    pub error_code: Option<ErrorCode>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AcquisitionJob {
    pub fn new(target_id: impl Into<String>, target_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id: target_id.into(),
            asin: None,
            state: JobState::Queued,
            target_count,
            collected_count: 0,
            upserted_count: 0,
            fallback_used: false,
            error_code: None,
            message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to `next`, rejecting edges outside the lifecycle graph.
    pub fn transition(&mut self, next: JobState) -> TrustResult<()> {
        if !self.state.can_move_to(next) {
            return Err(TrustError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        let now = Utc::now();
        match next {
            JobState::Running => self.started_at = Some(now),
            JobState::Ok | JobState::Failed => self.finished_at = Some(now),
            JobState::Queued => {}
        }
        self.state = next;
        Ok(())
    }

    pub fn succeed(&mut self, message: impl Into<String>) -> TrustResult<()> {
        self.transition(JobState::Ok)?;
        self.error_code = None;
        self.message = Some(message.into());
        Ok(())
    }

    pub fn fail(&mut self, code: ErrorCode, message: impl Into<String>) -> TrustResult<()> {
        self.transition(JobState::Failed)?;
        self.error_code = Some(code);
        self.message = Some(message.into());
        Ok(())
    }
}

/// Terminal view of a job returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub state: JobState,
    pub success: bool,
    pub partial: bool,
    pub fallback_used: bool,
    pub collected_count: usize,
    pub upserted_count: usize,
    pub error_code: Option<ErrorCode>,
    pub message: Option<String>,
    pub asin: Option<String>,
}

impl JobResult {
    pub fn from_job(job: &AcquisitionJob, partial: bool) -> Self {
        Self {
            job_id: job.id,
            state: job.state,
            success: job.state == JobState::Ok,
            partial,
            fallback_used: job.fallback_used,
            collected_count: job.collected_count,
            upserted_count: job.upserted_count,
            error_code: job.error_code,
            message: job.message.clone(),
            asin: job.asin.clone(),
        }
    }
}
