//! The job record and its closed enumerations.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::Document;
use super::posting::{JobPosting, RawInput};

/// Returned when a stored string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// How the job posting was obtained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    Url,
    Manual,
    /// Feed-style source; postings from it pass through the suitability filter.
    Linkedin,
}

string_enum!(JobSource, "job source", {
    Url => "url",
    Manual => "manual",
    Linkedin => "linkedin",
});

/// `Mvp` skips human review, `Full` stops at the review checkpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    Mvp,
    Full,
}

string_enum!(JobMode, "job mode", {
    Mvp => "mvp",
    Full => "full",
});

/// Lifecycle status of a job.
///
/// Transient variants are only ever visible in run snapshots; a record at
/// rest always carries one of the terminal variants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Extracting,
    Filtering,
    Composing,
    Rendering,
    Approved,
    Applying,
    Completed,
    Pending,
    Declined,
    Applied,
    ManualRequired,
    Failed,
}

string_enum!(JobStatus, "job status", {
    Queued => "queued",
    Extracting => "extracting",
    Filtering => "filtering",
    Composing => "composing",
    Rendering => "rendering",
    Approved => "approved",
    Applying => "applying",
    Completed => "completed",
    Pending => "pending",
    Declined => "declined",
    Applied => "applied",
    ManualRequired => "manual_required",
    Failed => "failed",
});

impl JobStatus {
    /// Statuses with no further automated transition.
    pub const TERMINAL: [JobStatus; 6] = [
        JobStatus::Completed,
        JobStatus::Pending,
        JobStatus::Declined,
        JobStatus::Applied,
        JobStatus::ManualRequired,
        JobStatus::Failed,
    ];

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }
}

/// Which apply integration handles an approved job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    /// Automated browser agent filling generic application forms.
    DeepAgent,
    /// Platform-specific quick apply.
    Linkedin,
    #[default]
    Manual,
}

string_enum!(ApplicationType, "application type", {
    DeepAgent => "deep_agent",
    Linkedin => "linkedin",
    Manual => "manual",
});

/// Outcome of one apply attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationOutcome {
    Success,
    ManualRequired,
    Failed,
}

impl ApplicationOutcome {
    /// Status a record takes once the application phase has produced this outcome.
    pub fn final_status(&self) -> JobStatus {
        match self {
            ApplicationOutcome::Success => JobStatus::Applied,
            ApplicationOutcome::ManualRequired => JobStatus::ManualRequired,
            ApplicationOutcome::Failed => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationResult {
    pub outcome: ApplicationOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_url: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

/// The durable record of one job-application attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub job_id: String,
    pub source: JobSource,
    pub mode: JobMode,
    pub status: JobStatus,
    pub job_posting: Option<JobPosting>,
    pub raw_input: Option<RawInput>,
    pub generated_document: Option<Document>,
    pub rendered_file_path: Option<String>,
    pub application_url: Option<String>,
    pub application_type: Option<ApplicationType>,
    pub application_result: Option<ApplicationResult>,
    pub user_feedback: Option<String>,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// A bare record in the `queued` state, stamped with the current time.
    pub fn new(job_id: impl Into<String>, source: JobSource, mode: JobMode) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            source,
            mode,
            status: JobStatus::Queued,
            job_posting: None,
            raw_input: None,
            generated_document: None,
            rendered_file_path: None,
            application_url: None,
            application_type: None,
            application_result: None,
            user_feedback: None,
            retry_count: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
            applied_at: None,
        }
    }
}

/// Preparation-phase status mapping: failure wins, then the mode decides
/// whether the job waits for review.
pub fn preparation_status(mode: JobMode, failed: bool) -> JobStatus {
    match (failed, mode) {
        (true, _) => JobStatus::Failed,
        (false, JobMode::Mvp) => JobStatus::Completed,
        (false, JobMode::Full) => JobStatus::Pending,
    }
}

/// Retry-phase status mapping: a retry always returns to the review queue.
pub fn retry_status(rendered: bool) -> JobStatus {
    if rendered {
        JobStatus::Pending
    } else {
        JobStatus::Failed
    }
}
