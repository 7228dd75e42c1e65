//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use chrono::{Duration, Utc};

use jobflow::config::schema::{Config, RepositoryBackend};
use jobflow::model::{
    ApplicationType, ContactInfo, Document, Experience, JobMode, JobPosting, JobRecord, JobSource,
    JobStatus, RawInput, Skill,
};
use jobflow::Submission;

/// Builder for creating `Config` instances.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Memory backend, one worker, everything else at its default.
    pub fn new() -> Self {
        let mut config = Config::default();
        config.repository.backend = RepositoryBackend::Memory;
        config.worker_count = 1;
        Self { config }
    }

    pub fn sqlite(mut self, path: &str) -> Self {
        self.config.repository.backend = RepositoryBackend::Sqlite;
        self.config.repository.path = Some(path.to_string());
        self
    }

    pub fn output_directory(mut self, path: &str) -> Self {
        self.config.output_directory = path.to_string();
        self
    }

    pub fn profile_path(mut self, path: &str) -> Self {
        self.config.profile_path = path.to_string();
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    pub fn require_remote(mut self, require: bool) -> Self {
        self.config.filter.require_remote = require;
        self
    }

    pub fn excluded_keywords(mut self, keywords: &[&str]) -> Self {
        self.config.filter.excluded_keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn default_application_type(mut self, application_type: ApplicationType) -> Self {
        self.config.application.default_type = application_type;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for stored `JobRecord`s with controlled timestamps.
pub struct RecordBuilder {
    record: JobRecord,
}

impl RecordBuilder {
    pub fn new(job_id: &str) -> Self {
        Self {
            record: JobRecord::new(job_id, JobSource::Manual, JobMode::Full),
        }
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.record.status = status;
        self
    }

    pub fn source(mut self, source: JobSource) -> Self {
        self.record.source = source;
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.record.retry_count = count;
        self
    }

    pub fn application_url(mut self, url: &str) -> Self {
        self.record.application_url = Some(url.to_string());
        self
    }

    /// Backdates both timestamps.
    pub fn age_days(mut self, days: i64) -> Self {
        let at = Utc::now() - Duration::days(days);
        self.record.created_at = at;
        self.record.updated_at = at;
        self
    }

    /// Backdates both timestamps by minutes, for ordering tests.
    pub fn age_minutes(mut self, minutes: i64) -> Self {
        let at = Utc::now() - Duration::minutes(minutes);
        self.record.created_at = at;
        self.record.updated_at = at;
        self
    }

    /// Fills the fields a `pending` record carries.
    pub fn prepared(mut self) -> Self {
        let posting = posting("Engineer", "Acme", "Remote");
        self.record.raw_input = Some(RawInput::manual("Engineer", "Acme", "Build Rust services"));
        self.record.job_posting = Some(posting);
        self.record.generated_document = Some(profile());
        self.record.rendered_file_path = Some("/tmp/Ada_Lovelace_Acme_Engineer.json".to_string());
        self
    }

    pub fn build(self) -> JobRecord {
        self.record
    }
}

pub fn posting(title: &str, company: &str, location: &str) -> JobPosting {
    JobPosting {
        id: "posting-1".to_string(),
        title: title.to_string(),
        company: company.to_string(),
        description: "Build Rust services".to_string(),
        requirements: Some("Rust, SQL".to_string()),
        location: location.to_string(),
        url: "https://jobs.example.com/acme/engineer".to_string(),
        is_remote: location.eq_ignore_ascii_case("remote"),
        salary_range: None,
        experience_level: Some("senior".to_string()),
        job_type: Some("full-time".to_string()),
    }
}

pub fn profile() -> Document {
    Document {
        contact: ContactInfo {
            full_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            ..ContactInfo::default()
        },
        summary: "Engineer who likes analytical engines.".to_string(),
        experiences: vec![Experience {
            company: "Babbage & Co".to_string(),
            position: "Programmer".to_string(),
            start_date: "1842-01".to_string(),
            end_date: None,
            is_current: true,
            location: None,
            description: "Wrote the first published algorithm.".to_string(),
            achievements: vec![],
            technologies: vec!["Rust".to_string()],
        }],
        skills: vec![Skill {
            name: "Rust".to_string(),
            category: "language".to_string(),
            proficiency: None,
        }],
        ..Document::default()
    }
}

pub fn manual_submission(mode: JobMode) -> Submission {
    Submission::new(
        JobSource::Manual,
        mode,
        RawInput::manual("Engineer", "Acme", "Build Rust services"),
    )
}

/// A URL submission that carries fallback fields, so extraction succeeds offline.
pub fn url_submission(url: &str, mode: JobMode) -> Submission {
    Submission::new(
        JobSource::Url,
        mode,
        RawInput {
            url: Some(url.to_string()),
            ..RawInput::manual("Engineer", "Acme", "Build Rust services")
        },
    )
}
