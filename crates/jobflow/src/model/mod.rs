//! Domain types shared by the repository, the graphs and the orchestrator.

pub mod document;
pub mod posting;
pub mod record;

pub use document::{
    Certification, ContactInfo, Document, Education, Experience, Interests, Language, Project,
    Skill,
};
pub use posting::{JobPosting, RawInput};
pub use record::{
    preparation_status, retry_status, ApplicationOutcome, ApplicationResult, ApplicationType,
    JobMode, JobRecord, JobSource, JobStatus, UnknownVariant,
};
