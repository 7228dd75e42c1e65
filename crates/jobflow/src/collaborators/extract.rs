use crate::graph::CollaboratorError;
use crate::model::posting::non_blank;
use crate::model::{JobPosting, JobSource, RawInput};

use super::JobExtractor;

/// Builds postings from the submitted fields.
///
/// Manual submissions always carry their own fields. URL and feed
/// submissions are only handled when the caller supplied title and company
/// alongside the URL; fetching and parsing a page is left to a real
/// extractor.
pub struct SourceExtractor;

impl SourceExtractor {
    fn from_fields(job_id: &str, raw_input: &RawInput, is_remote: Option<bool>) -> JobPosting {
        let location = non_blank(&raw_input.location).unwrap_or("Remote").to_string();
        let is_remote = is_remote.unwrap_or_else(|| location.to_lowercase().contains("remote"));

        JobPosting {
            id: job_id.to_string(),
            title: non_blank(&raw_input.title).unwrap_or_default().to_string(),
            company: non_blank(&raw_input.company).unwrap_or_default().to_string(),
            description: raw_input.description.clone().unwrap_or_default(),
            requirements: raw_input.requirements.clone(),
            location,
            url: non_blank(&raw_input.url).unwrap_or_default().to_string(),
            is_remote,
            salary_range: None,
            experience_level: None,
            job_type: None,
        }
    }
}

impl JobExtractor for SourceExtractor {
    fn extract(
        &self,
        job_id: &str,
        source: JobSource,
        raw_input: &RawInput,
    ) -> Result<JobPosting, CollaboratorError> {
        match source {
            JobSource::Manual => {
                if non_blank(&raw_input.title).is_none() {
                    return Err(CollaboratorError::MissingInput("title"));
                }
                if non_blank(&raw_input.company).is_none() {
                    return Err(CollaboratorError::MissingInput("company"));
                }
                Ok(Self::from_fields(job_id, raw_input, Some(true)))
            }
            JobSource::Url | JobSource::Linkedin => {
                if non_blank(&raw_input.url).is_none() {
                    return Err(CollaboratorError::MissingInput("url"));
                }
                if raw_input.has_posting_fields() {
                    log::debug!("Building posting for {} from submitted fields", job_id);
                    Ok(Self::from_fields(job_id, raw_input, None))
                } else {
                    Err(CollaboratorError::not_implemented("URL extraction"))
                }
            }
        }
    }
}
