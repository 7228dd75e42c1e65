use crate::graph::CollaboratorError;
use crate::model::{ApplicationOutcome, ApplicationResult};

use super::{ApplicationRequest, ApplyStrategy};

/// Hands the application back to the user. Never fails.
pub struct ManualApply;

impl ApplyStrategy for ManualApply {
    fn apply(&self, request: &ApplicationRequest) -> Result<ApplicationResult, CollaboratorError> {
        log::info!(
            "Job {} marked for manual application",
            request.job_id
        );
        Ok(ApplicationResult {
            outcome: ApplicationOutcome::ManualRequired,
            application_url: request.application_url.clone(),
            message: "Please apply manually using the application URL.".to_string(),
            submitted_at: None,
        })
    }
}

/// Placeholder for an integration that does not exist yet.
pub struct UnavailableApply {
    feature: String,
}

impl UnavailableApply {
    pub fn new(feature: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
        }
    }
}

impl ApplyStrategy for UnavailableApply {
    fn apply(&self, _request: &ApplicationRequest) -> Result<ApplicationResult, CollaboratorError> {
        Err(CollaboratorError::not_implemented(self.feature.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_apply_carries_url() {
        let request = ApplicationRequest {
            job_id: "job-1".into(),
            application_url: Some("https://jobs.example.com/apply".into()),
            ..ApplicationRequest::default()
        };
        let result = ManualApply.apply(&request).unwrap();
        assert_eq!(result.outcome, ApplicationOutcome::ManualRequired);
        assert_eq!(
            result.application_url.as_deref(),
            Some("https://jobs.example.com/apply")
        );
        assert!(result.submitted_at.is_none());
    }

    #[test]
    fn test_unavailable_apply_names_feature() {
        let err = UnavailableApply::new("LinkedIn Easy Apply automation")
            .apply(&ApplicationRequest::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "LinkedIn Easy Apply automation is not implemented"
        );
    }
}
