use crate::graph::CollaboratorError;
use crate::model::JobPosting;

use super::{Suitability, SuitabilityFilter};

/// Accepts every posting.
pub struct AcceptAll;

impl SuitabilityFilter for AcceptAll {
    fn evaluate(&self, _posting: &JobPosting) -> Result<Suitability, CollaboratorError> {
        Ok(Suitability::Suitable)
    }
}

/// Rejects non-remote postings (when required) and postings that mention
/// any excluded keyword. Matching is case-insensitive.
pub struct KeywordFilter {
    require_remote: bool,
    excluded_keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new(require_remote: bool, excluded_keywords: &[String]) -> Self {
        Self {
            require_remote,
            excluded_keywords: excluded_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl SuitabilityFilter for KeywordFilter {
    fn evaluate(&self, posting: &JobPosting) -> Result<Suitability, CollaboratorError> {
        if self.require_remote && !posting.is_remote {
            return Ok(Suitability::Unsuitable {
                reason: format!("{} at {} is not remote", posting.title, posting.company),
            });
        }

        let text = format!(
            "{}\n{}\n{}\n{}",
            posting.title,
            posting.company,
            posting.description,
            posting.requirements.as_deref().unwrap_or_default()
        )
        .to_lowercase();

        match self.excluded_keywords.iter().find(|k| text.contains(k.as_str())) {
            Some(keyword) => Ok(Suitability::Unsuitable {
                reason: format!("Posting mentions excluded keyword '{}'", keyword),
            }),
            None => Ok(Suitability::Suitable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(description: &str, is_remote: bool) -> JobPosting {
        JobPosting {
            id: "job-1".into(),
            title: "Engineer".into(),
            company: "Acme".into(),
            description: description.into(),
            requirements: None,
            location: "Remote".into(),
            url: String::new(),
            is_remote,
            salary_range: None,
            experience_level: None,
            job_type: None,
        }
    }

    #[test]
    fn test_excluded_keyword_is_case_insensitive() {
        let filter = KeywordFilter::new(false, &["Blockchain".to_string()]);
        let verdict = filter
            .evaluate(&posting("Join our BLOCKCHAIN team", true))
            .unwrap();
        assert_eq!(
            verdict,
            Suitability::Unsuitable {
                reason: "Posting mentions excluded keyword 'blockchain'".into()
            }
        );
        assert!(filter
            .evaluate(&posting("Plain backend work", true))
            .unwrap()
            .is_suitable());
    }

    #[test]
    fn test_require_remote() {
        let filter = KeywordFilter::new(true, &[]);
        assert!(!filter.evaluate(&posting("x", false)).unwrap().is_suitable());
        assert!(filter.evaluate(&posting("x", true)).unwrap().is_suitable());
    }

    #[test]
    fn test_blank_keywords_are_ignored() {
        let filter = KeywordFilter::new(false, &["  ".to_string()]);
        assert!(filter.evaluate(&posting("anything", true)).unwrap().is_suitable());
    }
}
