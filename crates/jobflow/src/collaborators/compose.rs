use crate::graph::CollaboratorError;
use crate::model::{Document, JobPosting};

use super::DocumentComposer;

/// Offline composer. Reorders the profile so that skills and experiences
/// the posting mentions come first, and appends retry feedback to the
/// summary. The profile content itself is never invented or dropped.
pub struct ProfileComposer;

fn mentions(text: &str, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    !term.is_empty() && text.contains(&term)
}

impl DocumentComposer for ProfileComposer {
    fn compose(
        &self,
        profile: &Document,
        posting: &JobPosting,
        feedback: Option<&str>,
    ) -> Result<Document, CollaboratorError> {
        if profile.contact.full_name.trim().is_empty() {
            return Err(CollaboratorError::MissingInput("profile contact name"));
        }

        let text = format!(
            "{}\n{}\n{}",
            posting.title,
            posting.description,
            posting.requirements.as_deref().unwrap_or_default()
        )
        .to_lowercase();

        let mut document = profile.clone();
        // Stable sorts keep the profile's own order within each group.
        document.skills.sort_by_key(|s| !mentions(&text, &s.name));
        document
            .experiences
            .sort_by_key(|e| !e.technologies.iter().any(|t| mentions(&text, t)));

        if let Some(feedback) = feedback.map(str::trim).filter(|f| !f.is_empty()) {
            let summary = document.summary.trim_end();
            document.summary = if summary.is_empty() {
                format!("Revision notes: {}", feedback)
            } else {
                format!("{}\n\nRevision notes: {}", summary, feedback)
            };
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContactInfo, Skill};

    fn profile() -> Document {
        Document {
            contact: ContactInfo {
                full_name: "Ada Lovelace".into(),
                email: "ada@example.com".into(),
                ..ContactInfo::default()
            },
            summary: "Engineer.".into(),
            skills: ["Go", "Rust", "SQL"]
                .iter()
                .map(|name| Skill {
                    name: name.to_string(),
                    category: "language".into(),
                    proficiency: None,
                })
                .collect(),
            ..Document::default()
        }
    }

    fn posting() -> JobPosting {
        JobPosting {
            id: "job-1".into(),
            title: "Rust Developer".into(),
            company: "Acme".into(),
            description: "Systems work with sql databases".into(),
            requirements: None,
            location: "Remote".into(),
            url: String::new(),
            is_remote: true,
            salary_range: None,
            experience_level: None,
            job_type: None,
        }
    }

    #[test]
    fn test_mentioned_skills_come_first() {
        let doc = ProfileComposer.compose(&profile(), &posting(), None).unwrap();
        let names: Vec<_> = doc.skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Rust", "SQL", "Go"]);
        assert_eq!(doc.summary, "Engineer.");
    }

    #[test]
    fn test_feedback_is_folded_into_summary() {
        let doc = ProfileComposer
            .compose(&profile(), &posting(), Some("Emphasize leadership"))
            .unwrap();
        assert_eq!(doc.summary, "Engineer.\n\nRevision notes: Emphasize leadership");
    }

    #[test]
    fn test_profile_without_name_is_rejected() {
        let err = ProfileComposer
            .compose(&Document::default(), &posting(), None)
            .unwrap_err();
        assert_eq!(err, CollaboratorError::MissingInput("profile contact name"));
    }
}
