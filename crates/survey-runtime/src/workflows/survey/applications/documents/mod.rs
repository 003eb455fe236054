//! Mandatory document gating.
//!
//! Requirement expressions see the answers plus three derived keys:
//! `branch` (`adult`/`child`), `age` in full years, and `applicant_type`.

mod registry;

pub use registry::{
    DocumentStore, DocumentStoreError, DocumentVersion, DocumentVersionStatus,
    InMemoryDocumentRegistry, LatestVersion, UploadPolicy, UploadRequest, UploadTicket,
    DEFAULT_ALLOWED_CONTENT_TYPES, DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_MAX_DOCUMENTS_PER_APPLICATION,
    DEFAULT_MAX_FILE_SIZE,
};

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;

use super::domain::{ApplicantType, Application, FieldError};
use crate::workflows::survey::domain::{AnswerMap, Survey};

pub const BRANCH_KEY: &str = "branch";
pub const AGE_KEY: &str = "age";
pub const APPLICANT_TYPE_KEY: &str = "applicant_type";

/// Which answers drive the adult/child branch and the age key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRules {
    pub applicant_type_question: String,
    pub date_of_birth_question: String,
    pub adult_types: BTreeSet<ApplicantType>,
}

impl Default for BranchRules {
    fn default() -> Self {
        Self {
            applicant_type_question: "q_who_fills".to_string(),
            date_of_birth_question: "q_dob".to_string(),
            adult_types: [ApplicantType::Applicant, ApplicantType::Relative]
                .into_iter()
                .collect(),
        }
    }
}

impl BranchRules {
    /// Applicant type from the answer, falling back to the stored tag.
    pub fn applicant_type(&self, application: &Application, answers: &AnswerMap) -> Option<ApplicantType> {
        answers
            .get(&self.applicant_type_question)
            .and_then(Value::as_str)
            .and_then(ApplicantType::parse)
            .or(application.applicant_type)
    }

    pub fn branch(&self, applicant_type: ApplicantType) -> &'static str {
        if self.adult_types.contains(&applicant_type) {
            "adult"
        } else {
            "child"
        }
    }

    /// Full years between the date-of-birth answer and `today`.
    pub fn age(&self, answers: &AnswerMap, today: NaiveDate) -> Option<u32> {
        let raw = answers.get(&self.date_of_birth_question)?.as_str()?;
        let born = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
        today.years_since(born)
    }

    pub fn enrich(&self, application: &Application, answers: &AnswerMap, today: NaiveDate) -> AnswerMap {
        let mut context = answers.clone();
        if let Some(kind) = self.applicant_type(application, answers) {
            context.insert(BRANCH_KEY.to_string(), Value::from(self.branch(kind)));
            context.insert(APPLICANT_TYPE_KEY.to_string(), Value::from(kind.label()));
        }
        if let Some(age) = self.age(answers, today) {
            context.insert(AGE_KEY.to_string(), Value::from(age));
        }
        context
    }
}

/// Reports mandatory documents that have no ready version.
pub struct DocumentRequirementChecker<D> {
    store: Arc<D>,
    rules: BranchRules,
}

impl<D> DocumentRequirementChecker<D>
where
    D: DocumentStore + 'static,
{
    pub fn new(store: Arc<D>, rules: BranchRules) -> Self {
        Self { store, rules }
    }

    pub fn rules(&self) -> &BranchRules {
        &self.rules
    }

    pub fn store(&self) -> &Arc<D> {
        &self.store
    }

    /// Codes of requirements whose gating expression holds, deduplicated in
    /// configuration order.
    pub fn mandatory_codes<'a>(
        &self,
        survey: &'a Survey,
        application: &Application,
        answers: &AnswerMap,
        today: NaiveDate,
    ) -> Vec<(&'a str, &'a str)> {
        let context = self.rules.enrich(application, answers, today);
        let mut seen = HashSet::new();
        survey
            .document_requirements
            .iter()
            .filter(|requirement| {
                requirement
                    .expression
                    .as_ref()
                    .map_or(true, |expression| expression.evaluate(&context))
            })
            .filter(|requirement| seen.insert(requirement.code.as_str()))
            .map(|requirement| (requirement.code.as_str(), requirement.label.as_str()))
            .collect()
    }

    /// One error per mandatory requirement without an uploaded or available
    /// latest version. The store is only consulted when something is
    /// mandatory; when it fails nothing is treated as satisfied.
    pub fn validate_documents(
        &self,
        survey: &Survey,
        application: &Application,
        answers: &AnswerMap,
        today: NaiveDate,
    ) -> Result<Vec<FieldError>, DocumentStoreError> {
        let mandatory = self.mandatory_codes(survey, application, answers, today);
        if mandatory.is_empty() {
            return Ok(Vec::new());
        }

        let ready: HashSet<String> = self
            .store
            .list_latest_versions(&application.id)?
            .into_iter()
            .filter(|latest| latest.status.is_ready())
            .map(|latest| latest.requirement_code)
            .collect();

        Ok(mandatory
            .into_iter()
            .filter(|(code, _)| !ready.contains(*code))
            .map(|(code, label)| {
                let name = if label.is_empty() { code } else { label };
                FieldError::new(code, format!("document '{name}' is required"))
            })
            .collect())
    }
}
