use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::documents::{DocumentRequirementChecker, DocumentStore, DocumentStoreError};
use super::domain::{
    AnswerItem, ApplicantType, Application, ApplicationId, ApplicationRecord, ApplicationStatus,
    AuditAction, FieldError, PERSONAL_DATA_CONSENT,
};
use super::journal;
use super::repository::{
    ApplicationRepository, ApplicationStatusView, RepositoryError, StatusHistoryView,
};
use super::status::{self, StateTransitionError};
use super::validation::{is_missing, validate_required, AnswerValidator};
use super::views::DraftView;
use crate::workflows::survey::catalog::SurveyCatalog;
use crate::workflows::survey::domain::{AnswerMap, QuestionType, Step, Survey};
use crate::workflows::survey::navigation::next_step;

/// Survey-independent knobs of the application workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSettings {
    /// Answering this question with `false` deletes the draft.
    pub consent_question: String,
    /// Date questions stamped with the current day when left unanswered.
    pub auto_fill_date_questions: Vec<String>,
}

impl Default for FormSettings {
    fn default() -> Self {
        Self {
            consent_question: "q_agree".to_string(),
            auto_fill_date_questions: vec!["q_application_date".to_string()],
        }
    }
}

/// Orchestrates drafts, navigation, submission, and review status changes.
pub struct ApplicationService<R, D> {
    catalog: Arc<SurveyCatalog>,
    repository: Arc<R>,
    documents: Arc<DocumentRequirementChecker<D>>,
    settings: FormSettings,
    today: Option<NaiveDate>,
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

impl<R, D> ApplicationService<R, D>
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    pub fn new(
        catalog: Arc<SurveyCatalog>,
        repository: Arc<R>,
        documents: Arc<DocumentRequirementChecker<D>>,
        settings: FormSettings,
    ) -> Self {
        Self {
            catalog,
            repository,
            documents,
            settings,
            today: None,
        }
    }

    /// Pin the calendar day used for validation, auto-fill, and age.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn catalog(&self) -> &Arc<SurveyCatalog> {
        &self.catalog
    }

    pub fn settings(&self) -> &FormSettings {
        &self.settings
    }

    pub(crate) fn document_store(&self) -> &Arc<D> {
        self.documents.store()
    }

    pub(crate) fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub(crate) fn validator(&self) -> AnswerValidator {
        AnswerValidator::new(self.today())
    }

    /// Start a draft positioned on the first step of an active survey.
    pub fn create_session(
        &self,
        survey_code: &str,
        applicant_type: Option<&str>,
    ) -> Result<DraftView, ApplicationServiceError> {
        let survey = self
            .catalog
            .get(survey_code)
            .filter(|survey| survey.is_active)
            .ok_or_else(|| ApplicationServiceError::UnknownSurvey(survey_code.to_string()))?;

        let applicant_type = match applicant_type.filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(ApplicantType::parse(raw).ok_or_else(|| {
                ApplicationServiceError::Validation(vec![FieldError::new(
                    "applicant_type",
                    format!("unsupported applicant type '{raw}'"),
                )])
            })?),
            None => None,
        };

        let now = Utc::now();
        let first = next_step(&survey, None, &Default::default());
        let mut record = ApplicationRecord::new(Application {
            id: next_application_id(),
            survey_code: survey.code.clone(),
            status: ApplicationStatus::Draft,
            current_step: first.map(|step| step.code.clone()),
            current_stage: first.map_or(0, |step| step.order),
            applicant_type,
            created_at: now,
            updated_at: now,
            submitted_at: None,
        });
        self.fill_defaults(&survey, &mut record);
        journal::audit(&mut record, AuditAction::Create, None, None, now);

        let stored = self.repository.insert(record)?;
        info!(
            application_id = %stored.application.id,
            survey = %survey.code,
            version = survey.version,
            "draft application created"
        );
        Ok(DraftView::render(&stored, first))
    }

    pub fn draft(&self, id: &ApplicationId) -> Result<DraftView, ApplicationServiceError> {
        let record = self.load(id)?;
        let survey = self.survey_for(&record)?;
        let step = current_step(&survey, &record);
        Ok(DraftView::render(&record, step))
    }

    /// Validate and store answers; optionally reposition the draft on
    /// `step_code`. Nothing is written when any item fails validation.
    pub fn apply_patch(
        &self,
        id: &ApplicationId,
        items: &[AnswerItem],
        step_code: Option<&str>,
    ) -> Result<DraftView, ApplicationServiceError> {
        let record = self.mutate(id, |service, survey, record| {
            service.patch_record(survey, record, items)?;
            if let Some(code) = step_code.filter(|code| !code.is_empty()) {
                let step = survey
                    .step(code)
                    .ok_or_else(|| ApplicationServiceError::UnknownStep(code.to_string()))?;
                record.application.current_step = Some(step.code.clone());
                record.application.current_stage = step.order;
            }
            service.fill_defaults(survey, record);
            Ok(record.clone())
        })?;

        debug!(application_id = %id, answers = items.len(), "answers patched");
        let survey = self.survey_for(&record)?;
        Ok(DraftView::render(&record, current_step(&survey, &record)))
    }

    /// Move to the next step once the current one has its required answers.
    pub fn advance(
        &self,
        id: &ApplicationId,
        items: &[AnswerItem],
    ) -> Result<DraftView, ApplicationServiceError> {
        if !items.is_empty() {
            self.apply_patch(id, items, None)?;
        }

        let record = self.mutate(id, |service, survey, record| {
            service.fill_defaults(survey, record);
            let answers = record.answer_map();
            let current = current_step(survey, record);
            if let Some(step) = current {
                let errors = validate_required(step, &answers);
                if !errors.is_empty() {
                    return Err(ApplicationServiceError::Validation(errors));
                }
            }
            let upcoming = next_step(survey, current, &answers);
            record.application.current_step = upcoming.map(|step| step.code.clone());
            record.application.current_stage = upcoming.map_or(0, |step| step.order);
            record.application.updated_at = Utc::now();
            Ok(record.clone())
        })?;

        let survey = self.survey_for(&record)?;
        let step = current_step(&survey, &record);
        debug!(
            application_id = %id,
            step = step.map(|step| step.code.as_str()).unwrap_or("<finished>"),
            "draft advanced"
        );
        Ok(DraftView::render(&record, step))
    }

    /// Run the full completeness check and move the draft to Submitted.
    ///
    /// Every missing required answer along the applicant's path and every
    /// missing mandatory document is reported together. Submitting an
    /// application that is already Submitted is a no-op.
    pub fn submit(
        &self,
        id: &ApplicationId,
        items: &[AnswerItem],
        actor: Option<&str>,
    ) -> Result<ApplicationStatusView, ApplicationServiceError> {
        if !items.is_empty() {
            self.apply_patch(id, items, None)?;
        }

        let today = self.today();
        let (record, changed) = self.mutate(id, |service, survey, record| {
            if record.application.status == ApplicationStatus::Submitted {
                return Ok((record.clone(), false));
            }
            if record.application.status != ApplicationStatus::Draft {
                return Err(StateTransitionError {
                    from: record.application.status,
                    to: ApplicationStatus::Submitted,
                }
                .into());
            }

            service.fill_defaults(survey, record);
            let answers = record.answer_map();
            let mut errors = required_along_path(survey, &answers);
            errors.extend(service.documents.validate_documents(
                survey,
                &record.application,
                &answers,
                today,
            )?);
            if !errors.is_empty() {
                return Err(ApplicationServiceError::Validation(errors));
            }

            let now = Utc::now();
            let changed = status::change_status(record, ApplicationStatus::Submitted, actor, now)?;
            if changed {
                journal::audit(record, AuditAction::Submit, actor, None, now);
            }
            Ok((record.clone(), changed))
        })?;

        if changed {
            info!(application_id = %id, "application submitted");
        } else {
            debug!(application_id = %id, "application already submitted");
        }
        Ok(record.status_view())
    }

    /// Reviewer-driven status change through the state machine.
    pub fn change_status(
        &self,
        id: &ApplicationId,
        new_status: ApplicationStatus,
        actor: Option<&str>,
    ) -> Result<ApplicationStatusView, ApplicationServiceError> {
        let result = self.repository.update_with(id, |record| {
            let from = record.application.status;
            let now = Utc::now();
            let changed = status::change_status(record, new_status, actor, now)?;
            if changed {
                let detail = format!("{from} -> {new_status}");
                journal::audit(record, AuditAction::StatusChange, actor, Some(detail), now);
            }
            Ok::<_, ApplicationServiceError>((record.status_view(), from, changed))
        });

        match result {
            Ok((view, from, true)) => {
                info!(application_id = %id, %from, to = %new_status, "application status changed");
                Ok(view)
            }
            Ok((view, _, false)) => Ok(view),
            Err(ApplicationServiceError::Transition(error)) => {
                warn!(application_id = %id, %error, "rejected status change");
                Err(ApplicationServiceError::Transition(error))
            }
            Err(other) => Err(other),
        }
    }

    pub fn status(&self, id: &ApplicationId) -> Result<ApplicationStatusView, ApplicationServiceError> {
        Ok(self.load(id)?.status_view())
    }

    pub fn history(&self, id: &ApplicationId) -> Result<StatusHistoryView, ApplicationServiceError> {
        Ok(self.load(id)?.history_view())
    }

    pub(crate) fn load(&self, id: &ApplicationId) -> Result<ApplicationRecord, ApplicationServiceError> {
        let record = self.repository.fetch(id)?.ok_or(RepositoryError::NotFound)?;
        Ok(record)
    }

    pub(crate) fn survey_for(
        &self,
        record: &ApplicationRecord,
    ) -> Result<Arc<Survey>, ApplicationServiceError> {
        let code = &record.application.survey_code;
        self.catalog
            .get(code)
            .ok_or_else(|| ApplicationServiceError::UnknownSurvey(code.clone()))
    }

    /// Run `mutation` under the repository lock; a declined consent deletes
    /// the application instead of committing anything.
    pub(crate) fn mutate<T, F>(&self, id: &ApplicationId, mutation: F) -> Result<T, ApplicationServiceError>
    where
        F: FnOnce(&Self, &Survey, &mut ApplicationRecord) -> Result<T, ApplicationServiceError>,
    {
        let result = self.repository.update_with(id, |record| {
            let survey = self.survey_for(record)?;
            mutation(self, &survey, record)
        });

        if let Err(ApplicationServiceError::ConsentDeclined) = &result {
            self.discard(id)?;
        }
        result
    }

    fn discard(&self, id: &ApplicationId) -> Result<(), ApplicationServiceError> {
        self.repository.delete(id)?;
        self.documents.store().discard(id)?;
        warn!(application_id = %id, "consent declined, application deleted");
        Ok(())
    }

    /// Validate every item, then write all of them. The consent check runs
    /// as soon as a valid consent answer is seen.
    pub(crate) fn patch_record(
        &self,
        survey: &Survey,
        record: &mut ApplicationRecord,
        items: &[AnswerItem],
    ) -> Result<(), ApplicationServiceError> {
        let validator = self.validator();
        let mut accepted: Vec<(&str, Value)> = Vec::with_capacity(items.len());
        let mut errors = Vec::new();

        for item in items {
            let question = survey
                .question(&item.question_code)
                .ok_or_else(|| ApplicationServiceError::UnknownQuestion(item.question_code.clone()))?;
            match validator.validate(question, &item.value) {
                Ok(normalized) => {
                    if question.code == self.settings.consent_question
                        && normalized == Value::Bool(false)
                    {
                        return Err(ApplicationServiceError::ConsentDeclined);
                    }
                    accepted.push((question.code.as_str(), normalized));
                }
                Err(error) => errors.push(error),
            }
        }

        if !errors.is_empty() {
            return Err(ApplicationServiceError::Validation(errors));
        }

        let now = Utc::now();
        for (code, value) in accepted {
            if code == self.settings.consent_question && value == Value::Bool(true) {
                let already = record.consents.iter().any(|consent| {
                    consent.consent_type == PERSONAL_DATA_CONSENT && consent.is_given
                });
                if !already {
                    journal::upsert_consent(record, PERSONAL_DATA_CONSENT, true, None, now);
                    let detail = format!("{PERSONAL_DATA_CONSENT}: given");
                    journal::audit(record, AuditAction::Consent, None, Some(detail), now);
                }
            }
            record.set_answer(code, value, now);
        }
        Ok(())
    }

    /// Stamp configured date questions with today when unanswered.
    pub(crate) fn fill_defaults(&self, survey: &Survey, record: &mut ApplicationRecord) -> bool {
        let today = Value::String(self.today().format("%Y-%m-%d").to_string());
        let now = Utc::now();
        let mut filled = false;
        for code in &self.settings.auto_fill_date_questions {
            let Some(question) = survey.question(code) else {
                continue;
            };
            if question.kind != QuestionType::Date {
                continue;
            }
            let missing = record
                .answers
                .get(code)
                .map_or(true, |answer| is_missing(&answer.value));
            if missing {
                record.set_answer(code, today.clone(), now);
                filled = true;
            }
        }
        filled
    }
}

pub(crate) fn current_step<'a>(survey: &'a Survey, record: &ApplicationRecord) -> Option<&'a Step> {
    record
        .application
        .current_step
        .as_deref()
        .and_then(|code| survey.step(code))
}

/// Required-answer errors over every step the applicant would traverse.
fn required_along_path(survey: &Survey, answers: &AnswerMap) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let mut visited = HashSet::new();
    let mut step = next_step(survey, None, answers);
    while let Some(current) = step {
        if !visited.insert(current.code.as_str()) {
            break;
        }
        errors.extend(validate_required(current, answers));
        step = next_step(survey, Some(current), answers);
    }
    errors
}

/// Error raised by the application service.
#[derive(Debug, thiserror::Error)]
pub enum ApplicationServiceError {
    #[error("survey '{0}' not found")]
    UnknownSurvey(String),
    #[error("unknown question code '{0}'")]
    UnknownQuestion(String),
    #[error("unknown step '{0}'")]
    UnknownStep(String),
    #[error("validation failed: {} field error(s)", .0.len())]
    Validation(Vec<FieldError>),
    #[error("consent to personal data processing was declined")]
    ConsentDeclined,
    #[error(transparent)]
    Transition(#[from] StateTransitionError),
    #[error(transparent)]
    Documents(#[from] DocumentStoreError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
