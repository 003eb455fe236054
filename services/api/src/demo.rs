use crate::infra::{parse_date, InMemoryApplicationRepository};
use chrono::{Local, NaiveDate};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use survey_runtime::error::AppError;
use survey_runtime::workflows::survey::applications::{
    interpret, AnswerItem, ApplicationId, ApplicationRepository, ApplicationService,
    ApplicationServiceError, ApplicationStatus, BranchRules, DocumentRequirementChecker,
    FormSettings, InMemoryDocumentRegistry, RepositoryError, UploadPolicy, UploadRequest,
    SKIP_WORDS,
};
use survey_runtime::workflows::survey::fixture;
use survey_runtime::workflows::survey::{Survey, SurveyCatalog, DEFAULT_SURVEY_FIXTURE};

type DemoService = ApplicationService<InMemoryApplicationRepository, InMemoryDocumentRegistry>;

#[derive(Args, Debug)]
pub(crate) struct SurveyCheckArgs {
    /// Survey fixture to check. Defaults to the bundled questionnaire.
    #[arg(long)]
    pub(crate) path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum DemoMode {
    /// One question per turn, answered with free text.
    #[default]
    Chat,
    /// One step per page, answered with structured values.
    Pages,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Front-end to drive the walkthrough with
    #[arg(long, value_enum, default_value_t = DemoMode::Chat)]
    pub(crate) mode: DemoMode,
    /// Who fills the form: self, parent, guardian, or relative
    #[arg(long, default_value = "parent")]
    pub(crate) who: String,
    /// Override the calendar day used for validation (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Skip the document uploads to show the submission rejection
    #[arg(long)]
    pub(crate) skip_documents: bool,
}

pub(crate) fn run_survey_check(args: SurveyCheckArgs) -> Result<(), AppError> {
    let (source, surveys) = match args.path {
        Some(path) => {
            let surveys = fixture::load_path(&path)?;
            (path.display().to_string(), surveys)
        }
        None => (
            "bundled fixture".to_string(),
            fixture::load_str(DEFAULT_SURVEY_FIXTURE)?,
        ),
    };

    println!("Survey check passed for {source}");
    for survey in &surveys {
        render_survey_summary(survey);
    }
    Ok(())
}

fn render_survey_summary(survey: &Survey) {
    println!(
        "\n{} (v{}) - {}{}",
        survey.code,
        survey.version,
        survey.title,
        if survey.is_active { "" } else { " [inactive]" }
    );
    for step in &survey.steps {
        let required = step.questions.iter().filter(|question| question.required).count();
        println!(
            "  {:>2}. {:<12} {} questions ({} required), {} redirects",
            step.order,
            step.code,
            step.questions.len(),
            required,
            step.transitions.len()
        );
    }
    if survey.document_requirements.is_empty() {
        println!("  No document requirements");
        return;
    }
    println!("  Document requirements:");
    for requirement in &survey.document_requirements {
        let condition = if requirement.expression.is_some() {
            "conditional"
        } else {
            "always"
        };
        println!("    - {} ({}, {condition})", requirement.code, requirement.label);
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        mode,
        who,
        today,
        skip_documents,
    } = args;
    let today = today.unwrap_or_else(|| Local::now().date_naive());

    let catalog = Arc::new(SurveyCatalog::bundled()?);
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let registry = Arc::new(InMemoryDocumentRegistry::new(UploadPolicy::default()));
    let checker = Arc::new(DocumentRequirementChecker::new(
        registry.clone(),
        BranchRules::default(),
    ));
    let service = ApplicationService::new(
        catalog,
        repository.clone(),
        checker.clone(),
        FormSettings::default(),
    )
    .with_today(today);

    println!("Questionnaire demo ({mode:?} mode, filled by {who}, today {today})");
    let script = DemoScript::new(&who);
    let walkthrough = Walkthrough {
        service: &service,
        repository: &repository,
        checker: &checker,
        script: &script,
        today,
    };
    if let Err(err) = walkthrough.run(mode, skip_documents) {
        println!("  Demo stopped: {err}");
    }
    println!("\n{} application(s) held in memory", repository.len());
    Ok(())
}

struct Walkthrough<'a> {
    service: &'a DemoService,
    repository: &'a InMemoryApplicationRepository,
    checker: &'a DocumentRequirementChecker<InMemoryDocumentRegistry>,
    script: &'a DemoScript,
    today: NaiveDate,
}

impl Walkthrough<'_> {
    fn run(&self, mode: DemoMode, skip_documents: bool) -> Result<(), ApplicationServiceError> {
        let draft = self.service.create_session("default", None)?;
        let id = draft.application_id;
        println!("- Started draft {id}");

        match mode {
            DemoMode::Chat => self.chat(&id)?,
            DemoMode::Pages => self.pages(&id)?,
        }

        if skip_documents {
            println!("\nDocuments: skipped");
        } else {
            self.upload_documents(&id)?;
        }

        match self.service.submit(&id, &[], Some("applicant")) {
            Ok(view) => println!("\nSubmitted {} -> status {}", view.application_id, view.status),
            Err(ApplicationServiceError::Validation(errors)) => {
                println!("\nSubmission rejected:");
                for error in errors {
                    println!("  - {error}");
                }
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        self.service
            .add_comment(&id, "Documents verified", Some("reviewer"), false)?;
        self.service
            .change_status(&id, ApplicationStatus::Approved, Some("reviewer"))?;
        let history = self.service.history(&id)?;
        println!("Status history ({}):", history.status);
        for change in &history.history {
            println!(
                "  - {} -> {} by {}",
                change.old_status,
                change.new_status,
                change.actor.as_deref().unwrap_or("system")
            );
        }
        let trail: Vec<&str> = self
            .service
            .audit_log(&id)?
            .iter()
            .map(|entry| entry.action.label())
            .collect();
        println!("Audit trail: {}", trail.join(", "));
        Ok(())
    }

    fn chat(&self, id: &ApplicationId) -> Result<(), ApplicationServiceError> {
        let mut prompt = self.service.active_question(id)?;
        while let Some(current) = prompt {
            println!("\n[{}] {}", current.step_code, current.text());
            let text = self
                .script
                .answer(&current.question.code)
                .unwrap_or(SKIP_WORDS[0]);
            println!("> {text}");
            let reply = self.service.answer_turn(id, &current.question.code, text)?;
            prompt = reply.next;
        }
        println!("\nNo questions left");
        Ok(())
    }

    fn pages(&self, id: &ApplicationId) -> Result<(), ApplicationServiceError> {
        let mut view = self.service.draft(id)?;
        let survey = self
            .service
            .catalog()
            .get(&view.survey_code)
            .ok_or_else(|| ApplicationServiceError::UnknownSurvey(view.survey_code.clone()))?;

        while let Some(step) = view.current_step.clone() {
            println!("\nStep {} - {}", step.order, step.title);
            let mut shown = step;
            loop {
                let mut items = Vec::new();
                for question in &shown.questions {
                    if view.answers.contains_key(&question.code) {
                        continue;
                    }
                    let Some(question) = survey.question(&question.code) else {
                        continue;
                    };
                    let text = self.script.answer(&question.code).unwrap_or(SKIP_WORDS[0]);
                    let value = interpret(question, text)
                        .map_err(|error| ApplicationServiceError::Validation(vec![error]))?;
                    println!("  {}: {value}", question.label);
                    items.push(AnswerItem::new(question.code.clone(), value));
                }
                if items.is_empty() {
                    break;
                }
                view = self.service.apply_patch(id, &items, Some(shown.code.as_str()))?;
                match view.current_step.clone() {
                    Some(step) => shown = step,
                    None => break,
                }
            }
            view = self.service.advance(id, &[])?;
        }
        println!("\nAll steps complete (restart available: {})", view.restart_available);
        Ok(())
    }

    fn upload_documents(&self, id: &ApplicationId) -> Result<(), ApplicationServiceError> {
        let record = self
            .repository
            .fetch(id)?
            .ok_or(ApplicationServiceError::Repository(RepositoryError::NotFound))?;
        let survey = self
            .service
            .catalog()
            .get(&record.application.survey_code)
            .ok_or_else(|| {
                ApplicationServiceError::UnknownSurvey(record.application.survey_code.clone())
            })?;

        let mandatory = self.checker.mandatory_codes(
            &survey,
            &record.application,
            &record.answer_map(),
            self.today,
        );
        println!("\nDocuments ({} mandatory):", mandatory.len());
        for (code, label) in mandatory {
            let filename = format!("{code}.pdf");
            let content_type = mime_guess::from_path(&filename).first_or_octet_stream();
            let request = UploadRequest {
                requirement_code: Some(code.to_string()),
                document_id: None,
                filename,
                content_type: content_type.essence_str().to_string(),
                size: 180_000,
            };
            let ticket = self.service.request_upload(id, &request)?;
            self.service.complete_upload(id, &ticket.version_id, true)?;
            println!("  - {label}: {} ({content_type})", ticket.storage_key);
        }
        Ok(())
    }
}

/// Canned answers keyed by question code, as the applicant would type them.
struct DemoScript {
    who: String,
    child: bool,
}

impl DemoScript {
    fn new(who: &str) -> Self {
        Self {
            who: who.to_string(),
            child: matches!(who, "parent" | "guardian"),
        }
    }

    fn answer(&self, question_code: &str) -> Option<&str> {
        let text = match question_code {
            "q_agree" => "yes",
            "q_who_fills" => self.who.as_str(),
            "q_full_name" => "Maria Ivanova",
            "q_dob" if self.child => "12.03.2015",
            "q_dob" => "1984-07-21",
            "q_phone" => "+7 900 000 00 00",
            "q_employment" => "employed",
            "q_income" => "52000",
            "q_child_school" => "School No. 5",
            "q_has_siblings" => "no",
            "q_channels" => "SMS, email",
            _ => return None,
        };
        Some(text)
    }
}
