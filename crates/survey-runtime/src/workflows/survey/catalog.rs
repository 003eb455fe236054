use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::domain::Survey;
use super::fixture::{self, SurveyConfigError};

/// Fixture served when no other survey file is configured.
pub const DEFAULT_SURVEY_FIXTURE: &str = include_str!("../../../fixtures/survey_default.json");

/// Read-only registry of imported surveys, keyed by survey code.
///
/// Surveys are shared as `Arc<Survey>` so a request keeps working against the
/// version it started with even if [`SurveyCatalog::reload`] swaps the set.
#[derive(Debug, Default)]
pub struct SurveyCatalog {
    installed: RwLock<Installed>,
    labels: OptionLabelCache,
}

/// Surveys of one reload, stamped so label lookups never mix generations.
#[derive(Debug, Default)]
struct Installed {
    generation: u64,
    surveys: BTreeMap<String, Arc<Survey>>,
}

impl SurveyCatalog {
    pub fn new(surveys: Vec<Survey>) -> Self {
        let catalog = Self::default();
        catalog.install(surveys);
        catalog
    }

    pub fn from_path(path: &Path) -> Result<Self, SurveyConfigError> {
        Ok(Self::new(fixture::load_path(path)?))
    }

    pub fn from_fixture(raw: &str) -> Result<Self, SurveyConfigError> {
        Ok(Self::new(fixture::load_str(raw)?))
    }

    pub fn bundled() -> Result<Self, SurveyConfigError> {
        Self::from_fixture(DEFAULT_SURVEY_FIXTURE)
    }

    pub fn get(&self, code: &str) -> Option<Arc<Survey>> {
        self.installed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .surveys
            .get(code)
            .cloned()
    }

    pub fn codes(&self) -> Vec<String> {
        self.installed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .surveys
            .keys()
            .cloned()
            .collect()
    }

    /// Replace every survey and drop cached option labels.
    pub fn reload(&self, surveys: Vec<Survey>) {
        self.install(surveys);
        self.labels.invalidate();
    }

    /// Human label of an option value, or `None` when the survey, question,
    /// or value is unknown.
    ///
    /// Entries are keyed by install generation, so a lookup that started
    /// before a reload cannot leave stale labels for later readers.
    pub fn option_label(&self, survey_code: &str, question_code: &str, value: &str) -> Option<String> {
        let (generation, survey) = {
            let installed = self.installed.read().unwrap_or_else(PoisonError::into_inner);
            (installed.generation, installed.surveys.get(survey_code).cloned()?)
        };
        self.labels.label(generation, &survey, question_code, value)
    }

    fn install(&self, surveys: Vec<Survey>) {
        let surveys = surveys
            .into_iter()
            .map(|survey| (survey.code.clone(), Arc::new(survey)))
            .collect();
        let mut installed = self.installed.write().unwrap_or_else(PoisonError::into_inner);
        installed.generation += 1;
        installed.surveys = surveys;
    }
}

type LabelKey = (u64, String, String);

/// Memoized `value -> label` lookup per catalog generation and question.
#[derive(Debug, Default)]
pub struct OptionLabelCache {
    entries: Mutex<HashMap<LabelKey, Arc<BTreeMap<String, String>>>>,
}

impl OptionLabelCache {
    pub fn label(
        &self,
        generation: u64,
        survey: &Survey,
        question_code: &str,
        value: &str,
    ) -> Option<String> {
        let key = (generation, survey.code.clone(), question_code.to_string());
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let labels = match entries.get(&key) {
            Some(labels) => labels.clone(),
            None => {
                let question = survey.question(question_code)?;
                let labels: Arc<BTreeMap<String, String>> = Arc::new(
                    question
                        .options
                        .iter()
                        .map(|option| (option.value.clone(), option.label.clone()))
                        .collect(),
                );
                entries.insert(key, labels.clone());
                labels
            }
        };
        labels.get(value).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn invalidate(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
