use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryApplicationRepository};
use crate::routes::with_application_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use survey_runtime::config::AppConfig;
use survey_runtime::error::AppError;
use survey_runtime::telemetry;
use survey_runtime::workflows::survey::applications::{
    ApplicationService, BranchRules, DocumentRequirementChecker, InMemoryDocumentRegistry,
};
use survey_runtime::workflows::survey::SurveyCatalog;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let catalog = match &config.forms.survey_fixture {
        Some(path) => SurveyCatalog::from_path(path)?,
        None => SurveyCatalog::bundled()?,
    };
    info!(surveys = ?catalog.codes(), "survey catalog loaded");

    let repository = Arc::new(InMemoryApplicationRepository::default());
    let registry = Arc::new(InMemoryDocumentRegistry::new(config.forms.uploads.clone()));
    let documents = Arc::new(DocumentRequirementChecker::new(
        registry,
        BranchRules::default(),
    ));
    let application_service = Arc::new(ApplicationService::new(
        Arc::new(catalog),
        repository,
        documents,
        config.forms.form_settings(),
    ));

    let app = with_application_routes(application_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "survey runtime ready");

    axum::serve(listener, app).await?;
    Ok(())
}
