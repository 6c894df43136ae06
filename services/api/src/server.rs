use crate::cli::ServeArgs;
use crate::infra::{load_catalog, AppState, InMemoryCaseRepository};
use crate::routes::with_case_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};
use veteran_aid::config::AppConfig;
use veteran_aid::error::AppError;
use veteran_aid::telemetry;
use veteran_aid::workflows::application::{OpenAiOracle, PdfRenderer};
use veteran_aid::workflows::cases::{CaseService, LocalDirectoryStore, UploadPolicy};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(config.environment, &config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryCaseRepository::with_catalog(load_catalog(
        &config.catalog,
    )?));
    let store = Arc::new(LocalDirectoryStore::new(config.uploads.dir.clone()));
    let oracle = OpenAiOracle::from_config(&config.oracle);
    if !oracle.is_configured() {
        warn!("OPENAI_API_KEY is not set; text generation endpoints will answer 503");
    }
    let renderer = Arc::new(PdfRenderer::initialize(&config.renderer)?);

    let case_service = Arc::new(CaseService::new(
        repository,
        store,
        Arc::new(oracle),
        renderer,
        UploadPolicy::new(config.uploads.max_bytes),
    ));

    let app = with_case_routes(case_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        upload_dir = %config.uploads.dir.display(),
        "veteran aid case service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
