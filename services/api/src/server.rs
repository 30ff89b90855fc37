use crate::cli::ServeArgs;
use crate::infra::{load_config, AppState, StoreBackend};
use crate::routes::with_hostel_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use hostel_desk::config::AppConfig;
use hostel_desk::error::AppError;
use hostel_desk::hostel::{HostelService, HostelStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = load_config()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    match StoreBackend::open(&config.database).await? {
        StoreBackend::Memory(store) => serve(config, store).await,
        StoreBackend::Sqlite(store) => {
            store.ping().await?;
            let result = serve(config, Arc::clone(&store)).await;
            store.close().await;
            result
        }
    }
}

async fn serve<S>(config: AppConfig, store: Arc<S>) -> Result<(), AppError>
where
    S: HostelStore + 'static,
{
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = Arc::new(HostelService::new(store, &config.auth));
    let app = with_hostel_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "hostel desk ready");

    axum::serve(listener, app).await?;
    Ok(())
}
