use clap::Args;
use hostel_desk::config::{AppConfig, DatabaseConfig};
use hostel_desk::error::AppError;
use hostel_desk::hostel::{HostelService, HostelStore, MemoryStore, RoomCatalogue, SqliteStore};
use hostel_desk::telemetry;
use metrics_exporter_prometheus::PrometheusHandle;
use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// The store selected by `APP_DATABASE_URL`.
pub(crate) enum StoreBackend {
    Memory(Arc<MemoryStore>),
    Sqlite(Arc<SqliteStore>),
}

impl StoreBackend {
    pub(crate) async fn open(config: &DatabaseConfig) -> Result<Self, AppError> {
        if config.is_memory() {
            warn!("using the in-memory store; all data is lost on exit");
            return Ok(Self::Memory(Arc::new(MemoryStore::default())));
        }
        let store = SqliteStore::connect(config).await?;
        Ok(Self::Sqlite(Arc::new(store)))
    }
}

#[derive(Args, Debug)]
pub(crate) struct RoomImportArgs {
    /// Path to a CSV file with the header `Room No,Capacity,Block`
    #[arg(long)]
    pub(crate) csv: PathBuf,
}

pub(crate) fn load_config() -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    Ok(config)
}

pub(crate) async fn run_seed() -> Result<(), AppError> {
    let config = load_config()?;
    match StoreBackend::open(&config.database).await? {
        StoreBackend::Memory(store) => seed_with(store, &config).await,
        StoreBackend::Sqlite(store) => {
            let result = seed_with(Arc::clone(&store), &config).await;
            store.close().await;
            result
        }
    }
}

async fn seed_with<S>(store: Arc<S>, config: &AppConfig) -> Result<(), AppError>
where
    S: HostelStore + 'static,
{
    let service = HostelService::new(store, &config.auth);
    let report = service.seed(&config.seed).await?;

    if report.admin_created {
        println!("Created admin account {}", config.seed.admin_email);
    } else {
        println!("Admin account {} already exists", config.seed.admin_email);
    }
    if report.rooms_created > 0 {
        println!("Created {} sample rooms", report.rooms_created);
    } else {
        println!("Rooms already present; sample rooms skipped");
    }
    Ok(())
}

pub(crate) async fn run_room_import(args: RoomImportArgs) -> Result<(), AppError> {
    let config = load_config()?;
    let catalogue = RoomCatalogue::from_reader(File::open(&args.csv)?)?;
    for row in &catalogue.rejected {
        println!("  line {}: {}", row.line, row.reason);
    }

    match StoreBackend::open(&config.database).await? {
        StoreBackend::Memory(store) => import_with(store, &config, catalogue).await,
        StoreBackend::Sqlite(store) => {
            let result = import_with(Arc::clone(&store), &config, catalogue).await;
            store.close().await;
            result
        }
    }
}

async fn import_with<S>(
    store: Arc<S>,
    config: &AppConfig,
    catalogue: RoomCatalogue,
) -> Result<(), AppError>
where
    S: HostelStore + 'static,
{
    let service = HostelService::new(store, &config.auth);
    let summary = service.import_catalogue(catalogue).await?;
    println!(
        "Room import: {} created | {} already present | {} rejected",
        summary.created, summary.duplicates, summary.rejected
    );
    Ok(())
}
