mod config;

use cleanroute_runner::Runner;
use common::observability::{
    init_observability, shutdown_observability, ObservabilityProviders,
};
use common::postgres::{PostgresAlertRepository, PostgresBinRepository, PostgresClient};
use config::ServiceConfig;
use goose::MigrationRunner;
use ingest_worker::{IngestWorker, TelemetryIngestionService};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use zone_resolver::ZoneResolver;

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let observability_providers: Option<ObservabilityProviders> =
        match init_observability(&config.observability_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize logging: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        broker = %config.mqtt_settings().broker_address(),
        "Starting cleanroute-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    let repositories = match initialize_postgres(&config).await {
        Ok(repos) => repos,
        Err(e) => {
            error!("Failed to initialize PostgreSQL: {:#}", e);
            std::process::exit(1);
        }
    };

    let zone_resolver = match load_zone_table(&config) {
        Ok(resolver) => Arc::new(resolver),
        Err(e) => {
            error!("Failed to load zone table: {:#}", e);
            std::process::exit(1);
        }
    };

    let ingestion_service = Arc::new(TelemetryIngestionService::new(
        repositories.bins,
        repositories.alerts,
        zone_resolver,
        config.alert_thresholds(),
    ));

    let ingest_worker =
        match IngestWorker::connect(config.ingest_worker_config(), ingestion_service).await {
            Ok(worker) => worker,
            Err(e) => {
                error!("Failed to start MQTT ingest: {}", e);
                std::process::exit(1);
            }
        };
    let ingest_status = ingest_worker.status_handle();

    Runner::new()
        .with_named_process("ingest_worker", ingest_worker.into_runner_process())
        .with_closer(move || async move {
            info!(status = ?ingest_status.snapshot(), "ingest stopped");
            shutdown_observability(observability_providers);
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await;
}

struct PostgresRepositories {
    bins: Arc<PostgresBinRepository>,
    alerts: Arc<PostgresAlertRepository>,
}

async fn initialize_postgres(config: &ServiceConfig) -> anyhow::Result<PostgresRepositories> {
    let postgres_config = config.postgres_config();

    info!("Running PostgreSQL migrations...");
    MigrationRunner::new(
        postgres_config.goose_binary_path.clone(),
        postgres_config.migrations_dir.clone(),
        "postgres".to_string(),
        postgres_config.goose_dsn(),
    )
    .run_migrations()
    .await?;

    let client = PostgresClient::from_config(&postgres_config)?;
    client.ping().await?;
    info!(
        host = %postgres_config.host,
        database = %postgres_config.database,
        "PostgreSQL connected"
    );

    Ok(PostgresRepositories {
        bins: Arc::new(PostgresBinRepository::new(client.clone())),
        alerts: Arc::new(PostgresAlertRepository::new(client)),
    })
}

fn load_zone_table(config: &ServiceConfig) -> anyhow::Result<ZoneResolver> {
    let resolver = match &config.zones_file {
        Some(path) => {
            info!(zones_file = %path, "loading zone table");
            ZoneResolver::from_file(path)?
        }
        None => ZoneResolver::builtin(),
    };
    info!(districts = resolver.districts().len(), "zone table ready");
    Ok(resolver)
}
