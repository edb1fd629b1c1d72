#![cfg(feature = "integration-tests")]

use chrono::{Duration, TimeZone, Utc};
use common::domain::{
    AlertKind, AlertRepository, AlertSeverity, BinRepository, CommandLogRepository, CommandTarget,
    CreateAlertInput, CreateCommandLogInput, DeviceStatus, DomainError, LifecycleIntent,
    RecordTelemetryInput, RegisterBinInput, TelemetryReading, UpsertBinInput,
};
use common::postgres::{
    PostgresAlertRepository, PostgresBinRepository, PostgresClient, PostgresCommandLogRepository,
};
use goose::MigrationRunner;
use serde_json::json;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

async fn setup_test_db() -> (ContainerAsync<Postgres>, PostgresClient) {
    let postgres = Postgres::default().start().await.unwrap();
    let host = postgres.get_host().await.unwrap();
    let port = postgres.get_host_port_ipv4(5432).await.unwrap();

    let migrations_dir = format!("{}/../../migrations/postgres", env!("CARGO_MANIFEST_DIR"));
    let dsn = format!(
        "postgres://postgres:postgres@{}:{}/postgres?sslmode=disable",
        host, port
    );
    let goose_path = which::which("goose").expect("goose binary not found");

    let migration_runner = MigrationRunner::new(
        goose_path.to_string_lossy().to_string(),
        migrations_dir,
        "postgres".to_string(),
        dsn,
    );

    migration_runner
        .run_migrations()
        .await
        .expect("Migrations failed");

    let client = PostgresClient::new(
        &host.to_string(),
        port,
        "postgres",
        "postgres",
        "postgres",
        5,
    )
    .expect("Failed to create client");

    (postgres, client)
}

fn reading(bin_id: &str, fill_pct: f64) -> TelemetryReading {
    TelemetryReading {
        bin_id: bin_id.to_string(),
        ts: Utc.with_ymd_and_hms(2025, 12, 12, 6, 0, 0).unwrap(),
        fill_pct,
        batt_v: Some(3.9),
        temp_c: Some(30.5),
        emptied: false,
        lat: Some(6.93),
        lon: Some(79.85),
    }
}

fn register_input(bin_id: &str, user_id: &str, user_name: &str) -> RegisterBinInput {
    RegisterBinInput {
        bin_id: bin_id.to_string(),
        user_id: user_id.to_string(),
        user_name: Some(user_name.to_string()),
        user_phone: Some("+94770000000".to_string()),
        wifi_ssid: Some("home-wifi".to_string()),
        lat: None,
        lon: None,
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_record_telemetry_creates_bin_and_row() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresBinRepository::new(client);

    let record = repo
        .record_telemetry(RecordTelemetryInput {
            reading: reading("B001", 42.5),
            district_id: Some("colombo".to_string()),
            zone_id: Some("colombo_zone1".to_string()),
        })
        .await
        .unwrap();

    assert!(record.id > 0);
    assert_eq!(record.fill_pct, 42.5);

    let bin = repo.get_bin("B001").await.unwrap().unwrap();
    assert_eq!(bin.device_status, DeviceStatus::Online);
    assert_eq!(bin.last_seen, Some(record.ts));
    assert_eq!(bin.lat, Some(6.93));
    assert_eq!(bin.zone_id.as_deref(), Some("colombo_zone1"));
    assert!(bin.last_emptied.is_none());

    let history = repo.recent_telemetry("B001", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, record.id);
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_record_telemetry_without_position_keeps_last_known() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresBinRepository::new(client);

    repo.record_telemetry(RecordTelemetryInput {
        reading: reading("B001", 10.0),
        district_id: Some("colombo".to_string()),
        zone_id: Some("colombo_zone1".to_string()),
    })
    .await
    .unwrap();

    let mut later = reading("B001", 55.0);
    later.ts += Duration::minutes(60);
    later.lat = None;
    later.lon = None;
    later.emptied = true;

    repo.record_telemetry(RecordTelemetryInput {
        reading: later.clone(),
        district_id: None,
        zone_id: None,
    })
    .await
    .unwrap();

    let bin = repo.get_bin("B001").await.unwrap().unwrap();
    assert_eq!(bin.lat, Some(6.93));
    assert_eq!(bin.lon, Some(79.85));
    assert_eq!(bin.zone_id.as_deref(), Some("colombo_zone1"));
    assert_eq!(bin.last_seen, Some(later.ts));
    assert_eq!(bin.last_emptied, Some(later.ts));

    let history = repo.recent_telemetry("B001", 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].ts, later.ts);
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_upsert_with_half_position_keeps_stored_pair() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresBinRepository::new(client);

    repo.record_telemetry(RecordTelemetryInput {
        reading: reading("B001", 10.0),
        district_id: Some("colombo".to_string()),
        zone_id: Some("colombo_zone1".to_string()),
    })
    .await
    .unwrap();

    repo.upsert_bin(UpsertBinInput {
        bin_id: "B001".to_string(),
        lat: Some(7.29),
        lon: None,
        last_seen: Utc::now(),
        district_id: None,
        zone_id: None,
    })
    .await
    .unwrap();

    let bin = repo.get_bin("B001").await.unwrap().unwrap();
    assert_eq!(bin.lat, Some(6.93));
    assert_eq!(bin.lon, Some(79.85));
    assert_eq!(bin.zone_id.as_deref(), Some("colombo_zone1"));

    let mut input = register_input("B001", "user-1", "Nimal");
    input.lat = None;
    input.lon = Some(80.63);
    let registered = repo.register_bin(input).await.unwrap();
    assert_eq!(registered.lat, Some(6.93));
    assert_eq!(registered.lon, Some(79.85));
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_insert_telemetry_for_unknown_bin() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresBinRepository::new(client);

    let result = repo.insert_telemetry(reading("GHOST", 20.0)).await;
    assert!(matches!(result, Err(DomainError::BinNotFound(id)) if id == "GHOST"));
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_upsert_and_status_updates() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresBinRepository::new(client);
    let now = Utc::now();

    repo.upsert_bin(UpsertBinInput {
        bin_id: "B002".to_string(),
        lat: None,
        lon: None,
        last_seen: now,
        district_id: None,
        zone_id: None,
    })
    .await
    .unwrap();

    let bin = repo.get_bin("B002").await.unwrap().unwrap();
    assert_eq!(bin.device_status, DeviceStatus::Unknown);
    assert!(!bin.sleep_mode);

    repo.update_device_status("B002", DeviceStatus::Offline)
        .await
        .unwrap();
    repo.update_emptied("B002", now).await.unwrap();

    let bin = repo.get_bin("B002").await.unwrap().unwrap();
    assert_eq!(bin.device_status, DeviceStatus::Offline);
    assert!(bin.last_emptied.is_some());
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_register_and_list_owned_bins() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresBinRepository::new(client);

    let bin = repo
        .register_bin(register_input("B010", "user-1", "Nimal"))
        .await
        .unwrap();
    assert_eq!(bin.device_status, DeviceStatus::Offline);
    assert_eq!(bin.owner.as_ref().unwrap().user_id, "user-1");
    assert!(bin.registered_at.is_some());

    // Re-registration moves the bin to a new owner
    let bin = repo
        .register_bin(register_input("B010", "user-2", "Kamala"))
        .await
        .unwrap();
    assert_eq!(bin.owner.unwrap().user_name.as_deref(), Some("Kamala"));

    repo.record_telemetry(RecordTelemetryInput {
        reading: reading("B011", 5.0),
        district_id: None,
        zone_id: None,
    })
    .await
    .unwrap();

    assert_eq!(repo.list_bins().await.unwrap().len(), 2);
    let owned = repo.list_owned_bins().await.unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].bin_id, "B010");
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_register_rejects_invalid_input() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresBinRepository::new(client);

    let result = repo.register_bin(register_input("", "user-1", "Nimal")).await;
    assert!(matches!(result, Err(DomainError::ValidationError(_))));
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_lifecycle_intents() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresBinRepository::new(client);

    for bin_id in ["B001", "B002", "B003"] {
        repo.record_telemetry(RecordTelemetryInput {
            reading: reading(bin_id, 10.0),
            district_id: None,
            zone_id: None,
        })
        .await
        .unwrap();
    }

    let updated = repo
        .apply_lifecycle_intent(&CommandTarget::Broadcast, LifecycleIntent::Sleep)
        .await
        .unwrap();
    assert_eq!(updated, 3);
    assert!(repo.list_bins().await.unwrap().iter().all(|b| b.sleep_mode));

    let requested_at = Utc.with_ymd_and_hms(2025, 12, 12, 5, 0, 0).unwrap();
    let updated = repo
        .apply_lifecycle_intent(
            &CommandTarget::bin("B002"),
            LifecycleIntent::Wake { requested_at },
        )
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let woken = repo.get_bin("B002").await.unwrap().unwrap();
    assert!(!woken.sleep_mode);
    assert_eq!(woken.last_wake_command, Some(requested_at));
    assert!(repo.get_bin("B001").await.unwrap().unwrap().sleep_mode);

    let updated = repo
        .apply_lifecycle_intent(
            &CommandTarget::bin("missing"),
            LifecycleIntent::Wake { requested_at },
        )
        .await
        .unwrap();
    assert_eq!(updated, 0);
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_alert_lifecycle_and_dedup() {
    let (_container, client) = setup_test_db().await;
    let bins = PostgresBinRepository::new(client.clone());
    let alerts = PostgresAlertRepository::new(client);

    bins.record_telemetry(RecordTelemetryInput {
        reading: reading("B001", 95.0),
        district_id: None,
        zone_id: None,
    })
    .await
    .unwrap();

    let input = CreateAlertInput {
        bin_id: "B001".to_string(),
        alert_type: AlertKind::BinFull,
        severity: AlertSeverity::Warning,
        message: "Bin B001 is 95% full".to_string(),
    };

    let first = alerts.raise_alert_once(input.clone()).await.unwrap();
    assert!(first.is_some());
    let second = alerts.raise_alert_once(input.clone()).await.unwrap();
    assert!(second.is_none());

    let open = alerts.list_unresolved_alerts(Some("B001".to_string())).await.unwrap();
    assert_eq!(open.len(), 1);
    let alert_id = open[0].id;

    assert!(alerts.resolve_alert(alert_id).await.unwrap());
    assert!(!alerts.resolve_alert(999_999).await.unwrap());
    assert!(alerts.list_unresolved_alerts(None).await.unwrap().is_empty());

    // Once resolved, the condition can be raised again
    assert!(alerts.raise_alert_once(input).await.unwrap().is_some());

    let reminder = alerts
        .create_alert(CreateAlertInput {
            bin_id: "B001".to_string(),
            alert_type: AlertKind::CollectionReminder,
            severity: AlertSeverity::Info,
            message: "Collection day today!".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(reminder.alert_type, AlertKind::CollectionReminder);
    assert!(!reminder.resolved);
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_alert_for_unknown_bin() {
    let (_container, client) = setup_test_db().await;
    let alerts = PostgresAlertRepository::new(client);

    let result = alerts
        .create_alert(CreateAlertInput {
            bin_id: "GHOST".to_string(),
            alert_type: AlertKind::LowBattery,
            severity: AlertSeverity::Warning,
            message: "low".to_string(),
        })
        .await;
    assert!(matches!(result, Err(DomainError::BinNotFound(_))));
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_command_log_history_and_ack() {
    let (_container, client) = setup_test_db().await;
    let log = PostgresCommandLogRepository::new(client);

    let first = log
        .log_command(CreateCommandLogInput {
            bin_id: "broadcast".to_string(),
            command_type: "wake_up".to_string(),
            payload: json!({"command": "wake_up", "params": {"collection_hours": 6}}),
        })
        .await
        .unwrap();
    let second = log
        .log_command(CreateCommandLogInput {
            bin_id: "broadcast".to_string(),
            command_type: "sleep".to_string(),
            payload: json!({"command": "sleep", "params": {}}),
        })
        .await
        .unwrap();
    assert!(!first.acknowledged);

    let history = log.command_history("broadcast", 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id);
    assert_eq!(history[1].payload["params"]["collection_hours"], 6);

    assert!(log.acknowledge_command(first.id).await.unwrap());
    assert!(!log.acknowledge_command(999_999).await.unwrap());

    let history = log.command_history("broadcast", 1).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_delete_bin_purges_related_rows() {
    let (_container, client) = setup_test_db().await;
    let bins = PostgresBinRepository::new(client.clone());
    let alerts = PostgresAlertRepository::new(client.clone());
    let log = PostgresCommandLogRepository::new(client);

    bins.record_telemetry(RecordTelemetryInput {
        reading: reading("B001", 95.0),
        district_id: None,
        zone_id: None,
    })
    .await
    .unwrap();
    alerts
        .create_alert(CreateAlertInput {
            bin_id: "B001".to_string(),
            alert_type: AlertKind::BinFull,
            severity: AlertSeverity::Warning,
            message: "full".to_string(),
        })
        .await
        .unwrap();
    log.log_command(CreateCommandLogInput {
        bin_id: "B001".to_string(),
        command_type: "get_status".to_string(),
        payload: json!({}),
    })
    .await
    .unwrap();

    assert!(bins.delete_bin("B001").await.unwrap());
    assert!(bins.get_bin("B001").await.unwrap().is_none());
    assert!(bins.recent_telemetry("B001", 10).await.unwrap().is_empty());
    assert!(alerts.list_unresolved_alerts(None).await.unwrap().is_empty());
    assert!(log.command_history("B001", 10).await.unwrap().is_empty());

    assert!(!bins.delete_bin("B001").await.unwrap());
}
