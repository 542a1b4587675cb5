//! End-to-end catalog tests against a real SQLite database: the ingestion
//! pipeline writing through [`SqliteStore`] and the lookups reading back.

use std::sync::Arc;
use std::time::Duration;

use printcode::config::Config;
use printcode::ingest::import_table;
use printcode::search::{lookup_dip_switches, search_error_codes};
use printcode::source::{read_bytes, SourceFormat};
use printcode::sqlite_store::SqliteStore;
use printcode::{db, migrate};
use printcode_core::ingest::{IngestPipeline, IngestStatus, ModelStatus};
use printcode_core::models::SheetKind;
use printcode_core::store::{CatalogStore, ErrorCodeQuery};
use tempfile::TempDir;

fn test_config(tmp: &TempDir) -> Config {
    let toml_str = format!(
        r#"
[db]
path = "{}/data/pcode.sqlite"

[models]
vendor_prefixes = ["Konica Minolta"]

[models.aliases]
C6085 = "C6100"
C4070 = "C4080"
"#,
        tmp.path().display()
    );
    toml::from_str(&toml_str).unwrap()
}

async fn setup(tmp: &TempDir) -> (Config, SqliteStore, IngestPipeline) {
    let config = test_config(tmp);
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    let store = SqliteStore::new(pool);
    store.register_printer("C6100").await.unwrap();
    store.register_printer("C4080").await.unwrap();
    let pipeline = IngestPipeline::new(Arc::new(config.resolver().unwrap()));
    (config, store, pipeline)
}

async fn import_csv(
    store: &SqliteStore,
    pipeline: &IngestPipeline,
    kind: SheetKind,
    csv: &str,
    models: &[&str],
) -> printcode::ingest::ImportOutcome {
    let table = read_bytes(csv.as_bytes(), SourceFormat::Csv).unwrap();
    let models: Vec<String> = models.iter().map(|m| m.to_string()).collect();
    import_table(store, pipeline, kind, &table, &models, false, Duration::from_secs(30))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_batch_isolation_one_bad_row() {
    let tmp = TempDir::new().unwrap();
    let (_cfg, store, pipeline) = setup(&tmp).await;

    let csv = "Code,Cause\nC-1001,a\nC-1002,b\n*,c\nC-1004,d\nC-1005,e\n";
    let out = import_csv(&store, &pipeline, SheetKind::ErrorCodes, csv, &["C6100"]).await;

    assert_eq!(out.report.status, IngestStatus::Committed);
    assert_eq!(out.report.row_errors.len(), 1);
    assert_eq!(out.report.row_errors[0].row, 3);
    assert_eq!(out.report.upserted(), 4);
}

#[tokio::test]
async fn test_model_isolation_missing_target() {
    let tmp = TempDir::new().unwrap();
    let (_cfg, store, pipeline) = setup(&tmp).await;

    let csv = "Code,Cause\nC-1001,a\nC-1002,b\n";
    let out = import_csv(
        &store,
        &pipeline,
        SheetKind::ErrorCodes,
        csv,
        &["C9000", "Konica Minolta C4080"],
    )
    .await;

    assert_eq!(out.report.models[0].status, ModelStatus::NotFound);
    assert_eq!(
        out.report.models[1].status,
        ModelStatus::Ingested { upserted: 2 }
    );
    assert_eq!(out.report.models[1].resolved, "C4080");
}

#[tokio::test]
async fn test_reingest_overwrites_fields() {
    let tmp = TempDir::new().unwrap();
    let (cfg, store, pipeline) = setup(&tmp).await;
    let resolver = cfg.resolver().unwrap();

    import_csv(
        &store,
        &pipeline,
        SheetKind::ErrorCodes,
        "Code,Cause,Solution\nC-0202,Old cause,Old fix\n",
        &["C6100"],
    )
    .await;
    import_csv(
        &store,
        &pipeline,
        SheetKind::ErrorCodes,
        "Code,Cause\nC-0202,New cause\n",
        &["C6100"],
    )
    .await;

    let found = search_error_codes(&store, &resolver, "C6100", "0202", true, 10)
        .await
        .unwrap();
    assert_eq!(found.results.len(), 1);
    let rec = &found.results[0].error.record;
    assert_eq!(rec.cause.as_deref(), Some("New cause"));
    // Absent column overwrites the previous value
    assert_eq!(rec.solution, None);
}

#[tokio::test]
async fn test_alias_targets_share_dip_switches() {
    let tmp = TempDir::new().unwrap();
    let (cfg, store, pipeline) = setup(&tmp).await;
    let resolver = cfg.resolver().unwrap();

    let csv = "Switch,Bit,Function,Setting 0,Setting 1,Default\n1,0,Tray lock,Off,On,0\n1.0,1,Duplex,Off,On,1\n";
    let out = import_csv(&store, &pipeline, SheetKind::DipSwitches, csv, &["C6085", "C6100"]).await;

    assert!(out.success);
    assert_eq!(
        out.report.models[1].status,
        ModelStatus::Duplicate {
            of: "C6085".to_string()
        }
    );

    let via_alias = lookup_dip_switches(&store, &resolver, "C6085", None, None)
        .await
        .unwrap();
    let direct = lookup_dip_switches(&store, &resolver, "C6100", None, None)
        .await
        .unwrap();
    assert_eq!(via_alias.results.len(), 2);
    assert_eq!(via_alias.results, direct.results);
}

#[tokio::test]
async fn test_search_numeric_and_alphanumeric() {
    let tmp = TempDir::new().unwrap();
    let (cfg, store, pipeline) = setup(&tmp).await;
    let resolver = cfg.resolver().unwrap();

    let csv = "Code,Cause\n C-0202 ,a\nC-2020,b\nC-240,c\nJ-0202,d\n";
    import_csv(&store, &pipeline, SheetKind::ErrorCodes, csv, &["C6100"]).await;

    let numeric = search_error_codes(&store, &resolver, "C6100", "202", true, 10)
        .await
        .unwrap();
    let codes: Vec<&str> = numeric
        .results
        .iter()
        .map(|h| h.error.record.code.as_str())
        .collect();
    assert_eq!(codes, vec!["C-0202", "J-0202"]);

    let alnum = search_error_codes(&store, &resolver, "C6085", "c-240", true, 10)
        .await
        .unwrap();
    assert_eq!(alnum.results.len(), 1);
    assert_eq!(alnum.results[0].error.record.code, "C-240");
}

#[tokio::test]
async fn test_import_timeout_rolls_back_then_next_import_commits() {
    let tmp = TempDir::new().unwrap();
    let (_cfg, store, pipeline) = setup(&tmp).await;

    let mut csv = String::from("Code,Cause\n");
    for i in 0..20_000 {
        csv.push_str(&format!("C-{:05},cause {}\n", i, i));
    }
    let table = read_bytes(csv.as_bytes(), SourceFormat::Csv).unwrap();
    let models = vec!["C6100".to_string()];
    let out = import_table(
        &store,
        &pipeline,
        SheetKind::ErrorCodes,
        &table,
        &models,
        false,
        Duration::from_millis(50),
    )
    .await
    .unwrap();

    assert!(!out.success);
    assert_eq!(
        out.report.status,
        IngestStatus::Failed {
            cause: "timed out after 50ms".to_string()
        }
    );

    let all = ErrorCodeQuery {
        model: "C6100",
        key: None,
        limit: None,
    };
    assert!(store.query_error_codes(&all).await.unwrap().is_empty());

    // The dropped transaction must not hold the write lock
    let out = import_csv(
        &store,
        &pipeline,
        SheetKind::ErrorCodes,
        "Code,Cause\nC-0202,Fuser open\n",
        &["C6100"],
    )
    .await;
    assert_eq!(out.report.status, IngestStatus::Committed);
    assert_eq!(store.query_error_codes(&all).await.unwrap().len(), 1);
}
