use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Canonical printer models
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS printers (
            id TEXT PRIMARY KEY,
            model_name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Error codes; digits_key/alnum_key are derived from code at ingestion
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS error_codes (
            printer_id TEXT NOT NULL,
            code TEXT NOT NULL,
            digits_key TEXT NOT NULL,
            alnum_key TEXT NOT NULL,
            classification TEXT,
            cause TEXT,
            measures TEXT,
            solution TEXT,
            estimated_abnormal_parts TEXT,
            correction TEXT,
            faulty_part_isolation TEXT,
            note TEXT,
            PRIMARY KEY (printer_id, code),
            FOREIGN KEY (printer_id) REFERENCES printers(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dip_switches (
            model_name TEXT NOT NULL,
            switch_number INTEGER NOT NULL,
            bit_number INTEGER NOT NULL,
            function_name TEXT,
            setting_0 TEXT,
            setting_1 TEXT,
            default_val TEXT CHECK (default_val IS NULL OR default_val IN ('0', '1')),
            PRIMARY KEY (model_name, switch_number, bit_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_error_codes_digits ON error_codes(printer_id, digits_key)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_error_codes_alnum ON error_codes(printer_id, alnum_key)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
