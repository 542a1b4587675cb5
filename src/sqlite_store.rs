//! SQLite-backed [`CatalogStore`] implementation.
//!
//! Writes are single `INSERT … ON CONFLICT … DO UPDATE` statements keyed by
//! the table's primary key, so concurrent writers cannot lose updates
//! through a read-then-write gap. A [`SqliteTx`] wraps a `sqlx`
//! transaction; dropping it without commit rolls it back.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use printcode_core::matcher::{CodeKeys, SearchKey};
use printcode_core::models::{
    DipSwitchRecord, ErrorCodeRecord, Printer, StoredDipSwitch, StoredErrorCode,
};
use printcode_core::store::{CatalogStore, CatalogTx, DipSwitchQuery, ErrorCodeQuery};

const UPSERT_ERROR_CODE: &str = r#"
    INSERT INTO error_codes (
        printer_id, code, digits_key, alnum_key, classification, cause, measures,
        solution, estimated_abnormal_parts, correction, faulty_part_isolation, note
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(printer_id, code) DO UPDATE SET
        digits_key = excluded.digits_key,
        alnum_key = excluded.alnum_key,
        classification = excluded.classification,
        cause = excluded.cause,
        measures = excluded.measures,
        solution = excluded.solution,
        estimated_abnormal_parts = excluded.estimated_abnormal_parts,
        correction = excluded.correction,
        faulty_part_isolation = excluded.faulty_part_isolation,
        note = excluded.note
"#;

const UPSERT_DIP_SWITCH: &str = r#"
    INSERT INTO dip_switches (
        model_name, switch_number, bit_number, function_name, setting_0, setting_1, default_val
    )
    VALUES (?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(model_name, switch_number, bit_number) DO UPDATE SET
        function_name = excluded.function_name,
        setting_0 = excluded.setting_0,
        setting_1 = excluded.setting_1,
        default_val = excluded.default_val
"#;

/// SQLite implementation of the [`CatalogStore`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// An open SQLite write transaction.
pub struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

fn printer_from_row(row: &SqliteRow) -> Printer {
    Printer {
        id: row.get("id"),
        model_name: row.get("model_name"),
    }
}

fn error_code_from_row(row: &SqliteRow) -> StoredErrorCode {
    StoredErrorCode {
        printer_id: row.get("printer_id"),
        record: ErrorCodeRecord {
            code: row.get("code"),
            classification: row.get("classification"),
            cause: row.get("cause"),
            measures: row.get("measures"),
            solution: row.get("solution"),
            estimated_abnormal_parts: row.get("estimated_abnormal_parts"),
            correction: row.get("correction"),
            faulty_part_isolation: row.get("faulty_part_isolation"),
            note: row.get("note"),
        },
    }
}

fn dip_switch_from_row(row: &SqliteRow) -> StoredDipSwitch {
    StoredDipSwitch {
        model_name: row.get("model_name"),
        record: DipSwitchRecord {
            switch_number: row.get("switch_number"),
            bit_number: row.get("bit_number"),
            function_name: row.get("function_name"),
            setting_0: row.get("setting_0"),
            setting_1: row.get("setting_1"),
            default_val: row.get("default_val"),
        },
    }
}

#[async_trait]
impl CatalogTx for SqliteTx {
    async fn find_printer(&mut self, model_name: &str) -> Result<Option<Printer>> {
        let row = sqlx::query("SELECT id, model_name FROM printers WHERE model_name = ?")
            .bind(model_name)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(printer_from_row))
    }

    async fn upsert_error_code(&mut self, printer_id: &str, record: &ErrorCodeRecord) -> Result<()> {
        let keys = CodeKeys::for_code(&record.code);
        sqlx::query(UPSERT_ERROR_CODE)
            .bind(printer_id)
            .bind(&record.code)
            .bind(&keys.digits_key)
            .bind(&keys.alnum_key)
            .bind(&record.classification)
            .bind(&record.cause)
            .bind(&record.measures)
            .bind(&record.solution)
            .bind(&record.estimated_abnormal_parts)
            .bind(&record.correction)
            .bind(&record.faulty_part_isolation)
            .bind(&record.note)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn upsert_dip_switch(&mut self, model_name: &str, record: &DipSwitchRecord) -> Result<()> {
        sqlx::query(UPSERT_DIP_SWITCH)
            .bind(model_name)
            .bind(record.switch_number)
            .bind(record.bit_number)
            .bind(&record.function_name)
            .bind(&record.setting_0)
            .bind(&record.setting_1)
            .bind(&record.default_val)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let SqliteTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let SqliteTx { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn CatalogTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTx { tx }))
    }

    async fn find_printer(&self, model_name: &str) -> Result<Option<Printer>> {
        let row = sqlx::query("SELECT id, model_name FROM printers WHERE model_name = ?")
            .bind(model_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(printer_from_row))
    }

    async fn list_printers(&self) -> Result<Vec<Printer>> {
        let rows = sqlx::query("SELECT id, model_name FROM printers ORDER BY model_name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(printer_from_row).collect())
    }

    async fn register_printer(&self, model_name: &str) -> Result<Printer> {
        sqlx::query(
            "INSERT INTO printers (id, model_name) VALUES (?, ?) ON CONFLICT(model_name) DO NOTHING",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(model_name)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id, model_name FROM printers WHERE model_name = ?")
            .bind(model_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(printer_from_row(&row))
    }

    async fn query_error_codes(&self, query: &ErrorCodeQuery<'_>) -> Result<Vec<StoredErrorCode>> {
        let mut sql = String::from(
            r#"
            SELECT e.* FROM error_codes e
            JOIN printers p ON e.printer_id = p.id
            WHERE p.model_name = ?
            "#,
        );

        // Keys hold only alphanumerics, so the prefix needs no LIKE escaping
        match &query.key {
            Some(SearchKey::Digits(_)) => sql.push_str(" AND e.digits_key LIKE ?"),
            Some(SearchKey::Alnum(_)) => sql.push_str(" AND e.alnum_key LIKE ?"),
            None => {}
        }
        sql.push_str(" ORDER BY e.code ASC LIMIT ?");

        let mut q = sqlx::query(&sql).bind(query.model);
        if let Some(key) = &query.key {
            q = q.bind(format!("{}%", key.prefix()));
        }
        let rows = q
            .bind(query.limit.unwrap_or(-1))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(error_code_from_row).collect())
    }

    async fn query_dip_switches(&self, query: &DipSwitchQuery<'_>) -> Result<Vec<StoredDipSwitch>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM dip_switches
            WHERE model_name = ?
              AND (? IS NULL OR switch_number = ?)
              AND (? IS NULL OR bit_number = ?)
            ORDER BY switch_number ASC, bit_number ASC
            "#,
        )
        .bind(query.model)
        .bind(query.switch_number)
        .bind(query.switch_number)
        .bind(query.bit_number)
        .bind(query.bit_number)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(dip_switch_from_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn record(code: &str, cause: Option<&str>) -> ErrorCodeRecord {
        ErrorCodeRecord {
            code: code.to_string(),
            cause: cause.map(str::to_string),
            note: Some("n".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_all_columns() {
        let store = memory_store().await;
        let printer = store.register_printer("C4080").await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.upsert_error_code(&printer.id, &record("C-1", Some("old")))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut changed = record("C-1", None);
        changed.note = None;
        tx.upsert_error_code(&printer.id, &changed).await.unwrap();
        tx.commit().await.unwrap();

        let rows = store
            .query_error_codes(&ErrorCodeQuery {
                model: "C4080",
                key: None,
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.cause, None);
        assert_eq!(rows[0].record.note, None);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = memory_store().await;
        let printer = store.register_printer("C4080").await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.upsert_error_code(&printer.id, &record("C-1", Some("a")))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let rows = store
            .query_error_codes(&ErrorCodeQuery {
                model: "C4080",
                key: None,
                limit: None,
            })
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_prefix_queries_use_derived_keys() {
        let store = memory_store().await;
        let printer = store.register_printer("C4080").await.unwrap();
        let mut tx = store.begin().await.unwrap();
        for c in ["C-0202", "C-2020", "C-240", "c-2401", "J-0303"] {
            tx.upsert_error_code(&printer.id, &record(c, None)).await.unwrap();
        }
        tx.commit().await.unwrap();

        let digits = store
            .query_error_codes(&ErrorCodeQuery {
                model: "C4080",
                key: Some(SearchKey::Digits("202".to_string())),
                limit: None,
            })
            .await
            .unwrap();
        let got: Vec<&str> = digits.iter().map(|r| r.record.code.as_str()).collect();
        assert_eq!(got, vec!["C-0202", "C-2020"]);

        let alnum = store
            .query_error_codes(&ErrorCodeQuery {
                model: "C4080",
                key: Some(SearchKey::Alnum("C240".to_string())),
                limit: Some(10),
            })
            .await
            .unwrap();
        let got: Vec<&str> = alnum.iter().map(|r| r.record.code.as_str()).collect();
        assert_eq!(got, vec!["C-240", "c-2401"]);
    }

    #[tokio::test]
    async fn test_dip_switch_filters() {
        let store = memory_store().await;
        let mut tx = store.begin().await.unwrap();
        for (sw, bit) in [(1, 0), (1, 1), (2, 0)] {
            let rec = DipSwitchRecord {
                switch_number: sw,
                bit_number: bit,
                default_val: Some("0".to_string()),
                ..Default::default()
            };
            tx.upsert_dip_switch("C6100", &rec).await.unwrap();
        }
        tx.commit().await.unwrap();

        let all = store
            .query_dip_switches(&DipSwitchQuery {
                model: "C6100",
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let sw1 = store
            .query_dip_switches(&DipSwitchQuery {
                model: "C6100",
                switch_number: Some(1),
                bit_number: None,
            })
            .await
            .unwrap();
        assert_eq!(sw1.len(), 2);

        let one = store
            .query_dip_switches(&DipSwitchQuery {
                model: "C6100",
                switch_number: Some(2),
                bit_number: Some(0),
            })
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
    }
}
