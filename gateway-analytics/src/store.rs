//! Analytic Store Adapter (C8): atomic columnar bulk load and opaque query
//! execution over an embedded, single-threaded SQL engine.

use async_trait::async_trait;
use gateway_core::{AnalyticsError, GatewayClock, GatewayError, GatewayResult, SharedClock};
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;

/// One result row, column name to JSON value.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub serde_json::Map<String, serde_json::Value>);

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn execute(&self, sql: &str, params: Vec<serde_json::Value>) -> GatewayResult<Vec<Row>>;
    async fn load_columnar(&self, file_path: &Path, table: &str, source_url: &str) -> GatewayResult<usize>;
}

enum Command {
    Execute {
        sql: String,
        params: Vec<serde_json::Value>,
        respond: oneshot::Sender<GatewayResult<Vec<Row>>>,
    },
    LoadColumnar {
        file_path: PathBuf,
        table: String,
        source_url: String,
        respond: oneshot::Sender<GatewayResult<usize>>,
    },
}

/// Serializes every query/load onto one dedicated worker thread, since the
/// embedded engine underneath is single-threaded (spec §4.7).
pub struct SqliteAnalyticsStore {
    command_tx: std::sync::mpsc::Sender<Command>,
}

impl SqliteAnalyticsStore {
    pub fn open(path: impl AsRef<Path>, clock: SharedClock) -> GatewayResult<Self> {
        let (command_tx, command_rx) = std::sync::mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<GatewayResult<()>>();
        let path = path.as_ref().to_path_buf();

        std::thread::Builder::new()
            .name("analytics-worker".to_string())
            .spawn(move || worker_loop(path, command_rx, ready_tx, clock))
            .map_err(|e| AnalyticsError::LoadFailed {
                table: "<init>".to_string(),
                reason: format!("failed to spawn analytics worker: {e}"),
            })?;

        ready_rx
            .recv()
            .map_err(|_| AnalyticsError::LoadFailed {
                table: "<init>".to_string(),
                reason: "analytics worker exited before initializing".to_string(),
            })??;

        Ok(Self { command_tx })
    }
}

#[async_trait]
impl AnalyticsStore for SqliteAnalyticsStore {
    async fn execute(&self, sql: &str, params: Vec<serde_json::Value>) -> GatewayResult<Vec<Row>> {
        let (respond, recv) = oneshot::channel();
        self.command_tx
            .send(Command::Execute {
                sql: sql.to_string(),
                params,
                respond,
            })
            .map_err(|_| worker_gone())?;
        recv.await.map_err(|_| worker_gone())?
    }

    async fn load_columnar(&self, file_path: &Path, table: &str, source_url: &str) -> GatewayResult<usize> {
        let (respond, recv) = oneshot::channel();
        self.command_tx
            .send(Command::LoadColumnar {
                file_path: file_path.to_path_buf(),
                table: table.to_string(),
                source_url: source_url.to_string(),
                respond,
            })
            .map_err(|_| worker_gone())?;
        recv.await.map_err(|_| worker_gone())?
    }
}

fn worker_gone() -> GatewayError {
    AnalyticsError::QueryFailed {
        reason: "analytics worker thread is no longer running".to_string(),
    }
    .into()
}

fn worker_loop(
    path: PathBuf,
    command_rx: std::sync::mpsc::Receiver<Command>,
    ready_tx: std::sync::mpsc::Sender<GatewayResult<()>>,
    clock: SharedClock,
) {
    let conn = match Connection::open(&path).and_then(|conn| {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS metadata (
                table_name TEXT PRIMARY KEY,
                last_update TEXT NOT NULL,
                record_count INTEGER NOT NULL,
                source_url TEXT,
                etag TEXT,
                notes TEXT
            )",
        )?;
        Ok(conn)
    }) {
        Ok(conn) => {
            let _ = ready_tx.send(Ok(()));
            conn
        }
        Err(e) => {
            let _ = ready_tx.send(Err(AnalyticsError::LoadFailed {
                table: "<init>".to_string(),
                reason: e.to_string(),
            }
            .into()));
            return;
        }
    };

    let mut conn = conn;
    while let Ok(command) = command_rx.recv() {
        match command {
            Command::Execute { sql, params, respond } => {
                let _ = respond.send(execute_query(&conn, &sql, &params));
            }
            Command::LoadColumnar {
                file_path,
                table,
                source_url,
                respond,
            } => {
                let now = clock.now_utc().to_rfc3339();
                let _ = respond.send(load_columnar_atomic(&mut conn, &file_path, &table, &source_url, &now));
            }
        }
    }
}

fn execute_query(conn: &Connection, sql: &str, params: &[serde_json::Value]) -> GatewayResult<Vec<Row>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| AnalyticsError::QueryFailed { reason: e.to_string() })?;
    let column_names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    let sql_params: Vec<SqlValue> = params.iter().map(json_to_sql).collect();

    let rows = stmt
        .query_map(rusqlite::params_from_iter(sql_params.iter()), |row| {
            let mut map = serde_json::Map::new();
            for (i, name) in column_names.iter().enumerate() {
                let value: SqlValue = row.get(i)?;
                map.insert(name.clone(), sql_to_json(value));
            }
            Ok(Row(map))
        })
        .map_err(|e| AnalyticsError::QueryFailed { reason: e.to_string() })?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| AnalyticsError::QueryFailed { reason: e.to_string() }.into())
}

/// Performs the atomic stage -> rename -> rename -> metadata-upsert protocol
/// from spec §4.7. On any failure the staging table is dropped and the
/// error is propagated; the live table is left untouched.
fn load_columnar_atomic(
    conn: &mut Connection,
    file_path: &Path,
    table: &str,
    source_url: &str,
    now: &str,
) -> GatewayResult<usize> {
    let staging = format!("{table}_staging");
    let old = format!("{table}_old");

    let result = (|| -> GatewayResult<usize> {
        let mut reader = csv::Reader::from_path(file_path).map_err(|e| load_failed(table, e.to_string()))?;
        let headers = reader
            .headers()
            .map_err(|e| load_failed(table, e.to_string()))?
            .clone();

        let tx = conn.transaction().map_err(|e| load_failed(table, e.to_string()))?;
        tx.execute(&format!("DROP TABLE IF EXISTS \"{staging}\""), [])
            .map_err(|e| load_failed(table, e.to_string()))?;

        let columns = headers
            .iter()
            .map(|h| format!("\"{h}\" TEXT"))
            .collect::<Vec<_>>()
            .join(", ");
        tx.execute(&format!("CREATE TABLE \"{staging}\" ({columns})"), [])
            .map_err(|e| load_failed(table, e.to_string()))?;

        let placeholders = headers.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let insert_sql = format!("INSERT INTO \"{staging}\" VALUES ({placeholders})");
        let mut row_count = 0usize;
        for record in reader.records() {
            let record = record.map_err(|e| load_failed(table, e.to_string()))?;
            let values: Vec<&str> = record.iter().collect();
            tx.execute(&insert_sql, rusqlite::params_from_iter(values.iter()))
                .map_err(|e| load_failed(table, e.to_string()))?;
            row_count += 1;
        }

        tx.execute(&format!("DROP TABLE IF EXISTS \"{old}\""), [])
            .map_err(|e| load_failed(table, e.to_string()))?;
        if table_exists(&tx, table).map_err(|e| load_failed(table, e.to_string()))? {
            tx.execute(&format!("ALTER TABLE \"{table}\" RENAME TO \"{old}\""), [])
                .map_err(|e| load_failed(table, e.to_string()))?;
        }
        tx.execute(&format!("ALTER TABLE \"{staging}\" RENAME TO \"{table}\""), [])
            .map_err(|e| load_failed(table, e.to_string()))?;

        tx.execute(
            "INSERT INTO metadata (table_name, last_update, record_count, source_url, etag, notes)
             VALUES (?1, ?2, ?3, ?4, NULL, NULL)
             ON CONFLICT(table_name) DO UPDATE SET
                last_update = excluded.last_update,
                record_count = excluded.record_count,
                source_url = excluded.source_url",
            rusqlite::params![table, now, row_count as i64, source_url],
        )
        .map_err(|e| load_failed(table, e.to_string()))?;

        tx.commit().map_err(|e| load_failed(table, e.to_string()))?;
        Ok(row_count)
    })();

    if result.is_err() {
        let _ = conn.execute(&format!("DROP TABLE IF EXISTS \"{staging}\""), []);
    }
    result
}

fn table_exists(conn: &rusqlite::Transaction, table: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        rusqlite::params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn load_failed(table: &str, reason: String) -> GatewayError {
    AnalyticsError::LoadFailed {
        table: table.to_string(),
        reason,
    }
    .into()
}

fn json_to_sql(value: &serde_json::Value) -> SqlValue {
    match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(b) => SqlValue::Integer(*b as i64),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        serde_json::Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(value: SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Integer(i) => serde_json::Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        SqlValue::Text(s) => serde_json::Value::String(s),
        SqlValue::Blob(b) => serde_json::Value::String(hex::encode(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::system_clock;
    use std::io::Write;

    fn store() -> (SqliteAnalyticsStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteAnalyticsStore::open(dir.path().join("analytics.db"), system_clock()).unwrap();
        (store, dir)
    }

    fn write_csv(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn load_then_query_round_trips() {
        let (store, dir) = store();
        let csv_path = write_csv(&dir, "entities.csv", "siren,name\n123456789,Acme\n987654321,Beta\n");

        let loaded = store.load_columnar(&csv_path, "entities", "file://entities.csv").await.unwrap();
        assert_eq!(loaded, 2);

        let rows = store.execute("SELECT siren, name FROM entities ORDER BY siren", vec![]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0.get("siren").unwrap(), "123456789");
    }

    #[tokio::test]
    async fn reload_atomically_replaces_prior_data() {
        let (store, dir) = store();
        let first = write_csv(&dir, "first.csv", "siren\n111111111\n");
        let second = write_csv(&dir, "second.csv", "siren\n222222222\n333333333\n");

        store.load_columnar(&first, "entities", "file://first.csv").await.unwrap();
        let count = store.load_columnar(&second, "entities", "file://second.csv").await.unwrap();
        assert_eq!(count, 2);

        let rows = store.execute("SELECT siren FROM entities ORDER BY siren", vec![]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0.get("siren").unwrap(), "222222222");
    }

    #[tokio::test]
    async fn metadata_row_reflects_last_load() {
        let (store, dir) = store();
        let csv_path = write_csv(&dir, "entities.csv", "siren\n111111111\n");
        store.load_columnar(&csv_path, "entities", "file://entities.csv").await.unwrap();

        let rows = store
            .execute(
                "SELECT record_count, source_url FROM metadata WHERE table_name = ?1",
                vec![serde_json::json!("entities")],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.get("record_count").unwrap(), &serde_json::json!(1));
        assert_eq!(rows[0].0.get("source_url").unwrap(), "file://entities.csv");
    }

    #[tokio::test]
    async fn bad_csv_leaves_existing_table_untouched() {
        let (store, dir) = store();
        let good = write_csv(&dir, "good.csv", "siren\n111111111\n");
        store.load_columnar(&good, "entities", "file://good.csv").await.unwrap();

        let missing = dir.path().join("missing.csv");
        let err = store.load_columnar(&missing, "entities", "file://missing.csv").await;
        assert!(err.is_err());

        let rows = store.execute("SELECT siren FROM entities", vec![]).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
