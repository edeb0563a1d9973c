use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, RuntimeErr, Statement,
    TransactionTrait, Value,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tally_common::retry::{is_connection_refused, retry, RetryPolicy};
use tally_common::types::{MetricKind, Update};

use crate::error::{Result, StorageError};
use crate::MetricsStorage;

/// Upper bound on opening a connection or taking one from the pool. The
/// driver keeps retrying a refused connection internally until this expires.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

const UPSERT_GAUGE: &str = "INSERT INTO gauges (id, value) VALUES ($1, $2) \
     ON CONFLICT (id) DO UPDATE SET value = excluded.value RETURNING value";
const ADD_COUNTER: &str = "INSERT INTO counters (id, value) VALUES ($1, $2) \
     ON CONFLICT (id) DO UPDATE SET value = counters.value + excluded.value RETURNING value";
const SET_COUNTER: &str = "INSERT INTO counters (id, value) VALUES ($1, $2) \
     ON CONFLICT (id) DO UPDATE SET value = excluded.value RETURNING value";
const GET_GAUGE: &str = "SELECT value FROM gauges WHERE id = $1";
const GET_COUNTER: &str = "SELECT value FROM counters WHERE id = $1";
const ALL_GAUGES: &str = "SELECT id, value FROM gauges ORDER BY id";
const ALL_COUNTERS: &str = "SELECT id, value FROM counters ORDER BY id";

/// Storage backed by the `gauges` and `counters` tables.
///
/// Each call is one unit of work retried on connection-class failures.
/// Counter updates use a single "insert or add" upsert, so concurrent writers
/// never lose increments. Batches run in one transaction.
///
/// Queries use `$N` placeholders, which both PostgreSQL and SQLite accept.
pub struct DbStorage {
    db: DatabaseConnection,
    policy: RetryPolicy,
}

impl DbStorage {
    /// Connects to `dsn` and applies pending migrations.
    pub async fn connect(dsn: &str) -> Result<Self> {
        Self::connect_with(dsn, RetryPolicy::default(), CONNECT_TIMEOUT).await
    }

    /// `timeout` bounds both connecting and pool acquisition, so an
    /// unreachable database fails each attempt quickly enough for `policy`
    /// to apply.
    pub async fn connect_with(dsn: &str, policy: RetryPolicy, timeout: Duration) -> Result<Self> {
        let mut options = ConnectOptions::new(dsn);
        options
            .connect_timeout(timeout)
            .acquire_timeout(timeout)
            .sqlx_logging(false);

        let db = retry(&policy, "connect", StorageError::is_transient, || {
            let options = options.clone();
            async move { Ok::<_, StorageError>(Database::connect(options).await?) }
        })
        .await?;
        Migrator::up(&db, None).await?;
        tracing::info!(backend = ?db.get_database_backend(), "Connected to metrics database");
        Ok(Self { db, policy })
    }

    async fn run<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        retry(&self.policy, op, StorageError::is_transient, f).await
    }
}

async fn upsert_value<C, T>(conn: &C, sql: &str, name: &str, value: Value) -> Result<T>
where
    C: ConnectionTrait,
    T: sea_orm::TryGetable,
{
    let stmt = Statement::from_sql_and_values(
        conn.get_database_backend(),
        sql,
        [Value::from(name), value],
    );
    let row = conn
        .query_one(stmt)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("upsert of '{name}' returned no row")))?;
    Ok(row.try_get("", "value")?)
}

async fn select_value<T>(
    db: &DatabaseConnection,
    sql: &str,
    kind: MetricKind,
    name: &str,
) -> Result<T>
where
    T: sea_orm::TryGetable,
{
    let stmt = Statement::from_sql_and_values(db.get_database_backend(), sql, [Value::from(name)]);
    match db.query_one(stmt).await? {
        Some(row) => Ok(row.try_get("", "value")?),
        None => Err(StorageError::NotRegistered {
            kind,
            name: name.to_string(),
        }),
    }
}

async fn select_all<T>(db: &DatabaseConnection, sql: &str) -> Result<BTreeMap<String, T>>
where
    T: sea_orm::TryGetable,
{
    let rows = db
        .query_all(Statement::from_string(db.get_database_backend(), sql))
        .await?;
    let mut out = BTreeMap::new();
    for row in rows {
        let id: String = row.try_get("", "id")?;
        out.insert(id, row.try_get("", "value")?);
    }
    Ok(out)
}

async fn apply<C: ConnectionTrait>(conn: &C, update: &Update) -> Result<()> {
    match update {
        Update::Counter { name, delta } => {
            upsert_value::<_, i64>(conn, ADD_COUNTER, name, (*delta).into()).await?;
        }
        Update::Gauge { name, value } => {
            upsert_value::<_, f64>(conn, UPSERT_GAUGE, name, (*value).into()).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl MetricsStorage for DbStorage {
    async fn update_gauge(&self, name: &str, value: f64) -> Result<f64> {
        let db = &self.db;
        self.run("update_gauge", move || async move {
            upsert_value(db, UPSERT_GAUGE, name, value.into()).await
        })
        .await
    }

    async fn update_counter(&self, name: &str, delta: i64) -> Result<i64> {
        let db = &self.db;
        self.run("update_counter", move || async move {
            upsert_value(db, ADD_COUNTER, name, delta.into()).await
        })
        .await
    }

    async fn set_counter(&self, name: &str, value: i64) -> Result<i64> {
        let db = &self.db;
        self.run("set_counter", move || async move {
            upsert_value(db, SET_COUNTER, name, value.into()).await
        })
        .await
    }

    async fn get_gauge(&self, name: &str) -> Result<f64> {
        let db = &self.db;
        self.run("get_gauge", move || async move {
            select_value(db, GET_GAUGE, MetricKind::Gauge, name).await
        })
        .await
    }

    async fn get_counter(&self, name: &str) -> Result<i64> {
        let db = &self.db;
        self.run("get_counter", move || async move {
            select_value(db, GET_COUNTER, MetricKind::Counter, name).await
        })
        .await
    }

    async fn get_all_gauges(&self) -> Result<BTreeMap<String, f64>> {
        let db = &self.db;
        self.run("get_all_gauges", move || async move { select_all(db, ALL_GAUGES).await })
            .await
    }

    async fn get_all_counters(&self) -> Result<BTreeMap<String, i64>> {
        let db = &self.db;
        self.run("get_all_counters", move || async move { select_all(db, ALL_COUNTERS).await })
            .await
    }

    /// All records commit together or not at all. On error the transaction
    /// is dropped, which rolls it back.
    async fn insert_batch(&self, batch: &[Update]) -> Result<()> {
        let db = &self.db;
        self.run("insert_batch", move || async move {
            let txn = db.begin().await?;
            for update in batch {
                apply(&txn, update).await?;
            }
            txn.commit().await?;
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        Ok(self.db.ping().await?)
    }
}

/// Connection-class failures: refused connections, pool timeouts (the
/// driver's verdict on a database that keeps refusing) and SQLSTATE class 08
/// (connection exception).
pub fn is_transient(err: &DbErr) -> bool {
    let driver = match err {
        DbErr::ConnectionAcquire(_) => return true,
        DbErr::Conn(e) | DbErr::Exec(e) | DbErr::Query(e) => runtime_is_transient(e),
        _ => false,
    };
    driver || is_connection_refused(err)
}

fn runtime_is_transient(err: &RuntimeErr) -> bool {
    match err {
        RuntimeErr::SqlxError(e) => sqlx_is_transient(e),
        _ => false,
    }
}

fn sqlx_is_transient(err: &sea_orm::sqlx::Error) -> bool {
    use sea_orm::sqlx::Error;
    match err {
        Error::PoolTimedOut => true,
        Error::Io(io) => io.kind() == std::io::ErrorKind::ConnectionRefused,
        Error::Database(db) => db.code().is_some_and(|code| code.starts_with("08")),
        _ => false,
    }
}
