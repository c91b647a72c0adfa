//! Live database schema inspection.
//!
//! Verified schema beats guessed field names: the inspector connects to the
//! project's database, caches the schema for a short TTL, and renders a
//! compact tree the agent can read before writing SQL. Every identifier that
//! reaches an engine is validated and engine-quoted; nothing user-supplied
//! is ever interpolated raw.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mysql_async::prelude::Queryable;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{DB_MAX_TABLES, DB_SAMPLE_ROWS, DB_SCHEMA_CACHE_TTL};
use crate::error::{ChainguardError, Result};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,127}$").unwrap());

/// Accepts only `[A-Za-z_][A-Za-z0-9_]*`, at most 128 characters.
pub fn validate_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Validate and quote an identifier for the given engine.
pub fn quote_identifier(name: &str, engine: DbEngine) -> Result<String> {
    if !validate_identifier(name) {
        return Err(ChainguardError::InvalidInput(format!(
            "invalid identifier: {}",
            name
        )));
    }
    Ok(match engine {
        DbEngine::Postgres => format!("\"{}\"", name),
        DbEngine::Mysql | DbEngine::Sqlite => format!("`{}`", name),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbEngine {
    Mysql,
    Postgres,
    Sqlite,
}

impl DbEngine {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Some(DbEngine::Mysql),
            "postgres" | "postgresql" => Some(DbEngine::Postgres),
            "sqlite" | "sqlite3" => Some(DbEngine::Sqlite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DbEngine::Mysql => "mysql",
            DbEngine::Postgres => "postgres",
            DbEngine::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub engine: DbEngine,
}

#[derive(Debug, Clone, Default)]
pub struct ColumnInfo {
    pub name: String,
    pub col_type: String,
    pub nullable: bool,
    /// `PRI`, `UNI` or empty.
    pub key: String,
    pub default_value: Option<String>,
    pub extra: String,
    /// `table.column` when this column references another table.
    pub fk_ref: String,
}

#[derive(Debug, Clone, Default)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub row_count: u64,
    pub primary_key: Vec<String>,
    pub foreign_keys: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct SchemaInfo {
    pub database: String,
    pub engine: DbEngine,
    pub version: String,
    pub tables: BTreeMap<String, TableInfo>,
    pub cached_at: Instant,
}

/// Per-project inspector holding at most one active connection config and
/// one cached schema.
pub struct DbInspector {
    config: Option<DbConfig>,
    schema: Option<SchemaInfo>,
    ttl: Duration,
}

impl Default for DbInspector {
    fn default() -> Self {
        Self::new(DB_SCHEMA_CACHE_TTL)
    }
}

impl DbInspector {
    pub fn new(ttl: Duration) -> Self {
        Self {
            config: None,
            schema: None,
            ttl,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.config.is_some()
    }

    pub fn engine(&self) -> Option<DbEngine> {
        self.config.as_ref().map(|c| c.engine)
    }

    /// Probe the connection and remember the config. Credentials stay in
    /// memory only.
    pub async fn connect(&mut self, config: DbConfig) -> Result<String> {
        let version = match config.engine {
            DbEngine::Mysql => probe_mysql(&config).await?,
            DbEngine::Postgres => probe_postgres(&config).await?,
            DbEngine::Sqlite => probe_sqlite(&config).await?,
        };
        let message = format!(
            "connected to {} ({} {})",
            config.database,
            config.engine.as_str(),
            version
        );
        self.config = Some(config);
        self.schema = None;
        Ok(message)
    }

    /// Fetch the schema, honoring the cache unless `force_refresh`.
    pub async fn get_schema(&mut self, force_refresh: bool) -> Result<SchemaInfo> {
        let config = self
            .config
            .clone()
            .ok_or_else(|| ChainguardError::Db("not connected (use db_connect)".to_string()))?;

        if !force_refresh {
            if let Some(schema) = &self.schema {
                if schema.cached_at.elapsed() < self.ttl {
                    return Ok(schema.clone());
                }
            }
        }

        let schema = match config.engine {
            DbEngine::Mysql => fetch_mysql_schema(&config).await?,
            DbEngine::Postgres => fetch_postgres_schema(&config).await?,
            DbEngine::Sqlite => fetch_sqlite_schema(&config).await?,
        };
        tracing::info!(
            database = %schema.database,
            tables = schema.tables.len(),
            "Schema loaded"
        );
        self.schema = Some(schema.clone());
        Ok(schema)
    }

    /// Seconds the cached schema has been sitting, if any.
    pub fn cache_age(&self) -> Option<u64> {
        self.schema.as_ref().map(|s| s.cached_at.elapsed().as_secs())
    }

    /// Detailed render of one table, optionally with sample rows.
    pub async fn table_details(&mut self, table: &str, sample: bool) -> Result<String> {
        let schema = self.get_schema(false).await?;
        let info = schema
            .tables
            .get(table)
            .ok_or_else(|| ChainguardError::Db(format!("unknown table: {}", table)))?;

        let mut lines = vec![
            format!("## {}", info.name),
            format!("Rows: ~{}", info.row_count),
            String::new(),
            "### Columns".to_string(),
        ];
        for col in &info.columns {
            lines.push(format!("- {}: {}{}", col.name, col.col_type, column_flags(col)));
        }

        if !info.foreign_keys.is_empty() {
            lines.push(String::new());
            lines.push("### Foreign Keys".to_string());
            for (col, target) in &info.foreign_keys {
                lines.push(format!("- {} -> {}", col, target));
            }
        }

        if sample {
            let config = self
                .config
                .clone()
                .ok_or_else(|| ChainguardError::Db("not connected".to_string()))?;
            let rows = sample_rows(&config, info).await?;
            if !rows.is_empty() {
                lines.push(String::new());
                lines.push(format!("### Sample Data ({} rows)", rows.len().saturating_sub(2)));
                lines.extend(rows);
            }
        }

        Ok(lines.join("\n"))
    }

    pub fn clear(&mut self) {
        self.config = None;
        self.schema = None;
    }
}

/// Compact tree render: `table (N cols, ~R rows)` with flagged columns.
pub fn format_schema(schema: &SchemaInfo, ttl: Duration) -> String {
    let mut lines = vec![
        format!(
            "Database: {} ({} {})",
            schema.database,
            schema.engine.as_str(),
            schema.version
        ),
        String::new(),
    ];

    for (name, table) in &schema.tables {
        lines.push(format!(
            "{} ({} cols, ~{} rows)",
            name,
            table.columns.len(),
            table.row_count
        ));
        for (i, col) in table.columns.iter().enumerate() {
            let prefix = if i == table.columns.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            lines.push(format!("{} {}: {}{}", prefix, col.name, col.col_type, column_flags(col)));
        }
        lines.push(String::new());
    }

    let age = schema.cached_at.elapsed().as_secs();
    if age > 0 {
        lines.push(format!("(cache: {}s old, TTL {}s)", age, ttl.as_secs()));
    }
    lines.join("\n")
}

fn column_flags(col: &ColumnInfo) -> String {
    let mut flags = Vec::new();
    if col.key == "PRI" {
        flags.push("PK".to_string());
    }
    let extra = col.extra.to_ascii_lowercase();
    if extra.contains("auto_increment") || extra.contains("serial") {
        flags.push("AUTO".to_string());
    }
    if col.key == "UNI" {
        flags.push("UNIQUE".to_string());
    }
    if !col.fk_ref.is_empty() {
        flags.push(format!("FK->{}", col.fk_ref));
    }
    if !col.nullable {
        flags.push("NOT NULL".to_string());
    }
    if flags.is_empty() {
        String::new()
    } else {
        format!(" {}", flags.join(" "))
    }
}

// =============================================================================
// MySQL
// =============================================================================

fn mysql_opts(config: &DbConfig) -> mysql_async::Opts {
    mysql_async::OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port)
        .user(Some(config.user.clone()))
        .pass(Some(config.password.clone()))
        .db_name(Some(config.database.clone()))
        .into()
}

async fn probe_mysql(config: &DbConfig) -> Result<String> {
    let mut conn = mysql_async::Conn::new(mysql_opts(config))
        .await
        .map_err(|e| ChainguardError::Db(connect_hint(&e.to_string())))?;
    let version: Option<String> = conn
        .query_first("SELECT VERSION()")
        .await
        .map_err(|e| ChainguardError::Db(e.to_string()))?;
    conn.disconnect()
        .await
        .map_err(|e| ChainguardError::Db(e.to_string()))?;
    Ok(version.unwrap_or_default())
}

async fn fetch_mysql_schema(config: &DbConfig) -> Result<SchemaInfo> {
    let mut conn = mysql_async::Conn::new(mysql_opts(config))
        .await
        .map_err(|e| ChainguardError::Db(connect_hint(&e.to_string())))?;

    let version: Option<String> = conn
        .query_first("SELECT VERSION()")
        .await
        .map_err(|e| ChainguardError::Db(e.to_string()))?;

    let table_names: Vec<String> = conn
        .query("SHOW TABLES")
        .await
        .map_err(|e| ChainguardError::Db(e.to_string()))?;

    let mut tables = BTreeMap::new();
    for table_name in table_names.into_iter().take(DB_MAX_TABLES) {
        if !validate_identifier(&table_name) {
            tracing::warn!(table = %table_name, "Skipping invalid table name");
            continue;
        }
        let quoted = quote_identifier(&table_name, DbEngine::Mysql)?;
        let mut table = TableInfo {
            name: table_name.clone(),
            ..Default::default()
        };

        let columns: Vec<(String, String, String, String, Option<String>, String)> = conn
            .query(format!("DESCRIBE {}", quoted))
            .await
            .map_err(|e| ChainguardError::Db(e.to_string()))?;
        for (name, col_type, null, key, default_value, extra) in columns {
            let col = ColumnInfo {
                name: name.clone(),
                col_type,
                nullable: null == "YES",
                key: key.clone(),
                default_value,
                extra,
                fk_ref: String::new(),
            };
            if key == "PRI" {
                table.primary_key.push(name);
            }
            table.columns.push(col);
        }

        let count: Option<u64> = conn
            .query_first(format!("SELECT COUNT(*) FROM {}", quoted))
            .await
            .map_err(|e| ChainguardError::Db(e.to_string()))?;
        table.row_count = count.unwrap_or(0);

        let fks: Vec<(String, String, String)> = conn
            .exec(
                "SELECT COLUMN_NAME, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME \
                 FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
                 AND REFERENCED_TABLE_NAME IS NOT NULL",
                (config.database.clone(), table_name.clone()),
            )
            .await
            .map_err(|e| ChainguardError::Db(e.to_string()))?;
        for (col_name, ref_table, ref_col) in fks {
            let target = format!("{}.{}", ref_table, ref_col);
            table.foreign_keys.insert(col_name.clone(), target.clone());
            if let Some(col) = table.columns.iter_mut().find(|c| c.name == col_name) {
                col.fk_ref = target;
            }
        }

        tables.insert(table_name, table);
    }

    conn.disconnect()
        .await
        .map_err(|e| ChainguardError::Db(e.to_string()))?;

    Ok(SchemaInfo {
        database: config.database.clone(),
        engine: DbEngine::Mysql,
        version: version.unwrap_or_default(),
        tables,
        cached_at: Instant::now(),
    })
}

// =============================================================================
// PostgreSQL
// =============================================================================

async fn postgres_client(config: &DbConfig) -> Result<tokio_postgres::Client> {
    let mut pg_config = tokio_postgres::Config::new();
    pg_config
        .host(&config.host)
        .port(config.port)
        .user(&config.user)
        .password(&config.password)
        .dbname(&config.database)
        .connect_timeout(Duration::from_secs(10));

    let (client, connection) = pg_config
        .connect(tokio_postgres::NoTls)
        .await
        .map_err(|e| ChainguardError::Db(connect_hint(&e.to_string())))?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::debug!(error = %err, "Postgres connection closed");
        }
    });
    Ok(client)
}

async fn probe_postgres(config: &DbConfig) -> Result<String> {
    let client = postgres_client(config).await?;
    let row = client
        .query_one("SELECT version()", &[])
        .await
        .map_err(|e| ChainguardError::Db(e.to_string()))?;
    let version: String = row.get(0);
    Ok(version.split_whitespace().nth(1).unwrap_or("").to_string())
}

async fn fetch_postgres_schema(config: &DbConfig) -> Result<SchemaInfo> {
    let client = postgres_client(config).await?;

    let version: String = client
        .query_one("SELECT version()", &[])
        .await
        .map_err(|e| ChainguardError::Db(e.to_string()))?
        .get(0);

    let table_rows = client
        .query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'",
            &[],
        )
        .await
        .map_err(|e| ChainguardError::Db(e.to_string()))?;

    let mut tables = BTreeMap::new();
    for table_row in table_rows.into_iter().take(DB_MAX_TABLES) {
        let table_name: String = table_row.get(0);
        if !validate_identifier(&table_name) {
            tracing::warn!(table = %table_name, "Skipping invalid table name");
            continue;
        }
        let quoted = quote_identifier(&table_name, DbEngine::Postgres)?;
        let mut table = TableInfo {
            name: table_name.clone(),
            ..Default::default()
        };

        let columns = client
            .query(
                "SELECT column_name, data_type, is_nullable, column_default \
                 FROM information_schema.columns \
                 WHERE table_schema = 'public' AND table_name = $1 \
                 ORDER BY ordinal_position",
                &[&table_name],
            )
            .await
            .map_err(|e| ChainguardError::Db(e.to_string()))?;
        for col_row in columns {
            let default_value: Option<String> = col_row.get(3);
            let extra = match &default_value {
                Some(d) if d.contains("nextval") => "serial".to_string(),
                _ => String::new(),
            };
            table.columns.push(ColumnInfo {
                name: col_row.get(0),
                col_type: col_row.get(1),
                nullable: col_row.get::<_, String>(2) == "YES",
                key: String::new(),
                default_value,
                extra,
                fk_ref: String::new(),
            });
        }

        let pk_rows = client
            .query(
                "SELECT a.attname FROM pg_index i \
                 JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
                 WHERE i.indrelid = $1::regclass AND i.indisprimary",
                &[&quoted],
            )
            .await
            .map_err(|e| ChainguardError::Db(e.to_string()))?;
        table.primary_key = pk_rows.iter().map(|r| r.get::<_, String>(0)).collect();
        for col in &mut table.columns {
            if table.primary_key.contains(&col.name) {
                col.key = "PRI".to_string();
            }
        }

        let count_sql = format!("SELECT COUNT(*) FROM {}", quoted);
        let count_row = client
            .query_one(count_sql.as_str(), &[])
            .await
            .map_err(|e| ChainguardError::Db(e.to_string()))?;
        table.row_count = count_row.get::<_, i64>(0).max(0) as u64;

        let fk_rows = client
            .query(
                "SELECT kcu.column_name, ccu.table_name, ccu.column_name \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON tc.constraint_name = kcu.constraint_name \
                 JOIN information_schema.constraint_column_usage ccu \
                   ON ccu.constraint_name = tc.constraint_name \
                 WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_name = $1",
                &[&table_name],
            )
            .await
            .map_err(|e| ChainguardError::Db(e.to_string()))?;
        for fk_row in fk_rows {
            let col_name: String = fk_row.get(0);
            let target = format!(
                "{}.{}",
                fk_row.get::<_, String>(1),
                fk_row.get::<_, String>(2)
            );
            table.foreign_keys.insert(col_name.clone(), target.clone());
            if let Some(col) = table.columns.iter_mut().find(|c| c.name == col_name) {
                col.fk_ref = target;
            }
        }

        tables.insert(table_name, table);
    }

    Ok(SchemaInfo {
        database: config.database.clone(),
        engine: DbEngine::Postgres,
        version: version.split_whitespace().nth(1).unwrap_or("").to_string(),
        tables,
        cached_at: Instant::now(),
    })
}

// =============================================================================
// SQLite
// =============================================================================

async fn probe_sqlite(config: &DbConfig) -> Result<String> {
    let path = config.database.clone();
    if !Path::new(&path).exists() {
        return Err(ChainguardError::Db(format!("SQLite file not found: {}", path)));
    }
    tokio::task::spawn_blocking(move || -> Result<String> {
        let conn =
            rusqlite::Connection::open(&path).map_err(|e| ChainguardError::Db(e.to_string()))?;
        conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))
            .map_err(|e| ChainguardError::Db(e.to_string()))
    })
    .await
    .map_err(|e| ChainguardError::Internal(format!("sqlite probe task failed: {}", e)))?
}

async fn fetch_sqlite_schema(config: &DbConfig) -> Result<SchemaInfo> {
    let path = config.database.clone();
    let database = config.database.clone();
    tokio::task::spawn_blocking(move || -> Result<SchemaInfo> {
        let conn =
            rusqlite::Connection::open(&path).map_err(|e| ChainguardError::Db(e.to_string()))?;

        let version: String = conn
            .query_row("SELECT sqlite_version()", [], |row| row.get(0))
            .map_err(|e| ChainguardError::Db(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            )
            .map_err(|e| ChainguardError::Db(e.to_string()))?;
        let table_names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| ChainguardError::Db(e.to_string()))?
            .filter_map(|r| r.ok())
            .collect();

        let mut tables = BTreeMap::new();
        for table_name in table_names.into_iter().take(DB_MAX_TABLES) {
            if !validate_identifier(&table_name) {
                tracing::warn!(table = %table_name, "Skipping invalid table name");
                continue;
            }
            let quoted = quote_identifier(&table_name, DbEngine::Sqlite)?;
            let mut table = TableInfo {
                name: table_name.clone(),
                ..Default::default()
            };

            let mut col_stmt = conn
                .prepare(&format!("PRAGMA table_info({})", quoted))
                .map_err(|e| ChainguardError::Db(e.to_string()))?;
            let columns = col_stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                })
                .map_err(|e| ChainguardError::Db(e.to_string()))?;
            for col in columns.filter_map(|r| r.ok()) {
                let (name, col_type, notnull, default_value, pk) = col;
                let info = ColumnInfo {
                    name: name.clone(),
                    col_type,
                    nullable: notnull == 0,
                    key: if pk > 0 { "PRI".to_string() } else { String::new() },
                    default_value,
                    extra: String::new(),
                    fk_ref: String::new(),
                };
                if pk > 0 {
                    table.primary_key.push(name);
                }
                table.columns.push(info);
            }

            table.row_count = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", quoted), [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|c| c.max(0) as u64)
                .unwrap_or(0);

            let mut fk_stmt = conn
                .prepare(&format!("PRAGMA foreign_key_list({})", quoted))
                .map_err(|e| ChainguardError::Db(e.to_string()))?;
            let fks = fk_stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })
                .map_err(|e| ChainguardError::Db(e.to_string()))?;
            for fk in fks.filter_map(|r| r.ok()) {
                let (ref_table, from_col, to_col) = fk;
                let target = format!("{}.{}", ref_table, to_col.unwrap_or_else(|| "id".into()));
                table.foreign_keys.insert(from_col.clone(), target.clone());
                if let Some(col) = table.columns.iter_mut().find(|c| c.name == from_col) {
                    col.fk_ref = target;
                }
            }

            tables.insert(table_name, table);
        }

        Ok(SchemaInfo {
            database,
            engine: DbEngine::Sqlite,
            version,
            tables,
            cached_at: Instant::now(),
        })
    })
    .await
    .map_err(|e| ChainguardError::Internal(format!("sqlite schema task failed: {}", e)))?
}

// =============================================================================
// Sample rows
// =============================================================================

async fn sample_rows(config: &DbConfig, table: &TableInfo) -> Result<Vec<String>> {
    let header: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    let mut lines = vec![header.join(" | ")];
    lines.push("-".repeat(lines[0].len().min(78)));

    let quoted_table = quote_identifier(&table.name, config.engine)?;
    match config.engine {
        DbEngine::Mysql => {
            let mut conn = mysql_async::Conn::new(mysql_opts(config))
                .await
                .map_err(|e| ChainguardError::Db(e.to_string()))?;
            let rows: Vec<mysql_async::Row> = conn
                .query(format!(
                    "SELECT * FROM {} LIMIT {}",
                    quoted_table, DB_SAMPLE_ROWS
                ))
                .await
                .map_err(|e| ChainguardError::Db(e.to_string()))?;
            for row in rows {
                let values: Vec<String> = (0..row.len())
                    .map(|i| {
                        row.as_ref(i)
                            .map(|v| truncate_cell(&v.as_sql(true)))
                            .unwrap_or_else(|| "NULL".to_string())
                    })
                    .collect();
                lines.push(values.join(" | "));
            }
            conn.disconnect()
                .await
                .map_err(|e| ChainguardError::Db(e.to_string()))?;
        }
        DbEngine::Postgres => {
            let client = postgres_client(config).await?;
            // Cast every column to text so arbitrary types render uniformly.
            let select: Vec<String> = table
                .columns
                .iter()
                .map(|c| {
                    quote_identifier(&c.name, DbEngine::Postgres).map(|q| format!("{}::text", q))
                })
                .collect::<Result<_>>()?;
            let sample_sql = format!(
                "SELECT {} FROM {} LIMIT {}",
                select.join(", "),
                quoted_table,
                DB_SAMPLE_ROWS
            );
            let rows = client
                .query(sample_sql.as_str(), &[])
                .await
                .map_err(|e| ChainguardError::Db(e.to_string()))?;
            for row in rows {
                let values: Vec<String> = (0..row.len())
                    .map(|i| {
                        row.get::<_, Option<String>>(i)
                            .map(|v| truncate_cell(&v))
                            .unwrap_or_else(|| "NULL".to_string())
                    })
                    .collect();
                lines.push(values.join(" | "));
            }
        }
        DbEngine::Sqlite => {
            let path = config.database.clone();
            let quoted = quoted_table.clone();
            let sampled = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<String>>> {
                let conn = rusqlite::Connection::open(&path)
                    .map_err(|e| ChainguardError::Db(e.to_string()))?;
                let mut stmt = conn
                    .prepare(&format!("SELECT * FROM {} LIMIT {}", quoted, DB_SAMPLE_ROWS))
                    .map_err(|e| ChainguardError::Db(e.to_string()))?;
                let width = stmt.column_count();
                let rows = stmt
                    .query_map([], |row| {
                        let mut values = Vec::with_capacity(width);
                        for i in 0..width {
                            let value = match row.get_ref(i)? {
                                rusqlite::types::ValueRef::Null => "NULL".to_string(),
                                rusqlite::types::ValueRef::Integer(v) => v.to_string(),
                                rusqlite::types::ValueRef::Real(v) => v.to_string(),
                                rusqlite::types::ValueRef::Text(t) => {
                                    String::from_utf8_lossy(t).to_string()
                                }
                                rusqlite::types::ValueRef::Blob(b) => format!("<{}b blob>", b.len()),
                            };
                            values.push(truncate_cell(&value));
                        }
                        Ok(values)
                    })
                    .map_err(|e| ChainguardError::Db(e.to_string()))?
                    .filter_map(|r| r.ok())
                    .collect();
                Ok(rows)
            })
            .await
            .map_err(|e| ChainguardError::Internal(format!("sqlite sample task failed: {}", e)))??;
            for values in sampled {
                lines.push(values.join(" | "));
            }
        }
    }

    if lines.len() == 2 {
        lines.push("(no data)".to_string());
    }
    Ok(lines)
}

fn truncate_cell(value: &str) -> String {
    if value.chars().count() > 20 {
        value.chars().take(20).collect()
    } else {
        value.to_string()
    }
}

/// Hint common connect failures without echoing credentials.
fn connect_hint(error: &str) -> String {
    let lower = error.to_ascii_lowercase();
    if lower.contains("access denied") || lower.contains("authentication failed") {
        format!("{} (check credentials)", error)
    } else if lower.contains("connection refused") || lower.contains("could not connect") {
        format!("{} (check host/port)", error)
    } else {
        error.to_string()
    }
}

// =============================================================================
// Per-project registry
// =============================================================================

/// One inspector per project, created on first use.
#[derive(Default)]
pub struct InspectorRegistry {
    inspectors: Mutex<HashMap<String, Arc<Mutex<DbInspector>>>>,
}

impl InspectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn inspector(&self, project_id: &str) -> Arc<Mutex<DbInspector>> {
        let mut inspectors = self.inspectors.lock().await;
        inspectors
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(DbInspector::default())))
            .clone()
    }

    pub async fn clear(&self, project_id: &str) -> bool {
        let mut inspectors = self.inspectors.lock().await;
        match inspectors.remove(project_id) {
            Some(inspector) => {
                inspector.lock().await.clear();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation_rejects_injection() {
        assert!(validate_identifier("users"));
        assert!(validate_identifier("_migrations_2024"));
        assert!(!validate_identifier("users; DROP TABLE users"));
        assert!(!validate_identifier("users`"));
        assert!(!validate_identifier(""));
        assert!(!validate_identifier("1users"));
        assert!(!validate_identifier(&"a".repeat(129)));
        assert!(validate_identifier(&"a".repeat(128)));
    }

    #[test]
    fn quoting_is_engine_specific() {
        assert_eq!(quote_identifier("users", DbEngine::Mysql).unwrap(), "`users`");
        assert_eq!(
            quote_identifier("users", DbEngine::Postgres).unwrap(),
            "\"users\""
        );
        assert!(quote_identifier("bad name", DbEngine::Mysql).is_err());
    }

    #[test]
    fn engine_parse_accepts_aliases() {
        assert_eq!(DbEngine::parse("postgresql"), Some(DbEngine::Postgres));
        assert_eq!(DbEngine::parse("MariaDB"), Some(DbEngine::Mysql));
        assert_eq!(DbEngine::parse("oracle"), None);
    }

    #[test]
    fn schema_formatter_renders_tree() {
        let mut tables = BTreeMap::new();
        tables.insert(
            "users".to_string(),
            TableInfo {
                name: "users".to_string(),
                columns: vec![
                    ColumnInfo {
                        name: "id".to_string(),
                        col_type: "int".to_string(),
                        nullable: false,
                        key: "PRI".to_string(),
                        extra: "auto_increment".to_string(),
                        ..Default::default()
                    },
                    ColumnInfo {
                        name: "email".to_string(),
                        col_type: "varchar(255)".to_string(),
                        nullable: false,
                        key: "UNI".to_string(),
                        ..Default::default()
                    },
                ],
                row_count: 42,
                primary_key: vec!["id".to_string()],
                foreign_keys: BTreeMap::new(),
            },
        );
        let schema = SchemaInfo {
            database: "app".to_string(),
            engine: DbEngine::Mysql,
            version: "8.0".to_string(),
            tables,
            cached_at: Instant::now(),
        };

        let rendered = format_schema(&schema, DB_SCHEMA_CACHE_TTL);
        assert!(rendered.contains("users (2 cols, ~42 rows)"));
        assert!(rendered.contains("├─ id: int PK AUTO NOT NULL"));
        assert!(rendered.contains("└─ email: varchar(255) UNIQUE NOT NULL"));
    }

    fn seed_sqlite(path: &Path) {
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL
            );
            CREATE TABLE posts (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                title TEXT
            );
            INSERT INTO users (email) VALUES ('a@test'), ('b@test');",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn sqlite_schema_end_to_end() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("app.db");
        seed_sqlite(&db_path);

        let mut inspector = DbInspector::default();
        let message = inspector
            .connect(DbConfig {
                host: String::new(),
                port: 0,
                user: String::new(),
                password: String::new(),
                database: db_path.to_string_lossy().to_string(),
                engine: DbEngine::Sqlite,
            })
            .await
            .unwrap();
        assert!(message.contains("sqlite"));

        let schema = inspector.get_schema(false).await.unwrap();
        assert_eq!(schema.tables.len(), 2);

        let users = &schema.tables["users"];
        assert_eq!(users.row_count, 2);
        assert_eq!(users.primary_key, vec!["id".to_string()]);

        let posts = &schema.tables["posts"];
        assert_eq!(posts.foreign_keys.get("user_id").unwrap(), "users.id");
    }

    #[tokio::test]
    async fn sqlite_schema_is_cached_until_forced() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("app.db");
        seed_sqlite(&db_path);

        let mut inspector = DbInspector::default();
        inspector
            .connect(DbConfig {
                host: String::new(),
                port: 0,
                user: String::new(),
                password: String::new(),
                database: db_path.to_string_lossy().to_string(),
                engine: DbEngine::Sqlite,
            })
            .await
            .unwrap();

        inspector.get_schema(false).await.unwrap();

        // Add a table behind the cache's back; cached result must not see it.
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute_batch("CREATE TABLE extra (id INTEGER PRIMARY KEY);")
            .unwrap();

        let cached = inspector.get_schema(false).await.unwrap();
        assert_eq!(cached.tables.len(), 2);

        let fresh = inspector.get_schema(true).await.unwrap();
        assert_eq!(fresh.tables.len(), 3);
    }

    #[tokio::test]
    async fn table_details_renders_sample() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("app.db");
        seed_sqlite(&db_path);

        let mut inspector = DbInspector::default();
        inspector
            .connect(DbConfig {
                host: String::new(),
                port: 0,
                user: String::new(),
                password: String::new(),
                database: db_path.to_string_lossy().to_string(),
                engine: DbEngine::Sqlite,
            })
            .await
            .unwrap();

        let details = inspector.table_details("users", true).await.unwrap();
        assert!(details.contains("## users"));
        assert!(details.contains("- id: INTEGER PK"));
        assert!(details.contains("a@test"));

        let missing = inspector.table_details("nope", false).await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn missing_sqlite_file_fails_connect() {
        let mut inspector = DbInspector::default();
        let err = inspector
            .connect(DbConfig {
                host: String::new(),
                port: 0,
                user: String::new(),
                password: String::new(),
                database: "/nonexistent/nope.db".to_string(),
                engine: DbEngine::Sqlite,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DB_FAIL");
    }

    #[tokio::test]
    async fn registry_creates_one_inspector_per_project() {
        let registry = InspectorRegistry::new();
        let first = registry.inspector("p1").await;
        let second = registry.inspector("p1").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.clear("p1").await);
        assert!(!registry.clear("p1").await);
    }
}
