//! Embedded SQL engine for analysing generated datasets.
//!
//! RULE: Only store.rs talks to the database.
//! Analysis pipelines hand it SQL text; they never open connections.
//!
//! Everything lives in an in-memory database that is dropped with the
//! store. CSV files are loaded with per-column type inference so numeric
//! columns compare and aggregate as numbers.

use crate::error::{GenError, GenResult};
use rusqlite::{params_from_iter, types::Value, Connection};
use std::{fs, io, path::Path};

/// Column names plus every row of a query, in result order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Storage class inferred for a loaded CSV column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAffinity {
    Integer,
    Real,
    Text,
}

impl ColumnAffinity {
    fn sql_type(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }

    /// Narrowest affinity holding every non-empty value.
    pub fn infer<'a>(values: impl Iterator<Item = &'a str>) -> Self {
        let mut affinity = Self::Integer;
        let mut seen_any = false;
        for v in values.filter(|v| !v.is_empty()) {
            seen_any = true;
            if affinity == Self::Integer && v.parse::<i64>().is_err() {
                affinity = Self::Real;
            }
            // "nan" and "inf" parse as f64 but are text in a CSV
            if affinity == Self::Real && !v.parse::<f64>().is_ok_and(f64::is_finite) {
                return Self::Text;
            }
        }
        if seen_any {
            affinity
        } else {
            Self::Text
        }
    }

    fn convert(&self, raw: &str) -> Value {
        if raw.is_empty() {
            return Value::Null;
        }
        match self {
            Self::Integer => raw.parse().map(Value::Integer).unwrap_or(Value::Null),
            Self::Real => raw.parse().map(Value::Real).unwrap_or(Value::Null),
            Self::Text => Value::Text(raw.to_string()),
        }
    }
}

pub struct AnalysisStore {
    conn: Connection,
}

impl AnalysisStore {
    /// Open a fresh in-memory database.
    pub fn in_memory() -> GenResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    // ── Loading ────────────────────────────────────────────────

    /// Create (or replace) `table` from the CSV file at `path`.
    /// Returns the number of rows loaded.
    pub fn load_csv(&self, table: &str, path: &Path) -> GenResult<usize> {
        let file = fs::File::open(path)?;
        let loaded = self.load_csv_reader(table, io::BufReader::new(file))?;
        log::info!("store: loaded {loaded} rows from {} into {table}", path.display());
        Ok(loaded)
    }

    pub fn load_csv_reader<R: io::Read>(&self, table: &str, reader: R) -> GenResult<usize> {
        let table = quote_identifier(table)?;
        let mut csv = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers: Vec<String> = csv.headers()?.iter().map(str::to_string).collect();
        let columns = headers
            .iter()
            .map(|h| quote_identifier(h))
            .collect::<GenResult<Vec<_>>>()?;
        let records = csv.records().collect::<Result<Vec<_>, _>>()?;

        let affinities: Vec<ColumnAffinity> = (0..columns.len())
            .map(|i| ColumnAffinity::infer(records.iter().map(|r| r.get(i).unwrap_or(""))))
            .collect();

        let column_defs = columns
            .iter()
            .zip(&affinities)
            .map(|(c, a)| format!("{c} {}", a.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({column_defs});"
        ))?;

        let placeholders = vec!["?"; columns.len()].join(", ");
        let insert = format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        );
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&insert)?;
            for record in &records {
                let values = affinities
                    .iter()
                    .enumerate()
                    .map(|(i, a)| a.convert(record.get(i).unwrap_or("")));
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    // ── Running SQL ────────────────────────────────────────────

    /// Run a script of one or more statements, discarding any results.
    pub fn execute_script(&self, sql: &str) -> GenResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run a single statement and collect every row.
    pub fn query(&self, sql: &str) -> GenResult<QueryResult> {
        let sql = sql.trim().trim_end_matches(';').trim_end();
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<Result<Vec<_>, _>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QueryResult { columns, rows })
    }

    pub fn run_query_file(&self, path: &Path) -> GenResult<QueryResult> {
        let sql = read_sql_file(path)?;
        log::debug!("store: running query {}", path.display());
        self.query(&sql)
    }

    // ── Introspection ──────────────────────────────────────────

    pub fn table_exists(&self, name: &str) -> GenResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn select_all(&self, table: &str) -> GenResult<QueryResult> {
        if !self.table_exists(table)? {
            return Err(GenError::MissingTable {
                name: table.to_string(),
            });
        }
        self.query(&format!("SELECT * FROM {}", quote_identifier(table)?))
    }

    pub fn row_count(&self, table: &str) -> GenResult<i64> {
        if !self.table_exists(table)? {
            return Err(GenError::MissingTable {
                name: table.to_string(),
            });
        }
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)?),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Read a SQL text file, rejecting missing or blank files.
pub fn read_sql_file(path: &Path) -> GenResult<String> {
    let sql = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => GenError::SqlFileNotFound {
            path: path.display().to_string(),
        },
        _ => GenError::Io(e),
    })?;
    if sql.trim().is_empty() {
        return Err(GenError::EmptySql {
            path: path.display().to_string(),
        });
    }
    Ok(sql)
}

/// Quote a plain `[A-Za-z_][A-Za-z0-9_]*` identifier; anything else is rejected.
fn quote_identifier(name: &str) -> GenResult<String> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(GenError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}
