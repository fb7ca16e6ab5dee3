//src/db.rs
use rusqlite::{Connection, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Bumped whenever the table layout changes. Exported snapshots carry it as `dbSchemaVersion`.
pub const DB_SCHEMA_VERSION: i64 = 1;

const DB_FILE_NAME: &str = "liftlog.sqlite";
const APP_DATA_DIR: &str = "liftlog";
const DB_PATH_ENV_VAR: &str = "LIFTLOG_DB_PATH";

/// Coarse classification of [`Error`], used by callers that only need to
/// decide between "show not found", "fix your input" and "storage is broken".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    State,
    Storage,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database connection failed")]
    Connection(#[from] rusqlite::Error),
    #[error("Database transaction failed: {0}")]
    Transaction(rusqlite::Error),
    #[error("Failed to get application data directory")]
    DataDir,
    #[error("I/O error accessing database file")]
    Io(#[from] std::io::Error),
    #[error("Workout not found: ID {0}")]
    WorkoutNotFound(i64),
    #[error("Session not found: ID {0}")]
    SessionNotFound(i64),
    #[error("Session set not found: ID {0}")]
    SessionSetNotFound(i64),
    #[error("Completed session not found: ID {0}")]
    CompletedSessionNotFound(i64),
    #[error("Exercise '{key}' not found in session {session_id}")]
    ExerciseGroupNotFound { session_id: i64, key: String },
    #[error("Update safety snapshot not found: ID {0}")]
    SnapshotNotFound(i64),
    #[error("{0} name cannot be empty")]
    EmptyName(&'static str),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Session {0} is not active")]
    SessionNotActive(i64),
    #[error("Database query failed: {0}")]
    QueryFailed(rusqlite::Error),
    #[error("Database update failed: {0}")]
    UpdateFailed(rusqlite::Error),
    #[error("Database insert failed: {0}")]
    InsertFailed(rusqlite::Error),
    #[error("Database delete failed: {0}")]
    DeleteFailed(rusqlite::Error),
    #[error("JSON serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),
    #[error("Row in table '{table}' has no primary key")]
    MissingPrimaryKey { table: &'static str },
}

impl Error {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::WorkoutNotFound(_)
            | Self::SessionNotFound(_)
            | Self::SessionSetNotFound(_)
            | Self::CompletedSessionNotFound(_)
            | Self::ExerciseGroupNotFound { .. }
            | Self::SnapshotNotFound(_) => ErrorKind::NotFound,
            Self::EmptyName(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::SessionNotActive(_) => ErrorKind::State,
            Self::Connection(_)
            | Self::Transaction(_)
            | Self::DataDir
            | Self::Io(_)
            | Self::QueryFailed(_)
            | Self::UpdateFailed(_)
            | Self::InsertFailed(_)
            | Self::DeleteFailed(_)
            | Self::Serialization(_)
            | Self::CorruptSnapshot(_)
            | Self::MissingPrimaryKey { .. } => ErrorKind::Storage,
        }
    }
}

/// Rows that can be built from a `SELECT *`-style query using named columns.
pub trait FromSqliteRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Gets the path to the SQLite database file.
/// `LIFTLOG_DB_PATH` wins over the configured path, which wins over the data directory.
pub fn get_db_path(configured: Option<&Path>) -> Result<PathBuf, Error> {
    if let Ok(path) = std::env::var(DB_PATH_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    let data_dir = dirs::data_dir().ok_or(Error::DataDir)?;
    let app_dir = data_dir.join(APP_DATA_DIR);
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)?;
    }
    Ok(app_dir.join(DB_FILE_NAME))
}

/// Opens a connection to the SQLite database.
pub fn open_db<P: AsRef<Path>>(path: P) -> Result<Connection, Error> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path).map_err(Error::Connection)?;
    Ok(conn)
}

/// Creates the tables if they don't exist and records the schema version.
pub fn init_db(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            language TEXT NOT NULL,
            weight_unit TEXT NOT NULL,
            rest_timer_seconds INTEGER NOT NULL,
            rest_timer_enabled INTEGER NOT NULL,
            body_weight REAL,
            weekly_weight_goal REAL,
            weekly_calories_goal REAL,
            weekly_workout_count_goal INTEGER,
            weekly_duration_goal_minutes INTEGER,
            locker_note_enabled INTEGER NOT NULL,
            locker_note TEXT,
            locker_note_updated_at TEXT,
            color_scheme TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workouts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            icon TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            archived_at TEXT
        );

        CREATE TABLE IF NOT EXISTS exercises (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            workout_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            notes TEXT,
            sort_order INTEGER NOT NULL,
            is_template INTEGER NOT NULL DEFAULT 1,
            ai_info TEXT,
            x2_enabled INTEGER NOT NULL DEFAULT 0,
            negative_weight_enabled INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS exercise_template_sets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exercise_id INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            target_reps INTEGER NOT NULL,
            target_weight REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            workout_id INTEGER NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('active', 'completed')),
            started_at TEXT NOT NULL,
            finished_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_exercise_sets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL,
            session_exercise_key TEXT NOT NULL,
            template_exercise_id INTEGER,
            exercise_name TEXT NOT NULL,
            exercise_notes TEXT,
            exercise_ai_info TEXT,
            exercise_order INTEGER NOT NULL,
            is_template_exercise INTEGER NOT NULL,
            x2_enabled INTEGER NOT NULL DEFAULT 0,
            negative_weight_enabled INTEGER NOT NULL DEFAULT 0,
            template_set_order INTEGER NOT NULL,
            target_reps INTEGER NOT NULL,
            target_weight REAL NOT NULL,
            actual_reps INTEGER,
            actual_weight REAL,
            completed INTEGER NOT NULL DEFAULT 0,
            completed_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS update_safety_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            app_version TEXT NOT NULL,
            previous_app_version TEXT,
            created_at TEXT NOT NULL,
            snapshot_json TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_exercises_workout_id ON exercises(workout_id);
        CREATE INDEX IF NOT EXISTS idx_template_sets_exercise_id ON exercise_template_sets(exercise_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_workout_id ON sessions(workout_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
        CREATE INDEX IF NOT EXISTS idx_session_sets_session_id ON session_exercise_sets(session_id);
        CREATE INDEX IF NOT EXISTS idx_session_sets_key ON session_exercise_sets(session_id, session_exercise_key);",
    )
    .map_err(Error::Connection)?;

    let current: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(Error::QueryFailed)?;
    if current < DB_SCHEMA_VERSION {
        tracing::info!(from = current, to = DB_SCHEMA_VERSION, "Upgrading database schema version");
        conn.pragma_update(None, "user_version", DB_SCHEMA_VERSION)
            .map_err(Error::UpdateFailed)?;
    }

    Ok(())
}

/// Reads the schema version recorded in the database file.
pub fn schema_version(conn: &Connection) -> Result<i64, Error> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(Error::QueryFailed)
}

/// Parses a TEXT column through `FromStr`, surfacing failures as conversion errors.
pub(crate) fn parse_text_column<T>(row: &Row, column: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(column)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Like [`parse_text_column`], but text that no longer parses reads as `T::default()`.
pub(crate) fn parse_text_column_or_default<T>(row: &Row, column: &str) -> rusqlite::Result<T>
where
    T: FromStr + Default,
{
    let raw: String = row.get(column)?;
    Ok(raw.parse().unwrap_or_default())
}

/// Reads an optional JSON-encoded TEXT column.
pub(crate) fn parse_json_column<T: DeserializeOwned>(
    row: &Row,
    column: &str,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|text| {
        serde_json::from_str(&text).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

pub(crate) fn to_json_column<T: Serialize>(value: Option<&T>) -> Result<Option<String>, Error> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(Error::Serialization)
}

/// Runs a query and maps every row with [`FromSqliteRow`].
pub(crate) fn query_all<T, P>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>, Error>
where
    T: FromSqliteRow,
    P: rusqlite::Params,
{
    let mut stmt = conn.prepare(sql).map_err(Error::QueryFailed)?;
    let rows = stmt
        .query_map(params, |row| T::from_row(row))
        .map_err(Error::QueryFailed)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}
