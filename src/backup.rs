//src/backup.rs
//! Full-database snapshots: JSON export/import and the rotating
//! "update safety" snapshots taken whenever the app version changes.

use chrono::{DateTime, Utc};
use rusqlite::{named_params, params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::{query_all, to_json_column, Error, FromSqliteRow, DB_SCHEMA_VERSION};
use crate::models::{Exercise, ExerciseTemplateSet, Session, SessionExerciseSet, Settings, Workout};
use crate::settings;

pub const BACKUP_VERSION: &str = "1.0";
pub const DEFAULT_UPDATE_SNAPSHOT_KEEP: usize = 3;

// Child tables first so a partial clear never leaves orphans behind.
const ENTITY_TABLES: &[&str] = &[
    "session_exercise_sets",
    "sessions",
    "exercise_template_sets",
    "exercises",
    "workouts",
    "settings",
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BackupData {
    pub settings: Vec<Settings>,
    pub workouts: Vec<Workout>,
    pub exercises: Vec<Exercise>,
    pub exercise_template_sets: Vec<ExerciseTemplateSet>,
    pub sessions: Vec<Session>,
    pub session_exercise_sets: Vec<SessionExerciseSet>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub backup_version: String,
    pub app_version: String,
    pub db_schema_version: i64,
    pub exported_at: DateTime<Utc>,
    pub data: BackupData,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSafetySnapshot {
    pub id: i64,
    pub app_version: String,
    pub previous_app_version: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub snapshot_json: String,
}

impl FromSqliteRow for UpdateSafetySnapshot {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            app_version: row.get("app_version")?,
            previous_app_version: row.get("previous_app_version")?,
            created_at: row.get("created_at")?,
            snapshot_json: row.get("snapshot_json")?,
        })
    }
}

impl UpdateSafetySnapshot {
    /// Decodes the stored snapshot.
    ///
    /// # Errors
    /// - `Error::CorruptSnapshot` if the stored JSON does not parse.
    pub fn snapshot(&self) -> Result<BackupSnapshot, Error> {
        parse_snapshot(&self.snapshot_json)
    }
}

/// Reads every entity table into a versioned snapshot.
pub fn export_snapshot(conn: &Connection, app_version: &str) -> Result<BackupSnapshot, Error> {
    let data = BackupData {
        settings: query_all(conn, "SELECT * FROM settings ORDER BY id", [])?,
        workouts: query_all(conn, "SELECT * FROM workouts ORDER BY id", [])?,
        exercises: query_all(conn, "SELECT * FROM exercises ORDER BY id", [])?,
        exercise_template_sets: query_all(
            conn,
            "SELECT * FROM exercise_template_sets ORDER BY id",
            [],
        )?,
        sessions: query_all(conn, "SELECT * FROM sessions ORDER BY id", [])?,
        session_exercise_sets: query_all(
            conn,
            "SELECT * FROM session_exercise_sets ORDER BY id",
            [],
        )?,
    };
    Ok(BackupSnapshot {
        backup_version: BACKUP_VERSION.to_string(),
        app_version: app_version.to_string(),
        db_schema_version: DB_SCHEMA_VERSION,
        exported_at: Utc::now(),
        data,
    })
}

pub fn export_to_json(conn: &Connection, app_version: &str) -> Result<String, Error> {
    let snapshot = export_snapshot(conn, app_version)?;
    Ok(serde_json::to_string_pretty(&snapshot)?)
}

/// Parses snapshot JSON. Malformed or incomplete input is a corrupt snapshot.
pub fn parse_snapshot(json: &str) -> Result<BackupSnapshot, Error> {
    serde_json::from_str(json).map_err(|e| Error::CorruptSnapshot(e.to_string()))
}

fn validate_snapshot(snapshot: &BackupSnapshot) -> Result<(), Error> {
    if snapshot.backup_version != BACKUP_VERSION {
        return Err(Error::CorruptSnapshot(format!(
            "unsupported backup version '{}'",
            snapshot.backup_version
        )));
    }
    if snapshot.db_schema_version > DB_SCHEMA_VERSION {
        return Err(Error::CorruptSnapshot(format!(
            "snapshot schema version {} is newer than supported version {DB_SCHEMA_VERSION}",
            snapshot.db_schema_version
        )));
    }

    let data = &snapshot.data;
    let checks: [(&'static str, bool); 6] = [
        ("settings", data.settings.iter().all(|r| r.id > 0)),
        ("workouts", data.workouts.iter().all(|r| r.id > 0)),
        ("exercises", data.exercises.iter().all(|r| r.id > 0)),
        ("exercise_template_sets", data.exercise_template_sets.iter().all(|r| r.id > 0)),
        ("sessions", data.sessions.iter().all(|r| r.id > 0)),
        ("session_exercise_sets", data.session_exercise_sets.iter().all(|r| r.id > 0)),
    ];
    if let Some((table, _)) = checks.iter().find(|(_, ok)| !ok) {
        return Err(Error::MissingPrimaryKey { table: *table });
    }
    Ok(())
}

fn clear_tables(conn: &Connection) -> Result<(), Error> {
    for table in ENTITY_TABLES {
        conn.execute(&format!("DELETE FROM {table}"), [])
            .map_err(Error::DeleteFailed)?;
    }
    Ok(())
}

/// Deletes every workout, session and the settings record in one transaction.
/// Update safety snapshots are kept.
pub fn clear_all_data(conn: &mut Connection) -> Result<(), Error> {
    let tx = conn.transaction().map_err(Error::Transaction)?;
    clear_tables(&tx)?;
    tx.commit().map_err(Error::Transaction)?;
    tracing::info!("Cleared all data");
    Ok(())
}

fn insert_rows(conn: &Connection, data: &BackupData) -> Result<(), Error> {
    for record in &data.settings {
        settings::write(conn, record)?;
    }

    let mut stmt = conn
        .prepare(
            "INSERT INTO workouts (id, name, icon, created_at, updated_at, archived_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .map_err(Error::InsertFailed)?;
    for w in &data.workouts {
        stmt.execute(params![w.id, w.name, w.icon, w.created_at, w.updated_at, w.archived_at])
            .map_err(Error::InsertFailed)?;
    }

    let mut stmt = conn
        .prepare(
            "INSERT INTO exercises (id, workout_id, name, notes, sort_order, is_template, ai_info,
                x2_enabled, negative_weight_enabled, created_at, updated_at)
             VALUES (:id, :workout_id, :name, :notes, :sort_order, :is_template, :ai_info,
                :x2_enabled, :negative_weight_enabled, :created_at, :updated_at)",
        )
        .map_err(Error::InsertFailed)?;
    for e in &data.exercises {
        let ai_info = to_json_column(e.ai_info.as_ref())?;
        stmt.execute(named_params! {
            ":id": e.id,
            ":workout_id": e.workout_id,
            ":name": e.name,
            ":notes": e.notes,
            ":sort_order": e.order,
            ":is_template": e.is_template,
            ":ai_info": ai_info,
            ":x2_enabled": e.x2_enabled,
            ":negative_weight_enabled": e.negative_weight_enabled,
            ":created_at": e.created_at,
            ":updated_at": e.updated_at,
        })
        .map_err(Error::InsertFailed)?;
    }

    let mut stmt = conn
        .prepare(
            "INSERT INTO exercise_template_sets (id, exercise_id, sort_order, target_reps, target_weight)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(Error::InsertFailed)?;
    for s in &data.exercise_template_sets {
        stmt.execute(params![s.id, s.exercise_id, s.order, s.target_reps, s.target_weight])
            .map_err(Error::InsertFailed)?;
    }

    let mut stmt = conn
        .prepare(
            "INSERT INTO sessions (id, workout_id, status, started_at, finished_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .map_err(Error::InsertFailed)?;
    for s in &data.sessions {
        stmt.execute(params![
            s.id,
            s.workout_id,
            s.status.to_string(),
            s.started_at,
            s.finished_at,
            s.created_at
        ])
        .map_err(Error::InsertFailed)?;
    }

    let mut stmt = conn
        .prepare(
            "INSERT INTO session_exercise_sets (id, session_id, session_exercise_key,
                template_exercise_id, exercise_name, exercise_notes, exercise_ai_info,
                exercise_order, is_template_exercise, x2_enabled, negative_weight_enabled,
                template_set_order, target_reps, target_weight, actual_reps, actual_weight,
                completed, completed_at, created_at)
             VALUES (:id, :session_id, :key, :template_exercise_id, :exercise_name,
                :exercise_notes, :exercise_ai_info, :exercise_order, :is_template_exercise,
                :x2_enabled, :negative_weight_enabled, :template_set_order, :target_reps,
                :target_weight, :actual_reps, :actual_weight, :completed, :completed_at,
                :created_at)",
        )
        .map_err(Error::InsertFailed)?;
    for s in &data.session_exercise_sets {
        let ai_info = to_json_column(s.exercise_ai_info.as_ref())?;
        stmt.execute(named_params! {
            ":id": s.id,
            ":session_id": s.session_id,
            ":key": s.session_exercise_key,
            ":template_exercise_id": s.template_exercise_id,
            ":exercise_name": s.exercise_name,
            ":exercise_notes": s.exercise_notes,
            ":exercise_ai_info": ai_info,
            ":exercise_order": s.exercise_order,
            ":is_template_exercise": s.is_template_exercise,
            ":x2_enabled": s.x2_enabled,
            ":negative_weight_enabled": s.negative_weight_enabled,
            ":template_set_order": s.template_set_order,
            ":target_reps": s.target_reps,
            ":target_weight": s.target_weight,
            ":actual_reps": s.actual_reps,
            ":actual_weight": s.actual_weight,
            ":completed": s.completed,
            ":completed_at": s.completed_at,
            ":created_at": s.created_at,
        })
        .map_err(Error::InsertFailed)?;
    }
    Ok(())
}

/// Replaces the whole database with the snapshot's rows, ids included.
/// The snapshot is checked before anything is touched; a failure while
/// writing rolls back to the previous contents.
pub fn import_snapshot(conn: &mut Connection, snapshot: &BackupSnapshot) -> Result<(), Error> {
    validate_snapshot(snapshot)?;

    let tx = conn.transaction().map_err(Error::Transaction)?;
    clear_tables(&tx)?;
    insert_rows(&tx, &snapshot.data)?;
    // Snapshots from older builds may lack settings or hold out-of-range values.
    settings::ensure_default_settings(&tx)?;
    tx.commit().map_err(Error::Transaction)?;

    tracing::info!(
        app_version = %snapshot.app_version,
        workouts = snapshot.data.workouts.len(),
        sessions = snapshot.data.sessions.len(),
        "Imported snapshot"
    );
    Ok(())
}

/// Stores a full snapshot tagged with the app version, then drops all but
/// the newest `keep` snapshots.
pub fn create_update_safety_snapshot(
    conn: &mut Connection,
    app_version: &str,
    previous_app_version: Option<&str>,
    keep: usize,
) -> Result<i64, Error> {
    let snapshot = export_snapshot(conn, app_version)?;
    let json = serde_json::to_string(&snapshot)?;
    let keep = i64::try_from(keep.max(1)).unwrap_or(i64::MAX);

    let tx = conn.transaction().map_err(Error::Transaction)?;
    tx.execute(
        "INSERT INTO update_safety_snapshots (app_version, previous_app_version, created_at, snapshot_json)
         VALUES (?1, ?2, ?3, ?4)",
        params![app_version, previous_app_version, snapshot.exported_at, json],
    )
    .map_err(Error::InsertFailed)?;
    let id = tx.last_insert_rowid();
    let removed = tx
        .execute(
            "DELETE FROM update_safety_snapshots WHERE id NOT IN (
                SELECT id FROM update_safety_snapshots ORDER BY id DESC LIMIT ?1)",
            params![keep],
        )
        .map_err(Error::DeleteFailed)?;
    tx.commit().map_err(Error::Transaction)?;

    tracing::info!(snapshot_id = id, app_version, removed, "Created update safety snapshot");
    Ok(id)
}

/// Newest first.
pub fn list_update_safety_snapshots(conn: &Connection) -> Result<Vec<UpdateSafetySnapshot>, Error> {
    query_all(
        conn,
        "SELECT * FROM update_safety_snapshots ORDER BY id DESC",
        [],
    )
}

pub fn get_update_safety_snapshot(
    conn: &Connection,
    id: i64,
) -> Result<Option<UpdateSafetySnapshot>, Error> {
    conn.query_row(
        "SELECT * FROM update_safety_snapshots WHERE id = ?1",
        params![id],
        UpdateSafetySnapshot::from_row,
    )
    .optional()
    .map_err(Error::QueryFailed)
}

/// Restores the database from a stored update safety snapshot.
pub fn restore_update_safety_snapshot(conn: &mut Connection, id: i64) -> Result<BackupSnapshot, Error> {
    let stored = get_update_safety_snapshot(conn, id)?.ok_or(Error::SnapshotNotFound(id))?;
    let snapshot = stored.snapshot()?;
    import_snapshot(conn, &snapshot)?;
    Ok(snapshot)
}

/// Takes a snapshot when the running version differs from the one recorded by
/// the newest snapshot, or when no snapshot exists yet. Returns the new id.
pub fn ensure_update_safety_snapshot(
    conn: &mut Connection,
    current_version: &str,
    keep: usize,
) -> Result<Option<i64>, Error> {
    let last_version: Option<String> = conn
        .query_row(
            "SELECT app_version FROM update_safety_snapshots ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::QueryFailed)?;

    if last_version.as_deref() == Some(current_version) {
        return Ok(None);
    }
    let id = create_update_safety_snapshot(conn, current_version, last_version.as_deref(), keep)?;
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    #[test]
    fn rejects_unsupported_versions() {
        let conn = memory_db();
        let mut snapshot = export_snapshot(&conn, "1.0.0").unwrap();
        snapshot.backup_version = "2.0".to_string();
        assert!(matches!(validate_snapshot(&snapshot), Err(Error::CorruptSnapshot(_))));

        snapshot.backup_version = BACKUP_VERSION.to_string();
        snapshot.db_schema_version = DB_SCHEMA_VERSION + 1;
        assert!(matches!(validate_snapshot(&snapshot), Err(Error::CorruptSnapshot(_))));
    }

    #[test]
    fn rejects_rows_without_ids() {
        let conn = memory_db();
        let mut snapshot = export_snapshot(&conn, "1.0.0").unwrap();
        snapshot.data.workouts.push(Workout {
            id: 0,
            name: "Ghost".to_string(),
            icon: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            archived_at: None,
        });
        assert!(matches!(
            validate_snapshot(&snapshot),
            Err(Error::MissingPrimaryKey { table: "workouts" })
        ));
    }

    #[test]
    fn malformed_json_is_corrupt() {
        assert!(matches!(parse_snapshot("{\"backupVersion\":"), Err(Error::CorruptSnapshot(_))));
        assert!(matches!(parse_snapshot("{}"), Err(Error::CorruptSnapshot(_))));
    }
}
