use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub mod backup;
pub mod catalog;
mod config;
pub mod db;
pub mod estimation;
pub mod import;
pub mod models;
pub mod sessions;
pub mod settings;
pub mod stats;
pub mod workouts;

pub use backup::{BackupData, BackupSnapshot, UpdateSafetySnapshot};
pub use catalog::{BuiltinCatalog, ExerciseCatalog, ExerciseInfo, MuscleGroup};
pub use config::{
    get_config_path as get_config_path_util, load as load_config_util, parse_color,
    save as save_config_util, Config, ConfigError, StandardColor, ThemeConfig,
};
pub use db::{get_db_path as get_db_path_util, Error as DbError, ErrorKind};
pub use import::ImportRepairResult;
pub use models::{
    ColorScheme, Exercise, ExerciseAiInfo, ExerciseDraft, ExerciseTemplateSet, ExerciseWithSets,
    Language, MuscleTarget, Session, SessionExerciseGroup, SessionExerciseSet, SessionStatus,
    SessionWithSets, SetDraft, Settings, WeightUnit, Workout, WorkoutDraft, WorkoutWithExercises,
};
pub use sessions::{CompletedSetEdit, SessionSetUpdate, SessionTimingUpdate};
pub use settings::SettingsPatch;
pub use stats::{SessionSummary, WeeklyStats, WeeklyStatsAggregator};

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Outcome of importing a plan: the repair report plus the created workout ids.
#[derive(Debug, Clone)]
pub struct PlanImport {
    pub repair: ImportRepairResult,
    pub workout_ids: Vec<i64>,
}

pub struct AppService {
    pub config: Config,
    pub conn: Connection,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    stats: WeeklyStatsAggregator,
}

impl AppService {
    /// Initializes the application service: loads config, opens and migrates
    /// the database, repairs settings and takes an update safety snapshot if
    /// the app version changed since the last run.
    /// # Errors
    /// Returns `anyhow::Error` if config/db path determination, loading, or initialization fails.
    pub fn initialize() -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load(&config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"))?;

        let db_path = db::get_db_path(config.database_path.as_deref())
            .context("Failed to determine database path")?;
        let conn = db::open_db(&db_path)
            .with_context(|| format!("Failed to open database at {db_path:?}"))?;

        let mut service = Self::from_connection(conn, config)?;
        service.db_path = db_path;
        service.config_path = config_path;

        let keep = service.config.update_snapshot_keep;
        backup::ensure_update_safety_snapshot(&mut service.conn, APP_VERSION, keep)
            .context("Failed to take update safety snapshot")?;
        Ok(service)
    }

    /// Builds a service around an existing connection (in-memory databases in tests).
    /// # Errors
    /// Returns `anyhow::Error` if the schema or the settings record cannot be initialized.
    pub fn from_connection(conn: Connection, config: Config) -> Result<Self> {
        db::init_db(&conn).context("Failed to initialize database schema")?;
        settings::ensure_default_settings(&conn).context("Failed to initialize settings")?;
        Ok(Self {
            config,
            conn,
            db_path: PathBuf::from(":memory:"),
            config_path: PathBuf::new(),
            stats: WeeklyStatsAggregator::new(Box::new(BuiltinCatalog)),
        })
    }

    /// Swaps the exercise catalog used for muscle attribution. Clears cached lookups.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Box<dyn ExerciseCatalog>) -> Self {
        self.stats = WeeklyStatsAggregator::new(catalog);
        self
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    /// Saves the current configuration state.
    /// # Errors
    /// Returns `ConfigError` if saving fails.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        config::save(&self.config_path, &self.config)
    }

    /// Sets the table header color.
    /// # Errors
    /// - `ConfigError::InvalidColor` for unknown color names.
    /// - `ConfigError` variants if saving fails.
    pub fn set_header_color(&mut self, color: &str) -> Result<(), ConfigError> {
        let parsed = parse_color(color)?;
        self.config.theme.header_color = format!("{parsed:?}");
        self.save_config()
    }

    /// Sets how many update safety snapshots are kept.
    /// # Errors
    /// - `ConfigError::InvalidSnapshotKeep` if `keep` is zero.
    /// - `ConfigError` variants if saving fails.
    pub fn set_update_snapshot_keep(&mut self, keep: usize) -> Result<(), ConfigError> {
        if keep == 0 {
            return Err(ConfigError::InvalidSnapshotKeep);
        }
        self.config.update_snapshot_keep = keep;
        self.save_config()
    }

    // ---- Settings ----

    /// # Errors
    /// Returns `DbError` on storage failure.
    pub fn get_settings(&self) -> Result<Settings> {
        Ok(settings::get_settings(&self.conn)?)
    }

    /// Applies a partial settings update.
    /// # Errors
    /// - `DbError::Validation` for out-of-range values.
    pub fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings> {
        Ok(settings::update_settings(&self.conn, patch)?)
    }

    // ---- Workouts ----

    /// # Errors
    /// - `DbError::EmptyName` / `DbError::Validation` for invalid drafts.
    pub fn create_workout(&mut self, draft: &WorkoutDraft) -> Result<i64> {
        Ok(workouts::create_workout(&mut self.conn, draft)?)
    }

    /// Creates all drafts or none.
    /// # Errors
    /// - `DbError::EmptyName` / `DbError::Validation` if any draft is invalid.
    pub fn create_workouts_bulk(&mut self, drafts: &[WorkoutDraft]) -> Result<Vec<i64>> {
        Ok(workouts::create_workouts_bulk(&mut self.conn, drafts)?)
    }

    /// # Errors
    /// - `DbError::WorkoutNotFound` if the workout does not exist.
    pub fn update_workout(&mut self, id: i64, draft: &WorkoutDraft) -> Result<()> {
        Ok(workouts::update_workout(&mut self.conn, id, draft)?)
    }

    /// Deletes a workout together with its template and all of its sessions.
    /// # Errors
    /// - `DbError::WorkoutNotFound` if the workout does not exist.
    pub fn delete_workout(&mut self, id: i64) -> Result<()> {
        Ok(workouts::delete_workout(&mut self.conn, id)?)
    }

    /// # Errors
    /// Returns `DbError` on storage failure.
    pub fn get_workout(&self, id: i64) -> Result<Option<WorkoutWithExercises>> {
        Ok(workouts::get_workout_by_id(&self.conn, id)?)
    }

    /// # Errors
    /// Returns `DbError` on storage failure.
    pub fn list_workouts(&self, include_archived: bool) -> Result<Vec<Workout>> {
        Ok(workouts::list_workouts(&self.conn, include_archived)?)
    }

    /// # Errors
    /// - `DbError::WorkoutNotFound` if the workout does not exist.
    pub fn archive_workout(&self, id: i64, archived: bool) -> Result<()> {
        Ok(workouts::archive_workout(&self.conn, id, archived)?)
    }

    /// Seeds the starter templates into an empty database.
    /// # Errors
    /// Returns `DbError` on storage failure.
    pub fn ensure_default_workout(&mut self) -> Result<bool> {
        Ok(workouts::ensure_default_workout(&mut self.conn)?)
    }

    // ---- Sessions ----

    /// Starts a session for the workout, or returns the already active one.
    /// # Errors
    /// - `DbError::WorkoutNotFound` if no session is active and the workout does not exist.
    pub fn start_session(&mut self, workout_id: i64) -> Result<i64> {
        Ok(sessions::start_session(&mut self.conn, workout_id)?)
    }

    /// # Errors
    /// Returns `DbError` on storage failure.
    pub fn get_active_session(&self) -> Result<Option<SessionWithSets>> {
        match sessions::get_active_session(&self.conn)? {
            Some(session) => Ok(sessions::get_session_by_id(&self.conn, session.id)?),
            None => Ok(None),
        }
    }

    /// # Errors
    /// Returns `DbError` on storage failure.
    pub fn get_session(&self, id: i64) -> Result<Option<SessionWithSets>> {
        Ok(sessions::get_session_by_id(&self.conn, id)?)
    }

    /// Completed sessions, newest first.
    /// # Errors
    /// Returns `DbError` on storage failure.
    pub fn list_completed_sessions(&self) -> Result<Vec<Session>> {
        Ok(sessions::list_sessions(&self.conn, Some(SessionStatus::Completed))?)
    }

    /// # Errors
    /// - `DbError::SessionSetNotFound` if the set does not exist.
    /// - `DbError::Validation` for negative reps or disallowed negative weight.
    pub fn update_session_set(
        &self,
        set_id: i64,
        update: &SessionSetUpdate,
    ) -> Result<SessionExerciseSet> {
        Ok(sessions::update_session_set(&self.conn, set_id, update)?)
    }

    /// # Errors
    /// - `DbError::SessionNotActive` / `DbError::ExerciseGroupNotFound`.
    pub fn add_session_set(&mut self, session_id: i64, key: &str) -> Result<i64> {
        Ok(sessions::add_session_set(&mut self.conn, session_id, key)?)
    }

    /// # Errors
    /// - `DbError::SessionSetNotFound` / `DbError::SessionNotActive`.
    pub fn remove_session_set(&mut self, set_id: i64) -> Result<()> {
        Ok(sessions::remove_session_set(&mut self.conn, set_id)?)
    }

    /// Adds an ad-hoc exercise and returns its generated key.
    /// # Errors
    /// - `DbError::EmptyName` / `DbError::SessionNotActive`.
    pub fn add_session_exercise(&mut self, session_id: i64, name: &str) -> Result<String> {
        Ok(sessions::add_session_exercise(&mut self.conn, session_id, name)?)
    }

    /// # Errors
    /// - `DbError::ExerciseGroupNotFound` / `DbError::SessionNotActive`.
    pub fn remove_session_exercise(&mut self, session_id: i64, key: &str) -> Result<usize> {
        Ok(sessions::remove_session_exercise(&mut self.conn, session_id, key)?)
    }

    /// # Errors
    /// - `DbError::Validation` unless `ordered_keys` is a permutation of the session's keys.
    pub fn reorder_session_exercises(&mut self, session_id: i64, ordered_keys: &[String]) -> Result<()> {
        Ok(sessions::reorder_session_exercises(&mut self.conn, session_id, ordered_keys)?)
    }

    /// # Errors
    /// - `DbError::SessionNotFound` if the session does not exist.
    pub fn complete_session(&mut self, session_id: i64, use_as_template: bool) -> Result<Session> {
        Ok(sessions::complete_session(&mut self.conn, session_id, use_as_template)?)
    }

    /// # Errors
    /// - `DbError::SessionNotActive` / `DbError::SessionNotFound`.
    pub fn discard_session(&mut self, session_id: i64) -> Result<()> {
        Ok(sessions::discard_session(&mut self.conn, session_id)?)
    }

    /// # Errors
    /// - `DbError::CompletedSessionNotFound`.
    pub fn delete_completed_session(&mut self, session_id: i64) -> Result<()> {
        Ok(sessions::delete_completed_session(&mut self.conn, session_id)?)
    }

    /// # Errors
    /// - `DbError::CompletedSessionNotFound`, `DbError::SessionSetNotFound`, `DbError::Validation`.
    pub fn update_completed_session_sets(
        &mut self,
        session_id: i64,
        edits: &[CompletedSetEdit],
        timing: Option<&SessionTimingUpdate>,
    ) -> Result<()> {
        Ok(sessions::update_completed_session_sets(
            &mut self.conn,
            session_id,
            edits,
            timing,
        )?)
    }

    // ---- Statistics ----

    /// Duration, volume and calorie totals for one session.
    /// # Errors
    /// - `DbError::SessionNotFound` if the session does not exist.
    pub fn session_summary(&self, session_id: i64) -> Result<SessionSummary> {
        let entry = sessions::get_session_by_id(&self.conn, session_id)?
            .ok_or(DbError::SessionNotFound(session_id))?;
        let settings = settings::get_settings(&self.conn)?;
        Ok(stats::summarize_session(&entry, &settings))
    }

    /// The aggregator behind [`Self::weekly_stats`], with its catalog lookup cache.
    #[must_use]
    pub const fn stats_aggregator(&self) -> &WeeklyStatsAggregator {
        &self.stats
    }

    /// Statistics for the Monday-based week containing `date` (today if `None`).
    /// # Errors
    /// Returns `DbError` on storage failure.
    pub fn weekly_stats(&mut self, date: Option<NaiveDate>) -> Result<WeeklyStats> {
        let date = date.unwrap_or_else(|| Local::now().date_naive());
        let settings = settings::get_settings(&self.conn)?;
        self.stats
            .weekly_stats(&self.conn, date, &settings)
            .context("Failed to aggregate weekly statistics")
    }

    // ---- Import ----

    /// Repairs free-form plan text and creates the resulting workouts atomically.
    /// Plans without a locale are tagged with the configured `import_locale`.
    /// # Errors
    /// - `DbError::Validation` listing every repair error if the plan is unusable.
    pub fn import_plan(&mut self, text: &str) -> Result<PlanImport> {
        let repair = import::parse_import_text_with_locale(text, &self.config.import_locale);
        if !repair.errors.is_empty() {
            return Err(DbError::Validation(repair.errors.join("; ")).into());
        }
        if repair.drafts.is_empty() {
            bail!("Import produced no workouts");
        }
        for change in &repair.changes {
            tracing::warn!("Import repair: {change}");
        }
        let workout_ids = workouts::create_workouts_bulk(&mut self.conn, &repair.drafts)?;
        Ok(PlanImport { repair, workout_ids })
    }

    // ---- Backup ----

    /// # Errors
    /// Returns `DbError` on storage failure.
    pub fn export_backup(&self) -> Result<BackupSnapshot> {
        Ok(backup::export_snapshot(&self.conn, APP_VERSION)?)
    }

    /// # Errors
    /// Returns `DbError` on storage or serialization failure.
    pub fn export_backup_json(&self) -> Result<String> {
        Ok(backup::export_to_json(&self.conn, APP_VERSION)?)
    }

    /// Replaces every record with the snapshot's contents.
    /// # Errors
    /// - `DbError::CorruptSnapshot` / `DbError::MissingPrimaryKey`; nothing is changed then.
    pub fn import_backup(&mut self, snapshot: &BackupSnapshot) -> Result<()> {
        Ok(backup::import_snapshot(&mut self.conn, snapshot)?)
    }

    /// # Errors
    /// - `DbError::CorruptSnapshot` for malformed JSON.
    pub fn import_backup_json(&mut self, json: &str) -> Result<BackupSnapshot> {
        let snapshot = backup::parse_snapshot(json)?;
        backup::import_snapshot(&mut self.conn, &snapshot)?;
        Ok(snapshot)
    }

    /// # Errors
    /// Returns `DbError` on storage failure.
    pub fn clear_all_data(&mut self) -> Result<()> {
        Ok(backup::clear_all_data(&mut self.conn)?)
    }

    /// # Errors
    /// Returns `DbError` on storage failure.
    pub fn create_update_safety_snapshot(&mut self, previous_version: Option<&str>) -> Result<i64> {
        let keep = self.config.update_snapshot_keep;
        Ok(backup::create_update_safety_snapshot(
            &mut self.conn,
            APP_VERSION,
            previous_version,
            keep,
        )?)
    }

    /// # Errors
    /// Returns `DbError` on storage failure.
    pub fn list_update_safety_snapshots(&self) -> Result<Vec<UpdateSafetySnapshot>> {
        Ok(backup::list_update_safety_snapshots(&self.conn)?)
    }

    /// # Errors
    /// - `DbError::SnapshotNotFound` if no snapshot has this id.
    pub fn restore_update_safety_snapshot(&mut self, id: i64) -> Result<BackupSnapshot> {
        Ok(backup::restore_update_safety_snapshot(&mut self.conn, id)?)
    }
}
