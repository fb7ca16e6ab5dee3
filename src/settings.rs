//src/settings.rs
use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection, OptionalExtension};

use crate::db::{Error, FromSqliteRow};
use crate::models::{ColorScheme, Language, Settings, WeightUnit};

pub const SETTINGS_ID: i64 = 1;
pub const DEFAULT_REST_TIMER_SECONDS: i64 = 90;
const MIN_REST_TIMER_SECONDS: i64 = 5;
const MAX_REST_TIMER_SECONDS: i64 = 3600;

/// Partial update for [`Settings`]. `None` leaves a field untouched; for
/// nullable fields `Some(None)` clears the value.
#[derive(Debug, Default, Clone)]
pub struct SettingsPatch {
    pub language: Option<Language>,
    pub weight_unit: Option<WeightUnit>,
    pub rest_timer_seconds: Option<i64>,
    pub rest_timer_enabled: Option<bool>,
    pub body_weight: Option<Option<f64>>,
    pub weekly_weight_goal: Option<Option<f64>>,
    pub weekly_calories_goal: Option<Option<f64>>,
    pub weekly_workout_count_goal: Option<Option<i64>>,
    pub weekly_duration_goal_minutes: Option<Option<i64>>,
    pub locker_note_enabled: Option<bool>,
    pub locker_note: Option<Option<String>>,
    pub color_scheme: Option<ColorScheme>,
}

impl Settings {
    #[must_use]
    pub fn defaults(now: DateTime<Utc>) -> Self {
        Self {
            id: SETTINGS_ID,
            language: Language::default(),
            weight_unit: WeightUnit::default(),
            rest_timer_seconds: DEFAULT_REST_TIMER_SECONDS,
            rest_timer_enabled: true,
            body_weight: None,
            weekly_weight_goal: None,
            weekly_calories_goal: None,
            weekly_workout_count_goal: None,
            weekly_duration_goal_minutes: None,
            locker_note_enabled: false,
            locker_note: None,
            locker_note_updated_at: None,
            color_scheme: ColorScheme::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

fn positive_f64(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn positive_i64(value: Option<i64>) -> Option<i64> {
    value.filter(|v| *v > 0)
}

/// Repairs out-of-range values in place. Returns true if anything changed.
fn migrate(settings: &mut Settings) -> bool {
    let before = settings.clone();

    settings.id = SETTINGS_ID;
    settings.rest_timer_seconds = settings
        .rest_timer_seconds
        .clamp(MIN_REST_TIMER_SECONDS, MAX_REST_TIMER_SECONDS);
    settings.body_weight = positive_f64(settings.body_weight);
    settings.weekly_weight_goal = positive_f64(settings.weekly_weight_goal);
    settings.weekly_calories_goal = positive_f64(settings.weekly_calories_goal);
    settings.weekly_workout_count_goal = positive_i64(settings.weekly_workout_count_goal);
    settings.weekly_duration_goal_minutes = positive_i64(settings.weekly_duration_goal_minutes);
    if settings
        .locker_note
        .as_deref()
        .is_some_and(|note| note.trim().is_empty())
    {
        settings.locker_note = None;
    }

    *settings != before
}

fn load(conn: &Connection) -> Result<Option<Settings>, Error> {
    conn.query_row(
        "SELECT * FROM settings WHERE id = ?1",
        [SETTINGS_ID],
        Settings::from_row,
    )
    .optional()
    .map_err(Error::QueryFailed)
}

/// Enum columns whose stored text doesn't parse. [`Settings::from_row`]
/// reads those as the default variant; this tells startup to persist that.
fn unknown_enum_columns(conn: &Connection) -> Result<Vec<&'static str>, Error> {
    let raw: Option<(String, String, String)> = conn
        .query_row(
            "SELECT language, weight_unit, color_scheme FROM settings WHERE id = ?1",
            [SETTINGS_ID],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(Error::QueryFailed)?;
    let Some((language, weight_unit, color_scheme)) = raw else {
        return Ok(Vec::new());
    };

    let mut unknown = Vec::new();
    if language.parse::<Language>().is_err() {
        unknown.push("language");
    }
    if weight_unit.parse::<WeightUnit>().is_err() {
        unknown.push("weight_unit");
    }
    if color_scheme.parse::<ColorScheme>().is_err() {
        unknown.push("color_scheme");
    }
    Ok(unknown)
}

/// Writes the full record (insert or replace). Used by patching and by snapshot restore.
pub(crate) fn write(conn: &Connection, settings: &Settings) -> Result<(), Error> {
    conn.execute(
        "INSERT OR REPLACE INTO settings (
            id, language, weight_unit, rest_timer_seconds, rest_timer_enabled, body_weight,
            weekly_weight_goal, weekly_calories_goal, weekly_workout_count_goal,
            weekly_duration_goal_minutes, locker_note_enabled, locker_note,
            locker_note_updated_at, color_scheme, created_at, updated_at)
         VALUES (:id, :language, :weight_unit, :rest_timer_seconds, :rest_timer_enabled, :body_weight,
            :weekly_weight_goal, :weekly_calories_goal, :weekly_workout_count_goal,
            :weekly_duration_goal_minutes, :locker_note_enabled, :locker_note,
            :locker_note_updated_at, :color_scheme, :created_at, :updated_at)",
        named_params! {
            ":id": settings.id,
            ":language": settings.language.to_string(),
            ":weight_unit": settings.weight_unit.to_string(),
            ":rest_timer_seconds": settings.rest_timer_seconds,
            ":rest_timer_enabled": settings.rest_timer_enabled,
            ":body_weight": settings.body_weight,
            ":weekly_weight_goal": settings.weekly_weight_goal,
            ":weekly_calories_goal": settings.weekly_calories_goal,
            ":weekly_workout_count_goal": settings.weekly_workout_count_goal,
            ":weekly_duration_goal_minutes": settings.weekly_duration_goal_minutes,
            ":locker_note_enabled": settings.locker_note_enabled,
            ":locker_note": settings.locker_note,
            ":locker_note_updated_at": settings.locker_note_updated_at,
            ":color_scheme": settings.color_scheme.to_string(),
            ":created_at": settings.created_at,
            ":updated_at": settings.updated_at,
        },
    )
    .map_err(Error::UpdateFailed)?;
    Ok(())
}

/// Creates the settings record with defaults if missing, otherwise repairs
/// any out-of-range values. Meant to run once at startup.
pub fn ensure_default_settings(conn: &Connection) -> Result<Settings, Error> {
    match load(conn)? {
        None => {
            let settings = Settings::defaults(Utc::now());
            write(conn, &settings)?;
            tracing::debug!("Created default settings");
            Ok(settings)
        }
        Some(mut settings) => {
            let unknown = unknown_enum_columns(conn)?;
            if !unknown.is_empty() {
                tracing::warn!(columns = ?unknown, "Reset unrecognized settings values to defaults");
            }
            if migrate(&mut settings) || !unknown.is_empty() {
                settings.updated_at = Utc::now();
                write(conn, &settings)?;
                tracing::warn!("Repaired out-of-range settings values");
            }
            Ok(settings)
        }
    }
}

/// Returns the settings record, creating it on first access.
pub fn get_settings(conn: &Connection) -> Result<Settings, Error> {
    match load(conn)? {
        Some(settings) => Ok(settings),
        None => ensure_default_settings(conn),
    }
}

/// Applies a partial update and returns the stored record.
pub fn update_settings(conn: &Connection, patch: &SettingsPatch) -> Result<Settings, Error> {
    let mut settings = get_settings(conn)?;
    let now = Utc::now();

    if let Some(rest) = patch.rest_timer_seconds {
        if !(MIN_REST_TIMER_SECONDS..=MAX_REST_TIMER_SECONDS).contains(&rest) {
            return Err(Error::Validation(format!(
                "rest timer must be between {MIN_REST_TIMER_SECONDS} and {MAX_REST_TIMER_SECONDS} seconds"
            )));
        }
        settings.rest_timer_seconds = rest;
    }
    if let Some(Some(weight)) = patch.body_weight {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(Error::Validation(
                "body weight must be a positive number".to_string(),
            ));
        }
    }

    if let Some(language) = patch.language {
        settings.language = language;
    }
    if let Some(unit) = patch.weight_unit {
        settings.weight_unit = unit;
    }
    if let Some(enabled) = patch.rest_timer_enabled {
        settings.rest_timer_enabled = enabled;
    }
    if let Some(body_weight) = patch.body_weight {
        settings.body_weight = body_weight;
    }
    if let Some(goal) = patch.weekly_weight_goal {
        settings.weekly_weight_goal = positive_f64(goal);
    }
    if let Some(goal) = patch.weekly_calories_goal {
        settings.weekly_calories_goal = positive_f64(goal);
    }
    if let Some(goal) = patch.weekly_workout_count_goal {
        settings.weekly_workout_count_goal = positive_i64(goal);
    }
    if let Some(goal) = patch.weekly_duration_goal_minutes {
        settings.weekly_duration_goal_minutes = positive_i64(goal);
    }
    if let Some(enabled) = patch.locker_note_enabled {
        settings.locker_note_enabled = enabled;
    }
    if let Some(note) = &patch.locker_note {
        let note = note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        if note != settings.locker_note {
            settings.locker_note_updated_at = note.as_ref().map(|_| now);
            settings.locker_note = note;
        }
    }
    if let Some(scheme) = patch.color_scheme {
        settings.color_scheme = scheme;
    }

    settings.updated_at = now;
    write(conn, &settings)?;
    tracing::debug!("Updated settings");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_clamps_and_drops_invalid_values() {
        let mut settings = Settings::defaults(Utc::now());
        settings.rest_timer_seconds = 0;
        settings.body_weight = Some(-3.0);
        settings.weekly_workout_count_goal = Some(0);
        settings.locker_note = Some("   ".to_string());

        assert!(migrate(&mut settings));
        assert_eq!(settings.rest_timer_seconds, MIN_REST_TIMER_SECONDS);
        assert_eq!(settings.body_weight, None);
        assert_eq!(settings.weekly_workout_count_goal, None);
        assert_eq!(settings.locker_note, None);
    }

    #[test]
    fn unknown_language_resets_to_default_at_startup() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        let mut stored = ensure_default_settings(&conn).unwrap();
        stored.language = Language::De;
        stored.weight_unit = WeightUnit::Lb;
        write(&conn, &stored).unwrap();
        conn.execute(
            "UPDATE settings SET language = 'fr', color_scheme = 'neon' WHERE id = 1",
            [],
        )
        .unwrap();

        let settings = ensure_default_settings(&conn).unwrap();
        assert_eq!(settings.language, Language::En);
        assert_eq!(settings.color_scheme, ColorScheme::System);
        assert_eq!(settings.weight_unit, WeightUnit::Lb);

        let (language, scheme): (String, String) = conn
            .query_row(
                "SELECT language, color_scheme FROM settings WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((language.as_str(), scheme.as_str()), ("en", "system"));
        assert!(unknown_enum_columns(&conn).unwrap().is_empty());
    }

    #[test]
    fn migrate_leaves_valid_settings_alone() {
        let mut settings = Settings::defaults(Utc::now());
        settings.body_weight = Some(82.5);
        assert!(!migrate(&mut settings));
    }
}
