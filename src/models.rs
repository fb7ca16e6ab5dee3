//src/models.rs
use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::db::{parse_json_column, parse_text_column, parse_text_column_or_default, FromSqliteRow};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Language {
    De,
    #[default]
    En,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Kg,
    Lb,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ColorScheme {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

/// The single global settings record (id is always 1).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub id: i64,
    pub language: Language,
    pub weight_unit: WeightUnit,
    pub rest_timer_seconds: i64,
    pub rest_timer_enabled: bool,
    pub body_weight: Option<f64>,
    pub weekly_weight_goal: Option<f64>,
    pub weekly_calories_goal: Option<f64>,
    pub weekly_workout_count_goal: Option<i64>,
    pub weekly_duration_goal_minutes: Option<i64>,
    pub locker_note_enabled: bool,
    pub locker_note: Option<String>,
    pub locker_note_updated_at: Option<DateTime<Utc>>,
    pub color_scheme: ColorScheme,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromSqliteRow for Settings {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            language: parse_text_column_or_default(row, "language")?,
            weight_unit: parse_text_column_or_default(row, "weight_unit")?,
            rest_timer_seconds: row.get("rest_timer_seconds")?,
            rest_timer_enabled: row.get("rest_timer_enabled")?,
            body_weight: row.get("body_weight")?,
            weekly_weight_goal: row.get("weekly_weight_goal")?,
            weekly_calories_goal: row.get("weekly_calories_goal")?,
            weekly_workout_count_goal: row.get("weekly_workout_count_goal")?,
            weekly_duration_goal_minutes: row.get("weekly_duration_goal_minutes")?,
            locker_note_enabled: row.get("locker_note_enabled")?,
            locker_note: row.get("locker_note")?,
            locker_note_updated_at: row.get("locker_note_updated_at")?,
            color_scheme: parse_text_column_or_default(row, "color_scheme")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// One muscle hit by an exercise, with its share of the total effort.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MuscleTarget {
    pub muscle_key: String,
    pub muscle: String,
    pub involvement_percent: f64,
}

/// Cached enrichment for an exercise: targeted muscles plus how to perform it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseAiInfo {
    #[serde(default)]
    pub target_muscles: Vec<MuscleTarget>,
    #[serde(default)]
    pub execution_guide: Vec<String>,
    #[serde(default)]
    pub coaching_tips: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workout {
    pub id: i64,
    pub name: String,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl FromSqliteRow for Workout {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            icon: row.get("icon")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            archived_at: row.get("archived_at")?,
        })
    }
}

/// A template exercise belonging to a workout.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: i64,
    pub workout_id: i64,
    pub name: String,
    pub notes: Option<String>,
    pub order: i64,
    pub is_template: bool,
    pub ai_info: Option<ExerciseAiInfo>,
    pub x2_enabled: bool,
    pub negative_weight_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromSqliteRow for Exercise {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            workout_id: row.get("workout_id")?,
            name: row.get("name")?,
            notes: row.get("notes")?,
            order: row.get("sort_order")?,
            is_template: row.get("is_template")?,
            ai_info: parse_json_column(row, "ai_info")?,
            x2_enabled: row.get("x2_enabled")?,
            negative_weight_enabled: row.get("negative_weight_enabled")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseTemplateSet {
    pub id: i64,
    pub exercise_id: i64,
    pub order: i64,
    pub target_reps: i64,
    pub target_weight: f64,
}

impl FromSqliteRow for ExerciseTemplateSet {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            exercise_id: row.get("exercise_id")?,
            order: row.get("sort_order")?,
            target_reps: row.get("target_reps")?,
            target_weight: row.get("target_weight")?,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub workout_id: i64,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// The instant a session is attributed to for weekly statistics.
    #[must_use]
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.finished_at.unwrap_or(self.started_at)
    }
}

impl FromSqliteRow for Session {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            workout_id: row.get("workout_id")?,
            status: parse_text_column(row, "status")?,
            started_at: row.get("started_at")?,
            finished_at: row.get("finished_at")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// A logged set inside a session. Exercise identity is copied in when the set
/// is created so the session stays a faithful record after template edits.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionExerciseSet {
    pub id: i64,
    pub session_id: i64,
    pub session_exercise_key: String,
    pub template_exercise_id: Option<i64>,
    pub exercise_name: String,
    pub exercise_notes: Option<String>,
    pub exercise_ai_info: Option<ExerciseAiInfo>,
    pub exercise_order: i64,
    pub is_template_exercise: bool,
    pub x2_enabled: bool,
    pub negative_weight_enabled: bool,
    pub template_set_order: i64,
    pub target_reps: i64,
    pub target_weight: f64,
    pub actual_reps: Option<i64>,
    pub actual_weight: Option<f64>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SessionExerciseSet {
    #[must_use]
    pub fn effective_reps(&self) -> i64 {
        self.actual_reps.unwrap_or(self.target_reps)
    }

    #[must_use]
    pub fn effective_weight(&self) -> f64 {
        self.actual_weight.unwrap_or(self.target_weight)
    }

    /// How many sets this one counts as in aggregate statistics.
    #[must_use]
    pub const fn stats_multiplier(&self) -> u32 {
        if self.x2_enabled {
            2
        } else {
            1
        }
    }
}

impl FromSqliteRow for SessionExerciseSet {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            session_exercise_key: row.get("session_exercise_key")?,
            template_exercise_id: row.get("template_exercise_id")?,
            exercise_name: row.get("exercise_name")?,
            exercise_notes: row.get("exercise_notes")?,
            exercise_ai_info: parse_json_column(row, "exercise_ai_info")?,
            exercise_order: row.get("exercise_order")?,
            is_template_exercise: row.get("is_template_exercise")?,
            x2_enabled: row.get("x2_enabled")?,
            negative_weight_enabled: row.get("negative_weight_enabled")?,
            template_set_order: row.get("template_set_order")?,
            target_reps: row.get("target_reps")?,
            target_weight: row.get("target_weight")?,
            actual_reps: row.get("actual_reps")?,
            actual_weight: row.get("actual_weight")?,
            completed: row.get("completed")?,
            completed_at: row.get("completed_at")?,
            created_at: row.get("created_at")?,
        })
    }
}

// ---- Drafts (input to the workout repository) ----

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SetDraft {
    pub target_reps: i64,
    pub target_weight: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseDraft {
    pub name: String,
    pub notes: Option<String>,
    pub ai_info: Option<ExerciseAiInfo>,
    #[serde(default)]
    pub x2_enabled: bool,
    #[serde(default)]
    pub negative_weight_enabled: bool,
    pub sets: Vec<SetDraft>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutDraft {
    pub name: String,
    pub icon: Option<String>,
    pub exercises: Vec<ExerciseDraft>,
}

// ---- Composite read models ----

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseWithSets {
    pub exercise: Exercise,
    pub sets: Vec<ExerciseTemplateSet>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutWithExercises {
    pub workout: Workout,
    pub exercises: Vec<ExerciseWithSets>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionWithSets {
    pub session: Session,
    pub sets: Vec<SessionExerciseSet>,
}

/// All sets of one exercise within a session, in set order.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionExerciseGroup {
    pub session_exercise_key: String,
    pub exercise_name: String,
    pub exercise_order: i64,
    pub sets: Vec<SessionExerciseSet>,
}
