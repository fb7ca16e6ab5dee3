//src/workouts.rs
use chrono::{DateTime, Utc};
use rusqlite::{named_params, params, Connection, OptionalExtension};

use crate::db::{query_all, to_json_column, Error, FromSqliteRow};
use crate::models::{
    Exercise, ExerciseDraft, ExerciseTemplateSet, ExerciseWithSets, SetDraft, Workout,
    WorkoutDraft, WorkoutWithExercises,
};

fn validate_exercise_draft(exercise: &ExerciseDraft, path: &str) -> Result<(), Error> {
    if exercise.name.trim().is_empty() {
        return Err(Error::EmptyName("Exercise"));
    }
    for (index, set) in exercise.sets.iter().enumerate() {
        if set.target_reps <= 0 {
            return Err(Error::Validation(format!(
                "{path}.sets[{index}].targetReps must be a positive integer"
            )));
        }
        if !set.target_weight.is_finite() {
            return Err(Error::Validation(format!(
                "{path}.sets[{index}].targetWeight must be a finite number"
            )));
        }
        if set.target_weight < 0.0 && !exercise.negative_weight_enabled {
            return Err(Error::Validation(format!(
                "{path}.sets[{index}].targetWeight must not be negative"
            )));
        }
    }
    Ok(())
}

/// Checks names, reps and weights before anything is written.
pub(crate) fn validate_draft(draft: &WorkoutDraft) -> Result<(), Error> {
    if draft.name.trim().is_empty() {
        return Err(Error::EmptyName("Workout"));
    }
    for (index, exercise) in draft.exercises.iter().enumerate() {
        validate_exercise_draft(exercise, &format!("exercises[{index}]"))?;
    }
    Ok(())
}

fn trimmed_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

/// Deletes the workout's template exercises and their sets.
fn delete_template(conn: &Connection, workout_id: i64) -> Result<(), Error> {
    conn.execute(
        "DELETE FROM exercise_template_sets WHERE exercise_id IN
            (SELECT id FROM exercises WHERE workout_id = ?1 AND is_template = 1)",
        params![workout_id],
    )
    .map_err(Error::DeleteFailed)?;
    conn.execute(
        "DELETE FROM exercises WHERE workout_id = ?1 AND is_template = 1",
        params![workout_id],
    )
    .map_err(Error::DeleteFailed)?;
    Ok(())
}

/// Replaces the workout's entire template. Array position becomes `order`.
/// Must be called inside a transaction.
pub(crate) fn replace_template(
    conn: &Connection,
    workout_id: i64,
    exercises: &[ExerciseDraft],
    now: DateTime<Utc>,
) -> Result<(), Error> {
    delete_template(conn, workout_id)?;

    let mut insert_exercise = conn
        .prepare(
            "INSERT INTO exercises (workout_id, name, notes, sort_order, is_template, ai_info,
                x2_enabled, negative_weight_enabled, created_at, updated_at)
             VALUES (:workout_id, :name, :notes, :sort_order, 1, :ai_info,
                :x2_enabled, :negative_weight_enabled, :now, :now)",
        )
        .map_err(Error::InsertFailed)?;
    let mut insert_set = conn
        .prepare(
            "INSERT INTO exercise_template_sets (exercise_id, sort_order, target_reps, target_weight)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .map_err(Error::InsertFailed)?;

    for (order, exercise) in (0_i64..).zip(exercises) {
        let ai_info = to_json_column(exercise.ai_info.as_ref())?;
        insert_exercise
            .execute(named_params! {
                ":workout_id": workout_id,
                ":name": exercise.name.trim(),
                ":notes": trimmed_notes(exercise.notes.as_deref()),
                ":sort_order": order,
                ":ai_info": ai_info,
                ":x2_enabled": exercise.x2_enabled,
                ":negative_weight_enabled": exercise.negative_weight_enabled,
                ":now": now,
            })
            .map_err(Error::InsertFailed)?;
        let exercise_id = conn.last_insert_rowid();

        for (set_order, set) in (0_i64..).zip(&exercise.sets) {
            insert_set
                .execute(params![exercise_id, set_order, set.target_reps, set.target_weight])
                .map_err(Error::InsertFailed)?;
        }
    }
    Ok(())
}

fn insert_workout(conn: &Connection, draft: &WorkoutDraft, now: DateTime<Utc>) -> Result<i64, Error> {
    conn.execute(
        "INSERT INTO workouts (name, icon, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![draft.name.trim(), draft.icon, now],
    )
    .map_err(Error::InsertFailed)?;
    let id = conn.last_insert_rowid();
    replace_template(conn, id, &draft.exercises, now)?;
    Ok(id)
}

/// Creates a workout with its exercises and sets in one transaction.
pub fn create_workout(conn: &mut Connection, draft: &WorkoutDraft) -> Result<i64, Error> {
    validate_draft(draft)?;
    let tx = conn.transaction().map_err(Error::Transaction)?;
    let id = insert_workout(&tx, draft, Utc::now())?;
    tx.commit().map_err(Error::Transaction)?;
    tracing::debug!(workout_id = id, "Created workout '{}'", draft.name.trim());
    Ok(id)
}

/// Creates several workouts atomically; either all are stored or none.
pub fn create_workouts_bulk(
    conn: &mut Connection,
    drafts: &[WorkoutDraft],
) -> Result<Vec<i64>, Error> {
    for draft in drafts {
        validate_draft(draft)?;
    }
    let now = Utc::now();
    let tx = conn.transaction().map_err(Error::Transaction)?;
    let ids = drafts
        .iter()
        .map(|draft| insert_workout(&tx, draft, now))
        .collect::<Result<Vec<_>, _>>()?;
    tx.commit().map_err(Error::Transaction)?;
    tracing::debug!(count = ids.len(), "Created workouts in bulk");
    Ok(ids)
}

/// Rewrites the workout's name, icon and full template. `created_at` is kept.
pub fn update_workout(conn: &mut Connection, id: i64, draft: &WorkoutDraft) -> Result<(), Error> {
    validate_draft(draft)?;
    let now = Utc::now();
    let tx = conn.transaction().map_err(Error::Transaction)?;
    let rows_affected = tx
        .execute(
            "UPDATE workouts SET name = ?1, icon = ?2, updated_at = ?3 WHERE id = ?4",
            params![draft.name.trim(), draft.icon, now, id],
        )
        .map_err(Error::UpdateFailed)?;
    if rows_affected == 0 {
        return Err(Error::WorkoutNotFound(id));
    }
    replace_template(&tx, id, &draft.exercises, now)?;
    tx.commit().map_err(Error::Transaction)?;
    tracing::debug!(workout_id = id, "Updated workout");
    Ok(())
}

/// Deletes the workout, its template, and every session logged against it.
pub fn delete_workout(conn: &mut Connection, id: i64) -> Result<(), Error> {
    let tx = conn.transaction().map_err(Error::Transaction)?;
    tx.execute(
        "DELETE FROM session_exercise_sets WHERE session_id IN
            (SELECT id FROM sessions WHERE workout_id = ?1)",
        params![id],
    )
    .map_err(Error::DeleteFailed)?;
    tx.execute("DELETE FROM sessions WHERE workout_id = ?1", params![id])
        .map_err(Error::DeleteFailed)?;
    tx.execute(
        "DELETE FROM exercise_template_sets WHERE exercise_id IN
            (SELECT id FROM exercises WHERE workout_id = ?1)",
        params![id],
    )
    .map_err(Error::DeleteFailed)?;
    tx.execute("DELETE FROM exercises WHERE workout_id = ?1", params![id])
        .map_err(Error::DeleteFailed)?;
    let rows_affected = tx
        .execute("DELETE FROM workouts WHERE id = ?1", params![id])
        .map_err(Error::DeleteFailed)?;
    if rows_affected == 0 {
        // Dropping the transaction rolls back the (empty) cascade.
        return Err(Error::WorkoutNotFound(id));
    }
    tx.commit().map_err(Error::Transaction)?;
    tracing::debug!(workout_id = id, "Deleted workout");
    Ok(())
}

pub(crate) fn get_workout_row(conn: &Connection, id: i64) -> Result<Option<Workout>, Error> {
    conn.query_row("SELECT * FROM workouts WHERE id = ?1", params![id], Workout::from_row)
        .optional()
        .map_err(Error::QueryFailed)
}

/// Template exercises for a workout sorted by order, each with its sets sorted by order.
pub(crate) fn load_template_exercises(
    conn: &Connection,
    workout_id: i64,
) -> Result<Vec<ExerciseWithSets>, Error> {
    let exercises: Vec<Exercise> = query_all(
        conn,
        "SELECT * FROM exercises WHERE workout_id = ?1 AND is_template = 1 ORDER BY sort_order, id",
        params![workout_id],
    )?;
    exercises
        .into_iter()
        .map(|exercise| {
            let sets: Vec<ExerciseTemplateSet> = query_all(
                conn,
                "SELECT * FROM exercise_template_sets WHERE exercise_id = ?1 ORDER BY sort_order, id",
                params![exercise.id],
            )?;
            Ok(ExerciseWithSets { exercise, sets })
        })
        .collect()
}

/// Returns the workout with its ordered template, or `None` if it doesn't exist.
pub fn get_workout_by_id(conn: &Connection, id: i64) -> Result<Option<WorkoutWithExercises>, Error> {
    let Some(workout) = get_workout_row(conn, id)? else {
        return Ok(None);
    };
    let exercises = load_template_exercises(conn, id)?;
    Ok(Some(WorkoutWithExercises { workout, exercises }))
}

/// Lists workouts by name. Archived workouts are skipped unless requested.
pub fn list_workouts(conn: &Connection, include_archived: bool) -> Result<Vec<Workout>, Error> {
    let sql = if include_archived {
        "SELECT * FROM workouts ORDER BY name COLLATE NOCASE, id"
    } else {
        "SELECT * FROM workouts WHERE archived_at IS NULL ORDER BY name COLLATE NOCASE, id"
    };
    query_all(conn, sql, [])
}

/// Sets or clears the archive timestamp.
pub fn archive_workout(conn: &Connection, id: i64, archived: bool) -> Result<(), Error> {
    let now = Utc::now();
    let archived_at = archived.then_some(now);
    let rows_affected = conn
        .execute(
            "UPDATE workouts SET archived_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![archived_at, now, id],
        )
        .map_err(Error::UpdateFailed)?;
    if rows_affected == 0 {
        return Err(Error::WorkoutNotFound(id));
    }
    Ok(())
}

fn starter_exercise(name: &str, sets: &[(i64, f64)]) -> ExerciseDraft {
    ExerciseDraft {
        name: name.to_string(),
        sets: sets
            .iter()
            .map(|&(target_reps, target_weight)| SetDraft {
                target_reps,
                target_weight,
            })
            .collect(),
        ..Default::default()
    }
}

fn starter_workouts() -> Vec<WorkoutDraft> {
    vec![
        WorkoutDraft {
            name: "Full Body A".to_string(),
            icon: Some("dumbbell".to_string()),
            exercises: vec![
                starter_exercise("Squat", &[(8, 40.0), (8, 40.0), (8, 40.0)]),
                starter_exercise("Bench Press", &[(8, 30.0), (8, 30.0), (8, 30.0)]),
                starter_exercise("Barbell Row", &[(10, 30.0), (10, 30.0), (10, 30.0)]),
            ],
        },
        WorkoutDraft {
            name: "Full Body B".to_string(),
            icon: Some("barbell".to_string()),
            exercises: vec![
                starter_exercise("Deadlift", &[(5, 50.0), (5, 50.0), (5, 50.0)]),
                starter_exercise("Overhead Press", &[(10, 20.0), (10, 20.0), (10, 20.0)]),
                ExerciseDraft {
                    x2_enabled: true,
                    ..starter_exercise("Lunge", &[(10, 10.0), (10, 10.0)])
                },
                starter_exercise("Plank", &[(1, 0.0), (1, 0.0)]),
            ],
        },
    ]
}

/// Seeds two starter templates when no workout exists yet. Returns true if it seeded.
pub fn ensure_default_workout(conn: &mut Connection) -> Result<bool, Error> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM workouts", [], |row| row.get(0))
        .map_err(Error::QueryFailed)?;
    if count > 0 {
        return Ok(false);
    }
    create_workouts_bulk(conn, &starter_workouts())?;
    tracing::info!("Seeded starter workouts");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_blank_names_and_bad_sets() {
        let mut draft = WorkoutDraft {
            name: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(validate_draft(&draft), Err(Error::EmptyName("Workout"))));

        draft.name = "Push".to_string();
        draft.exercises = vec![starter_exercise("Dip", &[(0, 0.0)])];
        assert!(matches!(validate_draft(&draft), Err(Error::Validation(_))));

        draft.exercises = vec![starter_exercise("Dip", &[(8, -10.0)])];
        assert!(matches!(validate_draft(&draft), Err(Error::Validation(_))));

        draft.exercises[0].negative_weight_enabled = true;
        assert!(validate_draft(&draft).is_ok());
    }

    #[test]
    fn failed_transaction_reports_as_transaction_error() {
        let mut conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        conn.execute_batch("BEGIN").unwrap();

        let err = create_workout(&mut conn, &starter_workouts()[0]).unwrap_err();
        assert!(matches!(err, Error::Transaction(_)));
        assert!(err.to_string().starts_with("Database transaction failed"));
        assert_eq!(err.kind(), crate::db::ErrorKind::Storage);
    }

    #[test]
    fn starter_workouts_are_valid() {
        for draft in starter_workouts() {
            validate_draft(&draft).unwrap();
        }
    }
}
