//src/sessions.rs
//! Session lifecycle: a session is created `active` from a workout template,
//! its sets are logged while active, and it ends either `completed` (optionally
//! promoting what was actually done into the workout's template) or discarded
//! (hard-deleted). At most one session is active system-wide.

use chrono::{DateTime, Utc};
use rusqlite::{named_params, params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::db::{query_all, to_json_column, Error, FromSqliteRow};
use crate::models::{
    ExerciseAiInfo, ExerciseDraft, Session, SessionExerciseGroup, SessionExerciseSet,
    SessionStatus, SessionWithSets, SetDraft,
};
use crate::workouts::{get_workout_row, load_template_exercises, replace_template};

pub const AD_HOC_DEFAULT_REPS: i64 = 10;
pub const AD_HOC_DEFAULT_WEIGHT: f64 = 0.0;

/// Patch for a live set. Omitted fields are left as they are.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionSetUpdate {
    pub actual_reps: Option<i64>,
    pub actual_weight: Option<f64>,
    pub completed: Option<bool>,
}

/// One row of a post-hoc edit of a completed session. Rows without an `id`
/// are inserted as new sets.
#[derive(Debug, Clone)]
pub struct CompletedSetEdit {
    pub id: Option<i64>,
    pub session_exercise_key: String,
    pub exercise_name: String,
    pub exercise_order: i64,
    pub template_set_order: i64,
    pub reps: i64,
    pub weight: f64,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionTimingUpdate {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

struct NewSessionSet<'a> {
    session_id: i64,
    session_exercise_key: &'a str,
    template_exercise_id: Option<i64>,
    exercise_name: &'a str,
    exercise_notes: Option<&'a str>,
    exercise_ai_info: Option<&'a ExerciseAiInfo>,
    exercise_order: i64,
    is_template_exercise: bool,
    x2_enabled: bool,
    negative_weight_enabled: bool,
    template_set_order: i64,
    target_reps: i64,
    target_weight: f64,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl<'a> NewSessionSet<'a> {
    /// Copies the exercise identity of `source` for a new set in the same group.
    fn sibling_of(source: &'a SessionExerciseSet, created_at: DateTime<Utc>) -> Self {
        Self {
            session_id: source.session_id,
            session_exercise_key: &source.session_exercise_key,
            template_exercise_id: source.template_exercise_id,
            exercise_name: &source.exercise_name,
            exercise_notes: source.exercise_notes.as_deref(),
            exercise_ai_info: source.exercise_ai_info.as_ref(),
            exercise_order: source.exercise_order,
            is_template_exercise: source.is_template_exercise,
            x2_enabled: source.x2_enabled,
            negative_weight_enabled: source.negative_weight_enabled,
            template_set_order: source.template_set_order,
            target_reps: source.effective_reps(),
            target_weight: source.effective_weight(),
            completed: false,
            completed_at: None,
            created_at,
        }
    }
}

/// Inserts a set whose actual values start out equal to its targets.
fn insert_session_set(conn: &Connection, set: &NewSessionSet) -> Result<i64, Error> {
    let ai_info = to_json_column(set.exercise_ai_info)?;
    conn.execute(
        "INSERT INTO session_exercise_sets (
            session_id, session_exercise_key, template_exercise_id, exercise_name, exercise_notes,
            exercise_ai_info, exercise_order, is_template_exercise, x2_enabled,
            negative_weight_enabled, template_set_order, target_reps, target_weight,
            actual_reps, actual_weight, completed, completed_at, created_at)
         VALUES (:session_id, :key, :template_exercise_id, :name, :notes,
            :ai_info, :exercise_order, :is_template_exercise, :x2_enabled,
            :negative_weight_enabled, :template_set_order, :target_reps, :target_weight,
            :target_reps, :target_weight, :completed, :completed_at, :created_at)",
        named_params! {
            ":session_id": set.session_id,
            ":key": set.session_exercise_key,
            ":template_exercise_id": set.template_exercise_id,
            ":name": set.exercise_name,
            ":notes": set.exercise_notes,
            ":ai_info": ai_info,
            ":exercise_order": set.exercise_order,
            ":is_template_exercise": set.is_template_exercise,
            ":x2_enabled": set.x2_enabled,
            ":negative_weight_enabled": set.negative_weight_enabled,
            ":template_set_order": set.template_set_order,
            ":target_reps": set.target_reps,
            ":target_weight": set.target_weight,
            ":completed": set.completed,
            ":completed_at": set.completed_at,
            ":created_at": set.created_at,
        },
    )
    .map_err(Error::InsertFailed)?;
    Ok(conn.last_insert_rowid())
}

fn get_session_row(conn: &Connection, id: i64) -> Result<Option<Session>, Error> {
    conn.query_row("SELECT * FROM sessions WHERE id = ?1", params![id], Session::from_row)
        .optional()
        .map_err(Error::QueryFailed)
}

fn get_session_set(conn: &Connection, set_id: i64) -> Result<Option<SessionExerciseSet>, Error> {
    conn.query_row(
        "SELECT * FROM session_exercise_sets WHERE id = ?1",
        params![set_id],
        SessionExerciseSet::from_row,
    )
    .optional()
    .map_err(Error::QueryFailed)
}

pub(crate) fn load_session_sets(
    conn: &Connection,
    session_id: i64,
) -> Result<Vec<SessionExerciseSet>, Error> {
    query_all(
        conn,
        "SELECT * FROM session_exercise_sets WHERE session_id = ?1
         ORDER BY exercise_order, template_set_order, id",
        params![session_id],
    )
}

fn load_group_sets(
    conn: &Connection,
    session_id: i64,
    key: &str,
) -> Result<Vec<SessionExerciseSet>, Error> {
    query_all(
        conn,
        "SELECT * FROM session_exercise_sets WHERE session_id = ?1 AND session_exercise_key = ?2
         ORDER BY template_set_order, id",
        params![session_id, key],
    )
}

fn require_active(conn: &Connection, session_id: i64) -> Result<Session, Error> {
    let session = get_session_row(conn, session_id)?.ok_or(Error::SessionNotFound(session_id))?;
    if session.status != SessionStatus::Active {
        return Err(Error::SessionNotActive(session_id));
    }
    Ok(session)
}

fn require_completed(conn: &Connection, session_id: i64) -> Result<Session, Error> {
    get_session_row(conn, session_id)?
        .filter(|s| s.status == SessionStatus::Completed)
        .ok_or(Error::CompletedSessionNotFound(session_id))
}

fn validate_logged_values(
    reps: Option<i64>,
    weight: Option<f64>,
    negative_weight_enabled: bool,
) -> Result<(), Error> {
    if reps.is_some_and(|r| r < 0) {
        return Err(Error::Validation("reps must not be negative".to_string()));
    }
    if let Some(w) = weight {
        if !w.is_finite() {
            return Err(Error::Validation("weight must be a finite number".to_string()));
        }
        if w < 0.0 && !negative_weight_enabled {
            return Err(Error::Validation(
                "negative weight is not enabled for this exercise".to_string(),
            ));
        }
    }
    Ok(())
}

/// Returns the active session, if any.
pub fn get_active_session(conn: &Connection) -> Result<Option<Session>, Error> {
    conn.query_row(
        "SELECT * FROM sessions WHERE status = 'active' ORDER BY started_at DESC, id DESC LIMIT 1",
        [],
        Session::from_row,
    )
    .optional()
    .map_err(Error::QueryFailed)
}

/// Returns the session and its sets ordered by exercise, then set order.
pub fn get_session_by_id(conn: &Connection, id: i64) -> Result<Option<SessionWithSets>, Error> {
    let Some(session) = get_session_row(conn, id)? else {
        return Ok(None);
    };
    let sets = load_session_sets(conn, id)?;
    Ok(Some(SessionWithSets { session, sets }))
}

/// Lists sessions newest first, optionally filtered by status.
pub fn list_sessions(conn: &Connection, status: Option<SessionStatus>) -> Result<Vec<Session>, Error> {
    match status {
        Some(status) => query_all(
            conn,
            "SELECT * FROM sessions WHERE status = ?1 ORDER BY started_at DESC, id DESC",
            params![status.to_string()],
        ),
        None => query_all(
            conn,
            "SELECT * FROM sessions ORDER BY started_at DESC, id DESC",
            [],
        ),
    }
}

/// Groups sets by exercise key. Groups are ordered by `exercise_order`, sets
/// within a group by `template_set_order`.
#[must_use]
pub fn group_session_sets(sets: &[SessionExerciseSet]) -> Vec<SessionExerciseGroup> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<SessionExerciseGroup> = Vec::new();

    for set in sets {
        match index.get(set.session_exercise_key.as_str()) {
            Some(&i) => {
                let group = &mut groups[i];
                group.exercise_order = group.exercise_order.min(set.exercise_order);
                group.sets.push(set.clone());
            }
            None => {
                index.insert(&set.session_exercise_key, groups.len());
                groups.push(SessionExerciseGroup {
                    session_exercise_key: set.session_exercise_key.clone(),
                    exercise_name: set.exercise_name.clone(),
                    exercise_order: set.exercise_order,
                    sets: vec![set.clone()],
                });
            }
        }
    }

    for group in &mut groups {
        group.sets.sort_by_key(|s| (s.template_set_order, s.id));
    }
    // Stable sort keeps first-seen order for equal exercise orders.
    groups.sort_by_key(|g| g.exercise_order);
    groups
}

/// Starts a session for the workout, or returns the id of the session that
/// is already active (even when it belongs to a different workout).
pub fn start_session(conn: &mut Connection, workout_id: i64) -> Result<i64, Error> {
    let tx = conn.transaction().map_err(Error::Transaction)?;

    if let Some(active) = get_active_session(&tx)? {
        if active.workout_id != workout_id {
            tracing::debug!(
                session_id = active.id,
                requested_workout = workout_id,
                "Another workout's session is active; returning it"
            );
        }
        return Ok(active.id);
    }

    if get_workout_row(&tx, workout_id)?.is_none() {
        return Err(Error::WorkoutNotFound(workout_id));
    }
    let template = load_template_exercises(&tx, workout_id)?;

    let now = Utc::now();
    tx.execute(
        "INSERT INTO sessions (workout_id, status, started_at, created_at) VALUES (?1, 'active', ?2, ?2)",
        params![workout_id, now],
    )
    .map_err(Error::InsertFailed)?;
    let session_id = tx.last_insert_rowid();

    for entry in &template {
        let exercise = &entry.exercise;
        let key = format!("template-{}", exercise.id);
        for set in &entry.sets {
            insert_session_set(
                &tx,
                &NewSessionSet {
                    session_id,
                    session_exercise_key: &key,
                    template_exercise_id: Some(exercise.id),
                    exercise_name: &exercise.name,
                    exercise_notes: exercise.notes.as_deref(),
                    exercise_ai_info: exercise.ai_info.as_ref(),
                    exercise_order: exercise.order,
                    is_template_exercise: true,
                    x2_enabled: exercise.x2_enabled,
                    negative_weight_enabled: exercise.negative_weight_enabled,
                    template_set_order: set.order,
                    target_reps: set.target_reps,
                    target_weight: set.target_weight,
                    completed: false,
                    completed_at: None,
                    created_at: now,
                },
            )?;
        }
    }

    tx.commit().map_err(Error::Transaction)?;
    tracing::debug!(session_id, workout_id, "Started session");
    Ok(session_id)
}

/// Patches a live set. Marking it completed stamps `completed_at`; clearing
/// the flag clears the stamp; omitting the flag leaves the stamp untouched.
pub fn update_session_set(
    conn: &Connection,
    set_id: i64,
    update: &SessionSetUpdate,
) -> Result<SessionExerciseSet, Error> {
    let mut set = get_session_set(conn, set_id)?.ok_or(Error::SessionSetNotFound(set_id))?;
    validate_logged_values(update.actual_reps, update.actual_weight, set.negative_weight_enabled)?;

    if let Some(reps) = update.actual_reps {
        set.actual_reps = Some(reps);
    }
    if let Some(weight) = update.actual_weight {
        set.actual_weight = Some(weight);
    }
    match update.completed {
        Some(true) => {
            if !set.completed || set.completed_at.is_none() {
                set.completed_at = Some(Utc::now());
            }
            set.completed = true;
        }
        Some(false) => {
            set.completed = false;
            set.completed_at = None;
        }
        None => {}
    }

    conn.execute(
        "UPDATE session_exercise_sets
         SET actual_reps = ?1, actual_weight = ?2, completed = ?3, completed_at = ?4
         WHERE id = ?5",
        params![set.actual_reps, set.actual_weight, set.completed, set.completed_at, set_id],
    )
    .map_err(Error::UpdateFailed)?;
    Ok(set)
}

/// Appends a set to an exercise group, copying reps/weight from the group's last set.
pub fn add_session_set(conn: &mut Connection, session_id: i64, key: &str) -> Result<i64, Error> {
    let tx = conn.transaction().map_err(Error::Transaction)?;
    require_active(&tx, session_id)?;

    let group = load_group_sets(&tx, session_id, key)?;
    let last = group.last().ok_or_else(|| Error::ExerciseGroupNotFound {
        session_id,
        key: key.to_string(),
    })?;
    let next_order = group
        .iter()
        .map(|s| s.template_set_order)
        .max()
        .unwrap_or(last.template_set_order)
        + 1;

    let new_set = NewSessionSet {
        template_set_order: next_order,
        ..NewSessionSet::sibling_of(last, Utc::now())
    };
    let id = insert_session_set(&tx, &new_set)?;
    tx.commit().map_err(Error::Transaction)?;
    tracing::debug!(session_id, set_id = id, "Added set to '{key}'");
    Ok(id)
}

/// Deletes one set from an active session.
pub fn remove_session_set(conn: &mut Connection, set_id: i64) -> Result<(), Error> {
    let tx = conn.transaction().map_err(Error::Transaction)?;
    let set = get_session_set(&tx, set_id)?.ok_or(Error::SessionSetNotFound(set_id))?;
    require_active(&tx, set.session_id)?;
    tx.execute("DELETE FROM session_exercise_sets WHERE id = ?1", params![set_id])
        .map_err(Error::DeleteFailed)?;
    tx.commit().map_err(Error::Transaction)?;
    Ok(())
}

/// Picks `name`, or `name 2`, `name 3`, ... so it doesn't collide (case-insensitively).
fn unique_exercise_name(name: &str, existing: &HashSet<String>) -> String {
    if !existing.contains(&name.to_lowercase()) {
        return name.to_string();
    }
    (2_u32..)
        .map(|n| format!("{name} {n}"))
        .find(|candidate| !existing.contains(&candidate.to_lowercase()))
        .unwrap_or_else(|| name.to_string())
}

/// Adds an exercise that is not part of the template, with one default set.
/// Returns the new exercise's session key.
pub fn add_session_exercise(
    conn: &mut Connection,
    session_id: i64,
    name: &str,
) -> Result<String, Error> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyName("Exercise"));
    }

    let tx = conn.transaction().map_err(Error::Transaction)?;
    require_active(&tx, session_id)?;

    let sets = load_session_sets(&tx, session_id)?;
    let existing_names: HashSet<String> =
        sets.iter().map(|s| s.exercise_name.to_lowercase()).collect();
    let exercise_name = unique_exercise_name(trimmed, &existing_names);
    let exercise_order = sets
        .iter()
        .map(|s| s.exercise_order)
        .max()
        .map_or(0, |max| max + 1);
    let key = format!("custom-{}", Uuid::new_v4());

    insert_session_set(
        &tx,
        &NewSessionSet {
            session_id,
            session_exercise_key: &key,
            template_exercise_id: None,
            exercise_name: &exercise_name,
            exercise_notes: None,
            exercise_ai_info: None,
            exercise_order,
            is_template_exercise: false,
            x2_enabled: false,
            negative_weight_enabled: false,
            template_set_order: 0,
            target_reps: AD_HOC_DEFAULT_REPS,
            target_weight: AD_HOC_DEFAULT_WEIGHT,
            completed: false,
            completed_at: None,
            created_at: Utc::now(),
        },
    )?;
    tx.commit().map_err(Error::Transaction)?;
    tracing::debug!(session_id, "Added exercise '{exercise_name}'");
    Ok(key)
}

/// Deletes every set of one exercise group. Returns the number of sets removed.
pub fn remove_session_exercise(
    conn: &mut Connection,
    session_id: i64,
    key: &str,
) -> Result<usize, Error> {
    let tx = conn.transaction().map_err(Error::Transaction)?;
    require_active(&tx, session_id)?;
    let removed = tx
        .execute(
            "DELETE FROM session_exercise_sets WHERE session_id = ?1 AND session_exercise_key = ?2",
            params![session_id, key],
        )
        .map_err(Error::DeleteFailed)?;
    if removed == 0 {
        return Err(Error::ExerciseGroupNotFound {
            session_id,
            key: key.to_string(),
        });
    }
    tx.commit().map_err(Error::Transaction)?;
    Ok(removed)
}

/// Rewrites exercise order. `ordered_keys` must be a permutation of the
/// session's distinct exercise keys.
pub fn reorder_session_exercises(
    conn: &mut Connection,
    session_id: i64,
    ordered_keys: &[String],
) -> Result<(), Error> {
    let tx = conn.transaction().map_err(Error::Transaction)?;
    require_active(&tx, session_id)?;

    let existing: HashSet<String> = {
        let mut stmt = tx
            .prepare("SELECT DISTINCT session_exercise_key FROM session_exercise_sets WHERE session_id = ?1")
            .map_err(Error::QueryFailed)?;
        let keys = stmt
            .query_map(params![session_id], |row| row.get::<_, String>(0))
            .map_err(Error::QueryFailed)?;
        let keys: HashSet<String> = keys
            .collect::<Result<_, _>>()
            .map_err(Error::QueryFailed)?;
        keys
    };
    let requested: HashSet<String> = ordered_keys.iter().cloned().collect();

    if ordered_keys.len() != existing.len() {
        return Err(Error::Validation(format!(
            "expected {} exercise keys, got {}",
            existing.len(),
            ordered_keys.len()
        )));
    }
    if requested != existing {
        return Err(Error::Validation(
            "exercise keys do not match the session's exercises".to_string(),
        ));
    }

    {
        let mut stmt = tx
            .prepare(
                "UPDATE session_exercise_sets SET exercise_order = ?1
                 WHERE session_id = ?2 AND session_exercise_key = ?3",
            )
            .map_err(Error::UpdateFailed)?;
        for (position, key) in (0_i64..).zip(ordered_keys) {
            stmt.execute(params![position, session_id, key])
                .map_err(Error::UpdateFailed)?;
        }
    }
    tx.commit().map_err(Error::Transaction)?;
    Ok(())
}

/// Replaces the workout's template with what was actually done in the session.
fn promote_to_template(
    conn: &Connection,
    session: &Session,
    sets: &[SessionExerciseSet],
    now: DateTime<Utc>,
) -> Result<(), Error> {
    if get_workout_row(conn, session.workout_id)?.is_none() {
        return Err(Error::WorkoutNotFound(session.workout_id));
    }

    let exercises: Vec<ExerciseDraft> = group_session_sets(sets)
        .into_iter()
        .map(|group| {
            let first = &group.sets[0];
            ExerciseDraft {
                name: group.exercise_name.clone(),
                notes: first.exercise_notes.clone(),
                ai_info: first.exercise_ai_info.clone(),
                x2_enabled: first.x2_enabled,
                negative_weight_enabled: first.negative_weight_enabled,
                sets: group
                    .sets
                    .iter()
                    .map(|s| SetDraft {
                        target_reps: s.effective_reps(),
                        target_weight: s.effective_weight(),
                    })
                    .collect(),
            }
        })
        .collect();

    replace_template(conn, session.workout_id, &exercises, now)?;
    conn.execute(
        "UPDATE workouts SET updated_at = ?1 WHERE id = ?2",
        params![now, session.workout_id],
    )
    .map_err(Error::UpdateFailed)?;
    tracing::debug!(
        session_id = session.id,
        workout_id = session.workout_id,
        exercises = exercises.len(),
        "Promoted session to template"
    );
    Ok(())
}

/// Completes a session. `finished_at` becomes the latest completion time of
/// its completed sets, or now when none were completed. Calling it again on a
/// completed session re-derives `finished_at` (and re-promotes if asked).
pub fn complete_session(
    conn: &mut Connection,
    session_id: i64,
    use_as_template: bool,
) -> Result<Session, Error> {
    let now = Utc::now();
    let tx = conn.transaction().map_err(Error::Transaction)?;
    let mut session = get_session_row(&tx, session_id)?.ok_or(Error::SessionNotFound(session_id))?;
    let sets = load_session_sets(&tx, session_id)?;

    if use_as_template {
        promote_to_template(&tx, &session, &sets, now)?;
    }

    let finished_at = sets
        .iter()
        .filter(|s| s.completed)
        .filter_map(|s| s.completed_at)
        .max()
        .unwrap_or(now);

    tx.execute(
        "UPDATE sessions SET status = 'completed', finished_at = ?1 WHERE id = ?2",
        params![finished_at, session_id],
    )
    .map_err(Error::UpdateFailed)?;
    tx.commit().map_err(Error::Transaction)?;

    session.status = SessionStatus::Completed;
    session.finished_at = Some(finished_at);
    tracing::debug!(session_id, use_as_template, "Completed session");
    Ok(session)
}

fn delete_session_rows(conn: &Connection, session_id: i64) -> Result<(), Error> {
    conn.execute(
        "DELETE FROM session_exercise_sets WHERE session_id = ?1",
        params![session_id],
    )
    .map_err(Error::DeleteFailed)?;
    conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])
        .map_err(Error::DeleteFailed)?;
    Ok(())
}

/// Throws away an active session and everything logged in it.
pub fn discard_session(conn: &mut Connection, session_id: i64) -> Result<(), Error> {
    let tx = conn.transaction().map_err(Error::Transaction)?;
    require_active(&tx, session_id)?;
    delete_session_rows(&tx, session_id)?;
    tx.commit().map_err(Error::Transaction)?;
    tracing::debug!(session_id, "Discarded session");
    Ok(())
}

/// Deletes a completed session from history.
pub fn delete_completed_session(conn: &mut Connection, session_id: i64) -> Result<(), Error> {
    let tx = conn.transaction().map_err(Error::Transaction)?;
    require_completed(&tx, session_id)?;
    delete_session_rows(&tx, session_id)?;
    tx.commit().map_err(Error::Transaction)?;
    tracing::debug!(session_id, "Deleted completed session");
    Ok(())
}

/// Corrects a completed session after the fact. Sets listed by id are patched,
/// sets missing from `edits` are deleted, rows without id are inserted.
pub fn update_completed_session_sets(
    conn: &mut Connection,
    session_id: i64,
    edits: &[CompletedSetEdit],
    timing: Option<&SessionTimingUpdate>,
) -> Result<(), Error> {
    if let Some(timing) = timing {
        if timing.finished_at < timing.started_at {
            return Err(Error::Validation(
                "finish time must not be before start time".to_string(),
            ));
        }
    }

    let tx = conn.transaction().map_err(Error::Transaction)?;
    let session = require_completed(&tx, session_id)?;
    let existing = load_session_sets(&tx, session_id)?;
    let by_id: HashMap<i64, &SessionExerciseSet> = existing.iter().map(|s| (s.id, s)).collect();

    for edit in edits {
        let negative_allowed = match edit.id {
            Some(id) => by_id
                .get(&id)
                .ok_or(Error::SessionSetNotFound(id))?
                .negative_weight_enabled,
            None => existing
                .iter()
                .find(|s| s.session_exercise_key == edit.session_exercise_key)
                .is_some_and(|s| s.negative_weight_enabled),
        };
        validate_logged_values(Some(edit.reps), Some(edit.weight), negative_allowed)?;
    }

    let fallback_finished_at = timing
        .map(|t| t.finished_at)
        .or(session.finished_at)
        .unwrap_or(session.started_at);

    let kept: HashSet<i64> = edits.iter().filter_map(|e| e.id).collect();
    for set in existing.iter().filter(|s| !kept.contains(&s.id)) {
        tx.execute("DELETE FROM session_exercise_sets WHERE id = ?1", params![set.id])
            .map_err(Error::DeleteFailed)?;
    }

    let now = Utc::now();
    for edit in edits {
        let completed_at = match edit.id {
            Some(id) => {
                let prior = by_id[&id];
                let completed_at = if edit.completed {
                    prior
                        .completed_at
                        .filter(|_| prior.completed)
                        .or(Some(fallback_finished_at))
                } else {
                    None
                };
                tx.execute(
                    "UPDATE session_exercise_sets
                     SET actual_reps = ?1, actual_weight = ?2, completed = ?3, completed_at = ?4
                     WHERE id = ?5",
                    params![edit.reps, edit.weight, edit.completed, completed_at, id],
                )
                .map_err(Error::UpdateFailed)?;
                continue;
            }
            None => edit.completed.then_some(fallback_finished_at),
        };

        let sibling = existing
            .iter()
            .find(|s| s.session_exercise_key == edit.session_exercise_key);
        let new_set = NewSessionSet {
            session_id,
            session_exercise_key: &edit.session_exercise_key,
            template_exercise_id: sibling.and_then(|s| s.template_exercise_id),
            exercise_name: &edit.exercise_name,
            exercise_notes: sibling.and_then(|s| s.exercise_notes.as_deref()),
            exercise_ai_info: sibling.and_then(|s| s.exercise_ai_info.as_ref()),
            exercise_order: edit.exercise_order,
            is_template_exercise: sibling.is_some_and(|s| s.is_template_exercise),
            x2_enabled: sibling.is_some_and(|s| s.x2_enabled),
            negative_weight_enabled: sibling.is_some_and(|s| s.negative_weight_enabled),
            template_set_order: edit.template_set_order,
            target_reps: edit.reps,
            target_weight: edit.weight,
            completed: edit.completed,
            completed_at,
            created_at: now,
        };
        insert_session_set(&tx, &new_set)?;
    }

    if let Some(timing) = timing {
        tx.execute(
            "UPDATE sessions SET started_at = ?1, finished_at = ?2 WHERE id = ?3",
            params![timing.started_at, timing.finished_at, session_id],
        )
        .map_err(Error::UpdateFailed)?;
    }

    tx.commit().map_err(Error::Transaction)?;
    tracing::debug!(session_id, edits = edits.len(), "Edited completed session");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(id: i64, key: &str, exercise_order: i64, set_order: i64) -> SessionExerciseSet {
        SessionExerciseSet {
            id,
            session_id: 1,
            session_exercise_key: key.to_string(),
            template_exercise_id: None,
            exercise_name: key.to_uppercase(),
            exercise_notes: None,
            exercise_ai_info: None,
            exercise_order,
            is_template_exercise: false,
            x2_enabled: false,
            negative_weight_enabled: false,
            template_set_order: set_order,
            target_reps: 10,
            target_weight: 20.0,
            actual_reps: None,
            actual_weight: None,
            completed: false,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn groups_sorted_by_exercise_then_set_order() {
        let sets = vec![
            set(1, "b", 1, 1),
            set(2, "a", 0, 1),
            set(3, "b", 1, 0),
            set(4, "a", 0, 0),
        ];
        let groups = group_session_sets(&sets);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].session_exercise_key, "a");
        assert_eq!(groups[1].session_exercise_key, "b");
        let b_ids: Vec<i64> = groups[1].sets.iter().map(|s| s.id).collect();
        assert_eq!(b_ids, vec![3, 1]);
    }

    #[test]
    fn unique_names_append_counter() {
        let existing: HashSet<String> = ["curl".to_string(), "curl 2".to_string()].into();
        assert_eq!(unique_exercise_name("Curl", &existing), "Curl 3");
        assert_eq!(unique_exercise_name("Dip", &existing), "Dip");
    }

    #[test]
    fn negative_weight_needs_flag() {
        assert!(validate_logged_values(Some(5), Some(-10.0), false).is_err());
        assert!(validate_logged_values(Some(5), Some(-10.0), true).is_ok());
        assert!(validate_logged_values(Some(-1), None, true).is_err());
        assert!(validate_logged_values(None, Some(f64::NAN), true).is_err());
    }
}
