//src/stats.rs
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use strum::IntoEnumIterator;

use crate::catalog::{muscle_group_for_key, normalize_exercise_name, ExerciseCatalog, MuscleGroup};
use crate::db::{query_all, Error};
use crate::estimation::{
    estimate_strength_training_calories, resolve_calories_body_weight_kg,
    session_duration_minutes, StrengthCaloriesInput,
};
use crate::models::{
    Exercise, ExerciseAiInfo, MuscleTarget, SessionExerciseSet, SessionStatus, SessionWithSets,
    Settings,
};
use crate::sessions::{list_sessions, load_session_sets};

/// Memoized catalog lookups keyed by normalized exercise name. Misses are
/// cached too. Size is bounded by the number of distinct exercise names seen.
#[derive(Debug, Default)]
pub struct MuscleCache {
    entries: HashMap<String, Option<Vec<MuscleTarget>>>,
}

impl MuscleCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &mut self,
        catalog: &dyn ExerciseCatalog,
        exercise_name: &str,
    ) -> Option<Vec<MuscleTarget>> {
        let key = normalize_exercise_name(exercise_name);
        if key.is_empty() {
            return None;
        }
        self.entries
            .entry(key)
            .or_insert_with(|| catalog.lookup(exercise_name).map(|info| info.target_muscles))
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MuscleGroupMetrics {
    pub sets: f64,
    pub reps: f64,
    pub weight: f64,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyGoals {
    pub weight: Option<f64>,
    pub calories: Option<f64>,
    pub workout_count: Option<i64>,
    pub duration_minutes: Option<i64>,
}

impl From<&Settings> for WeeklyGoals {
    fn from(settings: &Settings) -> Self {
        Self {
            weight: settings.weekly_weight_goal,
            calories: settings.weekly_calories_goal,
            workout_count: settings.weekly_workout_count_goal,
            duration_minutes: settings.weekly_duration_goal_minutes,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyStats {
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub workout_count: usize,
    pub total_duration_minutes: f64,
    pub total_sets: f64,
    pub total_reps: f64,
    pub total_weight: f64,
    pub total_calories: f64,
    pub uses_default_body_weight: bool,
    pub muscle_groups: BTreeMap<MuscleGroup, MuscleGroupMetrics>,
    pub goals: WeeklyGoals,
}

/// Totals for a single session, as shown after finishing it.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub duration_minutes: f64,
    pub completed_sets: f64,
    pub reps_total: f64,
    pub weight_total: f64,
    pub calories: f64,
    pub uses_default_body_weight: bool,
}

/// Summarizes one session's completed sets. Works for active sessions too,
/// in which case the duration is measured against the start.
#[must_use]
pub fn summarize_session(entry: &SessionWithSets, settings: &Settings) -> SessionSummary {
    let body_weight = resolve_calories_body_weight_kg(settings.body_weight, settings.weight_unit);
    let duration_minutes =
        session_duration_minutes(entry.session.started_at, entry.session.finished_at);
    let (mut completed_sets, mut reps_total, mut weight_total) = (0.0, 0.0, 0.0);
    for set in entry.sets.iter().filter(|s| s.completed) {
        let multiplier = f64::from(set.stats_multiplier());
        let reps = set.effective_reps() as f64;
        completed_sets += multiplier;
        reps_total += multiplier * reps;
        weight_total += multiplier * reps * set.effective_weight();
    }
    SessionSummary {
        duration_minutes,
        completed_sets,
        reps_total,
        weight_total,
        calories: estimate_strength_training_calories(&StrengthCaloriesInput {
            duration_minutes,
            body_weight_kg: body_weight.kg,
            completed_set_count: completed_sets,
            reps_total,
        }),
        uses_default_body_weight: body_weight.uses_default_body_weight,
    }
}

/// Monday of the week containing `date`.
#[must_use]
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let day = i64::from(date.weekday().num_days_from_sunday());
    let offset = if day == 0 { -6 } else { 1 - day };
    date + Duration::days(offset)
}

fn local_midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    let naive = NaiveDateTime::new(date, NaiveTime::MIN);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map_or_else(|| Utc.from_utc_datetime(&naive), |dt| dt.with_timezone(&Utc))
}

/// Half-open window `[monday 00:00, next monday 00:00)` in local time.
#[must_use]
pub fn week_window(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let monday = week_start(date);
    (
        local_midnight_utc(monday),
        local_midnight_utc(monday + Duration::days(7)),
    )
}

/// Share of each muscle group in a muscle breakdown. Shares sum to 1, or the
/// result is empty when nothing maps to a known group.
#[must_use]
pub fn muscle_group_shares(targets: &[MuscleTarget]) -> BTreeMap<MuscleGroup, f64> {
    let mut percents: BTreeMap<MuscleGroup, f64> = BTreeMap::new();
    for target in targets {
        let Some(group) = muscle_group_for_key(&target.muscle_key) else {
            continue;
        };
        if target.involvement_percent.is_finite() && target.involvement_percent > 0.0 {
            *percents.entry(group).or_default() += target.involvement_percent;
        }
    }
    let total: f64 = percents.values().sum();
    if total <= 0.0 {
        return BTreeMap::new();
    }
    percents
        .into_iter()
        .map(|(group, percent)| (group, percent / total))
        .collect()
}

/// Cached AI info from template exercises, by id and by (workout, name).
#[derive(Debug, Default)]
pub struct TemplateAiIndex {
    by_id: HashMap<i64, ExerciseAiInfo>,
    by_workout_name: HashMap<(i64, String), ExerciseAiInfo>,
}

impl TemplateAiIndex {
    #[must_use]
    pub fn new(exercises: &[Exercise]) -> Self {
        let mut index = Self::default();
        for exercise in exercises {
            let Some(info) = exercise.ai_info.as_ref().filter(|i| !i.target_muscles.is_empty())
            else {
                continue;
            };
            index.by_id.insert(exercise.id, info.clone());
            index
                .by_workout_name
                .entry((exercise.workout_id, normalize_exercise_name(&exercise.name)))
                .or_insert_with(|| info.clone());
        }
        index
    }
}

pub struct WeeklyStatsAggregator {
    catalog: Box<dyn ExerciseCatalog>,
    cache: MuscleCache,
}

impl WeeklyStatsAggregator {
    #[must_use]
    pub fn new(catalog: Box<dyn ExerciseCatalog>) -> Self {
        Self {
            catalog,
            cache: MuscleCache::new(),
        }
    }

    #[must_use]
    pub const fn cache(&self) -> &MuscleCache {
        &self.cache
    }

    /// Muscle breakdown for a set: its own cached info, then its template
    /// exercise, then a same-named template exercise in the workout, then the catalog.
    fn resolve_targets(
        &mut self,
        set: &SessionExerciseSet,
        workout_id: i64,
        index: &TemplateAiIndex,
    ) -> Option<Vec<MuscleTarget>> {
        let cached = set
            .exercise_ai_info
            .as_ref()
            .filter(|info| !info.target_muscles.is_empty())
            .or_else(|| {
                set.template_exercise_id
                    .and_then(|id| index.by_id.get(&id))
            })
            .or_else(|| {
                index
                    .by_workout_name
                    .get(&(workout_id, normalize_exercise_name(&set.exercise_name)))
            });
        match cached {
            Some(info) => Some(info.target_muscles.clone()),
            None => self.cache.resolve(self.catalog.as_ref(), &set.exercise_name),
        }
    }

    /// Aggregates completed sessions whose finish (or start) time falls in `[start, end)`.
    pub fn aggregate(
        &mut self,
        sessions: &[SessionWithSets],
        template_exercises: &[Exercise],
        settings: &Settings,
        (window_start, window_end): (DateTime<Utc>, DateTime<Utc>),
    ) -> WeeklyStats {
        let index = TemplateAiIndex::new(template_exercises);
        let body_weight = resolve_calories_body_weight_kg(settings.body_weight, settings.weight_unit);

        let mut stats = WeeklyStats {
            week_start: window_start,
            week_end: window_end,
            workout_count: 0,
            total_duration_minutes: 0.0,
            total_sets: 0.0,
            total_reps: 0.0,
            total_weight: 0.0,
            total_calories: 0.0,
            uses_default_body_weight: body_weight.uses_default_body_weight,
            muscle_groups: MuscleGroup::iter()
                .map(|group| (group, MuscleGroupMetrics::default()))
                .collect(),
            goals: WeeklyGoals::from(settings),
        };

        for entry in sessions {
            let session = &entry.session;
            if session.status != SessionStatus::Completed {
                continue;
            }
            let reference = session.reference_time();
            if reference < window_start || reference >= window_end {
                continue;
            }

            let summary = summarize_session(entry, settings);
            stats.workout_count += 1;
            stats.total_duration_minutes += summary.duration_minutes;
            stats.total_sets += summary.completed_sets;
            stats.total_reps += summary.reps_total;
            stats.total_weight += summary.weight_total;
            stats.total_calories += summary.calories;

            for set in entry.sets.iter().filter(|s| s.completed) {
                let Some(targets) = self.resolve_targets(set, session.workout_id, &index) else {
                    continue;
                };
                let sets = f64::from(set.stats_multiplier());
                let reps_total = sets * set.effective_reps() as f64;
                let weight_total = reps_total * set.effective_weight();
                for (group, share) in muscle_group_shares(&targets) {
                    let metrics = stats.muscle_groups.entry(group).or_default();
                    metrics.sets += sets * share;
                    metrics.reps += reps_total * share;
                    metrics.weight += weight_total * share;
                }
            }
        }

        stats
    }

    /// Loads the week containing `date` from the database and aggregates it.
    pub fn weekly_stats(
        &mut self,
        conn: &Connection,
        date: NaiveDate,
        settings: &Settings,
    ) -> Result<WeeklyStats, Error> {
        let window = week_window(date);
        let sessions = list_sessions(conn, Some(SessionStatus::Completed))?
            .into_iter()
            .filter(|s| {
                let reference = s.reference_time();
                reference >= window.0 && reference < window.1
            })
            .map(|session| {
                let sets = load_session_sets(conn, session.id)?;
                Ok(SessionWithSets { session, sets })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let workout_ids: HashSet<i64> = sessions.iter().map(|s| s.session.workout_id).collect();
        let mut template_exercises: Vec<Exercise> = Vec::new();
        for workout_id in workout_ids {
            template_exercises.extend(query_all::<Exercise, _>(
                conn,
                "SELECT * FROM exercises WHERE workout_id = ?1",
                params![workout_id],
            )?);
        }

        Ok(self.aggregate(&sessions, &template_exercises, settings, window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BuiltinCatalog;
    use crate::models::Session;

    fn target(key: &str, percent: f64) -> MuscleTarget {
        MuscleTarget {
            muscle_key: key.to_string(),
            muscle: key.to_string(),
            involvement_percent: percent,
        }
    }

    fn completed_set(name: &str, x2: bool, reps: i64, weight: f64, info: Option<ExerciseAiInfo>) -> SessionExerciseSet {
        SessionExerciseSet {
            id: 1,
            session_id: 1,
            session_exercise_key: format!("custom-{name}"),
            template_exercise_id: None,
            exercise_name: name.to_string(),
            exercise_notes: None,
            exercise_ai_info: info,
            exercise_order: 0,
            is_template_exercise: false,
            x2_enabled: x2,
            negative_weight_enabled: false,
            template_set_order: 0,
            target_reps: reps,
            target_weight: weight,
            actual_reps: None,
            actual_weight: None,
            completed: true,
            completed_at: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }

    fn session_with(sets: Vec<SessionExerciseSet>, finished_at: DateTime<Utc>) -> SessionWithSets {
        SessionWithSets {
            session: Session {
                id: 1,
                workout_id: 7,
                status: SessionStatus::Completed,
                started_at: finished_at - Duration::minutes(30),
                finished_at: Some(finished_at),
                created_at: finished_at - Duration::minutes(30),
            },
            sets,
        }
    }

    fn window_around(instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (instant - Duration::days(1), instant + Duration::days(1))
    }

    #[test]
    fn summary_counts_x2_sets_twice() {
        let now = Utc::now();
        let mut open = completed_set("Bench Press", false, 5, 80.0, None);
        open.completed = false;
        let entry = session_with(
            vec![completed_set("Lunge", true, 10, 12.5, None), open],
            now,
        );
        let mut settings = Settings::defaults(now);
        settings.body_weight = Some(80.0);
        let summary = summarize_session(&entry, &settings);
        assert_eq!(summary.duration_minutes, 30.0);
        assert_eq!(summary.completed_sets, 2.0);
        assert_eq!(summary.reps_total, 20.0);
        assert_eq!(summary.weight_total, 250.0);
        assert!(!summary.uses_default_body_weight);
        assert!(summary.calories > 0.0);
    }

    #[test]
    fn week_starts_on_monday() {
        let sunday = NaiveDate::from_ymd_opt(2024, 6, 16).unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(week_start(sunday), monday);
        assert_eq!(week_start(monday), monday);
        let wednesday = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        assert_eq!(week_start(wednesday), monday);
    }

    #[test]
    fn shares_ignore_unknown_keys_and_sum_to_one() {
        let shares = muscle_group_shares(&[
            target("quadriceps", 50.0),
            target("gluteus_maximus", 20.0),
            target("erector_spinae", 30.0),
            target("mystery_muscle", 40.0),
        ]);
        assert_eq!(shares.len(), 2);
        assert!((shares[&MuscleGroup::Legs] - 0.7).abs() < 1e-12);
        assert!((shares.values().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(muscle_group_shares(&[target("mystery", 100.0)]).is_empty());
    }

    #[test]
    fn attribution_conserves_the_set_multiplier() {
        let info = ExerciseAiInfo {
            target_muscles: vec![
                target("pectoralis_major_sternal", 40.0),
                target("triceps_long_head", 35.0),
                target("deltoid_anterior", 25.0),
            ],
            ..Default::default()
        };
        let now = Utc::now();
        let sessions = vec![session_with(
            vec![completed_set("Dip", true, 8, 10.0, Some(info))],
            now,
        )];
        let mut aggregator = WeeklyStatsAggregator::new(Box::new(BuiltinCatalog));
        let settings = Settings::defaults(now);
        let stats = aggregator.aggregate(&sessions, &[], &settings, window_around(now));

        let sets: f64 = stats.muscle_groups.values().map(|m| m.sets).sum();
        let reps: f64 = stats.muscle_groups.values().map(|m| m.reps).sum();
        let weight: f64 = stats.muscle_groups.values().map(|m| m.weight).sum();
        assert!((sets - 2.0).abs() < 1e-9);
        assert!((reps - 16.0).abs() < 1e-9);
        assert!((weight - 160.0).abs() < 1e-9);
        assert_eq!(stats.total_sets, 2.0);
        assert_eq!(stats.total_reps, 16.0);
        assert_eq!(stats.total_weight, 160.0);
    }

    #[test]
    fn falls_back_to_catalog_and_caches_misses() {
        let now = Utc::now();
        let sessions = vec![session_with(
            vec![
                completed_set("Squat", false, 5, 100.0, None),
                completed_set("Secret Handshake", false, 5, 0.0, None),
            ],
            now,
        )];
        let mut aggregator = WeeklyStatsAggregator::new(Box::new(BuiltinCatalog));
        let settings = Settings::defaults(now);
        let stats = aggregator.aggregate(&sessions, &[], &settings, window_around(now));

        assert!(stats.muscle_groups[&MuscleGroup::Legs].sets > 0.0);
        assert_eq!(stats.total_sets, 2.0);
        let attributed: f64 = stats.muscle_groups.values().map(|m| m.sets).sum();
        assert!((attributed - 1.0).abs() < 1e-9);
        assert_eq!(aggregator.cache().len(), 2);
    }

    #[test]
    fn template_info_wins_over_catalog() {
        let now = Utc::now();
        let mut set = completed_set("Squat", false, 5, 100.0, None);
        set.template_exercise_id = Some(42);
        let template = Exercise {
            id: 42,
            workout_id: 7,
            name: "Squat".to_string(),
            notes: None,
            order: 0,
            is_template: true,
            ai_info: Some(ExerciseAiInfo {
                target_muscles: vec![target("rectus_abdominis", 100.0)],
                ..Default::default()
            }),
            x2_enabled: false,
            negative_weight_enabled: false,
            created_at: now,
            updated_at: now,
        };
        let sessions = vec![session_with(vec![set], now)];
        let mut aggregator = WeeklyStatsAggregator::new(Box::new(BuiltinCatalog));
        let stats = aggregator.aggregate(&sessions, &[template], &Settings::defaults(now), window_around(now));

        assert_eq!(stats.muscle_groups[&MuscleGroup::Core].sets, 1.0);
        assert_eq!(stats.muscle_groups[&MuscleGroup::Legs].sets, 0.0);
        assert!(aggregator.cache().is_empty());
    }

    #[test]
    fn sessions_outside_window_and_open_sets_are_ignored() {
        let now = Utc::now();
        let mut open = completed_set("Squat", false, 5, 100.0, None);
        open.completed = false;
        let inside = session_with(vec![open], now);
        let outside = session_with(vec![completed_set("Squat", false, 5, 100.0, None)], now - Duration::days(10));
        let mut aggregator = WeeklyStatsAggregator::new(Box::new(BuiltinCatalog));
        let stats = aggregator.aggregate(&[inside, outside], &[], &Settings::defaults(now), window_around(now));

        assert_eq!(stats.workout_count, 1);
        assert_eq!(stats.total_sets, 0.0);
        assert_eq!(stats.total_duration_minutes, 30.0);
        assert!(stats.total_calories > 0.0);
        assert!(stats.uses_default_body_weight);
    }
}
