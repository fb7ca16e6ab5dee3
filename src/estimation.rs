//src/estimation.rs
//! Duration and calorie estimates for strength sessions. The calorie figure
//! is a MET heuristic driven by how densely work was packed into the session.

use chrono::{DateTime, Utc};

use crate::models::WeightUnit;

pub const DEFAULT_BODY_WEIGHT_KG: f64 = 75.0;
pub const LB_TO_KG: f64 = 0.453_592_37;

const MIN_SESSION_MINUTES: f64 = 1.0;
const MAX_SESSION_MINUTES: f64 = 1440.0;

const MODERATE_MET: f64 = 3.5;
const VIGOROUS_MET: f64 = 6.0;

const SETS_PER_MINUTE_FLOOR: f64 = 0.25;
const SETS_PER_MINUTE_SPAN: f64 = 0.75;
const REPS_PER_MINUTE_FLOOR: f64 = 3.0;
const REPS_PER_MINUTE_SPAN: f64 = 17.0;
const SETS_DENSITY_WEIGHT: f64 = 0.6;
const REPS_DENSITY_WEIGHT: f64 = 0.4;

/// Wall-clock minutes between start and finish, rounded and clamped to [1, 1440].
/// An unfinished session measures against its own start.
#[must_use]
pub fn session_duration_minutes(
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
) -> f64 {
    let end = finished_at.unwrap_or(started_at);
    let millis = (end - started_at).num_milliseconds() as f64;
    (millis / 60_000.0)
        .round()
        .clamp(MIN_SESSION_MINUTES, MAX_SESSION_MINUTES)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaloriesBodyWeight {
    pub kg: f64,
    pub uses_default_body_weight: bool,
}

/// Body weight in kilograms for calorie estimates, falling back to 75 kg.
#[must_use]
pub fn resolve_calories_body_weight_kg(
    body_weight: Option<f64>,
    unit: WeightUnit,
) -> CaloriesBodyWeight {
    match body_weight.filter(|w| w.is_finite() && *w > 0.0) {
        Some(weight) => CaloriesBodyWeight {
            kg: match unit {
                WeightUnit::Kg => weight,
                WeightUnit::Lb => weight * LB_TO_KG,
            },
            uses_default_body_weight: false,
        },
        None => CaloriesBodyWeight {
            kg: DEFAULT_BODY_WEIGHT_KG,
            uses_default_body_weight: true,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrengthCaloriesInput {
    pub duration_minutes: f64,
    pub body_weight_kg: f64,
    pub completed_set_count: f64,
    pub reps_total: f64,
}

/// Work density on [0, 1], blended from sets/min and reps/min.
#[must_use]
pub fn density_score(input: &StrengthCaloriesInput) -> f64 {
    let minutes = input.duration_minutes.max(1.0);
    let sets_per_minute = input.completed_set_count / minutes;
    let reps_per_minute = input.reps_total / minutes;

    let sets_component =
        ((sets_per_minute - SETS_PER_MINUTE_FLOOR) / SETS_PER_MINUTE_SPAN).clamp(0.0, 1.0);
    let reps_component =
        ((reps_per_minute - REPS_PER_MINUTE_FLOOR) / REPS_PER_MINUTE_SPAN).clamp(0.0, 1.0);

    sets_component * SETS_DENSITY_WEIGHT + reps_component * REPS_DENSITY_WEIGHT
}

/// kcal = MET * 3.5 * kg * minutes / 200, with MET between 3.5 and 6.0.
#[must_use]
pub fn estimate_strength_training_calories(input: &StrengthCaloriesInput) -> f64 {
    let met = MODERATE_MET + density_score(input) * (VIGOROUS_MET - MODERATE_MET);
    met * 3.5 * input.body_weight_kg * input.duration_minutes / 200.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn input(minutes: f64, sets: f64, reps: f64) -> StrengthCaloriesInput {
        StrengthCaloriesInput {
            duration_minutes: minutes,
            body_weight_kg: 80.0,
            completed_set_count: sets,
            reps_total: reps,
        }
    }

    #[test]
    fn duration_is_clamped() {
        let start = Utc::now();
        assert_eq!(session_duration_minutes(start, None), 1.0);
        assert_eq!(session_duration_minutes(start, Some(start - Duration::minutes(5))), 1.0);
        assert_eq!(session_duration_minutes(start, Some(start + Duration::minutes(45))), 45.0);
        assert_eq!(session_duration_minutes(start, Some(start + Duration::days(3))), 1440.0);
    }

    #[test]
    fn body_weight_falls_back_to_default() {
        let resolved = resolve_calories_body_weight_kg(None, WeightUnit::Kg);
        assert_eq!(resolved.kg, DEFAULT_BODY_WEIGHT_KG);
        assert!(resolved.uses_default_body_weight);

        let resolved = resolve_calories_body_weight_kg(Some(0.0), WeightUnit::Kg);
        assert!(resolved.uses_default_body_weight);

        let resolved = resolve_calories_body_weight_kg(Some(200.0), WeightUnit::Lb);
        assert!((resolved.kg - 90.718_474).abs() < 1e-9);
        assert!(!resolved.uses_default_body_weight);
    }

    #[test]
    fn idle_session_uses_moderate_met() {
        // density 0 -> MET 3.5 -> 3.5 * 3.5 * 80 * 60 / 200
        let kcal = estimate_strength_training_calories(&input(60.0, 0.0, 0.0));
        assert!((kcal - 294.0).abs() < 1e-9);
    }

    #[test]
    fn saturated_density_uses_vigorous_met() {
        let kcal = estimate_strength_training_calories(&input(10.0, 100.0, 1000.0));
        assert!((kcal - 6.0 * 3.5 * 80.0 * 10.0 / 200.0).abs() < 1e-9);
    }

    #[test]
    fn partial_density_blends_components() {
        // 0.625 sets/min -> 0.5, 11.5 reps/min -> 0.5 => density 0.5, MET 4.75
        let kcal = estimate_strength_training_calories(&input(40.0, 25.0, 460.0));
        assert!((kcal - 4.75 * 3.5 * 80.0 * 40.0 / 200.0).abs() < 1e-9);
    }

    #[test]
    fn monotonic_in_sets_and_reps() {
        let mut previous = 0.0;
        for sets in 0..60 {
            let kcal = estimate_strength_training_calories(&input(30.0, f64::from(sets), 100.0));
            assert!(kcal >= previous);
            previous = kcal;
        }
        previous = 0.0;
        for reps in (0..1000).step_by(10) {
            let kcal = estimate_strength_training_calories(&input(30.0, 10.0, f64::from(reps)));
            assert!(kcal >= previous);
            previous = kcal;
        }
    }

    #[test]
    fn zero_duration_does_not_divide_by_zero() {
        let kcal = estimate_strength_training_calories(&input(0.0, 5.0, 50.0));
        assert!(kcal.is_finite());
        assert_eq!(kcal, 0.0);
    }
}
