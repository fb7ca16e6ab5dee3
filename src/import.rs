//src/import.rs
//! Repairs loosely structured workout plans (typically model output) into
//! [`WorkoutDraft`]s. Every correction is recorded in `changes`; anything that
//! cannot be repaired ends up in `errors` and no drafts are produced.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;

use crate::models::{ExerciseDraft, SetDraft, WorkoutDraft};

pub const IMPORT_SCHEMA_VERSION: &str = "1.0";
pub const SUPPORTED_LOCALES: &[&str] = &["de", "en"];

const ROOT_FIELDS: &[&str] = &["schemaVersion", "locale", "workouts"];
const WORKOUT_FIELDS: &[&str] = &["name", "icon", "exercises"];
const EXERCISE_FIELDS: &[&str] = &["name", "notes", "x2Enabled", "negativeWeightEnabled", "sets"];
const SET_FIELDS: &[&str] = &["targetReps", "reps", "targetWeight", "weight"];
const MAX_TARGET_REPS: f64 = 1000.0;

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImportRepairResult {
    pub repaired_object: Option<Value>,
    pub drafts: Vec<WorkoutDraft>,
    pub changes: Vec<String>,
    pub errors: Vec<String>,
}

impl ImportRepairResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.drafts.is_empty()
    }
}

// Strict shape of a repaired payload. Deserializing into it is the final gate.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ImportDocument {
    schema_version: String,
    #[serde(default)]
    locale: Option<String>,
    workouts: Vec<ImportWorkout>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ImportWorkout {
    name: String,
    #[serde(default)]
    icon: Option<String>,
    exercises: Vec<ImportExercise>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ImportExercise {
    name: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    x2_enabled: bool,
    #[serde(default)]
    negative_weight_enabled: bool,
    sets: Vec<ImportSet>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ImportSet {
    target_reps: i64,
    target_weight: f64,
}

impl ImportDocument {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.schema_version != IMPORT_SCHEMA_VERSION {
            errors.push(format!("schemaVersion: expected \"{IMPORT_SCHEMA_VERSION}\""));
        }
        if let Some(locale) = &self.locale {
            if !SUPPORTED_LOCALES.contains(&locale.as_str()) {
                errors.push(format!("locale: unsupported value \"{locale}\""));
            }
        }
        if self.workouts.is_empty() {
            errors.push("workouts: must contain at least one workout".to_string());
        }
        for (w, workout) in self.workouts.iter().enumerate() {
            let path = format!("workouts[{w}]");
            if workout.name.trim().is_empty() {
                errors.push(format!("{path}.name: must not be empty"));
            }
            if workout.exercises.is_empty() {
                errors.push(format!("{path}.exercises: must contain at least one exercise"));
            }
            for (e, exercise) in workout.exercises.iter().enumerate() {
                let path = format!("{path}.exercises[{e}]");
                if exercise.name.trim().is_empty() {
                    errors.push(format!("{path}.name: must not be empty"));
                }
                if exercise.sets.is_empty() {
                    errors.push(format!("{path}.sets: must contain at least one set"));
                }
                for (s, set) in exercise.sets.iter().enumerate() {
                    if set.target_reps <= 0 {
                        errors.push(format!("{path}.sets[{s}].targetReps: must be positive"));
                    }
                    if !set.target_weight.is_finite() || set.target_weight < 0.0 {
                        errors.push(format!("{path}.sets[{s}].targetWeight: must be a non-negative number"));
                    }
                }
            }
        }
        errors
    }

    fn into_drafts(self) -> Vec<WorkoutDraft> {
        self.workouts
            .into_iter()
            .map(|workout| WorkoutDraft {
                name: workout.name,
                icon: workout.icon,
                exercises: workout
                    .exercises
                    .into_iter()
                    .map(|exercise| ExerciseDraft {
                        name: exercise.name,
                        notes: exercise.notes,
                        ai_info: None,
                        x2_enabled: exercise.x2_enabled,
                        negative_weight_enabled: exercise.negative_weight_enabled,
                        sets: exercise
                            .sets
                            .into_iter()
                            .map(|set| SetDraft {
                                target_reps: set.target_reps,
                                target_weight: set.target_weight,
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Parses a number or a numeric string ("8", " 62,5 ").
fn coerce_number(value: &Value) -> Option<(f64, bool)> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(|v| (v, false)),
        Value::String(s) => s
            .trim()
            .replace(',', ".")
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| (v, true)),
        _ => None,
    }
}

#[derive(Default)]
struct Repairer {
    changes: Vec<String>,
}

impl Repairer {
    fn note(&mut self, path: &str, message: impl Display) {
        self.changes.push(format!("{path}: {message}"));
    }

    fn drop_unknown_fields(&mut self, path: &str, object: &Map<String, Value>, known: &[&str]) {
        for key in object.keys().filter(|k| !known.contains(&k.as_str())) {
            self.note(&join(path, key), "unknown field dropped");
        }
    }

    /// Returns the value under `canonical`, or under `alias` (recording the rename).
    fn aliased<'a>(
        &mut self,
        path: &str,
        object: &'a Map<String, Value>,
        canonical: &str,
        alias: &str,
    ) -> Option<&'a Value> {
        if let Some(value) = object.get(canonical) {
            if object.contains_key(alias) {
                self.note(&join(path, alias), format!("ignored, {canonical} is present"));
            }
            return Some(value);
        }
        let value = object.get(alias)?;
        self.note(&join(path, alias), format!("renamed to {canonical}"));
        Some(value)
    }

    fn number(&mut self, path: &str, value: &Value) -> Option<f64> {
        let (number, from_string) = coerce_number(value)?;
        if from_string {
            self.note(path, format!("converted string {value} to number {number}"));
        }
        Some(number)
    }

    fn trimmed_name(&mut self, path: &str, object: &Map<String, Value>) -> Option<String> {
        let raw = object.get("name").and_then(Value::as_str)?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed != raw {
            self.note(&join(path, "name"), "surrounding whitespace trimmed");
        }
        Some(trimmed.to_string())
    }

    fn optional_string(
        &mut self,
        path: &str,
        object: &Map<String, Value>,
        key: &str,
        out: &mut Map<String, Value>,
    ) {
        match object.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => {
                out.insert(key.to_string(), Value::String(s.clone()));
            }
            Some(_) => self.note(&join(path, key), "not a string, dropped"),
        }
    }

    fn optional_bool(
        &mut self,
        path: &str,
        object: &Map<String, Value>,
        key: &str,
        out: &mut Map<String, Value>,
    ) {
        match object.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::Bool(b)) => {
                out.insert(key.to_string(), Value::Bool(*b));
            }
            Some(_) => self.note(&join(path, key), "not a boolean, dropped"),
        }
    }

    fn repair_set(&mut self, path: &str, value: &Value) -> Option<Value> {
        let Some(set) = value.as_object() else {
            self.note(path, "set is not an object, dropped");
            return None;
        };
        self.drop_unknown_fields(path, set, SET_FIELDS);

        let reps_path = join(path, "targetReps");
        let reps = match self.aliased(path, set, "targetReps", "reps") {
            Some(raw) => self.number(&reps_path, raw),
            None => None,
        };
        let Some(reps) = reps else {
            self.note(path, "set has no numeric targetReps, dropped");
            return None;
        };
        let normalized = reps.abs().round();
        if normalized < 1.0 {
            self.note(path, format!("targetReps {reps} is not positive, set dropped"));
            return None;
        }
        if normalized > MAX_TARGET_REPS {
            self.note(
                path,
                format!("targetReps {reps} exceeds {MAX_TARGET_REPS}, set dropped"),
            );
            return None;
        }
        if normalized != reps {
            self.note(&reps_path, format!("adjusted {reps} to {normalized}"));
        }

        let weight_path = join(path, "targetWeight");
        let weight = match self.aliased(path, set, "targetWeight", "weight") {
            None => {
                self.note(&weight_path, "missing, defaulted to 0");
                0.0
            }
            Some(raw) => match self.number(&weight_path, raw) {
                Some(weight) if weight < 0.0 => {
                    self.note(&weight_path, format!("clamped {weight} to 0"));
                    0.0
                }
                Some(weight) => weight,
                None => {
                    self.note(&weight_path, format!("invalid value {raw}, defaulted to 0"));
                    0.0
                }
            },
        };

        let mut repaired = Map::new();
        repaired.insert("targetReps".to_string(), Value::from(normalized as i64));
        repaired.insert("targetWeight".to_string(), Value::from(weight));
        Some(Value::Object(repaired))
    }

    fn repair_exercise(&mut self, path: &str, value: &Value) -> Option<Value> {
        let Some(exercise) = value.as_object() else {
            self.note(path, "exercise is not an object, dropped");
            return None;
        };
        let Some(name) = self.trimmed_name(path, exercise) else {
            self.note(path, "exercise has no name, dropped");
            return None;
        };
        let Some(sets) = exercise.get("sets").and_then(Value::as_array).filter(|s| !s.is_empty())
        else {
            self.note(path, format!("exercise \"{name}\" has no sets, dropped"));
            return None;
        };
        self.drop_unknown_fields(path, exercise, EXERCISE_FIELDS);

        let repaired_sets: Vec<Value> = sets
            .iter()
            .enumerate()
            .filter_map(|(s, set)| self.repair_set(&format!("{path}.sets[{s}]"), set))
            .collect();
        if repaired_sets.is_empty() {
            self.note(path, format!("exercise \"{name}\" has no valid sets left, dropped"));
            return None;
        }

        let mut repaired = Map::new();
        repaired.insert("name".to_string(), Value::String(name));
        self.optional_string(path, exercise, "notes", &mut repaired);
        self.optional_bool(path, exercise, "x2Enabled", &mut repaired);
        self.optional_bool(path, exercise, "negativeWeightEnabled", &mut repaired);
        repaired.insert("sets".to_string(), Value::Array(repaired_sets));
        Some(Value::Object(repaired))
    }

    fn repair_workout(&mut self, path: &str, value: &Value) -> Option<Value> {
        let Some(workout) = value.as_object() else {
            self.note(path, "workout is not an object, dropped");
            return None;
        };
        let Some(name) = self.trimmed_name(path, workout) else {
            self.note(path, "workout has no name, dropped");
            return None;
        };
        let Some(exercises) = workout.get("exercises").and_then(Value::as_array) else {
            self.note(path, format!("workout \"{name}\" has no exercises array, dropped"));
            return None;
        };
        self.drop_unknown_fields(path, workout, WORKOUT_FIELDS);

        let repaired_exercises: Vec<Value> = exercises
            .iter()
            .enumerate()
            .filter_map(|(e, exercise)| {
                self.repair_exercise(&format!("{path}.exercises[{e}]"), exercise)
            })
            .collect();
        if repaired_exercises.is_empty() {
            self.note(path, format!("workout \"{name}\" has no valid exercises left, dropped"));
            return None;
        }

        let mut repaired = Map::new();
        repaired.insert("name".to_string(), Value::String(name));
        self.optional_string(path, workout, "icon", &mut repaired);
        repaired.insert("exercises".to_string(), Value::Array(repaired_exercises));
        Some(Value::Object(repaired))
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Normalizes an arbitrary JSON payload into workout drafts. Never panics;
/// the result is a pure function of the input.
#[must_use]
pub fn repair_import_payload(payload: &Value) -> ImportRepairResult {
    let mut repairer = Repairer::default();

    let Some(root) = payload.as_object() else {
        return ImportRepairResult {
            errors: vec!["root: expected a JSON object".to_string()],
            ..Default::default()
        };
    };
    repairer.drop_unknown_fields("", root, ROOT_FIELDS);

    let mut repaired = Map::new();
    match root.get("schemaVersion") {
        Some(Value::String(v)) if v == IMPORT_SCHEMA_VERSION => {}
        None => repairer.note("schemaVersion", format!("missing, set to \"{IMPORT_SCHEMA_VERSION}\"")),
        Some(other) => repairer.note(
            "schemaVersion",
            format!("{other} replaced with \"{IMPORT_SCHEMA_VERSION}\""),
        ),
    }
    repaired.insert(
        "schemaVersion".to_string(),
        Value::String(IMPORT_SCHEMA_VERSION.to_string()),
    );

    match root.get("locale") {
        None => {}
        Some(Value::String(locale)) if SUPPORTED_LOCALES.contains(&locale.as_str()) => {
            repaired.insert("locale".to_string(), Value::String(locale.clone()));
        }
        Some(other) => repairer.note("locale", format!("unsupported value {other} dropped")),
    }

    let Some(workouts) = root.get("workouts").and_then(Value::as_array) else {
        return ImportRepairResult {
            changes: repairer.changes,
            errors: vec!["workouts: expected an array".to_string()],
            ..Default::default()
        };
    };

    let repaired_workouts: Vec<Value> = workouts
        .iter()
        .enumerate()
        .filter_map(|(w, workout)| repairer.repair_workout(&format!("workouts[{w}]"), workout))
        .collect();
    let survivors = repaired_workouts.len();
    repaired.insert("workouts".to_string(), Value::Array(repaired_workouts));
    let repaired = Value::Object(repaired);

    let mut result = ImportRepairResult {
        repaired_object: Some(repaired.clone()),
        drafts: Vec::new(),
        changes: repairer.changes,
        errors: Vec::new(),
    };

    if survivors == 0 {
        result
            .errors
            .push("workouts: no valid workouts remain after repair".to_string());
        return result;
    }

    match serde_json::from_value::<ImportDocument>(repaired) {
        Err(e) => result.errors.push(format!("schema: {e}")),
        Ok(document) => {
            result.errors = document.validate();
            if result.errors.is_empty() {
                result.drafts = document.into_drafts();
            }
        }
    }

    tracing::debug!(
        drafts = result.drafts.len(),
        changes = result.changes.len(),
        errors = result.errors.len(),
        "Import payload repaired"
    );
    result
}

/// Extracts the outermost `{...}` from free-form text, which also strips any
/// surrounding Markdown code fence.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parses model output (or a plain JSON file) and repairs it.
#[must_use]
pub fn parse_import_text(text: &str) -> ImportRepairResult {
    let Some(json) = extract_json_object(text) else {
        return ImportRepairResult {
            errors: vec!["input: no JSON object found".to_string()],
            ..Default::default()
        };
    };
    match serde_json::from_str::<Value>(json) {
        Ok(payload) => repair_import_payload(&payload),
        Err(e) => {
            tracing::warn!(error = %e, "Import text is not valid JSON");
            ImportRepairResult {
                errors: vec![format!("input: invalid JSON ({e})")],
                ..Default::default()
            }
        }
    }
}

/// Records `default_locale` on a repaired payload that didn't name one.
/// Unsupported locales and failed repairs are left untouched.
pub fn apply_default_locale(result: &mut ImportRepairResult, default_locale: &str) {
    if !SUPPORTED_LOCALES.contains(&default_locale) {
        return;
    }
    let Some(Value::Object(repaired)) = result.repaired_object.as_mut() else {
        return;
    };
    if repaired.contains_key("locale") {
        return;
    }
    repaired.insert("locale".to_string(), Value::String(default_locale.to_string()));
    result
        .changes
        .push(format!("locale: missing, set to \"{default_locale}\""));
}

/// [`parse_import_text`] followed by [`apply_default_locale`].
#[must_use]
pub fn parse_import_text_with_locale(text: &str, default_locale: &str) -> ImportRepairResult {
    let mut result = parse_import_text(text);
    apply_default_locale(&mut result, default_locale);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repairs_aliases_and_string_numbers() {
        let payload = json!({"workouts":[{"name":"Legs","exercises":[{"name":"Squat","sets":[{"reps":"8","weight":"60"}]}]}]});
        let result = repair_import_payload(&payload);

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert!(result.changes.len() >= 4, "{:?}", result.changes);
        assert!(result.changes.iter().any(|c| c.starts_with("schemaVersion:")));
        assert!(result
            .changes
            .iter()
            .any(|c| c == "workouts[0].exercises[0].sets[0].reps: renamed to targetReps"));
        assert_eq!(result.drafts.len(), 1);
        let workout = &result.drafts[0];
        assert_eq!(workout.name, "Legs");
        assert_eq!(workout.exercises.len(), 1);
        assert_eq!(workout.exercises[0].name, "Squat");
        assert_eq!(
            workout.exercises[0].sets,
            vec![SetDraft { target_reps: 8, target_weight: 60.0 }]
        );
        assert_eq!(
            result.repaired_object.as_ref().and_then(|v| v.get("schemaVersion")),
            Some(&json!("1.0"))
        );
    }

    #[test]
    fn repair_is_deterministic() {
        let payload = json!({
            "schemaVersion": 2,
            "locale": "fr",
            "extra": true,
            "workouts": [
                {"name": " Push ", "exercises": [
                    {"name": "Bench", "sets": [{"targetReps": -7.6, "targetWeight": "-5"}, {"reps": "x"}], "tempo": "3-1-1"},
                    {"name": "", "sets": [{"reps": 5}]}
                ]},
                "garbage"
            ]
        });
        let first = repair_import_payload(&payload);
        let second = repair_import_payload(&payload);
        assert_eq!(first, second);
        assert!(first.errors.is_empty(), "{:?}", first.errors);
        let sets = &first.drafts[0].exercises[0].sets;
        assert_eq!(sets, &vec![SetDraft { target_reps: 8, target_weight: 0.0 }]);
        assert_eq!(first.drafts[0].name, "Push");
        assert!(first.changes.iter().any(|c| c == "locale: unsupported value \"fr\" dropped"));
        assert!(first.changes.iter().any(|c| c == "extra: unknown field dropped"));
        assert!(first.changes.iter().any(|c| c.starts_with("workouts[1]:")));
    }

    #[test]
    fn absurd_rep_counts_drop_the_set() {
        let payload = json!({"workouts":[{"name":"A","exercises":[{"name":"Row","sets":[
            {"targetReps":1e30,"targetWeight":50},
            {"targetReps":12,"targetWeight":50}
        ]}]}]});
        let result = repair_import_payload(&payload);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            result.drafts[0].exercises[0].sets,
            vec![SetDraft { target_reps: 12, target_weight: 50.0 }]
        );
        assert!(result
            .changes
            .iter()
            .any(|c| c.starts_with("workouts[0].exercises[0].sets[0]: targetReps") && c.ends_with("set dropped")));
    }

    #[test]
    fn default_locale_fills_only_missing_locale() {
        let text = r#"{"workouts":[{"name":"A","exercises":[{"name":"Row","sets":[{"targetReps":10,"targetWeight":40}]}]}]}"#;
        let result = parse_import_text_with_locale(text, "de");
        assert_eq!(
            result.repaired_object.as_ref().and_then(|v| v.get("locale")),
            Some(&json!("de"))
        );
        assert!(result.changes.iter().any(|c| c == "locale: missing, set to \"de\""));

        let text = r#"{"locale":"en","workouts":[{"name":"A","exercises":[{"name":"Row","sets":[{"targetReps":10,"targetWeight":40}]}]}]}"#;
        let result = parse_import_text_with_locale(text, "de");
        assert_eq!(
            result.repaired_object.as_ref().and_then(|v| v.get("locale")),
            Some(&json!("en"))
        );
        assert!(!result.changes.iter().any(|c| c.starts_with("locale:")));
    }

    #[test]
    fn comma_decimals_are_accepted() {
        let payload = json!({"workouts":[{"name":"A","exercises":[{"name":"Row","sets":[{"targetReps":10,"targetWeight":"62,5"}]}]}]});
        let result = repair_import_payload(&payload);
        assert_eq!(result.drafts[0].exercises[0].sets[0].target_weight, 62.5);
    }

    #[test]
    fn fatal_shapes_produce_errors_not_panics() {
        let result = repair_import_payload(&json!([1, 2, 3]));
        assert_eq!(result.errors, vec!["root: expected a JSON object".to_string()]);
        assert!(result.repaired_object.is_none());

        let result = repair_import_payload(&json!({"workouts": "none"}));
        assert_eq!(result.errors, vec!["workouts: expected an array".to_string()]);

        let result = repair_import_payload(&json!({"workouts": [{"name": "Empty", "exercises": []}]}));
        assert!(result.drafts.is_empty());
        assert_eq!(
            result.errors,
            vec!["workouts: no valid workouts remain after repair".to_string()]
        );
        assert!(!result.is_success());
    }

    #[test]
    fn parses_fenced_model_output() {
        let text = "Here is your plan:\n```json\n{\"schemaVersion\":\"1.0\",\"locale\":\"de\",\"workouts\":[{\"name\":\"Oberkörper\",\"exercises\":[{\"name\":\"Klimmzug\",\"sets\":[{\"targetReps\":6,\"targetWeight\":0}]}]}]}\n```\nEnjoy!";
        let result = parse_import_text(text);
        assert!(result.is_success(), "{:?}", result.errors);
        assert!(result.changes.is_empty(), "{:?}", result.changes);
        assert_eq!(result.drafts[0].name, "Oberkörper");

        let result = parse_import_text("no json here");
        assert_eq!(result.errors, vec!["input: no JSON object found".to_string()]);
    }
}
