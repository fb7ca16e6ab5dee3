//src/catalog.rs
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::models::{ExerciseAiInfo, MuscleTarget};

/// Top-level muscle groups used for weekly reporting.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display,
    EnumIter, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MuscleGroup {
    Back,
    Shoulders,
    Core,
    Arms,
    Chest,
    Legs,
}

const MUSCLE_KEY_GROUPS: &[(&str, MuscleGroup)] = &[
    ("latissimus_dorsi", MuscleGroup::Back),
    ("trapezius_upper", MuscleGroup::Back),
    ("trapezius_middle", MuscleGroup::Back),
    ("trapezius_lower", MuscleGroup::Back),
    ("rhomboids", MuscleGroup::Back),
    ("teres_major", MuscleGroup::Back),
    ("erector_spinae", MuscleGroup::Back),
    ("deltoid_anterior", MuscleGroup::Shoulders),
    ("deltoid_lateral", MuscleGroup::Shoulders),
    ("deltoid_posterior", MuscleGroup::Shoulders),
    ("rotator_cuff", MuscleGroup::Shoulders),
    ("rectus_abdominis", MuscleGroup::Core),
    ("obliques", MuscleGroup::Core),
    ("transverse_abdominis", MuscleGroup::Core),
    ("biceps_brachii", MuscleGroup::Arms),
    ("brachialis", MuscleGroup::Arms),
    ("brachioradialis", MuscleGroup::Arms),
    ("triceps_long_head", MuscleGroup::Arms),
    ("triceps_lateral_head", MuscleGroup::Arms),
    ("triceps_medial_head", MuscleGroup::Arms),
    ("forearm_flexors", MuscleGroup::Arms),
    ("forearm_extensors", MuscleGroup::Arms),
    ("pectoralis_major_clavicular", MuscleGroup::Chest),
    ("pectoralis_major_sternal", MuscleGroup::Chest),
    ("pectoralis_minor", MuscleGroup::Chest),
    ("serratus_anterior", MuscleGroup::Chest),
    ("quadriceps", MuscleGroup::Legs),
    ("hamstrings", MuscleGroup::Legs),
    ("gluteus_maximus", MuscleGroup::Legs),
    ("gluteus_medius", MuscleGroup::Legs),
    ("adductors", MuscleGroup::Legs),
    ("hip_flexors", MuscleGroup::Legs),
    ("gastrocnemius", MuscleGroup::Legs),
    ("soleus", MuscleGroup::Legs),
];

const MUSCLE_KEY_PREFIXES: &[(&str, MuscleGroup)] = &[
    ("trapezius", MuscleGroup::Back),
    ("latissimus", MuscleGroup::Back),
    ("deltoid", MuscleGroup::Shoulders),
    ("abdominis", MuscleGroup::Core),
    ("biceps", MuscleGroup::Arms),
    ("triceps", MuscleGroup::Arms),
    ("forearm", MuscleGroup::Arms),
    ("pectoralis", MuscleGroup::Chest),
    ("gluteus", MuscleGroup::Legs),
    ("vastus", MuscleGroup::Legs),
    ("quadriceps", MuscleGroup::Legs),
    ("calf", MuscleGroup::Legs),
];

/// Maps a canonical muscle key (e.g. `triceps_long_head`) to its group.
/// Unknown granular keys fall back to a prefix match.
#[must_use]
pub fn muscle_group_for_key(muscle_key: &str) -> Option<MuscleGroup> {
    let key = muscle_key.trim().to_lowercase();
    MUSCLE_KEY_GROUPS
        .iter()
        .find(|(known, _)| *known == key)
        .or_else(|| {
            MUSCLE_KEY_PREFIXES
                .iter()
                .find(|(prefix, _)| key.starts_with(prefix))
        })
        .map(|&(_, group)| group)
}

/// Lowercases, collapses anything non-alphanumeric into single spaces and trims.
#[must_use]
pub fn normalize_exercise_name(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of a catalog lookup for one exercise name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseInfo {
    pub target_muscles: Vec<MuscleTarget>,
    pub execution_guide: Vec<String>,
    pub coaching_tips: Vec<String>,
    pub matched_exercise_name: String,
    pub match_strategy: String,
    pub match_score: f64,
}

impl From<ExerciseInfo> for ExerciseAiInfo {
    fn from(info: ExerciseInfo) -> Self {
        Self {
            target_muscles: info.target_muscles,
            execution_guide: info.execution_guide,
            coaching_tips: info.coaching_tips,
        }
    }
}

/// Source of muscle-involvement data for exercises.
pub trait ExerciseCatalog {
    fn lookup(&self, exercise_name: &str) -> Option<ExerciseInfo>;
}

struct CatalogEntry {
    name: &'static str,
    muscles: &'static [(&'static str, &'static str, f64)],
    guide: &'static [&'static str],
}

const BUILTIN_EXERCISES: &[CatalogEntry] = &[
    CatalogEntry {
        name: "Bench Press",
        muscles: &[
            ("pectoralis_major_sternal", "Chest (sternal)", 45.0),
            ("pectoralis_major_clavicular", "Chest (clavicular)", 15.0),
            ("triceps_lateral_head", "Triceps", 20.0),
            ("deltoid_anterior", "Front delts", 20.0),
        ],
        guide: &["Retract the shoulder blades", "Lower the bar to mid chest", "Press up and slightly back"],
    },
    CatalogEntry {
        name: "Squat",
        muscles: &[
            ("quadriceps", "Quadriceps", 50.0),
            ("gluteus_maximus", "Glutes", 30.0),
            ("adductors", "Adductors", 10.0),
            ("erector_spinae", "Lower back", 10.0),
        ],
        guide: &["Brace the core", "Sit down between the hips", "Drive up through the whole foot"],
    },
    CatalogEntry {
        name: "Deadlift",
        muscles: &[
            ("hamstrings", "Hamstrings", 25.0),
            ("gluteus_maximus", "Glutes", 25.0),
            ("erector_spinae", "Lower back", 25.0),
            ("trapezius_upper", "Traps", 10.0),
            ("quadriceps", "Quadriceps", 10.0),
            ("forearm_flexors", "Grip", 5.0),
        ],
        guide: &["Bar over mid foot", "Hinge with a neutral spine", "Push the floor away"],
    },
    CatalogEntry {
        name: "Overhead Press",
        muscles: &[
            ("deltoid_anterior", "Front delts", 45.0),
            ("deltoid_lateral", "Side delts", 20.0),
            ("triceps_long_head", "Triceps", 25.0),
            ("trapezius_upper", "Traps", 10.0),
        ],
        guide: &["Squeeze glutes", "Press in a straight line", "Move the head through at lockout"],
    },
    CatalogEntry {
        name: "Barbell Row",
        muscles: &[
            ("latissimus_dorsi", "Lats", 35.0),
            ("rhomboids", "Rhomboids", 20.0),
            ("trapezius_middle", "Mid traps", 15.0),
            ("deltoid_posterior", "Rear delts", 15.0),
            ("biceps_brachii", "Biceps", 15.0),
        ],
        guide: &["Hinge to roughly 45 degrees", "Pull to the lower ribs", "Control the descent"],
    },
    CatalogEntry {
        name: "Pull Up",
        muscles: &[
            ("latissimus_dorsi", "Lats", 50.0),
            ("biceps_brachii", "Biceps", 20.0),
            ("teres_major", "Teres major", 10.0),
            ("trapezius_lower", "Lower traps", 10.0),
            ("forearm_flexors", "Grip", 10.0),
        ],
        guide: &["Start from a dead hang", "Pull elbows to the ribs", "Chin over the bar"],
    },
    CatalogEntry {
        name: "Biceps Curl",
        muscles: &[
            ("biceps_brachii", "Biceps", 70.0),
            ("brachialis", "Brachialis", 20.0),
            ("brachioradialis", "Brachioradialis", 10.0),
        ],
        guide: &["Keep elbows pinned", "Full range of motion"],
    },
    CatalogEntry {
        name: "Triceps Pushdown",
        muscles: &[
            ("triceps_lateral_head", "Triceps (lateral)", 50.0),
            ("triceps_medial_head", "Triceps (medial)", 30.0),
            ("triceps_long_head", "Triceps (long)", 20.0),
        ],
        guide: &["Elbows at the sides", "Lock out at the bottom"],
    },
    CatalogEntry {
        name: "Lunge",
        muscles: &[
            ("quadriceps", "Quadriceps", 45.0),
            ("gluteus_maximus", "Glutes", 35.0),
            ("adductors", "Adductors", 10.0),
            ("gluteus_medius", "Glute med", 10.0),
        ],
        guide: &["Long stride", "Back knee toward the floor"],
    },
    CatalogEntry {
        name: "Plank",
        muscles: &[
            ("rectus_abdominis", "Abs", 50.0),
            ("transverse_abdominis", "Deep core", 30.0),
            ("obliques", "Obliques", 20.0),
        ],
        guide: &["Straight line from head to heels", "Breathe behind the brace"],
    },
    CatalogEntry {
        name: "Lat Pulldown",
        muscles: &[
            ("latissimus_dorsi", "Lats", 55.0),
            ("biceps_brachii", "Biceps", 20.0),
            ("teres_major", "Teres major", 15.0),
            ("rhomboids", "Rhomboids", 10.0),
        ],
        guide: &["Lean back slightly", "Pull the bar to the upper chest"],
    },
    CatalogEntry {
        name: "Leg Press",
        muscles: &[
            ("quadriceps", "Quadriceps", 60.0),
            ("gluteus_maximus", "Glutes", 30.0),
            ("hamstrings", "Hamstrings", 10.0),
        ],
        guide: &["Feet shoulder width", "Do not lock the knees"],
    },
    CatalogEntry {
        name: "Calf Raise",
        muscles: &[("gastrocnemius", "Calves", 70.0), ("soleus", "Soleus", 30.0)],
        guide: &["Pause at the top", "Full stretch at the bottom"],
    },
    CatalogEntry {
        name: "Dip",
        muscles: &[
            ("pectoralis_major_sternal", "Chest", 40.0),
            ("triceps_long_head", "Triceps", 40.0),
            ("deltoid_anterior", "Front delts", 20.0),
        ],
        guide: &["Lean forward slightly", "Shoulders stay down"],
    },
];

/// Small built-in catalog matching common lifts by exact or contained name.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinCatalog;

impl BuiltinCatalog {
    fn to_info(entry: &CatalogEntry, strategy: &str, score: f64) -> ExerciseInfo {
        ExerciseInfo {
            target_muscles: entry
                .muscles
                .iter()
                .map(|&(key, muscle, percent)| MuscleTarget {
                    muscle_key: key.to_string(),
                    muscle: muscle.to_string(),
                    involvement_percent: percent,
                })
                .collect(),
            execution_guide: entry.guide.iter().map(|s| (*s).to_string()).collect(),
            coaching_tips: Vec::new(),
            matched_exercise_name: entry.name.to_string(),
            match_strategy: strategy.to_string(),
            match_score: score,
        }
    }
}

impl ExerciseCatalog for BuiltinCatalog {
    fn lookup(&self, exercise_name: &str) -> Option<ExerciseInfo> {
        let query = normalize_exercise_name(exercise_name);
        if query.is_empty() {
            return None;
        }

        if let Some(entry) = BUILTIN_EXERCISES
            .iter()
            .find(|e| normalize_exercise_name(e.name) == query)
        {
            return Some(Self::to_info(entry, "exact", 1.0));
        }

        // "Incline Bench Press" -> "Bench Press": prefer the longest contained name.
        let padded_query = format!(" {query} ");
        BUILTIN_EXERCISES
            .iter()
            .map(|e| (e, normalize_exercise_name(e.name)))
            .filter(|(_, name)| padded_query.contains(&format!(" {name} ")))
            .max_by_key(|(_, name)| name.len())
            .map(|(entry, name)| {
                let score = name.len() as f64 / query.len() as f64;
                Self::to_info(entry, "contains", score)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn maps_known_and_prefixed_keys() {
        assert_eq!(muscle_group_for_key("triceps_long_head"), Some(MuscleGroup::Arms));
        assert_eq!(muscle_group_for_key("Deltoid_Anterior"), Some(MuscleGroup::Shoulders));
        assert_eq!(muscle_group_for_key("vastus_medialis"), Some(MuscleGroup::Legs));
        assert_eq!(muscle_group_for_key("earlobe"), None);
    }

    #[test]
    fn builtin_entries_use_known_keys_and_sum_to_100() {
        for entry in BUILTIN_EXERCISES {
            let total: f64 = entry.muscles.iter().map(|m| m.2).sum();
            assert!((total - 100.0).abs() < 1e-9, "{} sums to {total}", entry.name);
            for (key, _, _) in entry.muscles {
                assert!(muscle_group_for_key(key).is_some(), "unknown key {key}");
            }
        }
    }

    #[test]
    fn normalizes_names() {
        assert_eq!(normalize_exercise_name("  Pull-Up (Wide) "), "pull up wide");
        assert_eq!(normalize_exercise_name("BENCH   press"), "bench press");
    }

    #[test]
    fn lookup_exact_and_contained() {
        let catalog = BuiltinCatalog;
        let exact = catalog.lookup("bench-press").unwrap();
        assert_eq!(exact.match_strategy, "exact");
        assert_eq!(exact.matched_exercise_name, "Bench Press");

        let contained = catalog.lookup("Incline Bench Press").unwrap();
        assert_eq!(contained.match_strategy, "contains");
        assert!(contained.match_score < 1.0);

        assert!(catalog.lookup("Underwater Basket Weaving").is_none());
    }

    #[test]
    fn six_groups() {
        assert_eq!(MuscleGroup::iter().count(), 6);
    }
}
