use anyhow::Result;
use liftlog::{
    AppService, Config, DbError, ErrorKind, ExerciseDraft, MuscleGroup, SessionSetUpdate,
    SetDraft, SettingsPatch, WeightUnit, WorkoutDraft,
};

// Helper function to create a test service with in-memory database
fn create_test_service() -> Result<AppService> {
    let conn = rusqlite::Connection::open_in_memory()?;
    AppService::from_connection(conn, Config::default())
}

fn leg_day() -> WorkoutDraft {
    WorkoutDraft {
        name: "Leg Day".to_string(),
        icon: Some("legs".to_string()),
        exercises: vec![
            ExerciseDraft {
                name: "Squat".to_string(),
                sets: vec![
                    SetDraft { target_reps: 5, target_weight: 100.0 },
                    SetDraft { target_reps: 5, target_weight: 100.0 },
                ],
                ..Default::default()
            },
            ExerciseDraft {
                name: "Lunge".to_string(),
                x2_enabled: true,
                sets: vec![SetDraft { target_reps: 10, target_weight: 20.0 }],
                ..Default::default()
            },
        ],
    }
}

fn count(service: &AppService, table: &str) -> Result<i64> {
    Ok(service
        .conn
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
}

#[test]
fn test_create_and_list_workouts() -> Result<()> {
    let mut service = create_test_service()?;
    let legs = service.create_workout(&leg_day())?;
    let push = service.create_workout(&WorkoutDraft {
        name: "  Push  ".to_string(),
        ..Default::default()
    })?;

    let workouts = service.list_workouts(false)?;
    let names: Vec<&str> = workouts.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["Leg Day", "Push"]);

    let detail = service.get_workout(legs)?.expect("workout exists");
    assert_eq!(detail.workout.icon.as_deref(), Some("legs"));
    assert_eq!(detail.exercises.len(), 2);
    assert_eq!(detail.exercises[0].exercise.order, 0);
    assert_eq!(detail.exercises[1].exercise.name, "Lunge");
    assert!(detail.exercises[1].exercise.x2_enabled);
    let orders: Vec<i64> = detail.exercises[0].sets.iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![0, 1]);

    service.archive_workout(push, true)?;
    assert_eq!(service.list_workouts(false)?.len(), 1);
    assert_eq!(service.list_workouts(true)?.len(), 2);
    service.archive_workout(push, false)?;
    assert_eq!(service.list_workouts(false)?.len(), 2);
    Ok(())
}

#[test]
fn test_workout_validation() -> Result<()> {
    let mut service = create_test_service()?;

    let err = service
        .create_workout(&WorkoutDraft { name: "   ".to_string(), ..Default::default() })
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<DbError>(), Some(DbError::EmptyName("Workout"))));

    let mut draft = leg_day();
    draft.exercises[0].sets[1].target_reps = 0;
    let err = service.create_workout(&draft).unwrap_err();
    assert_eq!(err.downcast_ref::<DbError>().map(DbError::kind), Some(ErrorKind::Validation));

    let mut draft = leg_day();
    draft.exercises[0].sets[0].target_weight = -5.0;
    assert!(service.create_workout(&draft).is_err());
    draft.exercises[0].negative_weight_enabled = true;
    assert!(service.create_workout(&draft).is_ok());

    // A bad draft in a bulk import leaves nothing behind.
    let before = count(&service, "workouts")?;
    let err = service
        .create_workouts_bulk(&[leg_day(), WorkoutDraft::default()])
        .unwrap_err();
    assert!(err.downcast_ref::<DbError>().is_some());
    assert_eq!(count(&service, "workouts")?, before);
    Ok(())
}

#[test]
fn test_update_workout_replaces_template() -> Result<()> {
    let mut service = create_test_service()?;
    let id = service.create_workout(&leg_day())?;

    let mut draft = leg_day();
    draft.name = "Legs Heavy".to_string();
    draft.exercises.remove(1);
    draft.exercises[0].sets.push(SetDraft { target_reps: 3, target_weight: 110.0 });
    service.update_workout(id, &draft)?;

    let detail = service.get_workout(id)?.expect("workout exists");
    assert_eq!(detail.workout.name, "Legs Heavy");
    assert_eq!(detail.exercises.len(), 1);
    assert_eq!(detail.exercises[0].sets.len(), 3);
    assert_eq!(detail.exercises[0].sets[2].target_weight, 110.0);
    assert_eq!(count(&service, "exercises")?, 1);
    assert_eq!(count(&service, "exercise_template_sets")?, 3);

    let err = service.update_workout(999, &draft).unwrap_err();
    assert!(matches!(err.downcast_ref::<DbError>(), Some(DbError::WorkoutNotFound(999))));
    Ok(())
}

#[test]
fn test_delete_workout_cascades() -> Result<()> {
    let mut service = create_test_service()?;
    let doomed = service.create_workout(&leg_day())?;
    let kept = service.create_workout(&WorkoutDraft {
        name: "Kept".to_string(),
        exercises: vec![ExerciseDraft {
            name: "Plank".to_string(),
            sets: vec![SetDraft { target_reps: 1, target_weight: 0.0 }],
            ..Default::default()
        }],
        ..Default::default()
    })?;

    let session = service.start_session(doomed)?;
    service.add_session_exercise(session, "Calf Raise")?;
    service.complete_session(session, false)?;
    service.start_session(doomed)?;

    service.delete_workout(doomed)?;

    assert!(service.get_workout(doomed)?.is_none());
    assert!(service.get_active_session()?.is_none());
    assert_eq!(count(&service, "sessions")?, 0);
    assert_eq!(count(&service, "session_exercise_sets")?, 0);
    assert_eq!(count(&service, "exercises")?, 1);
    assert_eq!(count(&service, "exercise_template_sets")?, 1);
    assert!(service.get_workout(kept)?.is_some());

    let err = service.delete_workout(doomed).unwrap_err();
    assert!(matches!(err.downcast_ref::<DbError>(), Some(DbError::WorkoutNotFound(id)) if *id == doomed));
    Ok(())
}

#[test]
fn test_seed_default_workouts_once() -> Result<()> {
    let mut service = create_test_service()?;
    assert!(service.ensure_default_workout()?);
    assert!(!service.ensure_default_workout()?);

    let names: Vec<String> = service
        .list_workouts(false)?
        .into_iter()
        .map(|w| w.name)
        .collect();
    assert_eq!(names, vec!["Full Body A".to_string(), "Full Body B".to_string()]);
    Ok(())
}

#[test]
fn test_settings_defaults_and_updates() -> Result<()> {
    let service = create_test_service()?;
    let settings = service.get_settings()?;
    assert_eq!(settings.id, 1);
    assert_eq!(settings.rest_timer_seconds, 90);
    assert!(settings.body_weight.is_none());

    let updated = service.update_settings(&SettingsPatch {
        weight_unit: Some(WeightUnit::Lb),
        body_weight: Some(Some(180.0)),
        weekly_workout_count_goal: Some(Some(3)),
        rest_timer_seconds: Some(120),
        ..Default::default()
    })?;
    assert_eq!(updated.weight_unit, WeightUnit::Lb);
    assert_eq!(updated.body_weight, Some(180.0));
    assert_eq!(updated.weekly_workout_count_goal, Some(3));
    assert_eq!(service.get_settings()?, updated);

    let cleared = service.update_settings(&SettingsPatch {
        body_weight: Some(None),
        ..Default::default()
    })?;
    assert!(cleared.body_weight.is_none());
    assert_eq!(cleared.rest_timer_seconds, 120);

    let err = service
        .update_settings(&SettingsPatch { rest_timer_seconds: Some(1), ..Default::default() })
        .unwrap_err();
    assert_eq!(err.downcast_ref::<DbError>().map(DbError::kind), Some(ErrorKind::Validation));
    let err = service
        .update_settings(&SettingsPatch { body_weight: Some(Some(-3.0)), ..Default::default() })
        .unwrap_err();
    assert_eq!(err.downcast_ref::<DbError>().map(DbError::kind), Some(ErrorKind::Validation));
    Ok(())
}

#[test]
fn test_session_summary_and_weekly_stats() -> Result<()> {
    let mut service = create_test_service()?;
    service.update_settings(&SettingsPatch {
        body_weight: Some(Some(80.0)),
        weekly_workout_count_goal: Some(Some(3)),
        ..Default::default()
    })?;
    let id = service.create_workout(&leg_day())?;
    let session_id = service.start_session(id)?;
    let sets = service.get_session(session_id)?.expect("session").sets;

    let done = SessionSetUpdate { completed: Some(true), ..Default::default() };
    service.update_session_set(sets[0].id, &done)?;
    service.update_session_set(sets[2].id, &done)?;
    service.complete_session(session_id, false)?;

    let summary = service.session_summary(session_id)?;
    assert_eq!(summary.completed_sets, 3.0);
    assert_eq!(summary.reps_total, 25.0);
    assert_eq!(summary.weight_total, 900.0);
    assert!(!summary.uses_default_body_weight);
    assert!(summary.calories > 0.0);

    let stats = service.weekly_stats(None)?;
    assert_eq!(stats.workout_count, 1);
    assert_eq!(stats.total_sets, 3.0);
    assert_eq!(stats.total_reps, 25.0);
    assert_eq!(stats.total_weight, 900.0);
    assert_eq!(stats.goals.workout_count, Some(3));
    assert!(stats.week_start <= stats.week_end);

    let legs = stats.muscle_groups.get(&MuscleGroup::Legs).expect("legs attributed");
    assert!(legs.sets > 0.0);
    let attributed: f64 = stats.muscle_groups.values().map(|m| m.sets).sum();
    assert!((attributed - stats.total_sets).abs() < 1e-9);

    let err = service.session_summary(12345).unwrap_err();
    assert!(matches!(err.downcast_ref::<DbError>(), Some(DbError::SessionNotFound(12345))));
    Ok(())
}

#[test]
fn test_import_plan_repairs_and_creates() -> Result<()> {
    let mut service = create_test_service()?;
    let text = r#"Sure! Here's the plan:
```json
{"workouts":[{"name":"Upper","exercises":[{"name":"Bench Press","sets":[{"reps":"8","weight":"60"},{"reps":8,"weight":60}]}]}]}
```"#;
    let imported = service.import_plan(text)?;
    assert_eq!(imported.workout_ids.len(), 1);
    assert!(imported
        .repair
        .changes
        .iter()
        .any(|c| c == "workouts[0].exercises[0].sets[0].reps: renamed to targetReps"));

    let detail = service.get_workout(imported.workout_ids[0])?.expect("workout exists");
    assert_eq!(detail.workout.name, "Upper");
    assert_eq!(detail.exercises[0].sets.len(), 2);
    assert_eq!(detail.exercises[0].sets[0].target_reps, 8);
    assert_eq!(detail.exercises[0].sets[0].target_weight, 60.0);
    Ok(())
}

#[test]
fn test_import_plan_rejects_unusable_input() -> Result<()> {
    let mut service = create_test_service()?;

    let err = service.import_plan("I could not make a plan, sorry.").unwrap_err();
    assert_eq!(err.downcast_ref::<DbError>().map(DbError::kind), Some(ErrorKind::Validation));

    let err = service.import_plan(r#"{"workouts": []}"#).unwrap_err();
    assert!(matches!(err.downcast_ref::<DbError>(), Some(DbError::Validation(msg)) if msg.contains("workouts")));
    assert!(service.list_workouts(true)?.is_empty());
    Ok(())
}

#[test]
fn test_backup_round_trip() -> Result<()> {
    let mut service = create_test_service()?;
    service.update_settings(&SettingsPatch { body_weight: Some(Some(72.5)), ..Default::default() })?;
    let id = service.create_workout(&leg_day())?;
    let session_id = service.start_session(id)?;
    let set = service.get_session(session_id)?.expect("session").sets[0].id;
    service.update_session_set(
        set,
        &SessionSetUpdate { actual_reps: Some(6), completed: Some(true), ..Default::default() },
    )?;
    service.complete_session(session_id, false)?;

    let json = service.export_backup_json()?;
    let original = service.export_backup()?;
    assert_eq!(original.backup_version, "1.0");
    assert_eq!(original.data.workouts.len(), 1);
    assert_eq!(original.data.session_exercise_sets.len(), 3);

    service.clear_all_data()?;
    assert!(service.list_workouts(true)?.is_empty());
    assert_eq!(count(&service, "sessions")?, 0);

    service.import_backup_json(&json)?;
    let restored = service.export_backup()?;
    assert_eq!(restored.data, original.data);
    assert_eq!(service.get_settings()?.body_weight, Some(72.5));
    let session = service.get_session(session_id)?.expect("session restored");
    assert_eq!(session.sets[0].actual_reps, Some(6));

    // New rows continue after the restored ids.
    let next = service.create_workout(&leg_day())?;
    assert!(next > id);
    Ok(())
}

#[test]
fn test_invalid_backup_changes_nothing() -> Result<()> {
    let mut service = create_test_service()?;
    service.create_workout(&leg_day())?;

    let err = service.import_backup_json("{not json").unwrap_err();
    assert!(matches!(err.downcast_ref::<DbError>(), Some(DbError::CorruptSnapshot(_))));

    let mut snapshot = service.export_backup()?;
    snapshot.data.workouts[0].id = 0;
    let err = service.import_backup(&snapshot).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DbError>(),
        Some(DbError::MissingPrimaryKey { table: "workouts" })
    ));
    assert_eq!(service.list_workouts(true)?.len(), 1);
    Ok(())
}

#[test]
fn test_update_safety_snapshots_rotate() -> Result<()> {
    let mut service = create_test_service()?;
    let id = service.create_workout(&leg_day())?;

    let mut ids = Vec::new();
    for previous in ["0.1.0", "0.2.0", "0.3.0", "0.4.0"] {
        ids.push(service.create_update_safety_snapshot(Some(previous))?);
    }
    let snapshots = service.list_update_safety_snapshots()?;
    assert_eq!(snapshots.len(), 3);
    let listed: Vec<i64> = snapshots.iter().map(|s| s.id).collect();
    assert_eq!(listed, vec![ids[3], ids[2], ids[1]]);
    assert_eq!(snapshots[0].previous_app_version.as_deref(), Some("0.4.0"));
    assert_eq!(snapshots[0].app_version, liftlog::APP_VERSION);

    service.delete_workout(id)?;
    let restored = service.restore_update_safety_snapshot(ids[3])?;
    assert_eq!(restored.data.workouts.len(), 1);
    assert!(service.get_workout(id)?.is_some());

    let err = service.restore_update_safety_snapshot(ids[0]).unwrap_err();
    assert!(matches!(err.downcast_ref::<DbError>(), Some(DbError::SnapshotNotFound(_))));
    Ok(())
}

#[test]
fn test_ensure_update_safety_snapshot_once_per_version() -> Result<()> {
    let mut service = create_test_service()?;
    let first = liftlog::backup::ensure_update_safety_snapshot(&mut service.conn, "1.2.0", 3)?;
    assert!(first.is_some());
    let again = liftlog::backup::ensure_update_safety_snapshot(&mut service.conn, "1.2.0", 3)?;
    assert!(again.is_none());

    let upgraded = liftlog::backup::ensure_update_safety_snapshot(&mut service.conn, "1.3.0", 3)?
        .expect("new version takes a snapshot");
    let stored = liftlog::backup::get_update_safety_snapshot(&service.conn, upgraded)?
        .expect("snapshot stored");
    assert_eq!(stored.previous_app_version.as_deref(), Some("1.2.0"));
    Ok(())
}

#[test]
fn test_import_repairs_settings_in_the_same_restore() -> Result<()> {
    let mut service = create_test_service()?;
    service.create_workout(&leg_day())?;

    let mut snapshot = service.export_backup()?;
    snapshot.data.settings[0].rest_timer_seconds = 1;
    snapshot.data.settings[0].body_weight = Some(-70.0);
    service.import_backup(&snapshot)?;

    let stored: (i64, Option<f64>) = service.conn.query_row(
        "SELECT rest_timer_seconds, body_weight FROM settings WHERE id = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    assert_eq!(stored, (5, None));
    assert_eq!(service.list_workouts(true)?.len(), 1);

    // A snapshot without a settings row still leaves a usable record behind.
    snapshot.data.settings.clear();
    service.import_backup(&snapshot)?;
    assert_eq!(service.get_settings()?.rest_timer_seconds, 90);
    assert_eq!(count(&service, "settings")?, 1);
    Ok(())
}
