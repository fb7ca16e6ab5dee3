//src/main.rs
mod cli;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::io::{self, stdout, Read};
use tracing_subscriber::EnvFilter;

use cli::{BackupCommands, Commands, SessionCommands, SettingsCommands, StatsCommands, WorkoutCommands};
use liftlog::{
    AppService, SessionSetUpdate, SessionWithSets, Settings, SettingsPatch,
    WeeklyStats, Workout, WorkoutWithExercises,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("liftlog=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli_args = cli::parse_args();

    if let Commands::Completions { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command();
        let bin_name = cmd.get_name().to_string();
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout());
        return Ok(());
    }

    init_tracing();
    let mut service = AppService::initialize().context("Failed to initialize application service")?;
    let header_color = service.config.header_color();

    match cli_args.command {
        Commands::Completions { .. } => unreachable!("handled before initialization"),
        Commands::DbPath => println!("{}", service.get_db_path().display()),

        Commands::Workouts(command) => match command {
            WorkoutCommands::List { all } => {
                let workouts = service.list_workouts(all)?;
                if workouts.is_empty() {
                    println!("No workouts yet. Run `liftlog workouts seed` or `liftlog import`.");
                } else {
                    print_workout_table(&workouts, header_color);
                }
            }
            WorkoutCommands::Show { id } => match service.get_workout(id)? {
                Some(workout) => print_workout_detail(&workout, header_color),
                None => bail!("Workout {id} not found"),
            },
            WorkoutCommands::Delete { id } => {
                service.delete_workout(id)?;
                println!("Deleted workout {id} and its sessions.");
            }
            WorkoutCommands::Archive { id, undo } => {
                service.archive_workout(id, !undo)?;
                println!("Workout {id} {}.", if undo { "restored" } else { "archived" });
            }
            WorkoutCommands::Seed => {
                if service.ensure_default_workout()? {
                    println!("Created starter workouts.");
                } else {
                    println!("Workouts already exist; nothing seeded.");
                }
            }
        },

        Commands::Session(command) => run_session_command(&mut service, command, header_color)?,

        Commands::Stats(StatsCommands::Week { date }) => {
            let stats = service.weekly_stats(date)?;
            let settings = service.get_settings()?;
            print_weekly_stats(&stats, &settings, header_color);
        }

        Commands::Import { file, dry_run } => {
            let text = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut buffer = String::new();
                    io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };
            if dry_run {
                let report = liftlog::import::parse_import_text_with_locale(
                    &text,
                    &service.config.import_locale,
                );
                for change in &report.changes {
                    println!("  fixed: {change}");
                }
                for error in &report.errors {
                    println!("  error: {error}");
                }
                println!("{} workout(s) would be created.", report.drafts.len());
            } else {
                let outcome = service.import_plan(&text)?;
                for change in &outcome.repair.changes {
                    println!("  fixed: {change}");
                }
                println!("Imported {} workout(s).", outcome.workout_ids.len());
            }
        }

        Commands::Backup(command) => match command {
            BackupCommands::Export { output } => {
                let json = service.export_backup_json()?;
                match output {
                    Some(path) => {
                        std::fs::write(&path, json)
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        println!("Backup written to {}", path.display());
                    }
                    None => println!("{json}"),
                }
            }
            BackupCommands::Restore { file, yes } => {
                if !yes {
                    bail!("Restoring replaces all data. Re-run with --yes to confirm.");
                }
                let json = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let snapshot = service.import_backup_json(&json)?;
                println!(
                    "Restored backup from {} (app {}).",
                    format_local(snapshot.exported_at),
                    snapshot.app_version
                );
            }
            BackupCommands::Snapshots => {
                let snapshots = service.list_update_safety_snapshots()?;
                let mut table = new_table(&["ID", "Created", "Version", "Previous"], header_color);
                for snapshot in snapshots {
                    table.add_row(vec![
                        Cell::new(snapshot.id),
                        Cell::new(format_local(snapshot.created_at)),
                        Cell::new(&snapshot.app_version),
                        Cell::new(snapshot.previous_app_version.as_deref().unwrap_or("-")),
                    ]);
                }
                println!("{table}");
            }
            BackupCommands::RestoreSnapshot { id, yes } => {
                if !yes {
                    bail!("Restoring replaces all data. Re-run with --yes to confirm.");
                }
                let snapshot = service.restore_update_safety_snapshot(id)?;
                println!("Restored snapshot {id} (app {}).", snapshot.app_version);
            }
        },

        Commands::Settings(command) => match command {
            SettingsCommands::Show => print_settings(&service.get_settings()?, header_color),
            SettingsCommands::BodyWeight { weight } => {
                let patch = SettingsPatch {
                    body_weight: Some((weight > 0.0).then_some(weight)),
                    ..Default::default()
                };
                let settings = service.update_settings(&patch)?;
                match settings.body_weight {
                    Some(w) => println!("Body weight set to {w} {}.", settings.weight_unit),
                    None => println!("Body weight cleared."),
                }
            }
            SettingsCommands::HeaderColor { color } => {
                service.set_header_color(&color)?;
                println!("Header color set to {}.", service.config.theme.header_color);
            }
        },
    }

    Ok(())
}

fn run_session_command(
    service: &mut AppService,
    command: SessionCommands,
    header_color: Color,
) -> Result<()> {
    match command {
        SessionCommands::Start { workout_id } => {
            let id = service.start_session(workout_id)?;
            println!("Session {id} is active.");
            if let Some(active) = service.get_active_session()? {
                print_session(&active, header_color);
            }
        }
        SessionCommands::Status => match service.get_active_session()? {
            Some(active) => print_session(&active, header_color),
            None => println!("No active session."),
        },
        SessionCommands::Set { set_id, reps, weight, done, undo } => {
            let update = SessionSetUpdate {
                actual_reps: reps,
                actual_weight: weight,
                completed: if done {
                    Some(true)
                } else if undo {
                    Some(false)
                } else {
                    None
                },
            };
            let set = service.update_session_set(set_id, &update)?;
            println!(
                "{} set {}: {} x {}{}",
                set.exercise_name,
                set.template_set_order + 1,
                set.effective_reps(),
                set.effective_weight(),
                if set.completed { " (done)" } else { "" }
            );
        }
        SessionCommands::AddSet { key } => {
            let session = require_active(service)?;
            let id = service.add_session_set(session.session.id, &key)?;
            println!("Added set {id}.");
        }
        SessionCommands::AddExercise { name } => {
            let session = require_active(service)?;
            let key = service.add_session_exercise(session.session.id, &name)?;
            println!("Added exercise ({key}).");
        }
        SessionCommands::Complete { use_as_template } => {
            let session = require_active(service)?;
            let finished = service.complete_session(session.session.id, use_as_template)?;
            let summary = service.session_summary(finished.id)?;
            println!(
                "Session finished: {:.0} min, {} sets, {} reps, ~{:.0} kcal{}",
                summary.duration_minutes,
                summary.completed_sets,
                summary.reps_total,
                summary.calories,
                if summary.uses_default_body_weight { " (default body weight)" } else { "" }
            );
            if use_as_template {
                println!("Workout template updated from this session.");
            }
        }
        SessionCommands::Discard => {
            let session = require_active(service)?;
            service.discard_session(session.session.id)?;
            println!("Session discarded.");
        }
        SessionCommands::History => {
            let sessions = service.list_completed_sessions()?;
            let mut table = new_table(&["ID", "Workout", "Started", "Minutes", "Sets"], header_color);
            for session in sessions {
                let summary = service.session_summary(session.id)?;
                table.add_row(vec![
                    Cell::new(session.id),
                    Cell::new(session.workout_id),
                    Cell::new(format_local(session.started_at)),
                    Cell::new(format!("{:.0}", summary.duration_minutes)),
                    Cell::new(summary.completed_sets),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

fn require_active(service: &AppService) -> Result<SessionWithSets> {
    match service.get_active_session()? {
        Some(session) => Ok(session),
        None => bail!("No active session. Start one with `liftlog session start <workout-id>`."),
    }
}

fn format_local(instant: DateTime<Utc>) -> String {
    instant.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn new_table(headers: &[&str], header_color: Color) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h).fg(header_color)));
    table
}

fn print_workout_table(workouts: &[Workout], header_color: Color) {
    let mut table = new_table(&["ID", "Name", "Updated", "Archived"], header_color);
    for workout in workouts {
        table.add_row(vec![
            Cell::new(workout.id),
            Cell::new(&workout.name),
            Cell::new(format_local(workout.updated_at)),
            Cell::new(if workout.archived_at.is_some() { "yes" } else { "" }),
        ]);
    }
    println!("{table}");
}

fn print_workout_detail(workout: &WorkoutWithExercises, header_color: Color) {
    println!("{} (#{})", workout.workout.name, workout.workout.id);
    let mut table = new_table(&["#", "Exercise", "Sets", "Flags"], header_color);
    for (index, entry) in workout.exercises.iter().enumerate() {
        let sets = entry
            .sets
            .iter()
            .map(|s| format!("{}x{}", s.target_reps, s.target_weight))
            .collect::<Vec<_>>()
            .join(", ");
        let mut flags = Vec::new();
        if entry.exercise.x2_enabled {
            flags.push("x2");
        }
        if entry.exercise.negative_weight_enabled {
            flags.push("assisted");
        }
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(&entry.exercise.name),
            Cell::new(sets),
            Cell::new(flags.join(" ")),
        ]);
    }
    println!("{table}");
}

fn print_session(entry: &SessionWithSets, header_color: Color) {
    println!(
        "Session {} started {}",
        entry.session.id,
        format_local(entry.session.started_at)
    );
    let mut table = new_table(&["Set ID", "Exercise", "Set", "Target", "Actual", "Done"], header_color);
    for group in liftlog::sessions::group_session_sets(&entry.sets) {
        for (position, set) in group.sets.iter().enumerate() {
            let name = if position == 0 {
                Cell::new(format!("{} [{}]", group.exercise_name, group.session_exercise_key))
                    .add_attribute(Attribute::Bold)
            } else {
                Cell::new("")
            };
            table.add_row(vec![
                Cell::new(set.id),
                name,
                Cell::new(position + 1),
                Cell::new(format!("{} x {}", set.target_reps, set.target_weight)),
                Cell::new(format!("{} x {}", set.effective_reps(), set.effective_weight())),
                Cell::new(if set.completed { "✔" } else { "" }),
            ]);
        }
    }
    println!("{table}");
}

fn progress(value: f64, goal: Option<f64>) -> String {
    match goal {
        Some(goal) if goal > 0.0 => format!("{value:.0} / {goal:.0} ({:.0}%)", value / goal * 100.0),
        _ => format!("{value:.0}"),
    }
}

fn print_weekly_stats(stats: &WeeklyStats, settings: &Settings, header_color: Color) {
    println!(
        "Week of {}",
        stats.week_start.with_timezone(&Local).format("%Y-%m-%d")
    );
    let goals = &stats.goals;
    let mut table = new_table(&["Metric", "Value"], header_color);
    table.add_row(vec![
        Cell::new("Workouts"),
        Cell::new(progress(
            stats.workout_count as f64,
            goals.workout_count.map(|g| g as f64),
        )),
    ]);
    table.add_row(vec![
        Cell::new("Duration (min)"),
        Cell::new(progress(
            stats.total_duration_minutes,
            goals.duration_minutes.map(|g| g as f64),
        )),
    ]);
    table.add_row(vec![Cell::new("Sets"), Cell::new(format!("{:.0}", stats.total_sets))]);
    table.add_row(vec![Cell::new("Reps"), Cell::new(format!("{:.0}", stats.total_reps))]);
    table.add_row(vec![
        Cell::new(format!("Volume ({})", settings.weight_unit)),
        Cell::new(progress(stats.total_weight, goals.weight)),
    ]);
    table.add_row(vec![
        Cell::new("Calories (kcal)"),
        Cell::new(progress(stats.total_calories, goals.calories)),
    ]);
    println!("{table}");
    if stats.uses_default_body_weight {
        println!("Calories assume a body weight of 75 kg. Set yours with `liftlog settings body-weight`.");
    }

    let mut muscles = new_table(&["Muscle group", "Sets", "Reps", "Volume"], header_color);
    for (group, metrics) in &stats.muscle_groups {
        muscles.add_row(vec![
            Cell::new(group),
            Cell::new(format!("{:.1}", metrics.sets)),
            Cell::new(format!("{:.0}", metrics.reps)),
            Cell::new(format!("{:.0}", metrics.weight)),
        ]);
    }
    println!("{muscles}");
}

fn print_settings(settings: &Settings, header_color: Color) {
    let mut table = new_table(&["Setting", "Value"], header_color);
    let optional = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    let rows = [
        ("Language", settings.language.to_string()),
        ("Weight unit", settings.weight_unit.to_string()),
        ("Rest timer", format!(
            "{}s ({})",
            settings.rest_timer_seconds,
            if settings.rest_timer_enabled { "on" } else { "off" }
        )),
        ("Body weight", optional(settings.body_weight.map(|w| w.to_string()))),
        ("Weekly volume goal", optional(settings.weekly_weight_goal.map(|w| w.to_string()))),
        ("Weekly calories goal", optional(settings.weekly_calories_goal.map(|w| w.to_string()))),
        ("Weekly workouts goal", optional(settings.weekly_workout_count_goal.map(|w| w.to_string()))),
        ("Weekly minutes goal", optional(settings.weekly_duration_goal_minutes.map(|w| w.to_string()))),
        ("Color scheme", settings.color_scheme.to_string()),
    ];
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    println!("{table}");
}
