// src/cli.rs
use chrono::NaiveDate;
use clap::{Command, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Track workout templates, sessions and weekly progress", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage workout templates
    #[command(subcommand)]
    Workouts(WorkoutCommands),
    /// Log a training session
    #[command(subcommand)]
    Session(SessionCommands),
    /// Show statistics
    #[command(subcommand)]
    Stats(StatsCommands),
    /// Import workouts from a JSON plan (model output with code fences is fine)
    Import {
        /// File containing the plan; reads stdin when omitted
        file: Option<PathBuf>,
        /// Only show the repair report, do not create workouts
        #[arg(long)]
        dry_run: bool,
    },
    /// Export, restore and inspect backups
    #[command(subcommand)]
    Backup(BackupCommands),
    /// Show or change settings
    #[command(subcommand)]
    Settings(SettingsCommands),
    /// Show the path to the database file
    DbPath,
    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum WorkoutCommands {
    /// List workout templates
    List {
        /// Include archived workouts
        #[arg(long)]
        all: bool,
    },
    /// Show a workout's exercises and target sets
    Show { id: i64 },
    /// Delete a workout and every session logged against it
    Delete { id: i64 },
    /// Archive (or with --undo, unarchive) a workout
    Archive {
        id: i64,
        #[arg(long)]
        undo: bool,
    },
    /// Create the starter workouts if the database has none
    Seed,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Start a session for a workout (returns the active one if any)
    Start { workout_id: i64 },
    /// Show the active session
    Status,
    /// Log a set
    Set {
        set_id: i64,
        #[arg(short, long)]
        reps: Option<i64>,
        #[arg(short, long, allow_negative_numbers = true)]
        weight: Option<f64>,
        /// Mark the set done
        #[arg(long, conflicts_with = "undo")]
        done: bool,
        /// Mark the set not done
        #[arg(long)]
        undo: bool,
    },
    /// Append a set to an exercise of the active session
    AddSet { key: String },
    /// Add an exercise that is not part of the template
    AddExercise { name: String },
    /// Finish the active session
    Complete {
        /// Replace the workout's template with what was done in this session
        #[arg(long)]
        use_as_template: bool,
    },
    /// Throw away the active session
    Discard,
    /// List completed sessions
    History,
}

#[derive(Subcommand, Debug)]
pub enum StatsCommands {
    /// Weekly totals and muscle group distribution
    Week {
        /// Any day of the week to report (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Write a full JSON backup
    Export {
        /// Output file; prints to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace all data with a JSON backup
    Restore {
        file: PathBuf,
        /// Confirm that existing data will be replaced
        #[arg(long)]
        yes: bool,
    },
    /// List update safety snapshots
    Snapshots,
    /// Restore an update safety snapshot
    RestoreSnapshot {
        id: i64,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Print the current settings
    Show,
    /// Set body weight used for calorie estimates (0 clears it)
    BodyWeight { weight: f64 },
    /// Set the table header color
    HeaderColor { color: String },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> Command {
    Cli::command()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_commands() {
        let cli = Cli::try_parse_from(["liftlog", "session", "set", "4", "-r", "8", "-w", "-10", "--done"]).unwrap();
        match cli.command {
            Commands::Session(SessionCommands::Set { set_id, reps, weight, done, undo }) => {
                assert_eq!(set_id, 4);
                assert_eq!(reps, Some(8));
                assert_eq!(weight, Some(-10.0));
                assert!(done);
                assert!(!undo);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
