//! The `canopy` command line
//!
//! ```text
//! canopy [--config settings.toml] run <tree.json> [--parallelism N] [--sim NAME]...
//!        [--pattern REGEX] [--set PATH=VALUE]... [--no-post] [--no-tests]
//!        [--table NAME]...
//! canopy list <tree.json> [--sim NAME]... [--pattern REGEX] [--set PATH=VALUE]...
//! canopy check <tree.json>
//! ```
//!
//! Tree files are JSON [`canopy_tree::TreeDescription`]s built with
//! [`crate::models::default_registry`]. Results are kept in memory; `--table`
//! prints a table as JSON once the run is over.

use crate::command::{CheckCommand, Command as _, ReadCommand, RunCommand};
use crate::load::load_tree;
use crate::models::default_registry;
use crate::settings::Settings;
use crate::store::InMemoryStore;
use anyhow::Context as _;
use canopy_composition::Override;
use canopy_kernel::{Parallelism, RunEvent};
use canopy_tree::{DataStore, Tree};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn file_arg() -> Arg {
    Arg::new("file")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("JSON tree description")
}

fn selection_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("sim")
                .long("sim")
                .action(ArgAction::Append)
                .help("Only run the named simulation; may be repeated"),
        )
        .arg(
            Arg::new("pattern")
                .long("pattern")
                .help("Only run simulations whose name matches this regular expression"),
        )
        .arg(
            Arg::new("set")
                .long("set")
                .value_name("PATH=VALUE")
                .action(ArgAction::Append)
                .help("Override a property before running; `+=` and `-=` edit lists"),
        )
}

/// Command-line definition
#[must_use]
pub fn command() -> Command {
    Command::new("canopy")
        .version(crate::VERSION)
        .about("Compose model trees and run their simulations")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML settings file"),
        )
        .subcommand(
            selection_args(Command::new("run").about("Run simulations"))
                .arg(file_arg())
                .arg(
                    Arg::new("parallelism")
                        .long("parallelism")
                        .short('p')
                        .allow_negative_numbers(true)
                        .value_parser(value_parser!(i32))
                        .help("Concurrent simulations; 0 or less uses every core"),
                )
                .arg(
                    Arg::new("no-post")
                        .long("no-post")
                        .action(ArgAction::SetTrue)
                        .help("Skip post-run tools"),
                )
                .arg(
                    Arg::new("no-tests")
                        .long("no-tests")
                        .action(ArgAction::SetTrue)
                        .help("Skip validation nodes"),
                )
                .arg(
                    Arg::new("table")
                        .long("table")
                        .action(ArgAction::Append)
                        .help("Print this result table as JSON; may be repeated"),
                ),
        )
        .subcommand(
            selection_args(Command::new("list").about("List the simulations a run would execute"))
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("check")
                .about("Report links that cannot be resolved")
                .arg(file_arg()),
        )
}

/// Settings named by `--config`, or the defaults
///
/// # Errors
/// When the settings file cannot be loaded
pub fn settings(matches: &ArgMatches) -> crate::Result<Settings> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => Settings::load(path),
        None => Ok(Settings::default()),
    }
}

/// Install the global tracing subscriber, logging to stderr
///
/// `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn strings(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn run_command(matches: &ArgMatches, settings: &Settings) -> anyhow::Result<RunCommand> {
    let overrides = strings(matches, "set")
        .iter()
        .map(|text| text.parse::<Override>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut command = RunCommand::new()
        .with_overrides(overrides)
        .with_post_tools(settings.run_post_tools)
        .with_tests(settings.run_tests)
        .with_parallelism(settings.parallelism())
        .with_locator(settings.locator());
    let names = strings(matches, "sim");
    if !names.is_empty() {
        command = command.with_simulation_names(names);
    }
    if let Some(pattern) = matches.get_one::<String>("pattern") {
        command = command.with_pattern(pattern.clone());
    }
    Ok(command)
}

fn load(matches: &ArgMatches) -> anyhow::Result<Tree> {
    let path = matches
        .get_one::<PathBuf>("file")
        .context("missing tree file")?;
    Ok(load_tree(path, &default_registry())?)
}

/// Execute parsed arguments, writing results to `out`
///
/// Returns whether everything succeeded.
///
/// # Errors
/// Setup failures: unreadable files, bad overrides, duplicate simulations
pub fn execute(matches: &ArgMatches, settings: &Settings, out: &mut dyn Write) -> anyhow::Result<bool> {
    let store: Arc<dyn DataStore> = Arc::new(InMemoryStore::new());

    match matches.subcommand() {
        Some(("run", args)) => {
            let mut tree = load(args)?;
            let mut command = run_command(args, settings)?;
            if let Some(&count) = args.get_one::<i32>("parallelism") {
                command = command.with_parallelism(Parallelism::from_count(count));
            }
            if args.get_flag("no-post") {
                command = command.with_post_tools(false);
            }
            if args.get_flag("no-tests") {
                command = command.with_tests(false);
            }
            let finished = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&finished);
            command = command.with_observer(move |event| {
                if let RunEvent::UnitCompleted(report) = event {
                    let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::info!(simulation = %report.unit, state = ?report.state, done, "simulation finished");
                }
            });

            let summary = command.run(&mut tree, &store)?;
            writeln!(
                out,
                "{} simulations completed, {} skipped, {} errors in {:.2?}",
                summary.units_completed,
                summary.units_skipped,
                summary.error_count(),
                summary.elapsed
            )?;
            for message in summary.messages() {
                writeln!(out, "error: {message}")?;
            }
            for table in strings(args, "table") {
                let table = ReadCommand::new(table).run(&mut tree, &store)?;
                writeln!(out, "{}", serde_json::to_string_pretty(&table)?)?;
            }
            Ok(summary.is_success())
        }
        Some(("list", args)) => {
            let tree = load(args)?;
            for name in run_command(args, settings)?.simulation_names(&tree)? {
                writeln!(out, "{name}")?;
            }
            Ok(true)
        }
        Some(("check", args)) => {
            let mut tree = load(args)?;
            let command = CheckCommand {
                locator: settings.locator(),
            };
            let errors = command.run(&mut tree, &store)?;
            for error in &errors {
                writeln!(out, "{error}")?;
            }
            if errors.is_empty() {
                writeln!(out, "all links resolved")?;
            }
            Ok(errors.is_empty())
        }
        _ => anyhow::bail!("no subcommand given"),
    }
}
