use canopy_core::cli;
use canopy_core::Settings;
use canopy_tree::TreeDescription;
use serde_json::json;
use std::io::Write as _;
use tempfile::NamedTempFile;

fn tree_file(description: &TreeDescription) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string_pretty(description).unwrap().as_bytes())
        .unwrap();
    file
}

fn simulation(name: &str, end: i64) -> TreeDescription {
    TreeDescription::new("Simulation")
        .named(name)
        .with_child(TreeDescription::new("Clock").with_property("End", json!(end)))
        .with_child(TreeDescription::new("Report").with_property("Variables", json!(["[Clock].End"])))
}

fn description() -> TreeDescription {
    TreeDescription::new("Simulations")
        .with_child(simulation("North", 2))
        .with_child(simulation("South", 3))
}

/// Run the CLI in-process; returns (success, stdout)
fn canopy(args: &[&str]) -> (anyhow::Result<bool>, String) {
    let matches = cli::command()
        .try_get_matches_from(std::iter::once("canopy").chain(args.iter().copied()))
        .unwrap();
    let settings = cli::settings(&matches).unwrap();
    let mut out = Vec::new();
    let result = cli::execute(&matches, &settings, &mut out);
    (result, String::from_utf8(out).unwrap())
}

#[test]
fn test_run_prints_summary_and_tables() {
    let file = tree_file(&description());
    let path = file.path().to_str().unwrap();

    let (result, out) = canopy(&["run", path, "-p", "1", "--table", "Report"]);
    assert!(result.unwrap(), "{out}");
    assert!(out.starts_with("2 simulations completed, 0 skipped, 0 errors"), "{out}");

    let json_start = out.find('{').unwrap();
    let table: canopy_tree::Table = serde_json::from_str(&out[json_start..]).unwrap();
    assert_eq!(table.name, "Report");
    assert_eq!(table.len(), 5);
}

#[test]
fn test_run_with_override_and_selection() {
    let file = tree_file(&description());
    let path = file.path().to_str().unwrap();

    let (result, out) = canopy(&[
        "run", path, "--sim", "South", "--set", "[Clock].End=4", "--table", "Report",
    ]);
    assert!(result.unwrap(), "{out}");
    assert!(out.starts_with("1 simulations completed"), "{out}");
    let json_start = out.find('{').unwrap();
    let table: canopy_tree::Table = serde_json::from_str(&out[json_start..]).unwrap();
    assert_eq!(table.len(), 4);
}

#[test]
fn test_failed_simulation_is_reported() {
    let description = description().with_child(
        TreeDescription::new("Simulation")
            .named("Broken")
            .with_child(TreeDescription::new("Report")),
    );
    let file = tree_file(&description);

    let (result, out) = canopy(&["run", file.path().to_str().unwrap()]);
    assert!(!result.unwrap());
    assert!(out.contains("1 errors"), "{out}");
    assert!(out.contains("error: Broken failed"), "{out}");
}

#[test]
fn test_failed_validation_sets_the_exit_status() {
    let description = description().with_child(
        TreeDescription::new("TableCheck")
            .named("Enough")
            .with_property("Table", json!("Report"))
            .with_property("MinRows", json!(50)),
    );
    let file = tree_file(&description);
    let path = file.path().to_str().unwrap();

    let (result, out) = canopy(&["run", path]);
    assert!(!result.unwrap());
    assert!(out.contains("Simulations.Enough failed"), "{out}");

    let (result, out) = canopy(&["run", path, "--no-tests"]);
    assert!(result.unwrap(), "{out}");
}

#[test]
fn test_list_prints_names() {
    let file = tree_file(&description());
    let (result, out) = canopy(&["list", file.path().to_str().unwrap(), "--pattern", "^S"]);
    assert!(result.unwrap());
    assert_eq!(out, "South\n");
}

#[test]
fn test_check_reports_broken_links() {
    let description = description().with_child(
        TreeDescription::new("Simulation")
            .named("Broken")
            .with_child(TreeDescription::new("Report")),
    );
    let file = tree_file(&description);

    let (result, out) = canopy(&["check", file.path().to_str().unwrap()]);
    assert!(!result.unwrap());
    assert!(out.contains("Simulations.Broken.Report"), "{out}");

    let clean = tree_file(&self::description());
    let (result, out) = canopy(&["check", clean.path().to_str().unwrap()]);
    assert!(result.unwrap());
    assert_eq!(out, "all links resolved\n");
}

#[test]
fn test_bad_override_is_a_setup_error() {
    let file = tree_file(&description());
    let (result, _) = canopy(&["run", file.path().to_str().unwrap(), "--set", "no equals sign"]);
    assert!(result.is_err());
}

#[test]
fn test_settings_file_is_honoured() {
    let mut config = NamedTempFile::new().unwrap();
    writeln!(config, "parallelism = 1\nrun_post_tools = false").unwrap();
    let file = tree_file(&description());

    let matches = cli::command()
        .try_get_matches_from([
            "canopy",
            "--config",
            config.path().to_str().unwrap(),
            "list",
            file.path().to_str().unwrap(),
        ])
        .unwrap();
    let settings = cli::settings(&matches).unwrap();
    assert_eq!(settings, Settings::new().with_parallelism(1).with_post_tools(false));
}

#[test]
fn test_missing_subcommand_is_rejected() {
    assert!(cli::command().try_get_matches_from(["canopy"]).is_err());
}
