// tests/cli_args.rs

use clap::Parser;
use steerflow::cli::{CliArgs, LogLevel};
use steerflow::config::{default_config_path, load_and_validate};

#[test]
fn defaults_point_at_workflow_toml() {
    let args = CliArgs::try_parse_from(["steerflow"]).unwrap();
    assert_eq!(args.config, default_config_path().display().to_string());
    assert!(args.log_level.is_none());
    assert!(!args.dry_run);
}

#[test]
fn flags_are_parsed() {
    let args = CliArgs::try_parse_from([
        "steerflow",
        "--config",
        "demos/workflow.toml",
        "--log-level",
        "debug",
        "--dry-run",
    ])
    .unwrap();
    assert_eq!(args.config, "demos/workflow.toml");
    assert_eq!(args.log_level.map(LogLevel::as_filter), Some("debug"));
    assert!(args.dry_run);
}

#[test]
fn unknown_log_level_is_rejected() {
    assert!(CliArgs::try_parse_from(["steerflow", "--log-level", "loud"]).is_err());
}

#[test]
fn bundled_demo_workflow_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/workflow.toml");
    let cfg = load_and_validate(path).unwrap();
    assert_eq!(cfg.startup_apps().count(), 2);
    assert_eq!(cfg.on_demand_apps().count(), 1);
}
