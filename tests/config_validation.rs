// tests/config_validation.rs

use std::path::PathBuf;
use std::time::Duration;

use steerflow::api::{AppIdentity, ENV_APP, ENV_CONN_DIR, ENV_HEARTBEAT, ENV_ROLE};
use steerflow::config::{load_and_validate, parse_and_validate, HeartbeatPolicy};
use steerflow::errors::SteerError;
use steerflow::exec::Invocation;
use steerflow::signal::Signal;
use steerflow::types::{BridgeRole, LauncherKind};
use steerflow_test_utils::builders::{AppBuilder, WorkflowBuilder};

const SAMPLE: &str = r#"
[workflow]
conn_dir = "run"
base_port = 7100
grace_period_secs = 2.5
launcher = "mpirun"

[app.simulation]
exe = "./sim"
args = ["--steps", "1000"]
role = "listener"
nprocs = 8
num_nodes = 3
heartbeat = true
heart_rate = 2.0

[app.analysis]
exe = "./analysis"
role = "sender"

[app.external]
exe = "./render"
launch_on = "LAUNCH_EXTERNAL"
"#;

fn config_error(result: steerflow::errors::Result<impl std::fmt::Debug>) -> String {
    match result {
        Err(SteerError::Config(msg)) => msg,
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn sample_workflow_is_parsed_with_defaults_filled_in() {
    let cfg = parse_and_validate(SAMPLE).unwrap();

    let settings = cfg.settings();
    assert_eq!(settings.conn_dir, PathBuf::from("run"));
    assert_eq!(settings.bind_host, "127.0.0.1");
    assert_eq!(settings.base_port, 7100);
    assert_eq!(settings.grace_period, Duration::from_millis(2500));
    assert_eq!(settings.launcher, LauncherKind::Mpirun);

    let sim = cfg.app("simulation").unwrap();
    assert_eq!(sim.role, Some(BridgeRole::Listener));
    assert_eq!(sim.args, ["--steps", "1000"]);
    // 8 ranks over 3 nodes rounds up.
    assert_eq!(sim.ppn, 3);
    assert_eq!(sim.heartbeat, HeartbeatPolicy::every(Duration::from_secs(2)));
    assert_eq!(sim.working_dir, PathBuf::from("."));

    let analysis = cfg.app("analysis").unwrap();
    assert_eq!(analysis.nprocs, 1);
    assert_eq!(analysis.cpus_per_task, 1);
    assert!(!analysis.heartbeat.enabled);

    let external = cfg.app("external").unwrap();
    assert_eq!(external.launch_on, Some(Signal::custom("LAUNCH_EXTERNAL")));
    assert!(!external.is_startup());

    let startup: Vec<_> = cfg.startup_apps().map(|a| a.name.as_str()).collect();
    assert_eq!(startup, ["analysis", "simulation"]);
    let on_demand: Vec<_> = cfg.on_demand_apps().map(|a| a.name.as_str()).collect();
    assert_eq!(on_demand, ["external"]);
}

#[test]
fn workflow_section_is_optional() {
    let cfg = parse_and_validate("[app.solo]\nexe = \"./solo\"\n").unwrap();
    assert_eq!(cfg.settings().base_port, 6000);
    assert_eq!(cfg.settings().grace_period, Duration::from_secs(5));
    assert_eq!(cfg.settings().launcher, LauncherKind::Srun);
}

#[test]
fn workflow_file_is_loaded_from_disk() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("Workflow.toml");
    std::fs::write(&path, SAMPLE)?;
    let cfg = load_and_validate(&path)?;
    assert_eq!(cfg.apps().len(), 3);

    let missing = load_and_validate(dir.path().join("nope.toml"));
    assert!(matches!(missing, Err(SteerError::Io(_))));
    Ok(())
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let result = parse_and_validate("[app.sim\nexe = ");
    assert!(matches!(result, Err(SteerError::Toml(_))));

    let bad_role = parse_and_validate("[app.sim]\nexe = \"x\"\nrole = \"observer\"\n");
    assert!(matches!(bad_role, Err(SteerError::Toml(_))));
}

#[test]
fn empty_and_all_on_demand_workflows_are_rejected() {
    let msg = config_error(parse_and_validate(""));
    assert!(msg.contains("at least one"));

    let only_on_demand = WorkflowBuilder::new(".")
        .with_app("external", AppBuilder::new("./render").launch_on("GO").build())
        .try_build();
    assert!(config_error(only_on_demand).contains("nothing would start"));
}

#[test]
fn workflow_settings_are_checked() {
    let app = || AppBuilder::new("./sim").build();

    let negative = WorkflowBuilder::new(".").grace_period_secs(-1.0).with_app("sim", app());
    assert!(config_error(negative.try_build()).contains("grace_period_secs"));

    let no_room = WorkflowBuilder::new(".").base_port(u16::MAX).with_app("sim", app());
    assert!(config_error(no_room.try_build()).contains("heartbeat port"));

    let mut raw = WorkflowBuilder::new(".").with_app("sim", app()).raw();
    raw.workflow.bind_host = "  ".to_string();
    assert!(config_error(steerflow::config::WorkflowConfig::try_from(raw)).contains("bind_host"));
}

#[test]
fn application_sections_are_checked() {
    let cases = [
        ("bad name!", AppBuilder::new("./sim"), "invalid application name"),
        ("sim", AppBuilder::new(" "), "empty `exe`"),
        ("sim", AppBuilder::new("./sim").nprocs(0), "nprocs"),
        ("sim", AppBuilder::new("./sim").num_nodes(0), "num_nodes"),
        ("sim", AppBuilder::new("./sim").cpus_per_task(0), "cpus_per_task"),
        ("sim", AppBuilder::new("./sim").ppn(0), "ppn"),
        ("sim", AppBuilder::new("./sim").heartbeat(1.0), "need a bridge `role`"),
        ("sim", AppBuilder::listener().heartbeat(0.0), "heart_rate"),
        ("sim", AppBuilder::listener().launch_on("GO"), "cannot have a `role`"),
        ("sim", AppBuilder::new("./sim").launch_on("has space"), "invalid `launch_on`"),
        ("sim", AppBuilder::new("./sim").launch_on("SIGTERM"), "built-in signal"),
    ];

    for (name, app, expected) in cases {
        let result = WorkflowBuilder::new(".")
            .with_app("anchor", AppBuilder::new("./anchor").build())
            .with_app(name, app.build())
            .try_build();
        let msg = config_error(result);
        assert!(msg.contains(expected), "'{msg}' should mention '{expected}'");
    }
}

#[test]
fn heartbeat_without_rate_is_rejected() {
    let toml = "[app.sim]\nexe = \"./sim\"\nrole = \"listener\"\nheartbeat = true\n";
    assert!(config_error(parse_and_validate(toml)).contains("requires `heart_rate`"));
}

#[test]
fn one_trigger_symbol_launches_at_most_one_app() {
    let result = WorkflowBuilder::new(".")
        .with_app("sim", AppBuilder::listener().build())
        .with_app("render", AppBuilder::new("./render").launch_on("GO").build())
        .with_app("archive", AppBuilder::new("./archive").launch_on("GO").build())
        .try_build();
    assert!(config_error(result).contains("both launched on 'GO'"));
}

#[test]
fn srun_invocation_carries_the_resource_request() {
    let def = AppBuilder::new("./sim")
        .arg("--steps")
        .arg("10")
        .nprocs(64)
        .num_nodes(2)
        .cpus_per_task(4)
        .gpus_per_task(1)
        .definition("simulation");

    let inv = Invocation::build(&def, LauncherKind::Srun);
    assert_eq!(inv.program, "srun");
    assert_eq!(
        inv.args,
        [
            "-n",
            "64",
            "-N",
            "2",
            "--ntasks-per-node=32",
            "--cpus-per-task=4",
            "--gpus-per-task=1",
            "./sim",
            "--steps",
            "10",
        ]
    );
    assert!(inv.env.is_empty());
}

#[test]
fn mpirun_and_direct_invocations() {
    let def = AppBuilder::new("./analysis").nprocs(4).definition("analysis");

    let mpi = Invocation::build(&def, LauncherKind::Mpirun);
    assert_eq!(mpi.command_line(), "mpirun -np 4 ./analysis");

    let direct = Invocation::build(&def, LauncherKind::Direct);
    assert_eq!(direct.program, "./analysis");
    assert!(direct.args.is_empty());
}

#[test]
fn profiling_wraps_the_executable_and_sets_its_environment() {
    let def = AppBuilder::new("./sim")
        .tau_profiling(true)
        .working_dir("/scratch/run1")
        .definition("simulation");

    let inv = Invocation::build(&def, LauncherKind::Direct).with_env([("EXTRA", "1")]);
    assert_eq!(inv.program, "tau_exec");
    assert_eq!(inv.args, ["./sim"]);
    assert_eq!(inv.env_var("TAU_PROFILE"), Some("1"));
    assert_eq!(inv.env_var("PROFILE_DIR"), Some("/scratch/run1/tau-profile"));
    assert_eq!(inv.env_var("EXTRA"), Some("1"));
    assert_eq!(inv.working_dir, PathBuf::from("/scratch/run1"));
}

#[test]
fn identity_survives_the_trip_through_the_environment() {
    let identity = AppIdentity::new("simulation", BridgeRole::Listener)
        .with_conn_dir("/tmp/run")
        .with_heartbeat(true);

    let read_back = AppIdentity::from_vars(identity.to_env()).unwrap();
    assert_eq!(read_back, identity);
    assert!(read_back.coordinator);
}

#[test]
fn launcher_rank_decides_the_coordinator() {
    let base = [(ENV_APP, "simulation"), (ENV_ROLE, "listener"), (ENV_CONN_DIR, "run")];

    let worker = AppIdentity::from_vars(base.into_iter().chain([("PMI_RANK", "3")])).unwrap();
    assert!(!worker.coordinator);

    let leader =
        AppIdentity::from_vars(base.into_iter().chain([("SLURM_PROCID", "0")])).unwrap();
    assert!(leader.coordinator);

    // The launcher-neutral variable wins over launcher-specific ones.
    let explicit = AppIdentity::from_vars(
        base.into_iter()
            .chain([("OMPI_COMM_WORLD_RANK", "0"), ("STEERFLOW_RANK", "2")]),
    )
    .unwrap();
    assert!(!explicit.coordinator);
}

#[test]
fn identity_requires_an_explicit_role() {
    let missing_role = AppIdentity::from_vars([(ENV_APP, "analysis"), (ENV_HEARTBEAT, "1")]);
    assert!(config_error(missing_role).contains("STEERFLOW_ROLE"));

    let bad_role = AppIdentity::from_vars([(ENV_APP, "analysis"), (ENV_ROLE, "watchdog")]);
    assert!(config_error(bad_role).contains("invalid bridge role"));

    let missing_name = AppIdentity::from_vars([(ENV_ROLE, "sender")]);
    assert!(config_error(missing_name).contains("STEERFLOW_APP"));
}

#[test]
fn durations_too_large_to_represent_are_rejected() {
    let huge_rate = "[app.sim]\nexe = \"./sim\"\nrole = \"listener\"\nheartbeat = true\nheart_rate = 1e30\n";
    assert!(config_error(parse_and_validate(huge_rate)).contains("heart_rate"));

    let huge_grace = "[workflow]\ngrace_period_secs = 1e30\n\n[app.sim]\nexe = \"./sim\"\n";
    assert!(config_error(parse_and_validate(huge_grace)).contains("grace_period_secs"));

    let vanishing_rate =
        "[app.sim]\nexe = \"./sim\"\nrole = \"listener\"\nheartbeat = true\nheart_rate = 1e-300\n";
    assert!(config_error(parse_and_validate(vanishing_rate)).contains("zero"));
}
