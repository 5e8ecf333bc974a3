use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use rota_core::CoordinatorConfig;
use rota_session::{run_simulation, SimulationScript, SimulatorConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<CoordinatorConfig> {
    match path {
        Some(path) => CoordinatorConfig::load_from(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(CoordinatorConfig::new()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Command::new("rota")
        .version(rota_session::VERSION)
        .about("Streaming solve coordinator and repair negotiation")
        .subcommand_required(true)
        .subcommand(
            Command::new("simulate")
                .about("Replay recorded solver streams through a session")
                .arg(
                    Arg::new("script")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON simulation script"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML coordinator configuration"),
                )
                .arg(
                    Arg::new("apply-repairs")
                        .long("apply-repairs")
                        .action(ArgAction::SetTrue)
                        .help("Apply every proposed repair after an infeasible solve"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("check-config")
                .about("Validate a configuration file")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        );

    match cli.get_matches().subcommand() {
        Some(("simulate", args)) => {
            let config = load_config(args.get_one::<PathBuf>("config"))?;
            let script_path = args
                .get_one::<PathBuf>("script")
                .context("missing script path")?;
            let script = SimulationScript::load_from(script_path)
                .with_context(|| format!("loading script {}", script_path.display()))?;
            let sim = SimulatorConfig {
                apply_repairs: args.get_flag("apply-repairs"),
            };

            let report = run_simulation(config, script, sim).await;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.generate_text());
            }
            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("check-config", args)) => {
            let config = load_config(args.get_one::<PathBuf>("path"))?;
            println!("Configuration OK");
            println!("  Dataset: {}", config.dataset_id);
            println!("  Buffer capacity: {}", config.buffer_capacity);
            println!(
                "  Gate: open at {}, hint at {}",
                config.gate.open_threshold, config.gate.hint_threshold
            );
            println!("  Must fix: {}", config.must_fix);
            Ok(())
        }
        _ => unreachable!("subcommand is required"),
    }
}
