//! resbio-scenarios: list, show and check the registered process scenarios
use anyhow::{bail, Context, Result};
use clap::{Arg, Command};
use resbio_harness::config::HarnessConfig;
use resbio_harness::registry::ScenarioRegistry;
use resbio_harness::scenario::Scenario;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("resbio-scenarios")
        .version(resbio_harness::VERSION)
        .about("Inspect and check registered process scenarios")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .help("Harness configuration file (TOML)"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("list").about("List scenarios").arg(
                Arg::new("process")
                    .long("process")
                    .help("Only scenarios exercising this process"),
            ),
        )
        .subcommand(Command::new("processes").about("List processes with scenarios"))
        .subcommand(
            Command::new("show")
                .about("Show the steps of a scenario")
                .arg(Arg::new("id").required(true).help("Scenario id")),
        )
        .subcommand(
            Command::new("check")
                .about("Check the upload directory and every reference file exist"),
        )
}

fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => HarnessConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => HarnessConfig::default().with_env_overrides(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let registry = ScenarioRegistry::with_defaults().context("building scenario registry")?;

    match matches.subcommand() {
        Some(("list", sub)) => {
            let scenarios: Vec<&Scenario> = match sub.get_one::<String>("process") {
                Some(process) => registry.tagged(process),
                None => registry.iter().collect(),
            };
            for scenario in scenarios {
                let tags: Vec<&str> = scenario.tags.iter().map(String::as_str).collect();
                println!("{:<36} [{}] {}", scenario.id, tags.join(", "), scenario.description);
            }
        }
        Some(("processes", _)) => {
            for process in registry.processes() {
                println!("{process:<20} {}", registry.tagged(process).len());
            }
        }
        Some(("show", sub)) => {
            let id = sub
                .get_one::<String>("id")
                .context("scenario id is required")?;
            let Some(scenario) = registry.get(id) else {
                bail!("unknown scenario: {id}");
            };
            println!("{} - {}", scenario.id, scenario.description);
            for (index, phase, step) in scenario.steps() {
                println!("{index:>3} {phase:<6} {step}");
            }
        }
        Some(("check", _)) => check(&registry, &config)?,
        _ => bail!("no command given"),
    }

    Ok(())
}

fn check(registry: &ScenarioRegistry, config: &HarnessConfig) -> Result<()> {
    if !config.files_dir.is_dir() {
        bail!("upload directory {} does not exist", config.files_dir.display());
    }
    let mut missing = 0usize;
    for scenario in registry.iter() {
        for reference in scenario.references() {
            let path = config.reference_path(reference);
            if !path.exists() {
                missing += 1;
                println!("MISSING {} ({})", path.display(), scenario.id);
            }
        }
    }
    if missing > 0 {
        bail!("{missing} reference file(s) missing under {}", config.reference_dir.display());
    }
    println!("{} scenarios, all reference files present", registry.len());
    Ok(())
}
