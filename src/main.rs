use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use scenario_harness::config::{ConfigError, Pace, ScenarioConfig, ScenarioKind};
use scenario_harness::scenario::{self, HaltSwitch};
use scenario_harness::sim::{GoalSeeker, PointMass};
use scenario_harness::teardown::{ExitReason, InterruptTeardown};
use scenario_harness::telemetry::{JsonLinesSink, MemorySink, SharedSink};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("scenario-harness")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run scripted state-machine test scenarios")
        .arg(
            Arg::new("scenario")
                .long("scenario")
                .value_parser(value_parser!(ScenarioKind))
                .help("alternating, logged-alternating, nested, nested-logged or supervised (or 1-5)"),
        )
        .arg(
            Arg::new("pace")
                .long("pace")
                .value_parser(value_parser!(Pace))
                .help("Delay between steps: slow, medium, fast or breakneck"),
        )
        .arg(
            Arg::new("fault-episodes")
                .long("fault-episodes")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(i64))
                .help("Random episodes run by the nested child engine"),
        )
        .arg(
            Arg::new("intervention")
                .long("intervention")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(i64))
                .help("Fallback steps between safety checks (smaller checks more often)"),
        )
        .arg(
            Arg::new("episodes")
                .long("episodes")
                .value_parser(value_parser!(usize))
                .help("Stop after this many episodes instead of running until interrupted"),
        )
        .arg(
            Arg::new("max-steps")
                .long("max-steps")
                .value_parser(value_parser!(usize))
                .help("Abort the run after this many engine steps"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_parser(value_parser!(u64))
                .help("Random seed of the simulated environment"),
        )
        .arg(
            Arg::new("table")
                .long("table")
                .help("Telemetry table name"),
        )
        .arg(
            Arg::new("telemetry-dir")
                .long("telemetry-dir")
                .value_parser(value_parser!(PathBuf))
                .help("Store telemetry as JSON lines in this directory (in memory otherwise)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("JSON config file; flags override its values"),
        )
        .arg(
            Arg::new("history")
                .long("history")
                .action(ArgAction::SetTrue)
                .help("Record and print the transition history (needs --episodes or --max-steps unless nested)"),
        )
}

fn load_config(args: &ArgMatches) -> Result<ScenarioConfig, ConfigError> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => ScenarioConfig::load(path)?,
        None => ScenarioConfig::default(),
    };

    if let Some(kind) = args.get_one::<ScenarioKind>("scenario") {
        config.scenario = *kind;
    }
    if let Some(pace) = args.get_one::<Pace>("pace") {
        config.pace = *pace;
    }
    if let Some(fault_episodes) = args.get_one::<i64>("fault-episodes") {
        config.fault_episodes = *fault_episodes;
    }
    if let Some(intervention) = args.get_one::<i64>("intervention") {
        config.intervention = *intervention;
    }
    if let Some(episodes) = args.get_one::<usize>("episodes") {
        config.episodes = Some(*episodes);
    }
    if let Some(max_steps) = args.get_one::<usize>("max-steps") {
        config.max_steps = Some(*max_steps);
    }
    if let Some(seed) = args.get_one::<u64>("seed") {
        config.seed = *seed;
    }
    if let Some(table) = args.get_one::<String>("table") {
        config.table = Some(table.clone());
    }
    if let Some(dir) = args.get_one::<PathBuf>("telemetry-dir") {
        config.telemetry_dir = Some(dir.clone());
    }
    if args.get_flag("history") {
        config.record_history = true;
    }

    config.validate()?;
    Ok(config)
}

/// Run the teardown (once) and exit with the status for `reason`.
fn finish(teardown: &InterruptTeardown, logged: bool, reason: ExitReason) -> ! {
    if let Some(report) = teardown.teardown() {
        if logged {
            println!();
            print!("{report}");
        }
    }
    process::exit(reason.code());
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = cli().get_matches();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Error: {error}");
            process::exit(2);
        }
    };

    let sink: SharedSink = match &config.telemetry_dir {
        Some(dir) => match JsonLinesSink::open(dir) {
            Ok(sink) => Arc::new(sink),
            Err(error) => {
                eprintln!("Error: cannot open telemetry directory {}: {error}", dir.display());
                process::exit(2);
            }
        },
        None => Arc::new(MemorySink::new()),
    };

    let logged = config.scenario.is_logged();
    let halt = HaltSwitch::new();
    let teardown = Arc::new(
        InterruptTeardown::new(Arc::clone(&sink), config.table()).on_halt({
            let halt = halt.clone();
            move || halt.trip()
        }),
    );

    let listener = {
        let teardown = Arc::clone(&teardown);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::warn!("Interrupt received, halting");
                    // The halt waits for the step in flight, off the async workers.
                    let _ = tokio::task::spawn_blocking(move || {
                        finish(&teardown, logged, ExitReason::Interrupted)
                    })
                    .await;
                }
                Err(error) => tracing::error!(%error, "Cannot listen for interrupts"),
            }
        })
    };

    let print_history = config.record_history;
    let seed = config.seed;
    let run = tokio::task::spawn_blocking(move || {
        scenario::run(&config, GoalSeeker::default(), PointMass::new(seed), sink, halt)
    })
    .await;

    match run {
        Ok(Ok(outcome)) => {
            listener.abort();
            println!(
                "{} finished in {} after {} steps ({} environment steps, {} episodes)",
                outcome.kind, outcome.final_state, outcome.steps, outcome.env_steps, outcome.episodes
            );
            if print_history {
                println!("Path: {}", outcome.history.get_path().join(" -> "));
            }
            finish(&teardown, logged, ExitReason::Completed);
        }
        Ok(Err(error)) if error.is_halted() => {
            // The interrupt listener owns the exit from here.
            let _ = listener.await;
            process::exit(ExitReason::Interrupted.code());
        }
        Ok(Err(error)) => {
            listener.abort();
            tracing::error!(%error, "Scenario failed");
            eprintln!("Error: {error}");
            finish(&teardown, logged, ExitReason::Failed);
        }
        Err(error) => {
            listener.abort();
            tracing::error!(%error, "Scenario thread panicked");
            finish(&teardown, logged, ExitReason::Failed);
        }
    }
}
