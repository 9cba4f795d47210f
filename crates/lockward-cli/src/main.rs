//! Lockward CLI - deadlock-free resource coordination

use clap::{Parser, Subcommand};
use lockward_core::config::Config;
use lockward_core::{
    ActorId, Error, LockEvent, LockEventType, ResourceCoordinator, StateReport,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "lockward")]
#[command(author, version, about = "Deadlock-free resource coordination", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a coordination scenario
    Demo {
        #[command(subcommand)]
        scenario: DemoScenario,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum DemoScenario {
    /// Two actors request the same pair of resources in opposite orders
    OppositeOrder {
        /// Rounds per actor (defaults to demo.rounds)
        #[arg(short, long)]
        rounds: Option<u32>,
        /// Milliseconds each set is held (defaults to demo.hold_ms)
        #[arg(long)]
        hold_ms: Option<u64>,
    },

    /// Two objects whose operations each need the other
    Nested {
        /// Rounds per actor (defaults to demo.rounds)
        #[arg(short, long)]
        rounds: Option<u32>,
        /// Milliseconds each set is held (defaults to demo.hold_ms)
        #[arg(long)]
        hold_ms: Option<u64>,
    },

    /// Force an incremental cross-wait and show the refusal
    CrossWait,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
    /// Show config file path
    Path,
}

/// Demo parameters resolved against the config file
struct DemoRun {
    rounds: u32,
    hold: Duration,
    format: OutputFormat,
    quiet: bool,
}

impl DemoRun {
    /// Whether progress lines go to stdout
    fn verbose(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lockward=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { scenario } => cmd_demo(scenario, cli.format, cli.quiet).await,

        Commands::Config { action } => cmd_config(action, cli.quiet),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_demo(scenario: DemoScenario, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;

    let run = |rounds: Option<u32>, hold_ms: Option<u64>| -> anyhow::Result<DemoRun> {
        let rounds = rounds.unwrap_or(config.demo.rounds);
        if rounds == 0 {
            anyhow::bail!("--rounds must be at least 1");
        }
        Ok(DemoRun {
            rounds,
            hold: Duration::from_millis(hold_ms.unwrap_or(config.demo.hold_ms)),
            format,
            quiet,
        })
    };

    match scenario {
        DemoScenario::OppositeOrder { rounds, hold_ms } => {
            demo_opposite_order(&config, run(rounds, hold_ms)?).await
        }
        DemoScenario::Nested { rounds, hold_ms } => {
            demo_nested(&config, run(rounds, hold_ms)?).await
        }
        DemoScenario::CrossWait => demo_cross_wait(&config, run(None, None)?).await,
    }
}

async fn demo_opposite_order(config: &Config, run: DemoRun) -> anyhow::Result<()> {
    const WHATS_UP: &str = "whats_up";
    const HOW_YOU_DOIN: &str = "how_you_doin";

    let coordinator =
        demo_coordinator(config, [WHATS_UP, HOW_YOU_DOIN], planned_events(run.rounds, 2))?;
    let events = coordinator.subscribe();

    if run.verbose() {
        println!("Opposite-order scenario");
        println!("=======================");
        println!();
    }

    let plans = [
        ("t1", [WHATS_UP, HOW_YOU_DOIN]),
        ("t2", [HOW_YOU_DOIN, WHATS_UP]),
    ];

    let mut tasks = Vec::new();
    for (name, order) in plans {
        let coordinator = coordinator.clone();
        let verbose = run.verbose();
        let (rounds, hold) = (run.rounds, run.hold);

        tasks.push(tokio::spawn(async move {
            let actor = ActorId::from(name);
            for round in 1..=rounds {
                coordinator
                    .run(&actor, order, || async {
                        if verbose {
                            println!(
                                "{} (round {}): holding {} and {}",
                                actor, round, order[0], order[1]
                            );
                        }
                        tokio::time::sleep(hold).await;
                    })
                    .await?;
            }
            Ok::<_, Error>(())
        }));
    }

    for task in tasks {
        task.await??;
    }

    info!(rounds = run.rounds, "Opposite-order scenario finished");
    finish(&coordinator, events, &run)
}

async fn demo_nested(config: &Config, run: DemoRun) -> anyhow::Result<()> {
    const LEDGER: &str = "ledger";
    const CATALOG: &str = "catalog";

    let coordinator = demo_coordinator(config, [LEDGER, CATALOG], planned_events(run.rounds, 2))?;
    let events = coordinator.subscribe();

    if run.verbose() {
        println!("Nested-operations scenario");
        println!("==========================");
        println!();
    }

    // Each operation touches both objects; the nested call becomes part of
    // one acquisition instead of a second lock taken while holding the first
    let postings = Arc::new(AtomicU32::new(0));
    let repricings = Arc::new(AtomicU32::new(0));

    let post = tokio::spawn({
        let coordinator = coordinator.clone();
        let postings = postings.clone();
        let verbose = run.verbose();
        let (rounds, hold) = (run.rounds, run.hold);
        async move {
            let actor = ActorId::from("poster");
            for _ in 0..rounds {
                coordinator
                    .run(&actor, [LEDGER, CATALOG], || async {
                        // ledger entry, then a catalog lookup for its price
                        tokio::time::sleep(hold).await;
                        let n = postings.fetch_add(1, Ordering::SeqCst) + 1;
                        if verbose {
                            println!("{}: posted entry {} to {} via {}", actor, n, LEDGER, CATALOG);
                        }
                    })
                    .await?;
            }
            Ok::<_, Error>(())
        }
    });

    let reprice = tokio::spawn({
        let coordinator = coordinator.clone();
        let repricings = repricings.clone();
        let verbose = run.verbose();
        let (rounds, hold) = (run.rounds, run.hold);
        async move {
            let actor = ActorId::from("repricer");
            for _ in 0..rounds {
                coordinator
                    .run(&actor, [CATALOG, LEDGER], || async {
                        // catalog update, then a ledger adjustment
                        tokio::time::sleep(hold).await;
                        let n = repricings.fetch_add(1, Ordering::SeqCst) + 1;
                        if verbose {
                            println!("{}: repriced item {} in {} via {}", actor, n, CATALOG, LEDGER);
                        }
                    })
                    .await?;
            }
            Ok::<_, Error>(())
        }
    });

    post.await??;
    reprice.await??;

    info!(
        postings = postings.load(Ordering::SeqCst),
        repricings = repricings.load(Ordering::SeqCst),
        "Nested-operations scenario finished"
    );
    finish(&coordinator, events, &run)
}

async fn demo_cross_wait(config: &Config, run: DemoRun) -> anyhow::Result<()> {
    const LEDGER: &str = "ledger";
    const CATALOG: &str = "catalog";

    let coordinator = demo_coordinator(config, [LEDGER, CATALOG], planned_events(1, 2))?;
    let events = coordinator.subscribe();
    let a = ActorId::from("a");
    let b = ActorId::from("b");

    if run.verbose() {
        println!("Cross-wait scenario");
        println!("===================");
        println!();
    }

    coordinator.acquire(&a, [CATALOG]).await?;
    coordinator.acquire(&b, [LEDGER]).await?;
    if run.verbose() {
        let snapshot = coordinator.snapshot();
        for actor in [&a, &b] {
            let held: Vec<_> = snapshot.held_by(actor).iter().map(ToString::to_string).collect();
            println!("{} holds {}", actor, held.join(", "));
        }
    }

    let a_waits = tokio::spawn({
        let coordinator = coordinator.clone();
        let a = a.clone();
        async move { coordinator.acquire(&a, [LEDGER]).await }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while !coordinator.pending_waits().is_waiting(&a) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("actor 'a' never started waiting on '{}'", LEDGER))?;

    if run.verbose() {
        for (waiter, holder) in coordinator.pending_waits().pairs() {
            println!("{} waits on {}", waiter, holder);
        }
        println!("b requests {}...", CATALOG);
    }

    let refusal = match coordinator.acquire(&b, [CATALOG]).await {
        Err(e @ Error::DeadlockDetected { .. }) => e,
        Err(e) => return Err(e.into()),
        Ok(()) => anyhow::bail!("cross-wait was not refused"),
    };
    warn!(code = refusal.code(), "Second request refused");

    if run.verbose() {
        println!("[{}] {}", refusal.code(), refusal);
        if let Some(suggestion) = refusal.suggestion() {
            println!("     Suggestion: {}", suggestion);
        }
    }

    // b backs off, which lets a finish
    let released = coordinator.release_all(&b)?;
    a_waits.await??;
    if run.verbose() {
        println!("b released {} resource(s); a acquired {}", released, LEDGER);
    }
    coordinator.release_all(&a)?;

    if run.format == OutputFormat::Json {
        let output = serde_json::json!({
            "refusal": {
                "code": refusal.code(),
                "message": refusal.to_string(),
            },
            "report": coordinator.report(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    finish(&coordinator, events, &run)
}

/// Build a demo coordinator whose event channel can hold every event the
/// scenario is expected to emit, so the summary does not depend on timing
fn demo_coordinator<const N: usize>(
    config: &Config,
    resources: [&str; N],
    planned_events: usize,
) -> anyhow::Result<ResourceCoordinator> {
    let coordinator_config = config.coordinator_config();
    let capacity = coordinator_config.event_capacity.max(planned_events);
    Ok(ResourceCoordinator::with_resources(
        coordinator_config.with_event_capacity(capacity),
        resources,
    )?)
}

/// Upper bound on the events `actors` emit over `rounds` two-resource runs
fn planned_events(rounds: u32, actors: usize) -> usize {
    // acquired + released, plus a contention event per resource and retry
    (rounds as usize).saturating_mul(actors).saturating_mul(8) + 32
}

/// Event counts gathered for the demo summary
#[derive(Debug, Default, PartialEq, Eq)]
struct EventTally {
    contentions: usize,
    refusals: usize,
    dropped: u64,
}

/// Drain every buffered event, skipping over gaps left by a lagging receiver
fn tally_events(events: &mut broadcast::Receiver<LockEvent>) -> EventTally {
    let mut tally = EventTally::default();
    loop {
        match events.try_recv() {
            Ok(event) => match event.event_type {
                LockEventType::LockContention => tally.contentions += 1,
                LockEventType::DeadlockDetected => tally.refusals += 1,
                _ => {}
            },
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => tally.dropped += skipped,
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                break;
            }
        }
    }
    tally
}

/// Print the final report and an event summary
fn finish(
    coordinator: &ResourceCoordinator,
    mut events: broadcast::Receiver<LockEvent>,
    run: &DemoRun,
) -> anyhow::Result<()> {
    let report = coordinator.report();
    let tally = tally_events(&mut events);
    if tally.dropped > 0 {
        warn!(dropped = tally.dropped, "Event receiver lagged, summary is incomplete");
    }

    print_report(&report, run)?;
    if run.verbose() {
        println!();
        println!("Contended waits: {}", tally.contentions);
        println!("Refused requests: {}", tally.refusals);
        if tally.dropped > 0 {
            println!("Dropped events: {}", tally.dropped);
        }
    }
    Ok(())
}

fn print_report(report: &StateReport, run: &DemoRun) -> anyhow::Result<()> {
    match run.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            if !run.quiet {
                println!();
            }
            println!("{}", report);
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod main_tests;
