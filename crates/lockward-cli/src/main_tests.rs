//! CLI tests

use crate::{
    Cli, Commands, ConfigAction, DemoRun, DemoScenario, EventTally, OutputFormat,
    demo_coordinator, planned_events, tally_events,
};
use clap::{CommandFactory, Parser};
use lockward_core::config::Config;
use lockward_core::{ActorId, LockEvent, ResourceId};
use std::time::Duration;
use tokio::sync::broadcast;

#[test]
fn test_cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn test_parse_opposite_order_with_overrides() {
    let cli = Cli::try_parse_from([
        "lockward",
        "demo",
        "opposite-order",
        "--rounds",
        "5",
        "--hold-ms",
        "0",
    ])
    .unwrap();

    match cli.command {
        Commands::Demo {
            scenario: DemoScenario::OppositeOrder { rounds, hold_ms },
        } => {
            assert_eq!(rounds, Some(5));
            assert_eq!(hold_ms, Some(0));
        }
        _ => panic!("expected opposite-order demo"),
    }
    assert_eq!(cli.format, OutputFormat::Text);
    assert!(!cli.quiet);
}

#[test]
fn test_parse_nested_uses_config_defaults() {
    let cli = Cli::try_parse_from(["lockward", "demo", "nested"]).unwrap();

    match cli.command {
        Commands::Demo {
            scenario: DemoScenario::Nested { rounds, hold_ms },
        } => {
            assert_eq!(rounds, None);
            assert_eq!(hold_ms, None);
        }
        _ => panic!("expected nested demo"),
    }
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["lockward", "demo", "cross-wait", "--format", "json", "-q"])
        .unwrap();

    assert!(matches!(
        cli.command,
        Commands::Demo {
            scenario: DemoScenario::CrossWait
        }
    ));
    assert_eq!(cli.format, OutputFormat::Json);
    assert!(cli.quiet);
}

#[test]
fn test_parse_config_set() {
    let cli = Cli::try_parse_from(["lockward", "config", "set", "demo.rounds", "4"]).unwrap();

    match cli.command {
        Commands::Config {
            action: ConfigAction::Set { key, value },
        } => {
            assert_eq!(key, "demo.rounds");
            assert_eq!(value, "4");
        }
        _ => panic!("expected config set"),
    }
}

#[test]
fn test_rejects_unknown_format_and_scenario() {
    assert!(Cli::try_parse_from(["lockward", "demo", "nested", "--format", "yaml"]).is_err());
    assert!(Cli::try_parse_from(["lockward", "demo", "dining"]).is_err());
    assert!(Cli::try_parse_from(["lockward", "demo", "nested", "--rounds", "-2"]).is_err());
}

#[test]
fn test_demo_run_verbosity() {
    let run = |format, quiet| DemoRun {
        rounds: 1,
        hold: Duration::ZERO,
        format,
        quiet,
    };

    assert!(run(OutputFormat::Text, false).verbose());
    assert!(!run(OutputFormat::Text, true).verbose());
    assert!(!run(OutputFormat::Json, false).verbose());
}

#[test]
fn test_tally_skips_lagged_gap() {
    let (sender, mut receiver) = broadcast::channel::<LockEvent>(2);
    let a = ActorId::from("a");
    let b = ActorId::from("b");
    let ledger = ResourceId::from("ledger");

    for _ in 0..3 {
        sender.send(LockEvent::lock_contention(&a, &ledger, &b)).unwrap();
    }
    sender
        .send(LockEvent::deadlock_detected(&b, &ledger, &[b.clone(), a.clone(), b.clone()]))
        .unwrap();
    sender.send(LockEvent::lock_contention(&a, &ledger, &b)).unwrap();

    // The three oldest events were overwritten; counting resumes after them
    assert_eq!(
        tally_events(&mut receiver),
        EventTally {
            contentions: 1,
            refusals: 1,
            dropped: 3,
        }
    );
}

#[test]
fn test_tally_empty_receiver() {
    let (_sender, mut receiver) = broadcast::channel::<LockEvent>(4);
    assert_eq!(tally_events(&mut receiver), EventTally::default());
}

#[test]
fn test_demo_coordinator_sizes_event_channel() {
    let mut config = Config::default();
    config.coordinator.event_capacity = 2;

    let coordinator = demo_coordinator(&config, ["ledger", "catalog"], planned_events(100, 2)).unwrap();
    assert_eq!(coordinator.config().event_capacity, planned_events(100, 2));
    assert!(coordinator.is_registered("ledger"));

    // A larger configured capacity is kept
    config.coordinator.event_capacity = 100_000;
    let coordinator = demo_coordinator(&config, ["ledger"], planned_events(1, 2)).unwrap();
    assert_eq!(coordinator.config().event_capacity, 100_000);
}
