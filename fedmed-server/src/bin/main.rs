use std::{
    path::{Path, PathBuf},
    process,
};

use ndarray::{ArrayD, IxDyn};
use structopt::StructOpt;
use tokio::signal;
use tracing_subscriber::*;

use fedmed_core::model::ParameterSet;
use fedmed_server::{
    registry::{ClientId, Credentials, Registry},
    settings::Settings,
    state_machine::{
        requests::{RequestSender, RoundError},
        StateMachineInitializer,
    },
    transport::SimulatedCohort,
};

#[macro_use]
extern crate tracing;

#[derive(Debug, StructOpt)]
#[structopt(name = "Coordinator")]
struct Opt {
    /// Path of the configuration file
    #[structopt(short, parse(from_os_str))]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    let settings = Settings::new(opt.config_path).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });
    let Settings {
        log: log_settings,
        round: round_settings,
        simulation: simulation_settings,
    } = settings;

    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(log_settings.filter)
        .with_ansi(true)
        .init();

    // The sealing and pseudonymization tools in fedmed_core need the crypto layer
    // initialized before first use.
    sodiumoxide::init().unwrap();

    let registry = Registry::new();
    for index in 0..simulation_settings.clients {
        registry
            .register_client(
                ClientId::from(format!("site-{}", index)),
                &format!("Simulated site {}", index),
                Credentials::from("simulated"),
            )
            .expect("duplicate simulated site");
    }

    let template: ParameterSet = simulation_settings
        .shapes
        .iter()
        .map(|shape| ArrayD::zeros(IxDyn(shape)))
        .collect::<Vec<_>>()
        .into();
    let cohort = match simulation_settings.seed {
        Some(seed) => SimulatedCohort::seeded(template, seed),
        None => SimulatedCohort::new(template),
    };

    let (state_machine, requests_tx, _event_subscriber) =
        StateMachineInitializer::new(round_settings, registry, cohort).init();

    let driver = drive_rounds(
        requests_tx,
        simulation_settings.rounds,
        simulation_settings.checkpoint_path,
    );

    tokio::select! {
        _ = state_machine.run() => {
            warn!("shutting down: state machine terminated");
        }
        _ = driver => {
            info!("simulation finished");
        }
        _ = signal::ctrl_c() => {}
    }
}

/// Drives the configured number of rounds and writes the final checkpoint.
async fn drive_rounds(handle: RequestSender, rounds: u64, checkpoint_path: Option<PathBuf>) {
    for round in 1..=rounds {
        match handle.run_round().await {
            Ok(outcome) => info!(
                "round {} committed: {} participants, {} samples, weighted accuracy {:.4}, weighted loss {:.4}",
                outcome.round_number,
                outcome.snapshot.participant_count,
                outcome.snapshot.total_samples,
                outcome.snapshot.weighted_accuracy,
                outcome.snapshot.weighted_loss,
            ),
            Err(err) => {
                warn!("round {} failed ({}): {}", round, err.reason(), err);
                if let RoundError::Shutdown = err {
                    return;
                }
            }
        }
    }

    if let Some(path) = checkpoint_path {
        match write_checkpoint(&handle, &path).await {
            Ok(()) => info!("checkpoint written to {}", path.display()),
            Err(err) => warn!("failed to write the checkpoint to {}: {}", path.display(), err),
        }
    }
}

async fn write_checkpoint(handle: &RequestSender, path: &Path) -> anyhow::Result<()> {
    let checkpoint = handle.checkpoint().await?;
    std::fs::write(path, checkpoint.to_bytes()?)?;
    Ok(())
}
