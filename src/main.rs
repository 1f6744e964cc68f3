//! Motor link demo
//!
//! Usage:
//!   motor-link                         Run against the simulated controller until Ctrl+C
//!   motor-link --cycles 50             Run 50 cycles, print the final telemetry
//!   motor-link --frame-size 23 -v      Small frames, debug output

use anyhow::{Context, Result};
use clap::Parser;
use motor_link::cli::Cli;
use motor_link::codec::ParameterIndex;
use motor_link::config;
use motor_link::link::{self, EngineState};
use motor_link::logging;
use motor_link::transport::{LoopbackConfig, LoopbackTransport, WriteMode};
use motor_link::MotorId;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let config = config::load_or_default(cli.config.as_deref());

    // Create tokio runtime
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli, config))
}

async fn run(cli: Cli, config: config::Config) -> Result<()> {
    let period = config.link.cycle_period();
    let transport = LoopbackTransport::new(LoopbackConfig {
        frame_size: cli.frame_size,
        write_mode: if cli.acknowledged {
            WriteMode::Acknowledged
        } else {
            WriteMode::Unacknowledged
        },
        drop_every: cli.loss,
        ..LoopbackConfig::default()
    });

    let (handle, mut logs) = link::start(config, transport);
    let link = handle.link().clone();

    let verbose = cli.verbose;
    tokio::spawn(async move {
        while let Some(entry) = logs.recv().await {
            if verbose {
                eprintln!("{}", entry.format_line());
            }
        }
    });

    // Wait for the session to come up before queueing anything
    let mut telemetry = link.subscribe();
    telemetry
        .wait_for(|s| s.state != EngineState::Idle)
        .await
        .context("link stopped before connecting")?;

    for motor in MotorId::ALL {
        link.read_parameter(motor, ParameterIndex::DeviceId);
        link.read_parameter(motor, ParameterIndex::OperationMode);
    }
    if let Some(motor) = cli.homing {
        link.set_homing_mode(motor)?;
        eprintln!("Homing {}", motor);
    }

    match cli.cycles {
        Some(cycles) => {
            tokio::select! {
                _ = tokio::time::sleep(period * cycles as u32) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            eprintln!("Running, Ctrl+C to stop");
            let _ = tokio::signal::ctrl_c().await;
        }
    }

    let snapshot = link.flush_telemetry();
    for motor in MotorId::ALL {
        if let Some(value) = link.parameter(motor, ParameterIndex::OperationMode) {
            eprintln!("{} operation mode: {}", motor, value);
        }
    }
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    handle.join().await?;
    // Let the log task drain
    tokio::time::sleep(Duration::from_millis(10)).await;
    Ok(())
}
