//! # CNC Host
//!
//! Feeds a job file through the cartesian trajectory planner and drains the
//! planned moves into the simulated motor queue, the way the embedded
//! controller loop drives the planner against the real pulse generator.
//! Useful for validating machine configurations and inspecting the emitted
//! segment trains offline.

use anyhow::{Context, Result};
use clap::Parser;
use motion::{CartesianKinematics, PlannerError};
use sim::SimMachine;
use std::path::PathBuf;
use tracing::{info, warn};

mod config;
mod program;

use config::MachineConfig;
use program::{parse_program, JobStep};

/// Plan a job file and report the emitted motor commands.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the machine configuration file.
    #[arg(short, long, default_value = "demos/machine.cfg")]
    config: PathBuf,

    /// Job file to run.
    job: PathBuf,

    /// Write the accepted motor-command trace to this file as JSON.
    #[arg(long)]
    trace: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    info!(config = ?cli.config, "loading machine configuration");
    let machine_config = MachineConfig::load(&cli.config)?;

    let text = std::fs::read_to_string(&cli.job)
        .with_context(|| format!("failed to read job file: {:?}", cli.job))?;
    let steps = parse_program(&text, machine_config.traverse_rate)?;
    info!(steps = steps.len(), "job parsed");

    let kinematics = CartesianKinematics {
        steps_per_mm: machine_config.steps_per_mm,
    };
    let mut machine: SimMachine =
        SimMachine::with_kinematics(machine_config.planner.clone(), kinematics);

    for step in &steps {
        machine.make_room_for_aline()?;
        let result = match step {
            JobStep::Feed { target, minutes } => machine.planner.aline(target, *minutes),
            JobStep::Rapid { target, minutes } => machine.planner.line(target, *minutes),
            JobStep::Dwell { seconds } => machine.planner.dwell(*seconds),
            JobStep::SetPosition { position } => {
                machine.planner.set_position(position);
                Ok(())
            }
            JobStep::Stop => machine.planner.queued_stop(),
            JobStep::Start => machine.planner.queued_start(),
            JobStep::End => machine.planner.queued_end(),
        };
        match result {
            Ok(()) => {}
            Err(PlannerError::ZeroLengthMove) => {
                warn!(?step, "skipping zero-length move");
            }
            Err(err) => return Err(err).context("planner rejected job step"),
        }
    }

    let stats = machine.run_until_idle()?;
    info!(
        dispatches = stats.dispatches,
        moves_completed = stats.completed,
        lines_emitted = machine.emitted_lines(),
        end_position = ?machine.planner.runtime_position(),
        "job complete"
    );

    if let Some(path) = &cli.trace {
        machine.dump_trace(path)?;
    }
    Ok(())
}
