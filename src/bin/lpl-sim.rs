//! Wake/rendezvous simulation.
//!
//! Runs a waker against one duty-cycling listener in virtual time and
//! prints a JSON report of every cycle.
//!
//! Environment:
//! - `LPL_SEED`: seed for the listener phase (random when unset)
//! - `LPL_BURSTS`: number of wake cycles (default 4)
//! - `LPL_CONFIG`: path to a JSON `SimConfig`; missing fields take defaults
//!
//! Usage:
//!   cargo run --bin lpl-sim
//!   LPL_SEED=7 LPL_BURSTS=10 cargo run --bin lpl-sim

use log::{error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_core::{OsRng, RngCore};
use std::process::ExitCode;
use uwb_lplisten::lpl::worst_case_period_us;
use uwb_lplisten::platform::init_logging;
use uwb_lplisten::sim::{Scenario, SimConfig};

fn load_config() -> Result<SimConfig, Box<dyn std::error::Error>> {
    let mut config = match std::env::var("LPL_CONFIG") {
        Ok(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read {}: {}", path, e))?;
            serde_json::from_str(&text).map_err(|e| format!("Invalid config {}: {}", path, e))?
        }
        Err(_) => SimConfig::default(),
    };

    if let Ok(bursts) = std::env::var("LPL_BURSTS") {
        config.bursts = bursts
            .parse()
            .map_err(|e| format!("Invalid LPL_BURSTS {:?}: {}", bursts, e))?;
    }

    if config.listener_phase_us.is_none() {
        let seed = match std::env::var("LPL_SEED") {
            Ok(seed) => seed
                .parse()
                .map_err(|e| format!("Invalid LPL_SEED {:?}: {}", seed, e))?,
            Err(_) => OsRng.next_u64(),
        };
        let period_us = worst_case_period_us(&config.listener);
        let phase_us = StdRng::seed_from_u64(seed).gen_range(0..period_us);
        info!("Seed {} gives listener phase {} us", seed, phase_us);
        config.listener_phase_us = Some(phase_us);
    }

    Ok(config)
}

fn main() -> ExitCode {
    init_logging();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Simulating {} wake cycles of {} frames",
        config.bursts, config.waker.frame_count
    );

    let report = match Scenario::new(config).and_then(Scenario::run) {
        Ok(report) => report,
        Err(e) => {
            error!("Simulation failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialise report: {}", e);
            ExitCode::FAILURE
        }
    }
}
