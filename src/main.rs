use anyhow::Context;
use embassy_executor::Spawner;
use embassy_time::Duration;
use log::{error, info, warn};
use ruffy_scripter::sim::SimulatedPump;
use ruffy_scripter::system::{DriverEventChannel, ScripterConfig};
use ruffy_scripter::{PumpScripter, ReadPumpStateCommand};
use std::sync::Arc;

const SIM_PUSH_INTERVAL: Duration = Duration::from_millis(500);

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting pump scripter against simulated pump");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            std::process::exit(1);
        }
    };

    let events = Arc::new(DriverEventChannel::new());
    let pump = Arc::new(SimulatedPump::new(Arc::clone(&events), SIM_PUSH_INTERVAL));
    let scripter = Arc::new(PumpScripter::new(pump.clone(), events, config));

    if spawner.spawn(simulator_task(Arc::clone(&pump))).is_err() {
        error!("Failed to spawn simulator task");
        std::process::exit(1);
    }
    if spawner.spawn(event_task(Arc::clone(&scripter))).is_err() {
        error!("Failed to spawn driver event task");
        std::process::exit(1);
    }
    if spawner.spawn(idle_monitor_task(Arc::clone(&scripter))).is_err() {
        warn!("Failed to spawn idle monitor task - link will stay up");
    }

    let result = scripter.run_command(&ReadPumpStateCommand).await;
    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Failed to serialize command result: {}", e),
    }

    scripter.shutdown();
    std::process::exit(if result.success { 0 } else { 1 });
}

/// First argument, if given, names a JSON config file.
fn load_config() -> anyhow::Result<ScripterConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(ScripterConfig::default());
    };
    let json = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let config = ScripterConfig::from_json(&json).with_context(|| format!("parsing {}", path))?;
    info!("Loaded config from {}", path);
    Ok(config)
}

#[embassy_executor::task]
async fn simulator_task(pump: Arc<SimulatedPump>) {
    pump.run().await;
}

#[embassy_executor::task]
async fn event_task(scripter: Arc<PumpScripter>) {
    scripter.run_event_loop().await;
}

#[embassy_executor::task]
async fn idle_monitor_task(scripter: Arc<PumpScripter>) {
    scripter.run_idle_monitor().await;
}
