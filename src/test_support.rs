// Shared helpers for the async unit tests: shortened timeouts, logger set-up
// and a driver event loop running next to the code under test.

use crate::sim::SimulatedPump;
use crate::state::StateManager;
use crate::system::config::ScripterConfig;
use crate::system::events::DriverEventChannel;
use crate::types::{Menu, MenuType};
use embassy_futures::block_on;
use embassy_futures::join::join;
use embassy_futures::select::{select, Either};
use std::future::Future;

pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

pub fn fast_config() -> ScripterConfig {
    ScripterConfig {
        connection_fresh_ms: 200,
        menu_update_timeout_ms: 300,
        menu_leave_timeout_ms: 200,
        command_timeout_ms: 400,
        cancel_grace_ms: 100,
        idle_disconnect_after_ms: 50,
        idle_monitor_start_delay_ms: 0,
        idle_check_interval_ms: 10,
        idle_disconnect_pause_ms: 20,
        key_hold_ms: 2,
        menu_update_poll_ms: 2,
        menu_leave_poll_ms: 2,
        verify_retries: 5,
        verify_retry_delay_ms: 5,
    }
}

pub fn sim_menu(menu_type: MenuType) -> Menu {
    SimulatedPump::menu_for(menu_type)
}

pub async fn forward_events(channel: &DriverEventChannel, state: &StateManager) {
    loop {
        let event = channel.receive().await;
        state.apply_event(event).await;
    }
}

/// Drive `body` to completion while the simulated pump pushes menus and its
/// events are applied to `state`.
pub fn run_with_event_loop<F: Future>(
    channel: &DriverEventChannel,
    pump: &SimulatedPump,
    state: &StateManager,
    body: F,
) -> F::Output {
    let background = join(pump.run(), forward_events(channel, state));
    match block_on(select(background, body)) {
        Either::First(_) => unreachable!("event loop never finishes"),
        Either::Second(output) => output,
    }
}
