use crate::cancel::CancelFlag;
use crate::driver::DriverHandle;
use crate::error::ScripterError;
use crate::navigation::MenuNavigator;
use crate::state::StateManager;
use crate::system::config::ScripterConfig;
use embassy_futures::select::{select, Either};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use embassy_time::{Duration, Instant, Timer};
use log::{debug, info};
use std::sync::Arc;

/// Idle-disconnect rule: the link is up, nothing is running and the last
/// command finished more than `threshold` ago (or never ran).
pub fn should_disconnect(
    connected: bool,
    busy: bool,
    last_execution: Option<Instant>,
    now: Instant,
    threshold: Duration,
) -> bool {
    if !connected || busy {
        return false;
    }
    match last_execution {
        Some(last) => now
            .checked_duration_since(last)
            .map_or(false, |idle| idle > threshold),
        None => true,
    }
}

pub struct ConnectionManager {
    driver: DriverHandle,
    state: Arc<StateManager>,
    config: ScripterConfig,
    stop: Signal<CriticalSectionRawMutex, ()>,
}

impl ConnectionManager {
    pub fn new(driver: DriverHandle, state: Arc<StateManager>, config: ScripterConfig) -> Self {
        Self {
            driver,
            state,
            config,
            stop: Signal::new(),
        }
    }

    /// Bring the link up unless the pump pushed a menu recently, then wait
    /// until a first menu is known.
    pub async fn ensure_connected(&self, cancel: &CancelFlag) -> Result<(), ScripterError> {
        if self.state.has_fresh_menu(self.config.connection_fresh()).await {
            debug!("Pump is sending us menu updates, so we're connected");
            return Ok(());
        }

        let status = self.driver.connect().await.map_err(|e| {
            ScripterError::connection(
                "Unexpected error while initiating/restoring pump connection",
                e,
            )
        })?;
        debug!("Connect init successful: {}", status.is_initiated());

        let navigator = MenuNavigator::new(&self.driver, &self.state, &self.config, cancel);
        while self.state.current_menu_type().await.is_none() {
            debug!("Waiting for first menu update to be sent");
            navigator.wait_for_menu_update().await?;
        }
        Ok(())
    }

    /// Disconnect the pump after a period without commands. Runs until
    /// `stop_idle_monitor` is called; driver errors are logged and ignored.
    pub async fn run_idle_monitor(&self) {
        info!(
            "Idle disconnect monitor started, timeout {}s",
            self.config.idle_disconnect_after().as_secs()
        );
        let mut pause = self.config.idle_monitor_start_delay();
        loop {
            if let Either::First(()) = select(self.stop.wait(), Timer::after(pause)).await {
                break;
            }
            pause = if self.check_idle_disconnect().await {
                self.config.idle_disconnect_pause()
            } else {
                self.config.idle_check_interval()
            };
        }
        info!("Idle disconnect monitor stopped");
    }

    pub fn stop_idle_monitor(&self) {
        self.stop.signal(());
    }

    /// Returns true if a disconnect was issued.
    async fn check_idle_disconnect(&self) -> bool {
        // asked before locking: a hanging status query must not hold up commands
        let connected = match self.driver.is_connected().await {
            Ok(connected) => connected,
            Err(e) => {
                debug!("Error in idle disconnect monitor, carrying on: {}", e);
                return false;
            }
        };
        // hold the state so a command cannot start between the check and the disconnect
        let state = self.state.lock().await;
        let idle_limit = self.config.idle_disconnect_after();
        let now = Instant::now();
        if !should_disconnect(connected, state.is_busy(), state.last_execution, now, idle_limit) {
            return false;
        }

        debug!("Disconnecting after {}s inactivity timeout", idle_limit.as_secs());
        if let Err(e) = self.driver.disconnect().await {
            debug!("Error in idle disconnect monitor, carrying on: {}", e);
            return false;
        }
        true
    }
}
