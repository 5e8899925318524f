// scripter.rs - command executor driving the pump's remote-terminal menus
// One command at a time: connect, wait for the pump to accept input, run the
// command under a watchdog and always hand back a CommandResult.

use crate::cancel::CancelFlag;
use crate::commands::Command;
use crate::connection::ConnectionManager;
use crate::context::CommandContext;
use crate::driver::{DriverHandle, PumpDriver};
use crate::error::ScripterError;
use crate::navigation::MenuNavigator;
use crate::phase::PhaseInput;
use crate::pump_state::read_pump_state;
use crate::state::StateManager;
use crate::system::config::ScripterConfig;
use crate::system::events::DriverEventChannel;
use crate::types::{CommandResult, Menu, MenuAttribute, MenuType};
use embassy_futures::select::{select, Either};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex, signal::Signal};
use embassy_time::Timer;
use futures::FutureExt;
use log::{debug, error, info, warn};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::Arc;

/// Runs commands against one pump link.
///
/// Commands are serialized per instance. The process is expected to own a
/// single `PumpScripter` for its pump, which makes that the system-wide
/// serialization point; a second instance on the same driver would not be
/// excluded by it.
pub struct PumpScripter {
    driver: DriverHandle,
    state: Arc<StateManager>,
    connection: ConnectionManager,
    config: ScripterConfig,
    events: Arc<DriverEventChannel>,
    command_lock: Mutex<CriticalSectionRawMutex, ()>,
    shutdown: Signal<CriticalSectionRawMutex, ()>,
}

/// Clears the active-command marker if a run is dropped half way.
struct ActiveCommandGuard<'a> {
    state: &'a StateManager,
    armed: bool,
}

impl ActiveCommandGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ActiveCommandGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.abort_command();
        }
    }
}

impl PumpScripter {
    pub fn new(
        driver: Arc<dyn PumpDriver>,
        events: Arc<DriverEventChannel>,
        config: ScripterConfig,
    ) -> Self {
        let driver = DriverHandle::new(driver);
        let state = Arc::new(StateManager::new());
        let connection = ConnectionManager::new(driver.clone(), Arc::clone(&state), config.clone());
        Self {
            driver,
            state,
            connection,
            config,
            events,
            command_lock: Mutex::new(()),
            shutdown: Signal::new(),
        }
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Apply driver events to the menu state until `shutdown` is called.
    pub async fn run_event_loop(&self) {
        info!("Driver event loop started");
        loop {
            match select(self.shutdown.wait(), self.events.receive()).await {
                Either::First(()) => break,
                Either::Second(event) => self.state.apply_event(event).await,
            }
        }
        info!("Driver event loop stopped");
    }

    pub async fn run_idle_monitor(&self) {
        self.connection.run_idle_monitor().await
    }

    /// Stops the event loop and the idle monitor. A running command is left
    /// to finish or time out.
    pub fn shutdown(&self) {
        self.shutdown.signal(());
        self.connection.stop_idle_monitor();
    }

    pub async fn is_pump_busy(&self) -> bool {
        self.state.is_busy().await
    }

    pub async fn last_result(&self) -> Option<CommandResult> {
        self.state.last_result().await
    }

    /// Run one command to completion. Callers queue up behind the command
    /// lock; the result is returned within the watchdog timeout plus the
    /// cancel grace period.
    pub async fn run_command(&self, command: &dyn Command) -> CommandResult {
        let _serial = self.command_lock.lock().await;
        let name = command.name().to_string();
        debug!("Executing command {}", name);

        self.state.begin_command(&name).await;
        let guard = ActiveCommandGuard {
            state: &self.state,
            armed: true,
        };

        let cancel = CancelFlag::new();
        let result = match self.supervise(command, &cancel).await {
            Some(result) => self.attach_pump_state(result).await,
            None => ScripterError::CommandTimeout(name.clone()).into_command_result(),
        };

        self.state.finish_command(&result).await;
        guard.disarm();
        debug!("Command result: {}", result);
        result
    }

    /// Race the worker against the watchdog. `None` means it timed out; the
    /// worker got the cancel signal and the grace period, then was dropped.
    async fn supervise(
        &self,
        command: &dyn Command,
        cancel: &CancelFlag,
    ) -> Option<CommandResult> {
        let mut worker = pin!(self.run_worker(command, cancel));
        if let Either::First(result) =
            select(worker.as_mut(), Timer::after(self.config.command_timeout())).await
        {
            return Some(result);
        }

        error!("Running command {} timed out", command.name());
        cancel.cancel();
        match select(worker.as_mut(), Timer::after(self.config.cancel_grace())).await {
            Either::First(late) => {
                debug!("Interrupted command stopped, discarding result: {}", late)
            }
            Either::Second(()) => {
                warn!("Command {} ignored interrupt, abandoning it", command.name())
            }
        }
        None
    }

    async fn run_worker(&self, command: &dyn Command, cancel: &CancelFlag) -> CommandResult {
        let outcome = AssertUnwindSafe(self.prepare_and_execute(command, cancel))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(ScripterError::Unexpected(format!(
                    "Unexpected exception running cmd: {}",
                    panic_message(&*panic)
                )))
            });
        match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!("Command {} failed: {}", command.name(), e);
                e.into_command_result()
            }
        }
    }

    async fn prepare_and_execute(
        &self,
        command: &dyn Command,
        cancel: &CancelFlag,
    ) -> Result<CommandResult, ScripterError> {
        self.connection.ensure_connected(cancel).await?;
        self.state.advance_phase(PhaseInput::Connected).await;

        let navigator = MenuNavigator::new(&self.driver, &self.state, &self.config, cancel);
        // wait till pump is ready for input
        navigator.wait_for_menu_update().await?;

        let menu = self.state.current_menu().await;
        if let Some(menu) = menu.filter(|menu| menu.menu_type() == MenuType::WarningOrError) {
            self.state.advance_phase(PhaseInput::ErrorDisplayed).await;
            return Ok(error_state_result(&menu));
        }

        self.state.advance_phase(PhaseInput::ReadyForInput).await;
        debug!("Connection ready, executing command {}", command.name());
        let context = CommandContext::new(navigator);
        command.execute(&context).await
    }

    async fn attach_pump_state(&self, mut result: CommandResult) -> CommandResult {
        if result.state.is_none() {
            let menu = self.state.current_menu().await;
            match read_pump_state(menu.as_ref()) {
                Ok(state) => result.state = Some(state),
                Err(e) => warn!("Could not attach pump state to result: {}", e),
            }
        }
        result
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// The pump shows a warning or error before the command got to run.
fn error_state_result(menu: &Menu) -> CommandResult {
    match read_pump_state(Some(menu)) {
        Ok(state) => {
            let message = menu.text(MenuAttribute::Message).unwrap_or("").to_string();
            let result = ScripterError::PumpErrorState(message).into_command_result();
            result.state(state)
        }
        Err(e) => CommandResult::new()
            .success(false)
            .enacted(false)
            .message("Pump is in an error state, reading the error state failed")
            .error(e),
    }
}
