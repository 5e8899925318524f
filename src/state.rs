use crate::phase::{CommandPhase, PhaseInput, PhaseTracker};
use crate::system::events::DriverEvent;
use crate::types::{CommandResult, Menu, MenuType};
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    mutex::{Mutex, MutexGuard},
};
use embassy_time::{Duration, Instant};
use log::{debug, trace, warn};
use std::sync::Arc;

/// Everything shared between the event stream, the idle monitor and the
/// command worker. One writer per field:
/// - `menu`, `menu_updated_at`: the driver event loop
/// - `active_command`, `phase`, `last_result`, `last_execution`: the executor
pub struct ScripterState {
    pub menu: Option<Menu>,
    pub menu_updated_at: Option<Instant>,
    pub active_command: Option<String>,
    pub phase: CommandPhase,
    pub last_execution: Option<Instant>,
    pub last_result: Option<CommandResult>,
    phase_tracker: PhaseTracker,
}

impl Default for ScripterState {
    fn default() -> Self {
        Self {
            menu: None,
            menu_updated_at: None,
            active_command: None,
            phase: CommandPhase::Idle,
            last_execution: None,
            last_result: None,
            phase_tracker: PhaseTracker::new(),
        }
    }
}

impl ScripterState {
    /// Busy covers the whole run, including the connect phase.
    pub fn is_busy(&self) -> bool {
        self.active_command.is_some() || self.phase != CommandPhase::Idle
    }

    fn advance_phase(&mut self, input: PhaseInput) -> CommandPhase {
        self.phase = self.phase_tracker.handle(input);
        self.phase
    }
}

// Every push must move the clock forward, even two pushes within the same tick,
// since waiters only compare timestamps.
fn next_update_stamp(previous: Option<Instant>) -> Instant {
    let now = Instant::now();
    match previous {
        Some(previous) if now <= previous => previous + Duration::from_ticks(1),
        _ => now,
    }
}

pub struct StateManager {
    state: Arc<Mutex<CriticalSectionRawMutex, ScripterState>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScripterState::default())),
        }
    }

    /// Hold the state across a check-then-act sequence.
    pub async fn lock(&self) -> MutexGuard<'_, CriticalSectionRawMutex, ScripterState> {
        self.state.lock().await
    }

    pub async fn apply_event(&self, event: DriverEvent) {
        trace!("Driver event: {}", event.kind());
        match event {
            DriverEvent::Log(message) => trace!("{}", message),
            DriverEvent::Failure(message) => warn!("{}", message),
            DriverEvent::BluetoothRequested => trace!("Driver invoked requestBluetooth callback"),
            DriverEvent::LinkStarted => debug!("Link started"),
            DriverEvent::LinkStopped => {
                debug!("Link stopped, forgetting displayed menu");
                let mut state = self.state.lock().await;
                state.menu = None;
            }
            DriverEvent::Menu(menu) => self.update_menu(menu).await,
            DriverEvent::NoMenu => debug!("Driver reports no menu displayed"),
            DriverEvent::ClearDisplay | DriverEvent::UpdateDisplay { .. } => {}
        }
    }

    async fn update_menu(&self, menu: Menu) {
        debug!("Menu update: {}", menu.menu_type());
        let mut state = self.state.lock().await;
        // a warning menu is a valid transient state while a command is running
        // (e.g. cancelling a TBR), so only flag it when we are idle
        let unsolicited_warning =
            state.active_command.is_none() && menu.menu_type() == MenuType::WarningOrError;
        state.menu = Some(menu);
        state.menu_updated_at = Some(next_update_stamp(state.menu_updated_at));
        if unsolicited_warning {
            warn!("Warning/error menu encountered without a command running");
        }
    }

    pub async fn current_menu(&self) -> Option<Menu> {
        let state = self.state.lock().await;
        state.menu.clone()
    }

    pub async fn current_menu_type(&self) -> Option<MenuType> {
        let state = self.state.lock().await;
        state.menu.as_ref().map(|menu| menu.menu_type())
    }

    pub async fn menu_updated_at(&self) -> Option<Instant> {
        let state = self.state.lock().await;
        state.menu_updated_at
    }

    /// A menu is displayed and the last push is younger than `window`.
    pub async fn has_fresh_menu(&self, window: Duration) -> bool {
        let state = self.state.lock().await;
        match (&state.menu, state.menu_updated_at) {
            (Some(_), Some(updated_at)) => Instant::now()
                .checked_duration_since(updated_at)
                .map_or(true, |age| age < window),
            _ => false,
        }
    }

    pub async fn begin_command(&self, name: &str) {
        let mut state = self.state.lock().await;
        state.active_command = Some(name.to_string());
        state.last_result = None;
        state.advance_phase(PhaseInput::Start);
    }

    pub async fn advance_phase(&self, input: PhaseInput) -> CommandPhase {
        let mut state = self.state.lock().await;
        state.advance_phase(input)
    }

    pub async fn finish_command(&self, result: &CommandResult) {
        let mut state = self.state.lock().await;
        Self::clear_command(&mut state);
        state.last_result = Some(result.clone());
    }

    /// Best effort clean-up for a run whose future was dropped before it could
    /// finish normally.
    pub fn abort_command(&self) {
        match self.state.try_lock() {
            Ok(mut state) => Self::clear_command(&mut state),
            Err(_) => warn!("State busy while aborting command, active marker not cleared"),
        }
    }

    fn clear_command(state: &mut ScripterState) {
        state.advance_phase(PhaseInput::Finished);
        state.advance_phase(PhaseInput::Reset);
        state.active_command = None;
        state.last_execution = Some(Instant::now());
    }

    pub async fn active_command(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.active_command.clone()
    }

    pub async fn is_busy(&self) -> bool {
        let state = self.state.lock().await;
        state.is_busy()
    }

    pub async fn phase(&self) -> CommandPhase {
        let state = self.state.lock().await;
        state.phase
    }

    pub async fn last_execution(&self) -> Option<Instant> {
        let state = self.state.lock().await;
        state.last_execution
    }

    pub async fn last_result(&self) -> Option<CommandResult> {
        let state = self.state.lock().await;
        state.last_result.clone()
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}
