use crate::error::ScripterError;
use crate::navigation::MenuNavigator;
use crate::pump_state::read_pump_state;
use crate::state::StateManager;
use crate::types::{Key, Menu, MenuType, PumpState};

/// What a command gets to work with while it runs: key presses, menu
/// navigation and read access to the shared state.
pub struct CommandContext<'a> {
    navigator: MenuNavigator<'a>,
    state: &'a StateManager,
}

impl<'a> CommandContext<'a> {
    pub fn new(navigator: MenuNavigator<'a>) -> Self {
        let state = navigator.state();
        Self { navigator, state }
    }

    pub async fn press_up_key(&self) -> Result<(), ScripterError> {
        self.navigator.press_key(Key::Up).await
    }

    pub async fn press_down_key(&self) -> Result<(), ScripterError> {
        self.navigator.press_key(Key::Down).await
    }

    pub async fn press_check_key(&self) -> Result<(), ScripterError> {
        self.navigator.press_key(Key::Check).await
    }

    pub async fn press_menu_key(&self) -> Result<(), ScripterError> {
        self.navigator.press_key(Key::Menu).await
    }

    pub async fn wait_for_menu_update(&self) -> Result<(), ScripterError> {
        self.navigator.wait_for_menu_update().await
    }

    pub async fn wait_for_menu_to_be_left(&self, menu_type: MenuType) -> Result<(), ScripterError> {
        self.navigator.wait_for_menu_to_be_left(menu_type).await
    }

    pub async fn navigate_to_menu(&self, target: MenuType) -> Result<(), ScripterError> {
        self.navigator.navigate_to_menu(target).await
    }

    pub async fn verify_menu_is_displayed(
        &self,
        expected: MenuType,
        failure_message: Option<&str>,
    ) -> Result<(), ScripterError> {
        self.navigator
            .verify_menu_is_displayed(expected, failure_message)
            .await
    }

    pub async fn current_menu(&self) -> Option<Menu> {
        self.state.current_menu().await
    }

    pub async fn is_pump_busy(&self) -> bool {
        self.state.is_busy().await
    }

    pub async fn read_pump_state(&self) -> Result<PumpState, ScripterError> {
        let menu = self.state.current_menu().await;
        read_pump_state(menu.as_ref())
    }

    pub fn is_cancelled(&self) -> bool {
        self.navigator.cancel_flag().is_cancelled()
    }

    pub fn checkpoint(&self) -> Result<(), ScripterError> {
        self.navigator.cancel_flag().checkpoint()
    }
}
